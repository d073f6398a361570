//! Vertex formats consumed by the patch shaders.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

/// Terrain patch vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PatchVertex {
    /// Planet-relative position (far tier: position on the flat tier).
    pub position: [f32; 3],
    /// Detail texture coordinate.
    pub tex_coord: [f32; 2],
    /// Temperature and humidity in 0..1, used as the color map lookup.
    pub climate: [f32; 2],
}

const_assert_eq!(std::mem::size_of::<PatchVertex>(), 28);

impl PatchVertex {
    /// Get the vertex buffer layout for this vertex type.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        use wgpu::{VertexAttribute, VertexFormat};

        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<PatchVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: VertexFormat::Float32x3,
                },
                VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: VertexFormat::Float32x2,
                },
                VertexAttribute {
                    offset: 20,
                    shader_location: 2,
                    format: VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Water sub-mesh vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct WaterVertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
    /// Water depth below the surface.
    pub depth: f32,
    /// Surface temperature in 0..1.
    pub temperature: f32,
}

const_assert_eq!(std::mem::size_of::<WaterVertex>(), 28);

impl WaterVertex {
    /// Get the vertex buffer layout for this vertex type.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        use wgpu::{VertexAttribute, VertexFormat};

        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<WaterVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: VertexFormat::Float32x3,
                },
                VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: VertexFormat::Float32x2,
                },
                VertexAttribute {
                    offset: 20,
                    shader_location: 2,
                    format: VertexFormat::Float32,
                },
                VertexAttribute {
                    offset: 24,
                    shader_location: 3,
                    format: VertexFormat::Float32,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_cover_whole_vertex() {
        for layout in [PatchVertex::layout(), WaterVertex::layout()] {
            let last = layout.attributes.last().unwrap();
            assert_eq!(
                last.offset + last.format.size(),
                layout.array_stride,
                "attributes must end at the stride"
            );
        }
    }
}
