//! Terrain and water patch pipelines and their bind group layouts.
//!
//! | group | contents | dynamic offset |
//! |---|---|---|
//! | 0 | pass uniforms + scatter uniforms | per pass |
//! | 1 | per-draw transform | per draw |
//! | 2 | color map, detail texture, sampler | no |
//! | 3 | patch normal map (terrain only) | no |

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use crate::scatter::ScatterUniform;
use crate::uniforms::{PassUniform, PatchDrawUniform};

use super::vertex::{PatchVertex, WaterVertex};

/// WGSL source for the terrain patch shader.
pub const TERRAIN_SHADER_SOURCE: &str = include_str!("terrain_patch.wgsl");

/// WGSL source for the water patch shader.
pub const WATER_SHADER_SOURCE: &str = include_str!("water_patch.wgsl");

/// Depth format shared with the rest of the frame (reverse-Z).
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Group 0 contents. Matches `PassBlock` in the patch shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub(crate) struct PassBlock {
    pub pass: PassUniform,
    pub scatter: ScatterUniform,
}

const_assert_eq!(std::mem::size_of::<PassBlock>(), 128);

pub(crate) const PASS_BLOCK_SIZE: u64 = std::mem::size_of::<PassBlock>() as u64;
pub(crate) const DRAW_UNIFORM_SIZE: u64 = std::mem::size_of::<PatchDrawUniform>() as u64;

/// Render pipelines for the two patch programs.
pub struct PatchPipelines {
    /// Terrain surface and skirts.
    pub terrain: wgpu::RenderPipeline,
    /// Water sub-meshes, blended over terrain without writing depth.
    pub water: wgpu::RenderPipeline,
    /// Pass uniform layout (group 0).
    pub pass_bind_group_layout: wgpu::BindGroupLayout,
    /// Per-draw uniform layout (group 1).
    pub draw_bind_group_layout: wgpu::BindGroupLayout,
    /// Pass texture layout (group 2).
    pub material_bind_group_layout: wgpu::BindGroupLayout,
    /// Normal map layout (group 3).
    pub normal_map_bind_group_layout: wgpu::BindGroupLayout,
}

impl PatchPipelines {
    /// Create both pipelines for the given color target.
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Self {
        let pass_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("patch-pass-bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(PASS_BLOCK_SIZE),
                    },
                    count: None,
                }],
            });

        let draw_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("patch-draw-bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(DRAW_UNIFORM_SIZE),
                    },
                    count: None,
                }],
            });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let material_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("patch-material-bgl"),
                entries: &[
                    // binding 0: color map
                    texture_entry(0),
                    // binding 1: detail texture
                    texture_entry(1),
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let normal_map_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("patch-normal-map-bgl"),
                entries: &[texture_entry(0)],
            });

        let terrain_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("terrain-patch-pipeline-layout"),
            bind_group_layouts: &[
                &pass_bind_group_layout,
                &draw_bind_group_layout,
                &material_bind_group_layout,
                &normal_map_bind_group_layout,
            ],
            immediate_size: 0,
        });

        let water_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("water-patch-pipeline-layout"),
            bind_group_layouts: &[
                &pass_bind_group_layout,
                &draw_bind_group_layout,
                &material_bind_group_layout,
            ],
            immediate_size: 0,
        });

        let terrain_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("terrain-patch-shader"),
            source: wgpu::ShaderSource::Wgsl(TERRAIN_SHADER_SOURCE.into()),
        });
        let water_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("water-patch-shader"),
            source: wgpu::ShaderSource::Wgsl(WATER_SHADER_SOURCE.into()),
        });

        let terrain = create_pipeline(
            device,
            "terrain-patch-pipeline",
            &terrain_layout,
            &terrain_shader,
            PatchVertex::layout(),
            color_format,
            true,
        );
        let water = create_pipeline(
            device,
            "water-patch-pipeline",
            &water_layout,
            &water_shader,
            WaterVertex::layout(),
            color_format,
            false,
        );

        Self {
            terrain,
            water,
            pass_bind_group_layout,
            draw_bind_group_layout,
            material_bind_group_layout,
            normal_map_bind_group_layout,
        }
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    vertex_layout: wgpu::VertexBufferLayout<'static>,
    color_format: wgpu::TextureFormat,
    depth_write_enabled: bool,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[vertex_layout],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            // Skirts hang below the surface facing either way.
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled,
            depth_compare: wgpu::CompareFunction::GreaterEqual, // reverse-Z
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shaders_parse() {
        for source in [TERRAIN_SHADER_SOURCE, WATER_SHADER_SOURCE] {
            assert!(source.contains("fn vs_main"));
            assert!(source.contains("fn fs_main"));
            assert!(source.contains("struct PassBlock"));
        }
        assert!(TERRAIN_SHADER_SOURCE.contains("@group(3)"));
        assert!(!WATER_SHADER_SOURCE.contains("@group(3)"));
    }
}
