//! Replays a recorded [`PatchDrawList`] into a wgpu render pass.
//!
//! Rendering is split the same way as the other planet renderers: `prepare`
//! uploads all pass and per-draw uniforms for the frame and builds the bind
//! groups, then `render` records the draws into an open render pass.

use std::collections::HashMap;
use std::num::NonZeroU64;

use terra_config::PatchRenderConfig;
use tracing::{debug, warn};

use crate::draw::{DrawCommand, PassKind, PassTextures, PatchDraw, PatchDrawList};
use crate::handle::TextureHandle;

use super::pipeline::{DRAW_UNIFORM_SIZE, PASS_BLOCK_SIZE, PassBlock, PatchPipelines};
use super::pool::{GpuResourcePool, MATERIAL_TEXTURE_FORMAT, NORMAL_MAP_FORMAT, write_rgba};

/// Passes one `prepare` call can hold. Two tiers with two passes each fit twice over.
pub const MAX_PASSES: usize = 8;

const FALLBACK_MATERIAL: [u8; 4] = [255, 255, 255, 255];
// Tangent-space "straight up" after unpacking.
const FALLBACK_NORMAL: [u8; 4] = [128, 255, 128, 255];

/// Counters from the last `prepare` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchRenderStats {
    /// Passes that will be replayed.
    pub passes: u32,
    /// Draws that will be replayed.
    pub draws: u32,
    /// Draws dropped because a buffer handle was stale or a capacity was hit.
    pub skipped: u32,
}

struct PreparedDraw {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
    draw_offset: u32,
    normal_map: Option<TextureHandle>,
}

struct PreparedPass {
    kind: PassKind,
    pass_offset: u32,
    material_bind_group: wgpu::BindGroup,
    draws: Vec<PreparedDraw>,
}

/// GPU backend for the patch draw list.
pub struct PatchRenderer {
    pipelines: PatchPipelines,
    pass_buffer: wgpu::Buffer,
    draw_buffer: wgpu::Buffer,
    pass_bind_group: wgpu::BindGroup,
    draw_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    fallback_material: wgpu::TextureView,
    fallback_normal_map: wgpu::BindGroup,
    pass_stride: u64,
    draw_stride: u64,
    max_draws: usize,
    prepared: Vec<PreparedPass>,
    normal_map_groups: HashMap<TextureHandle, wgpu::BindGroup>,
    stats: PatchRenderStats,
}

impl PatchRenderer {
    /// Create the pipelines and the per-frame uniform buffers.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        color_format: wgpu::TextureFormat,
        config: &PatchRenderConfig,
    ) -> Self {
        let pipelines = PatchPipelines::new(device, color_format);

        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let pass_stride = align_up(PASS_BLOCK_SIZE, alignment);
        let draw_stride = align_up(DRAW_UNIFORM_SIZE, alignment);
        let max_draws = config.max_draws_per_pass.max(1) as usize;

        let pass_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("patch-pass-uniforms"),
            size: pass_stride * MAX_PASSES as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let draw_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("patch-draw-uniforms"),
            size: draw_stride * max_draws as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let pass_bind_group = uniform_bind_group(
            device,
            "patch-pass-bg",
            &pipelines.pass_bind_group_layout,
            &pass_buffer,
            PASS_BLOCK_SIZE,
        );
        let draw_bind_group = uniform_bind_group(
            device,
            "patch-draw-bg",
            &pipelines.draw_bind_group_layout,
            &draw_buffer,
            DRAW_UNIFORM_SIZE,
        );

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("patch-material-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let fallback_material = solid_texture(
            device,
            queue,
            "patch-fallback-material",
            MATERIAL_TEXTURE_FORMAT,
            FALLBACK_MATERIAL,
        );
        let fallback_normal = solid_texture(
            device,
            queue,
            "patch-fallback-normal-map",
            NORMAL_MAP_FORMAT,
            FALLBACK_NORMAL,
        );
        let fallback_normal_map = normal_map_bind_group(device, &pipelines, &fallback_normal);

        debug!(max_draws, pass_stride, draw_stride, "patch renderer created");

        Self {
            pipelines,
            pass_buffer,
            draw_buffer,
            pass_bind_group,
            draw_bind_group,
            sampler,
            fallback_material,
            fallback_normal_map,
            pass_stride,
            draw_stride,
            max_draws,
            prepared: Vec::new(),
            normal_map_groups: HashMap::new(),
            stats: PatchRenderStats::default(),
        }
    }

    /// Upload uniforms and build bind groups for everything in `list`.
    ///
    /// Draws whose buffers are no longer live in `pool` are skipped, as are
    /// passes and draws beyond the renderer's capacity.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        list: &PatchDrawList,
        pool: &GpuResourcePool,
    ) -> PatchRenderStats {
        self.prepared.clear();
        self.normal_map_groups.clear();
        let mut stats = PatchRenderStats::default();

        let mut pass_bytes = vec![0u8; (self.pass_stride as usize) * MAX_PASSES];
        let mut draw_bytes: Vec<u8> = Vec::new();
        let mut draw_slots = 0usize;
        let mut skipping_pass = false;

        for command in list.commands() {
            match command {
                DrawCommand::BeginPass(setup) => {
                    if self.prepared.len() == MAX_PASSES {
                        warn!(max = MAX_PASSES, "patch pass capacity exceeded");
                        skipping_pass = true;
                        continue;
                    }
                    skipping_pass = false;

                    let slot = self.prepared.len();
                    let block = PassBlock {
                        pass: setup.uniform,
                        scatter: setup.scatter.unwrap_or_default(),
                    };
                    let start = slot * self.pass_stride as usize;
                    pass_bytes[start..start + PASS_BLOCK_SIZE as usize]
                        .copy_from_slice(bytemuck::bytes_of(&block));

                    let material_bind_group =
                        self.material_bind_group(device, pool, setup.textures);
                    self.prepared.push(PreparedPass {
                        kind: setup.kind,
                        pass_offset: (slot as u64 * self.pass_stride) as u32,
                        material_bind_group,
                        draws: Vec::new(),
                    });
                    stats.passes += 1;
                }
                DrawCommand::Draw(draw) => {
                    if skipping_pass {
                        stats.skipped += 1;
                        continue;
                    }
                    if draw_slots == self.max_draws {
                        if stats.skipped == 0 {
                            warn!(max = self.max_draws, "patch draw capacity exceeded");
                        }
                        stats.skipped += 1;
                        continue;
                    }
                    let Some(prepared) = self.resolve_draw(device, pool, draw) else {
                        stats.skipped += 1;
                        continue;
                    };

                    draw_bytes.resize(draw_slots * self.draw_stride as usize, 0);
                    draw_bytes.extend_from_slice(bytemuck::bytes_of(&draw.transform));
                    let prepared = PreparedDraw {
                        draw_offset: (draw_slots as u64 * self.draw_stride) as u32,
                        ..prepared
                    };
                    draw_slots += 1;

                    if let Some(pass) = self.prepared.last_mut() {
                        pass.draws.push(prepared);
                        stats.draws += 1;
                    }
                }
                DrawCommand::EndPass => {}
            }
        }

        if !self.prepared.is_empty() {
            let used = self.prepared.len() * self.pass_stride as usize;
            queue.write_buffer(&self.pass_buffer, 0, &pass_bytes[..used]);
        }
        if !draw_bytes.is_empty() {
            queue.write_buffer(&self.draw_buffer, 0, &draw_bytes);
        }

        self.stats = stats;
        stats
    }

    /// Record the prepared passes into `render_pass`.
    pub fn render(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        for pass in &self.prepared {
            let pipeline = match pass.kind {
                PassKind::Water => &self.pipelines.water,
                PassKind::Terrain => &self.pipelines.terrain,
            };
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &self.pass_bind_group, &[pass.pass_offset]);
            render_pass.set_bind_group(2, &pass.material_bind_group, &[]);

            for draw in &pass.draws {
                render_pass.set_bind_group(1, &self.draw_bind_group, &[draw.draw_offset]);
                if pass.kind == PassKind::Terrain {
                    let normal_map = draw
                        .normal_map
                        .and_then(|h| self.normal_map_groups.get(&h))
                        .unwrap_or(&self.fallback_normal_map);
                    render_pass.set_bind_group(3, normal_map, &[]);
                }
                render_pass.set_vertex_buffer(0, draw.vertex.slice(..));
                render_pass.set_index_buffer(draw.index.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }
    }

    /// Counters from the last `prepare` call.
    pub fn stats(&self) -> PatchRenderStats {
        self.stats
    }

    /// The underlying pipelines.
    pub fn pipelines(&self) -> &PatchPipelines {
        &self.pipelines
    }

    fn resolve_draw(
        &mut self,
        device: &wgpu::Device,
        pool: &GpuResourcePool,
        draw: &PatchDraw,
    ) -> Option<PreparedDraw> {
        let (Some(vertex), Some(index)) = (pool.buffer(draw.vertex), pool.buffer(draw.index))
        else {
            warn!(vertex = ?draw.vertex, index = ?draw.index, "draw references freed buffer");
            return None;
        };

        let normal_map = draw.normal_map.filter(|&handle| {
            if self.normal_map_groups.contains_key(&handle) {
                return true;
            }
            let Some(view) = pool.texture_view(handle) else {
                return false;
            };
            let group = normal_map_bind_group(device, &self.pipelines, view);
            self.normal_map_groups.insert(handle, group);
            true
        });

        Some(PreparedDraw {
            vertex: vertex.clone(),
            index: index.clone(),
            index_count: draw.index_count,
            draw_offset: 0,
            normal_map,
        })
    }

    fn material_bind_group(
        &self,
        device: &wgpu::Device,
        pool: &GpuResourcePool,
        textures: PassTextures,
    ) -> wgpu::BindGroup {
        let view = |handle: Option<TextureHandle>| {
            handle
                .and_then(|h| pool.texture_view(h))
                .unwrap_or(&self.fallback_material)
        };
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("patch-material-bg"),
            layout: &self.pipelines.material_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view(textures.color_map)),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view(textures.surface)),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }
}

fn align_up(size: u64, alignment: u64) -> u64 {
    size.div_ceil(alignment) * alignment
}

fn uniform_bind_group(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    size: u64,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: NonZeroU64::new(size),
            }),
        }],
    })
}

fn normal_map_bind_group(
    device: &wgpu::Device,
    pipelines: &PatchPipelines,
    view: &wgpu::TextureView,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("patch-normal-map-bg"),
        layout: &pipelines.normal_map_bind_group_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::TextureView(view),
        }],
    })
}

fn solid_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    format: wgpu::TextureFormat,
    texel: [u8; 4],
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    write_rgba(queue, &texture, 1, 1, &texel);
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
