//! Where patch handles come from and where recorded frames go.
//!
//! With an adapter the demo uploads into a [`GpuResourcePool`] and replays each
//! frame into an offscreen target. Without one it hands out placeholder
//! handles and only logs what would have been released.

use terra_config::{DemoConfig, PatchRenderConfig};
use terra_patch::gpu::{DEPTH_FORMAT, GpuResourcePool, PatchRenderer};
use terra_patch::{
    BufferHandle, PatchBuffers, PatchDrawList, PatchMesh, RecycleLog, ResourceRecycler,
    TextureHandle, WaterMesh,
};
use tracing::{info, warn};

use crate::error::DemoError;
use crate::synthetic::{NORMAL_MAP_SIZE, PatchGeometry};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Uploads synthetic patches and consumes recorded frames.
pub(crate) trait DemoBackend: ResourceRecycler {
    /// Turn CPU geometry into a patch mesh holding live handles.
    fn upload(&mut self, geometry: &PatchGeometry) -> Result<PatchMesh, DemoError>;

    /// Consume one frame's recorded draws.
    fn present(&mut self, list: &PatchDrawList);

    /// Log end-of-run resource totals.
    fn report(&self);
}

/// Offscreen wgpu backend.
pub(crate) struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pool: GpuResourcePool,
    renderer: PatchRenderer,
    color: wgpu::TextureView,
    depth: wgpu::TextureView,
    skipped_draws: u64,
}

impl GpuBackend {
    /// Open a headless device. Returns `Ok(None)` when there is no adapter.
    pub(crate) fn new(
        demo: &DemoConfig,
        render: &PatchRenderConfig,
    ) -> Result<Option<Self>, DemoError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let Some(adapter) = pollster::block_on(instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        ))
        .ok() else {
            return Ok(None);
        };

        let info = adapter.get_info();
        info!(
            "Selected GPU: {} ({:?}, {:?})",
            info.name, info.backend, info.device_type
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("terra-demo-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))?;

        let renderer = PatchRenderer::new(&device, &queue, COLOR_FORMAT, render);
        let size = wgpu::Extent3d {
            width: demo.width.max(1),
            height: demo.height.max(1),
            depth_or_array_layers: 1,
        };
        let color = offscreen_target(&device, "terra-demo-color", size, COLOR_FORMAT);
        let depth = offscreen_target(&device, "terra-demo-depth", size, DEPTH_FORMAT);

        Ok(Some(Self {
            device,
            queue,
            pool: GpuResourcePool::new(),
            renderer,
            color,
            depth,
            skipped_draws: 0,
        }))
    }
}

impl ResourceRecycler for GpuBackend {
    fn free_buffer(&mut self, buffer: BufferHandle) {
        self.pool.free_buffer(buffer);
    }

    fn recycle_normal_map(&mut self, texture: TextureHandle) {
        self.pool.recycle_normal_map(texture);
    }
}

impl DemoBackend for GpuBackend {
    fn upload(&mut self, geometry: &PatchGeometry) -> Result<PatchMesh, DemoError> {
        upload_geometry(&mut self.pool, &self.device, &self.queue, geometry)
    }

    fn present(&mut self, list: &PatchDrawList) {
        let stats = self
            .renderer
            .prepare(&self.device, &self.queue, list, &self.pool);
        self.skipped_draws += u64::from(stats.skipped);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("terra-demo-frame"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("terra-patch-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            self.renderer.render(&mut pass);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        if let Err(err) = self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        }) {
            warn!("Waiting for patch frame failed: {err}");
        }
    }

    fn report(&self) {
        info!(
            "GPU pool: {} buffers live, {} free, {} textures live, {} normal maps free, {} / {} bytes in use",
            self.pool.live_buffer_count(),
            self.pool.free_buffer_count(),
            self.pool.live_texture_count(),
            self.pool.free_normal_map_count(),
            self.pool.gpu_memory_in_use(),
            self.pool.gpu_memory_allocated(),
        );
        if self.skipped_draws > 0 {
            info!("{} draws skipped by the renderer", self.skipped_draws);
        }
    }
}

/// Upload terrain, normal map and water for one patch. On failure everything
/// uploaded so far goes back to the pool.
fn upload_geometry(
    pool: &mut GpuResourcePool,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    geometry: &PatchGeometry,
) -> Result<PatchMesh, DemoError> {
    let terrain = pool.upload_patch(
        device,
        queue,
        &geometry.vertices,
        &geometry.indices,
        geometry.surface_index_count,
    )?;
    let (vertex, index) = (terrain.vertex, terrain.index);
    let release_terrain = move |pool: &mut GpuResourcePool| {
        pool.free_buffer(vertex);
        pool.free_buffer(index);
    };

    let normal_map = match pool.create_normal_map(
        device,
        queue,
        NORMAL_MAP_SIZE,
        NORMAL_MAP_SIZE,
        &geometry.normal_map,
    ) {
        Ok(normal_map) => normal_map,
        Err(err) => {
            release_terrain(pool);
            return Err(err.into());
        }
    };

    let mut mesh = PatchMesh::new(geometry.bounds, terrain).with_normal_map(normal_map);
    if let Some((vertices, indices)) = &geometry.water {
        match pool.upload_water(device, queue, vertices, indices) {
            Ok(water) => mesh = mesh.with_water(water),
            Err(err) => {
                release_terrain(pool);
                pool.recycle_normal_map(normal_map);
                return Err(err.into());
            }
        }
    }
    Ok(mesh)
}

fn offscreen_target(
    device: &wgpu::Device,
    label: &str,
    size: wgpu::Extent3d,
    format: wgpu::TextureFormat,
) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

/// Backend with no device behind the handles.
#[derive(Default)]
pub(crate) struct HeadlessBackend {
    next_handle: u32,
    buffers_issued: usize,
    log: RecycleLog,
    draws: u64,
}

impl HeadlessBackend {
    fn buffer(&mut self) -> BufferHandle {
        self.next_handle += 1;
        self.buffers_issued += 1;
        BufferHandle::new(self.next_handle)
    }

    /// Buffer handles handed out so far.
    pub(crate) fn buffers_issued(&self) -> usize {
        self.buffers_issued
    }

    /// Everything released so far.
    pub(crate) fn recycle_log(&self) -> &RecycleLog {
        &self.log
    }
}

impl ResourceRecycler for HeadlessBackend {
    fn free_buffer(&mut self, buffer: BufferHandle) {
        self.log.free_buffer(buffer);
    }

    fn recycle_normal_map(&mut self, texture: TextureHandle) {
        self.log.recycle_normal_map(texture);
    }
}

impl DemoBackend for HeadlessBackend {
    fn upload(&mut self, geometry: &PatchGeometry) -> Result<PatchMesh, DemoError> {
        let terrain = PatchBuffers {
            vertex: self.buffer(),
            index: self.buffer(),
            index_count: geometry.indices.len() as u32,
            surface_index_count: geometry.surface_index_count,
        };
        self.next_handle += 1;
        let normal_map = TextureHandle::new(self.next_handle);

        let mut mesh = PatchMesh::new(geometry.bounds, terrain).with_normal_map(normal_map);
        if let Some((_, indices)) = &geometry.water {
            let water = WaterMesh {
                vertex: self.buffer(),
                index: self.buffer(),
                index_count: indices.len() as u32,
            };
            mesh = mesh.with_water(water);
        }
        Ok(mesh)
    }

    fn present(&mut self, list: &PatchDrawList) {
        self.draws += list.draw_count() as u64;
    }

    fn report(&self) {
        info!(
            "Headless run: {} draws recorded, {} buffers freed, {} normal maps recycled",
            self.draws,
            self.log.freed_buffers().len(),
            self.log.recycled_normal_maps().len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticTerrain;

    fn test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions::default())
                .await
                .ok()?;
            adapter
                .request_device(&wgpu::DeviceDescriptor::default())
                .await
                .ok()
        })
    }

    fn geometry() -> PatchGeometry {
        SyntheticTerrain::new(7, 1_000_000.0, 1).far_patch(0.0, 0.0, 1_000.0)
    }

    #[test]
    fn test_failed_normal_map_returns_terrain_buffers() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut pool = GpuResourcePool::new();
        let mut patch = geometry();
        patch.normal_map.truncate(4);

        let result = upload_geometry(&mut pool, &device, &queue, &patch);
        assert!(matches!(result, Err(DemoError::Upload(_))));
        assert_eq!(pool.live_buffer_count(), 0);
        assert_eq!(pool.free_buffer_count(), 2);
        assert_eq!(pool.gpu_memory_in_use(), 0);
    }

    #[test]
    fn test_failed_water_returns_terrain_and_normal_map() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut pool = GpuResourcePool::new();
        let mut patch = geometry();
        patch.water = Some((Vec::new(), Vec::new()));

        let result = upload_geometry(&mut pool, &device, &queue, &patch);
        assert!(matches!(result, Err(DemoError::Upload(_))));
        assert_eq!(pool.live_buffer_count(), 0);
        assert_eq!(pool.live_texture_count(), 0);
        assert_eq!(pool.free_normal_map_count(), 1);
        assert_eq!(pool.gpu_memory_in_use(), 0);
    }

    #[test]
    fn test_gpu_backend_presents_and_recycles() {
        let demo = DemoConfig {
            width: 64,
            height: 64,
            ..DemoConfig::default()
        };
        let Ok(Some(mut backend)) = GpuBackend::new(&demo, &PatchRenderConfig::default()) else {
            return;
        };
        let mesh = backend.upload(&geometry()).unwrap();
        backend.present(&PatchDrawList::new());
        let expected = if mesh.has_water() { 4 } else { 2 };
        assert_eq!(backend.pool.live_buffer_count(), expected);

        let terrain = mesh.terrain().cloned().unwrap();
        backend.free_buffer(terrain.vertex);
        backend.free_buffer(terrain.index);
        if let Some(normal_map) = mesh.normal_map() {
            backend.recycle_normal_map(normal_map);
        }
        if let Some(water) = mesh.water().cloned() {
            backend.free_buffer(water.vertex);
            backend.free_buffer(water.index);
        }
        assert_eq!(backend.pool.live_buffer_count(), 0);
    }

    #[test]
    fn test_upload_keeps_every_handle_live() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut pool = GpuResourcePool::new();
        let mesh = upload_geometry(&mut pool, &device, &queue, &geometry()).unwrap();
        let terrain = mesh.terrain().unwrap();
        assert!(pool.buffer(terrain.vertex).is_some());
        assert!(pool.buffer(terrain.index).is_some());
        assert!(pool.texture_view(mesh.normal_map().unwrap()).is_some());
    }
}
