//! Draw recording: the seam between the draw orchestrator and a graphics backend.
//!
//! The orchestrator never talks to the GPU directly. It opens a pass, emits one
//! [`PatchDraw`] per visible patch and closes the pass, all through a
//! [`PatchDrawSink`]. [`PatchDrawList`] records those calls so a backend can
//! replay them later inside a render pass.

use crate::handle::{BufferHandle, TextureHandle};
use crate::scatter::ScatterUniform;
use crate::uniforms::{PassUniform, PatchDrawUniform};

/// Which shader program a pass runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Water sub-meshes.
    Water,
    /// Terrain surface and skirts.
    Terrain,
}

/// Material textures bound for a whole pass. `None` binds the backend's fallback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassTextures {
    /// Color lookup map.
    pub color_map: Option<TextureHandle>,
    /// Detail texture.
    pub surface: Option<TextureHandle>,
}

/// Program state for one pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassSetup {
    /// Program to run.
    pub kind: PassKind,
    /// Pass textures.
    pub textures: PassTextures,
    /// Pass-global uniforms.
    pub uniform: PassUniform,
    /// Scattering uniforms, `None` when the planet has no atmosphere.
    pub scatter: Option<ScatterUniform>,
}

/// One indexed draw of a patch or its water sub-mesh.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchDraw {
    /// Program the draw belongs to.
    pub kind: PassKind,
    /// Vertex buffer.
    pub vertex: BufferHandle,
    /// Index buffer.
    pub index: BufferHandle,
    /// Indices to draw from the start of the index buffer.
    pub index_count: u32,
    /// Normal map, terrain draws only.
    pub normal_map: Option<TextureHandle>,
    /// Transform.
    pub transform: PatchDrawUniform,
}

/// Receives the orchestrator's pass and draw calls in order.
pub trait PatchDrawSink {
    /// Bind a program and its pass-global state.
    fn begin_pass(&mut self, setup: &PassSetup);

    /// Issue one draw inside the current pass.
    fn draw_patch(&mut self, draw: &PatchDraw);

    /// Unbind the current program.
    fn end_pass(&mut self);
}

impl<S: PatchDrawSink + ?Sized> PatchDrawSink for &mut S {
    fn begin_pass(&mut self, setup: &PassSetup) {
        (**self).begin_pass(setup);
    }

    fn draw_patch(&mut self, draw: &PatchDraw) {
        (**self).draw_patch(draw);
    }

    fn end_pass(&mut self) {
        (**self).end_pass();
    }
}

/// A recorded sink call.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    /// A pass was opened.
    BeginPass(PassSetup),
    /// A patch was drawn.
    Draw(PatchDraw),
    /// The current pass was closed.
    EndPass,
}

/// Sink that records every call for later replay.
#[derive(Clone, Debug, Default)]
pub struct PatchDrawList {
    commands: Vec<DrawCommand>,
}

impl PatchDrawList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded commands in call order.
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Iterate over recorded draws, skipping pass boundaries.
    pub fn draws(&self) -> impl Iterator<Item = &PatchDraw> {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Draw(d) => Some(d),
            _ => None,
        })
    }

    /// Iterate over recorded pass setups.
    pub fn passes(&self) -> impl Iterator<Item = &PassSetup> {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::BeginPass(p) => Some(p),
            _ => None,
        })
    }

    /// Number of recorded draws.
    pub fn draw_count(&self) -> usize {
        self.draws().count()
    }

    /// Number of recorded passes.
    pub fn pass_count(&self) -> usize {
        self.passes().count()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Clear for reuse next frame, keeping allocated capacity.
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl PatchDrawSink for PatchDrawList {
    fn begin_pass(&mut self, setup: &PassSetup) {
        self.commands.push(DrawCommand::BeginPass(*setup));
    }

    fn draw_patch(&mut self, draw: &PatchDraw) {
        self.commands.push(DrawCommand::Draw(*draw));
    }

    fn end_pass(&mut self) {
        self.commands.push(DrawCommand::EndPass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DVec3, Mat4, Vec3};

    fn setup(kind: PassKind) -> PassSetup {
        PassSetup {
            kind,
            textures: PassTextures::default(),
            uniform: PassUniform::terrain(Vec3::Y, 1.0, 0.0),
            scatter: None,
        }
    }

    fn draw(kind: PassKind, raw: u32) -> PatchDraw {
        PatchDraw {
            kind,
            vertex: BufferHandle::new(raw),
            index: BufferHandle::new(raw + 1),
            index_count: 6,
            normal_map: None,
            transform: PatchDrawUniform::new(Mat4::IDENTITY, DVec3::ZERO, Mat4::IDENTITY),
        }
    }

    #[test]
    fn test_records_in_call_order() {
        let mut list = PatchDrawList::new();
        list.begin_pass(&setup(PassKind::Water));
        list.draw_patch(&draw(PassKind::Water, 0));
        list.end_pass();
        list.begin_pass(&setup(PassKind::Terrain));
        list.draw_patch(&draw(PassKind::Terrain, 2));
        list.draw_patch(&draw(PassKind::Terrain, 4));
        list.end_pass();

        assert_eq!(list.pass_count(), 2);
        assert_eq!(list.draw_count(), 3);
        assert!(matches!(list.commands()[0], DrawCommand::BeginPass(p) if p.kind == PassKind::Water));
        assert!(matches!(list.commands()[2], DrawCommand::EndPass));
        let vertices: Vec<u32> = list.draws().map(|d| d.vertex.index()).collect();
        assert_eq!(vertices, vec![0, 2, 4]);
    }

    #[test]
    fn test_clear_keeps_nothing() {
        let mut list = PatchDrawList::new();
        list.begin_pass(&setup(PassKind::Terrain));
        list.end_pass();
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.pass_count(), 0);
    }

    #[test]
    fn test_sink_through_mut_ref() {
        fn record(mut sink: impl PatchDrawSink) {
            sink.begin_pass(&setup(PassKind::Terrain));
            sink.end_pass();
        }
        let mut list = PatchDrawList::new();
        record(&mut list);
        assert_eq!(list.commands().len(), 2);
    }
}
