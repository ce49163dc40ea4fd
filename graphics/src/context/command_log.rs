//! The per-context command log.
//!
//! Draws and dispatches become [`InvokeCommand`]s grouped into
//! [`PassBatch`]es and [`PipelineBatch`]es. Clears, copies and debug markers
//! go to a separate side log; each entry records how many invokes were issued
//! before it, which is all replay needs to restore the original interleaving.

use std::ops::Range;
use std::sync::Arc;

use ash::vk;

use super::state::{BindingTable, IndexBinding, PendingClears, RenderTargets, VertexBinding};
use crate::backend::GpuBuffer;
use crate::resources::{Buffer, Shader, ShaderId, Texture};
use crate::types::{Extent3d, PipelineState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Render,
    Compute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    DrawIndexed {
        first_index: u32,
        index_count: u32,
        base_vertex: i32,
        instance_count: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
}

/// Frozen context state for one draw or dispatch.
#[derive(Debug, Clone)]
pub struct InvokeCommand {
    pub(crate) kind: InvokeKind,
    pub(crate) shader: Arc<Shader>,
    pub(crate) bindings: Arc<BindingTable>,
    pub(crate) vertex_buffers: Vec<Option<VertexBinding>>,
    pub(crate) index_buffer: Option<IndexBinding>,
    /// Selects the physical slot of multi-frame buffers.
    pub(crate) frame_index: usize,
    /// Already flipped.
    pub(crate) viewport: vk::Viewport,
    pub(crate) scissor: vk::Rect2D,
    pub(crate) stencil_reference: u32,
}

impl InvokeCommand {
    pub fn kind(&self) -> InvokeKind {
        self.kind
    }

    pub fn shader(&self) -> &Arc<Shader> {
        &self.shader
    }

    pub fn viewport(&self) -> vk::Viewport {
        self.viewport
    }
}

/// Invokes inside one pass batch that share a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineBatch {
    pub(crate) shader: ShaderId,
    pub(crate) state: PipelineState,
    pub(crate) invokes: Range<usize>,
}

impl PipelineBatch {
    pub fn shader(&self) -> ShaderId {
        self.shader
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn invoke_count(&self) -> usize {
        self.invokes.len()
    }
}

/// Invokes sharing one render pass and framebuffer, or one compute bracket.
#[derive(Debug, Clone)]
pub struct PassBatch {
    pub(crate) kind: PassKind,
    pub(crate) targets: RenderTargets,
    /// Clears applied as load operations when the pass begins.
    pub(crate) clears: PendingClears,
    pub(crate) writes_depth_stencil: bool,
    pub(crate) pipelines: Vec<PipelineBatch>,
    pub(crate) invokes: Range<usize>,
}

impl PassBatch {
    pub fn kind(&self) -> PassKind {
        self.kind
    }

    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    pub fn clears(&self) -> &PendingClears {
        &self.clears
    }

    pub fn pipeline_batches(&self) -> &[PipelineBatch] {
        &self.pipelines
    }

    pub fn invoke_count(&self) -> usize {
        self.invokes.len()
    }

    /// Whether any invoke writes depth or stencil, or the pass clears them.
    pub fn writes_depth_stencil(&self) -> bool {
        self.writes_depth_stencil || self.clears.depth.is_some() || self.clears.stencil.is_some()
    }

    /// The smallest width and height across the attached targets.
    pub fn render_area(&self) -> Extent3d {
        self.targets.extent()
    }
}

/// A deferred clear of one texture outside any pass.
#[derive(Debug, Clone)]
pub struct ClearCommand {
    pub(crate) target: Arc<Texture>,
    pub(crate) color: Option<[f32; 4]>,
    pub(crate) depth: Option<f32>,
    pub(crate) stencil: Option<u32>,
}

impl ClearCommand {
    pub fn target(&self) -> &Arc<Texture> {
        &self.target
    }

    pub fn color(&self) -> Option<[f32; 4]> {
        self.color
    }

    pub fn depth(&self) -> Option<f32> {
        self.depth
    }

    pub fn stencil(&self) -> Option<u32> {
        self.stencil
    }
}

/// Source of a buffer copy.
#[derive(Debug)]
pub enum BufferSource {
    /// Transient upload buffer owned by the log entry.
    Staging(GpuBuffer),
    Buffer { buffer: Arc<Buffer>, frame_index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyKind {
    BufferToBuffer,
    BufferToTexture,
    TextureToTexture,
    TextureToBuffer,
    Blit,
}

#[derive(Debug)]
pub enum CopyCommand {
    BufferToBuffer {
        src: BufferSource,
        src_offset: u64,
        dst: Arc<Buffer>,
        dst_frame_index: usize,
        dst_offset: u64,
        size: u64,
    },
    BufferToTexture {
        src: BufferSource,
        dst: Arc<Texture>,
    },
    TextureToTexture {
        src: Arc<Texture>,
        dst: Arc<Texture>,
    },
    TextureToBuffer {
        src: Arc<Texture>,
        dst: Arc<Buffer>,
        dst_frame_index: usize,
    },
    Blit {
        src: Arc<Texture>,
        dst: Arc<Texture>,
    },
}

impl CopyCommand {
    pub fn kind(&self) -> CopyKind {
        match self {
            Self::BufferToBuffer { .. } => CopyKind::BufferToBuffer,
            Self::BufferToTexture { .. } => CopyKind::BufferToTexture,
            Self::TextureToTexture { .. } => CopyKind::TextureToTexture,
            Self::TextureToBuffer { .. } => CopyKind::TextureToBuffer,
            Self::Blit { .. } => CopyKind::Blit,
        }
    }
}

#[derive(Debug)]
pub enum SideCommand {
    Clear(ClearCommand),
    Copy(CopyCommand),
    PushMarker(String),
    PopMarker,
}

#[derive(Debug)]
pub(crate) struct SideEntry {
    /// Number of invokes issued before this command.
    pub(crate) invokes_before: usize,
    pub(crate) command: SideCommand,
}

/// Everything recorded between `begin()` and `end()`.
#[derive(Debug, Default)]
pub struct CommandLog {
    pub(crate) invokes: Vec<InvokeCommand>,
    pub(crate) passes: Vec<PassBatch>,
    pub(crate) side: Vec<SideEntry>,
    /// Set when a clear or copy lands after the last invoke, so the next draw
    /// cannot continue the open pass.
    pub(crate) pass_broken: bool,
}

impl CommandLog {
    pub fn pass_batches(&self) -> &[PassBatch] {
        &self.passes
    }

    pub fn invokes(&self) -> &[InvokeCommand] {
        &self.invokes
    }

    pub fn clears(&self) -> impl Iterator<Item = &ClearCommand> {
        self.side.iter().filter_map(|entry| match &entry.command {
            SideCommand::Clear(clear) => Some(clear),
            _ => None,
        })
    }

    pub fn copies(&self) -> impl Iterator<Item = &CopyCommand> {
        self.side.iter().filter_map(|entry| match &entry.command {
            SideCommand::Copy(copy) => Some(copy),
            _ => None,
        })
    }

    pub fn marker_count(&self) -> usize {
        self.side
            .iter()
            .filter(|e| matches!(e.command, SideCommand::PushMarker(_) | SideCommand::PopMarker))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.invokes.is_empty() && self.side.is_empty()
    }

    pub(crate) fn push_side(&mut self, command: SideCommand) {
        if !matches!(command, SideCommand::PushMarker(_) | SideCommand::PopMarker) {
            self.pass_broken = true;
        }
        self.side.push(SideEntry {
            invokes_before: self.invokes.len(),
            command,
        });
    }

    /// Append an invoke, opening a new pass batch when it cannot join the
    /// last one and a new pipeline batch when the pipeline changes.
    pub(crate) fn push_invoke(
        &mut self,
        invoke: InvokeCommand,
        kind: PassKind,
        targets: &RenderTargets,
        clears: PendingClears,
        state: PipelineState,
    ) {
        let index = self.invokes.len();
        let shader = invoke.shader.id();
        let writes_depth_stencil = state.writes_depth() || state.writes_stencil();

        let joins_pass = !self.pass_broken
            && clears.is_empty()
            && self.passes.last().is_some_and(|pass| {
                pass.kind == kind && (kind == PassKind::Compute || pass.targets.same_targets(targets))
            });

        if !joins_pass {
            self.passes.push(PassBatch {
                kind,
                targets: targets.clone(),
                clears,
                writes_depth_stencil: false,
                pipelines: Vec::new(),
                invokes: index..index,
            });
        }
        self.pass_broken = false;

        let Some(pass) = self.passes.last_mut() else {
            unreachable!("a pass batch was just ensured");
        };
        pass.writes_depth_stencil |= writes_depth_stencil;
        pass.invokes.end = index + 1;

        // Compute pipelines depend on the shader alone.
        let same_pipeline = |batch: &PipelineBatch| {
            batch.shader == shader && (kind == PassKind::Compute || batch.state == state)
        };
        match pass.pipelines.last_mut() {
            Some(batch) if same_pipeline(batch) => batch.invokes.end = index + 1,
            _ => pass.pipelines.push(PipelineBatch {
                shader,
                state,
                invokes: index..index + 1,
            }),
        }

        self.invokes.push(invoke);
    }

    pub(crate) fn clear(&mut self) {
        self.invokes.clear();
        self.passes.clear();
        self.side.clear();
        self.pass_broken = false;
    }
}
