//! Graphics context: the stateful recording API.
//!
//! A [`GraphicsContext`] accumulates draws, dispatches, clears and copies
//! between [`begin`](GraphicsContext::begin) and
//! [`end`](GraphicsContext::end). Nothing reaches the GPU until `end()`,
//! which resolves pipelines, render passes and descriptor sets through the
//! device caches, inserts barriers and records the native commands.
//!
//! State-setting calls only mutate the pending pipeline description. Draws
//! freeze the current state into the command log, opening a new pass or
//! pipeline batch only when that state differs from the previous draw.
//!
//! # Example
//!
//! ```ignore
//! device.begin_frame()?;
//! let mut ctx = device.create_context();
//! ctx.begin();
//! ctx.set_render_targets(&[color.clone()], Some(&depth));
//! ctx.clear_render_target(0, [0.0, 0.0, 0.0, 1.0]);
//! ctx.clear_depth_buffer(1.0);
//! ctx.bind_shader(&shader);
//! ctx.bind_buffer(&camera, "camera");
//! ctx.bind_vertex_buffer(0, &vertices, 0);
//! ctx.bind_index_buffer(&indices, IndexFormat::Uint32, 0);
//! ctx.draw_indexed(PrimitiveType::Triangles, 0, 36, 0);
//! ctx.end()?;
//! device.end_frame()?;
//! ```

mod command_log;
mod replay;
mod state;

use std::sync::Arc;

pub use command_log::{
    BufferSource, ClearCommand, CommandLog, CopyCommand, CopyKind, InvokeCommand, InvokeKind,
    PassBatch, PassKind, PipelineBatch, SideCommand,
};
pub use state::{
    BindingTable, BoundResource, IndexBinding, PendingClears, RenderTargets, VertexBinding,
};

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::profiling::GpuTimer;
use crate::resources::{Buffer, ResourceBinding, Shader, Texture};
use crate::types::{
    BlendComponent, BlendFactor, BlendOp, BufferUsage, ColorWrites, CompareFunction, CullMode,
    FillMode, FrontFace, IndexFormat, PipelineState, PrimitiveType, Rect, StencilOp, TextureUsage,
    Viewport,
};
use replay::{Replayed, Replayer};

/// Maximum number of color targets bound at once.
pub const MAX_COLOR_TARGETS: usize = 8;

/// A per-thread command recorder.
///
/// Contexts are cheap; create one per recording thread. Resources are only
/// referenced, never owned: the log keeps them alive until `end()`.
pub struct GraphicsContext {
    device: Arc<GraphicsDevice>,
    recording: bool,
    log: CommandLog,

    state: PipelineState,
    shader: Option<Arc<Shader>>,
    bindings: Arc<BindingTable>,
    vertex_buffers: Vec<Option<VertexBinding>>,
    index_buffer: Option<IndexBinding>,
    targets: RenderTargets,
    clears: PendingClears,
    viewport: Viewport,
    scissor: Rect,
    stencil_reference: u32,

    timer: Option<Arc<GpuTimer>>,
    memory_barrier: bool,
}

impl GraphicsContext {
    pub(crate) fn new(device: Arc<GraphicsDevice>) -> Self {
        Self {
            device,
            recording: false,
            log: CommandLog::default(),
            state: PipelineState::default(),
            shader: None,
            bindings: Arc::default(),
            vertex_buffers: Vec::new(),
            index_buffer: None,
            targets: RenderTargets::default(),
            clears: PendingClears::default(),
            viewport: Viewport::new(0.0, 0.0, 0.0, 0.0),
            scissor: Rect::default(),
            stencil_reference: 0,
            timer: None,
            memory_barrier: false,
        }
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// The commands recorded since `begin()`.
    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Start recording, resetting all pending state.
    ///
    /// # Panics
    ///
    /// Panics if the context is already recording.
    pub fn begin(&mut self) {
        assert!(!self.recording, "begin called on a context that was not ended");

        self.log.clear();
        self.state = PipelineState::default();
        self.shader = None;
        self.bindings = Arc::default();
        self.vertex_buffers.clear();
        self.index_buffer = None;
        self.targets = RenderTargets::default();
        self.clears = PendingClears::default();
        self.viewport = Viewport::new(0.0, 0.0, 0.0, 0.0);
        self.scissor = Rect::default();
        self.stencil_reference = 0;
        self.memory_barrier = false;
        self.recording = true;
    }

    /// Replay the log into the device's current frame.
    ///
    /// # Errors
    ///
    /// Returns an error if a native object cannot be created or the backend
    /// rejects a value. The log is dropped either way, and the device's
    /// resource states are left as they were before the call.
    ///
    /// # Panics
    ///
    /// Panics if the context is not recording or no device frame is active.
    pub fn end(&mut self) -> Result<(), GraphicsError> {
        ember_core::profile_scope!("GraphicsContext::end");
        assert!(self.recording, "end called on a context that was not begun");
        assert!(
            self.device.is_frame_active(),
            "end must be called between begin_frame and end_frame"
        );
        self.recording = false;
        self.flush_pending_clears();

        let memory_barrier = std::mem::take(&mut self.memory_barrier);

        // Commands must reach the backend in the order the tracker saw them.
        // Replay works on a copy that only replaces the shared states once
        // the backend has accepted the commands.
        let mut tracker = self.device.state_tracker().lock();
        let mut scratch = tracker.clone();
        let result = Replayer::new(&self.device, &mut scratch).replay(
            &mut self.log,
            self.timer.as_deref(),
            memory_barrier,
        );
        self.log.clear();
        let Replayed { commands, staging } = result?;

        log::trace!("Recording {} native commands", commands.len());
        self.device.backend().record(&commands)?;
        *tracker = scratch;
        drop(tracker);
        drop(staging);
        Ok(())
    }

    /// Drop everything recorded since `begin()` without submitting it.
    pub fn discard(&mut self) {
        self.log.clear();
        self.memory_barrier = false;
        self.recording = false;
    }

    // ------------------------------------------------------------------
    // Fixed-function state
    // ------------------------------------------------------------------

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn set_scissor(&mut self, scissor: Rect) {
        self.scissor = scissor;
    }

    pub fn set_blend(&mut self, enabled: bool) {
        self.state.blend.enabled = enabled;
    }

    /// Set the color blend equation and, optionally, a separate alpha one.
    ///
    /// # Panics
    ///
    /// Panics if an alpha equation is given while the color op is
    /// [`BlendOp::None`].
    pub fn set_blend_func(
        &mut self,
        src: BlendFactor,
        dst: BlendFactor,
        op: BlendOp,
        alpha: Option<(BlendFactor, BlendFactor, BlendOp)>,
    ) {
        assert!(
            alpha.is_none() || op != BlendOp::None,
            "a separate alpha blend equation needs a color blend op"
        );
        let color = BlendComponent { src, dst, op };
        self.state.blend.color = color;
        self.state.blend.alpha = alpha
            .map(|(src, dst, op)| BlendComponent { src, dst, op })
            .unwrap_or(color);
    }

    pub fn set_color_write_mask(&mut self, writes: ColorWrites) {
        self.state.color_writes = writes;
    }

    pub fn set_depth_test(&mut self, enabled: bool, write: bool, compare: CompareFunction) {
        self.state.depth.test_enabled = enabled;
        self.state.depth.write_enabled = write;
        self.state.depth.compare = compare;
    }

    pub fn set_cull_mode(&mut self, mode: CullMode) {
        self.state.cull_mode = mode;
    }

    pub fn set_front_face(&mut self, face: FrontFace) {
        self.state.front_face = face;
    }

    pub fn set_fill_mode(&mut self, mode: FillMode) {
        self.state.fill_mode = mode;
    }

    pub fn set_stencil_test(&mut self, enabled: bool) {
        self.state.stencil.enabled = enabled;
    }

    /// Set the stencil comparison. The reference value is dynamic state and
    /// does not split pipeline batches.
    pub fn set_stencil_func(
        &mut self,
        compare: CompareFunction,
        reference: u32,
        read_mask: u8,
        write_mask: u8,
    ) {
        self.state.stencil.compare = compare;
        self.state.stencil.read_mask = read_mask;
        self.state.stencil.write_mask = write_mask;
        self.stencil_reference = reference;
    }

    pub fn set_stencil_op(&mut self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        self.state.stencil.fail_op = fail;
        self.state.stencil.depth_fail_op = depth_fail;
        self.state.stencil.pass_op = pass;
    }

    // ------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------

    /// Make `shader` current. Resource bindings are reset if it differs from
    /// the bound one.
    pub fn bind_shader(&mut self, shader: &Arc<Shader>) {
        if self.shader.as_ref().is_some_and(|s| s.id() == shader.id()) {
            return;
        }
        self.shader = Some(Arc::clone(shader));
        self.bindings = Arc::default();
    }

    /// Bind a buffer to the slot the current shader names `name`.
    ///
    /// Does nothing if the shader does not declare `name`.
    ///
    /// # Panics
    ///
    /// Panics if no shader is bound or the slot is not a buffer slot.
    pub fn bind_buffer(&mut self, buffer: &Arc<Buffer>, name: &str) {
        let Some(location) = self.locate(name) else {
            return;
        };
        assert!(
            location.kind.is_buffer(),
            "shader slot {name:?} is a {:?}, not a buffer",
            location.kind
        );
        Arc::make_mut(&mut self.bindings).bind(
            location.set,
            location.binding,
            BoundResource::Buffer(Arc::clone(buffer)),
        );
    }

    /// Bind a texture to the slot the current shader names `name`.
    ///
    /// Does nothing if the shader does not declare `name`.
    ///
    /// # Panics
    ///
    /// Panics if no shader is bound or the slot is a buffer slot.
    pub fn bind_texture(&mut self, texture: &Arc<Texture>, name: &str) {
        let Some(location) = self.locate(name) else {
            return;
        };
        assert!(
            !location.kind.is_buffer(),
            "shader slot {name:?} is a {:?}, not a texture",
            location.kind
        );
        Arc::make_mut(&mut self.bindings).bind(
            location.set,
            location.binding,
            BoundResource::Texture(Arc::clone(texture)),
        );
    }

    fn locate(&self, name: &str) -> Option<ResourceBinding> {
        let Some(shader) = &self.shader else {
            panic!("bind {name:?} without a bound shader");
        };
        let location = shader.reflection().location(name);
        if location.is_none() {
            log::debug!(
                "Shader {:?} does not declare {:?}; binding ignored",
                shader.label(),
                name
            );
        }
        location
    }

    pub fn bind_vertex_buffer(&mut self, slot: u32, buffer: &Arc<Buffer>, offset: u64) {
        debug_assert!(buffer.usage().contains(BufferUsage::VERTEX));
        let slot = slot as usize;
        if self.vertex_buffers.len() <= slot {
            self.vertex_buffers.resize(slot + 1, None);
        }
        self.vertex_buffers[slot] = Some(VertexBinding {
            buffer: Arc::clone(buffer),
            offset,
        });
    }

    pub fn bind_index_buffer(&mut self, buffer: &Arc<Buffer>, format: IndexFormat, offset: u64) {
        debug_assert!(buffer.usage().contains(BufferUsage::INDEX));
        self.index_buffer = Some(IndexBinding {
            buffer: Arc::clone(buffer),
            format,
            offset,
        });
    }

    // ------------------------------------------------------------------
    // Render targets and clears
    // ------------------------------------------------------------------

    /// Bind render targets and reset viewport and scissor to the area
    /// covered by all of them.
    ///
    /// Clears requested on the previous targets that no draw consumed are
    /// moved to the command log first.
    pub fn set_render_targets(&mut self, colors: &[Arc<Texture>], depth_stencil: Option<&Arc<Texture>>) {
        assert!(
            colors.len() <= MAX_COLOR_TARGETS,
            "at most {MAX_COLOR_TARGETS} color targets can be bound"
        );
        for texture in colors.iter().chain(depth_stencil) {
            assert!(
                texture.usage().contains(TextureUsage::RENDER_ATTACHMENT),
                "texture {:?} is not a render attachment",
                texture.label()
            );
        }
        assert!(colors.iter().all(|t| !t.format().is_depth_stencil()));
        assert!(depth_stencil.is_none_or(|t| t.format().is_depth_stencil()));

        self.flush_pending_clears();

        self.targets = RenderTargets {
            colors: colors.to_vec(),
            depth_stencil: depth_stencil.cloned(),
        };
        self.clears = PendingClears::for_targets(colors.len());

        let extent = self.targets.extent();
        self.viewport = Viewport::new(0.0, 0.0, extent.width as f32, extent.height as f32);
        self.scissor = Rect::from_extent(extent);
    }

    pub fn clear_render_target(&mut self, index: usize, color: [f32; 4]) {
        assert!(
            index < self.targets.colors.len(),
            "no color target bound at index {index}"
        );
        self.clears.colors[index] = Some(color);
    }

    pub fn clear_depth_stencil_buffer(&mut self, depth: f32, stencil: u32) {
        self.assert_depth_target();
        self.clears.depth = Some(depth);
        self.clears.stencil = Some(stencil);
    }

    pub fn clear_depth_buffer(&mut self, depth: f32) {
        self.assert_depth_target();
        self.clears.depth = Some(depth);
    }

    pub fn clear_stencil_buffer(&mut self, stencil: u32) {
        self.assert_depth_target();
        self.clears.stencil = Some(stencil);
    }

    fn assert_depth_target(&self) {
        assert!(
            self.targets.depth_stencil.is_some(),
            "no depth/stencil target bound"
        );
    }

    /// Move clears no draw has consumed into the command log, one clear per
    /// target.
    fn flush_pending_clears(&mut self) {
        let clears = self.clears.take();
        if clears.is_empty() {
            return;
        }

        for (target, color) in self.targets.colors.iter().zip(clears.colors) {
            if let Some(color) = color {
                self.log.push_side(SideCommand::Clear(ClearCommand {
                    target: Arc::clone(target),
                    color: Some(color),
                    depth: None,
                    stencil: None,
                }));
            }
        }
        if let Some(target) = &self.targets.depth_stencil
            && (clears.depth.is_some() || clears.stencil.is_some())
        {
            self.log.push_side(SideCommand::Clear(ClearCommand {
                target: Arc::clone(target),
                color: None,
                depth: clears.depth,
                stencil: clears.stencil,
            }));
        }
    }

    /// Copies see the results of every clear requested before them.
    fn push_copy(&mut self, copy: CopyCommand) {
        self.flush_pending_clears();
        self.log.push_side(SideCommand::Copy(copy));
    }

    // ------------------------------------------------------------------
    // Draws and dispatches
    // ------------------------------------------------------------------

    fn snapshot(&self, kind: InvokeKind, shader: Arc<Shader>) -> InvokeCommand {
        InvokeCommand {
            kind,
            shader,
            bindings: Arc::clone(&self.bindings),
            vertex_buffers: self.vertex_buffers.clone(),
            index_buffer: self.index_buffer.clone(),
            frame_index: self.device.frame_index(),
            viewport: self.viewport.to_vk(),
            scissor: self.scissor.to_vk(),
            stencil_reference: self.stencil_reference,
        }
    }

    pub fn draw_indexed(
        &mut self,
        primitive: PrimitiveType,
        first_index: u32,
        index_count: u32,
        base_vertex: i32,
    ) {
        self.draw_instanced_indexed(primitive, first_index, index_count, base_vertex, 1);
    }

    /// Record an indexed draw with the current state.
    ///
    /// # Panics
    ///
    /// Panics if `index_count` or `instance_count` is zero, or if no
    /// graphics shader, render target or index buffer is bound.
    pub fn draw_instanced_indexed(
        &mut self,
        primitive: PrimitiveType,
        first_index: u32,
        index_count: u32,
        base_vertex: i32,
        instance_count: u32,
    ) {
        assert!(self.recording, "draw outside begin/end");
        assert!(index_count > 0, "draw with zero indices");
        assert!(instance_count > 0, "draw with zero instances");
        let Some(shader) = self.shader.clone() else {
            panic!("draw without a bound shader");
        };
        assert!(!shader.is_compute(), "draw with a compute shader");
        assert!(!self.targets.is_empty(), "draw without render targets");
        assert!(self.index_buffer.is_some(), "indexed draw without an index buffer");

        self.state.primitive = primitive;
        let invoke = self.snapshot(
            InvokeKind::DrawIndexed {
                first_index,
                index_count,
                base_vertex,
                instance_count,
            },
            shader,
        );
        let clears = self.clears.take();
        self.log
            .push_invoke(invoke, PassKind::Render, &self.targets, clears, self.state);
    }

    /// Record a compute dispatch with the current bindings.
    ///
    /// # Panics
    ///
    /// Panics if a group count is zero or no compute shader is bound.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        assert!(self.recording, "dispatch outside begin/end");
        assert!(x > 0 && y > 0 && z > 0, "dispatch with an empty grid");
        let Some(shader) = self.shader.clone() else {
            panic!("dispatch without a bound shader");
        };
        assert!(shader.is_compute(), "dispatch with a graphics shader");

        // Clears requested before the dispatch must land before it.
        self.flush_pending_clears();

        let invoke = self.snapshot(InvokeKind::Dispatch { x, y, z }, shader);
        self.log.push_invoke(
            invoke,
            PassKind::Compute,
            &RenderTargets::default(),
            PendingClears::default(),
            PipelineState::default(),
        );
    }

    // ------------------------------------------------------------------
    // Copies
    // ------------------------------------------------------------------

    /// Write `data` into `buffer` at `offset`.
    ///
    /// Mappable buffers are written immediately through the host mapping of
    /// the current frame's slot. Other buffers get a staging upload and a
    /// copy command replayed at `end()`.
    pub fn copy_to_buffer(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        assert!(
            offset + data.len() as u64 <= buffer.size(),
            "copy of {} bytes at offset {} overflows buffer of {} bytes",
            data.len(),
            offset,
            buffer.size()
        );
        let frame_index = self.device.frame_index();

        if buffer.is_mappable() {
            ember_core::profile_scope!("copy_mapped");
            return self
                .device
                .backend()
                .write_buffer(buffer.slot(frame_index).gpu(), offset, data);
        }

        assert!(
            buffer.usage().contains(BufferUsage::COPY_DST),
            "buffer {:?} is neither mappable nor a copy destination",
            buffer.label()
        );
        let staging = {
            ember_core::profile_scope!("staging_upload");
            self.device.backend().create_staging_buffer(data)?
        };
        self.push_copy(CopyCommand::BufferToBuffer {
            src: BufferSource::Staging(staging),
            src_offset: 0,
            dst: Arc::clone(buffer),
            dst_frame_index: frame_index,
            dst_offset: offset,
            size: data.len() as u64,
        });
        Ok(())
    }

    /// Typed variant of [`copy_to_buffer`](Self::copy_to_buffer).
    pub fn copy_slice_to_buffer<T: bytemuck::Pod>(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: u64,
        data: &[T],
    ) -> Result<(), GraphicsError> {
        self.copy_to_buffer(buffer, offset, bytemuck::cast_slice(data))
    }

    /// Upload the full contents of `texture` through a staging buffer.
    pub fn copy_to_texture(
        &mut self,
        texture: &Arc<Texture>,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        assert!(
            texture.usage().contains(TextureUsage::COPY_DST),
            "texture {:?} is not a copy destination",
            texture.label()
        );
        let expected = texture.width() as usize
            * texture.height() as usize
            * texture.format().bytes_per_texel() as usize;
        assert_eq!(data.len(), expected, "texture upload size mismatch");

        let staging = {
            ember_core::profile_scope!("staging_upload");
            self.device.backend().create_staging_buffer(data)?
        };
        self.push_copy(CopyCommand::BufferToTexture {
            src: BufferSource::Staging(staging),
            dst: Arc::clone(texture),
        });
        Ok(())
    }

    /// Copy `size` bytes between the current frame's slots of two buffers.
    pub fn copy_buffer(&mut self, dst: &Arc<Buffer>, src: &Arc<Buffer>, size: u64) {
        assert!(size <= src.size() && size <= dst.size(), "buffer copy out of range");
        let frame_index = self.device.frame_index();
        self.push_copy(CopyCommand::BufferToBuffer {
            src: BufferSource::Buffer {
                buffer: Arc::clone(src),
                frame_index,
            },
            src_offset: 0,
            dst: Arc::clone(dst),
            dst_frame_index: frame_index,
            dst_offset: 0,
            size,
        });
    }

    /// Copy the overlapping region of two textures.
    pub fn copy_texture(&mut self, dst: &Arc<Texture>, src: &Arc<Texture>) {
        assert_ne!(dst.id(), src.id(), "texture copy onto itself");
        self.push_copy(CopyCommand::TextureToTexture {
            src: Arc::clone(src),
            dst: Arc::clone(dst),
        });
    }

    /// Copy a texture into a buffer, tightly packed.
    pub fn copy_texture_to_buffer(&mut self, dst: &Arc<Buffer>, src: &Arc<Texture>) {
        let needed =
            u64::from(src.width()) * u64::from(src.height()) * u64::from(src.format().bytes_per_texel());
        assert!(dst.size() >= needed, "buffer too small for texture read-back");
        self.push_copy(CopyCommand::TextureToBuffer {
            src: Arc::clone(src),
            dst: Arc::clone(dst),
            dst_frame_index: self.device.frame_index(),
        });
    }

    /// Read a host-readable buffer, blocking until the GPU is idle.
    ///
    /// This stalls the calling thread. The frame that wrote the buffer must
    /// have been submitted.
    pub fn read_buffer(&self, buffer: &Buffer, offset: u64, data: &mut [u8]) -> Result<(), GraphicsError> {
        assert!(
            buffer.usage().contains(BufferUsage::MAP_READ),
            "buffer {:?} is not host readable",
            buffer.label()
        );
        assert_eq!(buffer.slot_count(), 1, "read-back buffers have a single slot");
        ember_core::profile_scope!("read_buffer");
        self.device.wait_idle()?;
        self.device
            .backend()
            .read_buffer(buffer.slot(0).gpu(), offset, data)
    }

    /// Blit the whole of `src` onto the whole of `dst`, scaling as needed.
    pub fn blit(&mut self, src: &Arc<Texture>, dst: &Arc<Texture>) {
        assert_ne!(dst.id(), src.id(), "blit onto itself");
        self.push_copy(CopyCommand::Blit {
            src: Arc::clone(src),
            dst: Arc::clone(dst),
        });
    }

    // ------------------------------------------------------------------
    // Synchronization, markers and timing
    // ------------------------------------------------------------------

    /// Request a full memory barrier after everything this context records.
    pub fn add_memory_barrier(&mut self) {
        self.memory_barrier = true;
    }

    pub fn push_marker(&mut self, name: impl Into<String>) {
        self.log.push_side(SideCommand::PushMarker(name.into()));
    }

    pub fn pop_marker(&mut self) {
        self.log.push_side(SideCommand::PopMarker);
    }

    /// Time the GPU work of every following `end()` with `timer`.
    pub fn set_gpu_timer(&mut self, timer: Option<Arc<GpuTimer>>) {
        self.timer = timer;
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        if self.recording && !self.log.is_empty() {
            log::warn!(
                "GraphicsContext dropped while recording; {} invokes discarded",
                self.log.invokes.len()
            );
        }
    }
}

impl std::fmt::Debug for GraphicsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsContext")
            .field("recording", &self.recording)
            .field("invokes", &self.log.invokes.len())
            .field("passes", &self.log.passes.len())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(GraphicsContext: Send);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::device::DeviceParameters;
    use crate::resources::{ShaderDescriptor, ShaderReflection, ShaderStageSource, ShaderStages};
    use crate::types::{BufferDescriptor, TextureDescriptor, TextureFormat};

    fn setup() -> (Arc<GraphicsDevice>, GraphicsContext) {
        let device = GraphicsDevice::with_backend(Arc::new(DummyBackend::new()), DeviceParameters::new())
            .unwrap();
        let ctx = device.create_context();
        (device, ctx)
    }

    fn target(device: &GraphicsDevice) -> Arc<Texture> {
        device
            .create_texture(&TextureDescriptor::new_2d(
                64,
                64,
                TextureFormat::RGBA8_UNORM,
                TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ))
            .unwrap()
    }

    fn shader(device: &GraphicsDevice) -> Arc<Shader> {
        let reflection = ShaderReflection::new()
            .with_uniform_buffer("camera", 0, 0, ShaderStages::VERTEX)
            .with_fragment_output(0);
        device
            .create_shader(
                &ShaderDescriptor::new(reflection)
                    .with_stage(ShaderStageSource::vertex(vec![0u32; 4], "main"))
                    .with_stage(ShaderStageSource::fragment(vec![0u32; 4], "main")),
            )
            .unwrap()
    }

    #[test]
    fn test_bind_shader_resets_bindings_only_on_change() {
        let (device, mut ctx) = setup();
        let a = shader(&device);
        let b = shader(&device);
        let camera = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM))
            .unwrap();

        ctx.begin();
        ctx.bind_shader(&a);
        ctx.bind_buffer(&camera, "camera");
        ctx.bind_shader(&a);
        assert!(!ctx.bindings.is_empty());
        ctx.bind_shader(&b);
        assert!(ctx.bindings.is_empty());
        ctx.discard();
    }

    #[test]
    fn test_unknown_binding_is_ignored() {
        let (device, mut ctx) = setup();
        let camera = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM))
            .unwrap();
        ctx.begin();
        ctx.bind_shader(&shader(&device));
        ctx.bind_buffer(&camera, "not_declared");
        assert!(ctx.bindings.is_empty());
        ctx.discard();
    }

    #[test]
    #[should_panic(expected = "without a bound shader")]
    fn test_bind_without_shader_panics() {
        let (device, mut ctx) = setup();
        let camera = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM))
            .unwrap();
        ctx.begin();
        ctx.bind_buffer(&camera, "camera");
    }

    #[test]
    #[should_panic(expected = "zero indices")]
    fn test_zero_index_draw_panics() {
        let (device, mut ctx) = setup();
        ctx.begin();
        ctx.set_render_targets(&[target(&device)], None);
        ctx.bind_shader(&shader(&device));
        ctx.draw_indexed(PrimitiveType::Triangles, 0, 0, 0);
    }

    #[test]
    #[should_panic(expected = "not ended")]
    fn test_double_begin_panics() {
        let (_, mut ctx) = setup();
        ctx.begin();
        ctx.begin();
    }

    #[test]
    fn test_render_targets_reset_viewport_to_smallest_target() {
        let (device, mut ctx) = setup();
        let small = device
            .create_texture(&TextureDescriptor::new_2d(
                32,
                16,
                TextureFormat::RGBA8_UNORM,
                TextureUsage::RENDER_ATTACHMENT,
            ))
            .unwrap();
        ctx.begin();
        ctx.set_render_targets(&[target(&device), small], None);
        assert_eq!(ctx.scissor, Rect::new(0, 0, 32, 16));
        assert_eq!(ctx.viewport, Viewport::new(0.0, 0.0, 32.0, 16.0));
        ctx.discard();
    }

    #[test]
    fn test_blend_func_alpha_defaults_to_color() {
        let (_, mut ctx) = setup();
        ctx.set_blend_func(
            BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha,
            BlendOp::Add,
            None,
        );
        assert_eq!(ctx.state.blend.color, BlendComponent::ALPHA);
        assert_eq!(ctx.state.blend.alpha, BlendComponent::ALPHA);
    }

    #[test]
    #[should_panic(expected = "needs a color blend op")]
    fn test_blend_func_alpha_requires_color_op() {
        let (_, mut ctx) = setup();
        ctx.set_blend_func(
            BlendFactor::One,
            BlendFactor::Zero,
            BlendOp::None,
            Some((BlendFactor::One, BlendFactor::Zero, BlendOp::Add)),
        );
    }
}
