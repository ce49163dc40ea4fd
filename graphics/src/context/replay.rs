//! Replay of a command log into native commands.
//!
//! Pass batches are replayed in order. Before each pass the side commands
//! issued earlier are flushed, then every resource the pass reads is
//! transitioned, the attachments are moved into their in-pass layout and the
//! invokes are recorded pipeline batch by pipeline batch. After a render pass
//! every attachment is moved to its resting layout.

use std::iter::Peekable;
use std::vec;

use ash::vk;

use super::command_log::{
    BufferSource, ClearCommand, CommandLog, CopyCommand, InvokeCommand, InvokeKind, PassBatch,
    PassKind, SideCommand, SideEntry,
};
use super::state::BoundResource;
use crate::backend::conversion::convert_index_format;
use crate::backend::{ClearValue, GpuBuffer, GpuCommand};
use crate::cache::{
    AttachmentKey, DescriptorKey, DescriptorSetKey, FramebufferKey, GraphicsPipelineKey,
    RenderPassKey,
};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::profiling::GpuTimer;
use crate::resources::{BindingKind, BufferSlot, ResourceBinding, ResourceId, Texture};
use crate::sync::{
    AccessState, BarrierBatch, BufferAccess, ResourceStateTracker, TextureAccess, TextureLayout,
    shader_stage_flags,
};
use crate::types::{BufferUsage, Rect};

type SideLog = Peekable<vec::IntoIter<SideEntry>>;

/// Native commands produced by one replay.
pub(crate) struct Replayed {
    pub commands: Vec<GpuCommand>,
    /// Staging buffers that must outlive the recording of `commands`.
    pub staging: Vec<GpuBuffer>,
}

pub(crate) struct Replayer<'a> {
    device: &'a GraphicsDevice,
    tracker: &'a mut ResourceStateTracker,
    barriers: BarrierBatch,
    commands: Vec<GpuCommand>,
    staging: Vec<GpuBuffer>,
    debug_labels: bool,
    /// Depth/stencil attachment of the render pass being resolved, when the
    /// pass only reads it.
    read_only_depth: Option<ResourceId>,
}

fn load_op(clear: bool) -> vk::AttachmentLoadOp {
    if clear {
        vk::AttachmentLoadOp::CLEAR
    } else {
        vk::AttachmentLoadOp::LOAD
    }
}

/// Aspect addressed by copies and blits: depth for depth formats, stencil
/// for stencil-only ones.
fn transfer_layers(texture: &Texture) -> vk::ImageSubresourceLayers {
    let format = texture.format();
    let aspect_mask = if format.has_depth() {
        vk::ImageAspectFlags::DEPTH
    } else if format.has_stencil() {
        vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::COLOR
    };
    vk::ImageSubresourceLayers {
        aspect_mask,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn far_corner(texture: &Texture) -> vk::Offset3D {
    vk::Offset3D {
        x: texture.width() as i32,
        y: texture.height() as i32,
        z: 1,
    }
}

impl<'a> Replayer<'a> {
    pub fn new(device: &'a GraphicsDevice, tracker: &'a mut ResourceStateTracker) -> Self {
        Self {
            device,
            tracker,
            barriers: BarrierBatch::new(),
            commands: Vec::new(),
            staging: Vec::new(),
            debug_labels: device.backend().supports_debug_labels(),
            read_only_depth: None,
        }
    }

    /// Replay `log`, leaving it empty.
    pub fn replay(
        mut self,
        log: &mut CommandLog,
        timer: Option<&GpuTimer>,
        memory_barrier: bool,
    ) -> Result<Replayed, GraphicsError> {
        ember_core::profile_scope!("replay");

        if let Some(timer) = timer {
            self.commands.push(GpuCommand::ResetQueryPool {
                pool: timer.pool().raw(),
                first: GpuTimer::BEGIN_QUERY,
                count: GpuTimer::QUERY_COUNT,
            });
            self.commands.push(GpuCommand::WriteTimestamp {
                pool: timer.pool().raw(),
                stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                query: GpuTimer::BEGIN_QUERY,
            });
        }

        let mut side: SideLog = std::mem::take(&mut log.side).into_iter().peekable();
        for pass in &log.passes {
            self.flush_side(&mut side, pass.invokes.start);
            match pass.kind {
                PassKind::Render => self.replay_render_pass(pass, &log.invokes, &mut side)?,
                PassKind::Compute => self.replay_compute_pass(pass, &log.invokes, &mut side)?,
            }
        }
        self.flush_side(&mut side, usize::MAX);

        if let Some(timer) = timer {
            self.commands.push(GpuCommand::WriteTimestamp {
                pool: timer.pool().raw(),
                stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                query: GpuTimer::END_QUERY,
            });
        }

        if memory_barrier {
            self.barriers.add_memory(
                vk::AccessFlags::MEMORY_WRITE,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                vk::PipelineStageFlags::ALL_COMMANDS,
            );
            self.flush_barriers();
        }

        log.clear();
        Ok(Replayed {
            commands: self.commands,
            staging: self.staging,
        })
    }

    fn flush_barriers(&mut self) {
        if let Some(barrier) = self.barriers.take_command() {
            self.commands.push(barrier);
        }
    }

    fn require_texture(&mut self, texture: &Texture, state: AccessState) {
        self.barriers.require_texture(self.tracker, texture, state);
    }

    fn require_buffer(&mut self, slot: &BufferSlot, state: AccessState) {
        self.barriers.require_buffer(self.tracker, slot, state);
    }

    /// Queue the transition of a written texture to its resting layout.
    fn rest(&mut self, texture: &Texture) {
        if let Some(layout) = texture.resting_layout() {
            self.require_texture(texture, AccessState::resting(layout));
        }
    }

    // ------------------------------------------------------------------
    // Side commands
    // ------------------------------------------------------------------

    /// Replay every side command issued before invoke `upto`.
    fn flush_side(&mut self, side: &mut SideLog, upto: usize) {
        while let Some(entry) = side.next_if(|e| e.invokes_before <= upto) {
            self.replay_side(entry.command);
        }
    }

    /// Replay the markers issued before invoke `upto` inside an open pass.
    fn flush_markers(&mut self, side: &mut SideLog, upto: usize) {
        while let Some(entry) = side.next_if(|e| e.invokes_before <= upto) {
            match entry.command {
                SideCommand::PushMarker(name) => self.push_label(name),
                SideCommand::PopMarker => self.pop_label(),
                other => unreachable!("{:?} cannot be recorded inside a pass", other),
            }
        }
    }

    fn push_label(&mut self, name: String) {
        if self.debug_labels {
            self.commands.push(GpuCommand::BeginLabel(name));
        }
    }

    fn pop_label(&mut self) {
        if self.debug_labels {
            self.commands.push(GpuCommand::EndLabel);
        }
    }

    fn replay_side(&mut self, command: SideCommand) {
        match command {
            SideCommand::Clear(clear) => self.replay_clear(&clear),
            SideCommand::Copy(copy) => self.replay_copy(copy),
            SideCommand::PushMarker(name) => self.push_label(name),
            SideCommand::PopMarker => self.pop_label(),
        }
    }

    fn replay_clear(&mut self, clear: &ClearCommand) {
        let target = &clear.target;
        self.require_texture(target, TextureAccess::TransferDst.state());
        self.flush_barriers();

        if let Some(color) = clear.color {
            self.commands.push(GpuCommand::ClearColorImage {
                image: target.image(),
                color,
            });
        } else {
            let format = target.format();
            let mut aspect = vk::ImageAspectFlags::empty();
            if clear.depth.is_some() && format.has_depth() {
                aspect |= vk::ImageAspectFlags::DEPTH;
            }
            if clear.stencil.is_some() && format.has_stencil() {
                aspect |= vk::ImageAspectFlags::STENCIL;
            }
            if !aspect.is_empty() {
                self.commands.push(GpuCommand::ClearDepthStencilImage {
                    image: target.image(),
                    aspect,
                    depth: clear.depth.unwrap_or(1.0),
                    stencil: clear.stencil.unwrap_or(0),
                });
            }
        }

        self.rest(target);
        self.flush_barriers();
    }

    /// Resolve a buffer copy source, transitioning tracked buffers.
    fn buffer_source(&mut self, source: &BufferSource) -> vk::Buffer {
        match source {
            BufferSource::Staging(staging) => staging.raw(),
            BufferSource::Buffer {
                buffer,
                frame_index,
            } => {
                let slot = buffer.slot(*frame_index);
                self.require_buffer(slot, BufferAccess::TransferSrc.state());
                slot.raw()
            }
        }
    }

    fn retain_staging(&mut self, source: BufferSource) {
        if let BufferSource::Staging(staging) = source {
            self.staging.push(staging);
        }
    }

    fn replay_copy(&mut self, copy: CopyCommand) {
        ember_core::profile_scope!("replay_copy");

        match copy {
            CopyCommand::BufferToBuffer {
                src,
                src_offset,
                dst,
                dst_frame_index,
                dst_offset,
                size,
            } => {
                let src_buffer = self.buffer_source(&src);
                let dst_slot = dst.slot(dst_frame_index);
                self.require_buffer(dst_slot, BufferAccess::TransferDst.state());
                self.flush_barriers();
                self.commands.push(GpuCommand::CopyBuffer {
                    src: src_buffer,
                    dst: dst_slot.raw(),
                    region: vk::BufferCopy {
                        src_offset,
                        dst_offset,
                        size,
                    },
                });
                self.retain_staging(src);
            }
            CopyCommand::BufferToTexture { src, dst } => {
                let src_buffer = self.buffer_source(&src);
                self.require_texture(&dst, TextureAccess::TransferDst.state());
                self.flush_barriers();
                self.commands.push(GpuCommand::CopyBufferToImage {
                    src: src_buffer,
                    dst: dst.image(),
                    region: vk::BufferImageCopy {
                        buffer_offset: 0,
                        buffer_row_length: 0,
                        buffer_image_height: 0,
                        image_subresource: transfer_layers(&dst),
                        image_offset: vk::Offset3D::default(),
                        image_extent: dst.size().to_vk(),
                    },
                });
                self.rest(&dst);
                self.flush_barriers();
                self.retain_staging(src);
            }
            CopyCommand::TextureToTexture { src, dst } => {
                self.require_texture(&src, TextureAccess::TransferSrc.state());
                self.require_texture(&dst, TextureAccess::TransferDst.state());
                self.flush_barriers();
                self.commands.push(GpuCommand::CopyImage {
                    src: src.image(),
                    dst: dst.image(),
                    region: vk::ImageCopy {
                        src_subresource: transfer_layers(&src),
                        src_offset: vk::Offset3D::default(),
                        dst_subresource: transfer_layers(&dst),
                        dst_offset: vk::Offset3D::default(),
                        extent: src.size().min_2d(dst.size()).to_vk(),
                    },
                });
                self.rest(&src);
                self.rest(&dst);
                self.flush_barriers();
            }
            CopyCommand::TextureToBuffer {
                src,
                dst,
                dst_frame_index,
            } => {
                let dst_slot = dst.slot(dst_frame_index);
                self.require_texture(&src, TextureAccess::TransferSrc.state());
                self.require_buffer(dst_slot, BufferAccess::TransferDst.state());
                self.flush_barriers();
                self.commands.push(GpuCommand::CopyImageToBuffer {
                    src: src.image(),
                    dst: dst_slot.raw(),
                    region: vk::BufferImageCopy {
                        buffer_offset: 0,
                        buffer_row_length: 0,
                        buffer_image_height: 0,
                        image_subresource: transfer_layers(&src),
                        image_offset: vk::Offset3D::default(),
                        image_extent: src.size().to_vk(),
                    },
                });
                self.rest(&src);
                if dst.usage().contains(BufferUsage::MAP_READ) {
                    self.require_buffer(dst_slot, BufferAccess::HostRead.state());
                }
                self.flush_barriers();
            }
            CopyCommand::Blit { src, dst } => {
                self.require_texture(&src, TextureAccess::TransferSrc.state());
                self.require_texture(&dst, TextureAccess::TransferDst.state());
                self.flush_barriers();
                let filter = if src.format().is_depth_stencil() {
                    vk::Filter::NEAREST
                } else {
                    vk::Filter::LINEAR
                };
                self.commands.push(GpuCommand::BlitImage {
                    src: src.image(),
                    dst: dst.image(),
                    region: vk::ImageBlit {
                        src_subresource: transfer_layers(&src),
                        src_offsets: [vk::Offset3D::default(), far_corner(&src)],
                        dst_subresource: transfer_layers(&dst),
                        dst_offsets: [vk::Offset3D::default(), far_corner(&dst)],
                    },
                    filter,
                });
                self.rest(&src);
                self.rest(&dst);
                self.flush_barriers();
            }
        }
    }

    // ------------------------------------------------------------------
    // Invokes
    // ------------------------------------------------------------------

    /// Descriptor sets for every set of the invoke's shader.
    ///
    /// Slots nobody bound get the device's missing texture or missing buffer.
    /// Every resource is transitioned for the access its slot declares.
    fn resolve_bindings(
        &mut self,
        invoke: &InvokeCommand,
    ) -> Result<Vec<vk::DescriptorSet>, GraphicsError> {
        let shader = &invoke.shader;
        let resources = shader.reflection().resources();
        let set_layouts = shader.gpu().set_layouts();

        let mut sets = Vec::with_capacity(set_layouts.len());
        for (set, layout) in (0u32..).zip(set_layouts) {
            let entries = resources
                .iter()
                .filter(|b| b.set == set)
                .map(|b| (b.binding, b.kind, self.bind_descriptor(invoke, b)))
                .collect();
            let key = DescriptorSetKey {
                shader: shader.id(),
                set,
                layout: *layout,
                entries,
            };
            sets.push(self.device.get_or_create_descriptor_set(&key)?);
        }
        Ok(sets)
    }

    fn bind_descriptor(&mut self, invoke: &InvokeCommand, binding: &ResourceBinding) -> DescriptorKey {
        let device = self.device;
        let stages = shader_stage_flags(binding.stages);
        let bound = invoke.bindings.get(binding.set, binding.binding);

        match binding.kind {
            BindingKind::UniformBuffer | BindingKind::StorageBuffer => {
                let buffer = match bound {
                    Some(BoundResource::Buffer(buffer)) => buffer,
                    _ => device.missing_buffer(),
                };
                let access = if binding.kind == BindingKind::UniformBuffer {
                    BufferAccess::Uniform(stages)
                } else {
                    BufferAccess::Storage(stages)
                };
                let slot = buffer.slot(invoke.frame_index);
                self.require_buffer(slot, access.state());
                DescriptorKey::Buffer {
                    id: slot.id(),
                    buffer: slot.raw(),
                    range: buffer.size(),
                }
            }
            BindingKind::SampledTexture | BindingKind::StorageTexture => {
                let texture = match bound {
                    Some(BoundResource::Texture(texture)) => texture,
                    _ => device.missing_texture(),
                };
                // A read-only depth attachment stays in its attachment layout
                // while the pass samples it.
                let state = match binding.kind {
                    BindingKind::SampledTexture if self.read_only_depth == Some(texture.id()) => {
                        TextureAccess::SampledDepthStencil(stages).state()
                    }
                    BindingKind::SampledTexture => TextureAccess::Sampled(stages).state(),
                    _ => TextureAccess::Storage(stages).state(),
                };
                self.require_texture(texture, state);
                DescriptorKey::Image {
                    id: texture.id(),
                    view: texture.view(),
                    sampler: texture.sampler(),
                    layout: state.layout,
                }
            }
        }
    }

    fn require_geometry(&mut self, invoke: &InvokeCommand) {
        for binding in invoke.vertex_buffers.iter().flatten() {
            let slot = binding.buffer.slot(invoke.frame_index);
            self.require_buffer(slot, BufferAccess::Vertex.state());
        }
        if let Some(index) = &invoke.index_buffer {
            let slot = index.buffer.slot(invoke.frame_index);
            self.require_buffer(slot, BufferAccess::Index.state());
        }
    }

    fn record_invoke(
        &mut self,
        invoke: &InvokeCommand,
        bind_point: vk::PipelineBindPoint,
        sets: Vec<vk::DescriptorSet>,
    ) {
        if !sets.is_empty() {
            self.commands.push(GpuCommand::BindDescriptorSets {
                bind_point,
                layout: invoke.shader.gpu().pipeline_layout(),
                sets,
            });
        }

        match invoke.kind {
            InvokeKind::DrawIndexed {
                first_index,
                index_count,
                base_vertex,
                instance_count,
            } => {
                self.bind_vertex_buffers(invoke);
                if let Some(index) = &invoke.index_buffer {
                    self.commands.push(GpuCommand::BindIndexBuffer {
                        buffer: index.buffer.slot(invoke.frame_index).raw(),
                        offset: index.offset,
                        index_type: convert_index_format(index.format),
                    });
                }
                self.commands.push(GpuCommand::SetViewport(invoke.viewport));
                self.commands.push(GpuCommand::SetScissor(invoke.scissor));
                self.commands
                    .push(GpuCommand::SetStencilReference(invoke.stencil_reference));
                self.commands.push(GpuCommand::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset: base_vertex,
                });
            }
            InvokeKind::Dispatch { x, y, z } => {
                self.commands.push(GpuCommand::Dispatch { x, y, z });
            }
        }
    }

    /// Bind vertex buffers, one command per run of consecutive bound slots.
    fn bind_vertex_buffers(&mut self, invoke: &InvokeCommand) {
        let mut run: Option<(u32, Vec<vk::Buffer>, Vec<u64>)> = None;
        for (slot, binding) in (0u32..).zip(&invoke.vertex_buffers) {
            match binding {
                Some(binding) => {
                    let (_, buffers, offsets) =
                        run.get_or_insert_with(|| (slot, Vec::new(), Vec::new()));
                    buffers.push(binding.buffer.slot(invoke.frame_index).raw());
                    offsets.push(binding.offset);
                }
                None => {
                    if let Some((first_binding, buffers, offsets)) = run.take() {
                        self.commands.push(GpuCommand::BindVertexBuffers {
                            first_binding,
                            buffers,
                            offsets,
                        });
                    }
                }
            }
        }
        if let Some((first_binding, buffers, offsets)) = run {
            self.commands.push(GpuCommand::BindVertexBuffers {
                first_binding,
                buffers,
                offsets,
            });
        }
    }

    // ------------------------------------------------------------------
    // Passes
    // ------------------------------------------------------------------

    fn replay_render_pass(
        &mut self,
        pass: &PassBatch,
        invokes: &[InvokeCommand],
        side: &mut SideLog,
    ) -> Result<(), GraphicsError> {
        ember_core::profile_scope!("render_pass_batch");
        let device = self.device;
        let targets = &pass.targets;
        let clears = &pass.clears;

        let depth_access = if pass.writes_depth_stencil() {
            TextureAccess::DepthStencilAttachment
        } else {
            TextureAccess::DepthStencilReadOnly
        };

        let key = RenderPassKey {
            colors: targets
                .colors
                .iter()
                .enumerate()
                .map(|(i, texture)| AttachmentKey {
                    texture: texture.id(),
                    format: texture.vk_format(),
                    load_op: load_op(clears.colors.get(i).copied().flatten().is_some()),
                    stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                    layout: TextureLayout::ColorAttachment,
                })
                .collect(),
            depth_stencil: targets.depth_stencil.as_ref().map(|texture| AttachmentKey {
                texture: texture.id(),
                format: texture.vk_format(),
                load_op: load_op(clears.depth.is_some()),
                stencil_load_op: if texture.format().has_stencil() {
                    load_op(clears.stencil.is_some())
                } else {
                    vk::AttachmentLoadOp::DONT_CARE
                },
                layout: depth_access.state().layout,
            }),
        };
        let render_pass = device.get_or_create_render_pass(&key)?;

        let extent = pass.render_area();
        let framebuffer = device.get_or_create_framebuffer(&FramebufferKey {
            render_pass,
            attachments: targets.iter().map(|t| (t.id(), t.view())).collect(),
            width: extent.width,
            height: extent.height,
        })?;

        // Resolve everything the pass reads before it begins.
        self.read_only_depth = targets
            .depth_stencil
            .as_ref()
            .filter(|_| depth_access == TextureAccess::DepthStencilReadOnly)
            .map(|texture| texture.id());
        let color_count = targets.colors.len() as u32;
        let mut batches = Vec::with_capacity(pass.pipelines.len());
        for batch in &pass.pipelines {
            let shader = &invokes[batch.invokes.start].shader;
            let pipeline = device.get_or_create_graphics_pipeline(
                shader,
                &GraphicsPipelineKey {
                    shader: batch.shader,
                    state: batch.state,
                    render_pass,
                    color_count,
                },
            )?;
            let mut sets = Vec::with_capacity(batch.invokes.len());
            for invoke in &invokes[batch.invokes.clone()] {
                sets.push(self.resolve_bindings(invoke)?);
                self.require_geometry(invoke);
            }
            batches.push((pipeline, sets));
        }
        self.read_only_depth = None;

        for texture in &targets.colors {
            self.require_texture(texture, TextureAccess::ColorAttachment.state());
        }
        if let Some(texture) = &targets.depth_stencil {
            self.require_texture(texture, depth_access.state());
        }
        self.flush_barriers();

        let mut clear_values: Vec<ClearValue> = (0..targets.colors.len())
            .map(|i| ClearValue::Color(clears.colors.get(i).copied().flatten().unwrap_or_default()))
            .collect();
        if targets.depth_stencil.is_some() {
            clear_values.push(ClearValue::DepthStencil {
                depth: clears.depth.unwrap_or(1.0),
                stencil: clears.stencil.unwrap_or(0),
            });
        }
        self.commands.push(GpuCommand::BeginRenderPass {
            render_pass,
            framebuffer,
            area: Rect::from_extent(extent).to_vk(),
            clear_values,
        });

        for (batch, (pipeline, sets)) in pass.pipelines.iter().zip(batches) {
            self.commands.push(GpuCommand::BindPipeline {
                bind_point: vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            });
            for (index, sets) in batch.invokes.clone().zip(sets) {
                self.flush_markers(side, index);
                self.record_invoke(&invokes[index], vk::PipelineBindPoint::GRAPHICS, sets);
            }
        }

        self.commands.push(GpuCommand::EndRenderPass);

        for texture in targets.iter() {
            self.rest(texture);
        }
        self.flush_barriers();
        Ok(())
    }

    fn replay_compute_pass(
        &mut self,
        pass: &PassBatch,
        invokes: &[InvokeCommand],
        side: &mut SideLog,
    ) -> Result<(), GraphicsError> {
        ember_core::profile_scope!("compute_pass_batch");

        for batch in &pass.pipelines {
            let shader = &invokes[batch.invokes.start].shader;
            let pipeline = self.device.get_or_create_compute_pipeline(shader)?;
            self.commands.push(GpuCommand::BindPipeline {
                bind_point: vk::PipelineBindPoint::COMPUTE,
                pipeline,
            });

            // Dispatches may depend on each other, so each one synchronizes
            // its own resources.
            for index in batch.invokes.clone() {
                let invoke = &invokes[index];
                self.flush_markers(side, index);
                let sets = self.resolve_bindings(invoke)?;
                self.flush_barriers();
                self.record_invoke(invoke, vk::PipelineBindPoint::COMPUTE, sets);
            }
        }
        Ok(())
    }
}
