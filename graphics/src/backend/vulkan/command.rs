//! Command pools, per-frame command buffers and command encoding.

use ash::vk;

use crate::backend::GpuCommand;
use crate::error::GraphicsError;
use crate::sync::{BufferBarrier, ImageBarrier, MemoryBarrier};

use super::debug;

pub fn create_command_pool(
    device: &ash::Device,
    queue_family_index: u32,
) -> Result<vk::CommandPool, GraphicsError> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family_index)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create command pool: {:?}", e))
    })
}

fn allocate_command_buffer(
    device: &ash::Device,
    pool: vk::CommandPool,
) -> Result<vk::CommandBuffer, GraphicsError> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    unsafe { device.allocate_command_buffers(&alloc_info) }
        .map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!(
                "Failed to allocate command buffer: {:?}",
                e
            ))
        })?
        .into_iter()
        .next()
        .ok_or_else(|| GraphicsError::Internal("No command buffer allocated".to_string()))
}

fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence, GraphicsError> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    unsafe { device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }.map_err(
        |e| GraphicsError::ResourceCreationFailed(format!("Failed to create fence: {:?}", e)),
    )
}

pub fn device_error(e: vk::Result) -> GraphicsError {
    match e {
        vk::Result::ERROR_DEVICE_LOST => GraphicsError::DeviceLost,
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            GraphicsError::OutOfMemory
        }
        other => GraphicsError::Internal(format!("Vulkan call failed: {:?}", other)),
    }
}

/// Command buffer and fence of one frame in flight.
#[derive(Debug, Clone, Copy)]
pub struct FrameSlot {
    pub cmd: vk::CommandBuffer,
    /// Signaled when the GPU has finished the last submission of this slot.
    pub fence: vk::Fence,
}

impl FrameSlot {
    pub fn new(device: &ash::Device, pool: vk::CommandPool) -> Result<Self, GraphicsError> {
        Ok(Self {
            cmd: allocate_command_buffer(device, pool)?,
            fence: create_fence(device, true)?,
        })
    }

    pub fn wait(&self, device: &ash::Device) -> Result<(), GraphicsError> {
        unsafe { device.wait_for_fences(&[self.fence], true, u64::MAX) }.map_err(device_error)
    }

    /// Reset the command buffer and open it for recording.
    pub fn begin(&self, device: &ash::Device) -> Result<(), GraphicsError> {
        unsafe {
            device
                .reset_command_buffer(self.cmd, vk::CommandBufferResetFlags::empty())
                .map_err(device_error)?;
            device
                .begin_command_buffer(
                    self.cmd,
                    &vk::CommandBufferBeginInfo::default()
                        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )
                .map_err(device_error)
        }
    }

    /// Close the command buffer and submit it, signaling the slot fence.
    pub fn submit(&self, device: &ash::Device, queue: vk::Queue) -> Result<(), GraphicsError> {
        let cmds = [self.cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&cmds);
        unsafe {
            device.end_command_buffer(self.cmd).map_err(device_error)?;
            device.reset_fences(&[self.fence]).map_err(device_error)?;
            device
                .queue_submit(queue, &[submit], self.fence)
                .map_err(device_error)
        }
    }

    /// # Safety
    ///
    /// The fence must be signaled and the pool must be destroyed afterwards.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_fence(self.fence, None) };
    }
}

/// Record `f` into a temporary command buffer, submit it and wait for it.
pub fn submit_and_wait(
    device: &ash::Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
    f: impl FnOnce(vk::CommandBuffer),
) -> Result<(), GraphicsError> {
    let cmd = allocate_command_buffer(device, pool)?;
    let fence = match create_fence(device, false) {
        Ok(fence) => fence,
        Err(e) => {
            unsafe { device.free_command_buffers(pool, &[cmd]) };
            return Err(e);
        }
    };

    let result = (|| unsafe {
        device
            .begin_command_buffer(
                cmd,
                &vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )
            .map_err(device_error)?;
        f(cmd);
        device.end_command_buffer(cmd).map_err(device_error)?;

        let cmds = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&cmds);
        device
            .queue_submit(queue, &[submit], fence)
            .map_err(device_error)?;
        device
            .wait_for_fences(&[fence], true, u64::MAX)
            .map_err(device_error)
    })();

    unsafe {
        device.destroy_fence(fence, None);
        device.free_command_buffers(pool, &[cmd]);
    }
    result
}

fn whole_image(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    }
}

fn encode_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src_stages: vk::PipelineStageFlags,
    dst_stages: vk::PipelineStageFlags,
    memory: &[MemoryBarrier],
    buffers: &[BufferBarrier],
    images: &[ImageBarrier],
) {
    let memory: Vec<_> = memory
        .iter()
        .map(|b| {
            vk::MemoryBarrier::default()
                .src_access_mask(b.src_access)
                .dst_access_mask(b.dst_access)
        })
        .collect();
    let buffers: Vec<_> = buffers
        .iter()
        .map(|b| {
            vk::BufferMemoryBarrier::default()
                .src_access_mask(b.src_access)
                .dst_access_mask(b.dst_access)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(b.buffer)
                .offset(0)
                .size(vk::WHOLE_SIZE)
        })
        .collect();
    let images: Vec<_> = images
        .iter()
        .map(|b| {
            vk::ImageMemoryBarrier::default()
                .src_access_mask(b.src_access)
                .dst_access_mask(b.dst_access)
                .old_layout(b.old_layout.to_vk())
                .new_layout(b.new_layout.to_vk())
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(b.image)
                .subresource_range(whole_image(b.aspect))
        })
        .collect();

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stages,
            dst_stages,
            vk::DependencyFlags::empty(),
            &memory,
            &buffers,
            &images,
        )
    };
}

/// Record one native command into `cmd`.
///
/// Labels are skipped when `debug_utils` is `None`.
pub fn encode(
    device: &ash::Device,
    debug_utils: Option<&ash::ext::debug_utils::Device>,
    cmd: vk::CommandBuffer,
    command: &GpuCommand,
) {
    // SAFETY: every handle in a GpuCommand was created on `device` and is kept
    // alive by the deferred destructor until this command buffer completes.
    unsafe {
        match command {
            GpuCommand::PipelineBarrier {
                src_stages,
                dst_stages,
                memory,
                buffers,
                images,
            } => encode_barrier(
                device,
                cmd,
                *src_stages,
                *dst_stages,
                memory,
                buffers,
                images,
            ),
            GpuCommand::BeginRenderPass {
                render_pass,
                framebuffer,
                area,
                clear_values,
            } => {
                let clear_values: Vec<_> = clear_values.iter().map(|v| v.to_vk()).collect();
                let begin_info = vk::RenderPassBeginInfo::default()
                    .render_pass(*render_pass)
                    .framebuffer(*framebuffer)
                    .render_area(*area)
                    .clear_values(&clear_values);
                device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            }
            GpuCommand::EndRenderPass => device.cmd_end_render_pass(cmd),
            GpuCommand::BindPipeline {
                bind_point,
                pipeline,
            } => device.cmd_bind_pipeline(cmd, *bind_point, *pipeline),
            GpuCommand::BindDescriptorSets {
                bind_point,
                layout,
                sets,
            } => device.cmd_bind_descriptor_sets(cmd, *bind_point, *layout, 0, sets, &[]),
            GpuCommand::BindVertexBuffers {
                first_binding,
                buffers,
                offsets,
            } => device.cmd_bind_vertex_buffers(cmd, *first_binding, buffers, offsets),
            GpuCommand::BindIndexBuffer {
                buffer,
                offset,
                index_type,
            } => device.cmd_bind_index_buffer(cmd, *buffer, *offset, *index_type),
            GpuCommand::SetViewport(viewport) => {
                device.cmd_set_viewport(cmd, 0, std::slice::from_ref(viewport))
            }
            GpuCommand::SetScissor(scissor) => {
                device.cmd_set_scissor(cmd, 0, std::slice::from_ref(scissor))
            }
            GpuCommand::SetStencilReference(reference) => device.cmd_set_stencil_reference(
                cmd,
                vk::StencilFaceFlags::FRONT_AND_BACK,
                *reference,
            ),
            GpuCommand::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
            } => device.cmd_draw_indexed(
                cmd,
                *index_count,
                *instance_count,
                *first_index,
                *vertex_offset,
                0,
            ),
            GpuCommand::Dispatch { x, y, z } => device.cmd_dispatch(cmd, *x, *y, *z),
            GpuCommand::CopyBuffer { src, dst, region } => {
                device.cmd_copy_buffer(cmd, *src, *dst, std::slice::from_ref(region))
            }
            GpuCommand::CopyBufferToImage { src, dst, region } => device
                .cmd_copy_buffer_to_image(
                    cmd,
                    *src,
                    *dst,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    std::slice::from_ref(region),
                ),
            GpuCommand::CopyImageToBuffer { src, dst, region } => device
                .cmd_copy_image_to_buffer(
                    cmd,
                    *src,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    *dst,
                    std::slice::from_ref(region),
                ),
            GpuCommand::CopyImage { src, dst, region } => device.cmd_copy_image(
                cmd,
                *src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                *dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(region),
            ),
            GpuCommand::BlitImage {
                src,
                dst,
                region,
                filter,
            } => device.cmd_blit_image(
                cmd,
                *src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                *dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(region),
                *filter,
            ),
            GpuCommand::ClearColorImage { image, color } => device.cmd_clear_color_image(
                cmd,
                *image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk::ClearColorValue { float32: *color },
                &[whole_image(vk::ImageAspectFlags::COLOR)],
            ),
            GpuCommand::ClearDepthStencilImage {
                image,
                aspect,
                depth,
                stencil,
            } => device.cmd_clear_depth_stencil_image(
                cmd,
                *image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk::ClearDepthStencilValue {
                    depth: *depth,
                    stencil: *stencil,
                },
                &[whole_image(*aspect)],
            ),
            GpuCommand::BeginLabel(name) => {
                if let Some(debug_utils) = debug_utils {
                    debug::begin_label(debug_utils, cmd, name);
                }
            }
            GpuCommand::EndLabel => {
                if let Some(debug_utils) = debug_utils {
                    debug::end_label(debug_utils, cmd);
                }
            }
            GpuCommand::ResetQueryPool { pool, first, count } => {
                device.cmd_reset_query_pool(cmd, *pool, *first, *count)
            }
            GpuCommand::WriteTimestamp { pool, stage, query } => {
                device.cmd_write_timestamp(cmd, *stage, *pool, *query)
            }
        }
    }
}
