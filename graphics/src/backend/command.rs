//! Native commands produced by context replay.
//!
//! Replay resolves a context's command log into a flat list of
//! [`GpuCommand`]s that map one-to-one onto `vkCmd*` calls. Backends either
//! record them into a command buffer or, for the dummy backend, keep them for
//! inspection.

use ash::vk;

use crate::resources::BindingKind;
use crate::sync::{BufferBarrier, ImageBarrier, MemoryBarrier};

/// Clear value for one render pass attachment or one cleared image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl ClearValue {
    pub fn to_vk(self) -> vk::ClearValue {
        match self {
            Self::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            Self::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

/// The resource a descriptor write points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    Buffer {
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    },
    Image {
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    },
}

/// One binding of a freshly allocated descriptor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub kind: BindingKind,
    pub resource: DescriptorResource,
}

/// A single native command.
#[derive(Debug, Clone)]
pub enum GpuCommand {
    PipelineBarrier {
        src_stages: vk::PipelineStageFlags,
        dst_stages: vk::PipelineStageFlags,
        memory: Vec<MemoryBarrier>,
        buffers: Vec<BufferBarrier>,
        images: Vec<ImageBarrier>,
    },
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        area: vk::Rect2D,
        /// One entry per attachment, in attachment order.
        clear_values: Vec<ClearValue>,
    },
    EndRenderPass,
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    BindDescriptorSets {
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        sets: Vec<vk::DescriptorSet>,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
        offsets: Vec<u64>,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: u64,
        index_type: vk::IndexType,
    },
    /// Already flipped to the native Y-down convention.
    SetViewport(vk::Viewport),
    SetScissor(vk::Rect2D),
    SetStencilReference(u32),
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        region: vk::BufferCopy,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        region: vk::BufferImageCopy,
    },
    CopyImageToBuffer {
        src: vk::Image,
        dst: vk::Buffer,
        region: vk::BufferImageCopy,
    },
    CopyImage {
        src: vk::Image,
        dst: vk::Image,
        region: vk::ImageCopy,
    },
    BlitImage {
        src: vk::Image,
        dst: vk::Image,
        region: vk::ImageBlit,
        filter: vk::Filter,
    },
    ClearColorImage {
        image: vk::Image,
        color: [f32; 4],
    },
    ClearDepthStencilImage {
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        depth: f32,
        stencil: u32,
    },
    BeginLabel(String),
    EndLabel,
    ResetQueryPool {
        pool: vk::QueryPool,
        first: u32,
        count: u32,
    },
    WriteTimestamp {
        pool: vk::QueryPool,
        stage: vk::PipelineStageFlags,
        query: u32,
    },
}

impl GpuCommand {
    /// Short name used in trace logs and tests.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PipelineBarrier { .. } => "PipelineBarrier",
            Self::BeginRenderPass { .. } => "BeginRenderPass",
            Self::EndRenderPass => "EndRenderPass",
            Self::BindPipeline { .. } => "BindPipeline",
            Self::BindDescriptorSets { .. } => "BindDescriptorSets",
            Self::BindVertexBuffers { .. } => "BindVertexBuffers",
            Self::BindIndexBuffer { .. } => "BindIndexBuffer",
            Self::SetViewport(_) => "SetViewport",
            Self::SetScissor(_) => "SetScissor",
            Self::SetStencilReference(_) => "SetStencilReference",
            Self::DrawIndexed { .. } => "DrawIndexed",
            Self::Dispatch { .. } => "Dispatch",
            Self::CopyBuffer { .. } => "CopyBuffer",
            Self::CopyBufferToImage { .. } => "CopyBufferToImage",
            Self::CopyImageToBuffer { .. } => "CopyImageToBuffer",
            Self::CopyImage { .. } => "CopyImage",
            Self::BlitImage { .. } => "BlitImage",
            Self::ClearColorImage { .. } => "ClearColorImage",
            Self::ClearDepthStencilImage { .. } => "ClearDepthStencilImage",
            Self::BeginLabel(_) => "BeginLabel",
            Self::EndLabel => "EndLabel",
            Self::ResetQueryPool { .. } => "ResetQueryPool",
            Self::WriteTimestamp { .. } => "WriteTimestamp",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_value_to_vk() {
        let color = ClearValue::Color([1.0, 0.0, 0.5, 1.0]).to_vk();
        // SAFETY: written as the color member above.
        assert_eq!(unsafe { color.color.float32 }, [1.0, 0.0, 0.5, 1.0]);

        let depth = ClearValue::DepthStencil {
            depth: 1.0,
            stencil: 3,
        }
        .to_vk();
        // SAFETY: written as the depth_stencil member above.
        let ds = unsafe { depth.depth_stencil };
        assert_eq!(ds.depth, 1.0);
        assert_eq!(ds.stencil, 3);
    }
}
