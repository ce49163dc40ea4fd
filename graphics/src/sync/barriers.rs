//! Barrier batching.
//!
//! Barriers are collected for every resource a pass touches, then submitted
//! as a single pipeline barrier command.

use ash::vk;

use super::layout::{AccessState, TextureLayout};
use super::tracker::{ResourceStateTracker, Transition};
use crate::backend::GpuCommand;
use crate::resources::{BufferSlot, ResourceId, Texture};

/// An image layout transition and memory dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub old_layout: TextureLayout,
    pub new_layout: TextureLayout,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

/// A memory dependency on a whole buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: vk::Buffer,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

/// A global memory dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBarrier {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

/// A batch of barriers to submit together.
///
/// A resource appears at most once per batch. Adding a second transition for
/// the same resource extends the first one: the barrier keeps the original
/// source state and takes the new destination state.
#[derive(Debug, Default)]
pub struct BarrierBatch {
    images: Vec<(ResourceId, ImageBarrier)>,
    buffers: Vec<(ResourceId, BufferBarrier)>,
    memory: Vec<MemoryBarrier>,
    src_stages: vk::PipelineStageFlags,
    dst_stages: vk::PipelineStageFlags,
}

impl BarrierBatch {
    /// Create a new empty barrier batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `state` for a texture, adding a barrier if the tracker asks for one.
    pub fn require_texture(
        &mut self,
        tracker: &mut ResourceStateTracker,
        texture: &Texture,
        state: AccessState,
    ) {
        if let Some(transition) = tracker.require(texture.id(), state) {
            self.add_image(texture.id(), texture.image(), texture.aspect_mask(), &transition);
        }
    }

    /// Require `state` for one buffer slot, adding a barrier if needed.
    pub fn require_buffer(
        &mut self,
        tracker: &mut ResourceStateTracker,
        slot: &BufferSlot,
        state: AccessState,
    ) {
        if let Some(transition) = tracker.require(slot.id(), state) {
            self.add_buffer(slot.id(), slot.raw(), &transition);
        }
    }

    /// Add an image layout transition barrier.
    pub fn add_image(
        &mut self,
        id: ResourceId,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        transition: &Transition,
    ) {
        self.add_stages(transition);
        if let Some((_, existing)) = self.images.iter_mut().find(|(i, _)| *i == id) {
            existing.new_layout = transition.after.layout;
            existing.dst_access |= transition.after.access;
            return;
        }
        self.images.push((
            id,
            ImageBarrier {
                image,
                aspect,
                old_layout: transition.before.layout,
                new_layout: transition.after.layout,
                src_access: transition.before.access,
                dst_access: transition.after.access,
            },
        ));
    }

    /// Add a buffer memory barrier.
    pub fn add_buffer(&mut self, id: ResourceId, buffer: vk::Buffer, transition: &Transition) {
        self.add_stages(transition);
        if let Some((_, existing)) = self.buffers.iter_mut().find(|(i, _)| *i == id) {
            existing.dst_access |= transition.after.access;
            return;
        }
        self.buffers.push((
            id,
            BufferBarrier {
                buffer,
                src_access: transition.before.access,
                dst_access: transition.after.access,
            },
        ));
    }

    /// Add a global memory barrier.
    pub fn add_memory(
        &mut self,
        src_access: vk::AccessFlags,
        src_stages: vk::PipelineStageFlags,
        dst_access: vk::AccessFlags,
        dst_stages: vk::PipelineStageFlags,
    ) {
        self.memory.push(MemoryBarrier {
            src_access,
            dst_access,
        });
        self.src_stages |= src_stages;
        self.dst_stages |= dst_stages;
    }

    fn add_stages(&mut self, transition: &Transition) {
        self.src_stages |= transition.before.stages;
        self.dst_stages |= transition.after.stages;
    }

    /// Check if the batch has any barriers.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.buffers.is_empty() && self.memory.is_empty()
    }

    /// Get the number of barriers in the batch.
    pub fn len(&self) -> usize {
        self.images.len() + self.buffers.len() + self.memory.len()
    }

    /// Turn the batch into one pipeline barrier command and clear it.
    ///
    /// Returns `None` if the batch is empty.
    pub fn take_command(&mut self) -> Option<GpuCommand> {
        if self.is_empty() {
            return None;
        }

        let mut src_stages = std::mem::take(&mut self.src_stages);
        if src_stages.is_empty() {
            src_stages = vk::PipelineStageFlags::TOP_OF_PIPE;
        }
        let mut dst_stages = std::mem::take(&mut self.dst_stages);
        if dst_stages.is_empty() {
            dst_stages = vk::PipelineStageFlags::BOTTOM_OF_PIPE;
        }

        Some(GpuCommand::PipelineBarrier {
            src_stages,
            dst_stages,
            memory: std::mem::take(&mut self.memory),
            buffers: self.buffers.drain(..).map(|(_, b)| b).collect(),
            images: self.images.drain(..).map(|(_, b)| b).collect(),
        })
    }
}
