//! GPU buffer resource.

use std::sync::Arc;

use ash::vk;

use super::{ResourceId, RetiredResources};
use crate::backend::GpuBuffer;
use crate::types::{BufferDescriptor, BufferUsage};

/// One physical allocation of a [`Buffer`].
pub struct BufferSlot {
    id: ResourceId,
    gpu: GpuBuffer,
}

impl BufferSlot {
    /// Identity used by the resource state tracker and the caches.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Backend buffer.
    pub fn gpu(&self) -> &GpuBuffer {
        &self.gpu
    }

    /// Native buffer handle.
    pub fn raw(&self) -> vk::Buffer {
        self.gpu.raw()
    }
}

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`](crate::GraphicsDevice::create_buffer)
/// and are reference-counted. A multi-frame buffer owns one [`BufferSlot`]
/// per frame in flight; every other buffer owns exactly one.
pub struct Buffer {
    descriptor: BufferDescriptor,
    slots: Vec<BufferSlot>,
    retired: Arc<RetiredResources>,
}

impl Buffer {
    pub(crate) fn new(
        descriptor: BufferDescriptor,
        allocations: Vec<GpuBuffer>,
        retired: Arc<RetiredResources>,
    ) -> Self {
        debug_assert!(!allocations.is_empty());
        let slots = allocations
            .into_iter()
            .map(|gpu| BufferSlot {
                id: ResourceId::next(),
                gpu,
            })
            .collect();
        Self {
            descriptor,
            slots,
            retired,
        }
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the buffer usage flags.
    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Whether the buffer lives in CPU-mappable memory.
    pub fn is_mappable(&self) -> bool {
        self.descriptor.is_mappable()
    }

    /// Number of physical allocations.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// All physical allocations.
    pub fn slots(&self) -> &[BufferSlot] {
        &self.slots
    }

    /// The allocation used while recording frame `frame_index`.
    pub fn slot(&self, frame_index: usize) -> &BufferSlot {
        &self.slots[frame_index % self.slots.len()]
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        for slot in &self.slots {
            self.retired.retire(slot.id);
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .field("slots", &self.slots.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(Buffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn dummy(raw: u64) -> GpuBuffer {
        GpuBuffer::Dummy {
            buffer: vk::Buffer::from_raw(raw),
            memory: None,
        }
    }

    #[test]
    fn test_buffer_debug() {
        let desc = BufferDescriptor::new(1024, BufferUsage::VERTEX);
        let buffer = Buffer::new(desc, vec![dummy(1)], Arc::default());
        let debug = format!("{:?}", buffer);
        assert!(debug.contains("Buffer"));
        assert!(debug.contains("1024"));
    }

    #[test]
    fn test_slot_selection_wraps_frame_index() {
        let desc = BufferDescriptor::new(64, BufferUsage::UNIFORM).with_multi_frame();
        let buffer = Buffer::new(desc, vec![dummy(1), dummy(2)], Arc::default());
        assert_eq!(buffer.slot(0).raw(), vk::Buffer::from_raw(1));
        assert_eq!(buffer.slot(1).raw(), vk::Buffer::from_raw(2));
        assert_eq!(buffer.slot(2).raw(), vk::Buffer::from_raw(1));
        assert_ne!(buffer.slot(0).id(), buffer.slot(1).id());
    }

    #[test]
    fn test_single_slot_ignores_frame_index() {
        let desc = BufferDescriptor::new(64, BufferUsage::VERTEX);
        let buffer = Buffer::new(desc, vec![dummy(7)], Arc::default());
        assert_eq!(buffer.slot(5).id(), buffer.slot(0).id());
    }

    #[test]
    fn test_drop_retires_every_slot() {
        let retired = Arc::new(RetiredResources::default());
        let desc = BufferDescriptor::new(64, BufferUsage::UNIFORM).with_multi_frame();
        let buffer = Buffer::new(desc, vec![dummy(1), dummy(2)], Arc::clone(&retired));
        let ids: Vec<_> = buffer.slots().iter().map(BufferSlot::id).collect();
        drop(buffer);
        assert_eq!(retired.drain(), ids);
    }
}
