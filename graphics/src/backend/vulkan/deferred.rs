//! Deferred destruction of Vulkan objects.
//!
//! Command buffers execute up to `frames_in_flight` frames behind the CPU,
//! so a native object cannot be destroyed the moment its owner lets go of it.
//! Objects are queued in the slot of the frame that released them and are
//! destroyed once that slot comes around again, after its fence has been
//! waited on.
//!
//! ```text
//! frame N (slot s)     : object released -> queues[s]
//! frame N + frames     : fence[s] waited -> queues[s] destroyed
//! ```

use std::sync::Weak;
use std::sync::atomic::{AtomicUsize, Ordering};

use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};
use parking_lot::Mutex;

/// A native object pending destruction.
pub enum DeferredResource {
    Buffer {
        device: ash::Device,
        buffer: vk::Buffer,
        allocation: Option<Allocation>,
    },
    /// An image together with its default view and sampler.
    Texture {
        device: ash::Device,
        image: vk::Image,
        view: vk::ImageView,
        sampler: vk::Sampler,
        allocation: Option<Allocation>,
    },
    Shader {
        device: ash::Device,
        pipeline_layout: vk::PipelineLayout,
        set_layouts: Vec<vk::DescriptorSetLayout>,
        modules: Vec<vk::ShaderModule>,
    },
    QueryPool {
        device: ash::Device,
        pool: vk::QueryPool,
    },
    RenderPass {
        device: ash::Device,
        render_pass: vk::RenderPass,
    },
    Framebuffer {
        device: ash::Device,
        framebuffer: vk::Framebuffer,
    },
    Pipeline {
        device: ash::Device,
        pipeline: vk::Pipeline,
    },
    DescriptorSet {
        device: ash::Device,
        pool: vk::DescriptorPool,
        set: vk::DescriptorSet,
    },
}

// SAFETY: DeferredResource only holds Vulkan handles and an ash::Device, which
// is a table of function pointers. None of them are tied to a thread.
unsafe impl Send for DeferredResource {}
unsafe impl Sync for DeferredResource {}

impl DeferredResource {
    /// Destroy the object now. Allocations are returned to `allocator` when it
    /// is still alive and simply dropped otherwise.
    ///
    /// # Safety
    ///
    /// The GPU must no longer use the object.
    pub unsafe fn destroy(self, allocator: Option<&Mutex<Allocator>>) {
        let free = |allocation: Option<Allocation>, what: &str| {
            if let (Some(allocation), Some(allocator)) = (allocation, allocator)
                && let Err(e) = allocator.lock().free(allocation)
            {
                log::error!("Failed to free {} allocation: {}", what, e);
            }
        };

        match self {
            Self::Buffer {
                device,
                buffer,
                allocation,
            } => {
                free(allocation, "buffer");
                unsafe { device.destroy_buffer(buffer, None) };
            }
            Self::Texture {
                device,
                image,
                view,
                sampler,
                allocation,
            } => {
                free(allocation, "texture");
                unsafe {
                    device.destroy_sampler(sampler, None);
                    device.destroy_image_view(view, None);
                    device.destroy_image(image, None);
                }
            }
            Self::Shader {
                device,
                pipeline_layout,
                set_layouts,
                modules,
            } => unsafe {
                device.destroy_pipeline_layout(pipeline_layout, None);
                for layout in set_layouts {
                    device.destroy_descriptor_set_layout(layout, None);
                }
                for module in modules {
                    device.destroy_shader_module(module, None);
                }
            },
            Self::QueryPool { device, pool } => unsafe { device.destroy_query_pool(pool, None) },
            Self::RenderPass {
                device,
                render_pass,
            } => unsafe { device.destroy_render_pass(render_pass, None) },
            Self::Framebuffer {
                device,
                framebuffer,
            } => unsafe { device.destroy_framebuffer(framebuffer, None) },
            Self::Pipeline { device, pipeline } => unsafe { device.destroy_pipeline(pipeline, None) },
            Self::DescriptorSet { device, pool, set } => {
                if let Err(e) = unsafe { device.free_descriptor_sets(pool, &[set]) } {
                    log::error!("Failed to free descriptor set: {:?}", e);
                }
            }
        }
    }
}

/// Per-frame queues of objects waiting for the GPU to finish with them.
pub struct DeferredDestructor {
    /// One queue per frame slot.
    queues: Vec<Mutex<Vec<DeferredResource>>>,
    /// Slot of the frame currently being recorded.
    current_slot: AtomicUsize,
    allocator: Mutex<Option<Weak<Mutex<Allocator>>>>,
}

impl std::fmt::Debug for DeferredDestructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredDestructor")
            .field("slots", &self.queues.len())
            .field("current_slot", &self.current_slot.load(Ordering::Relaxed))
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

impl DeferredDestructor {
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is zero.
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "at least one frame slot is required");
        Self {
            queues: (0..frames_in_flight).map(|_| Mutex::default()).collect(),
            current_slot: AtomicUsize::new(0),
            allocator: Mutex::new(None),
        }
    }

    /// Must be set before any allocation-backed object is queued, or its
    /// memory is only reclaimed when the allocator itself goes away.
    pub fn set_allocator(&self, allocator: Weak<Mutex<Allocator>>) {
        *self.allocator.lock() = Some(allocator);
    }

    pub fn queue(&self, resource: DeferredResource) {
        let slot = self.current_slot.load(Ordering::Acquire);
        self.queues[slot].lock().push(resource);
    }

    /// Make `slot` current and destroy everything released the last time it
    /// was recorded.
    ///
    /// # Safety
    ///
    /// The fence of `slot` must have been waited on.
    pub unsafe fn begin_slot(&self, slot: usize) {
        let slot = slot % self.queues.len();
        self.current_slot.store(slot, Ordering::Release);

        let resources = std::mem::take(&mut *self.queues[slot].lock());
        if resources.is_empty() {
            return;
        }
        log::trace!(
            "DeferredDestructor: destroying {} objects from slot {}",
            resources.len(),
            slot
        );
        let allocator = self.allocator.lock().as_ref().and_then(Weak::upgrade);
        for resource in resources {
            // SAFETY: the caller waited on this slot's fence.
            unsafe { resource.destroy(allocator.as_deref()) };
        }
    }

    /// Destroy every queued object.
    ///
    /// # Safety
    ///
    /// The device must be idle.
    pub unsafe fn flush_all(&self) {
        let allocator = self.allocator.lock().as_ref().and_then(Weak::upgrade);
        for queue in &self.queues {
            for resource in std::mem::take(&mut *queue.lock()) {
                // SAFETY: the caller guarantees the device is idle.
                unsafe { resource.destroy(allocator.as_deref()) };
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.queues.iter().map(|q| q.lock().len()).sum()
    }

    pub fn slot_count(&self) -> usize {
        self.queues.len()
    }

    pub fn current_slot(&self) -> usize {
        self.current_slot.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_cycling() {
        let destructor = DeferredDestructor::new(2);
        assert_eq!(destructor.slot_count(), 2);
        assert_eq!(destructor.current_slot(), 0);
        assert_eq!(destructor.pending_count(), 0);

        for frame in 0..6 {
            unsafe { destructor.begin_slot(frame) };
            assert_eq!(destructor.current_slot(), frame % 2);
        }
    }

    #[test]
    #[should_panic(expected = "at least one frame slot")]
    fn test_zero_slots_panics() {
        let _ = DeferredDestructor::new(0);
    }
}
