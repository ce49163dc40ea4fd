//! Vulkan backend implementation using ash.
//!
//! Native objects are allocated with gpu-allocator and released through a
//! [`DeferredDestructor`] once the frame slot that last used them has been
//! waited on. Recorded [`GpuCommand`]s are encoded straight into the current
//! frame's primary command buffer.

mod allocator;
mod command;
mod debug;
pub mod deferred;
mod device;
mod instance;
mod pipeline;

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, Allocator};
use parking_lot::Mutex;

use crate::cache::{FramebufferKey, GraphicsPipelineKey, RenderPassKey};
use crate::device::DeviceParameters;
use crate::error::GraphicsError;
use crate::resources::{Shader, ShaderDescriptor};
use crate::types::{BufferDescriptor, Extent3d, TextureDescriptor};

use super::conversion::{
    aspect_mask, convert_address_mode, convert_binding_kind, convert_buffer_usage,
    convert_compare_function, convert_filter_mode, convert_mipmap_filter_mode,
    convert_texture_usage,
};
use super::{
    DescriptorResource, DescriptorWrite, GpuBackend, GpuBuffer, GpuCommand, GpuQueryPool,
    GpuShader, GpuTexture,
};

pub use deferred::{DeferredDestructor, DeferredResource};

use self::command::{FrameSlot, device_error};
use self::device::SelectedDevice;
use self::pipeline::DescriptorPool;

/// Frame slots and the slot currently being recorded.
struct FrameState {
    slots: Vec<FrameSlot>,
    current: Option<usize>,
}

/// Vulkan-based GPU backend using ash.
///
/// This backend provides:
/// - Validation layers and debug labels when requested
/// - gpu-allocator for memory management
/// - Classic render pass objects, created from cache keys
/// - Deferred resource destruction keyed on frame slots
pub struct VulkanBackend {
    /// Kept alive for the lifetime of the instance.
    _entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    /// Present when validation is enabled; used for command buffer labels.
    debug_labels: Option<ash::ext::debug_utils::Device>,
    selected: SelectedDevice,
    device: ash::Device,
    /// Submission and device-wide waits need exclusive queue access.
    queue: Mutex<vk::Queue>,
    /// Dropped by hand before the device is destroyed.
    allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    deferred: Arc<DeferredDestructor>,
    descriptor_pool: DescriptorPool,
    /// Owns the frame slot command buffers; only touched under `frame`.
    frame_pool: vk::CommandPool,
    frame: Mutex<FrameState>,
    /// Pool for blocking one-shot uploads.
    upload_pool: Mutex<vk::CommandPool>,
}

impl std::fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("validation", &self.debug_messenger.is_some())
            .field("queue_family", &self.selected.queue_family)
            .field("deferred", &self.deferred)
            .finish_non_exhaustive()
    }
}

impl VulkanBackend {
    /// Load Vulkan, pick a device and set up per-frame command buffers.
    pub fn new(params: &DeviceParameters) -> Result<Self, GraphicsError> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to load Vulkan: {}", e))
        })?;

        let instance::InstanceBundle {
            instance,
            debug_utils,
            debug_messenger,
        } = instance::create_instance(&entry, params)?;

        let destroy_instance = || unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&debug_utils, debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            instance.destroy_instance(None);
        };

        let selected = match device::select_physical_device(&instance) {
            Ok(selected) => selected,
            Err(e) => {
                destroy_instance();
                return Err(e);
            }
        };
        let device = match device::create_logical_device(&instance, &selected) {
            Ok(device) => device,
            Err(e) => {
                destroy_instance();
                return Err(e);
            }
        };

        // From here on a failure leaks the device; initialization errors are
        // not recoverable anyway and Auto falls back to the dummy backend.
        let queue = unsafe { device.get_device_queue(selected.queue_family, 0) };

        let allocator = Arc::new(Mutex::new(allocator::create_allocator(
            &instance,
            selected.physical_device,
            device.clone(),
        )?));
        let deferred = Arc::new(DeferredDestructor::new(params.frames_in_flight));
        deferred.set_allocator(Arc::downgrade(&allocator));

        let descriptor_pool = DescriptorPool::new(device.clone(), params.descriptor_pool_size)?;

        let frame_pool = command::create_command_pool(&device, selected.queue_family)?;
        let slots = (0..params.frames_in_flight)
            .map(|_| FrameSlot::new(&device, frame_pool))
            .collect::<Result<Vec<_>, _>>()?;
        let upload_pool = command::create_command_pool(&device, selected.queue_family)?;

        let debug_labels = debug_utils
            .is_some()
            .then(|| ash::ext::debug_utils::Device::new(&instance, &device));

        log::info!(
            "Vulkan backend initialized (validation: {}, frames in flight: {})",
            debug_messenger.is_some(),
            params.frames_in_flight
        );

        Ok(Self {
            _entry: entry,
            instance,
            debug_utils,
            debug_messenger,
            debug_labels,
            selected,
            device,
            queue: Mutex::new(queue),
            allocator: ManuallyDrop::new(allocator),
            deferred,
            descriptor_pool,
            frame_pool,
            frame: Mutex::new(FrameState {
                slots,
                current: None,
            }),
            upload_pool: Mutex::new(upload_pool),
        })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.selected.physical_device
    }

    pub fn queue_family(&self) -> u32 {
        self.selected.queue_family
    }

    pub fn deferred_destructor(&self) -> &Arc<DeferredDestructor> {
        &self.deferred
    }

    /// Allocate and bind memory for a freshly created buffer.
    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        name: &str,
        location: MemoryLocation,
    ) -> Result<Allocation, GraphicsError> {
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let allocation =
            allocator::allocate(&self.allocator, name, requirements, location, true)?;
        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            if let Err(free_error) = self.allocator.lock().free(allocation) {
                log::error!("Failed to free buffer allocation: {}", free_error);
            }
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "Failed to bind buffer memory: {:?}",
                e
            )));
        }
        Ok(allocation)
    }

    fn new_buffer(
        &self,
        name: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<GpuBuffer, GraphicsError> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create buffer: {:?}", e))
        })?;

        let allocation = match self.bind_buffer_memory(buffer, name, location) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };
        let coherent = allocation
            .memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT);

        log::trace!(
            "VulkanBackend: created buffer {:?} ({} bytes, {:?})",
            name,
            size,
            location
        );

        Ok(GpuBuffer::Vulkan {
            device: self.device.clone(),
            buffer,
            allocation: Mutex::new(Some(allocation)),
            coherent,
            deferred: Arc::clone(&self.deferred),
        })
    }

    /// The memory range to flush or invalidate for `offset..offset + len`
    /// within `allocation`, widened to the non-coherent atom size.
    fn mapped_range(
        &self,
        allocation: &Allocation,
        offset: u64,
        len: u64,
    ) -> vk::MappedMemoryRange<'static> {
        let atom = self.selected.non_coherent_atom_size;
        let start = allocation.offset() + offset;
        let aligned_start = start - start % atom;
        let end = start + len;
        let aligned_end = end.div_ceil(atom) * atom;
        vk::MappedMemoryRange::default()
            .memory(unsafe { allocation.memory() })
            .offset(aligned_start)
            .size(aligned_end - aligned_start)
    }

    /// Run `f` with the host pointer to `offset..offset + len` of a mapped
    /// buffer.
    fn with_mapped<R>(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        len: usize,
        f: impl FnOnce(*mut u8, &Allocation, bool) -> Result<R, GraphicsError>,
    ) -> Result<R, GraphicsError> {
        let GpuBuffer::Vulkan {
            allocation,
            coherent,
            ..
        } = buffer
        else {
            return Err(GraphicsError::Internal(
                "Vulkan backend received a non-Vulkan buffer".to_string(),
            ));
        };

        let guard = allocation.lock();
        let Some(allocation) = guard.as_ref() else {
            return Err(GraphicsError::Internal(
                "Buffer allocation is None".to_string(),
            ));
        };
        let Some(mapped) = allocation.mapped_ptr() else {
            return Err(GraphicsError::InvalidParameter(
                "buffer is not mapped for CPU access".to_string(),
            ));
        };
        let end = offset + len as u64;
        if end > allocation.size() {
            return Err(GraphicsError::InvalidParameter(format!(
                "range {}..{} is out of bounds",
                offset, end
            )));
        }

        // SAFETY: the range was checked against the allocation size above.
        let ptr = unsafe { mapped.as_ptr().cast::<u8>().add(offset as usize) };
        f(ptr, allocation, *coherent)
    }

    fn create_sampler(&self, descriptor: &TextureDescriptor) -> Result<vk::Sampler, GraphicsError> {
        let sampler = &descriptor.sampler;
        let anisotropy = self.selected.sampler_anisotropy && sampler.anisotropy_clamp > 1;
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(convert_filter_mode(sampler.mag_filter))
            .min_filter(convert_filter_mode(sampler.min_filter))
            .mipmap_mode(convert_mipmap_filter_mode(sampler.mipmap_filter))
            .address_mode_u(convert_address_mode(sampler.address_mode_u))
            .address_mode_v(convert_address_mode(sampler.address_mode_v))
            .address_mode_w(convert_address_mode(sampler.address_mode_w))
            .mip_lod_bias(0.0)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(f32::from(sampler.anisotropy_clamp))
            .compare_enable(sampler.compare.is_some())
            .compare_op(
                sampler
                    .compare
                    .map(convert_compare_function)
                    .unwrap_or(vk::CompareOp::ALWAYS),
            )
            .min_lod(sampler.lod_min_clamp)
            .max_lod(sampler.lod_max_clamp)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
            .unnormalized_coordinates(false);

        unsafe { self.device.create_sampler(&sampler_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create sampler: {:?}", e))
        })
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            {
                let _queue = self.queue.lock();
                if let Err(e) = self.device.device_wait_idle() {
                    log::error!("Failed to wait for device idle on shutdown: {:?}", e);
                }
            }

            self.deferred.flush_all();
            self.descriptor_pool.destroy();

            for slot in &self.frame.get_mut().slots {
                slot.destroy(&self.device);
            }
            self.device.destroy_command_pool(self.frame_pool, None);
            self.device
                .destroy_command_pool(*self.upload_pool.get_mut(), None);

            // The allocator frees its memory blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);

            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

impl GpuBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan Backend (ash)"
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        self.new_buffer(
            descriptor.label.as_deref().unwrap_or("buffer"),
            descriptor.size,
            convert_buffer_usage(descriptor.usage),
            allocator::buffer_location(descriptor.usage),
        )
    }

    fn create_staging_buffer(&self, data: &[u8]) -> Result<GpuBuffer, GraphicsError> {
        let buffer = self.new_buffer(
            "staging",
            data.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        self.write_buffer(&buffer, 0, data)?;
        Ok(buffer)
    }

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        format: vk::Format,
    ) -> Result<GpuTexture, GraphicsError> {
        let name = descriptor.label.as_deref().unwrap_or("texture");
        let aspect = aspect_mask(descriptor.format);

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(descriptor.size.to_vk())
            .mip_levels(descriptor.mip_level_count.max(1))
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_texture_usage(descriptor.usage, descriptor.format))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&image_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create image: {:?}", e))
        })?;

        // Everything created so far is released through the same path as a
        // finished texture if a later step fails.
        let mut partial = DeferredResource::Texture {
            device: self.device.clone(),
            image,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            allocation: None,
        };
        let result = (|| {
            let requirements = unsafe { self.device.get_image_memory_requirements(image) };
            let allocation = allocator::allocate(
                &self.allocator,
                name,
                requirements,
                MemoryLocation::GpuOnly,
                false,
            )?;
            let memory = unsafe { allocation.memory() };
            let memory_offset = allocation.offset();
            if let DeferredResource::Texture {
                allocation: slot, ..
            } = &mut partial
            {
                *slot = Some(allocation);
            }
            unsafe { self.device.bind_image_memory(image, memory, memory_offset) }.map_err(
                |e| {
                    GraphicsError::ResourceCreationFailed(format!(
                        "Failed to bind image memory: {:?}",
                        e
                    ))
                },
            )?;

            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    // Sampling reads depth only.
                    aspect_mask: if aspect.contains(vk::ImageAspectFlags::DEPTH) {
                        vk::ImageAspectFlags::DEPTH
                    } else {
                        aspect
                    },
                    base_mip_level: 0,
                    level_count: vk::REMAINING_MIP_LEVELS,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { self.device.create_image_view(&view_info, None) }.map_err(
                |e| {
                    GraphicsError::ResourceCreationFailed(format!(
                        "Failed to create image view: {:?}",
                        e
                    ))
                },
            )?;
            if let DeferredResource::Texture { view: slot, .. } = &mut partial {
                *slot = view;
            }

            let sampler = self.create_sampler(descriptor)?;
            Ok::<_, GraphicsError>((view, sampler))
        })();

        match result {
            Ok((view, sampler)) => {
                let DeferredResource::Texture { allocation, .. } = partial else {
                    unreachable!("partial texture changed variant");
                };
                log::trace!(
                    "VulkanBackend: created texture {:?} ({}x{}, {:?})",
                    name,
                    descriptor.size.width,
                    descriptor.size.height,
                    format
                );
                Ok(GpuTexture::Vulkan {
                    device: self.device.clone(),
                    image,
                    view,
                    sampler,
                    allocation: Mutex::new(allocation),
                    deferred: Arc::clone(&self.deferred),
                })
            }
            Err(e) => {
                unsafe { partial.destroy(Some(&**self.allocator)) };
                Err(e)
            }
        }
    }

    fn upload_texture(
        &self,
        texture: &GpuTexture,
        aspect: vk::ImageAspectFlags,
        extent: Extent3d,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let staging = self.create_staging_buffer(data)?;
        let image = texture.image();
        let range = vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: 1,
        };
        let to_transfer = vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(range);
        let to_shader = to_transfer
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        let region = vk::BufferImageCopy::default()
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(extent.to_vk());

        let pool = self.upload_pool.lock();
        let queue = self.queue.lock();
        command::submit_and_wait(&self.device, *pool, *queue, |cmd| unsafe {
            self.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );
            self.device.cmd_copy_buffer_to_image(
                cmd,
                staging.raw(),
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
            self.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_shader],
            );
        })?;

        log::trace!(
            "VulkanBackend: uploaded {} bytes to {}x{} texture",
            data.len(),
            extent.width,
            extent.height
        );
        Ok(())
    }

    fn create_shader(&self, descriptor: &ShaderDescriptor) -> Result<GpuShader, GraphicsError> {
        let shader = pipeline::create_shader(&self.device, descriptor, &self.deferred)?;
        log::trace!("VulkanBackend: created shader {:?}", descriptor.label);
        Ok(shader)
    }

    fn create_query_pool(&self, count: u32) -> Result<GpuQueryPool, GraphicsError> {
        if self.selected.timestamp_period <= 0.0 {
            return Err(GraphicsError::FeatureNotSupported(
                "the graphics queue does not support timestamps".to_string(),
            ));
        }
        let create_info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(count);
        let pool = unsafe { self.device.create_query_pool(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create query pool: {:?}", e))
        })?;
        Ok(GpuQueryPool::Vulkan {
            device: self.device.clone(),
            pool,
            count,
            deferred: Arc::clone(&self.deferred),
        })
    }

    fn create_render_pass(&self, key: &RenderPassKey) -> Result<vk::RenderPass, GraphicsError> {
        log::trace!(
            "VulkanBackend: creating render pass with {} attachments",
            key.attachment_count()
        );
        pipeline::create_render_pass(&self.device, key)
    }

    fn create_framebuffer(&self, key: &FramebufferKey) -> Result<vk::Framebuffer, GraphicsError> {
        log::trace!(
            "VulkanBackend: creating {}x{} framebuffer",
            key.width,
            key.height
        );
        pipeline::create_framebuffer(&self.device, key)
    }

    fn create_graphics_pipeline(
        &self,
        shader: &Shader,
        key: &GraphicsPipelineKey,
    ) -> Result<vk::Pipeline, GraphicsError> {
        ember_core::profile_scope!("create_graphics_pipeline");
        log::debug!(
            "VulkanBackend: creating graphics pipeline for {:?}",
            shader.label()
        );
        pipeline::create_graphics_pipeline(&self.device, shader, key)
    }

    fn create_compute_pipeline(&self, shader: &Shader) -> Result<vk::Pipeline, GraphicsError> {
        ember_core::profile_scope!("create_compute_pipeline");
        log::debug!(
            "VulkanBackend: creating compute pipeline for {:?}",
            shader.label()
        );
        pipeline::create_compute_pipeline(&self.device, shader)
    }

    fn allocate_descriptor_set(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, GraphicsError> {
        self.descriptor_pool.allocate(layout)
    }

    fn write_descriptor_set(&self, writes: &[DescriptorWrite]) {
        enum Info {
            Buffer([vk::DescriptorBufferInfo; 1]),
            Image([vk::DescriptorImageInfo; 1]),
        }

        let infos: Vec<Info> = writes
            .iter()
            .map(|write| match write.resource {
                DescriptorResource::Buffer {
                    buffer,
                    offset,
                    range,
                } => Info::Buffer([vk::DescriptorBufferInfo {
                    buffer,
                    offset,
                    range,
                }]),
                DescriptorResource::Image {
                    view,
                    sampler,
                    layout,
                } => Info::Image([vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: layout,
                }]),
            })
            .collect();

        let vk_writes: Vec<_> = writes
            .iter()
            .zip(&infos)
            .map(|(write, info)| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(write.set)
                    .dst_binding(write.binding)
                    .descriptor_type(convert_binding_kind(write.kind));
                match info {
                    Info::Buffer(buffer) => base.buffer_info(buffer),
                    Info::Image(image) => base.image_info(image),
                }
            })
            .collect();

        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) };
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.deferred.queue(DeferredResource::RenderPass {
            device: self.device.clone(),
            render_pass,
        });
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.deferred.queue(DeferredResource::Framebuffer {
            device: self.device.clone(),
            framebuffer,
        });
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.deferred.queue(DeferredResource::Pipeline {
            device: self.device.clone(),
            pipeline,
        });
    }

    fn free_descriptor_set(&self, set: vk::DescriptorSet) {
        self.deferred.queue(DeferredResource::DescriptorSet {
            device: self.device.clone(),
            pool: self.descriptor_pool.raw(),
            set,
        });
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        self.with_mapped(buffer, offset, data.len(), |ptr, allocation, coherent| {
            // SAFETY: `ptr` points at `data.len()` mapped bytes.
            unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len()) };
            if !coherent {
                let range = self.mapped_range(allocation, offset, data.len() as u64);
                unsafe { self.device.flush_mapped_memory_ranges(&[range]) }
                    .map_err(device_error)?;
            }
            Ok(())
        })
    }

    fn read_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &mut [u8],
    ) -> Result<(), GraphicsError> {
        let len = data.len();
        self.with_mapped(buffer, offset, len, |ptr, allocation, coherent| {
            if !coherent {
                let range = self.mapped_range(allocation, offset, len as u64);
                unsafe { self.device.invalidate_mapped_memory_ranges(&[range]) }
                    .map_err(device_error)?;
            }
            // SAFETY: `ptr` points at `len` mapped bytes.
            unsafe { std::ptr::copy_nonoverlapping(ptr.cast_const(), data.as_mut_ptr(), len) };
            Ok(())
        })
    }

    fn read_timestamps(
        &self,
        pool: &GpuQueryPool,
        first: u32,
        count: u32,
    ) -> Result<Vec<u64>, GraphicsError> {
        let mut ticks = vec![0u64; count as usize];
        unsafe {
            self.device.get_query_pool_results(
                pool.raw(),
                first,
                &mut ticks,
                vk::QueryResultFlags::TYPE_64,
            )
        }
        .map_err(|e| match e {
            vk::Result::NOT_READY => GraphicsError::InvalidParameter(
                "timestamps are not available; the timer has not been submitted".to_string(),
            ),
            other => device_error(other),
        })?;
        Ok(ticks)
    }

    fn timestamp_period(&self) -> f32 {
        self.selected.timestamp_period
    }

    fn supports_debug_labels(&self) -> bool {
        self.debug_labels.is_some()
    }

    fn record(&self, commands: &[GpuCommand]) -> Result<(), GraphicsError> {
        ember_core::profile_scope!("VulkanBackend::record");
        let frame = self.frame.lock();
        let Some(slot) = frame.current else {
            return Err(GraphicsError::Internal(
                "commands recorded outside of a frame".to_string(),
            ));
        };
        let cmd = frame.slots[slot].cmd;
        for command in commands {
            command::encode(&self.device, self.debug_labels.as_ref(), cmd, command);
        }
        Ok(())
    }

    fn begin_frame(&self, frame_slot: usize) -> Result<(), GraphicsError> {
        ember_core::profile_scope!("VulkanBackend::begin_frame");
        let mut frame = self.frame.lock();
        let slot = frame_slot % frame.slots.len();
        let resources = frame.slots[slot];

        resources.wait(&self.device)?;
        // SAFETY: the fence of this slot was just waited on.
        unsafe { self.deferred.begin_slot(slot) };
        resources.begin(&self.device)?;
        frame.current = Some(slot);
        Ok(())
    }

    fn end_frame(&self) -> Result<(), GraphicsError> {
        ember_core::profile_scope!("VulkanBackend::end_frame");
        let mut frame = self.frame.lock();
        let Some(slot) = frame.current.take() else {
            return Err(GraphicsError::Internal(
                "end_frame without begin_frame".to_string(),
            ));
        };
        let queue = self.queue.lock();
        frame.slots[slot].submit(&self.device, *queue)
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        let _queue = self.queue.lock();
        unsafe { self.device.device_wait_idle() }.map_err(device_error)
    }
}

static_assertions::assert_impl_all!(VulkanBackend: Send, Sync);
