//! GPU memory allocation through gpu-allocator.

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::types::BufferUsage;

pub fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
) -> Result<Allocator, GraphicsError> {
    Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device,
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    })
    .map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create memory allocator: {}", e))
    })
}

/// Where a buffer with `usage` lives. Only mappable buffers get host-visible
/// memory; everything else is written through staging copies.
pub fn buffer_location(usage: BufferUsage) -> MemoryLocation {
    if usage.contains(BufferUsage::MAP_READ) {
        MemoryLocation::GpuToCpu
    } else if usage.contains(BufferUsage::MAP_WRITE) {
        MemoryLocation::CpuToGpu
    } else {
        MemoryLocation::GpuOnly
    }
}

/// Allocate memory for `requirements` and turn allocator failures into
/// [`GraphicsError::OutOfMemory`] where that is what they are.
pub fn allocate(
    allocator: &Mutex<Allocator>,
    name: &str,
    requirements: vk::MemoryRequirements,
    location: MemoryLocation,
    linear: bool,
) -> Result<Allocation, GraphicsError> {
    allocator
        .lock()
        .allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .map_err(|e| match e {
            gpu_allocator::AllocationError::OutOfMemory => GraphicsError::OutOfMemory,
            other => GraphicsError::ResourceCreationFailed(format!(
                "Failed to allocate memory for {}: {}",
                name, other
            )),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_location() {
        assert_eq!(
            buffer_location(BufferUsage::MAP_READ | BufferUsage::COPY_DST),
            MemoryLocation::GpuToCpu
        );
        assert_eq!(
            buffer_location(BufferUsage::MAP_WRITE | BufferUsage::UNIFORM),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            buffer_location(BufferUsage::VERTEX | BufferUsage::COPY_DST),
            MemoryLocation::GpuOnly
        );
    }
}
