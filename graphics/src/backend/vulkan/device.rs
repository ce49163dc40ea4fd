//! Physical device selection and logical device creation.

use ash::vk;

use crate::error::GraphicsError;

/// The chosen adapter and the properties the backend keeps around.
#[derive(Debug, Clone, Copy)]
pub struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub queue_family: u32,
    /// Nanoseconds per timestamp tick. Zero when the queue has no timestamps.
    pub timestamp_period: f32,
    pub non_coherent_atom_size: u64,
    pub sampler_anisotropy: bool,
}

/// Pick the best adapter with a graphics and compute queue.
///
/// Discrete GPUs are preferred over integrated ones.
pub fn select_physical_device(instance: &ash::Instance) -> Result<SelectedDevice, GraphicsError> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        GraphicsError::InitializationFailed(format!(
            "Failed to enumerate physical devices: {:?}",
            e
        ))
    })?;

    if devices.is_empty() {
        return Err(GraphicsError::InitializationFailed(
            "No Vulkan-capable GPU found".to_string(),
        ));
    }

    let mut best: Option<(u32, SelectedDevice)> = None;
    for physical_device in devices {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let features = unsafe { instance.get_physical_device_features(physical_device) };
        let name = properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let Some((queue_family, timestamp_bits)) = find_queue_family(instance, physical_device)
        else {
            log::info!("Skipping GPU {:?}: no graphics and compute queue", name);
            continue;
        };

        let mut score = match properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            _ => 0,
        };
        score += properties.limits.max_image_dimension2_d / 1024;

        log::info!(
            "Found GPU: {:?} (type: {:?}, score: {})",
            name,
            properties.device_type,
            score
        );

        let candidate = SelectedDevice {
            physical_device,
            queue_family,
            timestamp_period: if timestamp_bits > 0 {
                properties.limits.timestamp_period
            } else {
                0.0
            },
            non_coherent_atom_size: properties.limits.non_coherent_atom_size.max(1),
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        };
        if best.as_ref().is_none_or(|(best_score, _)| score > *best_score) {
            best = Some((score, candidate));
        }
    }

    best.map(|(_, device)| device)
        .ok_or_else(|| GraphicsError::InitializationFailed("No suitable GPU found".to_string()))
}

/// First queue family supporting both graphics and compute, with its
/// timestamp valid bits.
fn find_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Option<(u32, u32)> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    families
        .iter()
        .position(|family| {
            family
                .queue_flags
                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        })
        .map(|index| (index as u32, families[index].timestamp_valid_bits))
}

pub fn create_logical_device(
    instance: &ash::Instance,
    selected: &SelectedDevice,
) -> Result<ash::Device, GraphicsError> {
    let priorities = [1.0f32];
    let queue_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(selected.queue_family)
        .queue_priorities(&priorities)];

    let supported =
        unsafe { instance.get_physical_device_features(selected.physical_device) };
    let features = vk::PhysicalDeviceFeatures::default()
        .sampler_anisotropy(selected.sampler_anisotropy)
        .fill_mode_non_solid(supported.fill_mode_non_solid == vk::TRUE);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_features(&features);

    unsafe { instance.create_device(selected.physical_device, &create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create logical device: {:?}", e))
    })
}
