//! Validation layer output and command buffer labels.

use std::ffi::{CStr, CString};

use ash::vk;

use crate::error::GraphicsError;

/// Route validation messages into `log`.
pub fn create_debug_messenger(
    debug_utils: &ash::ext::debug_utils::Instance,
) -> Result<vk::DebugUtilsMessengerEXT, GraphicsError> {
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
    })
}

fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::Level::Error,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::Level::Info,
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => log::Level::Debug,
        _ => log::Level::Trace,
    }
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    // SAFETY: the driver passes either null or a valid callback data struct
    // whose message is null or a null-terminated string.
    let message = match unsafe { callback_data.as_ref() } {
        Some(data) if !data.p_message.is_null() => unsafe { CStr::from_ptr(data.p_message) }
            .to_string_lossy()
            .into_owned(),
        _ => String::from("(no message)"),
    };

    let kind = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    log::log!(severity_level(message_severity), "[Vulkan {}] {}", kind, message);
    vk::FALSE
}

/// Open a named region in `cmd`. Interior nul bytes are dropped from the name.
pub fn begin_label(
    debug_utils: &ash::ext::debug_utils::Device,
    cmd: vk::CommandBuffer,
    name: &str,
) {
    let name = CString::new(name.replace('\0', "")).unwrap_or_default();
    let label = vk::DebugUtilsLabelEXT::default().label_name(&name);
    unsafe { debug_utils.cmd_begin_debug_utils_label(cmd, &label) };
}

pub fn end_label(debug_utils: &ash::ext::debug_utils::Device, cmd: vk::CommandBuffer) {
    unsafe { debug_utils.cmd_end_debug_utils_label(cmd) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_level() {
        assert_eq!(
            severity_level(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR),
            log::Level::Error
        );
        assert_eq!(
            severity_level(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE),
            log::Level::Debug
        );
    }
}
