//! Vulkan instance and validation messenger
//!
//! The messenger create info is chained into `vkCreateInstance` so instance
//! creation and destruction are validated too; a standalone messenger is then
//! created for everything in between.

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};
use std::ffi::{c_char, c_void, CStr, CString};

use super::error::{VulkanError, VulkanResult};

/// Khronos validation layer
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create a Vulkan 1.3 instance
    ///
    /// `extra_extensions` usually comes from GLFW. With validation enabled the
    /// Khronos layer and `VK_EXT_debug_utils` are required; either missing is
    /// an error.
    pub fn new(app_name: &str, extra_extensions: &[String], enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed(format!("Invalid application name {app_name:?}")))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"vk_shared")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extension_names = extra_extensions
            .iter()
            .map(|ext| {
                CString::new(ext.as_str())
                    .map_err(|_| VulkanError::MissingExtension(format!("Invalid extension name {ext:?}")))
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let mut layer_names: Vec<&CStr> = Vec::new();
        if enable_validation {
            extension_names.push(DebugUtils::name().to_owned());
            layer_names.push(VALIDATION_LAYER);
        }

        check_layers(&entry, &layer_names)?;
        check_instance_extensions(&entry, &extension_names)?;

        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|e| e.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = layer_names.iter().map(|l| l.as_ptr()).collect();

        let mut instance_messenger_info = debug_messenger_create_info();
        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);
        if enable_validation {
            create_info = create_info.push_next(&mut instance_messenger_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let debug = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger_info = debug_messenger_create_info();
            match unsafe { debug_utils.create_debug_utils_messenger(&messenger_info, None) } {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(VulkanError::Api(e));
                }
            }
        } else {
            None
        };

        log::info!(
            "Created Vulkan instance for {app_name} (validation: {})",
            if enable_validation { "on" } else { "off" }
        );

        Ok(Self { entry, instance, debug })
    }

    /// Whether the validation messenger is active
    pub fn validation_enabled(&self) -> bool {
        self.debug.is_some()
    }

    /// Names of every instance layer the loader reports
    pub fn available_layers(&self) -> VulkanResult<Vec<String>> {
        let layers = self.entry.enumerate_instance_layer_properties()?;
        Ok(layers
            .iter()
            .map(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) }.to_string_lossy().into_owned())
            .collect())
    }

    /// Names of every instance extension the loader reports
    pub fn available_extensions(&self) -> VulkanResult<Vec<String>> {
        let extensions = self.entry.enumerate_instance_extension_properties(None)?;
        Ok(extensions
            .iter()
            .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }.to_string_lossy().into_owned())
            .collect())
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn check_layers(entry: &Entry, required: &[&CStr]) -> VulkanResult<()> {
    if required.is_empty() {
        return Ok(());
    }
    let available = entry.enumerate_instance_layer_properties()?;
    let names: Vec<&CStr> = available
        .iter()
        .map(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) })
        .collect();
    match first_missing(&names, required) {
        Some(missing) => Err(VulkanError::MissingLayer(missing.to_string_lossy().into_owned())),
        None => Ok(()),
    }
}

fn check_instance_extensions(entry: &Entry, required: &[CString]) -> VulkanResult<()> {
    let available = entry.enumerate_instance_extension_properties(None)?;
    let names: Vec<&CStr> = available
        .iter()
        .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) })
        .collect();
    let required: Vec<&CStr> = required.iter().map(CString::as_c_str).collect();
    match first_missing(&names, &required) {
        Some(missing) => Err(VulkanError::MissingExtension(missing.to_string_lossy().into_owned())),
        None => Ok(()),
    }
}

/// First entry of `required` not present in `available`
pub fn first_missing<'a>(available: &[&CStr], required: &[&'a CStr]) -> Option<&'a CStr> {
    required.iter().copied().find(|r| !available.contains(r))
}

/// Messenger settings shared by the chained and standalone messengers
pub fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

/// Log level for a validation message
pub fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Info
    } else {
        log::Level::Trace
    }
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() {
        return vk::FALSE;
    }
    let data = &*callback_data;
    let message = if data.p_message.is_null() {
        "".into()
    } else {
        CStr::from_ptr(data.p_message).to_string_lossy()
    };
    let id_name = if data.p_message_id_name.is_null() {
        "".into()
    } else {
        CStr::from_ptr(data.p_message_id_name).to_string_lossy()
    };

    log::log!(
        target: "vulkan",
        severity_level(message_severity),
        "{message_type:?} [{id_name}] {message}"
    );

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        assert_eq!(severity_level(S::ERROR), log::Level::Error);
        assert_eq!(severity_level(S::WARNING), log::Level::Warn);
        assert_eq!(severity_level(S::INFO), log::Level::Info);
        assert_eq!(severity_level(S::VERBOSE), log::Level::Trace);
    }

    #[test]
    fn test_first_missing() {
        let available = [c"VK_KHR_surface", c"VK_EXT_debug_utils"];
        assert_eq!(first_missing(&available, &[c"VK_KHR_surface"]), None);
        assert_eq!(
            first_missing(&available, &[c"VK_KHR_surface", c"VK_KHR_xcb_surface"]),
            Some(c"VK_KHR_xcb_surface")
        );
        assert_eq!(first_missing(&[], &[]), None);
    }

    #[test]
    fn test_messenger_covers_all_severities() {
        let info = debug_messenger_create_info();
        assert!(info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(info.pfn_user_callback.is_some());
    }
}
