//! Physical device selection and logical device creation

use ash::extensions::khr::{PushDescriptor, Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Instance};
use std::collections::BTreeSet;
use std::ffi::{c_char, CStr};

use super::error::{VulkanError, VulkanResult};

/// Queue families chosen on a physical device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// First family with graphics support
    pub graphics: Option<u32>,
    /// Family used for presentation
    pub present: Option<u32>,
    /// First family with compute support
    pub compute: Option<u32>,
}

impl QueueFamilyIndices {
    /// Pick queue families from their properties
    ///
    /// The graphics family is preferred for presentation when it can present,
    /// so a single queue serves both on most hardware.
    pub fn find(families: &[vk::QueueFamilyProperties], present_support: impl Fn(u32) -> bool) -> Self {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            if family.queue_count == 0 {
                continue;
            }
            if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }
            if indices.compute.is_none() && family.queue_flags.contains(vk::QueueFlags::COMPUTE) {
                indices.compute = Some(index);
            }
        }

        indices.present = match indices.graphics {
            Some(graphics) if present_support(graphics) => Some(graphics),
            _ => (0..families.len() as u32).find(|&i| families[i as usize].queue_count > 0 && present_support(i)),
        };

        indices
    }

    /// Whether the families needed for the chosen mode were found
    pub fn is_complete(&self, require_present: bool) -> bool {
        self.graphics.is_some() && (!require_present || self.present.is_some())
    }

    /// Distinct families, one queue each
    pub fn unique(&self) -> BTreeSet<u32> {
        [self.graphics, self.present, self.compute].into_iter().flatten().collect()
    }
}

/// Surface a device must be able to present to
#[derive(Clone, Copy)]
pub struct SurfaceSupport<'a> {
    /// Surface extension loader
    pub loader: &'a Surface,
    /// Target surface
    pub surface: vk::SurfaceKHR,
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Chosen queue families
    pub queue_families: QueueFamilyIndices,
    /// Human readable device name
    pub name: String,
}

impl PhysicalDeviceInfo {
    /// Select the first device meeting queue, API version and extension requirements
    pub fn select(
        instance: &Instance,
        surface: Option<SurfaceSupport<'_>>,
        required_extensions: &[&CStr],
    ) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices()? };
        if devices.is_empty() {
            return Err(VulkanError::NoSuitableDevice("no Vulkan devices found".to_string()));
        }

        let mut rejections = Vec::new();
        for device in devices {
            match Self::evaluate(instance, device, surface, required_extensions) {
                Ok(info) => {
                    log::info!("Selected GPU: {}", info.name);
                    return Ok(info);
                }
                Err(reason) => rejections.push(reason),
            }
        }

        Err(VulkanError::NoSuitableDevice(rejections.join("; ")))
    }

    fn evaluate(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: Option<SurfaceSupport<'_>>,
        required_extensions: &[&CStr],
    ) -> Result<Self, String> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        if properties.api_version < vk::API_VERSION_1_3 {
            return Err(format!(
                "{name}: Vulkan {}.{} < 1.3",
                vk::api_version_major(properties.api_version),
                vk::api_version_minor(properties.api_version)
            ));
        }

        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let queue_families = QueueFamilyIndices::find(&families, |index| match surface {
            Some(s) => unsafe { s.loader.get_physical_device_surface_support(device, index, s.surface) }
                .unwrap_or(false),
            None => false,
        });
        if !queue_families.is_complete(surface.is_some()) {
            return Err(format!("{name}: missing graphics or present queue"));
        }

        let available = unsafe { instance.enumerate_device_extension_properties(device) }
            .map_err(|e| format!("{name}: {e:?}"))?;
        let available: Vec<&CStr> = available
            .iter()
            .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) })
            .collect();
        if let Some(missing) = super::instance::first_missing(&available, required_extensions) {
            return Err(format!("{name}: missing {}", missing.to_string_lossy()));
        }

        if let Some(s) = surface {
            let formats = unsafe { s.loader.get_physical_device_surface_formats(device, s.surface) }
                .unwrap_or_default();
            let modes = unsafe { s.loader.get_physical_device_surface_present_modes(device, s.surface) }
                .unwrap_or_default();
            if formats.is_empty() || modes.is_empty() {
                return Err(format!("{name}: surface has no formats or present modes"));
            }
        }

        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

        Ok(Self {
            device,
            properties,
            memory_properties,
            queue_families,
            name,
        })
    }
}

/// Device extensions the shared library always needs
pub fn required_device_extensions(presenting: bool) -> Vec<&'static CStr> {
    let mut extensions = vec![PushDescriptor::name()];
    if presenting {
        extensions.push(SwapchainLoader::name());
    }
    extensions
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics queue
    pub graphics_queue: vk::Queue,
    /// Presentation queue, when a surface was requested
    pub present_queue: Option<vk::Queue>,
    /// Compute queue
    pub compute_queue: Option<vk::Queue>,
    /// Families the queues came from
    pub queue_families: QueueFamilyIndices,
    /// Swapchain function table, when presenting
    pub swapchain_loader: Option<SwapchainLoader>,
    /// `VK_KHR_push_descriptor` function table
    pub push_descriptor: PushDescriptor,
}

impl LogicalDevice {
    /// Create the device with one queue per unique family
    ///
    /// Enables Vulkan 1.3 dynamic rendering and synchronization2.
    pub fn new(instance: &Instance, physical: &PhysicalDeviceInfo, presenting: bool) -> VulkanResult<Self> {
        let families = physical.queue_families;
        let graphics_family = families
            .graphics
            .ok_or_else(|| VulkanError::NoSuitableDevice("no graphics queue".to_string()))?;

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions = required_device_extensions(presenting);
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        let mut vulkan13 = vk::PhysicalDeviceVulkan13Features::builder()
            .dynamic_rendering(true)
            .synchronization2(true);
        let mut features2 = vk::PhysicalDeviceFeatures2::builder().push_next(&mut vulkan13);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .push_next(&mut features2);

        let device = unsafe { instance.create_device(physical.device, &create_info, None)? };

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = if presenting {
            families.present.map(|f| unsafe { device.get_device_queue(f, 0) })
        } else {
            None
        };
        let compute_queue = families.compute.map(|f| unsafe { device.get_device_queue(f, 0) });

        let swapchain_loader = presenting.then(|| SwapchainLoader::new(instance, &device));
        let push_descriptor = PushDescriptor::new(instance, &device);

        log::debug!(
            "Created logical device with {} queue(s), extensions {:?}",
            queue_infos.len(),
            extensions
        );

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            compute_queue,
            queue_families: families,
            swapchain_loader,
            push_descriptor,
        })
    }

    /// Graphics queue family index
    pub fn graphics_family(&self) -> u32 {
        self.queue_families.graphics.unwrap_or_default()
    }

    /// Swapchain loader, or an error for headless devices
    pub fn swapchain_loader(&self) -> VulkanResult<&SwapchainLoader> {
        self.swapchain_loader
            .as_ref()
            .ok_or_else(|| VulkanError::MissingExtension("VK_KHR_swapchain (headless device)".to_string()))
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_graphics_family_preferred_for_present() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let indices = QueueFamilyIndices::find(&families, |_| true);
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
        assert_eq!(indices.compute, Some(1));
        assert_eq!(indices.unique().len(), 1);
    }

    #[test]
    fn test_separate_present_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = QueueFamilyIndices::find(&families, |i| i == 2);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(2));
        assert_eq!(indices.compute, Some(1));
        assert_eq!(indices.unique().into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(indices.is_complete(true));
    }

    #[test]
    fn test_headless_is_complete_without_present() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = QueueFamilyIndices::find(&families, |_| false);
        assert_eq!(indices.present, None);
        assert!(indices.is_complete(false));
        assert!(!indices.is_complete(true));
    }

    #[test]
    fn test_no_graphics_family() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        let indices = QueueFamilyIndices::find(&families, |_| true);
        assert!(!indices.is_complete(false));
        assert_eq!(indices.compute, Some(0));
    }

    #[test]
    fn test_empty_family_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::find(&families, |_| true);
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
    }

    #[test]
    fn test_required_extensions() {
        assert_eq!(required_device_extensions(false), vec![PushDescriptor::name()]);
        assert!(required_device_extensions(true).contains(&SwapchainLoader::name()));
    }
}
