//! Swapchain creation, selection policy and per-image depth buffers
//!
//! The `choose_*` helpers are pure so the selection rules can be tested
//! without a surface.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device};
use std::sync::Arc;

use super::device::{LogicalDevice, PhysicalDeviceInfo};
use super::error::{VulkanError, VulkanResult};
use super::memory::{subresource_range, GpuAllocator, GpuImage, ImageDesc};

/// Depth format used for every swapchain-sized depth buffer
pub const DEPTH_FORMAT: vk::Format = vk::Format::D16_UNORM;

/// Surface capabilities, formats and present modes for one device
pub struct SwapchainSupport {
    /// Image count and extent limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format and colour space pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// Query `surface` support on `physical_device`
    pub fn query(loader: &Surface, physical_device: vk::PhysicalDevice, surface: vk::SurfaceKHR) -> VulkanResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: loader.get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: loader.get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }
}

/// Preferred format in sRGB non-linear space, else `B8G8R8A8_SRGB`, else the first listed
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: vk::Format,
) -> Option<vk::SurfaceFormatKHR> {
    let srgb_nonlinear = |format: vk::Format| {
        available
            .iter()
            .copied()
            .find(|sf| sf.format == format && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
    };
    srgb_nonlinear(preferred)
        .or_else(|| srgb_nonlinear(vk::Format::B8G8R8A8_SRGB))
        .or_else(|| available.first().copied())
}

/// Preferred mode when supported, else FIFO
pub fn choose_present_mode(available: &[vk::PresentModeKHR], preferred: vk::PresentModeKHR) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface extent, or the framebuffer size clamped to the surface limits
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: framebuffer.0.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: framebuffer.1.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One image above the minimum, capped by the maximum when there is one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Concurrent sharing when graphics and present queues differ
pub fn sharing_mode(graphics_family: u32, present_family: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family == present_family {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, vec![graphics_family, present_family])
    }
}

/// Swapchain, its images and their views
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for `surface`
    ///
    /// Pass the previous handle as `old_swapchain` when recreating; the caller
    /// drops the old [`Swapchain`] afterwards.
    pub fn new(
        device: &LogicalDevice,
        physical: &PhysicalDeviceInfo,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
        framebuffer: (u32, u32),
        preferred_format: vk::Format,
        preferred_present_mode: vk::PresentModeKHR,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let loader = device.swapchain_loader()?.clone();
        let support = SwapchainSupport::query(surface_loader, physical.device, surface)?;

        let format = choose_surface_format(&support.formats, preferred_format)
            .ok_or_else(|| VulkanError::InitializationFailed("surface reports no formats".to_string()))?;
        let present_mode = choose_present_mode(&support.present_modes, preferred_present_mode);
        let extent = choose_extent(&support.capabilities, framebuffer);
        let image_count = choose_image_count(&support.capabilities);

        let graphics = device.graphics_family();
        let present = device.queue_families.present.unwrap_or(graphics);
        let (image_sharing_mode, queue_family_indices) = sharing_mode(graphics, present);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST,
            )
            .image_sharing_mode(image_sharing_mode)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };
        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };

        let mut swapchain = Self {
            device: device.device.clone(),
            loader,
            swapchain,
            images,
            image_views: Vec::new(),
            format,
            present_mode,
            extent,
        };
        // Views pushed one at a time so Drop cleans up a partial set
        for i in 0..swapchain.images.len() {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(swapchain.images[i])
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR));
            let view = unsafe { swapchain.device.create_image_view(&view_info, None)? };
            swapchain.image_views.push(view);
        }

        log::info!(
            "Swapchain {}x{} {:?} {:?}, {} images",
            extent.width,
            extent.height,
            format.format,
            present_mode,
            swapchain.images.len()
        );
        Ok(swapchain)
    }

    /// Acquire the next image, signalling `semaphore`
    ///
    /// Returns the raw driver result so the frame scheduler can classify it.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        }
    }

    /// Present `image_index` after `wait_semaphore`; `Ok(true)` means suboptimal
    pub fn queue_present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        unsafe { self.loader.queue_present(queue, &present_info) }
    }

    /// Swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Image at `index`
    pub fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }

    /// View of the image at `index`
    pub fn image_view(&self, index: u32) -> vk::ImageView {
        self.image_views[index as usize]
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Colour format of the images
    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    /// Present mode in use
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Image size
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// One depth buffer per swapchain image
pub struct DepthImages {
    images: Vec<GpuImage>,
}

impl DepthImages {
    /// Allocate `count` depth images of `extent`
    pub fn new(allocator: &Arc<GpuAllocator>, device: &Device, extent: vk::Extent2D, count: usize) -> VulkanResult<Self> {
        let desc = ImageDesc::depth(extent, DEPTH_FORMAT);
        let images = (0..count)
            .map(|_| GpuImage::new(allocator, device, desc))
            .collect::<VulkanResult<Vec<_>>>()?;
        Ok(Self { images })
    }

    /// Depth image paired with swapchain image `index`
    pub fn get(&self, index: u32) -> &GpuImage {
        &self.images[index as usize]
    }

    /// Number of depth images
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether no depth images exist
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn caps(min: u32, max: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 16, height: 16 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_preferred_format_wins() {
        let available = [
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&available, vk::Format::R8G8B8A8_SRGB).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_SRGB);
    }

    #[test]
    fn test_format_falls_back_to_bgra_srgb() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&available, vk::Format::R8G8B8A8_SRGB).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_format_wrong_color_space_not_preferred() {
        let available = [
            format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::HDR10_ST2084_EXT),
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        let chosen = choose_surface_format(&available, vk::Format::R8G8B8A8_SRGB).unwrap();
        assert_eq!(chosen.format, vk::Format::A2B10G10R10_UNORM_PACK32);
    }

    #[test]
    fn test_no_formats() {
        assert!(choose_surface_format(&[], vk::Format::B8G8R8A8_SRGB).is_none());
    }

    #[test]
    fn test_present_mode_fallback() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_uses_current_extent() {
        let extent = choose_extent(&caps(2, 3, (800, 600)), (1920, 1080));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_extent_clamps_framebuffer_when_undefined() {
        let c = caps(2, 3, (u32::MAX, u32::MAX));
        let extent = choose_extent(&c, (8000, 8));
        assert_eq!((extent.width, extent.height), (4096, 16));
        let extent = choose_extent(&c, (1280, 640));
        assert_eq!((extent.width, extent.height), (1280, 640));
    }

    #[test]
    fn test_image_count() {
        assert_eq!(choose_image_count(&caps(2, 3, (1, 1))), 3);
        assert_eq!(choose_image_count(&caps(3, 3, (1, 1))), 3);
        // max of zero means unbounded
        assert_eq!(choose_image_count(&caps(2, 0, (1, 1))), 3);
    }

    #[test]
    fn test_sharing_mode() {
        assert_eq!(sharing_mode(0, 0), (vk::SharingMode::EXCLUSIVE, vec![]));
        assert_eq!(sharing_mode(0, 2), (vk::SharingMode::CONCURRENT, vec![0, 2]));
    }
}
