//! Headless Vulkan application
//!
//! Owns everything a sample needs before it can draw: instance, device,
//! allocator and the graphics command buffers. A window is optional; with one
//! the surface is created here so device selection can check presentation.

use ash::extensions::khr::Surface;
use ash::{vk, Device};
use std::sync::Arc;

use super::{AppError, AppResult};
use crate::core::SampleConfig;
use crate::vulkan::barrier::{cmd_transition, ImageTransition};
use crate::vulkan::commands::{self, CommandPool, OneTimeCommands};
use crate::vulkan::device::{required_device_extensions, LogicalDevice, PhysicalDeviceInfo, SurfaceSupport};
use crate::vulkan::memory::{GpuAllocator, GpuBuffer, GpuImage, ImageDesc, MemoryLocation};
use crate::vulkan::{ShaderModule, VulkanInstance, VulkanResult};
use crate::window::Window;

/// Window surface and its extension loader
pub struct PresentSurface {
    /// `VK_KHR_surface` function table
    pub loader: Surface,
    /// Surface handle
    pub surface: vk::SurfaceKHR,
}

impl Drop for PresentSurface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

/// Base application without a swapchain
///
/// Resources created through it (buffers, images, pipelines) must be dropped
/// before the application.
pub struct Application {
    // Field order is drop order
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: CommandPool,
    allocator: Arc<GpuAllocator>,
    device: LogicalDevice,
    physical: PhysicalDeviceInfo,
    surface: Option<PresentSurface>,
    instance: VulkanInstance,
    config: SampleConfig,
}

impl Application {
    /// Headless application for compute and offscreen samples
    pub fn headless(config: SampleConfig) -> AppResult<Self> {
        Self::new(config, None)
    }

    /// Create the application, presenting to `window` when given
    pub fn new(config: SampleConfig, window: Option<&Window>) -> AppResult<Self> {
        config.validate()?;

        let extensions = match window {
            Some(w) => w.required_instance_extensions()?,
            None => Vec::new(),
        };
        let instance = VulkanInstance::new(
            &config.renderer.application_name,
            &extensions,
            config.renderer.validation_enabled(),
        )?;

        let surface = match window {
            Some(w) => Some(PresentSurface {
                loader: Surface::new(&instance.entry, &instance.instance),
                surface: w.create_vulkan_surface(instance.instance.handle())?,
            }),
            None => None,
        };
        let presenting = surface.is_some();

        let support = surface.as_ref().map(|s| SurfaceSupport {
            loader: &s.loader,
            surface: s.surface,
        });
        let physical =
            PhysicalDeviceInfo::select(&instance.instance, support, &required_device_extensions(presenting))?;
        let device = LogicalDevice::new(&instance.instance, &physical, presenting)?;
        let allocator = GpuAllocator::new(&instance.instance, &device.device, physical.device)?;

        let command_pool = CommandPool::new(device.device.clone(), device.graphics_family())?;
        let command_buffers = command_pool.allocate_command_buffers(config.renderer.max_frames_in_flight as u32)?;

        log::info!(
            "Application '{}' ready ({} command buffers, presenting: {presenting})",
            config.renderer.application_name,
            command_buffers.len()
        );

        Ok(Self {
            command_buffers,
            command_pool,
            allocator,
            device,
            physical,
            surface,
            instance,
            config,
        })
    }

    /// Sample configuration
    pub fn config(&self) -> &SampleConfig {
        &self.config
    }

    /// Instance wrapper
    pub fn instance(&self) -> &VulkanInstance {
        &self.instance
    }

    /// Selected physical device
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    /// Logical device with queues and extension loaders
    pub fn logical_device(&self) -> &LogicalDevice {
        &self.device
    }

    /// `ash` device
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Presentation surface, when created with a window
    pub fn surface(&self) -> Option<&PresentSurface> {
        self.surface.as_ref()
    }

    /// Graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Shared allocator
    pub fn allocator(&self) -> &Arc<GpuAllocator> {
        &self.allocator
    }

    /// Graphics command pool
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Primary command buffer for frame slot `slot`
    pub fn command_buffer(&self, slot: usize) -> vk::CommandBuffer {
        self.command_buffers[slot]
    }

    /// Number of per-frame command buffers
    pub fn command_buffer_count(&self) -> usize {
        self.command_buffers.len()
    }

    /// Allocate a buffer
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> VulkanResult<GpuBuffer> {
        GpuBuffer::new(&self.allocator, size, usage, location)
    }

    /// Allocate a host-visible buffer holding `data`
    pub fn create_buffer_with_data<T: bytemuck::Pod>(
        &self,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<GpuBuffer> {
        GpuBuffer::with_data(&self.allocator, data, usage)
    }

    /// Allocate a device-local image with a view
    pub fn create_image(&self, desc: ImageDesc) -> VulkanResult<GpuImage> {
        GpuImage::new(&self.allocator, self.device(), desc)
    }

    /// Load `file_name` from the configured shader directories
    pub fn create_shader_module(&self, file_name: &str) -> AppResult<ShaderModule> {
        let path = self
            .config
            .shaders
            .resolve(file_name)
            .ok_or_else(|| AppError::ShaderNotFound(file_name.to_string()))?;
        Ok(ShaderModule::from_file(self.device().clone(), path)?)
    }

    /// Begin a command buffer for a single blocking submission
    pub fn one_time_commands(&self) -> VulkanResult<OneTimeCommands<'_>> {
        OneTimeCommands::begin(self.device(), &self.command_pool)
    }

    /// Submit a recorded buffer to the graphics queue and wait for it
    pub fn submit_and_wait(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        commands::submit_and_wait(self.device(), self.graphics_queue(), command_buffer)
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle()
    }

    /// 1x1 sampled image of a single colour, ready in `SHADER_READ_ONLY_OPTIMAL`
    pub fn create_dummy_color_image(&self, rgba: [f32; 4]) -> VulkanResult<GpuImage> {
        let texel = rgba.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        self.create_sampled_image(
            vk::Extent2D { width: 1, height: 1 },
            vk::Format::R8G8B8A8_UNORM,
            &texel,
            vk::Filter::NEAREST,
        )
    }

    /// Upload tightly packed `texels` into a new sampled image
    ///
    /// The copy goes through a staging buffer and the image is left in
    /// `SHADER_READ_ONLY_OPTIMAL`. Blocks until the upload completes.
    pub fn create_sampled_image<T: bytemuck::Pod>(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        texels: &[T],
        filter: vk::Filter,
    ) -> VulkanResult<GpuImage> {
        let staging = self.create_buffer_with_data(texels, vk::BufferUsageFlags::TRANSFER_SRC)?;

        let desc = ImageDesc::color(
            extent,
            format,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        );
        let image = self.create_image(desc)?.with_sampler(filter)?;

        let cmd = self.one_time_commands()?;
        cmd_transition(
            self.device(),
            cmd.command_buffer(),
            image.handle(),
            vk::ImageAspectFlags::COLOR,
            ImageTransition::UNDEFINED_TO_TRANSFER_DST,
        );
        let region = vk::BufferImageCopy::builder()
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .build();
        unsafe {
            self.device().cmd_copy_buffer_to_image(
                cmd.command_buffer(),
                staging.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        cmd_transition(
            self.device(),
            cmd.command_buffer(),
            image.handle(),
            vk::ImageAspectFlags::COLOR,
            ImageTransition::TRANSFER_DST_TO_SHADER_READ,
        );
        cmd.submit_and_wait(self.graphics_queue())?;

        log::debug!("Uploaded {}x{} {format:?} texture", extent.width, extent.height);
        Ok(image)
    }
}
