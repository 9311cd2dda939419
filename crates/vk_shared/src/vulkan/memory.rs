//! GPU memory through `vk-mem`
//!
//! Buffers and images keep an `Arc` to the allocator, so they may be dropped
//! in any order relative to each other as long as they go before the device.

use ash::{vk, Device, Instance};
use bytemuck::Pod;
use std::sync::Arc;
use vk_mem::Alloc;

use super::error::{VulkanError, VulkanResult};

/// Where an allocation should live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// Device local, not mappable
    GpuOnly,
    /// Host visible and coherent, written sequentially by the CPU
    CpuToGpu,
    /// Host visible and coherent, read back by the CPU
    GpuToCpu,
}

impl MemoryLocation {
    /// Whether the CPU may map allocations in this location
    pub fn is_host_visible(self) -> bool {
        !matches!(self, Self::GpuOnly)
    }

    /// `vk-mem` allocation parameters for this location
    pub fn allocation_create_info(self) -> vk_mem::AllocationCreateInfo {
        let host_coherent = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        match self {
            Self::GpuOnly => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            Self::CpuToGpu => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferHost,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                required_flags: host_coherent,
                ..Default::default()
            },
            Self::GpuToCpu => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferHost,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
                required_flags: host_coherent,
                ..Default::default()
            },
        }
    }
}

/// Shared `vk-mem` allocator
pub struct GpuAllocator {
    allocator: vk_mem::Allocator,
}

impl GpuAllocator {
    /// Create an allocator for a Vulkan 1.3 device
    pub fn new(instance: &Instance, device: &Device, physical_device: vk::PhysicalDevice) -> VulkanResult<Arc<Self>> {
        let create_info = vk_mem::AllocatorCreateInfo::new(instance, device, physical_device)
            .vulkan_api_version(vk::API_VERSION_1_3);
        #[allow(unused_unsafe)]
        let allocator = unsafe { vk_mem::Allocator::new(create_info) }
            .map_err(|e| VulkanError::Allocation(format!("Failed to create allocator: {e:?}")))?;
        Ok(Arc::new(Self { allocator }))
    }

    /// Underlying `vk-mem` allocator
    pub fn raw(&self) -> &vk_mem::Allocator {
        &self.allocator
    }
}

/// Buffer with its allocation
pub struct GpuBuffer {
    allocator: Arc<GpuAllocator>,
    buffer: vk::Buffer,
    allocation: vk_mem::Allocation,
    size: vk::DeviceSize,
    location: MemoryLocation,
}

impl GpuBuffer {
    /// Allocate a buffer of `size` bytes
    pub fn new(
        allocator: &Arc<GpuAllocator>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::Allocation("buffer size must be non-zero".to_string()));
        }
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let (buffer, allocation) = unsafe {
            allocator
                .raw()
                .create_buffer(&buffer_info, &location.allocation_create_info())
        }
        .map_err(|e| VulkanError::Allocation(format!("Buffer of {size} bytes: {e:?}")))?;

        Ok(Self {
            allocator: Arc::clone(allocator),
            buffer,
            allocation,
            size,
            location,
        })
    }

    /// Host-visible buffer initialised with `data`
    pub fn with_data<T: Pod>(
        allocator: &Arc<GpuAllocator>,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut buffer = Self::new(allocator, bytes.len() as vk::DeviceSize, usage, MemoryLocation::CpuToGpu)?;
        buffer.write(data)?;
        Ok(buffer)
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Whole-buffer descriptor info
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range: self.size,
        }
    }

    /// Copy `data` to the start of the buffer
    pub fn write<T: Pod>(&mut self, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        check_host_access(self.location, bytes.len() as vk::DeviceSize, self.size)?;

        let allocator = self.allocator.raw();
        unsafe {
            let mapped = allocator
                .map_memory(&mut self.allocation)
                .map_err(|e| VulkanError::Allocation(format!("map_memory: {e:?}")))?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped, bytes.len());
            allocator.unmap_memory(&mut self.allocation);
        }
        Ok(())
    }

    /// Copy the whole buffer out as `T`s
    pub fn read<T: Pod>(&mut self) -> VulkanResult<Vec<T>> {
        check_host_access(self.location, 0, self.size)?;
        let len = self.size as usize;

        let allocator = self.allocator.raw();
        let bytes = unsafe {
            let mapped = allocator
                .map_memory(&mut self.allocation)
                .map_err(|e| VulkanError::Allocation(format!("map_memory: {e:?}")))?;
            let bytes = std::slice::from_raw_parts(mapped.cast_const(), len).to_vec();
            allocator.unmap_memory(&mut self.allocation);
            bytes
        };
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            self.allocator.raw().destroy_buffer(self.buffer, &mut self.allocation);
        }
    }
}

fn check_host_access(location: MemoryLocation, len: vk::DeviceSize, capacity: vk::DeviceSize) -> VulkanResult<()> {
    if !location.is_host_visible() {
        return Err(VulkanError::Allocation(format!("{location:?} memory is not host visible")));
    }
    if len > capacity {
        return Err(VulkanError::Allocation(format!(
            "write of {len} bytes exceeds buffer size {capacity}"
        )));
    }
    Ok(())
}

/// 2D image parameters
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    /// Size in pixels
    pub extent: vk::Extent2D,
    /// Pixel format
    pub format: vk::Format,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Aspect used for the default view
    pub aspect: vk::ImageAspectFlags,
}

impl ImageDesc {
    /// Colour image
    pub fn color(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            extent,
            format,
            usage,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    /// Depth attachment
    pub fn depth(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            extent,
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
        }
    }

    /// Row-major byte size for a tightly packed 4-byte-per-pixel copy
    pub fn rgba8_byte_size(&self) -> vk::DeviceSize {
        u64::from(self.extent.width) * u64::from(self.extent.height) * 4
    }
}

/// Image, default view, allocation and optional sampler
pub struct GpuImage {
    allocator: Arc<GpuAllocator>,
    device: Device,
    image: vk::Image,
    view: vk::ImageView,
    allocation: vk_mem::Allocation,
    sampler: Option<vk::Sampler>,
    desc: ImageDesc,
}

impl GpuImage {
    /// Create a device-local 2D image with one mip level and a view
    pub fn new(allocator: &Arc<GpuAllocator>, device: &Device, desc: ImageDesc) -> VulkanResult<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let (image, mut allocation) = unsafe {
            allocator
                .raw()
                .create_image(&image_info, &MemoryLocation::GpuOnly.allocation_create_info())
        }
        .map_err(|e| {
            VulkanError::Allocation(format!(
                "Image {}x{} {:?}: {e:?}",
                desc.extent.width, desc.extent.height, desc.format
            ))
        })?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(subresource_range(desc.aspect));

        let view = match unsafe { device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { allocator.raw().destroy_image(image, &mut allocation) };
                return Err(VulkanError::Api(e));
            }
        };

        Ok(Self {
            allocator: Arc::clone(allocator),
            device: device.clone(),
            image,
            view,
            allocation,
            sampler: None,
            desc,
        })
    }

    /// Attach a clamp-to-edge sampler with the given filter
    pub fn with_sampler(mut self, filter: vk::Filter) -> VulkanResult<Self> {
        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(1.0);
        self.sampler = Some(unsafe { self.device.create_sampler(&sampler_info, None)? });
        Ok(self)
    }

    /// Image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Default view
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Sampler, if one was attached
    pub fn sampler(&self) -> Option<vk::Sampler> {
        self.sampler
    }

    /// Creation parameters
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    /// Size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    /// Pixel format
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    /// Descriptor info for sampling in `SHADER_READ_ONLY_OPTIMAL`
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler.unwrap_or_default(),
            image_view: self.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        unsafe {
            if let Some(sampler) = self.sampler.take() {
                self.device.destroy_sampler(sampler, None);
            }
            self.device.destroy_image_view(self.view, None);
            self.allocator.raw().destroy_image(self.image, &mut self.allocation);
        }
    }
}

/// Single mip, single layer range for `aspect`
pub fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_only_not_host_visible() {
        assert!(!MemoryLocation::GpuOnly.is_host_visible());
        let info = MemoryLocation::GpuOnly.allocation_create_info();
        assert_eq!(info.required_flags, vk::MemoryPropertyFlags::empty());
    }

    #[test]
    fn test_host_locations_require_coherent_memory() {
        for location in [MemoryLocation::CpuToGpu, MemoryLocation::GpuToCpu] {
            assert!(location.is_host_visible());
            let info = location.allocation_create_info();
            assert!(info
                .required_flags
                .contains(vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT));
        }
        assert!(MemoryLocation::CpuToGpu
            .allocation_create_info()
            .flags
            .contains(vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE));
        assert!(MemoryLocation::GpuToCpu
            .allocation_create_info()
            .flags
            .contains(vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM));
    }

    #[test]
    fn test_host_access_checks() {
        assert!(check_host_access(MemoryLocation::GpuOnly, 4, 16).is_err());
        assert!(check_host_access(MemoryLocation::CpuToGpu, 16, 16).is_ok());
        assert!(check_host_access(MemoryLocation::CpuToGpu, 17, 16).is_err());
        assert!(check_host_access(MemoryLocation::GpuToCpu, 0, 16).is_ok());
    }

    #[test]
    fn test_image_desc_helpers() {
        let extent = vk::Extent2D { width: 64, height: 32 };
        let depth = ImageDesc::depth(extent, vk::Format::D16_UNORM);
        assert_eq!(depth.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(depth.usage, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);

        let color = ImageDesc::color(extent, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED);
        assert_eq!(color.rgba8_byte_size(), 64 * 32 * 4);
    }

    #[test]
    fn test_subresource_range_single_level() {
        let range = subresource_range(vk::ImageAspectFlags::COLOR);
        assert_eq!(range.level_count, 1);
        assert_eq!(range.layer_count, 1);
    }
}
