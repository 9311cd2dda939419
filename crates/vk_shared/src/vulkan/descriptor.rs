//! Descriptor pools, set layouts and write helpers

use ash::{vk, Device};

use super::error::VulkanResult;

/// Descriptor set layout with RAII cleanup
pub struct DescriptorSetLayout {
    device: Device,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Create a layout; `push` marks it for `vkCmdPushDescriptorSetKHR`
    pub fn new(device: Device, bindings: &[vk::DescriptorSetLayoutBinding], push: bool) -> VulkanResult<Self> {
        let flags = if push {
            vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR
        } else {
            vk::DescriptorSetLayoutCreateFlags::empty()
        };
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .flags(flags)
            .bindings(bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&create_info, None)? };
        Ok(Self { device, layout })
    }

    /// Layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_set_layout(self.layout, None) };
    }
}

/// Single-descriptor binding
pub fn layout_binding(
    binding: u32,
    descriptor_type: vk::DescriptorType,
    stages: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding {
    vk::DescriptorSetLayoutBinding::builder()
        .binding(binding)
        .descriptor_type(descriptor_type)
        .descriptor_count(1)
        .stage_flags(stages)
        .build()
}

/// Descriptor pool wrapper with RAII cleanup
///
/// Sets are freed together with the pool.
pub struct DescriptorPool {
    device: Device,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a pool holding at most `max_sets` sets
    pub fn new(device: Device, sizes: &[vk::DescriptorPoolSize], max_sets: u32) -> VulkanResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(sizes)
            .max_sets(max_sets);
        let pool = unsafe { device.create_descriptor_pool(&create_info, None)? };
        Ok(Self { device, pool })
    }

    /// Allocate one set per layout in `layouts`
    pub fn allocate_many(&self, layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);
        Ok(unsafe { self.device.allocate_descriptor_sets(&alloc_info)? })
    }

    /// Allocate a single set
    pub fn allocate(&self, layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        self.allocate_many(&[layout])?
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_OUT_OF_POOL_MEMORY.into())
    }

    /// Pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
    }
}

/// Write for a uniform or storage buffer binding
///
/// `info` must outlive the call that consumes the write. For push
/// descriptors `set` is ignored and may be null.
pub fn write_buffer(
    set: vk::DescriptorSet,
    binding: u32,
    descriptor_type: vk::DescriptorType,
    info: &[vk::DescriptorBufferInfo],
) -> vk::WriteDescriptorSet {
    vk::WriteDescriptorSet::builder()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(descriptor_type)
        .buffer_info(info)
        .build()
}

/// Write for a combined image sampler binding
pub fn write_combined_image_sampler(
    set: vk::DescriptorSet,
    binding: u32,
    info: &[vk::DescriptorImageInfo],
) -> vk::WriteDescriptorSet {
    vk::WriteDescriptorSet::builder()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(info)
        .build()
}

/// Apply writes to allocated sets
pub fn update_descriptor_sets(device: &Device, writes: &[vk::WriteDescriptorSet]) {
    unsafe { device.update_descriptor_sets(writes, &[]) };
}
