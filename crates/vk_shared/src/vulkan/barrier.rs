//! Image layout transitions with synchronization2 barriers

use ash::{vk, Device};

use super::memory::subresource_range;

/// Layout change plus the access and stage masks on each side of it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransition {
    /// Layout before the barrier
    pub old_layout: vk::ImageLayout,
    /// Layout after the barrier
    pub new_layout: vk::ImageLayout,
    /// Writes to make available
    pub src_access: vk::AccessFlags2,
    /// Accesses that wait on them
    pub dst_access: vk::AccessFlags2,
    /// Stages to wait for
    pub src_stage: vk::PipelineStageFlags2,
    /// Stages that wait
    pub dst_stage: vk::PipelineStageFlags2,
}

impl ImageTransition {
    /// Discard contents and prepare for colour writes
    pub const UNDEFINED_TO_COLOR_ATTACHMENT: Self = Self {
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        src_access: vk::AccessFlags2::NONE,
        dst_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        dst_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
    };

    /// Hand a rendered swapchain image to the presentation engine
    pub const COLOR_ATTACHMENT_TO_PRESENT: Self = Self {
        old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        dst_access: vk::AccessFlags2::NONE,
        src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        dst_stage: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
    };

    /// Discard contents and prepare for a clear or copy
    pub const UNDEFINED_TO_TRANSFER_DST: Self = Self {
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        src_access: vk::AccessFlags2::NONE,
        dst_access: vk::AccessFlags2::TRANSFER_WRITE,
        src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
        dst_stage: vk::PipelineStageFlags2::TRANSFER,
    };

    /// Render on top of a cleared or copied image
    pub const TRANSFER_DST_TO_COLOR_ATTACHMENT: Self = Self {
        old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        src_access: vk::AccessFlags2::TRANSFER_WRITE,
        dst_access: vk::AccessFlags2::from_raw(
            vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw() | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw(),
        ),
        src_stage: vk::PipelineStageFlags2::TRANSFER,
        dst_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
    };

    /// Read back a rendered image
    pub const COLOR_ATTACHMENT_TO_TRANSFER_SRC: Self = Self {
        old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        dst_access: vk::AccessFlags2::TRANSFER_READ,
        src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        dst_stage: vk::PipelineStageFlags2::TRANSFER,
    };

    /// Sample a rendered image in a later fragment shader
    pub const COLOR_ATTACHMENT_TO_SHADER_READ: Self = Self {
        old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        dst_access: vk::AccessFlags2::SHADER_SAMPLED_READ,
        src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
    };

    /// Sample an uploaded image
    pub const TRANSFER_DST_TO_SHADER_READ: Self = Self {
        old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        src_access: vk::AccessFlags2::TRANSFER_WRITE,
        dst_access: vk::AccessFlags2::SHADER_SAMPLED_READ,
        src_stage: vk::PipelineStageFlags2::TRANSFER,
        dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
    };

    /// Discard contents and prepare for depth testing
    pub const UNDEFINED_TO_DEPTH_ATTACHMENT: Self = Self {
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        src_access: vk::AccessFlags2::NONE,
        dst_access: vk::AccessFlags2::from_raw(
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
        ),
        src_stage: vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
        ),
        dst_stage: vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
        ),
    };

    /// Barrier for the first mip level and layer of `image`
    pub fn barrier(&self, image: vk::Image, aspect: vk::ImageAspectFlags) -> vk::ImageMemoryBarrier2 {
        vk::ImageMemoryBarrier2::builder()
            .src_stage_mask(self.src_stage)
            .src_access_mask(self.src_access)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range(aspect))
            .build()
    }
}

/// Record a single image layout transition
pub fn cmd_transition(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    transition: ImageTransition,
) {
    let barriers = [transition.barrier(image, aspect)];
    let dependency_info = vk::DependencyInfo::builder().image_memory_barriers(&barriers);
    unsafe { device.cmd_pipeline_barrier2(command_buffer, &dependency_info) };
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ImageTransition; 8] = [
        ImageTransition::UNDEFINED_TO_COLOR_ATTACHMENT,
        ImageTransition::COLOR_ATTACHMENT_TO_PRESENT,
        ImageTransition::UNDEFINED_TO_TRANSFER_DST,
        ImageTransition::TRANSFER_DST_TO_COLOR_ATTACHMENT,
        ImageTransition::COLOR_ATTACHMENT_TO_TRANSFER_SRC,
        ImageTransition::COLOR_ATTACHMENT_TO_SHADER_READ,
        ImageTransition::TRANSFER_DST_TO_SHADER_READ,
        ImageTransition::UNDEFINED_TO_DEPTH_ATTACHMENT,
    ];

    #[test]
    fn test_transitions_change_layout() {
        for t in ALL {
            assert_ne!(t.old_layout, t.new_layout);
        }
    }

    #[test]
    fn test_undefined_sources_have_no_access() {
        for t in ALL.iter().filter(|t| t.old_layout == vk::ImageLayout::UNDEFINED) {
            assert_eq!(t.src_access, vk::AccessFlags2::NONE);
        }
    }

    #[test]
    fn test_transitions_chain() {
        // Swapchain path used every frame
        assert_eq!(
            ImageTransition::UNDEFINED_TO_COLOR_ATTACHMENT.new_layout,
            ImageTransition::COLOR_ATTACHMENT_TO_PRESENT.old_layout
        );
        // Clear-then-draw path
        assert_eq!(
            ImageTransition::UNDEFINED_TO_TRANSFER_DST.new_layout,
            ImageTransition::TRANSFER_DST_TO_COLOR_ATTACHMENT.old_layout
        );
    }

    #[test]
    fn test_write_then_read_access() {
        let t = ImageTransition::COLOR_ATTACHMENT_TO_SHADER_READ;
        assert!(t.src_access.contains(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE));
        assert!(t.dst_access.contains(vk::AccessFlags2::SHADER_SAMPLED_READ));
        assert_eq!(t.dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);

        let depth = ImageTransition::UNDEFINED_TO_DEPTH_ATTACHMENT;
        assert!(depth
            .dst_access
            .contains(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert!(depth.dst_stage.contains(vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS));
    }

    #[test]
    fn test_barrier_fields() {
        let image = vk::Image::null();
        let barrier = ImageTransition::COLOR_ATTACHMENT_TO_TRANSFER_SRC.barrier(image, vk::ImageAspectFlags::COLOR);
        assert_eq!(barrier.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert_eq!(barrier.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }
}
