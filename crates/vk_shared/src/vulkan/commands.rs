//! Command pools, command buffer recording and one-shot submission

use ash::{vk, Device};

use super::error::VulkanResult;
use super::sync::Fence;

/// Command pool wrapper with RAII cleanup
///
/// Buffers may be reset individually, so frame buffers are reused instead of
/// reallocated.
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Create a pool for `queue_family_index`
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe { device.create_command_pool(&pool_create_info, None)? };

        Ok(Self {
            device,
            command_pool,
            queue_family_index,
        })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        Ok(unsafe { self.device.allocate_command_buffers(&alloc_info)? })
    }

    /// Return command buffers to the pool
    pub fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if !buffers.is_empty() {
            unsafe { self.device.free_command_buffers(self.command_pool, buffers) };
        }
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Queue family the pool allocates for
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            // Frees every buffer allocated from the pool
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Reset and begin a reusable command buffer
pub fn begin_command_buffer(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> VulkanResult<()> {
    let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
    unsafe {
        device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
        device.begin_command_buffer(command_buffer, &begin_info)?;
    }
    Ok(())
}

/// Finish recording
pub fn end_command_buffer(device: &Device, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
    unsafe { device.end_command_buffer(command_buffer)? };
    Ok(())
}

/// Full-extent viewport and scissor, for pipelines with dynamic viewport state
pub fn cmd_set_viewport_and_scissor(device: &Device, command_buffer: vk::CommandBuffer, extent: vk::Extent2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    unsafe {
        device.cmd_set_viewport(command_buffer, 0, &[viewport]);
        device.cmd_set_scissor(command_buffer, 0, &[scissor]);
    }
}

/// One colour attachment and an optional depth attachment for dynamic rendering
#[derive(Debug, Clone, Copy)]
pub struct RenderingTarget {
    /// Colour view in `COLOR_ATTACHMENT_OPTIMAL`
    pub color_view: vk::ImageView,
    /// Clear colour, or `None` to load existing contents
    pub clear_color: Option<[f32; 4]>,
    /// Depth view in `DEPTH_ATTACHMENT_OPTIMAL`, cleared to 1.0
    pub depth_view: Option<vk::ImageView>,
    /// Render area
    pub extent: vk::Extent2D,
}

/// Begin dynamic rendering into `target`
pub fn cmd_begin_rendering(device: &Device, command_buffer: vk::CommandBuffer, target: &RenderingTarget) {
    let color_attachment = vk::RenderingAttachmentInfo::builder()
        .image_view(target.color_view)
        .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .load_op(if target.clear_color.is_some() {
            vk::AttachmentLoadOp::CLEAR
        } else {
            vk::AttachmentLoadOp::LOAD
        })
        .store_op(vk::AttachmentStoreOp::STORE)
        .clear_value(vk::ClearValue {
            color: vk::ClearColorValue {
                float32: target.clear_color.unwrap_or([0.0; 4]),
            },
        })
        .build();

    let depth_attachment = target.depth_view.map(|view| {
        vk::RenderingAttachmentInfo::builder()
            .image_view(view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            })
            .build()
    });

    let color_attachments = [color_attachment];
    let mut rendering_info = vk::RenderingInfo::builder()
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: target.extent,
        })
        .layer_count(1)
        .color_attachments(&color_attachments);
    if let Some(depth) = depth_attachment.as_ref() {
        rendering_info = rendering_info.depth_attachment(depth);
    }

    unsafe { device.cmd_begin_rendering(command_buffer, &rendering_info) };
}

/// End dynamic rendering
pub fn cmd_end_rendering(device: &Device, command_buffer: vk::CommandBuffer) {
    unsafe { device.cmd_end_rendering(command_buffer) };
}

/// Command buffer for a single blocking submission
///
/// Recording starts on creation; [`submit_and_wait`](Self::submit_and_wait)
/// submits to `queue`, waits on a fence and frees the buffer.
pub struct OneTimeCommands<'a> {
    device: &'a Device,
    pool: &'a CommandPool,
    command_buffer: vk::CommandBuffer,
}

impl<'a> OneTimeCommands<'a> {
    /// Allocate a buffer from `pool` and begin recording
    pub fn begin(device: &'a Device, pool: &'a CommandPool) -> VulkanResult<Self> {
        let command_buffer = pool
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_OUT_OF_HOST_MEMORY)?;
        let commands = Self {
            device,
            pool,
            command_buffer,
        };
        let begin_info =
            vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(command_buffer, &begin_info)? };
        Ok(commands)
    }

    /// Buffer being recorded
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// End, submit and block until the GPU finishes
    pub fn submit_and_wait(self, queue: vk::Queue) -> VulkanResult<()> {
        unsafe { self.device.end_command_buffer(self.command_buffer)? };
        submit_and_wait(self.device, queue, self.command_buffer)
    }
}

impl Drop for OneTimeCommands<'_> {
    fn drop(&mut self) {
        self.pool.free_command_buffers(&[self.command_buffer]);
    }
}

/// Submit a recorded command buffer and block on a fresh fence
pub fn submit_and_wait(device: &Device, queue: vk::Queue, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
    let fence = Fence::new(device.clone(), false)?;
    let command_buffers = [command_buffer];
    let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
    unsafe { device.queue_submit(queue, &[submit_info.build()], fence.handle())? };
    fence.wait(u64::MAX)
}
