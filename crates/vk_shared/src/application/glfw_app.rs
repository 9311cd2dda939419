//! Windowed application with a swapchain and frame pacing
//!
//! [`GlfwApplication`] drives the [`FrameScheduler`] against the real
//! swapchain: it waits on frame fences, acquires images, submits and
//! presents, and recreates the swapchain whenever the scheduler asks for it.

use ash::vk;

use super::base::Application;
use super::{AppError, AppResult};
use crate::core::SampleConfig;
use crate::events::AppEvent;
use crate::foundation::time::Timer;
use crate::vulkan::barrier::{cmd_transition, ImageTransition};
use crate::vulkan::commands::{self, RenderingTarget};
use crate::vulkan::frame::{AcquireOutcome, FrameScheduler, FrameSyncSet, PresentOutcome};
use crate::vulkan::memory::subresource_range;
use crate::vulkan::swapchain::{DepthImages, Swapchain};
use crate::vulkan::VulkanError;
use crate::window::Window;

/// Everything a sample needs to record one frame
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    /// Frame-in-flight slot, for indexing per-frame resources
    pub slot: usize,
    /// Acquired swapchain image
    pub image_index: u32,
    /// Command buffer in the recording state
    pub command_buffer: vk::CommandBuffer,
    /// Swapchain colour image
    pub color_image: vk::Image,
    /// View of the colour image
    pub color_view: vk::ImageView,
    /// Depth image paired with the colour image
    pub depth_image: vk::Image,
    /// View of the depth image
    pub depth_view: vk::ImageView,
    /// Swapchain colour format
    pub format: vk::Format,
    /// Swapchain extent
    pub extent: vk::Extent2D,
}

impl Frame {
    /// Rendering target for the swapchain image, optionally with depth
    pub fn rendering_target(&self, clear_color: Option<[f32; 4]>, with_depth: bool) -> RenderingTarget {
        RenderingTarget {
            color_view: self.color_view,
            clear_color,
            depth_view: with_depth.then_some(self.depth_view),
            extent: self.extent,
        }
    }
}

/// Per-sample hooks called by [`GlfwApplication::run`]
pub trait Sample {
    /// React to a window or input event
    fn handle_event(&mut self, _app: &mut GlfwApplication, _event: &AppEvent) -> AppResult<()> {
        Ok(())
    }

    /// Advance simulation state by `delta_time` seconds
    fn update(&mut self, _app: &mut GlfwApplication, _delta_time: f32) -> AppResult<()> {
        Ok(())
    }

    /// Record the frame's commands, leaving the colour image ready to present
    fn record(&mut self, app: &GlfwApplication, frame: &Frame) -> AppResult<()>;

    /// Rebuild anything sized to the swapchain
    fn on_swapchain_recreated(&mut self, _app: &GlfwApplication) -> AppResult<()> {
        Ok(())
    }

    /// Release resources; the device is idle
    fn cleanup(&mut self, _app: &GlfwApplication) {}
}

/// Application with a GLFW window and a swapchain
pub struct GlfwApplication {
    // Field order is drop order: swapchain resources, then the device, then the window
    depth_images: DepthImages,
    swapchain: Swapchain,
    frame_sync: FrameSyncSet,
    scheduler: FrameScheduler,
    timer: Timer,
    pending_events: Vec<AppEvent>,
    swapchain_recreated: bool,
    app: Application,
    window: Window,
}

impl GlfwApplication {
    /// Open the window and build the device, swapchain and frame sync objects
    pub fn new(config: SampleConfig) -> AppResult<Self> {
        config.validate()?;
        let window = Window::new(&config.window)?;
        let app = Application::new(config, Some(&window))?;

        let swapchain = create_swapchain(&app, window.framebuffer_size(), vk::SwapchainKHR::null())?;
        let image_count = swapchain.image_count();
        let depth_images = DepthImages::new(app.allocator(), app.device(), swapchain.extent(), image_count)?;

        let frames_in_flight = app.command_buffer_count();
        let frame_sync = FrameSyncSet::new(app.device().clone(), frames_in_flight, image_count)?;
        let scheduler = FrameScheduler::new(frames_in_flight, image_count);

        Ok(Self {
            depth_images,
            swapchain,
            frame_sync,
            scheduler,
            timer: Timer::new(),
            pending_events: Vec::new(),
            swapchain_recreated: false,
            app,
            window,
        })
    }

    /// Base application
    pub fn app(&self) -> &Application {
        &self.app
    }

    /// Window
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Current swapchain
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Frame pacing state
    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    /// Frame timer
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    /// Swapchain colour format
    pub fn color_format(&self) -> vk::Format {
        self.swapchain.format()
    }

    /// Swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Number of frames that may be in flight
    pub fn max_frames_in_flight(&self) -> usize {
        self.scheduler.max_frames_in_flight()
    }

    /// Advance the frame timer; returns seconds since the previous tick
    pub fn tick(&mut self) -> f32 {
        self.timer.tick().as_secs_f32()
    }

    /// Whether the window was asked to close
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Ask the run loop to stop after this iteration
    pub fn request_close(&mut self) {
        self.window.set_should_close(true);
    }

    /// Poll window events; framebuffer resizes are reported to the scheduler
    pub fn poll_events(&mut self) -> Vec<AppEvent> {
        let mut events = std::mem::take(&mut self.pending_events);
        events.extend(self.window.poll_events());
        for event in &events {
            if let AppEvent::Resized { width, height } = event {
                log::debug!("Framebuffer resized to {width}x{height}");
                self.scheduler.notify_resized();
            }
        }
        events
    }

    /// Whether the swapchain was recreated since the last call
    pub fn take_swapchain_recreated(&mut self) -> bool {
        std::mem::take(&mut self.swapchain_recreated)
    }

    /// Wait for the frame slot, acquire an image and begin its command buffer
    ///
    /// Returns `None` when the swapchain had to be recreated instead; the
    /// caller skips the frame.
    pub fn begin_frame(&mut self) -> AppResult<Option<Frame>> {
        if self.scheduler.needs_recreate() {
            self.recreate_swapchain()?;
            if self.scheduler.needs_recreate() {
                return Ok(None);
            }
        }

        let slot = self.scheduler.begin_frame()?;
        let sync = self.frame_sync.frame(slot);
        sync.in_flight.wait(u64::MAX)?;

        let acquired = self.swapchain.acquire_next_image(sync.image_available.handle());
        let (image_index, wait_on_frame) = match self.scheduler.on_acquire(acquired)? {
            AcquireOutcome::Proceed {
                image_index,
                wait_on_frame,
            } => (image_index, wait_on_frame),
            AcquireOutcome::Recreate => {
                // The fence stays signalled so the next wait does not block
                self.recreate_swapchain()?;
                return Ok(None);
            }
        };

        if let Some(owner) = wait_on_frame {
            self.frame_sync.frame(owner).in_flight.wait(u64::MAX)?;
        }
        self.frame_sync.frame(slot).in_flight.reset()?;

        let command_buffer = self.app.command_buffer(slot);
        commands::begin_command_buffer(
            self.app.device(),
            command_buffer,
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        )?;

        let depth = self.depth_images.get(image_index);
        Ok(Some(Frame {
            slot,
            image_index,
            command_buffer,
            color_image: self.swapchain.image(image_index),
            color_view: self.swapchain.image_view(image_index),
            depth_image: depth.handle(),
            depth_view: depth.view(),
            format: self.swapchain.format(),
            extent: self.swapchain.extent(),
        }))
    }

    /// End recording, submit, present and recreate the swapchain if needed
    pub fn submit_and_present(&mut self, frame: Frame) -> AppResult<()> {
        let device = self.app.device();
        commands::end_command_buffer(device, frame.command_buffer)?;

        let sync = self.frame_sync.frame(frame.slot);
        let render_finished = self.frame_sync.render_finished(frame.image_index).handle();

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer];
        let signal_semaphores = [render_finished];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .queue_submit(self.app.graphics_queue(), &[submit_info.build()], sync.in_flight.handle())
                .map_err(VulkanError::Api)?;
        }
        self.scheduler.on_submit()?;

        let logical = self.app.logical_device();
        let present_queue = logical.present_queue.unwrap_or(logical.graphics_queue);
        let presented = self
            .swapchain
            .queue_present(present_queue, frame.image_index, render_finished);

        if self.scheduler.on_present(presented)? == PresentOutcome::Recreate {
            self.recreate_swapchain()?;
        }
        Ok(())
    }

    /// Rebuild the swapchain and everything sized to it
    ///
    /// Blocks while the window is minimised. Returns early, leaving the
    /// scheduler in `NeedsRecreate`, if the window is closed meanwhile.
    pub fn recreate_swapchain(&mut self) -> AppResult<()> {
        let mut size = self.window.framebuffer_size();
        while size.0 == 0 || size.1 == 0 {
            let events = self.window.wait_events();
            self.pending_events.extend(events);
            if self.window.should_close() {
                return Ok(());
            }
            size = self.window.framebuffer_size();
        }

        self.app.wait_idle()?;

        let swapchain = create_swapchain(&self.app, size, self.swapchain.handle())?;
        // Old swapchain is retired here, after the new one exists
        self.swapchain = swapchain;
        let image_count = self.swapchain.image_count();
        self.depth_images = DepthImages::new(
            self.app.allocator(),
            self.app.device(),
            self.swapchain.extent(),
            image_count,
        )?;
        self.frame_sync.rebuild_image_semaphores(image_count)?;
        self.scheduler.on_swapchain_recreated(image_count)?;
        self.swapchain_recreated = true;
        Ok(())
    }

    /// Transition the swapchain image to `COLOR_ATTACHMENT_OPTIMAL`, discarding contents
    pub fn cmd_color_to_render_target(&self, frame: &Frame) {
        cmd_transition(
            self.app.device(),
            frame.command_buffer,
            frame.color_image,
            vk::ImageAspectFlags::COLOR,
            ImageTransition::UNDEFINED_TO_COLOR_ATTACHMENT,
        );
    }

    /// Transition the swapchain image from colour attachment to present
    pub fn cmd_color_to_present(&self, frame: &Frame) {
        cmd_transition(
            self.app.device(),
            frame.command_buffer,
            frame.color_image,
            vk::ImageAspectFlags::COLOR,
            ImageTransition::COLOR_ATTACHMENT_TO_PRESENT,
        );
    }

    /// Clear the swapchain image with a transfer and leave it as a colour attachment
    pub fn cmd_clear_color(&self, frame: &Frame, color: [f32; 4]) {
        let device = self.app.device();
        cmd_transition(
            device,
            frame.command_buffer,
            frame.color_image,
            vk::ImageAspectFlags::COLOR,
            ImageTransition::UNDEFINED_TO_TRANSFER_DST,
        );
        unsafe {
            device.cmd_clear_color_image(
                frame.command_buffer,
                frame.color_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk::ClearColorValue { float32: color },
                &[subresource_range(vk::ImageAspectFlags::COLOR)],
            );
        }
        cmd_transition(
            device,
            frame.command_buffer,
            frame.color_image,
            vk::ImageAspectFlags::COLOR,
            ImageTransition::TRANSFER_DST_TO_COLOR_ATTACHMENT,
        );
    }

    /// Transition the frame's depth image to `DEPTH_ATTACHMENT_OPTIMAL`
    pub fn cmd_depth_to_attachment(&self, frame: &Frame) {
        cmd_transition(
            self.app.device(),
            frame.command_buffer,
            frame.depth_image,
            vk::ImageAspectFlags::DEPTH,
            ImageTransition::UNDEFINED_TO_DEPTH_ATTACHMENT,
        );
    }

    /// One loop iteration: events, update, then a frame if one can be acquired
    fn step<S: Sample>(&mut self, sample: &mut S) -> AppResult<()> {
        for event in self.poll_events() {
            sample.handle_event(self, &event)?;
        }

        let delta_time = self.tick();
        sample.update(self, delta_time)?;

        if let Some(frame) = self.begin_frame()? {
            sample.record(self, &frame)?;
            self.submit_and_present(frame)?;
        }

        if self.take_swapchain_recreated() {
            sample.on_swapchain_recreated(self)?;
        }

        self.log_fps();
        Ok(())
    }

    /// Periodic frame rate trace
    pub fn log_fps(&self) {
        if self.timer.frame_count() % 600 == 0 {
            log::debug!("{:.1} fps", self.timer.current_fps());
        }
    }

    /// Wait idle and log the session summary
    pub fn finish(&self) -> AppResult<()> {
        self.app.wait_idle()?;
        log::info!(
            "Exited main loop after {} frames ({:.1} fps average)",
            self.timer.frame_count(),
            self.timer.average_fps()
        );
        Ok(())
    }

    /// Run `sample` until the window closes, then wait idle and clean up
    pub fn run<S: Sample>(&mut self, sample: &mut S) -> AppResult<()> {
        log::info!("Entering main loop");
        let result = loop {
            if self.should_close() {
                break Ok(());
            }
            if let Err(e) = self.step(sample) {
                break Err(e);
            }
        };

        self.finish()?;
        sample.cleanup(self);
        result
    }
}

fn create_swapchain(app: &Application, framebuffer: (u32, u32), old: vk::SwapchainKHR) -> AppResult<Swapchain> {
    let surface = app.surface().ok_or_else(|| {
        AppError::Vulkan(VulkanError::InitializationFailed(
            "application was created without a surface".to_string(),
        ))
    })?;
    let renderer = &app.config().renderer;
    Ok(Swapchain::new(
        app.logical_device(),
        app.physical_device(),
        &surface.loader,
        surface.surface,
        framebuffer,
        renderer.surface_format.to_vk(),
        renderer.present_mode.to_vk(),
        old,
    )?)
}
