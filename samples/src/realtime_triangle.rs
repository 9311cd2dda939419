//! Windowed triangle sample
//!
//! Renders a triangle straight into the swapchain with dynamic rendering.
//! The vertex colours cycle with time through a push constant. Resize and
//! minimise are handled by the shared frame loop; the pipeline is only
//! rebuilt if the swapchain comes back with a different format.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use vk_shared::application::{AppResult, Frame, GlfwApplication, Sample};
use vk_shared::core::SampleConfig;
use vk_shared::events::{AppEvent, KeyCode};
use vk_shared::foundation::logging;
use vk_shared::vulkan::commands::{cmd_begin_rendering, cmd_end_rendering, cmd_set_viewport_and_scissor};
use vk_shared::vulkan::{GraphicsPipelineBuilder, Pipeline};

const CLEAR_COLOR: [f32; 4] = [0.02, 0.02, 0.03, 1.0];

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TrianglePushConstants {
    time: f32,
}

struct TriangleSample {
    pipeline: Option<Pipeline>,
    format: vk::Format,
    time: f32,
}

impl TriangleSample {
    fn new(app: &GlfwApplication) -> AppResult<Self> {
        let format = app.color_format();
        Ok(Self {
            pipeline: Some(create_pipeline(app, format)?),
            format,
            time: 0.0,
        })
    }
}

fn create_pipeline(app: &GlfwApplication, format: vk::Format) -> AppResult<Pipeline> {
    let base = app.app();
    let vertex = base.create_shader_module("triangle.vert.spv")?;
    let fragment = base.create_shader_module("triangle.frag.spv")?;
    let pipeline = GraphicsPipelineBuilder::new(format)
        .vertex_fragment(&vertex, &fragment)
        .push_constant_range(
            vk::ShaderStageFlags::VERTEX,
            0,
            std::mem::size_of::<TrianglePushConstants>() as u32,
        )
        .build(base.device())?;
    log::debug!("Triangle pipeline built for {format:?}");
    Ok(pipeline)
}

impl Sample for TriangleSample {
    fn handle_event(&mut self, app: &mut GlfwApplication, event: &AppEvent) -> AppResult<()> {
        if event.is_key_pressed(KeyCode::Escape) {
            app.request_close();
        }
        Ok(())
    }

    fn update(&mut self, _app: &mut GlfwApplication, delta_time: f32) -> AppResult<()> {
        self.time += delta_time;
        Ok(())
    }

    fn record(&mut self, app: &GlfwApplication, frame: &Frame) -> AppResult<()> {
        let device = app.app().device();
        let cb = frame.command_buffer;

        app.cmd_color_to_render_target(frame);
        cmd_begin_rendering(device, cb, &frame.rendering_target(Some(CLEAR_COLOR), false));
        if let Some(pipeline) = &self.pipeline {
            pipeline.cmd_bind(cb);
            cmd_set_viewport_and_scissor(device, cb, frame.extent);
            let constants = TrianglePushConstants { time: self.time };
            pipeline.cmd_push_constants(cb, vk::ShaderStageFlags::VERTEX, 0, bytemuck::bytes_of(&constants));
            unsafe { device.cmd_draw(cb, 3, 1, 0, 0) };
        }
        cmd_end_rendering(device, cb);
        app.cmd_color_to_present(frame);
        Ok(())
    }

    fn on_swapchain_recreated(&mut self, app: &GlfwApplication) -> AppResult<()> {
        let extent = app.extent();
        log::info!("Swapchain recreated at {}x{}", extent.width, extent.height);
        if app.color_format() != self.format {
            self.format = app.color_format();
            self.pipeline = Some(create_pipeline(app, self.format)?);
        }
        Ok(())
    }

    fn cleanup(&mut self, _app: &GlfwApplication) {
        self.pipeline = None;
    }
}

fn main() {
    let config = SampleConfig::new("realtime_triangle").with_window_size(1280, 720);
    logging::init(&config.log_level);

    if let Err(e) = run(config) {
        log::error!("realtime_triangle failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: SampleConfig) -> AppResult<()> {
    let mut app = GlfwApplication::new(config)?;
    let mut sample = TriangleSample::new(&app)?;
    app.run(&mut sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constants_fit_minimum_limit() {
        // Every implementation guarantees 128 bytes
        assert!(std::mem::size_of::<TrianglePushConstants>() <= 128);
        assert_eq!(std::mem::size_of::<TrianglePushConstants>(), 4);
    }
}
