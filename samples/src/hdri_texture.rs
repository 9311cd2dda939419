//! HDR environment image sample
//!
//! Loads a Radiance `.hdr` file (or any format the `image` crate reads) as
//! 32-bit float texels, uploads it to a sampled image and shows it full
//! screen with Reinhard tone mapping. Up and Down change the exposure by half
//! a stop. Without a path argument a generated sky with a bright sun is shown.
//!
//! ```text
//! cargo run --bin hdri_texture -- little_paris_eiffel_tower_4k.hdr
//! ```

use ash::vk;
use bytemuck::{Pod, Zeroable};
use image::{Rgba, Rgba32FImage};
use std::path::Path;
use vk_shared::application::gamma::target_gamma;
use vk_shared::application::{AppError, AppResult, Frame, GlfwApplication, Sample};
use vk_shared::core::SampleConfig;
use vk_shared::events::{AppEvent, KeyCode};
use vk_shared::foundation::logging;
use vk_shared::vulkan::commands::{cmd_begin_rendering, cmd_end_rendering, cmd_set_viewport_and_scissor};
use vk_shared::vulkan::descriptor::{layout_binding, write_combined_image_sampler};
use vk_shared::vulkan::{DescriptorSetLayout, GpuImage, GraphicsPipelineBuilder, Pipeline};

// Linear filtering of 32-bit float formats is optional, so sample NEAREST
const TEXTURE_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;
const GENERATED_WIDTH: u32 = 1024;
const GENERATED_HEIGHT: u32 = 512;
const EXPOSURE_STEP_STOPS: f32 = 0.5;
const MIN_EXPOSURE_STOPS: f32 = -8.0;
const MAX_EXPOSURE_STOPS: f32 = 8.0;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct HdriPushConstants {
    exposure: f32,
    gamma: f32,
}

/// Decode `path` into linear RGBA float texels
fn load_hdri(path: &Path) -> AppResult<Rgba32FImage> {
    let image = image::open(path).map_err(|e| AppError::Sample(format!("loading {}: {e}", path.display())))?;
    Ok(image.into_rgba32f())
}

/// Equirectangular sky: horizon-to-zenith gradient and a sun well above 1.0
fn generated_sky(width: u32, height: u32) -> Rgba32FImage {
    let sun = (0.3 * width as f32, 0.3 * height as f32);
    let sun_radius = 0.02 * width as f32;

    Rgba32FImage::from_fn(width, height, |x, y| {
        let t = y as f32 / height.max(1) as f32;
        let zenith = [0.15, 0.35, 0.9];
        let horizon = [0.9, 0.8, 0.7];
        let mut rgb = [0.0; 3];
        for (c, value) in rgb.iter_mut().enumerate() {
            *value = zenith[c] + (horizon[c] - zenith[c]) * t;
        }

        let distance = ((x as f32 - sun.0).powi(2) + (y as f32 - sun.1).powi(2)).sqrt();
        if distance < sun_radius {
            rgb = [40.0, 36.0, 30.0];
        }
        Rgba([rgb[0], rgb[1], rgb[2], 1.0])
    })
}

/// Exposure stops after one key press, clamped to a sane range
fn step_exposure(stops: f32, delta: f32) -> f32 {
    (stops + delta).clamp(MIN_EXPOSURE_STOPS, MAX_EXPOSURE_STOPS)
}

struct HdriSample {
    pipeline: Option<Pipeline>,
    texture: Option<GpuImage>,
    set_layout: DescriptorSetLayout,
    format: vk::Format,
    exposure_stops: f32,
}

impl HdriSample {
    fn new(app: &GlfwApplication, hdri: &Rgba32FImage) -> AppResult<Self> {
        let base = app.app();
        let extent = vk::Extent2D {
            width: hdri.width(),
            height: hdri.height(),
        };
        let texture = base.create_sampled_image(extent, TEXTURE_FORMAT, hdri.as_raw(), vk::Filter::NEAREST)?;

        let bindings = [layout_binding(
            0,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
        )];
        let set_layout = DescriptorSetLayout::new(base.device().clone(), &bindings, true)?;

        let format = app.color_format();
        Ok(Self {
            pipeline: Some(create_pipeline(app, format, &set_layout)?),
            texture: Some(texture),
            set_layout,
            format,
            exposure_stops: 0.0,
        })
    }
}

fn create_pipeline(
    app: &GlfwApplication,
    format: vk::Format,
    set_layout: &DescriptorSetLayout,
) -> AppResult<Pipeline> {
    let base = app.app();
    // Fullscreen triangle shared with the gamma pass
    let vertex = base.create_shader_module("gamma.vert.spv")?;
    let fragment = base.create_shader_module("hdri.frag.spv")?;
    let pipeline = GraphicsPipelineBuilder::new(format)
        .vertex_fragment(&vertex, &fragment)
        .push_constant_range(
            vk::ShaderStageFlags::FRAGMENT,
            0,
            std::mem::size_of::<HdriPushConstants>() as u32,
        )
        .set_layouts(&[set_layout.handle()])
        .build(base.device())?;
    log::debug!("HDRI pipeline built for {format:?}");
    Ok(pipeline)
}

impl Sample for HdriSample {
    fn handle_event(&mut self, app: &mut GlfwApplication, event: &AppEvent) -> AppResult<()> {
        let delta = if event.is_key_pressed(KeyCode::Up) {
            EXPOSURE_STEP_STOPS
        } else if event.is_key_pressed(KeyCode::Down) {
            -EXPOSURE_STEP_STOPS
        } else {
            if event.is_key_pressed(KeyCode::Escape) {
                app.request_close();
            }
            return Ok(());
        };
        self.exposure_stops = step_exposure(self.exposure_stops, delta);
        log::info!("Exposure {:+.1} EV", self.exposure_stops);
        Ok(())
    }

    fn record(&mut self, app: &GlfwApplication, frame: &Frame) -> AppResult<()> {
        let base = app.app();
        let device = base.device();
        let cb = frame.command_buffer;

        app.cmd_color_to_render_target(frame);
        cmd_begin_rendering(device, cb, &frame.rendering_target(None, false));
        if let (Some(pipeline), Some(texture)) = (&self.pipeline, &self.texture) {
            pipeline.cmd_bind(cb);
            cmd_set_viewport_and_scissor(device, cb, frame.extent);

            let image_info = [texture.descriptor_info()];
            let writes = [write_combined_image_sampler(vk::DescriptorSet::null(), 0, &image_info)];
            pipeline.cmd_push_descriptor_set(&base.logical_device().push_descriptor, cb, 0, &writes);

            let constants = HdriPushConstants {
                exposure: self.exposure_stops.exp2(),
                gamma: target_gamma(self.format),
            };
            pipeline.cmd_push_constants(cb, vk::ShaderStageFlags::FRAGMENT, 0, bytemuck::bytes_of(&constants));
            unsafe { device.cmd_draw(cb, 3, 1, 0, 0) };
        }
        cmd_end_rendering(device, cb);
        app.cmd_color_to_present(frame);
        Ok(())
    }

    fn on_swapchain_recreated(&mut self, app: &GlfwApplication) -> AppResult<()> {
        if app.color_format() != self.format {
            self.format = app.color_format();
            self.pipeline = Some(create_pipeline(app, self.format, &self.set_layout)?);
        }
        Ok(())
    }

    fn cleanup(&mut self, _app: &GlfwApplication) {
        self.pipeline = None;
        self.texture = None;
    }
}

fn main() {
    let config = SampleConfig::new("hdri_texture").with_window_size(1280, 640);
    logging::init(&config.log_level);

    let path = std::env::args_os().nth(1);
    if let Err(e) = run(config, path.as_deref().map(Path::new)) {
        log::error!("hdri_texture failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: SampleConfig, path: Option<&Path>) -> AppResult<()> {
    let hdri = match path {
        Some(path) => load_hdri(path)?,
        None => {
            log::info!("No image given, showing a generated sky");
            generated_sky(GENERATED_WIDTH, GENERATED_HEIGHT)
        }
    };
    log::info!("HDRI is {}x{}", hdri.width(), hdri.height());

    let mut app = GlfwApplication::new(config)?;
    let mut sample = HdriSample::new(&app, &hdri)?;
    app.run(&mut sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_push_constants_layout() {
        assert_eq!(std::mem::size_of::<HdriPushConstants>(), 8);
    }

    #[test]
    fn test_generated_sky_has_hdr_sun() {
        let sky = generated_sky(64, 32);
        assert_eq!(sky.dimensions(), (64, 32));
        assert_eq!(sky.as_raw().len(), 64 * 32 * 4);

        let sun = sky.get_pixel(19, 10).0;
        assert!(sun[0] > 1.0, "sun should exceed display white: {sun:?}");

        let corner = sky.get_pixel(63, 31).0;
        assert!(corner.iter().all(|c| (0.0..=1.0).contains(c)));
        assert_relative_eq!(corner[3], 1.0);
    }

    #[test]
    fn test_exposure_steps_are_clamped() {
        assert_relative_eq!(step_exposure(0.0, EXPOSURE_STEP_STOPS), 0.5);
        assert_relative_eq!(step_exposure(-1.0, -EXPOSURE_STEP_STOPS), -1.5);
        assert_relative_eq!(step_exposure(MAX_EXPOSURE_STOPS, 1.0), MAX_EXPOSURE_STOPS);
        assert_relative_eq!(step_exposure(MIN_EXPOSURE_STOPS, -1.0), MIN_EXPOSURE_STOPS);
    }

    #[test]
    fn test_load_converts_to_float_texels() {
        let path = std::env::temp_dir().join(format!("hdri_texture_{}.png", std::process::id()));
        image::RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255])).save(&path).unwrap();

        let loaded = load_hdri(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.dimensions(), (2, 2));
        let texel = loaded.get_pixel(1, 1).0;
        assert_relative_eq!(texel[0], 1.0);
        assert_relative_eq!(texel[1], 0.0);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_hdri(Path::new("does/not/exist.hdr")).is_err());
    }
}
