//! Headless offscreen rendering sample
//!
//! Draws a colour-interpolated quad with dynamic rendering into an offscreen
//! image, copies the pixels into a host-visible buffer and saves them as a
//! PNG. No window or swapchain is involved.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use std::mem::offset_of;
use std::path::Path;
use vk_shared::application::{AppError, AppResult, Application};
use vk_shared::core::SampleConfig;
use vk_shared::foundation::logging;
use vk_shared::vulkan::commands::{cmd_begin_rendering, cmd_end_rendering, cmd_set_viewport_and_scissor};
use vk_shared::vulkan::memory::subresource_range;
use vk_shared::vulkan::{
    cmd_transition, GraphicsPipelineBuilder, ImageDesc, ImageTransition, MemoryLocation, RenderingTarget,
};

const WIDTH: u32 = 512;
const HEIGHT: u32 = 512;
const FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const OUTPUT: &str = "offscreen_quad.png";
const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

impl Vertex {
    const fn new(position: [f32; 2], color: [f32; 3]) -> Self {
        Self { position, color }
    }

    fn binding() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    fn attributes() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
        ]
    }
}

/// Triangle-strip quad covering the middle of clip space
const QUAD: [Vertex; 4] = [
    Vertex::new([-0.6, -0.6], [1.0, 0.0, 0.0]),
    Vertex::new([-0.6, 0.6], [0.0, 1.0, 0.0]),
    Vertex::new([0.6, -0.6], [0.0, 0.0, 1.0]),
    Vertex::new([0.6, 0.6], [1.0, 1.0, 0.0]),
];

/// Wrap tightly packed RGBA8 rows as an image
fn to_image(extent: vk::Extent2D, pixels: Vec<u8>) -> AppResult<RgbaImage> {
    RgbaImage::from_raw(extent.width, extent.height, pixels).ok_or_else(|| {
        AppError::Sample(format!(
            "pixel buffer too small for {}x{}",
            extent.width, extent.height
        ))
    })
}

fn main() {
    let config = SampleConfig::new("offscreen_quad").with_max_frames_in_flight(1);
    logging::init(&config.log_level);

    if let Err(e) = run(config, Path::new(OUTPUT)) {
        log::error!("offscreen_quad failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: SampleConfig, output: &Path) -> AppResult<()> {
    let app = Application::headless(config)?;
    let extent = vk::Extent2D {
        width: WIDTH,
        height: HEIGHT,
    };

    let pixels = render(&app, extent)?;
    let image = to_image(extent, pixels)?;
    image
        .save(output)
        .map_err(|e| AppError::Sample(format!("writing {}: {e}", output.display())))?;

    log::info!("Wrote {}x{} image to {}", extent.width, extent.height, output.display());
    Ok(())
}

fn render(app: &Application, extent: vk::Extent2D) -> AppResult<Vec<u8>> {
    let device = app.device();

    let target = app.create_image(ImageDesc::color(
        extent,
        FORMAT,
        vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
    ))?;
    let mut readback = app.create_buffer(
        target.desc().rgba8_byte_size(),
        vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuToCpu,
    )?;
    let vertices = app.create_buffer_with_data(&QUAD, vk::BufferUsageFlags::VERTEX_BUFFER)?;

    let vertex = app.create_shader_module("quad.vert.spv")?;
    let fragment = app.create_shader_module("quad.frag.spv")?;
    let pipeline = GraphicsPipelineBuilder::new(FORMAT)
        .vertex_fragment(&vertex, &fragment)
        .vertex_input(&[Vertex::binding()], &Vertex::attributes())
        .topology(vk::PrimitiveTopology::TRIANGLE_STRIP)
        .build(device)?;

    let cmd = app.one_time_commands()?;
    let cb = cmd.command_buffer();

    cmd_transition(
        device,
        cb,
        target.handle(),
        vk::ImageAspectFlags::COLOR,
        ImageTransition::UNDEFINED_TO_COLOR_ATTACHMENT,
    );
    cmd_begin_rendering(
        device,
        cb,
        &RenderingTarget {
            color_view: target.view(),
            clear_color: Some(CLEAR_COLOR),
            depth_view: None,
            extent,
        },
    );
    pipeline.cmd_bind(cb);
    cmd_set_viewport_and_scissor(device, cb, extent);
    unsafe {
        device.cmd_bind_vertex_buffers(cb, 0, &[vertices.handle()], &[0]);
        device.cmd_draw(cb, QUAD.len() as u32, 1, 0, 0);
    }
    cmd_end_rendering(device, cb);

    cmd_transition(
        device,
        cb,
        target.handle(),
        vk::ImageAspectFlags::COLOR,
        ImageTransition::COLOR_ATTACHMENT_TO_TRANSFER_SRC,
    );
    let range = subresource_range(vk::ImageAspectFlags::COLOR);
    let region = vk::BufferImageCopy::builder()
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: range.aspect_mask,
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
    let host_read = [vk::MemoryBarrier2::builder()
        .src_stage_mask(vk::PipelineStageFlags2::COPY)
        .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::HOST)
        .dst_access_mask(vk::AccessFlags2::HOST_READ)
        .build()];
    unsafe {
        device.cmd_copy_image_to_buffer(
            cb,
            target.handle(),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            readback.handle(),
            &[region],
        );
        device.cmd_pipeline_barrier2(cb, &vk::DependencyInfo::builder().memory_barriers(&host_read));
    }
    cmd.submit_and_wait(app.graphics_queue())?;

    Ok(readback.read()?)
}
