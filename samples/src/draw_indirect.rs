//! Headless indirect drawing sample
//!
//! Four triangles come from a single `vkCmdDrawIndexedIndirect`. The draw
//! parameters live in a GPU buffer and ask for four instances of one indexed
//! triangle; the vertex shader places and tints each instance from two
//! storage buffers bound through push descriptors. The result is saved as a
//! PNG.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use std::path::Path;
use vk_shared::application::{AppError, AppResult, Application};
use vk_shared::core::SampleConfig;
use vk_shared::foundation::logging;
use vk_shared::vulkan::commands::{cmd_begin_rendering, cmd_end_rendering, cmd_set_viewport_and_scissor};
use vk_shared::vulkan::descriptor::{layout_binding, write_buffer};
use vk_shared::vulkan::{
    cmd_transition, DescriptorSetLayout, GraphicsPipelineBuilder, ImageDesc, ImageTransition, MemoryLocation,
    RenderingTarget,
};

const WIDTH: u32 = 960;
const HEIGHT: u32 = 680;
const FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const OUTPUT: &str = "draw_indirect.png";
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// One triangle in clip space, apex up
const TRIANGLE: [[f32; 4]; 3] = [
    [-0.25, 0.25, 0.0, 1.0],
    [0.25, 0.25, 0.0, 1.0],
    [0.0, -0.25, 0.0, 1.0],
];
const INDICES: [u32; 3] = [0, 1, 2];

/// Per-instance offsets: upper left, upper right, lower left, lower right
const OFFSETS: [[f32; 2]; 4] = [[-0.25, -0.25], [0.25, -0.25], [-0.25, 0.25], [0.25, 0.25]];
const COLORS: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 1.0],
    [0.0, 1.0, 0.0, 1.0],
    [0.0, 0.0, 1.0, 1.0],
    [1.0, 1.0, 0.0, 1.0],
];

/// Same layout as `VkDrawIndexedIndirectCommand`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
struct DrawIndexedIndirectCommand {
    index_count: u32,
    instance_count: u32,
    first_index: u32,
    vertex_offset: i32,
    first_instance: u32,
}

impl DrawIndexedIndirectCommand {
    /// Draw all of `index_count` indices `instance_count` times
    const fn instanced(index_count: u32, instance_count: u32) -> Self {
        Self {
            index_count,
            instance_count,
            first_index: 0,
            vertex_offset: 0,
            first_instance: 0,
        }
    }
}

fn draw_commands() -> [DrawIndexedIndirectCommand; 1] {
    [DrawIndexedIndirectCommand::instanced(INDICES.len() as u32, OFFSETS.len() as u32)]
}

/// Pixel under the centroid of the triangle moved by `offset`
fn centroid_pixel(offset: [f32; 2], extent: vk::Extent2D) -> (u32, u32) {
    let mut centroid = [0.0f32; 2];
    for vertex in &TRIANGLE {
        centroid[0] += vertex[0] / TRIANGLE.len() as f32;
        centroid[1] += vertex[1] / TRIANGLE.len() as f32;
    }
    let x = (centroid[0] + offset[0] + 1.0) * 0.5 * extent.width as f32;
    let y = (centroid[1] + offset[1] + 1.0) * 0.5 * extent.height as f32;
    (x as u32, y as u32)
}

fn to_rgba8(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Instances whose centroid pixel does not hold their colour
fn mismatched_instances(image: &RgbaImage) -> Vec<usize> {
    let extent = vk::Extent2D {
        width: image.width(),
        height: image.height(),
    };
    OFFSETS
        .iter()
        .zip(COLORS.iter())
        .enumerate()
        .filter_map(|(instance, (offset, color))| {
            let (x, y) = centroid_pixel(*offset, extent);
            let found = image.get_pixel_checked(x, y).map(|p| p.0);
            (found != Some(to_rgba8(*color))).then_some(instance)
        })
        .collect()
}

fn main() {
    let config = SampleConfig::new("draw_indirect").with_max_frames_in_flight(1);
    logging::init(&config.log_level);

    if let Err(e) = run(config, Path::new(OUTPUT)) {
        log::error!("draw_indirect failed: {e}");
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
    let image = RgbaImage::from_raw(extent.width, extent.height, pixels)
        .ok_or_else(|| AppError::Sample("readback smaller than the image".to_string()))?;

    let mismatched = mismatched_instances(&image);
    if mismatched.is_empty() {
        log::info!("All {} instances drawn", OFFSETS.len());
    } else {
        log::warn!("Instances {mismatched:?} are missing from the output");
    }

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

    let vertices = app.create_buffer_with_data(&TRIANGLE, vk::BufferUsageFlags::VERTEX_BUFFER)?;
    let indices = app.create_buffer_with_data(&INDICES, vk::BufferUsageFlags::INDEX_BUFFER)?;
    let offsets = app.create_buffer_with_data(&OFFSETS, vk::BufferUsageFlags::STORAGE_BUFFER)?;
    let colors = app.create_buffer_with_data(&COLORS, vk::BufferUsageFlags::STORAGE_BUFFER)?;
    let commands = draw_commands();
    let indirect = app.create_buffer_with_data(&commands, vk::BufferUsageFlags::INDIRECT_BUFFER)?;

    let bindings = [
        layout_binding(0, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::VERTEX),
        layout_binding(1, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::VERTEX),
    ];
    let set_layout = DescriptorSetLayout::new(device.clone(), &bindings, true)?;

    let vertex = app.create_shader_module("indirect.vert.spv")?;
    let fragment = app.create_shader_module("indirect.frag.spv")?;
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<[f32; 4]>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let attribute = vk::VertexInputAttributeDescription {
        location: 0,
        binding: 0,
        format: vk::Format::R32G32B32A32_SFLOAT,
        offset: 0,
    };
    let pipeline = GraphicsPipelineBuilder::new(FORMAT)
        .vertex_fragment(&vertex, &fragment)
        .vertex_input(&[binding], &[attribute])
        .set_layouts(&[set_layout.handle()])
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

    let offsets_info = [offsets.descriptor_info()];
    let colors_info = [colors.descriptor_info()];
    let writes = [
        write_buffer(vk::DescriptorSet::null(), 0, vk::DescriptorType::STORAGE_BUFFER, &offsets_info),
        write_buffer(vk::DescriptorSet::null(), 1, vk::DescriptorType::STORAGE_BUFFER, &colors_info),
    ];
    pipeline.cmd_bind(cb);
    pipeline.cmd_push_descriptor_set(&app.logical_device().push_descriptor, cb, 0, &writes);
    cmd_set_viewport_and_scissor(device, cb, extent);
    unsafe {
        device.cmd_bind_vertex_buffers(cb, 0, &[vertices.handle()], &[0]);
        device.cmd_bind_index_buffer(cb, indices.handle(), 0, vk::IndexType::UINT32);
        device.cmd_draw_indexed_indirect(
            cb,
            indirect.handle(),
            0,
            commands.len() as u32,
            std::mem::size_of::<DrawIndexedIndirectCommand>() as u32,
        );
    }
    cmd_end_rendering(device, cb);

    cmd_transition(
        device,
        cb,
        target.handle(),
        vk::ImageAspectFlags::COLOR,
        ImageTransition::COLOR_ATTACHMENT_TO_TRANSFER_SRC,
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

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: WIDTH,
        height: HEIGHT,
    };

    #[test]
    fn test_command_matches_vulkan_layout() {
        assert_eq!(
            std::mem::size_of::<DrawIndexedIndirectCommand>(),
            std::mem::size_of::<vk::DrawIndexedIndirectCommand>()
        );
        let commands = draw_commands();
        let words: &[u32] = bytemuck::cast_slice(&commands[..]);
        assert_eq!(words, &[3, 4, 0, 0, 0]);
    }

    #[test]
    fn test_one_instance_per_offset_and_colour() {
        let [command] = draw_commands();
        assert_eq!(command.instance_count as usize, OFFSETS.len());
        assert_eq!(OFFSETS.len(), COLORS.len());
    }

    #[test]
    fn test_centroids_land_in_separate_quadrants() {
        let centroids: Vec<_> = OFFSETS.iter().map(|o| centroid_pixel(*o, EXTENT)).collect();
        let (cx, cy) = (WIDTH / 2, HEIGHT / 2);
        assert!(centroids[0].0 < cx && centroids[0].1 < cy);
        assert!(centroids[1].0 > cx && centroids[1].1 < cy);
        assert!(centroids[2].0 < cx && centroids[2].1 > cy);
        assert!(centroids[3].0 > cx && centroids[3].1 > cy);
    }

    #[test]
    fn test_mismatch_detection() {
        let mut image = RgbaImage::from_pixel(WIDTH, HEIGHT, Rgba([0, 0, 0, 255]));
        assert_eq!(mismatched_instances(&image), vec![0, 1, 2, 3]);

        for (offset, color) in OFFSETS.iter().zip(COLORS.iter()) {
            let (x, y) = centroid_pixel(*offset, EXTENT);
            image.put_pixel(x, y, Rgba(to_rgba8(*color)));
        }
        assert!(mismatched_instances(&image).is_empty());
    }
}
