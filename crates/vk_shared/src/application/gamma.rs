//! Fullscreen gamma correction onto the swapchain
//!
//! Samples a linear HDR image through a push descriptor and writes the
//! gamma-encoded result into the bound colour attachment. The vertex shader
//! generates a fullscreen triangle, so no vertex buffer is bound. sRGB
//! attachments encode on store, so the shader exponent is 1 for them.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use super::base::Application;
use super::AppResult;
use crate::vulkan::commands::cmd_set_viewport_and_scissor;
use crate::vulkan::descriptor::{layout_binding, write_combined_image_sampler, DescriptorSetLayout};
use crate::vulkan::memory::GpuImage;
use crate::vulkan::pipeline::{GraphicsPipelineBuilder, Pipeline};

const VERTEX_SHADER: &str = "gamma.vert.spv";
const FRAGMENT_SHADER: &str = "gamma.frag.spv";
const DISPLAY_GAMMA: f32 = 2.2;

/// Encoding exponent the shader applies for a target of `format`
pub fn target_gamma(format: vk::Format) -> f32 {
    match format {
        vk::Format::R8G8B8A8_SRGB | vk::Format::B8G8R8A8_SRGB | vk::Format::A8B8G8R8_SRGB_PACK32 => 1.0,
        _ => DISPLAY_GAMMA,
    }
}

/// Push constant block of the fragment shader
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GammaPushConstants {
    width: f32,
    height: f32,
    gamma: f32,
}

/// Gamma correction pipeline and its push-descriptor layout
pub struct GammaCorrectionPass {
    pipeline: Pipeline,
    gamma: f32,
    // Referenced by the pipeline layout; dropped after it
    set_layout: DescriptorSetLayout,
}

impl GammaCorrectionPass {
    /// Build the pass for a colour attachment of `color_format`
    pub fn new(app: &Application, color_format: vk::Format) -> AppResult<Self> {
        let vertex = app.create_shader_module(VERTEX_SHADER)?;
        let fragment = app.create_shader_module(FRAGMENT_SHADER)?;

        let bindings = [layout_binding(
            0,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
        )];
        let set_layout = DescriptorSetLayout::new(app.device().clone(), &bindings, true)?;

        let pipeline = GraphicsPipelineBuilder::new(color_format)
            .vertex_fragment(&vertex, &fragment)
            .push_constant_range(
                vk::ShaderStageFlags::FRAGMENT,
                0,
                std::mem::size_of::<GammaPushConstants>() as u32,
            )
            .set_layouts(&[set_layout.handle()])
            .build(app.device())?;

        let gamma = target_gamma(color_format);
        log::debug!("Gamma correction pass created for {color_format:?} (exponent 1/{gamma})");
        Ok(Self {
            pipeline,
            gamma,
            set_layout,
        })
    }

    /// Descriptor set layout of the input image
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout.handle()
    }

    /// Draw into the attachment bound by an active `cmd_begin_rendering`
    ///
    /// `input` must carry a sampler and be in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn cmd_draw(&self, app: &Application, command_buffer: vk::CommandBuffer, input: &GpuImage, extent: vk::Extent2D) {
        self.pipeline.cmd_bind(command_buffer);
        cmd_set_viewport_and_scissor(app.device(), command_buffer, extent);

        let image_info = [input.descriptor_info()];
        let writes = [write_combined_image_sampler(vk::DescriptorSet::null(), 0, &image_info)];
        self.pipeline
            .cmd_push_descriptor_set(&app.logical_device().push_descriptor, command_buffer, 0, &writes);

        let constants = GammaPushConstants {
            width: extent.width as f32,
            height: extent.height as f32,
            gamma: self.gamma,
        };
        self.pipeline.cmd_push_constants(
            command_buffer,
            vk::ShaderStageFlags::FRAGMENT,
            0,
            bytemuck::bytes_of(&constants),
        );

        unsafe { app.device().cmd_draw(command_buffer, 3, 1, 0, 0) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constants_layout() {
        assert_eq!(std::mem::size_of::<GammaPushConstants>(), 12);
        let constants = GammaPushConstants {
            width: 1280.0,
            height: 640.0,
            gamma: 2.2,
        };
        let bytes = bytemuck::bytes_of(&constants);
        assert_eq!(&bytes[0..4], &1280.0f32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &640.0f32.to_ne_bytes());
        assert_eq!(&bytes[8..12], &2.2f32.to_ne_bytes());
    }

    #[test]
    fn test_srgb_targets_skip_encoding() {
        approx::assert_relative_eq!(target_gamma(vk::Format::B8G8R8A8_SRGB), 1.0);
        approx::assert_relative_eq!(target_gamma(vk::Format::R8G8B8A8_SRGB), 1.0);
        approx::assert_relative_eq!(target_gamma(vk::Format::B8G8R8A8_UNORM), DISPLAY_GAMMA);
    }
}
