//! Graphics and compute pipelines for dynamic rendering
//!
//! Pipelines carry no render pass: attachment formats are supplied through
//! `VkPipelineRenderingCreateInfo`. Viewport and scissor are always dynamic
//! so a pipeline survives swapchain recreation.

use ash::extensions::khr::PushDescriptor;
use ash::{vk, Device};

use super::error::{VulkanError, VulkanResult};
use super::shader::ShaderModule;

/// Pipeline and layout with RAII cleanup
pub struct Pipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    bind_point: vk::PipelineBindPoint,
}

impl Pipeline {
    /// Pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Graphics or compute
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }

    /// Bind the pipeline
    pub fn cmd_bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, self.bind_point, self.pipeline)
        };
    }

    /// Push raw constant bytes at `offset`
    pub fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device
                .cmd_push_constants(command_buffer, self.layout, stages, offset, data)
        };
    }

    /// Bind descriptor sets starting at set 0
    pub fn cmd_bind_descriptor_sets(&self, command_buffer: vk::CommandBuffer, sets: &[vk::DescriptorSet]) {
        unsafe {
            self.device
                .cmd_bind_descriptor_sets(command_buffer, self.bind_point, self.layout, 0, sets, &[])
        };
    }

    /// Push descriptor writes for `set` without allocating a descriptor set
    pub fn cmd_push_descriptor_set(
        &self,
        loader: &PushDescriptor,
        command_buffer: vk::CommandBuffer,
        set: u32,
        writes: &[vk::WriteDescriptorSet],
    ) {
        unsafe { loader.cmd_push_descriptor_set(command_buffer, self.bind_point, self.layout, set, writes) };
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

fn create_layout(
    device: &Device,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
) -> VulkanResult<vk::PipelineLayout> {
    let info = vk::PipelineLayoutCreateInfo::builder()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_constant_ranges);
    Ok(unsafe { device.create_pipeline_layout(&info, None)? })
}

/// Blend mode for the colour attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Write colour as is
    Opaque,
    /// Standard `src_alpha, 1 - src_alpha`
    Alpha,
}

impl BlendMode {
    fn attachment_state(self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::builder().color_write_mask(vk::ColorComponentFlags::RGBA);
        match self {
            Self::Opaque => state.blend_enable(false).build(),
            Self::Alpha => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
                .build(),
        }
    }
}

/// Graphics pipeline description
pub struct GraphicsPipelineBuilder<'a> {
    stages: Vec<(&'a ShaderModule, vk::ShaderStageFlags)>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    topology: vk::PrimitiveTopology,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    depth_test: bool,
    blend: BlendMode,
    push_constant_ranges: Vec<vk::PushConstantRange>,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    color_format: vk::Format,
    depth_format: vk::Format,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Pipeline rendering to one colour attachment of `color_format`
    pub fn new(color_format: vk::Format) -> Self {
        Self {
            stages: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: false,
            blend: BlendMode::Opaque,
            push_constant_ranges: Vec::new(),
            set_layouts: Vec::new(),
            color_format,
            depth_format: vk::Format::UNDEFINED,
        }
    }

    /// Add a shader stage
    pub fn shader(mut self, module: &'a ShaderModule, stage: vk::ShaderStageFlags) -> Self {
        self.stages.push((module, stage));
        self
    }

    /// Vertex and fragment stages
    pub fn vertex_fragment(self, vertex: &'a ShaderModule, fragment: &'a ShaderModule) -> Self {
        self.shader(vertex, vk::ShaderStageFlags::VERTEX)
            .shader(fragment, vk::ShaderStageFlags::FRAGMENT)
    }

    /// Vertex buffer layout
    pub fn vertex_input(
        mut self,
        bindings: &[vk::VertexInputBindingDescription],
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.vertex_bindings = bindings.to_vec();
        self.vertex_attributes = attributes.to_vec();
        self
    }

    /// Primitive topology
    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Face culling
    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    /// Enable depth test and write against `depth_format`
    pub fn depth(mut self, depth_format: vk::Format) -> Self {
        self.depth_test = true;
        self.depth_format = depth_format;
        self
    }

    /// Colour blending
    pub fn blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    /// Add a push constant range
    pub fn push_constant_range(mut self, stages: vk::ShaderStageFlags, offset: u32, size: u32) -> Self {
        self.push_constant_ranges.push(vk::PushConstantRange {
            stage_flags: stages,
            offset,
            size,
        });
        self
    }

    /// Descriptor set layouts, in set order
    pub fn set_layouts(mut self, layouts: &[vk::DescriptorSetLayout]) -> Self {
        self.set_layouts = layouts.to_vec();
        self
    }

    /// Create the pipeline
    pub fn build(self, device: &Device) -> VulkanResult<Pipeline> {
        if self.stages.is_empty() {
            return Err(VulkanError::Shader("graphics pipeline has no shader stages".to_string()));
        }

        let stages: Vec<vk::PipelineShaderStageCreateInfo> =
            self.stages.iter().map(|(module, stage)| module.stage_info(*stage)).collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(self.topology)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face);

        let multisampling =
            vk::PipelineMultisampleStateCreateInfo::builder().rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_test)
            .depth_compare_op(vk::CompareOp::LESS);

        let blend_attachments = [self.blend.attachment_state()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder().attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let color_formats = [self.color_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::builder()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(self.depth_format);

        let layout = create_layout(device, &self.set_layouts, &self.push_constant_ranges)?;

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipeline = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info.build()], None)
        };
        match pipeline {
            Ok(pipelines) => Ok(Pipeline {
                device: device.clone(),
                pipeline: pipelines[0],
                layout,
                bind_point: vk::PipelineBindPoint::GRAPHICS,
            }),
            Err((_, e)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                Err(VulkanError::Api(e))
            }
        }
    }
}

/// Compute pipeline constructor
pub struct ComputePipeline;

impl ComputePipeline {
    /// Compute pipeline from a shader and its descriptor set layouts
    pub fn new(
        device: &Device,
        shader: &ShaderModule,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VulkanResult<Pipeline> {
        let layout = create_layout(device, set_layouts, push_constant_ranges)?;
        let create_info = vk::ComputePipelineCreateInfo::builder()
            .stage(shader.stage_info(vk::ShaderStageFlags::COMPUTE))
            .layout(layout);

        match unsafe { device.create_compute_pipelines(vk::PipelineCache::null(), &[create_info.build()], None) } {
            Ok(pipelines) => Ok(Pipeline {
                device: device.clone(),
                pipeline: pipelines[0],
                layout,
                bind_point: vk::PipelineBindPoint::COMPUTE,
            }),
            Err((_, e)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                Err(VulkanError::Api(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_blend_writes_all_channels() {
        let state = BlendMode::Opaque.attachment_state();
        assert_eq!(state.blend_enable, vk::FALSE);
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_alpha_blend_factors() {
        let state = BlendMode::Alpha.attachment_state();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(state.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
    }

    #[test]
    fn test_builder_defaults() {
        let builder = GraphicsPipelineBuilder::new(vk::Format::B8G8R8A8_SRGB)
            .push_constant_range(vk::ShaderStageFlags::FRAGMENT, 0, 8);
        assert_eq!(builder.depth_format, vk::Format::UNDEFINED);
        assert!(!builder.depth_test);
        assert_eq!(builder.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(builder.push_constant_ranges[0].size, 8);

        let builder = builder.depth(vk::Format::D16_UNORM);
        assert!(builder.depth_test);
        assert_eq!(builder.depth_format, vk::Format::D16_UNORM);
    }
}
