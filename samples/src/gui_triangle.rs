//! Dear ImGui triangle sample
//!
//! A rotating triangle rendered into a per-frame HDR target with depth, then
//! gamma corrected onto the swapchain. The model-view-projection matrix and
//! tint live in a uniform buffer per frame in flight. The GUI edits the tint
//! and rotation speed; WASD moves the camera and a middle-button drag turns
//! it through the key-combination input layer.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Vector3};
use vk_shared::application::{AppResult, Frame, GammaCorrectionPass, GlfwApplication, GuiSample, ImGuiApplication};
use vk_shared::camera::Camera;
use vk_shared::core::SampleConfig;
use vk_shared::events::{AppEvent, KeyCode};
use vk_shared::foundation::logging;
use vk_shared::input::{FnCommandGenerator, FrameInput, InputFlags, InputHandler};
use vk_shared::vulkan::commands::{cmd_begin_rendering, cmd_end_rendering, cmd_set_viewport_and_scissor};
use vk_shared::vulkan::descriptor::{layout_binding, update_descriptor_sets, write_buffer};
use vk_shared::vulkan::{
    cmd_transition, DescriptorPool, DescriptorSetLayout, GpuBuffer, GpuImage, GraphicsPipelineBuilder, ImageDesc,
    ImageTransition, MemoryLocation, Pipeline, RenderingTarget, DEPTH_FORMAT,
};

const HDR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
const CLEAR_COLOR: [f32; 4] = [0.05, 0.05, 0.08, 1.0];
const DEFAULT_TINT: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
const DEFAULT_SPEED: f32 = 45.0;

/// Uniform block shared by both triangle stages
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TriangleUniforms {
    mvp: [[f32; 4]; 4],
    tint: [f32; 4],
}

impl TriangleUniforms {
    fn new(mvp: &Matrix4<f32>, tint: [f32; 4]) -> Self {
        Self {
            mvp: (*mvp).into(),
            tint,
        }
    }
}

/// Camera commands bound to key combinations
#[derive(Debug, Clone, Copy, PartialEq)]
enum CameraCommand {
    Move(KeyCode),
    Look((f32, f32)),
}

fn register_camera_commands(handler: &mut InputHandler<CameraCommand>) {
    for (flag, key) in [
        (InputFlags::PRESS_W, KeyCode::W),
        (InputFlags::PRESS_A, KeyCode::A),
        (InputFlags::PRESS_S, KeyCode::S),
        (InputFlags::PRESS_D, KeyCode::D),
    ] {
        handler.add_or_update(Box::new(FnCommandGenerator::new(flag, move |_: &FrameInput| {
            CameraCommand::Move(key)
        })));
    }
    handler.add_or_update(Box::new(FnCommandGenerator::new(
        InputFlags::MOUSE_MIDDLE,
        |input: &FrameInput| CameraCommand::Look(input.mouse_pos),
    )));
}

/// Rotation about world Y after `angle_degrees`
fn model_matrix(angle_degrees: f32) -> Matrix4<f32> {
    Matrix4::from_axis_angle(&Vector3::y_axis(), angle_degrees.to_radians())
}

/// GPU objects, dropped in field order
struct SceneResources {
    gamma: GammaCorrectionPass,
    pipeline: Pipeline,
    sets: Vec<vk::DescriptorSet>,
    pool: DescriptorPool,
    set_layout: DescriptorSetLayout,
    uniforms: Vec<GpuBuffer>,
    hdr_targets: Vec<GpuImage>,
}

impl SceneResources {
    fn new(app: &GlfwApplication) -> AppResult<Self> {
        let base = app.app();
        let device = base.device();
        let frames = app.max_frames_in_flight();

        let bindings = [layout_binding(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        )];
        let set_layout = DescriptorSetLayout::new(device.clone(), &bindings, false)?;
        let pool = DescriptorPool::new(
            device.clone(),
            &[vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: frames as u32,
            }],
            frames as u32,
        )?;
        let sets = pool.allocate_many(&vec![set_layout.handle(); frames])?;

        let uniforms = (0..frames)
            .map(|_| {
                base.create_buffer(
                    std::mem::size_of::<TriangleUniforms>() as vk::DeviceSize,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    MemoryLocation::CpuToGpu,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (set, buffer) in sets.iter().zip(&uniforms) {
            let info = [buffer.descriptor_info()];
            update_descriptor_sets(
                device,
                &[write_buffer(*set, 0, vk::DescriptorType::UNIFORM_BUFFER, &info)],
            );
        }

        let vertex = base.create_shader_module("gui_triangle.vert.spv")?;
        let fragment = base.create_shader_module("gui_triangle.frag.spv")?;
        let pipeline = GraphicsPipelineBuilder::new(HDR_FORMAT)
            .vertex_fragment(&vertex, &fragment)
            .depth(DEPTH_FORMAT)
            .set_layouts(&[set_layout.handle()])
            .build(device)?;

        Ok(Self {
            gamma: GammaCorrectionPass::new(base, app.color_format())?,
            pipeline,
            sets,
            pool,
            set_layout,
            uniforms,
            hdr_targets: create_hdr_targets(app)?,
        })
    }
}

/// One sampled HDR colour target per frame in flight, sized to the swapchain
fn create_hdr_targets(app: &GlfwApplication) -> AppResult<Vec<GpuImage>> {
    let desc = ImageDesc::color(
        app.extent(),
        HDR_FORMAT,
        vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
    );
    let mut targets = Vec::with_capacity(app.max_frames_in_flight());
    for _ in 0..app.max_frames_in_flight() {
        targets.push(app.app().create_image(desc)?.with_sampler(vk::Filter::LINEAR)?);
    }
    Ok(targets)
}

struct GuiTriangle {
    camera: Camera,
    tint: [f32; 4],
    degrees_per_second: f32,
    angle: f32,
    fps: f32,
    looking: bool,
    resources: Option<SceneResources>,
}

impl GuiTriangle {
    fn new(app: &GlfwApplication) -> AppResult<Self> {
        let mut camera = Camera::new(Vector3::new(0.0, 0.0, 3.0), -Vector3::z());
        let extent = app.extent();
        camera.set_aspect(extent.width, extent.height);

        Ok(Self {
            camera,
            tint: DEFAULT_TINT,
            degrees_per_second: DEFAULT_SPEED,
            angle: 0.0,
            fps: 0.0,
            looking: false,
            resources: Some(SceneResources::new(app)?),
        })
    }
}

impl GuiSample for GuiTriangle {
    type Command = CameraCommand;

    fn handle_event(&mut self, app: &mut GlfwApplication, event: &AppEvent) -> AppResult<()> {
        if event.is_key_pressed(KeyCode::Escape) {
            app.request_close();
        }
        Ok(())
    }

    fn update(&mut self, app: &mut GlfwApplication, delta_time: f32) -> AppResult<()> {
        self.angle = (self.angle + self.degrees_per_second * delta_time) % 360.0;
        self.fps = app.timer().current_fps();

        // No look command last frame: the middle button was released
        if !self.looking && self.camera.is_dragging() {
            self.camera.on_middle_mouse(false, (0.0, 0.0));
        }
        self.looking = false;
        Ok(())
    }

    fn on_command(&mut self, _app: &GlfwApplication, command: CameraCommand) -> AppResult<()> {
        match command {
            CameraCommand::Move(key) => self.camera.on_key(key),
            CameraCommand::Look(cursor) => {
                self.looking = true;
                self.camera.on_middle_mouse(true, cursor);
            }
        }
        Ok(())
    }

    fn build_ui(&mut self, ui: &imgui::Ui) {
        ui.window("Triangle")
            .size([300.0, 140.0], imgui::Condition::FirstUseEver)
            .build(|| {
                ui.color_edit4("Tint", &mut self.tint);
                ui.slider("Degrees / s", -360.0, 360.0, &mut self.degrees_per_second);
                if ui.button("Reset") {
                    self.tint = DEFAULT_TINT;
                    self.degrees_per_second = DEFAULT_SPEED;
                }
                ui.separator();
                ui.text(format!("{:.1} fps", self.fps));
                ui.text("WASD to move, middle mouse to look");
            });
    }

    fn record(&mut self, app: &GlfwApplication, frame: &Frame) -> AppResult<()> {
        let Some(res) = self.resources.as_mut() else {
            return Ok(());
        };
        let base = app.app();
        let device = base.device();
        let cb = frame.command_buffer;

        let mvp = self.camera.view_projection() * model_matrix(self.angle);
        res.uniforms[frame.slot].write(&[TriangleUniforms::new(&mvp, self.tint)])?;

        let hdr = &res.hdr_targets[frame.slot];
        cmd_transition(
            device,
            cb,
            hdr.handle(),
            vk::ImageAspectFlags::COLOR,
            ImageTransition::UNDEFINED_TO_COLOR_ATTACHMENT,
        );
        app.cmd_depth_to_attachment(frame);
        cmd_begin_rendering(
            device,
            cb,
            &RenderingTarget {
                color_view: hdr.view(),
                clear_color: Some(CLEAR_COLOR),
                depth_view: Some(frame.depth_view),
                extent: hdr.extent(),
            },
        );
        res.pipeline.cmd_bind(cb);
        cmd_set_viewport_and_scissor(device, cb, hdr.extent());
        res.pipeline.cmd_bind_descriptor_sets(cb, &[res.sets[frame.slot]]);
        unsafe { device.cmd_draw(cb, 3, 1, 0, 0) };
        cmd_end_rendering(device, cb);

        cmd_transition(
            device,
            cb,
            hdr.handle(),
            vk::ImageAspectFlags::COLOR,
            ImageTransition::COLOR_ATTACHMENT_TO_SHADER_READ,
        );
        app.cmd_color_to_render_target(frame);
        cmd_begin_rendering(device, cb, &frame.rendering_target(None, false));
        res.gamma.cmd_draw(base, cb, hdr, frame.extent);
        cmd_end_rendering(device, cb);
        Ok(())
    }

    fn on_swapchain_recreated(&mut self, app: &GlfwApplication) -> AppResult<()> {
        let extent = app.extent();
        self.camera.set_aspect(extent.width, extent.height);
        if let Some(res) = self.resources.as_mut() {
            res.hdr_targets = create_hdr_targets(app)?;
            res.gamma = GammaCorrectionPass::new(app.app(), app.color_format())?;
        }
        Ok(())
    }

    fn cleanup(&mut self, _app: &GlfwApplication) {
        self.resources = None;
    }
}

fn main() {
    let config = SampleConfig::new("gui_triangle").with_window_size(1280, 720);
    logging::init(&config.log_level);

    if let Err(e) = run(config) {
        log::error!("gui_triangle failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: SampleConfig) -> AppResult<()> {
    let mut app = ImGuiApplication::new(config)?;
    register_camera_commands(app.input_handler_mut());
    let mut sample = GuiTriangle::new(app.base())?;
    app.run(&mut sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_layout_matches_std140() {
        assert_eq!(std::mem::size_of::<TriangleUniforms>(), 80);
        let uniforms = TriangleUniforms::new(&Matrix4::identity(), [0.5; 4]);
        assert_relative_eq!(uniforms.mvp[3][3], 1.0);
        assert_relative_eq!(uniforms.mvp[0][1], 0.0);
    }

    #[test]
    fn test_mvp_is_column_major() {
        let translation = Matrix4::new_translation(&Vector3::new(1.0, 2.0, 3.0));
        let uniforms = TriangleUniforms::new(&translation, DEFAULT_TINT);
        // GLSL mat4 columns: translation lives in the last one
        assert_relative_eq!(uniforms.mvp[3][0], 1.0);
        assert_relative_eq!(uniforms.mvp[3][1], 2.0);
        assert_relative_eq!(uniforms.mvp[3][2], 3.0);
    }

    #[test]
    fn test_model_matrix_rotates_about_y() {
        let rotated = model_matrix(90.0).transform_vector(&Vector3::x());
        assert_relative_eq!(rotated, -Vector3::z(), epsilon = 1.0e-6);
        assert_relative_eq!(model_matrix(0.0), Matrix4::identity());
    }

    #[test]
    fn test_camera_commands() {
        let mut handler = InputHandler::new();
        register_camera_commands(&mut handler);
        assert_eq!(handler.len(), 5);

        let input = FrameInput::new(InputFlags::PRESS_W | InputFlags::PRESS_D, (0.0, 0.0), (10.0, 20.0));
        assert_eq!(
            handler.handle(&input),
            vec![CameraCommand::Move(KeyCode::W), CameraCommand::Move(KeyCode::D)]
        );

        let input = FrameInput::new(InputFlags::MOUSE_MIDDLE, (2.0, 0.0), (12.0, 20.0));
        assert_eq!(handler.handle(&input), vec![CameraCommand::Look((12.0, 20.0))]);
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut handler = InputHandler::new();
        register_camera_commands(&mut handler);
        register_camera_commands(&mut handler);
        assert_eq!(handler.len(), 5);
    }
}
