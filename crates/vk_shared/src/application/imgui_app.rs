//! Dear ImGui on top of [`GlfwApplication`]
//!
//! The UI is drawn last each frame, over whatever the sample rendered, with
//! a `LOAD` colour attachment and dynamic rendering. Held keys and mouse
//! movement feed the [`InputHandler`] so samples bind commands to key
//! combinations instead of parsing raw events.

use ash::vk;
use imgui_rs_vulkan_renderer::{DynamicRendering, Options, Renderer};
use std::time::Duration;

use super::glfw_app::{Frame, GlfwApplication};
use super::{AppError, AppResult};
use crate::core::SampleConfig;
use crate::events::{AppEvent, KeyCode, MouseButton};
use crate::input::{InputHandler, InputState};
use crate::vulkan::commands::{cmd_begin_rendering, cmd_end_rendering};

/// Feeds GLFW-derived [`AppEvent`]s into the ImGui IO state
#[derive(Debug, Default)]
pub struct GlfwPlatform;

impl GlfwPlatform {
    /// Register the platform with `imgui`
    pub fn init(imgui: &mut imgui::Context) -> Self {
        imgui.set_platform_name(Some(format!("vk_shared-glfw {}", env!("CARGO_PKG_VERSION"))));
        Self
    }

    /// Forward one event
    pub fn handle_event(&self, io: &mut imgui::Io, event: &AppEvent) {
        match *event {
            AppEvent::Key { key, pressed } => {
                if let Some(modifier) = imgui_modifier(key) {
                    io.add_key_event(modifier, pressed);
                }
                if let Some(k) = imgui_key(key) {
                    io.add_key_event(k, pressed);
                }
            }
            AppEvent::MouseButton { button, pressed, .. } => {
                io.add_mouse_button_event(imgui_mouse_button(button), pressed);
            }
            AppEvent::CursorMoved { x, y } => io.add_mouse_pos_event([x, y]),
            AppEvent::Scroll { x, y } => io.add_mouse_wheel_event([x, y]),
            AppEvent::Char(c) => io.add_input_character(c),
            AppEvent::Focused(_) | AppEvent::Resized { .. } | AppEvent::CloseRequested => {}
        }
    }

    /// Set display size and delta time before `new_frame`
    pub fn prepare_frame(&self, io: &mut imgui::Io, framebuffer: (u32, u32), delta_time: f32) {
        io.display_size = [framebuffer.0 as f32, framebuffer.1 as f32];
        io.display_framebuffer_scale = [1.0, 1.0];
        // ImGui rejects a zero delta
        io.update_delta_time(Duration::from_secs_f32(delta_time.max(1.0e-6)));
    }
}

fn imgui_key(key: KeyCode) -> Option<imgui::Key> {
    Some(match key {
        KeyCode::W => imgui::Key::W,
        KeyCode::A => imgui::Key::A,
        KeyCode::S => imgui::Key::S,
        KeyCode::D => imgui::Key::D,
        KeyCode::Q => imgui::Key::Q,
        KeyCode::E => imgui::Key::E,
        KeyCode::Space => imgui::Key::Space,
        KeyCode::Escape => imgui::Key::Escape,
        KeyCode::Enter => imgui::Key::Enter,
        KeyCode::Tab => imgui::Key::Tab,
        KeyCode::Backspace => imgui::Key::Backspace,
        KeyCode::Delete => imgui::Key::Delete,
        KeyCode::Left => imgui::Key::LeftArrow,
        KeyCode::Right => imgui::Key::RightArrow,
        KeyCode::Up => imgui::Key::UpArrow,
        KeyCode::Down => imgui::Key::DownArrow,
        KeyCode::Shift => imgui::Key::LeftShift,
        KeyCode::Control => imgui::Key::LeftCtrl,
        KeyCode::Alt => imgui::Key::LeftAlt,
    })
}

fn imgui_modifier(key: KeyCode) -> Option<imgui::Key> {
    match key {
        KeyCode::Shift => Some(imgui::Key::ModShift),
        KeyCode::Control => Some(imgui::Key::ModCtrl),
        KeyCode::Alt => Some(imgui::Key::ModAlt),
        _ => None,
    }
}

fn imgui_mouse_button(button: MouseButton) -> imgui::MouseButton {
    match button {
        MouseButton::Left => imgui::MouseButton::Left,
        MouseButton::Right => imgui::MouseButton::Right,
        MouseButton::Middle => imgui::MouseButton::Middle,
    }
}

/// The renderer's pipeline is baked for one colour attachment format
fn renderer_needs_rebuild(built_for: vk::Format, swapchain: vk::Format) -> bool {
    built_for != swapchain
}

fn create_renderer(base: &GlfwApplication, imgui: &mut imgui::Context) -> AppResult<Renderer> {
    let app = base.app();
    Renderer::with_default_allocator(
        &app.instance().instance,
        app.physical_device().device,
        app.device().clone(),
        app.graphics_queue(),
        app.command_pool().handle(),
        DynamicRendering {
            color_attachment_format: base.color_format(),
            depth_attachment_format: None,
        },
        imgui,
        Some(Options {
            in_flight_frames: base.max_frames_in_flight(),
            ..Default::default()
        }),
    )
    .map_err(|e| AppError::Gui(e.to_string()))
}

/// Per-sample hooks called by [`ImGuiApplication::run`]
pub trait GuiSample {
    /// Command type produced by the registered key combinations
    type Command;

    /// React to an event ImGui did not capture
    fn handle_event(&mut self, _app: &mut GlfwApplication, _event: &AppEvent) -> AppResult<()> {
        Ok(())
    }

    /// Advance simulation state by `delta_time` seconds
    fn update(&mut self, _app: &mut GlfwApplication, _delta_time: f32) -> AppResult<()> {
        Ok(())
    }

    /// Apply a command fired by the input handler
    fn on_command(&mut self, app: &GlfwApplication, command: Self::Command) -> AppResult<()>;

    /// Build this frame's widgets
    fn build_ui(&mut self, ui: &imgui::Ui);

    /// Record the scene, leaving the swapchain image in `COLOR_ATTACHMENT_OPTIMAL`
    fn record(&mut self, app: &GlfwApplication, frame: &Frame) -> AppResult<()>;

    /// Rebuild anything sized to the swapchain
    fn on_swapchain_recreated(&mut self, _app: &GlfwApplication) -> AppResult<()> {
        Ok(())
    }

    /// Release resources; the device is idle
    fn cleanup(&mut self, _app: &GlfwApplication) {}
}

/// GLFW application with a Dear ImGui overlay and a key-combination input layer
pub struct ImGuiApplication<C> {
    // Renderer resources go before the device inside `base`
    renderer: Renderer,
    renderer_format: vk::Format,
    imgui: imgui::Context,
    platform: GlfwPlatform,
    input_state: InputState,
    input_handler: InputHandler<C>,
    base: GlfwApplication,
}

impl<C> ImGuiApplication<C> {
    /// Build the windowed application and the ImGui renderer
    pub fn new(config: SampleConfig) -> AppResult<Self> {
        let base = GlfwApplication::new(config)?;

        let mut imgui = imgui::Context::create();
        imgui.set_ini_filename(None);
        imgui
            .fonts()
            .add_font(&[imgui::FontSource::DefaultFontData { config: None }]);
        let platform = GlfwPlatform::init(&mut imgui);

        let renderer = create_renderer(&base, &mut imgui)?;

        log::info!("Dear ImGui renderer ready");
        Ok(Self {
            renderer,
            renderer_format: base.color_format(),
            imgui,
            platform,
            input_state: InputState::new(),
            input_handler: InputHandler::new(),
            base,
        })
    }

    /// Windowed application underneath
    pub fn base(&self) -> &GlfwApplication {
        &self.base
    }

    /// Mutable windowed application underneath
    pub fn base_mut(&mut self) -> &mut GlfwApplication {
        &mut self.base
    }

    /// Key-combination commands
    pub fn input_handler_mut(&mut self) -> &mut InputHandler<C> {
        &mut self.input_handler
    }

    /// Run `sample` until the window closes
    pub fn run<S: GuiSample<Command = C>>(&mut self, sample: &mut S) -> AppResult<()> {
        log::info!("Entering GUI main loop");
        let result = loop {
            if self.base.should_close() {
                break Ok(());
            }
            if let Err(e) = self.step(sample) {
                break Err(e);
            }
        };

        self.base.finish()?;
        sample.cleanup(&self.base);
        result
    }

    fn step<S: GuiSample<Command = C>>(&mut self, sample: &mut S) -> AppResult<()> {
        for event in self.base.poll_events() {
            self.platform.handle_event(self.imgui.io_mut(), &event);
            self.input_state.on_event(&event);

            let io = self.imgui.io();
            let captured = match event {
                AppEvent::Key { .. } | AppEvent::Char(_) => io.want_capture_keyboard,
                AppEvent::MouseButton { .. } | AppEvent::CursorMoved { .. } | AppEvent::Scroll { .. } => {
                    io.want_capture_mouse
                }
                _ => false,
            };
            if !captured {
                sample.handle_event(&mut self.base, &event)?;
            }
        }

        let delta_time = self.base.tick();
        self.platform
            .prepare_frame(self.imgui.io_mut(), self.base.window().framebuffer_size(), delta_time);
        sample.update(&mut self.base, delta_time)?;

        let frame_input = self.input_state.take_frame();
        let io = self.imgui.io();
        if !io.want_capture_mouse && !io.want_capture_keyboard {
            for command in self.input_handler.handle(&frame_input) {
                sample.on_command(&self.base, command)?;
            }
        }

        let ui = self.imgui.new_frame();
        sample.build_ui(ui);
        let draw_data = self.imgui.render();

        if let Some(frame) = self.base.begin_frame()? {
            sample.record(&self.base, &frame)?;

            let device = self.base.app().device();
            cmd_begin_rendering(device, frame.command_buffer, &frame.rendering_target(None, false));
            self.renderer
                .cmd_draw(frame.command_buffer, draw_data)
                .map_err(|e| AppError::Gui(e.to_string()))?;
            cmd_end_rendering(device, frame.command_buffer);
            self.base.cmd_color_to_present(&frame);

            self.base.submit_and_present(frame)?;
        }

        if self.base.take_swapchain_recreated() {
            self.rebuild_renderer_if_needed()?;
            sample.on_swapchain_recreated(&self.base)?;
        }
        self.base.log_fps();
        Ok(())
    }

    fn rebuild_renderer_if_needed(&mut self) -> AppResult<()> {
        let format = self.base.color_format();
        if !renderer_needs_rebuild(self.renderer_format, format) {
            return Ok(());
        }
        log::info!("Swapchain format changed to {format:?}, rebuilding ImGui renderer");
        self.base.app().wait_idle()?;
        self.renderer = create_renderer(&self.base, &mut self.imgui)?;
        self.renderer_format = format;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_maps() {
        for key in [
            KeyCode::W,
            KeyCode::Escape,
            KeyCode::Left,
            KeyCode::Shift,
            KeyCode::Control,
            KeyCode::Alt,
        ] {
            assert!(imgui_key(key).is_some(), "{key:?}");
        }
    }

    #[test]
    fn test_modifiers() {
        assert_eq!(imgui_modifier(KeyCode::Shift), Some(imgui::Key::ModShift));
        assert_eq!(imgui_modifier(KeyCode::Control), Some(imgui::Key::ModCtrl));
        assert_eq!(imgui_modifier(KeyCode::W), None);
    }

    #[test]
    fn test_mouse_buttons() {
        assert_eq!(imgui_mouse_button(MouseButton::Middle), imgui::MouseButton::Middle);
        assert_eq!(imgui_mouse_button(MouseButton::Left), imgui::MouseButton::Left);
    }

    #[test]
    fn test_renderer_rebuilt_only_on_format_change() {
        assert!(!renderer_needs_rebuild(vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_SRGB));
        assert!(renderer_needs_rebuild(vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_UNORM));
        assert!(renderer_needs_rebuild(vk::Format::B8G8R8A8_UNORM, vk::Format::B8G8R8A8_SRGB));
    }

    #[test]
    fn test_platform_feeds_io() {
        let mut ctx = imgui::Context::create();
        ctx.set_ini_filename(None);
        let platform = GlfwPlatform::init(&mut ctx);
        platform.prepare_frame(ctx.io_mut(), (1280, 640), 0.016);
        assert_eq!(ctx.io().display_size, [1280.0, 640.0]);
        approx::assert_relative_eq!(ctx.io().delta_time, 0.016, epsilon = 1.0e-6);

        platform.prepare_frame(ctx.io_mut(), (0, 0), 0.0);
        assert!(ctx.io().delta_time > 0.0);
    }
}
