//! GLFW window for Vulkan presentation
//!
//! Creates a window without a client API, forwards its events as
//! [`AppEvent`]s and creates the Vulkan surface.

use ash::vk;
use thiserror::Error;

use crate::core::WindowConfig;
use crate::events::{self, AppEvent};

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// `glfw::init` failed
    #[error("GLFW initialization failed: {0}")]
    InitializationFailed(String),

    /// GLFW could not open the window
    #[error("Window creation failed")]
    CreationFailed,

    /// No Vulkan loader, or no surface extensions
    #[error("GLFW reports no Vulkan support")]
    VulkanUnsupported,

    /// `glfwCreateWindowSurface` returned an error
    #[error("Failed to create Vulkan surface: {0:?}")]
    SurfaceCreation(vk::Result),
}

/// Result alias for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// GLFW window wrapper
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    cursor: (f64, f64),
}

impl Window {
    /// Create a window sized and titled from `config`
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw =
            glfw::init(glfw::fail_on_errors).map_err(|e| WindowError::InitializationFailed(format!("{e:?}")))?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::VulkanUnsupported);
        }

        // Vulkan only, no OpenGL context
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(config.resizable));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_char_polling(true);
        window.set_close_polling(true);
        window.set_focus_polling(true);
        window.set_framebuffer_size_polling(true);
        window.set_mouse_button_polling(true);
        window.set_cursor_pos_polling(true);
        window.set_scroll_polling(true);

        let cursor = window.get_cursor_pos();
        log::info!("Created window '{}' {}x{}", config.title, config.width, config.height);
        Ok(Self {
            glfw,
            window,
            events,
            cursor,
        })
    }

    /// Poll GLFW and translate queued events
    pub fn poll_events(&mut self) -> Vec<AppEvent> {
        self.glfw.poll_events();
        self.drain_events()
    }

    /// Block until at least one event arrives, then translate the queue
    pub fn wait_events(&mut self) -> Vec<AppEvent> {
        self.glfw.wait_events();
        self.drain_events()
    }

    fn drain_events(&mut self) -> Vec<AppEvent> {
        events::translate_batch(
            glfw::flush_messages(&self.events).map(|(_, event)| event),
            &mut self.cursor,
        )
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request or cancel closing
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Framebuffer size in pixels; zero while minimised
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    /// Cursor position in window coordinates
    pub fn cursor_pos(&self) -> (f64, f64) {
        self.window.get_cursor_pos()
    }

    /// Seconds since GLFW was initialised
    pub fn time(&self) -> f64 {
        self.glfw.get_time()
    }

    /// Instance extensions GLFW needs to create a surface
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or(WindowError::VulkanUnsupported)
    }

    /// Create a Vulkan surface for this window
    pub fn create_vulkan_surface(&self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance, std::ptr::null(), &mut surface);
        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::SurfaceCreation(result))
        }
    }
}
