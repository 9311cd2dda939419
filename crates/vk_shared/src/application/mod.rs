//! Application layers shared by every sample
//!
//! - [`Application`]: headless device, allocator and command buffers
//! - [`GlfwApplication`]: window, swapchain and frame pacing
//! - [`ImGuiApplication`]: Dear ImGui on top of the GLFW application

use thiserror::Error;

use crate::config::ConfigError;
use crate::vulkan::VulkanError;
use crate::window::WindowError;

pub mod base;
pub mod gamma;
pub mod glfw_app;
pub mod imgui_app;

pub use base::{Application, PresentSurface};
pub use gamma::GammaCorrectionPass;
pub use glfw_app::{Frame, GlfwApplication, Sample};
pub use imgui_app::{GlfwPlatform, GuiSample, ImGuiApplication};

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Vulkan call or resource failure
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Window or surface failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// No search directory contains the shader
    #[error("Shader not found: {0}")]
    ShaderNotFound(String),

    /// Dear ImGui renderer failure
    #[error("GUI error: {0}")]
    Gui(String),

    /// Sample-specific failure
    #[error("Sample error: {0}")]
    Sample(String),
}

/// Result alias for application operations
pub type AppResult<T> = Result<T, AppError>;
