//! # Sample Configuration
//!
//! Every sample binary starts from a [`SampleConfig`]. It can be built in
//! code, or loaded from `sample.toml` / `sample.ron` next to the binary with
//! [`Config::load_or_default`](crate::config::Config::load_or_default).
//!
//! ## Sections
//!
//! - **window**: title and initial size of the GLFW window
//! - **renderer**: Vulkan instance metadata, frames in flight, validation,
//!   present mode and surface format preferences
//! - **shaders**: directories searched for compiled SPIR-V
//! - **log_level**: default `env_logger` filter

use ash::vk;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{Config, ConfigError};

/// Upper bound on frames in flight; more only adds latency for these samples
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 8;

/// Window creation parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 1280,
            height: 640,
            resizable: true,
        }
    }
}

/// Present mode the swapchain should try first
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    /// Vsync, always available
    Fifo,
    /// Vsync that tears when late
    FifoRelaxed,
    /// Low-latency triple buffering
    Mailbox,
    /// No vsync
    Immediate,
}

impl PresentModePreference {
    /// Vulkan value for this preference
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            Self::Fifo => vk::PresentModeKHR::FIFO,
            Self::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

/// Swapchain colour format the samples ask for first
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceFormatPreference {
    /// `R8G8B8A8_SRGB`
    Rgba8Srgb,
    /// `B8G8R8A8_SRGB`
    Bgra8Srgb,
    /// `R8G8B8A8_UNORM`
    Rgba8Unorm,
    /// `B8G8R8A8_UNORM`
    Bgra8Unorm,
}

impl SurfaceFormatPreference {
    /// Vulkan value for this preference
    pub fn to_vk(self) -> vk::Format {
        match self {
            Self::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            Self::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
            Self::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            Self::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        }
    }
}

/// Vulkan renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name passed to the Vulkan instance
    pub application_name: String,
    /// Number of frames the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Validation layers; `None` enables them in debug builds only
    pub enable_validation: Option<bool>,
    /// Present mode to try first
    pub present_mode: PresentModePreference,
    /// Surface format to try first
    pub surface_format: SurfaceFormatPreference,
}

impl RendererConfig {
    /// Whether validation layers should be requested
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "VulkanSample".to_string(),
            max_frames_in_flight: 2,
            enable_validation: None,
            present_mode: PresentModePreference::Fifo,
            surface_format: SurfaceFormatPreference::Rgba8Srgb,
        }
    }
}

/// # Shader Configuration
///
/// Compiled shaders are named `<source file>.spv`, e.g. `triangle.vert.spv`.
/// Samples may run from the workspace root or from their own directory, so
/// several directories are searched in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShaderConfig {
    /// Directories searched in order
    pub search_dirs: Vec<PathBuf>,
}

impl ShaderConfig {
    /// Find the first existing `file_name` across the search directories
    pub fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        self.search_dirs
            .iter()
            .map(|dir| dir.join(file_name))
            .find(|candidate| candidate.is_file())
    }

    /// Prepend a directory to the search list
    pub fn with_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.search_dirs.insert(0, dir.as_ref().to_path_buf());
        self
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            search_dirs: vec![
                PathBuf::from("target/shaders"),
                PathBuf::from("../target/shaders"),
                PathBuf::from("shaders"),
                PathBuf::from("resources/shaders"),
            ],
        }
    }
}

/// # Complete Sample Configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SampleConfig {
    /// Window settings
    pub window: WindowConfig,
    /// Renderer settings
    pub renderer: RendererConfig,
    /// Shader lookup
    pub shaders: ShaderConfig,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl SampleConfig {
    /// Defaults with the given window title and application name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut config = Self::default();
        config.window.title = name.clone();
        config.renderer.application_name = name;
        config
    }

    /// Set the initial window size
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window.width = width;
        self.window.height = height;
        self
    }

    /// Set frames in flight
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.renderer.max_frames_in_flight = frames;
        self
    }

    /// Force validation layers on or off
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.renderer.enable_validation = Some(enabled);
        self
    }

    /// Check values that parse fine but cannot work
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.renderer.application_name.is_empty() {
            return Err(ConfigError::Invalid("application name cannot be empty".into()));
        }

        let frames = self.renderer.max_frames_in_flight;
        if frames == 0 || frames > MAX_FRAMES_IN_FLIGHT_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_frames_in_flight must be within 1..={MAX_FRAMES_IN_FLIGHT_LIMIT}, got {frames}"
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if self.shaders.search_dirs.is_empty() {
            return Err(ConfigError::Invalid("no shader search directories".into()));
        }

        Ok(())
    }
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            renderer: RendererConfig::default(),
            shaders: ShaderConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config for SampleConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SampleConfig::default().validate().is_ok());
        assert!(SampleConfig::new("Triangle").validate().is_ok());
    }

    #[test]
    fn test_new_sets_title_and_app_name() {
        let config = SampleConfig::new("Triangle");
        assert_eq!(config.window.title, "Triangle");
        assert_eq!(config.renderer.application_name, "Triangle");
    }

    #[test]
    fn test_frames_in_flight_bounds() {
        assert!(SampleConfig::default().with_max_frames_in_flight(0).validate().is_err());
        assert!(SampleConfig::default().with_max_frames_in_flight(1).validate().is_ok());
        assert!(SampleConfig::default().with_max_frames_in_flight(8).validate().is_ok());
        assert!(SampleConfig::default().with_max_frames_in_flight(9).validate().is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = SampleConfig::default().with_window_size(0, 480);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut config = SampleConfig::default();
        config.renderer.application_name.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let text = r#"
            log_level = "debug"

            [window]
            title = "Resized"
            width = 800
            height = 600
            resizable = false
        "#;
        let config: SampleConfig = ConfigFormat::Toml.parse(text).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.window.width, 800);
        assert!(!config.window.resizable);
        assert_eq!(config.renderer, RendererConfig::default());
        assert_eq!(config.shaders, ShaderConfig::default());
    }

    #[test]
    fn test_window_section_with_title_only() {
        let config: SampleConfig = ConfigFormat::Toml.parse("[window]\ntitle = \"x\"\n").unwrap();
        assert_eq!(config.window.title, "x");
        assert_eq!(config.window.width, WindowConfig::default().width);
        assert_eq!(config.window.height, WindowConfig::default().height);
        assert_eq!(config.window.resizable, WindowConfig::default().resizable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_renderer_section_with_present_mode_only() {
        let text = r#"
            [renderer]
            present_mode = "mailbox"

            [shaders]
        "#;
        let config: SampleConfig = ConfigFormat::Toml.parse(text).unwrap();
        let expected = RendererConfig {
            present_mode: PresentModePreference::Mailbox,
            ..RendererConfig::default()
        };
        assert_eq!(config.renderer, expected);
        assert_eq!(config.shaders, ShaderConfig::default());
    }

    #[test]
    fn test_present_mode_names() {
        let text = r#"
            [renderer]
            application_name = "x"
            max_frames_in_flight = 3
            present_mode = "mailbox"
            surface_format = "bgra8_srgb"
        "#;
        let config: SampleConfig = ConfigFormat::Toml.parse(text).unwrap();
        assert_eq!(config.renderer.present_mode.to_vk(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.renderer.surface_format.to_vk(), vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.renderer.max_frames_in_flight, 3);
    }

    #[test]
    fn test_validation_override() {
        let config = SampleConfig::default().with_validation(false);
        assert!(!config.renderer.validation_enabled());
        let config = SampleConfig::default().with_validation(true);
        assert!(config.renderer.validation_enabled());
    }

    #[test]
    fn test_shader_resolve_misses() {
        let shaders = ShaderConfig { search_dirs: vec![PathBuf::from("definitely/not/here")] };
        assert!(shaders.resolve("triangle.vert.spv").is_none());
    }

    #[test]
    fn test_shader_resolve_finds_file() {
        let dir = std::env::temp_dir().join(format!("vk_shared_shader_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("probe.comp.spv"), [0u8; 4]).unwrap();

        let shaders = ShaderConfig::default().with_dir(&dir);
        assert_eq!(shaders.resolve("probe.comp.spv"), Some(dir.join("probe.comp.spv")));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
