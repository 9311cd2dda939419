//! # vk_shared
//!
//! Shared mini-engine for the Vulkan sample series. The samples only record
//! their own commands; everything else lives here once:
//!
//! - **Instance and device**: validation layers routed to `log`, Vulkan 1.3
//!   with dynamic rendering, synchronization2 and push descriptors
//! - **Swapchain lifecycle**: acquire, submit, present and recreation driven
//!   by a pure frame state machine ([`vulkan::FrameScheduler`])
//! - **Resources**: `vk-mem` buffers and images, pipelines, descriptors
//! - **Application layers**: headless, GLFW-windowed and Dear ImGui
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vk_shared::prelude::*;
//!
//! struct Clear;
//!
//! impl Sample for Clear {
//!     fn record(&mut self, app: &GlfwApplication, frame: &Frame) -> AppResult<()> {
//!         app.cmd_clear_color(frame, [0.2, 0.3, 0.4, 1.0]);
//!         app.cmd_color_to_present(frame);
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SampleConfig::new("clear");
//!     vk_shared::foundation::logging::init(&config.log_level);
//!     let mut app = GlfwApplication::new(config)?;
//!     app.run(&mut Clear)?;
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod camera;
pub mod config;
pub mod core;
pub mod events;
pub mod foundation;
pub mod input;
pub mod vulkan;
pub mod window;

/// Common imports for samples
pub mod prelude {
    pub use crate::application::{
        AppError, AppResult, Application, Frame, GammaCorrectionPass, GlfwApplication, GuiSample,
        ImGuiApplication, Sample,
    };
    pub use crate::camera::Camera;
    pub use crate::config::Config;
    pub use crate::core::SampleConfig;
    pub use crate::events::{AppEvent, KeyCode, MouseButton};
    pub use crate::input::{FnCommandGenerator, FrameInput, InputFlags, InputHandler};
    pub use crate::vulkan::{
        BlendMode, GpuBuffer, GpuImage, GraphicsPipelineBuilder, ImageDesc, ImageTransition, MemoryLocation,
        Pipeline, ShaderModule, VulkanError, VulkanResult,
    };
}
