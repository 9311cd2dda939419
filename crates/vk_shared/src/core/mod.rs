//! Core sample configuration

pub mod config;

pub use config::{
    PresentModePreference, RendererConfig, SampleConfig, ShaderConfig, SurfaceFormatPreference,
    WindowConfig, MAX_FRAMES_IN_FLIGHT_LIMIT,
};
