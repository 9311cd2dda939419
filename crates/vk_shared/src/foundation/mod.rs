//! Foundation module - small utilities shared by every sample
//!
//! - Logging initialisation
//! - Frame timing

pub mod logging;
pub mod time;
