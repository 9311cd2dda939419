//! Vulkan layer errors

use ash::vk;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(#[from] vk::Result),

    /// Loader, instance or device setup failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No physical device meets the requirements
    #[error("No suitable GPU found: {0}")]
    NoSuitableDevice(String),

    /// A required instance or device extension is unavailable
    #[error("Missing extension: {0}")]
    MissingExtension(String),

    /// A required instance layer is unavailable
    #[error("Missing layer: {0}")]
    MissingLayer(String),

    /// SPIR-V could not be read or a module could not be created
    #[error("Shader error: {0}")]
    Shader(String),

    /// Memory allocation or mapping failed
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// A frame operation was called out of order
    #[error("Invalid frame state: cannot {operation} while {state}")]
    InvalidFrameState {
        /// The operation that was attempted
        operation: &'static str,
        /// The state the scheduler was in
        state: String,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_from_result() {
        fn fails() -> VulkanResult<()> {
            Err(vk::Result::ERROR_DEVICE_LOST)?;
            Ok(())
        }
        assert!(matches!(fails(), Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))));
    }

    #[test]
    fn test_frame_state_message() {
        let err = VulkanError::InvalidFrameState {
            operation: "submit",
            state: "Idle".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid frame state: cannot submit while Idle");
    }
}
