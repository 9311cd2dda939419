//! Vulkan wrappers
//!
//! Thin RAII types over `ash` plus the frame scheduling state machine. Every
//! wrapper clones the `ash::Device` it needs and destroys its handle on drop,
//! so owners only need to keep the device alive longer than its children.

pub mod barrier;
pub mod commands;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use barrier::{cmd_transition, ImageTransition};
pub use commands::{CommandPool, OneTimeCommands, RenderingTarget};
pub use descriptor::{DescriptorPool, DescriptorSetLayout};
pub use device::{LogicalDevice, PhysicalDeviceInfo, QueueFamilyIndices, SurfaceSupport};
pub use error::{VulkanError, VulkanResult};
pub use frame::{AcquireOutcome, FrameScheduler, FrameState, FrameSyncSet, PresentOutcome};
pub use instance::VulkanInstance;
pub use memory::{GpuAllocator, GpuBuffer, GpuImage, ImageDesc, MemoryLocation};
pub use pipeline::{BlendMode, ComputePipeline, GraphicsPipelineBuilder, Pipeline};
pub use shader::ShaderModule;
pub use swapchain::{DepthImages, Swapchain, DEPTH_FORMAT};
pub use sync::{Fence, FrameSync, Semaphore};
