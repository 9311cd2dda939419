//! SPIR-V shader modules

use ash::{vk, Device};
use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;

use super::error::{VulkanError, VulkanResult};

/// Entry point every sample shader uses
pub const ENTRY_POINT: &CStr = c"main";

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode SPIR-V bytes into words, rejecting empty, misaligned or non-SPIR-V data
pub fn parse_spirv(bytes: &[u8]) -> VulkanResult<Vec<u32>> {
    if bytes.is_empty() {
        return Err(VulkanError::Shader("SPIR-V code is empty".to_string()));
    }
    if bytes.len() % 4 != 0 {
        return Err(VulkanError::Shader(format!(
            "SPIR-V length {} is not a multiple of 4",
            bytes.len()
        )));
    }

    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| VulkanError::Shader(format!("Failed to read SPIR-V: {e}")))?;

    // read_spv byte-swaps big-endian modules, so the magic is always native here
    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(VulkanError::Shader("Missing SPIR-V magic number".to_string()));
    }
    Ok(words)
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a module from SPIR-V bytes
    pub fn from_spirv_bytes(device: Device, bytes: &[u8]) -> VulkanResult<Self> {
        let code = parse_spirv(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe { device.create_shader_module(&create_info, None)? };
        Ok(Self { device, module })
    }

    /// Load a module from a `.spv` file
    pub fn from_file(device: Device, path: impl AsRef<Path>) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| VulkanError::Shader(format!("Failed to read {}: {e}", path.display())))?;
        log::debug!("Loaded shader {} ({} bytes)", path.display(), bytes.len());
        Self::from_spirv_bytes(device, &bytes)
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage info with entry point `main`
    pub fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}
