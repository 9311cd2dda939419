//! Headless compute sample
//!
//! Multiplies two 3x3 matrices in `matmul.comp` through storage buffers and
//! checks the GPU result against nalgebra.

use ash::vk;
use nalgebra::Matrix3;
use vk_shared::application::{AppError, AppResult, Application};
use vk_shared::core::SampleConfig;
use vk_shared::foundation::logging;
use vk_shared::vulkan::descriptor::{layout_binding, update_descriptor_sets, write_buffer};
use vk_shared::vulkan::{ComputePipeline, DescriptorPool, DescriptorSetLayout, MemoryLocation};

const N: usize = 3;
const TOLERANCE: f32 = 1.0e-4;

/// Row-major elements of `m`, the layout the shader indexes
fn to_row_major(m: &Matrix3<f32>) -> [f32; N * N] {
    let mut out = [0.0; N * N];
    for row in 0..N {
        for col in 0..N {
            out[row * N + col] = m[(row, col)];
        }
    }
    out
}

fn from_row_major(values: &[f32]) -> Matrix3<f32> {
    Matrix3::from_row_slice(&values[..N * N])
}

/// Largest absolute element difference
fn max_abs_diff(a: &Matrix3<f32>, b: &Matrix3<f32>) -> f32 {
    (a - b).amax()
}

fn main() {
    let config = SampleConfig::new("matrix_multiply").with_max_frames_in_flight(1);
    logging::init(&config.log_level);

    if let Err(e) = run(config) {
        log::error!("matrix_multiply failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: SampleConfig) -> AppResult<()> {
    let app = Application::headless(config)?;
    log::info!("Running on {}", app.physical_device().name);

    let a = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
    let b = Matrix3::new(9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0);

    let result = multiply_on_gpu(&app, &a, &b)?;
    let expected = a * b;
    let diff = max_abs_diff(&result, &expected);

    log::info!("A * B on the GPU:{result}");
    if diff > TOLERANCE {
        return Err(AppError::Sample(format!(
            "GPU result differs from the CPU reference by {diff}"
        )));
    }
    log::info!("Matches the CPU reference (max difference {diff:e})");
    Ok(())
}

fn multiply_on_gpu(app: &Application, a: &Matrix3<f32>, b: &Matrix3<f32>) -> AppResult<Matrix3<f32>> {
    let device = app.device();
    let usage = vk::BufferUsageFlags::STORAGE_BUFFER;

    let buffer_a = app.create_buffer_with_data(&to_row_major(a), usage)?;
    let buffer_b = app.create_buffer_with_data(&to_row_major(b), usage)?;
    let mut buffer_c = app.create_buffer(
        (N * N * std::mem::size_of::<f32>()) as vk::DeviceSize,
        usage,
        MemoryLocation::GpuToCpu,
    )?;

    let bindings: Vec<_> = (0..3)
        .map(|i| layout_binding(i, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::COMPUTE))
        .collect();
    let set_layout = DescriptorSetLayout::new(device.clone(), &bindings, false)?;

    let pool = DescriptorPool::new(
        device.clone(),
        &[vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: 3,
        }],
        1,
    )?;
    let set = pool.allocate(set_layout.handle())?;

    let infos: [[vk::DescriptorBufferInfo; 1]; 3] = [
        [buffer_a.descriptor_info()],
        [buffer_b.descriptor_info()],
        [buffer_c.descriptor_info()],
    ];
    let writes: Vec<_> = infos
        .iter()
        .zip(0u32..)
        .map(|(info, binding)| write_buffer(set, binding, vk::DescriptorType::STORAGE_BUFFER, info))
        .collect();
    update_descriptor_sets(device, &writes);

    let shader = app.create_shader_module("matmul.comp.spv")?;
    let pipeline = ComputePipeline::new(device, &shader, &[set_layout.handle()], &[])?;

    let cmd = app.one_time_commands()?;
    pipeline.cmd_bind(cmd.command_buffer());
    pipeline.cmd_bind_descriptor_sets(cmd.command_buffer(), &[set]);
    let host_read = [vk::MemoryBarrier2::builder()
        .src_stage_mask(vk::PipelineStageFlags2::COMPUTE_SHADER)
        .src_access_mask(vk::AccessFlags2::SHADER_STORAGE_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::HOST)
        .dst_access_mask(vk::AccessFlags2::HOST_READ)
        .build()];
    unsafe {
        device.cmd_dispatch(cmd.command_buffer(), 1, 1, 1);
        device.cmd_pipeline_barrier2(
            cmd.command_buffer(),
            &vk::DependencyInfo::builder().memory_barriers(&host_read),
        );
    }
    cmd.submit_and_wait(app.graphics_queue())?;

    let values: Vec<f32> = buffer_c.read()?;
    Ok(from_row_major(&values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_row_major_layout() {
        let m = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        assert_eq!(to_row_major(&m), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(from_row_major(&to_row_major(&m)), m);
    }

    #[test]
    fn test_shader_indexing_matches_reference() {
        // Same loop as matmul.comp, run on the CPU
        let a = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        let b = Matrix3::new(9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0);
        let (ra, rb) = (to_row_major(&a), to_row_major(&b));
        let mut rc = [0.0f32; N * N];
        for row in 0..N {
            for col in 0..N {
                rc[row * N + col] = (0..N).map(|k| ra[row * N + k] * rb[k * N + col]).sum();
            }
        }

        let expected = a * b;
        assert_relative_eq!(from_row_major(&rc), expected, epsilon = TOLERANCE);
        assert_relative_eq!(rc[0], 30.0);
        assert_relative_eq!(rc[8], 90.0);
    }

    #[test]
    fn test_max_abs_diff() {
        let a = Matrix3::identity();
        let mut b = Matrix3::identity();
        b[(1, 2)] = 0.5;
        assert_relative_eq!(max_abs_diff(&a, &b), 0.5);
        assert_relative_eq!(max_abs_diff(&a, &a), 0.0);
    }
}
