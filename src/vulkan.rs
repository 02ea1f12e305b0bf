//! [`GpuDevice`](crate::gpu::GpuDevice) implemented with Vulkan.

mod buffer;
mod command_pool;
mod context;
mod descriptor_set;
mod device;
mod image;
mod sampler;

pub use context::Context;
pub use device::VulkanDevice;

use ash::vk;
use gpu_allocator::AllocationError;

use crate::gpu::GpuError;

fn device_error(action: &'static str) -> impl Fn(vk::Result) -> GpuError {
    move |result| match result {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            GpuError::Device(format!("{}: out of memory ({})", action, result))
        }
        _ => GpuError::Device(format!("{}: {}", action, result)),
    }
}

fn allocation_error(size: u64) -> impl Fn(AllocationError) -> GpuError {
    move |error| match error {
        AllocationError::OutOfMemory => GpuError::OutOfMemory(size),
        other => GpuError::Device(other.to_string()),
    }
}
