use ash::vk;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};

use super::{allocation_error, context::Context, device_error};
use crate::gpu::{GpuError, GpuResult};

/// A buffer and the allocation backing it.
///
/// Buffers are freed explicitly with [`Buffer::destroy`] because that needs the allocator.
pub struct Buffer {
    pub inner: vk::Buffer,
    pub usage: vk::BufferUsageFlags,
    pub size: vk::DeviceSize,
    allocation: Allocation,
}

impl Buffer {
    pub fn new(
        context: &Context,
        allocator: &mut Allocator,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> GpuResult<Self> {
        let device = &context.device;

        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&create_info, None) }
            .map_err(device_error("Could not create buffer"))?;

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let allocation = match allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(error) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(allocation_error(size)(error));
            }
        };

        let bound =
            unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) };
        let buffer = Self {
            inner: buffer,
            usage,
            size,
            allocation,
        };
        if let Err(error) = bound {
            buffer.destroy(context, allocator);
            return Err(device_error("Could not bind buffer memory")(error));
        }

        Ok(buffer)
    }

    /// Writes `data` to the start of a host visible buffer.
    pub fn copy_data(&mut self, data: &[u8]) -> GpuResult<()> {
        let mapped = self.allocation.mapped_slice_mut().ok_or_else(|| {
            GpuError::BufferCreationFailed("buffer memory is not host visible".to_string())
        })?;
        let target = mapped.get_mut(..data.len()).ok_or_else(|| {
            GpuError::BufferCreationFailed(format!(
                "{} bytes do not fit into a buffer of {} bytes",
                data.len(),
                self.size
            ))
        })?;
        target.copy_from_slice(data);
        Ok(())
    }

    pub fn destroy(self, context: &Context, allocator: &mut Allocator) {
        if let Err(error) = allocator.free(self.allocation) {
            log::error!("Could not free buffer memory: {}", error);
        }
        unsafe { context.device.destroy_buffer(self.inner, None) };
    }
}
