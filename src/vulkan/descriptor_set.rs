use std::sync::Arc;

use ash::vk;

use super::{buffer::Buffer, context::Context, device_error};
use crate::gpu::GpuResult;

/// A descriptor set with one storage buffer per binding, read by the ray tracing pass.
pub struct StorageBufferSet {
    pub layout: vk::DescriptorSetLayout,
    pub inner: vk::DescriptorSet,
    pool: vk::DescriptorPool,
    binding_count: u32,
    context: Arc<Context>,
}

impl StorageBufferSet {
    pub fn new(context: Arc<Context>, binding_count: u32) -> GpuResult<Self> {
        let device = &context.device;

        let bindings: Vec<_> = (0..binding_count)
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::ALL)
                    .build()
            })
            .collect();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(device_error("Could not create descriptor set layout"))?;

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: binding_count,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        let pool = match unsafe { device.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(error) => {
                unsafe { device.destroy_descriptor_set_layout(layout, None) };
                return Err(device_error("Could not create descriptor pool")(error));
            }
        };

        let allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(std::slice::from_ref(&layout));
        let descriptor_set = match unsafe { device.allocate_descriptor_sets(&allocate_info) } {
            Ok(sets) => sets[0],
            Err(error) => {
                unsafe { device.destroy_descriptor_pool(pool, None) };
                unsafe { device.destroy_descriptor_set_layout(layout, None) };
                return Err(device_error("Could not allocate descriptor set")(error));
            }
        };

        Ok(Self {
            layout,
            inner: descriptor_set,
            pool,
            binding_count,
            context,
        })
    }

    /// Points `binding` at the whole of `buffer`.
    pub fn write(&self, binding: u32, buffer: &Buffer) {
        if binding >= self.binding_count {
            log::warn!(
                "Storage binding {} does not exist, there are {}",
                binding,
                self.binding_count
            );
            return;
        }

        let buffer_info = vk::DescriptorBufferInfo {
            buffer: buffer.inner,
            offset: 0,
            range: vk::WHOLE_SIZE,
        };
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(self.inner)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .buffer_info(std::slice::from_ref(&buffer_info))
            .build();

        unsafe {
            self.context
                .device
                .update_descriptor_sets(std::slice::from_ref(&write), &[])
        };
    }
}

impl Drop for StorageBufferSet {
    fn drop(&mut self) {
        let device = &self.context.device;
        // Destroying the pool frees the set
        unsafe { device.destroy_descriptor_pool(self.pool, None) };
        unsafe { device.destroy_descriptor_set_layout(self.layout, None) };
    }
}
