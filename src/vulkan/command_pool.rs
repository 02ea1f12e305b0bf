use std::sync::Arc;

use ash::vk;

use super::{context::Context, device_error};
use crate::gpu::GpuResult;

/// Records and submits setup work such as texture uploads.
pub struct CommandPool {
    inner: vk::CommandPool,
    context: Arc<Context>,
}

impl CommandPool {
    pub fn new(context: Arc<Context>) -> GpuResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(context.queue_family_index)
            .flags(
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                    | vk::CommandPoolCreateFlags::TRANSIENT,
            );

        let command_pool = unsafe { context.device.create_command_pool(&create_info, None) }
            .map_err(device_error("Could not create command pool"))?;

        Ok(Self {
            inner: command_pool,
            context,
        })
    }

    /// Records one command buffer with `record`, submits it and waits until it finished.
    pub fn submit_and_wait(&self, record: impl FnOnce(vk::CommandBuffer)) -> GpuResult<()> {
        let device = &self.context.device;

        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_buffer_count(1)
            .command_pool(self.inner)
            .level(vk::CommandBufferLevel::PRIMARY);

        let command_buffer = unsafe { device.allocate_command_buffers(&allocate_info) }
            .map_err(device_error("Could not allocate command buffers"))?[0];

        let result = self.record_and_submit(command_buffer, record);

        unsafe { device.free_command_buffers(self.inner, std::slice::from_ref(&command_buffer)) };
        result
    }

    fn record_and_submit(
        &self,
        command_buffer: vk::CommandBuffer,
        record: impl FnOnce(vk::CommandBuffer),
    ) -> GpuResult<()> {
        let device = &self.context.device;

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(command_buffer, &begin_info) }
            .map_err(device_error("Could not begin command buffer"))?;

        record(command_buffer);

        unsafe { device.end_command_buffer(command_buffer) }
            .map_err(device_error("Could not end command buffer"))?;

        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) }
            .map_err(device_error("Could not create fence"))?;

        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(std::slice::from_ref(&command_buffer))
            .build();
        let submitted = unsafe {
            device.queue_submit(
                self.context.queue,
                std::slice::from_ref(&submit_info),
                fence,
            )
        }
        .map_err(device_error("Could not submit to queue"))
        .and_then(|_| {
            unsafe { device.wait_for_fences(std::slice::from_ref(&fence), true, u64::MAX) }
                .map_err(device_error("Could not wait for fence"))
        });

        unsafe { device.destroy_fence(fence, None) };
        submitted
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_command_pool(self.inner, None) };
    }
}
