use std::sync::Arc;

use ash::vk;

use crate::renderer::core::device::Queue;
use crate::renderer::core::support::DestroyGuard;
use crate::renderer::error::{creation, gpu_op, RenderError};

/// Scoped single-use command submission for one-off transfer work.
/// Record-submit-wait, blocking the caller until the graphics queue is
/// idle; deliberately not a throughput path, and overlapping transfers are
/// not pipelined.
pub struct TransferContext {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    queue: Queue,
    device: Arc<ash::Device>,
    teardown: DestroyGuard,
}

impl TransferContext {
    pub fn new(device: Arc<ash::Device>, queue: Queue) -> Result<Self, RenderError> {
        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue.family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe {
            device
                .create_command_pool(&command_pool_info, None)
                .map_err(creation("transfer command pool"))?
        };

        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffer = unsafe {
            device
                .allocate_command_buffers(&command_buffer_info)
                .map_err(creation("transfer command buffer"))?[0]
        };

        Ok(Self {
            command_pool,
            command_buffer,
            queue,
            device,
            teardown: DestroyGuard::default(),
        })
    }

    /// Records one operation, submits it, and blocks until the queue
    /// reports idle before releasing the recording context.
    pub fn submit_once<F>(&self, record: F) -> Result<(), RenderError>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<(), RenderError>,
    {
        let cmd = self.command_buffer;

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(cmd, &begin_info)
                .map_err(gpu_op("command recording begin"))?;
        }

        record(cmd, &self.device)?;

        unsafe {
            self.device
                .end_command_buffer(cmd)
                .map_err(gpu_op("command recording end"))?;
        }

        let command_buffers = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device
                .queue_submit(self.queue.handle, &[submit], vk::Fence::null())
                .map_err(gpu_op("transfer submission"))?;
            self.device
                .queue_wait_idle(self.queue.handle)
                .map_err(gpu_op("transfer queue idle wait"))?;
            self.device
                .reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())
                .map_err(gpu_op("transfer pool reset"))?;
        }

        Ok(())
    }

    /// Destroys the command pool. Belongs to the logical-device stage and
    /// runs immediately before the device itself.
    pub fn destroy(&mut self) {
        if !self.teardown.arm() {
            return;
        }
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

impl Drop for TransferContext {
    fn drop(&mut self) {
        self.destroy();
    }
}
