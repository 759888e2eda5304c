use std::sync::Arc;

use ash::vk;

use crate::renderer::core::support::DestroyGuard;
use crate::renderer::core::swapchain::AcquireOutcome;
use crate::renderer::core::GraphicsCore;
use crate::renderer::error::{creation, gpu_op, RenderError};

pub const FRAMES_IN_FLIGHT: usize = 2;

const CLEAR_COLOR: [f32; 4] = [0.01, 0.01, 0.01, 1.0];

/// What a frame submission produced. A rebuild request means the caller
/// must rebuild the presentation chain before drawing again.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    RebuildNeeded,
}

struct FrameSync {
    command_buffer: vk::CommandBuffer,
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
}

/// Per-frame orchestration: acquire a presentation image, record against
/// the current pipeline state, submit, present. Runs two frames in flight.
///
/// Recording is currently the clear pass only; per-model draws land once
/// descriptor pools exist to allocate the binding layout's sets from.
pub struct FrameDriver {
    command_pool: vk::CommandPool,
    frames: Vec<FrameSync>,
    current: usize,
    device: Arc<ash::Device>,
    teardown: DestroyGuard,
}

impl FrameDriver {
    pub fn new(device: Arc<ash::Device>, graphics_family: u32) -> Result<Self, RenderError> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(graphics_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(creation("frame command pool"))?
        };

        let buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(FRAMES_IN_FLIGHT as u32)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffers = unsafe {
            device
                .allocate_command_buffers(&buffer_info)
                .map_err(creation("frame command buffers"))?
        };

        let frames = command_buffers
            .into_iter()
            .map(|command_buffer| {
                let semaphore_info = vk::SemaphoreCreateInfo::default();
                let fence_info =
                    vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
                unsafe {
                    Ok(FrameSync {
                        command_buffer,
                        image_available: device
                            .create_semaphore(&semaphore_info, None)
                            .map_err(creation("image-available semaphore"))?,
                        render_finished: device
                            .create_semaphore(&semaphore_info, None)
                            .map_err(creation("render-finished semaphore"))?,
                        in_flight: device
                            .create_fence(&fence_info, None)
                            .map_err(creation("in-flight fence"))?,
                    })
                }
            })
            .collect::<Result<Vec<_>, RenderError>>()?;

        Ok(Self {
            command_pool,
            frames,
            current: 0,
            device,
            teardown: DestroyGuard::default(),
        })
    }

    pub fn draw(&mut self, core: &GraphicsCore) -> Result<FrameOutcome, RenderError> {
        let frame = &self.frames[self.current];

        unsafe {
            self.device
                .wait_for_fences(&[frame.in_flight], true, u64::MAX)
                .map_err(gpu_op("in-flight fence wait"))?;
        }

        let (image_index, suboptimal_acquire) =
            match core.chain().acquire_image(frame.image_available)? {
                AcquireOutcome::Ready { index, suboptimal } => (index, suboptimal),
                AcquireOutcome::OutOfDate => return Ok(FrameOutcome::RebuildNeeded),
            };

        unsafe {
            self.device
                .reset_fences(&[frame.in_flight])
                .map_err(gpu_op("in-flight fence reset"))?;
        }

        self.record(frame, core, image_index)?;

        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer];
        let signal_semaphores = [frame.render_finished];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            self.device
                .queue_submit(
                    core.device().graphics_queue.handle,
                    &[submit],
                    frame.in_flight,
                )
                .map_err(gpu_op("frame submission"))?;
        }

        let suboptimal_present = core.chain().present(
            core.device().present_queue.handle,
            image_index,
            frame.render_finished,
        )?;

        self.current = (self.current + 1) % FRAMES_IN_FLIGHT;

        if suboptimal_acquire || suboptimal_present {
            Ok(FrameOutcome::RebuildNeeded)
        } else {
            Ok(FrameOutcome::Presented)
        }
    }

    fn record(
        &self,
        frame: &FrameSync,
        core: &GraphicsCore,
        image_index: u32,
    ) -> Result<(), RenderError> {
        let cmd = frame.command_buffer;
        let extent = core.chain().settings.extent;

        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .map_err(gpu_op("command buffer reset"))?;
            self.device
                .begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default())
                .map_err(gpu_op("command recording begin"))?;
        }

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(core.render_pass().pass)
            .framebuffer(core.chain().framebuffer(image_index))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, &pass_begin, vk::SubpassContents::INLINE);
            self.device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                core.pipeline().pipeline,
            );
            self.device.cmd_end_render_pass(cmd);
            self.device
                .end_command_buffer(cmd)
                .map_err(gpu_op("command recording end"))?;
        }

        Ok(())
    }

    /// Destroys sync objects and the command pool. The caller must have
    /// waited for the device to go idle.
    pub fn destroy(&mut self) {
        if !self.teardown.arm() {
            return;
        }
        unsafe {
            for frame in self.frames.drain(..) {
                self.device.destroy_semaphore(frame.image_available, None);
                self.device.destroy_semaphore(frame.render_finished, None);
                self.device.destroy_fence(frame.in_flight, None);
            }
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
