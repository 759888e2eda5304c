pub mod descriptor_layout;
pub mod device;
pub mod instance;
pub mod pipeline;
pub mod render_pass;
pub mod support;
pub mod swapchain;
pub mod transfer;

use std::sync::Arc;

use ash::vk;
use winit::window::Window;

use crate::renderer::config::RenderConfig;
use crate::renderer::core::descriptor_layout::BindingLayout;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::core::pipeline::Pipeline;
use crate::renderer::core::render_pass::RenderTargetPass;
use crate::renderer::core::swapchain::PresentationChain;
use crate::renderer::core::transfer::TransferContext;
use crate::renderer::error::RenderError;

/// One entry in the creation log. Teardown is the log replayed in reverse,
/// which makes the destruction order an explicit contract instead of a
/// side effect of member order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoreStage {
    Instance,
    Surface,
    DebugMessenger,
    Device,
    Allocator,
    Transfer,
    PresentationChain,
    RenderPass,
    BindingLayout,
    Pipeline,
}

/// Computes the release order for a recorded creation sequence: exact
/// reverse of creation.
pub(crate) fn teardown_order(creation: &[CoreStage]) -> Vec<CoreStage> {
    creation.iter().rev().copied().collect()
}

/// Receiver for teardown: maps each recorded stage to the destruction of
/// the component it names. Split from the drain so tests can substitute a
/// recording receiver for the driver-backed one.
pub(crate) trait StageSink {
    fn release_stage(&mut self, stage: CoreStage);
}

/// Drains the creation log and releases every recorded stage in exact
/// reverse order. The drain makes a second call a no-op.
pub(crate) fn run_teardown(creation_log: &mut Vec<CoreStage>, sink: &mut dyn StageSink) {
    for stage in teardown_order(&std::mem::take(creation_log)) {
        sink.release_stage(stage);
    }
}

/// Owner of the whole GPU object graph: driver connection, surface,
/// device, and the strict chain Presentation Chain -> Render Target Pass
/// -> Resource Binding Layout -> Pipeline built on top of it. Every
/// dependent component queries device/queue/format state through this
/// owner rather than holding its own copies.
pub struct GraphicsCore {
    window: Arc<Window>,
    config: RenderConfig,

    instance: RenderInstance,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    device: RenderDevice,
    transfer: TransferContext,
    chain: PresentationChain,
    render_pass: RenderTargetPass,
    binding_layout: BindingLayout,
    pipeline: Pipeline,

    creation_log: Vec<CoreStage>,
}

impl GraphicsCore {
    pub fn new(window: Arc<Window>, config: RenderConfig) -> Result<Self, RenderError> {
        let mut creation_log = Vec::new();

        let mut instance = RenderInstance::new(&window)?;
        creation_log.push(CoreStage::Instance);

        let (surface, surface_loader) = instance.create_surface(&window)?;
        creation_log.push(CoreStage::Surface);

        if instance.register_debug_messenger()? {
            creation_log.push(CoreStage::DebugMessenger);
        }

        let device = RenderDevice::new(instance.raw(), surface, &surface_loader)?;
        creation_log.push(CoreStage::Device);
        creation_log.push(CoreStage::Allocator);

        let transfer = TransferContext::new(device.logical.clone(), device.graphics_queue)?;
        creation_log.push(CoreStage::Transfer);

        let mut chain = PresentationChain::new(
            instance.raw(),
            &device,
            surface,
            &surface_loader,
            drawable_extent(&window),
            config.vsync,
        )?;
        creation_log.push(CoreStage::PresentationChain);

        let render_pass =
            RenderTargetPass::new(instance.raw(), &device, chain.settings.format.format)?;
        creation_log.push(CoreStage::RenderPass);

        chain.attach_render_targets(&device, &render_pass)?;

        let binding_layout = BindingLayout::new(&device.logical)?;
        creation_log.push(CoreStage::BindingLayout);

        let pipeline = Pipeline::new(
            &device.logical,
            &config.shaders_dir,
            chain.settings.extent,
            &render_pass,
            &binding_layout,
        )?;
        creation_log.push(CoreStage::Pipeline);

        log::info!(
            "graphics core initialized: {} presentation images, {:?}, {}x{}",
            chain.image_count(),
            chain.settings.format.format,
            chain.settings.extent.width,
            chain.settings.extent.height,
        );

        Ok(Self {
            window,
            config,
            instance,
            surface,
            surface_loader,
            device,
            transfer,
            chain,
            render_pass,
            binding_layout,
            pipeline,
            creation_log,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn device(&self) -> &RenderDevice {
        &self.device
    }

    pub fn transfer(&self) -> &TransferContext {
        &self.transfer
    }

    pub fn chain(&self) -> &PresentationChain {
        &self.chain
    }

    pub fn render_pass(&self) -> &RenderTargetPass {
        &self.render_pass
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Rebuilds the presentation chain (images, views, depth buffer,
    /// framebuffers) against the window's current drawable size, leaving
    /// every other component alive. Waits for the device to go idle first;
    /// no frame may be in flight across this call.
    pub fn rebuild_presentation_chain(&mut self) -> Result<(), RenderError> {
        self.device.wait_idle()?;
        self.chain.rebuild(
            &self.device,
            self.surface,
            &self.surface_loader,
            drawable_extent(&self.window),
            self.config.vsync,
            &self.render_pass,
        )
    }

    /// Releases everything in exact reverse order of creation. Idempotent:
    /// the creation log is drained on the first call.
    pub fn release(&mut self) {
        let mut creation_log = std::mem::take(&mut self.creation_log);
        run_teardown(&mut creation_log, self);
    }
}

impl StageSink for GraphicsCore {
    fn release_stage(&mut self, stage: CoreStage) {
        log::debug!("releasing {stage:?}");
        match stage {
            CoreStage::Pipeline => self.pipeline.destroy(&self.device.logical),
            CoreStage::BindingLayout => self.binding_layout.destroy(&self.device.logical),
            CoreStage::RenderPass => self.render_pass.destroy(&self.device.logical),
            CoreStage::PresentationChain => self.chain.destroy(),
            CoreStage::Transfer => self.transfer.destroy(),
            CoreStage::Allocator => self.device.release_allocator(),
            CoreStage::Device => self.device.release(),
            CoreStage::DebugMessenger => self.instance.release_debug_messenger(),
            CoreStage::Surface => unsafe {
                self.surface_loader.destroy_surface(self.surface, None);
            },
            CoreStage::Instance => self.instance.release(),
        }
    }
}

impl Drop for GraphicsCore {
    fn drop(&mut self) {
        self.release();
    }
}

fn drawable_extent(window: &Window) -> vk::Extent2D {
    let size = window.inner_size();
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stands in for the driver-backed receiver and records which stage
    /// destructions ran, in order.
    #[derive(Default)]
    struct RecordingSink {
        released: Vec<CoreStage>,
    }

    impl StageSink for RecordingSink {
        fn release_stage(&mut self, stage: CoreStage) {
            self.released.push(stage);
        }
    }

    fn full_creation_log() -> Vec<CoreStage> {
        vec![
            CoreStage::Instance,
            CoreStage::Surface,
            CoreStage::DebugMessenger,
            CoreStage::Device,
            CoreStage::Allocator,
            CoreStage::Transfer,
            CoreStage::PresentationChain,
            CoreStage::RenderPass,
            CoreStage::BindingLayout,
            CoreStage::Pipeline,
        ]
    }

    #[test]
    fn teardown_is_exact_reverse_of_creation() {
        assert_eq!(
            teardown_order(&full_creation_log()),
            vec![
                CoreStage::Pipeline,
                CoreStage::BindingLayout,
                CoreStage::RenderPass,
                CoreStage::PresentationChain,
                CoreStage::Transfer,
                CoreStage::Allocator,
                CoreStage::Device,
                CoreStage::DebugMessenger,
                CoreStage::Surface,
                CoreStage::Instance,
            ]
        );
    }

    #[test]
    fn teardown_releases_each_stage_in_reverse_against_a_recorder() {
        let mut creation_log = full_creation_log();
        let mut sink = RecordingSink::default();

        run_teardown(&mut creation_log, &mut sink);

        assert_eq!(
            sink.released,
            vec![
                CoreStage::Pipeline,
                CoreStage::BindingLayout,
                CoreStage::RenderPass,
                CoreStage::PresentationChain,
                CoreStage::Transfer,
                CoreStage::Allocator,
                CoreStage::Device,
                CoreStage::DebugMessenger,
                CoreStage::Surface,
                CoreStage::Instance,
            ]
        );
    }

    #[test]
    fn second_release_reaches_no_stage() {
        let mut creation_log = vec![CoreStage::Instance, CoreStage::Surface, CoreStage::Device];
        let mut sink = RecordingSink::default();

        run_teardown(&mut creation_log, &mut sink);
        assert_eq!(sink.released.len(), 3);

        sink.released.clear();
        run_teardown(&mut creation_log, &mut sink);
        assert!(sink.released.is_empty());
    }

    #[test]
    fn release_order_without_debug_messenger() {
        // Production builds never record the messenger stage; the rest of
        // the contract is unchanged.
        let mut creation_log = vec![CoreStage::Instance, CoreStage::Surface, CoreStage::Device];
        let mut sink = RecordingSink::default();

        run_teardown(&mut creation_log, &mut sink);

        assert_eq!(
            sink.released,
            vec![CoreStage::Device, CoreStage::Surface, CoreStage::Instance]
        );
    }
}
