pub mod config;
pub mod error;

mod core;
mod frame;
mod resources;

use std::sync::Arc;

use winit::window::Window;

use crate::renderer::config::RenderConfig;
use crate::renderer::core::GraphicsCore;
use crate::renderer::error::RenderError;
use crate::renderer::frame::{FrameDriver, FrameOutcome};
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::resources::model::Model;
use crate::renderer::resources::texture::Texture;

/// Owns the GPU object graph, the frame driver, and the uploaded scene
/// resources, in an order that lets teardown run models-first and the
/// core last.
pub struct Renderer {
    models: Vec<Model>,
    material_texture: Option<Texture>,
    frame: FrameDriver,
    core: GraphicsCore,
    resize_requested: bool,
}

impl Renderer {
    pub fn new(window: Arc<Window>, config: RenderConfig) -> Result<Self, RenderError> {
        let material_path = config.material_path.clone();
        let core = GraphicsCore::new(window, config)?;

        let frame = FrameDriver::new(
            core.device().logical.clone(),
            core.device().graphics_queue.family_index,
        )?;

        // Stand-in scene until asset loading is wired up: a unit cube and
        // a white material map, exercising the staged-upload path.
        let cube = Mesh::cube(0.5);
        let model = Model::new(
            &cube,
            core.device().allocator()?,
            core.device().logical.clone(),
            core.transfer(),
        )?;
        let max_anisotropy = core.device().properties.limits.max_sampler_anisotropy;
        let material_texture = match &material_path {
            Some(path) => Texture::from_file(
                path,
                max_anisotropy,
                core.device().allocator()?,
                core.device().logical.clone(),
                core.transfer(),
            )?,
            None => Texture::from_pixels(
                &[255, 255, 255, 255],
                1,
                1,
                max_anisotropy,
                core.device().allocator()?,
                core.device().logical.clone(),
                core.transfer(),
            )?,
        };
        log::info!("uploaded stand-in model: {} indices", model.index_count);

        Ok(Self {
            models: vec![model],
            material_texture: Some(material_texture),
            frame,
            core,
            resize_requested: false,
        })
    }

    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    pub fn draw(&mut self) -> Result<(), RenderError> {
        // A minimized window reports a zero drawable size; there is
        // nothing to present against until it comes back.
        let size = self.core.window().inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }

        if self.resize_requested {
            self.core.rebuild_presentation_chain()?;
            self.resize_requested = false;
        }

        match self.frame.draw(&self.core)? {
            FrameOutcome::Presented => {}
            FrameOutcome::RebuildNeeded => self.resize_requested = true,
        }
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(err) = self.core.device().wait_idle() {
            log::error!("device idle wait failed during shutdown: {err}");
        }
        // Resources return their allocations before the allocator stage
        // releases; the core's own reverse-order release runs last.
        self.models.clear();
        self.material_texture = None;
        self.frame.destroy();
        self.core.release();
    }
}
