mod input_state;
mod timestep;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use color_eyre::Result;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::input_state::InputState;
use crate::app::timestep::FixedTimestep;
use crate::renderer::config::RenderConfig;
use crate::renderer::Renderer;

/// Creates the event loop and runs the application until the running flag
/// drops.
pub fn run(config: RenderConfig) -> Result<()> {
    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

pub struct App {
    config: RenderConfig,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,

    // Single-writer stop signal: input flips it, the loop observes it
    // once per tick.
    running: Arc<AtomicBool>,
    input_state: InputState,
    timestep: FixedTimestep,
    prev_frame_time: Instant,
}

impl App {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            running: Arc::new(AtomicBool::new(true)),
            input_state: InputState::default(),
            timestep: FixedTimestep::new(),
            prev_frame_time: Instant::now(),
        }
    }

    fn tick(&mut self) {
        if self.input_state.quit_requested() {
            self.running.store(false, Ordering::Relaxed);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let attributes = Window::default_attributes()
                .with_title(self.config.window_title.clone())
                .with_inner_size(PhysicalSize::new(
                    self.config.window_width,
                    self.config.window_height,
                ));
            match event_loop.create_window(attributes) {
                Ok(window) => self.window = Some(Arc::new(window)),
                Err(err) => {
                    log::error!("window creation failed: {err}");
                    event_loop.exit();
                    return;
                }
            }
        }

        if self.renderer.is_none() {
            if let Some(window) = self.window.clone() {
                match Renderer::new(window, self.config.clone()) {
                    Ok(renderer) => self.renderer = Some(renderer),
                    Err(err) => {
                        // Initialization either completes or the process
                        // stops; there is no degraded mode.
                        log::error!("renderer initialization failed: {err}");
                        event_loop.exit();
                    }
                }
            }
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window_id != window.id() {
            return;
        }

        self.input_state.process_window_event(&event);

        match event {
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.request_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let frame_time = now.duration_since(self.prev_frame_time);
                self.prev_frame_time = now;

                for _ in 0..self.timestep.advance(frame_time) {
                    self.tick();
                }

                if let Some(renderer) = self.renderer.as_mut() {
                    if let Err(err) = renderer.draw() {
                        log::error!("draw failed: {err}");
                        self.running.store(false, Ordering::Relaxed);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.input_state.quit_requested() {
            self.running.store(false, Ordering::Relaxed);
        }

        if !self.running.load(Ordering::Relaxed) {
            event_loop.exit();
            return;
        }

        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}
