use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{Key, NamedKey};

/// Keyboard/window input snapshot. The quit flag is the only signal the
/// engine core consumes; input-to-gameplay mapping lives elsewhere.
#[derive(Default)]
pub struct InputState {
    quit_requested: bool,
}

impl InputState {
    pub fn process_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.quit_requested = true;
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                self.quit_requested = true;
            }
            _ => {}
        }
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_request_sets_quit() {
        let mut input = InputState::default();
        assert!(!input.quit_requested());
        input.process_window_event(&WindowEvent::CloseRequested);
        assert!(input.quit_requested());
    }
}
