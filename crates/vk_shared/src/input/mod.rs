//! Key-combination command layer
//!
//! Each frame the GUI layer samples which keys and buttons are held into a
//! [`FrameInput`]. Registered [`CommandGenerator`]s whose whole combination is
//! held fire once and turn the frame's input into a sample-defined command.

use bitflags::bitflags;

use crate::events::{AppEvent, KeyCode, MouseButton};

bitflags! {
    /// Inputs observed during one frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InputFlags: u32 {
        /// W held
        const PRESS_W = 1 << 0;
        /// A held
        const PRESS_A = 1 << 1;
        /// S held
        const PRESS_S = 1 << 2;
        /// D held
        const PRESS_D = 1 << 3;
        /// Middle mouse button held
        const MOUSE_MIDDLE = 1 << 4;
        /// Cursor moved since last frame
        const MOUSE_MOVE = 1 << 5;
    }
}

/// Snapshot of one frame's input
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameInput {
    /// Held keys and buttons plus movement
    pub flags: InputFlags,
    /// Cursor movement since last frame
    pub mouse_delta: (f32, f32),
    /// Cursor position in window coordinates
    pub mouse_pos: (f32, f32),
}

impl FrameInput {
    /// Build a snapshot; [`InputFlags::MOUSE_MOVE`] is derived from `mouse_delta`
    pub fn new(held: InputFlags, mouse_delta: (f32, f32), mouse_pos: (f32, f32)) -> Self {
        let mut flags = held - InputFlags::MOUSE_MOVE;
        if mouse_delta.0 != 0.0 || mouse_delta.1 != 0.0 {
            flags |= InputFlags::MOUSE_MOVE;
        }
        Self {
            flags,
            mouse_delta,
            mouse_pos,
        }
    }

    /// Whether every flag in `combination` is present
    pub fn contains(&self, combination: InputFlags) -> bool {
        self.flags.contains(combination)
    }
}

/// Accumulates window events into per-frame [`FrameInput`] snapshots
#[derive(Debug, Clone, Default)]
pub struct InputState {
    held: InputFlags,
    cursor: Option<(f32, f32)>,
    delta: (f32, f32),
}

impl InputState {
    /// Empty state: nothing held, cursor unknown
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the held flags and cursor movement
    pub fn on_event(&mut self, event: &AppEvent) {
        match *event {
            AppEvent::Key { key, pressed } => {
                let flag = match key {
                    KeyCode::W => InputFlags::PRESS_W,
                    KeyCode::A => InputFlags::PRESS_A,
                    KeyCode::S => InputFlags::PRESS_S,
                    KeyCode::D => InputFlags::PRESS_D,
                    _ => return,
                };
                self.held.set(flag, pressed);
            }
            AppEvent::MouseButton {
                button: MouseButton::Middle,
                pressed,
                ..
            } => self.held.set(InputFlags::MOUSE_MIDDLE, pressed),
            AppEvent::CursorMoved { x, y } => {
                if let Some((last_x, last_y)) = self.cursor {
                    self.delta.0 += x - last_x;
                    self.delta.1 += y - last_y;
                }
                self.cursor = Some((x, y));
            }
            // Keys held while the window loses focus never see their release
            AppEvent::Focused(false) => self.held = InputFlags::empty(),
            _ => {}
        }
    }

    /// Snapshot the frame and reset the accumulated movement
    pub fn take_frame(&mut self) -> FrameInput {
        let delta = std::mem::take(&mut self.delta);
        FrameInput::new(self.held, delta, self.cursor.unwrap_or_default())
    }
}

/// Turns a key combination into a command
pub trait CommandGenerator<C> {
    /// Inputs that must all be present for this generator to fire
    fn key_combination(&self) -> InputFlags;

    /// Produce the command for this frame
    fn generate(&self, input: &FrameInput) -> C;
}

/// Generator backed by a closure
pub struct FnCommandGenerator<F> {
    combination: InputFlags,
    generate: F,
}

impl<F> FnCommandGenerator<F> {
    /// Fire `generate` when `combination` is held
    pub fn new(combination: InputFlags, generate: F) -> Self {
        Self {
            combination,
            generate,
        }
    }
}

impl<C, F: Fn(&FrameInput) -> C> CommandGenerator<C> for FnCommandGenerator<F> {
    fn key_combination(&self) -> InputFlags {
        self.combination
    }

    fn generate(&self, input: &FrameInput) -> C {
        (self.generate)(input)
    }
}

/// Registry of command generators, at most one per combination
pub struct InputHandler<C> {
    generators: Vec<Box<dyn CommandGenerator<C>>>,
}

impl<C> Default for InputHandler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> InputHandler<C> {
    /// Empty handler
    pub fn new() -> Self {
        Self {
            generators: Vec::new(),
        }
    }

    /// Register a generator, replacing any with the same combination
    pub fn add_or_update(&mut self, generator: Box<dyn CommandGenerator<C>>) {
        let combination = generator.key_combination();
        match self
            .generators
            .iter_mut()
            .find(|g| g.key_combination() == combination)
        {
            Some(existing) => *existing = generator,
            None => self.generators.push(generator),
        }
    }

    /// Remove the generator for `combination`; returns whether one existed
    pub fn remove(&mut self, combination: InputFlags) -> bool {
        let before = self.generators.len();
        self.generators.retain(|g| g.key_combination() != combination);
        self.generators.len() != before
    }

    /// Number of registered generators
    pub fn len(&self) -> usize {
        self.generators.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Commands for every generator whose combination is held, in registration order
    pub fn handle(&self, input: &FrameInput) -> Vec<C> {
        self.generators
            .iter()
            .filter(|g| input.contains(g.key_combination()))
            .map(|g| g.generate(input))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Cmd {
        Forward,
        Back,
        Rotate(f32, f32),
        Tagged(&'static str),
    }

    fn gen<F: Fn(&FrameInput) -> Cmd + 'static>(flags: InputFlags, f: F) -> Box<dyn CommandGenerator<Cmd>> {
        Box::new(FnCommandGenerator::new(flags, f))
    }

    #[test]
    fn test_input_state_tracks_held_keys() {
        let mut state = InputState::new();
        state.on_event(&AppEvent::Key {
            key: KeyCode::W,
            pressed: true,
        });
        state.on_event(&AppEvent::Key {
            key: KeyCode::Space,
            pressed: true,
        });
        assert_eq!(state.take_frame().flags, InputFlags::PRESS_W);
        // Held keys persist across frames
        assert_eq!(state.take_frame().flags, InputFlags::PRESS_W);

        state.on_event(&AppEvent::Key {
            key: KeyCode::W,
            pressed: false,
        });
        assert!(state.take_frame().flags.is_empty());
    }

    #[test]
    fn test_input_state_accumulates_delta() {
        let mut state = InputState::new();
        // First position only anchors the cursor
        state.on_event(&AppEvent::CursorMoved { x: 10.0, y: 10.0 });
        state.on_event(&AppEvent::CursorMoved { x: 13.0, y: 8.0 });
        state.on_event(&AppEvent::CursorMoved { x: 15.0, y: 9.0 });
        state.on_event(&AppEvent::MouseButton {
            button: MouseButton::Middle,
            pressed: true,
            position: (15.0, 9.0),
        });

        let frame = state.take_frame();
        assert_eq!(frame.mouse_delta, (5.0, -1.0));
        assert_eq!(frame.mouse_pos, (15.0, 9.0));
        assert!(frame.contains(InputFlags::MOUSE_MIDDLE | InputFlags::MOUSE_MOVE));

        let next = state.take_frame();
        assert_eq!(next.mouse_delta, (0.0, 0.0));
        assert_eq!(next.flags, InputFlags::MOUSE_MIDDLE);
    }

    #[test]
    fn test_focus_loss_releases_everything() {
        let mut state = InputState::new();
        state.on_event(&AppEvent::Key {
            key: KeyCode::D,
            pressed: true,
        });
        state.on_event(&AppEvent::Focused(false));
        assert!(state.take_frame().flags.is_empty());
    }

    #[test]
    fn test_mouse_move_derived_from_delta() {
        let still = FrameInput::new(InputFlags::MOUSE_MOVE, (0.0, 0.0), (5.0, 5.0));
        assert!(!still.contains(InputFlags::MOUSE_MOVE));

        let moved = FrameInput::new(InputFlags::empty(), (1.0, 0.0), (5.0, 5.0));
        assert!(moved.contains(InputFlags::MOUSE_MOVE));
    }

    #[test]
    fn test_single_key_fires() {
        let mut handler = InputHandler::new();
        handler.add_or_update(gen(InputFlags::PRESS_W, |_| Cmd::Forward));
        handler.add_or_update(gen(InputFlags::PRESS_S, |_| Cmd::Back));

        let input = FrameInput::new(InputFlags::PRESS_W, (0.0, 0.0), (0.0, 0.0));
        assert_eq!(handler.handle(&input), vec![Cmd::Forward]);
    }

    #[test]
    fn test_combination_requires_all_flags() {
        let mut handler = InputHandler::new();
        handler.add_or_update(gen(InputFlags::MOUSE_MIDDLE | InputFlags::MOUSE_MOVE, |i| {
            Cmd::Rotate(i.mouse_delta.0, i.mouse_delta.1)
        }));

        let held_only = FrameInput::new(InputFlags::MOUSE_MIDDLE, (0.0, 0.0), (0.0, 0.0));
        assert!(handler.handle(&held_only).is_empty());

        let moved_only = FrameInput::new(InputFlags::empty(), (2.0, 3.0), (0.0, 0.0));
        assert!(handler.handle(&moved_only).is_empty());

        let dragging = FrameInput::new(InputFlags::MOUSE_MIDDLE, (2.0, 3.0), (0.0, 0.0));
        assert_eq!(handler.handle(&dragging), vec![Cmd::Rotate(2.0, 3.0)]);
    }

    #[test]
    fn test_superset_fires_every_contained_combination() {
        let mut handler = InputHandler::new();
        handler.add_or_update(gen(InputFlags::PRESS_W, |_| Cmd::Forward));
        handler.add_or_update(gen(InputFlags::PRESS_S, |_| Cmd::Back));

        let input = FrameInput::new(InputFlags::PRESS_W | InputFlags::PRESS_S, (0.0, 0.0), (0.0, 0.0));
        assert_eq!(handler.handle(&input), vec![Cmd::Forward, Cmd::Back]);
    }

    #[test]
    fn test_add_or_update_replaces_same_combination() {
        let mut handler = InputHandler::new();
        handler.add_or_update(gen(InputFlags::PRESS_W, |_| Cmd::Tagged("old")));
        handler.add_or_update(gen(InputFlags::PRESS_W, |_| Cmd::Tagged("new")));
        assert_eq!(handler.len(), 1);

        let input = FrameInput::new(InputFlags::PRESS_W, (0.0, 0.0), (0.0, 0.0));
        assert_eq!(handler.handle(&input), vec![Cmd::Tagged("new")]);
    }

    #[test]
    fn test_remove() {
        let mut handler = InputHandler::new();
        handler.add_or_update(gen(InputFlags::PRESS_W, |_| Cmd::Forward));
        assert!(handler.remove(InputFlags::PRESS_W));
        assert!(!handler.remove(InputFlags::PRESS_W));
        assert!(handler.is_empty());
    }

    #[test]
    fn test_empty_input_fires_nothing() {
        let mut handler = InputHandler::new();
        handler.add_or_update(gen(InputFlags::PRESS_D, |_| Cmd::Forward));
        assert!(handler.handle(&FrameInput::default()).is_empty());
    }
}
