//! Window events in a form the samples can consume
//!
//! GLFW events are translated once, in [`from_glfw`], so camera, input and
//! sample code never touch `glfw` types directly.

/// Keys the samples react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// W
    W,
    /// A
    A,
    /// S
    S,
    /// D
    D,
    /// Q
    Q,
    /// E
    E,
    /// Space
    Space,
    /// Escape
    Escape,
    /// Enter
    Enter,
    /// Tab
    Tab,
    /// Backspace
    Backspace,
    /// Delete
    Delete,
    /// Left arrow
    Left,
    /// Right arrow
    Right,
    /// Up arrow
    Up,
    /// Down arrow
    Down,
    /// Left or right shift
    Shift,
    /// Left or right control
    Control,
    /// Left or right alt
    Alt,
}

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Primary button
    Left,
    /// Secondary button
    Right,
    /// Wheel button
    Middle,
}

/// Application-level window event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppEvent {
    /// Framebuffer resized, in pixels
    Resized {
        /// New width
        width: u32,
        /// New height
        height: u32,
    },
    /// The user asked to close the window
    CloseRequested,
    /// Window gained (`true`) or lost focus
    Focused(bool),
    /// Key pressed or released; repeats count as pressed
    Key {
        /// Which key
        key: KeyCode,
        /// Down or up
        pressed: bool,
    },
    /// Mouse button pressed or released
    MouseButton {
        /// Which button
        button: MouseButton,
        /// Down or up
        pressed: bool,
        /// Cursor position when the event happened
        position: (f32, f32),
    },
    /// Cursor moved to a new position in window coordinates
    CursorMoved {
        /// X coordinate
        x: f32,
        /// Y coordinate
        y: f32,
    },
    /// Scroll wheel or touchpad scroll
    Scroll {
        /// Horizontal offset
        x: f32,
        /// Vertical offset
        y: f32,
    },
    /// Unicode character typed
    Char(char),
}

impl AppEvent {
    /// Whether this is a press of `key`
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        matches!(self, Self::Key { key: k, pressed: true } if *k == key)
    }
}

/// Translate a GLFW key into a [`KeyCode`]
pub fn key_from_glfw(key: glfw::Key) -> Option<KeyCode> {
    use glfw::Key;
    Some(match key {
        Key::W => KeyCode::W,
        Key::A => KeyCode::A,
        Key::S => KeyCode::S,
        Key::D => KeyCode::D,
        Key::Q => KeyCode::Q,
        Key::E => KeyCode::E,
        Key::Space => KeyCode::Space,
        Key::Escape => KeyCode::Escape,
        Key::Enter | Key::KpEnter => KeyCode::Enter,
        Key::Tab => KeyCode::Tab,
        Key::Backspace => KeyCode::Backspace,
        Key::Delete => KeyCode::Delete,
        Key::Left => KeyCode::Left,
        Key::Right => KeyCode::Right,
        Key::Up => KeyCode::Up,
        Key::Down => KeyCode::Down,
        Key::LeftShift | Key::RightShift => KeyCode::Shift,
        Key::LeftControl | Key::RightControl => KeyCode::Control,
        Key::LeftAlt | Key::RightAlt => KeyCode::Alt,
        _ => return None,
    })
}

/// Translate a GLFW mouse button; extra buttons are ignored
pub fn mouse_button_from_glfw(button: glfw::MouseButton) -> Option<MouseButton> {
    match button {
        glfw::MouseButton::Button1 => Some(MouseButton::Left),
        glfw::MouseButton::Button2 => Some(MouseButton::Right),
        glfw::MouseButton::Button3 => Some(MouseButton::Middle),
        _ => None,
    }
}

/// Translate a GLFW window event
///
/// `cursor` is the last known cursor position, attached to mouse button
/// events since GLFW does not carry it.
pub fn from_glfw(event: &glfw::WindowEvent, cursor: (f64, f64)) -> Option<AppEvent> {
    use glfw::{Action, WindowEvent};

    match *event {
        WindowEvent::FramebufferSize(width, height) => Some(AppEvent::Resized {
            width: width.max(0) as u32,
            height: height.max(0) as u32,
        }),
        WindowEvent::Close => Some(AppEvent::CloseRequested),
        WindowEvent::Focus(focused) => Some(AppEvent::Focused(focused)),
        WindowEvent::Key(key, _, action, _) => key_from_glfw(key).map(|key| AppEvent::Key {
            key,
            pressed: action != Action::Release,
        }),
        WindowEvent::MouseButton(button, action, _) => {
            mouse_button_from_glfw(button).map(|button| AppEvent::MouseButton {
                button,
                pressed: action != Action::Release,
                position: (cursor.0 as f32, cursor.1 as f32),
            })
        }
        WindowEvent::CursorPos(x, y) => Some(AppEvent::CursorMoved {
            x: x as f32,
            y: y as f32,
        }),
        WindowEvent::Scroll(x, y) => Some(AppEvent::Scroll {
            x: x as f32,
            y: y as f32,
        }),
        WindowEvent::Char(c) => Some(AppEvent::Char(c)),
        _ => None,
    }
}

/// Translate a batch of GLFW events in arrival order
///
/// `cursor` starts at the last known position and follows every `CursorPos`
/// in the batch, so each mouse button event carries the position it happened
/// at.
pub fn translate_batch(
    events: impl IntoIterator<Item = glfw::WindowEvent>,
    cursor: &mut (f64, f64),
) -> Vec<AppEvent> {
    events
        .into_iter()
        .filter_map(|event| {
            if let glfw::WindowEvent::CursorPos(x, y) = event {
                *cursor = (x, y);
            }
            from_glfw(&event, *cursor)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glfw::{Action, Key, Modifiers, WindowEvent};

    #[test]
    fn test_framebuffer_size_maps_to_resize() {
        let event = from_glfw(&WindowEvent::FramebufferSize(800, 600), (0.0, 0.0));
        assert_eq!(event, Some(AppEvent::Resized { width: 800, height: 600 }));
    }

    #[test]
    fn test_minimised_framebuffer_is_zero() {
        let event = from_glfw(&WindowEvent::FramebufferSize(0, 0), (0.0, 0.0));
        assert_eq!(event, Some(AppEvent::Resized { width: 0, height: 0 }));
    }

    #[test]
    fn test_key_actions() {
        let press = WindowEvent::Key(Key::W, 0, Action::Press, Modifiers::empty());
        let repeat = WindowEvent::Key(Key::W, 0, Action::Repeat, Modifiers::empty());
        let release = WindowEvent::Key(Key::W, 0, Action::Release, Modifiers::empty());

        assert!(from_glfw(&press, (0.0, 0.0)).unwrap().is_key_pressed(KeyCode::W));
        assert!(from_glfw(&repeat, (0.0, 0.0)).unwrap().is_key_pressed(KeyCode::W));
        assert_eq!(
            from_glfw(&release, (0.0, 0.0)),
            Some(AppEvent::Key { key: KeyCode::W, pressed: false })
        );
    }

    #[test]
    fn test_unknown_key_is_dropped() {
        let event = WindowEvent::Key(Key::F12, 0, Action::Press, Modifiers::empty());
        assert_eq!(from_glfw(&event, (0.0, 0.0)), None);
    }

    #[test]
    fn test_mouse_button_carries_cursor() {
        let event = WindowEvent::MouseButton(glfw::MouseButton::Button3, Action::Press, Modifiers::empty());
        assert_eq!(
            from_glfw(&event, (12.0, 34.0)),
            Some(AppEvent::MouseButton {
                button: MouseButton::Middle,
                pressed: true,
                position: (12.0, 34.0),
            })
        );
    }

    #[test]
    fn test_batch_tracks_cursor_between_clicks() {
        let press = WindowEvent::MouseButton(glfw::MouseButton::Button3, Action::Press, Modifiers::empty());
        let release = WindowEvent::MouseButton(glfw::MouseButton::Button3, Action::Release, Modifiers::empty());
        let mut cursor = (1.0, 2.0);

        let events = translate_batch([press, WindowEvent::CursorPos(40.0, 50.0), release], &mut cursor);

        assert_eq!(
            events,
            vec![
                AppEvent::MouseButton {
                    button: MouseButton::Middle,
                    pressed: true,
                    position: (1.0, 2.0),
                },
                AppEvent::CursorMoved { x: 40.0, y: 50.0 },
                AppEvent::MouseButton {
                    button: MouseButton::Middle,
                    pressed: false,
                    position: (40.0, 50.0),
                },
            ]
        );
        assert_eq!(cursor, (40.0, 50.0));
    }

    #[test]
    fn test_batch_keeps_cursor_across_calls() {
        let mut cursor = (0.0, 0.0);
        translate_batch([WindowEvent::CursorPos(7.0, 8.0)], &mut cursor);

        let press = WindowEvent::MouseButton(glfw::MouseButton::Button1, Action::Press, Modifiers::empty());
        let events = translate_batch([press], &mut cursor);
        assert_eq!(
            events,
            vec![AppEvent::MouseButton {
                button: MouseButton::Left,
                pressed: true,
                position: (7.0, 8.0),
            }]
        );
    }

    #[test]
    fn test_extra_mouse_buttons_dropped() {
        let event = WindowEvent::MouseButton(glfw::MouseButton::Button5, Action::Press, Modifiers::empty());
        assert_eq!(from_glfw(&event, (0.0, 0.0)), None);
    }

    #[test]
    fn test_close_and_scroll() {
        assert_eq!(from_glfw(&WindowEvent::Close, (0.0, 0.0)), Some(AppEvent::CloseRequested));
        assert_eq!(
            from_glfw(&WindowEvent::Scroll(0.0, -1.0), (0.0, 0.0)),
            Some(AppEvent::Scroll { x: 0.0, y: -1.0 })
        );
    }
}
