//! Keyboard Module
//!
//! Key events routed to the focused window, modifier tracking, and the
//! characters produced by printable keys (US layout).

use std::collections::HashSet;
use tracing::trace;

use crate::events::{KeyEventType, Modifiers, Notification};
use crate::input::codes::*;
use crate::wm::WmCore;

/// evdev key event values
const KEY_VALUE_RELEASE: i32 = 0;
const KEY_VALUE_PRESS: i32 = 1;
const KEY_VALUE_REPEAT: i32 = 2;

/// Keyboard modifier state
#[derive(Debug, Clone, Default)]
pub struct KeyboardState {
    /// Current keyboard modifiers
    pub modifiers: Modifiers,

    /// Modifier keys held down; left and right keys are tracked apart
    held: HashSet<u16>,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update modifier state for `code`, returning whether it is a modifier key.
    fn track(&mut self, code: u16, pressed: bool) -> bool {
        if modifier_for(code).is_none() {
            return false;
        }
        if pressed {
            self.held.insert(code);
        } else {
            self.held.remove(&code);
        }
        self.modifiers = self
            .held
            .iter()
            .filter_map(|c| modifier_for(*c))
            .fold(Modifiers::empty(), |acc, m| acc | m);
        true
    }
}

fn modifier_for(code: u16) -> Option<Modifiers> {
    match code {
        KEY_LEFTSHIFT | KEY_RIGHTSHIFT => Some(Modifiers::SHIFT),
        KEY_LEFTCTRL | KEY_RIGHTCTRL => Some(Modifiers::CONTROL),
        KEY_LEFTALT | KEY_RIGHTALT => Some(Modifiers::ALT),
        KEY_LEFTMETA | KEY_RIGHTMETA => Some(Modifiers::META),
        _ => None,
    }
}

/// Character produced by `code` on a US keyboard.
pub fn key_char(code: u16, shift: bool) -> Option<char> {
    if let Some(i) = LETTER_KEYS.iter().position(|k| *k == code) {
        let c = (b'a' + i as u8) as char;
        return Some(if shift { c.to_ascii_uppercase() } else { c });
    }
    if let Some(i) = DIGIT_KEYS.iter().position(|k| *k == code) {
        let plain = b"1234567890"[i] as char;
        let shifted = b"!@#$%^&*()"[i] as char;
        return Some(if shift { shifted } else { plain });
    }

    let (plain, shifted) = match code {
        KEY_SPACE => (' ', ' '),
        KEY_MINUS => ('-', '_'),
        KEY_EQUAL => ('=', '+'),
        KEY_LEFTBRACE => ('[', '{'),
        KEY_RIGHTBRACE => (']', '}'),
        KEY_SEMICOLON => (';', ':'),
        KEY_APOSTROPHE => ('\'', '"'),
        KEY_GRAVE => ('`', '~'),
        KEY_BACKSLASH => ('\\', '|'),
        KEY_COMMA => (',', '<'),
        KEY_DOT => ('.', '>'),
        KEY_SLASH => ('/', '?'),
        _ => return None,
    };
    Some(if shift { shifted } else { plain })
}

impl WmCore {
    pub fn key_modifiers(&self) -> Modifiers {
        self.keyboard.modifiers
    }

    /// Handle an evdev key event (`value` 0 release, 1 press, 2 autorepeat).
    pub fn notify_key(&mut self, code: u16, value: i32) {
        let (kind, is_repeat) = match value {
            KEY_VALUE_PRESS => (KeyEventType::Press, false),
            KEY_VALUE_REPEAT => (KeyEventType::Press, true),
            KEY_VALUE_RELEASE => (KeyEventType::Release, false),
            _ => {
                trace!("Ignoring key {} value {}", code, value);
                return;
            }
        };

        self.keyboard.track(code, kind == KeyEventType::Press);

        let Some(window) = self.focus.focused_window else {
            trace!("Key {} with no focused window", code);
            return;
        };
        let view = self.registry.get(window).and_then(|w| w.view);

        let chars = match kind {
            KeyEventType::Press => key_char(code, self.keyboard.modifiers.contains(Modifiers::SHIFT))
                .map(String::from)
                .unwrap_or_default(),
            KeyEventType::Release => String::new(),
        };

        self.emit(Notification::Key {
            window,
            view,
            kind,
            key_code: code,
            modifiers: self.keyboard.modifiers | self.pointer.buttons,
            is_repeat,
            chars,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Bounds;
    use crate::wm::testing::*;

    fn keys(events: Vec<Notification>) -> Vec<(KeyEventType, u16, Modifiers, bool, String)> {
        events
            .into_iter()
            .filter_map(|n| match n {
                Notification::Key { kind, key_code, modifiers, is_repeat, chars, .. } => {
                    Some((kind, key_code, modifiers, is_repeat, chars))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn us_layout_characters() {
        assert_eq!(key_char(KEY_A, false), Some('a'));
        assert_eq!(key_char(KEY_Z, true), Some('Z'));
        assert_eq!(key_char(KEY_2, true), Some('@'));
        assert_eq!(key_char(KEY_0, false), Some('0'));
        assert_eq!(key_char(KEY_SLASH, true), Some('?'));
        assert_eq!(key_char(KEY_UP, false), None);
    }

    #[test]
    fn keys_go_to_focused_window_with_modifiers() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 10, 10));
        assert_eq!(core.focused_window(), Some(a));

        core.notify_key(KEY_LEFTSHIFT, 1);
        core.notify_key(KEY_H, 1);
        core.notify_key(KEY_H, 2);
        core.notify_key(KEY_H, 0);
        core.notify_key(KEY_LEFTSHIFT, 0);
        core.notify_key(KEY_H, 1);

        let events = keys(core.drain_notifications());
        assert_eq!(
            events,
            vec![
                (KeyEventType::Press, KEY_LEFTSHIFT, Modifiers::SHIFT, false, String::new()),
                (KeyEventType::Press, KEY_H, Modifiers::SHIFT, false, "H".into()),
                (KeyEventType::Press, KEY_H, Modifiers::SHIFT, true, "H".into()),
                (KeyEventType::Release, KEY_H, Modifiers::SHIFT, false, String::new()),
                (KeyEventType::Release, KEY_LEFTSHIFT, Modifiers::empty(), false, String::new()),
                (KeyEventType::Press, KEY_H, Modifiers::empty(), false, "h".into()),
            ]
        );
    }

    #[test]
    fn left_and_right_modifiers_tracked_apart() {
        let mut core = core();
        core.notify_key(KEY_LEFTCTRL, 1);
        core.notify_key(KEY_RIGHTCTRL, 1);
        core.notify_key(KEY_LEFTCTRL, 0);
        assert_eq!(core.key_modifiers(), Modifiers::CONTROL);
        core.notify_key(KEY_RIGHTCTRL, 0);
        assert!(core.key_modifiers().is_empty());
    }

    #[test]
    fn keys_without_focus_are_dropped() {
        let mut core = core();
        core.notify_key(KEY_A, 1);
        assert!(core.drain_notifications().is_empty());
    }

    #[test]
    fn unknown_values_are_ignored() {
        let mut core = core();
        shown(&mut core, Bounds::new(0, 0, 10, 10));
        core.notify_key(KEY_LEFTALT, 7);
        assert!(core.drain_notifications().is_empty());
        assert!(core.key_modifiers().is_empty());
    }
}
