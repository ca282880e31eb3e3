//! Focus Module
//!
//! Keyboard focus and focus grabs. At most one window is focused; a grab
//! can only be held by the focused window and is dropped whenever focus
//! moves or a click lands outside the grabbing window's hierarchy.

use tracing::{debug, error, warn};

use crate::error::Result;
use crate::events::WindowEventType;
use crate::wm::window::{WindowId, WindowState};
use crate::wm::WmCore;

/// Focus manager
#[derive(Debug, Default)]
pub struct FocusManager {
    /// Currently focused window
    pub focused_window: Option<WindowId>,

    /// Window holding the focus grab. Always equal to `focused_window` when set.
    pub grabbed_window: Option<WindowId>,
}

impl FocusManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WmCore {
    pub fn focused_window(&self) -> Option<WindowId> {
        self.focus.focused_window
    }

    pub fn grabbed_window(&self) -> Option<WindowId> {
        self.focus.grabbed_window
    }

    fn can_take_focus(&self, id: WindowId) -> bool {
        self.registry
            .get(id)
            .is_some_and(|w| w.focusable && w.enabled && w.visible)
    }

    /// Ask for focus on behalf of the consumer.
    pub fn request_focus(&mut self, id: WindowId) -> Result<bool> {
        let window = self.registry.window(id)?;

        if self.focus.focused_window == Some(id) {
            return Ok(true);
        }
        if let Some(grabbed) = self.focus.grabbed_window {
            debug!("Focus request for {} refused, {} holds the grab", id, grabbed);
            return Ok(false);
        }
        if !window.focusable || !window.enabled || !window.visible {
            warn!(
                "Window {} cannot take focus (focusable={} enabled={} visible={})",
                id, window.focusable, window.enabled, window.visible
            );
            return Ok(false);
        }

        self.set_focused_window(Some(id));
        Ok(true)
    }

    /// Move focus, releasing any grab and notifying both windows.
    pub(crate) fn set_focused_window(&mut self, id: Option<WindowId>) {
        let current = self.focus.focused_window;
        if current == id {
            return;
        }

        if let Some(old) = current {
            self.release_grab(old);
            self.emit_window_event(old, WindowEventType::FocusLost);
        }

        self.focus.focused_window = id;
        debug!("Focus {:?} -> {:?}", current, id);

        if let Some(new) = id {
            self.emit_window_event(new, WindowEventType::FocusGained);
        }
    }

    /// `id` is going away (hidden, disabled, minimized, closed).
    /// Hands focus to the front-most eligible top-level and returns the new
    /// focus owner.
    pub(crate) fn unset_focused_window(&mut self, id: WindowId) -> Option<WindowId> {
        if self.focus.focused_window != Some(id) {
            return self.focus.focused_window;
        }

        self.release_grab(id);

        let next = self
            .registry
            .front_to_back()
            .find(|w| {
                w.id != id
                    && w.visible
                    && w.state != WindowState::Minimized
                    && w.owner.is_none()
                    && w.focusable
                    && w.enabled
            })
            .map(|w| w.id);

        debug!("Window {} gave up focus, next is {:?}", id, next);
        self.set_focused_window(next);
        next
    }

    pub fn grab_focus(&mut self, id: WindowId) -> Result<bool> {
        self.registry.window(id)?;

        if self.focus.grabbed_window == Some(id) {
            return Ok(true);
        }
        if self.focus.grabbed_window.is_none() && self.focus.focused_window == Some(id) {
            self.focus.grabbed_window = Some(id);
            debug!("Window {} grabbed focus", id);
            return Ok(true);
        }

        error!(
            "Window {} cannot grab focus (focused {:?}, grabbed {:?})",
            id, self.focus.focused_window, self.focus.grabbed_window
        );
        Ok(false)
    }

    pub fn ungrab_focus(&mut self, id: WindowId) -> Result<()> {
        self.registry.window(id)?;
        self.release_grab(id);
        Ok(())
    }

    pub(crate) fn release_grab(&mut self, id: WindowId) {
        if self.focus.grabbed_window == Some(id) {
            self.focus.grabbed_window = None;
            debug!("Window {} lost its grab", id);
            self.emit_window_event(id, WindowEventType::FocusUngrab);
        }
    }

    /// Focus side effects of a button press, run before the press is
    /// delivered. `hit` is the window under the pointer.
    pub(crate) fn handle_click(&mut self, hit: Option<WindowId>, allow_focus: bool) {
        let hit_root = hit.and_then(|h| self.registry.get(h)).map(|w| w.root);

        if let Some(grabbed) = self.focus.grabbed_window {
            let grabbed_root = self.registry.get(grabbed).map(|w| w.root);
            if hit_root.is_none() || hit_root != grabbed_root {
                self.release_grab(grabbed);
            }
        }

        if !allow_focus {
            return;
        }
        let Some(hit) = hit else {
            return;
        };

        let focused_root = self
            .focus
            .focused_window
            .and_then(|f| self.registry.get(f))
            .map(|w| w.root);

        if (focused_root.is_none() || focused_root != hit_root) && self.can_take_focus(hit) {
            self.set_focused_window(Some(hit));
        }
    }
}
