//! Pointer Module
//!
//! Mouse and touch synthesis: hit-testing, ENTER/EXIT tracking, native
//! drags anchored to the window they started on, scroll, and mouse events
//! synthesized from the primary touch point.

use tracing::{debug, trace, warn};

use crate::events::{
    Modifiers, MouseButton, MouseEventType, Notification, TouchPointEvent, TouchState,
    WindowEventType,
};
use crate::input::touch::TouchReport;
use crate::wm::window::WindowId;
use crate::wm::WmCore;

/// Pointer, drag and touch-window state
#[derive(Debug, Clone)]
pub struct PointerState {
    /// Last known absolute position
    pub x: i32,
    pub y: i32,

    /// Button that started the current press sequence
    pub pressed_button: MouseButton,

    /// Mask of all buttons currently held
    pub buttons: Modifiers,

    /// Native drag in progress (button held while moving)
    pub dragging: bool,

    /// Window under the pointer when the drag started
    pub drag_window: Option<WindowId>,

    /// Enabled window currently under the pointer
    pub mouse_window: Option<WindowId>,

    /// Window receiving the current touch sequence
    pub touch_window: Option<WindowId>,

    /// External drag-and-drop session; suppresses native drags
    pub dnd_active: bool,

    /// Set while mouse events are being derived from touch
    pub synthesizing: bool,
}

/// Result of hit-testing the pointer position
#[derive(Debug, Clone, Copy, Default)]
struct Hit {
    /// Enabled window with the pointer in its coordinates
    window: Option<(WindowId, i32, i32)>,
    /// Disabled window that would otherwise have been hit
    disabled: Option<WindowId>,
}

impl Hit {
    fn id(&self) -> Option<WindowId> {
        self.window.map(|(id, _, _)| id)
    }
}

impl PointerState {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            pressed_button: MouseButton::None,
            buttons: Modifiers::empty(),
            dragging: false,
            drag_window: None,
            mouse_window: None,
            touch_window: None,
            dnd_active: false,
            synthesizing: false,
        }
    }

    fn reset_drag(&mut self) {
        self.dragging = false;
        self.drag_window = None;
    }

    /// Drop every reference to a window that is going away.
    pub(crate) fn forget_window(&mut self, id: WindowId) {
        if self.mouse_window == Some(id) {
            self.mouse_window = None;
        }
        if self.drag_window == Some(id) {
            self.drag_window = None;
        }
        if self.touch_window == Some(id) {
            self.touch_window = None;
        }
    }
}

impl Default for PointerState {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl WmCore {
    pub fn pointer(&self) -> &PointerState {
        &self.pointer
    }

    pub fn pointer_position(&self) -> (i32, i32) {
        (self.pointer.x, self.pointer.y)
    }

    pub fn set_pointer_position(&mut self, x: i32, y: i32) {
        let (x, y) = self.screen().clamp_point(x, y);
        self.pointer.x = x;
        self.pointer.y = y;
        self.platform.cursor_set_position(x, y);
    }

    pub fn dnd_started(&mut self) {
        self.pointer.dnd_active = true;
        debug!("DnD active, cancelling native drag");
        self.pointer.reset_drag();
    }

    pub fn dnd_ended(&mut self) {
        self.pointer.dnd_active = false;
        debug!("DnD ended");
    }

    /// Deliver a mouse event to a window, relative to its current origin.
    fn emit_mouse(&mut self, id: WindowId, kind: MouseEventType, button: MouseButton) {
        let Some(window) = self.registry.get(id) else {
            return;
        };
        if !window.enabled {
            trace!("Suppressing {:?} to disabled window {}", kind, id);
            return;
        }
        let (x, y) = window.bounds.relative(self.pointer.x, self.pointer.y);
        let view = window.view;

        self.emit(Notification::Mouse {
            window: id,
            view,
            kind,
            x,
            y,
            abs_x: self.pointer.x,
            abs_y: self.pointer.y,
            button,
            modifiers: self.keyboard.modifiers | self.pointer.buttons,
            is_popup_trigger: kind == MouseEventType::Down && button == MouseButton::Right,
            is_synthesized: self.pointer.synthesizing,
        });
    }

    /// Hit-test the pointer position and emit ENTER/EXIT as needed.
    fn update_enter_exit(&mut self) -> Hit {
        let hit = match self.registry.window_under(self.pointer.x, self.pointer.y) {
            Some((id, rel_x, rel_y)) if self.registry.get(id).is_some_and(|w| w.enabled) => Hit {
                window: Some((id, rel_x, rel_y)),
                disabled: None,
            },
            Some((id, _, _)) => Hit {
                window: None,
                disabled: Some(id),
            },
            None => Hit::default(),
        };
        let found = hit.id();
        let last = self.pointer.mouse_window;

        trace!(
            "drag_window={:?} found={:?} last={:?}",
            self.pointer.drag_window, found, last
        );

        if self.pointer.dragging {
            if let Some(drag) = self.pointer.drag_window {
                if found != Some(drag) && last == Some(drag) {
                    self.emit_mouse(drag, MouseEventType::Exit, MouseButton::None);
                }
                if found == Some(drag) && last != Some(drag) {
                    self.emit_mouse(drag, MouseEventType::Enter, MouseButton::None);
                }
            }
        } else if found != last {
            if let Some(last) = last {
                self.emit_mouse(last, MouseEventType::Exit, MouseButton::None);
            }
            if let Some(found) = found {
                self.emit_mouse(found, MouseEventType::Enter, MouseButton::None);
            }
        }
        hit
    }

    pub fn notify_motion(&mut self, x: i32, y: i32) {
        trace!("Motion {},{}", x, y);
        self.pointer.x = x;
        self.pointer.y = y;
        self.platform.cursor_set_position(x, y);

        if self.pointer.pressed_button != MouseButton::None
            && !self.pointer.dragging
            && !self.pointer.dnd_active
        {
            self.pointer.dragging = true;
            self.pointer.drag_window = self.pointer.mouse_window;
            debug!("Native drag started on {:?}", self.pointer.drag_window);
        }

        let hit = self.update_enter_exit();
        self.pointer.mouse_window = hit.id();

        if self.pointer.dragging {
            if let Some(drag) = self.pointer.drag_window {
                self.emit_mouse(drag, MouseEventType::Move, MouseButton::None);
            }
        } else if let Some(id) = hit.id() {
            self.emit_mouse(id, MouseEventType::Move, MouseButton::None);
        }
    }

    pub fn notify_button(&mut self, pressed: bool, button: MouseButton, x: i32, y: i32) {
        self.pointer.x = x;
        self.pointer.y = y;

        let hit = self.update_enter_exit();
        self.pointer.mouse_window = hit.id();

        trace!(
            "Button {:?} pressed={} at {},{} on {:?}",
            button, pressed, x, y, hit.window
        );

        if pressed {
            if self.pointer.pressed_button == MouseButton::None {
                if self.pointer.dragging {
                    warn!("Press while a native drag is active, resetting drag");
                    self.pointer.reset_drag();
                }
                self.pointer.pressed_button = button;
            }
            self.pointer.buttons.insert(Modifiers::for_button(button));
        } else {
            self.pointer.buttons.remove(Modifiers::for_button(button));
        }

        let ends_sequence = !pressed && button == self.pointer.pressed_button;
        if ends_sequence {
            self.pointer.pressed_button = MouseButton::None;
        }

        if pressed {
            match hit.disabled {
                Some(disabled) => {
                    debug!("Press on disabled window {}", disabled);
                    self.emit_window_event(disabled, WindowEventType::FocusDisabled);
                    self.handle_click(Some(disabled), false);
                }
                None => self.handle_click(hit.id(), true),
            }
        }

        let kind = if pressed {
            MouseEventType::Down
        } else {
            MouseEventType::Up
        };
        if self.pointer.dragging {
            if let Some(drag) = self.pointer.drag_window {
                self.emit_mouse(drag, kind, button);
            }
        } else if let Some(id) = hit.id() {
            self.emit_mouse(id, kind, button);
        }

        if ends_sequence && self.pointer.dragging {
            debug!("Native drag ended");
            let drag = self.pointer.drag_window;
            self.pointer.reset_drag();
            // ENTER was withheld from the window the drag ended over
            if let Some(id) = hit.id().filter(|id| Some(*id) != drag) {
                self.emit_mouse(id, MouseEventType::Enter, MouseButton::None);
            }
        }
    }

    pub fn notify_scroll(&mut self, x: i32, y: i32, delta_x: f64, delta_y: f64) {
        let Some((id, rel_x, rel_y)) = self.registry.find_at_location(x, y) else {
            trace!("Scroll at {},{} outside any window", x, y);
            return;
        };
        let view = self.registry.get(id).and_then(|w| w.view);
        self.emit(Notification::Scroll {
            window: id,
            view,
            x: rel_x,
            y: rel_y,
            abs_x: x,
            abs_y: y,
            delta_x,
            delta_y,
            modifiers: self.keyboard.modifiers | self.pointer.buttons,
        });
    }

    /// Synthesize mouse events from the primary point and deliver the touch
    /// frame to the window the sequence started on.
    pub fn notify_multi_touch(&mut self, report: &TouchReport) {
        let primary = report.primary.and_then(|i| report.points.get(i).map(|p| (i, *p)));

        if self.pointer.touch_window.is_none() && !self.pointer.dragging {
            if let Some((_, point)) = primary {
                if let Some((id, _, _)) = self.registry.find_at_location(point.x, point.y) {
                    // Only a sequence that starts on the window claims it
                    if report.points.iter().all(|p| p.state == TouchState::Pressed) {
                        debug!("Touch sequence on window {}", id);
                        self.pointer.touch_window = Some(id);
                    } else {
                        trace!("Touch entered window {} mid-sequence, ignoring", id);
                    }
                }
            }
        }

        self.pointer.synthesizing = true;
        match primary {
            None => {
                let (x, y) = (self.pointer.x, self.pointer.y);
                self.notify_button(false, MouseButton::Left, x, y);
            }
            Some((_, point)) => match point.state {
                TouchState::Pressed => {
                    if (point.x, point.y) != (self.pointer.x, self.pointer.y) {
                        self.notify_motion(point.x, point.y);
                    }
                    self.notify_button(true, MouseButton::Left, point.x, point.y);
                    self.platform.cursor_set_position(point.x, point.y);
                }
                TouchState::Moved => self.notify_motion(point.x, point.y),
                TouchState::Still => {
                    self.pointer.x = point.x;
                    self.pointer.y = point.y;
                }
                TouchState::Released => {
                    warn!("Primary touch point {} reported released", point.id);
                }
            },
        }
        self.pointer.synthesizing = false;

        let Some(id) = self.pointer.touch_window else {
            return;
        };
        if let Some((origin, view)) = self.registry.get(id).map(|w| (w.bounds, w.view)) {
            let points = report
                .points
                .iter()
                .map(|p| {
                    let (x, y) = origin.relative(p.x, p.y);
                    TouchPointEvent {
                        id: p.id,
                        state: p.state,
                        x,
                        y,
                        abs_x: p.x,
                        abs_y: p.y,
                    }
                })
                .collect();
            self.emit(Notification::Touch {
                window: id,
                view,
                points,
                primary: primary.map(|(i, _)| i),
                modifiers: self.keyboard.modifiers,
            });
        }
        if primary.is_none() {
            self.pointer.touch_window = None;
        }
    }
}
