//! Events Module
//!
//! Normalized notifications produced by the window manager and the sink
//! contract through which they reach the consumer (the toolkit runtime).

use bitflags::bitflags;
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{error, trace};

use crate::error::{LensError, Result};
use crate::input::device::DeviceFlags;
use crate::wm::view::ViewId;
use crate::wm::window::WindowId;

/// Mouse notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MouseEventType {
    Down,
    Up,
    Move,
    Enter,
    Exit,
}

/// Mouse button, as reported to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MouseButton {
    None,
    Left,
    Right,
    Other,
}

/// Window-level notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WindowEventType {
    Resize,
    Move,
    Minimize,
    Maximize,
    Restore,
    Close,
    Destroy,
    FocusLost,
    FocusGained,
    FocusUngrab,
    /// Interaction was attempted on a disabled window.
    FocusDisabled,
}

/// View-level notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViewEventType {
    Add,
    Remove,
    Repaint,
    FullscreenEnter,
    FullscreenExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyEventType {
    Press,
    Release,
}

/// Lifecycle state of a touch point within one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TouchState {
    Pressed,
    Moved,
    Still,
    Released,
}

bitflags! {
    /// Keyboard modifiers and pressed mouse buttons
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct Modifiers: u32 {
        const SHIFT            = 1 << 0;
        const CONTROL          = 1 << 1;
        const ALT              = 1 << 2;
        const META             = 1 << 3;
        const BUTTON_PRIMARY   = 1 << 5;
        const BUTTON_SECONDARY = 1 << 6;
        const BUTTON_MIDDLE    = 1 << 7;
    }
}

impl Modifiers {
    /// Mask bit for a pressed mouse button, empty for `MouseButton::None`.
    pub fn for_button(button: MouseButton) -> Self {
        match button {
            MouseButton::Left => Modifiers::BUTTON_PRIMARY,
            MouseButton::Right => Modifiers::BUTTON_SECONDARY,
            MouseButton::Other => Modifiers::BUTTON_MIDDLE,
            MouseButton::None => Modifiers::empty(),
        }
    }
}

/// One point of a touch notification, window-relative with absolute copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TouchPointEvent {
    pub id: i64,
    pub state: TouchState,
    pub x: i32,
    pub y: i32,
    pub abs_x: i32,
    pub abs_y: i32,
}

/// Normalized notification delivered to the consumer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Notification {
    Key {
        window: WindowId,
        view: Option<ViewId>,
        kind: KeyEventType,
        key_code: u16,
        modifiers: Modifiers,
        is_repeat: bool,
        chars: String,
    },
    Mouse {
        window: WindowId,
        view: Option<ViewId>,
        kind: MouseEventType,
        x: i32,
        y: i32,
        abs_x: i32,
        abs_y: i32,
        button: MouseButton,
        modifiers: Modifiers,
        is_popup_trigger: bool,
        is_synthesized: bool,
    },
    Scroll {
        window: WindowId,
        view: Option<ViewId>,
        x: i32,
        y: i32,
        abs_x: i32,
        abs_y: i32,
        delta_x: f64,
        delta_y: f64,
        modifiers: Modifiers,
    },
    Touch {
        window: WindowId,
        view: Option<ViewId>,
        points: Vec<TouchPointEvent>,
        /// Index into `points` of the point mouse events are synthesized from.
        primary: Option<usize>,
        modifiers: Modifiers,
    },
    Window {
        window: WindowId,
        kind: WindowEventType,
    },
    WindowResize {
        window: WindowId,
        kind: WindowEventType,
        width: i32,
        height: i32,
    },
    WindowMove {
        window: WindowId,
        x: i32,
        y: i32,
    },
    View {
        view: ViewId,
        kind: ViewEventType,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    Device {
        flags: DeviceFlags,
        attached: bool,
    },
}

/// Consumer of normalized notifications.
///
/// Notifications are delivered after the window manager releases its state
/// lock. Calls back into the window manager from `notify` are allowed and see
/// the state after the operation that produced the notification.
pub trait EventSink: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<()>;

    /// Called when `notify` failed; processing continues afterwards.
    fn report_error(&self, err: &LensError) {
        error!("Notification delivery failed: {}", err);
    }
}

/// Publishes notifications onto a queue owned by the consumer thread.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn notify(&self, notification: Notification) -> Result<()> {
        trace!("Queueing {:?}", notification);
        self.tx
            .send(notification)
            .map_err(|_| LensError::Sink("consumer queue closed".into()))
    }
}

/// Sink that records every notification, used by tests and replay tooling.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<Notification> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for RecordingSink {
    fn notify(&self, notification: Notification) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| LensError::Sink("recording lock poisoned".into()))?
            .push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_reports_closed_queue() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        let err = sink
            .notify(Notification::Device {
                flags: DeviceFlags::POINTER,
                attached: true,
            })
            .unwrap_err();
        assert!(matches!(err, LensError::Sink(_)));
    }

    #[test]
    fn notifications_serialize_with_type_tag() {
        let json = serde_json::to_value(Notification::WindowMove {
            window: WindowId(4),
            x: 1,
            y: 2,
        })
        .unwrap();
        assert_eq!(json["type"], "WindowMove");
        assert_eq!(json["window"], 4);
    }

    #[test]
    fn button_modifier_mask() {
        assert_eq!(Modifiers::for_button(MouseButton::Left), Modifiers::BUTTON_PRIMARY);
        assert!(Modifiers::for_button(MouseButton::None).is_empty());
    }
}
