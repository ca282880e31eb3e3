//! Error types shared by the window manager and the input subsystem.

use std::io;
use thiserror::Error;

/// Result alias used by the core.
pub type Result<T> = std::result::Result<T, LensError>;

/// Kind of handle carried by [`LensError::InvalidHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Window,
    View,
    Device,
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleKind::Window => write!(f, "window"),
            HandleKind::View => write!(f, "view"),
            HandleKind::Device => write!(f, "device"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LensError {
    /// A window/view handle that is not (or no longer) registered.
    #[error("invalid {kind} handle {id}")]
    InvalidHandle { kind: HandleKind, id: u32 },

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Touch frame whose point counts do not add up. The frame is dropped.
    #[error("malformed input frame: {0}")]
    MalformedFrame(String),

    #[error("illegal state transition: {0}")]
    IllegalTransition(String),

    #[error("i/o error on device {device}: {source}")]
    DeviceIo {
        device: String,
        #[source]
        source: io::Error,
    },

    /// The notification consumer rejected an event.
    #[error("notification sink failure: {0}")]
    Sink(String),
}

impl LensError {
    pub fn window(id: u32) -> Self {
        LensError::InvalidHandle {
            kind: HandleKind::Window,
            id,
        }
    }

    pub fn view(id: u32) -> Self {
        LensError::InvalidHandle {
            kind: HandleKind::View,
            id,
        }
    }

    pub fn device_io(device: impl Into<String>, source: io::Error) -> Self {
        LensError::DeviceIo {
            device: device.into(),
            source,
        }
    }
}
