//! Lens
//!
//! Embedded window manager and input normalization engine. Windows, views,
//! focus and pointer state live in [`wm`]; [`input`] turns evdev devices into
//! the normalized notifications of [`events`].

pub mod config;
pub mod error;
pub mod events;
pub mod input;
pub mod platform;
pub mod shared;
pub mod wm;

pub use error::{LensError, Result};
pub use events::{EventSink, Notification};
pub use wm::{WindowManager, WmCore};
