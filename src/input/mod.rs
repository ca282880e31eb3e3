//! Input Module
//!
//! Raw evdev devices turned into window-manager input: discovery and test
//! replay as device sources, per-device frame assembly and touch tracking,
//! and the poll loop that drives them.

pub mod codes;
pub mod device;
pub mod discovery;
pub mod event;
pub mod event_loop;
pub mod frame;
pub mod test_input;
pub mod touch;

pub use device::{DeviceFlags, DeviceRegistry, InputDevice, TouchProtocol};
pub use event::RawInputEvent;
pub use event_loop::{DeviceRegistrar, EventLoop, InputHandle, InputSettings};
pub use touch::{TouchPoint, TouchReport, TouchSettings, TouchTracker};
