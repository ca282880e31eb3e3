//! Input devices
//!
//! Capability bitsets, classification into keyboard / pointer / touch roles,
//! the flags reported to the consumer on attach and detach, and the registry
//! of open devices.

use bitflags::bitflags;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, error, trace};

use crate::input::codes::*;
use crate::input::event::RawInputEvent;
use crate::input::frame::{FrameAssembler, FrameContext, PointerAction};
use crate::input::touch::{TouchSettings, TouchTracker, TrackOutcome};
use crate::wm::WindowManager;

bitflags! {
    /// Coarse device roles reported to the consumer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct DeviceFlags: u32 {
        const TOUCH       = 1 << 0;
        const MULTITOUCH  = 1 << 1;
        const POINTER     = 1 << 2;
        /// Arrow keys plus enter or select
        const FIVE_WAY    = 1 << 3;
        /// Letters, digits, shift and tab on top of a 5-way selector
        const PC_KEYBOARD = 1 << 4;
    }
}

/// Touch wire protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TouchProtocol {
    /// Not a touch device
    #[default]
    None,
    /// Single touch: `ABS_X`/`ABS_Y` and `BTN_TOUCH`
    St,
    /// Multi-touch protocol A: contacts separated by `SYN_MT_REPORT`
    MtA,
}

const WORD_BITS: usize = libc::c_ulong::BITS as usize;

/// Capability bitset in the kernel's `unsigned long` word layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bits {
    words: Vec<libc::c_ulong>,
}

impl Bits {
    /// Bitset able to hold bits `0..=max`
    pub fn new(max: u16) -> Self {
        Self {
            words: vec![0; usize::from(max) / WORD_BITS + 1],
        }
    }

    pub fn from_words(words: Vec<libc::c_ulong>) -> Self {
        Self { words }
    }

    pub fn words_mut(&mut self) -> &mut [libc::c_ulong] {
        &mut self.words
    }

    pub fn set(&mut self, bit: u16) {
        let bit = usize::from(bit);
        if let Some(word) = self.words.get_mut(bit / WORD_BITS) {
            *word |= 1 << (bit % WORD_BITS);
        }
    }

    pub fn test(&self, bit: u16) -> bool {
        let bit = usize::from(bit);
        self.words
            .get(bit / WORD_BITS)
            .is_some_and(|word| word & (1 << (bit % WORD_BITS)) != 0)
    }

    pub fn all(&self, bits: &[u16]) -> bool {
        bits.iter().all(|b| self.test(*b))
    }

    pub fn any(&self, bits: &[u16]) -> bool {
        bits.iter().any(|b| self.test(*b))
    }
}

/// `struct input_absinfo`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbsInfo {
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

/// `struct input_id`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InputId {
    pub bustype: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub events: Bits,
    pub keys: Bits,
    pub rel: Bits,
    pub abs: Bits,
    absinfo: HashMap<u16, AbsInfo>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            events: Bits::new(EV_MAX),
            keys: Bits::new(KEY_MAX),
            rel: Bits::new(REL_MAX),
            abs: Bits::new(ABS_MAX),
            absinfo: HashMap::new(),
        }
    }
}

impl Capabilities {
    /// Range of an absolute axis; empty for axes the device lacks
    pub fn abs_info(&self, axis: u16) -> AbsInfo {
        self.absinfo.get(&axis).copied().unwrap_or_default()
    }

    pub fn set_abs(&mut self, axis: u16, info: AbsInfo) {
        self.abs.set(axis);
        self.absinfo.insert(axis, info);
    }
}

/// Identity and capabilities of a device node
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub name: String,
    pub devnode: PathBuf,
    pub product: String,
    pub id: InputId,
    pub caps: Capabilities,
}

/// An open (or openable) input device and its per-device state
#[derive(Debug)]
pub struct InputDevice {
    pub info: DeviceInfo,
    pub is_keyboard: bool,
    pub is_pointer: bool,
    pub is_touch: bool,
    pub protocol: TouchProtocol,
    /// Created by the test input monitor
    pub is_test_device: bool,

    /// Flags reported to the consumer on attach
    notified: Option<DeviceFlags>,

    pub(crate) file: Option<File>,
    /// Bytes of an incomplete event record from the last read
    pub(crate) read_buf: Vec<u8>,
    frame: FrameAssembler,
    touch: Option<TouchTracker>,
}

impl InputDevice {
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            is_keyboard: false,
            is_pointer: false,
            is_touch: false,
            protocol: TouchProtocol::None,
            is_test_device: false,
            notified: None,
            file: None,
            read_buf: Vec::new(),
            frame: FrameAssembler::new(),
            touch: None,
        }
    }

    pub fn devnode(&self) -> &Path {
        &self.info.devnode
    }

    /// Apply a udev-style property. Returns true if it gives the device a role.
    pub fn apply_property(&mut self, key: &str, value: &str) -> bool {
        trace!("{}: {}={}", self.info.devnode.display(), key, value);
        match key {
            "ID_INPUT_KEYBOARD" => {
                debug!("{} is a keyboard", self.info.name);
                self.is_keyboard = true;
                true
            }
            "ID_INPUT_MOUSE" => {
                debug!("{} is a pointer", self.info.name);
                self.is_pointer = true;
                true
            }
            "ID_INPUT_TOUCHSCREEN" => {
                debug!("{} is a touch screen", self.info.name);
                self.is_touch = true;
                self.protocol = TouchProtocol::St;
                true
            }
            _ => false,
        }
    }

    pub fn has_role(&self) -> bool {
        self.is_keyboard || self.is_pointer || self.is_touch
    }

    /// Settle the touch protocol from capabilities and set up touch tracking.
    pub fn finish_setup(&mut self, settings: TouchSettings, use_multi_touch: bool) {
        if !self.is_touch {
            return;
        }
        if self.info.caps.abs.test(ABS_MT_POSITION_X) {
            if self.info.caps.abs.test(ABS_MT_SLOT) {
                debug!("{} speaks multi-touch protocol B, reading it as A", self.info.name);
            }
            self.protocol = TouchProtocol::MtA;
        }
        let collapse = !use_multi_touch && self.protocol != TouchProtocol::St;
        self.touch = Some(TouchTracker::new(settings, collapse));
    }

    /// Roles as reported to the consumer
    pub fn flags(&self) -> DeviceFlags {
        let mut flags = DeviceFlags::empty();
        if self.is_touch {
            flags |= DeviceFlags::TOUCH;
            if self.protocol == TouchProtocol::MtA {
                flags |= DeviceFlags::MULTITOUCH;
            }
        }
        if self.is_pointer {
            flags |= DeviceFlags::POINTER;
        }
        if self.is_keyboard {
            let keys = &self.info.caps.keys;
            if keys.all(&ARROW_KEYS) && keys.any(&[KEY_ENTER, KEY_SELECT]) {
                flags |= DeviceFlags::FIVE_WAY;
                if keys.all(&LETTER_KEYS) && keys.all(&DIGIT_KEYS) && keys.all(&[KEY_LEFTSHIFT, KEY_TAB]) {
                    flags |= DeviceFlags::PC_KEYBOARD;
                }
            }
        }
        flags
    }

    /// Flags to report as attached, unless already reported.
    pub fn mark_attached(&mut self) -> Option<DeviceFlags> {
        if self.notified.is_some() {
            return None;
        }
        let flags = self.flags();
        self.notified = Some(flags);
        Some(flags)
    }

    /// Flags to report as detached, if the device was reported as attached.
    pub fn mark_detached(&mut self) -> Option<DeviceFlags> {
        self.notified.take()
    }

    fn is_button(code: u16) -> bool {
        (BTN_MISC..KEY_OK).contains(&code)
    }

    /// Route one raw event: keys go straight to the window manager, pointer
    /// and touch events are collected into frames.
    pub fn handle_event(&mut self, event: RawInputEvent, wm: &WindowManager) {
        let framed = self.is_pointer || self.is_touch;

        if event.kind == EV_KEY && self.is_keyboard && !(framed && Self::is_button(event.code)) {
            wm.notify_key(event.code, event.value);
            return;
        }
        if !framed {
            trace!("{}: ignoring event type {}", self.info.name, event.kind);
            return;
        }
        if !self.frame.push(event) {
            return;
        }

        let (pointer, (screen_width, screen_height)) = wm.read(|core| {
            (core.pointer_position(), (core.screen().width, core.screen().height))
        });
        let ctx = FrameContext {
            protocol: self.protocol,
            caps: &self.info.caps,
            screen_width,
            screen_height,
            pointer,
        };
        match self.frame.take_frame(&ctx) {
            Ok(actions) => self.apply(actions, wm),
            Err(e) => error!("{}: {}", self.info.name, e),
        }
    }

    fn apply(&mut self, actions: Vec<PointerAction>, wm: &WindowManager) {
        for action in actions {
            match action {
                PointerAction::Motion { x, y } => wm.notify_motion(x, y),
                PointerAction::Button { pressed, button, x, y } => wm.notify_button(pressed, button, x, y),
                PointerAction::Scroll { x, y, delta_x, delta_y } => wm.notify_scroll(x, y, delta_x, delta_y),
                PointerAction::Touch(pending) => {
                    let Some(tracker) = self.touch.as_mut() else {
                        continue;
                    };
                    match tracker.track(&pending) {
                        TrackOutcome::Idle => {}
                        TrackOutcome::Unchanged(points) => {
                            trace!("{} touch points unchanged", points.len());
                        }
                        TrackOutcome::Report(report) => wm.notify_multi_touch(&report),
                    }
                }
            }
        }
    }
}

/// Open devices keyed by poll token. Token 0 is reserved for the loop waker.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<usize, InputDevice>,
    next_token: usize,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
            next_token: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Register a device under a fresh token. Returns `None` if its node is
    /// already registered.
    pub fn insert(&mut self, device: InputDevice) -> Option<usize> {
        if self.find_by_devnode(device.devnode()).is_some() {
            debug!("{} already registered", device.devnode().display());
            return None;
        }
        let token = self.next_token.max(1);
        self.next_token = token + 1;
        self.devices.insert(token, device);
        Some(token)
    }

    pub fn remove(&mut self, token: usize) -> Option<InputDevice> {
        self.devices.remove(&token)
    }

    pub fn get_mut(&mut self, token: usize) -> Option<&mut InputDevice> {
        self.devices.get_mut(&token)
    }

    pub fn find_by_devnode(&self, devnode: &Path) -> Option<usize> {
        self.devices
            .iter()
            .find(|(_, d)| d.devnode() == devnode)
            .map(|(token, _)| *token)
    }

    pub fn tokens(&self) -> Vec<usize> {
        let mut tokens: Vec<usize> = self.devices.keys().copied().collect();
        tokens.sort_unstable();
        tokens
    }

    pub fn iter(&self) -> impl Iterator<Item = (&usize, &InputDevice)> {
        self.devices.iter()
    }
}
