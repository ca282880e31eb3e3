//! Frame assembly
//!
//! Raw events are queued until `SYN_REPORT` closes the frame. A closed frame
//! is turned into pointer actions: mouse motion, buttons and scrolling, or
//! the pending touch contacts of a single-touch or protocol-A device.

use tracing::{error, trace, warn};

use crate::error::{LensError, Result};
use crate::events::MouseButton;
use crate::input::codes::*;
use crate::input::device::{AbsInfo, Capabilities, TouchProtocol};
use crate::input::event::RawInputEvent;
use crate::input::touch::MAX_TOUCH_POINTS;

/// Screen-space effect of one frame
#[derive(Debug, Clone, PartialEq)]
pub enum PointerAction {
    Motion { x: i32, y: i32 },
    Button { pressed: bool, button: MouseButton, x: i32, y: i32 },
    Scroll { x: i32, y: i32, delta_x: f64, delta_y: f64 },
    /// Contacts currently down, in screen coordinates
    Touch(Vec<(i32, i32)>),
}

/// What a frame is interpreted against
pub struct FrameContext<'a> {
    pub protocol: TouchProtocol,
    pub caps: &'a Capabilities,
    pub screen_width: i32,
    pub screen_height: i32,
    /// Current pointer position, the base for relative motion
    pub pointer: (i32, i32),
}

/// Scale an absolute axis value into `0..=extent`.
pub fn scale_abs(value: i32, info: &AbsInfo, extent: i32) -> i32 {
    let range = i64::from(info.maximum) - i64::from(info.minimum);
    if range <= 0 {
        return 0;
    }
    let value = value.clamp(info.minimum, info.maximum);
    let offset = (i64::from(value) - i64::from(info.minimum)) as f64;
    (offset / range as f64 * f64::from(extent)).round() as i32
}

fn map_button(code: u16) -> Option<MouseButton> {
    match code {
        BTN_LEFT | BTN_TOUCH => Some(MouseButton::Left),
        BTN_RIGHT => Some(MouseButton::Right),
        BTN_MIDDLE | BTN_SIDE | BTN_EXTRA => Some(MouseButton::Other),
        _ => None,
    }
}

/// Per-device frame state
#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: Vec<RawInputEvent>,
    /// Single-touch contact state between frames
    touch_down: bool,
    /// Last absolute position, in screen coordinates
    abs_x: i32,
    abs_y: i32,
    /// Protocol-A axis values, carried between contacts and frames
    mt_x: i32,
    mt_y: i32,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Queue an event. Returns true when the event completes a frame.
    pub fn push(&mut self, event: RawInputEvent) -> bool {
        match (event.kind, event.code) {
            (EV_SYN, SYN_REPORT) => true,
            (EV_SYN, SYN_DROPPED) => {
                warn!("Kernel dropped input events, discarding {} queued", self.pending.len());
                self.pending.clear();
                false
            }
            (EV_SYN, SYN_MT_REPORT) | (EV_KEY | EV_REL | EV_ABS, _) => {
                self.pending.push(event);
                false
            }
            _ => {
                trace!("Skipping event type {} code {}", event.kind, event.code);
                false
            }
        }
    }

    /// Interpret and clear the queued frame.
    pub fn take_frame(&mut self, ctx: &FrameContext<'_>) -> Result<Vec<PointerAction>> {
        let events = std::mem::take(&mut self.pending);
        match ctx.protocol {
            TouchProtocol::None => Ok(self.mouse_frame(&events, ctx)),
            TouchProtocol::St => Ok(self.single_touch_frame(&events, ctx)),
            TouchProtocol::MtA => self.protocol_a_frame(&events, ctx),
        }
    }

    fn mouse_frame(&mut self, events: &[RawInputEvent], ctx: &FrameContext<'_>) -> Vec<PointerAction> {
        let (mut x, mut y) = ctx.pointer;
        let max_x = (ctx.screen_width - 1).max(0);
        let max_y = (ctx.screen_height - 1).max(0);
        let mut moved = false;
        let (mut wheel, mut hwheel) = (0, 0);
        let mut buttons = Vec::new();

        for event in events {
            match event.kind {
                EV_REL => match event.code {
                    REL_X => {
                        x = (x + event.value).clamp(0, max_x);
                        moved = true;
                    }
                    REL_Y => {
                        y = (y + event.value).clamp(0, max_y);
                        moved = true;
                    }
                    REL_WHEEL => wheel += event.value,
                    REL_HWHEEL => hwheel += event.value,
                    _ => trace!("Unhandled relative axis {}", event.code),
                },
                EV_ABS => match event.code {
                    ABS_X => {
                        x = scale_abs(event.value, &ctx.caps.abs_info(ABS_X), ctx.screen_width);
                        moved = true;
                    }
                    ABS_Y => {
                        y = scale_abs(event.value, &ctx.caps.abs_info(ABS_Y), ctx.screen_height);
                        moved = true;
                    }
                    _ => trace!("Unhandled absolute axis {}", event.code),
                },
                EV_KEY => {
                    if event.value == 2 {
                        continue;
                    }
                    match map_button(event.code) {
                        Some(button) => buttons.push((event.value != 0, button)),
                        None => warn!("Unknown mouse button {:#x}", event.code),
                    }
                }
                _ => {}
            }
        }

        moved &= (x, y) != ctx.pointer;
        let mut actions: Vec<PointerAction> = buttons
            .into_iter()
            .map(|(pressed, button)| PointerAction::Button { pressed, button, x, y })
            .collect();
        if moved {
            actions.push(PointerAction::Motion { x, y });
        }
        if wheel != 0 || hwheel != 0 {
            actions.push(PointerAction::Scroll {
                x,
                y,
                delta_x: f64::from(hwheel),
                delta_y: f64::from(wheel),
            });
        }
        actions
    }

    fn single_touch_frame(&mut self, events: &[RawInputEvent], ctx: &FrameContext<'_>) -> Vec<PointerAction> {
        let mut touch_button = None;
        let (mut saw_x, mut saw_y) = (false, false);

        for event in events {
            match (event.kind, event.code) {
                (EV_KEY, BTN_TOUCH) => touch_button = Some(event.value),
                (EV_ABS, ABS_X) => {
                    self.abs_x = scale_abs(event.value, &ctx.caps.abs_info(ABS_X), ctx.screen_width);
                    saw_x = true;
                }
                (EV_ABS, ABS_Y) => {
                    self.abs_y = scale_abs(event.value, &ctx.caps.abs_info(ABS_Y), ctx.screen_height);
                    saw_y = true;
                }
                _ => {}
            }
        }

        self.touch_down = match touch_button {
            Some(0) => false,
            Some(_) => true,
            None => self.touch_down || (saw_x && saw_y),
        };

        if self.touch_down {
            vec![PointerAction::Touch(vec![(self.abs_x, self.abs_y)])]
        } else {
            vec![PointerAction::Touch(Vec::new())]
        }
    }

    fn protocol_a_frame(&mut self, events: &[RawInputEvent], ctx: &FrameContext<'_>) -> Result<Vec<PointerAction>> {
        let mut contacts = Vec::new();
        let (mut x, mut y) = (self.mt_x, self.mt_y);
        let mut x_reports = 0;

        for event in events {
            match (event.kind, event.code) {
                (EV_ABS, ABS_MT_POSITION_X) => {
                    if contacts.len() < MAX_TOUCH_POINTS {
                        x_reports += 1;
                    }
                    x = scale_abs(event.value, &ctx.caps.abs_info(ABS_MT_POSITION_X), ctx.screen_width);
                }
                (EV_ABS, ABS_MT_POSITION_Y) => {
                    y = scale_abs(event.value, &ctx.caps.abs_info(ABS_MT_POSITION_Y), ctx.screen_height);
                }
                (EV_SYN, SYN_MT_REPORT) => {
                    if contacts.len() < MAX_TOUCH_POINTS {
                        contacts.push((x, y));
                    }
                }
                _ => {}
            }
        }

        if x_reports > contacts.len() {
            error!(
                "Malformed multi-touch frame: {} positions for {} contacts, dropping",
                x_reports,
                contacts.len()
            );
            return Err(LensError::MalformedFrame(format!(
                "{} x positions for {} contacts",
                x_reports,
                contacts.len()
            )));
        }
        // Contacts closed without a position are lift-off markers
        contacts.truncate(x_reports);

        self.mt_x = x;
        self.mt_y = y;
        Ok(vec![PointerAction::Touch(contacts)])
    }
}
