//! Raw evdev event records
//!
//! Decodes the kernel's `struct input_event` (a `timeval` followed by type,
//! code and value) in native byte order.

use std::mem::size_of;

/// Size of one `struct input_event`
pub const RECORD_SIZE: usize = size_of::<libc::timeval>() + 8;

const TIME_FIELD: usize = size_of::<libc::time_t>();
const USEC_FIELD: usize = size_of::<libc::suseconds_t>();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawInputEvent {
    pub time_sec: i64,
    pub time_usec: i64,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl RawInputEvent {
    pub fn new(kind: u16, code: u16, value: i32) -> Self {
        Self {
            kind,
            code,
            value,
            ..Default::default()
        }
    }

    /// Decode one record. Returns `None` when `bytes` is shorter than a record.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < RECORD_SIZE {
            return None;
        }
        let (sec, rest) = bytes.split_at(TIME_FIELD);
        let (usec, rest) = rest.split_at(USEC_FIELD);
        let rest = &rest[RECORD_SIZE - TIME_FIELD - USEC_FIELD - 8..];

        Some(Self {
            time_sec: read_signed(sec),
            time_usec: read_signed(usec),
            kind: u16::from_ne_bytes([rest[0], rest[1]]),
            code: u16::from_ne_bytes([rest[2], rest[3]]),
            value: i32::from_ne_bytes([rest[4], rest[5], rest[6], rest[7]]),
        })
    }

    /// Decode every complete record in `bytes`, returning them with the
    /// number of bytes consumed.
    pub fn decode_all(bytes: &[u8]) -> (Vec<Self>, usize) {
        let events: Vec<Self> = bytes.chunks_exact(RECORD_SIZE).filter_map(Self::decode).collect();
        let consumed = events.len() * RECORD_SIZE;
        (events, consumed)
    }

    /// Encode in the kernel layout
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RECORD_SIZE);
        out.extend_from_slice(&write_signed(self.time_sec, TIME_FIELD));
        out.extend_from_slice(&write_signed(self.time_usec, USEC_FIELD));
        out.resize(RECORD_SIZE - 8, 0);
        out.extend_from_slice(&self.kind.to_ne_bytes());
        out.extend_from_slice(&self.code.to_ne_bytes());
        out.extend_from_slice(&self.value.to_ne_bytes());
        out
    }
}

fn read_signed(bytes: &[u8]) -> i64 {
    match bytes.len() {
        4 => i64::from(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        _ => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[..8]);
            i64::from_ne_bytes(buf)
        }
    }
}

fn write_signed(value: i64, width: usize) -> Vec<u8> {
    match width {
        4 => (value as i32).to_ne_bytes().to_vec(),
        _ => value.to_ne_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::codes::*;

    #[test]
    fn record_matches_kernel_layout() {
        assert_eq!(RECORD_SIZE, size_of::<libc::input_event>());
    }

    #[test]
    fn decodes_fields() {
        let event = RawInputEvent {
            time_sec: 17,
            time_usec: 500,
            kind: EV_ABS,
            code: ABS_MT_POSITION_X,
            value: -3,
        };
        assert_eq!(RawInputEvent::decode(&event.encode()), Some(event));
    }

    #[test]
    fn short_buffer_is_incomplete() {
        let bytes = RawInputEvent::new(EV_KEY, KEY_A, 1).encode();
        assert_eq!(RawInputEvent::decode(&bytes[..RECORD_SIZE - 1]), None);
    }

    #[test]
    fn decode_all_leaves_partial_tail() {
        let mut bytes = RawInputEvent::new(EV_REL, REL_X, 5).encode();
        bytes.extend(RawInputEvent::new(EV_SYN, SYN_REPORT, 0).encode());
        bytes.extend(&RawInputEvent::new(EV_REL, REL_Y, 1).encode()[..3]);

        let (events, consumed) = RawInputEvent::decode_all(&bytes);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].value, 5);
        assert_eq!(events[1].code, SYN_REPORT);
        assert_eq!(consumed, RECORD_SIZE * 2);
        assert_eq!(bytes.len() - consumed, 3);
    }
}
