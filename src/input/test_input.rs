//! Test input replay
//!
//! When `LENS_TEST_INPUT` names a stream, devices are added and removed by
//! commands read from it instead of by discovery. All values are in host
//! byte order:
//!
//! ```text
//! add    := 1:i32 input_id(4 x u16) name devnode product
//!           events keys rel abs props
//! remove := 2:i32 devnode
//! string := bytes terminated by NUL
//! list   := i32* terminated by -1
//! abs    := (axis:i32 absinfo(6 x i32))* terminated by -1
//! props  := (key value)* terminated by an empty key
//! ```
//!
//! The device node of an added device is a stream of raw event records.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::error::{LensError, Result};
use crate::input::codes::*;
use crate::input::device::{AbsInfo, Bits, DeviceInfo, InputDevice, InputId};
use crate::input::event_loop::DeviceRegistrar;

const ACTION_ADD: i32 = 1;
const ACTION_REMOVE: i32 = 2;
const MAX_STRING: usize = 1024;
const SOURCE: &str = "test input";

#[derive(Debug)]
pub enum TestInputCommand {
    Add(InputDevice),
    Remove(PathBuf),
}

fn invalid(reason: String) -> LensError {
    LensError::device_io(SOURCE, io::Error::new(io::ErrorKind::InvalidData, reason))
}

pub struct TestInputReader<R> {
    reader: R,
}

impl<R: Read> TestInputReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).map_err(|e| LensError::device_io(SOURCE, e))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_ne_bytes(buf))
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_ne_bytes(buf))
    }

    fn read_string(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            let mut c = [0u8; 1];
            self.read_exact(&mut c)?;
            if c[0] == 0 {
                break;
            }
            if bytes.len() == MAX_STRING {
                return Err(invalid(format!("string longer than {} bytes", MAX_STRING)));
            }
            bytes.push(c[0]);
        }
        String::from_utf8(bytes).map_err(|e| invalid(e.to_string()))
    }

    fn read_bits(&mut self, bits: &mut Bits, max: u16) -> Result<()> {
        loop {
            let bit = self.read_i32()?;
            if bit < 0 {
                return Ok(());
            }
            if bit > i32::from(max) {
                return Err(invalid(format!("bit {} out of range 0..={}", bit, max)));
            }
            bits.set(bit as u16);
        }
    }

    fn read_add(&mut self) -> Result<InputDevice> {
        let id = InputId {
            bustype: self.read_u16()?,
            vendor: self.read_u16()?,
            product: self.read_u16()?,
            version: self.read_u16()?,
        };
        let mut info = DeviceInfo {
            name: self.read_string()?,
            devnode: PathBuf::from(self.read_string()?),
            product: self.read_string()?,
            id,
            ..Default::default()
        };

        let caps = &mut info.caps;
        self.read_bits(&mut caps.events, EV_MAX)?;
        self.read_bits(&mut caps.keys, KEY_MAX)?;
        self.read_bits(&mut caps.rel, REL_MAX)?;
        loop {
            let axis = self.read_i32()?;
            if axis < 0 {
                break;
            }
            if axis > i32::from(ABS_MAX) {
                return Err(invalid(format!("absolute axis {} out of range", axis)));
            }
            let absinfo = AbsInfo {
                value: self.read_i32()?,
                minimum: self.read_i32()?,
                maximum: self.read_i32()?,
                fuzz: self.read_i32()?,
                flat: self.read_i32()?,
                resolution: self.read_i32()?,
            };
            debug!("Axis {} range {}..{}", axis, absinfo.minimum, absinfo.maximum);
            caps.set_abs(axis as u16, absinfo);
        }

        let mut device = InputDevice::new(info);
        device.is_test_device = true;
        loop {
            let key = self.read_string()?;
            if key.is_empty() {
                break;
            }
            let value = self.read_string()?;
            device.apply_property(&key, &value);
        }
        Ok(device)
    }

    /// Next command, or `None` at a clean end of stream.
    pub fn next_command(&mut self) -> Result<Option<TestInputCommand>> {
        loop {
            let mut action = [0u8; 4];
            match self.reader.read(&mut action[..1]) {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(LensError::device_io(SOURCE, e)),
            }
            self.read_exact(&mut action[1..])?;

            match i32::from_ne_bytes(action) {
                ACTION_ADD => {
                    let device = self.read_add()?;
                    if device.has_role() {
                        return Ok(Some(TestInputCommand::Add(device)));
                    }
                    info!("{} is not a keyboard, mouse or touch screen, skipping", device.info.name);
                }
                ACTION_REMOVE => {
                    let devnode = self.read_string()?;
                    return Ok(Some(TestInputCommand::Remove(PathBuf::from(devnode))));
                }
                other => return Err(invalid(format!("unknown action {}", other))),
            }
        }
    }
}

/// Apply commands from `path` until the stream ends or turns unreadable.
pub fn spawn_monitor(path: &Path, registrar: DeviceRegistrar) -> io::Result<JoinHandle<()>> {
    let path = path.to_path_buf();
    thread::Builder::new()
        .name("lens-test-input".into())
        .spawn(move || {
            let file = match File::open(&path) {
                Ok(file) => file,
                Err(e) => {
                    error!("Failed to open test input {}: {}", path.display(), e);
                    return;
                }
            };
            info!("Monitoring test input {}", path.display());

            let mut reader = TestInputReader::new(file);
            loop {
                match reader.next_command() {
                    Ok(Some(TestInputCommand::Add(device))) => {
                        if let Err(e) = registrar.attach(device) {
                            warn!("Test device not added: {}", e);
                        }
                    }
                    Ok(Some(TestInputCommand::Remove(devnode))) => {
                        if !registrar.remove_devnode(&devnode) {
                            debug!("{} not registered, skipping remove", devnode.display());
                        }
                    }
                    Ok(None) => {
                        info!("Test input {} closed", path.display());
                        return;
                    }
                    Err(e) => {
                        error!("Stopping test input monitor: {}", e);
                        return;
                    }
                }
            }
        })
}

/// Builder for test input streams
#[cfg(test)]
#[derive(Default)]
pub(crate) struct StreamBuilder {
    pub bytes: Vec<u8>,
}

#[cfg(test)]
impl StreamBuilder {
    pub fn int(mut self, v: i32) -> Self {
        self.bytes.extend(v.to_ne_bytes());
        self
    }

    pub fn string(mut self, s: &str) -> Self {
        self.bytes.extend(s.as_bytes());
        self.bytes.push(0);
        self
    }

    pub fn list(self, values: &[u16]) -> Self {
        values.iter().fold(self, |b, v| b.int(i32::from(*v))).int(-1)
    }

    pub fn add(mut self, name: &str, devnode: &str, keys: &[u16], abs: &[(u16, i32)], props: &[&str]) -> Self {
        self = self.int(ACTION_ADD);
        for part in [3u16, 0x1234, 0x5678, 1] {
            self.bytes.extend(part.to_ne_bytes());
        }
        self = self.string(name).string(devnode).string("").list(&[EV_KEY, EV_ABS]).list(keys).list(&[]);
        for (axis, max) in abs {
            self = self.int(i32::from(*axis)).int(0).int(0).int(*max).int(0).int(0).int(0);
        }
        self = self.int(-1);
        for prop in props {
            self = self.string(prop).string("1");
        }
        self.string("")
    }

    pub fn remove(self, devnode: &str) -> Self {
        self.int(ACTION_REMOVE).string(devnode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::device::{DeviceFlags, TouchProtocol};
    use crate::input::touch::TouchSettings;

    fn reader(builder: StreamBuilder) -> TestInputReader<std::io::Cursor<Vec<u8>>> {
        TestInputReader::new(std::io::Cursor::new(builder.bytes))
    }

    #[test]
    fn parses_add_and_remove() {
        let stream = StreamBuilder::default()
            .add(
                "touch",
                "/tmp/lens-ts",
                &[BTN_TOUCH],
                &[(ABS_X, 4095), (ABS_Y, 4095), (ABS_MT_POSITION_X, 4095)],
                &["ID_INPUT", "ID_INPUT_TOUCHSCREEN"],
            )
            .remove("/tmp/lens-ts");
        let mut r = reader(stream);

        let Some(TestInputCommand::Add(mut device)) = r.next_command().unwrap() else {
            panic!("expected add");
        };
        assert!(device.is_test_device && device.is_touch);
        assert_eq!(device.info.name, "touch");
        assert_eq!(device.info.id.vendor, 0x1234);
        assert_eq!(device.info.caps.abs_info(ABS_X).maximum, 4095);
        assert!(device.info.caps.keys.test(BTN_TOUCH));
        device.finish_setup(TouchSettings::default(), true);
        assert_eq!(device.protocol, TouchProtocol::MtA);
        assert_eq!(device.flags(), DeviceFlags::TOUCH | DeviceFlags::MULTITOUCH);

        match r.next_command().unwrap() {
            Some(TestInputCommand::Remove(devnode)) => assert_eq!(devnode, PathBuf::from("/tmp/lens-ts")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(r.next_command().unwrap().is_none());
    }

    #[test]
    fn devices_without_a_role_are_skipped() {
        let stream = StreamBuilder::default()
            .add("button", "/tmp/b", &[], &[], &["ID_INPUT"])
            .add("kbd", "/tmp/k", &[KEY_A], &[], &["ID_INPUT_KEYBOARD"]);
        let mut r = reader(stream);
        match r.next_command().unwrap() {
            Some(TestInputCommand::Add(device)) => assert_eq!(device.info.name, "kbd"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_streams() {
        let mut r = reader(StreamBuilder::default().int(7));
        assert!(matches!(r.next_command(), Err(LensError::DeviceIo { .. })));

        let mut r = reader(StreamBuilder::default().int(ACTION_ADD).int(1));
        assert!(r.next_command().is_err());

        let stream = StreamBuilder::default()
            .int(ACTION_ADD)
            .int(0)
            .int(0)
            .string("x")
            .string("/tmp/x")
            .string("")
            .int(i32::from(EV_MAX) + 1);
        assert!(reader(stream).next_command().is_err());
    }
}
