//! Device discovery
//!
//! Startup scan of `/dev/input/event*`. Each node is probed through the evdev
//! ioctls for its name, identity and capability bitsets, and classified the
//! way udev's input_id builtin would.

use anyhow::{Context, Result};
use std::ffi::CStr;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::mem::size_of;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::LensError;
use crate::input::codes::*;
use crate::input::device::{AbsInfo, Bits, Capabilities, DeviceInfo, InputDevice, InputId};

pub const INPUT_DIR: &str = "/dev/input";

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const fn ioc(dir: u32, nr: u32, size: usize) -> libc::c_ulong {
    ((dir << 30) | ((size as u32) << 16) | ((b'E' as u32) << 8) | nr) as libc::c_ulong
}

pub const EVIOCGID: libc::c_ulong = ioc(IOC_READ, 0x02, size_of::<InputId>());
pub const EVIOCGRAB: libc::c_ulong = ioc(IOC_WRITE, 0x90, size_of::<libc::c_int>());

pub const fn eviocgname(len: usize) -> libc::c_ulong {
    ioc(IOC_READ, 0x06, len)
}

pub const fn eviocgbit(ev: u16, len: usize) -> libc::c_ulong {
    ioc(IOC_READ, 0x20 + ev as u32, len)
}

pub const fn eviocgabs(axis: u16) -> libc::c_ulong {
    ioc(IOC_READ, 0x40 + axis as u32, size_of::<AbsInfo>())
}

/// `event*` nodes under `dir`, in name order.
pub fn scan(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    let mut nodes: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("event"))
        })
        .collect();
    nodes.sort_by_key(|p| {
        let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        (name.len(), name.to_string())
    });
    Ok(nodes)
}

/// Open a device node for non-blocking reads, optionally grabbing it.
pub fn open_device(path: &Path, grab: bool) -> crate::error::Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(path)
        .map_err(|e| LensError::device_io(path.display().to_string(), e))?;

    if grab {
        // Fails on pipes and regular files used for replay; reads still work
        let grabbed: libc::c_int = 1;
        if unsafe { libc::ioctl(file.as_raw_fd(), EVIOCGRAB as _, grabbed) } < 0 {
            debug!("EVIOCGRAB on {} failed: {}", path.display(), io::Error::last_os_error());
        }
    }
    Ok(file)
}

fn ioctl_read<T>(file: &File, request: libc::c_ulong, out: *mut T) -> io::Result<libc::c_int> {
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), request as _, out) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc)
}

fn read_bits(file: &File, ev: u16, max: u16) -> io::Result<Bits> {
    let mut bits = Bits::new(max);
    let words = bits.words_mut();
    let len = std::mem::size_of_val(words);
    ioctl_read(file, eviocgbit(ev, len), words.as_mut_ptr())?;
    Ok(bits)
}

fn read_name(file: &File) -> io::Result<String> {
    let mut buf = [0u8; 256];
    ioctl_read(file, eviocgname(buf.len() - 1), buf.as_mut_ptr())?;
    let name = CStr::from_bytes_until_nul(&buf)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(name)
}

/// Read identity and capabilities from an open device.
pub fn read_info(file: &File, devnode: &Path) -> io::Result<DeviceInfo> {
    let mut id = InputId::default();
    ioctl_read(file, EVIOCGID, &mut id)?;

    let mut caps = Capabilities::default();
    caps.events = read_bits(file, 0, EV_MAX)?;
    caps.keys = read_bits(file, EV_KEY, KEY_MAX)?;
    caps.rel = read_bits(file, EV_REL, REL_MAX)?;
    caps.abs = read_bits(file, EV_ABS, ABS_MAX)?;
    for axis in 0..=ABS_MAX {
        if !caps.abs.test(axis) {
            continue;
        }
        let mut info = AbsInfo::default();
        ioctl_read(file, eviocgabs(axis), &mut info)?;
        caps.set_abs(axis, info);
    }

    let name = read_name(file)?;
    Ok(DeviceInfo {
        product: format!("{:04x}:{:04x}", id.vendor, id.product),
        name,
        devnode: devnode.to_path_buf(),
        id,
        caps,
    })
}

/// Role properties udev would assign from capabilities.
pub fn infer_properties(caps: &Capabilities) -> Vec<(&'static str, &'static str)> {
    let mut props = Vec::new();
    let has_keys = caps.events.test(EV_KEY);
    let abs_xy = caps.events.test(EV_ABS)
        && (caps.abs.all(&[ABS_X, ABS_Y]) || caps.abs.all(&[ABS_MT_POSITION_X, ABS_MT_POSITION_Y]));
    let rel_xy = caps.events.test(EV_REL) && caps.rel.all(&[REL_X, REL_Y]);

    if has_keys && (1..BTN_MISC).any(|k| caps.keys.test(k)) {
        props.push(("ID_INPUT_KEYBOARD", "1"));
    }
    if abs_xy && caps.keys.test(BTN_TOUCH) && !caps.keys.test(BTN_TOOL_FINGER) {
        props.push(("ID_INPUT_TOUCHSCREEN", "1"));
    } else if (rel_xy || abs_xy) && caps.keys.test(BTN_LEFT) {
        props.push(("ID_INPUT_MOUSE", "1"));
    }
    props
}

/// Probe a node into a classified device. Returns `None` for nodes that are
/// not keyboards, pointers or touch screens.
pub fn probe(path: &Path, grab: bool) -> crate::error::Result<Option<InputDevice>> {
    let file = open_device(path, false)?;
    let info = read_info(&file, path).map_err(|e| LensError::device_io(path.display().to_string(), e))?;
    drop(file);

    let props = infer_properties(&info.caps);
    let mut device = InputDevice::new(info);
    for (key, value) in props {
        device.apply_property(key, value);
    }
    if !device.has_role() {
        debug!("{} ({}) is not a keyboard, mouse or touch screen", path.display(), device.info.name);
        return Ok(None);
    }

    device.file = Some(open_device(path, grab)?);
    Ok(Some(device))
}

/// Probe every event node in `dir`.
pub fn discover(dir: &Path, grab: bool) -> Result<Vec<InputDevice>> {
    let mut devices = Vec::new();
    for node in scan(dir)? {
        match probe(&node, grab) {
            Ok(Some(device)) => {
                info!("Found input device {} at {}", device.info.name, node.display());
                devices.push(device);
            }
            Ok(None) => {}
            Err(e) => warn!("Skipping {}: {}", node.display(), e),
        }
    }
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioctl_numbers_match_linux() {
        assert_eq!(EVIOCGID, 0x8008_4502);
        assert_eq!(EVIOCGRAB, 0x4004_4590);
        assert_eq!(eviocgname(255), 0x80ff_4506);
        assert_eq!(eviocgbit(EV_KEY, 96), 0x8060_4521);
        assert_eq!(eviocgabs(ABS_MT_POSITION_X), 0x8018_4575);
    }

    fn caps_with(events: &[u16], keys: &[u16], rel: &[u16], abs: &[u16]) -> Capabilities {
        let mut caps = Capabilities::default();
        events.iter().for_each(|b| caps.events.set(*b));
        keys.iter().for_each(|b| caps.keys.set(*b));
        rel.iter().for_each(|b| caps.rel.set(*b));
        abs.iter().for_each(|b| caps.set_abs(*b, AbsInfo::default()));
        caps
    }

    #[test]
    fn classifies_common_devices() {
        let keyboard = caps_with(&[EV_KEY], &[KEY_A, KEY_ENTER], &[], &[]);
        assert_eq!(infer_properties(&keyboard), vec![("ID_INPUT_KEYBOARD", "1")]);

        let mouse = caps_with(&[EV_KEY, EV_REL], &[BTN_LEFT, BTN_RIGHT], &[REL_X, REL_Y, REL_WHEEL], &[]);
        assert_eq!(infer_properties(&mouse), vec![("ID_INPUT_MOUSE", "1")]);

        let touch = caps_with(&[EV_KEY, EV_ABS], &[BTN_TOUCH], &[], &[ABS_X, ABS_Y]);
        assert_eq!(infer_properties(&touch), vec![("ID_INPUT_TOUCHSCREEN", "1")]);

        let touchpad = caps_with(&[EV_KEY, EV_ABS], &[BTN_TOUCH, BTN_TOOL_FINGER], &[], &[ABS_X, ABS_Y]);
        assert!(infer_properties(&touchpad).is_empty());
    }

    #[test]
    fn scan_finds_event_nodes_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["event10", "event2", "mice", "event0"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let names: Vec<String> = scan(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["event0", "event2", "event10"]);
    }
}
