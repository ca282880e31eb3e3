//! Input Event Loop
//!
//! Blocks on a mio poll across every open device. Each wake-up reads the
//! readable devices until they would block, keeping partial records for the
//! next read, and feeds complete records to the device state. The device list
//! lock is held while a batch is processed and released around the wait, so
//! hotplug can add and remove devices between batches.

use anyhow::{Context, Result};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, trace, warn};

use crate::config::InputConfig;
use crate::input::device::{DeviceRegistry, InputDevice};
use crate::input::discovery;
use crate::input::event::{RawInputEvent, RECORD_SIZE};
use crate::input::touch::TouchSettings;
use crate::wm::WindowManager;

const WAKER_TOKEN: Token = Token(0);
const EVENTS_PER_READ: usize = 64;

/// Input options taken from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSettings {
    pub touch: TouchSettings,
    pub use_multi_touch: bool,
    pub grab_devices: bool,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self::from(&InputConfig::default())
    }
}

impl From<&InputConfig> for InputSettings {
    fn from(config: &InputConfig) -> Self {
        Self {
            touch: TouchSettings::from(config),
            use_multi_touch: config.use_multi_touch,
            grab_devices: config.grab_devices,
        }
    }
}

struct Shared {
    devices: Mutex<DeviceRegistry>,
    registry: Registry,
    waker: Waker,
    shutdown: AtomicBool,
    wm: Arc<WindowManager>,
    settings: InputSettings,
}

impl Shared {
    fn lock_devices(&self) -> MutexGuard<'_, DeviceRegistry> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unregister a device and report its detach.
    fn detach(&self, token: usize) {
        let removed = {
            let mut devices = self.lock_devices();
            devices.remove(token)
        };
        let Some(mut device) = removed else {
            return;
        };

        if let Some(file) = device.file.take() {
            let fd = file.as_raw_fd();
            if let Err(e) = self.registry.deregister(&mut SourceFd(&fd)) {
                debug!("Deregistering {} failed: {}", device.devnode().display(), e);
            }
        }
        info!("Removed input device {} ({})", device.info.name, device.devnode().display());

        if let Some(flags) = device.mark_detached() {
            self.wm.notify_device(flags, false);
        }
    }
}

/// Adds and removes devices from any thread
#[derive(Clone)]
pub struct DeviceRegistrar {
    shared: Arc<Shared>,
}

impl DeviceRegistrar {
    /// Open (if needed) and register a device, then report it attached.
    pub fn attach(&self, mut device: InputDevice) -> crate::error::Result<()> {
        let settings = self.shared.settings;
        device.finish_setup(settings.touch, settings.use_multi_touch);
        if device.file.is_none() {
            let grab = settings.grab_devices && !device.is_test_device;
            device.file = Some(discovery::open_device(device.devnode(), grab)?);
        }

        let flags = {
            let mut devices = self.shared.lock_devices();
            let fd = match device.file.as_ref() {
                Some(file) => file.as_raw_fd(),
                None => return Ok(()),
            };
            let name = device.info.name.clone();
            let devnode = device.devnode().display().to_string();

            let Some(token) = devices.insert(device) else {
                warn!("{} is already registered", devnode);
                return Ok(());
            };
            if let Err(e) = self
                .shared
                .registry
                .register(&mut SourceFd(&fd), Token(token), Interest::READABLE)
            {
                devices.remove(token);
                return Err(crate::error::LensError::device_io(devnode, e));
            }
            info!("Added input device {} ({}) as {}", name, devnode, token);

            devices.get_mut(token).and_then(|d| d.mark_attached())
        };

        if let Some(flags) = flags {
            self.shared.wm.notify_device(flags, true);
        }
        Ok(())
    }

    /// Detach the device opened from `devnode`. Returns false if there is none.
    pub fn remove_devnode(&self, devnode: &Path) -> bool {
        let token = self.shared.lock_devices().find_by_devnode(devnode);
        match token {
            Some(token) => {
                self.shared.detach(token);
                true
            }
            None => false,
        }
    }

    pub fn device_count(&self) -> usize {
        self.shared.lock_devices().len()
    }
}

/// Stops a running loop
#[derive(Clone)]
pub struct InputHandle {
    shared: Arc<Shared>,
}

impl InputHandle {
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Err(e) = self.shared.waker.wake() {
            warn!("Failed to wake input loop: {}", e);
        }
    }
}

pub struct EventLoop {
    poll: Poll,
    shared: Arc<Shared>,
}

impl EventLoop {
    pub fn new(wm: Arc<WindowManager>, settings: InputSettings) -> Result<Self> {
        let poll = Poll::new().context("Failed to create mio Poll")?;
        let registry = poll
            .registry()
            .try_clone()
            .context("Failed to clone mio registry")?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN).context("Failed to create poll waker")?;

        Ok(Self {
            poll,
            shared: Arc::new(Shared {
                devices: Mutex::new(DeviceRegistry::new()),
                registry,
                waker,
                shutdown: AtomicBool::new(false),
                wm,
                settings,
            }),
        })
    }

    pub fn registrar(&self) -> DeviceRegistrar {
        DeviceRegistrar {
            shared: self.shared.clone(),
        }
    }

    pub fn handle(&self) -> InputHandle {
        InputHandle {
            shared: self.shared.clone(),
        }
    }

    /// Poll until shut down, then detach every device.
    pub fn run(mut self) -> Result<()> {
        let mut events = Events::with_capacity(EVENTS_PER_READ);
        info!("Input loop started");

        while !self.shared.shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e).context("Input poll failed");
            }
            if self.shared.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let mut failed = Vec::new();
            {
                let mut devices = self.shared.lock_devices();
                for event in events.iter() {
                    let token = event.token();
                    if token == WAKER_TOKEN {
                        continue;
                    }
                    let Some(device) = devices.get_mut(token.0) else {
                        trace!("Event for released device {}", token.0);
                        continue;
                    };
                    match read_device(device, &self.shared.wm) {
                        Ok(true) => {}
                        Ok(false) => {
                            debug!("{} reached end of stream", device.devnode().display());
                            failed.push(token.0);
                        }
                        Err(e) => {
                            error!("Read from {} failed: {}", device.devnode().display(), e);
                            failed.push(token.0);
                        }
                    }
                }
            }
            for token in failed {
                self.shared.detach(token);
            }
        }

        let tokens = self.shared.lock_devices().tokens();
        for token in tokens {
            self.shared.detach(token);
        }
        info!("Input loop stopped");
        Ok(())
    }
}

/// Drain a readable device. Returns false at end of stream.
fn read_device(device: &mut InputDevice, wm: &WindowManager) -> io::Result<bool> {
    let mut buf = [0u8; RECORD_SIZE * EVENTS_PER_READ];
    loop {
        let read = match device.file.as_mut() {
            Some(file) => file.read(&mut buf),
            None => return Ok(false),
        };
        match read {
            Ok(0) => return Ok(false),
            Ok(n) => {
                device.read_buf.extend_from_slice(&buf[..n]);
                let (records, consumed) = RawInputEvent::decode_all(&device.read_buf);
                device.read_buf.drain(..consumed);
                if !device.read_buf.is_empty() {
                    trace!("{} bytes of a partial record buffered", device.read_buf.len());
                }
                for record in records {
                    device.handle_event(record, wm);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Notification, RecordingSink};
    use crate::input::codes::*;
    use crate::input::device::{DeviceFlags, DeviceInfo};
    use crate::platform::HeadlessPlatform;
    use crate::wm::{CreationFlags, Screen, WmCore};
    use std::fs::File;
    use std::io::Write;
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::{Duration, Instant};

    fn setup() -> (Arc<WindowManager>, Arc<RecordingSink>, EventLoop) {
        let sink = Arc::new(RecordingSink::new());
        let core = WmCore::new(Box::new(HeadlessPlatform::new(Screen::new(800, 600, 32)))).unwrap();
        let wm = Arc::new(WindowManager::new(core, sink.clone()));
        let event_loop = EventLoop::new(wm.clone(), InputSettings::default()).unwrap();
        (wm, sink, event_loop)
    }

    /// Keyboard whose node is one end of a socket pair
    fn socket_keyboard(devnode: &str) -> (InputDevice, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        theirs.set_nonblocking(true).unwrap();
        let mut info = DeviceInfo {
            name: "kbd".into(),
            devnode: devnode.into(),
            ..Default::default()
        };
        info.caps.keys.set(KEY_A);
        let mut device = InputDevice::new(info);
        device.is_test_device = true;
        device.apply_property("ID_INPUT_KEYBOARD", "1");
        device.file = Some(File::from(OwnedFd::from(theirs)));
        (device, ours)
    }

    fn wait_for(sink: &RecordingSink, seen: &mut Vec<Notification>, pred: impl Fn(&[Notification]) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !pred(seen) {
            assert!(Instant::now() < deadline, "timed out, saw {:?}", seen);
            seen.extend(sink.take());
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn is_key(n: &Notification) -> bool {
        matches!(n, Notification::Key { key_code: KEY_A, .. })
    }

    #[test]
    fn partial_records_are_completed_on_the_next_read() {
        let (wm, sink, event_loop) = setup();
        let window = wm.create_window(None, CreationFlags::empty()).unwrap();
        wm.set_visible(window, true).unwrap();

        let registrar = event_loop.registrar();
        let handle = event_loop.handle();
        let (device, mut writer) = socket_keyboard("/tmp/lens-kbd");
        registrar.attach(device).unwrap();
        assert_eq!(registrar.device_count(), 1);

        let runner = thread::spawn(move || event_loop.run());

        let record = RawInputEvent::new(EV_KEY, KEY_A, 1).encode();
        writer.write_all(&record[..5]).unwrap();
        thread::sleep(Duration::from_millis(50));
        writer.write_all(&record[5..]).unwrap();

        let mut seen = Vec::new();
        wait_for(&sink, &mut seen, |s| s.iter().any(is_key));
        assert_eq!(seen.iter().filter(|n| is_key(n)).count(), 1);

        handle.shutdown();
        runner.join().unwrap().unwrap();
        seen.extend(sink.take());
        assert!(seen.contains(&Notification::Device { flags: DeviceFlags::empty(), attached: true }));
        assert!(seen.contains(&Notification::Device { flags: DeviceFlags::empty(), attached: false }));
        assert_eq!(registrar.device_count(), 0);
    }

    #[test]
    fn end_of_stream_detaches_device() {
        let (_wm, sink, event_loop) = setup();
        let registrar = event_loop.registrar();
        let handle = event_loop.handle();
        let (device, writer) = socket_keyboard("/tmp/lens-eof");
        registrar.attach(device).unwrap();

        let runner = thread::spawn(move || event_loop.run());
        drop(writer);

        let mut seen = Vec::new();
        wait_for(&sink, &mut seen, |s| {
            s.iter().any(|n| matches!(n, Notification::Device { attached: false, .. }))
        });
        assert_eq!(registrar.device_count(), 0);

        handle.shutdown();
        runner.join().unwrap().unwrap();
    }

    #[test]
    fn duplicate_nodes_and_unknown_removals() {
        let (_wm, sink, event_loop) = setup();
        let registrar = event_loop.registrar();
        let (first, _w1) = socket_keyboard("/tmp/lens-dup");
        let (second, _w2) = socket_keyboard("/tmp/lens-dup");
        registrar.attach(first).unwrap();
        registrar.attach(second).unwrap();
        assert_eq!(registrar.device_count(), 1);

        assert!(!registrar.remove_devnode(Path::new("/tmp/other")));
        assert!(registrar.remove_devnode(Path::new("/tmp/lens-dup")));
        assert!(!registrar.remove_devnode(Path::new("/tmp/lens-dup")));

        let devices: Vec<bool> = sink
            .take()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Device { attached, .. } => Some(attached),
                _ => None,
            })
            .collect();
        assert_eq!(devices, vec![true, false]);
    }
}
