//! Linux framebuffer backend
//!
//! Screen geometry comes from sysfs (`/sys/class/graphics/<fb>`); clearing
//! writes zeroed pixels to the device node. Cursor rendering is not done here.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

use crate::platform::Platform;
use crate::wm::screen::Screen;

pub struct FramebufferPlatform {
    /// sysfs directory describing the device
    sysfs: PathBuf,
    /// Device node written on clear
    device: PathBuf,
    /// Bytes in one full frame, known after init
    frame_len: usize,
}

impl FramebufferPlatform {
    pub fn new(name: &str) -> Self {
        Self::with_paths(
            Path::new("/sys/class/graphics").join(name),
            Path::new("/dev").join(name),
        )
    }

    pub fn with_paths(sysfs: PathBuf, device: PathBuf) -> Self {
        Self {
            sysfs,
            device,
            frame_len: 0,
        }
    }

    fn read_attr(&self, attr: &str) -> Result<String> {
        let path = self.sysfs.join(attr);
        let value = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(value.trim().to_string())
    }

    /// `virtual_size` is "width,height".
    fn parse_size(value: &str) -> Result<(i32, i32)> {
        let (w, h) = value
            .split_once(',')
            .context("Malformed framebuffer virtual_size")?;
        let width = w.trim().parse().context("Malformed framebuffer width")?;
        let height = h.trim().parse().context("Malformed framebuffer height")?;
        Ok((width, height))
    }
}

impl Platform for FramebufferPlatform {
    fn name(&self) -> &'static str {
        "framebuffer"
    }

    fn screen_initialize(&mut self) -> Result<Screen> {
        let (width, height) = Self::parse_size(&self.read_attr("virtual_size")?)?;
        let depth: u32 = self
            .read_attr("bits_per_pixel")?
            .parse()
            .context("Malformed framebuffer bits_per_pixel")?;

        let mut screen = Screen::new(width, height, depth);
        screen.framebuffer = Some(self.device.clone());
        self.frame_len = (width.max(0) as usize) * (height.max(0) as usize) * (depth as usize / 8);

        info!(
            "Framebuffer {} is {}x{} at {} bpp",
            self.device.display(),
            width,
            height,
            depth
        );
        Ok(screen)
    }

    fn screen_clear(&mut self) {
        if self.frame_len == 0 {
            return;
        }
        let result = OpenOptions::new()
            .write(true)
            .open(&self.device)
            .and_then(|mut fb| {
                fb.seek(SeekFrom::Start(0))?;
                fb.write_all(&vec![0u8; self.frame_len])
            });
        match result {
            Ok(()) => trace!("Cleared {} bytes", self.frame_len),
            Err(e) => warn!("Failed to clear {}: {}", self.device.display(), e),
        }
    }

    fn cursor_set_position(&mut self, x: i32, y: i32) {
        trace!("cursor at {},{}", x, y);
    }

    fn cursor_set_visible(&mut self, visible: bool) {
        debug!("cursor visible={}", visible);
    }

    fn shutdown(&mut self) {
        self.screen_clear();
    }
}
