//! Platform Module
//!
//! Capability interface to the display backend. The window manager calls
//! these hooks; cosmetic ones default to no-ops.

pub mod framebuffer;
pub mod headless;

use anyhow::Result;
use tracing::info;

use crate::config::{PlatformKind, ScreenConfig};
use crate::wm::screen::Screen;
use crate::wm::view::View;
use crate::wm::window::Window;

pub use framebuffer::FramebufferPlatform;
pub use headless::{HeadlessPlatform, PlatformCall};

/// Display backend hooks
pub trait Platform: Send {
    fn name(&self) -> &'static str;

    /// Describe the screen. Failure is fatal at startup.
    fn screen_initialize(&mut self) -> Result<Screen>;

    /// Clear the whole screen before a repaint.
    fn screen_clear(&mut self) {}

    fn window_create(&mut self, _window: &Window) -> crate::error::Result<()> {
        Ok(())
    }

    fn window_release(&mut self, _window: &Window) {}

    fn view_create(&mut self, _view: &View) -> crate::error::Result<()> {
        Ok(())
    }

    fn view_release(&mut self, _view: &View) {}

    fn window_minimize(&mut self, _window: &Window, _minimize: bool) {}

    fn window_set_visible(&mut self, _window: &Window, _visible: bool) {}

    fn cursor_set_position(&mut self, _x: i32, _y: i32) {}

    fn cursor_set_visible(&mut self, _visible: bool) {}

    fn shutdown(&mut self) {}
}

/// Build the backend selected in the configuration.
pub fn create(config: &ScreenConfig) -> Result<Box<dyn Platform>> {
    let platform: Box<dyn Platform> = match config.platform {
        PlatformKind::Headless => Box::new(HeadlessPlatform::from_config(config)),
        PlatformKind::Framebuffer => Box::new(FramebufferPlatform::new(&config.framebuffer)),
    };
    info!("Using {} platform", platform.name());
    Ok(platform)
}
