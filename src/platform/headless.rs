//! Headless backend: no display, records hook calls for inspection.

use anyhow::Result;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::config::ScreenConfig;
use crate::platform::Platform;
use crate::wm::screen::Screen;
use crate::wm::view::{View, ViewId};
use crate::wm::window::{Window, WindowId};

/// Hook invocation observed by the headless backend
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    ScreenClear,
    WindowCreate(WindowId),
    WindowRelease(WindowId),
    ViewCreate(ViewId),
    ViewRelease(ViewId),
    WindowMinimize(WindowId, bool),
    WindowSetVisible(WindowId, bool),
    CursorSetPosition(i32, i32),
    CursorSetVisible(bool),
    Shutdown,
}

pub struct HeadlessPlatform {
    screen: Screen,
    calls: Arc<Mutex<Vec<PlatformCall>>>,
}

impl HeadlessPlatform {
    pub fn new(screen: Screen) -> Self {
        Self {
            screen,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_config(config: &ScreenConfig) -> Self {
        let mut screen = Screen::new(config.width, config.height, config.depth);
        screen.resolution_x = config.resolution_x;
        screen.resolution_y = config.resolution_y;
        Self::new(screen)
    }

    /// Shared log of hook calls; stays readable after the platform is moved
    /// into the window manager.
    pub fn calls(&self) -> Arc<Mutex<Vec<PlatformCall>>> {
        self.calls.clone()
    }

    fn record(&self, call: PlatformCall) {
        debug!("headless: {:?}", call);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl Default for HeadlessPlatform {
    fn default() -> Self {
        Self::new(Screen::default())
    }
}

impl Platform for HeadlessPlatform {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn screen_initialize(&mut self) -> Result<Screen> {
        Ok(self.screen.clone())
    }

    fn screen_clear(&mut self) {
        self.record(PlatformCall::ScreenClear);
    }

    fn window_create(&mut self, window: &Window) -> crate::error::Result<()> {
        self.record(PlatformCall::WindowCreate(window.id));
        Ok(())
    }

    fn window_release(&mut self, window: &Window) {
        self.record(PlatformCall::WindowRelease(window.id));
    }

    fn view_create(&mut self, view: &View) -> crate::error::Result<()> {
        self.record(PlatformCall::ViewCreate(view.id));
        Ok(())
    }

    fn view_release(&mut self, view: &View) {
        self.record(PlatformCall::ViewRelease(view.id));
    }

    fn window_minimize(&mut self, window: &Window, minimize: bool) {
        self.record(PlatformCall::WindowMinimize(window.id, minimize));
    }

    fn window_set_visible(&mut self, window: &Window, visible: bool) {
        self.record(PlatformCall::WindowSetVisible(window.id, visible));
    }

    fn cursor_set_position(&mut self, x: i32, y: i32) {
        self.record(PlatformCall::CursorSetPosition(x, y));
    }

    fn cursor_set_visible(&mut self, visible: bool) {
        self.record(PlatformCall::CursorSetVisible(visible));
    }

    fn shutdown(&mut self) {
        self.record(PlatformCall::Shutdown);
    }
}
