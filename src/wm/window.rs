//! Window Module
//!
//! Per-window record: geometry, cached geometry, size constraints, flags and
//! lifecycle state. Z-order links are owned by the registry.

use bitflags::bitflags;
use serde::Serialize;
use std::fmt;

use crate::shared::Bounds;
use crate::wm::view::ViewId;

/// Stable window handle. Never reused within one window manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Window lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum WindowState {
    #[default]
    Normal,
    Minimized,
    Maximized,
    Fullscreen,
}

impl WindowState {
    pub fn name(self) -> &'static str {
        match self {
            WindowState::Normal => "NORMAL",
            WindowState::Minimized => "MINIMIZED",
            WindowState::Maximized => "MAXIMIZED",
            WindowState::Fullscreen => "FULLSCREEN",
        }
    }
}

bitflags! {
    /// Flags requested at window creation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct CreationFlags: u32 {
        const TITLED      = 1 << 0;
        const CLOSABLE    = 1 << 1;
        const MINIMIZABLE = 1 << 2;
        const MAXIMIZABLE = 1 << 3;
        const RESIZABLE   = 1 << 4;
        const TRANSPARENT = 1 << 5;
        const UNDECORATED = 1 << 6;
        const UTILITY     = 1 << 7;
        const POPUP       = 1 << 8;
        const MODAL       = 1 << 9;
    }
}

/// Min/max size constraints. Zero (or less) on an axis means unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SizeLimits {
    pub min_width: i32,
    pub min_height: i32,
    pub max_width: i32,
    pub max_height: i32,
}

impl SizeLimits {
    /// Clamp `width`/`height` into the constraints.
    ///
    /// Returns the clamped size and whether the input was already valid.
    pub fn check(&self, mut width: i32, mut height: i32) -> (i32, i32, bool) {
        let mut valid = true;

        if self.min_width > 0 && width < self.min_width {
            width = self.min_width;
            valid = false;
        }
        if self.max_width > 0 && width > self.max_width {
            width = self.max_width;
            valid = false;
        }
        if self.min_height > 0 && height < self.min_height {
            height = self.min_height;
            valid = false;
        }
        if self.max_height > 0 && height > self.max_height {
            height = self.max_height;
            valid = false;
        }

        (width, height, valid)
    }
}

/// Window record
#[derive(Debug, Clone)]
pub struct Window {
    pub id: WindowId,

    /// Owning window (popups, dialogs). Non-owning reference.
    pub owner: Option<WindowId>,

    /// Topmost ancestor with no owner; the window itself for top-levels.
    pub root: WindowId,

    pub bounds: Bounds,

    /// Geometry saved before leaving Normal state
    pub cached_bounds: Bounds,

    pub limits: SizeLimits,

    /// Opacity, 0.0 to 1.0
    pub alpha: f32,

    pub flags: CreationFlags,

    pub state: WindowState,

    pub visible: bool,
    pub enabled: bool,
    pub focusable: bool,

    /// Member of the rendered window list (visible and not minimized)
    pub rendered: bool,

    pub view: Option<ViewId>,

    // Z-order links, managed by the registry
    pub(crate) prev: Option<WindowId>,
    pub(crate) next: Option<WindowId>,
    pub(crate) linked: bool,
}

impl Window {
    pub fn new(id: WindowId, owner: Option<WindowId>, root: WindowId, flags: CreationFlags) -> Self {
        Self {
            id,
            owner,
            root,
            bounds: Bounds::default(),
            cached_bounds: Bounds::default(),
            limits: SizeLimits::default(),
            alpha: 1.0,
            flags,
            state: WindowState::Normal,
            visible: false,
            enabled: true,
            focusable: true,
            rendered: false,
            view: None,
            prev: None,
            next: None,
            linked: false,
        }
    }

    pub fn check_bounds(&self, width: i32, height: i32) -> (i32, i32, bool) {
        self.limits.check(width, height)
    }

    /// Eligible for hit-testing: shown, not minimized, accepting input.
    pub fn is_hittable(&self) -> bool {
        self.visible && self.enabled && self.state != WindowState::Minimized
    }

    pub fn cache_bounds(&mut self) {
        self.cached_bounds = self.bounds;
    }

    pub fn is_transparent(&self) -> bool {
        self.flags.contains(CreationFlags::TRANSPARENT)
    }
}
