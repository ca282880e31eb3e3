//! Screen Module
//!
//! Static description of the single display surface.

use serde::Serialize;
use std::path::PathBuf;

use crate::shared::Bounds;

/// Screen description, one per window manager
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Screen {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,

    /// Color depth in bits per pixel
    pub depth: u32,

    /// Resolution (dots per inch)
    pub resolution_x: u32,
    pub resolution_y: u32,

    /// Framebuffer device backing this screen, when there is one
    pub framebuffer: Option<PathBuf>,
}

impl Screen {
    pub fn new(width: i32, height: i32, depth: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
            depth,
            resolution_x: 72,
            resolution_y: 72,
            framebuffer: None,
        }
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.x, self.y, self.width, self.height)
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Clamp a point to the visible pixels of the screen.
    pub fn clamp_point(&self, x: i32, y: i32) -> (i32, i32) {
        (
            x.clamp(self.x, self.x + (self.width - 1).max(0)),
            y.clamp(self.y, self.y + (self.height - 1).max(0)),
        )
    }
}

impl Default for Screen {
    fn default() -> Self {
        Self::new(800, 600, 32)
    }
}
