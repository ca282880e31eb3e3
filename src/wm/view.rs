//! Paintable surface bound to at most one window.

use serde::Serialize;
use std::fmt;

use crate::shared::Bounds;
use crate::wm::window::WindowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ViewId(pub u32);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct View {
    pub id: ViewId,

    /// Bounds relative to the parent window
    pub bounds: Bounds,

    /// Window currently holding this view, if any
    pub parent: Option<WindowId>,
}

impl View {
    pub fn new(id: ViewId) -> Self {
        Self {
            id,
            bounds: Bounds::default(),
            parent: None,
        }
    }
}
