//! Value types shared between the window manager and the input subsystem.

pub mod geometry;

pub use geometry::Bounds;
