//! Window geometry

use serde::Serialize;

/// Rectangle in screen coordinates.
///
/// Width and height are signed so that bounds arithmetic (maximize offsets,
/// relative pointer coordinates outside a window) never needs casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Translate an absolute point into coordinates relative to this origin.
    pub fn relative(&self, abs_x: i32, abs_y: i32) -> (i32, i32) {
        (abs_x - self.x, abs_y - self.y)
    }

    pub fn same_size(&self, width: i32, height: i32) -> bool {
        self.width == width && self.height == height
    }

    pub fn same_position(&self, x: i32, y: i32) -> bool {
        self.x == x && self.y == y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_excludes_far_edges() {
        let b = Bounds::new(10, 10, 5, 5);
        assert!(b.contains(10, 10));
        assert!(b.contains(14, 14));
        assert!(!b.contains(15, 10));
        assert!(!b.contains(10, 15));
        assert!(!b.contains(9, 12));
    }

    #[test]
    fn relative_may_be_negative() {
        let b = Bounds::new(25, 25, 50, 50);
        assert_eq!(b.relative(30, 30), (5, 5));
        assert_eq!(b.relative(0, 0), (-25, -25));
    }
}
