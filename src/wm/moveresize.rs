//! MoveResize Module
//!
//! Geometry updates: consumer-driven moves and resizes, min/max size
//! constraints, the maximized-bounds computation, and repaints.

use bitflags::bitflags;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::events::{Notification, ViewEventType, WindowEventType};
use crate::shared::Bounds;
use crate::wm::screen::Screen;
use crate::wm::window::{Window, WindowId, WindowState};
use crate::wm::WmCore;

bitflags! {
    /// Which parts of a bounds request to apply
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BoundsUpdate: u8 {
        const POSITION     = 1 << 0;
        const SIZE         = 1 << 1;
        /// Size given for the content area. Always applied as a window resize.
        const CONTENT_SIZE = 1 << 2;
    }
}

/// Bounds for maximizing `window` on `screen`.
///
/// Unconstrained windows cover the whole screen. A window limited by its
/// maximum size grows from its current origin, and is pushed toward the top
/// left when growing would carry it past the bottom right corner.
pub fn maximized_bounds(window: &Window, screen: &Screen) -> Bounds {
    let current = window.bounds;
    let (width, height, fits) = window.check_bounds(screen.width, screen.height);

    let (x, y) = if fits {
        (0, 0)
    } else if width > current.width || height > current.height {
        (screen.width - width - 1, screen.height - height - 1)
    } else {
        (current.x, current.y)
    };

    Bounds::new(x, y, width, height)
}

impl WmCore {
    /// Move and/or resize on behalf of the consumer. Sizes are clamped to the
    /// window's constraints while it is in Normal state.
    pub fn set_bounds(&mut self, id: WindowId, bounds: Bounds, update: BoundsUpdate) -> Result<()> {
        let window = self.registry.window(id)?;
        let mut bounds = bounds;

        if window.state == WindowState::Normal
            && update.intersects(BoundsUpdate::SIZE | BoundsUpdate::CONTENT_SIZE)
        {
            let (width, height, valid) = window.check_bounds(bounds.width, bounds.height);
            if !valid {
                debug!(
                    "Window {} size {}x{} clamped to {}x{}",
                    id, bounds.width, bounds.height, width, height
                );
            }
            bounds.width = width;
            bounds.height = height;
        }

        self.set_bounds_impl(id, bounds, update)
    }

    /// Apply geometry without constraint checks, notifying only what changed.
    pub(crate) fn set_bounds_impl(&mut self, id: WindowId, bounds: Bounds, update: BoundsUpdate) -> Result<()> {
        let content_only = update.contains(BoundsUpdate::CONTENT_SIZE);
        let update_size = update.intersects(BoundsUpdate::SIZE | BoundsUpdate::CONTENT_SIZE);
        let update_position = update.contains(BoundsUpdate::POSITION);

        let window = self.registry.window_mut(id)?;
        trace!(
            "set_bounds_impl on window {} to {:?} ({:?}) state={}",
            id,
            bounds,
            update,
            window.state.name()
        );

        let resized = update_size && !window.bounds.same_size(bounds.width, bounds.height);
        if resized {
            debug!(
                "Window {} size {}x{} -> {}x{}",
                id, window.bounds.width, window.bounds.height, bounds.width, bounds.height
            );
            window.bounds.width = bounds.width;
            window.bounds.height = bounds.height;
        }

        let moved = update_position && !window.bounds.same_position(bounds.x, bounds.y);
        if moved {
            debug!(
                "Window {} location {},{} -> {},{}",
                id, window.bounds.x, window.bounds.y, bounds.x, bounds.y
            );
            window.bounds.x = bounds.x;
            window.bounds.y = bounds.y;
        }

        if resized {
            self.emit(Notification::WindowResize {
                window: id,
                kind: WindowEventType::Resize,
                width: bounds.width,
                height: bounds.height,
            });
        }
        if moved {
            self.emit(Notification::WindowMove {
                window: id,
                x: bounds.x,
                y: bounds.y,
            });
        }

        if resized || moved {
            self.repaint(id);
        } else if content_only {
            // Surface content changed under the same geometry
            self.repaint(id);
        } else {
            debug!("Window {} bounds unchanged, nothing to do", id);
        }
        Ok(())
    }

    /// Clear the screen and ask the window's view to repaint.
    pub(crate) fn repaint(&mut self, id: WindowId) {
        self.platform.screen_clear();

        let Some(window) = self.registry.get(id) else {
            return;
        };
        if let Some(view) = window.view {
            let bounds = window.bounds;
            self.emit_view_event(view, ViewEventType::Repaint, bounds);
        }
    }

    /// Force a redraw without touching geometry.
    pub fn request_repaint(&mut self, id: WindowId) -> Result<()> {
        self.registry.window(id)?;
        self.repaint(id);
        Ok(())
    }

    pub fn set_minimum_size(&mut self, id: WindowId, width: i32, height: i32) -> Result<bool> {
        if width < 0 || height < 0 {
            warn!("Window {} rejected minimum size {}x{}", id, width, height);
            self.registry.window(id)?;
            return Ok(false);
        }
        let window = self.registry.window_mut(id)?;
        window.limits.min_width = width;
        window.limits.min_height = height;
        self.reclamp(id)?;
        Ok(true)
    }

    pub fn set_maximum_size(&mut self, id: WindowId, width: i32, height: i32) -> Result<bool> {
        if width < 0 || height < 0 {
            warn!("Window {} rejected maximum size {}x{}", id, width, height);
            self.registry.window(id)?;
            return Ok(false);
        }
        let window = self.registry.window_mut(id)?;
        window.limits.max_width = width;
        window.limits.max_height = height;
        self.reclamp(id)?;
        Ok(true)
    }

    /// Re-apply constraints to the current size after they changed.
    fn reclamp(&mut self, id: WindowId) -> Result<()> {
        let window = self.registry.window(id)?;
        let limits = window.limits;
        if limits.min_width > 0
            && limits.max_width > 0
            && limits.min_width > limits.max_width
        {
            warn!("Window {} minimum width exceeds maximum", id);
        }

        let current = window.bounds;
        let (width, height, _) = window.check_bounds(current.width, current.height);
        if !current.same_size(width, height) {
            self.set_bounds_impl(id, Bounds::new(0, 0, width, height), BoundsUpdate::SIZE)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::testing::*;
    use crate::wm::CreationFlags;

    #[test]
    fn raising_minimum_enlarges_window() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 100, 100));
        core.set_minimum_size(a, 50, 50).unwrap();
        assert_eq!(core.window(a).unwrap().bounds, Bounds::new(0, 0, 100, 100));

        assert!(core.set_minimum_size(a, 200, 50).unwrap());
        assert_eq!(core.window(a).unwrap().bounds, Bounds::new(0, 0, 200, 100));

        let view = core.window(a).unwrap().view.unwrap();
        assert_eq!(
            core.drain_notifications(),
            vec![
                Notification::WindowResize {
                    window: a,
                    kind: WindowEventType::Resize,
                    width: 200,
                    height: 100
                },
                Notification::View {
                    view,
                    kind: ViewEventType::Repaint,
                    x: 0,
                    y: 0,
                    width: 200,
                    height: 100
                },
            ]
        );
    }

    #[test]
    fn lowering_maximum_shrinks_window_in_place() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(30, 40, 300, 300));
        core.set_maximum_size(a, 120, 0).unwrap();
        assert_eq!(core.window(a).unwrap().bounds, Bounds::new(30, 40, 120, 300));
    }

    #[test]
    fn negative_limits_are_rejected() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 100, 100));
        assert!(!core.set_minimum_size(a, -1, 10).unwrap());
        assert_eq!(core.window(a).unwrap().limits.min_height, 0);
    }

    #[test]
    fn set_bounds_clamps_in_normal_state() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 100, 100));
        core.set_minimum_size(a, 80, 80).unwrap();
        core.set_bounds(a, Bounds::new(5, 5, 10, 500), BoundsUpdate::POSITION | BoundsUpdate::SIZE)
            .unwrap();
        assert_eq!(core.window(a).unwrap().bounds, Bounds::new(5, 5, 80, 500));
    }

    #[test]
    fn unchanged_bounds_emit_nothing() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 100, 100));
        core.set_bounds(a, Bounds::new(0, 0, 100, 100), BoundsUpdate::POSITION | BoundsUpdate::SIZE)
            .unwrap();
        assert!(core.drain_notifications().is_empty());
    }

    #[test]
    fn move_only_ignores_size() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 100, 100));
        core.set_bounds(a, Bounds::new(7, 8, 1, 1), BoundsUpdate::POSITION).unwrap();
        assert_eq!(core.window(a).unwrap().bounds, Bounds::new(7, 8, 100, 100));
        let events = core.drain_notifications();
        assert_eq!(events[0], Notification::WindowMove { window: a, x: 7, y: 8 });
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn content_change_with_same_size_still_repaints() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 100, 100));
        core.set_bounds(a, Bounds::new(0, 0, 100, 100), BoundsUpdate::CONTENT_SIZE)
            .unwrap();
        let events = core.drain_notifications();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Notification::View { kind: ViewEventType::Repaint, .. }
        ));
    }

    #[test]
    fn request_repaint_does_not_resize() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 100, 100));
        core.request_repaint(a).unwrap();
        let events = core.drain_notifications();
        assert!(events
            .iter()
            .all(|n| matches!(n, Notification::View { kind: ViewEventType::Repaint, .. })));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn maximized_bounds_respect_limits() {
        let screen = Screen::new(800, 600, 32);
        let mut window = Window::new(WindowId(1), None, WindowId(1), CreationFlags::empty());
        window.bounds = Bounds::new(100, 100, 200, 200);
        assert_eq!(maximized_bounds(&window, &screen), Bounds::new(0, 0, 800, 600));

        window.limits.max_width = 400;
        window.limits.max_height = 300;
        assert_eq!(maximized_bounds(&window, &screen), Bounds::new(399, 299, 400, 300));

        window.bounds = Bounds::new(10, 10, 500, 500);
        assert_eq!(maximized_bounds(&window, &screen), Bounds::new(10, 10, 400, 300));
    }
}
