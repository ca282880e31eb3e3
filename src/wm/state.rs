//! Window state machine
//!
//! Normal, Minimized, Maximized and Fullscreen transitions plus the
//! visible/enabled/focusable flags. Leaving Normal caches the current bounds;
//! returning to Normal restores them. Any state other than Normal is first
//! restored before a different target state is applied.

use tracing::{debug, warn};

use crate::error::{LensError, Result};
use crate::events::{Notification, ViewEventType, WindowEventType};
use crate::shared::Bounds;
use crate::wm::moveresize::{maximized_bounds, BoundsUpdate};
use crate::wm::view::ViewId;
use crate::wm::window::{WindowId, WindowState};
use crate::wm::WmCore;

impl WmCore {
    pub fn set_visible(&mut self, id: WindowId, visible: bool) -> Result<bool> {
        let window = self.registry.window(id)?;
        debug!(
            "Window {} (owner {:?}) visible {} -> {}",
            id, window.owner, window.visible, visible
        );
        self.platform.window_set_visible(window, visible);

        let window = self.registry.window_mut(id)?;
        window.visible = visible;
        window.rendered = visible && window.state != WindowState::Minimized;
        let (focusable, enabled) = (window.focusable, window.enabled);

        if !visible {
            self.unset_focused_window(id);
        } else if focusable && enabled {
            self.set_focused_window(Some(id));
        }
        Ok(true)
    }

    pub fn set_enabled(&mut self, id: WindowId, enabled: bool) -> Result<()> {
        let window = self.registry.window_mut(id)?;
        window.enabled = enabled;
        debug!("Window {} enabled={}", id, enabled);
        if !enabled {
            self.unset_focused_window(id);
        }
        Ok(())
    }

    pub fn set_focusable(&mut self, id: WindowId, focusable: bool) -> Result<bool> {
        let window = self.registry.window(id)?;
        if window.focusable == focusable {
            return Ok(false);
        }
        if !focusable && self.focus.focused_window == Some(id) {
            self.set_focused_window(None);
            warn!("Window {} stopped being focusable while focused", id);
        }
        self.registry.window_mut(id)?.focusable = focusable;
        Ok(true)
    }

    pub fn minimize(&mut self, id: WindowId, to_minimize: bool) -> Result<bool> {
        self.registry.window(id)?;
        debug!("Minimize window {} to_minimize={}", id, to_minimize);
        if to_minimize {
            self.window_minimize(id)?;
        } else {
            self.window_restore(id)?;
        }
        Ok(true)
    }

    /// `is_maximized` is the consumer's view of the current state; a request
    /// that contradicts it is refused.
    pub fn maximize(&mut self, id: WindowId, to_maximize: bool, is_maximized: bool) -> Result<bool> {
        self.registry.window(id)?;
        debug!(
            "Maximize window {} to_maximize={} is_maximized={}",
            id, to_maximize, is_maximized
        );
        match (to_maximize, is_maximized) {
            (true, false) => self.window_maximize(id)?,
            (false, true) => self.window_restore(id)?,
            _ => {
                let err = LensError::IllegalTransition(format!(
                    "maximize({}) on window {} with is_maximized={}",
                    to_maximize, id, is_maximized
                ));
                warn!("{}", err);
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn enter_fullscreen(&mut self, id: WindowId) -> Result<bool> {
        self.registry.window(id)?;
        self.window_enter_fullscreen(id)?;
        Ok(true)
    }

    pub fn exit_fullscreen(&mut self, id: WindowId) -> Result<bool> {
        self.registry.window(id)?;
        self.window_restore(id)?;
        Ok(true)
    }

    pub fn view_enter_fullscreen(&mut self, view: ViewId) -> Result<bool> {
        match self.view(view)?.parent {
            Some(window) => self.enter_fullscreen(window),
            None => {
                warn!("Fullscreen request on view {} with no parent window", view);
                Ok(false)
            }
        }
    }

    pub fn view_exit_fullscreen(&mut self, view: ViewId) -> Result<bool> {
        match self.view(view)?.parent {
            Some(window) => self.exit_fullscreen(window),
            None => {
                warn!("Exit fullscreen request on view {} with no parent window", view);
                Ok(false)
            }
        }
    }

    fn window_minimize(&mut self, id: WindowId) -> Result<()> {
        match self.registry.window(id)?.state {
            WindowState::Minimized => {
                debug!("Window {} already minimized", id);
                return Ok(());
            }
            WindowState::Fullscreen => self.window_restore(id)?,
            WindowState::Normal | WindowState::Maximized => {}
        }

        let window = self.registry.window_mut(id)?;
        window.cache_bounds();
        let cached = window.cached_bounds;

        let window = self.registry.window(id)?;
        self.platform.window_minimize(window, true);

        let window = self.registry.window_mut(id)?;
        window.state = WindowState::Minimized;

        self.unset_focused_window(id);

        // Stays in the Z-order but is no longer rendered
        self.registry.window_mut(id)?.rendered = false;

        self.emit(Notification::WindowResize {
            window: id,
            kind: WindowEventType::Minimize,
            width: cached.width,
            height: cached.height,
        });
        Ok(())
    }

    fn window_restore(&mut self, id: WindowId) -> Result<()> {
        let window = self.registry.window(id)?;
        let cached = window.cached_bounds;
        let view = window.view;

        match window.state {
            WindowState::Normal => {
                debug!("Window {} already normal, nothing to restore", id);
                return Ok(());
            }
            WindowState::Minimized => {
                self.platform.window_minimize(window, false);
                let window = self.registry.window_mut(id)?;
                window.rendered = window.visible;
            }
            WindowState::Maximized => {}
            WindowState::Fullscreen => {
                if let Some(view) = view {
                    self.emit_view_event(view, ViewEventType::FullscreenExit, cached);
                }
            }
        }

        self.registry.window_mut(id)?.state = WindowState::Normal;
        self.set_bounds_impl(id, cached, BoundsUpdate::POSITION | BoundsUpdate::SIZE)?;

        let bounds = self.registry.window(id)?.bounds;
        self.emit(Notification::WindowResize {
            window: id,
            kind: WindowEventType::Restore,
            width: bounds.width,
            height: bounds.height,
        });

        self.focus_if_eligible(id);
        Ok(())
    }

    fn window_maximize(&mut self, id: WindowId) -> Result<()> {
        match self.registry.window(id)?.state {
            WindowState::Maximized => {
                debug!("Window {} already maximized", id);
                return Ok(());
            }
            WindowState::Minimized | WindowState::Fullscreen => self.window_restore(id)?,
            WindowState::Normal => {}
        }

        self.registry.window_mut(id)?.cache_bounds();
        let bounds = maximized_bounds(self.registry.window(id)?, self.screen());
        debug!("Window {} maximized bounds {:?}", id, bounds);

        self.set_bounds_impl(id, bounds, BoundsUpdate::POSITION | BoundsUpdate::SIZE)?;
        self.registry.window_mut(id)?.state = WindowState::Maximized;

        self.emit(Notification::WindowResize {
            window: id,
            kind: WindowEventType::Maximize,
            width: bounds.width,
            height: bounds.height,
        });
        self.focus_if_eligible(id);
        Ok(())
    }

    fn window_enter_fullscreen(&mut self, id: WindowId) -> Result<()> {
        match self.registry.window(id)?.state {
            WindowState::Fullscreen => {
                debug!("Window {} already fullscreen", id);
                return Ok(());
            }
            WindowState::Minimized => self.window_restore(id)?,
            WindowState::Normal | WindowState::Maximized => {}
        }

        self.registry.window_mut(id)?.cache_bounds();
        let screen = Bounds::new(0, 0, self.screen().width, self.screen().height);
        self.set_bounds_impl(id, screen, BoundsUpdate::POSITION | BoundsUpdate::SIZE)?;

        let window = self.registry.window(id)?;
        if let Some(view) = window.view {
            let bounds = window.bounds;
            self.emit_view_event(view, ViewEventType::FullscreenEnter, bounds);
        }

        self.focus_if_eligible(id);
        self.registry.window_mut(id)?.state = WindowState::Fullscreen;
        Ok(())
    }

    fn focus_if_eligible(&mut self, id: WindowId) {
        let eligible = self
            .registry
            .get(id)
            .is_some_and(|w| w.visible && w.enabled && w.focusable);
        if eligible && self.focus.grabbed_window.is_none_or(|g| g == id) {
            self.set_focused_window(Some(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::testing::*;

    fn resize_events(events: &[Notification]) -> Vec<(WindowEventType, i32, i32)> {
        events
            .iter()
            .filter_map(|n| match n {
                Notification::WindowResize { kind, width, height, .. } => Some((*kind, *width, *height)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn fullscreen_round_trip() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 300, 200));

        assert!(core.enter_fullscreen(a).unwrap());
        let window = core.window(a).unwrap();
        assert_eq!(window.bounds, Bounds::new(0, 0, 800, 600));
        assert_eq!(window.state, WindowState::Fullscreen);
        assert_eq!(window.cached_bounds, Bounds::new(0, 0, 300, 200));

        let view = window.view.unwrap();
        assert!(core.drain_notifications().contains(&Notification::View {
            view,
            kind: ViewEventType::FullscreenEnter,
            x: 0,
            y: 0,
            width: 800,
            height: 600
        }));

        assert!(core.exit_fullscreen(a).unwrap());
        let window = core.window(a).unwrap();
        assert_eq!(window.bounds, Bounds::new(0, 0, 300, 200));
        assert_eq!(window.state, WindowState::Normal);

        let events = core.drain_notifications();
        assert_eq!(
            events[0],
            Notification::View {
                view,
                kind: ViewEventType::FullscreenExit,
                x: 0,
                y: 0,
                width: 300,
                height: 200
            }
        );
        assert_eq!(
            resize_events(&events),
            vec![
                (WindowEventType::Resize, 300, 200),
                (WindowEventType::Restore, 300, 200)
            ]
        );
    }

    #[test]
    fn minimize_round_trip_restores_bounds_and_focus() {
        let mut core = core();
        let other = shown(&mut core, Bounds::new(500, 500, 50, 50));
        let a = shown(&mut core, Bounds::new(20, 30, 300, 200));
        assert_eq!(core.focused_window(), Some(a));

        core.minimize(a, true).unwrap();
        let window = core.window(a).unwrap();
        assert_eq!(window.state, WindowState::Minimized);
        assert!(!window.rendered);
        assert!(core.registry().is_linked(a));
        assert_eq!(core.focused_window(), Some(other));
        assert_eq!(core.find_at_location(25, 35), None);
        assert_eq!(
            resize_events(&core.drain_notifications()),
            vec![(WindowEventType::Minimize, 300, 200)]
        );

        // Already minimized
        core.minimize(a, true).unwrap();
        assert!(core.drain_notifications().is_empty());

        core.minimize(a, false).unwrap();
        let window = core.window(a).unwrap();
        assert_eq!(window.bounds, Bounds::new(20, 30, 300, 200));
        assert_eq!(window.state, WindowState::Normal);
        assert!(window.rendered);
        assert_eq!(core.focused_window(), Some(a));
    }

    #[test]
    fn maximize_round_trip() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(40, 50, 300, 200));

        assert!(core.maximize(a, true, false).unwrap());
        let window = core.window(a).unwrap();
        assert_eq!(window.bounds, Bounds::new(0, 0, 800, 600));
        assert_eq!(window.state, WindowState::Maximized);
        assert_eq!(
            resize_events(&core.drain_notifications()),
            vec![
                (WindowEventType::Resize, 800, 600),
                (WindowEventType::Maximize, 800, 600)
            ]
        );

        assert!(core.maximize(a, false, true).unwrap());
        let window = core.window(a).unwrap();
        assert_eq!(window.bounds, Bounds::new(40, 50, 300, 200));
        assert_eq!(window.state, WindowState::Normal);
    }

    #[test]
    fn contradictory_maximize_is_refused() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 100, 100));
        assert!(!core.maximize(a, true, true).unwrap());
        assert!(!core.maximize(a, false, false).unwrap());
        assert_eq!(core.window(a).unwrap().state, WindowState::Normal);
        assert!(core.drain_notifications().is_empty());
    }

    #[test]
    fn minimized_window_is_restored_before_maximizing() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(10, 10, 100, 100));
        core.minimize(a, true).unwrap();
        core.drain_notifications();

        core.maximize(a, true, false).unwrap();
        let window = core.window(a).unwrap();
        assert_eq!(window.state, WindowState::Maximized);
        assert_eq!(window.cached_bounds, Bounds::new(10, 10, 100, 100));

        let kinds: Vec<WindowEventType> = resize_events(&core.drain_notifications())
            .into_iter()
            .map(|(kind, _, _)| kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                WindowEventType::Restore,
                WindowEventType::Resize,
                WindowEventType::Maximize
            ]
        );
    }

    #[test]
    fn fullscreen_window_is_restored_before_minimizing() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(10, 10, 100, 100));
        core.enter_fullscreen(a).unwrap();
        core.minimize(a, true).unwrap();

        let window = core.window(a).unwrap();
        assert_eq!(window.state, WindowState::Minimized);
        assert_eq!(window.cached_bounds, Bounds::new(10, 10, 100, 100));

        core.minimize(a, false).unwrap();
        assert_eq!(core.window(a).unwrap().bounds, Bounds::new(10, 10, 100, 100));
    }

    #[test]
    fn detached_view_cannot_go_fullscreen() {
        let mut core = core();
        let view = core.create_view().unwrap();
        assert!(!core.view_enter_fullscreen(view).unwrap());
        assert!(!core.view_exit_fullscreen(view).unwrap());
    }

    #[test]
    fn view_fullscreen_targets_parent_window() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 10, 10));
        let view = core.window(a).unwrap().view.unwrap();
        assert!(core.view_enter_fullscreen(view).unwrap());
        assert_eq!(core.window(a).unwrap().state, WindowState::Fullscreen);
        assert!(core.view_exit_fullscreen(view).unwrap());
        assert_eq!(core.window(a).unwrap().bounds, Bounds::new(0, 0, 10, 10));
    }

    #[test]
    fn disabling_focused_window_moves_focus() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 10, 10));
        let b = shown(&mut core, Bounds::new(0, 0, 10, 10));
        core.set_enabled(b, false).unwrap();
        assert_eq!(core.focused_window(), Some(a));
        assert_eq!(core.find_at_location(5, 5).map(|(w, _, _)| w), Some(a));
    }
}
