//! Stacking Module
//!
//! Window registry: an arena of window records keyed by handle, threaded into
//! a doubly linked Z-order list through `prev`/`next` handle fields.
//! Head is the back-most window, tail is closest to the user.

use std::collections::HashMap;
use tracing::{debug, trace, warn};

use crate::error::{LensError, Result};
use crate::wm::window::{Window, WindowId, WindowState};

/// Window registry
pub struct WindowRegistry {
    /// All live windows, linked or not
    windows: HashMap<WindowId, Window>,

    /// Back of the stacking order
    head: Option<WindowId>,

    /// Front of the stacking order
    tail: Option<WindowId>,

    /// Number of linked windows
    count: usize,

    next_id: u32,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self {
            windows: HashMap::new(),
            head: None,
            tail: None,
            count: 0,
            next_id: 1,
        }
    }

    /// Reserve a fresh handle.
    pub fn allocate_id(&mut self) -> Result<WindowId> {
        let id = self.next_id;
        self.next_id = id
            .checked_add(1)
            .ok_or_else(|| LensError::ResourceExhausted("window handles".into()))?;
        Ok(WindowId(id))
    }

    /// Store a record in the arena without linking it.
    pub fn insert(&mut self, window: Window) {
        self.windows.insert(window.id, window);
    }

    /// Unlink (if needed) and drop a record from the arena.
    pub fn take(&mut self, id: WindowId) -> Option<Window> {
        self.remove(id);
        self.windows.remove(&id)
    }

    pub fn get(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(&id)
    }

    pub fn get_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.windows.get_mut(&id)
    }

    /// Lookup that turns an unknown handle into `InvalidHandle`.
    pub fn window(&self, id: WindowId) -> Result<&Window> {
        self.windows.get(&id).ok_or(LensError::window(id.0))
    }

    pub fn window_mut(&mut self, id: WindowId) -> Result<&mut Window> {
        self.windows.get_mut(&id).ok_or(LensError::window(id.0))
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.windows.contains_key(&id)
    }

    pub fn head(&self) -> Option<WindowId> {
        self.head
    }

    pub fn tail(&self) -> Option<WindowId> {
        self.tail
    }

    /// Number of windows in the stacking order
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append at the tail (front-most).
    pub fn add(&mut self, id: WindowId) -> bool {
        let old_tail = self.tail;
        match self.windows.get_mut(&id) {
            Some(window) if !window.linked => {
                window.prev = old_tail;
                window.next = None;
                window.linked = true;
            }
            Some(_) => {
                warn!("Window {} already in the stacking order", id);
                return false;
            }
            None => {
                warn!("Cannot add unknown window {}", id);
                return false;
            }
        }

        match old_tail.and_then(|t| self.windows.get_mut(&t)) {
            Some(tail) => tail.next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.count += 1;
        debug!("Window {} added, {} windows stacked", id, self.count);
        true
    }

    /// Unlink from wherever the window is in the order.
    pub fn remove(&mut self, id: WindowId) -> bool {
        let (prev, next) = match self.windows.get_mut(&id) {
            Some(window) if window.linked => {
                let links = (window.prev, window.next);
                window.prev = None;
                window.next = None;
                window.linked = false;
                links
            }
            _ => {
                debug!("Window {} not in the stacking order, nothing to remove", id);
                return false;
            }
        };

        match prev.and_then(|p| self.windows.get_mut(&p)) {
            Some(p) => p.next = next,
            None => self.head = next,
        }
        match next.and_then(|n| self.windows.get_mut(&n)) {
            Some(n) => n.prev = prev,
            None => self.tail = prev,
        }
        self.count -= 1;
        true
    }

    /// Move to the tail. Returns whether the order changed.
    pub fn to_front(&mut self, id: WindowId) -> bool {
        if self.tail == Some(id) || !self.is_linked(id) {
            return false;
        }
        self.remove(id);
        self.add(id)
    }

    /// Move to the head. Returns whether the order changed.
    pub fn to_back(&mut self, id: WindowId) -> bool {
        if self.head == Some(id) || !self.is_linked(id) {
            return false;
        }
        self.remove(id);

        let old_head = self.head;
        if let Some(window) = self.windows.get_mut(&id) {
            window.prev = None;
            window.next = old_head;
            window.linked = true;
        }
        match old_head.and_then(|h| self.windows.get_mut(&h)) {
            Some(head) => head.prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.count += 1;
        true
    }

    pub fn is_linked(&self, id: WindowId) -> bool {
        self.windows.get(&id).is_some_and(|w| w.linked)
    }

    /// Stacked windows from the tail (front) to the head (back).
    pub fn front_to_back(&self) -> FrontToBack<'_> {
        FrontToBack {
            registry: self,
            cursor: self.tail,
        }
    }

    /// Topmost visible, enabled, non-minimized window containing the point,
    /// with the point translated into its coordinates.
    pub fn find_at_location(&self, abs_x: i32, abs_y: i32) -> Option<(WindowId, i32, i32)> {
        self.scan(abs_x, abs_y, Window::is_hittable)
    }

    /// Like `find_at_location` but also reports disabled windows, so input
    /// landing on them can be rejected instead of falling through.
    pub fn window_under(&self, abs_x: i32, abs_y: i32) -> Option<(WindowId, i32, i32)> {
        self.scan(abs_x, abs_y, |w| w.visible && w.state != WindowState::Minimized)
    }

    fn scan(
        &self,
        abs_x: i32,
        abs_y: i32,
        eligible: impl Fn(&Window) -> bool,
    ) -> Option<(WindowId, i32, i32)> {
        for window in self.front_to_back() {
            if !eligible(window) {
                trace!("Skipping window {}", window.id);
                continue;
            }
            if window.bounds.contains(abs_x, abs_y) {
                let (rel_x, rel_y) = window.bounds.relative(abs_x, abs_y);
                trace!(
                    "({}, {}) is on window {} at ({}, {})",
                    abs_x, abs_y, window.id, rel_x, rel_y
                );
                return Some((window.id, rel_x, rel_y));
            }
        }
        trace!("({}, {}) is not on a window", abs_x, abs_y);
        None
    }

    /// Windows whose owner is `id`.
    pub fn owned_by(&self, id: WindowId) -> Vec<WindowId> {
        let mut owned: Vec<WindowId> = self
            .windows
            .values()
            .filter(|w| w.owner == Some(id))
            .map(|w| w.id)
            .collect();
        owned.sort();
        owned
    }

    pub fn ids(&self) -> Vec<WindowId> {
        let mut ids: Vec<WindowId> = self.windows.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FrontToBack<'a> {
    registry: &'a WindowRegistry,
    cursor: Option<WindowId>,
}

impl<'a> Iterator for FrontToBack<'a> {
    type Item = &'a Window;

    fn next(&mut self) -> Option<Self::Item> {
        let window = self.registry.windows.get(&self.cursor?)?;
        self.cursor = window.prev;
        Some(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Bounds;
    use crate::wm::window::CreationFlags;

    fn push(registry: &mut WindowRegistry, bounds: Bounds) -> WindowId {
        let id = registry.allocate_id().unwrap();
        let mut window = Window::new(id, None, id, CreationFlags::empty());
        window.bounds = bounds;
        window.visible = true;
        registry.insert(window);
        registry.add(id);
        id
    }

    fn order(registry: &WindowRegistry) -> Vec<u32> {
        registry.front_to_back().map(|w| w.id.0).collect()
    }

    #[test]
    fn topmost_window_wins_hit_test() {
        let mut registry = WindowRegistry::new();
        let a = push(&mut registry, Bounds::new(0, 0, 50, 50));
        let b = push(&mut registry, Bounds::new(25, 25, 50, 50));
        assert_eq!(a, WindowId(1));
        assert_eq!(registry.find_at_location(30, 30), Some((b, 5, 5)));
        assert_eq!(registry.find_at_location(10, 10), Some((a, 10, 10)));
        assert_eq!(registry.find_at_location(200, 200), None);
    }

    #[test]
    fn reorder_changes_hit_test() {
        let mut registry = WindowRegistry::new();
        let a = push(&mut registry, Bounds::new(0, 0, 50, 50));
        let b = push(&mut registry, Bounds::new(25, 25, 50, 50));

        assert!(registry.to_front(a));
        assert!(!registry.to_front(a));
        assert_eq!(registry.find_at_location(30, 30), Some((a, 30, 30)));

        assert!(registry.to_back(a));
        assert!(!registry.to_back(a));
        assert_eq!(registry.find_at_location(30, 30), Some((b, 5, 5)));
        assert_eq!(registry.head(), Some(a));
        assert_eq!(registry.tail(), Some(b));
    }

    #[test]
    fn hidden_disabled_and_minimized_windows_are_skipped() {
        let mut registry = WindowRegistry::new();
        let a = push(&mut registry, Bounds::new(0, 0, 100, 100));
        let b = push(&mut registry, Bounds::new(0, 0, 100, 100));

        registry.get_mut(b).unwrap().enabled = false;
        assert_eq!(registry.find_at_location(1, 1), Some((a, 1, 1)));
        assert_eq!(registry.window_under(1, 1), Some((b, 1, 1)));

        registry.get_mut(b).unwrap().enabled = true;
        registry.get_mut(b).unwrap().state = WindowState::Minimized;
        assert_eq!(registry.find_at_location(1, 1), Some((a, 1, 1)));

        registry.get_mut(a).unwrap().visible = false;
        assert_eq!(registry.find_at_location(1, 1), None);
    }

    #[test]
    fn remove_relinks_neighbours() {
        let mut registry = WindowRegistry::new();
        let a = push(&mut registry, Bounds::default());
        let b = push(&mut registry, Bounds::default());
        let c = push(&mut registry, Bounds::default());

        assert!(registry.remove(b));
        assert!(!registry.remove(b));
        assert_eq!(order(&registry), vec![c.0, a.0]);
        assert_eq!(registry.len(), 2);

        assert!(registry.take(c).is_some());
        assert_eq!(registry.tail(), Some(a));
        assert_eq!(registry.head(), Some(a));

        registry.remove(a);
        assert!(registry.is_empty());
        assert_eq!(registry.head(), None);
        assert_eq!(registry.tail(), None);
    }

    #[test]
    fn arbitrary_sequences_keep_list_consistent() {
        let mut registry = WindowRegistry::new();
        let ids: Vec<WindowId> = (0..5)
            .map(|i| push(&mut registry, Bounds::new(i * 10, 0, 100, 100)))
            .collect();

        registry.to_back(ids[3]);
        registry.to_front(ids[0]);
        registry.remove(ids[2]);
        registry.to_back(ids[4]);
        registry.add(ids[2]);

        assert_eq!(order(&registry), vec![3, 1, 2, 4, 5]);
        assert_eq!(registry.len(), 5);

        let top = registry.tail().unwrap();
        let found = registry.find_at_location(45, 5).unwrap().0;
        assert_eq!(found, top);
    }

    #[test]
    fn handles_are_never_reused() {
        let mut registry = WindowRegistry::new();
        let a = push(&mut registry, Bounds::default());
        registry.take(a);
        let b = push(&mut registry, Bounds::default());
        assert_ne!(a, b);
    }
}
