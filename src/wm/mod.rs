//! Window Manager Module
//!
//! `WmCore` owns every piece of window-manager state (registry, views, focus,
//! pointer) and runs the operations single-threaded, queueing notifications in
//! an outbox. `WindowManager` wraps it for sharing between the consumer, the
//! input thread and painters: each call locks the core, runs, drains the
//! outbox, unlocks, and only then hands the notifications to the sink.

pub mod focus;
pub mod keyboard;
pub mod moveresize;
pub mod pointer;
pub mod screen;
pub mod stacking;
pub mod state;
pub mod view;
pub mod window;

use anyhow::Context;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, trace, warn};

use crate::error::{LensError, Result};
use crate::events::{
    EventSink, MouseButton, Notification, ViewEventType, WindowEventType,
};
use crate::input::device::DeviceFlags;
use crate::input::touch::TouchReport;
use crate::platform::Platform;
use crate::shared::Bounds;

pub use focus::FocusManager;
pub use keyboard::KeyboardState;
pub use moveresize::BoundsUpdate;
pub use pointer::PointerState;
pub use screen::Screen;
pub use stacking::WindowRegistry;
pub use view::{View, ViewId};
pub use window::{CreationFlags, SizeLimits, Window, WindowId, WindowState};

/// Single-owner window manager state
pub struct WmCore {
    screen: Screen,

    pub(crate) registry: WindowRegistry,

    pub(crate) views: HashMap<ViewId, View>,
    next_view_id: u32,

    pub(crate) focus: FocusManager,
    pub(crate) pointer: PointerState,
    pub(crate) keyboard: KeyboardState,

    pub(crate) platform: Box<dyn Platform>,

    /// Notifications produced by the running operation
    outbox: Vec<Notification>,
}

impl WmCore {
    /// Initialize the screen and place the pointer at its centre.
    pub fn new(mut platform: Box<dyn Platform>) -> anyhow::Result<Self> {
        let screen = platform
            .screen_initialize()
            .context("Failed to initialize screen")?;
        platform.screen_clear();

        let (x, y) = screen.center();
        platform.cursor_set_position(x, y);

        info!(
            "Screen {}x{} depth {} on {} platform",
            screen.width,
            screen.height,
            screen.depth,
            platform.name()
        );

        Ok(Self {
            screen,
            registry: WindowRegistry::new(),
            views: HashMap::new(),
            next_view_id: 1,
            focus: FocusManager::new(),
            pointer: PointerState::new(x, y),
            keyboard: KeyboardState::new(),
            platform,
            outbox: Vec::new(),
        })
    }

    pub(crate) fn emit(&mut self, notification: Notification) {
        trace!("Notify {:?}", notification);
        self.outbox.push(notification);
    }

    pub(crate) fn emit_window_event(&mut self, window: WindowId, kind: WindowEventType) {
        self.emit(Notification::Window { window, kind });
    }

    pub(crate) fn emit_view_event(&mut self, view: ViewId, kind: ViewEventType, bounds: Bounds) {
        self.emit(Notification::View {
            view,
            kind,
            x: bounds.x,
            y: bounds.y,
            width: bounds.width,
            height: bounds.height,
        });
    }

    /// Take everything queued since the last drain.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn registry(&self) -> &WindowRegistry {
        &self.registry
    }

    pub fn window(&self, id: WindowId) -> Result<&Window> {
        self.registry.window(id)
    }

    pub fn view(&self, id: ViewId) -> Result<&View> {
        self.views.get(&id).ok_or(LensError::view(id.0))
    }

    /// Create a window at the front of the stacking order. New windows are
    /// Normal, invisible, enabled and focusable.
    pub fn create_window(&mut self, owner: Option<WindowId>, flags: CreationFlags) -> Result<WindowId> {
        let owner_root = match owner {
            Some(owner) => Some(self.registry.window(owner)?.root),
            None => None,
        };

        let id = self.registry.allocate_id()?;
        let window = Window::new(id, owner, owner_root.unwrap_or(id), flags);

        self.platform.window_create(&window)?;
        self.registry.insert(window);
        self.registry.add(id);

        debug!(
            "Created window {} (owner {:?}, root {}) flags {:?}",
            id,
            owner,
            owner_root.unwrap_or(id),
            flags
        );
        Ok(id)
    }

    /// Close a window and, first, every window it owns.
    pub fn close_window(&mut self, id: WindowId) -> Result<()> {
        self.registry.window(id)?;

        for owned in self.registry.owned_by(id) {
            self.close_window(owned)?;
        }

        debug!("Closing window {}", id);

        if let Some(view) = self.registry.window(id)?.view {
            self.set_view_parent(view, None)?;
        }

        // Out of the stacking order before focus moves on, so it cannot be
        // picked as the next focus owner.
        if let Some(window) = self.registry.get_mut(id) {
            window.visible = false;
            window.rendered = false;
        }
        self.registry.remove(id);

        self.unset_focused_window(id);
        self.pointer.forget_window(id);
        if self.focus.grabbed_window == Some(id) {
            self.focus.grabbed_window = None;
        }

        self.emit_window_event(id, WindowEventType::Close);
        self.emit_window_event(id, WindowEventType::Destroy);

        if let Some(window) = self.registry.take(id) {
            self.platform.window_release(&window);
        }

        if let Some(head) = self.registry.head() {
            if self.registry.get(head).is_some_and(|w| w.view.is_some()) {
                self.repaint(head);
            }
        }
        Ok(())
    }

    /// Set opacity, clamped to 0.0..=1.0.
    pub fn set_alpha(&mut self, id: WindowId, alpha: f32) -> Result<()> {
        let window = self.registry.window_mut(id)?;
        window.alpha = if alpha.is_nan() { 1.0 } else { alpha.clamp(0.0, 1.0) };
        debug!("Window {} alpha {}", id, window.alpha);
        Ok(())
    }

    pub fn to_front(&mut self, id: WindowId) -> Result<bool> {
        self.registry.window(id)?;
        let moved = self.registry.to_front(id);
        if moved {
            self.repaint(id);
        }
        Ok(moved)
    }

    pub fn to_back(&mut self, id: WindowId) -> Result<bool> {
        self.registry.window(id)?;
        let moved = self.registry.to_back(id);
        if moved {
            self.repaint(id);
        }
        Ok(moved)
    }

    pub fn find_at_location(&self, abs_x: i32, abs_y: i32) -> Option<(WindowId, i32, i32)> {
        self.registry.find_at_location(abs_x, abs_y)
    }

    pub fn create_view(&mut self) -> Result<ViewId> {
        let id = ViewId(self.next_view_id);
        self.next_view_id = self
            .next_view_id
            .checked_add(1)
            .ok_or_else(|| LensError::ResourceExhausted("view handles".into()))?;

        let view = View::new(id);
        self.platform.view_create(&view)?;
        self.views.insert(id, view);
        debug!("Created view {}", id);
        Ok(id)
    }

    /// Move a view to another window (or detach it with `None`).
    pub fn set_view_parent(&mut self, view: ViewId, parent: Option<WindowId>) -> Result<()> {
        if let Some(parent) = parent {
            self.registry.window(parent)?;
        }
        let old_parent = self.view(view)?.parent;

        if let Some(old) = old_parent {
            let holds_view = match self.registry.get_mut(old) {
                Some(window) if window.view == Some(view) => {
                    window.view = None;
                    true
                }
                _ => false,
            };
            if holds_view {
                self.emit_view_event(view, ViewEventType::Remove, Bounds::default());
            }
        }

        if let Some(parent) = parent {
            // A window holds at most one view
            let displaced = self.registry.get(parent).and_then(|w| w.view);
            if let Some(displaced) = displaced.filter(|d| *d != view) {
                warn!("Window {} already has view {}, detaching it", parent, displaced);
                if let Some(v) = self.views.get_mut(&displaced) {
                    v.parent = None;
                }
            }
            if let Some(window) = self.registry.get_mut(parent) {
                window.view = Some(view);
            }
        }

        if let Some(v) = self.views.get_mut(&view) {
            v.parent = parent;
        }
        debug!("View {} parent {:?} -> {:?}", view, old_parent, parent);

        if parent.is_some() {
            self.emit_view_event(view, ViewEventType::Add, Bounds::default());
        }
        Ok(())
    }

    /// Give `window` its content view.
    pub fn attach_view(&mut self, window: WindowId, view: ViewId) -> Result<()> {
        self.set_view_parent(view, Some(window))
    }

    pub fn release_view(&mut self, view: ViewId) -> Result<()> {
        if self.view(view)?.parent.is_some() {
            self.set_view_parent(view, None)?;
        }
        if let Some(v) = self.views.remove(&view) {
            self.platform.view_release(&v);
        }
        debug!("Released view {}", view);
        Ok(())
    }

    pub fn notify_device(&mut self, flags: DeviceFlags, attached: bool) {
        info!("Device {:?} {}", flags, if attached { "attached" } else { "detached" });
        self.emit(Notification::Device { flags, attached });
    }

    pub fn shutdown(&mut self) {
        info!("Window manager shutting down");
        self.platform.shutdown();
    }
}

/// Thread-safe window manager handle
pub struct WindowManager {
    core: Mutex<WmCore>,

    /// Held during screen clear + repaint and by painters between
    /// `draw_begin` and dropping the guard. Always taken before `core`.
    render: Mutex<()>,

    sink: Arc<dyn EventSink>,
}

impl WindowManager {
    pub fn new(core: WmCore, sink: Arc<dyn EventSink>) -> Self {
        Self {
            core: Mutex::new(core),
            render: Mutex::new(()),
            sink,
        }
    }

    pub fn initialize(platform: Box<dyn Platform>, sink: Arc<dyn EventSink>) -> anyhow::Result<Self> {
        Ok(Self::new(WmCore::new(platform)?, sink))
    }

    fn lock_core(&self) -> MutexGuard<'_, WmCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_render(&self) -> MutexGuard<'_, ()> {
        self.render.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the core, then deliver its notifications with no lock held.
    pub fn update<R>(&self, f: impl FnOnce(&mut WmCore) -> R) -> R {
        let (result, pending) = {
            let mut core = self.lock_core();
            let result = f(&mut core);
            (result, core.drain_notifications())
        };
        self.dispatch(pending);
        result
    }

    /// `update` for operations that may clear and repaint the screen.
    fn update_rendering<R>(&self, f: impl FnOnce(&mut WmCore) -> R) -> R {
        let (result, pending) = {
            let _render = self.lock_render();
            let mut core = self.lock_core();
            let result = f(&mut core);
            (result, core.drain_notifications())
        };
        self.dispatch(pending);
        result
    }

    /// Read-only access to the core.
    pub fn read<R>(&self, f: impl FnOnce(&WmCore) -> R) -> R {
        f(&self.lock_core())
    }

    fn dispatch(&self, pending: Vec<Notification>) {
        for notification in pending {
            if let Err(e) = self.sink.notify(notification) {
                self.sink.report_error(&e);
            }
        }
    }

    /// Hold the render lock while painting a view.
    pub fn draw_begin(&self) -> MutexGuard<'_, ()> {
        trace!("draw begin");
        self.lock_render()
    }

    pub fn screen(&self) -> Screen {
        self.read(|core| core.screen().clone())
    }

    pub fn screen_size(&self) -> (i32, i32) {
        self.read(|core| (core.screen().width, core.screen().height))
    }

    /// Copy of a window record.
    pub fn window(&self, id: WindowId) -> Result<Window> {
        self.read(|core| core.window(id).cloned())
    }

    pub fn create_window(&self, owner: Option<WindowId>, flags: CreationFlags) -> Result<WindowId> {
        self.update(|core| core.create_window(owner, flags))
    }

    pub fn close_window(&self, id: WindowId) -> Result<()> {
        self.update_rendering(|core| core.close_window(id))
    }

    pub fn set_bounds(&self, id: WindowId, bounds: Bounds, update: BoundsUpdate) -> Result<()> {
        self.update_rendering(|core| core.set_bounds(id, bounds, update))
    }

    pub fn set_minimum_size(&self, id: WindowId, width: i32, height: i32) -> Result<bool> {
        self.update_rendering(|core| core.set_minimum_size(id, width, height))
    }

    pub fn set_maximum_size(&self, id: WindowId, width: i32, height: i32) -> Result<bool> {
        self.update_rendering(|core| core.set_maximum_size(id, width, height))
    }

    pub fn request_repaint(&self, id: WindowId) -> Result<()> {
        self.update_rendering(|core| core.request_repaint(id))
    }

    pub fn set_visible(&self, id: WindowId, visible: bool) -> Result<bool> {
        self.update(|core| core.set_visible(id, visible))
    }

    pub fn set_enabled(&self, id: WindowId, enabled: bool) -> Result<()> {
        self.update(|core| core.set_enabled(id, enabled))
    }

    pub fn set_focusable(&self, id: WindowId, focusable: bool) -> Result<bool> {
        self.update(|core| core.set_focusable(id, focusable))
    }

    pub fn set_alpha(&self, id: WindowId, alpha: f32) -> Result<()> {
        self.update(|core| core.set_alpha(id, alpha))
    }

    pub fn minimize(&self, id: WindowId, to_minimize: bool) -> Result<bool> {
        self.update_rendering(|core| core.minimize(id, to_minimize))
    }

    pub fn maximize(&self, id: WindowId, to_maximize: bool, is_maximized: bool) -> Result<bool> {
        self.update_rendering(|core| core.maximize(id, to_maximize, is_maximized))
    }

    pub fn enter_fullscreen(&self, id: WindowId) -> Result<bool> {
        self.update_rendering(|core| core.enter_fullscreen(id))
    }

    pub fn exit_fullscreen(&self, id: WindowId) -> Result<bool> {
        self.update_rendering(|core| core.exit_fullscreen(id))
    }

    pub fn view_enter_fullscreen(&self, view: ViewId) -> Result<bool> {
        self.update_rendering(|core| core.view_enter_fullscreen(view))
    }

    pub fn view_exit_fullscreen(&self, view: ViewId) -> Result<bool> {
        self.update_rendering(|core| core.view_exit_fullscreen(view))
    }

    pub fn to_front(&self, id: WindowId) -> Result<bool> {
        self.update_rendering(|core| core.to_front(id))
    }

    pub fn to_back(&self, id: WindowId) -> Result<bool> {
        self.update_rendering(|core| core.to_back(id))
    }

    pub fn request_focus(&self, id: WindowId) -> Result<bool> {
        self.update(|core| core.request_focus(id))
    }

    pub fn grab_focus(&self, id: WindowId) -> Result<bool> {
        self.update(|core| core.grab_focus(id))
    }

    pub fn ungrab_focus(&self, id: WindowId) -> Result<()> {
        self.update(|core| core.ungrab_focus(id))
    }

    pub fn focused_window(&self) -> Option<WindowId> {
        self.read(|core| core.focused_window())
    }

    pub fn grabbed_window(&self) -> Option<WindowId> {
        self.read(|core| core.grabbed_window())
    }

    pub fn find_at_location(&self, abs_x: i32, abs_y: i32) -> Option<(WindowId, i32, i32)> {
        self.read(|core| core.find_at_location(abs_x, abs_y))
    }

    pub fn create_view(&self) -> Result<ViewId> {
        self.update(|core| core.create_view())
    }

    pub fn set_view_parent(&self, view: ViewId, parent: Option<WindowId>) -> Result<()> {
        self.update(|core| core.set_view_parent(view, parent))
    }

    pub fn attach_view(&self, window: WindowId, view: ViewId) -> Result<()> {
        self.update(|core| core.attach_view(window, view))
    }

    pub fn release_view(&self, view: ViewId) -> Result<()> {
        self.update(|core| core.release_view(view))
    }

    pub fn notify_motion(&self, x: i32, y: i32) {
        self.update(|core| core.notify_motion(x, y))
    }

    pub fn notify_button(&self, pressed: bool, button: MouseButton, x: i32, y: i32) {
        self.update(|core| core.notify_button(pressed, button, x, y))
    }

    pub fn notify_scroll(&self, x: i32, y: i32, delta_x: f64, delta_y: f64) {
        self.update(|core| core.notify_scroll(x, y, delta_x, delta_y))
    }

    pub fn notify_multi_touch(&self, report: &TouchReport) {
        self.update(|core| core.notify_multi_touch(report))
    }

    pub fn notify_key(&self, code: u16, value: i32) {
        self.update(|core| core.notify_key(code, value))
    }

    pub fn notify_device(&self, flags: DeviceFlags, attached: bool) {
        self.update(|core| core.notify_device(flags, attached))
    }

    pub fn dnd_started(&self) {
        self.update(|core| core.dnd_started())
    }

    pub fn dnd_ended(&self) {
        self.update(|core| core.dnd_ended())
    }

    pub fn pointer_position(&self) -> (i32, i32) {
        self.read(|core| core.pointer_position())
    }

    pub fn set_pointer_position(&self, x: i32, y: i32) {
        self.update(|core| core.set_pointer_position(x, y))
    }

    pub fn shutdown(&self) {
        self.update_rendering(|core| core.shutdown())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::platform::HeadlessPlatform;

    /// 800x600 headless core
    pub fn core() -> WmCore {
        WmCore::new(Box::new(HeadlessPlatform::new(Screen::new(800, 600, 32)))).unwrap()
    }

    /// Visible top-level window with a view and the given bounds.
    pub fn shown(core: &mut WmCore, bounds: Bounds) -> WindowId {
        shown_owned(core, None, bounds)
    }

    pub fn shown_owned(core: &mut WmCore, owner: Option<WindowId>, bounds: Bounds) -> WindowId {
        let id = core.create_window(owner, CreationFlags::empty()).unwrap();
        let view = core.create_view().unwrap();
        core.attach_view(id, view).unwrap();
        core.set_bounds(id, bounds, BoundsUpdate::POSITION | BoundsUpdate::SIZE)
            .unwrap();
        core.set_visible(id, true).unwrap();
        core.drain_notifications();
        id
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::events::RecordingSink;
    use crate::platform::{HeadlessPlatform, PlatformCall};

    #[test]
    fn unknown_handles_are_reported() {
        let mut core = core();
        let err = core.close_window(WindowId(42)).unwrap_err();
        assert!(matches!(err, LensError::InvalidHandle { id: 42, .. }));
        assert!(core.create_window(Some(WindowId(9)), CreationFlags::empty()).is_err());
        assert!(core.registry().is_empty());
    }

    #[test]
    fn owned_windows_share_the_owner_root() {
        let mut core = core();
        let a = core.create_window(None, CreationFlags::empty()).unwrap();
        let popup = core.create_window(Some(a), CreationFlags::POPUP).unwrap();
        let nested = core.create_window(Some(popup), CreationFlags::POPUP).unwrap();
        assert_eq!(core.window(nested).unwrap().root, a);
        assert_eq!(core.window(a).unwrap().root, a);
    }

    #[test]
    fn close_cascades_to_owned_windows() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 100, 100));
        let popup = shown_owned(&mut core, Some(a), Bounds::new(10, 10, 20, 20));
        let b = shown(&mut core, Bounds::new(200, 200, 50, 50));

        core.request_focus(a).unwrap();
        core.drain_notifications();

        core.close_window(a).unwrap();
        assert!(core.window(a).is_err());
        assert!(core.window(popup).is_err());
        assert_eq!(core.registry().len(), 1);
        assert_eq!(core.focused_window(), Some(b));

        let events = core.drain_notifications();
        let close_popup = events
            .iter()
            .position(|n| *n == Notification::Window { window: popup, kind: WindowEventType::Close })
            .unwrap();
        let close_a = events
            .iter()
            .position(|n| *n == Notification::Window { window: a, kind: WindowEventType::Close })
            .unwrap();
        let destroy_a = events
            .iter()
            .position(|n| *n == Notification::Window { window: a, kind: WindowEventType::Destroy })
            .unwrap();
        assert!(close_popup < close_a);
        assert!(close_a < destroy_a);
        assert!(events.contains(&Notification::Window {
            window: b,
            kind: WindowEventType::FocusGained
        }));
    }

    #[test]
    fn close_detaches_view_and_clears_pointer_state() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 100, 100));
        let view = core.window(a).unwrap().view.unwrap();
        core.notify_motion(10, 10);
        assert_eq!(core.pointer.mouse_window, Some(a));

        core.close_window(a).unwrap();
        assert_eq!(core.pointer.mouse_window, None);
        assert_eq!(core.view(view).unwrap().parent, None);
    }

    #[test]
    fn reparenting_a_view_emits_remove_then_add() {
        let mut core = core();
        let a = core.create_window(None, CreationFlags::empty()).unwrap();
        let b = core.create_window(None, CreationFlags::empty()).unwrap();
        let view = core.create_view().unwrap();

        core.set_view_parent(view, Some(a)).unwrap();
        core.drain_notifications();
        core.set_view_parent(view, Some(b)).unwrap();

        let kinds: Vec<ViewEventType> = core
            .drain_notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::View { kind, .. } => Some(kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![ViewEventType::Remove, ViewEventType::Add]);
        assert_eq!(core.window(a).unwrap().view, None);
        assert_eq!(core.window(b).unwrap().view, Some(view));
    }

    #[test]
    fn alpha_is_clamped() {
        let mut core = core();
        let a = core.create_window(None, CreationFlags::TRANSPARENT).unwrap();
        core.set_alpha(a, 1.7).unwrap();
        assert_eq!(core.window(a).unwrap().alpha, 1.0);
        core.set_alpha(a, -0.5).unwrap();
        assert_eq!(core.window(a).unwrap().alpha, 0.0);
    }

    #[test]
    fn to_front_repaints_only_when_order_changes() {
        let mut core = core();
        let a = shown(&mut core, Bounds::new(0, 0, 10, 10));
        let b = shown(&mut core, Bounds::new(0, 0, 10, 10));

        assert!(!core.to_front(b).unwrap());
        assert!(core.drain_notifications().is_empty());

        assert!(core.to_front(a).unwrap());
        let view = core.window(a).unwrap().view.unwrap();
        assert_eq!(
            core.drain_notifications(),
            vec![Notification::View {
                view,
                kind: ViewEventType::Repaint,
                x: 0,
                y: 0,
                width: 10,
                height: 10
            }]
        );
    }

    #[test]
    fn handle_flushes_to_sink_after_unlocking() {
        let sink = Arc::new(RecordingSink::new());
        let platform = HeadlessPlatform::new(Screen::new(640, 480, 16));
        let calls = platform.calls();
        let wm = WindowManager::initialize(Box::new(platform), sink.clone()).unwrap();

        let a = wm.create_window(None, CreationFlags::empty()).unwrap();
        wm.set_visible(a, true).unwrap();

        assert_eq!(wm.focused_window(), Some(a));
        assert_eq!(
            sink.take(),
            vec![Notification::Window { window: a, kind: WindowEventType::FocusGained }]
        );
        assert_eq!(wm.screen_size(), (640, 480));
        assert_eq!(wm.pointer_position(), (320, 240));

        let calls = calls.lock().unwrap();
        assert!(calls.contains(&PlatformCall::WindowCreate(a)));
        assert!(calls.contains(&PlatformCall::WindowSetVisible(a, true)));
    }

    struct ReentrantSink {
        wm: Mutex<Option<Arc<WindowManager>>>,
        seen: Mutex<Vec<Option<WindowId>>>,
    }

    impl EventSink for ReentrantSink {
        fn notify(&self, _notification: Notification) -> Result<()> {
            let wm = self.wm.lock().unwrap().clone();
            if let Some(wm) = wm {
                // Would deadlock if the state lock were still held
                let focused = wm.focused_window();
                self.seen.lock().unwrap().push(focused);
            }
            Ok(())
        }
    }

    #[test]
    fn sink_may_reenter_the_window_manager() {
        let sink = Arc::new(ReentrantSink {
            wm: Mutex::new(None),
            seen: Mutex::new(Vec::new()),
        });
        let wm = Arc::new(
            WindowManager::initialize(Box::new(HeadlessPlatform::default()), sink.clone()).unwrap(),
        );
        *sink.wm.lock().unwrap() = Some(wm.clone());

        let a = wm.create_window(None, CreationFlags::empty()).unwrap();
        wm.set_visible(a, true).unwrap();
        assert_eq!(*sink.seen.lock().unwrap(), vec![Some(a)]);

        *sink.wm.lock().unwrap() = None;
    }

    struct FailingSink {
        errors: Mutex<usize>,
    }

    impl EventSink for FailingSink {
        fn notify(&self, _notification: Notification) -> Result<()> {
            Err(LensError::Sink("rejected".into()))
        }

        fn report_error(&self, _err: &LensError) {
            *self.errors.lock().unwrap() += 1;
        }
    }

    #[test]
    fn delivery_failures_are_reported_and_processing_continues() {
        let sink = Arc::new(FailingSink { errors: Mutex::new(0) });
        let wm = WindowManager::initialize(Box::new(HeadlessPlatform::default()), sink.clone()).unwrap();

        let a = wm.create_window(None, CreationFlags::empty()).unwrap();
        let b = wm.create_window(None, CreationFlags::empty()).unwrap();
        wm.set_visible(a, true).unwrap();
        wm.set_visible(b, true).unwrap();

        // GAINED a, then LOST a + GAINED b
        assert_eq!(*sink.errors.lock().unwrap(), 3);
        assert_eq!(wm.focused_window(), Some(b));
    }
}
