//! Touch point tracking across frames
//!
//! Gives each point reported by a touch device a stable identity, classifies
//! it against the previous frame, and picks the primary point that mouse
//! events are synthesized from.

use tracing::{debug, trace};

use crate::config::InputConfig;
use crate::events::TouchState;

/// Touch points tracked per frame; further points are dropped
pub const MAX_TOUCH_POINTS: usize = 20;

/// Id given to the single point of a collapsed (single-touch) report
const COLLAPSED_TOUCH_ID: i64 = 1;

/// A touch point as reported for one frame, in absolute screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchPoint {
    pub id: i64,
    pub state: TouchState,
    pub x: i32,
    pub y: i32,
}

/// A frame of touch points ready to be delivered to the window manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchReport {
    pub points: Vec<TouchPoint>,
    /// Index into `points` of the primary point
    pub primary: Option<usize>,
    /// The primary point changed because the previous one was released
    pub reassigned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchSettings {
    pub tap_radius: u32,
    pub move_sensitivity: u32,
}

impl Default for TouchSettings {
    fn default() -> Self {
        Self {
            tap_radius: 20,
            move_sensitivity: 20,
        }
    }
}

impl From<&InputConfig> for TouchSettings {
    fn from(config: &InputConfig) -> Self {
        Self {
            tap_radius: config.tap_radius,
            move_sensitivity: config.move_sensitivity,
        }
    }
}

/// Result of feeding one frame to the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// No points now and none before
    Idle,
    /// Every point is still; nothing to deliver
    Unchanged(Vec<TouchPoint>),
    Report(TouchReport),
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    id: i64,
    x: i32,
    y: i32,
    dragging: bool,
}

/// Per-device touch identity and classification state
#[derive(Debug, Clone)]
pub struct TouchTracker {
    settings: TouchSettings,
    /// Report only the primary point
    collapse: bool,
    points: Vec<Tracked>,
    next_id: i64,
    primary_id: Option<i64>,
}

fn distance_sq(ax: i32, ay: i32, bx: i32, by: i32) -> i64 {
    let dx = i64::from(ax) - i64::from(bx);
    let dy = i64::from(ay) - i64::from(by);
    dx * dx + dy * dy
}

impl TouchTracker {
    pub fn new(settings: TouchSettings, collapse: bool) -> Self {
        Self {
            settings,
            collapse,
            points: Vec::new(),
            next_id: 1,
            primary_id: None,
        }
    }

    pub fn primary_id(&self) -> Option<i64> {
        self.primary_id
    }

    /// Points carried into the next frame as (id, x, y)
    pub fn tracked(&self) -> impl Iterator<Item = (i64, i32, i32)> + '_ {
        self.points.iter().map(|p| (p.id, p.x, p.y))
    }

    fn fresh_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Match pending positions to the previous frame's points.
    fn assign_ids(&mut self, pending: &[(i32, i32)]) -> Vec<i64> {
        let mut ids = vec![0; pending.len()];

        if self.points.is_empty() {
            self.next_id = 1;
            for id in ids.iter_mut() {
                *id = self.fresh_id();
            }
            return ids;
        }

        if pending.len() >= self.points.len() {
            let mut mapped = vec![false; pending.len()];
            for prev in &self.points {
                let mut closest: Option<(usize, i64)> = None;
                for (j, &(x, y)) in pending.iter().enumerate() {
                    if mapped[j] {
                        continue;
                    }
                    let d = distance_sq(x, y, prev.x, prev.y);
                    if closest.is_none_or(|(_, best)| d < best) {
                        closest = Some((j, d));
                    }
                }
                if let Some((j, _)) = closest {
                    ids[j] = prev.id;
                    mapped[j] = true;
                }
            }
            for j in 0..pending.len() {
                if !mapped[j] {
                    ids[j] = self.fresh_id();
                }
            }
        } else {
            let mut mapped = vec![false; self.points.len()];
            for (j, &(x, y)) in pending.iter().enumerate() {
                let mut closest: Option<(usize, i64)> = None;
                for (i, prev) in self.points.iter().enumerate() {
                    if mapped[i] {
                        continue;
                    }
                    let d = distance_sq(x, y, prev.x, prev.y);
                    if closest.is_none_or(|(_, best)| d < best) {
                        closest = Some((i, d));
                    }
                }
                if let Some((i, _)) = closest {
                    ids[j] = self.points[i].id;
                    mapped[i] = true;
                }
            }
        }
        ids
    }

    /// Classify one frame of pending positions.
    pub fn track(&mut self, pending: &[(i32, i32)]) -> TrackOutcome {
        let pending = &pending[..pending.len().min(MAX_TOUCH_POINTS)];
        if pending.is_empty() && self.points.is_empty() {
            return TrackOutcome::Idle;
        }

        let ids = self.assign_ids(pending);
        let tap_sq = i64::from(self.settings.tap_radius).pow(2);
        let move_sq = i64::from(self.settings.move_sensitivity).pow(2);

        let mut points = Vec::with_capacity(pending.len().max(self.points.len()));
        let mut carried = Vec::with_capacity(pending.len());

        for prev in &self.points {
            let Some(j) = ids.iter().position(|id| *id == prev.id) else {
                points.push(TouchPoint {
                    id: prev.id,
                    state: TouchState::Released,
                    x: prev.x,
                    y: prev.y,
                });
                continue;
            };

            let (x, y) = pending[j];
            let d = distance_sq(x, y, prev.x, prev.y);
            let moved = if prev.dragging { d >= move_sq } else { d > tap_sq };

            let (state, x, y) = if moved {
                (TouchState::Moved, x, y)
            } else {
                (TouchState::Still, prev.x, prev.y)
            };
            points.push(TouchPoint { id: prev.id, state, x, y });
            carried.push(Tracked {
                id: prev.id,
                x,
                y,
                dragging: prev.dragging || moved,
            });
        }

        for (j, &(x, y)) in pending.iter().enumerate() {
            if self.points.iter().any(|p| p.id == ids[j]) {
                continue;
            }
            points.push(TouchPoint {
                id: ids[j],
                state: TouchState::Pressed,
                x,
                y,
            });
            carried.push(Tracked {
                id: ids[j],
                x,
                y,
                dragging: false,
            });
        }

        if points.iter().all(|p| p.state == TouchState::Still) {
            trace!("All {} touch points still", points.len());
            self.points = carried;
            return TrackOutcome::Unchanged(points);
        }

        let mut reassigned = false;
        let mut primary = match self.primary_id {
            None => points.iter().position(|p| p.state == TouchState::Pressed),
            Some(pid) => points
                .iter()
                .position(|p| p.id == pid && p.state != TouchState::Released)
                .or_else(|| {
                    let next = points.iter().position(|p| p.state != TouchState::Released);
                    reassigned = next.is_some();
                    next
                }),
        };

        if let Some(i) = primary {
            if reassigned && points[i].state == TouchState::Pressed {
                points[i].state = TouchState::Moved;
            }
            if reassigned {
                debug!("Primary touch point reassigned to {}", points[i].id);
            }
        } else {
            carried.clear();
        }
        self.primary_id = primary.map(|i| points[i].id);
        self.points = carried;

        if self.collapse {
            let single = primary.or(if points.is_empty() { None } else { Some(0) });
            if let Some(i) = single {
                let only = TouchPoint {
                    id: COLLAPSED_TOUCH_ID,
                    ..points[i]
                };
                points = vec![only];
            }
            if primary.is_some() {
                primary = Some(0);
            }
        }

        TrackOutcome::Report(TouchReport {
            points,
            primary,
            reassigned,
        })
    }
}
