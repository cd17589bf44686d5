//! Observe-once visibility triggers for list rows.
//!
//! A row registers a single-shot callback and holds the returned [`RowWatch`]
//! for as long as it is mounted. The callback runs at most once: the first
//! time the row's extent touches the viewport extended by a margin above and
//! below. Dropping the watch detaches the row; a detached callback never runs.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Deserialize;

/// Pre-fetch margin as a fraction of viewport height.
pub const DEFAULT_MARGIN: f64 = 0.5;

/// The visible window, in the same coordinate space as the rows.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Viewport {
    pub top: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RowGeometry<K> {
    pub key: K,
    pub top: f64,
    pub height: f64,
}

type Callback = Box<dyn FnOnce() + Send>;

struct Registration {
    id: u64,
    on_visible: Callback,
}

struct TrackerState<K> {
    next_id: u64,
    rows: HashMap<K, Registration>,
}

pub struct VisibilityTracker<K> {
    margin: f64,
    state: Arc<Mutex<TrackerState<K>>>,
}

/// Keeps a row registered; dropping it detaches the row.
pub struct RowWatch<K: Eq + Hash> {
    key: K,
    id: u64,
    state: Weak<Mutex<TrackerState<K>>>,
}

impl<K: Eq + Hash + Clone> VisibilityTracker<K> {
    pub fn new(margin: f64) -> Self {
        Self {
            margin: margin.max(0.0),
            state: Arc::new(Mutex::new(TrackerState {
                next_id: 0,
                rows: HashMap::new(),
            })),
        }
    }

    /// Register `on_visible` for the row `key`. Re-observing a key replaces
    /// the earlier registration; the earlier watch then detaches nothing.
    pub fn observe(&self, key: K, on_visible: impl FnOnce() + Send + 'static) -> RowWatch<K> {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        state.rows.insert(
            key.clone(),
            Registration {
                id,
                on_visible: Box::new(on_visible),
            },
        );

        RowWatch {
            key,
            id,
            state: Arc::downgrade(&self.state),
        }
    }

    /// Fire every registered row whose extent intersects the extended
    /// viewport. Returns how many callbacks ran.
    pub fn update(&self, viewport: Viewport, rows: &[RowGeometry<K>]) -> usize {
        let margin = self.margin * viewport.height.max(0.0);
        let region_top = viewport.top - margin;
        let region_bottom = viewport.top + viewport.height.max(0.0) + margin;

        let due: Vec<Callback> = {
            let mut state = lock(&self.state);
            rows.iter()
                .filter(|row| {
                    let bottom = row.top + row.height.max(0.0);
                    bottom >= region_top && row.top <= region_bottom
                })
                .filter_map(|row| state.rows.remove(&row.key))
                .map(|registration| registration.on_visible)
                .collect()
        };

        // run outside the lock so callbacks may observe new rows
        let fired = due.len();
        for on_visible in due {
            on_visible();
        }
        fired
    }

    /// Rows still waiting to fire.
    pub fn observed(&self) -> usize {
        lock(&self.state).rows.len()
    }
}

impl<K: Eq + Hash + Clone> Default for VisibilityTracker<K> {
    fn default() -> Self {
        Self::new(DEFAULT_MARGIN)
    }
}

impl<K: Eq + Hash> RowWatch<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for RowWatch<K> {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let removed = {
            let mut state = lock(&state);
            let current = state.rows.get(&self.key).map(|r| r.id) == Some(self.id);
            if current {
                state.rows.remove(&self.key)
            } else {
                None
            }
        };
        // the unrun callback may own resources whose drop needs the lock
        drop(removed);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
