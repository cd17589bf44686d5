//! Memoizing profile loader with per-handle request de-duplication.
//!
//! The loader is an owned object: create one at startup and share it by
//! `Arc`. Its cache lives as long as the loader does.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use suggest_common::{Handle, Profile};

use crate::source::ProfileSource;

type PendingFetch = Shared<BoxFuture<'static, Option<Arc<Profile>>>>;

#[derive(Default)]
struct LoaderState {
    cache: HashMap<Handle, Arc<Profile>>,
    pending: HashMap<Handle, PendingFetch>,
}

/// Snapshot of cache occupancy, optionally scoped to a set of handles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cache_size: usize,
    pub pending: usize,
    pub cache_hits: usize,
    pub pending_hits: usize,
}

pub struct ProfileLoader {
    source: Arc<dyn ProfileSource>,
    state: Arc<Mutex<LoaderState>>,
}

impl ProfileLoader {
    pub fn new(source: Arc<dyn ProfileSource>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(LoaderState::default())),
        }
    }

    /// Return the profile for `handle`, fetching it at most once concurrently.
    ///
    /// `None` means the fetch failed; nothing is cached in that case, so a
    /// later call tries again.
    pub async fn fetch_profile(&self, handle: &Handle) -> Option<Arc<Profile>> {
        let fetch = {
            let mut state = lock(&self.state);
            if let Some(profile) = state.cache.get(handle) {
                return Some(profile.clone());
            }
            match state.pending.get(handle) {
                Some(pending) => pending.clone(),
                None => {
                    let fetch = self.start_fetch(handle.clone());
                    state.pending.insert(handle.clone(), fetch.clone());
                    fetch
                }
            }
        };

        fetch.await
    }

    /// Cached profile only; never touches the network.
    pub fn cached(&self, handle: &Handle) -> Option<Arc<Profile>> {
        lock(&self.state).cache.get(handle).cloned()
    }

    /// Handles with a fetch in flight.
    pub fn loading(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = lock(&self.state).pending.keys().cloned().collect();
        handles.sort();
        handles
    }

    pub fn is_loading(&self, handle: &Handle) -> bool {
        lock(&self.state).pending.contains_key(handle)
    }

    pub fn stats(&self, handles: &[Handle]) -> CacheStats {
        let state = lock(&self.state);
        CacheStats {
            cache_size: state.cache.len(),
            pending: state.pending.len(),
            cache_hits: handles.iter().filter(|h| state.cache.contains_key(*h)).count(),
            pending_hits: handles.iter().filter(|h| state.pending.contains_key(*h)).count(),
        }
    }

    fn start_fetch(&self, handle: Handle) -> PendingFetch {
        let source = self.source.clone();
        let state = Arc::downgrade(&self.state);

        async move {
            let mut cleanup = PendingCleanup {
                state: state.clone(),
                handle: Some(handle.clone()),
            };

            match source.fetch_profile(&handle).await {
                Ok(profile) => {
                    let profile = Arc::new(profile);
                    if let Some(state) = state.upgrade() {
                        let mut state = lock(&state);
                        state.cache.insert(handle.clone(), profile.clone());
                        state.pending.remove(&handle);
                        cleanup.handle = None;
                    }
                    tracing::debug!(handle = %handle, "Profile cached");
                    Some(profile)
                }
                Err(e) => {
                    tracing::warn!(handle = %handle, error = %e, "Error fetching profile");
                    None
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Removes a handle's pending entry when the fetch ends without caching,
/// including when the fetch future is dropped unfinished.
struct PendingCleanup {
    state: Weak<Mutex<LoaderState>>,
    handle: Option<Handle>,
}

impl Drop for PendingCleanup {
    fn drop(&mut self) {
        if let (Some(handle), Some(state)) = (self.handle.take(), self.state.upgrade()) {
            lock(&state).pending.remove(&handle);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
