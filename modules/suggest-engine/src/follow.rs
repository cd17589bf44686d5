//! Follow/unfollow toggling on behalf of the submitting user.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use suggest_common::Handle;

use crate::error::FollowError;
use crate::source::SocialGraph;

/// An app password or account secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identifier: Handle,
    secret: Secret,
}

impl Credentials {
    /// `None` when no usable secret was supplied.
    pub fn new(identifier: Handle, secret: &str) -> Option<Self> {
        let secret = secret.trim();
        if secret.is_empty() {
            return None;
        }
        Some(Self {
            identifier,
            secret: Secret(secret.to_string()),
        })
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }
}

/// Whether a follow button is shown for `target` at all.
pub fn follow_offered(target: &Handle, credentials: Option<&Credentials>) -> bool {
    credentials.is_some_and(|c| &c.identifier != target)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Followed,
    Unfollowed,
    /// Another toggle on the same control was still running.
    Ignored,
}

/// Per-row follow state.
#[derive(Debug, Default)]
pub struct FollowControl {
    in_flight: AtomicBool,
    record: Mutex<Option<String>>,
}

impl FollowControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_following(&self) -> bool {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn record(&self) -> Option<String> {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_record(&self, record: Option<String>) {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = record;
    }
}

/// Clears the in-flight flag on every exit path.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct FollowAction {
    graph: Arc<dyn SocialGraph>,
}

impl FollowAction {
    pub fn new(graph: Arc<dyn SocialGraph>) -> Self {
        Self { graph }
    }

    pub async fn toggle(
        &self,
        control: &FollowControl,
        target: &Handle,
        credentials: Option<&Credentials>,
    ) -> Result<ToggleOutcome, FollowError> {
        let credentials = match credentials {
            Some(c) if follow_offered(target, Some(c)) => c,
            _ => return Err(FollowError::NotOffered),
        };
        let Some(_guard) = InFlight::acquire(&control.in_flight) else {
            return Ok(ToggleOutcome::Ignored);
        };

        let session = self
            .graph
            .login(credentials.identifier.as_str(), credentials.secret().expose())
            .await
            .map_err(|e| FollowError::Login(e.to_string()))?;

        match control.record() {
            None => {
                let did = self
                    .graph
                    .resolve_handle(&session, target)
                    .await
                    .map_err(|e| FollowError::Resolve(e.to_string()))?;
                let existing = self
                    .graph
                    .following_record(&session, &did)
                    .await
                    .map_err(|e| FollowError::Resolve(e.to_string()))?;
                if let Some(uri) = existing {
                    control.set_record(Some(uri));
                    tracing::info!(target = %target, "Already following");
                    return Ok(ToggleOutcome::Followed);
                }
                let uri = self
                    .graph
                    .follow(&session, &did)
                    .await
                    .map_err(|e| FollowError::Follow(e.to_string()))?;
                control.set_record(Some(uri));
                tracing::info!(target = %target, "Followed");
                Ok(ToggleOutcome::Followed)
            }
            Some(uri) => {
                self.graph
                    .unfollow(&session, &uri)
                    .await
                    .map_err(|e| FollowError::Unfollow(e.to_string()))?;
                control.set_record(None);
                tracing::info!(target = %target, "Unfollowed");
                Ok(ToggleOutcome::Unfollowed)
            }
        }
    }
}
