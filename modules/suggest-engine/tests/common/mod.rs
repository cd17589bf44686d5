//! In-memory fakes of the engine's collaborators.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bsky_client::Session;
use futures::stream::{self, StreamExt};
use suggest_common::{Handle, Profile};
use suggest_engine::{ProfileSource, SocialGraph, SuggestionSource};
use suggest_stream::{EventStream, StreamEvent};
use tokio::sync::watch;

pub fn handle(s: &str) -> Handle {
    Handle::parse(s).unwrap()
}

pub fn profile_for(handle: &Handle) -> Profile {
    Profile {
        did: format!("did:plc:{}", handle.short_name()),
        handle: Some(handle.clone()),
        display_name: Some(format!("Display {}", handle.short_name())),
        avatar: None,
        description: None,
        followers_count: Some(100),
    }
}

pub fn update(processed: u64, total: u64, counts: &[(&str, u64)]) -> StreamEvent {
    let results: Vec<serde_json::Value> = counts
        .iter()
        .map(|(h, c)| serde_json::json!({"handle": h, "count": c}))
        .collect();
    StreamEvent::Update(
        serde_json::json!({
            "results": results,
            "processed_count": processed,
            "total_count": total,
        })
        .to_string(),
    )
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// --- Profiles ---

/// Profile source that blocks every fetch until the gate opens.
pub struct GatedProfiles {
    pub calls: AtomicUsize,
    gate: watch::Sender<bool>,
    fail: Mutex<Vec<Handle>>,
}

impl GatedProfiles {
    pub fn open() -> Arc<Self> {
        Self::with_gate(true)
    }

    pub fn closed() -> Arc<Self> {
        Self::with_gate(false)
    }

    fn with_gate(open: bool) -> Arc<Self> {
        let (gate, _) = watch::channel(open);
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate,
            fail: Mutex::new(Vec::new()),
        })
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn fail_for(&self, handle: &Handle) {
        self.fail.lock().unwrap().push(handle.clone());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileSource for GatedProfiles {
    async fn fetch_profile(&self, handle: &Handle) -> anyhow::Result<Profile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open).await?;
        if self.fail.lock().unwrap().contains(handle) {
            anyhow::bail!("profile lookup returned 400");
        }
        Ok(profile_for(handle))
    }
}

// --- Suggestion stream ---

/// Replays scripted events per handle. Handles marked `hanging` never close.
#[derive(Default)]
pub struct ScriptedSuggestions {
    scripts: Mutex<HashMap<Handle, (Vec<StreamEvent>, bool)>>,
    pub subscriptions: AtomicUsize,
    pub dropped: Arc<AtomicUsize>,
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl ScriptedSuggestions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, handle: &Handle, events: Vec<StreamEvent>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(handle.clone(), (events, false));
    }

    pub fn hanging(&self, handle: &Handle, events: Vec<StreamEvent>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(handle.clone(), (events, true));
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

impl SuggestionSource for ScriptedSuggestions {
    fn subscribe(&self, handle: &Handle) -> EventStream {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let (events, hang) = self
            .scripts
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .unwrap_or_else(|| (vec![StreamEvent::Closed], false));

        let guard = DropCounter(self.dropped.clone());
        let scripted = stream::iter(events);
        let tail: EventStream = if hang {
            stream::pending().boxed()
        } else {
            stream::empty().boxed()
        };
        scripted
            .chain(tail)
            .map(move |event| {
                let _ = &guard;
                event
            })
            .boxed()
    }
}

// --- Social graph ---

#[derive(Default)]
pub struct FakeGraph {
    pub logins: AtomicUsize,
    pub follows: AtomicUsize,
    pub unfollows: AtomicUsize,
    pub reject_login: AtomicBool,
    pub fail_follow: AtomicBool,
    pub last_unfollowed: Mutex<Option<String>>,
    /// Follow record the account already holds, reported by the lookup.
    pub existing: Mutex<Option<String>>,
    gate: Mutex<Option<watch::Receiver<bool>>>,
}

impl FakeGraph {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make follow calls wait until the returned sender sends `true`.
    pub fn gate_follows(&self) -> watch::Sender<bool> {
        let (tx, rx) = watch::channel(false);
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }
}

#[async_trait]
impl SocialGraph for FakeGraph {
    async fn login(&self, identifier: &str, secret: &str) -> anyhow::Result<Session> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.reject_login.load(Ordering::SeqCst) {
            anyhow::bail!("Invalid identifier or password");
        }
        Ok(Session::new(
            format!("did:plc:{}", identifier.split('.').next().unwrap_or_default()),
            identifier,
            format!("jwt-{secret}"),
        ))
    }

    async fn resolve_handle(&self, _session: &Session, handle: &Handle) -> anyhow::Result<String> {
        Ok(format!("did:plc:{}", handle.short_name()))
    }

    async fn following_record(&self, _session: &Session, _subject_did: &str) -> anyhow::Result<Option<String>> {
        Ok(self.existing.lock().unwrap().clone())
    }

    async fn follow(&self, session: &Session, subject_did: &str) -> anyhow::Result<String> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(mut gate) = gate {
            gate.wait_for(|open| *open).await?;
        }
        if self.fail_follow.load(Ordering::SeqCst) {
            anyhow::bail!("network unreachable");
        }
        let n = self.follows.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "at://{}/app.bsky.graph.follow/{}-{n}",
            session.did,
            subject_did.trim_start_matches("did:plc:")
        ))
    }

    async fn unfollow(&self, _session: &Session, record_uri: &str) -> anyhow::Result<()> {
        self.unfollows.fetch_add(1, Ordering::SeqCst);
        *self.last_unfollowed.lock().unwrap() = Some(record_uri.to_string());
        Ok(())
    }
}
