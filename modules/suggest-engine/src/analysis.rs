//! Consumer of the suggestion stream.
//!
//! [`AnalysisState`] is the state machine; [`AnalysisRunner`] owns the live
//! subscription and feeds events into it from a background task.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::StreamExt;
use suggest_common::{Handle, Progress, Suggestion};
use suggest_stream::{ErrorPayload, EventStream, StreamEvent, UpdatePayload};
use tokio::task::JoinHandle;

use crate::source::SuggestionSource;

pub const PARSE_FAILURE: &str = "Failed to parse server data";
pub const CONNECTION_FAILURE: &str = "Connection error. Please try again.";

/// Identifies one analysis run. Events from other runs are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Analyzing,
    Done,
    Errored(String),
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisState {
    phase: Phase,
    run: RunId,
    handle: Option<Handle>,
    results: Vec<Suggestion>,
    progress: Progress,
    /// An update has reported `processed == total` during this run.
    finished: bool,
}

impl AnalysisState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new run for `handle`, discarding everything from the last one.
    pub fn begin(&mut self, handle: Handle) -> RunId {
        self.run = RunId(self.run.0 + 1);
        self.phase = Phase::Analyzing;
        self.handle = Some(handle);
        self.results.clear();
        self.progress = Progress::default();
        self.finished = false;
        self.run
    }

    /// Apply one stream event. Returns false when the event was ignored.
    pub fn apply(&mut self, run: RunId, event: StreamEvent) -> bool {
        if run != self.run {
            return false;
        }

        match event {
            StreamEvent::Update(data) => {
                if self.phase != Phase::Analyzing {
                    return false;
                }
                match UpdatePayload::parse(&data) {
                    Ok(update) => {
                        self.progress = update.progress();
                        // the first snapshot arrives before the follow list, as 0/0
                        if self.progress.total > 0 && self.progress.is_complete() {
                            self.finished = true;
                        }
                        self.results = update.results;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Malformed update payload");
                        self.results.clear();
                        self.phase = Phase::Errored(PARSE_FAILURE.to_string());
                    }
                }
                true
            }
            StreamEvent::Error(data) => self.close(ErrorPayload::parse(&data)),
            StreamEvent::Closed => self.close(None),
        }
    }

    fn close(&mut self, payload: Option<ErrorPayload>) -> bool {
        match (&self.phase, payload) {
            (Phase::Analyzing | Phase::Errored(_), Some(payload)) => {
                self.phase = Phase::Errored(payload.error);
                true
            }
            (Phase::Analyzing, None) => {
                self.phase = if self.finished {
                    Phase::Done
                } else {
                    Phase::Errored(CONNECTION_FAILURE.to_string())
                };
                true
            }
            _ => false,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }

    pub fn results(&self) -> &[Suggestion] {
        &self.results
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn is_analyzing(&self) -> bool {
        self.phase == Phase::Analyzing
    }

    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            Phase::Errored(message) => Some(message),
            _ => None,
        }
    }
}

/// A live subscription. Cancelled on [`Subscription::cancel`] or drop.
pub struct Subscription {
    run: RunId,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            tracing::debug!(run = ?self.run, "Cancelling suggestion subscription");
        }
        self.task.abort();
    }
}

/// Owns the current subscription and the state it feeds.
pub struct AnalysisRunner {
    source: Arc<dyn SuggestionSource>,
    state: Arc<Mutex<AnalysisState>>,
    subscription: Option<Subscription>,
}

impl AnalysisRunner {
    pub fn new(source: Arc<dyn SuggestionSource>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(AnalysisState::new())),
            subscription: None,
        }
    }

    /// Cancel any open subscription, reset state and subscribe for `handle`.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, handle: Handle) -> RunId {
        self.stop();

        let run = lock(&self.state).begin(handle.clone());
        tracing::info!(handle = %handle, run = ?run, "Starting analysis");

        let events = self.source.subscribe(&handle);
        let task = tokio::spawn(pump(events, Arc::downgrade(&self.state), run));
        self.subscription = Some(Subscription { run, task });
        run
    }

    /// Close the open subscription, if any. A run still analyzing is settled
    /// as if its channel had closed.
    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            let run = subscription.run();
            subscription.cancel();
            lock(&self.state).apply(run, StreamEvent::Closed);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }

    pub fn snapshot(&self) -> AnalysisState {
        lock(&self.state).clone()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&AnalysisState) -> R) -> R {
        f(&lock(&self.state))
    }
}

async fn pump(mut events: EventStream, state: Weak<Mutex<AnalysisState>>, run: RunId) {
    while let Some(event) = events.next().await {
        let terminal = matches!(event, StreamEvent::Error(_) | StreamEvent::Closed);
        let Some(state) = state.upgrade() else {
            break;
        };
        lock(&state).apply(run, event);
        if terminal {
            break;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
