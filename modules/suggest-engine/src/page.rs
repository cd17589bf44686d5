//! Per-visitor page sessions.
//!
//! A [`PageSession`] is everything one open results page holds: the running
//! analysis, the optional credentials, the row watches of the rows currently
//! rendered, the profiles those rows have loaded, and per-row follow state.
//! The [`PageRegistry`] maps session ids to pages and reaps idle ones.
//!
//! Each rendered copy of the page gets a document token. Only the copy
//! holding the current token may close the session, so the unload of a
//! document that has already been replaced is ignored.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use suggest_common::{
    normalize_handle, rank, Handle, Profile, Progress, RankedSuggestion, SortMode, SuggestError,
};
use uuid::Uuid;

use crate::analysis::{AnalysisRunner, Phase};
use crate::error::{EngineError, FollowError, Result};
use crate::follow::{follow_offered, Credentials, FollowAction, FollowControl, ToggleOutcome};
use crate::loader::ProfileLoader;
use crate::source::SuggestionSource;
use crate::visibility::{RowGeometry, RowWatch, Viewport, VisibilityTracker};

/// How long a follow failure stays on screen.
pub const NOTICE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowState {
    pub offered: bool,
    pub following: bool,
    pub busy: bool,
}

#[derive(Debug, Clone)]
pub struct RowView {
    pub ranked: RankedSuggestion,
    pub profile: Option<Arc<Profile>>,
    pub follow: FollowState,
}

impl RowView {
    pub fn handle(&self) -> &Handle {
        &self.ranked.suggestion.handle
    }
}

/// Everything needed to render the results area once.
#[derive(Debug, Clone)]
pub struct PageView {
    pub handle: Option<Handle>,
    pub phase: Phase,
    pub progress: Progress,
    pub sort: SortMode,
    pub rows: Vec<RowView>,
    pub notice: Option<String>,
    pub follow_enabled: bool,
}

impl PageView {
    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            Phase::Errored(message) => Some(message),
            _ => None,
        }
    }

    pub fn is_analyzing(&self) -> bool {
        self.phase == Phase::Analyzing
    }
}

struct Notice {
    message: String,
    expires: Instant,
}

struct PageInner {
    runner: AnalysisRunner,
    credentials: Option<Credentials>,
    watches: HashMap<Handle, RowWatch<Handle>>,
    profiles: HashMap<Handle, Arc<Profile>>,
    follows: HashMap<Handle, Arc<FollowControl>>,
    notice: Option<Notice>,
    document: Option<Uuid>,
    last_seen: Instant,
}

pub struct PageSession {
    id: Uuid,
    me: Weak<PageSession>,
    alive: AtomicBool,
    loader: Arc<ProfileLoader>,
    follow: FollowAction,
    tracker: VisibilityTracker<Handle>,
    inner: Mutex<PageInner>,
}

impl PageSession {
    pub fn new(
        id: Uuid,
        loader: Arc<ProfileLoader>,
        suggestions: Arc<dyn SuggestionSource>,
        follow: FollowAction,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            id,
            me: me.clone(),
            alive: AtomicBool::new(true),
            loader,
            follow,
            tracker: VisibilityTracker::default(),
            inner: Mutex::new(PageInner {
                runner: AnalysisRunner::new(suggestions),
                credentials: None,
                watches: HashMap::new(),
                profiles: HashMap::new(),
                follows: HashMap::new(),
                notice: None,
                document: None,
                last_seen: Instant::now(),
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Normalize `input`, remember the secret for follow actions and start a
    /// fresh analysis. An empty secret disables following.
    pub fn submit(&self, input: &str, secret: &str, default_suffix: &str) -> std::result::Result<Handle, SuggestError> {
        let handle = normalize_handle(input, default_suffix)?;

        let mut inner = self.lock();
        inner.credentials = Credentials::new(handle.clone(), secret);
        inner.watches.clear();
        inner.follows.clear();
        inner.notice = None;
        // the submitting document is about to be replaced
        inner.document = None;
        inner.runner.start(handle.clone());
        inner.last_seen = Instant::now();
        self.alive.store(true, Ordering::SeqCst);

        tracing::info!(
            page = %self.id,
            handle = %handle,
            follow_enabled = inner.credentials.is_some(),
            "Analysis submitted"
        );
        Ok(handle)
    }

    /// Snapshot for rendering. Also mounts watches for rows that just
    /// appeared and unmounts rows that are gone.
    pub fn view(&self, sort: SortMode) -> PageView {
        let mut inner = self.lock();
        let state = inner.runner.snapshot();

        let ranked = match state.phase() {
            Phase::Errored(_) => Vec::new(),
            _ => rank(state.results(), sort),
        };
        self.sync_rows(&mut inner, &ranked);

        let now = Instant::now();
        if inner.notice.as_ref().is_some_and(|n| n.expires <= now) {
            inner.notice = None;
        }

        let handles: Vec<Handle> = ranked.iter().map(|r| r.suggestion.handle.clone()).collect();
        let stats = self.loader.stats(&handles);
        tracing::debug!(
            page = %self.id,
            rows = handles.len(),
            cache_size = stats.cache_size,
            pending = stats.pending,
            cache_hits = stats.cache_hits,
            pending_hits = stats.pending_hits,
            "Profile cache"
        );

        let credentials = inner.credentials.as_ref();
        let rows = ranked
            .into_iter()
            .map(|ranked| {
                let handle = &ranked.suggestion.handle;
                let control = inner.follows.get(handle);
                let follow = FollowState {
                    offered: follow_offered(handle, credentials),
                    following: control.is_some_and(|c| c.is_following()),
                    busy: control.is_some_and(|c| c.is_busy()),
                };
                RowView {
                    profile: inner.profiles.get(handle).cloned(),
                    follow,
                    ranked,
                }
            })
            .collect();

        PageView {
            handle: state.handle().cloned(),
            phase: state.phase().clone(),
            progress: state.progress(),
            sort,
            rows,
            notice: inner.notice.as_ref().map(|n| n.message.clone()),
            follow_enabled: credentials.is_some(),
        }
    }

    fn sync_rows(&self, inner: &mut PageInner, ranked: &[RankedSuggestion]) {
        let mounted: HashSet<&Handle> = ranked.iter().map(|r| &r.suggestion.handle).collect();
        inner.watches.retain(|handle, _| mounted.contains(handle));

        for handle in mounted {
            if inner.watches.contains_key(handle) {
                continue;
            }
            let watch = self.tracker.observe(handle.clone(), self.on_visible(handle.clone()));
            inner.watches.insert(handle.clone(), watch);
        }
    }

    fn on_visible(&self, handle: Handle) -> impl FnOnce() + Send + 'static {
        let page = self.me.clone();
        let loader = self.loader.clone();
        move || {
            tokio::spawn(async move {
                let Some(profile) = loader.fetch_profile(&handle).await else {
                    return;
                };
                if let Some(page) = page.upgrade() {
                    page.store_profile(handle, profile);
                }
            });
        }
    }

    fn store_profile(&self, handle: Handle, profile: Arc<Profile>) {
        if !self.is_alive() {
            return;
        }
        self.lock().profiles.insert(handle, profile);
    }

    /// Fire the visibility triggers of rows touching the (extended) viewport.
    pub fn report_viewport(&self, viewport: Viewport, rows: &[RowGeometry<Handle>]) -> usize {
        self.touch();
        self.tracker.update(viewport, rows)
    }

    pub async fn toggle_follow(&self, target: &Handle) -> Result<ToggleOutcome> {
        let (control, credentials) = {
            let mut inner = self.lock();
            let listed = inner
                .runner
                .with_state(|s| s.results().iter().any(|r| &r.handle == target));
            if !listed {
                return Err(EngineError::UnknownRow(target.to_string()));
            }
            let control = inner.follows.entry(target.clone()).or_default().clone();
            (control, inner.credentials.clone())
        };

        match self.follow.toggle(&control, target, credentials.as_ref()).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::warn!(page = %self.id, target = %target, error = %e, "Follow toggle failed");
                self.set_notice(&e);
                Err(e.into())
            }
        }
    }

    fn set_notice(&self, error: &FollowError) {
        self.lock().notice = Some(Notice {
            message: error.to_string(),
            expires: Instant::now() + NOTICE_TTL,
        });
    }

    /// Issue the token for a freshly rendered document. Any earlier token
    /// stops being able to close the page.
    pub fn open_document(&self) -> Uuid {
        let document = Uuid::new_v4();
        let mut inner = self.lock();
        inner.document = Some(document);
        inner.last_seen = Instant::now();
        document
    }

    /// Close on behalf of `document`. Ignored unless it is the current one.
    pub fn close_document(&self, document: Uuid) -> bool {
        let current = self.lock().document == Some(document);
        if !current {
            tracing::debug!(page = %self.id, "Ignoring close from a replaced document");
            return false;
        }
        self.close();
        true
    }

    /// Page unload: cancel the subscription, stop accepting profiles and
    /// forget the credentials.
    pub fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut inner = self.lock();
        inner.runner.stop();
        inner.credentials = None;
        inner.watches.clear();
        inner.follows.clear();
        inner.notice = None;
        inner.document = None;
        tracing::info!(page = %self.id, "Page closed");
    }

    pub fn has_credentials(&self) -> bool {
        self.lock().credentials.is_some()
    }

    pub fn touch(&self) {
        self.lock().last_seen = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.lock().last_seen.elapsed()
    }

    fn lock(&self) -> MutexGuard<'_, PageInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Live page sessions by id.
pub struct PageRegistry {
    loader: Arc<ProfileLoader>,
    suggestions: Arc<dyn SuggestionSource>,
    follow: FollowAction,
    pages: Mutex<HashMap<Uuid, Arc<PageSession>>>,
}

impl PageRegistry {
    pub fn new(
        loader: Arc<ProfileLoader>,
        suggestions: Arc<dyn SuggestionSource>,
        follow: FollowAction,
    ) -> Self {
        Self {
            loader,
            suggestions,
            follow,
            pages: Mutex::new(HashMap::new()),
        }
    }

    /// Look up `id`, or open a new page when it is missing or unknown.
    pub fn get_or_create(&self, id: Option<Uuid>) -> Arc<PageSession> {
        let mut pages = self.pages();
        if let Some(page) = id.and_then(|id| pages.get(&id)) {
            page.touch();
            return page.clone();
        }

        let id = Uuid::new_v4();
        let page = PageSession::new(
            id,
            self.loader.clone(),
            self.suggestions.clone(),
            self.follow.clone(),
        );
        pages.insert(id, page.clone());
        tracing::debug!(page = %id, "Page opened");
        page
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<PageSession>> {
        self.pages().get(&id).cloned()
    }

    /// Close page `id` for `document` and forget it. A later request with
    /// the same id opens a fresh page.
    pub fn close_document(&self, id: Uuid, document: Uuid) -> bool {
        let mut pages = self.pages();
        let Some(page) = pages.get(&id) else {
            return false;
        };
        if !page.close_document(document) {
            return false;
        }
        pages.remove(&id);
        true
    }

    pub fn len(&self) -> usize {
        self.pages().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close and forget pages idle for at least `max_idle`.
    pub fn reap_idle(&self, max_idle: Duration) -> usize {
        let expired: Vec<Arc<PageSession>> = {
            let mut pages = self.pages();
            let ids: Vec<Uuid> = pages
                .iter()
                .filter(|(_, page)| page.idle_for() >= max_idle)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| pages.remove(id)).collect()
        };

        for page in &expired {
            page.close();
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Reaped idle pages");
        }
        expired.len()
    }

    fn pages(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<PageSession>>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
