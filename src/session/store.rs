//! Per-agent working sessions.
//!
//! A session remembers the files, queries and edits an agent touched most
//! recently and turns that into a boost score for ranking. Sessions live in a
//! `DashMap`; each one sits behind its own mutex, so calls on one id are
//! serialized while different ids proceed independently. A session is
//! created by `open` or by its first recorded activity. The map itself is
//! bounded: creating a session past `max_sessions` evicts the least recently
//! used session among those created before it.

use super::recency::RecencyList;
use crate::config::IndexConfig;
use crate::error::IndexError;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Score for a path with no session activity.
pub const BASELINE_BOOST: f64 = 1.0;

/// Weights of the boost score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostWeights {
    pub file: f64,
    pub edit: f64,
    pub query: f64,
    /// Per-rank decay factor, in (0, 1)
    pub decay: f64,
}

impl Default for BoostWeights {
    fn default() -> Self {
        Self {
            file: 1.0,
            edit: 0.6,
            query: 0.3,
            decay: 0.85,
        }
    }
}

/// Capacities and expiry taken from [`IndexConfig`].
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub file_capacity: NonZeroUsize,
    pub query_capacity: NonZeroUsize,
    pub edit_capacity: NonZeroUsize,
    pub expiry: Duration,
    pub max_sessions: NonZeroUsize,
}

impl SessionLimits {
    pub fn from_config(config: &IndexConfig) -> Result<Self, IndexError> {
        config.validate()?;
        let nonzero = |name: &str, value: usize| {
            NonZeroUsize::new(value)
                .ok_or_else(|| IndexError::config(format!("{name} must be at least 1")))
        };
        Ok(Self {
            file_capacity: nonzero("file_capacity", config.file_capacity)?,
            query_capacity: nonzero("query_capacity", config.query_capacity)?,
            edit_capacity: nonzero("edit_capacity", config.edit_capacity)?,
            expiry: config.session_expiry(),
            max_sessions: nonzero("max_sessions", config.max_sessions)?,
        })
    }
}

/// Recency state of one session.
#[derive(Debug)]
pub struct Session {
    workspace: PathBuf,
    files: RecencyList<String>,
    queries: RecencyList<String>,
    edits: RecencyList<String>,
    last_active: Instant,
}

impl Session {
    fn new(workspace: PathBuf, limits: &SessionLimits, now: Instant) -> Self {
        Self {
            workspace,
            files: RecencyList::new(limits.file_capacity),
            queries: RecencyList::new(limits.query_capacity),
            edits: RecencyList::new(limits.edit_capacity),
            last_active: now,
        }
    }

    /// Boost for a normalized relative path.
    fn boost(&self, path: &str, weights: &BoostWeights) -> f64 {
        let mut score = BASELINE_BOOST;
        if let Some(rank) = self.files.rank(path) {
            score += weights.file * weights.decay.powi(rank as i32);
        }
        if let Some(rank) = self.edits.rank(path) {
            score += weights.edit * weights.decay.powi(rank as i32);
        }
        if let Some(rank) = self.queries.iter().position(|q| query_mentions(q, path)) {
            score += weights.query * weights.decay.powi(rank as i32);
        }
        score
    }

    fn snapshot(&self, id: &str, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            id: id.to_string(),
            workspace: self.workspace.clone(),
            files: self.files.iter().cloned().collect(),
            queries: self.queries.iter().cloned().collect(),
            edits: self.edits.iter().cloned().collect(),
            idle_secs: now.saturating_duration_since(self.last_active).as_secs(),
        }
    }
}

/// Read-only view of a session, most recent entries first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub workspace: PathBuf,
    pub files: Vec<String>,
    pub queries: Vec<String>,
    pub edits: Vec<String>,
    pub idle_secs: u64,
}

#[derive(Debug)]
struct Slot {
    /// Store-wide tick at creation; fixed for the slot's lifetime
    created: u64,
    /// Store-wide tick of the last call, for session LRU
    last_used: AtomicU64,
    inner: Mutex<SlotState>,
}

#[derive(Debug)]
struct SlotState {
    session: Session,
    /// Set under the lock right before the slot leaves the map
    retired: bool,
}

/// Concurrent store of sessions keyed by id.
#[derive(Debug)]
pub struct SessionStore {
    root: PathBuf,
    limits: SessionLimits,
    weights: BoostWeights,
    sessions: DashMap<String, Arc<Slot>>,
    tick: AtomicU64,
    /// Serializes capacity eviction passes
    evicting: Mutex<()>,
}

impl SessionStore {
    /// `root` is the workspace paths are made relative to.
    pub fn new(root: impl Into<PathBuf>, config: &IndexConfig) -> Result<Self, IndexError> {
        Ok(Self {
            root: root.into(),
            limits: SessionLimits::from_config(config)?,
            weights: BoostWeights::default(),
            sessions: DashMap::new(),
            tick: AtomicU64::new(0),
            evicting: Mutex::new(()),
        })
    }

    pub fn with_weights(mut self, weights: BoostWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Create a session, or return the existing one with that id.
    pub fn open(&self, id: &str) -> SessionSnapshot {
        let now = Instant::now();
        loop {
            let slot = self.acquire(id, now);
            let mut state = slot.inner.lock();
            if state.retired {
                // Swept between lookup and lock; the map no longer holds it
                continue;
            }
            state.session.last_active = now;
            return state.session.snapshot(id, now);
        }
    }

    /// Drop a session. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.sessions
            .remove_if(id, |_, slot| {
                slot.inner.lock().retired = true;
                true
            })
            .is_some()
    }

    pub fn snapshot(&self, id: &str) -> Option<SessionSnapshot> {
        let slot = self.slot(id)?;
        let state = slot.inner.lock();
        (!state.retired).then(|| state.session.snapshot(id, Instant::now()))
    }

    /// Remove every session idle longer than the expiry window as of `now`.
    /// Returns the removed ids in sorted order.
    pub fn evict_expired(&self, now: Instant) -> Vec<String> {
        let expiry = self.limits.expiry;
        let is_expired =
            |session: &Session| now.saturating_duration_since(session.last_active) > expiry;

        let candidates: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| is_expired(&entry.value().inner.lock().session))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted: Vec<String> = candidates
            .into_iter()
            .filter(|id| {
                // Re-checked under the session lock: an add may have landed
                self.sessions
                    .remove_if(id, |_, slot| {
                        let mut state = slot.inner.lock();
                        if is_expired(&state.session) {
                            state.retired = true;
                            true
                        } else {
                            false
                        }
                    })
                    .is_some()
            })
            .collect();
        evicted.sort();

        if !evicted.is_empty() {
            info!(count = evicted.len(), "evicted expired sessions");
        }
        evicted
    }

    /// Run [`Self::evict_expired`] every `interval` until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.evict_expired(Instant::now());
            }
        })
    }

    // ========================================================================
    // Recording Activity
    // ========================================================================

    /// Record a viewed file, creating the session on first activity.
    pub fn add_file(&self, id: &str, path: &Path) -> Result<(), IndexError> {
        let path = self.normalize(path);
        self.with_session(id, |session| {
            if let Some(dropped) = session.files.touch(path) {
                debug!(session = id, file = %dropped, "file capacity reached, dropped oldest");
            }
        })
    }

    /// Record a search query.
    pub fn add_query(&self, id: &str, query: &str) -> Result<(), IndexError> {
        let query = query.trim().to_string();
        self.with_session(id, |session| {
            session.queries.touch(query);
        })
    }

    /// Record an edited file.
    pub fn add_edit(&self, id: &str, path: &Path) -> Result<(), IndexError> {
        let path = self.normalize(path);
        self.with_session(id, |session| {
            session.edits.touch(path);
        })
    }

    /// Ranking boost for `path`; [`BASELINE_BOOST`] for unknown sessions or
    /// paths the session never touched.
    pub fn boost_score(&self, id: &str, path: &Path) -> f64 {
        let Some(slot) = self.slot(id) else {
            return BASELINE_BOOST;
        };
        let path = self.normalize(path);
        let state = slot.inner.lock();
        if state.retired {
            return BASELINE_BOOST;
        }
        state.session.boost(&path, &self.weights)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn slot(&self, id: &str) -> Option<Arc<Slot>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Existing slot for `id`, or a new one installed in the map.
    fn acquire(&self, id: &str, now: Instant) -> Arc<Slot> {
        let mut created = false;
        let slot = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                created = true;
                let tick = self.next_tick();
                debug!(session = id, "created session");
                Arc::new(Slot {
                    created: tick,
                    last_used: AtomicU64::new(tick),
                    inner: Mutex::new(SlotState {
                        session: Session::new(self.root.clone(), &self.limits, now),
                        retired: false,
                    }),
                })
            })
            .clone();

        if created {
            self.evict_over_capacity(id, slot.created);
        } else {
            slot.last_used.store(self.next_tick(), Ordering::Relaxed);
        }
        slot
    }

    fn with_session(&self, id: &str, f: impl FnOnce(&mut Session)) -> Result<(), IndexError> {
        if id.trim().is_empty() {
            return Err(IndexError::UnknownSession(id.to_string()));
        }
        let now = Instant::now();
        let mut f = Some(f);
        loop {
            let slot = self.acquire(id, now);
            let mut state = slot.inner.lock();
            if state.retired {
                continue;
            }
            state.session.last_active = now;
            if let Some(f) = f.take() {
                f(&mut state.session);
            }
            return Ok(());
        }
    }

    /// Only sessions created before `created` are victims, so two sessions
    /// created concurrently never evict each other.
    fn evict_over_capacity(&self, keep: &str, created: u64) {
        let _pass = self.evicting.lock();
        while self.sessions.len() > self.limits.max_sessions.get() {
            let victim = self
                .sessions
                .iter()
                .filter(|entry| entry.key() != keep && entry.value().created < created)
                .min_by_key(|entry| entry.value().last_used.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());
            let Some(victim) = victim else {
                break;
            };
            if self.remove(&victim) {
                debug!(session = %victim, "session capacity reached, evicted least recent");
            }
        }
    }

    /// Relative to the workspace root, forward slashes, no `.` segments.
    fn normalize(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        parts.join("/").replace('\\', "/")
    }
}

/// Whether a query names a file by file name or stem.
fn query_mentions(query: &str, path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    if file_name.is_empty() {
        return false;
    }
    let query = query.to_lowercase();
    let file_name = file_name.to_lowercase();
    if query.contains(&file_name) {
        return true;
    }
    let stem = file_name.split('.').next().unwrap_or(&file_name);
    !stem.is_empty()
        && query
            .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .any(|word| word == stem)
}
