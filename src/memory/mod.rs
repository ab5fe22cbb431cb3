//! Working-memory cache.
//!
//! A TTL- and capacity-bounded key/value store plus the assembler that builds
//! the [`RoutingContext`] snapshot the scorer consumes. Eviction is strict
//! FIFO on insertion order: when full, the oldest-inserted entry goes first,
//! regardless of how recently it was read.

mod context;

pub use context::{InstanceInfo, RecentDecision, RoutingContext, SimilarTask};

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use globset::Glob;

use crate::hierarchy::InstanceRegistry;
use crate::task::Task;

/// A single cached value with its expiry deadline.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    /// `None` means the entry never expires
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if now >= deadline)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// Insertion order; may contain keys already deleted, which are skipped
    /// during eviction.
    order: VecDeque<String>,
}

/// Bounded short-lived key/value store.
///
/// A single mutex guards the map and the insertion order together: writers
/// and readers of the same key are mutually exclusive, and the engine only
/// ever exchanges immutable context/decision values with it.
///
/// # Examples
///
/// ```
/// use trellis::memory::WorkingMemory;
///
/// let memory = WorkingMemory::new(100, None);
/// memory.set("greeting", serde_json::json!("hello"), None);
/// assert!(memory.exists("greeting"));
/// ```
pub struct WorkingMemory {
    inner: Mutex<Inner>,
    max_entries: usize,
    default_ttl: Option<Duration>,
}

impl WorkingMemory {
    /// Create a cache bounded to `max_entries`, with an optional default TTL
    /// applied when `set` is called without one.
    pub fn new(max_entries: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_entries: max_entries.max(1),
            default_ttl,
        }
    }

    /// Store a value under `key`.
    ///
    /// `ttl` falls back to the cache default; `None` in both places means the
    /// entry is permanent. Re-setting an existing key re-inserts it at the
    /// tail of the FIFO order. When the cache is full the oldest-inserted,
    /// still-present entry is evicted first.
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value, ttl: Option<Duration>) {
        let key = key.into();
        let expires_at = ttl
            .or(self.default_ttl)
            .map(|ttl| Instant::now() + ttl);

        let mut inner = self.lock();

        if inner.entries.remove(&key).is_some() {
            inner.order.retain(|k| k != &key);
        }

        while inner.entries.len() >= self.max_entries {
            match inner.order.pop_front() {
                Some(oldest) => {
                    if inner.entries.remove(&oldest).is_some() {
                        tracing::debug!(key = %oldest, "Evicted oldest working-memory entry");
                        metrics::counter!("trellis_memory_evictions_total").increment(1);
                    }
                }
                None => break,
            }
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(key, CacheEntry { value, expires_at });
        metrics::gauge!("trellis_memory_entries").set(inner.entries.len() as f64);
    }

    /// Fetch a value. Expired entries are removed on read and report absent.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut inner = self.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                inner.entries.remove(key);
                inner.order.retain(|k| k != key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Remove a key. Returns whether it was present (and unexpired).
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.lock();
        let removed = match inner.entries.remove(key) {
            Some(entry) => !entry.is_expired(Instant::now()),
            None => false,
        };
        inner.order.retain(|k| k != key);
        metrics::gauge!("trellis_memory_entries").set(inner.entries.len() as f64);
        removed
    }

    /// Whether a key is present and unexpired.
    pub fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Keys matching a glob-style pattern (`*` wildcard), unexpired only.
    ///
    /// An unparseable pattern matches nothing.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let matcher = match Glob::new(pattern) {
            Ok(glob) => glob.compile_matcher(),
            Err(err) => {
                tracing::warn!(pattern = %pattern, error = %err, "Invalid key pattern");
                return Vec::new();
            }
        };

        let now = Instant::now();
        let inner = self.lock();
        inner
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .filter(|(key, _)| matcher.is_match(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Sweep out expired entries. Returns how many were removed.
    pub fn clear_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - inner.entries.len();
        if removed > 0 {
            let Inner { entries, order } = &mut *inner;
            order.retain(|k| entries.contains_key(k));
        }
        metrics::gauge!("trellis_memory_entries").set(inner.entries.len() as f64);
        removed
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
        metrics::gauge!("trellis_memory_entries").set(0.0);
    }

    /// Number of entries, counting not-yet-swept expired ones.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cache key under which a task's routing context is stored.
    pub fn context_key(task_id: &str) -> String {
        format!("context:{}", task_id)
    }

    /// Assemble a [`RoutingContext`] for a task and cache it under the task
    /// id with the default TTL.
    ///
    /// The instance snapshot comes from the registry; recent decisions come
    /// from whatever history store the caller consults (the engine exposes
    /// one). Similar tasks arrive later via [`WorkingMemory::add_similar_tasks`].
    pub fn build_routing_context(
        &self,
        task: &Task,
        registry: &InstanceRegistry,
        recent_decisions: Vec<RecentDecision>,
        session_id: Option<String>,
    ) -> RoutingContext {
        let mut ctx = RoutingContext::from_task(task, session_id);
        ctx.instances = registry
            .all_instances()
            .iter()
            .map(InstanceInfo::from)
            .collect();
        ctx.recent_decisions = recent_decisions;

        self.store_context(&ctx);
        ctx
    }

    /// Merge similar tasks into a cached context.
    ///
    /// Returns false when no context is cached for the task.
    pub fn add_similar_tasks(&self, task_id: &str, similar: Vec<SimilarTask>) -> bool {
        let Some(mut ctx) = self.routing_context(task_id) else {
            return false;
        };
        ctx.similar_tasks.extend(similar);
        self.store_context(&ctx);
        true
    }

    /// Fetch the cached context for a task, if present and unexpired.
    pub fn routing_context(&self, task_id: &str) -> Option<RoutingContext> {
        let value = self.get(&Self::context_key(task_id))?;
        match serde_json::from_value(value) {
            Ok(ctx) => Some(ctx),
            Err(err) => {
                tracing::warn!(task_id = %task_id, error = %err, "Cached routing context failed to decode");
                None
            }
        }
    }

    fn store_context(&self, ctx: &RoutingContext) {
        match serde_json::to_value(ctx) {
            Ok(value) => self.set(Self::context_key(&ctx.task_id), value, None),
            Err(err) => {
                tracing::warn!(task_id = %ctx.task_id, error = %err, "Routing context failed to encode")
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned mutex means a panic mid-write; the cache is derived
        // state, so continuing with whatever is there is safe.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
