//! Response cache for warden-runtime.
//!
//! A bounded LRU store with per-entry TTL. Reads and writes both move an
//! entry to the most-recently-used end; once the entry count passes
//! `max_entries` the least-recently-used entry is evicted. Expiry is lazy:
//! an expired entry is removed by the `get` that finds it.
//!
//! The orchestrator keys runs with [`response_cache_key`] and reports
//! hit/miss/store through a [`CacheEventSink`]. Events are observational
//! only.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use warden_core::contract::content_hash;
use warden_core::{RequestContext, TemplateRef};

use crate::config::CacheConfig;

/// Millisecond clock used for TTL checks.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

struct Entry<V> {
    value: V,
    stored_at: i64,
    tick: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Recency order: smallest tick is least recently used
    order: BTreeMap<u64, K>,
    next_tick: u64,
}

impl<K: Hash + Eq + Clone, V> Inner<K, V> {
    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn remove(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        Some(entry)
    }
}

/// A cached value together with the time it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<V> {
    pub value: V,
    pub stored_at_ms: i64,
}

/// LRU + TTL keyed store, safe to share between concurrent runs.
pub struct ResponseCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    max_entries: usize,
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl<K: Hash + Eq + Clone, V: Clone> ResponseCache<K, V> {
    /// Create a cache on the wall clock. `max_entries` is clamped to 1.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self::with_clock(max_entries, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(max_entries: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_tick: 0,
            }),
            max_entries: max_entries.max(1),
            ttl_ms: ttl.as_millis() as i64,
            clock,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl)
    }

    /// Look up `key`, refreshing its recency. Expired entries are dropped.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_entry(key).map(|hit| hit.value)
    }

    /// Like [`get`](Self::get) but also returns when the value was stored.
    pub fn get_entry(&self, key: &K) -> Option<CacheHit<V>> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();

        let (stored_at, old_tick) = {
            let entry = inner.entries.get(key)?;
            (entry.stored_at, entry.tick)
        };
        if now >= stored_at.saturating_add(self.ttl_ms) {
            inner.remove(key);
            return None;
        }

        let tick = inner.bump();
        inner.order.remove(&old_tick);
        inner.order.insert(tick, key.clone());
        let entry = inner.entries.get_mut(key)?;
        entry.tick = tick;
        Some(CacheHit {
            value: entry.value.clone(),
            stored_at_ms: entry.stored_at,
        })
    }

    /// Insert or replace `key`, evicting least-recently-used entries past
    /// capacity. Returns the store timestamp.
    pub fn set(&self, key: K, value: V) -> i64 {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();

        inner.remove(&key);
        let tick = inner.bump();
        inner.order.insert(tick, key.clone());
        inner.entries.insert(
            key,
            Entry {
                value,
                stored_at: now,
                tick,
            },
        );

        while inner.entries.len() > self.max_entries {
            let Some((_, oldest)) = inner.order.pop_first() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
        now
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&self, key: &K) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl<K, V> std::fmt::Debug for ResponseCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.inner.lock().entries.len())
            .field("max_entries", &self.max_entries)
            .field("ttl_ms", &self.ttl_ms)
            .finish()
    }
}

/// Cache key for one run: tenant and project scoped, content addressed
/// over the template and input.
pub fn response_cache_key(ctx: &RequestContext, template_ref: &TemplateRef, input: &str) -> String {
    content_hash(&json!({
        "tenantId": ctx.tenant_id,
        "projectId": ctx.project_id,
        "template": template_ref,
        "input": input,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheEventKind {
    #[serde(rename = "response_cache_hit")]
    Hit,
    #[serde(rename = "response_cache_miss")]
    Miss,
    #[serde(rename = "response_cache_store")]
    Store,
}

/// Instrumentation record for one cache interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEvent {
    #[serde(rename = "type")]
    pub kind: CacheEventKind,
    pub request_id: String,
    pub tenant_id: String,
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub cache_key: String,

    /// Set for hits and stores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

impl CacheEvent {
    pub fn new(kind: CacheEventKind, ctx: &RequestContext, cache_key: &str) -> Self {
        Self {
            kind,
            request_id: ctx.request_id.clone(),
            tenant_id: ctx.tenant_id.clone(),
            project_id: ctx.project_id.clone(),
            task_id: ctx.task_id.clone(),
            cache_key: cache_key.to_string(),
            cached_at: None,
        }
    }

    pub fn at(mut self, stored_at_ms: i64) -> Self {
        self.cached_at = DateTime::from_timestamp_millis(stored_at_ms);
        self
    }
}

/// Receiver of cache instrumentation.
pub trait CacheEventSink: Send + Sync {
    fn emit(&self, event: CacheEvent);
}

impl<F> CacheEventSink for F
where
    F: Fn(CacheEvent) + Send + Sync,
{
    fn emit(&self, event: CacheEvent) {
        self(event)
    }
}
