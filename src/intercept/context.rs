//! Navigation state per browsing context.
//!
//! Each browsing context owns one [`NavigationContext`]. Navigations write it and every
//! other fetch from the same context reads it. The state is a single value behind an
//! `ArcSwap`, so a write is one atomic replace and reads never block.
//!
//! Navigations and subresource fetches of the same context run as independent tasks.
//! A subresource that loads the state before a concurrent navigation stores its
//! timestamp is routed with the previous timestamp.

use super::timestamp::Timestamp;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONTEXT_ID: &str = "default";
pub const DEFAULT_MAX_CONTEXTS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NavigationState {
    #[default]
    NoTimestamp,
    HasTimestamp(Timestamp),
}

impl NavigationState {
    pub fn timestamp(&self) -> Option<&Timestamp> {
        match self {
            Self::NoTimestamp => None,
            Self::HasTimestamp(ts) => Some(ts),
        }
    }
}

#[derive(Debug, Default)]
pub struct NavigationContext {
    state: ArcSwap<NavigationState>,
}

impl NavigationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Arc<NavigationState> {
        self.state.load_full()
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.state.load().timestamp().cloned()
    }

    /// Replaces the stored timestamp and returns the one it displaced.
    pub fn record(&self, timestamp: Timestamp) -> Option<Timestamp> {
        let previous = self
            .state
            .swap(Arc::new(NavigationState::HasTimestamp(timestamp)));
        previous.timestamp().cloned()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot {
    pub id: String,
    pub timestamp: Option<Timestamp>,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

struct ContextEntry {
    context: Arc<NavigationContext>,
    created_at: DateTime<Utc>,
    /// Milliseconds since the epoch.
    last_used: AtomicI64,
}

impl ContextEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            context: Arc::new(NavigationContext::new()),
            created_at: now,
            last_used: AtomicI64::new(now.timestamp_millis()),
        }
    }

    fn touch(&self) {
        self.last_used
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn last_used_millis(&self) -> i64 {
        self.last_used.load(Ordering::Relaxed)
    }
}

/// Live browsing contexts, keyed by id. Entries are created on first use and the
/// least recently used entry is dropped once `capacity` is reached. Concurrent
/// creations may overshoot the capacity by the number of racing tasks.
pub struct ContextRegistry {
    contexts: DashMap<String, ContextEntry>,
    capacity: usize,
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_CONTEXTS)
    }
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            contexts: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get_or_create(&self, id: &str) -> Arc<NavigationContext> {
        if let Some(entry) = self.contexts.get(id) {
            entry.touch();
            return entry.context.clone();
        }

        while self.contexts.len() >= self.capacity {
            if !self.evict_least_recently_used() {
                break;
            }
        }

        let entry = self.contexts.entry(id.to_string()).or_insert_with(|| {
            tracing::debug!("Opening browsing context '{}'", id);
            ContextEntry::new(Utc::now())
        });
        entry.touch();
        entry.context.clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<NavigationContext>> {
        self.contexts.get(id).map(|entry| entry.context.clone())
    }

    /// Drops a browsing context. Fetches still holding it finish against the old state.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.contexts.remove(id).is_some();
        if removed {
            tracing::debug!("Closed browsing context '{}'", id);
        }
        removed
    }

    /// Drops every context unused for longer than `max_idle`; returns how many went.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let max_idle = i64::try_from(max_idle.as_millis()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp_millis().saturating_sub(max_idle);

        let before = self.contexts.len();
        self.contexts
            .retain(|_, entry| entry.last_used_millis() >= cutoff);
        let pruned = before.saturating_sub(self.contexts.len());

        if pruned > 0 {
            tracing::debug!("Dropped {} idle browsing contexts", pruned);
        }
        pruned
    }

    fn evict_least_recently_used(&self) -> bool {
        let oldest = self
            .contexts
            .iter()
            .min_by_key(|entry| entry.value().last_used_millis())
            .map(|entry| entry.key().clone());

        match oldest {
            Some(id) => {
                tracing::debug!("Browsing context limit reached, evicting '{}'", id);
                self.contexts.remove(&id).is_some()
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn snapshot(&self) -> Vec<ContextSnapshot> {
        let mut contexts: Vec<_> = self
            .contexts
            .iter()
            .map(|entry| ContextSnapshot {
                id: entry.key().clone(),
                timestamp: entry.value().context.timestamp(),
                created_at: entry.value().created_at,
                last_used: DateTime::from_timestamp_millis(entry.value().last_used_millis())
                    .unwrap_or(entry.value().created_at),
            })
            .collect();
        contexts.sort_by(|a, b| a.id.cmp(&b.id));
        contexts
    }
}
