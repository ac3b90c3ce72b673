//! Thread-safe map of pool name to [`PollState`]. Registration happens
//! whenever the controller observes a RunnerPool create/update event;
//! removal happens on delete. Reads and writes are linearizable per
//! key — the scheduler only ever needs a consistent point-in-time
//! snapshot of the whole map to decide which pools are due.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::crd::RunnerPoolSpec;

#[derive(Debug, Clone)]
pub struct PollState {
    pub namespace: String,
    pub spec: RunnerPoolSpec,
    pub pat: String,
    pub poll_interval_seconds: i32,
    pub last_polled: DateTime<Utc>,
}

impl PollState {
    fn new(namespace: String, spec: RunnerPoolSpec, pat: String) -> Self {
        let poll_interval_seconds = spec.poll_interval_seconds.max(5);
        Self {
            namespace,
            spec,
            pat,
            poll_interval_seconds,
            // a past timestamp so the very first scheduler tick fires
            // immediately rather than waiting a full interval
            last_polled: Utc::now() - chrono::Duration::seconds(poll_interval_seconds as i64),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PoolRegistry {
    inner: Arc<RwLock<HashMap<String, PollState>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entry for `(namespace, name)` and resets
    /// `last_polled` so a poll fires on the scheduler's next tick,
    /// regardless of normal cadence.
    pub async fn upsert(&self, namespace: &str, name: &str, spec: RunnerPoolSpec, pat: String) {
        let key = registry_key(namespace, name);
        let mut guard = self.inner.write().await;
        guard.insert(key, PollState::new(namespace.to_string(), spec, pat));
    }

    pub async fn remove(&self, namespace: &str, name: &str) {
        let key = registry_key(namespace, name);
        let mut guard = self.inner.write().await;
        guard.remove(&key);
    }

    /// A point-in-time copy of all registered pools, keyed by
    /// `namespace/name`.
    pub async fn snapshot(&self) -> HashMap<String, PollState> {
        self.inner.read().await.clone()
    }

    pub async fn mark_polled(&self, namespace: &str, name: &str, at: DateTime<Utc>) {
        let key = registry_key(namespace, name);
        let mut guard = self.inner.write().await;
        if let Some(state) = guard.get_mut(&key) {
            state.last_polled = at;
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn registry_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}
