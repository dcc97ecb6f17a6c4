//! In-process replay store.
//!
//! Entries expire lazily: an entry whose expiry is at or before `now` is
//! treated as absent and overwritten. `purge_expired` (or the sweeper task)
//! only reclaims memory.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::task::JoinHandle;

use crate::services::replay::store::{ReplayError, ReplayStore, StoreFuture};

#[derive(Debug, Default)]
pub struct InMemoryReplayStore {
    // jti -> expiry
    entries: DashMap<String, DateTime<Utc>>,
}

impl InMemoryReplayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry whose expiry is at or before `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expiry| *expiry > now);
        before.saturating_sub(self.entries.len())
    }

    /// Periodically purge expired entries on the tokio runtime.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.purge_expired(Utc::now());
                if removed > 0 {
                    tracing::debug!(removed, remaining = self.len(), "replay sweep");
                }
            }
        })
    }

    fn insert_if_absent(&self, jti: &str, now: DateTime<Utc>, ttl: Duration) -> bool {
        let expiry = expiry_after(now, ttl);

        // The entry guard holds the shard lock, so check + insert is atomic per jti.
        match self.entries.entry(jti.to_string()) {
            Entry::Occupied(mut e) => {
                if *e.get() <= now {
                    e.insert(expiry);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(e) => {
                e.insert(expiry);
                true
            }
        }
    }
}

impl ReplayStore for InMemoryReplayStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn check_and_store<'a>(
        &'a self,
        jti: &'a str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> StoreFuture<'a, Result<bool, ReplayError>> {
        Box::pin(async move { Ok(self.insert_if_absent(jti, now, ttl)) })
    }
}

pub(crate) fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
