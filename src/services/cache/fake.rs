//! In-process `CacheClient` for exercising the Valkey-backed stores in tests.

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use crate::services::cache::client::{CacheClient, CacheError, CacheResult};

#[derive(Clone, Default)]
pub(crate) struct FakeCache {
    entries: Arc<DashMap<String, (String, Instant)>>,
    failing: Arc<AtomicBool>,
    lost_set_nx: Arc<AtomicUsize>,
}

impl FakeCache {
    pub(crate) fn fail_commands(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// The next `n` SET NX calls report the key as taken, and the key is gone
    /// by the time anyone reads it (it expired in between).
    pub(crate) fn lose_next_set_if_absent(&self, n: usize) {
        self.lost_set_nx.store(n, Ordering::SeqCst);
    }

    fn check(&self) -> CacheResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::BackendCommand("connection reset".into()));
        }
        Ok(())
    }

    pub(crate) fn raw(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|e| e.value().0.clone())
    }
}

#[async_trait]
impl CacheClient for FakeCache {
    fn backend_name(&self) -> &'static str {
        "fake"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        Ok(self
            .entries
            .get(key)
            .filter(|e| e.value().1 > Instant::now())
            .map(|e| e.value().0.clone()))
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool> {
        self.check()?;
        let lost = self
            .lost_set_nx
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            self.entries.remove(key);
            return Ok(false);
        }

        let expires = Instant::now() + ttl;
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut e) if e.get().1 <= Instant::now() => {
                e.insert((value.to_string(), expires));
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(e) => {
                e.insert((value.to_string(), expires));
                Ok(true)
            }
        }
    }
}
