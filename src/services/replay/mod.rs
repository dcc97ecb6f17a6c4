//! Replay guard: single-use enforcement for proof `jti` values.

pub mod memory;
pub mod store;
pub mod valkey;

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

pub use memory::InMemoryReplayStore;
pub use store::{ReplayError, ReplayStore, StoreFuture};
pub use valkey::ValkeyReplayStore;

/// Thin wrapper over the configured store.
#[derive(Clone)]
pub struct ReplayGuard {
    store: Arc<dyn ReplayStore>,
}

impl ReplayGuard {
    pub fn new(store: Arc<dyn ReplayStore>) -> Self {
        Self { store }
    }

    /// Consume `jti`. `Ok(false)` means it was already consumed within its window.
    pub async fn check_and_consume(
        &self,
        jti: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, ReplayError> {
        self.store
            .check_and_store(jti, now, ttl)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    error = ?e,
                    backend = self.store.backend_name(),
                    "replay store failure"
                );
            })
    }
}
