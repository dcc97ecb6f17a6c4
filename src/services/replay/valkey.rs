use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use crate::services::{
    cache::{CacheClient, ValkeyClient},
    replay::store::{ReplayError, ReplayStore, StoreFuture},
};

/// Valkey-backed replay store (Redis protocol).
///
/// Expiry is delegated to the server (`PX`), so `now` is not consulted.
/// Fail-closed policy is implemented by returning `Err` on any backend error.
#[derive(Clone)]
pub struct ValkeyReplayStore<C: CacheClient> {
    cache: Arc<C>,
    // Key prefix to avoid collisions across environments
    prefix: String,
}

impl ValkeyReplayStore<ValkeyClient> {
    pub async fn new(redis_url: &str) -> Result<Self, ReplayError> {
        Self::new_with_prefix(redis_url, "dpop:replay").await
    }

    pub async fn new_with_prefix(
        redis_url: &str,
        prefix: impl Into<String>,
    ) -> Result<Self, ReplayError> {
        let client = ValkeyClient::new(redis_url).await?;

        Ok(Self {
            cache: Arc::new(client),
            prefix: prefix.into(),
        })
    }
}

impl<C: CacheClient> ValkeyReplayStore<C> {
    pub fn new_with_cache(cache: Arc<C>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, jti: &str) -> String {
        format!("{}:{}", self.prefix, jti)
    }
}

impl<C: CacheClient> ReplayStore for ValkeyReplayStore<C> {
    fn backend_name(&self) -> &'static str {
        self.cache.backend_name()
    }

    fn check_and_store<'a>(
        &'a self,
        jti: &'a str,
        _now: DateTime<Utc>,
        ttl: Duration,
    ) -> StoreFuture<'a, Result<bool, ReplayError>> {
        Box::pin(async move {
            let full_key = self.key(jti);

            // SET <key> "1" NX PX <ttl>
            let res = self
                .cache
                .set_if_absent_with_ttl(&full_key, "1", ttl)
                .await?;

            Ok(res)
        })
    }
}
