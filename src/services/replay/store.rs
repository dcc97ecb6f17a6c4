use std::{future::Future, pin::Pin, time::Duration};

use chrono::{DateTime, Utc};

use crate::services::cache::CacheError;

/// Boxed future returned by the store traits (object-safe async).
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Consumed-`jti` store.
///
/// Implementations must make `check_and_store` atomic per key: under N
/// concurrent calls for one `jti`, exactly one observes `Ok(true)`.
pub trait ReplayStore: Send + Sync {
    // Backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Atomically check whether `jti` was already seen and, if not (or if its
    // entry expired at or before `now`), store it until `now + ttl`.
    //
    // Returns:
    // - Ok(true)  => first time (stored successfully)
    // - Ok(false) => replay detected (live entry exists)
    // - Err(_)    => backend failure (caller must fail closed)
    fn check_and_store<'a>(
        &'a self,
        jti: &'a str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> StoreFuture<'a, Result<bool, ReplayError>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Cache(#[from] CacheError),
}
