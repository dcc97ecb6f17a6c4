//! Cache client interface used by the Valkey-backed replay and binding stores.
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-layer errors (transport/command/serialization).
///
/// Note:
/// - Kept independent from `DpopError` so each store decides how to surface it.
///   Both DPoP stores fail closed.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    BackendConnection(String),
    #[error("cache command error: {0}")]
    BackendCommand(String),
    #[error("cache value error: {0}")]
    InvalidValue(String),
}

/// A minimal cache interface.
///
/// Small and string-based:
/// - replay protection only needs `SET NX` + TTL
/// - token bindings and revocation markers add `GET`
///
/// Implementations must be cheap to clone (typically `Arc<...>` inside).
#[async_trait]
pub trait CacheClient: Clone + Send + Sync + 'static {
    // Returns the cache backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Get UTF-8 string value.
    async fn get_string(&self, key: &str) -> CacheResult<Option<String>>;

    // Set value if the key does not exist, with TTL.
    //
    // Returns:
    // - `Ok(true)`  if the key was set (not seen before)
    // - `Ok(false)` if the key already exists
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool>;
}
