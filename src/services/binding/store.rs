use std::time::Duration;

use crate::services::{
    binding::types::{BindingReference, TokenBinding},
    cache::CacheError,
    replay::StoreFuture,
};

/// Token binding persistence.
///
/// `insert_if_absent` must be atomic per reference; it never overwrites.
/// Revocation is recorded next to the binding and never removes it.
pub trait BindingStore: Send + Sync {
    // Backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Store `binding` unless one exists for its reference.
    //
    // Returns:
    // - Ok(None)           => stored
    // - Ok(Some(existing)) => left untouched; the current binding is returned
    fn insert_if_absent<'a>(
        &'a self,
        binding: TokenBinding,
        ttl: Duration,
    ) -> StoreFuture<'a, Result<Option<TokenBinding>, BindingStoreError>>;

    fn get<'a>(
        &'a self,
        reference: &'a BindingReference,
    ) -> StoreFuture<'a, Result<Option<TokenBinding>, BindingStoreError>>;

    // Record that the token behind `reference` is revoked, for `ttl`.
    // Returns whether this call recorded it (false when already revoked).
    fn mark_revoked<'a>(
        &'a self,
        reference: &'a BindingReference,
        ttl: Duration,
    ) -> StoreFuture<'a, Result<bool, BindingStoreError>>;

    fn is_revoked<'a>(
        &'a self,
        reference: &'a BindingReference,
    ) -> StoreFuture<'a, Result<bool, BindingStoreError>>;
}

#[derive(Debug, thiserror::Error)]
pub enum BindingStoreError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("stored binding is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
