//! Binding registry: which key thumbprint may use which token.
//!
//! The proof signature establishes possession; this registry establishes
//! authorization. The first write for a reference wins and is never replaced
//! or removed; revoking a token records a marker next to its binding.

pub mod memory;
pub mod store;
pub mod types;
pub mod valkey;

use std::{sync::Arc, time::Duration};

pub use memory::InMemoryBindingStore;
pub use store::{BindingStore, BindingStoreError};
pub use types::{BindingReference, TokenBinding};
pub use valkey::ValkeyBindingStore;

use crate::services::dpop::{error::DpopError, types::JwkThumbprint};

#[derive(Clone)]
pub struct BindingRegistry {
    store: Arc<dyn BindingStore>,
}

impl BindingRegistry {
    pub fn new(store: Arc<dyn BindingStore>) -> Self {
        Self { store }
    }

    /// Bind `reference` to `thumbprint` for `ttl`.
    ///
    /// Re-binding the same thumbprint is a no-op; a different one is `AlreadyBound`.
    /// A revoked reference cannot be bound again.
    pub async fn bind(
        &self,
        reference: BindingReference,
        thumbprint: JwkThumbprint,
        ttl: Duration,
    ) -> Result<TokenBinding, DpopError> {
        if self.is_revoked(&reference).await? {
            return Err(DpopError::TokenRevoked);
        }

        let binding = TokenBinding::dpop(reference, thumbprint);

        let existing = self
            .store
            .insert_if_absent(binding.clone(), ttl)
            .await
            .inspect_err(|e| self.log_failure(e))?;

        match existing {
            None => {
                tracing::debug!(
                    binding_ref = %binding.binding_ref.as_str(),
                    jkt = %binding.binding_value,
                    "token bound to DPoP key"
                );
                Ok(binding)
            }
            Some(current) if current.binding_value.matches(binding.binding_value.as_str()) => {
                Ok(current)
            }
            Some(current) => {
                tracing::warn!(
                    binding_ref = %current.binding_ref.as_str(),
                    "rejecting rebind to a different DPoP key"
                );
                Err(DpopError::AlreadyBound)
            }
        }
    }

    /// `Ok(true)` iff a binding exists and its thumbprint equals `thumbprint`.
    pub async fn verify_binding(
        &self,
        reference: &BindingReference,
        thumbprint: &JwkThumbprint,
    ) -> Result<bool, DpopError> {
        let binding = self
            .lookup(reference)
            .await?
            .ok_or(DpopError::NoBindingFound)?;

        Ok(binding.binding_value.matches(thumbprint.as_str()))
    }

    pub async fn lookup(
        &self,
        reference: &BindingReference,
    ) -> Result<Option<TokenBinding>, DpopError> {
        Ok(self
            .store
            .get(reference)
            .await
            .inspect_err(|e| self.log_failure(e))?)
    }

    /// Mark the token behind `reference` revoked for `ttl`; its binding stays.
    ///
    /// Returns whether this call recorded the revocation.
    pub async fn revoke(
        &self,
        reference: &BindingReference,
        ttl: Duration,
    ) -> Result<bool, DpopError> {
        Ok(self
            .store
            .mark_revoked(reference, ttl)
            .await
            .inspect_err(|e| self.log_failure(e))?)
    }

    pub async fn is_revoked(&self, reference: &BindingReference) -> Result<bool, DpopError> {
        Ok(self
            .store
            .is_revoked(reference)
            .await
            .inspect_err(|e| self.log_failure(e))?)
    }

    /// Record the `dpop_jkt` sent with an authorization request.
    pub async fn bind_authorization_code(
        &self,
        code: &str,
        jkt: JwkThumbprint,
        ttl: Duration,
    ) -> Result<TokenBinding, DpopError> {
        self.bind(BindingReference::for_authorization_code(code), jkt, ttl)
            .await
    }

    fn log_failure(&self, e: &BindingStoreError) {
        tracing::error!(
            error = ?e,
            backend = self.store.backend_name(),
            "binding store failure"
        );
    }
}
