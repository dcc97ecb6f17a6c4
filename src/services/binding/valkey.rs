use std::{sync::Arc, time::Duration};

use crate::services::{
    binding::{
        store::{BindingStore, BindingStoreError},
        types::{BindingReference, TokenBinding},
    },
    cache::{CacheClient, CacheError, ValkeyClient},
    replay::StoreFuture,
};

// SET NX attempts per insert: the first one, plus one retry if the existing
// key expired before it could be read.
const INSERT_ATTEMPTS: usize = 2;

/// Valkey-backed binding store.
///
/// - `<prefix>:binding:<ref>`: JSON binding, first write wins (`SET NX`)
/// - `<prefix>:revoked:<ref>`: revocation marker
#[derive(Clone)]
pub struct ValkeyBindingStore<C: CacheClient> {
    cache: Arc<C>,
    prefix: String,
}

impl ValkeyBindingStore<ValkeyClient> {
    pub async fn new(redis_url: &str) -> Result<Self, BindingStoreError> {
        let client = ValkeyClient::new(redis_url).await?;
        Ok(Self::new_with_cache(Arc::new(client), "dpop"))
    }
}

impl<C: CacheClient> ValkeyBindingStore<C> {
    pub fn new_with_cache(cache: Arc<C>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, reference: &BindingReference) -> String {
        format!("{}:binding:{}", self.prefix, reference.as_str())
    }

    pub fn revoked_key(&self, reference: &BindingReference) -> String {
        format!("{}:revoked:{}", self.prefix, reference.as_str())
    }

    async fn read(
        &self,
        reference: &BindingReference,
    ) -> Result<Option<TokenBinding>, BindingStoreError> {
        let Some(raw) = self.cache.get_string(&self.key(reference)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

impl<C: CacheClient> BindingStore for ValkeyBindingStore<C> {
    fn backend_name(&self) -> &'static str {
        self.cache.backend_name()
    }

    fn insert_if_absent<'a>(
        &'a self,
        binding: TokenBinding,
        ttl: Duration,
    ) -> StoreFuture<'a, Result<Option<TokenBinding>, BindingStoreError>> {
        Box::pin(async move {
            let key = self.key(&binding.binding_ref);
            let value = serde_json::to_string(&binding)?;

            for _ in 0..INSERT_ATTEMPTS {
                if self.cache.set_if_absent_with_ttl(&key, &value, ttl).await? {
                    return Ok(None);
                }
                // SET NX lost; the holder may expire before we read it
                if let Some(existing) = self.read(&binding.binding_ref).await? {
                    return Ok(Some(existing));
                }
            }

            tracing::warn!(key = %key, "binding key kept vanishing between SET NX and GET");
            Err(CacheError::InvalidValue(format!("binding slot {key} is contended")).into())
        })
    }

    fn get<'a>(
        &'a self,
        reference: &'a BindingReference,
    ) -> StoreFuture<'a, Result<Option<TokenBinding>, BindingStoreError>> {
        Box::pin(self.read(reference))
    }

    fn mark_revoked<'a>(
        &'a self,
        reference: &'a BindingReference,
        ttl: Duration,
    ) -> StoreFuture<'a, Result<bool, BindingStoreError>> {
        Box::pin(async move {
            Ok(self
                .cache
                .set_if_absent_with_ttl(&self.revoked_key(reference), "1", ttl)
                .await?)
        })
    }

    fn is_revoked<'a>(
        &'a self,
        reference: &'a BindingReference,
    ) -> StoreFuture<'a, Result<bool, BindingStoreError>> {
        Box::pin(async move {
            Ok(self
                .cache
                .get_string(&self.revoked_key(reference))
                .await?
                .is_some())
        })
    }
}
