//! In-process binding store.
//!
//! Expired bindings and revocation markers read as absent. `purge_expired`
//! (or the sweeper task) only reclaims memory.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::task::JoinHandle;

use crate::services::{
    binding::{
        store::{BindingStore, BindingStoreError},
        types::{BindingReference, TokenBinding},
    },
    replay::StoreFuture,
};

#[derive(Debug, Default)]
pub struct InMemoryBindingStore {
    entries: DashMap<BindingReference, (TokenBinding, Instant)>,
    // reference -> expiry of the revocation marker
    revoked: DashMap<BindingReference, Instant>,
}

impl InMemoryBindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bindings plus revocation markers, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len() + self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every binding and marker whose expiry is at or before `now`.
    /// Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.len();
        self.entries.retain(|_, (_, expires)| *expires > now);
        self.revoked.retain(|_, expires| *expires > now);
        before.saturating_sub(self.len())
    }

    /// Periodically purge expired entries on the tokio runtime.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.purge_expired(Instant::now());
                if removed > 0 {
                    tracing::debug!(removed, remaining = self.len(), "binding sweep");
                }
            }
        })
    }

    fn insert(&self, binding: TokenBinding, ttl: Duration) -> Option<TokenBinding> {
        let now = Instant::now();
        let expires = expiry_after(now, ttl);

        match self.entries.entry(binding.binding_ref.clone()) {
            Entry::Occupied(mut e) => {
                if e.get().1 > now {
                    return Some(e.get().0.clone());
                }
                e.insert((binding, expires));
                None
            }
            Entry::Vacant(e) => {
                e.insert((binding, expires));
                None
            }
        }
    }

    fn revoke(&self, reference: &BindingReference, ttl: Duration) -> bool {
        let now = Instant::now();
        let expires = expiry_after(now, ttl);

        match self.revoked.entry(reference.clone()) {
            Entry::Occupied(mut e) => {
                if *e.get() > now {
                    return false;
                }
                e.insert(expires);
                true
            }
            Entry::Vacant(e) => {
                e.insert(expires);
                true
            }
        }
    }
}

fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    // `Instant` has no MAX; ~100 years stands in for "never"
    now.checked_add(ttl)
        .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 24 * 3600))
}

impl BindingStore for InMemoryBindingStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn insert_if_absent<'a>(
        &'a self,
        binding: TokenBinding,
        ttl: Duration,
    ) -> StoreFuture<'a, Result<Option<TokenBinding>, BindingStoreError>> {
        Box::pin(async move { Ok(self.insert(binding, ttl)) })
    }

    fn get<'a>(
        &'a self,
        reference: &'a BindingReference,
    ) -> StoreFuture<'a, Result<Option<TokenBinding>, BindingStoreError>> {
        Box::pin(async move {
            Ok(self
                .entries
                .get(reference)
                .filter(|e| e.value().1 > Instant::now())
                .map(|e| e.value().0.clone()))
        })
    }

    fn mark_revoked<'a>(
        &'a self,
        reference: &'a BindingReference,
        ttl: Duration,
    ) -> StoreFuture<'a, Result<bool, BindingStoreError>> {
        Box::pin(async move { Ok(self.revoke(reference, ttl)) })
    }

    fn is_revoked<'a>(
        &'a self,
        reference: &'a BindingReference,
    ) -> StoreFuture<'a, Result<bool, BindingStoreError>> {
        Box::pin(async move {
            Ok(self
                .revoked
                .get(reference)
                .is_some_and(|e| *e.value() > Instant::now()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dpop::types::JwkThumbprint;

    fn binding(reference: &str) -> TokenBinding {
        TokenBinding::dpop(BindingReference::new(reference), JwkThumbprint::new("jkt"))
    }

    #[tokio::test]
    async fn purge_reclaims_expired_bindings_and_markers() {
        let store = InMemoryBindingStore::new();
        store
            .insert_if_absent(binding("short"), Duration::ZERO)
            .await
            .unwrap();
        store
            .insert_if_absent(binding("long"), Duration::from_secs(3600))
            .await
            .unwrap();
        store
            .mark_revoked(&BindingReference::new("gone"), Duration::ZERO)
            .await
            .unwrap();
        store
            .mark_revoked(&BindingReference::new("long"), Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(store.len(), 4);

        assert_eq!(store.purge_expired(Instant::now()), 2);
        assert_eq!(store.len(), 2);
        assert!(
            store
                .get(&BindingReference::new("long"))
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .is_revoked(&BindingReference::new("long"))
                .await
                .unwrap()
        );

        // nothing left to reclaim
        assert_eq!(store.purge_expired(Instant::now()), 0);
    }

    #[tokio::test]
    async fn revocation_is_recorded_once_and_keeps_the_binding() {
        let store = InMemoryBindingStore::new();
        let r = BindingReference::new("at-1");
        store
            .insert_if_absent(binding("at-1"), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(!store.is_revoked(&r).await.unwrap());
        assert!(store.mark_revoked(&r, Duration::from_secs(60)).await.unwrap());
        assert!(!store.mark_revoked(&r, Duration::from_secs(60)).await.unwrap());
        assert!(store.is_revoked(&r).await.unwrap());
        assert_eq!(store.get(&r).await.unwrap(), Some(binding("at-1")));
    }

    #[tokio::test]
    async fn sweeper_purges_on_its_interval() {
        let store = Arc::new(InMemoryBindingStore::new());
        store
            .insert_if_absent(binding("short"), Duration::ZERO)
            .await
            .unwrap();

        let handle = store.clone().spawn_sweeper(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(store.is_empty());
        handle.abort();
    }
}
