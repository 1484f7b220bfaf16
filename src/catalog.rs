//! ProviderCatalog (spec.md §4.1).
//!
//! Holds the current set of providers and their models. Readers take an
//! `Arc` clone of the whole snapshot so they never block each other or
//! observe a half-applied `upsert`; writers build a new snapshot and swap
//! it in under a short-lived lock, the same copy-on-write shape as the
//! teacher's `Arc<RwLock<HashMap<..>>>` health map in `llm/router.rs`,
//! specialized here for whole-map replacement.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{CoreError, CoreResult};
use crate::model::Provider;

type CatalogMap = HashMap<String, Provider>;

/// In-memory description of providers, models, and capabilities.
pub struct ProviderCatalog {
    snapshot: RwLock<Arc<CatalogMap>>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn from_providers(providers: impl IntoIterator<Item = Provider>) -> Self {
        let map: CatalogMap = providers.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            snapshot: RwLock::new(Arc::new(map)),
        }
    }

    /// A consistent, point-in-time snapshot of all providers. Cheap: clones
    /// an `Arc`, not the map.
    pub async fn list(&self) -> Arc<CatalogMap> {
        self.snapshot.read().await.clone()
    }

    /// Looks up a single provider by id.
    pub async fn get(&self, provider_id: &str) -> CoreResult<Provider> {
        self.snapshot
            .read()
            .await
            .get(provider_id)
            .cloned()
            .ok_or_else(|| CoreError::UnknownProvider(provider_id.to_string()))
    }

    /// Atomically replaces (or inserts) a provider entry.
    pub async fn upsert(&self, provider: Provider) {
        let mut guard = self.snapshot.write().await;
        let mut next = (**guard).clone();
        next.insert(provider.id.clone(), provider);
        *guard = Arc::new(next);
    }

    /// Removes a provider entry, if present.
    pub async fn remove(&self, provider_id: &str) {
        let mut guard = self.snapshot.write().await;
        if guard.contains_key(provider_id) {
            let mut next = (**guard).clone();
            next.remove(provider_id);
            *guard = Arc::new(next);
        }
    }
}

impl Default for ProviderCatalog {
    fn default() -> Self {
        Self::new()
    }
}
