//! Store registry.
//!
//! The registry hands out one [`Store`] per slot name, constructed on first
//! use and shared afterwards, so two parts of a process never hold diverging
//! snapshots of the same slot. Pass the registry (it is cheap to clone)
//! wherever stores are needed instead of reaching for globals.
//!
//! Internally the registry is backed by [`DashMap`], so lookups from many
//! tasks do not contend on a global lock.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::backend::{Backend, open_backend};
use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::store::Store;

/// Shared factory of named stores over one backend.
#[derive(Clone)]
pub struct StoreRegistry {
    backend: Arc<dyn Backend>,
    config: Arc<StoreConfig>,
    stores: Arc<DashMap<String, Arc<Store>>>,
}

impl StoreRegistry {
    /// Create a registry over an already opened backend.
    pub fn new(backend: Arc<dyn Backend>, config: StoreConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
            stores: Arc::new(DashMap::new()),
        }
    }

    /// Open the configured backend and wrap it in a registry.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let backend = open_backend(&config.backend)?;
        Ok(Self::new(backend, config))
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The store for `name`, opening it on first request.
    pub fn store(&self, name: &str) -> StoreResult<Arc<Store>> {
        if let Some(existing) = self.stores.get(name) {
            return Ok(Arc::clone(existing.value()));
        }

        // Hydrate outside the map lock; if another caller won the race, keep theirs.
        let store = Arc::new(
            Store::builder(name)
                .caching(self.config.caching_for(name))
                .debounce(self.config.notify_debounce())
                .open(Arc::clone(&self.backend))?,
        );
        let entry = self.stores.entry(name.to_string()).or_insert(store);
        debug!(store = name, "store registered");
        Ok(Arc::clone(entry.value()))
    }

    /// A store with no slot, for scratch data.
    pub fn ephemeral(&self) -> Store {
        Store::ephemeral(Arc::clone(&self.backend))
    }

    /// Names of stores opened so far.
    pub fn open_stores(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Whether `slot` is on the essential allow-list.
    pub fn is_essential(&self, slot: &str) -> bool {
        self.config.backup.essential_slots.iter().any(|s| s == slot)
    }

    /// Remove every backend slot that is not essential.
    ///
    /// Open stores for removed slots are reloaded so they drop their cached
    /// view and notify subscribers. Returns the removed slot names.
    pub fn clear_non_essential(&self) -> StoreResult<Vec<String>> {
        let mut removed = Vec::new();
        for slot in self.backend.list_slots()? {
            if self.is_essential(&slot) {
                continue;
            }
            if self.backend.remove(&slot)? {
                removed.push(slot);
            }
        }

        for slot in &removed {
            let store = self.stores.get(slot).map(|e| Arc::clone(e.value()));
            if let Some(store) = store {
                store.reload()?;
            }
        }

        info!(removed = removed.len(), "non-essential slots cleared");
        Ok(removed)
    }
}

// ── tests ────────────────────────────────────────────────────────────
