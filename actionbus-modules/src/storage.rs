//! Storage aggregation
//!
//! Zero, one, or many storage-capable modules stand behind one uniform
//! per-module storage API. Reads go to the primary only; writes fan out
//! to the primary and every secondary concurrently, with secondaries as
//! best-effort mirrors.

use std::sync::Arc;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::warn;

use actionbus_core::config::StorageRole;
use actionbus_core::{Error, Result};

use crate::traits::StorageBackend;

/// Registry of storage-capable modules, by role
///
/// Mutated only during startup by the module registry; read thereafter by
/// concurrent storage calls.
#[derive(Default)]
pub struct StorageRegistry {
    /// Primary (read/write) backend, used for fetch, store, and remove
    primary: Option<Arc<dyn StorageBackend>>,
    /// Secondary (write-only) backends, used for store and remove only
    secondaries: Vec<Arc<dyn StorageBackend>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under the given role
    pub fn register(&mut self, role: StorageRole, backend: Arc<dyn StorageBackend>) -> Result<()> {
        match role {
            StorageRole::None => Ok(()),
            StorageRole::Primary => {
                if self.primary.is_some() {
                    return Err(Error::DuplicatePrimaryStorage);
                }
                self.primary = Some(backend);
                Ok(())
            }
            StorageRole::Secondary => {
                self.secondaries.push(backend);
                Ok(())
            }
        }
    }

    /// Whether a primary backend has been registered
    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// Number of registered secondary backends
    pub fn secondary_count(&self) -> usize {
        self.secondaries.len()
    }
}

/// Shared handle to the storage registry
pub type SharedStorageRegistry = Arc<RwLock<StorageRegistry>>;

/// Storage API methods provided to a module, keyed by that module's name
#[derive(Clone)]
pub struct ModuleStorage {
    registry: SharedStorageRegistry,
    module_name: String,
}

impl ModuleStorage {
    pub fn new(registry: SharedStorageRegistry, module_name: impl Into<String>) -> Self {
        Self {
            registry,
            module_name: module_name.into(),
        }
    }

    /// Fetch a value by key from the primary backend
    pub async fn fetch<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let registry = self.registry.read().await;
        let primary = registry.primary.as_ref().ok_or(Error::NoPrimaryStorage)?;
        match primary.fetch(&self.module_name, key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Store a JSON-serializable value by key, fanned out to all backends
    ///
    /// Secondary write failures are logged and swallowed; a primary write
    /// failure surfaces to the caller.
    pub async fn store<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        let registry = self.registry.read().await;
        let primary = registry.primary.as_ref().ok_or(Error::NoPrimaryStorage)?;

        let primary_write = primary.store(&self.module_name, key, &raw);
        let secondary_writes = join_all(
            registry
                .secondaries
                .iter()
                .map(|s| s.store(&self.module_name, key, &raw)),
        );
        let (primary_result, secondary_results) = tokio::join!(primary_write, secondary_writes);
        for result in secondary_results {
            if let Err(e) = result {
                warn!(
                    "Secondary storage write failed for ('{}', '{}'): {}",
                    self.module_name, key, e
                );
            }
        }
        primary_result
    }

    /// Remove a stored value by key, fanned out to all backends
    pub async fn remove(&self, key: &str) -> Result<()> {
        let registry = self.registry.read().await;
        let primary = registry.primary.as_ref().ok_or(Error::NoPrimaryStorage)?;

        let primary_remove = primary.remove(&self.module_name, key);
        let secondary_removes = join_all(
            registry
                .secondaries
                .iter()
                .map(|s| s.remove(&self.module_name, key)),
        );
        let (primary_result, secondary_results) = tokio::join!(primary_remove, secondary_removes);
        for result in secondary_results {
            if let Err(e) = result {
                warn!(
                    "Secondary storage remove failed for ('{}', '{}'): {}",
                    self.module_name, key, e
                );
            }
        }
        primary_result
    }
}
