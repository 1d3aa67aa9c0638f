//! In-memory storage module
//!
//! Keeps all values in a process-local map. Useful as a primary store in
//! development and tests, or as a throwaway secondary mirror.

use std::collections::HashMap;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use actionbus_core::Result;

use crate::traits::{BusModule, InitResponse, ModuleApi, ModuleContext, StorageBackend};

/// Catalog path key for this module
pub const PATH: &str = "memory-storage";

/// Declared module name
pub const MODULE_NAME: &str = "MemoryStorage";

/// In-memory storage module
pub struct MemoryStorageModule;

#[async_trait]
impl BusModule for MemoryStorageModule {
    fn module_name(&self) -> &str {
        MODULE_NAME
    }

    async fn initialize(&self, ctx: ModuleContext) -> Result<InitResponse> {
        Ok(InitResponse::default().with_storage(Arc::new(MemoryStore::new(ctx.api.clone()))))
    }
}

/// Backing store: module name -> key -> serialized value
struct MemoryStore {
    api: ModuleApi,
    entries: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryStore {
    fn new(api: ModuleApi) -> Self {
        Self {
            api,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    async fn fetch(&self, module_name: &str, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        let value = entries
            .get(module_name)
            .and_then(|bucket| bucket.get(key))
            .cloned();
        self.api.log_debug(format!(
            "Fetched ('{}', '{}'): {}",
            module_name,
            key,
            match &value {
                Some(v) => format!("'{}'", v),
                None => "not found".to_string(),
            }
        ));
        Ok(value)
    }

    async fn store(&self, module_name: &str, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let bucket = entries.entry(module_name.to_string()).or_default();
        let found = bucket.insert(key.to_string(), value.to_string()).is_some();
        self.api.log_debug(format!(
            "Stored {} ('{}', '{}'): '{}'",
            if found { "overwritten" } else { "new" },
            module_name,
            key,
            value
        ));
        Ok(())
    }

    async fn remove(&self, module_name: &str, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let found = entries
            .get_mut(module_name)
            .map(|bucket| bucket.remove(key).is_some())
            .unwrap_or(false);
        self.api.log_debug(format!(
            "Removed {}existent ('{}', '{}')",
            if found { "" } else { "non" },
            module_name,
            key
        ));
        Ok(())
    }
}
