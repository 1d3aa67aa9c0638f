//! The module contract
//!
//! A module declares a stable logical name and an initialization entry
//! point. Initialization receives the module's private view of the bus (a
//! filtered action stream plus an API surface) and may return a storage
//! implementation and/or a reaction stream of further dispatch actions.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use actionbus_core::action::{Action, DispatchAction};
use actionbus_core::bus::ActionBus;
use actionbus_core::Result;

use crate::storage::ModuleStorage;

/// Storage capability implementation exposed by a module
///
/// Values are string-serialized; keys are namespaced by the calling
/// module's name so modules cannot collide.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Fetch a stored value, if present
    async fn fetch(&self, module_name: &str, key: &str) -> Result<Option<String>>;

    /// Store a value by key
    async fn store(&self, module_name: &str, key: &str, value: &str) -> Result<()>;

    /// Remove a stored value by key
    async fn remove(&self, module_name: &str, key: &str) -> Result<()>;
}

/// Stream of further dispatch actions a module emits after initialization
pub type ReactionStream = mpsc::Receiver<DispatchAction>;

/// Optional response from module initialization
#[derive(Default)]
pub struct InitResponse {
    /// Storage implementation, if the module has the storage capability
    pub storage: Option<Arc<dyn StorageBackend>>,
    /// Reaction (action feedback) stream, if any
    pub reactions: Option<ReactionStream>,
}

impl InitResponse {
    /// Attach a storage implementation
    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Attach a reaction stream
    pub fn with_reactions(mut self, reactions: ReactionStream) -> Self {
        self.reactions = Some(reactions);
        self
    }
}

/// The collection of API methods provided to every module
#[derive(Clone)]
pub struct ModuleApi {
    bus: ActionBus,
    module_id: String,
    module_name: String,
    storage: ModuleStorage,
}

impl ModuleApi {
    pub fn new(
        bus: ActionBus,
        module_id: impl Into<String>,
        module_name: impl Into<String>,
        storage: ModuleStorage,
    ) -> Self {
        Self {
            bus,
            module_id: module_id.into(),
            module_name: module_name.into(),
            storage,
        }
    }

    /// Dispatch an action to the bus, stamped with this module's identity
    pub fn dispatch(&self, action: DispatchAction) {
        self.bus
            .emit_from(action, &self.module_id, &self.module_name);
    }

    /// Storage API scoped to this module's name
    pub fn storage(&self) -> &ModuleStorage {
        &self.storage
    }

    /// Log a message prefixed with this module's identity
    pub fn log(&self, text: impl AsRef<str>) {
        info!("[{}] {}", self.module_id, text.as_ref());
    }

    /// Log a debug message prefixed with this module's identity
    pub fn log_debug(&self, text: impl AsRef<str>) {
        debug!("[{}] {}", self.module_id, text.as_ref());
    }
}

/// Parameters provided when initializing a module
pub struct ModuleContext {
    /// Unique identifier of this module instance
    pub module_id: String,
    /// Configuration for the module, arbitrary per module
    pub config: Value,
    /// API methods provided to the module
    pub api: ModuleApi,
    /// Stream of bus actions seen by this module
    pub actions: mpsc::Receiver<Action>,
}

/// The contract every module implementation must satisfy
#[async_trait]
pub trait BusModule: Send + Sync {
    /// Unique name of this module; also used as default moduleId
    fn module_name(&self) -> &str;

    /// Module initialization entry point
    async fn initialize(&self, ctx: ModuleContext) -> Result<InitResponse>;
}
