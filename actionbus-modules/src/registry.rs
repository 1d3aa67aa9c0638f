//! Module registry and lifecycle
//!
//! Turns a list of module specs into running module instances wired into
//! the bus: resolves factories from the catalog, enforces name and id
//! uniqueness, builds each module's filtered action stream and API
//! surface, invokes initialization, and supervises reaction streams.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use actionbus_core::action::Action;
use actionbus_core::bus::{ActionBus, Subscription};
use actionbus_core::config::{ModuleSpec, StorageRole};
use actionbus_core::{Error, Result};

use crate::storage::{ModuleStorage, SharedStorageRegistry, StorageRegistry};
use crate::traits::{BusModule, ModuleApi, ModuleContext};

/// Constructor for a module implementation
pub type ModuleFactory = Arc<dyn Fn() -> Arc<dyn BusModule> + Send + Sync>;

/// Registry of named module constructors
///
/// Replaces runtime dynamic import: a spec's `path` is a lookup key into
/// this compiled-in catalog.
#[derive(Default, Clone)]
pub struct ModuleCatalog {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleCatalog {
    /// An empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog pre-populated with the built-in modules
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(crate::builtin::memory_storage::PATH, || {
            crate::builtin::memory_storage::MemoryStorageModule
        });
        catalog.register(crate::builtin::heartbeat::PATH, || {
            crate::builtin::heartbeat::HeartbeatModule
        });
        catalog
    }

    /// Register a module factory under a path key
    pub fn register<M, F>(&mut self, path: impl Into<String>, factory: F)
    where
        M: BusModule + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.factories.insert(
            path.into(),
            Arc::new(move || Arc::new(factory()) as Arc<dyn BusModule>),
        );
    }

    /// Construct the module registered under a path key, if any
    pub fn create(&self, path: &str) -> Option<Arc<dyn BusModule>> {
        self.factories.get(path).map(|f| f())
    }
}

/// A module that has been loaded and initialized
pub struct LoadedModule {
    /// Unique module instance id for the life of the process
    pub module_id: String,
    /// The spec this module was loaded from
    pub spec: ModuleSpec,
    /// The module implementation
    pub module: Arc<dyn BusModule>,
    /// Subscription feeding the module's filtered action stream
    stream_sub: Subscription,
    /// Task piping the module's reaction stream back into the bus
    reaction_task: Option<JoinHandle<()>>,
}

impl LoadedModule {
    /// Whether this module returned a reaction stream
    pub fn has_reactions(&self) -> bool {
        self.reaction_task.is_some()
    }
}

/// The registry of all loaded modules
pub struct ModuleRegistry {
    bus: ActionBus,
    catalog: ModuleCatalog,
    storage: SharedStorageRegistry,
    /// Imported modules cached by path
    import_cache: HashMap<String, Arc<dyn BusModule>>,
    /// Import path claimed by each module name, for uniqueness
    paths_by_name: HashMap<String, String>,
    /// Loaded modules by module id
    modules: HashMap<String, LoadedModule>,
    /// Module ids in load order
    order: Vec<String>,
}

impl ModuleRegistry {
    pub fn new(bus: ActionBus, catalog: ModuleCatalog) -> Self {
        Self {
            bus,
            catalog,
            storage: Arc::new(RwLock::new(StorageRegistry::new())),
            import_cache: HashMap::new(),
            paths_by_name: HashMap::new(),
            modules: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Shared handle to the storage registry populated during loading
    pub fn storage_registry(&self) -> SharedStorageRegistry {
        Arc::clone(&self.storage)
    }

    /// Resolve and validate a module implementation from its path key
    ///
    /// Caches by path, so repeated specs referencing the same path reuse
    /// one import. A module name may only ever resolve to one path.
    fn import_module(&mut self, path: &str) -> Result<Arc<dyn BusModule>> {
        if let Some(module) = self.import_cache.get(path) {
            return Ok(Arc::clone(module));
        }
        let module = self
            .catalog
            .create(path)
            .ok_or_else(|| Error::UnknownModulePath(path.to_string()))?;
        let module_name = module.module_name().to_string();
        if module_name.is_empty() {
            return Err(Error::InvalidModuleShape(path.to_string()));
        }
        if let Some(existing) = self.paths_by_name.get(&module_name) {
            if existing != path {
                return Err(Error::DuplicateModuleName {
                    name: module_name,
                    path: existing.clone(),
                });
            }
        } else {
            self.paths_by_name
                .insert(module_name, path.to_string());
        }
        self.import_cache
            .insert(path.to_string(), Arc::clone(&module));
        Ok(module)
    }

    /// Resolve a unique module id: override or default name, with a
    /// numeric suffix on collision
    fn resolve_module_id(&self, spec: &ModuleSpec, default_name: &str) -> String {
        let base = spec
            .module_id
            .clone()
            .unwrap_or_else(|| default_name.to_string());
        let mut module_id = base.clone();
        let mut n = 1;
        while self.modules.contains_key(&module_id) {
            n += 1;
            module_id = format!("{}.{}", base, n);
        }
        if module_id != base {
            warn!(
                "Module id '{}' already registered, using '{}'; consider an explicit moduleId",
                base, module_id
            );
        }
        module_id
    }

    /// Filter for a module's view of the bus: never targeted-client or
    /// targeted-screen actions, and targeted-module actions only for
    /// this module's own id
    fn module_stream_filter(module_id: String) -> impl Fn(&Action) -> bool {
        move |action| {
            if action.target_client_id.is_some() || action.target_screen_id.is_some() {
                return false;
            }
            if let Some(target) = &action.target_module_id {
                if *target != module_id {
                    return false;
                }
            }
            true
        }
    }

    /// Load and initialize one module from its spec
    ///
    /// Returns the assigned module id. Any failure here is fatal to
    /// startup; the caller must not proceed to initComplete.
    pub async fn load_module(&mut self, spec: ModuleSpec) -> Result<String> {
        let module = self.import_module(&spec.path)?;
        let module_name = module.module_name().to_string();
        let module_id = self.resolve_module_id(&spec, &module_name);

        let (actions, stream_sub) =
            self.bus
                .filtered_stream(Self::module_stream_filter(module_id.clone()));
        let api = ModuleApi::new(
            self.bus.clone(),
            module_id.clone(),
            module_name.clone(),
            ModuleStorage::new(Arc::clone(&self.storage), module_name.clone()),
        );
        let ctx = ModuleContext {
            module_id: module_id.clone(),
            config: spec
                .config
                .clone()
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            api: api.clone(),
            actions,
        };

        let response = module.initialize(ctx).await?;

        if spec.storage_role != StorageRole::None {
            let backend = response
                .storage
                .clone()
                .ok_or_else(|| Error::InvalidStorageImplementation(spec.path.clone()))?;
            self.storage
                .write()
                .await
                .register(spec.storage_role, backend)?;
        }

        let reaction_task = response.reactions.map(|mut reactions| {
            let api = api.clone();
            let module_id = module_id.clone();
            tokio::spawn(async move {
                while let Some(action) = reactions.recv().await {
                    api.dispatch(action);
                }
                info!("Reaction stream for module id '{}' completed", module_id);
            })
        });

        info!("Loaded module '{}' from path '{}'", module_id, spec.path);
        self.modules.insert(
            module_id.clone(),
            LoadedModule {
                module_id: module_id.clone(),
                spec,
                module,
                stream_sub,
                reaction_task,
            },
        );
        self.order.push(module_id.clone());
        Ok(module_id)
    }

    /// Load all configured modules, in spec order
    ///
    /// Returns the number of loaded modules. The whole set must load, or
    /// the process must not start.
    pub async fn load_all(&mut self, specs: Vec<ModuleSpec>) -> Result<usize> {
        for spec in specs {
            self.load_module(spec).await?;
        }
        Ok(self.order.len())
    }

    /// Number of loaded modules
    pub fn module_count(&self) -> usize {
        self.order.len()
    }

    /// Module ids in load order
    pub fn module_ids(&self) -> &[String] {
        &self.order
    }

    /// Look up a loaded module by id
    pub fn get(&self, module_id: &str) -> Option<&LoadedModule> {
        self.modules.get(module_id)
    }

    /// Tear down all modules: cancel action streams and feedback links
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        for module_id in &self.order {
            if let Some(loaded) = self.modules.get(module_id) {
                loaded.stream_sub.cancel();
                if let Some(task) = &loaded.reaction_task {
                    task.abort();
                }
            }
        }
    }
}
