//! Runtime supervisor for one server process
//!
//! Owns the bus, the module registry, and the bridge. Startup order is
//! modules first, then the bridge, then the root `initComplete`
//! announcement, so no module ever sees client traffic before it is
//! initialized.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use actionbus_bridge::Bridge;
use actionbus_core::action::root;
use actionbus_core::bus::ActionBus;
use actionbus_core::config::ServerConfig;
use actionbus_core::Result;
use actionbus_modules::{ModuleCatalog, ModuleRegistry};

/// The assembled server process
pub struct Runtime {
    bus: ActionBus,
    registry: ModuleRegistry,
    bridge_shutdown: CancellationToken,
    bridge_task: Option<JoinHandle<()>>,
    bridge_addr: Option<SocketAddr>,
}

impl Runtime {
    /// Build a runtime around a fresh bus
    pub fn new(catalog: ModuleCatalog) -> Self {
        let bus = ActionBus::new();
        let registry = ModuleRegistry::new(bus.clone(), catalog);
        Self {
            bus,
            registry,
            bridge_shutdown: CancellationToken::new(),
            bridge_task: None,
            bridge_addr: None,
        }
    }

    /// The bus this runtime drives
    pub fn bus(&self) -> &ActionBus {
        &self.bus
    }

    /// The address the bridge is listening on, once started
    pub fn bridge_addr(&self) -> Option<SocketAddr> {
        self.bridge_addr
    }

    /// Count of loaded modules
    pub fn module_count(&self) -> usize {
        self.registry.module_count()
    }

    /// Load the configured modules, start the bridge, and announce readiness
    ///
    /// Any module or bridge failure here is fatal: a half-started server is
    /// worse than no server.
    pub async fn start(&mut self, config: &ServerConfig) -> Result<()> {
        let count = self.registry.load_all(config.module_specs()).await?;

        let addr = SocketAddr::from(([0, 0, 0, 0], config.bridge_port));
        let bridge = Bridge::bind(self.bus.clone(), addr).await?;
        self.bridge_addr = Some(bridge.local_addr()?);
        let token = self.bridge_shutdown.clone();
        self.bridge_task = Some(tokio::spawn(async move {
            if let Err(e) = bridge.run(token).await {
                warn!("Bridge stopped with error: {}", e);
            }
        }));

        self.bus.emit_root(root::init_complete(count));
        info!("Runtime started with {} modules", count);
        Ok(())
    }

    /// Announce shutdown and tear everything down
    pub async fn shutdown(&mut self) {
        self.bus.emit_root(root::shutdown());
        // Let module streams observe the shutdown action before they close
        tokio::time::sleep(Duration::from_millis(50)).await;

        self.bridge_shutdown.cancel();
        if let Some(task) = self.bridge_task.take() {
            let _ = task.await;
        }
        self.registry.shutdown();
        info!("Runtime stopped");
    }
}
