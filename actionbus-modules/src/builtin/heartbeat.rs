//! Heartbeat module
//!
//! After the root initComplete action, emits a heartbeat action on a
//! configurable interval through its reaction stream, stopping on the
//! root shutdown action.

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

use actionbus_core::action::{root, Action, DispatchAction};
use actionbus_core::Result;

use crate::traits::{BusModule, InitResponse, ModuleContext};

/// Catalog path key for this module
pub const PATH: &str = "heartbeat";

/// Declared module name
pub const MODULE_NAME: &str = "Heartbeat";

/// Action type emitted on every beat
pub const HEARTBEAT: &str = "heartbeat";

const DEFAULT_DURATION_MS: u64 = 1000;

/// Build a heartbeat dispatch action
pub fn heartbeat(beat_count: u64) -> DispatchAction {
    DispatchAction::new(MODULE_NAME, HEARTBEAT, json!({ "beatCount": beat_count }))
}

/// True for heartbeat actions
pub fn is_heartbeat(action: &Action) -> bool {
    action.is_type(MODULE_NAME, HEARTBEAT)
}

/// Periodic heartbeat module
pub struct HeartbeatModule;

#[async_trait]
impl BusModule for HeartbeatModule {
    fn module_name(&self) -> &str {
        MODULE_NAME
    }

    async fn initialize(&self, ctx: ModuleContext) -> Result<InitResponse> {
        let duration_ms = ctx
            .config
            .get("durationMs")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_DURATION_MS);

        let (tx, rx) = mpsc::channel(16);
        let mut actions = ctx.actions;
        tokio::spawn(async move {
            // No beats until the whole module set is up
            loop {
                match actions.recv().await {
                    Some(action) if root::is_init_complete(&action) => break,
                    Some(_) => continue,
                    None => return,
                }
            }

            let mut ticker = interval(Duration::from_millis(duration_ms));
            ticker.tick().await; // skip the immediate first tick
            let mut beat_count: u64 = 0;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        beat_count += 1;
                        if tx.send(heartbeat(beat_count)).await.is_err() {
                            break;
                        }
                    }
                    received = actions.recv() => match received {
                        Some(action) if root::is_shutdown(&action) => break,
                        Some(_) => {}
                        None => break,
                    }
                }
            }
        });

        Ok(InitResponse::default().with_reactions(rx))
    }
}
