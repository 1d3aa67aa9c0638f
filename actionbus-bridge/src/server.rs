//! Bridge server
//!
//! Listens for websocket connections and keeps each registered client in
//! the action stream. Connections are fully independent tasks: one
//! client's slow consumption or malformed input never blocks another's.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use actionbus_core::action::{root, Action};
use actionbus_core::bus::ActionBus;
use actionbus_core::{Error, Result};

use crate::protocol::{validate_client_action, validate_registration, BridgeMessage};

/// Count of live connections per client id, for duplicate detection
type ActiveClients = Arc<RwLock<HashMap<String, usize>>>;

/// The network-facing bridge component
pub struct Bridge {
    bus: ActionBus,
    listener: TcpListener,
    active: ActiveClients,
}

impl Bridge {
    /// Bind the bridge listener
    pub async fn bind(bus: ActionBus, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Bridge listening on {}", listener.local_addr()?);
        Ok(Self {
            bus,
            listener,
            active: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// The bound local address, useful with an ephemeral port
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and serve connections until shutdown is requested
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    let bus = self.bus.clone();
                    let active = Arc::clone(&self.active);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(bus, active, stream).await {
                            warn!("Bridge connection from {} closed with error: {}", peer, e);
                        }
                    });
                }
            }
        }
        Ok(())
    }
}

/// Serve one client connection to completion
async fn handle_connection(bus: ActionBus, active: ActiveClients, stream: TcpStream) -> Result<()> {
    let ws = accept_async(stream)
        .await
        .map_err(|e| Error::Transport(e.to_string()))?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    // Registration handshake: the first text frame must be a valid
    // clientRegistration, or the connection is terminated.
    let client_id = loop {
        match ws_rx.next().await {
            Some(Ok(WsMessage::Text(raw))) => match BridgeMessage::decode(&raw) {
                Ok(BridgeMessage::ClientRegistration { client_id }) => {
                    validate_registration(&client_id)?;
                    break client_id;
                }
                Ok(_) => {
                    return Err(Error::MalformedRegistration(
                        "expected clientRegistration as first message".to_string(),
                    ))
                }
                Err(e) => return Err(Error::MalformedRegistration(e.to_string())),
            },
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
            Some(Ok(WsMessage::Close(_))) | None => return Ok(()),
            Some(Ok(_)) => {
                return Err(Error::MalformedRegistration(
                    "expected a text frame".to_string(),
                ))
            }
            Some(Err(e)) => return Err(Error::Transport(e.to_string())),
        }
    };

    {
        let mut active = active.write().await;
        let count = active.entry(client_id.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            warn!(
                "Client id {} registered while already active; keeping both connections",
                client_id
            );
        }
    }

    // Outbound subscription: no echo back to the origin, nothing marked
    // server-only, and privately targeted actions only to their target.
    let (out_tx, mut out_rx) = mpsc::channel::<Action>(64);
    let subscription = {
        let me = client_id.clone();
        bus.subscribe(
            move |action| {
                action.from_client_id.as_deref() != Some(me.as_str())
                    && !action.target_server
                    && action
                        .target_client_id
                        .as_deref()
                        .map_or(true, |target| target == me)
            },
            move |action| {
                let out_tx = out_tx.clone();
                async move {
                    let _ = out_tx.send(action).await;
                }
            },
        )
    };

    info!("Client id {} connected", client_id);
    bus.emit_root(root::client_connect(&client_id));

    let result = loop {
        tokio::select! {
            outbound = out_rx.recv() => match outbound {
                Some(action) => {
                    match (BridgeMessage::ServerAction { action }).encode() {
                        Ok(raw) => {
                            if let Err(e) = ws_tx.send(WsMessage::Text(raw)).await {
                                break Err(Error::Transport(e.to_string()));
                            }
                        }
                        Err(e) => warn!("Dropping unserializable action for client id {}: {}", client_id, e),
                    }
                }
                None => break Ok(()),
            },
            inbound = ws_rx.next() => match inbound {
                Some(Ok(WsMessage::Text(raw))) => handle_client_frame(&bus, &client_id, &raw),
                Some(Ok(WsMessage::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(Error::Transport(e.to_string())),
            },
        }
    };

    subscription.cancel();
    {
        let mut active = active.write().await;
        if let Some(count) = active.get_mut(&client_id) {
            *count -= 1;
            if *count == 0 {
                active.remove(&client_id);
            }
        }
    }
    info!("Client id {} disconnected", client_id);
    bus.emit_root(root::client_disconnect(&client_id));
    result
}

/// Handle one inbound frame from a registered client
///
/// Malformed action messages are logged and discarded without closing
/// the connection.
fn handle_client_frame(bus: &ActionBus, client_id: &str, raw: &str) {
    match BridgeMessage::decode(raw) {
        Ok(BridgeMessage::ClientAction { mut action }) => {
            if let Err(e) = validate_client_action(&action) {
                warn!(
                    "Ignoring malformed action payload from client id {}: {}",
                    client_id, e
                );
                return;
            }
            action.from_client_id = Some(client_id.to_string());
            debug!(
                "Received {}.{} action from client id {}",
                action.module_name, action.action_type, client_id
            );
            bus.emit(action);
        }
        Ok(BridgeMessage::ClientRegistration { .. }) => {
            warn!("Ignoring repeated registration from client id {}", client_id);
        }
        Ok(BridgeMessage::ServerAction { .. }) => {
            warn!("Ignoring serverAction message from client id {}", client_id);
        }
        Err(e) => {
            warn!(
                "Ignoring malformed action payload from client id {}: {}",
                client_id, e
            );
        }
    }
}
