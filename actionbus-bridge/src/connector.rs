//! Client-side bridge peer
//!
//! Connects a local bus to a remote bridge server. Actions dispatched
//! through the connector flow up to the server; actions the server
//! forwards for this client flow back into the local bus.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use actionbus_core::action::{root, Action, DispatchAction, ROOT_MODULE_ID, ROOT_MODULE_NAME};
use actionbus_core::bus::ActionBus;
use actionbus_core::{Error, Result};

use crate::protocol::BridgeMessage;

/// Connection options for a bridge client
#[derive(Debug, Clone)]
pub struct ConnectorOptions {
    /// Bridge server host
    pub host: String,
    /// Bridge server port
    pub port: u16,
    /// Stable client id to register as; a random one is generated when unset
    pub client_id: Option<String>,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: actionbus_core::config::default_bridge_port(),
            client_id: None,
        }
    }
}

/// A live connection to a bridge server
///
/// Locally dispatched actions are stamped with this peer's client id, which
/// is what distinguishes them from actions the server forwarded down, and
/// what the bridge uses for addressing on the other side.
pub struct Connector {
    bus: ActionBus,
    client_id: String,
    shutdown: CancellationToken,
    pump: JoinHandle<Result<()>>,
}

impl Connector {
    /// Connect to a bridge server, register, and start the pump
    ///
    /// Emits a local `serverConnect` root action once registered. The pump
    /// runs until the connection ends or [`Connector::shutdown`] is called,
    /// emitting `serverDisconnect` on the way out.
    pub async fn connect(bus: ActionBus, options: ConnectorOptions) -> Result<Self> {
        let client_id = options
            .client_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let url = format!("ws://{}:{}", options.host, options.port);
        info!("Connecting to bridge at {} as client id {}", url, client_id);

        let (ws, _response) = connect_async(&url)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let (mut ws_tx, ws_rx) = ws.split();

        let registration = BridgeMessage::ClientRegistration {
            client_id: client_id.clone(),
        };
        ws_tx
            .send(WsMessage::Text(registration.encode()?))
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        bus.emit_root(root::server_connect(&client_id));
        info!("Registered with bridge as client id {}", client_id);

        let shutdown = CancellationToken::new();
        let pump = tokio::spawn(run_pump(
            bus.clone(),
            client_id.clone(),
            ws_tx,
            ws_rx,
            shutdown.clone(),
        ));

        Ok(Self {
            bus,
            client_id,
            shutdown,
            pump,
        })
    }

    /// The client id this peer registered with
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Dispatch an action from this client onto the local bus
    ///
    /// The action carries this peer's client id, so the pump forwards it to
    /// the server unless it is privately addressed back to this client.
    pub fn dispatch(&self, action: DispatchAction) {
        let mut action = action.stamped(ROOT_MODULE_ID, ROOT_MODULE_NAME);
        action.from_client_id = Some(self.client_id.clone());
        self.bus.emit(action);
    }

    /// Request the pump to stop
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// A token that stops the pump when cancelled, usable from other tasks
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Wait for the pump to finish
    pub async fn wait(self) -> Result<()> {
        self.pump
            .await
            .map_err(|e| Error::Transport(e.to_string()))?
    }
}

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;
type WsSource = futures::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

/// Forward in both directions until the connection ends
async fn run_pump(
    bus: ActionBus,
    client_id: String,
    mut ws_tx: WsSink,
    mut ws_rx: WsSource,
    shutdown: CancellationToken,
) -> Result<()> {
    // Local actions stamped with our client id go up to the server,
    // except those privately addressed back to ourselves.
    let (up_tx, mut up_rx) = mpsc::channel::<Action>(64);
    let subscription = {
        let me = client_id.clone();
        bus.subscribe(
            move |action| {
                action.from_client_id.as_deref() == Some(me.as_str())
                    && action.target_client_id.as_deref() != Some(me.as_str())
            },
            move |action| {
                let up_tx = up_tx.clone();
                async move {
                    let _ = up_tx.send(action).await;
                }
            },
        )
    };

    let result = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = ws_tx.send(WsMessage::Close(None)).await;
                break Ok(());
            }
            upward = up_rx.recv() => match upward {
                Some(action) => {
                    match (BridgeMessage::ClientAction { action }).encode() {
                        Ok(raw) => {
                            if let Err(e) = ws_tx.send(WsMessage::Text(raw)).await {
                                break Err(Error::Transport(e.to_string()));
                            }
                        }
                        Err(e) => warn!("Dropping unserializable local action: {}", e),
                    }
                }
                None => break Ok(()),
            },
            inbound = ws_rx.next() => match inbound {
                Some(Ok(WsMessage::Text(raw))) => handle_server_frame(&bus, &client_id, &raw),
                Some(Ok(WsMessage::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(Error::Transport(e.to_string())),
            },
        }
    };

    subscription.cancel();
    info!("Disconnected from bridge as client id {}", client_id);
    bus.emit_root(root::server_disconnect(&client_id));
    result
}

/// Handle one frame forwarded by the server
fn handle_server_frame(bus: &ActionBus, client_id: &str, raw: &str) {
    match BridgeMessage::decode(raw) {
        Ok(BridgeMessage::ServerAction { action }) => {
            debug!(
                "Received {}.{} action from server",
                action.module_name, action.action_type
            );
            bus.emit(action);
        }
        Ok(other) => {
            warn!(
                "Ignoring unexpected bridge message for client id {}: {:?}",
                client_id, other
            );
        }
        Err(e) => {
            warn!(
                "Ignoring malformed bridge frame for client id {}: {}",
                client_id, e
            );
        }
    }
}
