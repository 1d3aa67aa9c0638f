//! Client-server bridge for actionbus
//!
//! Extends the bus across a network boundary: the [`Bridge`] accepts
//! websocket connections from remote clients and keeps each of them in
//! the action stream, filtered by the action model's addressing fields.
//! The [`Connector`] is the client-side peer.

pub mod connector;
pub mod protocol;
pub mod server;

pub use connector::{Connector, ConnectorOptions};
pub use protocol::BridgeMessage;
pub use server::Bridge;
