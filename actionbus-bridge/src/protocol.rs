//! Bridge wire protocol
//!
//! JSON text frames, tagged by `event`. Everything arriving from a peer
//! is untrusted input and gets explicit validation on top of decoding.

use serde::{Deserialize, Serialize};

use actionbus_core::action::Action;
use actionbus_core::{Error, Result};

/// A message traveling over the bridge websocket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BridgeMessage {
    /// Client to server: registration handshake carrying a self-chosen,
    /// stable client id
    #[serde(rename_all = "camelCase")]
    ClientRegistration { client_id: String },
    /// Client to server: an action to inject into the bus
    ClientAction { action: Action },
    /// Server to client: an action forwarded from the bus
    ServerAction { action: Action },
}

impl BridgeMessage {
    /// Decode a text frame
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::MalformedBridgePayload(e.to_string()))
    }

    /// Encode for a text frame
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Validate a registration id: a non-empty string
pub fn validate_registration(client_id: &str) -> Result<()> {
    if client_id.trim().is_empty() {
        return Err(Error::MalformedRegistration("empty clientId".to_string()));
    }
    Ok(())
}

/// Validate an inbound client action beyond its serde shape
pub fn validate_client_action(action: &Action) -> Result<()> {
    if action.module_name.is_empty()
        || action.action_type.is_empty()
        || action.from_module_name.is_empty()
        || action.from_module_id.is_empty()
    {
        return Err(Error::MalformedBridgePayload(
            "action missing required identity fields".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actionbus_core::action::DispatchAction;
    use serde_json::json;

    #[test]
    fn test_registration_wire_shape() {
        let msg = BridgeMessage::ClientRegistration {
            client_id: "c1".to_string(),
        };
        let wire: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(wire["event"], "clientRegistration");
        assert_eq!(wire["clientId"], "c1");
    }

    #[test]
    fn test_action_message_round_trip() {
        let action = DispatchAction::new("Chat", "message", json!({ "text": "hi" }))
            .stamped("Chat", "Chat");
        let msg = BridgeMessage::ServerAction { action };
        let decoded = BridgeMessage::decode(&msg.encode().unwrap()).unwrap();
        match decoded {
            BridgeMessage::ServerAction { action } => {
                assert_eq!(action.action_type, "message");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_missing_type() {
        // clientAction whose action lacks the required `type` field
        let raw = json!({
            "event": "clientAction",
            "action": {
                "moduleName": "Chat",
                "payload": {},
                "fromModuleName": "Chat",
                "fromModuleId": "Chat",
            },
        })
        .to_string();
        assert!(matches!(
            BridgeMessage::decode(&raw),
            Err(Error::MalformedBridgePayload(_))
        ));
    }

    #[test]
    fn test_validate_registration_rejects_blank() {
        assert!(validate_registration("c1").is_ok());
        assert!(matches!(
            validate_registration("   "),
            Err(Error::MalformedRegistration(_))
        ));
    }

    #[test]
    fn test_validate_client_action_requires_identity() {
        let mut action = DispatchAction::new("Chat", "message", json!({}))
            .stamped("Chat", "Chat");
        assert!(validate_client_action(&action).is_ok());
        action.from_module_id.clear();
        assert!(validate_client_action(&action).is_err());
    }
}
