//! Action types for the bus
//!
//! An [`Action`] is a fully-addressed, provenance-stamped message traveling
//! on the bus. A [`DispatchAction`] is the subset a producer supplies; the
//! bus stamps in the `from*` fields at emission time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Module name/id reserved for the bus itself
pub const ROOT_MODULE_NAME: &str = "actionbus";

/// Module id of the bus itself, equal to its name
pub const ROOT_MODULE_ID: &str = ROOT_MODULE_NAME;

fn is_false(v: &bool) -> bool {
    !*v
}

/// An action as it arrives via the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Name of the module that defines this action
    pub module_name: String,
    /// Type of the action, arbitrarily defined by module
    #[serde(rename = "type")]
    pub action_type: String,
    /// Payload, opaque to the bus; must be JSON-serializable to cross the bridge
    #[serde(default)]
    pub payload: Value,
    /// The name of the module from which this action was dispatched
    pub from_module_name: String,
    /// The moduleId from which this action was dispatched
    pub from_module_id: String,
    /// The clientId from which this action was dispatched, if client-originated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_client_id: Option<String>,
    /// The screenId from which this action was dispatched, if client-originated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_screen_id: Option<String>,
    /// If true, dispatch this action only to server modules
    #[serde(default, skip_serializing_if = "is_false")]
    pub target_server: bool,
    /// A moduleId to which this action should be privately dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_module_id: Option<String>,
    /// A clientId to which this action should be privately dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_client_id: Option<String>,
    /// A screenId to which this action should be privately dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_screen_id: Option<String>,
    /// If true, this action's payload contains sensitive information
    #[serde(default, skip_serializing_if = "is_false")]
    pub sensitive: bool,
}

impl Action {
    /// True when this action was dispatched by the bus itself
    pub fn is_root(&self) -> bool {
        self.from_module_id == ROOT_MODULE_ID
    }

    /// True when this action matches the given defining module name and type
    pub fn is_type(&self, module_name: &str, action_type: &str) -> bool {
        self.module_name == module_name && self.action_type == action_type
    }

    /// A short provenance label for diagnostics
    pub fn provenance(&self) -> String {
        if self.from_module_name != self.from_module_id {
            format!("{} ({})", self.from_module_id, self.from_module_name)
        } else {
            self.from_module_id.clone()
        }
    }

    /// The payload rendered for diagnostics, redacted when sensitive
    pub fn payload_summary(&self) -> String {
        if self.sensitive {
            "<redacted>".to_string()
        } else {
            self.payload.to_string()
        }
    }
}

/// An action as it is dispatched by a module, before provenance is stamped
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchAction {
    /// Name of the module that defines this action
    pub module_name: String,
    /// Type of the action, arbitrarily defined by module
    #[serde(rename = "type")]
    pub action_type: String,
    /// Payload, opaque to the bus
    #[serde(default)]
    pub payload: Value,
    /// If true, dispatch this action only to server modules
    #[serde(default, skip_serializing_if = "is_false")]
    pub target_server: bool,
    /// A moduleId to which this action should be privately dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_module_id: Option<String>,
    /// A clientId to which this action should be privately dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_client_id: Option<String>,
    /// A screenId to which this action should be privately dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_screen_id: Option<String>,
    /// If true, this action's payload contains sensitive information
    #[serde(default, skip_serializing_if = "is_false")]
    pub sensitive: bool,
}

impl DispatchAction {
    /// Create a new dispatch action
    pub fn new(
        module_name: impl Into<String>,
        action_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            action_type: action_type.into(),
            payload,
            target_server: false,
            target_module_id: None,
            target_client_id: None,
            target_screen_id: None,
            sensitive: false,
        }
    }

    /// Restrict delivery to one module instance
    pub fn target_module(mut self, module_id: impl Into<String>) -> Self {
        self.target_module_id = Some(module_id.into());
        self
    }

    /// Restrict delivery to one remote client
    pub fn target_client(mut self, client_id: impl Into<String>) -> Self {
        self.target_client_id = Some(client_id.into());
        self
    }

    /// Restrict delivery to one UI mount
    pub fn target_screen(mut self, screen_id: impl Into<String>) -> Self {
        self.target_screen_id = Some(screen_id.into());
        self
    }

    /// Restrict delivery to modules running in the bus process
    pub fn server_only(mut self) -> Self {
        self.target_server = true;
        self
    }

    /// Mark the payload as sensitive, so diagnostics redact it
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Stamp provenance, producing a bus-ready action
    pub fn stamped(
        self,
        from_module_id: impl Into<String>,
        from_module_name: impl Into<String>,
    ) -> Action {
        Action {
            module_name: self.module_name,
            action_type: self.action_type,
            payload: self.payload,
            from_module_name: from_module_name.into(),
            from_module_id: from_module_id.into(),
            from_client_id: None,
            from_screen_id: None,
            target_server: self.target_server,
            target_module_id: self.target_module_id,
            target_client_id: self.target_client_id,
            target_screen_id: self.target_screen_id,
            sensitive: self.sensitive,
        }
    }
}

/// Actions dispatched by the bus itself
pub mod root {
    use super::{Action, DispatchAction, ROOT_MODULE_NAME};
    use serde_json::json;

    pub const INIT_COMPLETE: &str = "initComplete";
    pub const SHUTDOWN: &str = "shutdown";
    pub const CLIENT_CONNECT: &str = "clientConnect";
    pub const CLIENT_DISCONNECT: &str = "clientDisconnect";
    pub const SERVER_CONNECT: &str = "serverConnect";
    pub const SERVER_DISCONNECT: &str = "serverDisconnect";

    /// Dispatched when all server modules are initialized
    pub fn init_complete(module_count: usize) -> DispatchAction {
        DispatchAction::new(
            ROOT_MODULE_NAME,
            INIT_COMPLETE,
            json!({ "moduleCount": module_count }),
        )
    }

    /// Dispatched when the bus process is shutting down
    pub fn shutdown() -> DispatchAction {
        DispatchAction::new(ROOT_MODULE_NAME, SHUTDOWN, json!({}))
    }

    /// Dispatched when a remote client connects
    pub fn client_connect(client_id: &str) -> DispatchAction {
        DispatchAction::new(
            ROOT_MODULE_NAME,
            CLIENT_CONNECT,
            json!({ "clientId": client_id }),
        )
    }

    /// Dispatched when a remote client disconnects
    pub fn client_disconnect(client_id: &str) -> DispatchAction {
        DispatchAction::new(
            ROOT_MODULE_NAME,
            CLIENT_DISCONNECT,
            json!({ "clientId": client_id }),
        )
    }

    /// Dispatched locally by a client peer when connected to the server
    pub fn server_connect(client_id: &str) -> DispatchAction {
        DispatchAction::new(ROOT_MODULE_NAME, SERVER_CONNECT, json!({}))
            .target_client(client_id)
    }

    /// Dispatched locally by a client peer when disconnected from the server
    pub fn server_disconnect(client_id: &str) -> DispatchAction {
        DispatchAction::new(ROOT_MODULE_NAME, SERVER_DISCONNECT, json!({}))
            .target_client(client_id)
    }

    /// True for the root initComplete action
    pub fn is_init_complete(action: &Action) -> bool {
        action.is_type(ROOT_MODULE_NAME, INIT_COMPLETE)
    }

    /// True for the root shutdown action
    pub fn is_shutdown(action: &Action) -> bool {
        action.is_type(ROOT_MODULE_NAME, SHUTDOWN)
    }
}

/// Build a dispatch action with an arbitrary serializable payload
pub fn action_with_payload<T: Serialize>(
    module_name: impl Into<String>,
    action_type: impl Into<String>,
    payload: &T,
) -> crate::Result<DispatchAction> {
    Ok(DispatchAction::new(
        module_name,
        action_type,
        serde_json::to_value(payload)?,
    ))
}
