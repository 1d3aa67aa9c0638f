//! Error types for actionbus

use thiserror::Error;

/// The main error type for actionbus operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A module path resolved to something that is not a valid module
    #[error("Malformed module at path '{0}'")]
    InvalidModuleShape(String),

    /// One module name claimed by two different import paths
    #[error("Module name '{name}' is already registered to path '{path}'")]
    DuplicateModuleName { name: String, path: String },

    /// A module path with no registered factory
    #[error("Unknown module path '{0}'")]
    UnknownModulePath(String),

    /// A module was given a storage role but returned no storage implementation
    #[error("Module path '{0}' is configured with a storage role but returned no storage implementation")]
    InvalidStorageImplementation(String),

    /// Storage call made before any primary storage module was registered
    #[error("No primary storage module has been registered")]
    NoPrimaryStorage,

    /// More than one module configured with the primary storage role
    #[error("Server config specifies more than one primary storage module")]
    DuplicatePrimaryStorage,

    /// Malformed action payload received over the bridge
    #[error("Malformed bridge payload: {0}")]
    MalformedBridgePayload(String),

    /// Malformed registration handshake received over the bridge
    #[error("Malformed bridge registration: {0}")]
    MalformedRegistration(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Bus delivery errors
    #[error("Bus error: {0}")]
    Bus(String),

    /// Bridge transport errors
    #[error("Bridge transport error: {0}")]
    Transport(String),
}

/// A specialized Result type for actionbus operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
