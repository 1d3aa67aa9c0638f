//! Configuration schema and loading
//!
//! The server consumes a list of module specs and a bridge port. Module
//! config payloads are arbitrary JSON owned by each module.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default port for the client-server bridge
pub fn default_bridge_port() -> u16 {
    23000
}

/// Storage role of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageRole {
    /// This module is not used for storage
    #[default]
    None,
    /// This module is used for fetching and storing
    Primary,
    /// This module is used only for storing, e.g. as a backup
    Secondary,
}

/// Describes one module for the server to load
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSpec {
    /// Lookup key for the module factory
    pub path: String,
    /// Unique module id, overriding default; useful for duplicate modules
    /// with distinct configs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    /// Module config, arbitrary per module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    /// Storage role of the module, if any
    #[serde(default)]
    pub storage_role: StorageRole,
}

impl ModuleSpec {
    /// Spec for a bare path with all defaults
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// A module entry in config: either a bare path string or a full spec
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleEntry {
    Path(String),
    Spec(ModuleSpec),
}

impl ModuleEntry {
    /// Normalize the entry into a full spec
    pub fn into_spec(self) -> ModuleSpec {
        match self {
            ModuleEntry::Path(path) => ModuleSpec::from_path(path),
            ModuleEntry::Spec(spec) => spec,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files; empty disables the file layer
    #[serde(default)]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: String::new(),
            overrides: HashMap::new(),
        }
    }
}

/// Root configuration for the bus process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// The list of modules for the server to load
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    /// The port on which the bridge listens for client connections
    #[serde(default = "default_bridge_port")]
    pub bridge_port: u16,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            bridge_port: default_bridge_port(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Normalized module specs, in config order
    pub fn module_specs(&self) -> Vec<ModuleSpec> {
        self.modules
            .iter()
            .cloned()
            .map(ModuleEntry::into_spec)
            .collect()
    }
}

/// Configuration loader
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Create a new config loader with the default config directory
    pub fn new() -> Self {
        let config_dir = dirs::home_dir()
            .map(|h| h.join(".actionbus"))
            .unwrap_or_else(|| PathBuf::from(".actionbus"));

        Self { config_dir }
    }

    /// Create a new config loader with a custom config directory
    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            config_dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Load configuration from file, falling back to defaults when absent
    pub fn load(&self) -> crate::Result<ServerConfig> {
        let config_path = self.config_dir.join("config.json");
        if !config_path.exists() {
            return Ok(ServerConfig::default());
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: ServerConfig = serde_json::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("{}: {}", config_path.display(), e)))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &ServerConfig) -> crate::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let config_path = self.config_dir.join("config.json");
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_module_entry_accepts_bare_path() {
        let config: ServerConfig = serde_json::from_value(json!({
            "modules": ["memory-storage", { "path": "heartbeat", "moduleId": "hb" }],
        }))
        .unwrap();
        let specs = config.module_specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].path, "memory-storage");
        assert_eq!(specs[0].storage_role, StorageRole::None);
        assert_eq!(specs[1].module_id.as_deref(), Some("hb"));
    }

    #[test]
    fn test_storage_role_parses_lowercase() {
        let spec: ModuleSpec = serde_json::from_value(json!({
            "path": "memory-storage",
            "storageRole": "primary",
        }))
        .unwrap();
        assert_eq!(spec.storage_role, StorageRole::Primary);
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bridge_port, 23000);
        assert!(config.modules.is_empty());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_loader_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::with_dir(dir.path());

        // Missing file falls back to defaults
        let config = loader.load().unwrap();
        assert_eq!(config.bridge_port, 23000);

        let mut config = ServerConfig::default();
        config.bridge_port = 24100;
        config.modules.push(ModuleEntry::Path("heartbeat".into()));
        loader.save(&config).unwrap();

        let loaded = loader.load().unwrap();
        assert_eq!(loaded.bridge_port, 24100);
        assert_eq!(loaded.module_specs()[0].path, "heartbeat");
    }
}
