//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `hassflow.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::collections::HashSet;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use hassflow_domain::config::{EntityConfigNodeConfig, NodeConfig};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hub connection settings.
    pub hub: HubConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Exposed entities, deployed before any flow node.
    pub entity_configs: Vec<EntityConfigNodeConfig>,
    /// Flow nodes.
    pub nodes: Vec<NodeConfig>,
}

/// Hub connection configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Identifier of the hub server the nodes talk to.
    pub server_id: String,
    /// Open the connection right after deployment.
    pub connect_on_start: bool,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `hassflow.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("hassflow.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HASSFLOW_SERVER_ID") {
            self.hub.server_id = val;
        }
        if let Ok(val) = std::env::var("HASSFLOW_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.server_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "hub server id must not be empty".to_string(),
            ));
        }

        if let Err(err) = EnvFilter::try_new(&self.logging.filter) {
            return Err(ConfigError::Validation(format!(
                "invalid log filter {:?}: {err}",
                self.logging.filter
            )));
        }

        let mut ids = HashSet::new();
        for config in &self.entity_configs {
            config.validate().map_err(|err| {
                ConfigError::Validation(format!("entity config {}: {err}", config.id))
            })?;
            if !ids.insert(config.id.as_str()) {
                return Err(duplicate(config.id.as_str()));
            }
        }

        for node in &self.nodes {
            node.validate()
                .map_err(|err| ConfigError::Validation(format!("node {}: {err}", node.id())))?;
            if !ids.insert(node.id().as_str()) {
                return Err(duplicate(node.id().as_str()));
            }
            if let NodeConfig::Switch(switch) = node {
                let known = self.entity_configs.iter().any(|c| c.id == switch.entity_config);
                if !known {
                    return Err(ConfigError::Validation(format!(
                        "switch {} references unknown entity config {}",
                        switch.id, switch.entity_config
                    )));
                }
            }
        }
        Ok(())
    }
}

fn duplicate(id: &str) -> ConfigError {
    ConfigError::Validation(format!("duplicate node id {id}"))
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            server_id: "home".to_string(),
            connect_on_start: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "hassflowd=info,hassflow=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
