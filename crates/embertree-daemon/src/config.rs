//! Configuration loading and validation

use anyhow::Result;
use embertree_core::{split_list, MonitorConfig, ParseScope};
use embertree_provider::split_address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid parse scope '{0}': expected a dotted numeric path")]
    InvalidScope(String),
    #[error("Invalid parameter address '{0}': expected a dotted numeric path")]
    InvalidAddress(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub monitor: MonitorSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Tree snapshot backing the in-memory provider
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Walk the tree after connecting
    #[serde(default)]
    pub auto_parse: bool,
    /// Subtree boundaries; entries may be comma separated
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Substrings matched against accumulated labels
    #[serde(default)]
    pub node_filters: Vec<String>,
    /// Exact parameter identifiers
    #[serde(default)]
    pub parameter_filters: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorSection {
    /// Parameter addresses registered explicitly
    #[serde(default)]
    pub parameters: Vec<String>,
}

fn flatten(items: &[String]) -> Vec<String> {
    items.iter().flat_map(|item| split_list(item)).collect()
}

impl Config {
    /// Build the immutable monitor configuration
    pub fn to_monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        let scopes = self
            .discovery
            .scopes
            .iter()
            .flat_map(|s| ParseScope::parse_list(s))
            .map(|scope| {
                let numeric = scope
                    .elements
                    .iter()
                    .all(|e| !e.is_empty() && e.bytes().all(|b| b.is_ascii_digit()));
                if numeric {
                    Ok(scope)
                } else {
                    Err(ConfigError::InvalidScope(scope.path))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let parameters = flatten(&self.monitor.parameters);
        if let Some(bad) = parameters.iter().find(|p| split_address(p).is_none()) {
            return Err(ConfigError::InvalidAddress(bad.clone()));
        }

        Ok(MonitorConfig {
            auto_parse: self.discovery.auto_parse,
            scopes,
            node_filters: flatten(&self.discovery.node_filters),
            parameter_filters: flatten(&self.discovery.parameter_filters),
            parameters,
        })
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        provider: ProviderConfig {
            snapshot: Some(PathBuf::from("tree.json")),
            ..Default::default()
        },
        discovery: DiscoveryConfig {
            auto_parse: true,
            scopes: Vec::new(),
            node_filters: Vec::new(),
            parameter_filters: Vec::new(),
        },
        monitor: MonitorSection {
            parameters: vec!["1.1.1".to_string()],
        },
    };

    let content = format!(
        "# embertree configuration\n\
         # scopes, node_filters, parameter_filters and parameters also accept\n\
         # comma separated entries, e.g. scopes = [\"1.2,3.4\"]\n\n{}",
        toml::to_string_pretty(&config)?
    );
    std::fs::write(path, content)?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(())
}
