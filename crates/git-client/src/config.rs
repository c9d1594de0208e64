//! Client configuration loading.
//!
//! [`ClientConfig`] captures the settings a host application typically wants
//! to pin outside of code: which backend to use, where the git binary lives,
//! and the default network timeout. Loaded with [`load_config`] and saved
//! with [`save_config`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendKind;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// The configuration file contained invalid YAML.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Settings for constructing git clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClientConfig {
    /// Which transport backend to select.
    pub backend: BackendKind,

    /// Path to the git executable used by the native backend. `None` means
    /// resolve `git` from `PATH`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_binary: Option<String>,

    /// Default timeout in seconds applied to network operations that do not
    /// set one explicitly. Zero means no timeout.
    pub default_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Native,
            git_binary: None,
            default_timeout_secs: 0,
        }
    }
}

/// Loads a [`ClientConfig`] from a YAML file.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Saves a [`ClientConfig`] as YAML.
pub fn save_config(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    let contents = serde_yaml::to_string(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_uses_native_backend() {
        let config = ClientConfig::default();
        assert_eq!(config.backend, BackendKind::Native);
        assert!(config.git_binary.is_none());
        assert_eq!(config.default_timeout_secs, 0);
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("git-client.yaml");
        let config = ClientConfig {
            backend: BackendKind::Embedded,
            git_binary: Some("/usr/local/bin/git".to_string()),
            default_timeout_secs: 30,
        };

        save_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("git-client.yaml");
        std::fs::write(&path, "backend: embedded\n").unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.backend, BackendKind::Embedded);
        assert_eq!(loaded.default_timeout_secs, 0);
    }
}
