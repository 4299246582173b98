//! Client configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (TETHER_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Service URL prefix; the RPC endpoint is `<url_prefix>/api`.
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,

    /// Storage namespace. Identity, outbox and cached tokens are scoped to
    /// this; multiple clients sharing a namespace share identity.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Directory for the per-namespace state file.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Origin accepted for cross-instance auth signals. Signals from any
    /// other origin are dropped.
    #[serde(default)]
    pub auth_origin: Option<String>,

    /// Buffered client events per listener.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_url_prefix() -> String {
    std::env::var("TETHER_URL").unwrap_or_else(|_| "https://localhost:8080/tether".to_string())
}

fn default_namespace() -> String {
    std::env::var("TETHER_NAMESPACE").unwrap_or_else(|_| "tether".to_string())
}

fn default_state_dir() -> String {
    "~/.local/state/tether".to_string()
}

fn default_event_capacity() -> usize {
    256
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url_prefix: default_url_prefix(),
            namespace: default_namespace(),
            state_dir: default_state_dir(),
            auth_origin: None,
            event_capacity: default_event_capacity(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the default file paths, falling back to
    /// defaults with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = ["tether.toml", "~/.config/tether/tether.toml"];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ClientConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Path of the per-namespace state file.
    #[must_use]
    pub fn storage_path(&self) -> PathBuf {
        let dir = shellexpand::tilde(&self.state_dir);
        Path::new(dir.as_ref()).join(format!("{}.json", self.namespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.namespace, "tether");
        assert!(config.auth_origin.is_none());
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            url_prefix = "https://realtime.example.com/tether"
            namespace = "game42"
            auth_origin = "https://example.com"
        "#;

        let config: ClientConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.url_prefix, "https://realtime.example.com/tether");
        assert_eq!(config.namespace, "game42");
        assert_eq!(config.auth_origin.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_storage_path_uses_namespace() {
        let config = ClientConfig {
            state_dir: "/tmp/tether-test".to_string(),
            namespace: "ns1".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.storage_path(),
            PathBuf::from("/tmp/tether-test/ns1.json")
        );
    }
}
