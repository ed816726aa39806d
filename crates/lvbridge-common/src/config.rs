//! Configuration types for LVBridge
//!
//! The agent reads a TOML file; every field has a default so a missing file
//! or a partial file is valid. Command-line flags override file values.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for the per-node agent
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub lvmd: LvmdConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub provisioner: ProvisionerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity of the node this agent serves
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name of the cluster Node object
    #[serde(default)]
    pub name: String,
}

/// Connection to the node-local volume daemon
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LvmdConfig {
    /// Unix domain socket the daemon listens on
    #[serde(default = "default_socket")]
    pub socket: PathBuf,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for LvmdConfig {
    fn default() -> Self {
        Self {
            socket: default_socket(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl LvmdConfig {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Interval between readiness checks (milliseconds)
    #[serde(default = "default_readiness_interval_ms")]
    pub interval_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_readiness_interval_ms(),
        }
    }
}

impl ReadinessConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// HTTP endpoint serving metrics and health
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen: default_metrics_listen(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Device class new volumes are carved from (empty = daemon default)
    #[serde(default)]
    pub device_class: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_socket() -> PathBuf {
    PathBuf::from("/run/lvbridge/lvmd.sock")
}

const fn default_connect_timeout_ms() -> u64 {
    5000
}

const fn default_readiness_interval_ms() -> u64 {
    10_000
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9808))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AgentConfig {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::configuration(e.to_string()))
    }

    /// Load from a file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Check the values the agent cannot run without
    pub fn validate(&self) -> Result<()> {
        if self.node.name.is_empty() {
            return Err(Error::configuration("node name is empty"));
        }
        if self.readiness.interval_ms == 0 {
            return Err(Error::configuration("readiness interval must be positive"));
        }
        if self.lvmd.socket.as_os_str().is_empty() {
            return Err(Error::configuration("lvmd socket path is empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.lvmd.socket, PathBuf::from("/run/lvbridge/lvmd.sock"));
        assert_eq!(config.readiness.interval(), Duration::from_secs(10));
        assert_eq!(config.metrics.listen.port(), 9808);
        assert_eq!(config.logging.level, "info");
        assert!(config.provisioner.device_class.is_empty());
    }

    #[test]
    fn test_partial_toml() {
        let config = AgentConfig::from_toml_str(
            r#"
            [node]
            name = "worker-1"

            [lvmd]
            socket = "/tmp/lvmd.sock"
            "#,
        )
        .unwrap();
        assert_eq!(config.node.name, "worker-1");
        assert_eq!(config.lvmd.socket, PathBuf::from("/tmp/lvmd.sock"));
        assert_eq!(config.lvmd.connect_timeout_ms, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            AgentConfig::from_toml_str("[readiness]\ninterval_ms = \"soon\""),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut config = AgentConfig::default();
        assert!(config.validate().is_err());

        config.node.name = "worker-1".into();
        assert!(config.validate().is_ok());

        config.readiness.interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_and_present() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let config = AgentConfig::load(&missing).unwrap();
        assert!(config.node.name.is_empty());

        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "[metrics]\nlisten = \"127.0.0.1:9100\"\n").unwrap();
        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config.metrics.listen.port(), 9100);
    }
}
