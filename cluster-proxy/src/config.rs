//! # Proxy Configuration
//!
//! Thin wrapper around [`cluster_core::config::ClusterConfig`] with the
//! HTTP-facing settings the core has no opinion about: bind address,
//! request timeout, CORS, and logging. Grounded on the teacher's
//! `Config` (`config.rs`): same `load`/`apply_env_overrides`/`validate`
//! three-step pipeline, same `GATEWAY_*` environment variable naming
//! convention (renamed to `CLUSTER_PROXY_*` here).

use cluster_core::config::ClusterConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "cluster_core::common::duration_serde")]
    pub timeout: Duration,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            timeout: Duration::from_secs(30),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            cluster: ClusterConfig::default(),
        }
    }
}

impl ProxyConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: ProxyConfig = toml::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// `CLUSTER_PROXY_HOST`, `CLUSTER_PROXY_PORT`, `CLUSTER_PROXY_LOG_LEVEL`.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(host) = std::env::var("CLUSTER_PROXY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("CLUSTER_PROXY_PORT") {
            self.server.port = port.parse()?;
        }
        if let Ok(level) = std::env::var("CLUSTER_PROXY_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must be nonzero");
        }
        self.cluster.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_core::config::{DiscoveryMode, StaticNodeConfig};

    fn valid_config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.cluster.discovery.mode = DiscoveryMode::Static {
            nodes: vec![StaticNodeConfig {
                id: "a".into(),
                url: "http://localhost:8000".into(),
            }],
        };
        config
    }

    #[test]
    fn default_config_rejects_empty_node_list() {
        assert!(ProxyConfig::default().validate().is_err());
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn rejects_zero_port() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_override_applies_host_and_port() {
        std::env::set_var("CLUSTER_PROXY_HOST", "0.0.0.0");
        std::env::set_var("CLUSTER_PROXY_PORT", "9000");
        let mut config = valid_config();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        std::env::remove_var("CLUSTER_PROXY_HOST");
        std::env::remove_var("CLUSTER_PROXY_PORT");
    }
}
