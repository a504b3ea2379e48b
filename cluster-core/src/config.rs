//! # Cluster Configuration
//!
//! Mirrors the table in spec.md section 6 exactly: `discovery`,
//! `health`, `backoff`, `routing`, `cache` sections. Grounded on the
//! teacher's `ultrafast-gateway/src/config.rs::Config` — same
//! `Deserialize`/`Serialize` derive plus a `validate()` pass that
//! returns `anyhow::Result<()>`, same `duration_serde` field style for
//! human-readable durations (`"30s"`, `"500ms"`) in TOML.

use crate::common::duration_serde;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the cluster core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub discovery: DiscoveryConfig,
    pub health: HealthConfig,
    pub backoff: BackoffConfig,
    pub routing: RoutingConfig,
    pub cache: CacheConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            health: HealthConfig::default(),
            backoff: BackoffConfig::default(),
            routing: RoutingConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Reject negative intervals, zero TTLs, and empty static node
    /// lists at construction time, matching spec.md section 6.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let DiscoveryMode::Static { ref nodes } = self.discovery.mode {
            if nodes.is_empty() {
                anyhow::bail!("discovery.nodes must not be empty in static mode");
            }
        }
        if self.discovery.refresh_interval.is_zero() {
            anyhow::bail!("discovery.refresh_interval_ms must be positive");
        }
        if self.discovery.validation_timeout.is_zero() {
            anyhow::bail!("discovery.validation_timeout_ms must be positive");
        }

        if self.health.check_interval.is_zero() {
            anyhow::bail!("health.check_interval_ms must be positive");
        }
        if self.health.timeout.is_zero() {
            anyhow::bail!("health.timeout_ms must be positive");
        }
        if self.health.max_consecutive_failures == 0 {
            anyhow::bail!("health.max_consecutive_failures must be positive");
        }
        if !(0.0..=1.0).contains(&self.health.unhealthy_threshold) {
            anyhow::bail!("health.unhealthy_threshold must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.health.degraded_threshold) {
            anyhow::bail!("health.degraded_threshold must be in [0, 1]");
        }
        if self.health.unhealthy_threshold > self.health.degraded_threshold {
            anyhow::bail!("health.unhealthy_threshold must be <= health.degraded_threshold");
        }

        if self.backoff.initial_delay.is_zero() {
            anyhow::bail!("backoff.initial_delay_ms must be positive");
        }
        if self.backoff.max_delay < self.backoff.initial_delay {
            anyhow::bail!("backoff.max_delay_ms must be >= backoff.initial_delay_ms");
        }
        if self.backoff.multiplier < 1.0 {
            anyhow::bail!("backoff.multiplier must be >= 1.0");
        }

        if self.routing.session_ttl.is_zero() {
            anyhow::bail!("routing.session_ttl_ms must be positive");
        }
        if self.routing.max_retries == 0 {
            anyhow::bail!("routing.max_retries must be positive");
        }

        if self.cache.max_cache_age().is_zero() {
            anyhow::bail!("cache.max_cache_age_sec must be positive");
        }
        if !(0.0..=1.0).contains(&self.cache.min_cache_hit_rate) {
            anyhow::bail!("cache.min_cache_hit_rate must be in [0, 1]");
        }

        Ok(())
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClusterConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub mode: DiscoveryMode,
    #[serde(with = "duration_serde")]
    pub refresh_interval: Duration,
    #[serde(with = "duration_serde")]
    pub validation_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::Static { nodes: vec![] },
            refresh_interval: Duration::from_secs(30),
            validation_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryMode {
    Static { nodes: Vec<StaticNodeConfig> },
    Dns { dns_name: String, port: u16 },
    Orchestrator { namespace: String, service_label: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticNodeConfig {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(with = "duration_serde")]
    pub check_interval: Duration,
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    pub max_consecutive_failures: u32,
    pub unhealthy_threshold: f64,
    pub degraded_threshold: f64,
    /// Minimum sample count required before a success-rate reading can
    /// demote a node's status. Open question resolved in DESIGN.md:
    /// without this, a 2-sample window with one failure (successRate =
    /// 0.5) flaps between Healthy and Degraded.
    pub min_samples_for_demotion: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(3),
            max_consecutive_failures: 3,
            unhealthy_threshold: 0.5,
            degraded_threshold: 0.8,
            min_samples_for_demotion: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(with = "duration_serde")]
    pub initial_delay: Duration,
    #[serde(with = "duration_serde")]
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategyKind {
    RoundRobin,
    LeastLoaded,
    CacheAware,
    LatencyBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub strategy: RoutingStrategyKind,
    pub max_retries: u32,
    #[serde(with = "duration_serde")]
    pub retry_delay: Duration,
    #[serde(with = "duration_serde")]
    pub session_ttl: Duration,
    /// Open question resolved in DESIGN.md: whether a `Degraded` node
    /// should ever be preferred over a `Healthy` one purely for cache
    /// warmth. Defaults conservatively to `true`.
    pub prefer_healthy_over_warm: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategyKind::CacheAware,
            max_retries: 2,
            retry_delay: Duration::from_millis(200),
            session_ttl: Duration::from_secs(600),
            prefer_healthy_over_warm: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_cache_age_sec: u64,
    pub min_cache_hit_rate: f64,
    pub max_cache_size_tokens: u64,
}

impl CacheConfig {
    pub fn max_cache_age(&self) -> Duration {
        Duration::from_secs(self.max_cache_age_sec)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_age_sec: 60,
            min_cache_hit_rate: 0.0,
            max_cache_size_tokens: 1_000_000,
        }
    }
}
