//! # Node Data Model
//!
//! Defines the entities the rest of `cluster-core` operates on: the
//! opaque [`NodeId`], the [`NodeStatus`] state machine, and the [`Node`]
//! record itself along with its health/cache/metrics sub-records.
//!
//! `Node` is a plain data type. It is never mutated in place by more than
//! one owner: the [`crate::manager::ClusterManager`] owns the
//! `NodeId -> Node` map, and the [`crate::health::NodeHealthTracker`] for
//! a given node is the only thing that mutates that node's `status`,
//! `health`, and `metrics` fields. See `crate::manager` for how the two
//! are kept in sync.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Opaque, stable identifier for a worker node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Five-case node health state machine.
///
/// Allowed transitions (enforced by [`crate::health::NodeHealthTracker`],
/// not by this enum itself):
///
/// - `Initializing -> {Healthy, Unhealthy}`
/// - `Healthy <-> Degraded`
/// - `{Healthy, Degraded} -> Unhealthy`
/// - `Unhealthy -> Healthy` (after a successful recovery probe)
/// - any state `-> Offline` (terminal from the routing point of view; a
///   node only leaves `Offline` via a fresh discovery event, which
///   creates a brand new tracker in `Initializing`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Just registered, no probe has succeeded yet.
    Initializing,
    /// Within success-rate and consecutive-failure thresholds.
    Healthy,
    /// Success rate has dropped below the degraded threshold but the
    /// node is still usable.
    Degraded,
    /// Tripped the circuit breaker; excluded from routing until backoff
    /// elapses and a probe succeeds.
    Unhealthy,
    /// Administratively removed; never selected, never probed.
    Offline,
}

impl NodeStatus {
    /// A node in this status may be returned by the [`crate::router::Router`].
    pub fn is_routable(self) -> bool {
        matches!(self, NodeStatus::Healthy | NodeStatus::Degraded)
    }
}

/// Per-node health record mutated exclusively by that node's
/// [`crate::health::NodeHealthTracker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHealth {
    #[serde(skip, default = "Instant::now")]
    pub last_check_time: Instant,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub avg_response_time_ms: f64,
    pub error_rate: f64,
    pub last_error: Option<String>,
}

impl Default for NodeHealth {
    fn default() -> Self {
        Self {
            last_check_time: Instant::now(),
            consecutive_failures: 0,
            consecutive_successes: 0,
            avg_response_time_ms: 0.0,
            error_rate: 0.0,
            last_error: None,
        }
    }
}

/// Opportunistic record of what a worker most recently served, used for
/// cache-affinity scoring. Advisory only: staleness is acceptable and
/// expected, never load-bearing for correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCache {
    pub tokens: u64,
    pub system_prompt_hash: Option<String>,
    pub tools_hash: Option<String>,
    #[serde(skip, default = "Instant::now")]
    pub last_updated_time: Instant,
}

impl Default for NodeCache {
    fn default() -> Self {
        Self {
            tokens: 0,
            system_prompt_hash: None,
            tools_hash: None,
            last_updated_time: Instant::now(),
        }
    }
}

impl NodeCache {
    pub fn age(&self) -> Duration {
        self.last_updated_time.elapsed()
    }
}

/// Live load/usage counters for a node. `requests_in_flight` is
/// incremented exactly once when a request is handed out and decremented
/// exactly once when it completes, by whatever means (success, failure,
/// or client cancel).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub requests_in_flight: u32,
    pub total_requests: u64,
    pub cache_hit_rate: f64,
    pub avg_latency_ms: f64,
}

/// A worker in the fleet.
///
/// Created by [`crate::discovery`], its status/health/metrics are owned
/// by its [`crate::health::NodeHealthTracker`], and the
/// [`crate::manager::ClusterManager`] owns the map this record lives in
/// plus the bound [`crate::transport::Transport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub url: String,
    pub status: NodeStatus,
    pub health: NodeHealth,
    pub cache: NodeCache,
    pub metrics: NodeMetrics,
}

impl Node {
    pub fn new(id: NodeId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            status: NodeStatus::Initializing,
            health: NodeHealth::default(),
            cache: NodeCache::default(),
            metrics: NodeMetrics::default(),
        }
    }
}

/// Canonicalise a worker URL for deduplication: trim a trailing slash and
/// lowercase the host portion, leaving the path/query untouched.
pub fn canonicalize_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    match trimmed.split_once("://") {
        Some((scheme, rest)) => {
            let (host, tail) = match rest.find('/') {
                Some(idx) => (&rest[..idx], &rest[idx..]),
                None => (rest, ""),
            };
            format!("{}://{}{}", scheme.to_lowercase(), host.to_lowercase(), tail)
        }
        None => trimmed.to_lowercase(),
    }
}
