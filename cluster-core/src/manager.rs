//! # Cluster Manager
//!
//! Top-level wiring: owns the authoritative `NodeId -> Node` map and
//! the bound [`Transport`] per node, subscribes to Discovery and
//! Health events to mutate that map, and exposes the request-path API
//! (`select_node`, `get_node_transport`, `record_success`,
//! `record_failure`, `status`). Grounded on the teacher's
//! `AdvancedRouter` (`advanced_routing.rs`), which plays the same
//! role of owning provider state and delegating to a health checker
//! and a router — generalized here from a single in-process struct to
//! three cooperating components (`ClusterHealth`, a `Discovery`, and
//! `Router`) the Manager coordinates rather than implements directly.

use crate::cluster_health::{ClusterHealth, ClusterHealthConfig};
use crate::config::{ClusterConfig, DiscoveryMode, RoutingStrategyKind};
use crate::discovery::{build_discovery, Candidate, Discovery};
use crate::error::ClusterError;
use crate::health::HealthPolicy;
use crate::node::{Node, NodeId, NodeStatus};
use crate::router::{NodeSelection, Router, RoutingContext, RoutingStrategy};
use crate::transport::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

struct ManagedNode {
    node: Node,
    transport: Transport,
}

/// Snapshot returned by [`ClusterManager::status`].
#[derive(Debug, Clone)]
pub struct ClusterStatus {
    pub initialized: bool,
    pub total_nodes: usize,
    pub healthy_nodes: usize,
    pub nodes: Vec<Node>,
}

struct Background {
    discovery_refresh: JoinHandle<()>,
    sticky_sweep: JoinHandle<()>,
}

/// Owns the fleet of workers and coordinates discovery, health, and
/// routing on their behalf. A value with an explicit lifecycle
/// (`init`/`shutdown`), never a process-wide singleton.
pub struct ClusterManager {
    config: ClusterConfig,
    nodes: Arc<RwLock<HashMap<NodeId, ManagedNode>>>,
    health: Arc<ClusterHealth>,
    router: Arc<Router>,
    discovery: Arc<dyn Discovery>,
    background: RwLock<Option<Background>>,
    initialized: Arc<std::sync::atomic::AtomicBool>,
}

impl ClusterManager {
    pub fn new(config: ClusterConfig) -> Result<Self, ClusterError> {
        config
            .validate()
            .map_err(|e| ClusterError::Config(e.to_string()))?;

        let nodes: Arc<RwLock<HashMap<NodeId, ManagedNode>>> = Arc::new(RwLock::new(HashMap::new()));

        let health_config = ClusterHealthConfig {
            policy: HealthPolicy {
                window: config.health.check_interval * 6,
                max_consecutive_failures: config.health.max_consecutive_failures,
                unhealthy_threshold: config.health.unhealthy_threshold,
                degraded_threshold: config.health.degraded_threshold,
                min_samples_for_demotion: config.health.min_samples_for_demotion,
                initial_delay: config.backoff.initial_delay,
                max_delay: config.backoff.max_delay,
                multiplier: config.backoff.multiplier,
            },
            check_interval: config.health.check_interval,
            probe_timeout: config.health.timeout,
        };

        let status_nodes = nodes.clone();
        let health = Arc::new(
            ClusterHealth::new(health_config).with_status_change_callback(Arc::new(
                move |id, _before, after| {
                    let nodes = status_nodes.clone();
                    tokio::spawn(async move {
                        if let Some(managed) = nodes.write().await.get_mut(&id) {
                            managed.node.status = after;
                        }
                    });
                },
            )),
        );

        let strategy = match config.routing.strategy {
            RoutingStrategyKind::RoundRobin => RoutingStrategy::RoundRobin,
            RoutingStrategyKind::LeastLoaded => RoutingStrategy::LeastLoaded,
            RoutingStrategyKind::LatencyBased => RoutingStrategy::LatencyBased,
            RoutingStrategyKind::CacheAware => RoutingStrategy::CacheAware {
                prefer_healthy_over_warm: config.routing.prefer_healthy_over_warm,
            },
        };
        let router = Arc::new(Router::new(
            strategy,
            config.routing.session_ttl,
            None,
            None,
        ));

        let discovery_nodes = nodes.clone();
        let discovery_health = health.clone();
        let on_discovered = Arc::new(move |candidate: Candidate| {
            let nodes = discovery_nodes.clone();
            let health = discovery_health.clone();
            tokio::spawn(async move {
                let Ok(transport) = Transport::new(candidate.url.clone()) else {
                    return;
                };
                let node = Node::new(candidate.id.clone(), candidate.url.clone());
                nodes.write().await.insert(
                    candidate.id.clone(),
                    ManagedNode {
                        node,
                        transport: transport.clone(),
                    },
                );
                health.add_node(candidate.id, transport).await;
            });
        });

        let lost_nodes = nodes.clone();
        let lost_health = health.clone();
        let on_lost = Arc::new(move |id: NodeId| {
            let nodes = lost_nodes.clone();
            let health = lost_health.clone();
            tokio::spawn(async move {
                nodes.write().await.remove(&id);
                health.remove_node(&id).await;
            });
        });

        let discovery = build_discovery(
            &config.discovery.mode,
            config.discovery.validation_timeout,
            Some(on_discovered),
            Some(on_lost),
            None,
        );

        Ok(Self {
            config,
            nodes,
            health,
            router,
            discovery,
            background: RwLock::new(None),
            initialized: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        })
    }

    /// Enumerate the configured discovery source, start health probing
    /// for whatever it finds, and start the periodic refresh/sweep
    /// loops.
    pub async fn init(&self) -> Result<(), ClusterError> {
        self.discovery.refresh().await;

        let initial: Vec<(NodeId, Transport)> = {
            let nodes = self.nodes.read().await;
            nodes
                .iter()
                .map(|(id, m)| (id.clone(), m.transport.clone()))
                .collect()
        };
        self.health.start(initial).await?;

        let discovery = self.discovery.clone();
        let refresh_interval = self.config.discovery.refresh_interval;
        let discovery_refresh = tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh_interval);
            loop {
                interval.tick().await;
                discovery.refresh().await;
            }
        });

        let router = self.router.clone();
        let sticky_sweep = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
            loop {
                interval.tick().await;
                router.sweep_sticky_sessions();
            }
        });

        *self.background.write().await = Some(Background {
            discovery_refresh,
            sticky_sweep,
        });
        self.initialized.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    /// Hand out a node for one request. The returned node's
    /// `requests_in_flight` is incremented; the caller must eventually
    /// balance this with [`Self::record_success`] or
    /// [`Self::record_failure`], even on client cancellation.
    pub async fn select_node(
        &self,
        system_prompt_hash: Option<String>,
        tools_hash: Option<String>,
        session_id: Option<&str>,
    ) -> Option<NodeSelection> {
        let fleet = self.fleet_snapshot().await;
        let context = RoutingContext {
            system_prompt_hash,
            tools_hash,
        };
        let selection = match session_id {
            Some(sid) => self.router.select_node_with_sticky(&fleet, &context, sid),
            None => self.router.select_node(&fleet, &context),
        }?;
        self.adjust_in_flight(&selection.node_id, 1).await;
        Some(selection)
    }

    pub async fn get_node_transport(&self, id: &NodeId) -> Option<Transport> {
        self.nodes.read().await.get(id).map(|m| m.transport.clone())
    }

    /// Completion hook for a request that finished successfully.
    /// Balances the in-flight increment made by [`Self::select_node`].
    pub async fn record_success(&self, id: &NodeId, latency_ms: f64) {
        self.adjust_in_flight(id, -1).await;
        self.health.record_success(id, latency_ms).await;
    }

    /// Completion hook for a request that finished with an error.
    /// Balances the in-flight increment made by [`Self::select_node`].
    pub async fn record_failure(&self, id: &NodeId, err: impl Into<String>) {
        self.adjust_in_flight(id, -1).await;
        self.health.record_failure(id, err).await;
    }

    pub async fn status(&self) -> ClusterStatus {
        let fleet = self.fleet_snapshot().await;
        let healthy = fleet.iter().filter(|n| n.status.is_routable()).count();
        ClusterStatus {
            initialized: self.initialized.load(std::sync::atomic::Ordering::SeqCst),
            total_nodes: fleet.len(),
            healthy_nodes: healthy,
            nodes: fleet,
        }
    }

    async fn fleet_snapshot(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .nodes
            .read()
            .await
            .values()
            .map(|m| m.node.clone())
            .collect();
        for node in &mut nodes {
            if let Some(snapshot) = self.health.snapshot(&node.id).await {
                node.status = snapshot.status;
                node.health.consecutive_failures = snapshot.consecutive_failures;
                node.health.consecutive_successes = snapshot.consecutive_successes;
                node.health.avg_response_time_ms = snapshot.avg_latency_ms;
                node.health.error_rate = snapshot.error_rate;
                node.health.last_error = snapshot.last_error;
            }
        }
        nodes
    }

    /// Adjust `requests_in_flight` on a node by `delta`, saturating at
    /// the `u32` bounds. A no-op if the node has since been removed.
    async fn adjust_in_flight(&self, id: &NodeId, delta: i64) {
        if let Some(managed) = self.nodes.write().await.get_mut(id) {
            let current = managed.node.metrics.requests_in_flight as i64;
            managed.node.metrics.requests_in_flight = (current + delta).clamp(0, u32::MAX as i64) as u32;
        }
    }

    pub async fn shutdown(&self) {
        self.health.stop().await;
        if let Some(bg) = self.background.write().await.take() {
            bg.discovery_refresh.abort();
            bg.sticky_sweep.abort();
        }
        self.initialized.store(false, std::sync::atomic::Ordering::SeqCst);
    }
}

fn _assert_send_sync<T: Send + Sync>() {}
fn _manager_is_send_sync() {
    _assert_send_sync::<ClusterManager>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticNodeConfig;

    fn test_config() -> ClusterConfig {
        let mut config = ClusterConfig::default();
        config.discovery.mode = DiscoveryMode::Static {
            nodes: vec![StaticNodeConfig {
                id: "n1".into(),
                url: "http://127.0.0.1:1".into(),
            }],
        };
        config
    }

    #[tokio::test]
    async fn new_rejects_invalid_config() {
        let config = ClusterConfig::default();
        assert!(ClusterManager::new(config).is_err());
    }

    #[tokio::test]
    async fn status_before_init_reports_uninitialized() {
        let manager = ClusterManager::new(test_config()).unwrap();
        let status = manager.status().await;
        assert!(!status.initialized);
        assert_eq!(status.total_nodes, 0);
    }

    #[tokio::test]
    async fn select_node_with_no_nodes_returns_none() {
        let manager = ClusterManager::new(test_config()).unwrap();
        let selection = manager.select_node(None, None, None).await;
        assert!(selection.is_none());
    }

    #[tokio::test]
    async fn shutdown_before_init_is_safe() {
        let manager = ClusterManager::new(test_config()).unwrap();
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn select_node_increments_and_completion_decrements_in_flight() {
        let manager = ClusterManager::new(test_config()).unwrap();
        let id = NodeId::new("n1");
        let transport = Transport::new("http://127.0.0.1:1").unwrap();
        manager.nodes.write().await.insert(
            id.clone(),
            ManagedNode {
                node: {
                    let mut node = Node::new(id.clone(), "http://127.0.0.1:1");
                    node.status = NodeStatus::Healthy;
                    node
                },
                transport,
            },
        );

        let selection = manager.select_node(None, None, None).await.unwrap();
        assert_eq!(selection.node_id, id);
        assert_eq!(
            manager.nodes.read().await.get(&id).unwrap().node.metrics.requests_in_flight,
            1
        );

        manager.record_success(&id, 5.0).await;
        assert_eq!(
            manager.nodes.read().await.get(&id).unwrap().node.metrics.requests_in_flight,
            0
        );
    }
}
