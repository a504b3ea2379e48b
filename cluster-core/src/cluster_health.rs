//! # Cluster Health
//!
//! Orchestrates liveness probing across every known node: one
//! background task per node, each on its own schedule (fixed interval
//! while healthy, backoff-gated while unhealthy). Grounded on the
//! teacher's `AdvancedRouter::start_health_monitoring`
//! (`ultrafast-gateway/src/advanced_routing.rs`) — a `tokio::spawn`ed
//! loop around `tokio::time::interval` that calls into a shared
//! `Arc<RwLock<HealthChecker>>` — generalized from one shared interval
//! across all providers to a per-node task so that an `Unhealthy` node
//! can back off independently instead of being probed on the regular
//! cadence.

use crate::cancel::CancellationToken;
use crate::error::ProbeError;
use crate::health::{HealthPolicy, NodeHealthTracker};
use crate::node::{NodeId, NodeStatus};
use crate::transport::Transport;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Fired after a tracker's status changes, outside any internal lock.
pub type StatusChangeCallback = Arc<dyn Fn(NodeId, NodeStatus, NodeStatus) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct ClusterHealthConfig {
    pub policy: HealthPolicy,
    pub check_interval: Duration,
    pub probe_timeout: Duration,
}

struct NodeEntry {
    tracker: RwLock<NodeHealthTracker>,
    transport: Transport,
}

struct Running {
    cancel: CancellationToken,
    handles: RwLock<HashMap<NodeId, JoinHandle<()>>>,
}

/// Probes every known node on its own schedule and funnels data-path
/// outcomes into the same per-node trackers.
pub struct ClusterHealth {
    config: ClusterHealthConfig,
    nodes: Arc<RwLock<HashMap<NodeId, Arc<NodeEntry>>>>,
    on_status_change: Option<StatusChangeCallback>,
    running: Arc<AtomicBool>,
    handle: RwLock<Option<Arc<Running>>>,
}

impl ClusterHealth {
    pub fn new(config: ClusterHealthConfig) -> Self {
        Self {
            config,
            nodes: Arc::new(RwLock::new(HashMap::new())),
            on_status_change: None,
            running: Arc::new(AtomicBool::new(false)),
            handle: RwLock::new(None),
        }
    }

    pub fn with_status_change_callback(mut self, cb: StatusChangeCallback) -> Self {
        self.on_status_change = Some(cb);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register the initial node set, probe each immediately, then
    /// schedule periodic probes. Errors if already started.
    pub async fn start(
        &self,
        nodes: Vec<(NodeId, Transport)>,
    ) -> Result<(), crate::error::ClusterError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(crate::error::ClusterError::AlreadyStarted);
        }

        let cancel = CancellationToken::new();
        let running = Arc::new(Running {
            cancel: cancel.clone(),
            handles: RwLock::new(HashMap::new()),
        });
        *self.handle.write().await = Some(running.clone());

        for (id, transport) in nodes {
            self.spawn_node(id, transport, running.clone()).await;
        }

        Ok(())
    }

    /// Cancel every scheduled and in-flight probe, then wait for each
    /// node task to observe cancellation and exit. Idempotent.
    pub async fn stop(&self) {
        let running = self.handle.write().await.take();
        let Some(running) = running else {
            return;
        };
        running.cancel.cancel();
        let mut handles = running.handles.write().await;
        for (_, handle) in handles.drain() {
            let _ = handle.await;
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Add a node while running; it joins the probe schedule on the
    /// next tick of this call. A no-op if health has not started.
    pub async fn add_node(&self, id: NodeId, transport: Transport) {
        let Some(running) = self.handle.read().await.clone() else {
            return;
        };
        self.spawn_node(id, transport, running).await;
    }

    pub async fn remove_node(&self, id: &NodeId) {
        self.nodes.write().await.remove(id);
        if let Some(running) = self.handle.read().await.as_ref() {
            if let Some(handle) = running.handles.write().await.remove(id) {
                handle.abort();
            }
        }
    }

    async fn spawn_node(&self, id: NodeId, transport: Transport, running: Arc<Running>) {
        let entry = Arc::new(NodeEntry {
            tracker: RwLock::new(NodeHealthTracker::new(self.config.policy)),
            transport,
        });
        self.nodes.write().await.insert(id.clone(), entry.clone());

        let config = self.config;
        let cancel = running.cancel.clone();
        let on_status_change = self.on_status_change.clone();
        let node_id = id.clone();

        let task = tokio::spawn(async move {
            probe_loop(node_id, entry, config, cancel, on_status_change).await;
        });
        running.handles.write().await.insert(id, task);
    }

    /// Data-path hook: forward a successful outcome to the node's
    /// tracker. Unknown ids are ignored.
    pub async fn record_success(&self, id: &NodeId, latency_ms: f64) {
        let entry = self.nodes.read().await.get(id).cloned();
        let Some(entry) = entry else { return };
        let mut tracker = entry.tracker.write().await;
        let before = tracker.status();
        tracker.record_success(latency_ms);
        let after = tracker.status();
        drop(tracker);
        if before != after {
            self.fire_status_change(id.clone(), before, after);
        }
    }

    /// Data-path hook: forward a failed outcome to the node's tracker.
    /// Unknown ids are ignored.
    pub async fn record_failure(&self, id: &NodeId, err: impl Into<String>) {
        let entry = self.nodes.read().await.get(id).cloned();
        let Some(entry) = entry else { return };
        let mut tracker = entry.tracker.write().await;
        let before = tracker.status();
        tracker.record_failure(err);
        let after = tracker.status();
        drop(tracker);
        if before != after {
            self.fire_status_change(id.clone(), before, after);
        }
    }

    pub async fn status(&self, id: &NodeId) -> Option<NodeStatus> {
        let entry = self.nodes.read().await.get(id).cloned()?;
        let status = entry.tracker.read().await.status();
        Some(status)
    }

    pub async fn is_healthy(&self, id: &NodeId) -> bool {
        matches!(
            self.status(id).await,
            Some(NodeStatus::Healthy) | Some(NodeStatus::Degraded)
        )
    }

    /// Point-in-time view of a node's tracker, for projecting into the
    /// Manager's `Node` facade.
    pub async fn snapshot(&self, id: &NodeId) -> Option<NodeHealthSnapshot> {
        let entry = self.nodes.read().await.get(id).cloned()?;
        let tracker = entry.tracker.read().await;
        let metrics = tracker.metrics_snapshot();
        Some(NodeHealthSnapshot {
            status: tracker.status(),
            consecutive_failures: tracker.consecutive_failures(),
            consecutive_successes: tracker.consecutive_successes(),
            avg_latency_ms: metrics.avg_latency_ms,
            error_rate: metrics.error_rate(),
            last_error: tracker.last_error().map(str::to_string),
        })
    }

    fn fire_status_change(&self, id: NodeId, before: NodeStatus, after: NodeStatus) {
        log_status_transition(&id, before, after);
        if let Some(cb) = &self.on_status_change {
            cb(id, before, after);
        }
    }
}

/// Snapshot of a node's tracker state, for projecting into the
/// Manager's `Node` facade.
#[derive(Debug, Clone)]
pub struct NodeHealthSnapshot {
    pub status: NodeStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub avg_latency_ms: f64,
    pub error_rate: f64,
    pub last_error: Option<String>,
}

fn log_status_transition(id: &NodeId, before: NodeStatus, after: NodeStatus) {
    if before == after {
        return;
    }
    match after {
        NodeStatus::Unhealthy | NodeStatus::Offline => {
            tracing::warn!(node_id = %id, ?before, ?after, "node status transition");
        }
        _ => {
            tracing::info!(node_id = %id, ?before, ?after, "node status transition");
        }
    }
}

async fn probe_loop(
    id: NodeId,
    entry: Arc<NodeEntry>,
    config: ClusterHealthConfig,
    cancel: CancellationToken,
    on_status_change: Option<StatusChangeCallback>,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let outcome = cancel
            .run_until_cancelled(entry.transport.probe_health(config.probe_timeout))
            .await;
        let Some(outcome) = outcome else { return };

        let mut tracker = entry.tracker.write().await;
        let before = tracker.status();
        match outcome {
            Ok(elapsed) => {
                let latency_ms = elapsed.as_secs_f64() * 1000.0;
                tracing::debug!(node_id = %id, latency_ms, "probe succeeded");
                tracker.record_success(latency_ms);
            }
            Err(err) => {
                tracing::warn!(node_id = %id, error = %err, "probe failed");
                tracker.record_failure(probe_error_message(err));
            }
        }
        let after = tracker.status();
        let next_wait = next_wait(&tracker, config);
        drop(tracker);

        if before != after {
            log_status_transition(&id, before, after);
            if let Some(cb) = &on_status_change {
                cb(id.clone(), before, after);
            }
        }

        if cancel.run_until_cancelled(tokio::time::sleep(next_wait)).await.is_none() {
            return;
        }
    }
}

fn next_wait(tracker: &NodeHealthTracker, config: ClusterHealthConfig) -> Duration {
    if tracker.status() == NodeStatus::Unhealthy {
        tracker.current_backoff()
    } else {
        config.check_interval
    }
}

fn probe_error_message(err: ProbeError) -> String {
    err.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ClusterHealthConfig {
        ClusterHealthConfig {
            policy: HealthPolicy {
                min_samples_for_demotion: 1,
                ..HealthPolicy::default()
            },
            check_interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn start_twice_without_stop_errors() {
        let health = ClusterHealth::new(test_config());
        health.start(vec![]).await.unwrap();
        let err = health.start(vec![]).await.unwrap_err();
        assert!(matches!(err, crate::error::ClusterError::AlreadyStarted));
        health.stop().await;
    }

    #[tokio::test]
    async fn unknown_node_ids_are_ignored() {
        let health = ClusterHealth::new(test_config());
        health.start(vec![]).await.unwrap();
        health.record_success(&NodeId::new("ghost"), 1.0).await;
        health.record_failure(&NodeId::new("ghost"), "x").await;
        assert_eq!(health.status(&NodeId::new("ghost")).await, None);
        health.stop().await;
    }

    #[tokio::test]
    async fn data_path_outcomes_update_tracker_status() {
        let health = ClusterHealth::new(test_config());
        let id = NodeId::new("n1");
        let transport = Transport::new("http://127.0.0.1:1").unwrap();
        health.start(vec![(id.clone(), transport)]).await.unwrap();

        health.record_success(&id, 10.0).await;
        assert!(health.is_healthy(&id).await);
        health.stop().await;
    }

    #[tokio::test]
    async fn snapshot_projects_tracker_counters_after_success_and_failure() {
        let health = ClusterHealth::new(test_config());
        let id = NodeId::new("n1");
        let transport = Transport::new("http://127.0.0.1:1").unwrap();
        health.start(vec![(id.clone(), transport)]).await.unwrap();

        health.record_success(&id, 12.0).await;
        health.record_failure(&id, "boom").await;

        let snapshot = health.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.consecutive_failures, 1);
        assert_eq!(snapshot.consecutive_successes, 0);
        assert_eq!(snapshot.last_error.as_deref(), Some("boom"));
        health.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let health = ClusterHealth::new(test_config());
        health.start(vec![]).await.unwrap();
        health.stop().await;
        health.stop().await;
    }
}
