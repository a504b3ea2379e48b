//! The six literal end-to-end scenarios enumerated in section 8 of the
//! design document this crate implements, each reproduced with its
//! exact inputs and expected outcomes.

use cluster_core::health::{HealthPolicy, NodeHealthTracker};
use cluster_core::node::{Node, NodeCache, NodeHealth, NodeId, NodeMetrics, NodeStatus};
use cluster_core::router::{NodeSelection, Router, RoutingContext, RoutingStrategy};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn healthy_node(id: &str) -> Node {
    let mut node = Node::new(NodeId::new(id), format!("http://{id}"));
    node.status = NodeStatus::Healthy;
    node
}

#[test]
fn scenario_1_round_robin_cycling() {
    let router = Router::new(RoutingStrategy::RoundRobin, Duration::from_secs(60), None, None);
    let fleet = vec![healthy_node("A"), healthy_node("B"), healthy_node("C")];
    let ctx = RoutingContext::default();

    let picks: Vec<(NodeId, &'static str, f64)> = (0..4)
        .map(|_| {
            let s = router.select_node(&fleet, &ctx).unwrap();
            (s.node_id, s.reason, s.confidence)
        })
        .collect();

    assert_eq!(picks[0].0, NodeId::new("A"));
    assert_eq!(picks[1].0, NodeId::new("B"));
    assert_eq!(picks[2].0, NodeId::new("C"));
    assert_eq!(picks[3].0, NodeId::new("A"));
    for (_, reason, confidence) in &picks[..3] {
        assert_eq!(*reason, "round-robin");
        assert!(*confidence >= 0.8);
    }
}

#[test]
fn scenario_2_least_connections_with_tie() {
    let router = Router::new(RoutingStrategy::LeastLoaded, Duration::from_secs(60), None, None);
    let mut a = healthy_node("A");
    a.metrics.requests_in_flight = 3;
    let mut b = healthy_node("B");
    b.metrics.requests_in_flight = 3;
    let mut c = healthy_node("C");
    c.metrics.requests_in_flight = 3;
    let mut fleet = vec![a, b, c];
    let ctx = RoutingContext::default();

    let first = router.select_node(&fleet, &ctx).unwrap();
    assert_eq!(first.node_id, NodeId::new("A"));

    fleet[0].metrics.requests_in_flight = 2;
    let second = router.select_node(&fleet, &ctx).unwrap();
    assert_eq!(second.node_id, NodeId::new("A"));
}

#[test]
fn scenario_3_cache_aware_scoring() {
    let router = Router::new(
        RoutingStrategy::CacheAware {
            prefer_healthy_over_warm: true,
        },
        Duration::from_secs(60),
        None,
        None,
    );

    let mut node1 = healthy_node("node1");
    node1.cache = NodeCache {
        tokens: 0,
        system_prompt_hash: Some("H".into()),
        tools_hash: Some("T".into()),
        last_updated_time: Instant::now() - Duration::from_secs(30),
    };
    node1.health = NodeHealth {
        error_rate: 0.0,
        ..NodeHealth::default()
    };
    node1.metrics = NodeMetrics {
        requests_in_flight: 2,
        ..NodeMetrics::default()
    };

    let mut node2 = healthy_node("node2");
    node2.cache = NodeCache {
        tokens: 0,
        system_prompt_hash: Some("X".into()),
        tools_hash: Some("Y".into()),
        last_updated_time: Instant::now(),
    };
    node2.health = NodeHealth {
        error_rate: 0.0,
        ..NodeHealth::default()
    };
    node2.metrics = NodeMetrics {
        requests_in_flight: 2,
        ..NodeMetrics::default()
    };

    let fleet = vec![node1, node2];
    let ctx = RoutingContext {
        system_prompt_hash: Some("H".into()),
        tools_hash: Some("T".into()),
    };

    let selection = router.select_node(&fleet, &ctx).unwrap();
    assert_eq!(selection.node_id, NodeId::new("node1"));
    assert_eq!(selection.reason, "cache-hit");
}

#[tokio::test(start_paused = true)]
async fn scenario_4_circuit_breaker_trip_and_recovery() {
    let policy = HealthPolicy {
        window: Duration::from_secs(60),
        max_consecutive_failures: 3,
        unhealthy_threshold: 0.5,
        degraded_threshold: 0.8,
        min_samples_for_demotion: 1,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(60),
        multiplier: 2.0,
    };
    let mut tracker = NodeHealthTracker::new(policy);

    for _ in 0..4 {
        tracker.record_failure("probe failed");
    }
    assert_eq!(tracker.status(), NodeStatus::Unhealthy);
    assert_eq!(tracker.current_backoff(), Duration::from_secs(8));

    tokio::time::advance(Duration::from_secs(9)).await;
    assert!(tracker.should_attempt_recovery());

    tracker.record_success(5.0);
    assert_eq!(tracker.status(), NodeStatus::Healthy);
    assert_eq!(tracker.current_backoff(), Duration::from_secs(1));
}

#[test]
fn scenario_5_sticky_session_survives_node_loss() {
    let router = Router::new(RoutingStrategy::RoundRobin, Duration::from_secs(60), None, None);
    let a = healthy_node("A");
    let b = healthy_node("B");
    let ctx = RoutingContext::default();

    let first = router
        .select_node_with_sticky(&[a.clone(), b.clone()], &ctx, "S1")
        .unwrap();
    assert_eq!(first.node_id, NodeId::new("A"));

    let mut offline_a = a;
    offline_a.status = NodeStatus::Offline;
    let second = router
        .select_node_with_sticky(&[offline_a, b], &ctx, "S1")
        .unwrap();

    assert_eq!(second.node_id, NodeId::new("B"));
    assert_ne!(second.reason, "sticky");
}

#[test]
fn scenario_6_no_routable_nodes_fires_callback_once() {
    let calls: Arc<Mutex<Vec<RoutingContext>>> = Arc::new(Mutex::new(Vec::new()));
    let calls_clone = calls.clone();
    let router = Router::new(
        RoutingStrategy::RoundRobin,
        Duration::from_secs(60),
        Some(Arc::new(move |ctx: RoutingContext| {
            calls_clone.lock().unwrap().push(ctx);
        })),
        None,
    );

    let mut fleet = vec![healthy_node("A"), healthy_node("B"), healthy_node("C")];
    for node in &mut fleet {
        node.status = NodeStatus::Unhealthy;
    }

    let ctx = RoutingContext {
        system_prompt_hash: Some("H".into()),
        tools_hash: None,
    };
    let selection: Option<NodeSelection> = router.select_node(&fleet, &ctx);

    assert!(selection.is_none());
    assert_eq!(calls.lock().unwrap().len(), 1);
}
