//! Integration tests for the HTTP status surface this binary actually
//! exposes. Request forwarding (and therefore the scenario-6 503 path
//! riding on top of a forwarded request) sits in front of this crate's
//! scope; the response shaping it would use is exercised directly in
//! `cluster_proxy::gateway_error`.

use axum::http::StatusCode;
use axum_test::TestServer;
use cluster_core::config::{DiscoveryMode, StaticNodeConfig};
use cluster_proxy::config::ProxyConfig;
use cluster_proxy::create_server;
use std::sync::Arc;
use std::time::Duration;

fn config_with_unreachable_node() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.cluster.discovery.mode = DiscoveryMode::Static {
        nodes: vec![StaticNodeConfig {
            id: "n0".into(),
            url: "http://127.0.0.1:1".into(),
        }],
    };
    config.cluster.discovery.refresh_interval = Duration::from_secs(300);
    config.cluster.health.check_interval = Duration::from_millis(50);
    config.cluster.health.timeout = Duration::from_millis(100);
    config
}

#[tokio::test]
async fn status_reports_zero_healthy_nodes_when_fleet_is_unreachable() {
    let config = config_with_unreachable_node();
    let manager = Arc::new(
        cluster_core::manager::ClusterManager::new(config.cluster.clone()).unwrap(),
    );
    manager.init().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let app = create_server(&config, manager.clone()).await;
    let server = TestServer::new(app).unwrap();
    let response = server.get("/status").await;
    manager.shutdown().await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["initialized"], true);
    assert_eq!(body["totalNodes"], 1);
    assert_eq!(body["healthyNodes"], 0);
}

#[tokio::test]
async fn healthz_is_independent_of_fleet_health() {
    let config = config_with_unreachable_node();
    let manager = Arc::new(
        cluster_core::manager::ClusterManager::new(config.cluster.clone()).unwrap(),
    );
    let app = create_server(&config, manager).await;
    let server = TestServer::new(app).unwrap();

    let response = server.get("/healthz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}
