//! # HTTP Server
//!
//! Minimal status surface over a [`ClusterManager`]: `/healthz` for a
//! liveness probe and `/status` for the fleet snapshot. Grounded on
//! the teacher's `create_server`/`AppState` (`server.rs`) — same
//! `ServiceBuilder` layering of CORS, tracing, and a timeout around an
//! `axum::Router` with cloneable shared state — trimmed to the routes
//! this core actually owns. Request forwarding itself is out of
//! scope (spec section 1); `selectNode`/`getNodeTransport` are exposed
//! here only as the read-only `/status` view for operators, not as a
//! forwarding front door.

use crate::config::ProxyConfig;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use cluster_core::manager::ClusterManager;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ClusterManager>,
}

pub async fn create_server(config: &ProxyConfig, manager: Arc<ClusterManager>) -> Router {
    let state = AppState { manager };

    let cors = if config.server.cors.enabled {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .layer(TimeoutLayer::new(config.server.timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.manager.status().await;
    Json(json!({
        "initialized": status.initialized,
        "totalNodes": status.total_nodes,
        "healthyNodes": status.healthy_nodes,
        "nodes": status.nodes.iter().map(|n| json!({
            "id": n.id.as_str(),
            "url": n.url,
            "status": format!("{:?}", n.status),
        })).collect::<Vec<_>>(),
    }))
}
