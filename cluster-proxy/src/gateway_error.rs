//! # Proxy Error Types
//!
//! HTTP-facing error envelope. Grounded on the teacher's `GatewayError`
//! (`gateway_error.rs`): a flat `thiserror` enum with an `IntoResponse`
//! impl that maps each variant to a status code and a JSON body shaped
//! `{"error": {"message", "type", "code"}}`. Spec section 6 pins one
//! variant's exact wire shape: `selectNode` returning nothing becomes
//! `503` with `Retry-After` and `{"type":"error","error":{"type":
//! "cluster_unavailable", ...}}`.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    /// No routable node was available to serve the request.
    #[error("no routable node available")]
    ClusterUnavailable { retry_after_secs: u64 },

    /// The configured node id does not exist in the fleet.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, error_type, retry_after) = match &self {
            ProxyError::ClusterUnavailable { retry_after_secs } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "cluster_unavailable",
                Some(*retry_after_secs),
            ),
            ProxyError::UnknownNode(_) => (StatusCode::NOT_FOUND, "unknown_node", None),
            ProxyError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error", None),
        };

        let body = Json(json!({
            "type": "error",
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn cluster_unavailable_sets_retry_after_and_status() {
        let response = ProxyError::ClusterUnavailable {
            retry_after_secs: 5,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "5");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "cluster_unavailable");
        assert_eq!(json["type"], "error");
    }
}
