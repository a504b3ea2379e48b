//! # Worker Transport
//!
//! Opaque HTTP handle bound to one worker's base URL. Grounded on the
//! teacher's `HttpProviderClient` (`providers/http_client.rs`): a
//! `reqwest::Client` plus a base URL, with small helpers for building
//! request URLs. Trimmed to what the cluster core needs — health
//! probing and discovery validation — since request forwarding itself
//! is explicitly out of this core's scope (spec.md section 1).
//!
//! Per spec.md section 3, the `Transport` is owned by the
//! [`crate::manager::ClusterManager`] and handed out by reference; it is
//! safe for concurrent use by multiple in-flight requests.

use crate::error::{DiscoveryError, ProbeError};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

/// HTTP client bound to one worker's base URL.
#[derive(Debug, Clone)]
pub struct Transport {
    http: Client,
    base_url: String,
}

impl Transport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DiscoveryError> {
        let base_url = base_url.into();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(DiscoveryError::InvalidUrl {
                url: base_url.clone(),
                message: "url must start with http:// or https://".to_string(),
            });
        }
        let http = Client::builder().build().map_err(|e| DiscoveryError::NetworkError {
            node_id: None,
            url: Some(base_url.clone()),
            message: e.to_string(),
        })?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url.trim_end_matches('/'), path)
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path)
        }
    }

    /// `GET {base_url}/health`. A 2xx response within `timeout` is a
    /// success; anything else is a [`ProbeError`]. The body is ignored.
    pub async fn probe_health(&self, timeout: Duration) -> Result<Duration, ProbeError> {
        let start = Instant::now();
        let url = self.build_url("/health");
        let result = tokio::time::timeout(timeout, self.http.get(&url).send()).await;

        match result {
            Err(_) => Err(ProbeError::Timeout {
                millis: timeout.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(ProbeError::Network(e.to_string())),
            Ok(Ok(resp)) => {
                let elapsed = start.elapsed();
                if resp.status().is_success() && elapsed <= timeout {
                    Ok(elapsed)
                } else if !resp.status().is_success() {
                    Err(ProbeError::Status {
                        status: resp.status().as_u16(),
                    })
                } else {
                    Err(ProbeError::Timeout {
                        millis: elapsed.as_millis() as u64,
                    })
                }
            }
        }
    }

    /// `GET {base_url}{path}`, used by [`crate::discovery`] to validate
    /// a candidate worker against `/v1/models`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<T, DiscoveryError> {
        let url = self.build_url(path);
        let result = tokio::time::timeout(timeout, self.http.get(&url).send()).await;

        let resp = match result {
            Err(_) => {
                return Err(DiscoveryError::NodeTimeout {
                    node_id: None,
                    url: Some(self.base_url.clone()),
                })
            }
            Ok(Err(e)) => {
                return Err(DiscoveryError::NetworkError {
                    node_id: None,
                    url: Some(self.base_url.clone()),
                    message: e.to_string(),
                })
            }
            Ok(Ok(resp)) => resp,
        };

        if !resp.status().is_success() {
            return Err(DiscoveryError::HttpError {
                node_id: None,
                url: Some(self.base_url.clone()),
                message: format!("status {}", resp.status()),
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| DiscoveryError::ValidationFailed {
                node_id: None,
                url: Some(self.base_url.clone()),
                message: e.to_string(),
            })
    }
}
