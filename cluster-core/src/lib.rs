//! # Cluster Core
//!
//! Routing core for a fleet of local LLM inference workers: node
//! discovery, health monitoring with a per-node circuit breaker,
//! rolling-window metrics, and cache-affinity load balancing with
//! sticky sessions.
//!
//! This crate owns the decision of *which worker should handle the
//! next request*; it does not forward requests itself. A thin HTTP
//! front end (see the `cluster-proxy` binary in this workspace) wires
//! [`manager::ClusterManager`] into a request path.
//!
//! ## Quick start
//!
//! ```no_run
//! use cluster_core::config::ClusterConfig;
//! use cluster_core::manager::ClusterManager;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClusterConfig::load("cluster.toml")?;
//! let manager = ClusterManager::new(config)?;
//! manager.init().await?;
//!
//! if let Some(selection) = manager.select_node(None, None, None).await {
//!     let _transport = manager.get_node_transport(&selection.node_id).await;
//! }
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod cluster_health;
pub mod common;
pub mod config;
pub mod discovery;
pub mod error;
pub mod health;
pub mod manager;
pub mod metrics;
pub mod node;
pub mod router;
pub mod transport;

pub use config::ClusterConfig;
pub use error::ClusterError;
pub use manager::ClusterManager;
pub use node::{Node, NodeId, NodeStatus};
pub use router::NodeSelection;
