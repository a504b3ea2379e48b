//! # Cluster Proxy
//!
//! Thin HTTP front end over [`cluster_core`]: loads a
//! [`config::ProxyConfig`], starts a [`cluster_core::manager::ClusterManager`],
//! and exposes `/healthz` and `/status`. Request forwarding is out of
//! scope for this binary (spec section 1); it is the status/health
//! surface a front-end proxy would sit next to.

pub mod config;
pub mod gateway_error;
pub mod server;

pub use server::create_server;
