//! # Cluster Proxy Binary
//!
//! Entry point: parse args, load config, start the cluster manager,
//! serve the status surface until interrupted.

use clap::Parser;
use cluster_core::manager::ClusterManager;
use cluster_proxy::config::ProxyConfig;
use cluster_proxy::server::create_server;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "cluster.toml")]
    config: String,

    /// Port number for the HTTP status server. Overrides the config
    /// file when set.
    #[arg(short, long)]
    port: Option<u16>,

    /// Host address to bind the server to. Overrides the config file
    /// when set.
    #[arg(long)]
    host: Option<String>,

    /// Logging level for the application.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    let mut config = ProxyConfig::load(&args.config)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    let manager = Arc::new(ClusterManager::new(config.cluster.clone())?);
    manager.init().await?;

    let app = create_server(&config, manager.clone()).await;

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("starting cluster-proxy status server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    manager.shutdown().await;
    serve_result?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
