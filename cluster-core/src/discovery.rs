//! # Discovery
//!
//! Enumerates candidate workers from a configured source and validates
//! each before announcing it. Grounded on the teacher's `Provider`
//! trait plus `create_provider` factory (`providers/mod.rs`): an
//! `#[async_trait]` trait implemented by one struct per backend, picked
//! by a `match` on a config enum, same shape adopted here for
//! `Static`/`Dns`/`Orchestrator` discovery modes.

use crate::config::DiscoveryMode;
use crate::error::DiscoveryError;
use crate::node::{canonicalize_url, NodeId};
use crate::transport::Transport;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// One candidate worker surfaced by a discovery source, before
/// validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: NodeId,
    pub url: String,
}

pub type NodeDiscoveredCallback = Arc<dyn Fn(Candidate) + Send + Sync>;
pub type NodeLostCallback = Arc<dyn Fn(NodeId) + Send + Sync>;
pub type DiscoveryErrorCallback = Arc<dyn Fn(DiscoveryError) + Send + Sync>;

/// Expected `/v1/models` response envelope used to validate a
/// candidate worker (spec section 6).
#[derive(Debug, Deserialize)]
struct ModelsEnvelope {
    #[allow(dead_code)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    #[allow(dead_code)]
    id: String,
}

/// Shared output contract for every discovery backend.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Enumerate the source and validate each candidate, firing
    /// `on_node_discovered`/`on_node_lost` for alive/dead transitions.
    /// Re-entrant calls while a refresh is already running are no-ops
    /// (single-flight guard); the guard clears even if this errors.
    async fn refresh(&self);

    /// Immutable snapshot of nodes currently considered alive.
    async fn discovered_nodes(&self) -> Vec<Candidate>;
}

struct Callbacks {
    on_discovered: Option<NodeDiscoveredCallback>,
    on_lost: Option<NodeLostCallback>,
    on_error: Option<DiscoveryErrorCallback>,
}

impl Callbacks {
    fn fire_discovered(&self, c: Candidate) {
        if let Some(cb) = &self.on_discovered {
            cb(c);
        }
    }
    fn fire_lost(&self, id: NodeId) {
        if let Some(cb) = &self.on_lost {
            cb(id);
        }
    }
    fn fire_error(&self, e: DiscoveryError) {
        if let Some(cb) = &self.on_error {
            cb(e);
        }
    }
}

/// Deduplicate a raw candidate list by id and by canonicalized URL,
/// keeping the first occurrence of each.
fn dedupe(raw: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen_ids = HashSet::new();
    let mut seen_urls = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for candidate in raw {
        let canon = canonicalize_url(&candidate.url);
        if !seen_ids.insert(candidate.id.clone()) || !seen_urls.insert(canon) {
            continue;
        }
        out.push(candidate);
    }
    out
}

/// A list of statically configured workers, re-validated on a timer.
pub struct StaticDiscovery {
    configured: Vec<Candidate>,
    validation_timeout: Duration,
    alive: RwLock<HashSet<NodeId>>,
    refreshing: AtomicBool,
    callbacks: Callbacks,
}

impl StaticDiscovery {
    pub fn new(
        nodes: Vec<(NodeId, String)>,
        validation_timeout: Duration,
        on_discovered: Option<NodeDiscoveredCallback>,
        on_lost: Option<NodeLostCallback>,
        on_error: Option<DiscoveryErrorCallback>,
    ) -> Self {
        let configured = dedupe(
            nodes
                .into_iter()
                .map(|(id, url)| Candidate { id, url })
                .collect(),
        );
        Self {
            configured,
            validation_timeout,
            alive: RwLock::new(HashSet::new()),
            refreshing: AtomicBool::new(false),
            callbacks: Callbacks {
                on_discovered,
                on_lost,
                on_error,
            },
        }
    }

    async fn validate(&self, candidate: &Candidate) -> Result<(), DiscoveryError> {
        let transport = Transport::new(candidate.url.clone())?;
        transport
            .get_json::<ModelsEnvelope>("/v1/models", self.validation_timeout)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn refresh(&self) {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        for candidate in &self.configured {
            let result = self.validate(candidate).await;
            let mut alive = self.alive.write().await;
            let was_alive = alive.contains(&candidate.id);

            match result {
                Ok(()) => {
                    if !was_alive {
                        alive.insert(candidate.id.clone());
                        drop(alive);
                        tracing::info!(node_id = %candidate.id, url = %candidate.url, "node discovered");
                        self.callbacks.fire_discovered(candidate.clone());
                    }
                }
                Err(err) => {
                    if was_alive {
                        alive.remove(&candidate.id);
                        drop(alive);
                        tracing::info!(node_id = %candidate.id, "node lost");
                        self.callbacks.fire_lost(candidate.id.clone());
                    } else {
                        drop(alive);
                    }
                    tracing::warn!(node_id = %candidate.id, url = %candidate.url, error = %err, "discovery validation failed");
                    self.callbacks.fire_error(err);
                }
            }
        }

        self.refreshing.store(false, Ordering::SeqCst);
    }

    async fn discovered_nodes(&self) -> Vec<Candidate> {
        let alive = self.alive.read().await;
        self.configured
            .iter()
            .filter(|c| alive.contains(&c.id))
            .cloned()
            .collect()
    }
}

/// Resolves a DNS name to a live address set on every refresh and
/// validates each resolved address exactly like a static node. Unlike
/// [`StaticDiscovery`] the candidate set itself changes between
/// refreshes, so the alive table stores `id -> url` rather than a
/// fixed `configured` list.
pub struct DnsDiscovery {
    dns_name: String,
    port: u16,
    validation_timeout: Duration,
    alive: RwLock<HashMap<NodeId, String>>,
    refreshing: AtomicBool,
    callbacks: Callbacks,
}

impl DnsDiscovery {
    pub fn new(
        dns_name: String,
        port: u16,
        validation_timeout: Duration,
        on_discovered: Option<NodeDiscoveredCallback>,
        on_lost: Option<NodeLostCallback>,
        on_error: Option<DiscoveryErrorCallback>,
    ) -> Self {
        Self {
            dns_name,
            port,
            validation_timeout,
            alive: RwLock::new(HashMap::new()),
            refreshing: AtomicBool::new(false),
            callbacks: Callbacks {
                on_discovered,
                on_lost,
                on_error,
            },
        }
    }

    fn candidate_id(&self, addr: &std::net::SocketAddr) -> NodeId {
        NodeId::new(format!("dns-{}-{}-{}", self.dns_name, self.port, addr))
    }

    async fn resolve(&self) -> Result<Vec<Candidate>, DiscoveryError> {
        let query = format!("{}:{}", self.dns_name, self.port);
        let addrs = tokio::net::lookup_host(&query)
            .await
            .map_err(|e| DiscoveryError::NetworkError {
                node_id: None,
                url: Some(query.clone()),
                message: e.to_string(),
            })?;
        Ok(addrs
            .map(|addr| Candidate {
                id: self.candidate_id(&addr),
                url: format!("http://{addr}"),
            })
            .collect())
    }

    async fn validate(&self, candidate: &Candidate) -> Result<(), DiscoveryError> {
        let transport = Transport::new(candidate.url.clone())?;
        transport
            .get_json::<ModelsEnvelope>("/v1/models", self.validation_timeout)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl Discovery for DnsDiscovery {
    async fn refresh(&self) {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let candidates = match self.resolve().await {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(dns_name = %self.dns_name, port = self.port, error = %err, "dns resolution failed");
                self.callbacks.fire_error(err);
                self.refreshing.store(false, Ordering::SeqCst);
                return;
            }
        };
        let resolved_ids: HashSet<NodeId> = candidates.iter().map(|c| c.id.clone()).collect();

        for candidate in &candidates {
            let result = self.validate(candidate).await;
            let mut alive = self.alive.write().await;
            let was_alive = alive.contains_key(&candidate.id);

            match result {
                Ok(()) => {
                    if !was_alive {
                        alive.insert(candidate.id.clone(), candidate.url.clone());
                        drop(alive);
                        tracing::info!(node_id = %candidate.id, url = %candidate.url, "dns candidate discovered");
                        self.callbacks.fire_discovered(candidate.clone());
                    }
                }
                Err(err) => {
                    if was_alive {
                        alive.remove(&candidate.id);
                        drop(alive);
                        tracing::info!(node_id = %candidate.id, "dns candidate lost");
                        self.callbacks.fire_lost(candidate.id.clone());
                    } else {
                        drop(alive);
                    }
                    tracing::warn!(node_id = %candidate.id, url = %candidate.url, error = %err, "dns candidate validation failed");
                    self.callbacks.fire_error(err);
                }
            }
        }

        let stale: Vec<NodeId> = {
            let alive = self.alive.read().await;
            alive
                .keys()
                .filter(|id| !resolved_ids.contains(*id))
                .cloned()
                .collect()
        };
        for id in stale {
            self.alive.write().await.remove(&id);
            tracing::info!(node_id = %id, "dns candidate lost (address no longer resolves)");
            self.callbacks.fire_lost(id);
        }

        self.refreshing.store(false, Ordering::SeqCst);
    }

    async fn discovered_nodes(&self) -> Vec<Candidate> {
        self.alive
            .read()
            .await
            .iter()
            .map(|(id, url)| Candidate {
                id: id.clone(),
                url: url.clone(),
            })
            .collect()
    }
}

/// Stand-in for a discovery source that isn't implemented yet. Fires
/// `on_error` with `UnsupportedMode` on every refresh instead of
/// silently behaving as an empty, always-succeeding static list.
pub struct UnsupportedDiscovery {
    mode_name: &'static str,
    callbacks: Callbacks,
}

impl UnsupportedDiscovery {
    pub fn new(mode_name: &'static str, on_error: Option<DiscoveryErrorCallback>) -> Self {
        Self {
            mode_name,
            callbacks: Callbacks {
                on_discovered: None,
                on_lost: None,
                on_error,
            },
        }
    }
}

#[async_trait]
impl Discovery for UnsupportedDiscovery {
    async fn refresh(&self) {
        let err = DiscoveryError::UnsupportedMode {
            mode: self.mode_name.to_string(),
        };
        tracing::warn!(mode = self.mode_name, "discovery mode not implemented");
        self.callbacks.fire_error(err);
    }

    async fn discovered_nodes(&self) -> Vec<Candidate> {
        Vec::new()
    }
}

/// Build the configured [`Discovery`] backend.
pub fn build_discovery(
    mode: &DiscoveryMode,
    validation_timeout: Duration,
    on_discovered: Option<NodeDiscoveredCallback>,
    on_lost: Option<NodeLostCallback>,
    on_error: Option<DiscoveryErrorCallback>,
) -> Arc<dyn Discovery> {
    match mode {
        DiscoveryMode::Static { nodes } => {
            let nodes = nodes
                .iter()
                .map(|n| (NodeId::new(n.id.clone()), n.url.clone()))
                .collect();
            Arc::new(StaticDiscovery::new(
                nodes,
                validation_timeout,
                on_discovered,
                on_lost,
                on_error,
            ))
        }
        DiscoveryMode::Dns { dns_name, port } => Arc::new(DnsDiscovery::new(
            dns_name.clone(),
            *port,
            validation_timeout,
            on_discovered,
            on_lost,
            on_error,
        )),
        DiscoveryMode::Orchestrator { .. } => {
            // Endpoint listing against a namespace + label selector is
            // left to a future orchestrator client. Rather than
            // pretending to be an empty-but-valid static list, this
            // mode reports itself unsupported on every refresh.
            Arc::new(UnsupportedDiscovery::new("orchestrator", on_error))
        }
    }
}
