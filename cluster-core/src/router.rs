//! # Router
//!
//! Pure selection logic plus the sticky-session table. Holds no HTTP
//! state and never sees the Manager's live node map, only snapshots.
//! Grounded on the teacher's `Router`/`RoutingStrategy`
//! (`routing.rs`): a strategy enum chosen at construction, one
//! `select_*` method per variant, same struct-field selection result
//! shape. The teacher's round-robin (`Utc::now().timestamp() as usize %
//! len`) is not actually round-robin — consecutive calls within the
//! same second return the same index — so this version replaces it
//! with a real `AtomicUsize` counter.

use crate::node::{Node, NodeId, NodeStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStrategy {
    RoundRobin,
    LeastLoaded,
    LatencyBased,
    CacheAware { prefer_healthy_over_warm: bool },
}

/// What the caller is trying to route: the identifying hashes used by
/// cache-affinity scoring.
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    pub system_prompt_hash: Option<String>,
    pub tools_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSelection {
    pub node_id: NodeId,
    pub reason: &'static str,
    pub confidence: f64,
}

pub type RoutingFailedCallback = std::sync::Arc<dyn Fn(RoutingContext) + Send + Sync>;
pub type SessionExpiredCallback = std::sync::Arc<dyn Fn(String, NodeId) + Send + Sync>;

struct StickyEntry {
    node_id: NodeId,
    expires_at: Instant,
}

/// `sessionId -> (nodeId, expiresAt)`. Owned by the Router, not shared
/// with Manager or Health.
struct StickyTable {
    ttl: Duration,
    entries: Mutex<HashMap<String, StickyEntry>>,
    on_expired: Option<SessionExpiredCallback>,
}

impl StickyTable {
    fn new(ttl: Duration, on_expired: Option<SessionExpiredCallback>) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            on_expired,
        }
    }

    /// Insert or replace; always resets the TTL (last-write-wins).
    fn create(&self, session_id: &str, node_id: NodeId) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            session_id.to_string(),
            StickyEntry {
                node_id,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Returns the bound node if the entry exists and has not expired.
    /// An expired entry is removed as a side effect of the lookup.
    fn get(&self, session_id: &str) -> Option<NodeId> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(session_id) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.node_id.clone()),
            Some(_) => {
                entries.remove(session_id);
                None
            }
            None => None,
        }
    }

    /// Remove every entry whose TTL has elapsed, firing `on_expired`
    /// for each. Swallows a panicking callback so the sweep is never
    /// aborted by an observer.
    fn sweep(&self) {
        let expired: Vec<(String, NodeId)> = {
            let mut entries = self.entries.lock().unwrap();
            let now = Instant::now();
            let expired_keys: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.expires_at <= now)
                .map(|(k, _)| k.clone())
                .collect();
            expired_keys
                .into_iter()
                .filter_map(|k| entries.remove(&k).map(|e| (k, e.node_id)))
                .collect()
        };
        for (session_id, node_id) in expired {
            if let Some(cb) = &self.on_expired {
                let (session_id, node_id) = (session_id.clone(), node_id.clone());
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    cb(session_id.clone(), node_id.clone());
                }));
                if result.is_err() {
                    tracing::warn!(session_id = %session_id, node_id = %node_id, "session-expired callback panicked");
                }
            }
        }
    }
}

/// Selects a node from a fleet snapshot using one configured strategy,
/// plus the sticky-session table.
pub struct Router {
    strategy: RoutingStrategy,
    round_robin_cursor: AtomicU64,
    sticky: StickyTable,
    on_routing_failed: Option<RoutingFailedCallback>,
}

impl Router {
    pub fn new(
        strategy: RoutingStrategy,
        sticky_ttl: Duration,
        on_routing_failed: Option<RoutingFailedCallback>,
        on_session_expired: Option<SessionExpiredCallback>,
    ) -> Self {
        Self {
            strategy,
            round_robin_cursor: AtomicU64::new(0),
            sticky: StickyTable::new(sticky_ttl, on_session_expired),
            on_routing_failed,
        }
    }

    pub fn sweep_sticky_sessions(&self) {
        self.sticky.sweep();
    }

    fn routable<'a>(&self, fleet: &'a [Node]) -> Vec<&'a Node> {
        fleet.iter().filter(|n| n.status.is_routable()).collect()
    }

    /// Select a node from a fleet snapshot, ignoring sticky sessions.
    pub fn select_node(&self, fleet: &[Node], context: &RoutingContext) -> Option<NodeSelection> {
        let routable = self.routable(fleet);
        if routable.is_empty() {
            if let Some(cb) = &self.on_routing_failed {
                cb(context.clone());
            }
            return None;
        }

        Some(match self.strategy {
            RoutingStrategy::RoundRobin => self.select_round_robin(&routable),
            RoutingStrategy::LeastLoaded => self.select_least_loaded(&routable),
            RoutingStrategy::LatencyBased => self.select_latency_based(&routable),
            RoutingStrategy::CacheAware {
                prefer_healthy_over_warm,
            } => self.select_cache_aware(&routable, context, prefer_healthy_over_warm),
        })
    }

    /// Sticky-aware selection: a live, routable sticky binding short
    /// circuits the strategy. Otherwise falls through to the strategy
    /// and overwrites the sticky entry with the fresh pick.
    pub fn select_node_with_sticky(
        &self,
        fleet: &[Node],
        context: &RoutingContext,
        session_id: &str,
    ) -> Option<NodeSelection> {
        if let Some(bound) = self.sticky.get(session_id) {
            if let Some(node) = fleet.iter().find(|n| n.id == bound) {
                if node.status.is_routable() {
                    return Some(NodeSelection {
                        node_id: node.id.clone(),
                        reason: "sticky",
                        confidence: 0.95,
                    });
                }
            }
        }

        let selection = self.select_node(fleet, context)?;
        self.sticky.create(session_id, selection.node_id.clone());
        Some(selection)
    }

    /// Batched variant keyed by `context.systemPromptHash`; duplicate
    /// hashes collapse to one lookup.
    pub fn routing_plan(
        &self,
        fleet: &[Node],
        contexts: &[RoutingContext],
    ) -> HashMap<Option<String>, Option<NodeSelection>> {
        let mut plan = HashMap::new();
        for context in contexts {
            plan.entry(context.system_prompt_hash.clone())
                .or_insert_with(|| self.select_node(fleet, context));
        }
        plan
    }

    fn select_round_robin(&self, routable: &[&Node]) -> NodeSelection {
        let index = self.round_robin_cursor.fetch_add(1, Ordering::SeqCst) as usize % routable.len();
        NodeSelection {
            node_id: routable[index].id.clone(),
            reason: "round-robin",
            confidence: 0.9,
        }
    }

    fn select_least_loaded(&self, routable: &[&Node]) -> NodeSelection {
        let best = routable
            .iter()
            .min_by_key(|n| n.metrics.requests_in_flight)
            .expect("routable is non-empty");
        NodeSelection {
            node_id: best.id.clone(),
            reason: "least-loaded",
            confidence: 0.8,
        }
    }

    fn select_latency_based(&self, routable: &[&Node]) -> NodeSelection {
        let best = routable
            .iter()
            .min_by(|a, b| {
                a.health
                    .avg_response_time_ms
                    .partial_cmp(&b.health.avg_response_time_ms)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("routable is non-empty");
        NodeSelection {
            node_id: best.id.clone(),
            reason: "latency",
            confidence: 0.8,
        }
    }

    fn select_cache_aware(
        &self,
        routable: &[&Node],
        context: &RoutingContext,
        _prefer_healthy_over_warm: bool,
    ) -> NodeSelection {
        let mut best_index = 0usize;
        let mut best_score = -1.0f64;
        let mut best_cache_score = -1.0f64;
        for (i, node) in routable.iter().enumerate() {
            let score = cache_affinity_score(node, context);
            if score.total > best_score {
                best_score = score.total;
                best_cache_score = score.cache_component;
                best_index = i;
            }
        }

        // Fallback is decided on the cache-only contribution (prompt
        // match, tools match, cache recency), not the total score: the
        // health/load terms are near-always positive, so gating on the
        // total would make "cache-fallback" effectively unreachable.
        if best_cache_score <= 0.0 {
            let fallback = self.select_round_robin(routable);
            return NodeSelection {
                node_id: fallback.node_id,
                reason: "cache-fallback",
                confidence: 0.5,
            };
        }

        NodeSelection {
            node_id: routable[best_index].id.clone(),
            reason: "cache-hit",
            confidence: (best_score / 120.0).min(1.0),
        }
    }
}

/// Cache-affinity score split into its cache-derived component
/// (prompt/tools/recency, max 80) and its total (plus health/load
/// terms, max 120). Spec section 4.5 keys the round-robin fallback
/// decision off the cache-derived component alone.
struct CacheScore {
    cache_component: f64,
    total: f64,
}

fn cache_affinity_score(node: &Node, context: &RoutingContext) -> CacheScore {
    let mut cache_component = 0.0;

    let prompt_hit = context.system_prompt_hash.is_some()
        && node.cache.system_prompt_hash == context.system_prompt_hash;
    if prompt_hit {
        cache_component += 50.0;
        let tools_hit =
            context.tools_hash.is_some() && node.cache.tools_hash == context.tools_hash;
        if tools_hit {
            cache_component += 20.0;
        }
    }

    if node.cache.age() < Duration::from_secs(60) {
        cache_component += 10.0;
    }

    let mut total = cache_component;
    total += 25.0 * (1.0 - node.health.error_rate.clamp(0.0, 1.0));
    if node.metrics.requests_in_flight < 5 {
        total += 15.0;
    }

    CacheScore {
        cache_component,
        total,
    }
}
