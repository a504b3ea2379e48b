//! # Node Health Tracker
//!
//! One instance per node: owns a [`RollingWindowMetrics`], the current
//! [`NodeStatus`], consecutive-success/failure counters, and a backoff
//! schedule. Grounded on the teacher's `CircuitBreaker`
//! (`circuit_breaker.rs`) — same `record_success`/`record_failure`
//! shape and the same `min(initial * multiplier^failures, max)` backoff
//! formula — generalized from the teacher's 3-state
//! `Closed`/`Open`/`HalfOpen` breaker to the 5-case [`NodeStatus`] state
//! machine.

use crate::metrics::RollingWindowMetrics;
use crate::node::NodeStatus;
use std::time::Duration;
use tokio::time::Instant;

/// Threshold and backoff parameters shared by every tracker in a
/// cluster. Field names mirror `HealthConfig`/`BackoffConfig` in
/// [`crate::config`].
#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    pub window: Duration,
    pub max_consecutive_failures: u32,
    pub unhealthy_threshold: f64,
    pub degraded_threshold: f64,
    pub min_samples_for_demotion: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_consecutive_failures: 3,
            unhealthy_threshold: 0.5,
            degraded_threshold: 0.8,
            min_samples_for_demotion: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

/// Per-node circuit breaker plus rolling metrics.
#[derive(Debug)]
pub struct NodeHealthTracker {
    policy: HealthPolicy,
    status: NodeStatus,
    metrics: RollingWindowMetrics,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_error: Option<String>,
    last_failure_time: Option<Instant>,
    current_backoff: Duration,
}

impl NodeHealthTracker {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            metrics: RollingWindowMetrics::new(policy.window),
            policy,
            status: NodeStatus::Initializing,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_error: None,
            last_failure_time: None,
            current_backoff: policy.initial_delay,
        }
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn current_backoff(&self) -> Duration {
        self.current_backoff
    }

    pub fn metrics_snapshot(&self) -> crate::metrics::MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Record a successful probe or request outcome.
    pub fn record_success(&mut self, latency_ms: f64) {
        self.metrics.record_success(latency_ms);
        self.consecutive_failures = 0;
        self.consecutive_successes += 1;
        self.current_backoff = self.policy.initial_delay;
        self.last_failure_time = None;

        let snapshot = self.metrics.snapshot();
        self.status = match self.status {
            NodeStatus::Unhealthy => NodeStatus::Healthy,
            NodeStatus::Degraded if snapshot.success_rate >= self.policy.degraded_threshold => {
                NodeStatus::Healthy
            }
            NodeStatus::Initializing => NodeStatus::Healthy,
            other => other,
        };
    }

    /// Record a failed probe or request outcome. `err` becomes the
    /// tracker's `lastError`.
    pub fn record_failure(&mut self, err: impl Into<String>) {
        self.metrics.record_failure();
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        self.last_error = Some(err.into());
        self.last_failure_time = Some(Instant::now());

        // First failure keeps the initial delay; each subsequent one
        // multiplies it, so four failures at multiplier=2 yields
        // initial * 2^3.
        let exponent = self.consecutive_failures.saturating_sub(1).min(62);
        let scaled =
            self.policy.initial_delay.as_secs_f64() * self.policy.multiplier.powi(exponent as i32);
        self.current_backoff = Duration::from_secs_f64(scaled).min(self.policy.max_delay);

        if matches!(self.status, NodeStatus::Offline) {
            return;
        }

        let snapshot = self.metrics.snapshot();
        let enough_samples = snapshot.total_samples >= self.policy.min_samples_for_demotion;

        self.status = if self.consecutive_failures >= self.policy.max_consecutive_failures
            || (enough_samples && snapshot.success_rate < self.policy.unhealthy_threshold)
        {
            NodeStatus::Unhealthy
        } else if enough_samples && snapshot.success_rate < self.policy.degraded_threshold {
            NodeStatus::Degraded
        } else {
            self.status
        };
    }

    /// True only when `Unhealthy` and the backoff window has elapsed
    /// since the last recorded failure.
    pub fn should_attempt_recovery(&self) -> bool {
        if self.status != NodeStatus::Unhealthy {
            return false;
        }
        match self.last_failure_time {
            Some(t) => Instant::now() >= t + self.current_backoff,
            None => true,
        }
    }

    /// Force `Offline` from any state. No further status transitions
    /// occur until a fresh tracker replaces this one.
    pub fn mark_offline(&mut self) {
        self.status = NodeStatus::Offline;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> HealthPolicy {
        HealthPolicy {
            window: Duration::from_secs(60),
            max_consecutive_failures: 3,
            unhealthy_threshold: 0.5,
            degraded_threshold: 0.8,
            min_samples_for_demotion: 1,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }

    #[test]
    fn starts_initializing_with_zero_samples() {
        let tracker = NodeHealthTracker::new(policy());
        assert_eq!(tracker.status(), NodeStatus::Initializing);
        assert_eq!(tracker.metrics_snapshot().total_samples, 0);
    }

    #[test]
    fn first_success_moves_to_healthy() {
        let mut tracker = NodeHealthTracker::new(policy());
        tracker.record_success(10.0);
        assert_eq!(tracker.status(), NodeStatus::Healthy);
        assert_eq!(tracker.consecutive_successes(), 1);
        assert_eq!(tracker.consecutive_failures(), 0);
    }

    #[test]
    fn success_then_failure_resets_counters_exclusively() {
        let mut tracker = NodeHealthTracker::new(policy());
        tracker.record_success(5.0);
        tracker.record_failure("boom");
        assert_eq!(tracker.consecutive_failures(), 1);
        assert_eq!(tracker.consecutive_successes(), 0);
    }

    #[test]
    fn trips_unhealthy_after_max_consecutive_failures() {
        let mut tracker = NodeHealthTracker::new(policy());
        tracker.record_success(5.0);
        for _ in 0..3 {
            tracker.record_failure("down");
        }
        assert_eq!(tracker.status(), NodeStatus::Unhealthy);
        assert_eq!(tracker.last_error(), Some("down"));
    }

    #[test]
    fn backoff_grows_and_caps_at_max_delay() {
        let mut p = policy();
        p.max_delay = Duration::from_secs(8);
        let mut tracker = NodeHealthTracker::new(p);
        for _ in 0..10 {
            tracker.record_failure("down");
        }
        assert_eq!(tracker.current_backoff(), Duration::from_secs(8));
    }

    #[test]
    fn recovery_requires_backoff_elapsed() {
        let mut tracker = NodeHealthTracker::new(policy());
        for _ in 0..3 {
            tracker.record_failure("down");
        }
        assert!(!tracker.should_attempt_recovery());
    }

    #[test]
    fn unhealthy_recovers_to_healthy_on_success() {
        let mut tracker = NodeHealthTracker::new(policy());
        for _ in 0..3 {
            tracker.record_failure("down");
        }
        assert_eq!(tracker.status(), NodeStatus::Unhealthy);
        tracker.record_success(12.0);
        assert_eq!(tracker.status(), NodeStatus::Healthy);
    }

    #[test]
    fn mark_offline_is_terminal_for_failures() {
        let mut tracker = NodeHealthTracker::new(policy());
        tracker.mark_offline();
        tracker.record_failure("still down");
        assert_eq!(tracker.status(), NodeStatus::Offline);
    }

    #[test]
    fn zero_samples_not_demoted_by_threshold_checks() {
        let tracker = NodeHealthTracker::new(policy());
        assert_eq!(tracker.status(), NodeStatus::Initializing);
    }

    #[test]
    fn circuit_breaker_trip_and_recovery_scenario() {
        let mut p = policy();
        p.initial_delay = Duration::from_secs(1);
        p.multiplier = 2.0;
        p.max_consecutive_failures = 3;
        p.min_samples_for_demotion = 1;
        let mut tracker = NodeHealthTracker::new(p);
        tracker.record_success(1.0);
        for _ in 0..4 {
            tracker.record_failure("down");
        }
        assert_eq!(tracker.status(), NodeStatus::Unhealthy);
        assert_eq!(tracker.current_backoff(), Duration::from_secs(8));
    }
}
