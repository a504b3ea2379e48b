//! # Rolling-Window Metrics
//!
//! A bounded, time-windowed counter of `(outcome, latency)` samples for
//! one subject (one node). Grounded on the stateful-struct-plus-snapshot
//! shape of `CircuitBreakerMetrics` in the teacher's
//! `circuit_breaker.rs`, generalized from lifetime counters to a ring
//! buffer that forgets samples outside a trailing time window.
//!
//! Capacity bounds memory regardless of throughput; the window is a
//! time predicate applied at read time, independent of capacity. Both
//! caps matter: capacity drops the oldest sample when full, the window
//! makes old-but-still-buffered samples invisible to readers.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Default ring buffer capacity. Chosen so that a node taking a probe or
/// request every few hundred milliseconds stays comfortably below
/// capacity for a multi-minute window.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    outcome: Outcome,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Success { latency_ms: f64 },
    Failure,
}

/// Point-in-time view over the samples currently inside the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    /// Fraction of samples in `[0, 1]` that were successes. `0` when the
    /// window has no samples.
    pub success_rate: f64,
    /// Average latency of *successful* samples only. `0` when there are
    /// no successful samples in the window (including when the window
    /// has only failures).
    pub avg_latency_ms: f64,
    pub total_samples: usize,
}

impl MetricsSnapshot {
    pub fn error_rate(&self) -> f64 {
        if self.total_samples == 0 {
            0.0
        } else {
            (1.0 - self.success_rate).clamp(0.0, 1.0)
        }
    }
}

/// Fixed-capacity circular buffer of timestamped outcomes, one per node.
#[derive(Debug)]
pub struct RollingWindowMetrics {
    capacity: usize,
    window: Duration,
    samples: VecDeque<Sample>,
}

impl RollingWindowMetrics {
    pub fn new(window: Duration) -> Self {
        Self::with_capacity(window, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(window: Duration, capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            window,
            samples: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    fn push(&mut self, outcome: Outcome) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample {
            at: Instant::now(),
            outcome,
        });
    }

    /// Record a success. `latency_ms` must be non-negative.
    pub fn record_success(&mut self, latency_ms: f64) {
        debug_assert!(latency_ms >= 0.0, "latency must be non-negative");
        let latency_ms = latency_ms.max(0.0);
        self.push(Outcome::Success { latency_ms });
    }

    pub fn record_failure(&mut self) {
        self.push(Outcome::Failure);
    }

    /// Compute a snapshot over samples whose timestamp is within
    /// `[now - window, now]`. Samples outside the window are skipped but
    /// not evicted; eviction only happens on overflow in [`Self::push`].
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = Instant::now();
        let mut successes = 0usize;
        let mut total = 0usize;
        let mut latency_sum = 0.0;
        let mut latency_count = 0usize;

        for sample in self.samples.iter().rev() {
            if now.duration_since(sample.at) > self.window {
                break;
            }
            total += 1;
            match sample.outcome {
                Outcome::Success { latency_ms } => {
                    successes += 1;
                    latency_sum += latency_ms;
                    latency_count += 1;
                }
                Outcome::Failure => {}
            }
        }

        if total == 0 {
            return MetricsSnapshot {
                success_rate: 0.0,
                avg_latency_ms: 0.0,
                total_samples: 0,
            };
        }

        MetricsSnapshot {
            success_rate: successes as f64 / total as f64,
            avg_latency_ms: if latency_count > 0 {
                latency_sum / latency_count as f64
            } else {
                0.0
            },
            total_samples: total,
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
