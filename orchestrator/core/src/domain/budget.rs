// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Resource budget enforcement for a single investigation.
//!
//! Prevents infinite loops (round cap), graph explosions (node ceiling),
//! lookup cost explosions (call ceiling) and hung investigations (wall-clock
//! ceiling). Counters only ever increase and are charged *after* the
//! expensive operation succeeds, so a failed lookup never consumes budget it
//! did not use. One lock serializes check and record so concurrent workers
//! observe consistent counts.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Configured ceilings. `max_iterations` bounds investigation rounds and is
/// enforced by the lead reviewer rather than `can_continue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLimits {
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u32,
    #[serde(default = "default_max_wall_time", with = "humantime_serde")]
    pub max_wall_time: Duration,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_calls() -> u32 {
    200
}
fn default_max_nodes() -> u32 {
    50
}
fn default_max_wall_time() -> Duration {
    Duration::from_secs(600)
}
fn default_max_iterations() -> u32 {
    3
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            max_nodes: default_max_nodes(),
            max_wall_time: default_max_wall_time(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// Why an investigation must stop. A ceiling hit is a controlled stop
/// condition, not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StopReason {
    #[error("call limit reached ({made}/{max})")]
    CallLimit { made: u32, max: u32 },

    #[error("graph node limit reached ({created}/{max})")]
    NodeLimit { created: u32, max: u32 },

    #[error("investigation timeout ({elapsed_secs}s/{max_secs}s)")]
    WallClock { elapsed_secs: u64, max_secs: u64 },
}

#[derive(Debug, Default)]
struct Counters {
    calls_made: u32,
    nodes_created: u32,
}

/// Shared, thread-safe budget tracker. Cloned handles go to every worker
/// via `Arc`; the wall clock is monotonic, sampled once at construction.
#[derive(Debug)]
pub struct BudgetTracker {
    limits: BudgetLimits,
    counters: Mutex<Counters>,
    started: Instant,
}

impl BudgetTracker {
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            counters: Mutex::new(Counters::default()),
            started: Instant::now(),
        }
    }

    /// Pure read: the first violated ceiling, checked in fixed order
    /// (calls, nodes, wall clock), or `Ok` if work may proceed.
    pub fn can_continue(&self) -> Result<(), StopReason> {
        let counters = self.counters.lock();
        if counters.calls_made >= self.limits.max_calls {
            return Err(StopReason::CallLimit {
                made: counters.calls_made,
                max: self.limits.max_calls,
            });
        }
        if counters.nodes_created >= self.limits.max_nodes {
            return Err(StopReason::NodeLimit {
                created: counters.nodes_created,
                max: self.limits.max_nodes,
            });
        }
        drop(counters);

        let elapsed = self.started.elapsed();
        if elapsed >= self.limits.max_wall_time {
            return Err(StopReason::WallClock {
                elapsed_secs: elapsed.as_secs(),
                max_secs: self.limits.max_wall_time.as_secs(),
            });
        }
        Ok(())
    }

    /// Charge one worker/lookup call. Call after the operation succeeded.
    pub fn record_call(&self) {
        self.counters.lock().calls_made += 1;
    }

    /// Charge one created graph node. Call exactly when an upsert created.
    pub fn record_node(&self) {
        self.counters.lock().nodes_created += 1;
    }

    pub fn calls_made(&self) -> u32 {
        self.counters.lock().calls_made
    }

    pub fn nodes_created(&self) -> u32 {
        self.counters.lock().nodes_created
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn limits(&self) -> &BudgetLimits {
        &self.limits
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        let counters = self.counters.lock();
        BudgetSnapshot {
            calls_made: counters.calls_made,
            max_calls: self.limits.max_calls,
            nodes_created: counters.nodes_created,
            max_nodes: self.limits.max_nodes,
            elapsed_secs: self.started.elapsed().as_secs(),
            max_wall_secs: self.limits.max_wall_time.as_secs(),
        }
    }
}

/// Serializable view of consumption, for logs and the state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub calls_made: u32,
    pub max_calls: u32,
    pub nodes_created: u32,
    pub max_nodes: u32,
    pub elapsed_secs: u64,
    pub max_wall_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_calls: u32, max_nodes: u32, wall: Duration) -> BudgetLimits {
        BudgetLimits {
            max_calls,
            max_nodes,
            max_wall_time: wall,
            max_iterations: 3,
        }
    }

    #[test]
    fn test_fresh_budget_can_continue() {
        let tracker = BudgetTracker::new(BudgetLimits::default());
        assert!(tracker.can_continue().is_ok());
    }

    #[test]
    fn test_call_ceiling_checked_first() {
        let tracker = BudgetTracker::new(limits(2, 0, Duration::ZERO));
        tracker.record_call();
        tracker.record_call();
        // All three ceilings are violated; the call ceiling reports first.
        assert!(matches!(
            tracker.can_continue(),
            Err(StopReason::CallLimit { made: 2, max: 2 })
        ));
    }

    #[test]
    fn test_node_ceiling() {
        let tracker = BudgetTracker::new(limits(10, 1, Duration::from_secs(600)));
        tracker.record_node();
        assert!(matches!(
            tracker.can_continue(),
            Err(StopReason::NodeLimit { created: 1, max: 1 })
        ));
    }

    #[test]
    fn test_wall_clock_ceiling() {
        let tracker = BudgetTracker::new(limits(10, 10, Duration::ZERO));
        assert!(matches!(tracker.can_continue(), Err(StopReason::WallClock { .. })));
    }

    #[test]
    fn test_counters_are_monotonic_and_exhaustion_is_permanent() {
        let tracker = BudgetTracker::new(limits(1, 10, Duration::from_secs(600)));
        tracker.record_call();
        assert!(tracker.can_continue().is_err());
        // Nothing resets counters; the budget stays exhausted.
        assert!(tracker.can_continue().is_err());
        assert_eq!(tracker.calls_made(), 1);
    }

    #[test]
    fn test_snapshot_reflects_consumption() {
        let tracker = BudgetTracker::new(limits(5, 5, Duration::from_secs(600)));
        tracker.record_call();
        tracker.record_node();
        tracker.record_node();
        let snap = tracker.snapshot();
        assert_eq!(snap.calls_made, 1);
        assert_eq!(snap.nodes_created, 2);
        assert_eq!(snap.max_calls, 5);
    }
}
