//! Process-wide grading counters.
//!
//! Incremented at the pipeline boundaries; [`Metrics::flush`] logs all of
//! them in one `info!` line.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by every evaluator in the process.
pub static METRICS: Metrics = Metrics::new();

/// Monotonic counters; read them with [`Metrics::snapshot`].
pub struct Metrics {
    evaluations: AtomicU64,
    sandbox_violations: AtomicU64,
    timeouts: AtomicU64,
    judge_fallbacks: AtomicU64,
    hallucination_flags: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub evaluations: u64,
    pub sandbox_violations: u64,
    pub timeouts: u64,
    pub judge_fallbacks: u64,
    pub hallucination_flags: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            evaluations: AtomicU64::new(0),
            sandbox_violations: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            judge_fallbacks: AtomicU64::new(0),
            hallucination_flags: AtomicU64::new(0),
        }
    }

    pub fn inc_evaluations(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sandbox_violations(&self) {
        self.sandbox_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_judge_fallbacks(&self, n: u64) {
        self.judge_fallbacks.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_hallucination_flags(&self, n: u64) {
        self.hallucination_flags.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            evaluations: self.evaluations.load(Ordering::Relaxed),
            sandbox_violations: self.sandbox_violations.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            judge_fallbacks: self.judge_fallbacks.load(Ordering::Relaxed),
            hallucination_flags: self.hallucination_flags.load(Ordering::Relaxed),
        }
    }

    /// Log current values. Call at the end of a run, not per increment.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            evaluations = s.evaluations,
            sandbox_violations = s.sandbox_violations,
            timeouts = s.timeouts,
            judge_fallbacks = s.judge_fallbacks,
            hallucination_flags = s.hallucination_flags,
        );
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.evaluations.store(0, Ordering::Relaxed);
        self.sandbox_violations.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
        self.judge_fallbacks.store(0, Ordering::Relaxed);
        self.hallucination_flags.store(0, Ordering::Relaxed);
    }
}
