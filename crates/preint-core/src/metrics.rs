//! Global atomic counters for integration runs.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    runs_integrated: AtomicU64,
    runs_skipped: AtomicU64,
    runs_failed: AtomicU64,
    rollbacks_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_integrated: AtomicU64::new(0),
            runs_skipped: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            rollbacks_failed: AtomicU64::new(0),
        }
    }

    pub fn inc_integrated(&self) {
        self.runs_integrated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_integrated", "counter incremented");
    }

    /// A run that ended with nothing to do.
    pub fn inc_skipped(&self) {
        self.runs_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_skipped", "counter incremented");
    }

    pub fn inc_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_failed", "counter incremented");
    }

    pub fn inc_rollbacks_failed(&self) {
        self.rollbacks_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rollbacks_failed", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_integrated = self.runs_integrated(),
            runs_skipped = self.runs_skipped(),
            runs_failed = self.runs_failed(),
            rollbacks_failed = self.rollbacks_failed(),
        );
    }

    pub fn runs_integrated(&self) -> u64 {
        self.runs_integrated.load(Ordering::Relaxed)
    }

    pub fn runs_skipped(&self) -> u64 {
        self.runs_skipped.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> u64 {
        self.runs_failed.load(Ordering::Relaxed)
    }

    pub fn rollbacks_failed(&self) -> u64 {
        self.rollbacks_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.runs_integrated.store(0, Ordering::Relaxed);
        self.runs_skipped.store(0, Ordering::Relaxed);
        self.runs_failed.store(0, Ordering::Relaxed);
        self.rollbacks_failed.store(0, Ordering::Relaxed);
    }
}
