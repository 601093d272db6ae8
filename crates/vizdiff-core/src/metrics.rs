//! Capture and diff counters.
//!
//! [`METRICS`] accumulates for the life of the process and is bumped at the
//! call site. [`RunMetrics`] holds the counts of a single run and is what a
//! run flushes, so repeated runs in one process (watch mode) never report
//! each other's totals.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::aggregator::Aggregation;
use crate::orchestrator::CaptureOutcome;

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    snapshots_captured: AtomicU64,
    regions_unavailable: AtomicU64,
    regions_degraded: AtomicU64,
    issues_emitted: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            snapshots_captured: AtomicU64::new(0),
            regions_unavailable: AtomicU64::new(0),
            regions_degraded: AtomicU64::new(0),
            issues_emitted: AtomicU64::new(0),
        }
    }

    pub fn inc_snapshots_captured(&self) {
        self.snapshots_captured.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "snapshots_captured", "counter incremented");
    }

    pub fn inc_regions_unavailable(&self) {
        self.regions_unavailable.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "regions_unavailable", "counter incremented");
    }

    pub fn inc_regions_degraded(&self) {
        self.regions_degraded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "regions_degraded", "counter incremented");
    }

    pub fn add_issues_emitted(&self, count: u64) {
        self.issues_emitted.fetch_add(count, Ordering::Relaxed);
        tracing::trace!(metric = "issues_emitted", count, "counter incremented");
    }

    /// Emit the process totals as one `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            snapshots_captured = self.snapshots_captured(),
            regions_unavailable = self.regions_unavailable(),
            regions_degraded = self.regions_degraded(),
            issues_emitted = self.issues_emitted(),
        );
    }

    pub fn snapshots_captured(&self) -> u64 {
        self.snapshots_captured.load(Ordering::Relaxed)
    }

    pub fn regions_unavailable(&self) -> u64 {
        self.regions_unavailable.load(Ordering::Relaxed)
    }

    pub fn regions_degraded(&self) -> u64 {
        self.regions_degraded.load(Ordering::Relaxed)
    }

    pub fn issues_emitted(&self) -> u64 {
        self.issues_emitted.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.snapshots_captured.store(0, Ordering::Relaxed);
        self.regions_unavailable.store(0, Ordering::Relaxed);
        self.regions_degraded.store(0, Ordering::Relaxed);
        self.issues_emitted.store(0, Ordering::Relaxed);
    }
}

/// Counters of one run, derived from its outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub snapshots_captured: u64,
    pub regions_unavailable: u64,
    pub regions_degraded: u64,
    pub issues_emitted: u64,
}

impl RunMetrics {
    pub fn collect(
        baseline: &CaptureOutcome,
        candidate: &CaptureOutcome,
        aggregation: &Aggregation,
    ) -> Self {
        let sides = [baseline, candidate];
        let count = |n: usize| n as u64;
        Self {
            snapshots_captured: sides.iter().map(|o| count(o.captured_count())).sum(),
            regions_unavailable: sides.iter().map(|o| count(o.unavailable_count())).sum(),
            regions_degraded: sides
                .iter()
                .map(|o| count(o.snapshots.values().filter(|s| s.is_degraded()).count()))
                .sum(),
            issues_emitted: count(aggregation.issues.len()),
        }
    }

    /// Emit the run's counters as one `info!` event.
    pub fn flush(&self, run_id: &str) {
        tracing::info!(
            metric = "run_flush",
            run_id,
            snapshots_captured = self.snapshots_captured,
            regions_unavailable = self.regions_unavailable,
            regions_degraded = self.regions_degraded,
            issues_emitted = self.issues_emitted,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::{CaptureFailure, Snapshot};
    use crate::domain::target::Side;
    use crate::store::ImageHandle;

    fn captured(side: Side, region: &str, warnings: Vec<String>) -> Snapshot {
        let handle = ImageHandle {
            key: format!("{side}/{region}.png"),
            digest: "d".to_string(),
            width: 1,
            height: 1,
        };
        Snapshot::captured("t", side, region, handle, warnings)
    }

    #[test]
    fn run_metrics_count_one_run_only() {
        let mut baseline = CaptureOutcome::new(Side::Baseline, "b");
        baseline.record(captured(Side::Baseline, "header", Vec::new()), Vec::new());
        baseline.record(
            captured(Side::Baseline, "nav", vec!["hover nav: rejected".to_string()]),
            Vec::new(),
        );
        let mut candidate = CaptureOutcome::new(Side::Candidate, "c");
        candidate.record(captured(Side::Candidate, "header", Vec::new()), Vec::new());
        candidate.record(
            Snapshot::unavailable("c", Side::Candidate, "nav", CaptureFailure::RunTimeout),
            Vec::new(),
        );

        let metrics = RunMetrics::collect(&baseline, &candidate, &Aggregation::default());
        assert_eq!(
            metrics,
            RunMetrics {
                snapshots_captured: 3,
                regions_unavailable: 1,
                regions_degraded: 1,
                issues_emitted: 0,
            }
        );
    }

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_snapshots_captured();
        m.inc_snapshots_captured();
        m.inc_regions_unavailable();
        m.inc_regions_degraded();
        m.add_issues_emitted(4);
        assert_eq!(m.snapshots_captured(), 2);
        assert_eq!(m.regions_unavailable(), 1);
        assert_eq!(m.regions_degraded(), 1);
        assert_eq!(m.issues_emitted(), 4);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_snapshots_captured();
        m.add_issues_emitted(2);
        m.reset();
        assert_eq!(m.snapshots_captured(), 0);
        assert_eq!(m.issues_emitted(), 0);
    }
}
