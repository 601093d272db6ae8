//! Structured lifecycle events for comparison runs.
//!
//! Events are emitted at `info!` level (warnings for degraded captures) and
//! carry an `event` field so they can be filtered in JSON log pipelines.

use tracing::{info, warn};

/// RAII guard entering a run-scoped span.
///
/// ```ignore
/// let _span = RunSpan::enter("3f1c...");
/// // every event below carries run_id = "3f1c..."
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("vizdiff.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_run_started(run_id: &str, baseline: &str, candidate: &str, regions: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        baseline = %baseline,
        candidate = %candidate,
        regions = regions,
    );
}

/// One target finished capturing, successfully or not.
pub fn emit_target_finished(target: &str, captured: usize, unavailable: usize, duration_ms: u64) {
    info!(
        event = "capture.target_finished",
        target = %target,
        captured = captured,
        unavailable = unavailable,
        duration_ms = duration_ms,
    );
}

/// A region was captured, but an interaction step or style query failed.
pub fn emit_region_degraded(target: &str, region: &str, reason: &dyn std::fmt::Display) {
    warn!(
        event = "capture.region_degraded",
        target = %target,
        region = %region,
        reason = %reason,
    );
}

pub fn emit_region_unavailable(target: &str, region: &str, reason: &dyn std::fmt::Display) {
    warn!(
        event = "capture.region_unavailable",
        target = %target,
        region = %region,
        reason = %reason,
    );
}

pub fn emit_diff_aggregated(compared: usize, issues: usize, faults: usize) {
    info!(
        event = "diff.aggregated",
        compared = compared,
        issues = issues,
        faults = faults,
    );
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, total_issues: usize, critical: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        total_issues = total_issues,
        critical = critical,
    );
}
