//! A complete comparison run: concurrent capture of both targets, then diff,
//! prioritization and report rendering.
//!
//! Diffing never starts before both capture tasks have finished or been cut
//! off by the run deadline. Regions a task did not reach are marked
//! unavailable, never dropped.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tracing::{instrument, warn, Instrument};

use crate::aggregator::{Aggregation, DiffAggregator};
use crate::catalog::RegionCatalog;
use crate::comparator::PixelComparator;
use crate::domain::config::RunConfig;
use crate::domain::error::Result;
use crate::domain::snapshot::CaptureFailure;
use crate::domain::target::Side;
use crate::metrics::RunMetrics;
use crate::obs::{self, RunSpan};
use crate::orchestrator::{CaptureOutcome, SnapshotOrchestrator};
use crate::prioritizer::{prioritize, Inventory};
use crate::renderer::RendererFactory;
use crate::report::{render, Report};
use crate::store::ImageStore;

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub run_id: String,
    pub baseline: CaptureOutcome,
    pub candidate: CaptureOutcome,
    pub aggregation: Aggregation,
    pub report: Report,
    /// Counters of this run only.
    pub metrics: RunMetrics,
    pub duration_ms: u64,
}

pub struct ComparisonRun {
    config: RunConfig,
    catalog: Arc<RegionCatalog>,
    orchestrator: SnapshotOrchestrator,
    aggregator: DiffAggregator,
    inventory: Option<Arc<dyn Inventory>>,
}

impl ComparisonRun {
    /// Validate `config` and wire the ports. Fails before any capture starts.
    pub fn new(
        config: RunConfig,
        factory: Arc<dyn RendererFactory>,
        store: Arc<dyn ImageStore>,
        comparator: Arc<dyn PixelComparator>,
    ) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(config.catalog()?);
        let orchestrator = SnapshotOrchestrator::new(factory, store, config.timeouts.clone());
        let aggregator = DiffAggregator::new(comparator, config.thresholds.clone());
        Ok(Self {
            config,
            catalog,
            orchestrator,
            aggregator,
            inventory: None,
        })
    }

    pub fn with_inventory(mut self, inventory: Arc<dyn Inventory>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Capture, diff and report. Always produces a report.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn execute(&self, run_id: &str) -> RunOutput {
        let started = Instant::now();
        obs::emit_run_started(
            run_id,
            &self.config.baseline.base_url,
            &self.config.candidate.base_url,
            self.catalog.len(),
        );

        let deadline = tokio::time::Instant::now() + self.config.timeouts.run();
        let (baseline_progress, baseline_task) = self.spawn_capture(Side::Baseline);
        let (candidate_progress, candidate_task) = self.spawn_capture(Side::Candidate);

        let (baseline_end, candidate_end) = futures::future::join(
            join_before(baseline_task, deadline, Side::Baseline),
            join_before(candidate_task, deadline, Side::Candidate),
        )
        .await;

        let baseline = settle(&baseline_progress, baseline_end, &self.catalog).await;
        let candidate = settle(&candidate_progress, candidate_end, &self.catalog).await;

        let (aggregation, report) = {
            let _span = RunSpan::enter(run_id);
            let aggregation = self.aggregator.aggregate(&self.catalog, &baseline, &candidate);
            let priorities = prioritize(&aggregation.issues, self.inventory.as_deref());
            let report = render(&self.catalog, &aggregation, priorities);
            (aggregation, report)
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let metrics = RunMetrics::collect(&baseline, &candidate, &aggregation);
        metrics.flush(run_id);
        obs::emit_run_finished(
            run_id,
            duration_ms,
            report.summary.total,
            report.summary.critical,
        );

        RunOutput {
            run_id: run_id.to_string(),
            baseline,
            candidate,
            aggregation,
            report,
            metrics,
            duration_ms,
        }
    }

    fn spawn_capture(&self, side: Side) -> (Arc<Mutex<CaptureOutcome>>, JoinHandle<()>) {
        let target = match side {
            Side::Baseline => self.config.baseline.clone(),
            Side::Candidate => self.config.candidate.clone(),
        };
        let progress = Arc::new(Mutex::new(CaptureOutcome::new(side, target.id.clone())));
        let orchestrator = self.orchestrator.clone();
        let catalog = Arc::clone(&self.catalog);
        let viewport = self.config.viewport.clone();
        let task_progress = Arc::clone(&progress);

        let handle = tokio::spawn(
            async move {
                orchestrator
                    .capture_into(side, &target, &viewport, &catalog, task_progress)
                    .await;
            }
            .in_current_span(),
        );
        (progress, handle)
    }
}

/// Wait for a capture task until `deadline`, aborting it past that point.
///
/// Returns the failure to record for regions the task did not reach.
async fn join_before(
    mut task: JoinHandle<()>,
    deadline: tokio::time::Instant,
    side: Side,
) -> Option<CaptureFailure> {
    match tokio::time::timeout_at(deadline, &mut task).await {
        Ok(result) => result.err().map(join_failure),
        Err(_) => {
            warn!(side = %side, "run deadline exceeded, aborting capture");
            task.abort();
            match task.await {
                Ok(()) => None,
                Err(e) => Some(join_failure(e)),
            }
        }
    }
}

fn join_failure(err: JoinError) -> CaptureFailure {
    if err.is_cancelled() {
        CaptureFailure::RunTimeout
    } else {
        CaptureFailure::Aborted {
            reason: err.to_string(),
        }
    }
}

async fn settle(
    progress: &Mutex<CaptureOutcome>,
    failure: Option<CaptureFailure>,
    catalog: &RegionCatalog,
) -> CaptureOutcome {
    let mut outcome = progress.lock().await.clone();
    if let Some(failure) = failure {
        outcome.fill_missing(catalog, failure);
    }
    outcome
}
