//! Snapshot Orchestrator: one complete snapshot set per capture target.
//!
//! Regions of a target are captured sequentially in catalog order so that
//! interaction state (an opened dropdown, a hovered menu) never races with
//! another region. Every suspension point is bounded by a timeout from
//! [`Timeouts`]; nothing is retried.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::catalog::RegionCatalog;
use crate::domain::config::Timeouts;
use crate::domain::error::VizdiffError;
use crate::domain::region::{InteractionStep, RegionSpec};
use crate::domain::snapshot::{CaptureFailure, Snapshot};
use crate::domain::style::StyleRecord;
use crate::domain::target::{CaptureTarget, Side, ViewportProfile};
use crate::metrics::METRICS;
use crate::normalizer::StyleNormalizer;
use crate::obs;
use crate::renderer::{PageRenderer, RenderError, RendererFactory};
use crate::store::{key_segment, ImageStore};

/// Everything captured for one target.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub side: Side,
    pub target: String,
    pub snapshots: BTreeMap<String, Snapshot>,
    pub styles: BTreeMap<String, Vec<StyleRecord>>,
    /// Regions whose style extraction failed; their records are unknown, not empty.
    pub style_failures: BTreeSet<String>,
    /// Set when the whole target failed (navigation, run deadline, abort).
    pub target_error: Option<CaptureFailure>,
}

impl CaptureOutcome {
    pub fn new(side: Side, target: impl Into<String>) -> Self {
        Self {
            side,
            target: target.into(),
            snapshots: BTreeMap::new(),
            styles: BTreeMap::new(),
            style_failures: BTreeSet::new(),
            target_error: None,
        }
    }

    pub fn record(&mut self, snapshot: Snapshot, styles: Vec<StyleRecord>) {
        self.style_failures.remove(&snapshot.region);
        if !styles.is_empty() {
            self.styles.insert(snapshot.region.clone(), styles);
        }
        self.snapshots.insert(snapshot.region.clone(), snapshot);
    }

    /// Record a snapshot whose style records could not be extracted.
    pub fn record_without_styles(&mut self, snapshot: Snapshot) {
        self.styles.remove(&snapshot.region);
        self.style_failures.insert(snapshot.region.clone());
        self.snapshots.insert(snapshot.region.clone(), snapshot);
    }

    /// `false` when extraction failed for `region`, so [`styles`](Self::styles)
    /// cannot be read as "no elements".
    pub fn styles_extracted(&self, region: &str) -> bool {
        !self.style_failures.contains(region)
    }

    pub fn snapshot(&self, region: &str) -> Option<&Snapshot> {
        self.snapshots.get(region)
    }

    pub fn styles(&self, region: &str) -> &[StyleRecord] {
        self.styles.get(region).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Mark every catalog region without a snapshot as unavailable.
    ///
    /// Returns how many regions were filled in.
    pub fn fill_missing(&mut self, catalog: &RegionCatalog, failure: CaptureFailure) -> usize {
        let mut filled = 0;
        for region in catalog.names() {
            if !self.snapshots.contains_key(region) {
                let snap = Snapshot::unavailable(&self.target, self.side, region, failure.clone());
                self.snapshots.insert(region.to_string(), snap);
                METRICS.inc_regions_unavailable();
                filled += 1;
            }
        }
        if filled > 0 && self.target_error.is_none() {
            self.target_error = Some(failure);
        }
        filled
    }

    pub fn captured_count(&self) -> usize {
        self.snapshots.values().filter(|s| s.is_available()).count()
    }

    pub fn unavailable_count(&self) -> usize {
        self.snapshots.values().filter(|s| !s.is_available()).count()
    }
}

/// Drives a [`PageRenderer`] through the region catalog for one target.
#[derive(Clone)]
pub struct SnapshotOrchestrator {
    factory: Arc<dyn RendererFactory>,
    store: Arc<dyn ImageStore>,
    normalizer: StyleNormalizer,
    timeouts: Timeouts,
}

impl SnapshotOrchestrator {
    pub fn new(
        factory: Arc<dyn RendererFactory>,
        store: Arc<dyn ImageStore>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            factory,
            store,
            normalizer: StyleNormalizer::default(),
            timeouts,
        }
    }

    pub fn with_normalizer(mut self, normalizer: StyleNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn store(&self) -> &Arc<dyn ImageStore> {
        &self.store
    }

    /// Capture every catalog region of `target`.
    ///
    /// Never fails: target- and region-level failures are recorded on the
    /// returned snapshots.
    pub async fn capture(
        &self,
        side: Side,
        target: &CaptureTarget,
        viewport: &ViewportProfile,
        catalog: &RegionCatalog,
    ) -> CaptureOutcome {
        let progress = Arc::new(Mutex::new(CaptureOutcome::new(side, target.id.clone())));
        self.capture_into(side, target, viewport, catalog, Arc::clone(&progress))
            .await;
        let outcome = progress.lock().await.clone();
        outcome
    }

    /// Like [`capture`](Self::capture), but publishes each region into
    /// `progress` as soon as it finishes, so a caller that cancels this future
    /// still sees the regions completed so far.
    #[instrument(skip_all, fields(side = %side, target = %target.id))]
    pub async fn capture_into(
        &self,
        side: Side,
        target: &CaptureTarget,
        viewport: &ViewportProfile,
        catalog: &RegionCatalog,
        progress: Arc<Mutex<CaptureOutcome>>,
    ) {
        let started = Instant::now();

        let renderer = match bounded(
            self.timeouts.navigation(),
            "open renderer",
            self.factory.open(target, viewport),
        )
        .await
        {
            Ok(renderer) => renderer,
            Err(e) => {
                let failure = navigation_failure(e);
                self.fail_target(target, catalog, &progress, failure, started)
                    .await;
                return;
            }
        };

        if let Err(failure) = self.load(renderer.as_ref(), target).await {
            self.fail_target(target, catalog, &progress, failure, started)
                .await;
            close(renderer.as_ref(), self.timeouts.capture()).await;
            return;
        }

        for region in catalog.list_regions() {
            let (snapshot, styles) = self
                .capture_region(renderer.as_ref(), side, target, viewport, catalog, region)
                .await;
            let mut guard = progress.lock().await;
            match styles {
                Some(styles) => guard.record(snapshot, styles),
                None => guard.record_without_styles(snapshot),
            }
        }

        close(renderer.as_ref(), self.timeouts.capture()).await;

        let guard = progress.lock().await;
        obs::emit_target_finished(
            &target.id,
            guard.captured_count(),
            guard.unavailable_count(),
            elapsed_ms(started),
        );
    }

    async fn load(
        &self,
        renderer: &dyn PageRenderer,
        target: &CaptureTarget,
    ) -> Result<(), CaptureFailure> {
        let nav = self.timeouts.navigation();
        bounded(nav, "navigate", renderer.navigate(&target.base_url, nav))
            .await
            .map_err(navigation_failure)?;

        let idle = self.timeouts.network_idle();
        bounded(idle, "network idle", renderer.wait_network_idle(idle))
            .await
            .map_err(navigation_failure)?;

        debug!(url = %target.base_url, "page loaded");
        Ok(())
    }

    async fn fail_target(
        &self,
        target: &CaptureTarget,
        catalog: &RegionCatalog,
        progress: &Mutex<CaptureOutcome>,
        failure: CaptureFailure,
        started: Instant,
    ) {
        obs::emit_region_unavailable(&target.id, "*", &failure);
        let mut guard = progress.lock().await;
        guard.fill_missing(catalog, failure);
        obs::emit_target_finished(
            &target.id,
            guard.captured_count(),
            guard.unavailable_count(),
            elapsed_ms(started),
        );
    }

    async fn capture_region(
        &self,
        renderer: &dyn PageRenderer,
        side: Side,
        target: &CaptureTarget,
        viewport: &ViewportProfile,
        catalog: &RegionCatalog,
        region: &RegionSpec,
    ) -> (Snapshot, Option<Vec<StyleRecord>>) {
        let mut warnings = Vec::new();

        for step in &region.interaction {
            if let Err(e) = run_step(renderer, step, self.timeouts.step()).await {
                let reason = format!("{}: {e}", step.describe());
                obs::emit_region_degraded(&target.id, &region.name, &reason);
                warnings.push(reason);
            }
        }

        let unavailable = |failure: CaptureFailure| {
            obs::emit_region_unavailable(&target.id, &region.name, &failure);
            METRICS.inc_regions_unavailable();
            (
                Snapshot::unavailable(&target.id, side, &region.name, failure)
                    .with_warnings(warnings.clone()),
                Some(Vec::<StyleRecord>::new()),
            )
        };

        let area = match catalog
            .resolve(region, renderer, self.timeouts.capture())
            .await
        {
            Ok(area) => area,
            Err(VizdiffError::RegionNotFound { selector, .. }) => {
                return unavailable(CaptureFailure::RegionNotFound { selector });
            }
            Err(e) => {
                return unavailable(CaptureFailure::RasterizeFailed {
                    reason: e.to_string(),
                });
            }
        };

        let raster = match bounded(
            self.timeouts.capture(),
            "screenshot",
            renderer.screenshot(&area.rect()),
        )
        .await
        {
            Ok(raster) => raster,
            Err(e) => {
                return unavailable(CaptureFailure::RasterizeFailed {
                    reason: e.to_string(),
                });
            }
        };

        let key = format!("{}/{}.png", side.as_str(), key_segment(&region.name));
        let handle = match self.store.put(&key, &raster) {
            Ok(handle) => handle,
            Err(e) => {
                return unavailable(CaptureFailure::RasterizeFailed {
                    reason: e.to_string(),
                });
            }
        };

        let styles = match self
            .normalizer
            .extract(renderer, region, viewport, self.timeouts.capture())
            .await
        {
            Ok(styles) => Some(styles),
            Err(e) => {
                let reason = format!("style extraction: {e}");
                obs::emit_region_degraded(&target.id, &region.name, &reason);
                warnings.push(reason);
                None
            }
        };

        METRICS.inc_snapshots_captured();
        if !warnings.is_empty() {
            METRICS.inc_regions_degraded();
        }
        debug!(
            region = %region.name,
            key = %handle.key,
            records = styles.as_ref().map_or(0, Vec::len),
            "region captured"
        );
        (
            Snapshot::captured(&target.id, side, &region.name, handle, warnings),
            styles,
        )
    }
}

async fn run_step(
    renderer: &dyn PageRenderer,
    step: &InteractionStep,
    default: Duration,
) -> Result<(), RenderError> {
    let limit = step.timeout(default);
    let op = step.describe();
    match step {
        InteractionStep::Click { selector, .. } => {
            bounded(limit, op, renderer.click(selector, limit)).await
        }
        InteractionStep::Hover { selector, .. } => {
            bounded(limit, op, renderer.hover(selector, limit)).await
        }
        InteractionStep::WaitForSelector { selector, .. } => {
            bounded(limit, op, renderer.wait_for_selector(selector, limit)).await
        }
        InteractionStep::WaitNetworkIdle { .. } => {
            bounded(limit, op, renderer.wait_network_idle(limit)).await
        }
    }
}

/// Await `fut` for at most `limit`, folding the elapsed deadline into a
/// [`RenderError::Timeout`].
async fn bounded<T, F>(limit: Duration, operation: impl Into<String>, fut: F) -> Result<T, RenderError>
where
    F: Future<Output = Result<T, RenderError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(RenderError::timeout(operation, limit)),
    }
}

fn navigation_failure(err: RenderError) -> CaptureFailure {
    match err {
        RenderError::Timeout { after_ms, .. } => CaptureFailure::NavigationTimeout { after_ms },
        other => CaptureFailure::NavigationFailed {
            reason: other.to_string(),
        },
    }
}

async fn close(renderer: &dyn PageRenderer, limit: Duration) {
    if let Err(e) = bounded(limit, "close", renderer.close()).await {
        debug!(error = %e, "renderer close failed");
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
