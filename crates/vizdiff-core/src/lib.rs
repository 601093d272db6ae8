//! vizdiff core library
//!
//! Visual regression diff engine: captures the same regions of a baseline and
//! a candidate page concurrently, normalizes their computed styles into
//! comparable records, diffs pixels and styles, and ranks the differences by
//! impact.
//!
//! The browser, the pixel comparator, image storage and the usage inventory
//! are ports ([`PageRenderer`], [`PixelComparator`], [`ImageStore`],
//! [`Inventory`]); [`fakes`] provides scripted in-memory implementations.

pub mod aggregator;
pub mod catalog;
pub mod comparator;
pub mod domain;
pub mod fakes;
pub mod metrics;
pub mod normalizer;
pub mod obs;
pub mod orchestrator;
pub mod prioritizer;
pub mod renderer;
pub mod report;
pub mod run;
pub mod store;
pub mod telemetry;

pub use aggregator::{
    Aggregation, DegradedRegion, DiffAggregator, FaultKind, RegionFault, UnavailableRegion,
};
pub use catalog::RegionCatalog;
pub use comparator::{CompareError, PixelComparator, PixelComparison, RgbaComparator};
pub use domain::{
    AttributeCategory, CaptureFailure, CaptureTarget, Clip, ConfigError, DiffIssue, Geometry,
    GeometryMetric, InteractionStep, IssueDetail, IssueKind, RegionArea, RegionSpec, Result,
    RunConfig, Severity, Side, Snapshot, StructuralRole, StyleAttribute, StyleProbes,
    StyleProperty, StyleRecord, Thresholds, Timeouts, ViewportProfile, VizdiffError,
    ATTRIBUTE_SET_VERSION,
};
pub use metrics::{RunMetrics, METRICS};
pub use normalizer::StyleNormalizer;
pub use obs::{
    emit_diff_aggregated, emit_region_degraded, emit_region_unavailable, emit_run_finished,
    emit_run_started, emit_target_finished, RunSpan,
};
pub use orchestrator::{CaptureOutcome, SnapshotOrchestrator};
pub use prioritizer::{prioritize, Inventory, PriorityEntry, StaticInventory};
pub use renderer::{
    PageRenderer, Raster, RawElement, Rect, RenderError, RendererFactory, ResolvedArea,
};
pub use report::{render, RegionIssues, Report, Summary};
pub use run::{ComparisonRun, RunOutput};
pub use store::fs::FsImageStore;
pub use store::{content_digest, ImageHandle, ImageStore, MemoryImageStore, StoreError};
pub use telemetry::init_tracing;

/// Crate version, recorded in report envelopes.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
