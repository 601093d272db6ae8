//! Domain models for vizdiff.
//!
//! Canonical definitions for the core entities:
//! - `CaptureTarget` / `ViewportProfile`: what is captured and under which conditions
//! - `RegionSpec`: a named region of interest with optional interaction steps
//! - `Snapshot`: one capture per (target, region)
//! - `StyleRecord`: markup-independent style description keyed by identity
//! - `DiffIssue`: a classified difference
//! - `RunConfig`: thresholds, timeouts and the two targets

pub mod config;
pub mod error;
pub mod issue;
pub mod region;
pub mod snapshot;
pub mod style;
pub mod target;

pub use config::{RunConfig, Thresholds, Timeouts};
pub use error::{ConfigError, Result, VizdiffError};
pub use issue::{DiffIssue, IssueDetail, IssueKind, Severity, StyleProperty};
pub use region::{Clip, InteractionStep, RegionArea, RegionSpec, StyleProbes};
pub use snapshot::{CaptureFailure, Snapshot};
pub use style::{
    AttributeCategory, Geometry, GeometryMetric, StructuralRole, StyleAttribute, StyleRecord,
    ATTRIBUTE_SET_VERSION,
};
pub use target::{CaptureTarget, Side, ViewportProfile};
