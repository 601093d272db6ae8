//! Snapshots: one per (target, region) pair per run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::target::Side;
use crate::store::ImageHandle;

/// Why a snapshot has no image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum CaptureFailure {
    /// Target-level: navigation or network quiescence exceeded its timeout.
    NavigationTimeout { after_ms: u64 },
    /// Target-level: the page or rendering session could not be opened.
    NavigationFailed { reason: String },
    /// Region-level: the region selector matched nothing.
    RegionNotFound { selector: String },
    /// Region-level: the renderer or the image store could not produce an image.
    RasterizeFailed { reason: String },
    /// The run-level deadline expired before this region was captured.
    RunTimeout,
    /// The capture task ended abnormally.
    Aborted { reason: String },
}

impl CaptureFailure {
    /// Whether this failure applies to every region of the target.
    pub fn is_target_level(&self) -> bool {
        matches!(
            self,
            CaptureFailure::NavigationTimeout { .. }
                | CaptureFailure::NavigationFailed { .. }
                | CaptureFailure::RunTimeout
                | CaptureFailure::Aborted { .. }
        )
    }
}

impl fmt::Display for CaptureFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureFailure::NavigationTimeout { after_ms } => {
                write!(f, "navigation timed out after {after_ms}ms")
            }
            CaptureFailure::NavigationFailed { reason } => write!(f, "navigation failed: {reason}"),
            CaptureFailure::RegionNotFound { selector } => {
                write!(f, "region not found: {selector}")
            }
            CaptureFailure::RasterizeFailed { reason } => write!(f, "rasterize failed: {reason}"),
            CaptureFailure::RunTimeout => f.write_str("run deadline exceeded"),
            CaptureFailure::Aborted { reason } => write!(f, "capture aborted: {reason}"),
        }
    }
}

/// The capture result for one region of one target.
///
/// A snapshot always exists for every catalog region once a run finishes:
/// failures are recorded in `error` rather than by omitting the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub target: String,
    pub side: Side,
    pub region: String,
    pub image: Option<ImageHandle>,
    pub captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CaptureFailure>,
    /// Non-fatal problems (failed interaction steps, style extraction errors).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Snapshot {
    pub fn captured(
        target: &str,
        side: Side,
        region: &str,
        image: ImageHandle,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            target: target.to_string(),
            side,
            region: region.to_string(),
            image: Some(image),
            captured_at: Utc::now(),
            error: None,
            warnings,
        }
    }

    pub fn unavailable(target: &str, side: Side, region: &str, error: CaptureFailure) -> Self {
        Self {
            target: target.to_string(),
            side,
            region: region.to_string(),
            image: None,
            captured_at: Utc::now(),
            error: Some(error),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// An image exists and can be diffed.
    pub fn is_available(&self) -> bool {
        self.image.is_some() && self.error.is_none()
    }

    /// Captured, but only best-effort.
    pub fn is_degraded(&self) -> bool {
        self.is_available() && !self.warnings.is_empty()
    }
}
