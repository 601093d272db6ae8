//! Diff issues emitted by the aggregator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::style::{GeometryMetric, StyleAttribute};
use crate::domain::target::Side;
use crate::store::ImageHandle;

/// Issue severity. Ordered most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Moderate,
    Minor,
}

impl Severity {
    /// Weight used by the prioritizer.
    pub fn weight(&self) -> u32 {
        match self {
            Severity::Critical => 3,
            Severity::Moderate => 2,
            Severity::Minor => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Moderate => "moderate",
            Severity::Minor => "minor",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of [`IssueDetail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    PixelDiff,
    StyleMismatch,
    StructuralMismatch,
}

/// The property a style mismatch refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum StyleProperty {
    Attribute(StyleAttribute),
    Geometry(GeometryMetric),
}

impl fmt::Display for StyleProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleProperty::Attribute(attr) => f.write_str(attr.css_name()),
            StyleProperty::Geometry(metric) => write!(f, "geometry/{}", metric.as_str()),
        }
    }
}

/// Kind-specific payload of an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueDetail {
    PixelDiff {
        differing_pixels: u64,
        region_area: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mask: Option<ImageHandle>,
    },
    StyleMismatch {
        identity: String,
        property: StyleProperty,
        baseline: String,
        candidate: String,
    },
    StructuralMismatch {
        /// `None` when the whole region is missing.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identity: Option<String>,
        missing_on: Vec<Side>,
        reason: String,
    },
}

/// A single classified difference. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffIssue {
    pub region: String,
    pub severity: Severity,
    /// Pixel ratio for pixel diffs, absolute delta for numeric style/geometry
    /// mismatches, 1.0 otherwise.
    pub magnitude: f64,
    pub suggestion: String,
    #[serde(flatten)]
    pub detail: IssueDetail,
}

impl DiffIssue {
    pub fn kind(&self) -> IssueKind {
        match self.detail {
            IssueDetail::PixelDiff { .. } => IssueKind::PixelDiff,
            IssueDetail::StyleMismatch { .. } => IssueKind::StyleMismatch,
            IssueDetail::StructuralMismatch { .. } => IssueKind::StructuralMismatch,
        }
    }

    pub fn identity(&self) -> Option<&str> {
        match &self.detail {
            IssueDetail::StyleMismatch { identity, .. } => Some(identity),
            IssueDetail::StructuralMismatch { identity, .. } => identity.as_deref(),
            IssueDetail::PixelDiff { .. } => None,
        }
    }

    /// Region-level structural mismatch (the region itself is unavailable).
    pub fn is_region_missing(&self) -> bool {
        matches!(
            self.detail,
            IssueDetail::StructuralMismatch { identity: None, .. }
        )
    }

    /// Short human label: what differs.
    pub fn headline(&self) -> String {
        match &self.detail {
            IssueDetail::PixelDiff {
                differing_pixels,
                region_area,
                ..
            } => format!(
                "{differing_pixels} of {region_area} pixels differ ({:.3}%)",
                self.magnitude * 100.0
            ),
            IssueDetail::StyleMismatch {
                identity,
                property,
                baseline,
                candidate,
            } => format!("{identity}: {property} {baseline} -> {candidate}"),
            IssueDetail::StructuralMismatch {
                identity,
                missing_on,
                reason,
            } => {
                let sides: Vec<&str> = missing_on.iter().map(|s| s.as_str()).collect();
                match identity {
                    Some(id) => format!("{id} missing on {}", sides.join(", ")),
                    None => format!("region unavailable on {} ({reason})", sides.join(", ")),
                }
            }
        }
    }
}
