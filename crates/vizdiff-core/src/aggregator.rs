//! Diff Aggregator: turns two capture outcomes into classified issues.
//!
//! Output order is catalog order, then (within a region) the pixel issue,
//! then style issues in baseline record order, then candidate-only records.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::RegionCatalog;
use crate::comparator::{CompareError, PixelComparator};
use crate::domain::config::Thresholds;
use crate::domain::issue::{DiffIssue, IssueDetail, Severity, StyleProperty};
use crate::domain::snapshot::Snapshot;
use crate::domain::style::{AttributeCategory, GeometryMetric, StyleAttribute, StyleRecord};
use crate::domain::target::Side;
use crate::metrics::METRICS;
use crate::normalizer::parse_length;
use crate::obs;
use crate::orchestrator::CaptureOutcome;

/// Why part of a region's diff could not be computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum FaultKind {
    DimensionMismatch {
        baseline: (u32, u32),
        candidate: (u32, u32),
    },
    ComparatorFailed {
        reason: String,
    },
    /// Style records of `side` are unknown; identity matching was skipped.
    StylesUnavailable {
        side: Side,
    },
}

/// A region whose pixel diff or style diff could not be computed.
///
/// A pixel fault does not stop the style diff, and a style fault does not
/// stop the pixel diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionFault {
    pub region: String,
    #[serde(flatten)]
    pub kind: FaultKind,
}

/// A region that could not be compared because a side has no image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailableRegion {
    pub region: String,
    pub missing_on: Vec<Side>,
    pub reason: String,
}

/// A region captured best-effort on one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedRegion {
    pub region: String,
    pub side: Side,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub issues: Vec<DiffIssue>,
    pub faults: Vec<RegionFault>,
    pub unavailable: Vec<UnavailableRegion>,
    pub degraded: Vec<DegradedRegion>,
    /// Regions with an image on both sides.
    pub compared: usize,
}

pub struct DiffAggregator {
    comparator: Arc<dyn PixelComparator>,
    thresholds: Thresholds,
}

impl DiffAggregator {
    pub fn new(comparator: Arc<dyn PixelComparator>, thresholds: Thresholds) -> Self {
        Self {
            comparator,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Diff every catalog region. Always runs to completion.
    pub fn aggregate(
        &self,
        catalog: &RegionCatalog,
        baseline: &CaptureOutcome,
        candidate: &CaptureOutcome,
    ) -> Aggregation {
        let mut out = Aggregation::default();

        for region in catalog.names() {
            let b = baseline.snapshot(region);
            let c = candidate.snapshot(region);

            for (side, snap) in [(Side::Baseline, b), (Side::Candidate, c)] {
                if let Some(snap) = snap.filter(|s| s.is_degraded()) {
                    out.degraded.push(DegradedRegion {
                        region: region.to_string(),
                        side,
                        warnings: snap.warnings.clone(),
                    });
                }
            }

            let (b, c) = match (b.filter(|s| s.is_available()), c.filter(|s| s.is_available())) {
                (Some(b), Some(c)) => (b, c),
                _ => {
                    let missing = missing_region(region, [(Side::Baseline, b), (Side::Candidate, c)]);
                    out.issues.push(missing.0);
                    out.unavailable.push(missing.1);
                    continue;
                }
            };

            out.compared += 1;
            match self.pixel_diff(region, b, c) {
                Ok(Some(issue)) => out.issues.push(issue),
                Ok(None) => {}
                Err(fault) => {
                    warn!(region = %region, fault = ?fault, "pixel diff skipped");
                    out.faults.push(RegionFault {
                        region: region.to_string(),
                        kind: fault,
                    });
                }
            }

            let unextracted: Vec<Side> = [(Side::Baseline, baseline), (Side::Candidate, candidate)]
                .into_iter()
                .filter(|(_, outcome)| !outcome.styles_extracted(region))
                .map(|(side, _)| side)
                .collect();
            if unextracted.is_empty() {
                out.issues.extend(self.style_diff(
                    region,
                    baseline.styles(region),
                    candidate.styles(region),
                ));
            } else {
                for side in unextracted {
                    warn!(region = %region, side = %side, "style diff skipped");
                    out.faults.push(RegionFault {
                        region: region.to_string(),
                        kind: FaultKind::StylesUnavailable { side },
                    });
                }
            }
        }

        METRICS.add_issues_emitted(out.issues.len() as u64);
        obs::emit_diff_aggregated(out.compared, out.issues.len(), out.faults.len());
        out
    }

    fn pixel_diff(
        &self,
        region: &str,
        baseline: &Snapshot,
        candidate: &Snapshot,
    ) -> Result<Option<DiffIssue>, FaultKind> {
        let (Some(a), Some(b)) = (&baseline.image, &candidate.image) else {
            return Ok(None);
        };
        if a.dimensions() != b.dimensions() {
            return Err(FaultKind::DimensionMismatch {
                baseline: a.dimensions(),
                candidate: b.dimensions(),
            });
        }
        if a.same_content(b) || a.area() == 0 {
            return Ok(None);
        }

        let comparison = self
            .comparator
            .compare(region, a, b)
            .map_err(|e| match e {
                CompareError::DimensionMismatch {
                    baseline,
                    candidate,
                } => FaultKind::DimensionMismatch {
                    baseline,
                    candidate,
                },
                other => FaultKind::ComparatorFailed {
                    reason: other.to_string(),
                },
            })?;

        let area = a.area();
        let ratio = comparison.differing_pixels as f64 / area as f64;
        debug!(region = %region, differing = comparison.differing_pixels, ratio, "pixel diff");
        Ok(self
            .thresholds
            .classify_pixel_ratio(ratio)
            .map(|severity| DiffIssue {
                region: region.to_string(),
                severity,
                magnitude: ratio,
                suggestion: format!(
                    "review the highlighted pixels in {region} and reconcile the visual difference"
                ),
                detail: IssueDetail::PixelDiff {
                    differing_pixels: comparison.differing_pixels,
                    region_area: area,
                    mask: comparison.mask,
                },
            }))
    }

    /// Pair records one-to-one by identity and compare each pair.
    pub fn style_diff(
        &self,
        region: &str,
        baseline: &[StyleRecord],
        candidate: &[StyleRecord],
    ) -> Vec<DiffIssue> {
        let by_identity: HashMap<&str, &StyleRecord> = candidate
            .iter()
            .map(|r| (r.identity.as_str(), r))
            .collect();
        let baseline_ids: HashSet<&str> = baseline.iter().map(|r| r.identity.as_str()).collect();

        let mut issues = Vec::new();
        for b in baseline {
            match by_identity.get(b.identity.as_str()) {
                Some(c) => issues.extend(self.compare_records(region, b, c)),
                None => issues.push(missing_identity(region, &b.identity, Side::Candidate)),
            }
        }
        for c in candidate {
            if !baseline_ids.contains(c.identity.as_str()) {
                issues.push(missing_identity(region, &c.identity, Side::Baseline));
            }
        }
        issues
    }

    fn compare_records(
        &self,
        region: &str,
        baseline: &StyleRecord,
        candidate: &StyleRecord,
    ) -> Vec<DiffIssue> {
        let mut issues = Vec::new();

        for attr in StyleAttribute::TRACKED {
            let (b, c) = (baseline.attributes.get(&attr), candidate.attributes.get(&attr));
            if b == c {
                continue;
            }
            let b = b.map_or("unset", String::as_str);
            let c = c.map_or("unset", String::as_str);
            issues.push(DiffIssue {
                region: region.to_string(),
                severity: attribute_severity(attr),
                magnitude: value_delta(b, c).unwrap_or(1.0),
                suggestion: format!("set {} to {b} (currently {c})", attr.css_name()),
                detail: IssueDetail::StyleMismatch {
                    identity: baseline.identity.clone(),
                    property: StyleProperty::Attribute(attr),
                    baseline: b.to_string(),
                    candidate: c.to_string(),
                },
            });
        }

        for metric in GeometryMetric::ALL {
            let b = baseline.geometry.metric(metric);
            let c = candidate.geometry.metric(metric);
            let delta = c - b;
            let Some(severity) = self.thresholds.classify_offset(delta) else {
                continue;
            };
            issues.push(DiffIssue {
                region: region.to_string(),
                severity,
                magnitude: delta.abs(),
                suggestion: geometry_suggestion(metric, delta),
                detail: IssueDetail::StyleMismatch {
                    identity: baseline.identity.clone(),
                    property: StyleProperty::Geometry(metric),
                    baseline: format_px(b),
                    candidate: format_px(c),
                },
            });
        }
        issues
    }
}

/// Typography and layout drift is Moderate; decorative drift is Minor.
pub fn attribute_severity(attr: StyleAttribute) -> Severity {
    match attr.category() {
        AttributeCategory::Typography | AttributeCategory::Layout => Severity::Moderate,
        AttributeCategory::Decorative => Severity::Minor,
    }
}

/// Absolute numeric difference between two single lengths of the same unit.
fn value_delta(baseline: &str, candidate: &str) -> Option<f64> {
    let (b, bu) = parse_length(baseline)?;
    let (c, cu) = parse_length(candidate)?;
    (bu == cu).then(|| (c - b).abs())
}

fn format_px(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{}px", rounded as i64)
    } else {
        format!("{rounded}px")
    }
}

fn geometry_suggestion(metric: GeometryMetric, delta: f64) -> String {
    let amount = format_px(delta.abs());
    match metric {
        GeometryMetric::CenterOffset => format!(
            "adjust max-width or horizontal padding to re-center (off by {amount})"
        ),
        GeometryMetric::Width => {
            let verb = if delta > 0.0 { "narrow" } else { "widen" };
            format!("{verb} the element by {amount}")
        }
        GeometryMetric::Height => {
            let verb = if delta > 0.0 { "reduce" } else { "increase" };
            format!("{verb} height by {amount} (check padding and line-height)")
        }
        GeometryMetric::Top => {
            let dir = if delta > 0.0 { "up" } else { "down" };
            format!("move the element {dir} by {amount} (check margins above it)")
        }
    }
}

fn missing_identity(region: &str, identity: &str, missing_on: Side) -> DiffIssue {
    let suggestion = match missing_on {
        Side::Candidate => format!("add \"{identity}\" to the candidate markup"),
        Side::Baseline => {
            format!("\"{identity}\" has no baseline counterpart; remove it or match its text")
        }
    };
    DiffIssue {
        region: region.to_string(),
        severity: Severity::Moderate,
        magnitude: 1.0,
        suggestion,
        detail: IssueDetail::StructuralMismatch {
            identity: Some(identity.to_string()),
            missing_on: vec![missing_on],
            reason: format!("no matching element on {missing_on}"),
        },
    }
}

fn missing_region(
    region: &str,
    sides: [(Side, Option<&Snapshot>); 2],
) -> (DiffIssue, UnavailableRegion) {
    let mut missing_on = Vec::new();
    let mut reasons = Vec::new();
    for (side, snap) in sides {
        if snap.is_some_and(Snapshot::is_available) {
            continue;
        }
        missing_on.push(side);
        let why = snap
            .and_then(|s| s.error.as_ref())
            .map(ToString::to_string)
            .unwrap_or_else(|| "not captured".to_string());
        reasons.push(format!("{side}: {why}"));
    }
    let reason = reasons.join("; ");
    let sides: Vec<&str> = missing_on.iter().map(Side::as_str).collect();
    let issue = DiffIssue {
        region: region.to_string(),
        severity: Severity::Critical,
        magnitude: 1.0,
        suggestion: format!(
            "make {region} render on {} before comparing ({reason})",
            sides.join(" and ")
        ),
        detail: IssueDetail::StructuralMismatch {
            identity: None,
            missing_on: missing_on.clone(),
            reason: reason.clone(),
        },
    };
    (
        issue,
        UnavailableRegion {
            region: region.to_string(),
            missing_on,
            reason,
        },
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::comparator::PixelComparison;
    use crate::domain::region::{Clip, RegionSpec};
    use crate::domain::snapshot::CaptureFailure;
    use crate::domain::style::{Geometry, StructuralRole};
    use crate::store::ImageHandle;

    struct FixedComparator(u64);

    impl PixelComparator for FixedComparator {
        fn compare(
            &self,
            _region: &str,
            _a: &ImageHandle,
            _b: &ImageHandle,
        ) -> Result<PixelComparison, CompareError> {
            Ok(PixelComparison {
                differing_pixels: self.0,
                mask: None,
            })
        }
    }

    fn aggregator(differing: u64) -> DiffAggregator {
        DiffAggregator::new(Arc::new(FixedComparator(differing)), Thresholds::default())
    }

    fn handle(key: &str, digest: &str, w: u32, h: u32) -> ImageHandle {
        ImageHandle {
            key: key.to_string(),
            digest: digest.to_string(),
            width: w,
            height: h,
        }
    }

    fn catalog(names: &[&str]) -> RegionCatalog {
        RegionCatalog::new(
            names
                .iter()
                .map(|n| RegionSpec::clip(*n, Clip::new(0.0, 0.0, 400.0, 600.0)))
                .collect(),
        )
        .unwrap()
    }

    fn outcome(side: Side, regions: &[(&str, &str)]) -> CaptureOutcome {
        let mut out = CaptureOutcome::new(side, side.as_str());
        for (region, digest) in regions {
            let h = handle(&format!("{side}/{region}.png"), digest, 400, 600);
            out.record(
                Snapshot::captured(side.as_str(), side, region, h, Vec::new()),
                Vec::new(),
            );
        }
        out
    }

    fn record(identity: &str, left: f64, attrs: &[(StyleAttribute, &str)]) -> StyleRecord {
        StyleRecord {
            identity: identity.to_string(),
            role: StructuralRole::Container,
            attributes: attrs
                .iter()
                .map(|(a, v)| (*a, (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
            geometry: Geometry::new(left, 0.0, 1600.0, 80.0, 800.0),
        }
    }

    #[test]
    fn test_identical_images_emit_no_pixel_issue() {
        let agg = aggregator(5000);
        let result = agg.aggregate(
            &catalog(&["hero"]),
            &outcome(Side::Baseline, &[("hero", "same")]),
            &outcome(Side::Candidate, &[("hero", "same")]),
        );
        assert!(result.issues.is_empty());
        assert_eq!(result.compared, 1);
    }

    #[test]
    fn test_pixel_ratio_is_area_normalized() {
        let zero = aggregator(0).aggregate(
            &catalog(&["hero"]),
            &outcome(Side::Baseline, &[("hero", "a")]),
            &outcome(Side::Candidate, &[("hero", "b")]),
        );
        assert!(zero.issues.is_empty());

        let result = aggregator(3000).aggregate(
            &catalog(&["hero"]),
            &outcome(Side::Baseline, &[("hero", "a")]),
            &outcome(Side::Candidate, &[("hero", "b")]),
        );
        assert_eq!(result.issues.len(), 1);
        let issue = &result.issues[0];
        assert_eq!(issue.severity, Severity::Critical);
        assert!((issue.magnitude - 0.0125).abs() < 1e-12);
    }

    #[test]
    fn test_missing_region_is_one_critical_structural_issue() {
        let baseline = outcome(Side::Baseline, &[("header", "h"), ("footer", "f")]);
        let mut candidate = outcome(Side::Candidate, &[("header", "h")]);
        candidate.record(
            Snapshot::unavailable(
                "candidate",
                Side::Candidate,
                "footer",
                CaptureFailure::RegionNotFound {
                    selector: "footer".to_string(),
                },
            ),
            Vec::new(),
        );

        let result = aggregator(0).aggregate(&catalog(&["header", "footer"]), &baseline, &candidate);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].severity, Severity::Critical);
        assert!(result.issues[0].is_region_missing());
        assert_eq!(result.unavailable[0].missing_on, vec![Side::Candidate]);
        assert_eq!(result.compared, 1);
    }

    #[test]
    fn test_region_absent_from_both_sides_is_reported() {
        let result = aggregator(0).aggregate(
            &catalog(&["nav"]),
            &CaptureOutcome::new(Side::Baseline, "b"),
            &CaptureOutcome::new(Side::Candidate, "c"),
        );
        assert_eq!(result.issues.len(), 1);
        assert_eq!(
            result.unavailable[0].missing_on,
            vec![Side::Baseline, Side::Candidate]
        );
        assert!(result.unavailable[0].reason.contains("not captured"));
    }

    #[test]
    fn test_dimension_mismatch_is_fault_not_issue() {
        let baseline = outcome(Side::Baseline, &[("hero", "a")]);
        let mut candidate = CaptureOutcome::new(Side::Candidate, "c");
        candidate.record(
            Snapshot::captured(
                "c",
                Side::Candidate,
                "hero",
                handle("candidate/hero.png", "b", 400, 601),
                Vec::new(),
            ),
            vec![record("#container", 0.0, &[])],
        );
        let result = aggregator(10).aggregate(&catalog(&["hero"]), &baseline, &candidate);
        assert_eq!(result.faults.len(), 1);
        assert!(matches!(
            result.faults[0].kind,
            FaultKind::DimensionMismatch { .. }
        ));
        // style diff still ran: the candidate-only record is drift
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].severity, Severity::Moderate);
    }

    #[test]
    fn test_unextracted_styles_skip_identity_matching() {
        let mut baseline = CaptureOutcome::new(Side::Baseline, "b");
        baseline.record(
            Snapshot::captured(
                "b",
                Side::Baseline,
                "nav",
                handle("baseline/nav.png", "x", 400, 600),
                Vec::new(),
            ),
            vec![record("home#item", 0.0, &[]), record("trends#item", 0.0, &[])],
        );
        let mut candidate = CaptureOutcome::new(Side::Candidate, "c");
        candidate.record_without_styles(Snapshot::captured(
            "c",
            Side::Candidate,
            "nav",
            handle("candidate/nav.png", "x", 400, 600),
            vec!["style extraction: rejected".to_string()],
        ));

        let result = aggregator(0).aggregate(&catalog(&["nav"]), &baseline, &candidate);
        assert!(result.issues.is_empty(), "{:?}", result.issues);
        assert_eq!(result.compared, 1);
        assert_eq!(
            result.faults,
            vec![RegionFault {
                region: "nav".to_string(),
                kind: FaultKind::StylesUnavailable {
                    side: Side::Candidate
                },
            }]
        );
        assert_eq!(result.degraded.len(), 1);
    }

    #[test]
    fn test_center_offset_of_fifteen_is_single_critical() {
        let agg = aggregator(0);
        let issues = agg.style_diff(
            "header",
            &[record("#container", 0.0, &[])],
            &[record("#container", 15.0, &[])],
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[0].magnitude, 15.0);
        assert!(matches!(
            issues[0].detail,
            IssueDetail::StyleMismatch {
                property: StyleProperty::Geometry(GeometryMetric::CenterOffset),
                ..
            }
        ));
    }

    #[test]
    fn test_sub_pixel_geometry_is_noise() {
        let issues = aggregator(0).style_diff(
            "header",
            &[record("#container", 0.0, &[])],
            &[record("#container", 1.5, &[])],
        );
        assert!(issues.is_empty());
    }

    #[test]
    fn test_single_attribute_mismatch_emits_one_issue() {
        let b = record(
            "shop#item",
            0.0,
            &[
                (StyleAttribute::FontSize, "16px"),
                (StyleAttribute::BoxShadow, "none"),
            ],
        );
        let same = aggregator(0).style_diff("nav", &[b.clone()], &[b.clone()]);
        assert!(same.is_empty());

        let c = record(
            "shop#item",
            0.0,
            &[
                (StyleAttribute::FontSize, "18px"),
                (StyleAttribute::BoxShadow, "none"),
            ],
        );
        let issues = aggregator(0).style_diff("nav", &[b], &[c]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Moderate);
        assert_eq!(issues[0].magnitude, 2.0);
    }

    #[test]
    fn test_decorative_mismatch_is_minor() {
        let b = record("#container", 0.0, &[(StyleAttribute::BorderRadius, "4px")]);
        let c = record("#container", 0.0, &[(StyleAttribute::BorderRadius, "0")]);
        let issues = aggregator(0).style_diff("cta", &[b], &[c]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Minor);
        assert_eq!(issues[0].magnitude, 1.0);
    }

    #[test]
    fn test_identity_matching_is_symmetric() {
        let agg = aggregator(0);
        let left = vec![
            record("home#item", 0.0, &[]),
            record("trends#item", 0.0, &[]),
        ];
        let right = vec![
            record("trends#item", 0.0, &[]),
            record("shop#item", 0.0, &[]),
        ];
        let forward = agg.style_diff("nav", &left, &right);
        let backward = agg.style_diff("nav", &right, &left);
        assert_eq!(forward.len(), 2);
        assert_eq!(backward.len(), 2);

        let ids = |issues: &[DiffIssue]| {
            let mut v: Vec<String> = issues
                .iter()
                .filter_map(|i| i.identity().map(str::to_string))
                .collect();
            v.sort();
            v
        };
        assert_eq!(ids(&forward), ids(&backward));
    }
}
