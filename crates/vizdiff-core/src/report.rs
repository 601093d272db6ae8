//! Report rendering: summary counts, issues grouped by region, ranked actions.
//!
//! [`render`] is pure. Persisting a report is left to callers.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::aggregator::{Aggregation, DegradedRegion, RegionFault, UnavailableRegion};
use crate::catalog::RegionCatalog;
use crate::domain::issue::{DiffIssue, Severity};
use crate::prioritizer::PriorityEntry;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub critical: usize,
    pub moderate: usize,
    pub minor: usize,
    pub total: usize,
    /// Regions with an image on both sides.
    pub compared_regions: usize,
    pub unavailable_regions: usize,
    pub degraded_regions: usize,
    pub faults: usize,
}

impl Summary {
    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::Moderate => self.moderate,
            Severity::Minor => self.minor,
        }
    }

    /// Nothing differs and nothing was missing.
    pub fn is_clean(&self) -> bool {
        self.total == 0 && self.unavailable_regions == 0 && self.faults == 0
    }
}

/// Issues of a single region, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionIssues {
    pub region: String,
    pub issues: Vec<DiffIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub summary: Summary,
    pub issues: Vec<RegionIssues>,
    pub priorities: Vec<PriorityEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<UnavailableRegion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<DegradedRegion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<RegionFault>,
}

/// Build the report for one run.
///
/// Regions are listed in catalog order; regions without issues are omitted
/// from `issues`.
pub fn render(
    catalog: &RegionCatalog,
    aggregation: &Aggregation,
    priorities: Vec<PriorityEntry>,
) -> Report {
    let mut summary = Summary {
        compared_regions: aggregation.compared,
        unavailable_regions: aggregation.unavailable.len(),
        faults: aggregation.faults.len(),
        ..Summary::default()
    };
    let mut degraded_names: Vec<&str> = aggregation
        .degraded
        .iter()
        .map(|d| d.region.as_str())
        .collect();
    degraded_names.dedup();
    summary.degraded_regions = degraded_names.len();

    for issue in &aggregation.issues {
        match issue.severity {
            Severity::Critical => summary.critical += 1,
            Severity::Moderate => summary.moderate += 1,
            Severity::Minor => summary.minor += 1,
        }
    }
    summary.total = aggregation.issues.len();

    let issues = catalog
        .names()
        .filter_map(|region| {
            let issues: Vec<DiffIssue> = aggregation
                .issues
                .iter()
                .filter(|i| i.region == region)
                .cloned()
                .collect();
            (!issues.is_empty()).then(|| RegionIssues {
                region: region.to_string(),
                issues,
            })
        })
        .collect();

    Report {
        summary,
        issues,
        priorities,
        unavailable: aggregation.unavailable.clone(),
        degraded: aggregation.degraded.clone(),
        faults: aggregation.faults.clone(),
    }
}

impl Report {
    /// Render the report as a Markdown action list.
    pub fn render_markdown(&self) -> String {
        let s = &self.summary;
        let mut md = String::from("# Visual Diff Report\n\n## Summary\n\n");
        let _ = writeln!(md, "| Critical | Moderate | Minor | Total |");
        let _ = writeln!(md, "|---|---|---|---|");
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} |\n",
            s.critical, s.moderate, s.minor, s.total
        );
        let _ = writeln!(
            md,
            "- compared regions: {}\n- unavailable regions: {}\n- degraded regions: {}\n- faults: {}",
            s.compared_regions, s.unavailable_regions, s.degraded_regions, s.faults
        );

        md.push_str("\n## Ranked Actions\n\n");
        if self.priorities.is_empty() {
            md.push_str("nothing to fix\n");
        }
        for p in &self.priorities {
            let _ = writeln!(
                md,
                "{}. **{}**: impact {} ({} issue(s), severity weight {} x usage {})",
                p.rank, p.region, p.total_impact, p.issue_count, p.severity_weight, p.usage_weight
            );
        }

        md.push_str("\n## Issues by Region\n");
        for group in &self.issues {
            let _ = writeln!(md, "\n### {}\n", group.region);
            for issue in &group.issues {
                let _ = writeln!(
                    md,
                    "- [{}] {}\n  - fix: {}",
                    issue.severity,
                    issue.headline(),
                    issue.suggestion
                );
            }
        }

        if !self.unavailable.is_empty() {
            md.push_str("\n## Unavailable Regions\n\n");
            for u in &self.unavailable {
                let _ = writeln!(md, "- `{}`: {}", u.region, u.reason);
            }
        }
        if !self.degraded.is_empty() {
            md.push_str("\n## Degraded Captures\n\n");
            for d in &self.degraded {
                let _ = writeln!(md, "- `{}` ({}): {}", d.region, d.side, d.warnings.join("; "));
            }
        }
        if !self.faults.is_empty() {
            md.push_str("\n## Faults\n\n");
            for f in &self.faults {
                let _ = writeln!(md, "- `{}`: {:?}", f.region, f.kind);
            }
        }
        md
    }
}
