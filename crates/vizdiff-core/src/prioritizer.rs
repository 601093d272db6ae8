//! Prioritizer: ranks regions by severity-weighted impact times usage.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::issue::DiffIssue;

/// How often a region or block recurs across the site.
pub trait Inventory: Send + Sync {
    /// `None` when the name is unknown; callers default to 1.
    fn usage_weight(&self, name: &str) -> Option<f64>;
}

/// Fixed name-to-weight table. Lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticInventory {
    weights: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct InventoryDocument {
    #[serde(default)]
    blocks: Vec<InventoryEntry>,
    #[serde(default)]
    fragments: Vec<InventoryEntry>,
}

#[derive(Debug, Deserialize)]
struct InventoryEntry {
    name: String,
    #[serde(default)]
    instances: Vec<serde_json::Value>,
}

impl StaticInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weight(mut self, name: &str, weight: f64) -> Self {
        self.weights.insert(name.to_lowercase(), weight);
        self
    }

    /// Parse a block inventory: `{"blocks": [{"name", "instances": [...]}], "fragments": [...]}`.
    ///
    /// The weight of a name is its total instance count across entries. The
    /// `nav` fragment is counted towards `header`.
    pub fn from_inventory_json(raw: &str) -> serde_json::Result<Self> {
        let doc: InventoryDocument = serde_json::from_str(raw)?;
        let mut inventory = Self::new();
        for entry in &doc.blocks {
            inventory.add(&entry.name, entry.instances.len());
        }
        for entry in &doc.fragments {
            let name = entry.name.to_lowercase();
            let name = if name == "nav" { "header" } else { name.as_str() };
            inventory.add(name, entry.instances.len());
        }
        Ok(inventory)
    }

    fn add(&mut self, name: &str, instances: usize) {
        *self.weights.entry(name.to_lowercase()).or_insert(0.0) += instances as f64;
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl Inventory for StaticInventory {
    fn usage_weight(&self, name: &str) -> Option<f64> {
        self.weights.get(&name.to_lowercase()).copied()
    }
}

/// One row of the ranked action list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityEntry {
    /// 1-based position in the ranking.
    pub rank: usize,
    pub region: String,
    pub issue_count: usize,
    /// Sum of severity weights (Critical=3, Moderate=2, Minor=1).
    pub severity_weight: u32,
    pub usage_weight: f64,
    pub total_impact: f64,
}

/// Group `issues` by region and rank by `severity_weight * usage_weight`.
///
/// Ties break by region name. Missing, non-positive or non-finite usage
/// weights count as 1. Pure: same input, same output.
pub fn prioritize(issues: &[DiffIssue], inventory: Option<&dyn Inventory>) -> Vec<PriorityEntry> {
    let mut grouped: BTreeMap<&str, (usize, u32)> = BTreeMap::new();
    for issue in issues {
        let entry = grouped.entry(issue.region.as_str()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += issue.severity.weight();
    }

    let mut entries: Vec<PriorityEntry> = grouped
        .into_iter()
        .map(|(region, (issue_count, severity_weight))| {
            let usage_weight = inventory
                .and_then(|inv| inv.usage_weight(region))
                .filter(|w| w.is_finite() && *w > 0.0)
                .unwrap_or(1.0);
            PriorityEntry {
                rank: 0,
                region: region.to_string(),
                issue_count,
                severity_weight,
                usage_weight,
                total_impact: f64::from(severity_weight) * usage_weight,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.total_impact
            .total_cmp(&a.total_impact)
            .then_with(|| a.region.cmp(&b.region))
    });
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i + 1;
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::issue::{IssueDetail, Severity};

    fn issue(region: &str, severity: Severity) -> DiffIssue {
        DiffIssue {
            region: region.to_string(),
            severity,
            magnitude: 1.0,
            suggestion: String::new(),
            detail: IssueDetail::StructuralMismatch {
                identity: Some("x#item".to_string()),
                missing_on: vec![],
                reason: String::new(),
            },
        }
    }

    #[test]
    fn test_more_critical_issues_rank_higher() {
        let issues = vec![
            issue("b", Severity::Critical),
            issue("a", Severity::Critical),
            issue("a", Severity::Critical),
        ];
        let ranked = prioritize(&issues, None);
        assert_eq!(ranked[0].region, "a");
        assert_eq!(ranked[0].total_impact, 6.0);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].region, "b");
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn test_ties_break_by_name() {
        let issues = vec![issue("nav", Severity::Minor), issue("footer", Severity::Minor)];
        let ranked = prioritize(&issues, None);
        let names: Vec<&str> = ranked.iter().map(|e| e.region.as_str()).collect();
        assert_eq!(names, vec!["footer", "nav"]);
    }

    #[test]
    fn test_usage_weight_scales_impact() {
        let inv = StaticInventory::new().with_weight("Cards", 12.0);
        let issues = vec![issue("header", Severity::Critical), issue("cards", Severity::Minor)];
        let ranked = prioritize(&issues, Some(&inv));
        assert_eq!(ranked[0].region, "cards");
        assert_eq!(ranked[0].total_impact, 12.0);
        assert_eq!(ranked[1].usage_weight, 1.0);
    }

    #[test]
    fn test_invalid_weights_default_to_one() {
        let inv = StaticInventory::new()
            .with_weight("hero", -3.0)
            .with_weight("nav", f64::NAN);
        let issues = vec![issue("hero", Severity::Moderate), issue("nav", Severity::Moderate)];
        for entry in prioritize(&issues, Some(&inv)) {
            assert_eq!(entry.usage_weight, 1.0);
        }
    }

    #[test]
    fn test_zero_weight_keeps_region_ranked_by_severity() {
        let inv = StaticInventory::new().with_weight("footer", 0.0);
        let issues = vec![issue("footer", Severity::Critical), issue("nav", Severity::Minor)];
        let ranked = prioritize(&issues, Some(&inv));
        assert_eq!(ranked[0].region, "footer");
        assert_eq!(ranked[0].usage_weight, 1.0);
        assert_eq!(ranked[0].total_impact, 3.0);
    }

    #[test]
    fn test_inventory_document_counts_instances() {
        let raw = r#"{
            "blocks": [
                {"name": "Cards", "key": "cards", "instances": ["/a", "/b", "/c"]},
                {"name": "cards", "key": "cards-grid", "instances": ["/d"]},
                {"name": "Hero", "instances": ["/a"]}
            ],
            "fragments": [
                {"name": "nav", "instances": ["/a", "/b"]}
            ]
        }"#;
        let inv = StaticInventory::from_inventory_json(raw).unwrap();
        assert_eq!(inv.usage_weight("cards"), Some(4.0));
        assert_eq!(inv.usage_weight("HERO"), Some(1.0));
        assert_eq!(inv.usage_weight("header"), Some(2.0));
        assert_eq!(inv.usage_weight("footer"), None);
    }
}
