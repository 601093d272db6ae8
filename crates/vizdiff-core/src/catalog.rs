//! Region Catalog: the static, validated list of regions compared on every run.
//!
//! Declared order is significant: targets capture regions in this order and
//! the aggregator emits issues in this order.

use std::collections::HashSet;
use std::time::Duration;

use tracing::debug;

use crate::domain::error::{ConfigError, Result, VizdiffError};
use crate::domain::region::{Clip, InteractionStep, RegionArea, RegionSpec, StyleProbes};
use crate::domain::target::ViewportProfile;
use crate::renderer::{PageRenderer, RenderError, ResolvedArea};

#[derive(Debug, Clone, PartialEq)]
pub struct RegionCatalog {
    regions: Vec<RegionSpec>,
}

impl RegionCatalog {
    /// Build a catalog, rejecting malformed entries. Nothing is silently skipped.
    pub fn new(regions: Vec<RegionSpec>) -> std::result::Result<Self, ConfigError> {
        if regions.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        let mut seen = HashSet::new();
        for (index, region) in regions.iter().enumerate() {
            validate_region(index, region)?;
            if !seen.insert(region.name.as_str()) {
                return Err(ConfigError::DuplicateRegion {
                    name: region.name.clone(),
                });
            }
        }
        Ok(Self { regions })
    }

    /// Full page, header, navigation, dropdown and call-to-action for `viewport`.
    pub fn default_catalog(viewport: &ViewportProfile) -> Self {
        let width = f64::from(viewport.width);
        let height = f64::from(viewport.height);
        Self {
            regions: vec![
                RegionSpec::clip("full_page", Clip::new(0.0, 0.0, width, height)),
                RegionSpec::clip("header", Clip::new(0.0, 0.0, width, 120.0)).with_probes(
                    StyleProbes {
                        container: Some("header nav".to_string()),
                        item: None,
                        label: None,
                    },
                ),
                RegionSpec::selector("navigation", "header nav").with_probes(StyleProbes {
                    container: Some("header nav".to_string()),
                    item: Some("nav .nav-sections a".to_string()),
                    label: None,
                }),
                RegionSpec::clip("dropdown", Clip::new(0.0, 0.0, width, 600.0))
                    .with_step(InteractionStep::hover("nav .nav-drop"))
                    .with_step(InteractionStep::wait_for_selector(
                        "nav .nav-drop[aria-expanded='true']",
                    ))
                    .with_probes(StyleProbes {
                        container: None,
                        item: Some("nav .nav-drop[aria-expanded='true'] li a".to_string()),
                        label: None,
                    }),
                RegionSpec::selector("call_to_action", ".nav-tools .button").with_probes(
                    StyleProbes {
                        container: Some(".nav-tools .button".to_string()),
                        item: None,
                        label: None,
                    },
                ),
            ],
        }
    }

    /// Regions in declared order.
    pub fn list_regions(&self) -> &[RegionSpec] {
        &self.regions
    }

    pub fn get(&self, name: &str) -> Option<&RegionSpec> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|r| r.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Resolve `region` to a concrete area on the live page.
    ///
    /// Returns `VizdiffError::RegionNotFound` when a selector matches nothing
    /// (or only an empty box). Callers record that as a missing snapshot.
    pub async fn resolve(
        &self,
        region: &RegionSpec,
        renderer: &dyn PageRenderer,
        timeout: Duration,
    ) -> Result<ResolvedArea> {
        match &region.area {
            RegionArea::Clip { clip } => Ok(ResolvedArea::Clip((*clip).into())),
            RegionArea::Selector { selector } => {
                let bounds = tokio::time::timeout(timeout, renderer.bounding_box(selector))
                    .await
                    .map_err(|_| RenderError::timeout(format!("resolve {selector}"), timeout))??;
                match bounds {
                    Some(rect) if !rect.is_empty() => {
                        debug!(region = %region.name, selector = %selector, ?rect, "region resolved");
                        Ok(ResolvedArea::Element {
                            selector: selector.clone(),
                            bounds: rect,
                        })
                    }
                    _ => Err(VizdiffError::RegionNotFound {
                        region: region.name.clone(),
                        selector: selector.clone(),
                    }),
                }
            }
        }
    }
}

fn validate_region(index: usize, region: &RegionSpec) -> std::result::Result<(), ConfigError> {
    if region.name.trim().is_empty() {
        return Err(ConfigError::EmptyRegionName { index });
    }
    match &region.area {
        RegionArea::Clip { clip } => {
            let finite = [clip.x, clip.y, clip.width, clip.height]
                .iter()
                .all(|v| v.is_finite());
            if !finite || clip.width <= 0.0 || clip.height <= 0.0 {
                return Err(ConfigError::EmptyClip {
                    name: region.name.clone(),
                    width: clip.width,
                    height: clip.height,
                });
            }
        }
        RegionArea::Selector { selector } => {
            if selector.trim().is_empty() {
                return Err(ConfigError::EmptySelector {
                    name: region.name.clone(),
                });
            }
        }
    }
    for (step, interaction) in region.interaction.iter().enumerate() {
        if let Some(selector) = interaction.selector() {
            if selector.trim().is_empty() {
                return Err(ConfigError::StepWithoutSelector {
                    name: region.name.clone(),
                    step,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_order() {
        let catalog = RegionCatalog::default_catalog(&ViewportProfile::default());
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(
            names,
            vec!["full_page", "header", "navigation", "dropdown", "call_to_action"]
        );
        assert!(RegionCatalog::new(catalog.list_regions().to_vec()).is_ok());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let regions = vec![
            RegionSpec::selector("header", "header"),
            RegionSpec::clip("header", Clip::new(0.0, 0.0, 10.0, 10.0)),
        ];
        assert!(matches!(
            RegionCatalog::new(regions),
            Err(ConfigError::DuplicateRegion { .. })
        ));
    }

    #[test]
    fn test_zero_area_clip_rejected() {
        let regions = vec![RegionSpec::clip("hero", Clip::new(0.0, 0.0, 400.0, 0.0))];
        assert!(matches!(
            RegionCatalog::new(regions),
            Err(ConfigError::EmptyClip { .. })
        ));
    }

    #[test]
    fn test_blank_step_selector_rejected() {
        let regions =
            vec![RegionSpec::selector("menu", "nav").with_step(InteractionStep::click("  "))];
        assert!(matches!(
            RegionCatalog::new(regions),
            Err(ConfigError::StepWithoutSelector { step: 0, .. })
        ));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(matches!(
            RegionCatalog::new(Vec::new()),
            Err(ConfigError::EmptyCatalog)
        ));
    }
}
