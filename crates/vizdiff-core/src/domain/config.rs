//! Run configuration: the pair of targets, the viewport, the region catalog,
//! and the threshold/timeout defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::RegionCatalog;
use crate::domain::error::{ConfigError, Result};
use crate::domain::issue::Severity;
use crate::domain::region::RegionSpec;
use crate::domain::target::{CaptureTarget, ViewportProfile};

/// Severity thresholds. Values are configurable defaults, not hard requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Fraction of region pixels above which a pixel diff is Critical.
    pub pixel_critical_ratio: f64,
    /// Fraction of region pixels above which a pixel diff is Moderate.
    pub pixel_moderate_ratio: f64,
    /// Geometry delta (CSS px) above which a mismatch is Critical.
    pub offset_critical: f64,
    /// Geometry delta (CSS px) at or above which a mismatch is Moderate; below is noise.
    pub offset_moderate: f64,
    /// Per-channel tolerance used by the built-in comparator.
    pub pixel_tolerance: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pixel_critical_ratio: 0.005,
            pixel_moderate_ratio: 0.0005,
            offset_critical: 10.0,
            offset_moderate: 2.0,
            pixel_tolerance: 0,
        }
    }
}

impl Thresholds {
    /// Classify a differing-pixel ratio. `None` means no issue.
    pub fn classify_pixel_ratio(&self, ratio: f64) -> Option<Severity> {
        if ratio > self.pixel_critical_ratio {
            Some(Severity::Critical)
        } else if ratio > self.pixel_moderate_ratio {
            Some(Severity::Moderate)
        } else if ratio > 0.0 {
            Some(Severity::Minor)
        } else {
            None
        }
    }

    /// Classify an absolute geometry delta. `None` means sub-pixel noise.
    pub fn classify_offset(&self, delta: f64) -> Option<Severity> {
        let delta = delta.abs();
        if delta > self.offset_critical {
            Some(Severity::Critical)
        } else if delta >= self.offset_moderate {
            Some(Severity::Moderate)
        } else {
            None
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let ratios = [
            ("pixel_critical_ratio", self.pixel_critical_ratio),
            ("pixel_moderate_ratio", self.pixel_moderate_ratio),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidThreshold {
                    name: name.to_string(),
                    reason: format!("{value} is outside 0.0..=1.0"),
                });
            }
        }
        if self.pixel_moderate_ratio > self.pixel_critical_ratio {
            return Err(ConfigError::InvalidThreshold {
                name: "pixel_moderate_ratio".to_string(),
                reason: "must not exceed pixel_critical_ratio".to_string(),
            });
        }
        if !(self.offset_moderate >= 0.0 && self.offset_moderate <= self.offset_critical) {
            return Err(ConfigError::InvalidThreshold {
                name: "offset_moderate".to_string(),
                reason: "must be within 0.0..=offset_critical".to_string(),
            });
        }
        Ok(())
    }
}

/// Bounded timeouts for every suspension point, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub navigation_ms: u64,
    pub network_idle_ms: u64,
    /// Default for interaction steps that declare no timeout of their own.
    pub step_ms: u64,
    /// Region resolution, rasterization and style queries.
    pub capture_ms: u64,
    /// Wall-clock bound for capturing both targets.
    pub run_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_ms: 30_000,
            network_idle_ms: 10_000,
            step_ms: 5_000,
            capture_ms: 15_000,
            run_ms: 120_000,
        }
    }
}

impl Timeouts {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn network_idle(&self) -> Duration {
        Duration::from_millis(self.network_idle_ms)
    }

    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn capture(&self) -> Duration {
        Duration::from_millis(self.capture_ms)
    }

    pub fn run(&self) -> Duration {
        Duration::from_millis(self.run_ms)
    }
}

/// A complete comparison run description.
///
/// An empty `regions` list selects the default catalog for the viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub baseline: CaptureTarget,
    pub candidate: CaptureTarget,
    #[serde(default)]
    pub viewport: ViewportProfile,
    #[serde(default)]
    pub regions: Vec<RegionSpec>,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl RunConfig {
    pub fn new(baseline: CaptureTarget, candidate: CaptureTarget) -> Self {
        Self {
            baseline,
            candidate,
            viewport: ViewportProfile::default(),
            regions: Vec::new(),
            thresholds: Thresholds::default(),
            timeouts: Timeouts::default(),
        }
    }

    /// Parse and validate a JSON run configuration.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: RunConfig =
            serde_json::from_str(raw).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate everything that can be checked before capture starts.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (side, target) in [("baseline", &self.baseline), ("candidate", &self.candidate)] {
            if target.id.trim().is_empty() || target.base_url.trim().is_empty() {
                return Err(ConfigError::InvalidTarget {
                    side: side.to_string(),
                });
            }
        }
        let vp = &self.viewport;
        if vp.width == 0 || vp.height == 0 || !(vp.pixel_density > 0.0) {
            return Err(ConfigError::InvalidViewport {
                width: vp.width,
                height: vp.height,
                pixel_density: vp.pixel_density,
            });
        }
        self.thresholds.validate()?;
        self.catalog().map(|_| ())
    }

    /// Build the validated region catalog for this run.
    pub fn catalog(&self) -> std::result::Result<RegionCatalog, ConfigError> {
        if self.regions.is_empty() {
            Ok(RegionCatalog::default_catalog(&self.viewport))
        } else {
            RegionCatalog::new(self.regions.clone())
        }
    }
}
