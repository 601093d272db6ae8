//! Capture targets and rendering conditions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of the comparison a capture belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The reference page.
    Baseline,
    /// The implementation under review.
    Candidate,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Baseline, Side::Candidate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Baseline => "baseline",
            Side::Candidate => "candidate",
        }
    }

    pub fn other(&self) -> Side {
        match self {
            Side::Baseline => Side::Candidate,
            Side::Candidate => Side::Baseline,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two pages being compared. Immutable once configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTarget {
    pub id: String,
    pub base_url: String,
}

impl CaptureTarget {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
        }
    }
}

/// Rendering conditions shared by both targets of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportProfile {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_pixel_density")]
    pub pixel_density: f64,
}

fn default_pixel_density() -> f64 {
    1.0
}

impl Default for ViewportProfile {
    fn default() -> Self {
        Self {
            width: 1600,
            height: 900,
            pixel_density: 1.0,
        }
    }
}

impl ViewportProfile {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixel_density: 1.0,
        }
    }

    pub fn with_pixel_density(mut self, pixel_density: f64) -> Self {
        self.pixel_density = pixel_density;
        self
    }

    /// Horizontal center of the viewport in CSS pixels.
    pub fn center_x(&self) -> f64 {
        f64::from(self.width) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_other_is_involution() {
        for side in Side::BOTH {
            assert_eq!(side.other().other(), side);
        }
        assert_eq!(Side::Baseline.to_string(), "baseline");
    }

    #[test]
    fn test_viewport_defaults_pixel_density() {
        let vp: ViewportProfile = serde_json::from_str(r#"{"width":1280,"height":720}"#).unwrap();
        assert_eq!(vp.pixel_density, 1.0);
        assert_eq!(vp.center_x(), 640.0);
    }
}
