//! Region specifications: what to capture and how to prepare the page first.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A fixed rectangle in CSS pixels, relative to the top-left of the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Clip {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// How a region's bounds are determined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegionArea {
    /// Fixed rectangle known ahead of time.
    Clip { clip: Clip },
    /// Bounding box of the first element matching `selector`, resolved at capture time.
    Selector { selector: String },
}

/// A pre-capture step. Each step carries its own bounded timeout; no step is a bare sleep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InteractionStep {
    Click {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    Hover {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    WaitForSelector {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    WaitNetworkIdle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
}

impl InteractionStep {
    pub fn click(selector: impl Into<String>) -> Self {
        InteractionStep::Click {
            selector: selector.into(),
            timeout_ms: None,
        }
    }

    pub fn hover(selector: impl Into<String>) -> Self {
        InteractionStep::Hover {
            selector: selector.into(),
            timeout_ms: None,
        }
    }

    pub fn wait_for_selector(selector: impl Into<String>) -> Self {
        InteractionStep::WaitForSelector {
            selector: selector.into(),
            timeout_ms: None,
        }
    }

    /// Selector this step acts on, if any.
    pub fn selector(&self) -> Option<&str> {
        match self {
            InteractionStep::Click { selector, .. }
            | InteractionStep::Hover { selector, .. }
            | InteractionStep::WaitForSelector { selector, .. } => Some(selector),
            InteractionStep::WaitNetworkIdle { .. } => None,
        }
    }

    /// Effective timeout, falling back to `default` when the step declares none.
    pub fn timeout(&self, default: Duration) -> Duration {
        let ms = match self {
            InteractionStep::Click { timeout_ms, .. }
            | InteractionStep::Hover { timeout_ms, .. }
            | InteractionStep::WaitForSelector { timeout_ms, .. }
            | InteractionStep::WaitNetworkIdle { timeout_ms } => *timeout_ms,
        };
        ms.map(Duration::from_millis).unwrap_or(default)
    }

    pub fn describe(&self) -> String {
        match self {
            InteractionStep::Click { selector, .. } => format!("click {selector}"),
            InteractionStep::Hover { selector, .. } => format!("hover {selector}"),
            InteractionStep::WaitForSelector { selector, .. } => {
                format!("wait for {selector}")
            }
            InteractionStep::WaitNetworkIdle { .. } => "wait for network idle".to_string(),
        }
    }
}

/// Selectors used to pull style records out of a region, one per structural role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleProbes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl StyleProbes {
    pub fn is_empty(&self) -> bool {
        self.container.is_none() && self.item.is_none() && self.label.is_none()
    }
}

/// A named region of interest in the Region Catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub name: String,
    #[serde(flatten)]
    pub area: RegionArea,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interaction: Vec<InteractionStep>,
    #[serde(default, skip_serializing_if = "StyleProbes::is_empty")]
    pub probes: StyleProbes,
}

impl RegionSpec {
    pub fn clip(name: impl Into<String>, clip: Clip) -> Self {
        Self {
            name: name.into(),
            area: RegionArea::Clip { clip },
            interaction: Vec::new(),
            probes: StyleProbes::default(),
        }
    }

    pub fn selector(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            area: RegionArea::Selector {
                selector: selector.into(),
            },
            interaction: Vec::new(),
            probes: StyleProbes::default(),
        }
    }

    pub fn with_step(mut self, step: InteractionStep) -> Self {
        self.interaction.push(step);
        self
    }

    pub fn with_probes(mut self, probes: StyleProbes) -> Self {
        self.probes = probes;
        self
    }
}
