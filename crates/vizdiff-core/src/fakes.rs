//! In-memory fakes for the engine's ports (testing only).
//!
//! `ScriptedRendererFactory` serves one [`PageFixture`] per capture target
//! and logs every renderer call; `ScriptedComparator` returns canned pixel
//! counts per region.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use crate::comparator::{CompareError, PixelComparator, PixelComparison};
use crate::domain::style::StyleAttribute;
use crate::domain::target::{CaptureTarget, ViewportProfile};
use crate::renderer::{PageRenderer, Raster, RawElement, Rect, RenderError, RendererFactory};
use crate::store::ImageHandle;

// ---------------------------------------------------------------------------
// Page fixtures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationBehavior {
    Succeed,
    Fail(String),
    /// Never completes; only a timeout ends it.
    Hang,
}

/// A scripted page: what selectors match, how it paints, what fails.
#[derive(Debug, Clone)]
pub struct PageFixture {
    pub navigation: NavigationBehavior,
    pub load_delay: Duration,
    pub screenshot_delay: Duration,
    /// Selector to matched elements, in document order.
    pub elements: BTreeMap<String, Vec<RawElement>>,
    pub fill: [u8; 4],
    /// Rectangles (CSS px, page coordinates) painted over `fill`.
    pub patches: Vec<(Rect, [u8; 4])>,
    pub failing: HashSet<String>,
    pub hanging: HashSet<String>,
}

impl Default for PageFixture {
    fn default() -> Self {
        Self {
            navigation: NavigationBehavior::Succeed,
            load_delay: Duration::ZERO,
            screenshot_delay: Duration::ZERO,
            elements: BTreeMap::new(),
            fill: [255, 255, 255, 255],
            patches: Vec::new(),
            failing: HashSet::new(),
            hanging: HashSet::new(),
        }
    }
}

impl PageFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(mut self, selector: &str, element: RawElement) -> Self {
        self.elements
            .entry(selector.to_string())
            .or_default()
            .push(element);
        self
    }

    pub fn with_fill(mut self, fill: [u8; 4]) -> Self {
        self.fill = fill;
        self
    }

    pub fn with_patch(mut self, rect: Rect, color: [u8; 4]) -> Self {
        self.patches.push((rect, color));
        self
    }

    /// Interactions and style queries on `selector` fail immediately.
    pub fn failing(mut self, selector: &str) -> Self {
        self.failing.insert(selector.to_string());
        self
    }

    /// Interactions and style queries on `selector` never complete.
    pub fn hanging(mut self, selector: &str) -> Self {
        self.hanging.insert(selector.to_string());
        self
    }

    pub fn navigation(mut self, behavior: NavigationBehavior) -> Self {
        self.navigation = behavior;
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_screenshot_delay(mut self, delay: Duration) -> Self {
        self.screenshot_delay = delay;
        self
    }

    fn color_at(&self, x: f64, y: f64) -> [u8; 4] {
        self.patches
            .iter()
            .rev()
            .find(|(r, _)| x >= r.x && x < r.x + r.width && y >= r.y && y < r.y + r.height)
            .map(|(_, c)| *c)
            .unwrap_or(self.fill)
    }
}

/// One element with the given text and bounds and no styles.
pub fn element(text: &str, bounds: Rect) -> RawElement {
    RawElement {
        text: text.to_string(),
        aria_role: None,
        bounds,
        styles: BTreeMap::new(),
    }
}

// ---------------------------------------------------------------------------
// ScriptedRendererFactory
// ---------------------------------------------------------------------------

/// Opens a [`ScriptedRenderer`] per target id.
#[derive(Debug, Default)]
pub struct ScriptedRendererFactory {
    pages: HashMap<String, PageFixture>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRendererFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, target_id: &str, fixture: PageFixture) -> Self {
        self.pages.insert(target_id.to_string(), fixture);
        self
    }

    /// Every renderer call so far, as `"<target> <op> <arg>"`.
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Calls made by one target, without the target prefix.
    pub fn calls_for(&self, target_id: &str) -> Vec<String> {
        let prefix = format!("{target_id} ");
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl RendererFactory for ScriptedRendererFactory {
    async fn open(
        &self,
        target: &CaptureTarget,
        viewport: &ViewportProfile,
    ) -> Result<Box<dyn PageRenderer>, RenderError> {
        let fixture = self
            .pages
            .get(&target.id)
            .cloned()
            .ok_or_else(|| RenderError::Session(format!("no page scripted for {}", target.id)))?;
        self.log.lock().unwrap().push(format!("{} open", target.id));
        Ok(Box::new(ScriptedRenderer {
            target: target.id.clone(),
            fixture,
            pixel_density: viewport.pixel_density,
            log: Arc::clone(&self.log),
        }))
    }
}

pub struct ScriptedRenderer {
    target: String,
    fixture: PageFixture,
    pixel_density: f64,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRenderer {
    fn record(&self, op: &str, arg: &str) {
        let entry = if arg.is_empty() {
            format!("{} {op}", self.target)
        } else {
            format!("{} {op} {arg}", self.target)
        };
        self.log.lock().unwrap().push(entry);
    }

    async fn interact(&self, op: &str, selector: &str) -> Result<(), RenderError> {
        self.record(op, selector);
        if self.fixture.hanging.contains(selector) {
            std::future::pending::<()>().await;
        }
        if self.fixture.failing.contains(selector) {
            return Err(RenderError::Interaction(format!("{op} {selector} rejected")));
        }
        if !self.fixture.elements.contains_key(selector) {
            return Err(RenderError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PageRenderer for ScriptedRenderer {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), RenderError> {
        self.record("navigate", url);
        if !self.fixture.load_delay.is_zero() {
            tokio::time::sleep(self.fixture.load_delay).await;
        }
        match &self.fixture.navigation {
            NavigationBehavior::Succeed => Ok(()),
            NavigationBehavior::Fail(reason) => Err(RenderError::Navigation(reason.clone())),
            NavigationBehavior::Hang => std::future::pending().await,
        }
    }

    async fn wait_network_idle(&self, _timeout: Duration) -> Result<(), RenderError> {
        self.record("network_idle", "");
        Ok(())
    }

    async fn click(&self, selector: &str, _timeout: Duration) -> Result<(), RenderError> {
        self.interact("click", selector).await
    }

    async fn hover(&self, selector: &str, _timeout: Duration) -> Result<(), RenderError> {
        self.interact("hover", selector).await
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), RenderError> {
        match self.interact("wait_for", selector).await {
            Err(RenderError::ElementNotFound { .. }) => {
                tokio::time::sleep(timeout).await;
                Err(RenderError::timeout(format!("wait for {selector}"), timeout))
            }
            other => other,
        }
    }

    async fn query_computed_style(
        &self,
        selector: &str,
        attributes: &[StyleAttribute],
    ) -> Result<Vec<RawElement>, RenderError> {
        self.record("styles", selector);
        if self.fixture.hanging.contains(selector) {
            std::future::pending::<()>().await;
        }
        if self.fixture.failing.contains(selector) {
            return Err(RenderError::Script(format!("styles {selector} rejected")));
        }
        let elements = self.fixture.elements.get(selector).cloned().unwrap_or_default();
        Ok(elements
            .into_iter()
            .map(|mut el| {
                el.styles.retain(|attr, _| attributes.contains(attr));
                el
            })
            .collect())
    }

    async fn bounding_box(&self, selector: &str) -> Result<Option<Rect>, RenderError> {
        self.record("bounding_box", selector);
        Ok(self
            .fixture
            .elements
            .get(selector)
            .and_then(|els| els.first())
            .map(|el| el.bounds))
    }

    async fn screenshot(&self, area: &Rect) -> Result<Raster, RenderError> {
        self.record(
            "screenshot",
            &format!("{}x{}+{}+{}", area.width, area.height, area.x, area.y),
        );
        if !self.fixture.screenshot_delay.is_zero() {
            tokio::time::sleep(self.fixture.screenshot_delay).await;
        }
        let (width, height) = area.device_size(self.pixel_density);
        if width == 0 || height == 0 {
            return Err(RenderError::Rasterize("empty area".to_string()));
        }
        let density = self.pixel_density;
        let image = RgbaImage::from_fn(width, height, |px, py| {
            let x = area.x + f64::from(px) / density;
            let y = area.y + f64::from(py) / density;
            Rgba(self.fixture.color_at(x, y))
        });
        Raster::from_rgba(&image).map_err(|e| RenderError::Rasterize(e.to_string()))
    }

    async fn close(&self) -> Result<(), RenderError> {
        self.record("close", "");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedComparator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedComparison {
    Pixels(u64),
    DimensionMismatch,
    Fail(String),
}

/// Returns a canned result per region; unknown regions report zero pixels.
#[derive(Debug, Default)]
pub struct ScriptedComparator {
    results: HashMap<String, ScriptedComparison>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedComparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, region: &str, result: ScriptedComparison) -> Self {
        self.results.insert(region.to_string(), result);
        self
    }

    pub fn with_pixels(self, region: &str, differing: u64) -> Self {
        self.with_result(region, ScriptedComparison::Pixels(differing))
    }

    /// Regions compared so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl PixelComparator for ScriptedComparator {
    fn compare(
        &self,
        region: &str,
        baseline: &ImageHandle,
        candidate: &ImageHandle,
    ) -> Result<PixelComparison, CompareError> {
        self.calls.lock().unwrap().push(region.to_string());
        match self.results.get(region) {
            None => Ok(PixelComparison::identical()),
            Some(ScriptedComparison::Pixels(n)) => Ok(PixelComparison {
                differing_pixels: *n,
                mask: None,
            }),
            Some(ScriptedComparison::DimensionMismatch) => Err(CompareError::DimensionMismatch {
                baseline: baseline.dimensions(),
                candidate: (candidate.width, candidate.height + 1),
            }),
            Some(ScriptedComparison::Fail(reason)) => Err(CompareError::Decode(reason.clone())),
        }
    }
}
