//! WebDriver-backed [`PageRenderer`].
//!
//! Each [`RendererFactory::open`] starts a fresh WebDriver session, so the
//! baseline and the candidate never share cookies, storage or cache. Pixel
//! density is applied through browser flags; screenshots are taken of the
//! viewport and stitched onto a canvas of exactly the requested size.

mod scripts;

use std::collections::BTreeMap;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use fantoccini::error::{CmdError, NewSessionError};
use fantoccini::{Client, ClientBuilder, Locator};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, instrument};

use vizdiff_core::{
    CaptureTarget, PageRenderer, Raster, RawElement, Rect, RenderError, RendererFactory,
    StyleAttribute, ViewportProfile,
};

/// Quiet period with no new resource entries before the network counts as idle.
const NETWORK_QUIET: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Upper bound on screenshot tiles for one capture.
const MAX_TILES: usize = 64;

/// Browser driven through the WebDriver endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrowserKind {
    #[default]
    Chrome,
    Firefox,
}

impl FromStr for BrowserKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(BrowserKind::Chrome),
            "firefox" => Ok(BrowserKind::Firefox),
            other => Err(format!(
                "unsupported browser '{other}' (expected chrome or firefox)"
            )),
        }
    }
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BrowserKind::Chrome => "chrome",
            BrowserKind::Firefox => "firefox",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebDriverConfig {
    pub webdriver_url: String,
    pub browser: BrowserKind,
    pub headless: bool,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            browser: BrowserKind::Chrome,
            headless: true,
        }
    }
}

impl WebDriverConfig {
    /// Session capabilities for `viewport`.
    pub fn capabilities(&self, viewport: &ViewportProfile) -> Map<String, Value> {
        let mut caps = Map::new();
        match self.browser {
            BrowserKind::Chrome => {
                let mut args = vec![
                    "--disable-gpu".to_string(),
                    "--no-sandbox".to_string(),
                    "--hide-scrollbars".to_string(),
                    format!("--window-size={},{}", viewport.width, viewport.height),
                    format!("--force-device-scale-factor={}", viewport.pixel_density),
                ];
                if self.headless {
                    args.insert(0, "--headless=new".to_string());
                }
                caps.insert("browserName".to_string(), json!("chrome"));
                caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
            }
            BrowserKind::Firefox => {
                let mut args = vec![
                    format!("--width={}", viewport.width),
                    format!("--height={}", viewport.height),
                ];
                if self.headless {
                    args.insert(0, "--headless".to_string());
                }
                caps.insert("browserName".to_string(), json!("firefox"));
                caps.insert(
                    "moz:firefoxOptions".to_string(),
                    json!({
                        "args": args,
                        "prefs": { "layout.css.devPixelsPerPx": viewport.pixel_density.to_string() },
                    }),
                );
            }
        }
        caps
    }
}

/// Opens one WebDriver session per capture target.
#[derive(Debug, Clone, Default)]
pub struct WebDriverRendererFactory {
    config: WebDriverConfig,
}

impl WebDriverRendererFactory {
    pub fn new(config: WebDriverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WebDriverConfig {
        &self.config
    }
}

#[async_trait]
impl RendererFactory for WebDriverRendererFactory {
    #[instrument(skip_all, fields(target = %target.id, browser = %self.config.browser))]
    async fn open(
        &self,
        target: &CaptureTarget,
        viewport: &ViewportProfile,
    ) -> Result<Box<dyn PageRenderer>, RenderError> {
        let client = ClientBuilder::rustls()
            .capabilities(self.config.capabilities(viewport))
            .connect(&self.config.webdriver_url)
            .await
            .map_err(|e| session_error(&self.config.webdriver_url, e))?;

        let renderer = WebDriverRenderer {
            client,
            viewport: viewport.clone(),
        };
        if let Err(e) = renderer.fit_viewport().await {
            let _ = renderer.close().await;
            return Err(e);
        }
        debug!("webdriver session opened");
        Ok(Box::new(renderer))
    }
}

/// A single WebDriver session bound to one viewport profile.
pub struct WebDriverRenderer {
    client: Client,
    viewport: ViewportProfile,
}

impl WebDriverRenderer {
    /// Size the window so that the inner viewport matches the profile.
    async fn fit_viewport(&self) -> Result<(), RenderError> {
        let (w, h) = (self.viewport.width, self.viewport.height);
        self.client
            .set_window_size(w, h)
            .await
            .map_err(session_cmd)?;
        let chrome: [f64; 2] = self.eval(scripts::CHROME_SIZE, vec![]).await?;
        let (dw, dh) = (chrome[0].max(0.0) as u32, chrome[1].max(0.0) as u32);
        if dw > 0 || dh > 0 {
            self.client
                .set_window_size(w + dw, h + dh)
                .await
                .map_err(session_cmd)?;
        }
        Ok(())
    }

    async fn eval<T: serde::de::DeserializeOwned>(
        &self,
        script: &str,
        args: Vec<Value>,
    ) -> Result<T, RenderError> {
        let value = self
            .client
            .execute(script, args)
            .await
            .map_err(|e| RenderError::Script(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| RenderError::Script(e.to_string()))
    }

    async fn selector_visible(&self, selector: &str) -> Result<bool, RenderError> {
        self.eval(scripts::SELECTOR_VISIBLE, vec![json!(selector)])
            .await
    }

    async fn viewport_tile(&self, x: f64, y: f64) -> Result<(Tile, RgbaImage), RenderError> {
        let scroll: [f64; 4] = self
            .eval(scripts::SCROLL_TO, vec![json!(x), json!(y)])
            .await?;
        let tile = Tile {
            scroll_x: scroll[0],
            scroll_y: scroll[1],
            width: scroll[2],
            height: scroll[3],
        };
        let png = self
            .client
            .screenshot()
            .await
            .map_err(|e| RenderError::Rasterize(e.to_string()))?;
        let image = Raster::decode(&png).map_err(|e| RenderError::Rasterize(e.to_string()))?;
        Ok((tile, image))
    }
}

#[async_trait]
impl PageRenderer for WebDriverRenderer {
    async fn navigate(&self, url: &str, limit: Duration) -> Result<(), RenderError> {
        bounded("navigate", limit, async {
            self.client
                .goto(url)
                .await
                .map_err(|e| RenderError::Navigation(e.to_string()))
        })
        .await
    }

    async fn wait_network_idle(&self, limit: Duration) -> Result<(), RenderError> {
        let deadline = Instant::now() + limit;
        let mut last_count = None;
        let mut quiet_since = Instant::now();
        loop {
            let (state, count): (String, u64) = self.eval(scripts::LOAD_STATE, vec![]).await?;
            let now = Instant::now();
            if last_count != Some(count) {
                last_count = Some(count);
                quiet_since = now;
            }
            if state == "complete" && now.duration_since(quiet_since) >= NETWORK_QUIET {
                return Ok(());
            }
            if now >= deadline {
                return Err(RenderError::timeout("network idle", limit));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&self, selector: &str, limit: Duration) -> Result<(), RenderError> {
        bounded("click", limit, async {
            let element = self
                .client
                .find(Locator::Css(selector))
                .await
                .map_err(|e| element_error(selector, e))?;
            element
                .click()
                .await
                .map_err(|e| RenderError::Interaction(e.to_string()))
        })
        .await
    }

    async fn hover(&self, selector: &str, limit: Duration) -> Result<(), RenderError> {
        bounded("hover", limit, async {
            let found: bool = self.eval(scripts::HOVER, vec![json!(selector)]).await?;
            if found {
                Ok(())
            } else {
                Err(RenderError::ElementNotFound {
                    selector: selector.to_string(),
                })
            }
        })
        .await
    }

    async fn wait_for_selector(&self, selector: &str, limit: Duration) -> Result<(), RenderError> {
        let deadline = Instant::now() + limit;
        loop {
            if self.selector_visible(selector).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(RenderError::timeout(
                    format!("wait for {selector}"),
                    limit,
                ));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn query_computed_style(
        &self,
        selector: &str,
        attributes: &[StyleAttribute],
    ) -> Result<Vec<RawElement>, RenderError> {
        let names: Vec<&str> = attributes.iter().map(|a| a.css_name()).collect();
        let value: Value = self
            .eval(scripts::COMPUTED_STYLES, vec![json!(selector), json!(names)])
            .await?;
        parse_elements(value)
    }

    async fn bounding_box(&self, selector: &str) -> Result<Option<Rect>, RenderError> {
        self.eval(scripts::BOUNDING_BOX, vec![json!(selector)])
            .await
    }

    async fn screenshot(&self, area: &Rect) -> Result<Raster, RenderError> {
        let density = self.viewport.pixel_density;
        let (width, height) = area.device_size(density);
        if width == 0 || height == 0 {
            return Err(RenderError::Rasterize(format!(
                "capture area {}x{} is empty",
                area.width, area.height
            )));
        }
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));

        let mut y = area.y;
        let bottom = area.y + area.height;
        for _ in 0..MAX_TILES {
            let (tile, image) = self.viewport_tile(area.x, y).await?;
            place_tile(&mut canvas, &image, &tile, area, density);
            let covered = tile.scroll_y + tile.height;
            // Page cannot scroll further, or the area is fully covered.
            if covered >= bottom || covered <= y || tile.height <= 0.0 {
                break;
            }
            y = covered;
        }

        Raster::from_rgba(&canvas).map_err(|e| RenderError::Rasterize(e.to_string()))
    }

    async fn close(&self) -> Result<(), RenderError> {
        self.client.clone().close().await.map_err(session_cmd)
    }
}

/// Visible page window at screenshot time, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tile {
    scroll_x: f64,
    scroll_y: f64,
    width: f64,
    height: f64,
}

/// Copy the part of a viewport screenshot that overlaps `area` onto `canvas`.
///
/// The screenshot's own scale (image width over viewport width) is measured
/// rather than assumed; crops are resampled to `density` when they differ.
fn place_tile(canvas: &mut RgbaImage, shot: &RgbaImage, tile: &Tile, area: &Rect, density: f64) {
    if tile.width <= 0.0 || shot.width() == 0 {
        return;
    }
    let scale = f64::from(shot.width()) / tile.width;

    let left = area.x.max(tile.scroll_x);
    let top = area.y.max(tile.scroll_y);
    let right = (area.x + area.width).min(tile.scroll_x + tile.width);
    let bottom = (area.y + area.height).min(tile.scroll_y + tile.height);
    if right <= left || bottom <= top {
        return;
    }

    let src_x = ((left - tile.scroll_x) * scale).round() as u32;
    let src_y = ((top - tile.scroll_y) * scale).round() as u32;
    let src_w = (((right - left) * scale).round() as u32).min(shot.width().saturating_sub(src_x));
    let src_h = (((bottom - top) * scale).round() as u32).min(shot.height().saturating_sub(src_y));
    if src_w == 0 || src_h == 0 {
        return;
    }
    let mut crop = imageops::crop_imm(shot, src_x, src_y, src_w, src_h).to_image();

    let dst_w = ((right - left) * density).round() as u32;
    let dst_h = ((bottom - top) * density).round() as u32;
    if (dst_w, dst_h) != crop.dimensions() && dst_w > 0 && dst_h > 0 {
        crop = imageops::resize(&crop, dst_w, dst_h, FilterType::Triangle);
    }

    let dst_x = ((left - area.x) * density).round() as i64;
    let dst_y = ((top - area.y) * density).round() as i64;
    imageops::replace(canvas, &crop, dst_x, dst_y);
}

#[derive(Debug, Deserialize)]
struct ScriptElement {
    #[serde(default)]
    text: String,
    #[serde(default)]
    role: Option<String>,
    bounds: Rect,
    #[serde(default)]
    styles: BTreeMap<String, String>,
}

/// Map the computed-style script's output to [`RawElement`]s.
///
/// Properties the engine does not track are dropped.
fn parse_elements(value: Value) -> Result<Vec<RawElement>, RenderError> {
    let elements: Vec<ScriptElement> =
        serde_json::from_value(value).map_err(|e| RenderError::Script(e.to_string()))?;
    Ok(elements
        .into_iter()
        .map(|el| RawElement {
            text: el.text,
            aria_role: el.role.filter(|r| !r.trim().is_empty()),
            bounds: el.bounds,
            styles: el
                .styles
                .into_iter()
                .filter_map(|(name, value)| {
                    StyleAttribute::from_css_name(&name).map(|attr| (attr, value))
                })
                .collect(),
        })
        .collect())
}

async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T, RenderError>
where
    F: Future<Output = Result<T, RenderError>>,
{
    timeout(limit, fut)
        .await
        .map_err(|_| RenderError::timeout(operation, limit))?
}

fn element_error(selector: &str, e: CmdError) -> RenderError {
    if e.is_miss() {
        RenderError::ElementNotFound {
            selector: selector.to_string(),
        }
    } else {
        RenderError::Interaction(e.to_string())
    }
}

fn session_cmd(e: CmdError) -> RenderError {
    RenderError::Session(e.to_string())
}

fn session_error(url: &str, e: NewSessionError) -> RenderError {
    RenderError::Session(format!("cannot start session at {url}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_kind_parses() {
        assert_eq!("Chrome".parse::<BrowserKind>().unwrap(), BrowserKind::Chrome);
        assert_eq!("chromium".parse::<BrowserKind>().unwrap(), BrowserKind::Chrome);
        assert_eq!("firefox".parse::<BrowserKind>().unwrap(), BrowserKind::Firefox);
        assert!("safari".parse::<BrowserKind>().is_err());
    }

    #[test]
    fn chrome_capabilities_carry_viewport_and_density() {
        let config = WebDriverConfig::default();
        let viewport = ViewportProfile::new(1280, 720).with_pixel_density(2.0);
        let caps = config.capabilities(&viewport);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        let args: Vec<&str> = args.iter().filter_map(|a| a.as_str()).collect();
        assert_eq!(args[0], "--headless=new");
        assert!(args.contains(&"--window-size=1280,720"));
        assert!(args.contains(&"--force-device-scale-factor=2"));
    }

    #[test]
    fn firefox_capabilities_without_headless() {
        let config = WebDriverConfig {
            browser: BrowserKind::Firefox,
            headless: false,
            ..WebDriverConfig::default()
        };
        let caps = config.capabilities(&ViewportProfile::new(800, 600));
        let opts = &caps["moz:firefoxOptions"];
        let args: Vec<&str> = opts["args"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|a| a.as_str())
            .collect();
        assert_eq!(args, vec!["--width=800", "--height=600"]);
        assert_eq!(opts["prefs"]["layout.css.devPixelsPerPx"], "1");
    }

    #[test]
    fn parse_elements_keeps_tracked_styles_only() {
        let value = json!([{
            "text": "  Pricing ",
            "role": "",
            "bounds": { "x": 10.0, "y": 20.0, "width": 100.0, "height": 30.0 },
            "styles": { "font-size": "16px", "--custom": "x" }
        }]);
        let elements = parse_elements(value).unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].aria_role, None);
        assert_eq!(elements[0].bounds, Rect::new(10.0, 20.0, 100.0, 30.0));
        assert_eq!(elements[0].styles.len(), 1);
        assert_eq!(
            elements[0].styles.get(&StyleAttribute::FontSize).map(String::as_str),
            Some("16px")
        );
    }

    #[test]
    fn parse_elements_rejects_malformed_output() {
        assert!(matches!(
            parse_elements(json!({"not": "a list"})),
            Err(RenderError::Script(_))
        ));
    }

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 0, 255]))
    }

    #[test]
    fn tile_inside_viewport_is_cropped_exactly() {
        let shot = gradient(200, 100);
        let tile = Tile {
            scroll_x: 0.0,
            scroll_y: 0.0,
            width: 200.0,
            height: 100.0,
        };
        let area = Rect::new(20.0, 10.0, 50.0, 40.0);
        let mut canvas = RgbaImage::new(50, 40);
        place_tile(&mut canvas, &shot, &tile, &area, 1.0);
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([20, 10, 0, 255]));
        assert_eq!(canvas.get_pixel(49, 39), &Rgba([69, 49, 0, 255]));
    }

    #[test]
    fn area_beyond_page_stays_transparent() {
        let shot = gradient(100, 100);
        let tile = Tile {
            scroll_x: 0.0,
            scroll_y: 0.0,
            width: 100.0,
            height: 100.0,
        };
        let area = Rect::new(0.0, 80.0, 100.0, 40.0);
        let mut canvas = RgbaImage::new(100, 40);
        place_tile(&mut canvas, &shot, &tile, &area, 1.0);
        assert_eq!(canvas.get_pixel(0, 19)[3], 255);
        assert_eq!(canvas.get_pixel(0, 20), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn scrolled_tile_lands_at_page_offset() {
        let shot = gradient(100, 50);
        let tile = Tile {
            scroll_x: 0.0,
            scroll_y: 50.0,
            width: 100.0,
            height: 50.0,
        };
        let area = Rect::new(0.0, 0.0, 100.0, 100.0);
        let mut canvas = RgbaImage::new(100, 100);
        place_tile(&mut canvas, &shot, &tile, &area, 1.0);
        assert_eq!(canvas.get_pixel(5, 49)[3], 0);
        assert_eq!(canvas.get_pixel(5, 50), &Rgba([5, 0, 0, 255]));
    }

    #[test]
    fn high_density_screenshot_maps_to_device_pixels() {
        // Viewport is 100 CSS px wide, screenshot 200 device px.
        let shot = gradient(200, 200);
        let tile = Tile {
            scroll_x: 0.0,
            scroll_y: 0.0,
            width: 100.0,
            height: 100.0,
        };
        let area = Rect::new(10.0, 10.0, 20.0, 20.0);
        let mut canvas = RgbaImage::new(40, 40);
        place_tile(&mut canvas, &shot, &tile, &area, 2.0);
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([20, 20, 0, 255]));
        assert_eq!(canvas.get_pixel(39, 39), &Rgba([59, 59, 0, 255]));
    }
}
