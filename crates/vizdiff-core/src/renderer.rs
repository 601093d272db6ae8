//! Page Renderer port.
//!
//! The engine never drives a browser directly: it talks to a [`PageRenderer`]
//! opened per capture target by a [`RendererFactory`]. Every renderer instance
//! is an isolated rendering context (no cookies or state shared between the
//! baseline and the candidate).

use std::collections::BTreeMap;
use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::region::Clip;
use crate::domain::style::StyleAttribute;
use crate::domain::target::{CaptureTarget, ViewportProfile};

/// Errors surfaced by a renderer implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("no element matches {selector}")]
    ElementNotFound { selector: String },

    #[error("interaction failed: {0}")]
    Interaction(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("rasterization failed: {0}")]
    Rasterize(String),

    #[error("renderer session error: {0}")]
    Session(String),
}

impl RenderError {
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        RenderError::Timeout {
            operation: operation.into(),
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RenderError::Timeout { .. })
    }
}

/// Axis-aligned rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Device-pixel dimensions of this rectangle at `pixel_density`.
    pub fn device_size(&self, pixel_density: f64) -> (u32, u32) {
        let scale = |v: f64| (v * pixel_density).round().max(0.0) as u32;
        (scale(self.width), scale(self.height))
    }
}

impl From<Clip> for Rect {
    fn from(clip: Clip) -> Self {
        Rect::new(clip.x, clip.y, clip.width, clip.height)
    }
}

/// The area a region resolves to at capture time.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedArea {
    Clip(Rect),
    Element { selector: String, bounds: Rect },
}

impl ResolvedArea {
    pub fn rect(&self) -> Rect {
        match self {
            ResolvedArea::Clip(rect) => *rect,
            ResolvedArea::Element { bounds, .. } => *bounds,
        }
    }
}

/// A PNG-encoded raster plus its pixel dimensions.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Raster({}x{}, {} bytes)",
            self.width,
            self.height,
            self.png.len()
        )
    }
}

impl Raster {
    /// Encode an RGBA buffer as PNG.
    pub fn from_rgba(image: &RgbaImage) -> Result<Self, image::ImageError> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(Self {
            width: image.width(),
            height: image.height(),
            png,
        })
    }

    /// Wrap existing PNG bytes, reading their dimensions.
    pub fn from_png(png: Vec<u8>) -> Result<Self, image::ImageError> {
        let (width, height) = Self::decode(&png)?.dimensions();
        Ok(Self { width, height, png })
    }

    /// Decode PNG bytes to RGBA.
    pub fn decode(bytes: &[u8]) -> Result<RgbaImage, image::ImageError> {
        Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8())
    }
}

/// One element matched by a style query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawElement {
    /// `textContent` as reported by the page, not yet normalized.
    pub text: String,
    #[serde(default)]
    pub aria_role: Option<String>,
    pub bounds: Rect,
    /// Raw computed values for the requested attributes.
    #[serde(default)]
    pub styles: BTreeMap<StyleAttribute, String>,
}

/// A live page opened for a single capture target.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Load `url`. Implementations should give up after `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), RenderError>;

    /// Wait until the page has no outstanding network activity.
    async fn wait_network_idle(&self, timeout: Duration) -> Result<(), RenderError>;

    async fn click(&self, selector: &str, timeout: Duration) -> Result<(), RenderError>;

    async fn hover(&self, selector: &str, timeout: Duration) -> Result<(), RenderError>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration)
        -> Result<(), RenderError>;

    /// Computed values of `attributes` for every element matching `selector`, in document order.
    async fn query_computed_style(
        &self,
        selector: &str,
        attributes: &[StyleAttribute],
    ) -> Result<Vec<RawElement>, RenderError>;

    /// Bounding box of the first element matching `selector`, `None` if nothing matches.
    async fn bounding_box(&self, selector: &str) -> Result<Option<Rect>, RenderError>;

    /// Rasterize `area` (CSS pixels) at the session's pixel density.
    async fn screenshot(&self, area: &Rect) -> Result<Raster, RenderError>;

    /// Release the rendering context.
    async fn close(&self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Opens isolated renderers, one per capture target.
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn open(
        &self,
        target: &CaptureTarget,
        viewport: &ViewportProfile,
    ) -> Result<Box<dyn PageRenderer>, RenderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_empty_and_device_size() {
        assert!(Rect::new(0.0, 0.0, 0.0, 10.0).is_empty());
        assert!(!Rect::new(0.0, 0.0, 1.0, 1.0).is_empty());
        assert_eq!(
            Rect::new(0.0, 0.0, 400.0, 600.0).device_size(2.0),
            (800, 1200)
        );
    }

    #[test]
    fn test_raster_png_roundtrip_dimensions() {
        let img = RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let raster = Raster::from_rgba(&img).unwrap();
        assert_eq!((raster.width, raster.height), (3, 2));
        let decoded = Raster::decode(&raster.png).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(1, 1), &image::Rgba([10, 20, 30, 255]));
        assert_eq!(Raster::from_png(raster.png.clone()).unwrap(), raster);
        assert!(Raster::from_png(b"not a png".to_vec()).is_err());
    }

    #[test]
    fn test_timeout_error() {
        let err = RenderError::timeout("navigate", Duration::from_secs(2));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "navigate timed out after 2000ms");
    }
}
