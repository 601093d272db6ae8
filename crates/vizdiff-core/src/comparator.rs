//! Pixel Comparator port and the built-in RGBA comparator.

use std::sync::Arc;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::renderer::Raster;
use crate::store::{key_segment, ImageHandle, ImageStore, StoreError};

/// Result of comparing two same-sized images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelComparison {
    pub differing_pixels: u64,
    /// Highlight mask, when the comparator produces one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<ImageHandle>,
}

impl PixelComparison {
    pub fn identical() -> Self {
        Self {
            differing_pixels: 0,
            mask: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("image dimensions differ: {baseline:?} vs {candidate:?}")]
    DimensionMismatch {
        baseline: (u32, u32),
        candidate: (u32, u32),
    },

    #[error("could not decode image: {0}")]
    Decode(String),

    #[error("image store error: {0}")]
    Store(#[from] StoreError),
}

/// Counts differing pixels between two images of one region.
///
/// Implementations must reject images of different dimensions with
/// [`CompareError::DimensionMismatch`] rather than guessing an alignment.
pub trait PixelComparator: Send + Sync {
    fn compare(
        &self,
        region: &str,
        baseline: &ImageHandle,
        candidate: &ImageHandle,
    ) -> Result<PixelComparison, CompareError>;
}

/// Per-pixel RGBA comparator reading images back from an [`ImageStore`].
///
/// A pixel differs when any channel differs by more than `tolerance`.
pub struct RgbaComparator {
    store: Arc<dyn ImageStore>,
    tolerance: u8,
    write_mask: bool,
}

impl RgbaComparator {
    pub fn new(store: Arc<dyn ImageStore>) -> Self {
        Self {
            store,
            tolerance: 0,
            write_mask: true,
        }
    }

    pub fn with_tolerance(mut self, tolerance: u8) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn without_mask(mut self) -> Self {
        self.write_mask = false;
        self
    }

    fn load(&self, handle: &ImageHandle) -> Result<RgbaImage, CompareError> {
        let bytes = self.store.get(handle)?;
        Raster::decode(&bytes).map_err(|e| CompareError::Decode(format!("{}: {e}", handle.key)))
    }
}

impl PixelComparator for RgbaComparator {
    fn compare(
        &self,
        region: &str,
        baseline: &ImageHandle,
        candidate: &ImageHandle,
    ) -> Result<PixelComparison, CompareError> {
        if baseline.dimensions() != candidate.dimensions() {
            return Err(CompareError::DimensionMismatch {
                baseline: baseline.dimensions(),
                candidate: candidate.dimensions(),
            });
        }
        if baseline.same_content(candidate) {
            return Ok(PixelComparison::identical());
        }

        let a = self.load(baseline)?;
        let b = self.load(candidate)?;
        if a.dimensions() != b.dimensions() {
            return Err(CompareError::DimensionMismatch {
                baseline: a.dimensions(),
                candidate: b.dimensions(),
            });
        }

        let (differing_pixels, mask) = diff_pixels(&a, &b, self.tolerance);
        debug!(region = %region, differing_pixels, "pixel comparison finished");

        let mask = if self.write_mask && differing_pixels > 0 {
            let raster = Raster::from_rgba(&mask).map_err(|e| CompareError::Decode(e.to_string()))?;
            let key = format!("diff/{}.png", key_segment(region));
            Some(self.store.put(&key, &raster)?)
        } else {
            None
        };

        Ok(PixelComparison {
            differing_pixels,
            mask,
        })
    }
}

const MASK_HIT: Rgba<u8> = Rgba([255, 0, 0, 255]);
const MASK_MISS: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Count pixels whose largest channel delta exceeds `tolerance`.
///
/// Both images must have the same dimensions.
pub fn diff_pixels(a: &RgbaImage, b: &RgbaImage, tolerance: u8) -> (u64, RgbaImage) {
    let (width, height) = a.dimensions();
    let mut mask = RgbaImage::from_pixel(width, height, MASK_MISS);
    let mut count = 0u64;
    for ((x, y, pa), pb) in a.enumerate_pixels().zip(b.pixels()) {
        let delta = pa
            .0
            .iter()
            .zip(pb.0.iter())
            .map(|(ca, cb)| ca.abs_diff(*cb))
            .max()
            .unwrap_or(0);
        if delta > tolerance {
            count += 1;
            mask.put_pixel(x, y, MASK_HIT);
        }
    }
    (count, mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryImageStore;

    fn put(store: &MemoryImageStore, key: &str, img: &RgbaImage) -> ImageHandle {
        store.put(key, &Raster::from_rgba(img).unwrap()).unwrap()
    }

    #[test]
    fn test_identical_images_short_circuit() {
        let store = Arc::new(MemoryImageStore::new());
        let img = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        let a = put(&store, "baseline/hero.png", &img);
        let b = put(&store, "candidate/hero.png", &img);

        let cmp = RgbaComparator::new(store.clone());
        let result = cmp.compare("hero", &a, &b).unwrap();
        assert_eq!(result, PixelComparison::identical());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_counts_differing_pixels_and_writes_mask() {
        let store = Arc::new(MemoryImageStore::new());
        let a_img = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let mut b_img = a_img.clone();
        for x in 0..3 {
            b_img.put_pixel(x, 0, Rgba([0, 0, 0, 255]));
        }
        let a = put(&store, "baseline/hero.png", &a_img);
        let b = put(&store, "candidate/hero.png", &b_img);

        let result = RgbaComparator::new(store.clone())
            .compare("hero", &a, &b)
            .unwrap();
        assert_eq!(result.differing_pixels, 3);
        let mask = result.mask.unwrap();
        assert_eq!(mask.key, "diff/hero.png");
        assert_eq!(mask.dimensions(), (10, 10));
    }

    #[test]
    fn test_tolerance_absorbs_small_deltas() {
        let store = Arc::new(MemoryImageStore::new());
        let a_img = RgbaImage::from_pixel(2, 2, Rgba([100, 100, 100, 255]));
        let b_img = RgbaImage::from_pixel(2, 2, Rgba([103, 100, 98, 255]));
        let a = put(&store, "baseline/x.png", &a_img);
        let b = put(&store, "candidate/x.png", &b_img);

        let strict = RgbaComparator::new(store.clone()).without_mask();
        assert_eq!(strict.compare("x", &a, &b).unwrap().differing_pixels, 4);

        let lenient = RgbaComparator::new(store.clone()).with_tolerance(3);
        assert_eq!(lenient.compare("x", &a, &b).unwrap().differing_pixels, 0);
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let store = Arc::new(MemoryImageStore::new());
        let a = put(
            &store,
            "baseline/hero.png",
            &RgbaImage::from_pixel(400, 600, MASK_MISS),
        );
        let b = put(
            &store,
            "candidate/hero.png",
            &RgbaImage::from_pixel(400, 601, MASK_MISS),
        );
        let err = RgbaComparator::new(store).compare("hero", &a, &b).unwrap_err();
        assert!(matches!(
            err,
            CompareError::DimensionMismatch {
                baseline: (400, 600),
                candidate: (400, 601)
            }
        ));
    }
}
