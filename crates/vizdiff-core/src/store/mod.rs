//! Image storage for captured rasters and diff masks.
//!
//! Keys are relative slash-separated paths (`baseline/header.png`), unique per
//! (target, region) within a run, so no locking is needed between the two
//! capture tasks.

pub mod fs;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};
use thiserror::Error;

use crate::renderer::Raster;

/// Opaque reference to a stored image.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
    pub key: String,
    /// SHA-256 of the encoded bytes, hex.
    pub digest: String,
    pub width: u32,
    pub height: u32,
}

impl ImageHandle {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Byte-identical content.
    pub fn same_content(&self, other: &ImageHandle) -> bool {
        self.digest == other.digest
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ImageHandle({} {}x{} {})",
            self.key,
            self.width,
            self.height,
            self.digest.chars().take(12).collect::<String>()
        )
    }
}

/// Hex SHA-256 of `data`.
pub fn content_digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Errors from image store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("invalid image key: {0}")]
    InvalidKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Image store interface.
pub trait ImageStore: Send + Sync {
    /// Store `raster` under `key`, replacing any previous content.
    fn put(&self, key: &str, raster: &Raster) -> Result<ImageHandle>;

    /// Retrieve the encoded bytes for `handle`.
    fn get(&self, handle: &ImageHandle) -> Result<Vec<u8>>;
}

/// Reject absolute paths, empty segments and parent traversal.
pub fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        Err(StoreError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

/// Map a region or target name onto a single safe key segment.
pub fn key_segment(name: &str) -> String {
    let segment: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if segment.is_empty() {
        "_".to_string()
    } else {
        segment
    }
}

/// In-memory image store backed by a `HashMap<key, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    images: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn images(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.images.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Number of stored images. Still readable after a writer panicked.
    pub fn len(&self) -> usize {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl ImageStore for MemoryImageStore {
    fn put(&self, key: &str, raster: &Raster) -> Result<ImageHandle> {
        validate_key(key)?;
        let handle = ImageHandle {
            key: key.to_string(),
            digest: content_digest(&raster.png),
            width: raster.width,
            height: raster.height,
        };
        self.images()?.insert(key.to_string(), raster.png.clone());
        Ok(handle)
    }

    fn get(&self, handle: &ImageHandle) -> Result<Vec<u8>> {
        self.images()?
            .get(&handle.key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(handle.key.clone()))
    }
}
