use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{content_digest, validate_key, ImageHandle, ImageStore, Result, StoreError};
use crate::renderer::Raster;

/// Filesystem-backed image store.
///
/// Layout: `<root>/<key>`, e.g. `<root>/baseline/header.png`.
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    /// Create a new `FsImageStore` rooted at `root`. Creates `root` if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        key.split('/').fold(self.root.clone(), |acc, seg| acc.join(seg))
    }
}

impl ImageStore for FsImageStore {
    fn put(&self, key: &str, raster: &Raster) -> Result<ImageHandle> {
        validate_key(key)?;
        let path = self.path_for(key);
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(dir)?;

        // Atomic write: temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&raster.png)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(ImageHandle {
            key: key.to_string(),
            digest: content_digest(&raster.png),
            width: raster.width,
            height: raster.height,
        })
    }

    fn get(&self, handle: &ImageHandle) -> Result<Vec<u8>> {
        validate_key(&handle.key)?;
        let path = self.path_for(&handle.key);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(handle.key.clone())
            } else {
                StoreError::Io(e)
            }
        })
    }
}
