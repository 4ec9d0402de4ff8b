//! Directory-backed raster store.
//!
//! Each raster is one JSON document named `{prefix}{key}.json` inside the
//! store directory. Existence of the file is what the delineation step uses
//! as its "already done" marker, so writes go through a temporary file and a
//! rename to avoid leaving half-written rasters behind after a crash.

use damshed_core::error::{DamshedError, Result};
use damshed_core::models::Raster;
use damshed_core::ports::RasterStore;
use damshed_geo::raster_io::{read_raster, write_raster};
use std::fs;
use std::path::{Path, PathBuf};

const EXTENSION: &str = "json";

/// Raster store over a directory of raster documents.
///
/// The directory is created on first write, so opening a store never touches
/// the filesystem.
#[derive(Debug, Clone)]
pub struct FileRasterStore {
    dir: PathBuf,
    prefix: String,
}

impl FileRasterStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_prefix(dir, "")
    }

    /// Store whose file names carry a fixed prefix, e.g. `rivs_`
    pub fn with_prefix(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.contains(['/', '\\']) {
            return Err(DamshedError::ConfigInvalid {
                key: "raster prefix".to_string(),
                reason: format!("'{}' cannot be part of a file name", prefix),
            });
        }
        Ok(Self { dir: dir.into(), prefix })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing a key
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(DamshedError::ConfigInvalid {
                key: "raster key".to_string(),
                reason: format!("'{}' cannot be used as a file name", key),
            });
        }
        Ok(self.dir.join(format!("{}{}.{}", self.prefix, key, EXTENSION)))
    }
}

impl RasterStore for FileRasterStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn load(&self, key: &str) -> Result<Option<Raster>> {
        let path = self.path_for(key)?;
        if !path.is_file() {
            return Ok(None);
        }
        read_raster(&path).map(Some)
    }

    fn create(&self, key: &str, raster: &Raster) -> Result<()> {
        let path = self.path_for(key)?;
        if path.exists() {
            return Err(DamshedError::AlreadyExists { key: key.to_string() });
        }
        write_raster(&path, raster)
    }

    fn replace(&self, key: &str, raster: &Raster) -> Result<()> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(&path)?;
            tracing::debug!(key, path = %path.display(), "Removed existing raster before replacing");
        }
        write_raster(&path, raster)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let suffix = format!(".{}", EXTENSION);
        let mut keys = Vec::new();
        if !self.dir.is_dir() {
            return Ok(keys);
        }

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(key) = name.strip_prefix(self.prefix.as_str()).and_then(|n| n.strip_suffix(&suffix)) {
                keys.push(key.to_string());
            }
        }

        keys.sort();
        Ok(keys)
    }
}
