//! Raster documents on disk.
//!
//! A raster file is a JSON document holding its alignment, window and
//! row-major values, with `null` for NoData cells.

use damshed_core::error::{DamshedError, Result};
use damshed_core::models::Raster;
use std::fs;
use std::path::Path;

/// Read and validate a raster document
pub fn read_raster(path: &Path) -> Result<Raster> {
    let content = fs::read_to_string(path)?;
    let raster: Raster = serde_json::from_str(&content).map_err(|e| {
        DamshedError::Serialization(format!("Failed to parse raster {}: {}", path.display(), e))
    })?;
    raster.validate()?;
    Ok(raster.normalized())
}

/// Write a raster document, replacing any file at `path`.
///
/// The document is written next to the target first and renamed into place,
/// so readers never see a half-written raster.
pub fn write_raster(path: &Path, raster: &Raster) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string(raster)
        .map_err(|e| DamshedError::Serialization(format!("Failed to serialize raster: {}", e)))?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use damshed_core::models::{CellIndex, GridAlignment, GridWindow};
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grids").join("acc.json");

        let grid = GridAlignment::new(-10.0, 10.0, 0.25).unwrap();
        let mut raster = Raster::new(grid, GridWindow::new(4, 8, 2, 2));
        raster.set(CellIndex::new(4, 9), Some(12.0)).unwrap();

        write_raster(&path, &raster).unwrap();
        let loaded = read_raster(&path).unwrap();
        assert_eq!(loaded, raster);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_read_rejects_inconsistent_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"alignment":{"origin_x":0,"origin_y":0,"cell_size":1},
                "window":{"row":0,"col":0,"rows":2,"cols":2},
                "values":[1.0, null]}"#,
        )
        .unwrap();

        assert!(matches!(read_raster(&path), Err(DamshedError::Serialization(_))));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(read_raster(&dir.path().join("none.json")), Err(DamshedError::Io(_))));
    }
}
