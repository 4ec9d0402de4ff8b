//! Watershed delineation with skip-on-exists idempotence.

use damshed_core::error::{DamshedError, Result};
use damshed_core::models::{DamId, Raster};
use damshed_core::ports::{RasterEngine, RasterStore};
use serde::{Deserialize, Serialize};

use crate::context::RunContext;

/// What to do when a catchment already exists for a dam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelineationMode {
    /// Leave the existing catchment alone and do no work
    SkipExisting,
    /// Remove the existing catchment, then write the new one
    Replace,
}

/// Result of one delineation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelineationOutcome {
    Created,
    Replaced,
    Skipped,
}

/// Turns pour points into catchment rasters stored by dam id
pub struct WatershedDelineator<'a, E, S>
where
    E: RasterEngine,
    S: RasterStore,
{
    engine: &'a E,
    context: &'a RunContext,
    catchments: &'a S,
    mode: DelineationMode,
}

impl<'a, E, S> WatershedDelineator<'a, E, S>
where
    E: RasterEngine,
    S: RasterStore,
{
    pub fn new(
        engine: &'a E,
        context: &'a RunContext,
        catchments: &'a S,
        mode: DelineationMode,
    ) -> Self {
        Self { engine, context, catchments, mode }
    }

    pub fn mode(&self) -> DelineationMode {
        self.mode
    }

    /// True when the dam needs no work under the current mode
    pub fn should_skip(&self, dam_id: &DamId) -> Result<bool> {
        Ok(self.mode == DelineationMode::SkipExisting && self.catchments.exists(dam_id.as_str())?)
    }

    /// Delineate and persist the catchment of one dam
    pub fn delineate(&self, dam_id: &DamId, pour_point: &Raster) -> Result<DelineationOutcome> {
        if self.should_skip(dam_id)? {
            tracing::debug!(dam_id = %dam_id, "Catchment exists, skipping");
            return Ok(DelineationOutcome::Skipped);
        }

        pour_point.ensure_grid(self.context.alignment(), "pour point")?;
        if pour_point.is_empty() {
            return Err(DamshedError::DegeneratePourPoint { dam_id: dam_id.to_string() });
        }

        let catchment = self.engine.watershed(self.context.flow_direction(), pour_point)?;
        if catchment.is_empty() {
            return Err(DamshedError::EmptyRaster { name: format!("catchment {}", dam_id) });
        }

        let outcome = match self.mode {
            DelineationMode::SkipExisting => {
                self.catchments.create(dam_id.as_str(), &catchment)?;
                DelineationOutcome::Created
            }
            DelineationMode::Replace => {
                let existed = self.catchments.remove(dam_id.as_str())?;
                self.catchments.create(dam_id.as_str(), &catchment)?;
                if existed {
                    DelineationOutcome::Replaced
                } else {
                    DelineationOutcome::Created
                }
            }
        };

        tracing::debug!(dam_id = %dam_id, cells = catchment.count(), ?outcome, "Catchment written");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunSettings;
    use damshed_core::models::{GridAlignment, GridWindow};
    use damshed_geo::GridEngine;
    use damshed_store::MemoryRasterStore;

    fn grid() -> GridAlignment {
        GridAlignment::new(0.0, 10.0, 1.0).unwrap()
    }

    fn context() -> RunContext {
        RunContext::new(Raster::filled(grid(), GridWindow::new(0, 0, 5, 5), 4.0), RunSettings::default())
    }

    fn pour(row: i64, col: i64) -> Raster {
        Raster::filled(grid(), GridWindow::new(row, col, 1, 1), 1.0)
    }

    #[test]
    fn test_creates_then_skips() {
        let context = context();
        let engine = GridEngine::new();
        let store = MemoryRasterStore::new();
        let delineator = WatershedDelineator::new(&engine, &context, &store, DelineationMode::SkipExisting);
        let id = DamId::new("3");

        assert_eq!(delineator.delineate(&id, &pour(2, 2)).unwrap(), DelineationOutcome::Created);
        let first = store.load("3").unwrap().unwrap();
        assert_eq!(first.count(), 3);

        // A different pour point must not change the stored catchment
        assert_eq!(delineator.delineate(&id, &pour(4, 2)).unwrap(), DelineationOutcome::Skipped);
        assert_eq!(store.load("3").unwrap().unwrap(), first);
    }

    #[test]
    fn test_replace_mode_overwrites() {
        let context = context();
        let engine = GridEngine::new();
        let store = MemoryRasterStore::new();
        let id = DamId::new("3");

        WatershedDelineator::new(&engine, &context, &store, DelineationMode::SkipExisting)
            .delineate(&id, &pour(1, 1))
            .unwrap();

        let replacer = WatershedDelineator::new(&engine, &context, &store, DelineationMode::Replace);
        assert_eq!(replacer.delineate(&id, &pour(4, 1)).unwrap(), DelineationOutcome::Replaced);
        assert_eq!(store.keys().unwrap(), vec!["3".to_string()]);
        assert_eq!(store.load("3").unwrap().unwrap().count(), 5);
        assert_eq!(replacer.delineate(&DamId::new("4"), &pour(0, 0)).unwrap(), DelineationOutcome::Created);
    }

    #[test]
    fn test_degenerate_pour_point() {
        let context = context();
        let engine = GridEngine::new();
        let store = MemoryRasterStore::new();
        let delineator = WatershedDelineator::new(&engine, &context, &store, DelineationMode::SkipExisting);

        let empty = Raster::new(grid(), GridWindow::new(0, 0, 1, 1));
        assert!(matches!(
            delineator.delineate(&DamId::new("9"), &empty),
            Err(DamshedError::DegeneratePourPoint { .. })
        ));

        let mut misaligned = pour(0, 0);
        misaligned.alignment = GridAlignment::new(0.25, 10.0, 1.0).unwrap();
        assert!(matches!(
            delineator.delineate(&DamId::new("9"), &misaligned),
            Err(DamshedError::AlignmentMismatch { .. })
        ));
        assert!(store.keys().unwrap().is_empty());
    }
}
