//! Zonal statistics over one catchment.
//!
//! For every catchment the engine derives a bounding extent, sums the pixel
//! area and takes the mean of each tracked variable. Any single statistic may
//! fail; it is then recorded as the sentinel and reported, and the remaining
//! statistics are still computed.

use damshed_core::error::{DamshedError, Result};
use damshed_core::models::{DamId, Raster, StatisticsRecord, TrackedVariables};
use damshed_core::ports::{RasterEngine, ZonalOp};
use damshed_geo::area::pixel_area_raster;
use geo::Polygon;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::context::RunContext;
use crate::error::PipelineError;

/// Name of the area statistic in failure reports
pub const AREA_TARGET: &str = "area";

/// Source of per-cell areas in km²
#[derive(Debug, Clone)]
pub enum AreaGrid {
    /// Pre-computed pixel area grid aligned to the run grid
    Raster(Raster),
    /// Geodesic cell areas computed on demand for each catchment window
    Geodesic,
}

impl AreaGrid {
    /// Cell areas covering a catchment; the pre-computed grid is borrowed, never copied
    fn for_catchment(&self, context: &RunContext, catchment: &Raster) -> Result<Cow<'_, Raster>> {
        match self {
            AreaGrid::Raster(raster) => Ok(Cow::Borrowed(raster)),
            AreaGrid::Geodesic => {
                let window = catchment
                    .data_window()
                    .ok_or_else(|| DamshedError::EmptyRaster { name: "catchment".to_string() })?;
                pixel_area_raster(context.alignment(), window).map(Cow::Owned)
            }
        }
    }
}

/// Tracked variables together with their aligned rasters, in run order
#[derive(Debug, Clone)]
pub struct VariableSet {
    variables: TrackedVariables,
    rasters: Vec<Raster>,
}

impl VariableSet {
    /// Pair each tracked variable with its raster; every variable needs one
    pub fn new(variables: TrackedVariables, rasters: Vec<Raster>) -> Result<Self> {
        if rasters.len() != variables.len() {
            return Err(DamshedError::ConfigInvalid {
                key: "variables".to_string(),
                reason: format!(
                    "{} variables are tracked but {} rasters were supplied",
                    variables.len(),
                    rasters.len()
                ),
            });
        }
        Ok(Self { variables, rasters })
    }

    pub fn variables(&self) -> &TrackedVariables {
        &self.variables
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Raster)> {
        self.variables.names().iter().zip(self.rasters.iter())
    }
}

/// Computed versus reported catchment area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaCheck {
    pub dam_id: DamId,
    pub computed_km2: f64,
    pub reported_km2: f64,
    pub ratio: f64,
}

impl AreaCheck {
    pub fn new(dam_id: DamId, computed_km2: f64, reported_km2: f64) -> Self {
        Self { dam_id, computed_km2, reported_km2, ratio: computed_km2 / reported_km2 }
    }

    /// Outside `[1 - tolerance, 1 + tolerance]`
    pub fn needs_review(&self, tolerance: f64) -> bool {
        !self.ratio.is_finite() || (self.ratio - 1.0).abs() > tolerance
    }
}

/// Statistics of one catchment
#[derive(Debug)]
pub struct ZonalOutcome {
    /// Always full length; failed entries hold the sentinel
    pub record: StatisticsRecord,
    pub failures: Vec<PipelineError>,
}

/// Computes statistics records for catchments
pub struct ZonalStatisticsEngine<'a, E>
where
    E: RasterEngine,
{
    engine: &'a E,
    context: &'a RunContext,
    area: &'a AreaGrid,
    variables: &'a VariableSet,
}

impl<'a, E> ZonalStatisticsEngine<'a, E>
where
    E: RasterEngine,
{
    pub fn new(
        engine: &'a E,
        context: &'a RunContext,
        area: &'a AreaGrid,
        variables: &'a VariableSet,
    ) -> Self {
        Self { engine, context, area, variables }
    }

    pub fn compute(&self, dam_id: &DamId, catchment: &Raster) -> ZonalOutcome {
        let sentinel = self.context.settings.sentinel;
        let mut failures = Vec::new();

        // Extent only narrows the cells read; without it every catchment cell is used
        let extent = match self.engine.raster_to_polygon(catchment) {
            Ok(polygon) => Some(polygon),
            Err(source) => {
                tracing::warn!(dam_id = %dam_id, "No extent polygon: {}", source);
                None
            }
        };

        let area = match self.area_sum(catchment, extent.as_ref()) {
            Ok(value) => value,
            Err(source) => {
                tracing::warn!(dam_id = %dam_id, "No area: {}", source);
                failures.push(PipelineError::Statistic {
                    dam_id: dam_id.clone(),
                    target: AREA_TARGET.to_string(),
                    source,
                });
                sentinel
            }
        };

        let mut means = Vec::with_capacity(self.variables.variables().len());
        for (name, raster) in self.variables.iter() {
            let value = self
                .engine
                .zonal_statistic(catchment, raster, ZonalOp::Mean, extent.as_ref());
            match value {
                Ok(v) => means.push(v),
                Err(source) => {
                    tracing::warn!(dam_id = %dam_id, variable = %name, "No result: {}", source);
                    failures.push(PipelineError::Statistic {
                        dam_id: dam_id.clone(),
                        target: name.clone(),
                        source,
                    });
                    means.push(sentinel);
                }
            }
        }

        ZonalOutcome { record: StatisticsRecord::new(means, area), failures }
    }

    fn area_sum(&self, catchment: &Raster, extent: Option<&Polygon<f64>>) -> Result<f64> {
        let areas = self.area.for_catchment(self.context, catchment)?;
        self.engine.zonal_statistic(catchment, &areas, ZonalOp::Sum, extent)
    }
}
