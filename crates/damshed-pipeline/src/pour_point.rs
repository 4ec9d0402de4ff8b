//! Pour point selection for dams that are not aligned to the flow network.
//!
//! A dam record only points at its river reach. The reach is burned into the
//! run grid and one of two strategies picks the sink cells:
//!
//! - [`PourPointStrategy::ReachCentre`] keeps the reach cells whose focal sum
//!   exceeds the interior threshold. Reach endpoints usually sit on
//!   confluences, and delineating from them would add the neighbouring
//!   basin.
//! - [`PourPointStrategy::MostUpstream`] keeps the reach cell(s) with the
//!   lowest flow accumulation, i.e. the most headward point of the reach.

use damshed_core::error::{DamshedError, Result};
use damshed_core::models::{AttributePredicate, Dam, Raster, ReachId, RiverReach};
use damshed_core::ports::{FocalOp, FocalWindow, RasterEngine, ZonalOp};
use damshed_geo::validation::ensure_valid;
use geo::Geometry;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::RunContext;

/// Strategy used to turn a reach into a pour point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PourPointStrategy {
    ReachCentre,
    MostUpstream,
}

impl fmt::Display for PourPointStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PourPointStrategy::ReachCentre => f.write_str("reach centre"),
            PourPointStrategy::MostUpstream => f.write_str("most upstream"),
        }
    }
}

/// Derives pour point rasters from reaches or dam locations
pub struct PourPointSelector<'a, E>
where
    E: RasterEngine,
{
    engine: &'a E,
    context: &'a RunContext,
}

impl<'a, E> PourPointSelector<'a, E>
where
    E: RasterEngine,
{
    pub fn new(engine: &'a E, context: &'a RunContext) -> Self {
        Self { engine, context }
    }

    /// Pour point for a reach-linked dam
    pub fn select(&self, dam: &Dam, strategy: PourPointStrategy) -> Result<Raster> {
        let reach_id = dam.reach.ok_or_else(|| DamshedError::MissingAttribute {
            feature_id: dam.id.to_string(),
            field: dam.dataset.reach_field().unwrap_or("reach").to_string(),
        })?;

        let reach = self.locate_reach(reach_id)?;
        let reach_raster = self.rasterize_reach(&reach)?;

        let pour_point = match strategy {
            PourPointStrategy::ReachCentre => self.reach_centre(reach_id, &reach_raster)?,
            PourPointStrategy::MostUpstream => self.most_upstream(reach_id, &reach_raster)?,
        };

        tracing::debug!(
            dam_id = %dam.id,
            reach_id = reach_id.0,
            %strategy,
            cells = pour_point.count(),
            "Selected pour point"
        );
        Ok(pour_point)
    }

    /// Pour point at the dam's own location, for datasets aligned to the network
    pub fn from_location(&self, dam: &Dam) -> Result<Raster> {
        self.engine.rasterize_point(&dam.location, 1.0, self.context.alignment())
    }

    /// Find the reach feature by id in the reach layer
    pub fn locate_reach(&self, reach_id: ReachId) -> Result<RiverReach> {
        let layer = self.context.reaches()?;
        let predicate =
            AttributePredicate::equals(self.context.settings.reach_id_field.clone(), reach_id.0);
        let selected = self.engine.select_by_attribute(layer, &predicate)?;

        let feature = selected
            .first()
            .ok_or(DamshedError::ReachNotFound { reach_id: reach_id.0 })?;
        if selected.len() > 1 {
            tracing::warn!(
                reach_id = reach_id.0,
                matches = selected.len(),
                "Reach id is not unique, using the first match"
            );
        }

        let reach = RiverReach::from_feature(feature, reach_id)?;
        ensure_valid(
            &Geometry::MultiLineString(reach.geometry.clone()),
            &format!("reach {}", reach_id),
        )?;
        Ok(reach)
    }

    /// Burn every part of a reach into one raster with value 1
    pub fn rasterize_reach(&self, reach: &RiverReach) -> Result<Raster> {
        let alignment = self.context.alignment();
        let parts = reach
            .geometry
            .0
            .iter()
            .map(|line| self.engine.rasterize_polyline(line, 1.0, alignment))
            .collect::<Result<Vec<Raster>>>()?;

        let window = parts
            .iter()
            .map(|p| p.window)
            .reduce(|a, b| a.union(&b))
            .ok_or(DamshedError::EmptyReach { reach_id: reach.id.0 })?;

        let mut merged = Raster::new(*alignment, window);
        for part in &parts {
            for (cell, value) in part.populated() {
                merged.set(cell, Some(value))?;
            }
        }
        Ok(merged)
    }

    fn reach_centre(&self, reach_id: ReachId, reach: &Raster) -> Result<Raster> {
        let size = self.context.settings.focal_window;
        let threshold = self.context.settings.interior_threshold;

        let sums = self
            .engine
            .focal_statistic(reach, FocalWindow::rectangle(size, size), FocalOp::Sum)?;
        let interior = reach.masked_by(&sums, |n| n > threshold)?;

        if interior.is_empty() {
            return Err(DamshedError::NoInteriorCells { reach_id: reach_id.0, threshold });
        }
        Ok(interior.trimmed())
    }

    fn most_upstream(&self, reach_id: ReachId, reach: &Raster) -> Result<Raster> {
        let accumulation = self.context.flow_accumulation()?;
        let minimum = self
            .engine
            .zonal_statistic(reach, accumulation, ZonalOp::Minimum, None)?;

        let headward = reach.masked_by(accumulation, |a| a == minimum)?;
        if headward.is_empty() {
            return Err(DamshedError::EmptyReach { reach_id: reach_id.0 });
        }
        Ok(headward.trimmed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunSettings;
    use damshed_core::models::{
        CellIndex, DamDataset, DamId, GridAlignment, GridWindow, VectorFeature, VectorLayer,
    };
    use damshed_geo::GridEngine;
    use geo::{LineString, Point};
    use serde_json::json;

    fn grid() -> GridAlignment {
        GridAlignment::new(0.0, 10.0, 1.0).unwrap()
    }

    fn reach_layer(features: Vec<(u64, LineString<f64>)>) -> VectorLayer {
        VectorLayer::new(
            "reaches",
            features
                .into_iter()
                .map(|(id, line)| VectorFeature {
                    id: Some(id.to_string()),
                    geometry: Some(Geometry::LineString(line)),
                    properties: json!({ "OBJECTID": id }).as_object().cloned().unwrap_or_default(),
                })
                .collect(),
        )
    }

    /// 7x7 grid draining south; reach 7 runs along row 3, cols 1..=5
    fn context() -> RunContext {
        let flow = Raster::filled(grid(), GridWindow::new(0, 0, 7, 7), 4.0);
        let mut acc = Raster::filled(grid(), GridWindow::new(0, 0, 7, 7), 50.0);
        for (col, value) in [(1, 10.0), (2, 3.0), (3, 2.0), (4, 4.0), (5, 9.0)] {
            acc.set(CellIndex::new(3, col), Some(value)).unwrap();
        }

        RunContext::new(flow, RunSettings::default())
            .with_flow_accumulation(acc)
            .unwrap()
            .with_reaches(reach_layer(vec![
                (7, LineString::from(vec![(1.5, 6.5), (5.5, 6.5)])),
                (8, LineString::from(vec![(1.5, 1.5), (2.5, 1.5)])),
            ]))
    }

    fn dam(reach: Option<u64>) -> Dam {
        Dam {
            id: DamId::new("1"),
            dataset: DamDataset::Fhred,
            location: Point::new(3.2, 6.9),
            reach: reach.map(ReachId),
            reported_area_km2: None,
        }
    }

    #[test]
    fn test_reach_centre_excludes_endpoints() {
        let context = context();
        let engine = GridEngine::new();
        let selector = PourPointSelector::new(&engine, &context);

        let pour = selector.select(&dam(Some(7)), PourPointStrategy::ReachCentre).unwrap();
        let cells: Vec<_> = pour.populated().map(|(c, _)| c).collect();
        assert_eq!(cells, vec![CellIndex::new(3, 2), CellIndex::new(3, 3), CellIndex::new(3, 4)]);
    }

    #[test]
    fn test_most_upstream_picks_minimum_accumulation() {
        let context = context();
        let engine = GridEngine::new();
        let selector = PourPointSelector::new(&engine, &context);

        let pour = selector.select(&dam(Some(7)), PourPointStrategy::MostUpstream).unwrap();
        let cells: Vec<_> = pour.populated().map(|(c, _)| c).collect();
        assert_eq!(cells, vec![CellIndex::new(3, 3)]);
    }

    #[test]
    fn test_short_reach_has_no_interior() {
        let context = context();
        let engine = GridEngine::new();
        let selector = PourPointSelector::new(&engine, &context);

        assert!(matches!(
            selector.select(&dam(Some(8)), PourPointStrategy::ReachCentre),
            Err(DamshedError::NoInteriorCells { reach_id: 8, .. })
        ));
    }

    #[test]
    fn test_missing_reach() {
        let context = context();
        let engine = GridEngine::new();
        let selector = PourPointSelector::new(&engine, &context);

        assert!(matches!(
            selector.select(&dam(Some(99)), PourPointStrategy::ReachCentre),
            Err(DamshedError::ReachNotFound { reach_id: 99 })
        ));
        assert!(matches!(
            selector.select(&dam(None), PourPointStrategy::ReachCentre),
            Err(DamshedError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_from_location_uses_containing_cell() {
        let context = context();
        let engine = GridEngine::new();
        let selector = PourPointSelector::new(&engine, &context);

        let pour = selector.from_location(&dam(None)).unwrap();
        assert_eq!(pour.count(), 1);
        assert_eq!(pour.get(CellIndex::new(3, 3)), Some(1.0));
        assert_eq!(pour.data_window(), Some(GridWindow::new(3, 3, 1, 1)));
    }
}
