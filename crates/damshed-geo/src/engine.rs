//! In-memory raster engine over aligned grids.

use damshed_core::error::{DamshedError, Result};
use damshed_core::models::{
    AttributePredicate, CellIndex, GridAlignment, GridWindow, Raster, VectorFeature, VectorLayer,
};
use damshed_core::ports::{FocalOp, FocalWindow, RasterEngine, ZonalOp};
use geo::{BoundingRect, Geometry, LineString, Point, Polygon};

use crate::flow;
use crate::rasterize::{line_cells, polygon_cells, raster_from_cells};
use crate::validation::validate_geometry;

/// Reference [`RasterEngine`] that works on [`Raster`] blocks in memory
#[derive(Debug, Clone, Copy, Default)]
pub struct GridEngine;

impl GridEngine {
    pub fn new() -> Self {
        Self
    }
}

impl RasterEngine for GridEngine {
    fn watershed(&self, flow_direction: &Raster, pour_point: &Raster) -> Result<Raster> {
        pour_point.ensure_grid(&flow_direction.alignment, "pour point")?;

        let seeds: Vec<CellIndex> = pour_point.populated().map(|(cell, _)| cell).collect();
        if seeds.is_empty() {
            return Err(DamshedError::EmptyRaster { name: "pour point".to_string() });
        }

        let cells = flow::upstream_cells(flow_direction, seeds);
        if cells.is_empty() {
            return Err(DamshedError::engine(
                "watershed",
                "pour point lies outside the flow direction grid",
            ));
        }

        let mut cells: Vec<CellIndex> = cells.into_iter().collect();
        cells.sort();
        raster_from_cells(&flow_direction.alignment, cells, 1.0)
    }

    fn rasterize_polyline(
        &self,
        line: &LineString<f64>,
        value: f64,
        alignment: &GridAlignment,
    ) -> Result<Raster> {
        let cells = line_cells(alignment, line)?;
        raster_from_cells(alignment, cells, value)
    }

    fn rasterize_point(
        &self,
        point: &Point<f64>,
        value: f64,
        alignment: &GridAlignment,
    ) -> Result<Raster> {
        if !point.x().is_finite() || !point.y().is_finite() {
            return Err(DamshedError::engine("rasterize_point", "point has non-finite coordinates"));
        }
        let cell = alignment.cell_of(point.x(), point.y());
        raster_from_cells(alignment, [cell], value)
    }

    fn rasterize_polygons(
        &self,
        layer: &VectorLayer,
        field: &str,
        alignment: &GridAlignment,
    ) -> Result<Raster> {
        let mut burned: Vec<(Vec<CellIndex>, f64)> = Vec::new();

        for feature in &layer.features {
            let Some(value) = feature.number(field).filter(|v| v.is_finite()) else {
                tracing::debug!(
                    layer = %layer.name,
                    feature = %feature.label(),
                    field,
                    "Skipping feature without value"
                );
                continue;
            };

            let polygons: Vec<&Polygon<f64>> = match &feature.geometry {
                Some(Geometry::Polygon(p)) => vec![p],
                Some(Geometry::MultiPolygon(mp)) => mp.0.iter().collect(),
                _ => continue,
            };

            let mut cells = Vec::new();
            for polygon in polygons {
                let validation = validate_geometry(&Geometry::Polygon(polygon.clone()));
                if !validation.is_valid {
                    tracing::warn!(
                        layer = %layer.name,
                        feature = %feature.label(),
                        "Skipping invalid polygon: {}",
                        validation.summary()
                    );
                    continue;
                }
                cells.extend(polygon_cells(alignment, polygon));
            }
            if !cells.is_empty() {
                burned.push((cells, value));
            }
        }

        let window = burned
            .iter()
            .filter_map(|(cells, _)| GridWindow::bounding(cells.iter().copied()))
            .reduce(|a, b| a.union(&b))
            .ok_or_else(|| DamshedError::EmptyRaster { name: field.to_string() })?;

        // A cell shared by several polygons keeps the first value written
        let mut raster = Raster::new(*alignment, window);
        for (cells, value) in burned {
            for cell in cells {
                if raster.get(cell).is_none() {
                    raster.set(cell, Some(value))?;
                }
            }
        }
        Ok(raster)
    }

    fn focal_statistic(&self, raster: &Raster, window: FocalWindow, op: FocalOp) -> Result<Raster> {
        if window.width == 0 || window.height == 0 || window.width % 2 == 0 || window.height % 2 == 0
        {
            return Err(DamshedError::engine(
                "focal_statistic",
                format!("window {}x{} must have odd, non-zero sides", window.width, window.height),
            ));
        }

        let half_rows = (window.height / 2) as i64;
        let half_cols = (window.width / 2) as i64;
        let mut out = Raster::new(raster.alignment, raster.window);

        for cell in raster.window.cells() {
            let mut values = Vec::new();
            for dr in -half_rows..=half_rows {
                for dc in -half_cols..=half_cols {
                    if let Some(v) = raster.get(cell.offset(dr, dc)) {
                        values.push(v);
                    }
                }
            }
            if values.is_empty() {
                continue;
            }
            let result = match op {
                FocalOp::Sum => values.iter().sum::<f64>(),
                FocalOp::Mean => values.iter().sum::<f64>() / values.len() as f64,
                FocalOp::Minimum => values.iter().copied().fold(f64::INFINITY, f64::min),
                FocalOp::Maximum => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };
            out.set(cell, Some(result))?;
        }

        Ok(out)
    }

    fn zonal_statistic(
        &self,
        zones: &Raster,
        values: &Raster,
        op: ZonalOp,
        extent: Option<&Polygon<f64>>,
    ) -> Result<f64> {
        values.ensure_grid(&zones.alignment, "value raster")?;

        let window = match extent.and_then(|polygon| polygon.bounding_rect()) {
            Some(rect) => zones
                .window
                .intersection(&zones.alignment.window_covering(&rect))
                .ok_or(DamshedError::NoOverlap)?,
            None => zones.window,
        };

        let samples: Vec<f64> = window
            .cells()
            .filter(|cell| zones.get(*cell).is_some())
            .filter_map(|cell| values.get(cell))
            .collect();

        if samples.is_empty() {
            return Err(DamshedError::NoOverlap);
        }

        let result = match op {
            ZonalOp::Sum => samples.iter().sum::<f64>(),
            ZonalOp::Mean => samples.iter().sum::<f64>() / samples.len() as f64,
            ZonalOp::Minimum => samples.iter().copied().fold(f64::INFINITY, f64::min),
            ZonalOp::Maximum => samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };

        if !result.is_finite() {
            return Err(DamshedError::engine("zonal_statistic", "result is not finite"));
        }
        Ok(result)
    }

    fn raster_to_polygon(&self, raster: &Raster) -> Result<Polygon<f64>> {
        let window = raster
            .data_window()
            .ok_or_else(|| DamshedError::EmptyRaster { name: "catchment".to_string() })?;
        Ok(raster.alignment.window_rect(&window).to_polygon())
    }

    fn select_by_attribute<'a>(
        &self,
        layer: &'a VectorLayer,
        predicate: &AttributePredicate,
    ) -> Result<Vec<&'a VectorFeature>> {
        Ok(layer.features.iter().filter(|f| predicate.matches(f)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::BoundingRect;
    use serde_json::json;

    fn grid() -> GridAlignment {
        GridAlignment::new(0.0, 10.0, 1.0).unwrap()
    }

    fn feature(props: serde_json::Value, geometry: Option<Geometry<f64>>) -> VectorFeature {
        VectorFeature {
            id: None,
            geometry,
            properties: props.as_object().cloned().unwrap_or_default(),
        }
    }

    fn square(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (x0, y0),
                (x0 + size, y0),
                (x0 + size, y0 + size),
                (x0, y0 + size),
                (x0, y0),
            ]),
            vec![],
        )
    }

    #[test]
    fn test_watershed_south_flow() {
        let engine = GridEngine::new();
        let flow = Raster::filled(grid(), GridWindow::new(0, 0, 7, 7), 4.0);
        let pour = raster_from_cells(&grid(), [CellIndex::new(3, 3)], 1.0).unwrap();

        let catchment = engine.watershed(&flow, &pour).unwrap();
        assert_eq!(catchment.count(), 4);
        assert_eq!(catchment.window, GridWindow::new(0, 3, 4, 1));
        assert_eq!(catchment.get(CellIndex::new(0, 3)), Some(1.0));
        assert_eq!(catchment.get(CellIndex::new(4, 3)), None);
    }

    #[test]
    fn test_watershed_rejects_empty_or_misaligned_pour_point() {
        let engine = GridEngine::new();
        let flow = Raster::filled(grid(), GridWindow::new(0, 0, 3, 3), 4.0);

        let empty = Raster::new(grid(), GridWindow::new(0, 0, 1, 1));
        assert!(matches!(engine.watershed(&flow, &empty), Err(DamshedError::EmptyRaster { .. })));

        let shifted = GridAlignment::new(0.5, 10.0, 1.0).unwrap();
        let pour = Raster::filled(shifted, GridWindow::new(0, 0, 1, 1), 1.0);
        assert!(matches!(
            engine.watershed(&flow, &pour),
            Err(DamshedError::AlignmentMismatch { .. })
        ));

        let outside = raster_from_cells(&grid(), [CellIndex::new(8, 8)], 1.0).unwrap();
        assert!(engine.watershed(&flow, &outside).is_err());
    }

    #[test]
    fn test_focal_sum_marks_interior_cells() {
        let engine = GridEngine::new();
        let line = LineString::from(vec![(1.5, 6.5), (5.5, 6.5)]);
        let reach = engine.rasterize_polyline(&line, 1.0, &grid()).unwrap();

        let sums = engine
            .focal_statistic(&reach, FocalWindow::rectangle(3, 3), FocalOp::Sum)
            .unwrap();
        assert_eq!(sums.get(CellIndex::new(3, 1)), Some(2.0));
        assert_eq!(sums.get(CellIndex::new(3, 3)), Some(3.0));
        assert_eq!(sums.get(CellIndex::new(3, 5)), Some(2.0));
    }

    #[test]
    fn test_focal_rejects_even_window() {
        let engine = GridEngine::new();
        let raster = Raster::filled(grid(), GridWindow::new(0, 0, 2, 2), 1.0);
        assert!(engine
            .focal_statistic(&raster, FocalWindow::rectangle(2, 3), FocalOp::Sum)
            .is_err());
    }

    #[test]
    fn test_zonal_statistics() {
        let engine = GridEngine::new();
        let zones = Raster::filled(grid(), GridWindow::new(0, 0, 2, 2), 1.0);
        let mut values = Raster::new(grid(), GridWindow::new(0, 0, 2, 3));
        values.set(CellIndex::new(0, 0), Some(2.0)).unwrap();
        values.set(CellIndex::new(0, 1), Some(4.0)).unwrap();
        values.set(CellIndex::new(1, 2), Some(100.0)).unwrap();

        assert_eq!(engine.zonal_statistic(&zones, &values, ZonalOp::Mean, None).unwrap(), 3.0);
        assert_eq!(engine.zonal_statistic(&zones, &values, ZonalOp::Sum, None).unwrap(), 6.0);
        assert_eq!(engine.zonal_statistic(&zones, &values, ZonalOp::Minimum, None).unwrap(), 2.0);
        assert_eq!(engine.zonal_statistic(&zones, &values, ZonalOp::Maximum, None).unwrap(), 4.0);
    }

    #[test]
    fn test_zonal_respects_extent_and_overlap() {
        let engine = GridEngine::new();
        let zones = Raster::filled(grid(), GridWindow::new(0, 0, 1, 2), 1.0);
        let values = Raster::filled(grid(), GridWindow::new(0, 0, 1, 2), 5.0);

        // Only the first cell (0..1, 9..10) lies inside
        let extent = square(0.0, 9.0, 1.0);
        assert_eq!(
            engine.zonal_statistic(&zones, &values, ZonalOp::Sum, Some(&extent)).unwrap(),
            5.0
        );

        let elsewhere = Raster::filled(grid(), GridWindow::new(5, 5, 1, 1), 5.0);
        assert!(matches!(
            engine.zonal_statistic(&zones, &elsewhere, ZonalOp::Mean, None),
            Err(DamshedError::NoOverlap)
        ));
    }

    #[test]
    fn test_zonal_extent_narrows_window() {
        let engine = GridEngine::new();
        let zones = Raster::filled(grid(), GridWindow::new(0, 0, 1, 4), 1.0);
        let mut values = Raster::new(grid(), GridWindow::new(0, 0, 1, 4));
        for col in 0..4 {
            values.set(CellIndex::new(0, col), Some(col as f64 + 1.0)).unwrap();
        }

        // Triangle whose bounding box spans columns 1 and 2
        let triangle = Polygon::new(
            LineString::from(vec![(1.0, 9.0), (3.0, 9.0), (2.0, 10.0), (1.0, 9.0)]),
            vec![],
        );
        assert_eq!(
            engine.zonal_statistic(&zones, &values, ZonalOp::Sum, Some(&triangle)).unwrap(),
            5.0
        );

        let outside = square(6.0, 3.0, 1.0);
        assert!(matches!(
            engine.zonal_statistic(&zones, &values, ZonalOp::Sum, Some(&outside)),
            Err(DamshedError::NoOverlap)
        ));
    }

    #[test]
    fn test_raster_to_polygon_bounds_data() {
        let engine = GridEngine::new();
        let mut raster = Raster::new(grid(), GridWindow::new(0, 0, 4, 4));
        raster.set(CellIndex::new(1, 1), Some(1.0)).unwrap();
        raster.set(CellIndex::new(2, 2), Some(1.0)).unwrap();

        let polygon = engine.raster_to_polygon(&raster).unwrap();
        let bounds = polygon.bounding_rect().unwrap();
        assert_eq!(bounds, geo::Rect::new((1.0, 7.0), (3.0, 9.0)));

        let empty = Raster::new(grid(), GridWindow::new(0, 0, 1, 1));
        assert!(engine.raster_to_polygon(&empty).is_err());
    }

    #[test]
    fn test_rasterize_polygons_first_feature_wins() {
        let engine = GridEngine::new();
        let layer = VectorLayer::new(
            "basins",
            vec![
                feature(json!({"RC1_O3": 1.5}), Some(Geometry::Polygon(square(0.0, 8.0, 2.0)))),
                feature(json!({"RC1_O3": 9.0}), Some(Geometry::Polygon(square(1.0, 8.0, 2.0)))),
                feature(json!({"OTHER": 1.0}), Some(Geometry::Polygon(square(5.0, 5.0, 1.0)))),
            ],
        );

        let raster = engine.rasterize_polygons(&layer, "RC1_O3", &grid()).unwrap();
        assert_eq!(raster.get(CellIndex::new(1, 0)), Some(1.5));
        assert_eq!(raster.get(CellIndex::new(1, 1)), Some(1.5));
        assert_eq!(raster.get(CellIndex::new(1, 2)), Some(9.0));
        assert_eq!(raster.count(), 6);

        assert!(matches!(
            engine.rasterize_polygons(&layer, "MISSING", &grid()),
            Err(DamshedError::EmptyRaster { .. })
        ));
    }

    #[test]
    fn test_select_by_attribute() {
        let engine = GridEngine::new();
        let layer = VectorLayer::new(
            "reaches",
            vec![
                feature(json!({"HYRIV_ID": 7}), None),
                feature(json!({"HYRIV_ID": 8}), None),
            ],
        );

        let selected = engine
            .select_by_attribute(&layer, &AttributePredicate::equals("HYRIV_ID", 7))
            .unwrap();
        assert_eq!(selected.len(), 1);
    }
}
