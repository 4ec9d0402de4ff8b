use geo::{LineString, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{AttributePredicate, GridAlignment, Raster, VectorFeature, VectorLayer};

/// Neighbourhood for focal statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocalWindow {
    pub width: usize,
    pub height: usize,
}

impl FocalWindow {
    /// Rectangle of `width` x `height` cells centred on the target cell
    pub fn rectangle(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

/// Focal statistic operation; NoData neighbours are ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocalOp {
    Sum,
    Mean,
    Minimum,
    Maximum,
}

/// Zonal statistic operation over the populated cells of a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZonalOp {
    Sum,
    Mean,
    Minimum,
    Maximum,
}

/// Grid algebra primitives consumed by the pipeline.
///
/// Every operation works on the run alignment; implementations must reject
/// inputs that do not sit on it rather than resample them.
pub trait RasterEngine {
    /// Mask of all cells whose flow path drains into a populated pour point cell
    fn watershed(&self, flow_direction: &Raster, pour_point: &Raster) -> Result<Raster>;

    /// Burn a polyline into the grid with a constant value
    fn rasterize_polyline(
        &self,
        line: &LineString<f64>,
        value: f64,
        alignment: &GridAlignment,
    ) -> Result<Raster>;

    /// Burn a single point into the cell containing it
    fn rasterize_point(&self, point: &Point<f64>, value: f64, alignment: &GridAlignment)
        -> Result<Raster>;

    /// Convert polygon features to a grid using a numeric attribute
    fn rasterize_polygons(
        &self,
        layer: &VectorLayer,
        field: &str,
        alignment: &GridAlignment,
    ) -> Result<Raster>;

    fn focal_statistic(&self, raster: &Raster, window: FocalWindow, op: FocalOp) -> Result<Raster>;

    /// Aggregate `values` over the populated cells of `zones`.
    ///
    /// An `extent` limits the cells read to the window covering its bounding
    /// box; cells of `zones` outside that window are never visited.
    fn zonal_statistic(
        &self,
        zones: &Raster,
        values: &Raster,
        op: ZonalOp,
        extent: Option<&Polygon<f64>>,
    ) -> Result<f64>;

    /// Polygon outlining the populated part of a raster
    fn raster_to_polygon(&self, raster: &Raster) -> Result<Polygon<f64>>;

    /// Features of a layer matching an attribute predicate
    fn select_by_attribute<'a>(
        &self,
        layer: &'a VectorLayer,
        predicate: &AttributePredicate,
    ) -> Result<Vec<&'a VectorFeature>>;
}
