//! Vector to grid conversion helpers.

use damshed_core::error::{DamshedError, Result};
use damshed_core::models::{CellIndex, GridAlignment, GridWindow, Raster};
use geo::{BoundingRect, Intersects, LineString, Point, Polygon};
use std::collections::BTreeSet;

/// Cells on the 8-connected path between two cells (Bresenham), both ends included
pub fn cell_path(from: CellIndex, to: CellIndex) -> Vec<CellIndex> {
    let mut cells = Vec::new();
    let (mut r, mut c) = (from.row, from.col);
    let dr = (to.row - from.row).abs();
    let dc = (to.col - from.col).abs();
    let step_r = if to.row >= from.row { 1 } else { -1 };
    let step_c = if to.col >= from.col { 1 } else { -1 };
    let mut err = dc - dr;

    loop {
        cells.push(CellIndex::new(r, c));
        if r == to.row && c == to.col {
            break;
        }
        let e2 = 2 * err;
        if e2 > -dr {
            err -= dr;
            c += step_c;
        }
        if e2 < dc {
            err += dc;
            r += step_r;
        }
    }

    cells
}

/// Cells touched by a polyline, joining consecutive vertices with 8-connected paths
pub fn line_cells(alignment: &GridAlignment, line: &LineString<f64>) -> Result<BTreeSet<CellIndex>> {
    if line.0.is_empty() {
        return Err(DamshedError::engine("rasterize_polyline", "polyline has no vertices"));
    }
    if line.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(DamshedError::engine("rasterize_polyline", "polyline has non-finite coordinates"));
    }

    let vertices: Vec<CellIndex> = line.0.iter().map(|c| alignment.cell_of(c.x, c.y)).collect();
    let mut cells = BTreeSet::new();
    cells.insert(vertices[0]);
    for pair in vertices.windows(2) {
        cells.extend(cell_path(pair[0], pair[1]));
    }
    Ok(cells)
}

/// Cells whose centre lies inside or on the boundary of a polygon
pub fn polygon_cells(alignment: &GridAlignment, polygon: &Polygon<f64>) -> Vec<CellIndex> {
    let Some(rect) = polygon.bounding_rect() else {
        return Vec::new();
    };
    let window = alignment.window_covering(&rect);
    window
        .cells()
        .filter(|cell| polygon.intersects(&Point::from(alignment.cell_center(*cell))))
        .collect()
}

/// Raster cropped to `cells`, each holding `value`
pub fn raster_from_cells<I>(alignment: &GridAlignment, cells: I, value: f64) -> Result<Raster>
where
    I: IntoIterator<Item = CellIndex> + Clone,
{
    let window = GridWindow::bounding(cells.clone())
        .ok_or_else(|| DamshedError::EmptyRaster { name: "rasterized geometry".to_string() })?;
    let mut raster = Raster::new(*alignment, window);
    for cell in cells {
        raster.set(cell, Some(value))?;
    }
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridAlignment {
        GridAlignment::new(0.0, 10.0, 1.0).unwrap()
    }

    #[test]
    fn test_cell_path_is_eight_connected() {
        let path = cell_path(CellIndex::new(0, 0), CellIndex::new(2, 5));
        assert_eq!(path.first(), Some(&CellIndex::new(0, 0)));
        assert_eq!(path.last(), Some(&CellIndex::new(2, 5)));
        for pair in path.windows(2) {
            assert!((pair[1].row - pair[0].row).abs() <= 1);
            assert!((pair[1].col - pair[0].col).abs() <= 1);
        }
        assert_eq!(path.len(), 6);
    }

    #[test]
    fn test_horizontal_line_cells() {
        let line = LineString::from(vec![(1.5, 6.5), (5.5, 6.5)]);
        let cells: Vec<_> = line_cells(&grid(), &line).unwrap().into_iter().collect();
        let expected: Vec<_> = (1..=5).map(|c| CellIndex::new(3, c)).collect();
        assert_eq!(cells, expected);
    }

    #[test]
    fn test_multi_vertex_line() {
        let line = LineString::from(vec![(0.5, 9.5), (2.5, 9.5), (2.5, 7.5)]);
        let cells = line_cells(&grid(), &line).unwrap();
        assert_eq!(cells.len(), 5);
        assert!(cells.contains(&CellIndex::new(2, 2)));
    }

    #[test]
    fn test_line_rejects_bad_coordinates() {
        assert!(line_cells(&grid(), &LineString::new(vec![])).is_err());
        let line = LineString::from(vec![(f64::NAN, 1.0), (1.0, 1.0)]);
        assert!(line_cells(&grid(), &line).is_err());
    }

    #[test]
    fn test_polygon_cells_by_centre() {
        let square = Polygon::new(
            LineString::from(vec![(1.0, 7.0), (3.0, 7.0), (3.0, 9.0), (1.0, 9.0), (1.0, 7.0)]),
            vec![],
        );
        let cells = polygon_cells(&grid(), &square);
        assert_eq!(cells.len(), 4);
        assert!(cells.contains(&CellIndex::new(1, 1)));
        assert!(cells.contains(&CellIndex::new(2, 2)));
    }

    #[test]
    fn test_raster_from_cells() {
        let cells = vec![CellIndex::new(3, 1), CellIndex::new(4, 3)];
        let raster = raster_from_cells(&grid(), cells, 1.0).unwrap();
        assert_eq!(raster.window, GridWindow::new(3, 1, 2, 3));
        assert_eq!(raster.count(), 2);

        assert!(raster_from_cells(&grid(), Vec::new(), 1.0).is_err());
    }
}
