//! Cell areas on geographic (lon/lat degree) grids.

use damshed_core::error::Result;
use damshed_core::models::{CellIndex, GridAlignment, GridWindow, Raster};
use geo::GeodesicArea;

const M2_PER_KM2: f64 = 1_000_000.0;

/// Geodesic area of one cell in km²
pub fn cell_area_km2(alignment: &GridAlignment, cell: CellIndex) -> f64 {
    alignment.cell_rect(cell).to_polygon().geodesic_area_unsigned() / M2_PER_KM2
}

/// Pixel area raster (km² per cell) covering a window.
///
/// Cells in one row share the same area, so each row is computed once.
pub fn pixel_area_raster(alignment: &GridAlignment, window: GridWindow) -> Result<Raster> {
    let mut raster = Raster::new(*alignment, window);
    for r in 0..window.rows as i64 {
        let row = window.row + r;
        let area = cell_area_km2(alignment, CellIndex::new(row, window.col));
        for c in 0..window.cols as i64 {
            raster.set(CellIndex::new(row, window.col + c), Some(area))?;
        }
    }
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equatorial_degree_cell() {
        // One degree square at the equator is about 12,309 km² on WGS84
        let grid = GridAlignment::new(0.0, 1.0, 1.0).unwrap();
        let area = cell_area_km2(&grid, CellIndex::new(0, 0));
        assert!((area - 12_309.0).abs() < 25.0, "area was {}", area);
    }

    #[test]
    fn test_area_shrinks_towards_poles() {
        let grid = GridAlignment::new(0.0, 90.0, 1.0).unwrap();
        let near_pole = cell_area_km2(&grid, CellIndex::new(0, 0));
        let near_equator = cell_area_km2(&grid, CellIndex::new(89, 0));
        assert!(near_pole < near_equator / 10.0);
    }

    #[test]
    fn test_pixel_area_raster_rows() {
        let grid = GridAlignment::new(10.0, 50.0, 0.5).unwrap();
        let raster = pixel_area_raster(&grid, GridWindow::new(0, 0, 2, 3)).unwrap();
        assert_eq!(raster.count(), 6);

        let a = raster.get(CellIndex::new(0, 0)).unwrap();
        let b = raster.get(CellIndex::new(0, 2)).unwrap();
        let c = raster.get(CellIndex::new(1, 0)).unwrap();
        assert!((a - b).abs() < 1e-9);
        assert!(c > a);
    }
}
