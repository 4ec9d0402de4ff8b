//! ESRI D8 flow direction codes.
//!
//! Each cell of a flow direction grid holds a power of two naming the
//! neighbour its water drains into. Offsets are `(row, col)` with rows
//! growing southwards.

use damshed_core::models::{CellIndex, Raster};
use std::collections::{HashSet, VecDeque};

/// D8 codes paired with the neighbour offset they point to
pub const D8_OFFSETS: [(u8, (i64, i64)); 8] = [
    (1, (0, 1)),    // E
    (2, (1, 1)),    // SE
    (4, (1, 0)),    // S
    (8, (1, -1)),   // SW
    (16, (0, -1)),  // W
    (32, (-1, -1)), // NW
    (64, (-1, 0)),  // N
    (128, (-1, 1)), // NE
];

/// Decode a flow direction cell value into the offset of its downstream neighbour.
///
/// Sinks (0), undefined codes and fractional values yield `None`.
pub fn downstream_offset(code: f64) -> Option<(i64, i64)> {
    if code.fract() != 0.0 || !(1.0..=128.0).contains(&code) {
        return None;
    }
    let code = code as u8;
    D8_OFFSETS.iter().find(|(c, _)| *c == code).map(|(_, offset)| *offset)
}

/// Downstream neighbour of a cell, if it drains anywhere
pub fn downstream(flow_direction: &Raster, cell: CellIndex) -> Option<CellIndex> {
    let code = flow_direction.get(cell)?;
    downstream_offset(code).map(|(dr, dc)| cell.offset(dr, dc))
}

/// Neighbours of `cell` whose flow direction points into it
pub fn upstream_neighbours(flow_direction: &Raster, cell: CellIndex) -> Vec<CellIndex> {
    D8_OFFSETS
        .iter()
        .filter_map(|(_, (dr, dc))| {
            let neighbour = cell.offset(*dr, *dc);
            match downstream(flow_direction, neighbour) {
                Some(target) if target == cell => Some(neighbour),
                _ => None,
            }
        })
        .collect()
}

/// Every cell draining into one of the seed cells, seeds included.
///
/// Breadth-first over the reversed flow graph. Seeds outside the flow grid
/// are ignored.
pub fn upstream_cells<I>(flow_direction: &Raster, seeds: I) -> HashSet<CellIndex>
where
    I: IntoIterator<Item = CellIndex>,
{
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();

    for seed in seeds {
        if flow_direction.window.contains(seed) && visited.insert(seed) {
            queue.push_back(seed);
        }
    }

    while let Some(cell) = queue.pop_front() {
        for neighbour in upstream_neighbours(flow_direction, cell) {
            if visited.insert(neighbour) {
                queue.push_back(neighbour);
            }
        }
    }

    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use damshed_core::models::{GridAlignment, GridWindow};

    fn grid() -> GridAlignment {
        GridAlignment::new(0.0, 10.0, 1.0).unwrap()
    }

    #[test]
    fn test_decode_codes() {
        assert_eq!(downstream_offset(1.0), Some((0, 1)));
        assert_eq!(downstream_offset(4.0), Some((1, 0)));
        assert_eq!(downstream_offset(128.0), Some((-1, 1)));
        assert_eq!(downstream_offset(0.0), None);
        assert_eq!(downstream_offset(3.0), None);
        assert_eq!(downstream_offset(255.0), None);
        assert_eq!(downstream_offset(4.5), None);
    }

    #[test]
    fn test_upstream_of_south_flowing_column() {
        // 3x3 block, everything drains south
        let flow = Raster::filled(grid(), GridWindow::new(0, 0, 3, 3), 4.0);
        let cells = upstream_cells(&flow, [CellIndex::new(2, 1)]);

        let mut cells: Vec<_> = cells.into_iter().collect();
        cells.sort();
        assert_eq!(cells, vec![CellIndex::new(0, 1), CellIndex::new(1, 1), CellIndex::new(2, 1)]);
    }

    #[test]
    fn test_converging_flow() {
        // West column flows east, east column flows west, centre column south
        let mut flow = Raster::new(grid(), GridWindow::new(0, 0, 2, 3));
        for row in 0..2 {
            flow.set(CellIndex::new(row, 0), Some(1.0)).unwrap();
            flow.set(CellIndex::new(row, 1), Some(4.0)).unwrap();
            flow.set(CellIndex::new(row, 2), Some(16.0)).unwrap();
        }

        let cells = upstream_cells(&flow, [CellIndex::new(1, 1)]);
        assert_eq!(cells.len(), 6);
    }

    #[test]
    fn test_seed_outside_grid_is_ignored() {
        let flow = Raster::filled(grid(), GridWindow::new(0, 0, 2, 2), 4.0);
        assert!(upstream_cells(&flow, [CellIndex::new(9, 9)]).is_empty());
    }
}
