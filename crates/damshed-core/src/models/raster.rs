//! Aligned raster model.
//!
//! Every raster in a run lives on one [`GridAlignment`] taken from the flow
//! direction grid. A raster only stores the rectangular [`GridWindow`] of cells
//! it covers, so a catchment mask for a small basin does not carry the global
//! grid around with it. Cell addresses ([`CellIndex`]) are global to the
//! alignment, which makes rasters with different windows directly comparable.

use geo::{coord, Coord, Rect};
use serde::{Deserialize, Serialize};

use crate::error::{DamshedError, Result};

const CELL_SIZE_TOLERANCE: f64 = 1e-9;
const SNAP_TOLERANCE: f64 = 1e-6;

/// Snap grid shared by every raster of a run: top-left origin and square cell size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridAlignment {
    pub origin_x: f64,
    pub origin_y: f64,
    pub cell_size: f64,
}

impl GridAlignment {
    pub fn new(origin_x: f64, origin_y: f64, cell_size: f64) -> Result<Self> {
        if !origin_x.is_finite() || !origin_y.is_finite() {
            return Err(DamshedError::AlignmentMismatch {
                reason: format!("origin ({}, {}) must be finite", origin_x, origin_y),
            });
        }
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(DamshedError::AlignmentMismatch {
                reason: format!("cell size {} must be positive", cell_size),
            });
        }
        Ok(Self { origin_x, origin_y, cell_size })
    }

    /// Global 15 arc-second grid anchored at (-180, 90)
    pub fn hydrosheds_15s() -> Self {
        Self { origin_x: -180.0, origin_y: 90.0, cell_size: 1.0 / 240.0 }
    }

    /// Cell containing a coordinate
    pub fn cell_of(&self, x: f64, y: f64) -> CellIndex {
        CellIndex {
            row: ((self.origin_y - y) / self.cell_size).floor() as i64,
            col: ((x - self.origin_x) / self.cell_size).floor() as i64,
        }
    }

    pub fn cell_center(&self, cell: CellIndex) -> Coord<f64> {
        coord! {
            x: self.origin_x + (cell.col as f64 + 0.5) * self.cell_size,
            y: self.origin_y - (cell.row as f64 + 0.5) * self.cell_size,
        }
    }

    pub fn cell_rect(&self, cell: CellIndex) -> Rect<f64> {
        self.window_rect(&GridWindow::new(cell.row, cell.col, 1, 1))
    }

    /// Map extent of a window
    pub fn window_rect(&self, window: &GridWindow) -> Rect<f64> {
        let min_x = self.origin_x + window.col as f64 * self.cell_size;
        let max_x = self.origin_x + window.end_col() as f64 * self.cell_size;
        let max_y = self.origin_y - window.row as f64 * self.cell_size;
        let min_y = self.origin_y - window.end_row() as f64 * self.cell_size;
        Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y })
    }

    /// Smallest window whose cells cover a map rectangle
    pub fn window_covering(&self, rect: &Rect<f64>) -> GridWindow {
        let min = rect.min();
        let max = rect.max();

        let col0 = ((min.x - self.origin_x) / self.cell_size + SNAP_TOLERANCE).floor() as i64;
        let col1 = ((max.x - self.origin_x) / self.cell_size - SNAP_TOLERANCE).ceil() as i64;
        let row0 = ((self.origin_y - max.y) / self.cell_size + SNAP_TOLERANCE).floor() as i64;
        let row1 = ((self.origin_y - min.y) / self.cell_size - SNAP_TOLERANCE).ceil() as i64;

        let cols = (col1 - col0).max(1) as usize;
        let rows = (row1 - row0).max(1) as usize;
        GridWindow::new(row0, col0, rows, cols)
    }

    /// Row/column shift that maps cells of `other` onto this alignment.
    ///
    /// Returns `None` when the two grids do not snap: different cell sizes or
    /// origins that are not a whole number of cells apart.
    pub fn offset_from(&self, other: &GridAlignment) -> Option<(i64, i64)> {
        let size_delta = (self.cell_size - other.cell_size).abs();
        if size_delta > CELL_SIZE_TOLERANCE * self.cell_size {
            return None;
        }

        let cols = (other.origin_x - self.origin_x) / self.cell_size;
        let rows = (self.origin_y - other.origin_y) / self.cell_size;
        if (cols - cols.round()).abs() > SNAP_TOLERANCE || (rows - rows.round()).abs() > SNAP_TOLERANCE
        {
            return None;
        }

        Some((rows.round() as i64, cols.round() as i64))
    }

    /// True when both alignments describe the very same cells
    pub fn same_grid(&self, other: &GridAlignment) -> bool {
        self.offset_from(other) == Some((0, 0))
    }
}

/// Global cell address on an alignment; rows grow southwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellIndex {
    pub row: i64,
    pub col: i64,
}

impl CellIndex {
    pub fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }

    pub fn offset(&self, d_row: i64, d_col: i64) -> Self {
        Self { row: self.row + d_row, col: self.col + d_col }
    }
}

/// Rectangular block of cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridWindow {
    pub row: i64,
    pub col: i64,
    pub rows: usize,
    pub cols: usize,
}

impl GridWindow {
    pub fn new(row: i64, col: i64, rows: usize, cols: usize) -> Self {
        Self { row, col, rows, cols }
    }

    /// Exclusive end row
    pub fn end_row(&self) -> i64 {
        self.row + self.rows as i64
    }

    /// Exclusive end column
    pub fn end_col(&self) -> i64 {
        self.col + self.cols as i64
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, cell: CellIndex) -> bool {
        cell.row >= self.row
            && cell.row < self.end_row()
            && cell.col >= self.col
            && cell.col < self.end_col()
    }

    /// Row-major position of a cell inside the window
    pub fn index_of(&self, cell: CellIndex) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let r = (cell.row - self.row) as usize;
        let c = (cell.col - self.col) as usize;
        Some(r * self.cols + c)
    }

    pub fn cell_at(&self, index: usize) -> CellIndex {
        CellIndex {
            row: self.row + (index / self.cols) as i64,
            col: self.col + (index % self.cols) as i64,
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = CellIndex> + '_ {
        (0..self.len()).map(move |i| self.cell_at(i))
    }

    pub fn intersection(&self, other: &GridWindow) -> Option<GridWindow> {
        let row0 = self.row.max(other.row);
        let col0 = self.col.max(other.col);
        let row1 = self.end_row().min(other.end_row());
        let col1 = self.end_col().min(other.end_col());
        if row1 <= row0 || col1 <= col0 {
            return None;
        }
        Some(GridWindow::new(row0, col0, (row1 - row0) as usize, (col1 - col0) as usize))
    }

    pub fn union(&self, other: &GridWindow) -> GridWindow {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let row0 = self.row.min(other.row);
        let col0 = self.col.min(other.col);
        let row1 = self.end_row().max(other.end_row());
        let col1 = self.end_col().max(other.end_col());
        GridWindow::new(row0, col0, (row1 - row0) as usize, (col1 - col0) as usize)
    }

    /// Tightest window around a set of cells
    pub fn bounding<I: IntoIterator<Item = CellIndex>>(cells: I) -> Option<GridWindow> {
        let mut iter = cells.into_iter();
        let first = iter.next()?;
        let (mut r0, mut c0, mut r1, mut c1) = (first.row, first.col, first.row, first.col);
        for cell in iter {
            r0 = r0.min(cell.row);
            c0 = c0.min(cell.col);
            r1 = r1.max(cell.row);
            c1 = c1.max(cell.col);
        }
        Some(GridWindow::new(r0, c0, (r1 - r0 + 1) as usize, (c1 - c0 + 1) as usize))
    }
}

/// Raster block on an alignment. `None` cells are NoData.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raster {
    pub alignment: GridAlignment,
    pub window: GridWindow,
    values: Vec<Option<f64>>,
}

impl Raster {
    /// Raster with every cell set to NoData
    pub fn new(alignment: GridAlignment, window: GridWindow) -> Self {
        Self { alignment, window, values: vec![None; window.len()] }
    }

    /// Raster with every cell set to `value`
    pub fn filled(alignment: GridAlignment, window: GridWindow, value: f64) -> Self {
        Self { alignment, window, values: vec![Some(value); window.len()] }
    }

    pub fn from_values(
        alignment: GridAlignment,
        window: GridWindow,
        values: Vec<Option<f64>>,
    ) -> Result<Self> {
        let raster = Self { alignment, window, values };
        raster.validate()?;
        Ok(raster.normalized())
    }

    /// Check internal consistency, e.g. after deserializing from disk
    pub fn validate(&self) -> Result<()> {
        GridAlignment::new(self.alignment.origin_x, self.alignment.origin_y, self.alignment.cell_size)?;
        if self.values.len() != self.window.len() {
            return Err(DamshedError::Serialization(format!(
                "raster holds {} values for a {}x{} window",
                self.values.len(),
                self.window.rows,
                self.window.cols
            )));
        }
        Ok(())
    }

    /// Treat non-finite values as NoData
    pub fn normalized(mut self) -> Self {
        for v in self.values.iter_mut() {
            if matches!(v, Some(x) if !x.is_finite()) {
                *v = None;
            }
        }
        self
    }

    pub fn get(&self, cell: CellIndex) -> Option<f64> {
        self.window.index_of(cell).and_then(|i| self.values[i])
    }

    pub fn set(&mut self, cell: CellIndex, value: Option<f64>) -> Result<()> {
        let index = self
            .window
            .index_of(cell)
            .ok_or(DamshedError::OutOfWindow { row: cell.row, col: cell.col })?;
        self.values[index] = value.filter(|v| v.is_finite());
        Ok(())
    }

    /// Populated cells with their values, in row-major order
    pub fn populated(&self) -> impl Iterator<Item = (CellIndex, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(move |(i, v)| v.map(|v| (self.window.cell_at(i), v)))
    }

    pub fn count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| v.is_none())
    }

    /// Tightest window around the populated cells
    pub fn data_window(&self) -> Option<GridWindow> {
        GridWindow::bounding(self.populated().map(|(cell, _)| cell))
    }

    /// Copy of the raster restricted to (or padded out to) another window
    pub fn crop(&self, window: GridWindow) -> Raster {
        let mut out = Raster::new(self.alignment, window);
        if let Some(overlap) = self.window.intersection(&window) {
            for cell in overlap.cells() {
                if let (Some(src), Some(dst)) = (self.window.index_of(cell), window.index_of(cell)) {
                    out.values[dst] = self.values[src];
                }
            }
        }
        out
    }

    /// Crop to the populated cells; an empty raster keeps a zero-sized window
    pub fn trimmed(&self) -> Raster {
        match self.data_window() {
            Some(window) => self.crop(window),
            None => Raster::new(self.alignment, GridWindow::new(self.window.row, self.window.col, 0, 0)),
        }
    }

    /// Map extent of the raster window
    pub fn extent(&self) -> Rect<f64> {
        self.alignment.window_rect(&self.window)
    }

    /// Keep the values of `self` where `condition` holds for the cell's value in `mask`
    pub fn masked_by<F>(&self, mask: &Raster, condition: F) -> Result<Raster>
    where
        F: Fn(f64) -> bool,
    {
        mask.ensure_grid(&self.alignment, "condition raster")?;
        let mut out = Raster::new(self.alignment, self.window);
        for (i, value) in self.values.iter().enumerate() {
            let cell = self.window.cell_at(i);
            if let (Some(v), Some(m)) = (value, mask.get(cell)) {
                if condition(m) {
                    out.values[i] = Some(*v);
                }
            }
        }
        Ok(out)
    }

    /// Fail unless the raster sits on exactly the given alignment
    pub fn ensure_grid(&self, alignment: &GridAlignment, what: &str) -> Result<()> {
        if self.alignment.same_grid(alignment) {
            Ok(())
        } else {
            Err(DamshedError::AlignmentMismatch {
                reason: format!(
                    "{} uses origin ({}, {}) / cell {} but the run grid is origin ({}, {}) / cell {}",
                    what,
                    self.alignment.origin_x,
                    self.alignment.origin_y,
                    self.alignment.cell_size,
                    alignment.origin_x,
                    alignment.origin_y,
                    alignment.cell_size
                ),
            })
        }
    }

    /// Re-express the raster on a snapping alignment with a different origin
    pub fn rebase(mut self, target: &GridAlignment) -> Result<Raster> {
        let (d_row, d_col) = target.offset_from(&self.alignment).ok_or_else(|| {
            DamshedError::AlignmentMismatch {
                reason: format!(
                    "grid with origin ({}, {}) and cell {} does not snap to origin ({}, {}) and cell {}",
                    self.alignment.origin_x,
                    self.alignment.origin_y,
                    self.alignment.cell_size,
                    target.origin_x,
                    target.origin_y,
                    target.cell_size
                ),
            }
        })?;
        self.window.row += d_row;
        self.window.col += d_col;
        self.alignment = *target;
        Ok(self)
    }
}
