//! Uniform-cell spatial hash of streamline samples.
//!
//! Cells have side `dsep`, so a separation query at any squared distance up
//! to `dsep²` only needs the 3×3 neighbourhood of the query cell.

use citygen_core::{Bounds, GenError};
use glam::DVec2;

/// Upper bound on the number of cells a grid may allocate.
pub const MAX_CELLS: usize = 1 << 22;

#[derive(Debug, Clone)]
pub struct GridStorage {
    origin: DVec2,
    world_size: DVec2,
    dsep: f64,
    cols: usize,
    rows: usize,
    /// Row-major cells: index `row * cols + col`.
    cells: Vec<Vec<DVec2>>,
    len: usize,
}

impl GridStorage {
    /// Fails when `dsep` is not positive or the world would need more than
    /// [`MAX_CELLS`] cells.
    pub fn new(bounds: Bounds, dsep: f64) -> Result<Self, GenError> {
        let (cols, rows) = Self::dimensions(bounds, dsep)?;
        Ok(Self {
            origin: bounds.origin,
            world_size: bounds.size,
            dsep,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
            len: 0,
        })
    }

    /// Columns and rows a grid over `bounds` would use, without allocating.
    pub fn dimensions(bounds: Bounds, dsep: f64) -> Result<(usize, usize), GenError> {
        if !dsep.is_finite() || dsep <= 0.0 {
            return Err(GenError::InvalidParam {
                name: "dsep".into(),
                reason: format!("must be positive, got {dsep}"),
            });
        }
        let cols = ((bounds.size.x / dsep).ceil() as usize).max(1);
        let rows = ((bounds.size.y / dsep).ceil() as usize).max(1);
        match cols.checked_mul(rows) {
            Some(cells) if cells <= MAX_CELLS => Ok((cols, rows)),
            _ => Err(GenError::InvalidParam {
                name: "dsep".into(),
                reason: format!(
                    "{dsep} is too small for a {}x{} world (limit {MAX_CELLS} cells)",
                    bounds.size.x, bounds.size.y
                ),
            }),
        }
    }

    pub fn dsep(&self) -> f64 {
        self.dsep
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn in_world(&self, p: DVec2) -> bool {
        let v = p - self.origin;
        v.x >= 0.0 && v.y >= 0.0 && v.x < self.world_size.x && v.y < self.world_size.y
    }

    /// Cell of `p`, clamped into the grid.
    fn cell_coords(&self, p: DVec2) -> (usize, usize) {
        let v = (p - self.origin) / self.dsep;
        let clamp = |x: f64, n: usize| {
            if x.is_nan() || x < 0.0 {
                0
            } else {
                (x.floor() as usize).min(n - 1)
            }
        };
        (clamp(v.x, self.cols), clamp(v.y, self.rows))
    }

    /// Inserts `p` without any separation check. Samples outside the world
    /// rectangle are dropped.
    pub fn add_sample(&mut self, p: DVec2) {
        if !self.in_world(p) {
            return;
        }
        let (col, row) = self.cell_coords(p);
        self.cells[row * self.cols + col].push(p);
        self.len += 1;
    }

    pub fn add_polyline(&mut self, points: &[DVec2]) {
        for &p in points {
            self.add_sample(p);
        }
    }

    /// Absorbs every sample of `other`, visiting its cells in row-major order.
    pub fn merge(&mut self, other: &GridStorage) {
        for cell in &other.cells {
            for &p in cell {
                self.add_sample(p);
            }
        }
    }

    /// Cells of the clamped block spanning `lo..=hi`, row-major.
    fn cells_between(&self, lo: DVec2, hi: DVec2) -> impl Iterator<Item = &Vec<DVec2>> + '_ {
        let (c0, r0) = self.cell_coords(lo);
        let (c1, r1) = self.cell_coords(hi);
        (r0..=r1).flat_map(move |r| (c0..=c1).map(move |c| &self.cells[r * self.cols + c]))
    }

    /// True iff no stored sample in the 3×3 neighbourhood of `p` lies within
    /// squared distance `d_sq`. A sample exactly equal to `p` is ignored.
    pub fn is_valid_sample(&self, p: DVec2, d_sq: f64) -> bool {
        let reach = DVec2::splat(self.dsep);
        self.cells_between(p - reach, p + reach)
            .flatten()
            .all(|&s| s == p || s.distance_squared(p) >= d_sq)
    }

    /// Every sample in cells overlapping the square of half-side `distance`
    /// around `p`.
    ///
    /// This is a conservative superset; callers filter by exact distance.
    pub fn nearby_points(&self, p: DVec2, distance: f64) -> Vec<DVec2> {
        let reach = DVec2::splat(distance.max(0.0));
        self.cells_between(p - reach, p + reach).flatten().copied().collect()
    }

    /// All samples in row-major cell order.
    pub fn samples(&self) -> impl Iterator<Item = DVec2> + '_ {
        self.cells.iter().flatten().copied()
    }
}
