use crate::error::FdfdError;

/// A grid axis. `X` is the first (row) index, `Y` the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// The rectangular computational grid.
///
/// Cells are flattened row-major: cell `(i, j)` maps to unknown `i * ny + j`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub nx: usize,
    pub ny: usize,
    /// Cell size along both axes, in unit lengths.
    pub dl: f64,
}

impl Grid {
    pub fn new(nx: usize, ny: usize, dl: f64) -> Result<Self, FdfdError> {
        if nx == 0 || ny == 0 {
            return Err(FdfdError::InvalidParameter(format!(
                "grid must be non-empty, got {nx} x {ny}"
            )));
        }
        if !(dl > 0.0) || !dl.is_finite() {
            return Err(FdfdError::InvalidParameter(format!(
                "cell size must be positive and finite, got {dl}"
            )));
        }
        Ok(Self { nx, ny, dl })
    }

    /// Number of unknowns per field component.
    pub fn n_cells(&self) -> usize {
        self.nx * self.ny
    }

    /// Flattened index of cell `(i, j)`.
    #[inline]
    pub fn idx(&self, i: usize, j: usize) -> usize {
        i * self.ny + j
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_indexing() {
        let g = Grid::new(4, 3, 0.1).unwrap();
        assert_eq!(g.idx(0, 0), 0);
        assert_eq!(g.idx(0, 2), 2);
        assert_eq!(g.idx(1, 0), 3);
        assert_eq!(g.idx(3, 2), 11);
        assert_eq!(g.n_cells(), 12);
    }

    #[test]
    fn rejects_degenerate_grids() {
        assert!(Grid::new(0, 3, 0.1).is_err());
        assert!(Grid::new(4, 3, 0.0).is_err());
        assert!(Grid::new(4, 3, f64::NAN).is_err());
    }
}
