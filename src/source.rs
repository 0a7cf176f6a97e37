use ndarray::Array2;
use num_complex::Complex64;

use crate::discretization::grid::{Axis, Grid};
use crate::error::FdfdError;

/// A guided-mode excitation placed on a line of cells.
///
/// The transverse profile is an opaque complex vector supplied by an
/// external mode solver; its length must equal the injection window. The
/// scalar `scale` multiplies the profile linearly, so amplitude sweeps are a
/// pure rescale of the source.
#[derive(Debug, Clone)]
pub struct ModeSpec {
    /// Axis normal to the injection line.
    pub normal: Axis,
    /// Grid indices of the window center.
    pub center: (usize, usize),
    /// Transverse extent of the window, in cells.
    pub width: usize,
    /// Complex transverse profile, one value per window cell.
    pub profile: Vec<Complex64>,
    /// Amplitude multiplier.
    pub scale: f64,
}

/// The injection window: the fixed index along the normal axis and the
/// half-open transverse range. The transverse span is `2 * (width / 2)`
/// cells centered on the window center, so odd widths round down.
pub(crate) fn mode_window(
    spec: &ModeSpec,
    grid: &Grid,
) -> Result<(usize, std::ops::Range<usize>), FdfdError> {
    if spec.width == 0 {
        return Err(FdfdError::InvalidParameter(
            "mode width must be positive".to_string(),
        ));
    }
    let (along, across, extent_along, extent_across) = match spec.normal {
        Axis::X => (spec.center.0, spec.center.1, grid.nx, grid.ny),
        Axis::Y => (spec.center.1, spec.center.0, grid.ny, grid.nx),
    };
    let half = (spec.width / 2) as isize;
    let lo = across as isize - half;
    let hi = across as isize + half;
    if along >= extent_along || lo < 0 || hi as usize > extent_across {
        return Err(FdfdError::OutOfBounds(format!(
            "mode window (normal {:?}, center {:?}, width {}) exceeds grid {}x{}",
            spec.normal, spec.center, spec.width, grid.nx, grid.ny
        )));
    }
    Ok((along, lo as usize..hi as usize))
}

/// Validate a mode against the grid without touching any state.
pub(crate) fn check_mode(spec: &ModeSpec, grid: &Grid) -> Result<(), FdfdError> {
    let (_, range) = mode_window(spec, grid)?;
    if spec.profile.len() != range.len() {
        return Err(FdfdError::InvalidParameter(format!(
            "mode profile length {} does not match window length {}",
            spec.profile.len(),
            range.len()
        )));
    }
    Ok(())
}

/// Add `scale * profile` into the source map over the mode's window.
pub(crate) fn insert_mode(
    spec: &ModeSpec,
    grid: &Grid,
    src: &mut Array2<Complex64>,
) -> Result<(), FdfdError> {
    check_mode(spec, grid)?;
    let (along, range) = mode_window(spec, grid)?;
    for (k, t) in range.enumerate() {
        let cell = match spec.normal {
            Axis::X => (along, t),
            Axis::Y => (t, along),
        };
        src[cell] += spec.profile[k] * spec.scale;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_profile(width: usize) -> Vec<Complex64> {
        (0..width)
            .map(|k| Complex64::new(k as f64 + 1.0, 0.0))
            .collect()
    }

    #[test]
    fn inserts_at_expected_cells() {
        let grid = Grid::new(10, 12, 0.1).unwrap();
        let spec = ModeSpec {
            normal: Axis::X,
            center: (4, 6),
            width: 4,
            profile: probe_profile(4),
            scale: 2.0,
        };
        let mut src = Array2::zeros((10, 12));
        insert_mode(&spec, &grid, &mut src).unwrap();
        // window spans j = 4..8 on row i = 4
        assert_eq!(src[(4, 4)], Complex64::new(2.0, 0.0));
        assert_eq!(src[(4, 7)], Complex64::new(8.0, 0.0));
        assert_eq!(src[(4, 3)], Complex64::new(0.0, 0.0));
        assert_eq!(src[(3, 5)], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn window_out_of_bounds() {
        let grid = Grid::new(10, 12, 0.1).unwrap();
        let spec = ModeSpec {
            normal: Axis::X,
            center: (4, 1),
            width: 6,
            profile: probe_profile(6),
            scale: 1.0,
        };
        let mut src = Array2::zeros((10, 12));
        match insert_mode(&spec, &grid, &mut src) {
            Err(FdfdError::OutOfBounds(_)) => {}
            other => panic!("expected OutOfBounds, got {other:?}"),
        }
        // nothing was written
        assert!(src.iter().all(|v| *v == Complex64::new(0.0, 0.0)));
    }

    #[test]
    fn zero_width_is_rejected() {
        let grid = Grid::new(10, 12, 0.1).unwrap();
        let spec = ModeSpec {
            normal: Axis::X,
            center: (4, 6),
            width: 0,
            profile: vec![],
            scale: 1.0,
        };
        assert!(matches!(
            check_mode(&spec, &grid),
            Err(FdfdError::InvalidParameter(_))
        ));
    }

    #[test]
    fn profile_length_mismatch() {
        let grid = Grid::new(10, 12, 0.1).unwrap();
        let spec = ModeSpec {
            normal: Axis::Y,
            center: (5, 6),
            width: 4,
            profile: probe_profile(3),
            scale: 1.0,
        };
        assert!(matches!(
            check_mode(&spec, &grid),
            Err(FdfdError::InvalidParameter(_))
        ));
    }

    #[test]
    fn modes_sum_and_scale_linearly() {
        let grid = Grid::new(8, 8, 0.1).unwrap();
        let spec = ModeSpec {
            normal: Axis::Y,
            center: (4, 3),
            width: 2,
            profile: probe_profile(2),
            scale: 1.5,
        };
        let mut src = Array2::zeros((8, 8));
        insert_mode(&spec, &grid, &mut src).unwrap();
        insert_mode(&spec, &grid, &mut src).unwrap();
        // y-normal: window spans i = 3..5 on column j = 3
        assert_eq!(src[(3, 3)], Complex64::new(3.0, 0.0));
        assert_eq!(src[(4, 3)], Complex64::new(6.0, 0.0));
    }
}
