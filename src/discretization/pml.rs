use num_complex::Complex64;

use crate::units::Units;

/// Which difference stencil a stretching profile belongs to. Forward
/// differences sample the conductivity at half-cell offsets, backward
/// differences at whole cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deriv {
    Forward,
    Backward,
}

/// Polynomial grading order of the PML conductivity.
const POLY_ORDER: i32 = 3;
/// Target reflection coefficient, ln(R).
const LN_R: f64 = -30.0;

/// Conductivity at depth `l` into a layer of thickness `dw`.
fn sigma(l: f64, dw: f64) -> f64 {
    let sigma_max = -((POLY_ORDER + 1) as f64) * LN_R / (2.0 * Units::ETA_0 * dw);
    sigma_max * (l / dw).powi(POLY_ORDER)
}

/// Complex coordinate-stretching factor at depth `l`.
fn s_factor(l: f64, dw: f64, omega: f64, units: &Units) -> Complex64 {
    Complex64::new(1.0, -sigma(l, dw) / (omega * Units::EPSILON_0 * units.l0))
}

/// Per-cell stretching factors along one axis of length `nw` with `n_pml`
/// absorbing cells at each end. Interior cells get exactly 1; the stretching
/// grows monotonically toward the grid edges and scales inversely with
/// frequency. A zero-width layer returns all ones (hard boundary).
pub fn create_sfactor(
    omega: f64,
    units: &Units,
    deriv: Deriv,
    nw: usize,
    n_pml: usize,
    dl: f64,
) -> Vec<Complex64> {
    let mut sfactor = vec![Complex64::new(1.0, 0.0); nw];
    if n_pml == 0 {
        return sfactor;
    }
    let dw = n_pml as f64 * dl;

    for (i, s) in sfactor.iter_mut().enumerate() {
        let depth = match deriv {
            Deriv::Forward => {
                if i <= n_pml {
                    Some(dl * ((n_pml - i) as f64 + 0.5))
                } else if i + n_pml > nw {
                    Some(dl * ((i + n_pml - nw) as f64 - 0.5))
                } else {
                    None
                }
            }
            Deriv::Backward => {
                if i <= n_pml {
                    Some(dl * ((n_pml - i) as f64 + 1.0))
                } else if i + n_pml > nw {
                    Some(dl * ((i + n_pml - nw) as f64 - 1.0))
                } else {
                    None
                }
            }
        };
        if let Some(l) = depth {
            *s = s_factor(l, dw, omega, units);
        }
    }
    sfactor
}
