use ndarray::{Array2, Zip};
use num_complex::Complex64;

use crate::error::FdfdError;
use crate::units::Units;

/// Pointwise intensity-dependent permittivity model.
pub type FieldFn = Box<dyn Fn(Complex64) -> Complex64 + Send + Sync>;

/// An intensity-dependent permittivity perturbation restricted to a region.
///
/// The perturbation is `region[(i, j)] * f(e[(i, j)])` where `f` maps the
/// local complex field value to a permittivity shift. The Newton solver
/// additionally needs `df/de`; fixed-point iteration works without it.
pub struct Nonlinearity {
    region: Array2<f64>,
    eps_fn: FieldFn,
    deps_fn: Option<FieldFn>,
}

impl Nonlinearity {
    pub fn new(region: Array2<f64>, eps_fn: FieldFn, deps_fn: Option<FieldFn>) -> Self {
        Self {
            region,
            eps_fn,
            deps_fn,
        }
    }

    /// Standard Kerr model: `deps = 3 chi3 |e|^2`, with `chi3` given in
    /// m^2/V^2 and rescaled by the square of the unit length so it matches
    /// fields expressed in V per unit length. Carries its derivative, so it
    /// works with both solver variants.
    pub fn kerr(chi3: f64, region: Array2<f64>, units: &Units) -> Self {
        let chi = chi3 / (units.l0 * units.l0);
        Self {
            region,
            eps_fn: Box::new(move |e| Complex64::from(3.0 * chi) * e * e.conj()),
            deps_fn: Some(Box::new(move |e| Complex64::from(3.0 * chi) * e.conj())),
        }
    }

    pub fn region(&self) -> &Array2<f64> {
        &self.region
    }

    pub fn has_derivative(&self) -> bool {
        self.deps_fn.is_some()
    }

    /// Check the region mask against the simulation grid.
    pub fn check_shape(&self, nx: usize, ny: usize) -> Result<(), FdfdError> {
        if self.region.dim() != (nx, ny) {
            return Err(FdfdError::InvalidParameter(format!(
                "nonlinear region shape {:?} does not match grid {}x{}",
                self.region.dim(),
                nx,
                ny
            )));
        }
        Ok(())
    }

    /// Masked permittivity perturbation for a frozen field estimate.
    /// Cells are independent, so the evaluation runs in parallel.
    pub fn eval(&self, e: &Array2<Complex64>) -> Array2<Complex64> {
        let mut out = Array2::zeros(e.dim());
        Zip::from(&mut out)
            .and(e)
            .and(&self.region)
            .par_for_each(|o, &ev, &w| {
                *o = if w != 0.0 {
                    w * (self.eps_fn)(ev)
                } else {
                    Complex64::new(0.0, 0.0)
                };
            });
        out
    }

    /// Masked derivative map, `None` when the model carries no derivative.
    pub fn eval_derivative(&self, e: &Array2<Complex64>) -> Option<Array2<Complex64>> {
        let deps = self.deps_fn.as_ref()?;
        let mut out = Array2::zeros(e.dim());
        Zip::from(&mut out)
            .and(e)
            .and(&self.region)
            .par_for_each(|o, &ev, &w| {
                *o = if w != 0.0 {
                    w * deps(ev)
                } else {
                    Complex64::new(0.0, 0.0)
                };
            });
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kerr_perturbation_is_real_and_masked() {
        let mut region = Array2::zeros((4, 4));
        region[(1, 1)] = 1.0;
        let units = Units::default();
        let nl = Nonlinearity::kerr(2.8e-18, region, &units);

        let mut e = Array2::zeros((4, 4));
        e[(1, 1)] = Complex64::new(3.0, 4.0);
        e[(2, 2)] = Complex64::new(100.0, 0.0);
        let deps = nl.eval(&e);

        // 3 * chi' * |e|^2 with |e|^2 = 25
        let chi = 2.8e-18 / (1e-6f64 * 1e-6);
        assert!((deps[(1, 1)].re - 3.0 * chi * 25.0).abs() < 1e-12 * chi);
        assert!(deps[(1, 1)].im.abs() < 1e-30);
        // outside the region the perturbation vanishes regardless of field
        assert_eq!(deps[(2, 2)], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn derivative_presence() {
        let region = Array2::ones((2, 2));
        let units = Units::default();
        assert!(Nonlinearity::kerr(1e-18, region.clone(), &units).has_derivative());
        let without = Nonlinearity::new(region, Box::new(|_| Complex64::new(0.0, 0.0)), None);
        assert!(!without.has_derivative());
        assert!(without.eval_derivative(&Array2::zeros((2, 2))).is_none());
    }

    #[test]
    fn shape_check() {
        let region = Array2::ones((3, 3));
        let units = Units::default();
        let nl = Nonlinearity::kerr(1e-18, region, &units);
        assert!(nl.check_shape(3, 3).is_ok());
        assert!(nl.check_shape(4, 3).is_err());
    }
}
