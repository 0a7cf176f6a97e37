use nalgebra::DVector;
use ndarray::Array2;
use num_complex::Complex64;

use crate::error::FdfdError;
use crate::nonlinearity::Nonlinearity;
use crate::numerics::sparse::{LinearSolver, SparseMatrix};
use crate::numerics::timing::record_linear_solve;

/// Which self-consistency iteration to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NlAlgorithm {
    /// Picard (Born) iteration: freeze the permittivity at the current field,
    /// re-solve, repeat. Robust but linearly convergent.
    FixedPoint,
    /// Newton-Raphson on the doubled (field, conjugate) system. Quadratic
    /// near the solution; requires the nonlinearity's derivative.
    Newton,
}

/// Configuration of the nonlinear solve. Tolerance, cap and damping are
/// deliberately explicit rather than hidden defaults.
pub struct NonlinearOptions {
    pub algorithm: NlAlgorithm,
    /// Convergence threshold on the relative L2 norm of the field update.
    pub tolerance: f64,
    pub max_iterations: u32,
    /// Average each iterate with its predecessor. Off by default; helps
    /// against oscillatory non-convergence in strongly nonlinear regimes.
    pub damping: bool,
    /// Starting field estimate; the linear solution when absent.
    pub initial_field: Option<Array2<Complex64>>,
    /// Print an iteration table while solving.
    pub logging: bool,
}

impl Default for NonlinearOptions {
    fn default() -> Self {
        Self {
            algorithm: NlAlgorithm::Newton,
            tolerance: 1e-10,
            max_iterations: 50,
            damping: false,
            initial_field: None,
            logging: false,
        }
    }
}

/// Outcome of a converged nonlinear solve.
#[derive(Debug)]
pub struct NlResult {
    pub iterations: u32,
    /// Relative field update at the accepted iterate.
    pub residual: f64,
    /// Relative field update per iteration, for convergence diagnostics.
    pub history: Vec<f64>,
}

/// Everything the iteration needs, frozen for its duration. The base
/// operator and right-hand side are borrowed from the simulation; the
/// iteration never mutates simulation state directly.
pub(crate) struct NlContext<'a> {
    pub base: &'a SparseMatrix,
    pub rhs: &'a DVector<Complex64>,
    pub nonlinearity: &'a Nonlinearity,
    pub solver: &'a dyn LinearSolver,
    /// `omega^2 * eps0 * L0`, the factor turning a permittivity perturbation
    /// into a diagonal operator perturbation.
    pub diag_scale: f64,
    pub nx: usize,
    pub ny: usize,
}

pub(crate) struct NlSolution {
    pub field: DVector<Complex64>,
    pub eps_nl: Array2<Complex64>,
    pub result: NlResult,
}

impl<'a> NlContext<'a> {
    fn to_map(&self, x: &DVector<Complex64>) -> Array2<Complex64> {
        Array2::from_shape_vec((self.nx, self.ny), x.iter().cloned().collect())
            .expect("flattened field length matches grid")
    }

    fn diag_from_map(&self, map: &Array2<Complex64>) -> Vec<Complex64> {
        map.iter().map(|v| v * self.diag_scale).collect()
    }

    /// Base operator plus the diagonal permittivity perturbation.
    fn perturbed_operator(&self, eps_nl: &Array2<Complex64>) -> SparseMatrix {
        let mut a = self.base.clone();
        a.add_diag(&self.diag_from_map(eps_nl));
        a
    }

    fn rel_update(x_new: &DVector<Complex64>, x_old: &DVector<Complex64>) -> f64 {
        let denom = x_new.norm();
        if denom == 0.0 {
            return (x_new - x_old).norm();
        }
        (x_new - x_old).norm() / denom
    }

    fn log_iteration(it: u32, max: u32, update: f64, logging: bool) {
        if logging {
            println!("  {it:>4}/{max} | rel. update {update:>10.3e}");
        }
    }

    /// Fixed-point (Picard) iteration on the primary field component.
    pub fn fixed_point(
        &self,
        x0: DVector<Complex64>,
        opts: &NonlinearOptions,
    ) -> Result<NlSolution, FdfdError> {
        let mut x = x0;
        let mut history = Vec::new();
        let mut update = f64::INFINITY;

        for it in 1..=opts.max_iterations {
            let e_map = self.to_map(&x);
            let eps_nl = self.nonlinearity.eval(&e_map);
            let a = self.perturbed_operator(&eps_nl);
            let mut x_new = record_linear_solve(|| self.solver.solve(&a, self.rhs))?;
            if opts.damping {
                x_new = x_new.zip_map(&x, |n, p| 0.5 * (n + p));
            }
            update = Self::rel_update(&x_new, &x);
            history.push(update);
            Self::log_iteration(it, opts.max_iterations, update, opts.logging);
            x = x_new;

            if update < opts.tolerance {
                // re-evaluate at the accepted field so the published
                // perturbation matches the published solution
                let eps_final = self.nonlinearity.eval(&self.to_map(&x));
                return Ok(NlSolution {
                    field: x,
                    eps_nl: eps_final,
                    result: NlResult {
                        iterations: it,
                        residual: update,
                        history,
                    },
                });
            }
        }

        Err(FdfdError::NonConvergence {
            iterations: opts.max_iterations,
            residual: update,
        })
    }

    /// Newton-Raphson iteration. The permittivity depends on the field
    /// intensity, a function of both the field and its conjugate, so the
    /// linearization couples `x` and `conj(x)`. Each step solves the doubled
    /// system
    ///
    /// ```text
    /// [ J11        J12      ] [dx     ]   [-R      ]
    /// [ conj(J12)  conj(J11)] [dx_conj] = [-conj(R)]
    /// ```
    ///
    /// with `J11 = A + diag(s*(deps + df/de . x))` and
    /// `J12 = diag(s * conj(df/de) . x)`, `s = omega^2 eps0'`.
    pub fn newton(
        &self,
        x0: DVector<Complex64>,
        opts: &NonlinearOptions,
    ) -> Result<NlSolution, FdfdError> {
        // fail fast, before any factorization
        if !self.nonlinearity.has_derivative() {
            return Err(FdfdError::MissingDerivative);
        }

        let n = x0.len();
        let mut x = x0;
        let mut history = Vec::new();
        let mut update = f64::INFINITY;

        for it in 1..=opts.max_iterations {
            let e_map = self.to_map(&x);
            let eps_nl = self.nonlinearity.eval(&e_map);
            let deps = self
                .nonlinearity
                .eval_derivative(&e_map)
                .ok_or(FdfdError::MissingDerivative)?;

            // residual R = (A + Anl) x - b
            let anl: Vec<Complex64> = self.diag_from_map(&eps_nl);
            let mut residual = self.base.matvec(&x);
            for k in 0..n {
                residual[k] += anl[k] * x[k] - self.rhs[k];
            }

            // doubled Newton system
            let mut big = SparseMatrix::with_capacity(2 * n, 2 * n, 2 * self.base.nnz() + 4 * n);
            for &(r, c, v) in self.base.triplets() {
                big.push(r, c, v);
                big.push(n + r, n + c, v.conj());
            }
            let deps_flat: Vec<Complex64> = deps.iter().cloned().collect();
            for k in 0..n {
                let j11 = anl[k] + self.diag_scale * deps_flat[k] * x[k];
                let j12 = self.diag_scale * deps_flat[k].conj() * x[k];
                big.push(k, k, j11);
                big.push(n + k, n + k, j11.conj());
                big.push(k, n + k, j12);
                big.push(n + k, k, j12.conj());
            }

            let mut rhs_big = DVector::from_element(2 * n, Complex64::new(0.0, 0.0));
            for k in 0..n {
                rhs_big[k] = -residual[k];
                rhs_big[n + k] = -residual[k].conj();
            }

            let delta = record_linear_solve(|| self.solver.solve(&big, &rhs_big))?;
            let step = if opts.damping { 0.5 } else { 1.0 };
            let x_new = DVector::from_iterator(n, (0..n).map(|k| x[k] + step * delta[k]));

            update = Self::rel_update(&x_new, &x);
            history.push(update);
            Self::log_iteration(it, opts.max_iterations, update, opts.logging);
            x = x_new;

            if update < opts.tolerance {
                let eps_final = self.nonlinearity.eval(&self.to_map(&x));
                return Ok(NlSolution {
                    field: x,
                    eps_nl: eps_final,
                    result: NlResult {
                        iterations: it,
                        residual: update,
                        history,
                    },
                });
            }
        }

        Err(FdfdError::NonConvergence {
            iterations: opts.max_iterations,
            residual: update,
        })
    }
}
