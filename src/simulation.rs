use nalgebra::DVector;
use ndarray::Array2;
use num_complex::Complex64;

use crate::discretization::grid::{Axis, Grid};
use crate::error::FdfdError;
use crate::nonlinearity::Nonlinearity;
use crate::numerics::nonlinear::{NlAlgorithm, NlContext, NlResult, NonlinearOptions};
use crate::numerics::sparse::{DirectSolver, LinearSolver};
use crate::numerics::timing::{record_assembly, record_linear_solve};
use crate::operator::{backward_diff, build_operator, grid_average, Operator, Polarization};
use crate::source::{check_mode, insert_mode, ModeSpec};
use crate::units::Units;

/// Named field components of the two supported layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldComponent {
    Ex,
    Ey,
    Ez,
    Hx,
    Hy,
    Hz,
}

/// The current field solution, one optional complex map per component.
/// Components not belonging to the simulated polarization stay `None`.
#[derive(Debug, Default, Clone)]
pub struct Fields {
    ex: Option<Array2<Complex64>>,
    ey: Option<Array2<Complex64>>,
    ez: Option<Array2<Complex64>>,
    hx: Option<Array2<Complex64>>,
    hy: Option<Array2<Complex64>>,
    hz: Option<Array2<Complex64>>,
}

impl Fields {
    pub fn get(&self, component: FieldComponent) -> Option<&Array2<Complex64>> {
        match component {
            FieldComponent::Ex => self.ex.as_ref(),
            FieldComponent::Ey => self.ey.as_ref(),
            FieldComponent::Ez => self.ez.as_ref(),
            FieldComponent::Hx => self.hx.as_ref(),
            FieldComponent::Hy => self.hy.as_ref(),
            FieldComponent::Hz => self.hz.as_ref(),
        }
    }

    fn set(&mut self, component: FieldComponent, value: Array2<Complex64>) {
        match component {
            FieldComponent::Ex => self.ex = Some(value),
            FieldComponent::Ey => self.ey = Some(value),
            FieldComponent::Ez => self.ez = Some(value),
            FieldComponent::Hx => self.hx = Some(value),
            FieldComponent::Hy => self.hy = Some(value),
            FieldComponent::Hz => self.hz = Some(value),
        }
    }
}

/// A 2-D frequency-domain Maxwell solver instance.
///
/// Owns the permittivity map, the assembled operator, the registered mode
/// sources and the current field solution. All state is mutable and
/// un-synchronized; callers must serialize solves on one instance or own it
/// exclusively. A failed solve leaves the last successful field solution and
/// permittivity record untouched.
pub struct Simulation {
    units: Units,
    omega: f64,
    grid: Grid,
    npml: [usize; 2],
    pol: Polarization,
    averaging: bool,
    eps_r: Array2<Complex64>,
    /// Permittivity perturbation of the last converged nonlinear solve.
    eps_nl: Array2<Complex64>,
    src: Array2<Complex64>,
    modes: Vec<ModeSpec>,
    operator: Operator,
    fields: Fields,
    solver: Box<dyn LinearSolver>,
}

impl Simulation {
    /// Build a simulation with the default unit scaling (microns) and the
    /// sparse direct solver.
    pub fn new(
        omega: f64,
        eps_r: Array2<Complex64>,
        dl: f64,
        npml: [usize; 2],
        pol: Polarization,
    ) -> Result<Self, FdfdError> {
        Self::with_units(omega, eps_r, dl, npml, pol, Units::default())
    }

    pub fn with_units(
        omega: f64,
        eps_r: Array2<Complex64>,
        dl: f64,
        npml: [usize; 2],
        pol: Polarization,
        units: Units,
    ) -> Result<Self, FdfdError> {
        if !(omega > 0.0) || !omega.is_finite() {
            return Err(FdfdError::InvalidParameter(format!(
                "angular frequency must be positive and finite, got {omega}"
            )));
        }
        let (nx, ny) = eps_r.dim();
        let grid = Grid::new(nx, ny, dl)?;
        check_eps(&eps_r)?;
        if 2 * npml[0] > nx || 2 * npml[1] > ny {
            return Err(FdfdError::InvalidParameter(format!(
                "PML widths {npml:?} overlap on a {nx}x{ny} grid"
            )));
        }

        let averaging = true;
        let operator = record_assembly(|| {
            build_operator(omega, &eps_r, &grid, npml, pol, &units, averaging)
        });

        Ok(Self {
            units,
            omega,
            grid,
            npml,
            pol,
            averaging,
            eps_nl: Array2::zeros((nx, ny)),
            src: Array2::zeros((nx, ny)),
            modes: Vec::new(),
            eps_r,
            operator,
            fields: Fields::default(),
            solver: Box::new(DirectSolver),
        })
    }

    /// Substitute the linear-algebra backend (e.g. an iterative solver for
    /// very large grids).
    pub fn with_solver(mut self, solver: Box<dyn LinearSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Toggle staggered-grid permittivity averaging (on by default; only
    /// affects the `Hz` layout). Re-assembles the operator when changed.
    pub fn with_averaging(mut self, averaging: bool) -> Self {
        if averaging != self.averaging {
            self.averaging = averaging;
            self.operator = record_assembly(|| {
                build_operator(
                    self.omega,
                    &self.eps_r,
                    &self.grid,
                    self.npml,
                    self.pol,
                    &self.units,
                    self.averaging,
                )
            });
            self.fields = Fields::default();
        }
        self
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn omega(&self) -> f64 {
        self.omega
    }

    pub fn polarization(&self) -> Polarization {
        self.pol
    }

    pub fn eps_r(&self) -> &Array2<Complex64> {
        &self.eps_r
    }

    /// Permittivity perturbation recorded by the last converged nonlinear
    /// solve (zeros before any).
    pub fn eps_nl(&self) -> &Array2<Complex64> {
        &self.eps_nl
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn src(&self) -> &Array2<Complex64> {
        &self.src
    }

    /// Replace the permittivity map and re-assemble the operator. Clears the
    /// field solution and the nonlinear permittivity record.
    pub fn set_eps(&mut self, eps_r: Array2<Complex64>) -> Result<(), FdfdError> {
        if eps_r.dim() != (self.grid.nx, self.grid.ny) {
            return Err(FdfdError::InvalidParameter(format!(
                "permittivity shape {:?} does not match grid {}x{}",
                eps_r.dim(),
                self.grid.nx,
                self.grid.ny
            )));
        }
        check_eps(&eps_r)?;
        self.operator = record_assembly(|| {
            build_operator(
                self.omega,
                &eps_r,
                &self.grid,
                self.npml,
                self.pol,
                &self.units,
                self.averaging,
            )
        });
        self.eps_r = eps_r;
        self.eps_nl = Array2::zeros((self.grid.nx, self.grid.ny));
        self.fields = Fields::default();
        Ok(())
    }

    /// Register a mode source. The window is validated here, before any
    /// state changes; call [`setup_modes`](Self::setup_modes) to (re)build
    /// the aggregate source.
    pub fn add_mode(&mut self, spec: ModeSpec) -> Result<(), FdfdError> {
        check_mode(&spec, &self.grid)?;
        self.modes.push(spec);
        Ok(())
    }

    /// Drop all registered modes. The source map keeps its current values
    /// until the next [`setup_modes`](Self::setup_modes) call.
    pub fn clear_modes(&mut self) {
        self.modes.clear();
    }

    /// Rebuild the source map from the registered modes. Deterministic and
    /// idempotent for an unchanged mode list.
    pub fn setup_modes(&mut self) -> Result<(), FdfdError> {
        let mut src = Array2::zeros((self.grid.nx, self.grid.ny));
        for spec in &self.modes {
            insert_mode(spec, &self.grid, &mut src)?;
        }
        self.src = src;
        Ok(())
    }

    /// Solver right-hand side, `b = i w src` flattened row-major.
    fn rhs(&self) -> DVector<Complex64> {
        let iw = Complex64::new(0.0, self.omega);
        DVector::from_iterator(self.grid.n_cells(), self.src.iter().map(|s| iw * s))
    }

    fn to_map(&self, x: &DVector<Complex64>) -> Array2<Complex64> {
        Array2::from_shape_vec(
            (self.grid.nx, self.grid.ny),
            x.iter().cloned().collect(),
        )
        .expect("flattened field length matches grid")
    }

    /// Recover the full field set from the primary unknown, using the total
    /// permittivity for the `Hz` layout's electric components.
    fn recover_fields(&self, x: &DVector<Complex64>, eps_tot: &Array2<Complex64>) -> Fields {
        let primary = self.to_map(x);
        let dl = self.grid.dl;
        // 1/(i w) = -i/w
        let inv_iw = Complex64::new(0.0, -1.0 / self.omega);
        let mut fields = Fields::default();

        match self.pol {
            Polarization::Ez => {
                let mu = self.units.mu_0();
                let dyb = backward_diff(&primary, Axis::Y, dl, &self.operator.syb);
                let dxb = backward_diff(&primary, Axis::X, dl, &self.operator.sxb);
                let hx = dyb.mapv(|v| -inv_iw / mu * v);
                let hy = dxb.mapv(|v| inv_iw / mu * v);
                fields.set(FieldComponent::Hx, hx);
                fields.set(FieldComponent::Hy, hy);
                fields.set(FieldComponent::Ez, primary);
            }
            Polarization::Hz => {
                let eps0 = self.units.epsilon_0();
                let scaled = eps_tot.mapv(|e| e * eps0);
                let (eps_x, eps_y) = if self.averaging {
                    (grid_average(&scaled, Axis::X), grid_average(&scaled, Axis::Y))
                } else {
                    (scaled.clone(), scaled)
                };
                let dyb = backward_diff(&primary, Axis::Y, dl, &self.operator.syb);
                let dxb = backward_diff(&primary, Axis::X, dl, &self.operator.sxb);
                let mut ex = dyb;
                ex.zip_mut_with(&eps_y, |v, e| *v = inv_iw * *v / e);
                let mut ey = dxb;
                ey.zip_mut_with(&eps_x, |v, e| *v = -inv_iw * *v / e);
                fields.set(FieldComponent::Ex, ex);
                fields.set(FieldComponent::Ey, ey);
                fields.set(FieldComponent::Hz, primary);
            }
        }
        fields
    }

    /// Linear steady-state solve. Replaces the field solution on success.
    pub fn solve_fields(&mut self) -> Result<&Fields, FdfdError> {
        let b = self.rhs();
        let x = record_linear_solve(|| self.solver.solve(&self.operator.matrix, &b))?;
        self.fields = self.recover_fields(&x, &self.eps_r);
        Ok(&self.fields)
    }

    /// Nonlinear self-consistent solve.
    ///
    /// Iterates the permittivity perturbation and the field until the
    /// relative field update drops below tolerance, then publishes the field
    /// solution together with the matching perturbation record. On failure
    /// the previous solution is left intact.
    pub fn solve_fields_nl(
        &mut self,
        nonlinearity: &Nonlinearity,
        opts: &NonlinearOptions,
    ) -> Result<NlResult, FdfdError> {
        nonlinearity.check_shape(self.grid.nx, self.grid.ny)?;
        if opts.algorithm == NlAlgorithm::Newton && !nonlinearity.has_derivative() {
            return Err(FdfdError::MissingDerivative);
        }

        let b = self.rhs();
        let x0 = match &opts.initial_field {
            Some(estimate) => {
                if estimate.dim() != (self.grid.nx, self.grid.ny) {
                    return Err(FdfdError::InvalidParameter(format!(
                        "initial field shape {:?} does not match grid {}x{}",
                        estimate.dim(),
                        self.grid.nx,
                        self.grid.ny
                    )));
                }
                DVector::from_iterator(self.grid.n_cells(), estimate.iter().cloned())
            }
            None => record_linear_solve(|| self.solver.solve(&self.operator.matrix, &b))?,
        };

        let ctx = NlContext {
            base: &self.operator.matrix,
            rhs: &b,
            nonlinearity,
            solver: self.solver.as_ref(),
            diag_scale: self.omega * self.omega * self.units.epsilon_0(),
            nx: self.grid.nx,
            ny: self.grid.ny,
        };

        let solution = match opts.algorithm {
            NlAlgorithm::FixedPoint => ctx.fixed_point(x0, opts)?,
            NlAlgorithm::Newton => ctx.newton(x0, opts)?,
        };

        let eps_tot = &self.eps_r + &solution.eps_nl;
        self.fields = self.recover_fields(&solution.field, &eps_tot);
        self.eps_nl = solution.eps_nl;
        Ok(solution.result)
    }

    /// Nonlinear refractive-index shift, `|sqrt(eps + deps) - sqrt(eps)|`,
    /// from a fresh linear plus nonlinear solve.
    pub fn compute_index_shift(
        &mut self,
        nonlinearity: &Nonlinearity,
        opts: &NonlinearOptions,
    ) -> Result<Array2<f64>, FdfdError> {
        self.solve_fields()?;
        self.solve_fields_nl(nonlinearity, opts)?;
        let mut shift = Array2::zeros((self.grid.nx, self.grid.ny));
        for ((i, j), s) in shift.indexed_iter_mut() {
            let lin = self.eps_r[(i, j)].re.max(0.0).sqrt();
            let nl = (self.eps_r[(i, j)].re + self.eps_nl[(i, j)].re).max(0.0).sqrt();
            *s = (nl - lin).abs();
        }
        Ok(shift)
    }

    /// Integrate the time-averaged Poynting component normal to a probe line.
    /// Positive power flows in the positive direction of the probed axis.
    pub fn flux_probe(
        &self,
        normal: Axis,
        center: (usize, usize),
        width: usize,
    ) -> Result<f64, FdfdError> {
        if width == 0 {
            return Err(FdfdError::InvalidParameter(
                "probe width must be positive".to_string(),
            ));
        }
        let (along, across, extent_along, extent_across) = match normal {
            Axis::X => (center.0, center.1, self.grid.nx, self.grid.ny),
            Axis::Y => (center.1, center.0, self.grid.ny, self.grid.nx),
        };
        let half = (width / 2) as isize;
        let lo = across as isize - half;
        let hi = across as isize + half;
        if along + 1 >= extent_along || lo < 0 || hi as usize > extent_across {
            return Err(FdfdError::OutOfBounds(format!(
                "probe window (normal {:?}, center {:?}, width {}) exceeds grid {}x{}",
                normal, center, width, self.grid.nx, self.grid.ny
            )));
        }
        let range = lo as usize..hi as usize;

        let component = |c: FieldComponent| {
            self.fields.get(c).ok_or_else(|| {
                FdfdError::InvalidParameter(
                    "flux probe requires a solved field; call solve_fields first".to_string(),
                )
            })
        };

        let mut total = 0.0;
        match (self.pol, normal) {
            (Polarization::Ez, Axis::X) => {
                let ez = component(FieldComponent::Ez)?;
                let hy = component(FieldComponent::Hy)?;
                for j in range {
                    let e_avg = 0.5 * (ez[(along, j)] + ez[(along + 1, j)]);
                    total += -0.5 * (e_avg * hy[(along, j)].conj()).re;
                }
            }
            (Polarization::Ez, Axis::Y) => {
                let ez = component(FieldComponent::Ez)?;
                let hx = component(FieldComponent::Hx)?;
                for i in range {
                    let e_avg = 0.5 * (ez[(i, along)] + ez[(i, along + 1)]);
                    total += 0.5 * (e_avg * hx[(i, along)].conj()).re;
                }
            }
            (Polarization::Hz, Axis::X) => {
                let hz = component(FieldComponent::Hz)?;
                let ey = component(FieldComponent::Ey)?;
                for j in range {
                    let h_avg = 0.5 * (hz[(along, j)] + hz[(along + 1, j)]);
                    total += 0.5 * (ey[(along, j)] * h_avg.conj()).re;
                }
            }
            (Polarization::Hz, Axis::Y) => {
                let hz = component(FieldComponent::Hz)?;
                let ex = component(FieldComponent::Ex)?;
                for i in range {
                    let h_avg = 0.5 * (hz[(i, along)] + hz[(i, along + 1)]);
                    total += -0.5 * (ex[(i, along)] * h_avg.conj()).re;
                }
            }
        }
        Ok(total * self.grid.dl)
    }
}

fn check_eps(eps: &Array2<Complex64>) -> Result<(), FdfdError> {
    for ((i, j), e) in eps.indexed_iter() {
        if !(e.re > 0.0) || !e.re.is_finite() || !e.im.is_finite() {
            return Err(FdfdError::InvalidParameter(format!(
                "permittivity at ({i}, {j}) must have a positive finite real part, got {e}"
            )));
        }
    }
    Ok(())
}
