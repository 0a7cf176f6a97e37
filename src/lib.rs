//! Two-dimensional finite-difference frequency-domain (FDFD) solver for
//! Maxwell's equations, with stretched-coordinate PML absorbing layers and a
//! self-consistent treatment of intensity-dependent (Kerr-type)
//! permittivities.
//!
//! The primary entry point is [`Simulation`]: construct it from a relative
//! permittivity map, register mode sources, then call
//! [`solve_fields`](Simulation::solve_fields) or
//! [`solve_fields_nl`](Simulation::solve_fields_nl) and probe the result
//! with [`flux_probe`](Simulation::flux_probe).

pub mod discretization;
pub mod error;
pub mod nonlinearity;
pub mod numerics;
pub mod operator;
pub mod simulation;
pub mod source;
pub mod units;

pub use discretization::grid::{Axis, Grid};
pub use error::FdfdError;
pub use nonlinearity::Nonlinearity;
pub use numerics::nonlinear::{NlAlgorithm, NlResult, NonlinearOptions};
pub use numerics::sparse::{DirectSolver, LinearSolver, SparseMatrix};
pub use operator::Polarization;
pub use simulation::{FieldComponent, Fields, Simulation};
pub use source::ModeSpec;
pub use units::Units;
