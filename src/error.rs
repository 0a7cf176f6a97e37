use thiserror::Error;

/// Failure modes of the solver.
///
/// All variants are recoverable by the caller: a failed operation never
/// leaves the `Simulation` in a partially overwritten state, so retrying
/// with a relaxed tolerance, a different algorithm, or a better initial
/// estimate is always valid.
#[derive(Debug, Error)]
pub enum FdfdError {
    /// Non-physical or shape-mismatched input.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A mode or probe window exceeds the grid extents.
    #[error("window out of bounds: {0}")]
    OutOfBounds(String),

    /// Sparse factorization failed (degenerate PML, zero-frequency operator).
    #[error("sparse factorization failed: operator is singular")]
    SingularOperator,

    /// Newton solve requested but the nonlinearity carries no derivative.
    #[error("Newton solve requires a derivative function, none was supplied")]
    MissingDerivative,

    /// The nonlinear iteration exhausted its cap without meeting tolerance.
    #[error("nonlinear solve did not converge: {iterations} iterations, last relative update {residual:.3e}")]
    NonConvergence { iterations: u32, residual: f64 },
}
