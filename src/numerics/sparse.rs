use faer::complex_native::c64;
use faer::prelude::*;
use faer::sparse::SparseColMat;
use nalgebra::DVector;
use num_complex::Complex64;

use crate::error::FdfdError;

/// Complex sparse matrix in triplet form.
///
/// Assembly pushes entries in a fixed loop order, so identical inputs always
/// produce identical triplet lists. Duplicate coordinates are summed when the
/// matrix is compressed for factorization, which lets assembly stack stencil
/// contributions and diagonal perturbations without bookkeeping.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    nrows: usize,
    ncols: usize,
    triplets: Vec<(usize, usize, Complex64)>,
}

impl SparseMatrix {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            triplets: Vec::new(),
        }
    }

    pub fn with_capacity(nrows: usize, ncols: usize, cap: usize) -> Self {
        Self {
            nrows,
            ncols,
            triplets: Vec::with_capacity(cap),
        }
    }

    #[inline]
    pub fn push(&mut self, row: usize, col: usize, value: Complex64) {
        debug_assert!(row < self.nrows && col < self.ncols);
        self.triplets.push((row, col, value));
    }

    /// Add `values[k]` to diagonal entry `(k, k)`.
    pub fn add_diag(&mut self, values: &[Complex64]) {
        debug_assert_eq!(values.len(), self.nrows.min(self.ncols));
        for (k, v) in values.iter().enumerate() {
            self.triplets.push((k, k, *v));
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.triplets.len()
    }

    pub fn triplets(&self) -> &[(usize, usize, Complex64)] {
        &self.triplets
    }

    /// Matrix-vector product. Duplicates accumulate, matching the compressed
    /// form used by the factorization.
    pub fn matvec(&self, x: &DVector<Complex64>) -> DVector<Complex64> {
        debug_assert_eq!(x.len(), self.ncols);
        let mut y = DVector::from_element(self.nrows, Complex64::new(0.0, 0.0));
        for &(r, c, v) in &self.triplets {
            y[r] += v * x[c];
        }
        y
    }

    fn to_faer(&self) -> Result<SparseColMat<usize, c64>, FdfdError> {
        let triplets: Vec<(usize, usize, c64)> = self
            .triplets
            .iter()
            .map(|&(r, c, v)| (r, c, c64::new(v.re, v.im)))
            .collect();
        SparseColMat::try_new_from_triplets(self.nrows, self.ncols, &triplets).map_err(|e| {
            FdfdError::InvalidParameter(format!("sparse matrix construction failed: {e:?}"))
        })
    }
}

/// Seam between operator assembly and the linear algebra backend. The default
/// is a sparse direct factorization; an iterative implementation can be
/// swapped in for very large grids without touching caller code.
pub trait LinearSolver {
    fn solve(
        &self,
        a: &SparseMatrix,
        b: &DVector<Complex64>,
    ) -> Result<DVector<Complex64>, FdfdError>;
}

/// Sparse LU with partial pivoting. The FDFD operator is non-symmetric and
/// non-Hermitian once PML stretching is folded in, so LU is the appropriate
/// direct factorization.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectSolver;

impl LinearSolver for DirectSolver {
    fn solve(
        &self,
        a: &SparseMatrix,
        b: &DVector<Complex64>,
    ) -> Result<DVector<Complex64>, FdfdError> {
        if a.nrows() != b.len() {
            return Err(FdfdError::InvalidParameter(format!(
                "rhs length {} does not match operator rows {}",
                b.len(),
                a.nrows()
            )));
        }
        let mat = a.to_faer()?;
        let lu = mat.sp_lu().map_err(|_| FdfdError::SingularOperator)?;
        let rhs = Mat::from_fn(b.len(), 1, |i, _| c64::new(b[i].re, b[i].im));
        let x = lu.solve(&rhs);
        let solution = DVector::from_iterator(
            b.len(),
            (0..b.len()).map(|i| {
                let v = x.read(i, 0);
                Complex64::new(v.re, v.im)
            }),
        );
        if !solution.iter().all(|v| v.re.is_finite() && v.im.is_finite()) {
            return Err(FdfdError::SingularOperator);
        }
        Ok(solution)
    }
}
