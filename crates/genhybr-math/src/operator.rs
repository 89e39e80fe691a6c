// ─────────────────────────────────────────────────────────────────────
// GenHyBR — Operators
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Matrix-free linear operators for the forward model A and the
//! covariances Q (prior) and R (noise).
//!
//! Every operator exposes products with itself and its transpose.
//! Covariance operators additionally solve `R x = y`, which the
//! generalized bidiagonalization uses for all R⁻¹-weighted quantities.
//! An optional input-shape descriptor is fixed at construction so image
//! operators can be reshaped by the caller without any runtime
//! inspection inside the solver.

use genhybr_types::error::{ensure_len, HybridError, HybridResult};
use ndarray::{Array1, Array2};

use crate::linalg::{cholesky_lower, cholesky_solve, vec_norm};

/// Relative residual at which the sparse CG solve is accepted.
const CG_TOL: f64 = 1e-12;

pub trait LinearOperator {
    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;

    /// y = A x
    fn apply(&self, x: &Array1<f64>) -> HybridResult<Array1<f64>>;

    /// x = Aᵗ y
    fn apply_transpose(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>>;

    /// Shape of the unknown when it is an image or volume.
    fn input_shape(&self) -> Option<Vec<usize>> {
        None
    }
}

/// Symmetric positive definite operator that can also be inverted.
pub trait CovarianceOperator: LinearOperator {
    /// x = M⁻¹ y
    fn solve(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>>;
}

/// Explicit matrices act directly as operators.
impl LinearOperator for Array2<f64> {
    fn nrows(&self) -> usize {
        self.nrows()
    }

    fn ncols(&self) -> usize {
        self.ncols()
    }

    fn apply(&self, x: &Array1<f64>) -> HybridResult<Array1<f64>> {
        ensure_len("matrix apply", self.ncols(), x.len())?;
        Ok(self.dot(x))
    }

    fn apply_transpose(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>> {
        ensure_len("matrix apply_transpose", self.nrows(), y.len())?;
        Ok(self.t().dot(y))
    }
}

/// Weighted norm sqrt(vᵗ M v).
///
/// `m` may be an explicit `Array2` or any operator, including
/// [`InverseOf`] for R⁻¹-weighted norms.
pub fn norm_m<M: LinearOperator + ?Sized>(v: &Array1<f64>, m: &M) -> HybridResult<f64> {
    let mv = m.apply(v)?;
    Ok(v.dot(&mv).max(0.0).sqrt())
}

/// Applies M⁻¹ of a covariance operator through `apply`.
pub struct InverseOf<'a, C: CovarianceOperator + ?Sized>(pub &'a C);

impl<C: CovarianceOperator + ?Sized> LinearOperator for InverseOf<'_, C> {
    fn nrows(&self) -> usize {
        self.0.ncols()
    }

    fn ncols(&self) -> usize {
        self.0.nrows()
    }

    fn apply(&self, x: &Array1<f64>) -> HybridResult<Array1<f64>> {
        self.0.solve(x)
    }

    fn apply_transpose(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>> {
        // Covariances are symmetric
        self.0.solve(y)
    }
}

// ───────────────────────────── identity ─────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct IdentityOperator {
    pub n: usize,
}

impl IdentityOperator {
    pub fn new(n: usize) -> Self {
        IdentityOperator { n }
    }
}

impl LinearOperator for IdentityOperator {
    fn nrows(&self) -> usize {
        self.n
    }

    fn ncols(&self) -> usize {
        self.n
    }

    fn apply(&self, x: &Array1<f64>) -> HybridResult<Array1<f64>> {
        ensure_len("identity apply", self.n, x.len())?;
        Ok(x.clone())
    }

    fn apply_transpose(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>> {
        self.apply(y)
    }
}

impl CovarianceOperator for IdentityOperator {
    fn solve(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>> {
        self.apply(y)
    }
}

// ───────────────────────────── diagonal ─────────────────────────────

/// Diagonal covariance, e.g. independent noise with per-sample variance.
#[derive(Debug, Clone)]
pub struct DiagonalOperator {
    pub diag: Array1<f64>,
}

impl DiagonalOperator {
    pub fn new(diag: Array1<f64>) -> Self {
        DiagonalOperator { diag }
    }

    /// σ²·I of size n.
    pub fn scaled_identity(n: usize, variance: f64) -> Self {
        DiagonalOperator {
            diag: Array1::from_elem(n, variance),
        }
    }
}

impl LinearOperator for DiagonalOperator {
    fn nrows(&self) -> usize {
        self.diag.len()
    }

    fn ncols(&self) -> usize {
        self.diag.len()
    }

    fn apply(&self, x: &Array1<f64>) -> HybridResult<Array1<f64>> {
        ensure_len("diagonal apply", self.diag.len(), x.len())?;
        Ok(&self.diag * x)
    }

    fn apply_transpose(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>> {
        self.apply(y)
    }
}

impl CovarianceOperator for DiagonalOperator {
    fn solve(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>> {
        ensure_len("diagonal solve", self.diag.len(), y.len())?;
        if let Some(idx) = self.diag.iter().position(|&d| d == 0.0) {
            return Err(HybridError::Operator(format!(
                "diagonal operator is singular at entry {idx}"
            )));
        }
        Ok(y / &self.diag)
    }
}

// ─────────────────────────────── dense ──────────────────────────────

/// Dense matrix operator; `spd` also factors it for `solve`.
#[derive(Debug, Clone)]
pub struct DenseOperator {
    pub matrix: Array2<f64>,
    chol: Option<Array2<f64>>,
}

impl DenseOperator {
    pub fn new(matrix: Array2<f64>) -> Self {
        DenseOperator { matrix, chol: None }
    }

    /// Symmetric positive definite matrix, factored once here.
    pub fn spd(matrix: Array2<f64>) -> HybridResult<Self> {
        let chol = cholesky_lower(&matrix)
            .map_err(|e| HybridError::Operator(format!("covariance factorization failed: {e}")))?;
        Ok(DenseOperator {
            matrix,
            chol: Some(chol),
        })
    }
}

impl LinearOperator for DenseOperator {
    fn nrows(&self) -> usize {
        self.matrix.nrows()
    }

    fn ncols(&self) -> usize {
        self.matrix.ncols()
    }

    fn apply(&self, x: &Array1<f64>) -> HybridResult<Array1<f64>> {
        self.matrix.apply(x)
    }

    fn apply_transpose(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>> {
        self.matrix.apply_transpose(y)
    }
}

impl CovarianceOperator for DenseOperator {
    fn solve(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>> {
        ensure_len("dense solve", self.matrix.nrows(), y.len())?;
        match &self.chol {
            Some(l) => Ok(cholesky_solve(l, y)),
            None => Err(HybridError::Operator(
                "dense operator was not built with DenseOperator::spd".to_string(),
            )),
        }
    }
}

// ─────────────────────────────── sparse ─────────────────────────────

/// Compressed sparse row matrix.
#[derive(Debug, Clone)]
pub struct CsrOperator {
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl CsrOperator {
    /// Build from (row, col, value) triplets; duplicates are summed.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> HybridResult<Self> {
        let mut sorted = triplets.to_vec();
        for &(i, j, _) in &sorted {
            if i >= nrows || j >= ncols {
                return Err(HybridError::ConfigError(format!(
                    "triplet ({i}, {j}) outside {nrows}x{ncols} matrix"
                )));
            }
        }
        sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut indptr = vec![0usize; nrows + 1];
        let mut indices = Vec::with_capacity(sorted.len());
        let mut data: Vec<f64> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;
        for &(i, j, v) in &sorted {
            if last == Some((i, j)) {
                if let Some(d) = data.last_mut() {
                    *d += v;
                }
                continue;
            }
            indices.push(j);
            data.push(v);
            indptr[i + 1] += 1;
            last = Some((i, j));
        }
        for i in 0..nrows {
            indptr[i + 1] += indptr[i];
        }

        Ok(CsrOperator {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        })
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Conjugate gradients on the (assumed SPD) matrix.
    fn cg_solve(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>> {
        let n = self.nrows;
        let y_norm = vec_norm(y.view());
        let mut x = Array1::zeros(n);
        if y_norm == 0.0 {
            return Ok(x);
        }

        let mut r = y.clone();
        let mut p = r.clone();
        let mut rs_old = r.dot(&r);

        for _ in 0..(10 * n).max(50) {
            let ap = self.apply(&p)?;
            let pap = p.dot(&ap);
            if pap <= 0.0 {
                return Err(HybridError::Operator(
                    "sparse covariance is not positive definite".to_string(),
                ));
            }
            let step = rs_old / pap;
            x.scaled_add(step, &p);
            r.scaled_add(-step, &ap);

            let rs_new = r.dot(&r);
            if rs_new.sqrt() < CG_TOL * y_norm {
                return Ok(x);
            }
            p = &r + &(&p * (rs_new / rs_old));
            rs_old = rs_new;
        }

        log::warn!(
            "CG on {n}x{n} covariance stopped at relative residual {:.3e}",
            rs_old.sqrt() / y_norm
        );
        Err(HybridError::Operator(format!(
            "sparse solve did not reach relative residual {CG_TOL:e}"
        )))
    }
}

impl LinearOperator for CsrOperator {
    fn nrows(&self) -> usize {
        self.nrows
    }

    fn ncols(&self) -> usize {
        self.ncols
    }

    fn apply(&self, x: &Array1<f64>) -> HybridResult<Array1<f64>> {
        ensure_len("sparse apply", self.ncols, x.len())?;
        let mut y = Array1::zeros(self.nrows);
        for i in 0..self.nrows {
            let mut sum = 0.0;
            for idx in self.indptr[i]..self.indptr[i + 1] {
                sum += self.data[idx] * x[self.indices[idx]];
            }
            y[i] = sum;
        }
        Ok(y)
    }

    fn apply_transpose(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>> {
        ensure_len("sparse apply_transpose", self.nrows, y.len())?;
        let mut x = Array1::zeros(self.ncols);
        for i in 0..self.nrows {
            let yi = y[i];
            for idx in self.indptr[i]..self.indptr[i + 1] {
                x[self.indices[idx]] += self.data[idx] * yi;
            }
        }
        Ok(x)
    }
}

impl CovarianceOperator for CsrOperator {
    fn solve(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>> {
        if self.nrows != self.ncols {
            return Err(HybridError::Operator(format!(
                "cannot invert a {}x{} sparse matrix",
                self.nrows, self.ncols
            )));
        }
        ensure_len("sparse solve", self.nrows, y.len())?;
        self.cg_solve(y)
    }
}

// ───────────────────────────── black box ────────────────────────────

type VecFn = Box<dyn Fn(&Array1<f64>) -> Array1<f64>>;

/// Operator given by a pair of closures (and optionally an inverse).
pub struct FnOperator {
    nrows: usize,
    ncols: usize,
    forward: VecFn,
    adjoint: VecFn,
    inverse: Option<VecFn>,
    shape: Option<Vec<usize>>,
}

impl FnOperator {
    pub fn new<F, G>(nrows: usize, ncols: usize, forward: F, adjoint: G) -> Self
    where
        F: Fn(&Array1<f64>) -> Array1<f64> + 'static,
        G: Fn(&Array1<f64>) -> Array1<f64> + 'static,
    {
        FnOperator {
            nrows,
            ncols,
            forward: Box::new(forward),
            adjoint: Box::new(adjoint),
            inverse: None,
            shape: None,
        }
    }

    pub fn with_solve<H>(mut self, inverse: H) -> Self
    where
        H: Fn(&Array1<f64>) -> Array1<f64> + 'static,
    {
        self.inverse = Some(Box::new(inverse));
        self
    }

    /// Attach the image shape of the unknown; its size must equal `ncols`.
    pub fn with_input_shape(mut self, shape: Vec<usize>) -> HybridResult<Self> {
        let size: usize = shape.iter().product();
        if size != self.ncols {
            return Err(HybridError::ConfigError(format!(
                "input shape {shape:?} has {size} entries, operator has {} columns",
                self.ncols
            )));
        }
        self.shape = Some(shape);
        Ok(self)
    }
}

impl LinearOperator for FnOperator {
    fn nrows(&self) -> usize {
        self.nrows
    }

    fn ncols(&self) -> usize {
        self.ncols
    }

    fn apply(&self, x: &Array1<f64>) -> HybridResult<Array1<f64>> {
        ensure_len("function operator input", self.ncols, x.len())?;
        let y = (self.forward)(x);
        ensure_len("function operator output", self.nrows, y.len())?;
        Ok(y)
    }

    fn apply_transpose(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>> {
        ensure_len("function operator adjoint input", self.nrows, y.len())?;
        let x = (self.adjoint)(y);
        ensure_len("function operator adjoint output", self.ncols, x.len())?;
        Ok(x)
    }

    fn input_shape(&self) -> Option<Vec<usize>> {
        self.shape.clone()
    }
}

impl CovarianceOperator for FnOperator {
    fn solve(&self, y: &Array1<f64>) -> HybridResult<Array1<f64>> {
        match &self.inverse {
            Some(inverse) => {
                ensure_len("function operator solve", self.nrows, y.len())?;
                let x = inverse(y);
                ensure_len("function operator solve output", self.ncols, x.len())?;
                Ok(x)
            }
            None => Err(HybridError::Operator(
                "function operator has no solve closure".to_string(),
            )),
        }
    }
}
