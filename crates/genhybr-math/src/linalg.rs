// ─────────────────────────────────────────────────────────────────────
// GenHyBR — Linear Algebra
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Linear algebra utilities.
//!
//! Full SVD of the small projected matrices, pseudo-inverse solves,
//! Cholesky factorization for explicit covariance matrices.

use genhybr_types::error::{HybridError, HybridResult};
use ndarray::{Array1, Array2, ArrayView1};

/// Jacobi sweeps before giving up on further orthogonalization.
const MAX_SWEEPS: usize = 60;

/// Relative off-diagonal size below which a column pair counts as orthogonal.
const JACOBI_TOL: f64 = 1e-15;

/// Residual norm required to accept a completion vector.
const COMPLETION_TOL: f64 = 1e-8;

/// Full singular value decomposition A = U · diag(s) · Vᵗ.
///
/// `u` is square (m×m), `v` is square (n×n), `s` holds min(m, n)
/// singular values in descending order.
#[derive(Debug, Clone)]
pub struct SvdFactors {
    pub u: Array2<f64>,
    pub s: Array1<f64>,
    pub v: Array2<f64>,
}

impl SvdFactors {
    /// Uᵗ·b.
    pub fn project(&self, b: &Array1<f64>) -> Array1<f64> {
        self.u.t().dot(b)
    }

    /// First row of U.
    pub fn u_first_row(&self) -> Array1<f64> {
        self.u.row(0).to_owned()
    }

    /// Number of singular values above `cutoff · s[0]`.
    pub fn numerical_rank(&self, cutoff: f64) -> usize {
        let s_max = self.s.first().copied().unwrap_or(0.0);
        self.s.iter().filter(|&&s| s > cutoff * s_max && s > 0.0).count()
    }
}

#[inline]
fn col_dot(a: &Array2<f64>, p: usize, q: usize) -> f64 {
    a.column(p).dot(&a.column(q))
}

/// Rotate columns p and q of `a` in place.
#[inline]
fn rotate_columns(a: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    for i in 0..a.nrows() {
        let ap = a[[i, p]];
        let aq = a[[i, q]];
        a[[i, p]] = c * ap - s * aq;
        a[[i, q]] = s * ap + c * aq;
    }
}

/// Extend the leading `filled` orthonormal columns of `u` to a full basis.
///
/// Columns at index >= `filled` are overwritten with unit vectors
/// orthogonal to everything before them.
fn complete_basis(u: &mut Array2<f64>, filled: usize) {
    let m = u.nrows();
    let mut next = filled;
    let mut candidate = 0;
    while next < m && candidate < m {
        let mut w: Array1<f64> = Array1::zeros(m);
        w[candidate] = 1.0;
        candidate += 1;

        // Two passes of modified Gram-Schmidt
        for _ in 0..2 {
            for j in 0..next {
                let col = u.column(j);
                let proj = col.dot(&w);
                w.scaled_add(-proj, &col);
            }
        }

        let norm = vec_norm(w.view());
        if norm > COMPLETION_TOL {
            u.column_mut(next).assign(&(w / norm));
            next += 1;
        }
    }
}

/// Full SVD by one-sided Jacobi rotations.
///
/// Orthogonalizes the columns of A directly instead of forming AᵗA, so
/// small singular values keep their relative accuracy.  Intended for the
/// (k+1)×k bidiagonal matrices of the projected problem.
pub fn svd_full(a: &Array2<f64>) -> SvdFactors {
    let (m, n) = a.dim();
    if m < n {
        let t = svd_full(&a.t().to_owned());
        return SvdFactors {
            u: t.v,
            s: t.s,
            v: t.u,
        };
    }

    let mut w = a.clone();
    let mut v = Array2::eye(n);

    for _ in 0..MAX_SWEEPS {
        let mut rotated = false;
        for p in 0..n {
            for q in (p + 1)..n {
                let alpha = col_dot(&w, p, p);
                let beta = col_dot(&w, q, q);
                let gamma = col_dot(&w, p, q);
                if gamma == 0.0 || gamma.abs() <= JACOBI_TOL * (alpha * beta).sqrt() {
                    continue;
                }
                rotated = true;

                let zeta = (beta - alpha) / (2.0 * gamma);
                let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;

                rotate_columns(&mut w, p, q, c, s);
                rotate_columns(&mut v, p, q, c, s);
            }
        }
        if !rotated {
            break;
        }
    }

    // Column norms are the singular values
    let norms: Vec<f64> = (0..n).map(|j| vec_norm(w.column(j))).collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        norms[j]
            .partial_cmp(&norms[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let s_max = order.first().map(|&j| norms[j]).unwrap_or(0.0);
    let floor = s_max * f64::EPSILON * m as f64;

    let mut s: Array1<f64> = Array1::zeros(n);
    let mut v_sorted: Array2<f64> = Array2::zeros((n, n));
    let mut u: Array2<f64> = Array2::zeros((m, m));
    let mut filled = 0;
    for (idx, &col) in order.iter().enumerate() {
        s[idx] = norms[col];
        v_sorted.column_mut(idx).assign(&v.column(col));
        if norms[col] > floor && norms[col] > 0.0 {
            u.column_mut(idx).assign(&(&w.column(col) / norms[col]));
            filled = idx + 1;
        }
    }

    complete_basis(&mut u, filled);

    SvdFactors { u, s, v: v_sorted }
}

/// Minimum-norm least-squares solution of A x = b from its SVD.
///
/// Singular values at or below `cutoff · s[0]` are discarded.
pub fn pinv_solve(svd: &SvdFactors, b: &Array1<f64>, cutoff: f64) -> Array1<f64> {
    let n = svd.v.nrows();
    let bhat = svd.project(b);
    let s_max = svd.s.first().copied().unwrap_or(0.0);
    let mut x = Array1::zeros(n);
    for (idx, &sigma) in svd.s.iter().enumerate() {
        if sigma > cutoff * s_max && sigma > 0.0 {
            x.scaled_add(bhat[idx] / sigma, &svd.v.column(idx));
        }
    }
    x
}

/// Lower-triangular Cholesky factor L with A = L·Lᵗ.
pub fn cholesky_lower(a: &Array2<f64>) -> HybridResult<Array2<f64>> {
    let (n, cols) = a.dim();
    if n != cols {
        return Err(HybridError::LinAlg(format!(
            "Cholesky needs a square matrix, got {n}x{cols}"
        )));
    }
    let mut l = Array2::zeros((n, n));
    for j in 0..n {
        let mut diag = a[[j, j]];
        for k in 0..j {
            diag -= l[[j, k]] * l[[j, k]];
        }
        if diag <= 0.0 || !diag.is_finite() {
            return Err(HybridError::LinAlg(format!(
                "matrix is not positive definite (pivot {j} = {diag})"
            )));
        }
        let ljj = diag.sqrt();
        l[[j, j]] = ljj;
        for i in (j + 1)..n {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = sum / ljj;
        }
    }
    Ok(l)
}

/// Solve L·Lᵗ x = b given the lower Cholesky factor.
pub fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    // Forward substitution: L y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * y[k];
        }
        y[i] = sum / l[[i, i]];
    }
    // Back substitution: Lᵗ x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Euclidean (L2) norm.
#[inline]
pub fn vec_norm(v: ArrayView1<'_, f64>) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Euclidean norm of a short list of scalars, e.g. the running ‖B‖ estimate.
#[inline]
pub fn hypot_all(values: &[f64]) -> f64 {
    values.iter().map(|x| x * x).sum::<f64>().sqrt()
}
