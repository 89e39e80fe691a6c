// ─────────────────────────────────────────────────────────────────────
// GenHyBR — Generalized Golub-Kahan Bidiagonalization
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Generalized Golub-Kahan (gen-GK) bidiagonalization.
//!
//! Builds bases U (orthonormal in the R⁻¹ inner product) and V
//! (orthonormal in the Q inner product) together with the lower
//! bidiagonal matrix B such that
//!
//! ```text
//! β₁ u₁       = b
//! α_k v_k     = Aᵗ R⁻¹ u_k − β_k v_{k−1}
//! β_{k+1} u_{k+1} = A Q v_k − α_k u_k
//! ```
//!
//! After k expansions B is (k+1)×k with α on the diagonal and β on the
//! subdiagonal.  The solution of the original problem lives in the
//! span of QV = Q·V.

use genhybr_math::operator::{norm_m, CovarianceOperator, InverseOf, LinearOperator};
use genhybr_types::error::{ensure_len, HybridError, HybridResult};
use ndarray::{Array1, Array2};

/// α or β below this multiple of β₁ signals breakdown.
const BREAKDOWN_TOL: f64 = 1e-14;

/// Accumulated bidiagonalization state for one solve.
///
/// Column stores reserve capacity for the full iteration budget up
/// front, so expansion never reallocates.
#[derive(Debug, Clone)]
pub struct BasisState {
    /// u₁ … u_{k+1}
    pub u: Vec<Array1<f64>>,
    /// R⁻¹u_j, cached for Aᵗ products and reorthogonalization.
    rinv_u: Vec<Array1<f64>>,
    /// v₁ … v_k
    pub v: Vec<Array1<f64>>,
    /// Q·v₁ … Q·v_k
    pub qv: Vec<Array1<f64>>,
    /// α₁ … α_k
    pub alphas: Vec<f64>,
    /// β₁ … β_{k+1}; β₁ is the weighted norm of b.
    pub betas: Vec<f64>,
}

impl BasisState {
    /// Initialize u₁ = b / ‖b‖_{R⁻¹}.
    pub fn new<R>(b: &Array1<f64>, r: &R, capacity: usize) -> HybridResult<Self>
    where
        R: CovarianceOperator + ?Sized,
    {
        ensure_len("right-hand side vs noise covariance", r.nrows(), b.len())?;
        let beta = norm_m(b, &InverseOf(r))?;
        if beta <= 0.0 || !beta.is_finite() {
            return Err(HybridError::ConfigError(format!(
                "right-hand side has weighted norm {beta}; nothing to solve"
            )));
        }

        let mut u = Vec::with_capacity(capacity + 1);
        let mut rinv_u = Vec::with_capacity(capacity + 1);
        u.push(b / beta);
        rinv_u.push(r.solve(b)? / beta);

        let mut betas = Vec::with_capacity(capacity + 1);
        betas.push(beta);

        Ok(BasisState {
            u,
            rinv_u,
            v: Vec::with_capacity(capacity),
            qv: Vec::with_capacity(capacity),
            alphas: Vec::with_capacity(capacity),
            betas,
        })
    }

    /// Number of completed expansions k (columns of B).
    pub fn dim(&self) -> usize {
        self.v.len()
    }

    /// β₁ = ‖b‖_{R⁻¹}.
    pub fn beta(&self) -> f64 {
        self.betas[0]
    }

    /// Newest diagonal and subdiagonal entries (α_k, β_{k+1}).
    pub fn newest_entries(&self) -> Option<(f64, f64)> {
        let k = self.dim();
        if k == 0 {
            return None;
        }
        Some((self.alphas[k - 1], self.betas[k]))
    }

    /// Dense (k+1)×k lower bidiagonal matrix.
    pub fn bidiagonal(&self) -> Array2<f64> {
        let k = self.dim();
        let mut b = Array2::zeros((k + 1, k));
        for j in 0..k {
            b[[j, j]] = self.alphas[j];
            b[[j + 1, j]] = self.betas[j + 1];
        }
        b
    }

    /// x = QV·f
    pub fn solution(&self, f: &Array1<f64>) -> HybridResult<Array1<f64>> {
        combine_columns(&self.qv, f)
    }

    /// U as a dense m×(k+1) matrix.
    pub fn u_matrix(&self) -> Array2<f64> {
        stack_columns(&self.u)
    }

    /// V as a dense n×k matrix.
    pub fn v_matrix(&self) -> Array2<f64> {
        stack_columns(&self.v)
    }
}

/// Σ_j coeffs[j]·cols[j]
pub fn combine_columns(cols: &[Array1<f64>], coeffs: &Array1<f64>) -> HybridResult<Array1<f64>> {
    ensure_len("basis coefficients", cols.len(), coeffs.len())?;
    let len = cols.first().map(|c| c.len()).unwrap_or(0);
    let mut out = Array1::zeros(len);
    for (col, &c) in cols.iter().zip(coeffs.iter()) {
        out.scaled_add(c, col);
    }
    Ok(out)
}

fn stack_columns(cols: &[Array1<f64>]) -> Array2<f64> {
    let rows = cols.first().map(|c| c.len()).unwrap_or(0);
    let mut out = Array2::zeros((rows, cols.len()));
    for (j, col) in cols.iter().enumerate() {
        out.column_mut(j).assign(col);
    }
    out
}

/// One expansion of the bidiagonalization.
pub trait BidiagonalStep {
    /// Append v_{k+1}, u_{k+2}, α_{k+1}, β_{k+2} to `state`.
    fn expand(
        &self,
        state: &mut BasisState,
        a: &dyn LinearOperator,
        q: &dyn LinearOperator,
        r: &dyn CovarianceOperator,
    ) -> HybridResult<()>;
}

/// Default gen-GK recurrence with optional full reorthogonalization.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneralizedGolubKahan {
    pub reorthogonalize: bool,
}

impl GeneralizedGolubKahan {
    pub fn new(reorthogonalize: bool) -> Self {
        GeneralizedGolubKahan { reorthogonalize }
    }
}

impl BidiagonalStep for GeneralizedGolubKahan {
    fn expand(
        &self,
        state: &mut BasisState,
        a: &dyn LinearOperator,
        q: &dyn LinearOperator,
        r: &dyn CovarianceOperator,
    ) -> HybridResult<()> {
        let k = state.dim();
        let tiny = BREAKDOWN_TOL * state.beta();

        // v = Aᵗ R⁻¹ u_{k+1} − β_{k+1} v_k
        let mut v = a.apply_transpose(&state.rinv_u[k])?;
        if k > 0 {
            v.scaled_add(-state.betas[k], &state.v[k - 1]);
        }
        if self.reorthogonalize {
            // Q inner product: ⟨v_j, v⟩_Q = (Q v_j)ᵗ v
            for (vj, qvj) in state.v.iter().zip(state.qv.iter()) {
                let proj = qvj.dot(&v);
                v.scaled_add(-proj, vj);
            }
        }

        let mut qv = q.apply(&v)?;
        let mut alpha = v.dot(&qv).max(0.0).sqrt();
        if alpha <= tiny {
            log::warn!("gen-GK breakdown at iteration {}: alpha = {alpha:e}", k + 1);
            alpha = 0.0;
            v.fill(0.0);
            qv.fill(0.0);
        } else {
            v /= alpha;
            qv /= alpha;
        }

        // u = A Q v − α u_{k+1}
        let mut u = a.apply(&qv)?;
        u.scaled_add(-alpha, &state.u[k]);
        if self.reorthogonalize {
            // R⁻¹ inner product: ⟨u_j, u⟩_{R⁻¹} = (R⁻¹u_j)ᵗ u
            for (uj, rinv_uj) in state.u.iter().zip(state.rinv_u.iter()) {
                let proj = rinv_uj.dot(&u);
                u.scaled_add(-proj, uj);
            }
        }

        let mut rinv_u = r.solve(&u)?;
        let mut beta = u.dot(&rinv_u).max(0.0).sqrt();
        if beta <= tiny {
            log::warn!("gen-GK breakdown at iteration {}: beta = {beta:e}", k + 1);
            beta = 0.0;
            u.fill(0.0);
            rinv_u.fill(0.0);
        } else {
            u /= beta;
            rinv_u /= beta;
        }

        state.v.push(v);
        state.qv.push(qv);
        state.alphas.push(alpha);
        state.u.push(u);
        state.rinv_u.push(rinv_u);
        state.betas.push(beta);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genhybr_math::operator::{DiagonalOperator, IdentityOperator};
    use ndarray::{arr1, arr2};

    fn test_matrix() -> Array2<f64> {
        arr2(&[
            [2.0, 0.3, 0.0, 0.1],
            [0.1, 1.5, 0.2, 0.0],
            [0.0, 0.4, 1.0, 0.3],
            [0.2, 0.0, 0.1, 0.7],
            [0.1, 0.1, 0.0, 0.2],
        ])
    }

    #[test]
    fn test_initial_state() {
        let b = arr1(&[3.0, 4.0]);
        let state = BasisState::new(&b, &IdentityOperator::new(2), 5).unwrap();
        assert!((state.beta() - 5.0).abs() < 1e-14);
        assert_eq!(state.dim(), 0);
        assert!((state.u[0][0] - 0.6).abs() < 1e-14);
    }

    #[test]
    fn test_zero_rhs_rejected() {
        let b = Array1::zeros(3);
        let err = BasisState::new(&b, &IdentityOperator::new(3), 5).unwrap_err();
        assert!(matches!(err, HybridError::ConfigError(_)));
    }

    #[test]
    fn test_bidiagonal_grows_one_row_and_column() {
        let a = test_matrix();
        let b = arr1(&[1.0, 0.5, -0.2, 0.3, 0.8]);
        let q = IdentityOperator::new(4);
        let r = IdentityOperator::new(5);
        let mut state = BasisState::new(&b, &r, 4).unwrap();
        let step = GeneralizedGolubKahan::default();
        for k in 1..=3 {
            step.expand(&mut state, &a, &q, &r).unwrap();
            assert_eq!(state.bidiagonal().dim(), (k + 1, k));
            assert_eq!(state.u.len(), k + 1);
            assert_eq!(state.v.len(), k);
        }
    }

    #[test]
    fn test_recurrence_relation_holds() {
        // A·QV_k = U_{k+1}·B_k
        let a = test_matrix();
        let b = arr1(&[1.0, 0.5, -0.2, 0.3, 0.8]);
        let q = DiagonalOperator::new(arr1(&[1.0, 2.0, 0.5, 1.5]));
        let r = DiagonalOperator::new(arr1(&[0.5, 1.0, 2.0, 1.0, 0.8]));
        let mut state = BasisState::new(&b, &r, 3).unwrap();
        let step = GeneralizedGolubKahan::new(true);
        for _ in 0..3 {
            step.expand(&mut state, &a, &q, &r).unwrap();
        }

        let lhs = a.dot(&stack_columns(&state.qv));
        let rhs = state.u_matrix().dot(&state.bidiagonal());
        for i in 0..lhs.nrows() {
            for j in 0..lhs.ncols() {
                assert!(
                    (lhs[[i, j]] - rhs[[i, j]]).abs() < 1e-10,
                    "A·QV != U·B at ({i}, {j})"
                );
            }
        }
    }

    #[test]
    fn test_bases_orthonormal_in_weighted_products() {
        let a = test_matrix();
        let b = arr1(&[1.0, 0.5, -0.2, 0.3, 0.8]);
        let q = DiagonalOperator::new(arr1(&[1.0, 2.0, 0.5, 1.5]));
        let r = DiagonalOperator::new(arr1(&[0.5, 1.0, 2.0, 1.0, 0.8]));
        let mut state = BasisState::new(&b, &r, 3).unwrap();
        let step = GeneralizedGolubKahan::new(true);
        for _ in 0..3 {
            step.expand(&mut state, &a, &q, &r).unwrap();
        }

        for i in 0..state.v.len() {
            for j in 0..state.v.len() {
                let ip = state.v[i].dot(&state.qv[j]);
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((ip - expected).abs() < 1e-10, "VᵗQV[{i},{j}] = {ip}");
            }
        }
        for i in 0..state.u.len() {
            for j in 0..state.u.len() {
                let ip = state.u[i].dot(&r.solve(&state.u[j]).unwrap());
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((ip - expected).abs() < 1e-10, "UᵗR⁻¹U[{i},{j}] = {ip}");
            }
        }
    }

    #[test]
    fn test_identity_breakdown_is_clean() {
        // A = I: b spans an invariant subspace after one step
        let a = IdentityOperator::new(3);
        let b = arr1(&[1.0, 2.0, 2.0]);
        let r = IdentityOperator::new(3);
        let mut state = BasisState::new(&b, &r, 3).unwrap();
        let step = GeneralizedGolubKahan::default();
        step.expand(&mut state, &a, &a, &r).unwrap();
        let (alpha, beta) = state.newest_entries().unwrap();
        assert!((alpha - 1.0).abs() < 1e-14);
        assert_eq!(beta, 0.0);

        // A second expansion must stay finite
        step.expand(&mut state, &a, &a, &r).unwrap();
        assert!(state.bidiagonal().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_combine_columns_length_check() {
        let cols = vec![arr1(&[1.0, 0.0]), arr1(&[0.0, 1.0])];
        let x = combine_columns(&cols, &arr1(&[2.0, 3.0])).unwrap();
        assert_eq!(x, arr1(&[2.0, 3.0]));
        assert!(combine_columns(&cols, &arr1(&[1.0])).is_err());
    }
}
