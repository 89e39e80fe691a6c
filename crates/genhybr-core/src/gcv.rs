// ─────────────────────────────────────────────────────────────────────
// GenHyBR — GCV Stopping Functional
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! GCV value of the full-size problem, evaluated from the projected SVD.
//!
//! The driver tracks this value per iteration and stops when the curve
//! flattens or bottoms out.

use genhybr_types::config::InnerSolverKind;
use genhybr_types::error::{ensure_len, HybridError, HybridResult};
use ndarray::Array1;

/// GCV stopping value at iteration k.
///
/// `u` is the first row of the projected U (length k+1), `s` the k
/// singular values of B, `beta` the weighted norm of b, and `m`/`n` the
/// outer problem sizes.  For TSVD `alpha` is the truncation level.
pub fn gcv_stop_value(
    alpha: f64,
    u: &Array1<f64>,
    s: &Array1<f64>,
    beta: f64,
    m: usize,
    n: usize,
    kind: InnerSolverKind,
) -> HybridResult<f64> {
    let k = s.len();
    ensure_len("GCV first-row vector", k + 1, u.len())?;
    let beta2 = beta * beta;
    let m = m as f64;
    let n = n as f64;

    match kind {
        InnerSolverKind::Tikhonov => {
            let alpha2 = alpha * alpha;
            let mut resid = u[k] * u[k];
            let mut trace = 0.0;
            for (&sj, &uj) in s.iter().zip(u.iter()) {
                let s2 = sj * sj;
                let denom = s2 + alpha2;
                if denom > 0.0 {
                    let filtered = alpha2 * uj / denom;
                    resid += filtered * filtered;
                    trace += s2 / denom;
                } else {
                    // Zero singular value with alpha = 0: component left in the residual
                    resid += uj * uj;
                }
            }
            let num = beta2 * resid / n;
            let den = ((m - trace) / n).powi(2);
            Ok(num / den)
        }
        InnerSolverKind::Tsvd => {
            let level = (alpha.round().max(0.0) as usize).min(k);
            let tail: f64 = u.iter().skip(level).map(|v| v * v).sum();
            Ok(n * beta2 * tail / (m - level as f64).powi(2))
        }
        InnerSolverKind::None => Err(HybridError::UnsupportedSolver(
            "GCV stopping needs a regularizing inner solver, got 'none'".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_tikhonov_zero_alpha_keeps_only_last_component() {
        let u = arr1(&[0.6, 0.0, 0.8]);
        let s = arr1(&[2.0, 1.0]);
        let g = gcv_stop_value(0.0, &u, &s, 1.0, 10, 8, InnerSolverKind::Tikhonov).unwrap();
        // num = 0.64/8, den = ((10 - 2)/8)^2 = 1
        assert!((g - 0.08).abs() < 1e-14, "g = {g}");
    }

    #[test]
    fn test_tikhonov_hand_computed() {
        let u = arr1(&[0.5, 0.5, 0.5]);
        let s = arr1(&[1.0, 1.0]);
        let g = gcv_stop_value(1.0, &u, &s, 2.0, 6, 4, InnerSolverKind::Tikhonov).unwrap();
        // filtered = 0.25 each, resid = 2·0.0625 + 0.25 = 0.375
        // num = 4·0.375/4 = 0.375, trace = 1, den = (5/4)^2
        let expected = 0.375 / (1.25 * 1.25);
        assert!((g - expected).abs() < 1e-14, "g = {g}");
    }

    #[test]
    fn test_tsvd_truncation_tail() {
        let u = arr1(&[0.1, 0.2, 0.3, 0.4]);
        let s = arr1(&[3.0, 2.0, 1.0]);
        let g = gcv_stop_value(2.0, &u, &s, 1.0, 5, 4, InnerSolverKind::Tsvd).unwrap();
        let expected = 4.0 * (0.09 + 0.16) / 9.0;
        assert!((g - expected).abs() < 1e-14, "g = {g}");
    }

    #[test]
    fn test_none_is_unsupported() {
        let u = arr1(&[1.0, 0.0]);
        let s = arr1(&[1.0]);
        let err = gcv_stop_value(0.0, &u, &s, 1.0, 2, 2, InnerSolverKind::None).unwrap_err();
        assert!(matches!(err, HybridError::UnsupportedSolver(_)));
    }

    #[test]
    fn test_length_mismatch() {
        let err = gcv_stop_value(
            0.1,
            &arr1(&[1.0, 0.0]),
            &arr1(&[1.0, 0.5]),
            1.0,
            4,
            4,
            InnerSolverKind::Tikhonov,
        )
        .unwrap_err();
        assert!(matches!(err, HybridError::DimensionMismatch { .. }));
    }
}
