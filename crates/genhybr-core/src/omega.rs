// ─────────────────────────────────────────────────────────────────────
// GenHyBR — Adaptive WGCV Weight
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Per-iteration estimate of the weighted-GCV weight ω.
//!
//! Each estimate assumes the optimal parameter sits at a fixed point of
//! the current spectrum (full rank for TSVD, the smallest singular
//! value for Tikhonov) and solves dG/dα = 0 there for ω.  The driver
//! averages the estimates.

use genhybr_types::config::InnerSolverKind;
use genhybr_types::error::{ensure_len, HybridError, HybridResult};
use ndarray::Array1;

/// ω for projected coefficients `bhat` (length k+1) and singular
/// values `s` (length k).
pub fn find_omega(bhat: &Array1<f64>, s: &Array1<f64>, kind: InnerSolverKind) -> HybridResult<f64> {
    let n = s.len();
    let m = bhat.len();
    if n == 0 {
        return Err(HybridError::ConfigError(
            "omega estimate needs at least one singular value".to_string(),
        ));
    }
    ensure_len("omega projected coefficients", n + 1, m)?;
    let m_f = m as f64;

    match kind {
        InnerSolverKind::Tsvd => {
            let last = bhat[n - 1] * bhat[n - 1];
            let next = bhat[n] * bhat[n];
            Ok(m_f * last / (n as f64 * last + 2.0 * next))
        }
        InnerSolverKind::Tikhonov => {
            let alpha = s[n - 1];
            let alpha2 = alpha * alpha;
            let t0: f64 = bhat.iter().skip(n).map(|b| b * b).sum();

            let mut t1 = 0.0;
            let mut t3 = 0.0;
            let mut t4 = 0.0;
            let mut t5 = 0.0;
            let mut v2 = 0.0;
            for (&sj, &bj) in s.iter().zip(bhat.iter()) {
                let s2 = sj * sj;
                let tt = 1.0 / (s2 + alpha2);
                let tt3 = tt * tt * tt;
                t1 += s2 * tt;
                t3 += (bj * alpha * sj).powi(2) * tt3;
                t4 += (sj * tt).powi(2);
                t5 += (alpha2 * bj * tt).powi(2);
                v2 += (bj * sj).powi(2) * tt3;
            }
            Ok(m_f * alpha2 * v2 / (t1 * t3 + t4 * (t5 + t0)))
        }
        InnerSolverKind::None => Err(HybridError::UnsupportedSolver(
            "adaptive omega needs 'tsvd' or 'tikhonov', got 'none'".to_string(),
        )),
    }
}
