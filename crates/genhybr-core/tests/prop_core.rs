// ─────────────────────────────────────────────────────────────────────
// GenHyBR — Property-Based Tests (proptest) for genhybr-core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for genhybr-core using proptest.
//!
//! Covers: gen-GK recurrence, GCV stopping value, Tikhonov residual
//! monotonicity, driver iteration bounds.

use genhybr_core::bidiag::{BasisState, BidiagonalStep, GeneralizedGolubKahan};
use genhybr_core::gcv::gcv_stop_value;
use genhybr_core::projected::TikhonovSolver;
use genhybr_core::{HybridProblem, HybridSolver};
use genhybr_math::operator::{DiagonalOperator, IdentityOperator};
use genhybr_types::config::{HybridConfig, InnerSolverKind};
use ndarray::{Array1, Array2};
use proptest::prelude::*;

fn dense(rows: usize, cols: usize, seed: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        let base = if i == j { 2.0 } else { 0.0 };
        base + seed[(i * cols + j) % seed.len()]
    })
}

// ── Bidiagonalization Properties ─────────────────────────────────────

proptest! {
    /// A·QV_k = U_{k+1}·B_k with weighted Q and R.
    #[test]
    fn gk_recurrence_holds(
        rows in 6usize..12,
        cols in 4usize..8,
        seed in prop::collection::vec(-0.5f64..0.5, 16),
        weights in prop::collection::vec(0.5f64..2.0, 12),
    ) {
        let a = dense(rows, cols, &seed);
        let q = DiagonalOperator::new(Array1::from_shape_fn(cols, |i| weights[i]));
        let r = DiagonalOperator::new(Array1::from_shape_fn(rows, |i| weights[i % weights.len()]));
        let b = Array1::from_shape_fn(rows, |i| 1.0 + 0.1 * i as f64);

        let mut state = BasisState::new(&b, &r, 3).unwrap();
        let step = GeneralizedGolubKahan::new(true);
        for _ in 0..3 {
            step.expand(&mut state, &a, &q, &r).unwrap();
        }

        let mut qv = Array2::zeros((cols, 3));
        for (j, col) in state.qv.iter().enumerate() {
            qv.column_mut(j).assign(col);
        }
        let lhs = a.dot(&qv);
        let rhs = state.u_matrix().dot(&state.bidiagonal());
        for (l, r) in lhs.iter().zip(rhs.iter()) {
            prop_assert!((l - r).abs() < 1e-9, "A·QV = {}, U·B = {}", l, r);
        }
    }
}

// ── Projected Problem Properties ─────────────────────────────────────

proptest! {
    /// GCV stopping value is finite and non-negative for alpha > 0.
    #[test]
    fn gcv_value_nonnegative(
        s in prop::collection::vec(0.01f64..10.0, 1..8),
        alpha in 1e-4f64..5.0,
        beta in 0.1f64..10.0,
    ) {
        let k = s.len();
        let u = Array1::from_shape_fn(k + 1, |i| 1.0 / (1.0 + i as f64));
        let s = Array1::from(s);
        let g = gcv_stop_value(alpha, &u, &s, beta, 100, 80, InnerSolverKind::Tikhonov).unwrap();
        prop_assert!(g.is_finite() && g >= 0.0, "G = {}", g);
    }

    /// The Tikhonov projected residual never decreases with alpha.
    #[test]
    fn tikhonov_residual_monotone(
        s in prop::collection::vec(0.01f64..10.0, 1..8),
        a1 in 0.0f64..5.0,
        delta in 0.0f64..5.0,
    ) {
        let k = s.len();
        let bhat = Array1::from_shape_fn(k + 1, |i| (i as f64 + 1.0).sin());
        let s = Array1::from(s);
        let r1 = TikhonovSolver::residual_sq(&s, &bhat, a1);
        let r2 = TikhonovSolver::residual_sq(&s, &bhat, a1 + delta);
        prop_assert!(r2 >= r1 - 1e-12, "{} < {}", r2, r1);
    }
}

// ── Driver Properties ────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// 1 ≤ iterations ≤ max_iterations and traces fit the reported count.
    #[test]
    fn driver_iterations_bounded(
        n in 8usize..20,
        max_iter in 1usize..10,
        seed in prop::collection::vec(-0.3f64..0.3, 16),
    ) {
        let a = dense(n, n, &seed);
        let b = Array1::from_shape_fn(n, |i| (0.4 * i as f64).cos() + 1.5);
        let eye = IdentityOperator::new(n);
        let problem = HybridProblem::builder()
            .forward(&a)
            .rhs(b)
            .prior(&eye)
            .noise(&eye)
            .build()
            .unwrap();
        let config = HybridConfig {
            max_iterations: Some(max_iter),
            ..Default::default()
        };
        let out = HybridSolver::new(config).solve(&problem).unwrap();
        let rec = &out.record;
        prop_assert!(rec.iterations >= 1 && rec.iterations <= max_iter);
        prop_assert_eq!(rec.rnrm.len(), rec.iterations);
        prop_assert!(rec.gcv.len() <= rec.iterations);
        prop_assert!(out.x.iter().all(|v| v.is_finite()));
    }
}
