// ─────────────────────────────────────────────────────────────────────
// GenHyBR — Projected Problem Solvers
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Regularized solves of the small (k+1)×k problem  min ‖B f − β e₁‖.
//!
//! Everything works on the SVD of B: with b̂ = Uᵗ(β e₁) the Tikhonov
//! solution is f = Σ v_j s_j b̂_j / (s_j² + α²) and the TSVD solution
//! keeps the first j terms of f = Σ v_j b̂_j / s_j.

use genhybr_math::linalg::{pinv_solve, SvdFactors};
use genhybr_math::minimize::{bisect_nondecreasing, brent_minimize};
use genhybr_types::config::{InnerSolverKind, RegParam};
use genhybr_types::error::{ensure_len, HybridError, HybridResult};
use ndarray::Array1;

use crate::bidiag::combine_columns;
use crate::truth::GroundTruth;

const BRENT_TOL: f64 = 1e-8;
const BRENT_MAX_ITER: usize = 500;
const BISECT_MAX_ITER: usize = 200;
/// Singular values below this fraction of s₁ are treated as zero.
const RANK_CUTOFF: f64 = 1e-14;

/// Parameter-choice settings resolved by the driver for one iteration.
#[derive(Debug, Clone, Copy)]
pub struct ParameterChoice {
    pub method: RegParam,
    /// Effective WGCV weight (mean of the adaptive estimates, or fixed).
    pub omega: f64,
    /// Resolved noise standard deviation; only read by the discrepancy principle.
    pub noise_level: f64,
    pub discrepancy_safety: f64,
}

/// Inputs of one projected solve.
#[derive(Debug, Clone, Copy)]
pub struct ProjectedProblem<'a> {
    pub svd: &'a SvdFactors,
    /// β e₁, length k+1.
    pub rhs: &'a Array1<f64>,
    pub beta: f64,
    /// Columns of Q·V mapping f back to x.
    pub qv: &'a [Array1<f64>],
    /// Row count of the outer problem.
    pub m: usize,
    pub choice: ParameterChoice,
    pub truth: Option<&'a GroundTruth>,
}

impl ProjectedProblem<'_> {
    pub fn k(&self) -> usize {
        self.svd.s.len()
    }

    fn bhat(&self) -> HybridResult<Array1<f64>> {
        ensure_len("projected right-hand side", self.svd.u.nrows(), self.rhs.len())?;
        Ok(self.svd.project(self.rhs))
    }

    fn rank(&self) -> usize {
        self.svd.numerical_rank(RANK_CUTOFF)
    }

    fn discrepancy_target(&self) -> f64 {
        let c = &self.choice;
        c.discrepancy_safety * c.noise_level * (self.m as f64).sqrt()
    }

    fn truth(&self) -> HybridResult<&GroundTruth> {
        self.truth.ok_or_else(|| {
            HybridError::ConfigError("reg_param 'optimal' requires x_true".to_string())
        })
    }

    fn error_of(&self, truth: &GroundTruth, f: &Array1<f64>) -> f64 {
        match combine_columns(self.qv, f) {
            Ok(x) => truth.relative_error(&x),
            Err(_) => f64::INFINITY,
        }
    }
}

/// Projected solution and the parameter that produced it.
#[derive(Debug, Clone)]
pub struct ProjectedSolution {
    pub f: Array1<f64>,
    /// Tikhonov α, or the TSVD truncation level as f64.
    pub alpha: f64,
}

/// Solver for the projected problem.
pub trait ProjectedSolver {
    fn solve(&self, problem: &ProjectedProblem<'_>) -> HybridResult<ProjectedSolution>;
}

/// Solve with the built-in solver for `kind`.
pub fn solve_projected(
    kind: InnerSolverKind,
    problem: &ProjectedProblem<'_>,
) -> HybridResult<ProjectedSolution> {
    match kind {
        InnerSolverKind::None => solve_unregularized(problem),
        InnerSolverKind::Tsvd => TsvdSolver.solve(problem),
        InnerSolverKind::Tikhonov => TikhonovSolver.solve(problem),
    }
}

/// Minimum-norm least-squares solution of B f = β e₁.
pub fn solve_unregularized(problem: &ProjectedProblem<'_>) -> HybridResult<ProjectedSolution> {
    ensure_len("projected right-hand side", problem.svd.u.nrows(), problem.rhs.len())?;
    Ok(ProjectedSolution {
        f: pinv_solve(problem.svd, problem.rhs, RANK_CUTOFF),
        alpha: 0.0,
    })
}

// ── Tikhonov ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct TikhonovSolver;

impl TikhonovSolver {
    /// f(α) = Σ v_j s_j b̂_j / (s_j² + α²)
    pub fn coefficients(svd: &SvdFactors, bhat: &Array1<f64>, alpha: f64) -> Array1<f64> {
        let mut f = Array1::zeros(svd.v.nrows());
        let alpha2 = alpha * alpha;
        for (j, &sj) in svd.s.iter().enumerate() {
            let denom = sj * sj + alpha2;
            if denom > 0.0 {
                f.scaled_add(sj * bhat[j] / denom, &svd.v.column(j));
            }
        }
        f
    }

    /// ‖B f(α) − β e₁‖² through the filter factors.
    pub fn residual_sq(s: &Array1<f64>, bhat: &Array1<f64>, alpha: f64) -> f64 {
        let alpha2 = alpha * alpha;
        let mut total: f64 = bhat.iter().skip(s.len()).map(|b| b * b).sum();
        for (&sj, &bj) in s.iter().zip(bhat.iter()) {
            let denom = sj * sj + alpha2;
            let r = if denom > 0.0 { alpha2 * bj / denom } else { bj };
            total += r * r;
        }
        total
    }

    /// Projected weighted GCV functional.
    pub fn wgcv(s: &Array1<f64>, bhat: &Array1<f64>, alpha: f64, omega: f64) -> f64 {
        let alpha2 = alpha * alpha;
        let trace: f64 = s
            .iter()
            .map(|&sj| {
                let s2 = sj * sj;
                if s2 + alpha2 > 0.0 {
                    s2 / (s2 + alpha2)
                } else {
                    0.0
                }
            })
            .sum();
        let den = bhat.len() as f64 - omega * trace;
        Self::residual_sq(s, bhat, alpha) / (den * den)
    }

    fn choose_alpha(problem: &ProjectedProblem<'_>, bhat: &Array1<f64>) -> HybridResult<f64> {
        let s = &problem.svd.s;
        let s_max = s.first().copied().unwrap_or(0.0);

        let alpha = match problem.choice.method {
            RegParam::Fixed(alpha) => alpha,
            _ if s_max <= 0.0 => 0.0,
            RegParam::Gcv => {
                brent_minimize(
                    |a| Self::wgcv(s, bhat, a, 1.0),
                    0.0,
                    s_max,
                    BRENT_TOL,
                    BRENT_MAX_ITER,
                )
                .x_min
            }
            RegParam::WeightedGcv => {
                let omega = problem.choice.omega;
                brent_minimize(
                    |a| Self::wgcv(s, bhat, a, omega),
                    0.0,
                    s_max,
                    BRENT_TOL,
                    BRENT_MAX_ITER,
                )
                .x_min
            }
            RegParam::DiscrepancyPrinciple => {
                let target = problem.discrepancy_target().powi(2);
                bisect_nondecreasing(
                    |a| Self::residual_sq(s, bhat, a),
                    s_max * RANK_CUTOFF,
                    s_max * 1e4,
                    target,
                    BISECT_MAX_ITER,
                )
            }
            RegParam::Optimal => {
                let truth = problem.truth()?;
                brent_minimize(
                    |a| problem.error_of(truth, &Self::coefficients(problem.svd, bhat, a)),
                    0.0,
                    s_max,
                    BRENT_TOL,
                    BRENT_MAX_ITER,
                )
                .x_min
            }
        };
        Ok(alpha)
    }
}

impl ProjectedSolver for TikhonovSolver {
    fn solve(&self, problem: &ProjectedProblem<'_>) -> HybridResult<ProjectedSolution> {
        let bhat = problem.bhat()?;
        let alpha = Self::choose_alpha(problem, &bhat)?;
        Ok(ProjectedSolution {
            f: Self::coefficients(problem.svd, &bhat, alpha),
            alpha,
        })
    }
}

// ── Truncated SVD ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct TsvdSolver;

impl TsvdSolver {
    /// f = Σ_{j<level} v_j b̂_j / s_j
    pub fn coefficients(svd: &SvdFactors, bhat: &Array1<f64>, level: usize) -> Array1<f64> {
        let mut f = Array1::zeros(svd.v.nrows());
        for (j, &sj) in svd.s.iter().enumerate().take(level) {
            if sj > 0.0 {
                f.scaled_add(bhat[j] / sj, &svd.v.column(j));
            }
        }
        f
    }

    /// Σ_{l>level} b̂_l² for every level 0..=k (index = level).
    fn tails(bhat: &Array1<f64>, k: usize) -> Vec<f64> {
        let mut tails = vec![0.0; k + 1];
        let mut acc: f64 = bhat.iter().skip(k).map(|b| b * b).sum();
        tails[k] = acc;
        for level in (0..k).rev() {
            acc += bhat[level] * bhat[level];
            tails[level] = acc;
        }
        tails
    }

    /// Level in 1..=rank minimizing the discrete weighted GCV.
    fn wgcv_level(tails: &[f64], rank: usize, rows: usize, omega: f64) -> usize {
        let mut best = (rank, f64::INFINITY);
        for level in 1..=rank {
            let den = rows as f64 - omega * level as f64;
            if den <= 0.0 {
                continue;
            }
            let g = tails[level] / (den * den);
            if g < best.1 {
                best = (level, g);
            }
        }
        best.0
    }

    fn choose_level(problem: &ProjectedProblem<'_>, bhat: &Array1<f64>) -> HybridResult<usize> {
        let k = problem.k();
        let rank = problem.rank();
        if rank == 0 {
            return Ok(0);
        }
        let tails = Self::tails(bhat, k);
        let rows = bhat.len();

        let level = match problem.choice.method {
            RegParam::Fixed(value) => (value.round() as usize).clamp(1, rank),
            RegParam::Gcv => Self::wgcv_level(&tails, rank, rows, 1.0),
            RegParam::WeightedGcv => Self::wgcv_level(&tails, rank, rows, problem.choice.omega),
            RegParam::DiscrepancyPrinciple => {
                let target = problem.discrepancy_target().powi(2);
                (1..=rank).find(|&l| tails[l] <= target).unwrap_or(rank)
            }
            RegParam::Optimal => {
                let truth = problem.truth()?;
                let mut best = (rank, f64::INFINITY);
                for level in 1..=rank {
                    let coeffs = Self::coefficients(problem.svd, bhat, level);
                    let err = problem.error_of(truth, &coeffs);
                    if err < best.1 {
                        best = (level, err);
                    }
                }
                best.0
            }
        };
        Ok(level)
    }
}

impl ProjectedSolver for TsvdSolver {
    fn solve(&self, problem: &ProjectedProblem<'_>) -> HybridResult<ProjectedSolution> {
        let bhat = problem.bhat()?;
        let level = Self::choose_level(problem, &bhat)?;
        Ok(ProjectedSolution {
            f: Self::coefficients(problem.svd, &bhat, level),
            alpha: level as f64,
        })
    }
}
