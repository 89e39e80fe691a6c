// ─────────────────────────────────────────────────────────────────────
// GenHyBR — Hybrid Iteration Driver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Hybrid projection driver.
//!
//! Each iteration expands the gen-GK basis by one vector, solves the
//! projected problem with the configured inner solver, tracks the GCV
//! stopping value and decides whether to stop.  With ground truth the
//! run continues to the iteration cap after the first stop so the full
//! error history is available; the returned solution is still the one
//! selected by that first stop.

use genhybr_math::linalg::{hypot_all, svd_full, vec_norm};
use genhybr_math::noise::estimate_noise_haar;
use genhybr_math::operator::{CovarianceOperator, LinearOperator};
use genhybr_types::config::{HybridConfig, NoiseLevel, OmegaMode, RegParam};
use genhybr_types::error::{ensure_len, HybridError, HybridResult};
use ndarray::Array1;

use crate::bidiag::{BasisState, BidiagonalStep, GeneralizedGolubKahan};
use crate::gcv::gcv_stop_value;
use crate::omega::find_omega;
use crate::projected::{
    solve_projected, solve_unregularized, ParameterChoice, ProjectedProblem, ProjectedSolver,
};
use crate::record::{finalize, HybridOutput, IterationHistory, IterationSnapshot, RunLog};
use crate::stopping::{
    GcvMonitor, Iterate, RegularizationTrace, ResidualNorms, StopEvent, StopFlag,
};
use crate::truth::GroundTruth;

/// Operators and data of  min ‖A x − b‖²_{R⁻¹} + α²‖x‖²_{Q⁻¹}.
pub struct HybridProblem<'a> {
    a: &'a dyn LinearOperator,
    b: Array1<f64>,
    q: &'a dyn LinearOperator,
    r: &'a dyn CovarianceOperator,
    mask: Option<Vec<bool>>,
}

impl<'a> HybridProblem<'a> {
    pub fn builder() -> HybridProblemBuilder<'a> {
        HybridProblemBuilder::default()
    }

    pub fn nrows(&self) -> usize {
        self.a.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.a.ncols()
    }

    pub fn rhs(&self) -> &Array1<f64> {
        &self.b
    }

    pub fn mask(&self) -> Option<&[bool]> {
        self.mask.as_deref()
    }
}

#[derive(Default)]
pub struct HybridProblemBuilder<'a> {
    a: Option<&'a dyn LinearOperator>,
    b: Option<Array1<f64>>,
    q: Option<&'a dyn LinearOperator>,
    r: Option<&'a dyn CovarianceOperator>,
    mask: Option<Vec<bool>>,
}

impl<'a> HybridProblemBuilder<'a> {
    /// Forward operator A (m×n).
    pub fn forward(mut self, a: &'a dyn LinearOperator) -> Self {
        self.a = Some(a);
        self
    }

    pub fn rhs(mut self, b: Array1<f64>) -> Self {
        self.b = Some(b);
        self
    }

    /// Prior covariance Q (n×n).
    pub fn prior(mut self, q: &'a dyn LinearOperator) -> Self {
        self.q = Some(q);
        self
    }

    /// Noise covariance R (m×m); must support `solve`.
    pub fn noise(mut self, r: &'a dyn CovarianceOperator) -> Self {
        self.r = Some(r);
        self
    }

    /// Field entries compared against ground truth.
    pub fn mask(mut self, mask: Vec<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn build(self) -> HybridResult<HybridProblem<'a>> {
        let missing = |what: &str| HybridError::ConfigError(format!("{what} is missing"));
        let a = self.a.ok_or_else(|| missing("forward operator A"))?;
        let b = self.b.ok_or_else(|| missing("right-hand side b"))?;
        let q = self.q.ok_or_else(|| missing("prior covariance Q"))?;
        let r = self.r.ok_or_else(|| missing("noise covariance R"))?;

        let (m, n) = (a.nrows(), a.ncols());
        ensure_len("right-hand side b", m, b.len())?;
        ensure_len("prior covariance Q rows", n, q.nrows())?;
        ensure_len("prior covariance Q cols", n, q.ncols())?;
        ensure_len("noise covariance R rows", m, r.nrows())?;
        ensure_len("noise covariance R cols", m, r.ncols())?;

        Ok(HybridProblem {
            a,
            b,
            q,
            r,
            mask: self.mask,
        })
    }
}

/// Hybrid solver with configurable collaborators.
pub struct HybridSolver {
    config: HybridConfig,
    step: Box<dyn BidiagonalStep>,
    projected: Option<Box<dyn ProjectedSolver>>,
}

impl HybridSolver {
    pub fn new(config: HybridConfig) -> Self {
        let step = Box::new(GeneralizedGolubKahan::new(config.reorthogonalize));
        HybridSolver {
            config,
            step,
            projected: None,
        }
    }

    /// Replace the bidiagonalization step.
    pub fn with_step<S: BidiagonalStep + 'static>(mut self, step: S) -> Self {
        self.step = Box::new(step);
        self
    }

    /// Replace the built-in solver used on regularized iterations.
    pub fn with_projected_solver<P: ProjectedSolver + 'static>(mut self, solver: P) -> Self {
        self.projected = Some(Box::new(solver));
        self
    }

    pub fn solve(&self, problem: &HybridProblem<'_>) -> HybridResult<HybridOutput> {
        self.solve_with_observer(problem, |_| {})
    }

    pub fn solve_with_observer<F>(
        &self,
        problem: &HybridProblem<'_>,
        mut observer: F,
    ) -> HybridResult<HybridOutput>
    where
        F: FnMut(&IterationSnapshot),
    {
        let cfg = &self.config;
        cfg.validate()?;

        let (m, n) = (problem.nrows(), problem.ncols());
        let max_iter = cfg.resolved_max_iterations(m, n);
        let truth = self.ground_truth(problem)?;
        let noise_level = self.resolve_noise_level(problem);

        let mut state = BasisState::new(&problem.b, problem.r, max_iter)?;
        let beta = state.beta();
        let reg_start = cfg.begin_reg - 1;

        let mut trace = RegularizationTrace::with_capacity(max_iter);
        let mut history = IterationHistory::with_capacity(max_iter);
        let mut monitor = GcvMonitor::new(cfg.flat_tol, cfg.min_tol);
        let mut omega_sum = 0.0;
        let mut omega_count = 0usize;
        let mut norma = 0.0;
        let mut previous: Option<Iterate> = None;
        let mut first_stop: Option<StopEvent> = None;

        log::info!(
            "hybrid solve: {m}x{n}, inner solver {}, max {max_iter} iterations, beta = {beta:.6e}",
            cfg.inner_solver
        );

        for k in 1..=max_iter {
            self.step.expand(&mut state, problem.a, problem.q, problem.r)?;
            let svd = svd_full(&state.bidiagonal());
            let mut rhs: Array1<f64> = Array1::zeros(k + 1);
            rhs[0] = beta;

            let regularize = cfg.inner_solver.is_regularizing() && k >= reg_start;
            let weighted = cfg.reg_param == RegParam::WeightedGcv;

            let omega = match cfg.omega {
                _ if !weighted => 1.0,
                OmegaMode::Fixed(w) => w,
                OmegaMode::Adaptive if regularize => {
                    let w = find_omega(&svd.project(&rhs), &svd.s, cfg.inner_solver)?;
                    if w.is_finite() {
                        omega_sum += w;
                        omega_count += 1;
                    } else {
                        log::warn!("omega estimate at iteration {k} is {w}; excluded from mean");
                    }
                    history.omegas.push(w);
                    if omega_count > 0 {
                        omega_sum / omega_count as f64
                    } else {
                        1.0
                    }
                }
                OmegaMode::Adaptive => 1.0,
            };

            let projected = ProjectedProblem {
                svd: &svd,
                rhs: &rhs,
                beta,
                qv: &state.qv,
                m,
                choice: ParameterChoice {
                    method: cfg.reg_param,
                    omega,
                    noise_level,
                    discrepancy_safety: cfg.discrepancy_safety,
                },
                truth: truth.as_ref(),
            };
            let solution = if regularize {
                match &self.projected {
                    Some(custom) => custom.solve(&projected)?,
                    None => solve_projected(cfg.inner_solver, &projected)?,
                }
            } else {
                solve_unregularized(&projected)?
            };

            let gcv = if regularize {
                let g = gcv_stop_value(
                    solution.alpha,
                    &svd.u_first_row(),
                    &svd.s,
                    beta,
                    m,
                    n,
                    cfg.inner_solver,
                )?;
                trace.push(k, solution.alpha, g);
                Some(g)
            } else {
                None
            };

            let x = state.solution(&solution.f)?;
            let residual = &problem.b - &problem.a.apply(&x)?;
            let normr = vec_norm(residual.view());
            let normar = vec_norm(problem.a.apply_transpose(&residual)?.view());
            let normx = vec_norm(x.view());
            if let Some((alpha_k, beta_next)) = state.newest_entries() {
                norma = hypot_all(&[norma, alpha_k, beta_next]);
            }

            let snapshot = IterationSnapshot {
                iteration: k,
                alpha: regularize.then_some(solution.alpha),
                gcv,
                omega: regularize.then_some(omega),
                residual_norm: normr,
                solution_norm: normx,
                error_norm: truth.as_ref().map(|t| t.relative_error(&x)),
            };
            history.record(&snapshot);
            log::debug!(
                "iter {k}: alpha = {:.6e}, gcv = {}, |r| = {normr:.6e}, |x| = {normx:.6e}",
                solution.alpha,
                gcv.map_or_else(|| "-".to_string(), |g| format!("{g:.6e}"))
            );
            observer(&snapshot);

            let current = Iterate {
                iteration: k,
                x,
                alpha: solution.alpha,
            };

            if first_stop.is_none() {
                let mut event = if gcv.is_some() {
                    monitor.observe(&trace, &current, previous.as_ref())
                } else {
                    None
                };
                let norms = ResidualNorms {
                    normr,
                    normar,
                    norma,
                    normx,
                };
                if event.is_none() && norms.converged(beta, cfg.res_tol) {
                    event = Some(StopEvent {
                        flag: StopFlag::Residual,
                        iterate: current.clone(),
                    });
                }

                if let Some(stop) = event {
                    if truth.is_none() {
                        return Ok(finalize(
                            stop,
                            RunLog {
                                trace,
                                history,
                                state: &state,
                                keep_basis: cfg.keep_basis,
                                input_shape: problem.a.input_shape(),
                                truncate: true,
                            },
                        ));
                    }
                    log::info!(
                        "{} at iteration {}; ground truth supplied, continuing to {max_iter}",
                        stop.flag,
                        stop.iterate.iteration
                    );
                    first_stop = Some(stop);
                }
            }

            previous = Some(current);
        }

        let stop = match first_stop {
            Some(stop) => stop,
            None => StopEvent {
                flag: StopFlag::IterationCap,
                iterate: previous.ok_or_else(|| {
                    HybridError::ConfigError("no iterations were run".to_string())
                })?,
            },
        };
        let truncate = truth.is_none();
        Ok(finalize(
            stop,
            RunLog {
                trace,
                history,
                state: &state,
                keep_basis: cfg.keep_basis,
                input_shape: problem.a.input_shape(),
                truncate,
            },
        ))
    }

    fn ground_truth(&self, problem: &HybridProblem<'_>) -> HybridResult<Option<GroundTruth>> {
        let cfg = &self.config;
        let n = problem.ncols();
        if let Some(mask) = problem.mask() {
            let field_len = n.saturating_sub(cfg.bias_len);
            if mask.len() != field_len {
                return Err(HybridError::ConfigError(format!(
                    "mask has {} entries, field has {field_len}",
                    mask.len()
                )));
            }
        }
        cfg.x_true
            .as_deref()
            .map(|x_true| GroundTruth::new(x_true, problem.mask(), n, cfg.bias_len))
            .transpose()
    }

    fn resolve_noise_level(&self, problem: &HybridProblem<'_>) -> f64 {
        if self.config.reg_param != RegParam::DiscrepancyPrinciple {
            return 0.0;
        }
        match self.config.noise_level {
            NoiseLevel::Fixed(level) => level,
            NoiseLevel::Estimated => {
                let level = estimate_noise_haar(&problem.b);
                log::info!("estimated noise level {level:.6e} from the right-hand side");
                level
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genhybr_math::operator::IdentityOperator;
    use genhybr_types::config::InnerSolverKind;
    use ndarray::{arr1, Array2};

    #[test]
    fn test_builder_names_missing_input() {
        let a = IdentityOperator::new(3);
        let err = HybridProblem::builder()
            .forward(&a)
            .rhs(arr1(&[1.0, 2.0, 3.0]))
            .noise(&a)
            .build()
            .err()
            .expect("missing Q must fail");
        match err {
            HybridError::ConfigError(msg) => assert!(msg.contains("prior covariance Q"), "{msg}"),
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_builder_checks_dimensions() {
        let a = Array2::<f64>::eye(3);
        let q = IdentityOperator::new(3);
        let r = IdentityOperator::new(4);
        let err = HybridProblem::builder()
            .forward(&a)
            .rhs(arr1(&[1.0, 2.0, 3.0]))
            .prior(&q)
            .noise(&r)
            .build()
            .err()
            .expect("R of the wrong size must fail");
        assert!(matches!(err, HybridError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_identity_converges_in_one_iteration() {
        let a = IdentityOperator::new(4);
        let problem = HybridProblem::builder()
            .forward(&a)
            .rhs(arr1(&[1.0, -2.0, 0.5, 3.0]))
            .prior(&a)
            .noise(&a)
            .build()
            .unwrap();
        let config = HybridConfig {
            inner_solver: InnerSolverKind::None,
            ..Default::default()
        };
        let out = HybridSolver::new(config).solve(&problem).unwrap();
        assert_eq!(out.record.flag, StopFlag::Residual);
        assert_eq!(out.record.iterations, 1);
        for (xi, bi) in out.x.iter().zip(problem.rhs().iter()) {
            assert!((xi - bi).abs() < 1e-12);
        }
    }

    #[test]
    fn test_invalid_config_rejected_before_iterating() {
        let a = IdentityOperator::new(2);
        let problem = HybridProblem::builder()
            .forward(&a)
            .rhs(arr1(&[1.0, 1.0]))
            .prior(&a)
            .noise(&a)
            .build()
            .unwrap();
        let config = HybridConfig {
            begin_reg: 1,
            ..Default::default()
        };
        let mut calls = 0;
        let err = HybridSolver::new(config)
            .solve_with_observer(&problem, |_| calls += 1)
            .unwrap_err();
        assert!(matches!(err, HybridError::ConfigError(_)));
        assert_eq!(calls, 0);
    }
}
