// ─────────────────────────────────────────────────────────────────────
// GenHyBR — Output Record
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Diagnostics collected during a solve and the final output.

use genhybr_types::error::{HybridError, HybridResult};
use ndarray::{Array1, Array2, ArrayD, IxDyn};

use crate::bidiag::BasisState;
use crate::stopping::{RegularizationTrace, StopEvent, StopFlag};

/// Norms reported to an observer after each iteration.
#[derive(Debug, Clone, Copy)]
pub struct IterationSnapshot {
    pub iteration: usize,
    /// `None` while the iteration is unregularized.
    pub alpha: Option<f64>,
    pub gcv: Option<f64>,
    /// Effective WGCV weight used this iteration.
    pub omega: Option<f64>,
    pub residual_norm: f64,
    pub solution_norm: f64,
    /// Relative error, when ground truth is known.
    pub error_norm: Option<f64>,
}

/// Per-iteration norms, one entry per iteration.
#[derive(Debug, Clone, Default)]
pub struct IterationHistory {
    pub enrm: Vec<f64>,
    pub rnrm: Vec<f64>,
    pub xnrm: Vec<f64>,
    /// Raw adaptive ω estimates, one per regularized iteration.
    pub omegas: Vec<f64>,
}

impl IterationHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        IterationHistory {
            enrm: Vec::with_capacity(capacity),
            rnrm: Vec::with_capacity(capacity),
            xnrm: Vec::with_capacity(capacity),
            omegas: Vec::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, snapshot: &IterationSnapshot) {
        if let Some(err) = snapshot.error_norm {
            self.enrm.push(err);
        }
        self.rnrm.push(snapshot.residual_norm);
        self.xnrm.push(snapshot.solution_norm);
    }

    fn truncate(&mut self, iterations: usize) {
        self.enrm.truncate(iterations);
        self.rnrm.truncate(iterations);
        self.xnrm.truncate(iterations);
    }
}

/// Diagnostics of a finished solve.
#[derive(Debug, Clone)]
pub struct OutputRecord {
    /// Iteration whose solution is returned.
    pub iterations: usize,
    pub flag: StopFlag,
    /// Regularization parameter of the returned solution.
    pub alpha: f64,
    /// GCV stopping values of the regularized iterations.
    pub gcv: Vec<f64>,
    pub alphas: Vec<f64>,
    /// Iteration of `gcv[0]` and `alphas[0]`.
    pub gcv_first_iteration: Option<usize>,
    pub omegas: Vec<f64>,
    /// Empty without ground truth.
    pub enrm: Vec<f64>,
    pub rnrm: Vec<f64>,
    pub xnrm: Vec<f64>,
    /// U (m×(k+1)), V (n×k) and B ((k+1)×k) when the basis is kept.
    pub u: Option<Array2<f64>>,
    pub v: Option<Array2<f64>>,
    pub b: Option<Array2<f64>>,
}

/// Solution and diagnostics of one hybrid solve.
#[derive(Debug, Clone)]
pub struct HybridOutput {
    pub x: Array1<f64>,
    pub record: OutputRecord,
    input_shape: Option<Vec<usize>>,
}

impl HybridOutput {
    /// x in the forward operator's input shape, or 1-D without one.
    pub fn reshaped(&self) -> HybridResult<ArrayD<f64>> {
        let shape = self
            .input_shape
            .clone()
            .unwrap_or_else(|| vec![self.x.len()]);
        ArrayD::from_shape_vec(IxDyn(&shape), self.x.to_vec()).map_err(|e| {
            HybridError::ConfigError(format!("cannot reshape solution to {shape:?}: {e}"))
        })
    }

    pub fn input_shape(&self) -> Option<&[usize]> {
        self.input_shape.as_deref()
    }
}

/// Everything a finished loop hands to [`finalize`].
pub(crate) struct RunLog<'a> {
    pub trace: RegularizationTrace,
    pub history: IterationHistory,
    pub state: &'a BasisState,
    pub keep_basis: bool,
    pub input_shape: Option<Vec<usize>>,
    /// Cut traces at the reported iteration (no ground truth).
    pub truncate: bool,
}

/// Single exit path for every stopping outcome.
pub(crate) fn finalize(stop: StopEvent, run: RunLog<'_>) -> HybridOutput {
    let RunLog {
        mut trace,
        mut history,
        state,
        keep_basis,
        input_shape,
        truncate,
    } = run;
    let iterations = stop.iterate.iteration;

    if truncate {
        trace.truncate_after(iterations);
        history.truncate(iterations);
        history.omegas.truncate(trace.len());
    }

    let (u, v, b) = if keep_basis {
        (
            Some(state.u_matrix()),
            Some(state.v_matrix()),
            Some(state.bidiagonal()),
        )
    } else {
        (None, None, None)
    };

    log::info!(
        "hybrid solve finished: {} at iteration {iterations}, alpha = {:.6e}",
        stop.flag,
        stop.iterate.alpha
    );

    let record = OutputRecord {
        iterations,
        flag: stop.flag,
        alpha: stop.iterate.alpha,
        gcv_first_iteration: trace.first_iteration(),
        gcv: trace.gcv,
        alphas: trace.alphas,
        omegas: history.omegas,
        enrm: history.enrm,
        rnrm: history.rnrm,
        xnrm: history.xnrm,
        u,
        v,
        b,
    };

    HybridOutput {
        x: stop.iterate.x,
        record,
        input_shape,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stopping::Iterate;
    use genhybr_math::operator::IdentityOperator;
    use ndarray::arr1;

    fn snapshot(iteration: usize) -> IterationSnapshot {
        IterationSnapshot {
            iteration,
            alpha: Some(0.1),
            gcv: Some(1.0),
            omega: None,
            residual_norm: 1.0 / iteration as f64,
            solution_norm: iteration as f64,
            error_norm: None,
        }
    }

    fn run_log(state: &BasisState, truncate: bool, shape: Option<Vec<usize>>) -> RunLog<'_> {
        let mut trace = RegularizationTrace::default();
        let mut history = IterationHistory::default();
        for it in 1..=5 {
            trace.push(it, 0.1 * it as f64, 1.0);
            history.record(&snapshot(it));
        }
        RunLog {
            trace,
            history,
            state,
            keep_basis: false,
            input_shape: shape,
            truncate,
        }
    }

    fn stop_at(iteration: usize) -> StopEvent {
        StopEvent {
            flag: StopFlag::WindowedMinimum,
            iterate: Iterate {
                iteration,
                x: arr1(&[1.0, 2.0, 3.0, 4.0]),
                alpha: 0.3,
            },
        }
    }

    #[test]
    fn test_finalize_truncates_without_truth() {
        let state = BasisState::new(&arr1(&[1.0, 0.0]), &IdentityOperator::new(2), 1).unwrap();
        let out = finalize(stop_at(3), run_log(&state, true, None));
        assert_eq!(out.record.iterations, 3);
        assert_eq!(out.record.gcv.len(), 3);
        assert_eq!(out.record.rnrm.len(), 3);
        assert_eq!(out.record.alpha, 0.3);
        assert!(out.record.u.is_none());
    }

    #[test]
    fn test_finalize_keeps_full_trace_with_truth() {
        let state = BasisState::new(&arr1(&[1.0, 0.0]), &IdentityOperator::new(2), 1).unwrap();
        let out = finalize(stop_at(3), run_log(&state, false, None));
        assert_eq!(out.record.gcv.len(), 5);
        assert_eq!(out.record.xnrm.len(), 5);
    }

    #[test]
    fn test_reshaped() {
        let state = BasisState::new(&arr1(&[1.0, 0.0]), &IdentityOperator::new(2), 1).unwrap();
        let out = finalize(stop_at(2), run_log(&state, true, Some(vec![2, 2])));
        let img = out.reshaped().unwrap();
        assert_eq!(img.shape(), &[2, 2]);
        assert_eq!(img[[1, 0]], 3.0);

        let flat = finalize(stop_at(2), run_log(&state, true, None)).reshaped().unwrap();
        assert_eq!(flat.shape(), &[4]);
    }
}
