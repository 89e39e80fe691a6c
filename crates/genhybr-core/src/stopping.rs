// ─────────────────────────────────────────────────────────────────────
// GenHyBR — Stopping Rules
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Stopping rules of the hybrid iteration.
//!
//! Two GCV-based rules watch the trace of stopping values:
//!
//! * **flat**: the relative change between consecutive values, scaled
//!   by the first regularized value, drops below `flat_tol`;
//! * **windowed minimum**: after the first uptick the minimizing
//!   iterate is saved; if it is still the smallest value once `min_tol`
//!   further values have arrived, the run stops there.  Otherwise the
//!   window is discarded.
//!
//! A residual test and the iteration cap complete the set.

use std::fmt;

use ndarray::Array1;

/// Why the iteration ended.  Codes match the numeric flags 1–4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopFlag {
    /// GCV curve flattened.
    FlatGcv = 1,
    /// GCV minimum confirmed over the window.
    WindowedMinimum = 2,
    IterationCap = 3,
    /// Residual tolerance met.
    Residual = 4,
}

impl StopFlag {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for StopFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopFlag::FlatGcv => "GCV curve flat",
            StopFlag::WindowedMinimum => "GCV minimum confirmed",
            StopFlag::IterationCap => "iteration cap reached",
            StopFlag::Residual => "residual tolerance met",
        };
        f.write_str(text)
    }
}

/// Solution candidate at one iteration.
#[derive(Debug, Clone)]
pub struct Iterate {
    pub iteration: usize,
    pub x: Array1<f64>,
    pub alpha: f64,
}

/// A fired stopping rule and the solution it selects.
#[derive(Debug, Clone)]
pub struct StopEvent {
    pub flag: StopFlag,
    pub iterate: Iterate,
}

/// Per-iteration alpha and GCV values of the regularized iterations.
///
/// Entry `j` belongs to iteration `first_iteration + j`.
#[derive(Debug, Clone, Default)]
pub struct RegularizationTrace {
    first_iteration: Option<usize>,
    pub alphas: Vec<f64>,
    pub gcv: Vec<f64>,
}

impl RegularizationTrace {
    pub fn with_capacity(capacity: usize) -> Self {
        RegularizationTrace {
            first_iteration: None,
            alphas: Vec::with_capacity(capacity),
            gcv: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, iteration: usize, alpha: f64, gcv: f64) {
        self.first_iteration.get_or_insert(iteration);
        self.alphas.push(alpha);
        self.gcv.push(gcv);
    }

    pub fn len(&self) -> usize {
        self.gcv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gcv.is_empty()
    }

    pub fn first_iteration(&self) -> Option<usize> {
        self.first_iteration
    }

    /// Trace index of `iteration`, if it was regularized.
    pub fn index_of(&self, iteration: usize) -> Option<usize> {
        let first = self.first_iteration?;
        let idx = iteration.checked_sub(first)?;
        (idx < self.len()).then_some(idx)
    }

    /// Drop entries after `iteration`.
    pub fn truncate_after(&mut self, iteration: usize) {
        let keep = match self.first_iteration {
            Some(first) if iteration >= first => (iteration - first + 1).min(self.len()),
            _ => 0,
        };
        self.alphas.truncate(keep);
        self.gcv.truncate(keep);
    }
}

/// State machine over the GCV trace.
#[derive(Debug, Clone)]
pub struct GcvMonitor {
    flat_tol: f64,
    min_tol: usize,
    warning: Option<Iterate>,
    degenerate_reported: bool,
}

impl GcvMonitor {
    pub fn new(flat_tol: f64, min_tol: usize) -> Self {
        GcvMonitor {
            flat_tol,
            min_tol,
            warning: None,
            degenerate_reported: false,
        }
    }

    /// Iterate saved at the start of the open window, if any.
    pub fn pending(&self) -> Option<&Iterate> {
        self.warning.as_ref()
    }

    /// Examine the trace after `current` appended its GCV value.
    ///
    /// `previous` is the iterate before `current`; it is the candidate
    /// saved when a window opens.
    pub fn observe(
        &mut self,
        trace: &RegularizationTrace,
        current: &Iterate,
        previous: Option<&Iterate>,
    ) -> Option<StopEvent> {
        let n = trace.len();
        if n < 2 {
            return None;
        }
        let g = &trace.gcv;
        let (prev, last, reference) = (g[n - 2], g[n - 1], g[0]);

        if reference != 0.0 && reference.is_finite() {
            if ((last - prev) / reference).abs() < self.flat_tol {
                return Some(StopEvent {
                    flag: StopFlag::FlatGcv,
                    iterate: current.clone(),
                });
            }
        } else if !self.degenerate_reported {
            log::warn!("first GCV value is {reference:e}; flat-curve test disabled");
            self.degenerate_reported = true;
        }

        if let Some(saved) = &self.warning {
            let saved_idx = trace.index_of(saved.iteration)?;
            if n - 1 - saved_idx >= self.min_tol {
                let later_min = g[saved_idx + 1..].iter().copied().fold(f64::INFINITY, f64::min);
                if g[saved_idx] <= later_min {
                    return self.warning.take().map(|iterate| StopEvent {
                        flag: StopFlag::WindowedMinimum,
                        iterate,
                    });
                }
                log::debug!(
                    "GCV window from iteration {} rejected; resuming",
                    saved.iteration
                );
                self.warning = None;
            }
        } else if prev < last {
            if let Some(candidate) = previous {
                log::debug!("GCV uptick at iteration {}; window opened", current.iteration);
                self.warning = Some(candidate.clone());
            }
        }
        None
    }
}

/// Residual-based convergence test on the outer problem.
#[derive(Debug, Clone, Copy)]
pub struct ResidualNorms {
    /// ‖b − A x‖
    pub normr: f64,
    /// ‖Aᵗ(b − A x)‖
    pub normar: f64,
    /// Running estimate of ‖B‖_F
    pub norma: f64,
    /// ‖x‖
    pub normx: f64,
}

impl ResidualNorms {
    /// normr ≤ atol·β + btol·norma·normx, or normar / (norma·normr) ≤ btol.
    pub fn converged(&self, beta: f64, res_tol: [f64; 2]) -> bool {
        let [atol, btol] = res_tol;
        if self.normr <= atol * beta + btol * self.norma * self.normx {
            return true;
        }
        let ratio = self.normar / (self.norma * self.normr);
        ratio.is_finite() && ratio <= btol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iterate(iteration: usize) -> Iterate {
        Iterate {
            iteration,
            x: Array1::from_elem(2, iteration as f64),
            alpha: 0.1 * iteration as f64,
        }
    }

    /// Feed `values` (first at iteration 1) and return the first event.
    fn run(values: &[f64], flat_tol: f64, min_tol: usize) -> Option<(StopEvent, usize)> {
        let mut trace = RegularizationTrace::default();
        let mut monitor = GcvMonitor::new(flat_tol, min_tol);
        let mut previous: Option<Iterate> = None;
        for (j, &g) in values.iter().enumerate() {
            let current = iterate(j + 1);
            trace.push(current.iteration, current.alpha, g);
            if let Some(ev) = monitor.observe(&trace, &current, previous.as_ref()) {
                return Some((ev, j + 1));
            }
            previous = Some(current);
        }
        None
    }

    #[test]
    fn test_stop_flag_codes() {
        assert_eq!(StopFlag::FlatGcv.code(), 1);
        assert_eq!(StopFlag::WindowedMinimum.code(), 2);
        assert_eq!(StopFlag::IterationCap.code(), 3);
        assert_eq!(StopFlag::Residual.code(), 4);
    }

    #[test]
    fn test_window_confirms_minimum() {
        // minimum at iteration 3, uptick at 4, confirmed with min_tol = 4 at 7
        let values = [5.0, 3.0, 1.0, 2.0, 2.5, 3.0, 4.0, 5.0];
        let (ev, fired_at) = run(&values, 1e-12, 4).expect("window should fire");
        assert_eq!(ev.flag, StopFlag::WindowedMinimum);
        assert_eq!(ev.iterate.iteration, 3);
        assert_eq!(fired_at, 7);
        assert_eq!(ev.iterate.x[0], 3.0);
    }

    #[test]
    fn test_window_survives_single_bump() {
        // down to 1 at iteration 5, up, one bump back to 2.5, then rising
        let values = [5.0, 4.0, 3.0, 2.0, 1.0, 2.0, 3.0, 2.5, 4.0, 5.0, 6.0];
        let (ev, fired_at) = run(&values, 1e-6, 4).expect("window should fire");
        assert_eq!(ev.flag, StopFlag::WindowedMinimum);
        assert_eq!(ev.iterate.iteration, 5);
        assert_eq!(fired_at, 9);
    }

    #[test]
    fn test_pending_tracks_open_window() {
        let mut trace = RegularizationTrace::default();
        let mut monitor = GcvMonitor::new(1e-6, 3);
        let mut previous: Option<Iterate> = None;
        for (j, &g) in [3.0, 2.0, 2.5].iter().enumerate() {
            assert!(monitor.pending().is_none());
            let current = iterate(j + 1);
            trace.push(current.iteration, current.alpha, g);
            assert!(monitor.observe(&trace, &current, previous.as_ref()).is_none());
            previous = Some(current);
        }
        assert_eq!(monitor.pending().map(|it| it.iteration), Some(2));
    }

    #[test]
    fn test_window_rejected_then_reopened() {
        // uptick at 3 saves iteration 2, but iteration 5 undercuts it
        let values = [5.0, 3.0, 4.0, 3.5, 1.0, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];
        let (ev, _) = run(&values, 1e-12, 3).expect("second window should fire");
        assert_eq!(ev.flag, StopFlag::WindowedMinimum);
        assert_eq!(ev.iterate.iteration, 6);
    }

    #[test]
    fn test_flat_curve_stops_at_current() {
        let values = [1.0, 0.5, 0.4, 0.4 - 1e-9];
        let (ev, fired_at) = run(&values, 1e-6, 4).expect("flat test should fire");
        assert_eq!(ev.flag, StopFlag::FlatGcv);
        assert_eq!(fired_at, 4);
        assert_eq!(ev.iterate.iteration, 4);
    }

    #[test]
    fn test_no_stop_on_steady_decrease() {
        let values: Vec<f64> = (0..20).map(|i| 1.0 / (1.0 + i as f64)).collect();
        assert!(run(&values, 1e-9, 4).is_none());
    }

    #[test]
    fn test_zero_reference_disables_flat_test() {
        let values = [0.0, 1.0, 1.0, 1.0];
        assert!(run(&values, 1e-6, 10).is_none());
    }

    #[test]
    fn test_trace_offsets() {
        let mut trace = RegularizationTrace::default();
        trace.push(3, 0.1, 1.0);
        trace.push(4, 0.2, 0.9);
        trace.push(5, 0.3, 0.8);
        assert_eq!(trace.first_iteration(), Some(3));
        assert_eq!(trace.index_of(4), Some(1));
        assert_eq!(trace.index_of(2), None);
        assert_eq!(trace.index_of(6), None);
        trace.truncate_after(4);
        assert_eq!(trace.gcv, vec![1.0, 0.9]);
        trace.truncate_after(1);
        assert!(trace.is_empty());
    }

    #[test]
    fn test_residual_test() {
        let norms = ResidualNorms {
            normr: 1e-9,
            normar: 1.0,
            norma: 1.0,
            normx: 1.0,
        };
        assert!(norms.converged(1.0, [1e-6, 1e-6]));

        let norms = ResidualNorms {
            normr: 0.5,
            normar: 1e-8,
            norma: 2.0,
            normx: 1.0,
        };
        assert!(norms.converged(1.0, [1e-6, 1e-6]));

        let norms = ResidualNorms {
            normr: 0.5,
            normar: 0.5,
            norma: 2.0,
            normx: 1.0,
        };
        assert!(!norms.converged(1.0, [1e-6, 1e-6]));
    }
}
