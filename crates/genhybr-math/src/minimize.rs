// ─────────────────────────────────────────────────────────────────────
// GenHyBR — Scalar Minimization
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Bounded scalar minimization and root bracketing for parameter choice.
//!
//! Brent's method (golden section with parabolic steps) picks the
//! Tikhonov alpha that minimizes GCV-type functionals on [0, s₁];
//! bisection solves the monotone discrepancy equation.

/// (3 - √5) / 2
const GOLDEN: f64 = 0.381_966_011_250_105_1;

/// Result of a bounded minimization.
#[derive(Debug, Clone, Copy)]
pub struct MinimizeResult {
    pub x_min: f64,
    pub f_min: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimize `f` on `[a, b]` by Brent's method.
pub fn brent_minimize<F>(f: F, a: f64, b: f64, tol: f64, max_iter: usize) -> MinimizeResult
where
    F: Fn(f64) -> f64,
{
    let (mut a, mut b) = if a <= b { (a, b) } else { (b, a) };
    let mut x = a + GOLDEN * (b - a);
    let mut w = x;
    let mut v = x;
    let mut fx = f(x);
    let mut fw = fx;
    let mut fv = fx;

    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;

    for iter in 0..max_iter {
        let mid = 0.5 * (a + b);
        let tol1 = tol * x.abs() + 1e-12;
        let tol2 = 2.0 * tol1;

        if (x - mid).abs() <= tol2 - 0.5 * (b - a) {
            return MinimizeResult {
                x_min: x,
                f_min: fx,
                iterations: iter + 1,
                converged: true,
            };
        }

        let mut golden_step = true;
        if e.abs() > tol1 {
            // Parabola through x, w, v
            let r = (x - w) * (fx - fv);
            let q = (x - v) * (fx - fw);
            let p = (x - v) * q - (x - w) * r;
            let q = 2.0 * (q - r);
            let (p, q) = if q > 0.0 { (-p, q) } else { (p, -q) };

            let e_old = e;
            e = d;

            if p.abs() < (0.5 * q * e_old).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = if x < mid { tol1 } else { -tol1 };
                }
                golden_step = false;
            }
        }

        if golden_step {
            e = if x < mid { b - x } else { a - x };
            d = GOLDEN * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else if d > 0.0 {
            x + tol1
        } else {
            x - tol1
        };
        let fu = f(u);

        if fu <= fx {
            if u < x {
                b = x;
            } else {
                a = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    log::debug!("brent hit {max_iter} iterations on [{a:.3e}, {b:.3e}]; x = {x:.6e}");
    MinimizeResult {
        x_min: x,
        f_min: fx,
        iterations: max_iter,
        converged: false,
    }
}

/// Largest x in `[lo, hi]` with `g(x) <= target`, for non-decreasing `g`.
///
/// Returns `lo` when even `g(lo)` exceeds the target and `hi` when
/// `g(hi)` is still below it.  Bisection runs in log space when both
/// ends are positive.
pub fn bisect_nondecreasing<G>(g: G, lo: f64, hi: f64, target: f64, max_iter: usize) -> f64
where
    G: Fn(f64) -> f64,
{
    if g(lo) > target {
        return lo;
    }
    if g(hi) <= target {
        return hi;
    }
    let log_space = lo > 0.0 && hi > 0.0;
    let (mut a, mut b) = if log_space { (lo.ln(), hi.ln()) } else { (lo, hi) };
    let map = |t: f64| if log_space { t.exp() } else { t };

    for _ in 0..max_iter {
        let mid = 0.5 * (a + b);
        if g(map(mid)) <= target {
            a = mid;
        } else {
            b = mid;
        }
        if (b - a).abs() < 1e-12 * (1.0 + a.abs()) {
            break;
        }
    }
    map(a)
}
