//! Scalar root finding over a bracket.
//!
//! [`zeroin`] is Brent's method: every iteration it takes an inverse
//! quadratic (or secant) step when that step stays well inside the
//! bracket, and bisects otherwise.
//!
//! ```text
//! 1. keep b the best estimate, a the previous b, c the opposite end
//! 2. stop when |c - b| / 2 <= 2·ε·|b| + tol / 2 or f(b) = 0
//! 3. try interpolation through a, b, c
//! 4. accept it if it lands within 3/4 of the bracket and shrinks
//!    faster than the step before last, else bisect
//! 5. never step by less than the tolerance
//! ```
//!
//! [`monotonic_test`] samples a function on a grid to decide whether a
//! bracket search can be trusted before it is attempted.

use tracing::debug;

use crate::{ControlError, Result};

/// Default cap on [`zeroin`] iterations.
///
/// Brent's method needs at most about `log2((b - a) / tol)²` steps, so
/// this only trips for pathological functions.
pub const MAX_ITERATIONS: usize = 200;

/// A located root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Root {
    /// Abscissa of the root.
    pub x: f64,
    /// Function value at `x`.
    pub fx: f64,
    /// Function evaluations after the two at the bracket ends.
    pub iterations: usize,
}

/// Find a root of `f` in `[ax, bx]`.
///
/// `f(ax)` and `f(bx)` must have opposite signs (or one of them be zero),
/// otherwise [`ControlError::NoBracket`] is returned without searching.
/// `tol` is the requested accuracy in `x`; zero asks for machine precision.
pub fn zeroin<F>(f: F, ax: f64, bx: f64, tol: f64) -> Result<Root>
where
    F: FnMut(f64) -> f64,
{
    zeroin_bounded(f, ax, bx, tol, MAX_ITERATIONS)
}

/// [`zeroin`] with an explicit iteration cap.
pub fn zeroin_bounded<F>(
    mut f: F,
    ax: f64,
    bx: f64,
    tol: f64,
    max_iterations: usize,
) -> Result<Root>
where
    F: FnMut(f64) -> f64,
{
    let mut a = ax;
    let mut b = bx;
    let mut fa = f(a);
    let mut fb = f(b);
    if fa.is_nan() || fb.is_nan() || (fa > 0.0 && fb > 0.0) || (fa < 0.0 && fb < 0.0) {
        return Err(ControlError::NoBracket { a, b, fa, fb });
    }
    let mut c = a;
    let mut fc = fa;

    for iterations in 0..=max_iterations {
        let prev_step = b - a;

        if fc.abs() < fb.abs() {
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
        }

        let tol_act = 2.0 * f64::EPSILON * b.abs() + tol / 2.0;
        let mut new_step = (c - b) / 2.0;

        if new_step.abs() <= tol_act || fb == 0.0 {
            debug!(x = b, fx = fb, iterations, "zeroin converged");
            return Ok(Root {
                x: b,
                fx: fb,
                iterations,
            });
        }

        if prev_step.abs() >= tol_act && fa.abs() > fb.abs() {
            let cb = c - b;
            let (mut p, mut q) = if a == c {
                // secant
                let t1 = fb / fa;
                (cb * t1, 1.0 - t1)
            } else {
                // inverse quadratic
                let q = fa / fc;
                let t1 = fb / fc;
                let t2 = fb / fa;
                (
                    t2 * (cb * q * (q - t1) - (b - a) * (t1 - 1.0)),
                    (q - 1.0) * (t1 - 1.0) * (t2 - 1.0),
                )
            };
            if p > 0.0 {
                q = -q;
            } else {
                p = -p;
            }
            if p < 0.75 * cb * q - (tol_act * q).abs() / 2.0 && p < (prev_step * q / 2.0).abs() {
                new_step = p / q;
            }
        }

        if new_step.abs() < tol_act {
            new_step = if new_step > 0.0 { tol_act } else { -tol_act };
        }

        a = b;
        fa = fb;
        b += new_step;
        fb = f(b);
        if (fb > 0.0 && fc > 0.0) || (fb < 0.0 && fc < 0.0) {
            c = a;
            fc = fa;
        }
    }

    Err(ControlError::NotConverged {
        iterations: max_iterations,
    })
}

/// Shape of a sampled function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Monotonicity {
    /// Differences change sign somewhere.
    NotMonotonic,
    /// Never decreases and increases somewhere.
    Increasing,
    /// Never increases and decreases somewhere.
    Decreasing,
    /// Every sample is equal.
    Constant,
}

impl Monotonicity {
    /// Whether a bracketing search will find at most one root.
    #[must_use]
    pub fn is_strict(self) -> bool {
        matches!(self, Self::Increasing | Self::Decreasing)
    }
}

/// Sample `f` from `a` in steps of `eps` until past `b`.
///
/// Successive differences are compared in sign; flat stretches are
/// ignored until a direction has been established.
pub fn monotonic_test<F>(mut f: F, a: f64, b: f64, eps: f64) -> Monotonicity
where
    F: FnMut(f64) -> f64,
{
    if eps.is_nan() || eps <= 0.0 {
        return Monotonicity::NotMonotonic;
    }
    let mut x = a;
    let mut y1 = f(x);
    let mut y2 = f(x + eps);
    let mut sign = signum(y2 - y1);
    while x < b {
        x += eps;
        y1 = y2;
        y2 = f(x + eps);
        let d = y2 - y1;
        if d.is_nan() {
            return Monotonicity::NotMonotonic;
        }
        if sign == 0.0 {
            sign = signum(d);
        }
        if sign * d < 0.0 {
            return Monotonicity::NotMonotonic;
        }
    }
    if sign > 0.0 {
        Monotonicity::Increasing
    } else if sign < 0.0 {
        Monotonicity::Decreasing
    } else {
        Monotonicity::Constant
    }
}

fn signum(d: f64) -> f64 {
    if d < 0.0 {
        -1.0
    } else if d > 0.0 {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zeroin_cubic() {
        let root = zeroin(|x| x * x * x - 2.0 * x - 5.0, 2.0, 3.0, 0.0).unwrap();
        assert_relative_eq!(root.x, 2.094_551_481_542_326_5, epsilon = 1e-14);
        assert!(root.iterations < 20);
    }

    #[test]
    fn test_zeroin_reversed_bracket_and_tolerance() {
        let root = zeroin(f64::cos, 3.0, 0.0, 1e-6).unwrap();
        assert!((root.x - std::f64::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_zeroin_root_at_end() {
        let root = zeroin(|x| x - 1.0, 0.0, 1.0, 0.0).unwrap();
        assert_eq!(root.x, 1.0);
        assert_eq!(root.fx, 0.0);
    }

    #[test]
    fn test_zeroin_without_bracket() {
        let err = zeroin(|x| x * x + 1.0, -1.0, 1.0, 0.0).unwrap_err();
        assert!(matches!(err, ControlError::NoBracket { .. }));
    }

    #[test]
    fn test_zeroin_iteration_cap() {
        let err = zeroin_bounded(|x| x - 0.3, 0.0, 1.0, 0.0, 0).unwrap_err();
        assert!(matches!(err, ControlError::NotConverged { iterations: 0 }));
    }

    #[test]
    fn test_monotonic_shapes() {
        let eps = 1.0e-3;
        assert_eq!(
            monotonic_test(|x| x * x, 0.0, 1.0, eps),
            Monotonicity::Increasing
        );
        assert_eq!(
            monotonic_test(|x| -x, 0.0, 1.0, eps),
            Monotonicity::Decreasing
        );
        assert_eq!(
            monotonic_test(|x| (x - 0.5).abs(), 0.0, 1.0, eps),
            Monotonicity::NotMonotonic
        );
        assert_eq!(
            monotonic_test(|_| 4.0, 0.0, 1.0, eps),
            Monotonicity::Constant
        );
        // Flat start then rising is still increasing.
        assert_eq!(
            monotonic_test(|x: f64| (x - 0.5).max(0.0), 0.0, 1.0, eps),
            Monotonicity::Increasing
        );
        assert!(!Monotonicity::Constant.is_strict());
    }
}
