//! Bracketed one dimensional root finding.
use crate::error::{FourierError, Result};
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrentSolver {
    pub accuracy: f64,
    pub max_iterations: usize,
}

impl Default for BrentSolver {
    fn default() -> Self {
        BrentSolver {
            accuracy: 1e-12,
            max_iterations: 200,
        }
    }
}

fn same_sign(a: f64, b: f64) -> bool {
    (a > 0.0 && b > 0.0) || (a < 0.0 && b < 0.0)
}

impl BrentSolver {
    pub fn new(accuracy: f64, max_iterations: usize) -> Self {
        BrentSolver {
            accuracy,
            max_iterations,
        }
    }

    /// Finds a root of `f` in `[lower, upper]` using Brent's combination of
    /// bisection, secant and inverse quadratic interpolation steps.
    /// `f(lower)` and `f(upper)` must not share a sign.
    pub fn solve<F>(&self, f: F, lower: f64, upper: f64) -> Result<f64>
    where
        F: Fn(f64) -> Result<f64>,
    {
        let mut a = lower;
        let mut b = upper;
        let mut fa = f(a)?;
        let mut fb = f(b)?;
        if fa == 0.0 {
            return Ok(a);
        }
        if fb == 0.0 {
            return Ok(b);
        }
        if same_sign(fa, fb) || fa.is_nan() || fb.is_nan() {
            return Err(FourierError::NoBracket { lower, upper });
        }
        let mut c = b;
        let mut fc = fb;
        let mut d = b - a;
        let mut e = d;
        for _ in 0..self.max_iterations {
            if same_sign(fb, fc) {
                c = a;
                fc = fa;
                d = b - a;
                e = d;
            }
            if fc.abs() < fb.abs() {
                a = b;
                b = c;
                c = a;
                fa = fb;
                fb = fc;
                fc = fa;
            }
            let tol = 2.0 * std::f64::EPSILON * b.abs() + 0.5 * self.accuracy;
            let xm = 0.5 * (c - b);
            if xm.abs() <= tol || fb == 0.0 {
                return Ok(b);
            }
            if e.abs() >= tol && fa.abs() > fb.abs() {
                let s = fb / fa;
                let (mut p, mut q) = if a == c {
                    (2.0 * xm * s, 1.0 - s)
                } else {
                    let q = fa / fc;
                    let r = fb / fc;
                    (
                        s * (2.0 * xm * q * (q - r) - (b - a) * (r - 1.0)),
                        (q - 1.0) * (r - 1.0) * (s - 1.0),
                    )
                };
                if p > 0.0 {
                    q = -q;
                }
                p = p.abs();
                let min1 = 3.0 * xm * q - (tol * q).abs();
                let min2 = (e * q).abs();
                if 2.0 * p < min1.min(min2) {
                    e = d;
                    d = p / q;
                } else {
                    d = xm;
                    e = d;
                }
            } else {
                d = xm;
                e = d;
            }
            a = b;
            fa = fb;
            b += if d.abs() > tol { d } else { tol.copysign(xm) };
            fb = f(b)?;
        }
        Err(FourierError::NotConverged {
            method: "brent",
            reason: format!("no root within {} iterations", self.max_iterations),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::*;

    #[test]
    fn finds_square_root_of_two() {
        let root = BrentSolver::default()
            .solve(|x| Ok(x * x - 2.0), 0.0, 2.0)
            .unwrap();
        assert_abs_diff_eq!(root, 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn finds_root_of_transcendental_function() {
        let root = BrentSolver::default()
            .solve(|x| Ok(x.cos() - x), 0.0, 1.0)
            .unwrap();
        assert_abs_diff_eq!(root.cos(), root, epsilon = 1e-12);
    }

    #[test]
    fn rejects_unbracketed_interval() {
        let result = BrentSolver::default().solve(|x| Ok(x * x + 1.0), -1.0, 1.0);
        assert_eq!(
            result,
            Err(FourierError::NoBracket {
                lower: -1.0,
                upper: 1.0
            })
        );
    }
}
