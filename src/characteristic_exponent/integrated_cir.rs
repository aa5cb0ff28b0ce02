use super::{finite_or_non_analytic, CharacteristicExponent};
use crate::error::{FourierError, Result};
use num_complex::Complex;
use std::f64::consts::LN_2;

/// ψ(u, t) = log E[exp(i u τ_t)] for the clock τ_t = ∫₀ᵗ y_s ds, where y
/// is a CIR process with speed κ, level θ, volatility λ and y₀ = 1.
///
/// Used as the subordinator of a
/// [`TimeChangedCharacteristicExponent`](super::TimeChangedCharacteristicExponent).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegratedCirTimeChange {
    kappa: f64,
    theta: f64,
    lambda: f64,
}

impl IntegratedCirTimeChange {
    pub fn new(kappa: f64, theta: f64, lambda: f64) -> Result<Self> {
        ensure_parameter!(kappa >= 0.0 && kappa.is_finite(), "clock kappa must be non-negative, got {}", kappa);
        ensure_parameter!(theta >= 0.0 && theta.is_finite(), "clock theta must be non-negative, got {}", theta);
        ensure_parameter!(
            lambda >= 0.0 && lambda.is_finite(),
            "clock volatility must be non-negative, got {}",
            lambda
        );
        Ok(IntegratedCirTimeChange {
            kappa,
            theta,
            lambda,
        })
    }

    /// E[τ_t].
    pub fn expected_clock(&self, t: f64) -> f64 {
        if self.kappa * t < 1e-10 {
            t
        } else {
            self.theta * t + (1.0 - self.theta) * (1.0 - (-self.kappa * t).exp()) / self.kappa
        }
    }
}

impl CharacteristicExponent for IntegratedCirTimeChange {
    fn evaluate(&self, u: Complex<f64>, t: f64) -> Result<Complex<f64>> {
        let iu = Complex::<f64>::i() * u;
        if self.lambda == 0.0 {
            return Ok(iu * self.expected_clock(t));
        }
        if u == Complex::new(0.0, 0.0) {
            return Ok(u);
        }
        let kappa = self.kappa;
        let lambda_sq = self.lambda * self.lambda;
        let gamma = (kappa * kappa - 2.0 * lambda_sq * iu).sqrt();
        if gamma.norm() < 1e-300 {
            return Err(FourierError::non_analytic(u, t));
        }
        let half = gamma * (0.5 * t);
        //e^{-2a} with Re a >= 0 keeps cosh and sinh from overflowing
        let decay = (-2.0 * half).exp();
        let ratio = kappa / gamma;
        let log_cosh_sinh = half - LN_2 + ((1.0 + ratio) + (1.0 - ratio) * decay).ln();
        let clock_term = 2.0 * iu * (1.0 - decay) / (kappa * (1.0 - decay) + gamma * (1.0 + decay));
        let value = 2.0 * kappa * self.theta / lambda_sq * (0.5 * kappa * t - log_cosh_sinh) + clock_term;
        finite_or_non_analytic(value, u, t)
    }

    fn smallest_alpha(&self) -> f64 {
        std::f64::NEG_INFINITY
    }

    /// Moments of order p of the clock exist at every horizon for
    /// p ≤ κ²/(2λ²).
    fn largest_alpha(&self) -> f64 {
        if self.lambda == 0.0 {
            std::f64::INFINITY
        } else {
            self.kappa * self.kappa / (2.0 * self.lambda * self.lambda) - 1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::*;

    #[test]
    fn first_moment_is_expected_clock() {
        let ce = IntegratedCirTimeChange::new(1.5, 0.8, 0.6).unwrap();
        let h = 1e-6;
        let value = ce.evaluate(Complex::new(h, 0.0), 2.0).unwrap();
        assert_abs_diff_eq!(value.im / h, ce.expected_clock(2.0), epsilon = 1e-6);
    }

    #[test]
    fn small_volatility_approaches_deterministic_clock() {
        let noisy = IntegratedCirTimeChange::new(1.5, 0.8, 1e-4).unwrap();
        let flat = IntegratedCirTimeChange::new(1.5, 0.8, 0.0).unwrap();
        let u = Complex::new(2.0, 0.3);
        let a = noisy.evaluate(u, 1.0).unwrap();
        let b = flat.evaluate(u, 1.0).unwrap();
        assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-6);
        assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-6);
    }

    #[test]
    fn long_horizons_do_not_overflow() {
        let ce = IntegratedCirTimeChange::new(0.5, 1.0, 0.8).unwrap();
        let value = ce.evaluate(Complex::new(5000.0, 0.0), 50.0).unwrap();
        assert!(value.re < 0.0);
    }

    #[test]
    fn rejects_negative_parameters() {
        assert!(IntegratedCirTimeChange::new(-1.0, 1.0, 0.5).is_err());
        assert!(IntegratedCirTimeChange::new(1.0, -1.0, 0.5).is_err());
        assert!(IntegratedCirTimeChange::new(1.0, 1.0, -0.5).is_err());
    }
}
