use super::CharacteristicExponent;
use crate::error::Result;
use num_complex::Complex;

/// Brownian motion with drift, the Black-Scholes log-return.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianCharacteristicExponent {
    mu: f64,
    sigma: f64,
}

impl GaussianCharacteristicExponent {
    pub fn new(mu: f64, sigma: f64) -> Result<Self> {
        ensure_parameter!(mu.is_finite(), "gaussian drift must be finite, got {}", mu);
        ensure_parameter!(
            sigma.is_finite() && sigma >= 0.0,
            "gaussian volatility must be non-negative, got {}",
            sigma
        );
        Ok(GaussianCharacteristicExponent { mu, sigma })
    }

    /// The martingale case μ = -σ²/2.
    pub fn risk_neutral(sigma: f64) -> Result<Self> {
        Self::new(-0.5 * sigma * sigma, sigma)
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl CharacteristicExponent for GaussianCharacteristicExponent {
    fn evaluate(&self, z: Complex<f64>, t: f64) -> Result<Complex<f64>> {
        let i = Complex::<f64>::i();
        Ok(t * (i * z * self.mu - 0.5 * z * z * self.sigma * self.sigma))
    }

    fn smallest_alpha(&self) -> f64 {
        std::f64::NEG_INFINITY
    }

    fn largest_alpha(&self) -> f64 {
        std::f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::*;

    #[test]
    fn matches_normal_characteristic_function() {
        let ce = GaussianCharacteristicExponent::new(0.1, 0.2).unwrap();
        let value = ce.evaluate(Complex::new(1.5, 0.0), 2.0).unwrap();
        assert_abs_diff_eq!(value.re, -0.5 * 1.5 * 1.5 * 0.04 * 2.0, epsilon = 1e-15);
        assert_abs_diff_eq!(value.im, 1.5 * 0.1 * 2.0, epsilon = 1e-15);
    }

    #[test]
    fn risk_neutral_exponent_is_a_martingale() {
        let ce = GaussianCharacteristicExponent::risk_neutral(0.3).unwrap();
        let value = ce.evaluate(Complex::new(0.0, -1.0), 1.7).unwrap();
        assert_abs_diff_eq!(value.norm(), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn rejects_negative_volatility() {
        assert!(GaussianCharacteristicExponent::new(0.0, -0.1).is_err());
        assert!(GaussianCharacteristicExponent::new(f64::NAN, 0.1).is_err());
    }
}
