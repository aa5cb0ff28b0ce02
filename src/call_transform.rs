//! Fourier transform of the European call payoff in log-strike space.
//!
//! For a martingale log-return X_T with exponent φ,
//! Ψ(z, T) = exp(φ(z, T)) / (i z (i z - 1)).
//! The pricers evaluate it on the damped line z = x - i(1 + α).
use crate::characteristic_exponent::{CharacteristicExponent, MeanCorrectedCharacteristicExponent};
use crate::error::{FourierError, Result};
use num_complex::Complex;

const DEGENERATE_ALPHA_TOLERANCE: f64 = 1e-12;

/// Point x - i(1 + α) on the damped integration line.
pub fn damped_point(x: f64, alpha: f64) -> Complex<f64> {
    Complex::new(x, -(1.0 + alpha))
}

#[derive(Debug, Clone, PartialEq)]
pub struct EuropeanCallFourierTransform<E> {
    exponent: MeanCorrectedCharacteristicExponent<E>,
}

impl<E: CharacteristicExponent> EuropeanCallFourierTransform<E> {
    /// The exponent is always mean corrected, so passing one that is
    /// already a martingale is harmless.
    pub fn new(exponent: E) -> Self {
        EuropeanCallFourierTransform {
            exponent: MeanCorrectedCharacteristicExponent::new(exponent),
        }
    }

    pub fn exponent(&self) -> &MeanCorrectedCharacteristicExponent<E> {
        &self.exponent
    }

    pub fn evaluate(&self, z: Complex<f64>, t: f64) -> Result<Complex<f64>> {
        let value = self.exponent.evaluate(z, t)?;
        from_exponent_value(value, z, t)
    }

    pub fn smallest_alpha(&self) -> f64 {
        self.exponent.smallest_alpha()
    }

    pub fn largest_alpha(&self) -> f64 {
        self.exponent.largest_alpha()
    }

    /// α must be strictly inside the strip and away from the two poles of
    /// the kernel.
    pub fn validate_alpha(&self, alpha: f64) -> Result<()> {
        if !alpha.is_finite()
            || alpha.abs() < DEGENERATE_ALPHA_TOLERANCE
            || (alpha + 1.0).abs() < DEGENERATE_ALPHA_TOLERANCE
        {
            return Err(FourierError::DegenerateAlpha(alpha));
        }
        let (smallest, largest) = (self.smallest_alpha(), self.largest_alpha());
        if alpha <= smallest || alpha >= largest {
            return Err(FourierError::AlphaOutOfRange {
                alpha,
                smallest,
                largest,
            });
        }
        Ok(())
    }
}

/// Ψ from an already evaluated exponent value φ(z, t).
pub(crate) fn from_exponent_value(value: Complex<f64>, z: Complex<f64>, t: f64) -> Result<Complex<f64>> {
    let iz = Complex::<f64>::i() * z;
    let denominator = iz * (iz - 1.0);
    if denominator.norm() == 0.0 {
        return Err(FourierError::non_analytic(z, t));
    }
    let psi = value.exp() / denominator;
    if psi.re.is_finite() && psi.im.is_finite() {
        Ok(psi)
    } else {
        Err(FourierError::non_analytic(z, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::characteristic_exponent::{CgmyCharacteristicExponent, GaussianCharacteristicExponent};
    use approx::*;

    #[test]
    fn damped_point_shifts_the_imaginary_part() {
        let z = damped_point(2.0, -0.5);
        assert_abs_diff_eq!(z.re, 2.0);
        assert_abs_diff_eq!(z.im, -0.5);
    }

    #[test]
    fn matches_gaussian_closed_form() {
        let sigma = 0.25;
        let t = 1.5;
        let transform =
            EuropeanCallFourierTransform::new(GaussianCharacteristicExponent::risk_neutral(sigma).unwrap());
        let alpha = 0.75;
        let x = 1.3;
        let z = damped_point(x, alpha);
        let value = transform.evaluate(z, t).unwrap();
        let i = Complex::<f64>::i();
        let expected = (-0.5 * sigma * sigma * t * (z * z + i * z)).exp()
            / Complex::new(alpha * (1.0 + alpha) - x * x, (2.0 * alpha + 1.0) * x);
        assert_abs_diff_eq!(value.re, expected.re, epsilon = 1e-14);
        assert_abs_diff_eq!(value.im, expected.im, epsilon = 1e-14);
    }

    #[test]
    fn is_conjugate_symmetric_along_the_damped_line() {
        let transform =
            EuropeanCallFourierTransform::new(CgmyCharacteristicExponent::new(1.0, 5.0, 5.0, 0.5).unwrap());
        let right = transform.evaluate(damped_point(3.0, -0.5), 1.0).unwrap();
        let left = transform.evaluate(damped_point(-3.0, -0.5), 1.0).unwrap();
        assert_abs_diff_eq!(right.re, left.re, epsilon = 1e-14);
        assert_abs_diff_eq!(right.im, -left.im, epsilon = 1e-14);
    }

    #[test]
    fn rejects_degenerate_and_out_of_strip_alpha() {
        let transform =
            EuropeanCallFourierTransform::new(CgmyCharacteristicExponent::new(1.0, 5.0, 5.0, 0.5).unwrap());
        assert_eq!(
            transform.validate_alpha(0.0),
            Err(FourierError::DegenerateAlpha(0.0))
        );
        assert_eq!(
            transform.validate_alpha(-1.0),
            Err(FourierError::DegenerateAlpha(-1.0))
        );
        assert!(matches!(
            transform.validate_alpha(4.5),
            Err(FourierError::AlphaOutOfRange { .. })
        ));
        assert!(matches!(
            transform.validate_alpha(-6.5),
            Err(FourierError::AlphaOutOfRange { .. })
        ));
        assert!(transform.validate_alpha(-0.5).is_ok());
        assert!(transform.validate_alpha(1.5).is_ok());
    }

    #[test]
    fn origin_of_the_kernel_is_not_analytic() {
        let transform =
            EuropeanCallFourierTransform::new(GaussianCharacteristicExponent::risk_neutral(0.2).unwrap());
        assert!(transform.evaluate(Complex::new(0.0, 0.0), 1.0).is_err());
    }
}
