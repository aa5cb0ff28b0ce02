use super::CharacteristicExponent;
use crate::error::Result;
use num_complex::Complex;

/// Shifts the drift of a base exponent so that exp(X_t) is a martingale:
/// φ̃(z, t) = φ(z, t) - i z φ(-i, t).
#[derive(Debug, Clone, PartialEq)]
pub struct MeanCorrectedCharacteristicExponent<E> {
    base: E,
}

impl<E: CharacteristicExponent> MeanCorrectedCharacteristicExponent<E> {
    pub fn new(base: E) -> Self {
        MeanCorrectedCharacteristicExponent { base }
    }

    pub fn base(&self) -> &E {
        &self.base
    }
}

impl<E: CharacteristicExponent> CharacteristicExponent for MeanCorrectedCharacteristicExponent<E> {
    fn evaluate(&self, z: Complex<f64>, t: f64) -> Result<Complex<f64>> {
        let i = Complex::<f64>::i();
        let drift = self.base.evaluate(-i, t)?;
        Ok(self.base.evaluate(z, t)? - i * z * drift)
    }

    fn smallest_alpha(&self) -> f64 {
        self.base.smallest_alpha()
    }

    fn largest_alpha(&self) -> f64 {
        self.base.largest_alpha()
    }
}
