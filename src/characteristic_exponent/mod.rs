//! Characteristic exponents φ(z, t) = log E[exp(i z X_t)] of log-return
//! models, and the decorators that compose them.
//!
//! Every exponent knows the open strip of Carr-Madan damping factors α for
//! which the moment E[exp((1 + α) X_t)] exists, which is where the call
//! transform may be evaluated.
use crate::error::Result;
use num_complex::Complex;
use std::fmt::Debug;
use std::sync::Arc;

mod cgmy;
mod gaussian;
mod heston;
mod integrated_cir;
mod mean_corrected;
mod time_changed;

pub use self::cgmy::CgmyCharacteristicExponent;
pub use self::gaussian::GaussianCharacteristicExponent;
pub use self::heston::{HestonAdjoint, HestonCharacteristicExponent, HestonParameters};
pub use self::integrated_cir::IntegratedCirTimeChange;
pub use self::mean_corrected::MeanCorrectedCharacteristicExponent;
pub use self::time_changed::TimeChangedCharacteristicExponent;

/// Log characteristic function of a model's log-return over a horizon `t`.
///
/// Implementations are immutable once built and may be shared between
/// threads.
pub trait CharacteristicExponent: Debug + Send + Sync {
    /// Evaluates φ(z, t). Points where the model is not analytic return
    /// [`FourierError::NonAnalytic`](crate::error::FourierError::NonAnalytic).
    fn evaluate(&self, z: Complex<f64>, t: f64) -> Result<Complex<f64>>;
    fn smallest_alpha(&self) -> f64;
    fn largest_alpha(&self) -> f64;
}

impl<'a, E: CharacteristicExponent + ?Sized> CharacteristicExponent for &'a E {
    fn evaluate(&self, z: Complex<f64>, t: f64) -> Result<Complex<f64>> {
        (**self).evaluate(z, t)
    }
    fn smallest_alpha(&self) -> f64 {
        (**self).smallest_alpha()
    }
    fn largest_alpha(&self) -> f64 {
        (**self).largest_alpha()
    }
}

impl<E: CharacteristicExponent + ?Sized> CharacteristicExponent for Box<E> {
    fn evaluate(&self, z: Complex<f64>, t: f64) -> Result<Complex<f64>> {
        (**self).evaluate(z, t)
    }
    fn smallest_alpha(&self) -> f64 {
        (**self).smallest_alpha()
    }
    fn largest_alpha(&self) -> f64 {
        (**self).largest_alpha()
    }
}

impl<E: CharacteristicExponent + ?Sized> CharacteristicExponent for Arc<E> {
    fn evaluate(&self, z: Complex<f64>, t: f64) -> Result<Complex<f64>> {
        (**self).evaluate(z, t)
    }
    fn smallest_alpha(&self) -> f64 {
        (**self).smallest_alpha()
    }
    fn largest_alpha(&self) -> f64 {
        (**self).largest_alpha()
    }
}

/// Maps a non-finite evaluation to a non-analytic point error.
pub(crate) fn finite_or_non_analytic(
    value: Complex<f64>,
    z: Complex<f64>,
    t: f64,
) -> Result<Complex<f64>> {
    if value.re.is_finite() && value.im.is_finite() {
        Ok(value)
    } else {
        Err(crate::error::FourierError::non_analytic(z, t))
    }
}
