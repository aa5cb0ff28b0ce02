//! Real Carr-Madan kernel g(x) = Re[exp(-i x k) Ψ(x - i(1 + α))] for one
//! option, and the bookkeeping that turns ∫ g into a price.
use crate::black::black_price;
use crate::call_transform::{damped_point, EuropeanCallFourierTransform};
use crate::characteristic_exponent::{CharacteristicExponent, GaussianCharacteristicExponent};
use crate::error::Result;
use crate::option_data::ForwardOption;
use num_complex::Complex;
use std::f64::consts::PI;

/// e^{-αk}/π, the factor in front of the damped integral.
pub(crate) fn damping_scale(alpha: f64, log_moneyness: f64) -> f64 {
    (-alpha * log_moneyness).exp() / PI
}

/// Normalized call value picked up when the contour crosses the poles of
/// the kernel at α = 0 and α = -1.
pub(crate) fn residue(alpha: f64, log_moneyness: f64) -> f64 {
    if alpha > 0.0 {
        0.0
    } else if alpha > -1.0 {
        1.0
    } else {
        1.0 - log_moneyness.exp()
    }
}

#[derive(Debug, Clone)]
pub struct EuropeanPriceIntegrand<'a, E> {
    transform: &'a EuropeanCallFourierTransform<E>,
    control: Option<(f64, EuropeanCallFourierTransform<GaussianCharacteristicExponent>)>,
    option: ForwardOption,
    alpha: f64,
}

impl<'a, E: CharacteristicExponent> EuropeanPriceIntegrand<'a, E> {
    /// With a control volatility the Black kernel of that volatility is
    /// subtracted, and [`EuropeanPriceIntegrand::price_from_integral`] adds
    /// the analytic Black price back.
    pub fn new(
        transform: &'a EuropeanCallFourierTransform<E>,
        option: ForwardOption,
        alpha: f64,
        control_vol: Option<f64>,
    ) -> Result<Self> {
        transform.validate_alpha(alpha)?;
        let control = match control_vol {
            Some(vol) => {
                ensure_input!(vol > 0.0 && vol.is_finite(), "control volatility must be positive, got {}", vol);
                Some((
                    vol,
                    EuropeanCallFourierTransform::new(GaussianCharacteristicExponent::risk_neutral(vol)?),
                ))
            }
            None => None,
        };
        Ok(EuropeanPriceIntegrand {
            transform,
            control,
            option,
            alpha,
        })
    }

    pub fn option(&self) -> &ForwardOption {
        &self.option
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn evaluate(&self, x: f64) -> Result<f64> {
        let z = damped_point(x, self.alpha);
        let t = self.option.maturity();
        let mut psi = self.transform.evaluate(z, t)?;
        if let Some((_, control)) = &self.control {
            psi -= control.evaluate(z, t)?;
        }
        Ok(self.rotate(x, psi).re)
    }

    /// exp(-i x k) w, shared with callers that integrate a derivative of Ψ.
    pub(crate) fn rotate(&self, x: f64, value: Complex<f64>) -> Complex<f64> {
        Complex::from_polar(1.0, -x * self.option.log_moneyness()) * value
    }

    /// Discounted option price from ∫₀^∞ g(x) dx, floored at zero.
    pub fn price_from_integral(&self, integral: f64) -> f64 {
        let option = &self.option;
        let k = option.log_moneyness();
        let scale = option.discount_factor() * option.forward();
        let mut call = scale * damping_scale(self.alpha, k) * integral;
        call += match &self.control {
            Some((vol, _)) => black_price(
                option.forward(),
                option.strike(),
                option.discount_factor(),
                option.maturity(),
                *vol,
                true,
            ),
            None => scale * residue(self.alpha, k),
        };
        let price = if option.is_call() {
            call
        } else {
            call - option.forward_value()
        };
        price.max(0.0)
    }

    /// Derivative of the price with respect to a model parameter given
    /// ∫₀^∞ Re[exp(-ixk) ∂Ψ/∂p] dx.
    pub(crate) fn sensitivity_from_integral(&self, integral: f64) -> f64 {
        let option = &self.option;
        option.discount_factor()
            * option.forward()
            * damping_scale(self.alpha, option.log_moneyness())
            * integral
    }
}
