//! Single strike Carr-Madan pricing by adaptive quadrature.
//!
//! # Examples
//! ```
//! use carr_madan_option::characteristic_exponent::GaussianCharacteristicExponent;
//! use carr_madan_option::fourier_pricer::{FourierPricer, FourierPricerConfig};
//! use carr_madan_option::option_data::ForwardOption;
//! let pricer = FourierPricer::new(FourierPricerConfig::default());
//! let option = ForwardOption::new(100.0, 98.0, 0.95, 3.0, true).unwrap();
//! let exponent = GaussianCharacteristicExponent::risk_neutral(0.2).unwrap();
//! let price = pricer.price(&option, &exponent, -0.5, 1e-10, None).unwrap();
//! ```
use crate::call_transform::{damped_point, from_exponent_value, EuropeanCallFourierTransform};
use crate::characteristic_exponent::{CharacteristicExponent, HestonCharacteristicExponent, HestonParameters};
use crate::error::{check_tolerance, Result};
use crate::integral_limit::IntegralLimitCalculator;
use crate::integration::{GaussKronrodIntegrator, IntegratorConfig};
use crate::option_data::ForwardOption;
use crate::price_integrand::EuropeanPriceIntegrand;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_ALPHA: f64 = -0.5;
pub const DEFAULT_LIMIT_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FourierPricerConfig {
    pub integrator: IntegratorConfig,
    /// Integrate up to this point instead of searching for the decay of Ψ.
    pub fixed_upper_limit: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FourierPricer {
    config: FourierPricerConfig,
    integrator: GaussKronrodIntegrator,
}

impl FourierPricer {
    pub fn new(config: FourierPricerConfig) -> Self {
        FourierPricer {
            config,
            integrator: GaussKronrodIntegrator::new(config.integrator),
        }
    }

    pub fn config(&self) -> &FourierPricerConfig {
        &self.config
    }

    /// Discounted price of `option` under the (mean corrected) `exponent`.
    ///
    /// The integral is truncated where |Ψ| has decayed by
    /// `limit_tolerance`. With `control_vol` the Black model of that
    /// volatility is used as a control variate.
    pub fn price<E>(
        &self,
        option: &ForwardOption,
        exponent: &E,
        alpha: f64,
        limit_tolerance: f64,
        control_vol: Option<f64>,
    ) -> Result<f64>
    where
        E: CharacteristicExponent + ?Sized,
    {
        check_tolerance(limit_tolerance)?;
        let transform = EuropeanCallFourierTransform::new(exponent);
        let limit = self.upper_limit(&transform, alpha, option.maturity(), limit_tolerance)?;
        self.price_to_limit(&transform, *option, alpha, limit, control_vol)
    }

    pub fn price_with_defaults<E>(&self, option: &ForwardOption, exponent: &E) -> Result<f64>
    where
        E: CharacteristicExponent + ?Sized,
    {
        self.price(option, exponent, DEFAULT_ALPHA, DEFAULT_LIMIT_TOLERANCE, None)
    }

    /// Prices `template` at every strike in parallel, sharing one
    /// truncation point.
    pub fn price_strikes<E>(
        &self,
        template: &ForwardOption,
        strikes: &[f64],
        exponent: &E,
        alpha: f64,
        limit_tolerance: f64,
        control_vol: Option<f64>,
    ) -> Result<Vec<f64>>
    where
        E: CharacteristicExponent + ?Sized,
    {
        check_tolerance(limit_tolerance)?;
        let transform = EuropeanCallFourierTransform::new(exponent);
        let limit = self.upper_limit(&transform, alpha, template.maturity(), limit_tolerance)?;
        strikes
            .par_iter()
            .map(|&strike| {
                let option = template.with_strike(strike)?;
                self.price_to_limit(&transform, option, alpha, limit, control_vol)
            })
            .collect()
    }

    /// Price and its gradient with respect to the Heston parameters, in
    /// [`HestonParameters::to_vec`] order. The gradient integrates the
    /// analytic adjoint under the same kernel and ignores the price floor.
    pub fn heston_price_sensitivities(
        &self,
        option: &ForwardOption,
        exponent: &HestonCharacteristicExponent,
        alpha: f64,
        limit_tolerance: f64,
    ) -> Result<(f64, [f64; HestonParameters::COUNT])> {
        check_tolerance(limit_tolerance)?;
        let transform = EuropeanCallFourierTransform::new(exponent);
        let t = option.maturity();
        let limit = self.upper_limit(&transform, alpha, t, limit_tolerance)?;
        let integrand = EuropeanPriceIntegrand::new(&transform, *option, alpha, None)?;
        let price = integrand.price_from_integral(self.integrator.integrate(|x| integrand.evaluate(x), 0.0, limit)?);
        let mut gradient = [0.0; HestonParameters::COUNT];
        for (index, sensitivity) in gradient.iter_mut().enumerate() {
            let integral = self.integrator.integrate(
                |x| {
                    let z = damped_point(x, alpha);
                    let adjoint = exponent.adjoint(z, t)?;
                    let psi = from_exponent_value(adjoint.value, z, t)?;
                    Ok(integrand.rotate(x, psi * adjoint.gradient()[index]).re)
                },
                0.0,
                limit,
            )?;
            *sensitivity = integrand.sensitivity_from_integral(integral);
        }
        Ok((price, gradient))
    }

    fn upper_limit<E>(
        &self,
        transform: &EuropeanCallFourierTransform<E>,
        alpha: f64,
        maturity: f64,
        limit_tolerance: f64,
    ) -> Result<f64>
    where
        E: CharacteristicExponent,
    {
        match self.config.fixed_upper_limit {
            Some(limit) => {
                ensure_input!(
                    limit > 0.0 && limit.is_finite(),
                    "fixed upper limit must be positive, got {}",
                    limit
                );
                transform.validate_alpha(alpha)?;
                Ok(limit)
            }
            None => IntegralLimitCalculator::new(transform, alpha, maturity, limit_tolerance)?.calculate(),
        }
    }

    fn price_to_limit<E>(
        &self,
        transform: &EuropeanCallFourierTransform<E>,
        option: ForwardOption,
        alpha: f64,
        limit: f64,
        control_vol: Option<f64>,
    ) -> Result<f64>
    where
        E: CharacteristicExponent,
    {
        let integrand = EuropeanPriceIntegrand::new(transform, option, alpha, control_vol)?;
        let integral = self.integrator.integrate(|x| integrand.evaluate(x), 0.0, limit)?;
        let price = integrand.price_from_integral(integral);
        debug!(strike = option.strike(), limit, price, "fourier price");
        Ok(price)
    }
}

impl Default for FourierPricer {
    fn default() -> Self {
        FourierPricer::new(FourierPricerConfig::default())
    }
}
