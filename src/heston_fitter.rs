//! Least-squares calibration of the Heston model to a single maturity
//! volatility smile.
//!
//! Three objective functions are available:
//!
//! * [`HestonFitter::solve`] matches implied volatilities read off one FFT
//!   strike grid, carried onto the market strikes by a shape preserving
//!   spline in log-moneyness.
//! * [`HestonFitter::solve_price`] matches out-of-the-money prices from the
//!   same FFT grid against the Black prices of the target volatilities.
//! * [`HestonFitter::solve_fourier_integral`] prices each market strike by
//!   quadrature and uses the analytic Heston adjoint for the Jacobian.
//!
//! Prices are undiscounted since a volatility fit does not depend on the
//! discount factor. A step that leaves the Heston parameter domain is
//! rejected by the solver rather than reported.
use crate::black::{black_price, black_vega, implied_volatility};
use crate::characteristic_exponent::{HestonCharacteristicExponent, HestonParameters};
use crate::error::Result;
use crate::fft_pricer::{FftPricer, FftPricerConfig};
use crate::fourier_pricer::{FourierPricer, FourierPricerConfig, DEFAULT_ALPHA, DEFAULT_LIMIT_TOLERANCE};
use crate::least_squares::{LeastSquareResult, LevenbergMarquardt, LevenbergMarquardtConfig, SolverStatus};
use crate::monotone_spline::MonotoneSpline;
use crate::option_data::{ForwardOption, ForwardStrikeGrid};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Index of each parameter in [`HestonParameters::to_vec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum HestonParameter {
    Kappa = 0,
    Theta = 1,
    Vol0 = 2,
    Omega = 3,
    Rho = 4,
}

impl HestonParameter {
    pub const ALL: [HestonParameter; HestonParameters::COUNT] = [
        HestonParameter::Kappa,
        HestonParameter::Theta,
        HestonParameter::Vol0,
        HestonParameter::Omega,
        HestonParameter::Rho,
    ];
}

/// Set of parameters held at their initial value during a fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedParameters(u8);

impl FixedParameters {
    pub fn none() -> Self {
        FixedParameters(0)
    }

    pub fn fix(self, parameter: HestonParameter) -> Self {
        FixedParameters(self.0 | 1 << parameter as u8)
    }

    pub fn is_fixed(&self, parameter: HestonParameter) -> bool {
        self.0 & (1 << parameter as u8) != 0
    }

    fn mask(&self) -> Vec<bool> {
        HestonParameter::ALL.iter().map(|p| self.is_fixed(*p)).collect()
    }
}

/// Market implied volatilities at one maturity with their error bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilitySmile {
    forward: f64,
    maturity: f64,
    strikes: Vec<f64>,
    volatilities: Vec<f64>,
    errors: Vec<f64>,
}

impl VolatilitySmile {
    pub fn new(
        forward: f64,
        maturity: f64,
        strikes: Vec<f64>,
        volatilities: Vec<f64>,
        errors: Vec<f64>,
    ) -> Result<Self> {
        ensure_input!(forward > 0.0 && forward.is_finite(), "forward must be positive, got {}", forward);
        ensure_input!(maturity > 0.0 && maturity.is_finite(), "maturity must be positive, got {}", maturity);
        ensure_input!(!strikes.is_empty(), "smile has no strikes");
        ensure_input!(
            strikes.len() == volatilities.len() && strikes.len() == errors.len(),
            "{} strikes, {} volatilities and {} errors",
            strikes.len(),
            volatilities.len(),
            errors.len()
        );
        ensure_input!(
            strikes.iter().all(|k| *k > 0.0 && k.is_finite()),
            "strikes must be positive"
        );
        ensure_input!(
            volatilities.iter().all(|v| *v > 0.0 && v.is_finite()),
            "volatilities must be positive"
        );
        ensure_input!(errors.iter().all(|e| *e > 0.0 && e.is_finite()), "errors must be positive");
        Ok(VolatilitySmile {
            forward,
            maturity,
            strikes,
            volatilities,
            errors,
        })
    }

    pub fn forward(&self) -> f64 {
        self.forward
    }
    pub fn maturity(&self) -> f64 {
        self.maturity
    }
    pub fn strikes(&self) -> &[f64] {
        &self.strikes
    }
    pub fn volatilities(&self) -> &[f64] {
        &self.volatilities
    }
    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    fn log_moneyness(&self, strike: f64) -> f64 {
        (strike / self.forward).ln()
    }

    fn max_log_moneyness(&self) -> f64 {
        self.strikes
            .iter()
            .map(|k| self.log_moneyness(*k).abs())
            .fold(0.0, f64::max)
    }

    fn is_call(&self, strike: f64) -> bool {
        strike >= self.forward
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HestonFitterConfig {
    pub alpha: f64,
    pub limit_tolerance: f64,
    /// Strikes requested from the FFT grid.
    pub fft_strikes: usize,
    /// Log-moneyness added beyond the widest market strike so that the
    /// spline never extrapolates.
    pub strike_margin: f64,
    pub least_squares: LevenbergMarquardtConfig,
    pub fourier: FourierPricerConfig,
    pub fft: FftPricerConfig,
}

impl Default for HestonFitterConfig {
    fn default() -> Self {
        HestonFitterConfig {
            alpha: DEFAULT_ALPHA,
            limit_tolerance: DEFAULT_LIMIT_TOLERANCE,
            fft_strikes: 64,
            strike_margin: 0.02,
            //residuals are in units of the quoted errors, below this the pricers' own noise dominates
            least_squares: LevenbergMarquardtConfig {
                absolute_chi_square: 1e-10,
                ..LevenbergMarquardtConfig::default()
            },
            fourier: FourierPricerConfig::default(),
            fft: FftPricerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FitStatus {
    Converged,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HestonFit {
    pub parameters: HestonParameters,
    pub chi_square: f64,
    pub iterations: usize,
    pub status: FitStatus,
}

impl HestonFit {
    pub fn converged(&self) -> bool {
        self.status == FitStatus::Converged
    }

    fn from_solver(result: LeastSquareResult) -> Result<Self> {
        Ok(HestonFit {
            parameters: HestonParameters::from_slice(&result.parameters)?,
            chi_square: result.chi_square,
            iterations: result.iterations,
            status: match result.status {
                SolverStatus::Converged => FitStatus::Converged,
                SolverStatus::Failed(reason) => FitStatus::Failed(reason),
            },
        })
    }
}

fn exponent_from_slice(values: &[f64]) -> Result<HestonCharacteristicExponent> {
    HestonCharacteristicExponent::new(HestonParameters::from_slice(values)?)
}

#[derive(Debug, Clone)]
pub struct HestonFitter {
    smile: VolatilitySmile,
    initial: HestonParameters,
    fixed: FixedParameters,
    config: HestonFitterConfig,
    fourier: FourierPricer,
    fft: FftPricer,
}

impl HestonFitter {
    pub fn new(
        smile: VolatilitySmile,
        initial: HestonParameters,
        fixed: FixedParameters,
        config: HestonFitterConfig,
    ) -> Result<Self> {
        HestonCharacteristicExponent::new(initial)?;
        ensure_input!(config.fft_strikes >= 2, "the fft grid needs at least two strikes");
        ensure_input!(
            config.strike_margin > 0.0 && config.strike_margin.is_finite(),
            "strike margin must be positive, got {}",
            config.strike_margin
        );
        Ok(HestonFitter {
            smile,
            initial,
            fixed,
            fourier: FourierPricer::new(config.fourier),
            fft: FftPricer::new(config.fft),
            config,
        })
    }

    pub fn smile(&self) -> &VolatilitySmile {
        &self.smile
    }

    /// Fits implied volatilities from the FFT grid.
    pub fn solve(&self) -> Result<HestonFit> {
        let residuals = |values: &[f64]| -> Result<Vec<f64>> {
            let model = self.fft_volatilities(&exponent_from_slice(values)?)?;
            Ok(self.volatility_residuals(&model))
        };
        self.finish("fft volatilities", self.solver().solve(residuals, self.initial.to_vec(), &self.fixed.mask()))
    }

    /// Fits out-of-the-money prices from the FFT grid, weighted by vega.
    pub fn solve_price(&self) -> Result<HestonFit> {
        let smile = &self.smile;
        let (targets, weights): (Vec<f64>, Vec<f64>) = smile
            .strikes
            .iter()
            .zip(smile.volatilities.iter().zip(smile.errors.iter()))
            .map(|(&strike, (&vol, &error))| {
                let price = black_price(smile.forward, strike, 1.0, smile.maturity, vol, smile.is_call(strike));
                let vega = black_vega(smile.forward, strike, 1.0, smile.maturity, vol);
                (price, error * vega)
            })
            .unzip();
        ensure_input!(
            weights.iter().all(|w| *w > 0.0),
            "a market strike has no vega, price errors are undefined"
        );
        let residuals = |values: &[f64]| -> Result<Vec<f64>> {
            let spline = MonotoneSpline::new(self.fft_otm_prices(&exponent_from_slice(values)?)?)?;
            smile
                .strikes
                .iter()
                .zip(targets.iter().zip(weights.iter()))
                .map(|(&strike, (target, weight))| Ok((spline.value(smile.log_moneyness(strike))? - target) / weight))
                .collect()
        };
        self.finish("fft prices", self.solver().solve(residuals, self.initial.to_vec(), &self.fixed.mask()))
    }

    /// Fits implied volatilities priced strike by strike, with the
    /// Jacobian from the Heston adjoint.
    pub fn solve_fourier_integral(&self) -> Result<HestonFit> {
        let residuals = |values: &[f64]| -> Result<Vec<f64>> {
            let model = self.fourier_volatilities(&exponent_from_slice(values)?)?;
            Ok(self.volatility_residuals(&model))
        };
        let jacobian = |values: &[f64]| -> Result<DMatrix<f64>> {
            let exponent = exponent_from_slice(values)?;
            let rows = self.fourier_volatility_gradients(&exponent)?;
            Ok(DMatrix::from_fn(rows.len(), HestonParameters::COUNT, |row, column| {
                rows[row][column]
            }))
        };
        self.finish(
            "fourier integral",
            self.solver()
                .solve_with_jacobian(residuals, jacobian, self.initial.to_vec(), &self.fixed.mask()),
        )
    }

    /// Model implied volatilities at the market strikes, read off the FFT
    /// grid.
    pub fn model_volatilities(&self, parameters: &HestonParameters) -> Result<Vec<f64>> {
        self.fft_volatilities(&HestonCharacteristicExponent::new(*parameters)?)
    }

    fn solver(&self) -> LevenbergMarquardt {
        LevenbergMarquardt::new(self.config.least_squares)
    }

    fn finish(&self, mode: &str, result: Result<LeastSquareResult>) -> Result<HestonFit> {
        let fit = HestonFit::from_solver(result?)?;
        match &fit.status {
            FitStatus::Converged => debug!(
                mode,
                chi_square = fit.chi_square,
                iterations = fit.iterations,
                "heston calibration converged"
            ),
            FitStatus::Failed(reason) => warn!(mode, reason = reason.as_str(), "heston calibration failed"),
        }
        Ok(fit)
    }

    fn volatility_residuals(&self, model: &[f64]) -> Vec<f64> {
        model
            .iter()
            .zip(self.smile.volatilities.iter().zip(self.smile.errors.iter()))
            .map(|(model, (target, error))| (model - target) / error)
            .collect()
    }

    /// Out-of-the-money undiscounted prices on the FFT grid as
    /// (log-moneyness, price) knots.
    fn fft_otm_prices(&self, exponent: &HestonCharacteristicExponent) -> Result<Vec<(f64, f64)>> {
        let smile = &self.smile;
        let request = ForwardStrikeGrid::new(
            smile.forward,
            1.0,
            smile.maturity,
            true,
            self.config.fft_strikes,
            smile.max_log_moneyness() + self.config.strike_margin,
        )?;
        let calls = self
            .fft
            .price(&request, exponent, self.config.alpha, self.config.limit_tolerance)?;
        Ok(calls
            .into_iter()
            .map(|(strike, call)| {
                let price = if smile.is_call(strike) {
                    call
                } else {
                    call - (smile.forward - strike)
                };
                (smile.log_moneyness(strike), price)
            })
            .collect())
    }

    fn fft_volatilities(&self, exponent: &HestonCharacteristicExponent) -> Result<Vec<f64>> {
        let smile = &self.smile;
        //grid points whose price is lost in the noise cannot be inverted
        let knots: Vec<(f64, f64)> = self
            .fft_otm_prices(exponent)?
            .into_iter()
            .filter_map(|(k, price)| {
                let strike = smile.forward * k.exp();
                implied_volatility(price, smile.forward, strike, 1.0, smile.maturity, smile.is_call(strike))
                    .ok()
                    .map(|vol| (k, vol))
            })
            .collect();
        let spline = MonotoneSpline::new(knots)?;
        smile
            .strikes
            .iter()
            .map(|strike| spline.value(smile.log_moneyness(*strike)))
            .collect()
    }

    fn fourier_volatilities(&self, exponent: &HestonCharacteristicExponent) -> Result<Vec<f64>> {
        let smile = &self.smile;
        let template = ForwardOption::new(smile.forward, smile.forward, 1.0, smile.maturity, true)?;
        let calls = self.fourier.price_strikes(
            &template,
            &smile.strikes,
            exponent,
            self.config.alpha,
            self.config.limit_tolerance,
            None,
        )?;
        smile
            .strikes
            .iter()
            .zip(calls.iter())
            .map(|(&strike, &call)| {
                let is_call = smile.is_call(strike);
                let price = if is_call { call } else { call - (smile.forward - strike) };
                implied_volatility(price, smile.forward, strike, 1.0, smile.maturity, is_call)
            })
            .collect()
    }

    /// Rows of ∂σ/∂p divided by the error of each strike.
    fn fourier_volatility_gradients(
        &self,
        exponent: &HestonCharacteristicExponent,
    ) -> Result<Vec<[f64; HestonParameters::COUNT]>> {
        let smile = &self.smile;
        smile
            .strikes
            .par_iter()
            .zip(smile.errors.par_iter())
            .map(|(&strike, &error)| {
                let is_call = smile.is_call(strike);
                let option = ForwardOption::new(smile.forward, strike, 1.0, smile.maturity, is_call)?;
                let (price, gradient) = self.fourier.heston_price_sensitivities(
                    &option,
                    exponent,
                    self.config.alpha,
                    self.config.limit_tolerance,
                )?;
                let vol = implied_volatility(price, smile.forward, strike, 1.0, smile.maturity, is_call)?;
                let scale = black_vega(smile.forward, strike, 1.0, smile.maturity, vol) * error;
                let mut row = [0.0; HestonParameters::COUNT];
                for (entry, sensitivity) in row.iter_mut().zip(gradient.iter()) {
                    *entry = sensitivity / scale;
                }
                Ok(row)
            })
            .collect()
    }
}
