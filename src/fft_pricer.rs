//! Carr-Madan pricing of a whole log-strike grid with one FFT.
//!
//! Samples of Ψ on x_j = jΔ are Simpson weighted and transformed so that
//! output m holds the damped integral at k_m = (m - M/2)λ, with λΔ = 2π/M.
//! The sample spacing Δ = π/L is tied to the damping factor so that the
//! aliased copies of the damped payoff, 2L apart, have decayed by the
//! requested tolerance.
use crate::call_transform::{damped_point, EuropeanCallFourierTransform};
use crate::characteristic_exponent::CharacteristicExponent;
use crate::error::{check_tolerance, Result};
use crate::integral_limit::IntegralLimitCalculator;
use crate::option_data::ForwardStrikeGrid;
use crate::price_integrand::{damping_scale, residue};
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::FftPlanner;
use serde_derive::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FftPricerConfig {
    /// Largest FFT length the pricer will allocate.
    pub max_size: usize,
}

impl Default for FftPricerConfig {
    fn default() -> Self {
        FftPricerConfig { max_size: 1 << 22 }
    }
}

/// Discretization of one FFT pricing pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FftGrid {
    /// Spacing Δ of the Fourier samples.
    pub delta: f64,
    /// Number of non-zero samples, odd so that Simpson's rule closes.
    pub n_samples: usize,
    /// FFT length M, a power of two.
    pub size: usize,
    /// First and last output index kept, inclusive.
    pub lowest_index: usize,
    pub highest_index: usize,
}

impl FftGrid {
    /// Grid for `request` with Ψ truncated at `upper_limit`.
    pub fn new(request: &ForwardStrikeGrid, alpha: f64, tolerance: f64, upper_limit: f64) -> Result<Self> {
        check_tolerance(tolerance)?;
        ensure_input!(
            upper_limit > 0.0 && upper_limit.is_finite(),
            "upper limit must be positive, got {}",
            upper_limit
        );
        let max_log_moneyness = request.max_log_moneyness();
        let distance_to_pole = alpha.abs().min((1.0 + alpha).abs());
        ensure_input!(distance_to_pole > 0.0, "alpha {} sits on a pole of the kernel", alpha);
        let half_width = (2.0 * max_log_moneyness).max(-tolerance.ln() / distance_to_pole);
        let delta = PI / half_width;
        let mut n_samples = (upper_limit / delta).ceil() as usize + 1;
        if n_samples % 2 == 0 {
            n_samples += 1;
        }
        let requested = request.requested_spacing();
        let resolution = if requested.is_finite() {
            (2.0 * PI / (delta * requested)).ceil() as usize
        } else {
            0
        };
        let size = n_samples.max(resolution).next_power_of_two();
        let spacing = 2.0 * PI / (size as f64 * delta);
        let half = size / 2;
        let half_count = ((max_log_moneyness / spacing + 1e-9).floor() as usize).min(half - 1);
        Ok(FftGrid {
            delta,
            n_samples,
            size,
            lowest_index: half - half_count,
            highest_index: half + half_count,
        })
    }

    /// Log-moneyness spacing λ of the output.
    pub fn spacing(&self) -> f64 {
        2.0 * PI / (self.size as f64 * self.delta)
    }

    pub fn log_moneyness(&self, index: usize) -> f64 {
        (index as f64 - (self.size / 2) as f64) * self.spacing()
    }

    fn validate(&self) -> Result<()> {
        ensure_input!(
            self.size >= 2 && self.size.is_power_of_two(),
            "fft size {} must be a power of two",
            self.size
        );
        ensure_input!(
            self.n_samples >= 3 && self.n_samples % 2 == 1 && self.n_samples <= self.size,
            "{} samples do not fit a Simpson rule in an fft of size {}",
            self.n_samples,
            self.size
        );
        ensure_input!(
            self.delta > 0.0 && self.delta.is_finite(),
            "sample spacing must be positive, got {}",
            self.delta
        );
        ensure_input!(
            self.lowest_index <= self.highest_index && self.highest_index < self.size,
            "output window [{}, {}] is outside the fft",
            self.lowest_index,
            self.highest_index
        );
        Ok(())
    }
}

fn simpson_weight(index: usize, n_samples: usize, delta: f64) -> f64 {
    let weight = if index == 0 || index + 1 == n_samples {
        1.0
    } else if index % 2 == 1 {
        4.0
    } else {
        2.0
    };
    weight * delta / 3.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FftPricer {
    config: FftPricerConfig,
}

impl FftPricer {
    pub fn new(config: FftPricerConfig) -> Self {
        FftPricer { config }
    }

    pub fn config(&self) -> &FftPricerConfig {
        &self.config
    }

    /// Prices every strike of the grid the request implies. Returns
    /// `(strike, price)` pairs with increasing strikes and log-moneyness
    /// within the requested half width.
    pub fn price<E>(
        &self,
        request: &ForwardStrikeGrid,
        exponent: &E,
        alpha: f64,
        tolerance: f64,
    ) -> Result<Vec<(f64, f64)>>
    where
        E: CharacteristicExponent + ?Sized,
    {
        check_tolerance(tolerance)?;
        let transform = EuropeanCallFourierTransform::new(exponent);
        let limit = IntegralLimitCalculator::new(&transform, alpha, request.maturity(), tolerance)?.calculate()?;
        let grid = FftGrid::new(request, alpha, tolerance, limit)?;
        debug!(
            delta = grid.delta,
            samples = grid.n_samples,
            size = grid.size,
            spacing = grid.spacing(),
            "fft grid"
        );
        self.price_transform(&transform, request, alpha, &grid)
    }

    /// Prices on an explicit grid, for instance to compare two models on
    /// identical strikes.
    pub fn price_on_grid<E>(
        &self,
        request: &ForwardStrikeGrid,
        exponent: &E,
        alpha: f64,
        grid: &FftGrid,
    ) -> Result<Vec<(f64, f64)>>
    where
        E: CharacteristicExponent + ?Sized,
    {
        let transform = EuropeanCallFourierTransform::new(exponent);
        transform.validate_alpha(alpha)?;
        self.price_transform(&transform, request, alpha, grid)
    }

    fn price_transform<E>(
        &self,
        transform: &EuropeanCallFourierTransform<E>,
        request: &ForwardStrikeGrid,
        alpha: f64,
        grid: &FftGrid,
    ) -> Result<Vec<(f64, f64)>>
    where
        E: CharacteristicExponent,
    {
        grid.validate()?;
        ensure_input!(
            grid.size <= self.config.max_size,
            "fft size {} exceeds the configured maximum {}",
            grid.size,
            self.config.max_size
        );
        let t = request.maturity();
        let mut buffer = (0..grid.n_samples)
            .into_par_iter()
            .map(|j| {
                let x = j as f64 * grid.delta;
                let psi = transform.evaluate(damped_point(x, alpha), t)?;
                //exp(i b x_j) = (-1)^j since b Δ = π
                let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
                Ok(psi * (sign * simpson_weight(j, grid.n_samples, grid.delta)))
            })
            .collect::<Result<Vec<Complex<f64>>>>()?;
        buffer.resize(grid.size, Complex::new(0.0, 0.0));

        let mut planner = FftPlanner::<f64>::new();
        planner.plan_fft_forward(grid.size).process(&mut buffer);

        let forward = request.forward();
        let discount_factor = request.discount_factor();
        Ok((grid.lowest_index..=grid.highest_index)
            .map(|m| {
                let k = grid.log_moneyness(m);
                let strike = forward * k.exp();
                let normalized = damping_scale(alpha, k) * buffer[m].re + residue(alpha, k);
                let call = discount_factor * forward * normalized;
                let price = if request.is_call() {
                    call
                } else {
                    call - discount_factor * (forward - strike)
                };
                (strike, price.max(0.0))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::black::black_price;
    use crate::characteristic_exponent::GaussianCharacteristicExponent;
    use crate::error::FourierError;
    use approx::*;

    #[test]
    fn reduces_to_black_on_the_grid() {
        let pricer = FftPricer::default();
        let exponent = GaussianCharacteristicExponent::risk_neutral(0.2).unwrap();
        for &alpha in &[-0.5, 1.5] {
            for &is_call in &[true, false] {
                let request = ForwardStrikeGrid::new(100.0, 0.95, 1.0, is_call, 33, 0.3).unwrap();
                let prices = pricer.price(&request, &exponent, alpha, 1e-10).unwrap();
                assert!(prices.len() >= 33);
                for (strike, price) in prices {
                    let expected = black_price(100.0, strike, 0.95, 1.0, 0.2, is_call);
                    assert_abs_diff_eq!(price, expected, epsilon = 1e-6);
                }
            }
        }
    }

    #[test]
    fn strikes_are_increasing_and_inside_the_window() {
        let pricer = FftPricer::default();
        let exponent = GaussianCharacteristicExponent::risk_neutral(0.3).unwrap();
        let request = ForwardStrikeGrid::new(50.0, 1.0, 0.5, true, 21, 0.2).unwrap();
        let prices = pricer.price(&request, &exponent, -0.5, 1e-8).unwrap();
        for window in prices.windows(2) {
            assert!(window[0].0 < window[1].0);
        }
        for (strike, _) in prices {
            assert!((strike / 50.0).ln().abs() <= 0.2 + 1e-12);
        }
    }

    #[test]
    fn grid_resolves_the_requested_spacing() {
        let request = ForwardStrikeGrid::new(0.04, 0.93, 2.0, true, 21, 0.1).unwrap();
        let grid = FftGrid::new(&request, -0.5, 1e-10, 12.0).unwrap();
        assert!(grid.size.is_power_of_two());
        assert!(grid.n_samples <= grid.size);
        assert_eq!(grid.n_samples % 2, 1);
        assert!(grid.spacing() <= request.requested_spacing());
        assert!(grid.highest_index - grid.lowest_index + 1 >= 21);
        assert_abs_diff_eq!(grid.log_moneyness(grid.size / 2), 0.0);
        assert!(grid.log_moneyness(grid.highest_index) <= 0.1 + 1e-12);
    }

    #[test]
    fn single_strike_grid_contains_the_forward() {
        let request = ForwardStrikeGrid::new(100.0, 1.0, 1.0, true, 1, 0.05).unwrap();
        let grid = FftGrid::new(&request, -0.5, 1e-10, 30.0).unwrap();
        assert!(grid.lowest_index <= grid.size / 2 && grid.size / 2 <= grid.highest_index);
    }

    #[test]
    fn refuses_oversized_transforms() {
        let pricer = FftPricer::new(FftPricerConfig { max_size: 64 });
        let exponent = GaussianCharacteristicExponent::risk_neutral(0.2).unwrap();
        let request = ForwardStrikeGrid::new(100.0, 1.0, 1.0, true, 101, 0.5).unwrap();
        assert!(matches!(
            pricer.price(&request, &exponent, -0.5, 1e-10),
            Err(FourierError::InvalidInput(_))
        ));
    }

    #[test]
    fn simpson_weights_close() {
        let weights: Vec<f64> = (0..5).map(|j| simpson_weight(j, 5, 3.0)).collect();
        assert_eq!(weights, vec![1.0, 4.0, 2.0, 4.0, 1.0]);
    }
}
