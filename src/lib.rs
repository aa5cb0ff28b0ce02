//! European option pricing with the Carr-Madan Fourier method, for any
//! model with a known characteristic exponent, and Heston calibration.
//!
//! Single strikes are priced by adaptive quadrature with
//! [`fourier_pricer::FourierPricer`], whole strike grids with one FFT via
//! [`fft_pricer::FftPricer`]. [`heston_fitter::HestonFitter`] fits the
//! Heston model to a volatility smile.
//!
//! # Examples
//! ```
//! use carr_madan_option::characteristic_exponent::{
//!     HestonCharacteristicExponent, HestonParameters,
//! };
//! use carr_madan_option::fft_pricer::FftPricer;
//! use carr_madan_option::option_data::ForwardStrikeGrid;
//! let heston = HestonCharacteristicExponent::new(HestonParameters {
//!     kappa: 1.5768,
//!     theta: 0.0398,
//!     vol0: 0.0175,
//!     omega: 0.5751,
//!     rho: -0.5711,
//! })
//! .unwrap();
//! let request = ForwardStrikeGrid::new(100.0, 1.0, 1.0, true, 21, 0.2).unwrap();
//! let prices = FftPricer::default().price(&request, &heston, -0.5, 1e-10).unwrap();
//! ```
#[macro_use]
pub mod error;

pub mod black;
pub mod call_transform;
pub mod characteristic_exponent;
pub mod fft_pricer;
pub mod fourier_pricer;
pub mod heston_fitter;
pub mod integral_limit;
pub mod integration;
pub mod least_squares;
pub mod monotone_spline;
pub mod option_data;
pub mod price_integrand;
pub mod root_finding;
