//! Black (forward) prices, vega and implied volatility. Prices come from
//! the [black_scholes](https://crates.io/crates/black_scholes) crate with
//! the forward expressed as a discounted asset.
use crate::error::{FourierError, Result};
use crate::root_finding::BrentSolver;

const MIN_VOLATILITY: f64 = 1e-9;
const MAX_VOLATILITY: f64 = 20.0;
/// Relative half width of the bracket around the Newton estimate.
const GUESS_WIDTH: f64 = 0.05;

fn implied_rate(discount_factor: f64, maturity: f64) -> f64 {
    -discount_factor.ln() / maturity
}

/// Discounted Black price of a call or put on a forward.
pub fn black_price(
    forward: f64,
    strike: f64,
    discount_factor: f64,
    maturity: f64,
    volatility: f64,
    is_call: bool,
) -> f64 {
    if volatility <= 0.0 || maturity <= 0.0 {
        let intrinsic = if is_call { forward - strike } else { strike - forward };
        return discount_factor * intrinsic.max(0.0);
    }
    let asset = forward * discount_factor;
    let rate = implied_rate(discount_factor, maturity);
    if is_call {
        black_scholes::call(asset, strike, rate, volatility, maturity)
    } else {
        black_scholes::put(asset, strike, rate, volatility, maturity)
    }
}

/// Sensitivity of [`black_price`] to the volatility, identical for calls
/// and puts.
pub fn black_vega(
    forward: f64,
    strike: f64,
    discount_factor: f64,
    maturity: f64,
    volatility: f64,
) -> f64 {
    if volatility <= 0.0 || maturity <= 0.0 {
        return 0.0;
    }
    let rate = implied_rate(discount_factor, maturity);
    black_scholes::call_vega(forward * discount_factor, strike, rate, volatility, maturity)
}

/// Newton estimate from black_scholes, accepted only as a bracket centre.
fn newton_guess(price: f64, forward: f64, strike: f64, discount_factor: f64, maturity: f64, is_call: bool) -> Option<f64> {
    let asset = forward * discount_factor;
    let rate = implied_rate(discount_factor, maturity);
    let guess = if is_call {
        black_scholes::call_iv(price, asset, strike, rate, maturity)
    } else {
        black_scholes::put_iv(price, asset, strike, rate, maturity)
    };
    guess
        .ok()
        .filter(|vol| vol.is_finite() && *vol > MIN_VOLATILITY && *vol < MAX_VOLATILITY)
}

/// Inverts [`black_price`] for the volatility. The price must lie strictly
/// between the discounted intrinsic value and the discounted upper bound.
///
/// The Newton solve of black_scholes stops at a price residual of 1e-6,
/// too loose for small forwards, so its answer only narrows the bracket of
/// a Brent polish.
pub fn implied_volatility(
    price: f64,
    forward: f64,
    strike: f64,
    discount_factor: f64,
    maturity: f64,
    is_call: bool,
) -> Result<f64> {
    ensure_input!(
        forward > 0.0 && strike > 0.0 && discount_factor > 0.0 && maturity > 0.0,
        "forward {}, strike {}, discount factor {} and maturity {} must be positive",
        forward,
        strike,
        discount_factor,
        maturity
    );
    let intrinsic = black_price(forward, strike, discount_factor, maturity, 0.0, is_call);
    let upper = discount_factor * if is_call { forward } else { strike };
    ensure_input!(
        price > intrinsic && price < upper,
        "price {} is outside the arbitrage bounds ({}, {})",
        price,
        intrinsic,
        upper
    );
    let objective =
        |vol: f64| Ok(black_price(forward, strike, discount_factor, maturity, vol, is_call) - price);
    let solver = BrentSolver::new(1e-14, 200);
    if let Some(guess) = newton_guess(price, forward, strike, discount_factor, maturity, is_call) {
        let (lower, higher) = (
            (guess * (1.0 - GUESS_WIDTH)).max(MIN_VOLATILITY),
            (guess * (1.0 + GUESS_WIDTH)).min(MAX_VOLATILITY),
        );
        if objective(lower)? < 0.0 && objective(higher)? > 0.0 {
            return solver.solve(objective, lower, higher);
        }
    }
    if objective(MAX_VOLATILITY)? < 0.0 {
        return Err(FourierError::NoBracket {
            lower: MIN_VOLATILITY,
            upper: MAX_VOLATILITY,
        });
    }
    solver.solve(objective, MIN_VOLATILITY, MAX_VOLATILITY)
}
