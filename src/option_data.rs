//! Validated pricing requests.
use crate::error::Result;
use serde_derive::{Deserialize, Serialize};

/// A European option on a forward, settled at `maturity` and discounted
/// with `discount_factor`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForwardOption {
    forward: f64,
    strike: f64,
    discount_factor: f64,
    maturity: f64,
    is_call: bool,
}

impl ForwardOption {
    pub fn new(forward: f64, strike: f64, discount_factor: f64, maturity: f64, is_call: bool) -> Result<Self> {
        check_positive("forward", forward)?;
        check_positive("strike", strike)?;
        check_positive("discount factor", discount_factor)?;
        check_positive("maturity", maturity)?;
        Ok(ForwardOption {
            forward,
            strike,
            discount_factor,
            maturity,
            is_call,
        })
    }

    /// Same contract at another strike.
    pub fn with_strike(&self, strike: f64) -> Result<Self> {
        check_positive("strike", strike)?;
        Ok(ForwardOption { strike, ..*self })
    }

    pub fn forward(&self) -> f64 {
        self.forward
    }
    pub fn strike(&self) -> f64 {
        self.strike
    }
    pub fn discount_factor(&self) -> f64 {
        self.discount_factor
    }
    pub fn maturity(&self) -> f64 {
        self.maturity
    }
    pub fn is_call(&self) -> bool {
        self.is_call
    }

    /// ln(K / F).
    pub fn log_moneyness(&self) -> f64 {
        (self.strike / self.forward).ln()
    }

    /// DF (F - K), the call minus put value.
    pub fn forward_value(&self) -> f64 {
        self.discount_factor * (self.forward - self.strike)
    }
}

/// Request for a whole strike grid: `n_strikes` log-moneyness points
/// spread over [-max_log_moneyness, max_log_moneyness].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForwardStrikeGrid {
    forward: f64,
    discount_factor: f64,
    maturity: f64,
    is_call: bool,
    n_strikes: usize,
    max_log_moneyness: f64,
}

impl ForwardStrikeGrid {
    pub fn new(
        forward: f64,
        discount_factor: f64,
        maturity: f64,
        is_call: bool,
        n_strikes: usize,
        max_log_moneyness: f64,
    ) -> Result<Self> {
        check_positive("forward", forward)?;
        check_positive("discount factor", discount_factor)?;
        check_positive("maturity", maturity)?;
        check_positive("log-moneyness half width", max_log_moneyness)?;
        ensure_input!(n_strikes > 0, "at least one strike is required");
        Ok(ForwardStrikeGrid {
            forward,
            discount_factor,
            maturity,
            is_call,
            n_strikes,
            max_log_moneyness,
        })
    }

    pub fn forward(&self) -> f64 {
        self.forward
    }
    pub fn discount_factor(&self) -> f64 {
        self.discount_factor
    }
    pub fn maturity(&self) -> f64 {
        self.maturity
    }
    pub fn is_call(&self) -> bool {
        self.is_call
    }
    pub fn n_strikes(&self) -> usize {
        self.n_strikes
    }
    pub fn max_log_moneyness(&self) -> f64 {
        self.max_log_moneyness
    }

    /// Log-moneyness spacing the caller asked for, infinite for a single
    /// strike.
    pub fn requested_spacing(&self) -> f64 {
        if self.n_strikes > 1 {
            2.0 * self.max_log_moneyness / (self.n_strikes - 1) as f64
        } else {
            std::f64::INFINITY
        }
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    ensure_input!(value > 0.0 && value.is_finite(), "{} must be positive, got {}", name, value);
    Ok(())
}
