use super::{finite_or_non_analytic, CharacteristicExponent};
use crate::error::{FourierError, Result};
use num_complex::Complex;
use serde_derive::{Deserialize, Serialize};

/// Heston parameters: mean reversion speed, long run variance, initial
/// variance, volatility of variance and correlation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HestonParameters {
    pub kappa: f64,
    pub theta: f64,
    pub vol0: f64,
    pub omega: f64,
    pub rho: f64,
}

impl HestonParameters {
    pub const COUNT: usize = 5;

    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.kappa, self.theta, self.vol0, self.omega, self.rho]
    }

    pub fn from_slice(values: &[f64]) -> Result<Self> {
        ensure_input!(
            values.len() == Self::COUNT,
            "expected {} heston parameters, got {}",
            Self::COUNT,
            values.len()
        );
        Ok(HestonParameters {
            kappa: values[0],
            theta: values[1],
            vol0: values[2],
            omega: values[3],
            rho: values[4],
        })
    }
}

/// Partial derivatives of φ(z, t) with respect to the Heston parameters,
/// along with the value itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HestonAdjoint {
    pub value: Complex<f64>,
    pub kappa: Complex<f64>,
    pub theta: Complex<f64>,
    pub vol0: Complex<f64>,
    pub omega: Complex<f64>,
    pub rho: Complex<f64>,
}

impl HestonAdjoint {
    /// Sensitivities in [`HestonParameters::to_vec`] order.
    pub fn gradient(&self) -> [Complex<f64>; 5] {
        [self.kappa, self.theta, self.vol0, self.omega, self.rho]
    }
}

/// Heston stochastic volatility log-return, already a martingale so
/// φ(-i, t) = 0 for every parameter set.
///
/// The closed form is the "little trap" formulation
///
/// ```text
/// β = κ - iρωz,  d = sqrt(β² + ω²(z² + iz)),  g = (β - d) / (β + d)
/// D = (β - d)/ω² · (1 - e^{-dt}) / (1 - g e^{-dt})
/// C = κθ/ω² · [(β - d) t - 2 (ln(1 - g e^{-dt}) - ln(1 - g))]
/// φ = C + v0 D
/// ```
///
/// The square root takes the principal branch (Re d ≥ 0), so |e^{-dt}| ≤ 1
/// and |g| < 1 along the integration contour. Both logarithm arguments then
/// stay in the right half plane and the principal logarithm never wraps,
/// however long the maturity. Taking the logarithm of the ratio instead
/// crosses the branch cut and produces the jumps known as the Heston trap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HestonCharacteristicExponent {
    parameters: HestonParameters,
    smallest_alpha: f64,
    largest_alpha: f64,
}

struct Riccati {
    q: Complex<f64>,
    beta: Complex<f64>,
    d: Complex<f64>,
    s: Complex<f64>,
    //(β - d) / ω², computed as -q / (β + d) to avoid cancellation
    h: Complex<f64>,
    g: Complex<f64>,
    e: Complex<f64>,
    log_ratio: Complex<f64>,
}

/// ln(1 + w) without losing the digits of a tiny `w`, which is where g
/// lives when the volatility of variance is small.
fn ln_1p(w: Complex<f64>) -> Complex<f64> {
    if w.norm() < 1e-4 {
        w * (1.0 - w * (0.5 - w * (1.0 / 3.0 - 0.25 * w)))
    } else {
        (1.0 + w).ln()
    }
}

/// Range of moment orders p for which E[exp(p X_t)] stays finite at every
/// horizon: the variance Riccati equation needs a real equilibrium
/// (non-negative discriminant) reached with positive effective mean
/// reversion κ - ρωp. Orders in [0, 1] are always finite.
fn moment_strip(kappa: f64, omega: f64, rho: f64) -> (f64, f64) {
    if omega == 0.0 {
        return (std::f64::NEG_INFINITY, std::f64::INFINITY);
    }
    let a = omega * omega * (rho * rho - 1.0);
    let b = omega * omega - 2.0 * kappa * rho * omega;
    let c = kappa * kappa;
    let (mut lower, mut upper) = if a < 0.0 {
        let root = (b * b - 4.0 * a * c).max(0.0).sqrt();
        let r1 = (-b + root) / (2.0 * a);
        let r2 = (-b - root) / (2.0 * a);
        (r1.min(r2), r1.max(r2))
    } else if b > 0.0 {
        (-c / b, std::f64::INFINITY)
    } else if b < 0.0 {
        (std::f64::NEG_INFINITY, -c / b)
    } else {
        (std::f64::NEG_INFINITY, std::f64::INFINITY)
    };
    let rho_omega = rho * omega;
    if rho_omega > 0.0 {
        upper = upper.min(kappa / rho_omega);
    } else if rho_omega < 0.0 {
        lower = lower.max(kappa / rho_omega);
    }
    (lower.min(0.0), upper.max(1.0))
}

impl HestonCharacteristicExponent {
    pub fn new(parameters: HestonParameters) -> Result<Self> {
        let HestonParameters {
            kappa,
            theta,
            vol0,
            omega,
            rho,
        } = parameters;
        ensure_parameter!(kappa >= 0.0 && kappa.is_finite(), "kappa must be non-negative, got {}", kappa);
        ensure_parameter!(theta >= 0.0 && theta.is_finite(), "theta must be non-negative, got {}", theta);
        ensure_parameter!(vol0 >= 0.0 && vol0.is_finite(), "vol0 must be non-negative, got {}", vol0);
        ensure_parameter!(omega >= 0.0 && omega.is_finite(), "omega must be non-negative, got {}", omega);
        ensure_parameter!((-1.0..=1.0).contains(&rho), "rho must lie in [-1, 1], got {}", rho);
        let (lower, upper) = moment_strip(kappa, omega, rho);
        Ok(HestonCharacteristicExponent {
            parameters,
            smallest_alpha: lower - 1.0,
            largest_alpha: upper - 1.0,
        })
    }

    pub fn parameters(&self) -> &HestonParameters {
        &self.parameters
    }

    /// Expected integrated variance over `[0, t]`.
    fn integrated_variance(&self, t: f64) -> f64 {
        let HestonParameters {
            kappa, theta, vol0, ..
        } = self.parameters;
        if kappa * t < 1e-10 {
            vol0 * t
        } else {
            theta * t + (vol0 - theta) * (1.0 - (-kappa * t).exp()) / kappa
        }
    }

    fn riccati(&self, z: Complex<f64>, t: f64) -> Result<Riccati> {
        let HestonParameters {
            kappa, omega, rho, ..
        } = self.parameters;
        let i = Complex::<f64>::i();
        let q = z * (z + i);
        let beta = kappa - i * rho * omega * z;
        let d = (beta * beta + omega * omega * q).sqrt();
        let s = beta + d;
        if s.norm() < 1e-300 || d.norm() < 1e-300 {
            return Err(FourierError::non_analytic(z, t));
        }
        let h = -q / s;
        let g = omega * omega * h / s;
        let e = (-d * t).exp();
        let log_ratio = ln_1p(-g * e) - ln_1p(-g);
        Ok(Riccati {
            q,
            beta,
            d,
            s,
            h,
            g,
            e,
            log_ratio,
        })
    }

    /// Value of φ(z, t) and its derivatives with respect to every
    /// parameter. Needs a positive volatility of variance.
    pub fn adjoint(&self, z: Complex<f64>, t: f64) -> Result<HestonAdjoint> {
        let HestonParameters {
            kappa,
            theta,
            vol0,
            omega,
            rho,
        } = self.parameters;
        ensure_parameter!(omega > 0.0, "the analytic adjoint needs omega > 0, got {}", omega);
        let zero = Complex::new(0.0, 0.0);
        let i = Complex::<f64>::i();
        if z * (z + i) == zero {
            return Ok(HestonAdjoint {
                value: zero,
                kappa: zero,
                theta: zero,
                vol0: zero,
                omega: zero,
                rho: zero,
            });
        }
        let r = self.riccati(z, t)?;
        let one_minus_ge = 1.0 - r.g * r.e;
        let one_minus_g = 1.0 - r.g;
        let q_ratio = (1.0 - r.e) / one_minus_ge;
        let omega_sq = omega * omega;
        let bracket = r.h * t - 2.0 * r.log_ratio / omega_sq;
        let big_d = r.h * q_ratio;
        let big_c = kappa * theta * bracket;

        //(∂β, ∂ω) per parameter, ∂ω is 1 only for omega itself
        let sensitivity = |beta_p: Complex<f64>, omega_p: f64| {
            let d_p = (r.beta * beta_p + omega * omega_p * r.q) / r.d;
            let s_p = beta_p + d_p;
            let h_p = -r.h * s_p / r.s;
            let g_p = 2.0 * omega * omega_p * r.h / r.s - 2.0 * r.g * s_p / r.s;
            let e_p = -t * d_p * r.e;
            let ge_p = g_p * r.e + r.g * e_p;
            let q_ratio_p = (-e_p * one_minus_ge + (1.0 - r.e) * ge_p) / (one_minus_ge * one_minus_ge);
            let big_d_p = h_p * q_ratio + r.h * q_ratio_p;
            let log_ratio_p = -ge_p / one_minus_ge + g_p / one_minus_g;
            let bracket_p = h_p * t - 2.0 * log_ratio_p / omega_sq
                + 4.0 * omega_p * r.log_ratio / (omega_sq * omega);
            (kappa * theta * bracket_p, big_d_p)
        };
        let (c_kappa, d_kappa) = sensitivity(Complex::new(1.0, 0.0), 0.0);
        let (c_omega, d_omega) = sensitivity(-i * rho * z, 1.0);
        let (c_rho, d_rho) = sensitivity(-i * omega * z, 0.0);

        let value = finite_or_non_analytic(big_c + vol0 * big_d, z, t)?;
        Ok(HestonAdjoint {
            value,
            kappa: theta * bracket + c_kappa + vol0 * d_kappa,
            theta: kappa * bracket,
            vol0: big_d,
            omega: c_omega + vol0 * d_omega,
            rho: c_rho + vol0 * d_rho,
        })
    }
}

impl CharacteristicExponent for HestonCharacteristicExponent {
    fn evaluate(&self, z: Complex<f64>, t: f64) -> Result<Complex<f64>> {
        let HestonParameters {
            kappa,
            theta,
            vol0,
            omega,
            ..
        } = self.parameters;
        let i = Complex::<f64>::i();
        if omega == 0.0 {
            return Ok(-0.5 * self.integrated_variance(t) * z * (z + i));
        }
        //φ(0) = φ(-i) = 0 whatever the parameters
        let q = z * (z + i);
        if q == Complex::new(0.0, 0.0) {
            return Ok(q);
        }
        let r = self.riccati(z, t)?;
        let big_d = r.h * (1.0 - r.e) / (1.0 - r.g * r.e);
        let big_c = kappa * theta * (r.h * t - 2.0 * r.log_ratio / (omega * omega));
        finite_or_non_analytic(big_c + vol0 * big_d, z, t)
    }

    fn smallest_alpha(&self) -> f64 {
        self.smallest_alpha
    }

    fn largest_alpha(&self) -> f64 {
        self.largest_alpha
    }
}
