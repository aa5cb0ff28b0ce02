use super::CharacteristicExponent;
use crate::error::Result;
use num_complex::Complex;

/// Runs a Lévy base process on a stochastic clock:
/// φ(z, t) = ψ(-i φ_base(z, 1), t) where ψ is the clock's exponent.
///
/// The moment of order p exists when the base has it and the clock has a
/// moment of order κ(p) = φ_base(-ip, 1). κ is convex with κ(0) = 0, so the
/// admissible orders form an interval around zero whose ends are found once
/// at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeChangedCharacteristicExponent<B, C> {
    base: B,
    clock: C,
    smallest_alpha: f64,
    largest_alpha: f64,
}

const MAX_DOUBLINGS: usize = 40;
const BISECTIONS: usize = 100;

impl<B, C> TimeChangedCharacteristicExponent<B, C>
where
    B: CharacteristicExponent,
    C: CharacteristicExponent,
{
    pub fn new(base: B, clock: C) -> Self {
        let (smallest_order, largest_order) = if clock_limits_moments(&clock) {
            (
                moment_order_bound(&base, &clock, -1.0),
                moment_order_bound(&base, &clock, 1.0),
            )
        } else {
            (base.smallest_alpha() + 1.0, base.largest_alpha() + 1.0)
        };
        TimeChangedCharacteristicExponent {
            base,
            clock,
            smallest_alpha: smallest_order - 1.0,
            largest_alpha: largest_order - 1.0,
        }
    }

    pub fn base(&self) -> &B {
        &self.base
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

fn clock_limits_moments<C: CharacteristicExponent>(clock: &C) -> bool {
    clock.smallest_alpha().is_finite() || clock.largest_alpha().is_finite()
}

/// Whether the time-changed process has a moment of order `order`.
fn has_moment<B, C>(base: &B, clock: &C, order: f64) -> bool
where
    B: CharacteristicExponent,
    C: CharacteristicExponent,
{
    if order <= base.smallest_alpha() + 1.0 || order >= base.largest_alpha() + 1.0 {
        return false;
    }
    match base.evaluate(Complex::new(0.0, -order), 1.0) {
        Ok(cumulant) => {
            cumulant.re.is_finite()
                && cumulant.re > clock.smallest_alpha() + 1.0
                && cumulant.re < clock.largest_alpha() + 1.0
        }
        Err(_) => false,
    }
}

/// Edge of the admissible moment orders in `direction` (±1), bracketed by
/// doubling from zero and refined by bisection.
fn moment_order_bound<B, C>(base: &B, clock: &C, direction: f64) -> f64
where
    B: CharacteristicExponent,
    C: CharacteristicExponent,
{
    if !has_moment(base, clock, 0.0) {
        return 0.0;
    }
    let mut inside = 0.0;
    let mut step = 1.0;
    let mut outside = None;
    for _ in 0..MAX_DOUBLINGS {
        let candidate = inside + direction * step;
        if has_moment(base, clock, candidate) {
            inside = candidate;
            step *= 2.0;
        } else {
            outside = Some(candidate);
            break;
        }
    }
    let mut outside = match outside {
        Some(outside) => outside,
        None => return direction * std::f64::INFINITY,
    };
    for _ in 0..BISECTIONS {
        let middle = 0.5 * (inside + outside);
        if middle == inside || middle == outside {
            break;
        }
        if has_moment(base, clock, middle) {
            inside = middle;
        } else {
            outside = middle;
        }
    }
    inside
}

impl<B, C> CharacteristicExponent for TimeChangedCharacteristicExponent<B, C>
where
    B: CharacteristicExponent,
    C: CharacteristicExponent,
{
    fn evaluate(&self, z: Complex<f64>, t: f64) -> Result<Complex<f64>> {
        let unit = self.base.evaluate(z, 1.0)?;
        self.clock.evaluate(-Complex::<f64>::i() * unit, t)
    }

    fn smallest_alpha(&self) -> f64 {
        self.smallest_alpha
    }

    fn largest_alpha(&self) -> f64 {
        self.largest_alpha
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::characteristic_exponent::{
        GaussianCharacteristicExponent, HestonCharacteristicExponent, HestonParameters,
        IntegratedCirTimeChange,
    };
    use approx::*;

    #[test]
    fn uncorrelated_heston_is_a_time_changed_brownian_motion() {
        let parameters = HestonParameters {
            kappa: 1.2,
            theta: 0.05,
            vol0: 0.04,
            omega: 0.4,
            rho: 0.0,
        };
        let heston = HestonCharacteristicExponent::new(parameters).unwrap();
        let scale = parameters.vol0.sqrt();
        let time_changed = TimeChangedCharacteristicExponent::new(
            GaussianCharacteristicExponent::risk_neutral(scale).unwrap(),
            IntegratedCirTimeChange::new(
                parameters.kappa,
                parameters.theta / parameters.vol0,
                parameters.omega / scale,
            )
            .unwrap(),
        );
        for &(re, im) in &[(0.5, 0.0), (3.0, -0.5), (-7.0, 0.7), (25.0, -1.5)] {
            let z = Complex::new(re, im);
            let expected = heston.evaluate(z, 1.5).unwrap();
            let value = time_changed.evaluate(z, 1.5).unwrap();
            assert_abs_diff_eq!(value.re, expected.re, epsilon = 1e-12);
            assert_abs_diff_eq!(value.im, expected.im, epsilon = 1e-12);
        }
    }

    fn heston_pair() -> (HestonCharacteristicExponent, impl CharacteristicExponent) {
        let parameters = HestonParameters {
            kappa: 1.2,
            theta: 0.05,
            vol0: 0.04,
            omega: 0.4,
            rho: 0.0,
        };
        let scale = parameters.vol0.sqrt();
        let time_changed = TimeChangedCharacteristicExponent::new(
            GaussianCharacteristicExponent::risk_neutral(scale).unwrap(),
            IntegratedCirTimeChange::new(
                parameters.kappa,
                parameters.theta / parameters.vol0,
                parameters.omega / scale,
            )
            .unwrap(),
        );
        (HestonCharacteristicExponent::new(parameters).unwrap(), time_changed)
    }

    #[test]
    fn clock_moments_narrow_the_strip() {
        let (heston, time_changed) = heston_pair();
        //κ(p) = 0.02 p (p - 1) must stay below κ²/(2λ²) = 0.18
        let edge = 0.5 * 37.0_f64.sqrt();
        assert_abs_diff_eq!(time_changed.largest_alpha(), edge - 0.5, epsilon = 1e-10);
        assert_abs_diff_eq!(time_changed.smallest_alpha(), -edge - 0.5, epsilon = 1e-10);
        assert_abs_diff_eq!(time_changed.largest_alpha(), heston.largest_alpha(), epsilon = 1e-10);
        assert_abs_diff_eq!(time_changed.smallest_alpha(), heston.smallest_alpha(), epsilon = 1e-10);
    }

    #[test]
    fn rejects_the_same_damping_as_heston() {
        use crate::call_transform::EuropeanCallFourierTransform;
        let (heston, time_changed) = heston_pair();
        let heston = EuropeanCallFourierTransform::new(heston);
        let time_changed = EuropeanCallFourierTransform::new(time_changed);
        for &alpha in &[-0.5, 1.5, 2.5] {
            assert!(heston.validate_alpha(alpha).is_ok());
            assert!(time_changed.validate_alpha(alpha).is_ok());
        }
        for &alpha in &[-4.0, 4.0, 8.0] {
            assert!(heston.validate_alpha(alpha).is_err());
            assert!(time_changed.validate_alpha(alpha).is_err());
        }
    }

    #[test]
    fn deterministic_clock_keeps_the_base_strip() {
        let time_changed = TimeChangedCharacteristicExponent::new(
            GaussianCharacteristicExponent::risk_neutral(0.2).unwrap(),
            IntegratedCirTimeChange::new(0.5, 1.0, 0.0).unwrap(),
        );
        assert_eq!(time_changed.largest_alpha(), std::f64::INFINITY);
        assert_eq!(time_changed.smallest_alpha(), std::f64::NEG_INFINITY);
    }

    #[test]
    fn deterministic_clock_scales_the_base() {
        let time_changed = TimeChangedCharacteristicExponent::new(
            GaussianCharacteristicExponent::risk_neutral(0.2).unwrap(),
            IntegratedCirTimeChange::new(0.0, 1.0, 0.0).unwrap(),
        );
        let base = GaussianCharacteristicExponent::risk_neutral(0.2).unwrap();
        let z = Complex::new(2.0, -0.5);
        let value = time_changed.evaluate(z, 3.0).unwrap();
        let expected = base.evaluate(z, 3.0).unwrap();
        assert_abs_diff_eq!(value.re, expected.re, epsilon = 1e-14);
        assert_abs_diff_eq!(value.im, expected.im, epsilon = 1e-14);
    }
}
