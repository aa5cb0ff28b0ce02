//! Truncation point of the Carr-Madan integral: the x* at which |Ψ| on the
//! damped line has decayed by the requested tolerance relative to x = 0.
use crate::call_transform::{damped_point, EuropeanCallFourierTransform};
use crate::characteristic_exponent::CharacteristicExponent;
use crate::error::{check_tolerance, FourierError, Result};
use crate::root_finding::BrentSolver;
use tracing::debug;

const INITIAL_GUESS: f64 = 1.0;
const MAX_DOUBLINGS: usize = 64;
//log10 of the smallest normal double, stands in for an underflowed |Ψ|
const UNDERFLOW_DECAY: f64 = -308.0;

#[derive(Debug, Clone)]
pub struct IntegralLimitCalculator<'a, E> {
    transform: &'a EuropeanCallFourierTransform<E>,
    alpha: f64,
    maturity: f64,
    log_tolerance: f64,
    solver: BrentSolver,
}

impl<'a, E: CharacteristicExponent> IntegralLimitCalculator<'a, E> {
    pub fn new(
        transform: &'a EuropeanCallFourierTransform<E>,
        alpha: f64,
        maturity: f64,
        tolerance: f64,
    ) -> Result<Self> {
        check_tolerance(tolerance)?;
        transform.validate_alpha(alpha)?;
        ensure_input!(maturity > 0.0, "maturity must be positive, got {}", maturity);
        Ok(IntegralLimitCalculator {
            transform,
            alpha,
            maturity,
            log_tolerance: tolerance.log10(),
            solver: BrentSolver::default(),
        })
    }

    /// log10(|Ψ(x - i(1+α))| / |Ψ(-i(1+α))|).
    pub fn decay(&self, x: f64) -> Result<f64> {
        self.decay_from(self.magnitude(0.0)?, x)
    }

    fn decay_from(&self, reference: f64, x: f64) -> Result<f64> {
        let decay = (self.magnitude(x)? / reference).log10();
        Ok(if decay.is_nan() {
            UNDERFLOW_DECAY
        } else {
            decay.max(UNDERFLOW_DECAY)
        })
    }

    fn magnitude(&self, x: f64) -> Result<f64> {
        Ok(self
            .transform
            .evaluate(damped_point(x, self.alpha), self.maturity)?
            .norm())
    }

    pub fn calculate(&self) -> Result<f64> {
        let reference = self.magnitude(0.0)?;
        let objective = |x: f64| -> Result<f64> { Ok(self.decay_from(reference, x)? - self.log_tolerance) };
        let mut lower = 0.0;
        let mut upper = INITIAL_GUESS;
        let mut doublings = 0;
        while objective(upper)? > 0.0 {
            if doublings == MAX_DOUBLINGS {
                return Err(FourierError::NotConverged {
                    method: "integral limit",
                    reason: format!("|Ψ| has not decayed below the tolerance at x = {}", upper),
                });
            }
            lower = upper;
            upper *= 2.0;
            doublings += 1;
        }
        let limit = self.solver.solve(objective, lower, upper)?;
        debug!(limit, doublings, alpha = self.alpha, "integral limit found");
        Ok(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::characteristic_exponent::{
        GaussianCharacteristicExponent, HestonCharacteristicExponent, HestonParameters,
    };
    use approx::*;

    fn heston() -> HestonCharacteristicExponent {
        HestonCharacteristicExponent::new(HestonParameters {
            kappa: 1.5768,
            theta: 0.0398,
            vol0: 0.0175,
            omega: 0.5751,
            rho: -0.5711,
        })
        .unwrap()
    }

    #[test]
    fn limit_hits_the_requested_decay() {
        let transform =
            EuropeanCallFourierTransform::new(GaussianCharacteristicExponent::risk_neutral(0.3).unwrap());
        let calculator = IntegralLimitCalculator::new(&transform, -0.5, 1.0, 1e-8).unwrap();
        let limit = calculator.calculate().unwrap();
        assert!(limit > 1.0);
        assert_abs_diff_eq!(calculator.decay(limit).unwrap(), -8.0, epsilon = 1e-8);
    }

    fn assert_strictly_decreasing<E: CharacteristicExponent>(transform: &EuropeanCallFourierTransform<E>, alpha: f64) {
        let calculator = IntegralLimitCalculator::new(transform, alpha, 1.0, 1e-10).unwrap();
        let mut previous = calculator.decay(0.0).unwrap();
        for step in 1..=200 {
            let current = calculator.decay(step as f64 * 0.1).unwrap();
            assert!(current < previous, "decay {} at step {} after {}", current, step, previous);
            previous = current;
        }
    }

    #[test]
    fn gaussian_kernel_decays_strictly() {
        let transform =
            EuropeanCallFourierTransform::new(GaussianCharacteristicExponent::risk_neutral(0.2).unwrap());
        for &alpha in &[-0.5, 1.5] {
            assert_strictly_decreasing(&transform, alpha);
        }
    }

    #[test]
    fn heston_kernel_decays_strictly() {
        let ce = heston();
        let transform = EuropeanCallFourierTransform::new(&ce);
        for &alpha in &[-0.5, 1.5] {
            assert_strictly_decreasing(&transform, alpha);
        }
    }

    #[test]
    fn limit_grows_as_the_tolerance_shrinks() {
        let ce = heston();
        let transform = EuropeanCallFourierTransform::new(&ce);
        let loose = IntegralLimitCalculator::new(&transform, -0.5, 1.0, 1e-4)
            .unwrap()
            .calculate()
            .unwrap();
        let tight = IntegralLimitCalculator::new(&transform, -0.5, 1.0, 1e-12)
            .unwrap()
            .calculate()
            .unwrap();
        assert!(tight > loose);
    }

    #[test]
    fn rejects_invalid_tolerance() {
        let transform =
            EuropeanCallFourierTransform::new(GaussianCharacteristicExponent::risk_neutral(0.2).unwrap());
        for &tolerance in &[0.0, 1.0, -1e-3, 2.0] {
            assert!(matches!(
                IntegralLimitCalculator::new(&transform, -0.5, 1.0, tolerance),
                Err(FourierError::InvalidTolerance(_))
            ));
        }
    }
}
