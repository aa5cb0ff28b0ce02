//! Levenberg-Marquardt least squares with a fixed-parameter mask.
//!
//! The solver is an explicit state machine: the parameter vector moves by
//! value from `Initialized` through `Iterating` into one of the terminal
//! states `Converged` or `Failed`. A candidate step whose residuals cannot
//! be computed (for example because the parameters leave the model domain)
//! is rejected and the damping increased, it never becomes the iterate.
//! `Failed` carries the last accepted iterate together with the reason.
use crate::error::{FourierError, Result};
use nalgebra::{DMatrix, DVector};
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevenbergMarquardtConfig {
    pub max_iterations: usize,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    pub max_lambda: f64,
    /// Relative improvement of chi-square below which the fit is converged.
    pub chi_square_tolerance: f64,
    /// Chi-square below which the fit is converged outright.
    pub absolute_chi_square: f64,
    pub step_tolerance: f64,
    pub gradient_tolerance: f64,
    /// Largest cosine between the residuals and a Jacobian column at which
    /// an iterate that no damping can improve counts as stationary.
    pub orthogonality_tolerance: f64,
    pub finite_difference_step: f64,
}

impl Default for LevenbergMarquardtConfig {
    fn default() -> Self {
        LevenbergMarquardtConfig {
            max_iterations: 200,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            max_lambda: 1e12,
            chi_square_tolerance: 1e-12,
            absolute_chi_square: 1e-20,
            step_tolerance: 1e-14,
            gradient_tolerance: 1e-14,
            orthogonality_tolerance: 1e-3,
            finite_difference_step: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SolverStatus {
    Converged,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeastSquareResult {
    pub parameters: Vec<f64>,
    pub chi_square: f64,
    pub iterations: usize,
    pub status: SolverStatus,
}

impl LeastSquareResult {
    pub fn converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }
}

#[derive(Debug, Clone)]
struct Iterate {
    parameters: Vec<f64>,
    residuals: Vec<f64>,
    chi_square: f64,
    iteration: usize,
    lambda: f64,
}

impl Iterate {
    fn finish(self, status: SolverStatus) -> LeastSquareResult {
        LeastSquareResult {
            parameters: self.parameters,
            chi_square: self.chi_square,
            iterations: self.iteration,
            status,
        }
    }
}

enum SolverState {
    Initialized(Vec<f64>),
    Iterating(Iterate),
    Converged(Iterate),
    Failed(Iterate, String),
}

type Residuals<'a> = &'a dyn Fn(&[f64]) -> Result<Vec<f64>>;
type Jacobian<'a> = &'a dyn Fn(&[f64]) -> Result<DMatrix<f64>>;

fn chi_square(residuals: &[f64]) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

/// Largest |cos| between the residual vector and a Jacobian column.
fn max_cosine(j: &DMatrix<f64>, r: &DVector<f64>, gradient: &DVector<f64>) -> f64 {
    let residual_norm = r.norm();
    j.column_iter()
        .zip(gradient.iter())
        .map(|(column, g)| {
            let scale = column.norm() * residual_norm;
            if scale > 0.0 {
                g.abs() / scale
            } else {
                0.0
            }
        })
        .fold(0.0, f64::max)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LevenbergMarquardt {
    config: LevenbergMarquardtConfig,
}

impl LevenbergMarquardt {
    pub fn new(config: LevenbergMarquardtConfig) -> Self {
        LevenbergMarquardt { config }
    }

    /// Minimizes the sum of squared residuals with a forward difference
    /// Jacobian. Entries of `fixed` that are `true` keep their initial value.
    pub fn solve<R>(&self, residuals: R, initial: Vec<f64>, fixed: &[bool]) -> Result<LeastSquareResult>
    where
        R: Fn(&[f64]) -> Result<Vec<f64>>,
    {
        let finite_difference = |x: &[f64]| self.finite_difference_jacobian(&residuals, x, fixed);
        self.run(&residuals, &finite_difference, initial, fixed)
    }

    /// Same as [`LevenbergMarquardt::solve`] with a caller supplied Jacobian
    /// (rows are residuals, columns are all parameters, fixed ones included).
    pub fn solve_with_jacobian<R, J>(
        &self,
        residuals: R,
        jacobian: J,
        initial: Vec<f64>,
        fixed: &[bool],
    ) -> Result<LeastSquareResult>
    where
        R: Fn(&[f64]) -> Result<Vec<f64>>,
        J: Fn(&[f64]) -> Result<DMatrix<f64>>,
    {
        self.run(&residuals, &jacobian, initial, fixed)
    }

    fn finite_difference_jacobian<R>(
        &self,
        residuals: &R,
        x: &[f64],
        fixed: &[bool],
    ) -> Result<DMatrix<f64>>
    where
        R: Fn(&[f64]) -> Result<Vec<f64>>,
    {
        let base = residuals(x)?;
        let mut jacobian = DMatrix::zeros(base.len(), x.len());
        for (column, is_fixed) in fixed.iter().enumerate() {
            if *is_fixed {
                continue;
            }
            let h = self.config.finite_difference_step * x[column].abs().max(1e-2);
            let mut bumped = x.to_vec();
            bumped[column] += h;
            //a bump out of the model domain falls back to a backward difference
            let (shifted, step) = match residuals(&bumped) {
                Ok(r) => (r, h),
                Err(_) => {
                    bumped[column] = x[column] - h;
                    (residuals(&bumped)?, -h)
                }
            };
            for (row, (s, b)) in shifted.iter().zip(base.iter()).enumerate() {
                jacobian[(row, column)] = (s - b) / step;
            }
        }
        Ok(jacobian)
    }

    fn run(
        &self,
        residuals: Residuals,
        jacobian: Jacobian,
        initial: Vec<f64>,
        fixed: &[bool],
    ) -> Result<LeastSquareResult> {
        ensure_input!(
            initial.len() == fixed.len(),
            "{} parameters but a mask of length {}",
            initial.len(),
            fixed.len()
        );
        let free: Vec<usize> = (0..initial.len()).filter(|i| !fixed[*i]).collect();
        let mut state = SolverState::Initialized(initial);
        loop {
            state = match state {
                SolverState::Initialized(parameters) => {
                    let r = residuals(&parameters)?;
                    ensure_input!(!r.is_empty(), "no residuals to fit");
                    let chi = chi_square(&r);
                    if !chi.is_finite() {
                        return Err(FourierError::NotConverged {
                            method: "levenberg-marquardt",
                            reason: "chi-square is not finite at the initial point".to_string(),
                        });
                    }
                    let iterate = Iterate {
                        parameters,
                        residuals: r,
                        chi_square: chi,
                        iteration: 0,
                        lambda: self.config.initial_lambda,
                    };
                    if free.is_empty() {
                        SolverState::Converged(iterate)
                    } else {
                        SolverState::Iterating(iterate)
                    }
                }
                SolverState::Iterating(iterate) => self.step(iterate, residuals, jacobian, &free),
                SolverState::Converged(iterate) => {
                    debug!(
                        chi_square = iterate.chi_square,
                        iterations = iterate.iteration,
                        "levenberg-marquardt converged"
                    );
                    return Ok(iterate.finish(SolverStatus::Converged));
                }
                SolverState::Failed(iterate, reason) => {
                    warn!(
                        chi_square = iterate.chi_square,
                        iterations = iterate.iteration,
                        reason = reason.as_str(),
                        "levenberg-marquardt failed"
                    );
                    return Ok(iterate.finish(SolverStatus::Failed(reason)));
                }
            }
        }
    }

    fn step(
        &self,
        iterate: Iterate,
        residuals: Residuals,
        jacobian: Jacobian,
        free: &[usize],
    ) -> SolverState {
        if iterate.iteration >= self.config.max_iterations {
            let reason = format!("no convergence within {} iterations", self.config.max_iterations);
            return SolverState::Failed(iterate, reason);
        }
        let full = match jacobian(&iterate.parameters) {
            Ok(j) => j,
            Err(e) => {
                let reason = format!("jacobian evaluation failed: {}", e);
                return SolverState::Failed(iterate, reason);
            }
        };
        let m = iterate.residuals.len();
        if full.nrows() != m || full.ncols() != iterate.parameters.len() {
            let reason = format!(
                "jacobian is {}x{}, expected {}x{}",
                full.nrows(),
                full.ncols(),
                m,
                iterate.parameters.len()
            );
            return SolverState::Failed(iterate, reason);
        }
        let j = DMatrix::from_fn(m, free.len(), |row, column| full[(row, free[column])]);
        let r = DVector::from_column_slice(&iterate.residuals);
        let jt = j.transpose();
        let normal = &jt * &j;
        let gradient = &jt * &r;
        if !gradient.iter().all(|g| g.is_finite()) {
            return SolverState::Failed(iterate, "gradient is not finite".to_string());
        }
        if gradient.amax() <= self.config.gradient_tolerance {
            return SolverState::Converged(iterate);
        }
        let max_diagonal = normal.diagonal().amax();
        let mut lambda = iterate.lambda;
        loop {
            if lambda > self.config.max_lambda {
                let cosine = max_cosine(&j, &r, &gradient);
                debug!(lambda, cosine, "damping exhausted without improvement");
                //residuals orthogonal to the Jacobian: noise has stalled a stationary point
                return if cosine <= self.config.orthogonality_tolerance {
                    SolverState::Converged(iterate)
                } else {
                    let reason = format!("damping exhausted with residual cosine {:.3e}", cosine);
                    SolverState::Failed(iterate, reason)
                };
            }
            let mut damped = normal.clone();
            for i in 0..free.len() {
                damped[(i, i)] += lambda * (normal[(i, i)].abs() + 1e-12 * (1.0 + max_diagonal));
            }
            let delta = match damped.lu().solve(&(-&gradient)) {
                Some(delta) => delta,
                None => {
                    lambda *= self.config.lambda_up;
                    continue;
                }
            };
            let scale: f64 = free.iter().map(|i| iterate.parameters[*i].abs()).sum();
            if delta.norm() <= self.config.step_tolerance * (scale + self.config.step_tolerance) {
                return SolverState::Converged(iterate);
            }
            let mut candidate = iterate.parameters.clone();
            for (d, i) in delta.iter().zip(free.iter()) {
                candidate[*i] += d;
            }
            let candidate_residuals = match residuals(&candidate) {
                Ok(r) => r,
                Err(e) => {
                    trace!(lambda, error = %e, "rejected step outside the model domain");
                    lambda *= self.config.lambda_up;
                    continue;
                }
            };
            let candidate_chi = chi_square(&candidate_residuals);
            if !candidate_chi.is_finite() || candidate_chi >= iterate.chi_square {
                trace!(lambda, candidate_chi, "rejected step without improvement");
                lambda *= self.config.lambda_up;
                continue;
            }
            let improvement = iterate.chi_square - candidate_chi;
            let next = Iterate {
                parameters: candidate,
                residuals: candidate_residuals,
                chi_square: candidate_chi,
                iteration: iterate.iteration + 1,
                lambda: (lambda * self.config.lambda_down).max(1e-15),
            };
            debug!(
                iteration = next.iteration,
                chi_square = next.chi_square,
                lambda = next.lambda,
                "levenberg-marquardt step accepted"
            );
            return if candidate_chi <= self.config.absolute_chi_square
                || improvement <= self.config.chi_square_tolerance * iterate.chi_square
            {
                SolverState::Converged(next)
            } else {
                SolverState::Iterating(next)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::*;

    fn exponential_residuals(p: &[f64]) -> Result<Vec<f64>> {
        //data generated by y = 2 exp(-0.5 x)
        Ok((0..10)
            .map(|i| {
                let x = i as f64 * 0.5;
                p[0] * (-p[1] * x).exp() - 2.0 * (-0.5 * x).exp()
            })
            .collect())
    }

    #[test]
    fn fits_exponential_decay() {
        let result = LevenbergMarquardt::default()
            .solve(exponential_residuals, vec![1.0, 1.0], &[false, false])
            .unwrap();
        assert!(result.converged());
        assert_abs_diff_eq!(result.parameters[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(result.parameters[1], 0.5, epsilon = 1e-6);
        assert!(result.chi_square < 1e-12);
    }

    #[test]
    fn fixed_parameters_do_not_move() {
        let result = LevenbergMarquardt::default()
            .solve(exponential_residuals, vec![2.0, 0.9], &[true, false])
            .unwrap();
        assert_eq!(result.parameters[0], 2.0);
        assert_abs_diff_eq!(result.parameters[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn analytic_jacobian_matches_finite_difference_fit() {
        let jacobian = |p: &[f64]| {
            Ok(DMatrix::from_fn(10, 2, |row, column| {
                let x = row as f64 * 0.5;
                if column == 0 {
                    (-p[1] * x).exp()
                } else {
                    -x * p[0] * (-p[1] * x).exp()
                }
            }))
        };
        let result = LevenbergMarquardt::default()
            .solve_with_jacobian(exponential_residuals, jacobian, vec![1.0, 1.0], &[false, false])
            .unwrap();
        assert!(result.converged());
        assert_abs_diff_eq!(result.parameters[1], 0.5, epsilon = 1e-8);
    }

    #[test]
    fn steps_outside_the_domain_are_rejected() {
        //the residual refuses negative rates, the minimum sits on the boundary
        let residuals = |p: &[f64]| {
            if p[0] < 0.0 {
                Err(FourierError::InvalidParameter("negative".into()))
            } else {
                Ok(vec![p[0] + 1.0, p[0] + 1.0])
            }
        };
        let result = LevenbergMarquardt::default()
            .solve(residuals, vec![1.0], &[false])
            .unwrap();
        assert!(result.parameters[0] >= 0.0);
        assert_abs_diff_eq!(result.parameters[0], 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(result.chi_square, 2.0, epsilon = 1e-7);
        //the gradient still points out of the domain, so the fit is not a stationary point
        match result.status {
            SolverStatus::Failed(reason) => assert!(reason.contains("damping exhausted")),
            SolverStatus::Converged => panic!("a boundary minimum is not a stationary point"),
        }
    }

    #[test]
    fn inconsistent_data_converges_at_the_least_squares_point() {
        //two incompatible observations of one level, the best fit is their mean
        let residuals = |p: &[f64]| Ok(vec![p[0] - 1.0, p[0] - 3.0]);
        let result = LevenbergMarquardt::default()
            .solve(residuals, vec![10.0], &[false])
            .unwrap();
        assert!(result.converged());
        assert_abs_diff_eq!(result.parameters[0], 2.0, epsilon = 1e-8);
        assert_abs_diff_eq!(result.chi_square, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn exhausted_budget_reports_last_valid_iterate() {
        let config = LevenbergMarquardtConfig {
            max_iterations: 1,
            ..LevenbergMarquardtConfig::default()
        };
        let result = LevenbergMarquardt::new(config)
            .solve(exponential_residuals, vec![0.5, 2.0], &[false, false])
            .unwrap();
        assert!(!result.converged());
        assert!(result.chi_square.is_finite());
        assert_eq!(result.parameters.len(), 2);
    }

    #[test]
    fn mask_length_is_validated() {
        let result = LevenbergMarquardt::default().solve(exponential_residuals, vec![1.0, 1.0], &[false]);
        assert!(matches!(result, Err(FourierError::InvalidInput(_))));
    }
}
