//! Error taxonomy shared by every pricer and the calibration.
use thiserror::Error;

/// Broad class of a [`FourierError`], useful when callers only care
/// whether an input, a model or a numerical routine is at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Construction,
    Evaluation,
    Convergence,
    InputValidation,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FourierError {
    #[error("invalid model parameter: {0}")]
    InvalidParameter(String),
    #[error("damping factor {alpha} is outside the valid strip ({smallest}, {largest})")]
    AlphaOutOfRange {
        alpha: f64,
        smallest: f64,
        largest: f64,
    },
    #[error("damping factor {0} is degenerate, the kernel is singular at the origin")]
    DegenerateAlpha(f64),
    #[error("characteristic exponent is not analytic at z = {re} + {im}i (t = {t})")]
    NonAnalytic { re: f64, im: f64, t: f64 },
    #[error("{method} did not converge: {reason}")]
    NotConverged {
        method: &'static str,
        reason: String,
    },
    #[error("root is not bracketed by [{lower}, {upper}]")]
    NoBracket { lower: f64, upper: f64 },
    #[error("tolerance must lie in (0, 1), got {0}")]
    InvalidTolerance(f64),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl FourierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FourierError::InvalidParameter(_) => ErrorKind::Construction,
            FourierError::AlphaOutOfRange { .. }
            | FourierError::DegenerateAlpha(_)
            | FourierError::NonAnalytic { .. } => ErrorKind::Evaluation,
            FourierError::NotConverged { .. } | FourierError::NoBracket { .. } => {
                ErrorKind::Convergence
            }
            FourierError::InvalidTolerance(_) | FourierError::InvalidInput(_) => {
                ErrorKind::InputValidation
            }
        }
    }

    pub(crate) fn non_analytic(z: num_complex::Complex<f64>, t: f64) -> Self {
        FourierError::NonAnalytic {
            re: z.re,
            im: z.im,
            t,
        }
    }
}

pub type Result<T, E = FourierError> = std::result::Result<T, E>;

/// Returns early with an [`FourierError::InvalidParameter`] when the
/// condition does not hold.
macro_rules! ensure_parameter {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::FourierError::InvalidParameter(format!($($arg)+)));
        }
    };
}

/// Same as `ensure_parameter!` for caller supplied inputs.
macro_rules! ensure_input {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::FourierError::InvalidInput(format!($($arg)+)));
        }
    };
}

pub(crate) fn check_tolerance(tolerance: f64) -> Result<()> {
    if tolerance > 0.0 && tolerance < 1.0 {
        Ok(())
    } else {
        Err(FourierError::InvalidTolerance(tolerance))
    }
}
