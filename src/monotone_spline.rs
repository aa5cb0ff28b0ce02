//! Shape preserving (Fritsch-Butland) cubic interpolation. Used to carry
//! implied volatilities from the FFT strike grid onto market strikes.
use crate::error::{FourierError, Result};

const KNOT_DISTANCE: f64 = 1e-11;

#[derive(Debug, Clone, PartialEq)]
pub struct MonotoneSpline {
    knots: Vec<(f64, f64)>,
    slopes: Vec<f64>,
    quadratic_and_cubic: Vec<(f64, f64)>,
}

impl MonotoneSpline {
    /// Builds the spline through `knots`, which need at least two points
    /// with strictly increasing abscissae.
    pub fn new(knots: Vec<(f64, f64)>) -> Result<Self> {
        ensure_input!(knots.len() >= 2, "spline needs two knots, got {}", knots.len());
        ensure_input!(
            knots.windows(2).all(|w| w[1].0 > w[0].0),
            "spline knots must be strictly increasing"
        );
        let widths_and_secants: Vec<(f64, f64)> = knots
            .windows(2)
            .map(|point_and_next| {
                let (x_curr, y_curr) = point_and_next[0];
                let (x_next, y_next) = point_and_next[1];
                let width = x_next - x_curr;
                (width, (y_next - y_curr) / width)
            })
            .collect();

        let mut slopes = Vec::with_capacity(knots.len());
        slopes.push(widths_and_secants[0].1);
        slopes.extend(widths_and_secants.windows(2).map(|pair| {
            let (width_curr, secant_curr) = pair[0];
            let (width_next, secant_next) = pair[1];
            let common = width_curr + width_next;
            //local extremum: flat tangent keeps the segment monotone
            if secant_curr * secant_next <= 0.0 {
                0.0
            } else {
                3.0 * common
                    / ((common + width_next) / secant_curr + (common + width_curr) / secant_next)
            }
        }));
        slopes.push(widths_and_secants[widths_and_secants.len() - 1].1);

        let quadratic_and_cubic = slopes
            .windows(2)
            .zip(widths_and_secants.iter())
            .map(|(slope_pair, &(width, secant))| {
                let inv_width = 1.0 / width;
                let common = slope_pair[0] + slope_pair[1] - 2.0 * secant;
                (
                    (secant - slope_pair[0] - common) * inv_width,
                    common * inv_width * inv_width,
                )
            })
            .collect();
        Ok(MonotoneSpline {
            knots,
            slopes,
            quadratic_and_cubic,
        })
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.knots[0].0, self.knots[self.knots.len() - 1].0)
    }

    pub fn value(&self, x: f64) -> Result<f64> {
        let (x_min, x_max) = self.bounds();
        if (x - x_min).abs() <= KNOT_DISTANCE {
            return Ok(self.knots[0].1);
        }
        if (x - x_max).abs() <= KNOT_DISTANCE {
            return Ok(self.knots[self.knots.len() - 1].1);
        }
        if !(x > x_min && x < x_max) {
            return Err(FourierError::InvalidInput(format!(
                "{} is outside the interpolation range [{}, {}]",
                x, x_min, x_max
            )));
        }
        let index = self.knots.partition_point(|&(knot, _)| knot <= x) - 1;
        let (x_curr, y_curr) = self.knots[index];
        let diff = x - x_curr;
        let (quadratic, cubic) = self.quadratic_and_cubic[index];
        Ok(y_curr + diff * (self.slopes[index] + diff * (quadratic + diff * cubic)))
    }
}
