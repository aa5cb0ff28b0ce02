use super::{finite_or_non_analytic, CharacteristicExponent};
use crate::error::{FourierError, Result};
use num_complex::Complex;
use statrs::function::gamma::gamma;

/// Tempered stable (CGMY) Lévy process. C scales the jump activity, G and
/// M temper the negative and positive tails, Y is the fine structure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgmyCharacteristicExponent {
    c: f64,
    g: f64,
    m: f64,
    y: f64,
}

impl CgmyCharacteristicExponent {
    pub fn new(c: f64, g: f64, m: f64, y: f64) -> Result<Self> {
        ensure_parameter!(c > 0.0 && c.is_finite(), "CGMY C must be positive, got {}", c);
        ensure_parameter!(g > 0.0 && g.is_finite(), "CGMY G must be positive, got {}", g);
        ensure_parameter!(m > 0.0 && m.is_finite(), "CGMY M must be positive, got {}", m);
        ensure_parameter!(y < 2.0 && y.is_finite(), "CGMY Y must be below 2, got {}", y);
        ensure_parameter!(
            y != 0.0 && y != 1.0,
            "CGMY Y = {} is a pole of Γ(-Y) and needs a limiting form",
            y
        );
        Ok(CgmyCharacteristicExponent {
            c,
            g,
            m,
            y,
        })
    }

    pub fn c(&self) -> f64 {
        self.c
    }
    pub fn g(&self) -> f64 {
        self.g
    }
    pub fn m(&self) -> f64 {
        self.m
    }
    pub fn y(&self) -> f64 {
        self.y
    }
}

impl CharacteristicExponent for CgmyCharacteristicExponent {
    fn evaluate(&self, z: Complex<f64>, t: f64) -> Result<Complex<f64>> {
        let i = Complex::<f64>::i();
        let right = self.m - i * z;
        let left = self.g + i * z;
        //principal powers are only continuous on the right half plane
        if right.re <= 0.0 || left.re <= 0.0 {
            return Err(FourierError::non_analytic(z, t));
        }
        let value = t
            * self.c
            * gamma(-self.y)
            * (right.powf(self.y) - self.m.powf(self.y) + left.powf(self.y) - self.g.powf(self.y));
        finite_or_non_analytic(value, z, t)
    }

    fn smallest_alpha(&self) -> f64 {
        -self.g - 1.0
    }

    fn largest_alpha(&self) -> f64 {
        self.m - 1.0
    }
}
