//! Adaptive Gauss-Kronrod (7, 15) quadrature on a finite interval.
//!
//! The interval is first cut into panels that halve in width towards the
//! lower bound, so that mass concentrated near the start of a long range is
//! sampled. Panels are then bisected, always splitting the one with the
//! largest error estimate, until the summed estimate falls below
//! `max(absolute_tolerance, relative_tolerance * |integral|)`.
use crate::error::{FourierError, Result};
use serde_derive::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const KRONROD_NODES: [f64; 8] = [
    0.991_455_371_120_812_639_206_854_697_526_329,
    0.949_107_912_342_758_524_526_189_684_047_851,
    0.864_864_423_359_769_072_789_712_788_640_926,
    0.741_531_185_599_394_439_863_864_773_280_788,
    0.586_087_235_467_691_130_294_144_845_693_013,
    0.405_845_151_377_397_166_906_606_412_076_961,
    0.207_784_955_007_898_467_600_689_403_773_245,
    0.0,
];
const KRONROD_WEIGHTS: [f64; 8] = [
    0.022_935_322_010_529_224_963_732_008_058_970,
    0.063_092_092_629_978_553_290_700_663_189_204,
    0.104_790_010_322_250_183_839_876_322_541_518,
    0.140_653_259_715_525_918_745_189_590_510_238,
    0.169_004_726_639_267_902_826_583_426_598_550,
    0.190_350_578_064_785_409_913_256_402_421_014,
    0.204_432_940_075_298_892_414_161_999_234_649,
    0.209_482_141_084_727_828_012_999_174_891_714,
];
//Gauss weights sit on the odd Kronrod nodes
const GAUSS_WEIGHTS: [f64; 4] = [
    0.129_484_966_168_869_693_270_611_432_679_082,
    0.279_705_391_489_276_667_901_467_771_423_780,
    0.381_830_050_505_118_944_950_369_775_488_975,
    0.417_959_183_673_469_387_755_102_040_816_327,
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegratorConfig {
    pub absolute_tolerance: f64,
    pub relative_tolerance: f64,
    pub max_subdivisions: usize,
    /// Number of halvings towards the lower bound used to seed the panels.
    pub initial_levels: usize,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        IntegratorConfig {
            absolute_tolerance: 1e-12,
            relative_tolerance: 1e-10,
            max_subdivisions: 2000,
            initial_levels: 20,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    lower: f64,
    upper: f64,
    value: f64,
    error: f64,
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.error == other.error
    }
}
impl Eq for Segment {}
impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.error
            .partial_cmp(&other.error)
            .unwrap_or(Ordering::Equal)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GaussKronrodIntegrator {
    config: IntegratorConfig,
}

impl GaussKronrodIntegrator {
    pub fn new(config: IntegratorConfig) -> Self {
        GaussKronrodIntegrator { config }
    }

    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    fn segment<F>(f: &F, lower: f64, upper: f64) -> Result<Segment>
    where
        F: Fn(f64) -> Result<f64>,
    {
        let center = 0.5 * (lower + upper);
        let half_length = 0.5 * (upper - lower);
        let f_center = f(center)?;
        let mut kronrod = f_center * KRONROD_WEIGHTS[7];
        let mut gauss = f_center * GAUSS_WEIGHTS[3];
        for (j, (&node, &weight)) in KRONROD_NODES[..7]
            .iter()
            .zip(KRONROD_WEIGHTS[..7].iter())
            .enumerate()
        {
            let dx = half_length * node;
            let pair = f(center - dx)? + f(center + dx)?;
            kronrod += weight * pair;
            if j % 2 == 1 {
                gauss += GAUSS_WEIGHTS[j / 2] * pair;
            }
        }
        let value = kronrod * half_length;
        let error = ((kronrod - gauss) * half_length).abs();
        if !value.is_finite() {
            return Err(FourierError::NotConverged {
                method: "gauss-kronrod",
                reason: format!("integrand is not finite on [{}, {}]", lower, upper),
            });
        }
        Ok(Segment {
            lower,
            upper,
            value,
            error,
        })
    }

    /// Integrates `f` over `[lower, upper]`; errors raised by `f` are
    /// returned unchanged.
    pub fn integrate<F>(&self, f: F, lower: f64, upper: f64) -> Result<f64>
    where
        F: Fn(f64) -> Result<f64>,
    {
        ensure_input!(
            lower.is_finite() && upper.is_finite(),
            "integration bounds must be finite, got [{}, {}]",
            lower,
            upper
        );
        if lower == upper {
            return Ok(0.0);
        }
        if upper < lower {
            return self.integrate(f, upper, lower).map(|v| -v);
        }
        let mut heap = BinaryHeap::new();
        let mut edge = upper;
        for _ in 0..self.config.initial_levels {
            let mid = lower + 0.5 * (edge - lower);
            if mid <= lower || mid >= edge {
                break;
            }
            heap.push(Self::segment(&f, mid, edge)?);
            edge = mid;
        }
        heap.push(Self::segment(&f, lower, edge)?);
        let mut total: f64 = heap.iter().map(|s| s.value).sum();
        let mut total_error: f64 = heap.iter().map(|s| s.error).sum();
        let mut subdivisions = heap.len();
        while total_error
            > self
                .config
                .absolute_tolerance
                .max(self.config.relative_tolerance * total.abs())
        {
            if subdivisions >= self.config.max_subdivisions {
                return Err(FourierError::NotConverged {
                    method: "gauss-kronrod",
                    reason: format!(
                        "error estimate {:e} after {} subdivisions",
                        total_error, subdivisions
                    ),
                });
            }
            let worst = match heap.pop() {
                Some(segment) => segment,
                None => break,
            };
            let mid = 0.5 * (worst.lower + worst.upper);
            let left = Self::segment(&f, worst.lower, mid)?;
            let right = Self::segment(&f, mid, worst.upper)?;
            total += left.value + right.value - worst.value;
            total_error += left.error + right.error - worst.error;
            heap.push(left);
            heap.push(right);
            subdivisions += 1;
        }
        //re-sum to shed the drift of the running update
        Ok(heap.iter().map(|s| s.value).sum())
    }
}
