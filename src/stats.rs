//! Descriptive statistics of temperature samples.
//!
//! [`Stats`] accumulates count, extrema and the first two
//! moments incrementally, so it can be folded over pixels in
//! parallel. The free functions compute the order- and
//! shape-based statistics that need the full sample.
//!
//! All functions ignore missing (`NaN`) values and return
//! `NaN` when nothing is left to summarise.
use std::{collections::HashMap, ops::AddAssign};

use serde_derive::Serialize;

/// Incremental statistics of a `f64` sample. Accumulate by
/// add-assigning a value or another `Stats`.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Stats {
    count: usize,
    min: f64,
    max: f64,
    sum: f64,
    sum_2: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.,
            sum_2: 0.,
        }
    }
}

impl AddAssign<f64> for Stats {
    fn add_assign(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.sum_2 += value * value;
    }
}

impl AddAssign<&Stats> for Stats {
    fn add_assign(&mut self, other: &Stats) {
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.sum_2 += other.sum_2;
    }
}

impl<'a> FromIterator<&'a f64> for Stats {
    fn from_iter<I: IntoIterator<Item = &'a f64>>(iter: I) -> Self {
        let mut stats = Stats::default();
        for &v in iter {
            stats += v;
        }
        stats
    }
}

impl Stats {
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.max
        }
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }

    /// Sample variance (`n - 1` denominator).
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return f64::NAN;
        }
        let n = self.count as f64;
        ((self.sum_2 - self.sum * self.sum / n) / (n - 1.)).max(0.)
    }

    #[inline]
    pub fn std_deviation(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Copy of the non-missing values, sorted ascending.
fn sorted_valid(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Central moments `(n, m2, m3, m4)` with population (`1/n`)
/// normalisation.
fn central_moments(values: &[f64]) -> (usize, f64, f64, f64) {
    let mean = mean(values);
    let (mut n, mut m2, mut m3, mut m4) = (0, 0., 0., 0.);
    for d in values.iter().filter(|v| !v.is_nan()).map(|v| v - mean) {
        let d2 = d * d;
        n += 1;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    let nf = n as f64;
    (n, m2 / nf, m3 / nf, m4 / nf)
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().collect::<Stats>().mean()
}

pub fn variance(values: &[f64]) -> f64 {
    values.iter().collect::<Stats>().variance()
}

pub fn sd(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

pub fn median(values: &[f64]) -> f64 {
    percentile(values, 0.5)
}

/// Quantile at probability `p` (in `[0, 1]`), interpolating
/// linearly between order statistics (R's default, type 7).
pub fn percentile(values: &[f64], p: f64) -> f64 {
    let sorted = sorted_valid(values);
    if sorted.is_empty() || !(0. ..=1.).contains(&p) {
        return f64::NAN;
    }
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

#[inline]
pub fn perc_5(values: &[f64]) -> f64 {
    percentile(values, 0.05)
}

#[inline]
pub fn perc_95(values: &[f64]) -> f64 {
    percentile(values, 0.95)
}

/// Moment coefficient of skewness, `m3 / m2^(3/2)`.
pub fn skewness(values: &[f64]) -> f64 {
    let (n, m2, m3, _) = central_moments(values);
    if n == 0 || m2 <= 0. {
        return f64::NAN;
    }
    m3 / m2.powf(1.5)
}

/// Pearson's kurtosis `m4 / m2^2`; a normal sample gives 3.
pub fn kurtosis(values: &[f64]) -> f64 {
    let (n, m2, _, m4) = central_moments(values);
    if n == 0 || m2 <= 0. {
        return f64::NAN;
    }
    m4 / (m2 * m2)
}

/// Width of the temperature classes used by the diversity
/// indices: values are rounded to the nearest degree.
pub const DIVERSITY_BIN_WIDTH: f64 = 1.;

/// Proportions of the sample falling in each `bin_width` class.
fn class_proportions(values: &[f64], bin_width: f64) -> Vec<f64> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    let mut total = 0usize;
    for v in values.iter().filter(|v| v.is_finite()) {
        *counts.entry((v / bin_width).round() as i64).or_insert(0) += 1;
        total += 1;
    }
    counts
        .values()
        .map(|&c| c as f64 / total as f64)
        .collect()
}

/// Shannon diversity index `-Σ p ln p` over temperature classes.
pub fn shannon_diversity(values: &[f64], bin_width: f64) -> f64 {
    let props = class_proportions(values, bin_width);
    if props.is_empty() {
        return f64::NAN;
    }
    -props.iter().map(|p| p * p.ln()).sum::<f64>()
}

/// Simpson diversity index `1 - Σ p²` over temperature classes.
pub fn simpson_diversity(values: &[f64], bin_width: f64) -> f64 {
    let props = class_proportions(values, bin_width);
    if props.is_empty() {
        return f64::NAN;
    }
    1. - props.iter().map(|p| p * p).sum::<f64>()
}
