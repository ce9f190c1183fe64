//! Statistics selected by name.
//!
//! Users ask for pixel statistics and summary statistics as a
//! list of names (`"mean,perc_95,SHDI"`). [`Statistic`] is the
//! parsed form; [`summarize`] applies a list of them to a
//! sample and keeps the requested order.
use std::{fmt, str::FromStr};

use anyhow::{anyhow, bail, Error, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::stats::{self, DIVERSITY_BIN_WIDTH};

/// Most decimals an `f64` holds exactly enough to round to.
pub const MAX_ROUND_DIGITS: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Statistic {
    Mean,
    Median,
    Min,
    Max,
    Sd,
    Var,
    Sum,
    Count,
    Range,
    /// Percentile, in percent.
    Percentile(f64),
    Skewness,
    Kurtosis,
    Shdi,
    Sidi,
}

impl Statistic {
    pub fn apply(&self, values: &[f64]) -> f64 {
        use Statistic::*;
        match *self {
            Mean => stats::mean(values),
            Median => stats::median(values),
            Min => values.iter().collect::<stats::Stats>().min(),
            Max => values.iter().collect::<stats::Stats>().max(),
            Sd => stats::sd(values),
            Var => stats::variance(values),
            Sum => values.iter().filter(|v| !v.is_nan()).sum(),
            Count => values.iter().filter(|v| !v.is_nan()).count() as f64,
            Range => {
                let s: stats::Stats = values.iter().collect();
                s.max() - s.min()
            }
            Percentile(p) => stats::percentile(values, p / 100.),
            Skewness => stats::skewness(values),
            Kurtosis => stats::kurtosis(values),
            Shdi => stats::shannon_diversity(values, DIVERSITY_BIN_WIDTH),
            Sidi => stats::simpson_diversity(values, DIVERSITY_BIN_WIDTH),
        }
    }

    /// Parse a comma separated list of names.
    pub fn parse_list(list: &str) -> Result<Vec<Statistic>> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for Statistic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        use Statistic::*;
        let name = s.trim().to_ascii_lowercase();
        Ok(match name.as_str() {
            "mean" => Mean,
            "median" => Median,
            "min" => Min,
            "max" => Max,
            "sd" => Sd,
            "var" => Var,
            "sum" => Sum,
            "count" | "length" | "n" => Count,
            "range" => Range,
            "skewness" | "skew" => Skewness,
            "kurtosis" | "kurt" => Kurtosis,
            "shdi" => Shdi,
            "sidi" => Sidi,
            _ => {
                let perc = name
                    .strip_prefix("perc_")
                    .ok_or_else(|| anyhow!("unknown statistic: {}", s))?;
                let p: f64 = perc
                    .parse()
                    .map_err(|_| anyhow!("invalid percentile in `{}`", s))?;
                if !(0. ..=100.).contains(&p) {
                    bail!("percentile out of range in `{}`", s);
                }
                Percentile(p)
            }
        })
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Statistic::*;
        let name = match *self {
            Mean => "mean",
            Median => "median",
            Min => "min",
            Max => "max",
            Sd => "sd",
            Var => "var",
            Sum => "sum",
            Count => "count",
            Range => "range",
            Percentile(p) => return write!(f, "perc_{}", p),
            Skewness => "skewness",
            Kurtosis => "kurtosis",
            Shdi => "SHDI",
            Sidi => "SIDI",
        };
        f.write_str(name)
    }
}

impl Serialize for Statistic {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Statistic {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Named results, kept in the order they were requested.
/// Serialises as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary(Vec<(String, f64)>);

impl Summary {
    pub fn push<S: Into<String>>(&mut self, name: S, value: f64) {
        self.0.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == name).map(|&(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append the entries of `other` with names prefixed.
    pub fn extend_prefixed(&mut self, prefix: &str, other: &Summary) {
        for (name, value) in other.iter() {
            self.push(format!("{}_{}", prefix, name), value);
        }
    }

    /// Round every value to `digits` decimals, at most
    /// [`MAX_ROUND_DIGITS`].
    pub fn round(&mut self, digits: u32) {
        let scale = 10f64.powi(digits.min(MAX_ROUND_DIGITS) as i32);
        for (_, v) in self.0.iter_mut() {
            *v = (*v * scale).round() / scale;
        }
    }
}

impl Extend<(String, f64)> for Summary {
    fn extend<I: IntoIterator<Item = (String, f64)>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl FromIterator<(String, f64)> for Summary {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Summary(iter.into_iter().collect())
    }
}

impl Serialize for Summary {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.collect_map(self.0.iter().map(|(n, v)| (n, v)))
    }
}

pub fn summarize(values: &[f64], stats: &[Statistic]) -> Summary {
    stats
        .iter()
        .map(|s| (s.to_string(), s.apply(values)))
        .collect()
}
