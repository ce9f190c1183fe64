//! Local Getis-Ord G statistic.
//!
//! Returns the standardised (z-score) form of `G_i` (neighbours
//! only) or `G_i*` (the cell counted among its own neighbours).
//! Large positive values mark clusters of high temperatures and
//! large negative values clusters of low temperatures.
use anyhow::{ensure, Result};

use crate::neighbours::SpatialWeights;

/// z-scores of the local G statistic, one per node of `weights`.
///
/// With `include_self`, the weights are expected to contain
/// the self-links (see
/// [`Neighbours::from_grid`](crate::neighbours::Neighbours::from_grid)).
/// Nodes whose variance is not positive (no neighbours, or a
/// constant surface) get `NaN`.
pub fn local_g(x: &[f64], weights: &SpatialWeights, include_self: bool) -> Result<Vec<f64>> {
    let n = x.len();
    ensure!(
        n == weights.len(),
        "value count ({}) does not match weights ({})",
        n,
        weights.len()
    );
    ensure!(n >= 3, "local G needs at least 3 values, found {}", n);
    let nf = n as f64;

    // G is invariant to a shift of the values; centring keeps
    // the variance terms well conditioned.
    let centre = x.iter().sum::<f64>() / nf;
    let x: Vec<f64> = x.iter().map(|v| v - centre).collect();
    let tolerance = 1e-24 * (1. + centre * centre);

    let sum: f64 = x.iter().sum();
    let sum_2: f64 = x.iter().map(|v| v * v).sum();

    let lag = weights.lag(&x);
    let w = weights.row_sums();
    let s1 = weights.row_square_sums();

    Ok((0..n)
        .map(|i| {
            let (mean, var_x, var_factor) = if include_self {
                let mean = sum / nf;
                let var_x = sum_2 / nf - mean * mean;
                (mean, var_x, (nf * s1[i] - w[i] * w[i]) / (nf - 1.))
            } else {
                let mean = (sum - x[i]) / (nf - 1.);
                let var_x = (sum_2 - x[i] * x[i]) / (nf - 1.) - mean * mean;
                (mean, var_x, ((nf - 1.) * s1[i] - w[i] * w[i]) / (nf - 2.))
            };
            if var_x > tolerance && var_factor > 0. {
                (lag[i] - w[i] * mean) / (var_x * var_factor).sqrt()
            } else {
                f64::NAN
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        grid::TemperatureGrid,
        neighbours::{NeighbourRule, Neighbours, WeightStyle},
    };
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn weights(grid: &TemperatureGrid, style: WeightStyle, include_self: bool) -> SpatialWeights {
        let nb = Neighbours::from_grid(grid, NeighbourRule::Queen, include_self).unwrap();
        SpatialWeights::new(&nb, style)
    }

    #[test]
    fn hand_computed_line() -> Result<()> {
        // 1 x 4 line, links 0-1, 1-2, 2-3.
        let grid = TemperatureGrid::new(Array2::from_shape_vec((1, 4), vec![1., 2., 3., 10.])?);
        let w = weights(&grid, WeightStyle::B, false);
        let g = local_g(&grid.valid_values(), &w, false)?;

        // Node 3 (x = 10): others are 1, 2, 3.
        // mean = 2, var = (1 + 4 + 9) / 3 - 4 = 2/3
        // W = 1, S1 = 1, factor = (3 - 1) / 2 = 1
        // z = (3 - 2) / sqrt(2/3)
        assert_relative_eq!(g[3], 1. / (2f64 / 3.).sqrt(), epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn hand_computed_line_with_self() -> Result<()> {
        // Same line; every node also links to itself.
        let grid = TemperatureGrid::new(Array2::from_shape_vec((1, 4), vec![1., 2., 3., 10.])?);
        let w = weights(&grid, WeightStyle::B, true);
        let g = local_g(&grid.valid_values(), &w, true)?;

        // mean = 4, var = (1 + 4 + 9 + 100) / 4 - 16 = 12.5
        // W = 2, S1 = 2, factor = (4 * 2 - 4) / 3 = 4/3
        // node 3: sum of {3, 10} = 13, z = (13 - 8) / sqrt(50/3)
        // node 0: sum of {1, 2} = 3, z = (3 - 8) / sqrt(50/3)
        let sd = (50f64 / 3.).sqrt();
        assert_relative_eq!(g[3], 5. / sd, epsilon = 1e-12);
        assert_relative_eq!(g[0], -5. / sd, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn hotspot_is_positive() -> Result<()> {
        let mut values = Array2::from_elem((9, 9), 20.);
        for r in 3..6 {
            for c in 3..6 {
                values[(r, c)] = 35.;
            }
        }
        // break the constant background
        values[(0, 0)] = 19.;
        values[(8, 8)] = 21.;
        let grid = TemperatureGrid::new(values);
        let w = weights(&grid, WeightStyle::C, true);
        let g = local_g(&grid.valid_values(), &w, true)?;

        let centre = 4 * 9 + 4;
        let corner = 0;
        assert!(g[centre] > 1.96, "centre z = {}", g[centre]);
        assert!(g[corner] < 0.);
        Ok(())
    }

    #[test]
    fn constant_surface_is_nan() -> Result<()> {
        let grid = TemperatureGrid::new(Array2::from_elem((3, 3), 5.));
        let w = weights(&grid, WeightStyle::W, false);
        assert!(local_g(&grid.valid_values(), &w, false)?.iter().all(|z| z.is_nan()));
        Ok(())
    }

    #[test]
    fn too_few_values() {
        let grid = TemperatureGrid::new(Array2::from_elem((1, 2), 5.));
        let w = weights(&grid, WeightStyle::B, false);
        assert!(local_g(&grid.valid_values(), &w, false).is_err());
    }
}
