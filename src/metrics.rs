//! Class-level landscape metrics of hot and cold patches.
//!
//! Metrics are defined on raster cells as in FRAGSTATS: an edge
//! is a cell side not shared with a cell of the same patch (the
//! grid border and missing cells count), shape indices are in
//! cell units, areas and lengths in map units.
use serde_derive::Serialize;

use crate::{
    grid::TemperatureGrid,
    patches::{Patch, PatchClass, Patches},
    stats,
    summary::{summarize, Statistic, Summary},
};

#[derive(Serialize, Debug, Clone)]
pub struct ClassMetrics {
    pub n_patches: usize,
    pub n_cells: usize,
    pub total_area: f64,
    pub prop_landscape: f64,
    pub patch_density: f64,
    pub total_edge: f64,
    pub edge_density: f64,
    pub landscape_shape_index: f64,
    pub largest_patch_index: f64,
    pub mean_patch_area: f64,
    pub sd_patch_area: f64,
    pub min_patch_area: f64,
    pub max_patch_area: f64,
    pub mean_shape_index: f64,
    pub sd_shape_index: f64,
    pub min_shape_index: f64,
    pub max_shape_index: f64,
    pub mean_frac_dim_index: f64,
    pub mean_perim_area_ratio: f64,
    pub perim_area_frac_dim: f64,
    pub aggregation_index: f64,
    pub patch_cohesion_index: f64,
    pub landscape_division_index: f64,
    pub splitting_index: f64,
    pub effective_mesh_size: f64,
}

impl ClassMetrics {
    /// Metrics of `patches` in a landscape of `landscape_cells`
    /// valid cells of `cell_area` each.
    pub fn from_patches(patches: &[&Patch], landscape_cells: usize, cell_area: f64) -> Self {
        let landscape_area = landscape_cells as f64 * cell_area;
        let n_cells: usize = patches.iter().map(|p| p.n_cells).sum();
        let edges: usize = patches.iter().map(|p| p.edges).sum();
        let total_area = n_cells as f64 * cell_area;

        let areas: Vec<f64> = patches.iter().map(|p| p.area).collect();
        let shapes: Vec<f64> = patches.iter().map(|p| p.shape_index).collect();
        let area_stats: stats::Stats = areas.iter().collect();
        let shape_stats: stats::Stats = shapes.iter().collect();
        let sum_sq_area: f64 = areas.iter().map(|a| a * a).sum();

        ClassMetrics {
            n_patches: patches.len(),
            n_cells,
            total_area,
            prop_landscape: total_area / landscape_area,
            patch_density: patches.len() as f64 / landscape_area,
            total_edge: patches.iter().map(|p| p.perimeter).sum(),
            edge_density: patches.iter().map(|p| p.perimeter).sum::<f64>() / landscape_area,
            landscape_shape_index: if n_cells > 0 {
                0.25 * edges as f64 / (n_cells as f64).sqrt()
            } else {
                f64::NAN
            },
            largest_patch_index: area_stats.max() / landscape_area,
            mean_patch_area: area_stats.mean(),
            sd_patch_area: area_stats.std_deviation(),
            min_patch_area: area_stats.min(),
            max_patch_area: area_stats.max(),
            mean_shape_index: shape_stats.mean(),
            sd_shape_index: shape_stats.std_deviation(),
            min_shape_index: shape_stats.min(),
            max_shape_index: shape_stats.max(),
            mean_frac_dim_index: stats::mean(&patches.iter().map(|p| p.frac_dim).collect::<Vec<_>>()),
            mean_perim_area_ratio: stats::mean(
                &patches.iter().map(|p| p.perimeter / p.area).collect::<Vec<_>>(),
            ),
            perim_area_frac_dim: perim_area_frac_dim(patches),
            aggregation_index: aggregation_index(n_cells, edges),
            patch_cohesion_index: cohesion(patches, landscape_cells),
            landscape_division_index: if patches.is_empty() {
                f64::NAN
            } else {
                1. - sum_sq_area / (landscape_area * landscape_area)
            },
            splitting_index: if patches.is_empty() {
                f64::NAN
            } else {
                landscape_area * landscape_area / sum_sq_area
            },
            effective_mesh_size: if patches.is_empty() {
                f64::NAN
            } else {
                sum_sq_area / landscape_area
            },
        }
    }

    /// Field names and values in declaration order.
    pub fn summary(&self) -> Summary {
        let mut s = Summary::default();
        s.push("n_patches", self.n_patches as f64);
        s.push("n_cells", self.n_cells as f64);
        s.push("total_area", self.total_area);
        s.push("prop_landscape", self.prop_landscape);
        s.push("patch_density", self.patch_density);
        s.push("total_edge", self.total_edge);
        s.push("edge_density", self.edge_density);
        s.push("landscape_shape_index", self.landscape_shape_index);
        s.push("largest_patch_index", self.largest_patch_index);
        s.push("mean_patch_area", self.mean_patch_area);
        s.push("sd_patch_area", self.sd_patch_area);
        s.push("min_patch_area", self.min_patch_area);
        s.push("max_patch_area", self.max_patch_area);
        s.push("mean_shape_index", self.mean_shape_index);
        s.push("sd_shape_index", self.sd_shape_index);
        s.push("min_shape_index", self.min_shape_index);
        s.push("max_shape_index", self.max_shape_index);
        s.push("mean_frac_dim_index", self.mean_frac_dim_index);
        s.push("mean_perim_area_ratio", self.mean_perim_area_ratio);
        s.push("perim_area_frac_dim", self.perim_area_frac_dim);
        s.push("aggregation_index", self.aggregation_index);
        s.push("patch_cohesion_index", self.patch_cohesion_index);
        s.push("landscape_division_index", self.landscape_division_index);
        s.push("splitting_index", self.splitting_index);
        s.push("effective_mesh_size", self.effective_mesh_size);
        s
    }
}

/// Largest number of shared sides `a` cells can have, reached
/// by packing them into a square.
pub fn max_like_adjacencies(a: usize) -> usize {
    if a == 0 {
        return 0;
    }
    let mut n = (a as f64).sqrt() as usize;
    while n * n > a {
        n -= 1;
    }
    while (n + 1) * (n + 1) <= a {
        n += 1;
    }
    let m = a - n * n;
    let base = 2 * n * (n - 1);
    match m {
        0 => base,
        m if m <= n => base + 2 * m - 1,
        m => base + 2 * m - 2,
    }
}

/// `g_ii / max g_ii`, in percent. Every shared side removes two
/// boundary edges, so `g_ii = (4a - edges) / 2`.
pub fn aggregation_index(n_cells: usize, edges: usize) -> f64 {
    let max = max_like_adjacencies(n_cells);
    if max == 0 {
        return f64::NAN;
    }
    let like = (4 * n_cells).saturating_sub(edges) as f64 / 2.;
    100. * like / max as f64
}

fn cohesion(patches: &[&Patch], landscape_cells: usize) -> f64 {
    if patches.is_empty() || landscape_cells <= 1 {
        return f64::NAN;
    }
    let p: f64 = patches.iter().map(|p| p.edges as f64).sum();
    let pa: f64 = patches
        .iter()
        .map(|p| p.edges as f64 * (p.n_cells as f64).sqrt())
        .sum();
    (1. - p / pa) / (1. - 1. / (landscape_cells as f64).sqrt()) * 100.
}

/// `2 / b`, `b` the slope of `ln(area)` regressed on
/// `ln(perimeter)` across patches.
fn perim_area_frac_dim(patches: &[&Patch]) -> f64 {
    if patches.len() < 2 {
        return f64::NAN;
    }
    let lp: Vec<f64> = patches.iter().map(|p| p.perimeter.ln()).collect();
    let la: Vec<f64> = patches.iter().map(|p| p.area.ln()).collect();
    let (mp, ma) = (stats::mean(&lp), stats::mean(&la));
    let sxy: f64 = lp.iter().zip(la.iter()).map(|(p, a)| (p - mp) * (a - ma)).sum();
    let sxx: f64 = lp.iter().map(|p| (p - mp) * (p - mp)).sum();
    if sxx <= 0. || sxy == 0. {
        return f64::NAN;
    }
    2. / (sxy / sxx)
}

/// Landscape metrics and temperatures of one patch class.
#[derive(Serialize, Debug, Clone)]
pub struct ClassStats {
    pub class: PatchClass,
    pub metrics: ClassMetrics,
    /// Summary of the temperatures of all pixels in the class.
    pub temp: Summary,
    /// Summary of the per-patch mean temperatures.
    pub patch_temp: Summary,
}

#[derive(Serialize, Debug, Clone)]
pub struct PatchStats {
    pub hot: ClassStats,
    pub cold: ClassStats,
}

impl PatchStats {
    /// Flat `hot_*` / `cold_*` record.
    pub fn summary(&self) -> Summary {
        let mut s = Summary::default();
        for c in [&self.hot, &self.cold] {
            let prefix = c.class.name();
            s.extend_prefixed(prefix, &c.metrics.summary());
            s.extend_prefixed(prefix, &c.temp);
            s.extend_prefixed(&format!("{}_patch", prefix), &c.patch_temp);
        }
        s
    }
}

pub fn patch_stats(grid: &TemperatureGrid, patches: &Patches, sum_stats: &[Statistic]) -> PatchStats {
    let landscape_cells = grid.n_valid();
    let cell_area = grid.cell_area();

    let class_stats = |class: PatchClass| {
        let members: Vec<&Patch> = patches.of_class(class).collect();
        let temps: Vec<f64> = grid
            .values
            .iter()
            .zip(patches.class.iter())
            .filter(|(_, c)| **c == class)
            .map(|(&v, _)| v)
            .collect();
        let patch_means: Vec<f64> = members.iter().map(|p| p.mean_temp).collect();
        ClassStats {
            class,
            metrics: ClassMetrics::from_patches(&members, landscape_cells, cell_area),
            temp: summarize(&temps, sum_stats),
            patch_temp: summarize(&patch_means, sum_stats),
        }
    };

    PatchStats {
        hot: class_stats(PatchClass::Hot),
        cold: class_stats(PatchClass::Cold),
    }
}
