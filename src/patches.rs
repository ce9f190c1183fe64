//! Hot and cold spot detection and patch extraction.
//!
//! Pixels are classified with the local G statistic: a z-score
//! at or above the threshold makes a pixel *hot*, at or below
//! its negation *cold*. Connected hot pixels form hot patches,
//! connected cold pixels cold patches. Labelling is delegated to
//! [`imageproc`]'s connected-component labelling.
use std::{collections::HashMap, fmt};

use anyhow::{ensure, Result};
use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use log::{debug, info};
use ndarray::Array2;
use serde_derive::*;

use crate::{
    grid::TemperatureGrid,
    local_g::local_g,
    neighbours::{NeighbourRule, Neighbours, SpatialWeights, WeightStyle},
    stats::Stats,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PatchClass {
    Hot,
    Cold,
    Neutral,
}

impl PatchClass {
    /// Class of a G z-score. `NaN` is neutral.
    pub fn classify(z: f64, threshold: f64) -> Self {
        if z >= threshold {
            PatchClass::Hot
        } else if z <= -threshold {
            PatchClass::Cold
        } else {
            PatchClass::Neutral
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PatchClass::Hot => "hot",
            PatchClass::Cold => "cold",
            PatchClass::Neutral => "neutral",
        }
    }
}

impl fmt::Display for PatchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatchConnectivity {
    Four,
    Eight,
}

impl From<PatchConnectivity> for Connectivity {
    fn from(c: PatchConnectivity) -> Self {
        match c {
            PatchConnectivity::Four => Connectivity::Four,
            PatchConnectivity::Eight => Connectivity::Eight,
        }
    }
}

/// Two-sided 5% critical value of the standard normal.
pub const DEFAULT_THRESHOLD: f64 = 1.96;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PatchOptions {
    pub neighbours: NeighbourRule,
    pub style: WeightStyle,
    /// Compute `G_i*` rather than `G_i`.
    pub include_self: bool,
    pub threshold: f64,
    pub connectivity: PatchConnectivity,
}

impl Default for PatchOptions {
    fn default() -> Self {
        PatchOptions {
            neighbours: NeighbourRule::default(),
            style: WeightStyle::default(),
            include_self: false,
            threshold: DEFAULT_THRESHOLD,
            connectivity: PatchConnectivity::Eight,
        }
    }
}

/// A connected group of hot or cold pixels.
#[derive(Serialize, Debug, Clone)]
pub struct Patch {
    pub id: u32,
    pub class: PatchClass,
    pub n_cells: usize,
    pub area: f64,
    /// Number of cell sides on the patch boundary.
    pub edges: usize,
    /// Boundary length in map units.
    pub perimeter: f64,
    pub shape_index: f64,
    pub frac_dim: f64,
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub mean_temp: f64,
    pub min_temp: f64,
    pub max_temp: f64,
}

/// One pixel with its G score, class and patch membership.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct PatchPixel {
    pub row: usize,
    pub col: usize,
    pub x: f64,
    pub y: f64,
    pub temp: f64,
    pub g: f64,
    pub class: PatchClass,
    pub patch_id: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Patches {
    /// G z-scores, `NaN` for missing pixels.
    pub g: Array2<f64>,
    pub class: Array2<PatchClass>,
    /// Patch ids, `0` outside patches.
    pub labels: Array2<u32>,
    pub patches: Vec<Patch>,
}

impl Patches {
    pub fn of_class(&self, class: PatchClass) -> impl Iterator<Item = &Patch> {
        self.patches.iter().filter(move |p| p.class == class)
    }

    pub fn class_count(&self, class: PatchClass) -> usize {
        self.class.iter().filter(|&&c| c == class).count()
    }

    /// Pixel frame of `grid` joined with the patch data.
    pub fn pixels(&self, grid: &TemperatureGrid) -> Vec<PatchPixel> {
        grid.pixels()
            .into_iter()
            .map(|p| {
                let idx = (p.row, p.col);
                let label = self.labels[idx];
                PatchPixel {
                    row: p.row,
                    col: p.col,
                    x: p.x,
                    y: p.y,
                    temp: p.temp,
                    g: self.g[idx],
                    class: self.class[idx],
                    patch_id: (label > 0).then(|| label),
                }
            })
            .collect()
    }
}

pub fn get_patches(grid: &TemperatureGrid, opts: &PatchOptions) -> Result<Patches> {
    ensure!(
        opts.threshold.is_finite() && opts.threshold > 0.,
        "hot/cold threshold must be positive, got {}",
        opts.threshold
    );
    let n_valid = grid.n_valid();
    ensure!(
        n_valid >= 3,
        "need at least 3 valid pixels to find patches, found {}",
        n_valid
    );

    let nb = Neighbours::from_grid(grid, opts.neighbours, opts.include_self)?;
    let weights = SpatialWeights::new(&nb, opts.style);
    let x: Vec<f64> = nb.cells().iter().map(|&idx| grid.values[idx]).collect();
    let z = local_g(&x, &weights, opts.include_self)?;

    let (rows, cols) = grid.dim();
    let mut g = Array2::from_elem((rows, cols), f64::NAN);
    let mut class = Array2::from_elem((rows, cols), PatchClass::Neutral);
    for (&idx, &z) in nb.cells().iter().zip(z.iter()) {
        g[idx] = z;
        class[idx] = PatchClass::classify(z, opts.threshold);
    }

    let mut labels = Array2::zeros((rows, cols));
    let mut next_id = 1u32;
    let mut classes = vec![];
    for target in [PatchClass::Hot, PatchClass::Cold] {
        let n = label_class(&class, target, opts.connectivity, next_id, &mut labels);
        debug!("{} {} patches", n, target);
        classes.extend(std::iter::repeat(target).take(n as usize));
        next_id += n;
    }

    let patches = describe_patches(grid, &labels, &classes);
    info!(
        "found {} hot and {} cold patches over {} pixels",
        patches.iter().filter(|p| p.class == PatchClass::Hot).count(),
        patches.iter().filter(|p| p.class == PatchClass::Cold).count(),
        n_valid
    );

    Ok(Patches {
        g,
        class,
        labels,
        patches,
    })
}

/// Label the connected regions of `target` pixels with ids
/// starting at `first_id`, in raster scan order. Returns the
/// number of regions.
fn label_class(
    class: &Array2<PatchClass>,
    target: PatchClass,
    connectivity: PatchConnectivity,
    first_id: u32,
    labels: &mut Array2<u32>,
) -> u32 {
    let (rows, cols) = class.dim();
    let mask = GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        Luma([if class[(y as usize, x as usize)] == target { 255 } else { 0 }])
    });
    let components = connected_components(&mask, connectivity.into(), Luma([0u8]));

    let mut ids: HashMap<u32, u32> = HashMap::new();
    for ((row, col), out) in labels.indexed_iter_mut() {
        let component = components.get_pixel(col as u32, row as u32).0[0];
        if component == 0 {
            continue;
        }
        let next = first_id + ids.len() as u32;
        *out = *ids.entry(component).or_insert(next);
    }
    ids.len() as u32
}

fn describe_patches(grid: &TemperatureGrid, labels: &Array2<u32>, classes: &[PatchClass]) -> Vec<Patch> {
    #[derive(Default)]
    struct Acc {
        n_cells: usize,
        h_edges: usize,
        v_edges: usize,
        sum_x: f64,
        sum_y: f64,
        temp: Stats,
    }

    let (rows, cols) = grid.dim();
    let (dx, dy) = grid.cell_size();
    let mut acc: Vec<Acc> = (0..classes.len()).map(|_| Acc::default()).collect();

    for ((row, col), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let a = &mut acc[label as usize - 1];
        let same = |r: isize, c: isize| {
            r >= 0 && c >= 0 && r < rows as isize && c < cols as isize && labels[(r as usize, c as usize)] == label
        };
        let (r, c) = (row as isize, col as isize);
        a.h_edges += [same(r - 1, c), same(r + 1, c)].iter().filter(|s| !**s).count();
        a.v_edges += [same(r, c - 1), same(r, c + 1)].iter().filter(|s| !**s).count();
        a.n_cells += 1;
        let (x, y) = grid.cell_center(row, col);
        a.sum_x += x;
        a.sum_y += y;
        a.temp += grid.values[(row, col)];
    }

    acc.into_iter()
        .zip(classes.iter())
        .enumerate()
        .map(|(i, (a, &class))| {
            let n = a.n_cells as f64;
            let edges = a.h_edges + a.v_edges;
            Patch {
                id: i as u32 + 1,
                class,
                n_cells: a.n_cells,
                area: n * dx * dy,
                edges,
                perimeter: a.h_edges as f64 * dx + a.v_edges as f64 * dy,
                shape_index: shape_index(edges, a.n_cells),
                frac_dim: fractal_dimension(edges, a.n_cells),
                centroid_x: a.sum_x / n,
                centroid_y: a.sum_y / n,
                mean_temp: a.temp.mean(),
                min_temp: a.temp.min(),
                max_temp: a.temp.max(),
            }
        })
        .collect()
}

/// `0.25 p / √a` in cell units; 1 for a square patch.
pub fn shape_index(edges: usize, n_cells: usize) -> f64 {
    0.25 * edges as f64 / (n_cells as f64).sqrt()
}

/// `2 ln(0.25 p) / ln(a)` in cell units; 1 for a single cell.
pub fn fractal_dimension(edges: usize, n_cells: usize) -> f64 {
    if n_cells <= 1 {
        return 1.;
    }
    2. * (0.25 * edges as f64).ln() / (n_cells as f64).ln()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Warm square in the top-left, cool square in the
    /// bottom-right, mild gradient elsewhere.
    pub(crate) fn two_spot_grid() -> TemperatureGrid {
        let mut values = Array2::from_shape_fn((12, 12), |(r, c)| 25. + 0.01 * (r + c) as f64);
        for r in 1..4 {
            for c in 1..4 {
                values[(r, c)] = 40.;
            }
        }
        for r in 8..11 {
            for c in 8..11 {
                values[(r, c)] = 10.;
            }
        }
        TemperatureGrid::new(values)
    }

    #[test]
    fn classifies_thresholds_inclusively() {
        assert_eq!(PatchClass::classify(1.96, 1.96), PatchClass::Hot);
        assert_eq!(PatchClass::classify(-1.96, 1.96), PatchClass::Cold);
        assert_eq!(PatchClass::classify(1.5, 1.96), PatchClass::Neutral);
        assert_eq!(PatchClass::classify(f64::NAN, 1.96), PatchClass::Neutral);
    }

    #[test]
    fn finds_one_hot_and_one_cold_patch() -> Result<()> {
        let grid = two_spot_grid();
        let patches = get_patches(&grid, &PatchOptions::default())?;

        let hot: Vec<_> = patches.of_class(PatchClass::Hot).collect();
        let cold: Vec<_> = patches.of_class(PatchClass::Cold).collect();
        assert_eq!(hot.len(), 1);
        assert_eq!(cold.len(), 1);
        // hot ids come first
        assert_eq!(hot[0].id, 1);
        assert_eq!(cold[0].id, 2);

        assert_eq!(patches.class[(2, 2)], PatchClass::Hot);
        assert_eq!(patches.class[(9, 9)], PatchClass::Cold);
        assert_eq!(patches.labels[(2, 2)], 1);
        assert!(hot[0].mean_temp > cold[0].mean_temp);
        assert!(patches.g[(2, 2)] > 1.96);
        Ok(())
    }

    #[test]
    fn pixel_frame_joins_patch_data() -> Result<()> {
        let mut grid = two_spot_grid();
        grid.values[(0, 11)] = f64::NAN;
        let patches = get_patches(&grid, &PatchOptions::default())?;
        let frame = patches.pixels(&grid);
        assert_eq!(frame.len(), 144);

        let missing = frame[11];
        assert!(missing.temp.is_nan() && missing.g.is_nan());
        assert_eq!(missing.class, PatchClass::Neutral);
        assert_eq!(missing.patch_id, None);

        let hot = frame[2 * 12 + 2];
        assert_eq!(hot.patch_id, Some(1));
        Ok(())
    }

    #[test]
    fn patch_geometry() {
        let grid = TemperatureGrid::new(Array2::from_elem((4, 4), 1.));
        let mut labels = Array2::zeros((4, 4));
        // 2x2 block and an L of three cells
        for idx in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            labels[idx] = 1;
        }
        for idx in [(3, 1), (3, 2), (2, 2)] {
            labels[idx] = 2;
        }
        let patches = describe_patches(&grid, &labels, &[PatchClass::Hot, PatchClass::Cold]);
        assert_eq!(patches[0].n_cells, 4);
        assert_eq!(patches[0].edges, 8);
        assert_relative_eq!(patches[0].shape_index, 1.);
        assert_relative_eq!(patches[0].centroid_x, 1.);
        assert_relative_eq!(patches[0].centroid_y, 3.);
        assert_eq!(patches[1].edges, 8);
        assert_relative_eq!(patches[1].frac_dim, 2. * 2f64.ln() / 3f64.ln());
    }

    #[test]
    fn diagonal_cells_depend_on_connectivity() -> Result<()> {
        let mut class = Array2::from_elem((3, 3), PatchClass::Neutral);
        class[(0, 0)] = PatchClass::Hot;
        class[(1, 1)] = PatchClass::Hot;

        let mut labels = Array2::zeros((3, 3));
        assert_eq!(label_class(&class, PatchClass::Hot, PatchConnectivity::Eight, 1, &mut labels), 1);
        let mut labels = Array2::zeros((3, 3));
        assert_eq!(label_class(&class, PatchClass::Hot, PatchConnectivity::Four, 5, &mut labels), 2);
        assert_eq!(labels[(0, 0)], 5);
        assert_eq!(labels[(1, 1)], 6);
        Ok(())
    }

    #[test]
    fn rejects_tiny_grids() {
        let grid = TemperatureGrid::new(Array2::from_elem((1, 2), 1.));
        assert!(get_patches(&grid, &PatchOptions::default()).is_err());
        let opts = PatchOptions {
            threshold: 0.,
            ..PatchOptions::default()
        };
        assert!(get_patches(&two_spot_grid(), &opts).is_err());
    }
}
