//! Neighbour graphs and spatial weights over the valid cells
//! of a grid.
//!
//! Cells holding missing values take no part in the graph: they
//! have no neighbours and are never anyone's neighbour. Graphs
//! are stored as adjacency lists indexed by the position of a
//! cell in [`Neighbours::cells`] (row-major order of the valid
//! cells).
use std::{fmt, str::FromStr};

use anyhow::{anyhow, bail, ensure, Error, Result};
use log::debug;
use ndarray::Array2;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::grid::TemperatureGrid;

/// How neighbours of a cell are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighbourRule {
    /// The 8 surrounding cells.
    Queen,
    /// The 4 edge-sharing cells.
    Rook,
    /// The `k` nearest cells by centre distance.
    KNearest(usize),
}

impl Default for NeighbourRule {
    fn default() -> Self {
        NeighbourRule::KNearest(8)
    }
}

impl FromStr for NeighbourRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        Ok(match name.as_str() {
            "queen" => NeighbourRule::Queen,
            "rook" => NeighbourRule::Rook,
            "knn" => NeighbourRule::default(),
            _ => {
                let k = name
                    .strip_prefix("knn")
                    .map(|k| k.trim_start_matches(':'))
                    .ok_or_else(|| anyhow!("unknown neighbour rule: {}", s))?;
                let k: usize = k
                    .parse()
                    .map_err(|_| anyhow!("invalid neighbour count in `{}`", s))?;
                NeighbourRule::KNearest(k)
            }
        })
    }
}

impl fmt::Display for NeighbourRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NeighbourRule::Queen => f.write_str("queen"),
            NeighbourRule::Rook => f.write_str("rook"),
            NeighbourRule::KNearest(k) => write!(f, "knn:{}", k),
        }
    }
}

/// Weight coding of a neighbour graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde_derive::Serialize, serde_derive::Deserialize)]
pub enum WeightStyle {
    /// Binary: every link has weight 1.
    B,
    /// Row standardised: weights of a cell sum to 1.
    W,
    /// Globally standardised: all weights sum to the number of cells.
    C,
    /// Globally standardised: all weights sum to 1.
    U,
}

impl Default for WeightStyle {
    fn default() -> Self {
        WeightStyle::C
    }
}

impl FromStr for WeightStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "B" | "b" => WeightStyle::B,
            "W" | "w" => WeightStyle::W,
            "C" | "c" => WeightStyle::C,
            "U" | "u" => WeightStyle::U,
            _ => bail!("unknown weight style: {} (expected B, W, C or U)", s),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Neighbours {
    cells: Vec<(usize, usize)>,
    links: Vec<Vec<usize>>,
}

impl Neighbours {
    pub fn from_grid(grid: &TemperatureGrid, rule: NeighbourRule, include_self: bool) -> Result<Self> {
        let (rows, cols) = grid.dim();
        let mut index: Array2<Option<usize>> = Array2::from_elem((rows, cols), None);
        let mut cells = Vec::with_capacity(grid.n_valid());
        for ((row, col), v) in grid.values.indexed_iter() {
            if !v.is_nan() {
                index[(row, col)] = Some(cells.len());
                cells.push((row, col));
            }
        }

        let mut links: Vec<Vec<usize>> = match rule {
            NeighbourRule::Queen => contiguity(&cells, &index, true),
            NeighbourRule::Rook => contiguity(&cells, &index, false),
            NeighbourRule::KNearest(k) => {
                ensure!(k >= 1, "number of nearest neighbours must be at least 1");
                ensure!(
                    k < cells.len(),
                    "cannot find {} nearest neighbours among {} valid cells",
                    k,
                    cells.len()
                );
                k_nearest(&cells, &index, grid.cell_size(), k)
            }
        };

        if include_self {
            for (i, l) in links.iter_mut().enumerate() {
                l.insert(0, i);
            }
        }

        debug!(
            "{} neighbours: {} cells, {} links",
            rule,
            cells.len(),
            links.iter().map(Vec::len).sum::<usize>()
        );
        Ok(Neighbours { cells, links })
    }

    /// Grid position of every node, row-major.
    #[inline]
    pub fn cells(&self) -> &[(usize, usize)] {
        &self.cells
    }

    #[inline]
    pub fn neighbours(&self, i: usize) -> &[usize] {
        &self.links[i]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn n_links(&self) -> usize {
        self.links.iter().map(Vec::len).sum()
    }
}

fn contiguity(cells: &[(usize, usize)], index: &Array2<Option<usize>>, queen: bool) -> Vec<Vec<usize>> {
    let (rows, cols) = index.dim();
    cells
        .iter()
        .map(|&(row, col)| {
            let mut out = Vec::with_capacity(8);
            for dr in -1isize..=1 {
                for dc in -1isize..=1 {
                    if (dr == 0 && dc == 0) || (!queen && dr != 0 && dc != 0) {
                        continue;
                    }
                    if let Some(j) = offset(row, col, dr, dc, rows, cols).and_then(|p| index[p]) {
                        out.push(j);
                    }
                }
            }
            out
        })
        .collect()
}

fn k_nearest(
    cells: &[(usize, usize)],
    index: &Array2<Option<usize>>,
    (dx, dy): (f64, f64),
    k: usize,
) -> Vec<Vec<usize>> {
    let (rows, cols) = index.dim();
    let max_radius = rows.max(cols) as isize;
    let step = dx.min(dy);

    cells
        .iter()
        .map(|&(row, col)| {
            // (distance, row, col, node)
            let mut found: Vec<(f64, usize, usize, usize)> = vec![];
            for r in 1..=max_radius {
                for dr in -r..=r {
                    for dc in -r..=r {
                        if dr.abs() != r && dc.abs() != r {
                            continue;
                        }
                        if let Some((nr, nc)) = offset(row, col, dr, dc, rows, cols) {
                            if let Some(j) = index[(nr, nc)] {
                                let d = ((dr as f64 * dy).powi(2) + (dc as f64 * dx).powi(2)).sqrt();
                                found.push((d, nr, nc, j));
                            }
                        }
                    }
                }
                if found.len() >= k {
                    found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
                    // Cells beyond this ring are at least (r + 1) steps away.
                    if found[k - 1].0 <= r as f64 * step {
                        break;
                    }
                }
            }
            found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
            found.into_iter().take(k).map(|f| f.3).collect()
        })
        .collect()
}

#[inline]
fn offset(row: usize, col: usize, dr: isize, dc: isize, rows: usize, cols: usize) -> Option<(usize, usize)> {
    let r = row as isize + dr;
    let c = col as isize + dc;
    if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
        None
    } else {
        Some((r as usize, c as usize))
    }
}

/// Weighted neighbour lists.
#[derive(Debug, Clone)]
pub struct SpatialWeights {
    style: WeightStyle,
    weights: Vec<Vec<(usize, f64)>>,
}

impl SpatialWeights {
    pub fn new(nb: &Neighbours, style: WeightStyle) -> Self {
        let n = nb.len() as f64;
        let s0 = nb.n_links() as f64;
        let weights = nb
            .links
            .iter()
            .map(|l| {
                let w = match style {
                    WeightStyle::B => 1.,
                    WeightStyle::W => 1. / l.len() as f64,
                    WeightStyle::C => n / s0,
                    WeightStyle::U => 1. / s0,
                };
                l.iter().map(|&j| (j, w)).collect()
            })
            .collect();
        SpatialWeights { style, weights }
    }

    #[inline]
    pub fn style(&self) -> WeightStyle {
        self.style
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[(usize, f64)] {
        &self.weights[i]
    }

    /// Spatially lagged values `Σ_j w_ij x_j`.
    pub fn lag(&self, x: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .map(|row| row.iter().map(|&(j, w)| w * x[j]).sum())
            .collect()
    }

    /// `W_i = Σ_j w_ij`.
    pub fn row_sums(&self) -> Vec<f64> {
        self.weights
            .iter()
            .map(|row| row.iter().map(|&(_, w)| w).sum())
            .collect()
    }

    /// `S1_i = Σ_j w_ij²`.
    pub fn row_square_sums(&self) -> Vec<f64> {
        self.weights
            .iter()
            .map(|row| row.iter().map(|&(_, w)| w * w).sum())
            .collect()
    }
}

impl Serialize for NeighbourRule {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NeighbourRule {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        String::deserialize(de)?.parse().map_err(de::Error::custom)
    }
}
