//! Thermal (climate) connectivity.
//!
//! From each pixel, an organism may move to neighbouring pixels
//! as long as it never passes through a pixel warmer than where
//! it started. The pixel's *cooling* is the largest temperature
//! drop it can reach that way; the pixel is connected when the
//! cooling is at least the threshold.
//!
//! Pixels are activated in order of increasing temperature and
//! merged with active 8-neighbours in a union-find that tracks
//! the coldest member of every component, so the whole surface
//! is solved in one sorted pass.
use anyhow::{ensure, Result};
use log::debug;
use ndarray::Array2;
use serde_derive::Serialize;

use crate::grid::TemperatureGrid;

/// Temperature drop (in °C) a pixel must reach to count as
/// connected.
pub const DEFAULT_CONN_THRESHOLD: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct Connectivity {
    /// Reachable cooling per pixel, `NaN` where missing.
    pub cooling: Array2<f64>,
    pub threshold: f64,
    pub summary: ConnectivitySummary,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ConnectivitySummary {
    /// Share of valid pixels that are connected.
    pub prop_connected: f64,
    pub mean_cooling: f64,
    pub max_cooling: f64,
}

struct UnionFind {
    parent: Vec<usize>,
    coldest: Vec<f64>,
}

impl UnionFind {
    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = i;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
            self.coldest[ra] = self.coldest[ra].min(self.coldest[rb]);
        }
    }
}

pub fn connectivity(grid: &TemperatureGrid, threshold: f64) -> Result<Connectivity> {
    ensure!(
        threshold.is_finite() && threshold >= 0.,
        "connectivity threshold must be non-negative, got {}",
        threshold
    );
    let (rows, cols) = grid.dim();
    let flat: Vec<f64> = grid.values.iter().copied().collect();
    ensure!(flat.iter().any(|v| !v.is_nan()), "no valid pixels");

    let mut order: Vec<usize> = (0..flat.len()).filter(|&i| !flat[i].is_nan()).collect();
    order.sort_by(|&a, &b| flat[a].total_cmp(&flat[b]));

    let mut uf = UnionFind {
        parent: (0..flat.len()).collect(),
        coldest: flat.clone(),
    };
    let mut active = vec![false; flat.len()];
    let mut cooling = Array2::from_elem((rows, cols), f64::NAN);

    let mut start = 0;
    while start < order.len() {
        let level = flat[order[start]];
        let end = start
            + order[start..]
                .iter()
                .take_while(|&&i| flat[i] == level)
                .count();

        for &i in &order[start..end] {
            active[i] = true;
            let (row, col) = (i / cols, i % cols);
            for dr in -1isize..=1 {
                for dc in -1isize..=1 {
                    let (r, c) = (row as isize + dr, col as isize + dc);
                    if (dr == 0 && dc == 0) || r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
                        continue;
                    }
                    let j = r as usize * cols + c as usize;
                    if active[j] {
                        uf.union(i, j);
                    }
                }
            }
        }
        for &i in &order[start..end] {
            let root = uf.find(i);
            cooling[(i / cols, i % cols)] = level - uf.coldest[root];
        }
        start = end;
    }

    let valid: Vec<f64> = cooling.iter().copied().filter(|v| !v.is_nan()).collect();
    let connected = valid.iter().filter(|&&c| c >= threshold).count();
    let summary = ConnectivitySummary {
        prop_connected: connected as f64 / valid.len() as f64,
        mean_cooling: crate::stats::mean(&valid),
        max_cooling: valid.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    };
    debug!(
        "connectivity: {}/{} pixels connected at {} degrees",
        connected,
        valid.len(),
        threshold
    );

    Ok(Connectivity {
        cooling,
        threshold,
        summary,
    })
}
