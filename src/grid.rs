//! Gridded temperature values and their "data frame" view.
//!
//! A [`TemperatureGrid`] is a row-major matrix of temperatures
//! (thermal image pixels, or raster climate cells). Missing
//! values are stored as `NaN`. An optional [`Extent`] places
//! the grid in map coordinates; without one the grid lives in
//! pixel space with unit cells.
use anyhow::{ensure, Result};
use ndarray::Array2;
use serde_derive::*;

/// Bounding box of a grid in map units.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Result<Self> {
        ensure!(
            [xmin, xmax, ymin, ymax].iter().all(|v| v.is_finite()),
            "extent must be finite"
        );
        ensure!(
            xmax > xmin && ymax > ymin,
            "extent is empty: x {}..{}, y {}..{}",
            xmin,
            xmax,
            ymin,
            ymax
        );
        Ok(Extent {
            xmin,
            xmax,
            ymin,
            ymax,
        })
    }

    /// Pixel-space extent of a `rows x cols` grid.
    pub fn unit(rows: usize, cols: usize) -> Self {
        Extent {
            xmin: 0.,
            xmax: cols as f64,
            ymin: 0.,
            ymax: rows as f64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemperatureGrid {
    pub values: Array2<f64>,
    pub extent: Option<Extent>,
    pub projection: Option<String>,
}

/// One row of the pixel frame.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    pub row: usize,
    pub col: usize,
    pub x: f64,
    pub y: f64,
    pub temp: f64,
}

impl TemperatureGrid {
    pub fn new(values: Array2<f64>) -> Self {
        TemperatureGrid {
            values,
            extent: None,
            projection: None,
        }
    }

    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }

    pub fn with_projection<S: Into<String>>(mut self, projection: S) -> Self {
        self.projection = Some(projection.into());
        self
    }

    #[inline]
    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn extent(&self) -> Extent {
        let (rows, cols) = self.dim();
        self.extent.unwrap_or_else(|| Extent::unit(rows, cols))
    }

    /// Cell width and height in map units.
    pub fn cell_size(&self) -> (f64, f64) {
        let (rows, cols) = self.dim();
        match self.extent {
            Some(e) if rows > 0 && cols > 0 => (
                (e.xmax - e.xmin) / cols as f64,
                (e.ymax - e.ymin) / rows as f64,
            ),
            _ => (1., 1.),
        }
    }

    #[inline]
    pub fn cell_area(&self) -> f64 {
        let (dx, dy) = self.cell_size();
        dx * dy
    }

    /// Map coordinates of the centre of a cell.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let e = self.extent();
        let (dx, dy) = self.cell_size();
        (
            e.xmin + (col as f64 + 0.5) * dx,
            e.ymax - (row as f64 + 0.5) * dy,
        )
    }

    #[inline]
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        !self.values[(row, col)].is_nan()
    }

    pub fn n_valid(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }

    /// Non-missing values in row-major order.
    pub fn valid_values(&self) -> Vec<f64> {
        self.values.iter().copied().filter(|v| !v.is_nan()).collect()
    }

    /// Reshape the matrix into one record per cell, missing
    /// cells included.
    pub fn pixels(&self) -> Vec<Pixel> {
        self.values
            .indexed_iter()
            .map(|((row, col), &temp)| {
                let (x, y) = self.cell_center(row, col);
                Pixel {
                    row,
                    col,
                    x,
                    y,
                    temp,
                }
            })
            .collect()
    }
}

impl From<Array2<f64>> for TemperatureGrid {
    fn from(values: Array2<f64>) -> Self {
        TemperatureGrid::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn pixel_space_defaults() {
        let grid = TemperatureGrid::new(array![[1., 2., 3.], [4., f64::NAN, 6.]]);
        assert_eq!(grid.cell_size(), (1., 1.));
        assert_eq!(grid.n_valid(), 5);
        assert_eq!(grid.valid_values(), vec![1., 2., 3., 4., 6.]);

        let pixels = grid.pixels();
        assert_eq!(pixels.len(), 6);
        assert_eq!(pixels[0].x, 0.5);
        assert_eq!(pixels[0].y, 1.5);
        assert!(pixels[4].temp.is_nan());
    }

    #[test]
    fn extent_scales_cells() -> Result<()> {
        let grid = TemperatureGrid::new(Array2::zeros((2, 4)))
            .with_extent(Extent::new(100., 140., 0., 10.)?);
        assert_eq!(grid.cell_size(), (10., 5.));
        assert_relative_eq!(grid.cell_area(), 50.);
        assert_eq!(grid.cell_center(1, 3), (135., 2.5));
        Ok(())
    }

    #[test]
    fn rejects_empty_extent() {
        assert!(Extent::new(1., 1., 0., 1.).is_err());
        assert!(Extent::new(0., f64::INFINITY, 0., 1.).is_err());
    }
}
