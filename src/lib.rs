//! Descriptive and spatial statistics of temperature grids.
//!
//! The crate summarises thermal heterogeneity of thermal
//! camera images and gridded climate data:
//!
//! 1. Pixel statistics selected by name ([`Statistic`]):
//! moments, percentiles, and Shannon / Simpson diversity of
//! binned temperatures.
//!
//! 2. Hot and cold spots. Every pixel gets a local Getis-Ord G
//! z-score from a [neighbour graph](neighbours); pixels beyond
//! the threshold are hot or cold, and connected runs of them
//! form [patches] described by FRAGSTATS-style [metrics].
//!
//! 3. Thermal [connectivity]: how far each pixel can cool down
//! without crossing warmer ground.
//!
//! [`get_stats`] runs all of it on one grid and
//! [`stats_by_group`] on groups of grids listed in a metadata
//! table.
//!
//! # Usage
//!
//! ```rust
//! # fn test_compile() -> anyhow::Result<()> {
//! use std::path::Path;
//! use thermstats::{get_stats, io::read_grid, StatsConfig};
//!
//! let grid = read_grid(Path::new("frog.csv"))?;
//! let stats = get_stats(&grid, "frog", &StatsConfig::default())?;
//! println!("{}", serde_json::to_string(&stats.flat())?);
//! # Ok(())
//! # }
//! ```
//!
//! Thermal images are read from ExifTool's JSON output
//! (`exiftool -b -j image.jpg`): the raw sensor values are
//! converted to [temperature] with the calibration constants
//! stored alongside, following the [Thermimage R library].
//!
//! [Thermimage R library]: //github.com/gtatters/Thermimage/blob/master/R/raw2temp.R

pub mod grid;
pub mod stats;
pub mod summary;

pub mod local_g;
pub mod neighbours;

pub mod connectivity;
pub mod metrics;
pub mod patches;

pub mod analysis;

pub mod exiftool;
pub mod io;
pub mod temperature;

#[cfg(feature = "cli")]
pub mod cli;

pub use crate::analysis::{get_stats, stats_by_group, ImageStats, StatsConfig};
pub use crate::grid::TemperatureGrid;
pub use crate::summary::{Statistic, Summary};
