//! Whole-image and grouped statistics.
//!
//! [`get_stats`] runs the full analysis of one grid: pixel
//! statistics, hot/cold patch extraction with class metrics,
//! and thermal connectivity. [`stats_by_group`] does the same
//! for groups of images described by a metadata table.
use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Write},
    path::Path,
    str::FromStr,
};

use anyhow::{anyhow, bail, ensure, Context, Error, Result};
use log::{debug, info};
use rayon::prelude::*;
use serde_derive::*;

use crate::{
    connectivity::{connectivity, ConnectivitySummary, DEFAULT_CONN_THRESHOLD},
    grid::{Pixel, TemperatureGrid},
    io::MetadataRow,
    metrics::{patch_stats, PatchStats},
    patches::{get_patches, Patch, PatchOptions, PatchPixel},
    summary::{summarize, Statistic, Summary, MAX_ROUND_DIGITS},
};

/// Which parts of the analysis to return.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ReturnValues {
    /// Pixel frame with G, class and patch id.
    pub df: bool,
    /// Per-patch records.
    pub patches: bool,
    /// Pixel and class statistics.
    pub pstats: bool,
}

impl Default for ReturnValues {
    fn default() -> Self {
        ReturnValues {
            df: false,
            patches: false,
            pstats: true,
        }
    }
}

impl ReturnValues {
    pub fn any(&self) -> bool {
        self.df || self.patches || self.pstats
    }
}

impl FromStr for ReturnValues {
    type Err = Error;

    /// Comma separated list of `df`, `patches`, `pstats`.
    fn from_str(s: &str) -> Result<Self> {
        let mut vals = ReturnValues {
            df: false,
            patches: false,
            pstats: false,
        };
        for name in s.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match name {
                "df" => vals.df = true,
                "patches" => vals.patches = true,
                "pstats" => vals.pstats = true,
                _ => bail!("unknown return value: {}", name),
            }
        }
        Ok(vals)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StatsConfig {
    /// Statistics of the image's pixel temperatures.
    pub pixel_fns: Vec<Statistic>,
    /// Statistics used to summarise temperatures within patch
    /// classes, and values across images of a group.
    pub sum_stats: Vec<Statistic>,
    /// Extract hot and cold patches.
    pub patches: bool,
    pub patch_options: PatchOptions,
    pub calc_connectivity: bool,
    pub conn_threshold: f64,
    pub return_vals: ReturnValues,
    /// Decimals to round statistics to.
    pub round_val: Option<u32>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        use Statistic::*;
        StatsConfig {
            pixel_fns: vec![Mean, Max, Min, Median, Percentile(5.), Percentile(95.), Shdi],
            sum_stats: vec![Mean, Max, Min],
            patches: true,
            patch_options: PatchOptions::default(),
            calc_connectivity: false,
            conn_threshold: DEFAULT_CONN_THRESHOLD,
            return_vals: ReturnValues::default(),
            round_val: Some(2),
        }
    }
}

impl StatsConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.return_vals.any(), "no return values requested");
        ensure!(
            !self.pixel_fns.is_empty() || self.patches || self.calc_connectivity,
            "nothing to compute: no pixel statistics, patches or connectivity"
        );
        if let Some(digits) = self.round_val {
            ensure!(
                digits <= MAX_ROUND_DIGITS,
                "round_val must be at most {} decimals, got {}",
                MAX_ROUND_DIGITS,
                digits
            );
        }
        Ok(())
    }

    fn round(&self, summary: &mut Summary) {
        if let Some(digits) = self.round_val {
            summary.round(digits);
        }
    }
}

/// Pixel frame of an image, with patch data when patches were
/// extracted.
#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum PixelFrame {
    Plain(Vec<Pixel>),
    Patches(Vec<PatchPixel>),
}

impl PixelFrame {
    pub fn len(&self) -> usize {
        match self {
            PixelFrame::Plain(p) => p.len(),
            PixelFrame::Patches(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the frame as a CSV table with a header row.
    pub fn write_csv<W: Write>(&self, wtr: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(wtr);
        match self {
            PixelFrame::Plain(pixels) => pixels.iter().try_for_each(|p| writer.serialize(p))?,
            PixelFrame::Patches(pixels) => pixels.iter().try_for_each(|p| writer.serialize(p))?,
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Pstats {
    /// `img_<fn>` pixel statistics.
    pub img: Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<PatchStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connectivity: Option<ConnectivitySummary>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ImageStats {
    pub id: String,
    pub rows: usize,
    pub cols: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pstats: Option<Pstats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patches: Option<Vec<Patch>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub df: Option<PixelFrame>,
    #[serde(skip)]
    round_val: Option<u32>,
}

impl ImageStats {
    /// Flat record of the statistics: `img_*`, `hot_*`,
    /// `cold_*` and `connectivity_*` fields.
    pub fn flat(&self) -> Summary {
        let mut flat = Summary::default();
        if let Some(p) = &self.pstats {
            flat.extend(p.img.iter().map(|(n, v)| (n.to_string(), v)));
            if let Some(classes) = &p.classes {
                flat.extend(classes.summary().iter().map(|(n, v)| (n.to_string(), v)));
            }
            if let Some(c) = &p.connectivity {
                flat.extend_prefixed("connectivity", &connectivity_summary(c));
            }
        }
        if let Some(digits) = self.round_val {
            flat.round(digits);
        }
        flat
    }
}

fn connectivity_summary(c: &ConnectivitySummary) -> Summary {
    let mut s = Summary::default();
    s.push("prop_connected", c.prop_connected);
    s.push("mean_cooling", c.mean_cooling);
    s.push("max_cooling", c.max_cooling);
    s
}

pub fn get_stats(grid: &TemperatureGrid, id: &str, cfg: &StatsConfig) -> Result<ImageStats> {
    cfg.validate()?;
    let values = grid.valid_values();
    ensure!(!values.is_empty(), "{}: no valid temperatures", id);
    let (rows, cols) = grid.dim();
    debug!("{}: {}x{} grid, {} valid pixels", id, rows, cols, values.len());

    let patches = if cfg.patches {
        Some(get_patches(grid, &cfg.patch_options).with_context(|| format!("{}: extracting patches", id))?)
    } else {
        None
    };

    let pstats = if cfg.return_vals.pstats {
        let mut img = Summary::default();
        img.extend_prefixed("img", &summarize(&values, &cfg.pixel_fns));
        cfg.round(&mut img);
        let connectivity = if cfg.calc_connectivity {
            let conn = connectivity(grid, cfg.conn_threshold)
                .with_context(|| format!("{}: computing connectivity", id))?;
            Some(conn.summary)
        } else {
            None
        };
        Some(Pstats {
            img,
            classes: patches
                .as_ref()
                .map(|p| patch_stats(grid, p, &cfg.sum_stats)),
            connectivity,
        })
    } else {
        None
    };

    let df = cfg.return_vals.df.then(|| match &patches {
        Some(p) => PixelFrame::Patches(p.pixels(grid)),
        None => PixelFrame::Plain(grid.pixels()),
    });

    Ok(ImageStats {
        id: id.to_string(),
        rows,
        cols,
        pstats,
        df,
        patches: patches.filter(|_| cfg.return_vals.patches).map(|p| p.patches),
        round_val: cfg.round_val,
    })
}

/// Statistics of one group of images.
#[derive(Serialize, Debug, Clone)]
pub struct GroupStats {
    pub group: String,
    pub ids: Vec<String>,
    /// Pixel statistics of the pooled pixels (`img_*`), and each
    /// per-image patch and connectivity statistic summarised
    /// across the group's images (`<stat>_<fn>`).
    pub stats: Summary,
}

/// Summarise each named value across records.
fn summarize_across(records: &[Summary], stats: &[Statistic]) -> Summary {
    let mut out = Summary::default();
    let Some(first) = records.first() else {
        return out;
    };
    for (name, _) in first.iter() {
        let values: Vec<f64> = records
            .iter()
            .map(|r| r.get(name).unwrap_or(f64::NAN))
            .collect();
        out.extend_prefixed(name, &summarize(&values, stats));
    }
    out
}

fn column<'a>(row: &'a MetadataRow, var: &str, line: usize) -> Result<&'a str> {
    row.get(var)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("metadata row {}: no `{}` column", line + 1, var))
}

/// Statistics of images grouped by a metadata column.
///
/// `metadata` rows are matched to `grids` through `id_var`, and
/// grouped by `group_var` in order of first appearance.
pub fn stats_by_group(
    metadata: &[MetadataRow],
    grids: &HashMap<String, TemperatureGrid>,
    id_var: &str,
    group_var: &str,
    cfg: &StatsConfig,
) -> Result<Vec<GroupStats>> {
    cfg.validate()?;
    ensure!(!metadata.is_empty(), "empty metadata");

    let mut groups: Vec<(String, Vec<String>)> = vec![];
    for (line, row) in metadata.iter().enumerate() {
        let id = column(row, id_var, line)?;
        let group = column(row, group_var, line)?;
        ensure!(grids.contains_key(id), "no temperature data for `{}`", id);
        match groups.iter_mut().find(|(g, _)| g == group) {
            Some((_, ids)) => ids.push(id.to_string()),
            None => groups.push((group.to_string(), vec![id.to_string()])),
        }
    }
    info!("{} images in {} groups", metadata.len(), groups.len());

    // pixel statistics are pooled, everything else goes per image
    let image_cfg = StatsConfig {
        pixel_fns: vec![],
        round_val: None,
        return_vals: ReturnValues::default(),
        ..cfg.clone()
    };

    groups
        .into_par_iter()
        .map(|(group, ids)| -> Result<GroupStats> {
            let pooled: Vec<f64> = ids
                .iter()
                .flat_map(|id| grids[id].valid_values())
                .collect();
            ensure!(!pooled.is_empty(), "group `{}`: no valid temperatures", group);

            let mut stats = Summary::default();
            stats.extend_prefixed("img", &summarize(&pooled, &cfg.pixel_fns));

            if cfg.patches || cfg.calc_connectivity {
                let per_image = ids
                    .iter()
                    .map(|id| Ok(get_stats(&grids[id], id, &image_cfg)?.flat()))
                    .collect::<Result<Vec<_>>>()
                    .with_context(|| format!("group `{}`", group))?;
                stats.extend(summarize_across(&per_image, &cfg.sum_stats).iter().map(|(n, v)| (n.to_string(), v)));
            }
            cfg.round(&mut stats);
            Ok(GroupStats { group, ids, stats })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patches::tests::two_spot_grid;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn row(id: &str, group: &str) -> MetadataRow {
        [("photo_no", id), ("species", group)]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_return_values() -> Result<()> {
        let vals: ReturnValues = "df, pstats".parse()?;
        assert!(vals.df && vals.pstats && !vals.patches);
        assert!("plots".parse::<ReturnValues>().is_err());
        assert!(!"".parse::<ReturnValues>()?.any());
        Ok(())
    }

    #[test]
    fn partial_config_keeps_defaults() -> Result<()> {
        let cfg: StatsConfig = serde_json::from_str(
            r#"{"pixel_fns": ["mean", "perc_95"], "patch_options": {"neighbours": "queen"}}"#,
        )?;
        assert_eq!(cfg.pixel_fns, vec![Statistic::Mean, Statistic::Percentile(95.)]);
        assert_eq!(cfg.sum_stats, StatsConfig::default().sum_stats);
        assert_eq!(cfg.patch_options.threshold, 1.96);
        assert!(cfg.patches);
        Ok(())
    }

    #[test]
    fn image_stats_with_patches() -> Result<()> {
        let grid = two_spot_grid();
        let cfg = StatsConfig {
            return_vals: "df,patches,pstats".parse()?,
            calc_connectivity: true,
            ..StatsConfig::default()
        };
        let stats = get_stats(&grid, "IR_01", &cfg)?;
        assert_eq!(stats.patches.as_ref().map(Vec::len), Some(2));
        assert_eq!(stats.df.as_ref().map(PixelFrame::len), Some(144));

        let flat = stats.flat();
        assert_relative_eq!(flat.get("img_max").unwrap(), 40.);
        assert_relative_eq!(flat.get("img_min").unwrap(), 10.);
        assert_eq!(flat.get("hot_n_patches"), Some(1.));
        assert_eq!(flat.get("cold_n_patches"), Some(1.));
        assert!(flat.get("connectivity_prop_connected").is_some());
        // img stats come first
        assert_eq!(flat.iter().next().map(|(n, _)| n), Some("img_mean"));
        Ok(())
    }

    #[test]
    fn pixel_stats_only() -> Result<()> {
        let grid = TemperatureGrid::new(Array2::from_shape_fn((2, 3), |(r, c)| (r * 3 + c) as f64));
        let cfg = StatsConfig {
            pixel_fns: vec![Statistic::Mean, Statistic::Sd],
            patches: false,
            round_val: Some(3),
            return_vals: "df,pstats".parse()?,
            ..StatsConfig::default()
        };
        let stats = get_stats(&grid, "plain", &cfg)?;
        let flat = stats.flat();
        assert_eq!(flat.len(), 2);
        assert_relative_eq!(flat.get("img_mean").unwrap(), 2.5);
        assert_relative_eq!(flat.get("img_sd").unwrap(), 1.871);
        assert!(stats.patches.is_none());

        let mut out = vec![];
        stats.df.as_ref().unwrap().write_csv(&mut out)?;
        let out = String::from_utf8(out)?;
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "row,col,x,y,temp");
        assert_eq!(lines.len(), 7);
        Ok(())
    }

    #[test]
    fn rejects_empty_requests() {
        let grid = two_spot_grid();
        let cfg = StatsConfig {
            return_vals: "".parse().unwrap(),
            ..StatsConfig::default()
        };
        assert!(get_stats(&grid, "x", &cfg).is_err());

        let missing = TemperatureGrid::new(Array2::from_elem((3, 3), f64::NAN));
        assert!(get_stats(&missing, "x", &StatsConfig::default()).is_err());
    }

    #[test]
    fn rejects_too_many_decimals() -> Result<()> {
        let cfg: StatsConfig = serde_json::from_str(r#"{"round_val": 400}"#)?;
        assert!(cfg.validate().is_err());
        assert!(get_stats(&two_spot_grid(), "x", &cfg).is_err());

        let cfg: StatsConfig = serde_json::from_str(r#"{"round_val": 15}"#)?;
        cfg.validate()?;
        Ok(())
    }

    #[test]
    fn groups_pool_pixels_and_summarise_patches() -> Result<()> {
        let mut grids = HashMap::new();
        grids.insert("a".to_string(), two_spot_grid());
        grids.insert("b".to_string(), two_spot_grid());
        let mut flat = two_spot_grid();
        flat.values.fill(30.);
        flat.values[(0, 0)] = 31.;
        grids.insert("c".to_string(), flat);

        let metadata = vec![row("a", "frog"), row("c", "toad"), row("b", "frog")];
        let cfg = StatsConfig {
            pixel_fns: vec![Statistic::Max, Statistic::Count],
            sum_stats: vec![Statistic::Mean],
            ..StatsConfig::default()
        };
        let groups = stats_by_group(&metadata, &grids, "photo_no", "species", &cfg)?;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].group, "frog");
        assert_eq!(groups[0].ids, ["a", "b"]);
        assert_eq!(groups[1].group, "toad");

        let frog = &groups[0].stats;
        assert_relative_eq!(frog.get("img_max").unwrap(), 40.);
        assert_relative_eq!(frog.get("img_count").unwrap(), 288.);
        assert_relative_eq!(frog.get("hot_n_patches_mean").unwrap(), 1.);
        Ok(())
    }

    #[test]
    fn group_errors() {
        let mut grids = HashMap::new();
        grids.insert("a".to_string(), two_spot_grid());
        let cfg = StatsConfig::default();

        let unknown = vec![row("zz", "frog")];
        assert!(stats_by_group(&unknown, &grids, "photo_no", "species", &cfg).is_err());
        let ok = vec![row("a", "frog")];
        assert!(stats_by_group(&ok, &grids, "id", "species", &cfg).is_err());
        assert!(stats_by_group(&ok, &grids, "photo_no", "site", &cfg).is_err());
    }
}
