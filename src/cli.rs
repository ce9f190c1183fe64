//! Helpers to parse CLI arguments and load inputs in the
//! accompanying binaries.
//!
//! APIs here shouldn't be considered stable / used as a
//! library.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{value_t_or_exit, ArgMatches};
pub use clap::{App, Arg};
use indicatif::{ProgressBar, ProgressStyle};
pub use inflector::Inflector;
use log::warn;
use rayon::iter::{once, Either, IntoParallelIterator, ParallelIterator};

use crate::{
    analysis::{ReturnValues, StatsConfig},
    exiftool::ExifToolRecord,
    grid::TemperatureGrid,
    io::read_grid,
    neighbours::{NeighbourRule, WeightStyle},
    patches::PatchConnectivity,
    summary::Statistic,
};

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

/// Add the analysis option flags read by
/// [`stats_config_from_matches`] to an `App`.
#[macro_export]
macro_rules! stats_config_args {
    ($app:expr) => {{
        $app.arg(
            $crate::opt!("config")
                .short("c")
                .help("JSON file with analysis options; flags below override it"),
        )
        .arg(
            $crate::opt!("pixel fns")
                .short("p")
                .help("Comma separated pixel statistics (e.g. mean,perc_95,SHDI)"),
        )
        .arg($crate::opt!("sum stats").help("Comma separated statistics summarising patch classes"))
        .arg(
            $crate::opt!("threshold")
                .short("t")
                .help("G z-score for hot/cold pixels.  Default is 1.96"),
        )
        .arg($crate::opt!("style").help("Spatial weights style: B, W, C or U.  Default is C"))
        .arg(
            $crate::opt!("neighbours")
                .short("n")
                .help("Neighbour rule: queen, rook or knn:K.  Default is knn:8"),
        )
        .arg(
            $crate::opt!("include self")
                .takes_value(false)
                .help("Use Gi* (include each pixel in its neighbourhood)"),
        )
        .arg($crate::opt!("patch connectivity").help("Patch connectivity: 4 or 8.  Default is 8"))
        .arg(
            $crate::opt!("connectivity")
                .takes_value(false)
                .help("Compute thermal connectivity"),
        )
        .arg($crate::opt!("conn threshold").help("Cooling (in degrees) of a connected pixel.  Default is 1.5"))
        .arg(
            $crate::opt!("no patches")
                .takes_value(false)
                .help("Skip hot/cold patch extraction"),
        )
        .arg($crate::opt!("return vals").help("Comma separated outputs: df, patches, pstats"))
        .arg($crate::opt!("round val").help("Decimals to round statistics to"))
    }};
}

/// Analysis options from the config file and the flags added
/// by [`stats_config_args!`].
pub fn stats_config_from_matches(matches: &ArgMatches) -> Result<StatsConfig> {
    let mut config = match matches.value_of("config") {
        Some(path) => StatsConfig::from_path(Path::new(path))?,
        None => StatsConfig::default(),
    };
    if let Some(list) = matches.value_of("pixel fns") {
        config.pixel_fns = Statistic::parse_list(list)?;
    }
    if let Some(list) = matches.value_of("sum stats") {
        config.sum_stats = Statistic::parse_list(list)?;
    }
    if matches.is_present("threshold") {
        config.patch_options.threshold = value_t_or_exit!(matches, "threshold", f64);
    }
    if matches.is_present("style") {
        config.patch_options.style = value_t_or_exit!(matches, "style", WeightStyle);
    }
    if matches.is_present("neighbours") {
        config.patch_options.neighbours = value_t_or_exit!(matches, "neighbours", NeighbourRule);
    }
    if matches.is_present("include self") {
        config.patch_options.include_self = true;
    }
    if matches.is_present("patch connectivity") {
        config.patch_options.connectivity = match value_t_or_exit!(matches, "patch connectivity", u8) {
            4 => PatchConnectivity::Four,
            8 => PatchConnectivity::Eight,
            n => bail!("patch connectivity must be 4 or 8, got {}", n),
        };
    }
    if matches.is_present("connectivity") {
        config.calc_connectivity = true;
    }
    if matches.is_present("conn threshold") {
        config.calc_connectivity = true;
        config.conn_threshold = value_t_or_exit!(matches, "conn threshold", f64);
    }
    if matches.is_present("no patches") {
        config.patches = false;
    }
    if matches.is_present("return vals") {
        config.return_vals = value_t_or_exit!(matches, "return vals", ReturnValues);
    }
    if matches.is_present("round val") {
        config.round_val = Some(value_t_or_exit!(matches, "round val", u32));
    }
    Ok(config)
}

/// Expand glob patterns among `paths`. Paths without pattern
/// characters are kept as given; a pattern matching nothing is
/// an error.
pub fn expand_paths(paths: Vec<String>) -> Result<Vec<String>> {
    let mut expanded = vec![];
    for p in paths {
        if !p.contains(|c: char| matches!(c, '*' | '?' | '[')) {
            expanded.push(p);
            continue;
        }
        let before = expanded.len();
        for entry in glob::glob(&p).with_context(|| format!("invalid pattern `{}`", p))? {
            expanded.push(entry?.display().to_string());
        }
        if expanded.len() == before {
            bail!("no files match `{}`", p);
        }
    }
    Ok(expanded)
}

pub struct GridInput {
    pub id: String,
    pub grid: TemperatureGrid,
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn is_json(path: &str) -> bool {
    Path::new(path)
        .extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("json"))
}

impl GridInput {
    fn try_from_path(path: &str) -> Result<Self> {
        Ok(GridInput {
            id: file_stem(path),
            grid: read_grid(Path::new(path))?,
        })
    }

    /// One input per image of an ExifTool JSON file.
    fn try_from_exiftool_json(path: &str, distance: Option<f64>) -> Result<Vec<Result<Self>>> {
        let records = ExifToolRecord::from_path(Path::new(path))?;
        let n = records.len();
        if n == 0 {
            warn!("{}: no images", path);
        }
        Ok(records
            .into_iter()
            .enumerate()
            .map(|(i, rec)| {
                let id = rec.id().unwrap_or_else(|| match n {
                    1 => file_stem(path),
                    _ => format!("{}_{}", file_stem(path), i + 1),
                });
                let grid = rec
                    .to_grid(distance)
                    .with_context(|| format!("converting {}", id))?;
                Ok(GridInput { id, grid })
            })
            .collect())
    }
}

/// Load grids from CSV, TIFF or ExifTool JSON paths in
/// parallel, with a progress bar. `distance` overrides the
/// object distance of ExifTool inputs.
pub fn load_inputs_par(
    paths: Vec<String>,
    distance: Option<f64>,
) -> impl IntoParallelIterator<Item = Result<GridInput>> {
    let bar = ProgressBar::new(paths.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}"),
    );
    let bar_dup = bar.clone();

    paths
        .into_par_iter()
        .map(move |p| {
            if is_json(&p) {
                match GridInput::try_from_exiftool_json(&p, distance) {
                    Ok(vec) => {
                        if vec.len() > 1 {
                            bar.inc_length(vec.len() as u64 - 1);
                        }
                        Either::Left(vec.into_par_iter())
                    }
                    Err(e) => Either::Right(once(Err(e))),
                }
            } else {
                Either::Right(once(GridInput::try_from_path(&p)))
            }
        })
        .flatten()
        .inspect(move |_| bar_dup.inc(1))
}

/// Collect inputs, failing on the first error.
pub fn load_inputs(paths: Vec<String>, distance: Option<f64>) -> Result<Vec<GridInput>> {
    load_inputs_par(paths, distance).into_par_iter().collect()
}
