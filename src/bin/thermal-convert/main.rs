mod args;

use std::{fs, path::Path};

use anyhow::{Context, Result};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use itertools::Itertools;
use log::{debug, info};

use thermstats::{
    exiftool::ExifToolRecord,
    io::write_grid,
    temperature::batch_convert,
    TemperatureGrid,
};

use crate::args::Args;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::from_cmd_line()?;
    fs::create_dir_all(&args.output).with_context(|| format!("creating {}", args.output.display()))?;

    let bar = ProgressBar::new(args.paths.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}"),
    );

    use rayon::prelude::*;
    let count = args
        .paths
        .par_iter()
        .progress_with(bar)
        .map(|p| convert_file(p, &args))
        .try_fold(
            || 0usize,
            |acc, res| -> Result<_> { Ok(acc + res?) },
        )
        .try_reduce(|| 0, |a, b| Ok(a + b))?;

    info!("converted {} images", count);
    Ok(())
}

/// Convert every image of one ExifTool JSON file. Runs of
/// images with the same calibration are converted together.
fn convert_file(path: &Path, args: &Args) -> Result<usize> {
    let records = ExifToolRecord::from_path(path)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = records.len();

    let mut count = 0;
    let runs = records.into_iter().enumerate().group_by(|(_, rec)| {
        let settings = rec.settings.clone();
        match args.distance {
            Some(d) => settings.with_distance(d),
            None => settings,
        }
    });
    for (settings, run) in &runs {
        let run: Vec<_> = run.collect();
        let raws = run
            .iter()
            .map(|(_, rec)| rec.raw_image())
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("decoding {}", path.display()))?;
        debug!("{}: {} images share {:?}", path.display(), raws.len(), settings);

        for ((i, rec), temps) in run.iter().zip(batch_convert(&raws, &settings)) {
            let id = rec.id().unwrap_or_else(|| match n {
                1 => stem.clone(),
                _ => format!("{}_{}", stem, i + 1),
            });
            let ext = if args.tiff { "tif" } else { "csv" };
            let out = args.output.join(format!("{}.{}", id, ext));
            write_grid(&out, &TemperatureGrid::new(temps))?;
            count += 1;
        }
    }
    Ok(count)
}
