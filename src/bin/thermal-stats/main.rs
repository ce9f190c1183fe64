mod args;

use std::{
    fs::{self, File},
    io::BufWriter,
};

use anyhow::{Context, Result};
use args::Args;
use log::info;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde_derive::*;

use thermstats::{
    cli::{expand_paths, load_inputs_par},
    get_stats,
    io::write_flat_csv,
    stats::Stats,
    ImageStats,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Args {
        paths,
        config,
        distance,
        csv,
        df_dir,
    } = Args::from_cmd_line()?;

    if let Some(dir) = &df_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let (mut image_stats, cumulative) = load_inputs_par(expand_paths(paths)?, distance)
        .into_par_iter()
        .map(|try_input| -> Result<_> {
            let input = try_input?;
            let mut stats = get_stats(&input.grid, &input.id, &config)?;
            if let Some(dir) = &df_dir {
                if let Some(df) = stats.df.take() {
                    let path = dir.join(format!("{}.csv", input.id));
                    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
                    df.write_csv(BufWriter::new(file))?;
                }
            }
            let pixels: Stats = input.grid.values.iter().collect();
            Ok((stats, pixels))
        })
        .try_fold(
            || (vec![], Stats::default()),
            |mut acc, item| -> Result<_> {
                let (stats, pixels) = item?;
                acc.0.push(stats);
                acc.1 += &pixels;
                Ok(acc)
            },
        )
        .try_reduce(
            || (vec![], Stats::default()),
            |mut acc1, acc2| -> Result<_> {
                acc1.0.extend(acc2.0);
                acc1.1 += &acc2.1;
                Ok(acc1)
            },
        )?;
    image_stats.sort_by(|a, b| a.id.cmp(&b.id));
    info!("processed {} images", image_stats.len());

    if let Some(path) = csv {
        let records: Vec<_> = image_stats.iter().map(|s| (s.id.clone(), s.flat())).collect();
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        write_flat_csv(BufWriter::new(file), "id", &records)?;
        info!("wrote {}", path.display());
    }

    #[derive(Debug, Serialize)]
    struct OutputJson {
        image_stats: Vec<ImageStats>,
        cumulative: Stats,
    }

    serde_json::to_writer(
        std::io::stdout().lock(),
        &OutputJson {
            image_stats,
            cumulative,
        },
    )?;

    Ok(())
}
