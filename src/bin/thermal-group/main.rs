mod args;

use std::{collections::HashMap, fs::File, io::BufWriter};

use anyhow::{Context, Result};
use args::Args;
use log::{info, warn};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use thermstats::{
    cli::{expand_paths, load_inputs_par},
    io::{read_metadata_path, write_flat_csv},
    stats_by_group, TemperatureGrid,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Args {
        paths,
        metadata,
        id_var,
        group_var,
        config,
        distance,
        csv,
    } = Args::from_cmd_line()?;

    let metadata = read_metadata_path(&metadata)?;
    let inputs = load_inputs_par(expand_paths(paths)?, distance)
        .into_par_iter()
        .collect::<Result<Vec<_>>>()?;

    let mut grids: HashMap<String, TemperatureGrid> = HashMap::with_capacity(inputs.len());
    for input in inputs {
        if grids.insert(input.id.clone(), input.grid).is_some() {
            warn!("duplicate image id `{}`: keeping the last one", input.id);
        }
    }

    let groups = stats_by_group(&metadata, &grids, &id_var, &group_var, &config)?;
    info!("computed statistics of {} groups", groups.len());

    match csv {
        Some(path) => {
            let records: Vec<_> = groups.into_iter().map(|g| (g.group, g.stats)).collect();
            let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            write_flat_csv(BufWriter::new(file), &group_var, &records)?;
            info!("wrote {}", path.display());
        }
        None => serde_json::to_writer(std::io::stdout().lock(), &groups)?,
    }

    Ok(())
}
