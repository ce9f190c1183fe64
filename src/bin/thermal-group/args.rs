use std::path::PathBuf;

use anyhow::Result;
use clap::value_t_or_exit;
use thermstats::{
    arg, args_parser, cli::stats_config_from_matches, opt, stats_config_args, StatsConfig,
};

pub struct Args {
    pub paths: Vec<String>,
    pub metadata: PathBuf,
    pub id_var: String,
    pub group_var: String,
    pub config: StatsConfig,
    pub distance: Option<f64>,
    pub csv: Option<PathBuf>,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = stats_config_args!(args_parser!("thermal-group")
            .about("Compute statistics of groups of temperature grids listed in a metadata table."))
        .arg(
            opt!("metadata")
                .short("m")
                .required(true)
                .help("CSV file with a header; one row per image"),
        )
        .arg(
            opt!("id var")
                .required(true)
                .help("Metadata column matching the file stem of each grid"),
        )
        .arg(
            opt!("group var")
                .short("g")
                .required(true)
                .help("Metadata column to group images by"),
        )
        .arg(
            opt!("distance")
                .short("d")
                .help("Object distance for ExifTool inputs (default: recorded distance)"),
        )
        .arg(opt!("csv").help("Write a CSV table instead of JSON"))
        .arg(
            arg!("paths")
                .required(true)
                .multiple(true)
                .help("Temperature grids: .csv, .tif or ExifTool .json"),
        )
        .get_matches();

        let paths = matches
            .values_of("paths")
            .map(|v| v.map(|f| f.into()).collect())
            .unwrap_or_default();
        let metadata = value_t_or_exit!(matches, "metadata", PathBuf);
        let id_var = value_t_or_exit!(matches, "id var", String);
        let group_var = value_t_or_exit!(matches, "group var", String);
        let config = stats_config_from_matches(&matches)?;
        config.validate()?;
        let distance = matches
            .is_present("distance")
            .then(|| value_t_or_exit!(matches.value_of("distance"), f64));
        let csv = matches.value_of("csv").map(PathBuf::from);

        Ok(Args {
            paths,
            metadata,
            id_var,
            group_var,
            config,
            distance,
            csv,
        })
    }
}
