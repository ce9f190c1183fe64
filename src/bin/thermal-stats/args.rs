use std::path::PathBuf;

use anyhow::Result;
use clap::value_t_or_exit;
use thermstats::{
    arg, args_parser,
    cli::stats_config_from_matches,
    opt, stats_config_args, StatsConfig,
};

pub struct Args {
    pub paths: Vec<String>,
    pub config: StatsConfig,
    pub distance: Option<f64>,
    pub csv: Option<PathBuf>,
    pub df_dir: Option<PathBuf>,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = stats_config_args!(args_parser!("thermal-stats")
            .about("Compute pixel, hot/cold patch and connectivity statistics of temperature grids."))
            .arg(
                opt!("distance")
                    .short("d")
                    .help("Object distance for ExifTool inputs (default: recorded distance)"),
            )
            .arg(opt!("csv").help("Also write the flat statistics to this CSV file"))
            .arg(opt!("df dir").help("Write the pixel frame of every image as CSV into this directory"))
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
        let mut config = stats_config_from_matches(&matches)?;
        let distance = matches
            .is_present("distance")
            .then(|| value_t_or_exit!(matches.value_of("distance"), f64));
        let csv = matches.value_of("csv").map(PathBuf::from);
        let df_dir = matches.value_of("df dir").map(PathBuf::from);

        if df_dir.is_some() {
            config.return_vals.df = true;
        }
        config.validate()?;

        Ok(Args {
            paths,
            config,
            distance,
            csv,
            df_dir,
        })
    }
}
