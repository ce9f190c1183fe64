use anyhow::Result;
use clap::value_t_or_exit;
use std::path::PathBuf;
use thermstats::{arg, args_parser, cli::expand_paths, opt};

pub struct Args {
    pub paths: Vec<PathBuf>,
    pub output: PathBuf,
    pub distance: Option<f64>,
    pub tiff: bool,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("thermal-convert")
            .about("Convert raw thermal images in ExifTool JSON to temperature grids.")
            .arg(
                opt!("output")
                    .short("o")
                    .required(true)
                    .help("Output directory"),
            )
            .arg(
                opt!("distance")
                    .short("d")
                    .help("Object distance to use (default: recorded distance)"),
            )
            .arg(
                opt!("tiff")
                    .takes_value(false)
                    .help("Write 32-bit float TIFFs (default: CSV)"),
            )
            .arg(
                arg!("paths")
                    .required(true)
                    .multiple(true)
                    .help("JSON files created with `exiftool -b -j`"),
            )
            .get_matches();

        let paths = expand_paths(
            matches
                .values_of("paths")
                .map(|v| v.map(String::from).collect())
                .unwrap_or_default(),
        )?
        .into_iter()
        .map(PathBuf::from)
        .collect();
        let output = value_t_or_exit!(matches, "output", PathBuf);
        let distance = matches
            .is_present("distance")
            .then(|| value_t_or_exit!(matches.value_of("distance"), f64));
        let tiff = matches.is_present("tiff");

        Ok(Args {
            paths,
            output,
            distance,
            tiff,
        })
    }
}
