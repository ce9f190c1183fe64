use std::{collections::HashMap, fs, io::Cursor, path::Path};

use anyhow::Result;
use approx::assert_relative_eq;
use ndarray::Array2;
use thermstats::{
    analysis::ReturnValues,
    exiftool::ExifToolRecord,
    get_stats,
    io::{read_grid, read_metadata_path, write_flat_csv, write_grid, write_tiff_grid},
    stats_by_group,
    temperature::CameraSettings,
    Statistic, StatsConfig, TemperatureGrid,
};

/// 15x15 background gradient with a warm and a cool square.
fn spotted(warm: f64, cool: f64) -> TemperatureGrid {
    let mut values = Array2::from_shape_fn((15, 15), |(r, c)| 22. + 0.02 * (r * 15 + c) as f64);
    for r in 2..5 {
        for c in 2..5 {
            values[(r, c)] = warm;
        }
    }
    for r in 10..13 {
        for c in 9..12 {
            values[(r, c)] = cool;
        }
    }
    TemperatureGrid::new(values)
}

fn write_csv(dir: &Path, name: &str, grid: &TemperatureGrid) -> Result<()> {
    write_grid(&dir.join(name), grid)
}

#[test]
fn csv_grid_to_flat_table() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut grid = spotted(35., 12.);
    grid.values[(0, 14)] = f64::NAN;
    write_csv(dir.path(), "IR_0001.csv", &grid)?;

    let read = read_grid(&dir.path().join("IR_0001.csv"))?;
    assert_eq!(read.n_valid(), 224);

    let cfg = StatsConfig {
        return_vals: "pstats,patches".parse::<ReturnValues>()?,
        calc_connectivity: true,
        ..StatsConfig::default()
    };
    let stats = get_stats(&read, "IR_0001", &cfg)?;
    let patches = stats.patches.as_ref().unwrap();
    assert!(patches.iter().any(|p| p.max_temp == 35.));
    assert!(patches.iter().any(|p| p.min_temp == 12.));

    let flat = stats.flat();
    assert_relative_eq!(flat.get("img_max").unwrap(), 35.);
    assert_relative_eq!(flat.get("img_min").unwrap(), 12.);
    assert_eq!(flat.get("hot_n_patches"), Some(1.));
    assert_eq!(flat.get("cold_n_patches"), Some(1.));

    let out = dir.path().join("stats.csv");
    write_flat_csv(fs::File::create(&out)?, "id", &[(stats.id.clone(), flat)])?;
    let table = fs::read_to_string(&out)?;
    let header = table.lines().next().unwrap();
    assert!(header.starts_with("id,img_mean,img_max"));
    assert!(header.contains("connectivity_prop_connected"));
    assert_eq!(table.lines().count(), 2);
    Ok(())
}

#[test]
fn grouped_statistics_from_metadata() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("metadata.csv"),
        "photo_no,species,site\nIR_01,frog,a\nIR_02,frog,b\nIR_03,lizard,a\n",
    )?;
    let mut grids = HashMap::new();
    for (id, warm) in [("IR_01", 34.), ("IR_02", 36.), ("IR_03", 40.)] {
        write_csv(dir.path(), &format!("{}.csv", id), &spotted(warm, 10.))?;
        let grid = read_grid(&dir.path().join(format!("{}.csv", id)))?;
        grids.insert(id.to_string(), grid);
    }
    let metadata = read_metadata_path(&dir.path().join("metadata.csv"))?;

    let cfg = StatsConfig {
        pixel_fns: vec![Statistic::Max, Statistic::Min],
        sum_stats: vec![Statistic::Mean, Statistic::Max],
        ..StatsConfig::default()
    };
    let groups = stats_by_group(&metadata, &grids, "photo_no", "species", &cfg)?;
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].group, "frog");
    assert_eq!(groups[0].ids, ["IR_01", "IR_02"]);

    let frog = &groups[0].stats;
    assert_relative_eq!(frog.get("img_max").unwrap(), 36.);
    assert_relative_eq!(frog.get("img_min").unwrap(), 10.);
    assert_relative_eq!(frog.get("hot_max_mean").unwrap(), 35.);
    assert_relative_eq!(groups[1].stats.get("img_max").unwrap(), 40.);

    let json = serde_json::to_value(&groups)?;
    assert_eq!(json[1]["group"], "lizard");
    assert!(json[0]["stats"]["hot_n_patches_mean"].is_number());
    Ok(())
}

#[test]
fn exiftool_json_to_geotiff() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let settings = CameraSettings {
        emissivity: 0.95,
        ..CameraSettings::default()
    };
    let raw = TemperatureGrid::new(Array2::from_shape_fn((4, 5), |(r, c)| {
        16000. + 250. * (r * 5 + c) as f64
    }));
    let mut tiff = Cursor::new(vec![]);
    write_tiff_grid(&mut tiff, &raw)?;

    let json = format!(
        r#"[{{
            "SourceFile": "survey/IR_7.jpg",
            "Emissivity": 0.95,
            "RelativeHumidity": "50.0 %",
            "RawThermalImageType": "TIFF",
            "RawThermalImage": "base64:{}"
        }}]"#,
        base64::encode(tiff.into_inner())
    );
    let path = dir.path().join("IR_7.json");
    fs::write(&path, json)?;

    let records = ExifToolRecord::from_path(&path)?;
    assert_eq!(records[0].id().as_deref(), Some("IR_7"));
    let grid = read_grid(&path)?;
    assert_eq!(grid.dim(), (4, 5));
    assert_relative_eq!(grid.values[(2, 3)], settings.raw_to_temp(16000. + 250. * 13.), epsilon = 1e-6);

    // temperatures rise with the raw signal
    let flat: Vec<f64> = grid.values.iter().copied().collect();
    assert!(flat.windows(2).all(|w| w[0] < w[1]));

    let out = dir.path().join("IR_7.tif");
    write_grid(&out, &grid)?;
    let back = read_grid(&out)?;
    assert_relative_eq!(back.values[(3, 4)], grid.values[(3, 4)], epsilon = 1e-4);
    Ok(())
}

#[test]
fn config_file_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{
            "pixel_fns": ["mean", "SIDI", "perc_10"],
            "patches": false,
            "calc_connectivity": true,
            "conn_threshold": 2.0,
            "return_vals": {"df": true, "pstats": true},
            "round_val": null
        }"#,
    )?;
    let cfg = StatsConfig::from_path(&path)?;
    assert_eq!(cfg.pixel_fns[2], Statistic::Percentile(10.));
    assert_eq!(cfg.round_val, None);

    let stats = get_stats(&spotted(30., 15.), "cfg", &cfg)?;
    let flat = stats.flat();
    let names: Vec<_> = flat.iter().map(|(n, _)| n).collect();
    assert_eq!(
        names,
        [
            "img_mean",
            "img_SIDI",
            "img_perc_10",
            "connectivity_prop_connected",
            "connectivity_mean_cooling",
            "connectivity_max_cooling"
        ]
    );
    assert_eq!(stats.df.map(|df| df.len()), Some(225));
    Ok(())
}
