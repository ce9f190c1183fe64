//! Reading and writing temperature grids and tables.
//!
//! Grids are read from headerless CSV matrices (`NA`, `NaN` or
//! empty cells are missing), single band TIFF / GeoTIFF rasters,
//! or ExifTool JSON. Tables of results are written as CSV with
//! missing values as `NA`.
use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter, Read, Seek, Write},
    path::Path,
};

use anyhow::{anyhow, bail, ensure, Context, Result};
use log::debug;
use ndarray::Array2;
use tiff::{
    decoder::{Decoder, DecodingResult},
    encoder::{colortype, TiffEncoder},
    tags::Tag,
};

use crate::{
    exiftool::ExifToolRecord,
    grid::{Extent, TemperatureGrid},
    summary::Summary,
};

/// One row of a metadata table, by column name.
pub type MetadataRow = HashMap<String, String>;

fn parse_cell(field: &str) -> Option<f64> {
    match field.trim() {
        "" | "NA" | "NaN" | "nan" | "NULL" => Some(f64::NAN),
        f => f.parse().ok(),
    }
}

pub fn read_csv_grid<R: Read>(rdr: R) -> Result<Array2<f64>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(false).from_reader(rdr);
    let mut values = vec![];
    let mut cols = 0;
    let mut rows = 0;
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading row {}", row + 1))?;
        cols = record.len();
        for (col, field) in record.iter().enumerate() {
            let v = parse_cell(field)
                .ok_or_else(|| anyhow!("row {}, column {}: not a number: `{}`", row + 1, col + 1, field))?;
            values.push(v);
        }
        rows += 1;
    }
    ensure!(rows > 0 && cols > 0, "empty temperature matrix");
    Ok(Array2::from_shape_vec((rows, cols), values)?)
}

pub fn write_csv_grid<W: Write>(wtr: W, values: &Array2<f64>) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(wtr);
    for row in values.rows() {
        writer.write_record(row.iter().map(|v| format_value(*v)))?;
    }
    writer.flush()?;
    Ok(())
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NA".into()
    } else {
        v.to_string()
    }
}

/// Decode a single band TIFF. Returns the values and, for
/// GeoTIFFs, the extent described by the pixel scale and tie
/// point tags. GDAL nodata values become `NaN`.
pub fn decode_tiff<R: Read + Seek>(rdr: R) -> Result<(Array2<f64>, Option<Extent>)> {
    let mut decoder = Decoder::new(rdr)?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let scale = decoder
        .find_tag(Tag::ModelPixelScaleTag)?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let tiepoint = decoder
        .find_tag(Tag::ModelTiepointTag)?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let nodata: Option<f64> = decoder
        .find_tag(Tag::GdalNodata)?
        .map(|v| v.into_string())
        .transpose()?
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse().ok());

    let values: Vec<f64> = match decoder.read_image()? {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        _ => bail!("unsupported TIFF sample format"),
    };
    ensure!(
        values.len() == width * height,
        "expected a single band image: {} samples for {}x{} pixels",
        values.len(),
        width,
        height
    );
    let mut values = Array2::from_shape_vec((height, width), values)?;
    if let Some(nodata) = nodata {
        values.mapv_inplace(|v| if v == nodata { f64::NAN } else { v });
    }

    let extent = match (scale, tiepoint) {
        (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 6 => {
            let xmin = t[3] - t[0] * s[0];
            let ymax = t[4] + t[1] * s[1];
            Some(Extent::new(
                xmin,
                xmin + width as f64 * s[0],
                ymax - height as f64 * s[1],
                ymax,
            )?)
        }
        _ => None,
    };
    Ok((values, extent))
}

/// Write a grid as a 32-bit float TIFF, with GeoTIFF pixel
/// scale and tie point when the grid has an extent.
pub fn write_tiff_grid<W: Write + Seek>(wtr: W, grid: &TemperatureGrid) -> Result<()> {
    let (rows, cols) = grid.dim();
    let data: Vec<f32> = grid.values.iter().map(|&v| v as f32).collect();
    let mut encoder = TiffEncoder::new(wtr)?;
    let mut image = encoder.new_image::<colortype::Gray32Float>(cols as u32, rows as u32)?;
    if let Some(e) = grid.extent {
        let (dx, dy) = grid.cell_size();
        image
            .encoder()
            .write_tag(Tag::ModelPixelScaleTag, &[dx, dy, 0.][..])?;
        image
            .encoder()
            .write_tag(Tag::ModelTiepointTag, &[0., 0., 0., e.xmin, e.ymax, 0.][..])?;
    }
    image.write_data(&data)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn encode_tiff_u16(values: &Array2<u16>) -> Result<Vec<u8>> {
    let (rows, cols) = values.dim();
    let data: Vec<u16> = values.iter().copied().collect();
    let mut out = std::io::Cursor::new(vec![]);
    TiffEncoder::new(&mut out)?.write_image::<colortype::Gray16>(cols as u32, rows as u32, &data)?;
    Ok(out.into_inner())
}

pub fn read_tiff_grid(path: &Path) -> Result<TemperatureGrid> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let (values, extent) =
        decode_tiff(BufReader::new(file)).with_context(|| format!("decoding TIFF {}", path.display()))?;
    let grid = TemperatureGrid::new(values);
    Ok(match extent {
        Some(e) => grid.with_extent(e),
        None => grid,
    })
}

/// Read a grid, choosing the format from the file extension.
/// ExifTool JSON must hold a single image.
pub fn read_grid(path: &Path) -> Result<TemperatureGrid> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    debug!("reading {} as `{}`", path.display(), ext);
    match ext.as_str() {
        "csv" | "txt" => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            let values =
                read_csv_grid(BufReader::new(file)).with_context(|| format!("parsing {}", path.display()))?;
            Ok(TemperatureGrid::new(values))
        }
        "tif" | "tiff" => read_tiff_grid(path),
        "json" => {
            let mut records = ExifToolRecord::from_path(path)?;
            ensure!(
                records.len() == 1,
                "{}: expected one image, found {}",
                path.display(),
                records.len()
            );
            records.remove(0).to_grid(None)
        }
        _ => bail!("{}: unknown grid format `{}`", path.display(), ext),
    }
}

pub fn write_grid(path: &Path, grid: &TemperatureGrid) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "tif" | "tiff" => write_tiff_grid(BufWriter::new(file), grid),
        _ => write_csv_grid(BufWriter::new(file), &grid.values),
    }
}

pub fn read_metadata<R: Read>(rdr: R) -> Result<Vec<MetadataRow>> {
    let mut reader = csv::Reader::from_reader(rdr);
    reader
        .deserialize()
        .enumerate()
        .map(|(i, r)| r.with_context(|| format!("metadata row {}", i + 1)))
        .collect()
}

pub fn read_metadata_path(path: &Path) -> Result<Vec<MetadataRow>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_metadata(BufReader::new(file))
}

/// Write records of named values as a table. Columns are the
/// union of names, in order of first appearance.
pub fn write_flat_csv<W: Write>(wtr: W, key: &str, records: &[(String, Summary)]) -> Result<()> {
    let mut columns: Vec<&str> = vec![];
    for (_, summary) in records {
        for (name, _) in summary.iter() {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }

    let mut writer = csv::Writer::from_writer(wtr);
    writer.write_record(std::iter::once(key).chain(columns.iter().copied()))?;
    for (id, summary) in records {
        let row = columns
            .iter()
            .map(|c| summary.get(c).map(format_value).unwrap_or_else(|| "NA".into()));
        writer.write_record(std::iter::once(id.clone()).chain(row))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Cursor;

    #[test]
    fn csv_grid_with_missing_values() -> Result<()> {
        let csv = "20.5,21,NA\n19,,22.25\n";
        let values = read_csv_grid(csv.as_bytes())?;
        assert_eq!(values.dim(), (2, 3));
        assert!(values[(0, 2)].is_nan());
        assert!(values[(1, 1)].is_nan());
        assert_eq!(values[(1, 2)], 22.25);

        let mut out = vec![];
        write_csv_grid(&mut out, &values)?;
        assert_eq!(String::from_utf8(out)?, "20.5,21,NA\n19,NA,22.25\n");
        Ok(())
    }

    #[test]
    fn csv_grid_errors() {
        assert!(read_csv_grid("1,2\n3\n".as_bytes()).is_err());
        let err = read_csv_grid("1,2\n3,warm\n".as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("row 2, column 2"));
        assert!(read_csv_grid("".as_bytes()).is_err());
    }

    #[test]
    fn geotiff_extent_round_trip() -> Result<()> {
        let grid = TemperatureGrid::new(array![[1., 2., 3.], [4., f64::NAN, 6.]])
            .with_extent(Extent::new(500., 530., 100., 120.)?);
        let mut buf = Cursor::new(vec![]);
        write_tiff_grid(&mut buf, &grid)?;
        buf.set_position(0);

        let (values, extent) = decode_tiff(buf)?;
        assert_eq!(values.dim(), (2, 3));
        assert_eq!(values[(1, 2)], 6.);
        assert!(values[(1, 1)].is_nan());
        assert_eq!(extent, grid.extent);
        Ok(())
    }

    #[test]
    fn plain_tiff_has_no_extent() -> Result<()> {
        let raw = Array2::from_elem((2, 2), 17000u16);
        let (values, extent) = decode_tiff(Cursor::new(encode_tiff_u16(&raw)?))?;
        assert_eq!(values[(0, 0)], 17000.);
        assert!(extent.is_none());
        Ok(())
    }

    #[test]
    fn metadata_and_flat_tables() -> Result<()> {
        let rows = read_metadata("photo_no,species\nIR_01,frog\nIR_02,toad\n".as_bytes())?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["species"], "toad");

        let mut a = Summary::default();
        a.push("img_mean", 20.5);
        let mut b = Summary::default();
        b.push("img_mean", f64::NAN);
        b.push("hot_n_patches", 2.);
        let mut out = vec![];
        write_flat_csv(&mut out, "id", &[("a".into(), a), ("b".into(), b)])?;
        assert_eq!(
            String::from_utf8(out)?,
            "id,img_mean,hot_n_patches\na,20.5,NA\nb,NA,2\n"
        );
        Ok(())
    }
}
