//! Thermal images described by ExifTool's JSON output.
//!
//! `exiftool -b -j image.jpg` emits, for every image, the
//! calibration constants as tags and the raw sensor image as a
//! `base64:` encoded TIFF. This module reads that output; it
//! never runs ExifTool itself.
use std::{
    fs::File,
    io::{BufReader, Cursor, Read},
    path::Path,
};

use anyhow::{bail, Context, Result};
use ndarray::Array2;
use serde_derive::*;
use serde_json::Deserializer;

use crate::{grid::TemperatureGrid, io::decode_tiff, temperature::CameraSettings};

#[derive(Deserialize, Debug)]
pub struct ExifToolRecord {
    #[serde(rename = "SourceFile", default)]
    pub source_file: Option<String>,

    #[serde(flatten)]
    pub settings: CameraSettings,

    #[serde(flatten)]
    pub raw: RawThermalImage,
}

#[derive(Deserialize, Debug)]
pub struct RawThermalImage {
    #[serde(rename = "RawThermalImageType")]
    ty: String,

    #[serde(
        rename = "RawThermalImage",
        deserialize_with = "serde_helpers::base64_bytes"
    )]
    bytes: Vec<u8>,
}

impl RawThermalImage {
    /// Raw sensor values, rows by columns.
    pub fn decode(&self) -> Result<Array2<f64>> {
        if self.ty != "TIFF" {
            bail!("unsupported raw thermal image type: {}", self.ty);
        }
        let (values, _) = decode_tiff(Cursor::new(&self.bytes)).context("decoding raw thermal TIFF")?;
        Ok(values)
    }
}

impl ExifToolRecord {
    /// Identifier of the image: the source file stem.
    pub fn id(&self) -> Option<String> {
        self.source_file.as_ref().and_then(|f| {
            Path::new(f)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
    }

    pub fn raw_image(&self) -> Result<Array2<f64>> {
        self.raw.decode()
    }

    /// Temperatures of the image. `distance` overrides the
    /// recorded object distance.
    pub fn to_grid(&self, distance: Option<f64>) -> Result<TemperatureGrid> {
        let raw = self.raw_image()?;
        let settings = match distance {
            Some(d) => self.settings.clone().with_distance(d),
            None => self.settings.clone(),
        };
        Ok(TemperatureGrid::new(settings.convert(&raw)))
    }

    /// All records of an ExifTool JSON array.
    pub fn from_reader<R: Read>(rdr: R) -> Result<Vec<Self>> {
        Ok(serde_json::from_reader(rdr)?)
    }

    /// Records of a stream of concatenated JSON objects.
    pub fn stream_from_reader<R: Read>(rdr: R) -> impl Iterator<Item = Result<Self>> {
        Deserializer::from_reader(rdr)
            .into_iter::<Self>()
            .map(|r| Ok(r?))
    }

    pub fn from_path(path: &Path) -> Result<Vec<Self>> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing ExifTool JSON {}", path.display()))
    }
}

mod serde_helpers {
    use serde::*;

    pub fn base64_bytes<'de, D>(de: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let str_rep = <String as Deserialize>::deserialize(de)?;
        let encoded = str_rep
            .strip_prefix("base64:")
            .ok_or_else(|| Error::custom("unexpected format: must begin with `base64:`"))?;
        base64::decode(encoded).map_err(Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::encode_tiff_u16;
    use approx::assert_relative_eq;

    fn record_json(raw: &Array2<u16>) -> String {
        let tiff = encode_tiff_u16(raw).unwrap();
        format!(
            r#"{{
                "SourceFile": "flights/IR_0042.jpg",
                "Emissivity": 0.95,
                "ObjectDistance": "1.00 m",
                "RawThermalImageType": "TIFF",
                "RawThermalImage": "base64:{}"
            }}"#,
            base64::encode(tiff)
        )
    }

    #[test]
    fn decodes_record() -> Result<()> {
        let raw = Array2::from_shape_fn((3, 4), |(r, c)| 17000 + (r * 4 + c) as u16 * 100);
        let json = format!("[{}]", record_json(&raw));
        let records = ExifToolRecord::from_reader(json.as_bytes())?;
        assert_eq!(records.len(), 1);

        let rec = &records[0];
        assert_eq!(rec.id().as_deref(), Some("IR_0042"));
        assert_eq!(rec.settings.emissivity, 0.95);

        let decoded = rec.raw_image()?;
        assert_eq!(decoded.dim(), (3, 4));
        assert_eq!(decoded[(2, 3)], 18100.);

        let grid = rec.to_grid(None)?;
        assert_relative_eq!(grid.values[(1, 1)], rec.settings.raw_to_temp(17500.));
        Ok(())
    }

    #[test]
    fn streams_concatenated_objects() -> Result<()> {
        let raw = Array2::from_elem((2, 2), 17000u16);
        let json = format!("{}\n{}", record_json(&raw), record_json(&raw));
        let records: Vec<_> = ExifToolRecord::stream_from_reader(json.as_bytes()).collect::<Result<_>>()?;
        assert_eq!(records.len(), 2);
        Ok(())
    }

    #[test]
    fn rejects_non_tiff_and_bad_prefix() {
        let png = r#"[{"RawThermalImageType": "PNG", "RawThermalImage": "base64:AAAA"}]"#;
        let records = ExifToolRecord::from_reader(png.as_bytes()).unwrap();
        assert!(records[0].raw.decode().is_err());

        let bad = r#"[{"RawThermalImageType": "TIFF", "RawThermalImage": "AAAA"}]"#;
        assert!(ExifToolRecord::from_reader(bad.as_bytes()).is_err());
    }
}
