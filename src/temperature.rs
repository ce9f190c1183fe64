//! Conversion of raw thermal sensor values to temperatures.
//!
//! The model follows the [Thermimage R library]'s `raw2temp`:
//! the raw signal is corrected for atmospheric transmission,
//! reflected radiance and an optional IR window, then mapped to
//! a temperature through the camera's Planck constants.
//!
//! [Thermimage R library]: //github.com/gtatters/Thermimage/blob/master/R/raw2temp.R
use ndarray::Array2;
use rayon::prelude::*;
use serde_derive::*;

/// Calibration constants and ambient conditions of an image.
///
/// Field names match the tags in ExifTool's JSON output. Missing
/// tags take the Thermimage defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct CameraSettings {
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub emissivity: f64,
    /// Object distance in metres.
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub object_distance: f64,
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub reflected_apparent_temperature: f64,
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub atmospheric_temperature: f64,
    #[serde(
        rename = "IRWindowTemperature",
        deserialize_with = "serde_helpers::float_with_suffix"
    )]
    pub ir_window_temperature: f64,
    #[serde(
        rename = "IRWindowTransmission",
        deserialize_with = "serde_helpers::float_with_suffix"
    )]
    pub ir_window_transmission: f64,
    /// Relative humidity in percent.
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub relative_humidity: f64,

    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub planck_r1: f64,
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub planck_b: f64,
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub planck_f: f64,
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub planck_o: f64,
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub planck_r2: f64,

    #[serde(
        rename = "AtmosphericTransAlpha1",
        deserialize_with = "serde_helpers::float_with_suffix"
    )]
    pub atmospheric_trans_alpha_1: f64,
    #[serde(
        rename = "AtmosphericTransAlpha2",
        deserialize_with = "serde_helpers::float_with_suffix"
    )]
    pub atmospheric_trans_alpha_2: f64,
    #[serde(
        rename = "AtmosphericTransBeta1",
        deserialize_with = "serde_helpers::float_with_suffix"
    )]
    pub atmospheric_trans_beta_1: f64,
    #[serde(
        rename = "AtmosphericTransBeta2",
        deserialize_with = "serde_helpers::float_with_suffix"
    )]
    pub atmospheric_trans_beta_2: f64,
    #[serde(
        rename = "AtmosphericTransX",
        deserialize_with = "serde_helpers::float_with_suffix"
    )]
    pub atmospheric_trans_x: f64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        CameraSettings {
            emissivity: 1.,
            object_distance: 1.,
            reflected_apparent_temperature: 20.,
            atmospheric_temperature: 20.,
            ir_window_temperature: 20.,
            ir_window_transmission: 1.,
            relative_humidity: 50.,
            planck_r1: 21106.77,
            planck_b: 1501.,
            planck_f: 1.,
            planck_o: -7340.,
            planck_r2: 0.012545258,
            atmospheric_trans_alpha_1: 0.006569,
            atmospheric_trans_alpha_2: 0.01262,
            atmospheric_trans_beta_1: -0.002276,
            atmospheric_trans_beta_2: -0.00667,
            atmospheric_trans_x: 1.9,
        }
    }
}

const CELSIUS_OFFSET: f64 = 273.15;

impl CameraSettings {
    pub fn with_distance(mut self, distance: f64) -> Self {
        self.object_distance = distance;
        self
    }

    // raw = PR1 / (PR2 * (exp(PB / (T + 273.15)) - PF)) - PO
    fn planck_temp_to_raw(&self, temp: f64) -> f64 {
        self.planck_r1
            / (self.planck_r2 * ((self.planck_b / (temp + CELSIUS_OFFSET)).exp() - self.planck_f))
            - self.planck_o
    }

    fn planck_raw_to_temp(&self, raw: f64) -> f64 {
        self.planck_b / (self.planck_r1 / (self.planck_r2 * (raw + self.planck_o)) + self.planck_f).ln()
            - CELSIUS_OFFSET
    }

    /// Atmospheric transmission over half the object distance
    /// (the window is assumed midway).
    pub fn atmospheric_transmission(&self) -> f64 {
        // water vapour pressure from relative humidity
        const H2O_SERIES: [f64; 4] = [1.5587, 0.06939, -0.00027816, 0.00000068455];
        let h2o = (self.relative_humidity / 100.)
            * power_series_at(&H2O_SERIES, self.atmospheric_temperature).exp();
        let h2o_sqrt = h2o.sqrt();
        let dist = (self.object_distance / 2.).sqrt();

        let t1 = (-dist * (self.atmospheric_trans_alpha_1 + self.atmospheric_trans_beta_1 * h2o_sqrt)).exp();
        let t2 = (-dist * (self.atmospheric_trans_alpha_2 + self.atmospheric_trans_beta_2 * h2o_sqrt)).exp();
        self.atmospheric_trans_x * t1 + (1. - self.atmospheric_trans_x) * t2
    }

    /// Affine map from the raw sensor value to the raw value
    /// emitted by the object alone, as `[offset, scale]`.
    fn object_radiance_coeffs(&self) -> [f64; 2] {
        let e = self.emissivity;
        let irt = self.ir_window_transmission;
        let tau = self.atmospheric_transmission();
        // anti-reflective window
        let refl_wind = 0.;

        let refl = self.planck_temp_to_raw(self.reflected_apparent_temperature);
        let atm = self.planck_temp_to_raw(self.atmospheric_temperature);
        let wind = self.planck_temp_to_raw(self.ir_window_temperature);

        let refl1 = (1. - e) / e * refl;
        let atm1 = (1. - tau) / e / tau * atm;
        let wind_emitted = (1. - irt) / e / tau / irt * wind;
        let refl2 = refl_wind / e / tau / irt * refl;
        let atm2 = (1. - tau) / e / tau / irt / tau * atm;

        [
            -(atm1 + atm2 + wind_emitted + refl1 + refl2),
            1. / e / tau / irt / tau,
        ]
    }

    pub fn temperature_transform(&self) -> impl Fn(f64) -> f64 + Sync + '_ {
        let coeffs = self.object_radiance_coeffs();
        move |raw| self.planck_raw_to_temp(power_series_at(&coeffs, raw))
    }

    pub fn raw_to_temp(&self, raw: f64) -> f64 {
        self.temperature_transform()(raw)
    }

    pub fn convert(&self, raw: &Array2<f64>) -> Array2<f64> {
        raw.mapv(self.temperature_transform())
    }
}

/// Convert raw sensor matrices that share the same calibration.
pub fn batch_convert(raws: &[Array2<f64>], settings: &CameraSettings) -> Vec<Array2<f64>> {
    raws.par_iter().map(|raw| settings.convert(raw)).collect()
}

#[inline]
fn power_series_at(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0., |acc, c| acc * x + c)
}

mod serde_helpers {
    use lazy_static::lazy_static;
    use regex::Regex;
    use serde::*;

    #[derive(serde_derive::Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    /// Accepts a number, or a string starting with one (ExifTool
    /// prints units: `"20.0 C"`, `"50.0 %"`, `"1.00 m"`).
    pub fn float_with_suffix<'de, D>(de: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        lazy_static! {
            static ref RE: Regex = Regex::new(r"^\s*[-+]?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?").unwrap();
        }

        use serde::de::Error;
        match NumberOrString::deserialize(de)? {
            NumberOrString::Number(v) => Ok(v),
            NumberOrString::String(s) => RE
                .find(&s)
                .ok_or_else(|| Error::custom(format!("expected a number, found `{}`", s)))?
                .as_str()
                .trim()
                .parse()
                .map_err(Error::custom),
        }
    }
}
