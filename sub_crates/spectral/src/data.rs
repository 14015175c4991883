use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use serde::Deserialize;

use crate::Error;

/// Descriptive fields from the header of a spectral data file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    /// Illuminant type for illuminant files, e.g. "iso7589".
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub schema_version: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    pub values: Vec<f64>,
}

/// A set of named channels sampled at common wavelengths (in nm).
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralData {
    pub header: Header,
    pub units: String,
    pub wavelengths: Vec<f64>,
    pub channels: Vec<Channel>,
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    header: Header,
    spectral_data: DocumentData,
}

#[derive(Deserialize)]
struct DocumentData {
    #[serde(default)]
    units: String,
    index: BTreeMap<String, Vec<String>>,
    data: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
}

const MAIN_SET: &str = "main";

impl SpectralData {
    /// Builds single-channel data, as used for illuminants.
    pub fn single(header: Header, wavelengths: Vec<f64>, values: Vec<f64>) -> SpectralData {
        debug_assert_eq!(wavelengths.len(), values.len());
        SpectralData {
            header,
            units: "relative".into(),
            wavelengths,
            channels: vec![Channel {
                name: "power".into(),
                values,
            }],
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<SpectralData, Error> {
        let reader = BufReader::new(File::open(path)?);
        let doc: Document = serde_json::from_reader(reader)?;
        Self::from_document(doc)
    }

    pub fn from_json_str(text: &str) -> Result<SpectralData, Error> {
        let doc: Document = serde_json::from_str(text)?;
        Self::from_document(doc)
    }

    fn from_document(doc: Document) -> Result<SpectralData, Error> {
        let names = doc
            .spectral_data
            .index
            .get(MAIN_SET)
            .ok_or_else(|| Error::Format("Missing channel index for the 'main' set".into()))?;
        let samples = doc
            .spectral_data
            .data
            .get(MAIN_SET)
            .ok_or_else(|| Error::Format("Missing data for the 'main' set".into()))?;

        // Wavelength keys are strings in the file, so they have to be
        // re-sorted numerically.
        let mut rows = Vec::with_capacity(samples.len());
        for (key, values) in samples.iter() {
            let wavelength: f64 = key
                .trim()
                .parse()
                .map_err(|_| Error::Format(format!("Invalid wavelength '{}'", key)))?;
            if values.len() != names.len() {
                return Err(Error::Format(format!(
                    "Wavelength {} has {} values, expected {}",
                    key,
                    values.len(),
                    names.len()
                )));
            }
            rows.push((wavelength, values));
        }
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));

        let channels = names
            .iter()
            .enumerate()
            .map(|(i, name)| Channel {
                name: name.clone(),
                values: rows.iter().map(|(_, v)| v[i]).collect(),
            })
            .collect();

        Ok(SpectralData {
            header: doc.header,
            units: doc.spectral_data.units,
            wavelengths: rows.iter().map(|(w, _)| *w).collect(),
            channels,
        })
    }

    /// Errors out unless the data has exactly `count` channels.
    pub fn expect_channels(&self, count: usize, what: &str) -> Result<(), Error> {
        if self.channels.len() != count {
            return Err(Error::Format(format!(
                "{} data must have {} channels, found {}",
                what,
                count,
                self.channels.len()
            )));
        }
        Ok(())
    }

    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.channels
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| &c.values[..])
    }

    /// Linearly interpolated value of a channel, zero outside the sampled range.
    pub fn value_at(&self, channel: usize, wavelength: f64) -> f64 {
        let values = &self.channels[channel].values;
        let wls = &self.wavelengths;
        if wls.is_empty() || wavelength < wls[0] || wavelength > wls[wls.len() - 1] {
            return 0.0;
        }

        match wls.binary_search_by(|w| w.total_cmp(&wavelength)) {
            Ok(i) => values[i],
            Err(i) => {
                let alpha = (wavelength - wls[i - 1]) / (wls[i] - wls[i - 1]);
                values[i - 1] + ((values[i] - values[i - 1]) * alpha)
            }
        }
    }

    /// Returns a copy of the data sampled at `wavelengths`.
    pub fn resampled(&self, wavelengths: &[f64]) -> SpectralData {
        let channels = (0..self.channels.len())
            .map(|c| Channel {
                name: self.channels[c].name.clone(),
                values: wavelengths.iter().map(|&w| self.value_at(c, w)).collect(),
            })
            .collect();

        SpectralData {
            header: self.header.clone(),
            units: self.units.clone(),
            wavelengths: wavelengths.to_vec(),
            channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAMERA_JSON: &str = r#"{
        "header": { "manufacturer": "Acme", "model": "One", "schema_version": "0.1.0" },
        "spectral_data": {
            "units": "relative",
            "index": { "main": ["R", "G", "B"] },
            "data": { "main": {
                "400": [0.1, 0.2, 0.9],
                "390": [0.0, 0.1, 0.8],
                "1000": [0.0, 0.0, 0.0]
            } }
        }
    }"#;

    #[test]
    fn parse_sorts_wavelengths_numerically() {
        let data = SpectralData::from_json_str(CAMERA_JSON).unwrap();
        assert_eq!(data.header.manufacturer, "Acme");
        assert_eq!(data.wavelengths, vec![390.0, 400.0, 1000.0]);
        assert_eq!(data.channel("b").unwrap(), &[0.8, 0.9, 0.0]);
        assert!(data.expect_channels(3, "Camera").is_ok());
        assert!(data.expect_channels(1, "Illuminant").is_err());
    }

    #[test]
    fn parse_rejects_ragged_rows() {
        let text = r#"{ "spectral_data": {
            "index": { "main": ["R", "G", "B"] },
            "data": { "main": { "400": [0.1, 0.2] } } } }"#;
        assert!(matches!(
            SpectralData::from_json_str(text),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn parse_rejects_bad_wavelength() {
        let text = r#"{ "spectral_data": {
            "index": { "main": ["power"] },
            "data": { "main": { "blue": [0.1] } } } }"#;
        assert!(matches!(
            SpectralData::from_json_str(text),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn interpolation() {
        let data = SpectralData::single(
            Header::default(),
            vec![400.0, 410.0, 420.0],
            vec![1.0, 3.0, 2.0],
        );
        assert_eq!(data.value_at(0, 400.0), 1.0);
        assert!((data.value_at(0, 405.0) - 2.0).abs() < 1e-12);
        assert!((data.value_at(0, 417.5) - 2.25).abs() < 1e-12);
        assert_eq!(data.value_at(0, 399.0), 0.0);
        assert_eq!(data.value_at(0, 421.0), 0.0);

        let resampled = data.resampled(&[390.0, 410.0, 415.0]);
        assert_eq!(resampled.channels[0].values, vec![0.0, 3.0, 2.5]);
    }
}
