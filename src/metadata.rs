//! Per-image camera metadata.
//!
//! Camera identity, the decoder's white balance and colour matrix and the
//! CFA layout come from rawloader.  DNG colour calibration tags, which
//! rawloader doesn't expose, are read separately through EXIF.

use std::{fs::File, io::BufReader, path::Path};

use colorbox::matrix;
use tracing::debug;

use crate::{Error, Matrix3};

// DNG tag numbers.
const TAG_COLOR_MATRIX: [u16; 2] = [0xC621, 0xC622];
const TAG_CAMERA_CALIBRATION: [u16; 2] = [0xC623, 0xC624];
const TAG_AS_SHOT_NEUTRAL: u16 = 0xC628;
const TAG_BASELINE_EXPOSURE: u16 = 0xC62A;
const TAG_CALIBRATION_ILLUMINANT: [u16; 2] = [0xC65A, 0xC65B];

/// One of the (up to two) calibrations of a DNG.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Calibration {
    /// EXIF `LightSource` value, 0 if unknown.
    pub illuminant: u16,
    /// XYZ -> camera RGB (DNG `ColorMatrixN`).
    pub xyz_to_rgb: Option<Matrix3>,
    /// Per-unit adjustment (DNG `CameraCalibrationN`).
    pub camera_calibration: Option<Matrix3>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraMetadata {
    pub make: String,
    pub model: String,
    /// Camera RGB of a neutral object, as recorded by the camera.
    pub as_shot_neutral: Option<[f64; 3]>,
    /// White balance coefficients reported by the raw decoder.
    pub decoder_wb: Option<[f64; 4]>,
    /// In stops.
    pub baseline_exposure: f64,
    pub calibration: [Calibration; 2],
    /// The decoder's built-in XYZ -> camera matrix for this model.
    pub adobe_xyz_to_camera: Option<Matrix3>,
    /// CFA pattern name, e.g. "RGGB".
    pub cfa: String,
    /// Number of distinct colours in the CFA.
    pub color_count: usize,
}

/// Decodes a raw file.
pub fn decode(path: &Path) -> Result<rawloader::RawImage, Error> {
    rawloader::decode_file(path).map_err(|e| Error::Decode {
        path: path.into(),
        message: format!("{:?}", e),
    })
}

impl CameraMetadata {
    /// Extracts the metadata of an already decoded file.
    pub fn from_raw(path: &Path, raw: &rawloader::RawImage) -> CameraMetadata {
        let mut metadata = CameraMetadata::from_raw_image(raw);
        match DngTags::read(path) {
            Ok(tags) => tags.apply_to(&mut metadata),
            Err(e) => debug!("No DNG tags in '{}': {}", path.display(), e),
        }
        metadata
    }

    /// The parts of the metadata that rawloader knows about.
    pub fn from_raw_image(raw: &rawloader::RawImage) -> CameraMetadata {
        let decoder_wb = {
            let wb = raw.wb_coeffs;
            if wb.iter().all(|v| !(v.abs() > 0.0)) {
                None
            } else {
                let mut out = [0.0f64; 4];
                for (o, &v) in out.iter_mut().zip(wb.iter()) {
                    *o = if v.is_nan() { 0.0 } else { v as f64 };
                }
                Some(out)
            }
        };

        let adobe_xyz_to_camera = {
            let mut m = [[0.0f64; 3]; 3];
            for (dst, src) in m.iter_mut().zip(raw.xyz_to_cam.iter()) {
                for (d, &s) in dst.iter_mut().zip(src.iter()) {
                    *d = s as f64;
                }
            }
            if m.iter().flatten().all(|&v| v == 0.0) {
                None
            } else {
                Some(m)
            }
        };

        let color_count = if raw.cpp == 3 {
            3
        } else if raw.cfa.width == 0 || raw.cfa.height == 0 {
            0
        } else {
            let mut seen = [false; 4];
            for row in 0..raw.cfa.height {
                for col in 0..raw.cfa.width {
                    seen[raw.cfa.color_at(row, col).min(3)] = true;
                }
            }
            seen.iter().filter(|&&s| s).count()
        };

        CameraMetadata {
            make: raw.clean_make.clone(),
            model: raw.clean_model.clone(),
            as_shot_neutral: None,
            decoder_wb,
            baseline_exposure: 0.0,
            calibration: [Calibration::default(); 2],
            adobe_xyz_to_camera,
            cfa: raw.cfa.name.clone(),
            color_count,
        }
    }

    /// Replaces the camera identity with the non-empty overrides.
    pub fn apply_overrides(&mut self, make: &str, model: &str) {
        if !make.is_empty() {
            self.make = make.into();
        }
        if !model.is_empty() {
            self.model = model.into();
        }
    }

    /// The as-shot white balance multipliers, normalized to green.
    ///
    /// Prefers the DNG as-shot neutral, falling back to the decoder's
    /// coefficients.
    pub fn as_shot_multipliers(&self) -> Option<[f64; 4]> {
        if let Some(n) = self.as_shot_neutral {
            if n.iter().all(|&v| v > 0.0) {
                return Some([n[1] / n[0], 1.0, n[1] / n[2], 0.0]);
            }
        }

        let wb = self.decoder_wb?;
        if !(wb[1] > 0.0) {
            return None;
        }
        let mut out = [0.0f64; 4];
        for (o, &v) in out.iter_mut().zip(wb.iter()) {
            let n = v / wb[1];
            *o = if n.is_finite() { n } else { 0.0 };
        }
        Some(out)
    }

    /// The DNG calibration data, if the file has any.
    pub fn dng_profile(&self) -> Option<idt::dng::Profile> {
        let calibrations: Vec<idt::dng::Calibration> = self
            .calibration
            .iter()
            .filter_map(|c| {
                let cm = c.xyz_to_rgb?;
                let xyz_to_camera = match c.camera_calibration {
                    Some(cc) => matrix::compose(&[cm, cc]),
                    None => cm,
                };
                Some(idt::dng::Calibration {
                    illuminant: c.illuminant,
                    xyz_to_camera,
                })
            })
            .collect();

        if calibrations.is_empty() {
            return None;
        }
        Some(idt::dng::Profile {
            calibrations,
            neutral: self.as_shot_neutral,
        })
    }
}

//-------------------------------------------------------------

/// Raw values of the DNG colour tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DngTags {
    pub color_matrix: [Option<Vec<f64>>; 2],
    pub camera_calibration: [Option<Vec<f64>>; 2],
    pub calibration_illuminant: [Option<u16>; 2],
    pub as_shot_neutral: Option<Vec<f64>>,
    pub baseline_exposure: Option<f64>,
}

impl DngTags {
    pub fn read(path: &Path) -> Result<DngTags, Error> {
        let mut file = BufReader::new(File::open(path)?);
        let exif = exif::Reader::new().read_from_container(&mut file)?;
        Ok(DngTags::from_exif(&exif))
    }

    pub fn from_exif(exif: &exif::Exif) -> DngTags {
        let mut tags = DngTags::default();
        for i in 0..2 {
            tags.color_matrix[i] = field_f64s(exif, TAG_COLOR_MATRIX[i]);
            tags.camera_calibration[i] = field_f64s(exif, TAG_CAMERA_CALIBRATION[i]);
            tags.calibration_illuminant[i] = exif
                .get_field(tiff_tag(TAG_CALIBRATION_ILLUMINANT[i]), exif::In::PRIMARY)
                .and_then(|f| f.value.get_uint(0))
                .map(|n| n.min(u16::MAX as u32) as u16);
        }
        tags.as_shot_neutral = field_f64s(exif, TAG_AS_SHOT_NEUTRAL);
        tags.baseline_exposure =
            field_f64s(exif, TAG_BASELINE_EXPOSURE).and_then(|v| v.first().copied());
        tags
    }

    pub fn apply_to(&self, metadata: &mut CameraMetadata) {
        for i in 0..2 {
            let calibration = &mut metadata.calibration[i];
            if let Some(illuminant) = self.calibration_illuminant[i] {
                calibration.illuminant = illuminant;
            }
            if let Some(m) = self.color_matrix[i].as_deref().and_then(to_matrix) {
                calibration.xyz_to_rgb = Some(m);
            }
            if let Some(m) = self.camera_calibration[i].as_deref().and_then(to_matrix) {
                calibration.camera_calibration = Some(m);
            }
        }

        if let Some(n) = &self.as_shot_neutral {
            if n.len() >= 3 {
                metadata.as_shot_neutral = Some([n[0], n[1], n[2]]);
            }
        }
        if let Some(exposure) = self.baseline_exposure {
            if exposure.is_finite() {
                metadata.baseline_exposure = exposure;
            }
        }
    }
}

fn tiff_tag(number: u16) -> exif::Tag {
    exif::Tag(exif::Context::Tiff, number)
}

fn field_f64s(exif: &exif::Exif, number: u16) -> Option<Vec<f64>> {
    let field = exif.get_field(tiff_tag(number), exif::In::PRIMARY)?;
    let values: Vec<f64> = match field.value {
        exif::Value::SRational(ref v) => v.iter().map(|n| n.to_f64()).collect(),
        exif::Value::Rational(ref v) => v.iter().map(|n| n.to_f64()).collect(),
        exif::Value::Float(ref v) => v.iter().map(|&n| n as f64).collect(),
        exif::Value::Double(ref v) => v.clone(),
        _ => return None,
    };
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

/// The first nine values as a row-major 3x3 matrix.
fn to_matrix(values: &[f64]) -> Option<Matrix3> {
    if values.len() < 9 || values[..9].iter().all(|&v| v == 0.0) {
        return None;
    }
    let mut m = [[0.0f64; 3]; 3];
    for (i, &v) in values[..9].iter().enumerate() {
        m[i / 3][i % 3] = v;
    }
    Some(m)
}
