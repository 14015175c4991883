//! Camera RGB to ACES2065-1 transforms.

use spectral::{
    illuminant::{self, IlluminantName},
    Database, SpectralData,
};
use tracing::{debug, warn};

use idt::{aces, temperature};

use crate::{
    cache::{Caches, SpectralKey},
    metadata::CameraMetadata,
    settings::{MatrixMethod, Settings},
    white_balance, Matrix3,
};

/// The computed colour transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    /// Camera specific Input Device Transform.
    Idt(Matrix3),
    /// Input Device Transform from XYZ.  White balanced camera RGB is taken
    /// to XYZ with `camera_to_xyz` first.
    XyzIdt { camera_to_xyz: Matrix3, idt: Matrix3 },
    /// Chromatic adaptation only, for when nothing is known about the
    /// camera.
    Cat(Matrix3),
}

impl Transform {
    /// The IDT or CAT itself.
    pub fn matrix(&self) -> &Matrix3 {
        match self {
            Transform::Idt(m) | Transform::Cat(m) => m,
            Transform::XyzIdt { idt, .. } => idt,
        }
    }

    /// The matrix to apply to white balanced camera RGB.
    pub fn pixel_matrix(&self) -> Matrix3 {
        match self {
            Transform::XyzIdt { camera_to_xyz, idt } => {
                colorbox::matrix::compose(&[*camera_to_xyz, *idt])
            }
            _ => *self.matrix(),
        }
    }

    pub fn is_idt(&self) -> bool {
        !matches!(self, Transform::Cat(_))
    }
}

/// Computes the transform with the method selected in `settings`.
///
/// `wb` is the white balance computed for the same image.  `None` means
/// the method's inputs are unavailable.  `MatrixMethod::Auto` falls back
/// through the spectral, metadata and Adobe methods to a plain chromatic
/// adaptation, so it always succeeds.
pub fn calculate(
    settings: &Settings,
    metadata: &CameraMetadata,
    database: &Database,
    wb: Option<[f64; 4]>,
    caches: &mut Caches,
) -> Option<Transform> {
    match settings.matrix_method {
        MatrixMethod::Auto => {
            if let Some(m) = spectral_idt(settings, metadata, database, wb, caches) {
                debug!("Using the spectral IDT.");
                return Some(Transform::Idt(m));
            }
            if let Some(t) = metadata_idt(metadata, caches) {
                debug!("Using the metadata IDT.");
                return Some(t);
            }
            if let Some(m) = adobe_idt(metadata) {
                debug!("Using the Adobe IDT.");
                return Some(Transform::Idt(m));
            }
            debug!("No camera data, using a chromatic adaptation transform.");
            Some(Transform::Cat(generic_cat(settings, database)))
        }
        MatrixMethod::Spectral => {
            spectral_idt(settings, metadata, database, wb, caches).map(Transform::Idt)
        }
        MatrixMethod::Metadata => metadata_idt(metadata, caches),
        MatrixMethod::Adobe => adobe_idt(metadata).map(Transform::Idt),
        MatrixMethod::Custom => Some(Transform::Idt(
            settings.custom_matrix().map(|row| row.map(|v| v as f64)),
        )),
    }
}

/// IDT fitted from the camera's spectral sensitivities.
///
/// The illuminant is `settings.illuminant`, or detected from `wb` if that
/// is empty.
pub fn spectral_idt(
    settings: &Settings,
    metadata: &CameraMetadata,
    database: &Database,
    wb: Option<[f64; 4]>,
    caches: &mut Caches,
) -> Option<Matrix3> {
    let camera = white_balance::find_camera(database, metadata)?;

    let light = if settings.illuminant.is_empty() {
        let wb = match wb {
            Some(wb) => wb,
            None => {
                warn!("No white balance to detect the illuminant from.");
                return None;
            }
        };
        white_balance::detect_illuminant(&camera, wb, database)?
    } else {
        match illuminant::resolve(&settings.illuminant, database, &camera.wavelengths) {
            Ok(light) => light,
            Err(e) => {
                warn!("{}", e);
                return None;
            }
        }
    };

    let key = SpectralKey {
        make: metadata.make.clone(),
        model: metadata.model.clone(),
        illuminant: light.clone(),
    };
    caches.spectral_idt.fetch(key, || {
        let observer = database
            .load_observer()
            .map_err(|e| warn!("{}", e))
            .ok()?;
        let training = database
            .load_training()
            .map_err(|e| warn!("{}", e))
            .ok()?;
        idt::spectral_fit::solve_idt(&camera, &light, &observer, &training)
    })
}

/// IDT from the DNG colour calibration tags.
pub fn metadata_idt(metadata: &CameraMetadata, caches: &mut Caches) -> Option<Transform> {
    let profile = metadata.dng_profile()?;
    caches.metadata_idt.fetch(profile.clone(), || {
        Some(Transform::XyzIdt {
            camera_to_xyz: idt::dng::camera_to_xyz(&profile)?,
            idt: idt::dng::idt_matrix(&profile)?,
        })
    })
}

/// IDT from the raw decoder's built-in matrix for the camera model.
pub fn adobe_idt(metadata: &CameraMetadata) -> Option<Matrix3> {
    metadata.adobe_xyz_to_camera.and_then(aces::adobe_idt)
}

/// Adapts the white of `settings.illuminant` (D65 if empty or unknown) to
/// the ACES white.
pub fn generic_cat(settings: &Settings, database: &Database) -> Matrix3 {
    aces::generic_cat(source_white(&settings.illuminant, database))
}

/// Chromaticity of the named illuminant, D65 if it can't be determined.
pub fn source_white(name: &str, database: &Database) -> (f64, f64) {
    let d65 = colorbox::chroma::illuminant::D65;
    if name.is_empty() {
        return d65;
    }

    let white = match illuminant::parse_name(name) {
        Ok(IlluminantName::Daylight(cct)) => {
            Some(illuminant::daylight_chromaticity(illuminant::daylight_cct(cct)))
        }
        Ok(IlluminantName::Blackbody(cct)) => {
            Some(aces::xy(temperature::color_temperature_to_xyz(cct as f64)))
        }
        Ok(IlluminantName::Database(kind)) => database
            .find_illuminant(&kind)
            .and_then(|light| {
                let observer = database.load_observer().ok()?;
                illuminant_xyz(&light, &observer)
            })
            .map(aces::xy),
        Err(e) => {
            warn!("{}", e);
            None
        }
    };

    white.unwrap_or_else(|| {
        warn!("Unable to determine the white of illuminant '{}', using D65.", name);
        d65
    })
}

/// XYZ of the illuminant itself, as seen by the observer.
fn illuminant_xyz(light: &SpectralData, observer: &SpectralData) -> Option<[f64; 3]> {
    if light.channels.is_empty() || observer.channels.len() != 3 {
        return None;
    }
    let power = light.resampled(&observer.wavelengths);
    let mut xyz = [0.0f64; 3];
    for (v, cmf) in xyz.iter_mut().zip(observer.channels.iter()) {
        *v = cmf
            .values
            .iter()
            .zip(power.channels[0].values.iter())
            .map(|(a, b)| a * b)
            .sum();
    }
    if xyz[1] > 0.0 {
        Some(xyz)
    } else {
        None
    }
}
