//! Transforms from the colour calibration data embedded in DNG (and
//! DNG-like) metadata.
//!
//! A DNG carries up to two XYZ -> camera matrices, each measured under a
//! calibration illuminant.  The matrix for a given shot is interpolated
//! between them by inverse colour temperature (mired), where the
//! temperature is the one implied by the as-shot neutral.

use colorbox::matrix;
use tracing::warn;

use crate::{
    aces,
    temperature::{
        cct_to_mired, color_temperature_to_xyz, light_source_to_color_temperature,
        xyz_to_color_temperature, MAX_CCT, MIN_CCT,
    },
    Matrix3,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// EXIF `LightSource` value of the calibration illuminant.
    pub illuminant: u16,
    /// XYZ -> camera RGB, including any per-unit camera calibration.
    pub xyz_to_camera: Matrix3,
}

/// The colour-relevant metadata of a single image.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub calibrations: Vec<Calibration>,
    /// Camera RGB of a neutral (white) object in the scene.
    pub neutral: Option<[f64; 3]>,
}

/// Linearly blends two matrices by mired.
///
/// `mired1` and `mired2` are the mireds of `m1` and `m2`.  The blend is
/// clamped to the range between them.
pub fn weighted_matrix(mired: f64, mired1: f64, mired2: f64, m1: Matrix3, m2: Matrix3) -> Matrix3 {
    if mired1 == mired2 {
        return m1;
    }
    let weight = ((mired1 - mired) / (mired1 - mired2)).clamp(0.0, 1.0);

    let mut out = m1;
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = m1[i][j] + weight * (m2[i][j] - m1[i][j]);
        }
    }
    out
}

/// Finds the XYZ -> camera matrix matching the profile's neutral.
///
/// Steps through the mired range spanned by the two calibrations, and
/// picks the blend whose implied white has the same temperature as the
/// blend itself.
pub fn find_xyz_to_camera_matrix(profile: &Profile) -> Option<Matrix3> {
    let first = profile.calibrations.first()?;

    if first.illuminant == 0 {
        warn!("No calibration illuminants were found.");
        return Some(first.xyz_to_camera);
    }
    let neutral = match profile.neutral {
        Some(neutral) => neutral,
        None => {
            warn!("No neutral RGB values were found.");
            return Some(first.xyz_to_camera);
        }
    };
    let second = match profile.calibrations.get(1) {
        Some(second) => second,
        None => return Some(first.xyz_to_camera),
    };

    let mired1 = cct_to_mired(light_source_to_color_temperature(first.illuminant));
    let mired2 = cct_to_mired(light_source_to_color_temperature(second.illuminant));
    let blend = |mired: f64| {
        weighted_matrix(
            mired,
            mired1,
            mired2,
            first.xyz_to_camera,
            second.xyz_to_camera,
        )
    };

    let max_mired = cct_to_mired(MIN_CCT);
    let min_mired = cct_to_mired(MAX_CCT);
    let low = mired1.min(mired2).clamp(min_mired, max_mired);
    let high = mired1.max(mired2).clamp(min_mired, max_mired);
    let step = ((high - low) / 50.0).max(5.0);

    let mut estimate = 0.0;
    let mut smallest_error = 0.0f64;
    let mut last_error = 0.0;
    let mut last_mired = 0.0;
    let mut mired = low;
    while mired < high {
        let camera_to_xyz = matrix::invert(blend(mired))?;
        let white = matrix::transform_color(neutral, camera_to_xyz);
        let error = mired - cct_to_mired(xyz_to_color_temperature(white));

        if error.abs() <= 1e-9 {
            estimate = mired;
            break;
        }
        let first_step = (mired - low).abs() <= 1e-9;
        if !first_step && error * last_error <= 0.0 {
            estimate = mired + error / (error - last_error) * (mired - last_mired);
            break;
        }
        if first_step || error.abs() < smallest_error.abs() {
            estimate = mired;
            smallest_error = error;
        }

        last_error = error;
        last_mired = mired;
        mired += step;
    }

    Some(blend(estimate))
}

/// XYZ of the scene white, normalized to Y = 1.
///
/// Comes from the neutral through the matching calibration matrix, or
/// from the first calibration illuminant when there is no neutral.
pub fn camera_white(profile: &Profile) -> Option<[f64; 3]> {
    let xyz_to_camera = find_xyz_to_camera_matrix(profile)?;
    let white = match profile.neutral {
        Some(neutral) => matrix::transform_color(neutral, matrix::invert(xyz_to_camera)?),
        None => {
            let illuminant = profile.calibrations.first()?.illuminant;
            color_temperature_to_xyz(light_source_to_color_temperature(illuminant))
        }
    };
    if !(white[1] > 0.0) || white.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(white.map(|v| v / white[1]))
}

/// Chromatic adaptation from the camera white to the ACES white.
pub fn cat_matrix(profile: &Profile) -> Option<Matrix3> {
    aces::cat02(camera_white(profile)?, aces::white_xyz())
}

/// IDT from the profile's calibration data.
///
/// The IDT takes XYZ, as produced by `camera_to_xyz()`, to ACES2065-1,
/// adapting the scene white to the ACES white on the way.
pub fn idt_matrix(profile: &Profile) -> Option<Matrix3> {
    Some(matrix::compose(&[cat_matrix(profile)?, aces::XYZ_D65_TO_AP0]))
}

/// White balanced camera RGB to XYZ, using the calibration blend that
/// matches the profile's neutral.
pub fn camera_to_xyz(profile: &Profile) -> Option<Matrix3> {
    aces::camera_to_xyz(find_xyz_to_camera_matrix(profile)?)
}
