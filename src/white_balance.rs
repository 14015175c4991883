//! White balance multipliers.
//!
//! All methods except `Custom` normalize green to 1.0.  A fourth
//! multiplier of 0 means "same as green".

use spectral::{illuminant, Database, SpectralData};
use tracing::{info, warn};

use crate::{
    cache::{Caches, IlluminantKey},
    metadata::CameraMetadata,
    pipeline::RawFrame,
    settings::{Settings, WbMethod},
};

/// Computes the multipliers with the method selected in `settings`.
///
/// `frame` is the normalized sensor data, needed only by `WbMethod::Box`.
/// Returns `None` when the method's inputs are unavailable.
pub fn calculate(
    settings: &Settings,
    metadata: &CameraMetadata,
    database: &Database,
    frame: Option<&RawFrame>,
    caches: &mut Caches,
) -> Option<[f64; 4]> {
    match settings.wb_method {
        WbMethod::Metadata => {
            let wb = metadata.as_shot_multipliers();
            if wb.is_none() {
                warn!("The file has no as-shot white balance.");
            }
            wb
        }

        WbMethod::Illuminant => {
            if settings.illuminant.is_empty() {
                warn!("The illuminant white balance method needs an illuminant name.");
                return None;
            }
            let key = IlluminantKey {
                make: metadata.make.clone(),
                model: metadata.model.clone(),
                illuminant: settings.illuminant.to_lowercase(),
            };
            caches.illuminant_wb.fetch(key, || {
                let camera = find_camera(database, metadata)?;
                let light = match illuminant::resolve(&settings.illuminant, database, &camera.wavelengths)
                {
                    Ok(light) => light,
                    Err(e) => {
                        warn!("{}", e);
                        return None;
                    }
                };
                let wb = idt::spectral_fit::white_balance(&camera, &light)?;
                Some([wb[0], wb[1], wb[2], 0.0])
            })
        }

        WbMethod::Box => {
            let frame = frame?;
            let average = frame.box_average(settings.wb_box())?;
            from_average(average)
        }

        WbMethod::Custom => Some(settings.custom_wb().map(|v| v as f64)),
    }
}

/// Multipliers that make the given per-colour averages neutral.
pub fn from_average(average: [f64; 4]) -> Option<[f64; 4]> {
    if average[..3].iter().any(|&v| !(v > 0.0)) {
        return None;
    }
    let green = average[1];
    let fourth = if average[3] > 0.0 {
        green / average[3]
    } else {
        0.0
    };
    Some([green / average[0], 1.0, green / average[2], fourth])
}

/// Looks up the camera's spectral sensitivities, logging a warning if
/// there are none.
pub fn find_camera(database: &Database, metadata: &CameraMetadata) -> Option<SpectralData> {
    let camera = database.find_camera(&metadata.make, &metadata.model);
    if camera.is_none() {
        warn!(
            "Failed to find spectral data for camera make: '{}', model: '{}'",
            metadata.make, metadata.model
        );
    }
    camera
}

/// Candidate illuminants for `detect_illuminant()`, sampled at
/// `wavelengths`.
pub fn candidate_illuminants(database: &Database, wavelengths: &[f64]) -> Vec<SpectralData> {
    let mut candidates: Vec<SpectralData> = (1500..=3500)
        .step_by(500)
        .map(|cct| illuminant::blackbody(cct, wavelengths))
        .collect();
    candidates.extend(
        (4000..=25000)
            .step_by(500)
            .map(|cct| illuminant::daylight(cct, wavelengths)),
    );
    candidates.extend(database.illuminants());
    candidates
}

/// Finds the illuminant under which the camera's white balance is closest
/// to `wb`.
pub fn detect_illuminant(
    camera: &SpectralData,
    wb: [f64; 4],
    database: &Database,
) -> Option<SpectralData> {
    if !(wb[1] > 0.0) {
        return None;
    }
    let target = [wb[0] / wb[1], 1.0, wb[2] / wb[1]];

    let mut best: Option<(f64, SpectralData)> = None;
    for candidate in candidate_illuminants(database, &camera.wavelengths) {
        let candidate_wb = match idt::spectral_fit::white_balance(camera, &candidate) {
            Some(wb) => wb,
            None => continue,
        };
        let error: f64 = target
            .iter()
            .zip(candidate_wb.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        if best.as_ref().map_or(true, |(e, _)| error < *e) {
            best = Some((error, candidate));
        }
    }

    let (_, found) = best?;
    info!("Found illuminant: '{}'", found.header.kind);
    Some(found)
}
