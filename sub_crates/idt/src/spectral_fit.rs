//! IDTs fitted from camera spectral sensitivities.
//!
//! A set of training reflectances is "photographed" under the scene
//! illuminant, both by the camera (via its spectral sensitivities) and by
//! the standard observer.  The observer's colours are adapted to the ACES
//! white and converted to AP0, and a 3x3 matrix mapping the white balanced
//! camera colours onto them is fitted, minimizing CIELAB error.  The
//! matrix rows are constrained to sum to one so that white maps to white.

use colorbox::matrix;
use spectral::SpectralData;

use crate::{aces, linalg, Matrix3};

const MAX_ITERATIONS: usize = 100;
const MAX_DAMPING: f64 = 1.0e10;

/// Camera RGB response to a perfect white reflector under `illuminant`.
pub fn camera_white(camera: &SpectralData, illuminant: &SpectralData) -> Option<[f64; 3]> {
    if camera.channels.len() != 3 || illuminant.channels.is_empty() {
        return None;
    }
    let power = illuminant.resampled(&camera.wavelengths).channels[0]
        .values
        .clone();

    let mut white = [0.0f64; 3];
    for (c, w) in white.iter_mut().enumerate() {
        *w = camera.channels[c]
            .values
            .iter()
            .zip(power.iter())
            .map(|(s, p)| s * p)
            .sum();
    }

    if white.iter().all(|&v| v > 0.0) {
        Some(white)
    } else {
        None
    }
}

/// White balance multipliers for `illuminant`, normalized to green.
pub fn white_balance(camera: &SpectralData, illuminant: &SpectralData) -> Option<[f64; 3]> {
    let white = camera_white(camera, illuminant)?;
    Some([white[1] / white[0], 1.0, white[1] / white[2]])
}

/// Paired camera and ACES colours of the training patches.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    /// White balanced camera RGB.  A perfect white reflector is (1, 1, 1).
    pub camera_rgb: Vec<[f64; 3]>,
    /// ACES2065-1 reference colours.
    pub aces: Vec<[f64; 3]>,
}

/// Builds the training set, everything sampled at the camera's wavelengths.
pub fn training_set(
    camera: &SpectralData,
    illuminant: &SpectralData,
    observer: &SpectralData,
    training: &SpectralData,
) -> Option<TrainingSet> {
    if observer.channels.len() != 3 || training.channels.is_empty() {
        return None;
    }
    let wavelengths = &camera.wavelengths;
    let white = camera_white(camera, illuminant)?;
    let wb = [white[1] / white[0], 1.0, white[1] / white[2]];

    let power = illuminant.resampled(wavelengths).channels[0].values.clone();
    let cmf = observer.resampled(wavelengths);
    let patches = training.resampled(wavelengths);

    let weighted_sum = |reflectance: Option<&[f64]>, curve: &[f64]| -> f64 {
        curve
            .iter()
            .zip(power.iter())
            .enumerate()
            .map(|(i, (s, p))| s * p * reflectance.map(|r| r[i]).unwrap_or(1.0))
            .sum()
    };

    let white_y = weighted_sum(None, &cmf.channels[1].values);
    if !(white_y > 0.0) {
        return None;
    }
    let illuminant_xyz = [
        weighted_sum(None, &cmf.channels[0].values) / white_y,
        1.0,
        weighted_sum(None, &cmf.channels[2].values) / white_y,
    ];
    let to_aces = aces::xyz_to_aces(aces::xy(illuminant_xyz));

    let mut set = TrainingSet {
        camera_rgb: Vec::with_capacity(patches.channels.len()),
        aces: Vec::with_capacity(patches.channels.len()),
    };
    for patch in patches.channels.iter() {
        let reflectance = Some(&patch.values[..]);

        let mut xyz = [0.0f64; 3];
        let mut rgb = [0.0f64; 3];
        for k in 0..3 {
            xyz[k] = weighted_sum(reflectance, &cmf.channels[k].values) / white_y;
            rgb[k] = weighted_sum(reflectance, &camera.channels[k].values) * wb[k] / white[1];
        }

        set.camera_rgb.push(rgb);
        set.aces.push(matrix::transform_color(xyz, to_aces));
    }

    Some(set)
}

/// Fits the IDT for the given camera and illuminant.
pub fn solve_idt(
    camera: &SpectralData,
    illuminant: &SpectralData,
    observer: &SpectralData,
    training: &SpectralData,
) -> Option<Matrix3> {
    let set = training_set(camera, illuminant, observer, training)?;
    fit(&set)
}

/// Fits a row-normalized 3x3 matrix to the training set.
pub fn fit(set: &TrainingSet) -> Option<Matrix3> {
    if set.camera_rgb.len() < 3 || set.camera_rgb.len() != set.aces.len() {
        return None;
    }

    let initial = linear_estimate(set)?;
    let targets: Vec<[f64; 3]> = set.aces.iter().map(|&c| aces_to_lab(c)).collect();
    let residuals = |params: &[f64; 6]| -> Vec<f64> {
        let m = params_to_matrix(params);
        let mut out = Vec::with_capacity(targets.len() * 3);
        for (rgb, target) in set.camera_rgb.iter().zip(targets.iter()) {
            let lab = aces_to_lab(matrix::transform_color(*rgb, m));
            out.extend((0..3).map(|k| lab[k] - target[k]));
        }
        out
    };

    let params = levenberg_marquardt(initial, residuals);
    let m = params_to_matrix(&params);
    if m.iter().flatten().all(|v| v.is_finite()) {
        Some(m)
    } else {
        None
    }
}

fn params_to_matrix(p: &[f64; 6]) -> Matrix3 {
    [
        [p[0], p[1], 1.0 - p[0] - p[1]],
        [p[2], p[3], 1.0 - p[2] - p[3]],
        [p[4], p[5], 1.0 - p[4] - p[5]],
    ]
}

/// Least squares fit in linear RGB, used as the starting point.
fn linear_estimate(set: &TrainingSet) -> Option<[f64; 6]> {
    let mut params = [0.0f64; 6];
    for row in 0..3 {
        let mut a = [[0.0f64; 2]; 2];
        let mut b = [0.0f64; 2];
        for (rgb, target) in set.camera_rgb.iter().zip(set.aces.iter()) {
            let d = [rgb[0] - rgb[2], rgb[1] - rgb[2]];
            let y = target[row] - rgb[2];
            for i in 0..2 {
                for j in 0..2 {
                    a[i][j] += d[i] * d[j];
                }
                b[i] += d[i] * y;
            }
        }
        let solution = linalg::solve(a, b)?;
        params[row * 2] = solution[0];
        params[row * 2 + 1] = solution[1];
    }
    Some(params)
}

fn sum_of_squares(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

fn levenberg_marquardt<F>(initial: [f64; 6], residuals: F) -> [f64; 6]
where
    F: Fn(&[f64; 6]) -> Vec<f64>,
{
    const H: f64 = 1.0e-7;

    let mut params = initial;
    let mut r = residuals(&params);
    let mut cost = sum_of_squares(&r);
    let mut damping = 1.0e-3;

    for _ in 0..MAX_ITERATIONS {
        if !cost.is_finite() || cost == 0.0 {
            break;
        }

        // Forward difference Jacobian.
        let mut jacobian = vec![[0.0f64; 6]; r.len()];
        for k in 0..6 {
            let mut shifted = params;
            shifted[k] += H;
            let rs = residuals(&shifted);
            for (row, (a, b)) in jacobian.iter_mut().zip(rs.iter().zip(r.iter())) {
                row[k] = (a - b) / H;
            }
        }

        let mut jtj = [[0.0f64; 6]; 6];
        let mut jtr = [0.0f64; 6];
        for (row, res) in jacobian.iter().zip(r.iter()) {
            for i in 0..6 {
                for j in 0..6 {
                    jtj[i][j] += row[i] * row[j];
                }
                jtr[i] += row[i] * res;
            }
        }

        let mut improved = false;
        let mut converged = false;
        while damping < MAX_DAMPING {
            let mut a = jtj;
            for k in 0..6 {
                a[k][k] += damping * jtj[k][k].max(1.0e-12);
            }
            if let Some(delta) = linalg::solve(a, jtr.map(|v| -v)) {
                let mut candidate = params;
                for k in 0..6 {
                    candidate[k] += delta[k];
                }
                let rc = residuals(&candidate);
                let candidate_cost = sum_of_squares(&rc);
                if candidate_cost < cost {
                    converged = (cost - candidate_cost) < 1.0e-12 * (1.0 + cost);
                    params = candidate;
                    r = rc;
                    cost = candidate_cost;
                    damping = (damping * 0.1).max(1.0e-12);
                    improved = true;
                    break;
                }
            }
            damping *= 10.0;
        }

        if !improved || converged {
            break;
        }
    }

    params
}

//-------------------------------------------------------------
// CIELAB relative to the ACES white.

fn lab_f(t: f64) -> f64 {
    const DELTA: f64 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

fn aces_to_lab(rgb: [f64; 3]) -> [f64; 3] {
    let xyz = matrix::transform_color(rgb, aces::ap0_to_xyz());
    let white = aces::xyz_from_xy(aces::aces_white());
    let fx = lab_f(xyz[0] / white[0]);
    let fy = lab_f(xyz[1] / white[1]);
    let fz = lab_f(xyz[2] / white[2]);
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

#[cfg(test)]
mod tests {
    use super::*;

    use spectral::{illuminant, standard_wavelengths, Channel, Header};

    fn gaussian(w: f64, center: f64, width: f64) -> f64 {
        let x = (w - center) / width;
        (-0.5 * x * x).exp()
    }

    fn curves(names: &[&str], f: impl Fn(usize, f64) -> f64) -> SpectralData {
        let wavelengths = standard_wavelengths();
        SpectralData {
            header: Header::default(),
            units: "relative".into(),
            channels: names
                .iter()
                .enumerate()
                .map(|(i, name)| Channel {
                    name: name.to_string(),
                    values: wavelengths.iter().map(|&w| f(i, w)).collect(),
                })
                .collect(),
            wavelengths,
        }
    }

    // A rough stand-in for the standard observer.
    fn observer() -> SpectralData {
        curves(&["X", "Y", "Z"], |i, w| match i {
            0 => 1.06 * gaussian(w, 600.0, 38.0) + 0.36 * gaussian(w, 446.0, 19.0),
            1 => gaussian(w, 556.0, 47.0),
            _ => 1.78 * gaussian(w, 449.0, 22.0),
        })
    }

    // A camera whose sensitivities are a linear mix of the observer's.
    fn colorimetric_camera() -> SpectralData {
        let obs = observer();
        let mix = [[0.8, 0.4, -0.1], [-0.2, 1.1, 0.05], [0.05, -0.1, 0.9]];
        curves(&["R", "G", "B"], |i, w| {
            (0..3)
                .map(|k| {
                    let j = obs.wavelengths.iter().position(|&x| x == w).unwrap();
                    mix[i][k] * obs.channels[k].values[j]
                })
                .sum()
        })
    }

    fn training() -> SpectralData {
        let names: Vec<String> = (0..24).map(|i| format!("patch{}", i)).collect();
        let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        curves(&names, |i, w| {
            let center = 400.0 + (i % 8) as f64 * 45.0;
            let width = 30.0 + (i / 8) as f64 * 40.0;
            0.05 + 0.9 * gaussian(w, center, width)
        })
    }

    #[test]
    fn white_balance_flat() {
        let wls = standard_wavelengths();
        let camera = curves(&["R", "G", "B"], |_, _| 1.0);
        let flat = SpectralData::single(Header::default(), wls.clone(), vec![1.0; wls.len()]);
        let wb = white_balance(&camera, &flat).unwrap();
        for v in wb {
            assert!((v - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn white_balance_warm_light() {
        let camera = curves(&["R", "G", "B"], |i, w| {
            gaussian(w, [600.0, 540.0, 450.0][i], 30.0)
        });
        let wb = white_balance(&camera, &illuminant::blackbody(2000, &camera.wavelengths)).unwrap();
        assert!(wb[0] < 1.0);
        assert!(wb[2] > 1.0);
        assert_eq!(wb[1], 1.0);
    }

    #[test]
    fn white_balance_needs_signal() {
        let camera = curves(&["R", "G", "B"], |i, _| if i == 2 { 0.0 } else { 1.0 });
        let wls = standard_wavelengths();
        let flat = SpectralData::single(Header::default(), wls.clone(), vec![1.0; wls.len()]);
        assert!(white_balance(&camera, &flat).is_none());
    }

    #[test]
    fn training_white_is_neutral() {
        let camera = colorimetric_camera();
        let d65 = illuminant::daylight(6500, &camera.wavelengths);
        let white = curves(&["white"], |_, _| 1.0);
        let set = training_set(&camera, &d65, &observer(), &white).unwrap();
        for k in 0..3 {
            assert!((set.camera_rgb[0][k] - 1.0).abs() < 1e-9);
            assert!((set.aces[0][k] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn fit_colorimetric_camera() {
        let camera = colorimetric_camera();
        let d65 = illuminant::daylight(6500, &camera.wavelengths);
        let obs = observer();
        let patches = training();

        let idt = solve_idt(&camera, &d65, &obs, &patches).unwrap();
        for row in idt.iter() {
            assert!((row[0] + row[1] + row[2] - 1.0).abs() < 1e-9);
        }

        // An exact linear relation exists, so the fit must reproduce it.
        let set = training_set(&camera, &d65, &obs, &patches).unwrap();
        for (rgb, expected) in set.camera_rgb.iter().zip(set.aces.iter()) {
            let got = matrix::transform_color(*rgb, idt);
            for k in 0..3 {
                assert!((got[k] - expected[k]).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn fit_needs_patches() {
        let set = TrainingSet {
            camera_rgb: vec![[1.0; 3]],
            aces: vec![[1.0; 3]],
        };
        assert!(fit(&set).is_none());
    }

    #[test]
    fn lab_of_white() {
        let lab = aces_to_lab([1.0, 1.0, 1.0]);
        assert!((lab[0] - 100.0).abs() < 1e-9);
        assert!(lab[1].abs() < 1e-9);
        assert!(lab[2].abs() < 1e-9);
    }
}
