//! ACES2065-1 (AP0 primaries) target space, and the transforms that only
//! need white points and a camera colour matrix.

use colorbox::{
    chroma,
    matrix::{self, AdaptationMethod},
};

use crate::Matrix3;

/// XYZ (D65) to ACES2065-1.
#[rustfmt::skip]
pub const XYZ_D65_TO_AP0: Matrix3 = [
    [ 1.0634731317, 0.0063979364, -0.0157891875],
    [-0.4920827847, 1.3682370931,  0.0913444629],
    [-0.0028137154, 0.0046399117,  0.9164946852],
];

// CIECAM02 cone response.
#[rustfmt::skip]
const CAT02: Matrix3 = [
    [ 0.7328, 0.4296, -0.1624],
    [-0.7036, 1.6975,  0.0061],
    [ 0.0030, 0.0136,  0.9834],
];

/// Chromaticity of the ACES white point.
pub fn aces_white() -> (f64, f64) {
    chroma::ACES_AP0.w
}

pub fn ap0_to_xyz() -> Matrix3 {
    matrix::rgb_to_xyz_matrix(chroma::ACES_AP0)
}

pub fn xyz_to_ap0() -> Matrix3 {
    matrix::xyz_to_rgb_matrix(chroma::ACES_AP0)
}

/// XYZ of ACES2065-1 (1, 1, 1).
pub fn white_xyz() -> [f64; 3] {
    matrix::transform_color([1.0, 1.0, 1.0], ap0_to_xyz())
}

/// xy chromaticity of an XYZ colour.
pub fn xy(xyz: [f64; 3]) -> (f64, f64) {
    let sum = xyz[0] + xyz[1] + xyz[2];
    (xyz[0] / sum, xyz[1] / sum)
}

/// XYZ of a chromaticity, with Y = 1.
pub fn xyz_from_xy(white: (f64, f64)) -> [f64; 3] {
    let (x, y) = white;
    [x / y, 1.0, (1.0 - x - y) / y]
}

/// Bradford chromatic adaptation between two white points, in XYZ.
pub fn bradford(from: (f64, f64), to: (f64, f64)) -> Matrix3 {
    matrix::xyz_chromatic_adaptation_matrix(from, to, AdaptationMethod::Bradford)
}

/// CAT02 von Kries adaptation between two XYZ whites.
pub fn cat02(from: [f64; 3], to: [f64; 3]) -> Option<Matrix3> {
    let source = matrix::transform_color(from, CAT02);
    let target = matrix::transform_color(to, CAT02);
    let scale = [
        target[0] / source[0],
        target[1] / source[1],
        target[2] / source[2],
    ];
    if scale.iter().any(|s| !s.is_finite()) {
        return None;
    }
    Some(matrix::compose(&[
        CAT02,
        matrix::scale_matrix(scale),
        matrix::invert(CAT02)?,
    ]))
}

/// XYZ under the given white to ACES2065-1.
pub fn xyz_to_aces(white: (f64, f64)) -> Matrix3 {
    matrix::compose(&[bradford(white, aces_white()), xyz_to_ap0()])
}

/// Multiplies each row of `m` by the matching entry of `s`, i.e. `diag(s) * m`.
pub fn scale_rows(m: Matrix3, s: [f64; 3]) -> Matrix3 {
    let mut out = m;
    for (row, factor) in out.iter_mut().zip(s) {
        for v in row.iter_mut() {
            *v *= factor;
        }
    }
    out
}

/// White balanced camera RGB to XYZ, from an XYZ (D65) -> camera RGB
/// matrix.
///
/// The matrix is first normalized so that D65 white maps to camera RGB of
/// (1, 1, 1), so (1, 1, 1) comes back out as D65 white.
pub fn camera_to_xyz(xyz_to_camera: Matrix3) -> Option<Matrix3> {
    let camera_white = matrix::transform_color(xyz_from_xy(chroma::illuminant::D65), xyz_to_camera);
    if camera_white.iter().any(|&c| !(c > 0.0)) {
        return None;
    }

    let normalized = scale_rows(
        xyz_to_camera,
        [
            1.0 / camera_white[0],
            1.0 / camera_white[1],
            1.0 / camera_white[2],
        ],
    );
    matrix::invert(normalized)
}

/// IDT from a camera's XYZ (D65) to camera RGB matrix, e.g. the per-model
/// tables shipped with raw decoders.  Expects white balanced input.
pub fn adobe_idt(xyz_to_camera: Matrix3) -> Option<Matrix3> {
    Some(matrix::compose(&[
        camera_to_xyz(xyz_to_camera)?,
        xyz_to_aces(chroma::illuminant::D65),
    ]))
}

/// Chromatic adaptation of AP0 RGB from the given white to the ACES white.
///
/// Used when no camera specific transform can be derived: the camera
/// data is then treated as already being in AP0 primaries.
pub fn generic_cat(source_white: (f64, f64)) -> Matrix3 {
    matrix::compose(&[
        ap0_to_xyz(),
        bradford(source_white, aces_white()),
        xyz_to_ap0(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::IDENTITY;

    fn is_close(a: f64, b: f64, thresh: f64) -> bool {
        (a - b).abs() < thresh
    }

    fn assert_matrix_close(a: Matrix3, b: Matrix3, thresh: f64) {
        for i in 0..3 {
            for j in 0..3 {
                assert!(is_close(a[i][j], b[i][j], thresh), "{:?} != {:?}", a, b);
            }
        }
    }

    #[test]
    fn ap0_matrices() {
        let expected = [
            [0.952552395938, 0.0, 0.000093678632],
            [0.343966449765, 0.728166096613, -0.072132546379],
            [0.0, 0.0, 1.008825184352],
        ];
        assert_matrix_close(ap0_to_xyz(), expected, 1e-6);
        assert_matrix_close(
            matrix::compose(&[ap0_to_xyz(), xyz_to_ap0()]),
            IDENTITY,
            1e-9,
        );
    }

    #[test]
    fn aces_white_maps_to_unit_rgb() {
        let rgb = matrix::transform_color(xyz_from_xy(aces_white()), xyz_to_ap0());
        for c in rgb {
            assert!(is_close(c, 1.0, 1e-9));
        }
    }

    #[test]
    fn chromaticity_round_trip() {
        let (x, y) = xy(xyz_from_xy((0.3127, 0.3290)));
        assert!(is_close(x, 0.3127, 1e-12));
        assert!(is_close(y, 0.3290, 1e-12));
    }

    #[test]
    fn adobe_idt_preserves_white() {
        // A plausible camera matrix (Canon EOS 5D Mark II, scaled by 1/10000).
        let xyz_to_camera = [
            [0.4716, 0.0603, -0.0830],
            [-0.7798, 1.5474, 0.2480],
            [-0.1496, 0.1937, 0.6651],
        ];
        let idt = adobe_idt(xyz_to_camera).unwrap();
        let white = matrix::transform_color([1.0, 1.0, 1.0], idt);
        for c in white {
            assert!(is_close(c, 1.0, 1e-9));
        }
    }

    #[test]
    fn adobe_idt_rejects_degenerate() {
        assert!(adobe_idt([[0.0; 3]; 3]).is_none());
    }

    #[test]
    fn cat02_adapts_white() {
        let a = [1.098445424569, 1.0, 0.355920076967];
        let cat = cat02(a, white_xyz()).unwrap();
        let adapted = matrix::transform_color(a, cat);
        let white = white_xyz();
        for i in 0..3 {
            assert!(is_close(adapted[i], white[i], 1e-9));
        }
        assert_matrix_close(cat02(white, white).unwrap(), IDENTITY, 1e-9);
        assert!(cat02([0.0; 3], white).is_none());
    }

    #[test]
    fn d65_matrix_is_close_to_bradford() {
        // The fixed matrix agrees with a Bradford adaptation from D65 to
        // the ACES white to within rounding of the published values.
        let computed = xyz_to_aces(chroma::illuminant::D65);
        assert_matrix_close(computed, XYZ_D65_TO_AP0, 2e-3);
    }

    #[test]
    fn generic_cat_identity_at_aces_white() {
        assert_matrix_close(generic_cat(aces_white()), IDENTITY, 1e-9);
    }

    #[test]
    fn generic_cat_adapts_white() {
        let d65 = chroma::illuminant::D65;
        let cat = generic_cat(d65);
        let d65_rgb = matrix::transform_color(xyz_from_xy(d65), xyz_to_ap0());
        let adapted = matrix::transform_color(d65_rgb, cat);
        for c in adapted {
            assert!(is_close(c, 1.0, 1e-9));
        }
    }
}
