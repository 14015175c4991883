//! Correlated colour temperature, using Robertson's isotemperature lines
//! in the CIE 1960 UCS.

// Mired values of the isotemperature lines.  The first entry stands in
// for infinite temperature.
#[rustfmt::skip]
const ROBERTSON_MIRED: [f64; 31] = [
    1.0e-10, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0,
    125.0, 150.0, 175.0, 200.0, 225.0, 250.0, 275.0, 300.0, 325.0, 350.0,
    375.0, 400.0, 425.0, 450.0, 475.0, 500.0, 525.0, 550.0, 575.0, 600.0,
];

// (u, v, slope) for each isotemperature line.
#[rustfmt::skip]
const ROBERTSON_UVT: [[f64; 3]; 31] = [
    [0.18006, 0.26352, -0.24341], [0.18066, 0.26589, -0.25479],
    [0.18133, 0.26846, -0.26876], [0.18208, 0.27119, -0.28539],
    [0.18293, 0.27407, -0.30470], [0.18388, 0.27709, -0.32675],
    [0.18494, 0.28021, -0.35156], [0.18611, 0.28342, -0.37915],
    [0.18740, 0.28668, -0.40955], [0.18880, 0.28997, -0.44278],
    [0.19032, 0.29326, -0.47888], [0.19462, 0.30141, -0.58204],
    [0.19962, 0.30921, -0.70471], [0.20525, 0.31647, -0.84901],
    [0.21142, 0.32312, -1.0182], [0.21807, 0.32909, -1.2168],
    [0.22511, 0.33439, -1.4512], [0.23247, 0.33904, -1.7298],
    [0.24010, 0.34308, -2.0637], [0.24792, 0.34655, -2.4681],
    [0.25591, 0.34951, -2.9641], [0.26400, 0.35200, -3.5814],
    [0.27218, 0.35407, -4.3633], [0.28039, 0.35577, -5.3762],
    [0.28863, 0.35714, -6.7262], [0.29685, 0.35823, -8.5955],
    [0.30505, 0.35907, -11.324], [0.31320, 0.35968, -15.628],
    [0.32129, 0.36011, -23.325], [0.32931, 0.36038, -40.770],
    [0.33724, 0.36051, -116.45],
];

pub const MIN_CCT: f64 = 2000.0;
pub const MAX_CCT: f64 = 50000.0;

pub fn cct_to_mired(cct: f64) -> f64 {
    1.0e6 / cct
}

/// Colour temperature for an EXIF/DNG `LightSource` tag value.
///
/// Values of 32768 and above encode a temperature in kelvin directly.
pub fn light_source_to_color_temperature(tag: u16) -> f64 {
    if tag >= 32768 {
        return (tag - 32768) as f64;
    }

    match tag {
        0 | 1 | 4 | 9 | 20 => 5500.0,
        2 => 3500.0,
        3 => 3400.0,
        10 => 5550.0,
        11 | 22 => 7500.0,
        12 => 6430.0,
        13 | 23 => 5000.0,
        14 => 4150.0,
        15 => 3525.0,
        16 => 2925.0,
        17 => 2856.0,
        18 => 4874.0,
        19 => 6774.0,
        21 => 6500.0,
        24 => 3200.0,
        _ => 5500.0,
    }
}

/// Signed distance of `uv` from an isotemperature line.
pub fn robertson_length(uv: [f64; 2], uvt: [f64; 3]) -> f64 {
    let t = uvt[2];
    let sign = if t < 0.0 {
        -1.0
    } else if t > 0.0 {
        1.0
    } else {
        0.0
    };
    let slope0 = -sign / (1.0 + t * t).sqrt();
    let slope1 = t * slope0;
    let d0 = uv[0] - uvt[0];
    let d1 = uv[1] - uvt[1];
    slope0 * d1 - slope1 * d0
}

/// CIE 1960 UCS coordinates of an XYZ colour.
pub fn xyz_to_uv(xyz: [f64; 3]) -> [f64; 2] {
    let s = xyz[0] + 15.0 * xyz[1] + 3.0 * xyz[2];
    [4.0 * xyz[0] / s, 6.0 * xyz[1] / s]
}

/// xyz chromaticity (summing to one) of CIE 1960 UCS coordinates.
pub fn uv_to_xyz(uv: [f64; 2]) -> [f64; 3] {
    let d = 2.0 * uv[0] - 8.0 * uv[1] + 4.0;
    let x = 3.0 * uv[0] / d;
    let y = 2.0 * uv[1] / d;
    [x, y, 1.0 - x - y]
}

/// Correlated colour temperature of an XYZ colour, clamped to
/// `[MIN_CCT, MAX_CCT]`.
pub fn xyz_to_color_temperature(xyz: [f64; 3]) -> f64 {
    let uv = xyz_to_uv(xyz);
    let n = ROBERTSON_UVT.len();

    let mut i = 0;
    let mut distance = 0.0;
    let mut last_distance = 0.0;
    while i < n {
        distance = robertson_length(uv, ROBERTSON_UVT[i]);
        if distance <= 0.0 {
            break;
        }
        last_distance = distance;
        i += 1;
    }

    let mired = if i == 0 {
        ROBERTSON_MIRED[0]
    } else if i >= n {
        ROBERTSON_MIRED[n - 1]
    } else {
        ROBERTSON_MIRED[i - 1]
            + last_distance * (ROBERTSON_MIRED[i] - ROBERTSON_MIRED[i - 1])
                / (last_distance - distance)
    };

    (1.0e6 / mired).clamp(MIN_CCT, MAX_CCT)
}

/// xyz chromaticity of the Planckian locus point at the given temperature.
pub fn color_temperature_to_xyz(cct: f64) -> [f64; 3] {
    let mired = cct_to_mired(cct);
    let n = ROBERTSON_MIRED.len();

    let i = ROBERTSON_MIRED
        .iter()
        .position(|&m| m >= mired)
        .unwrap_or(n - 1)
        .max(1);
    let alpha = ((mired - ROBERTSON_MIRED[i - 1]) / (ROBERTSON_MIRED[i] - ROBERTSON_MIRED[i - 1]))
        .clamp(0.0, 1.0);

    let a = ROBERTSON_UVT[i - 1];
    let b = ROBERTSON_UVT[i];
    uv_to_xyz([a[0] + (b[0] - a[0]) * alpha, a[1] + (b[1] - a[1]) * alpha])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_close(a: f64, b: f64, thresh: f64) -> bool {
        (a - b).abs() < thresh
    }

    #[test]
    fn mired() {
        assert!(is_close(cct_to_mired(6500.0), 153.8461538462, 1e-9));
        assert!(is_close(cct_to_mired(2000.0), 500.0, 1e-9));
    }

    #[test]
    fn light_sources() {
        assert_eq!(light_source_to_color_temperature(17), 2856.0);
        assert_eq!(light_source_to_color_temperature(21), 6500.0);
        assert_eq!(light_source_to_color_temperature(0), 5500.0);
        assert_eq!(light_source_to_color_temperature(200), 5500.0);
        assert_eq!(light_source_to_color_temperature(32768 + 3200), 3200.0);
    }

    #[test]
    fn robertson_distance() {
        let uv = [0.2042589852, 0.3196233991];
        assert!(is_close(
            robertson_length(uv, ROBERTSON_UVT[0]),
            0.060234937,
            1e-8
        ));
    }

    #[test]
    fn uv_round_trip() {
        let xyz = [0.9504, 1.0, 1.0888];
        let uv = xyz_to_uv(xyz);
        let chroma = uv_to_xyz(uv);
        let sum = xyz[0] + xyz[1] + xyz[2];
        for i in 0..3 {
            assert!(is_close(chroma[i], xyz[i] / sum, 1e-9));
        }
    }

    #[test]
    fn xyz_to_cct() {
        let cct = xyz_to_color_temperature([0.9731171910, 1.0174927152, 0.9498565880]);
        assert!(is_close(cct, 5564.6648, 1e-3));
    }

    #[test]
    fn xyz_to_cct_clamps() {
        // Deep blue, hotter than the table covers.
        assert_eq!(xyz_to_color_temperature([0.2, 0.2, 1.0]), MAX_CCT);
        // Deep orange, colder than the table covers.
        assert_eq!(xyz_to_color_temperature([1.0, 0.7, 0.05]), MIN_CCT);
    }

    #[test]
    fn cct_to_xyz() {
        let xyz = color_temperature_to_xyz(6500.0);
        assert!(is_close(xyz[0], 0.3135279229, 1e-8));
        assert!(is_close(xyz[1], 0.3235340821, 1e-8));
        assert!(is_close(xyz[2], 0.3629379950, 1e-8));

        let a = color_temperature_to_xyz(2856.0);
        assert!(is_close(a[0] / a[1], 1.098445, 1e-4));
        assert!(is_close(a[2] / a[1], 0.355920, 1e-4));
    }

    #[test]
    fn cct_round_trip() {
        for cct in [2500.0, 4000.0, 5500.0, 9000.0] {
            let back = xyz_to_color_temperature(color_temperature_to_xyz(cct));
            assert!(is_close(back, cct, cct * 0.01));
        }
    }
}
