//! Illuminant naming and synthesis.
//!
//! Names of the form "D<n>" (e.g. "D60", "D6025") denote CIE daylight and
//! names of the form "<n>K" (e.g. "3200K") denote a Planckian radiator.
//! Anything else is looked up by type in the database.

use crate::{Database, Error, Header, SpectralData};

pub const DAYLIGHT_DESCRIPTION: &str = "Day-light (e.g., D60, D6025)";
pub const BLACKBODY_DESCRIPTION: &str = "Blackbody (e.g., 3200K)";

/// The illuminant families that are always available.
pub const BUILT_IN: [&str; 2] = [DAYLIGHT_DESCRIPTION, BLACKBODY_DESCRIPTION];

pub const DAYLIGHT_CCT_RANGE: (u32, u32) = (4000, 25000);
pub const BLACKBODY_CCT_RANGE: (u32, u32) = (1500, 3999);

/// Converts the nominal temperature of daylight illuminants to the value
/// on the current radiation constant scale, e.g. D65 -> 6503.6K.
const DAYLIGHT_CCT_CORRECTION: f64 = 1.4388 / 1.4380;

#[derive(Debug, Clone, PartialEq)]
pub enum IlluminantName {
    Daylight(u32),
    Blackbody(u32),
    Database(String),
}

/// Parses an illuminant name, validating built-in temperature ranges.
pub fn parse_name(name: &str) -> Result<IlluminantName, Error> {
    let lower = name.trim().to_lowercase();

    if let Some(n) = lower.strip_prefix('d').and_then(parse_digits) {
        let cct = if (40..=250).contains(&n) { n * 100 } else { n };
        if cct < DAYLIGHT_CCT_RANGE.0 || cct > DAYLIGHT_CCT_RANGE.1 {
            return Err(Error::OutOfRange(
                "The range of Correlated Color Temperature for Day Light should be from 4000 to 25000"
                    .into(),
            ));
        }
        return Ok(IlluminantName::Daylight(cct));
    }

    if let Some(n) = lower.strip_suffix('k').and_then(parse_digits) {
        if n < BLACKBODY_CCT_RANGE.0 || n > BLACKBODY_CCT_RANGE.1 {
            return Err(Error::OutOfRange(
                "The range of Color Temperature for BlackBody should be from 1500 to 3999".into(),
            ));
        }
        return Ok(IlluminantName::Blackbody(n));
    }

    Ok(IlluminantName::Database(lower))
}

fn parse_digits(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Resolves an illuminant name to its spectral power distribution.  Built-in
/// illuminants are sampled at `wavelengths`, database ones are returned as
/// stored.
pub fn resolve(name: &str, database: &Database, wavelengths: &[f64]) -> Result<SpectralData, Error> {
    match parse_name(name)? {
        IlluminantName::Daylight(cct) => Ok(daylight(cct, wavelengths)),
        IlluminantName::Blackbody(cct) => Ok(blackbody(cct, wavelengths)),
        IlluminantName::Database(kind) => database.find_illuminant(&kind).ok_or_else(|| {
            Error::NotFound(format!("Failed to find illuminant type = '{}'", kind))
        }),
    }
}

//-------------------------------------------------------------
// CIE daylight.

// S0, S1, S2 daylight components at 10nm intervals from 380nm to 780nm.
const DAYLIGHT_START: f64 = 380.0;
const DAYLIGHT_STEP: f64 = 10.0;
#[rustfmt::skip]
const DAYLIGHT_COMPONENTS: [[f64; 3]; 41] = [
    [63.4, 38.5, 3.0], [65.8, 35.0, 1.2], [94.8, 43.4, -1.1], [104.8, 46.3, -0.5],
    [105.9, 43.9, -0.7], [96.8, 37.1, -1.2], [113.9, 36.7, -2.6], [125.6, 35.9, -2.9],
    [125.5, 32.6, -2.8], [121.3, 27.9, -2.6], [121.3, 24.3, -2.6], [113.5, 20.1, -1.8],
    [113.1, 16.2, -1.5], [110.8, 13.2, -1.3], [106.5, 8.6, -1.2], [108.8, 6.1, -1.0],
    [105.3, 4.2, -0.5], [104.4, 1.9, -0.3], [100.0, 0.0, 0.0], [96.0, -1.6, 0.2],
    [95.1, -3.5, 0.5], [89.1, -3.5, 2.1], [90.5, -5.8, 3.2], [90.3, -7.2, 4.1],
    [88.4, -8.6, 4.7], [84.0, -9.5, 5.1], [85.1, -10.9, 6.7], [81.9, -10.7, 7.3],
    [82.6, -12.0, 8.6], [84.9, -14.0, 9.8], [81.3, -13.6, 10.2], [71.9, -12.0, 8.3],
    [74.3, -13.3, 9.6], [76.4, -12.9, 8.5], [63.3, -10.6, 7.0], [71.7, -11.6, 7.6],
    [77.0, -12.2, 8.0], [65.2, -10.2, 6.7], [47.7, -7.8, 5.2], [68.6, -11.2, 7.4],
    [65.0, -10.4, 6.8],
];

/// CIE daylight chromaticity for the given (already corrected) temperature.
pub fn daylight_chromaticity(cct: f64) -> (f64, f64) {
    let t = cct;
    let x = if t <= 7000.0 {
        -4.6070e9 / (t * t * t) + 2.9678e6 / (t * t) + 0.09911e3 / t + 0.244063
    } else {
        -2.0064e9 / (t * t * t) + 1.9018e6 / (t * t) + 0.24748e3 / t + 0.237040
    };
    let y = -3.0 * x * x + 2.87 * x - 0.275;
    (x, y)
}

/// The corrected temperature used for a nominal daylight temperature.
pub fn daylight_cct(nominal: u32) -> f64 {
    nominal as f64 * DAYLIGHT_CCT_CORRECTION
}

fn daylight_component(index: usize, wavelength: f64) -> f64 {
    let pos = (wavelength - DAYLIGHT_START) / DAYLIGHT_STEP;
    let last = DAYLIGHT_COMPONENTS.len() - 1;
    if pos < 0.0 || pos > last as f64 {
        return 0.0;
    }
    let i = (pos.floor() as usize).min(last - 1);
    let alpha = pos - i as f64;
    let a = DAYLIGHT_COMPONENTS[i][index];
    let b = DAYLIGHT_COMPONENTS[i + 1][index];
    a + ((b - a) * alpha)
}

/// Short name of a daylight illuminant, e.g. "d65" or "d6025".
pub fn daylight_name(nominal_cct: u32) -> String {
    if nominal_cct % 100 == 0 {
        format!("d{}", nominal_cct / 100)
    } else {
        format!("d{}", nominal_cct)
    }
}

/// CIE daylight spectral power distribution for a nominal temperature,
/// e.g. 6500 for D65.
pub fn daylight(nominal_cct: u32, wavelengths: &[f64]) -> SpectralData {
    let (x, y) = daylight_chromaticity(daylight_cct(nominal_cct));
    let m = 0.0241 + 0.2562 * x - 0.7341 * y;
    let m1 = (-1.3515 - 1.7703 * x + 5.9114 * y) / m;
    let m2 = (0.0300 - 31.4424 * x + 30.0717 * y) / m;

    let values = wavelengths
        .iter()
        .map(|&w| {
            daylight_component(0, w) + m1 * daylight_component(1, w) + m2 * daylight_component(2, w)
        })
        .collect();

    SpectralData::single(
        Header {
            kind: daylight_name(nominal_cct),
            description: format!("CIE daylight {}K", nominal_cct),
            ..Header::default()
        },
        wavelengths.to_vec(),
        values,
    )
}

//-------------------------------------------------------------
// Planckian radiator.

const PLANCK_C1: f64 = 3.741771852e-16;
const PLANCK_C2: f64 = 1.438776877e-2;

fn planck(wavelength_nm: f64, cct: f64) -> f64 {
    let lambda = wavelength_nm * 1.0e-9;
    PLANCK_C1 / (lambda.powi(5) * ((PLANCK_C2 / (lambda * cct)).exp() - 1.0))
}

/// Blackbody spectral power distribution, normalized to 1.0 at 560nm.
pub fn blackbody(cct: u32, wavelengths: &[f64]) -> SpectralData {
    let t = cct as f64;
    let norm = 1.0 / planck(560.0, t);
    let values = wavelengths.iter().map(|&w| planck(w, t) * norm).collect();

    SpectralData::single(
        Header {
            kind: format!("{}k", cct),
            description: format!("Blackbody {}K", cct),
            ..Header::default()
        },
        wavelengths.to_vec(),
        values,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::standard_wavelengths;

    #[test]
    fn parse_daylight() {
        assert_eq!(parse_name("D65").unwrap(), IlluminantName::Daylight(6500));
        assert_eq!(parse_name("d60").unwrap(), IlluminantName::Daylight(6000));
        assert_eq!(parse_name("D6025").unwrap(), IlluminantName::Daylight(6025));
        assert_eq!(parse_name("d250").unwrap(), IlluminantName::Daylight(25000));
    }

    #[test]
    fn parse_daylight_out_of_range() {
        let err = parse_name("D30").unwrap_err();
        assert!(matches!(err, Error::OutOfRange(_)));
        assert_eq!(
            err.to_string(),
            "The range of Correlated Color Temperature for Day Light should be from 4000 to 25000"
        );
        assert!(parse_name("d3999").is_err());
        assert!(parse_name("d25001").is_err());
    }

    #[test]
    fn parse_blackbody() {
        assert_eq!(parse_name("3200K").unwrap(), IlluminantName::Blackbody(3200));
        assert_eq!(parse_name("1500k").unwrap(), IlluminantName::Blackbody(1500));

        let err = parse_name("4000K").unwrap_err();
        assert_eq!(
            err.to_string(),
            "The range of Color Temperature for BlackBody should be from 1500 to 3999"
        );
        assert!(parse_name("1499K").is_err());
    }

    #[test]
    fn parse_database_names() {
        assert_eq!(
            parse_name("ISO7589").unwrap(),
            IlluminantName::Database("iso7589".into())
        );
        assert_eq!(
            parse_name("dusk").unwrap(),
            IlluminantName::Database("dusk".into())
        );
        assert_eq!(parse_name("k").unwrap(), IlluminantName::Database("k".into()));
    }

    #[test]
    fn resolve_unknown() {
        let db = Database::new(Vec::new());
        let err = resolve("tungsten", &db, &standard_wavelengths()).unwrap_err();
        assert_eq!(err.to_string(), "Failed to find illuminant type = 'tungsten'");
    }

    #[test]
    fn daylight_chromaticity_d65() {
        let (x, y) = daylight_chromaticity(daylight_cct(6500));
        assert!((x - 0.3127).abs() < 0.0002);
        assert!((y - 0.3291).abs() < 0.0002);
    }

    #[test]
    fn daylight_spd_d65() {
        let wls = standard_wavelengths();
        let d65 = daylight(6500, &wls);
        let at = |w: f64| d65.value_at(0, w);
        // Published CIE D65 values.
        assert!((at(560.0) - 100.0).abs() < 0.1);
        assert!((at(460.0) - 117.8).abs() < 0.5);
        assert!((at(600.0) - 90.0).abs() < 0.5);
        assert_eq!(d65.header.kind, "d65");
    }

    #[test]
    fn daylight_names() {
        let wls = standard_wavelengths();
        assert_eq!(daylight(6025, &wls).header.kind, "d6025");
        assert_eq!(daylight(5500, &wls).header.kind, "d55");
        assert_eq!(daylight_name(25000), "d250");
        for name in ["D6025", "D55", "d250"] {
            let nominal = match parse_name(name).unwrap() {
                IlluminantName::Daylight(n) => n,
                other => panic!("unexpected {:?}", other),
            };
            assert_eq!(daylight_name(nominal), name.to_lowercase());
        }
    }

    #[test]
    fn blackbody_spd() {
        let wls = standard_wavelengths();
        let warm = blackbody(2000, &wls);
        assert!((warm.value_at(0, 560.0) - 1.0).abs() < 1e-12);
        // A low temperature radiator rises towards the red end.
        assert!(warm.value_at(0, 700.0) > warm.value_at(0, 600.0));
        assert!(warm.value_at(0, 450.0) < warm.value_at(0, 500.0));
        assert_eq!(warm.header.kind, "2000k");
    }
}
