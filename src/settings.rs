//! Conversion settings.
//!
//! Scalar settings are plain public fields.  Fixed-size settings are
//! private, with setters that take slices and validate their length
//! before changing anything.

use std::{fmt, str::FromStr};

use crate::Error;

/// How the white balance multipliers are determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WbMethod {
    /// As-shot white balance from the file's metadata.
    Metadata,
    /// Computed from the camera's spectral sensitivities and the
    /// illuminant named in `Settings::illuminant`.
    Illuminant,
    /// Averaged over `Settings::wb_box()` of the raw image.
    Box,
    /// `Settings::custom_wb()` as is.
    Custom,
}

/// How the colour transform matrix is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixMethod {
    /// Try spectral, then metadata, then Adobe, then a plain chromatic
    /// adaptation.
    Auto,
    Spectral,
    Metadata,
    Adobe,
    /// `Settings::custom_matrix()` as is.
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropMode {
    /// Keep every pixel.
    Off,
    /// Keep every pixel, but record the crop window.
    Soft,
    /// Cut the image down to the crop window.
    Hard,
}

macro_rules! impl_names {
    ($t:ident, $($variant:ident => $name:literal),+ $(,)?) => {
        impl $t {
            pub const ALL: &'static [$t] = &[$($t::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $($t::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $t {
            type Err = Error;

            fn from_str(text: &str) -> Result<$t, Error> {
                let lower = text.trim().to_lowercase();
                $t::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name() == lower)
                    .ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "Unsupported value '{}'. Expected one of: {}",
                            text,
                            $t::ALL.iter().map(|v| v.name()).collect::<Vec<_>>().join(", ")
                        ))
                    })
            }
        }
    };
}

impl_names!(WbMethod, Metadata => "metadata", Illuminant => "illuminant", Box => "box", Custom => "custom");
impl_names!(
    MatrixMethod,
    Auto => "auto",
    Spectral => "spectral",
    Metadata => "metadata",
    Adobe => "adobe",
    Custom => "custom",
);
impl_names!(CropMode, Off => "off", Soft => "soft", Hard => "hard");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    //------
    // Strategy selection.
    pub wb_method: WbMethod,
    pub matrix_method: MatrixMethod,
    pub crop_mode: CropMode,

    //------
    // Strategy parameters.
    /// Illuminant name for `WbMethod::Illuminant` and the spectral matrix
    /// method.  Empty means "detect from the white balance".
    pub illuminant: String,
    /// Highlight headroom factor.
    pub headroom: f32,
    /// Overrides the camera make from the file's metadata, if not empty.
    pub custom_camera_make: String,
    /// Overrides the camera model from the file's metadata, if not empty.
    pub custom_camera_model: String,
    wb_box: [i32; 4],
    custom_wb: [f32; 4],
    custom_matrix: [[f32; 3]; 3],
    crop_box: [i32; 4],

    //------
    // Raw decoding.
    pub auto_bright: bool,
    /// Use the actual image maximum as the white level when it exceeds this
    /// fraction of the nominal one.  Zero disables.
    pub adjust_maximum_threshold: f32,
    /// Overrides the black level when non-negative.
    pub black_level: i32,
    /// Overrides the white level when non-negative.
    pub saturation_level: i32,
    pub half_size: bool,
    /// 0 clips highlights, anything else leaves them unclipped.
    pub highlight_mode: i32,
    /// 0 none, 3 rotate 180, 5 rotate 90 CCW, 6 rotate 90 CW.
    pub flip: i32,
    pub denoise_threshold: f32,
    pub scale: f32,
    pub demosaic_algorithm: String,
    chromatic_aberration: [f32; 2],

    //------
    // I/O.
    /// Spectral database search paths.  Empty means use the environment
    /// or the default locations.
    pub database_directories: Vec<String>,
    pub overwrite: bool,
    pub create_dirs: bool,
    /// Output directory.  Empty means next to the input file.
    pub output_dir: String,
    pub use_timing: bool,
    pub disable_cache: bool,
    pub verbosity: i32,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            wb_method: WbMethod::Metadata,
            matrix_method: MatrixMethod::Auto,
            crop_mode: CropMode::Hard,

            illuminant: String::new(),
            headroom: 6.0,
            custom_camera_make: String::new(),
            custom_camera_model: String::new(),
            wb_box: [0; 4],
            custom_wb: [1.0; 4],
            custom_matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            crop_box: [0; 4],

            auto_bright: false,
            adjust_maximum_threshold: 0.75,
            black_level: -1,
            saturation_level: -1,
            half_size: false,
            highlight_mode: 0,
            flip: 0,
            denoise_threshold: 0.0,
            scale: 1.0,
            demosaic_algorithm: "linear".into(),
            chromatic_aberration: [1.0, 1.0],

            database_directories: Vec::new(),
            overwrite: false,
            create_dirs: false,
            output_dir: String::new(),
            use_timing: false,
            disable_cache: false,
            verbosity: 0,
        }
    }
}

fn fixed<T: Copy, const N: usize>(values: &[T]) -> Result<[T; N], Error> {
    <[T; N]>::try_from(values).map_err(|_| {
        Error::InvalidArgument(format!("The array must contain {} values.", N))
    })
}

impl Settings {
    /// White balance box as (x, y, width, height).  All zeros means the
    /// whole image.
    pub fn wb_box(&self) -> [i32; 4] {
        self.wb_box
    }

    pub fn set_wb_box(&mut self, values: &[i32]) -> Result<(), Error> {
        self.wb_box = fixed(values)?;
        Ok(())
    }

    pub fn custom_wb(&self) -> [f32; 4] {
        self.custom_wb
    }

    pub fn set_custom_wb(&mut self, values: &[f32]) -> Result<(), Error> {
        self.custom_wb = fixed(values)?;
        Ok(())
    }

    /// Crop window as (x, y, width, height).  All zeros means the default
    /// crop of the raw file.
    pub fn crop_box(&self) -> [i32; 4] {
        self.crop_box
    }

    pub fn set_crop_box(&mut self, values: &[i32]) -> Result<(), Error> {
        self.crop_box = fixed(values)?;
        Ok(())
    }

    /// Red and blue magnification factors for chromatic aberration
    /// correction.
    pub fn chromatic_aberration(&self) -> [f32; 2] {
        self.chromatic_aberration
    }

    pub fn set_chromatic_aberration(&mut self, values: &[f32]) -> Result<(), Error> {
        self.chromatic_aberration = fixed(values)?;
        Ok(())
    }

    pub fn custom_matrix(&self) -> [[f32; 3]; 3] {
        self.custom_matrix
    }

    pub fn set_custom_matrix<R: AsRef<[f32]>>(&mut self, rows: &[R]) -> Result<(), Error> {
        if rows.len() != 3 {
            return Err(Error::InvalidArgument(
                "The matrix must contain 3 rows.".into(),
            ));
        }
        let mut matrix = [[0.0f32; 3]; 3];
        for (dst, src) in matrix.iter_mut().zip(rows.iter()) {
            *dst = <[f32; 3]>::try_from(src.as_ref()).map_err(|_| {
                Error::InvalidArgument("Each row of the matrix must contain 3 elements.".into())
            })?;
        }
        self.custom_matrix = matrix;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.wb_method, WbMethod::Metadata);
        assert_eq!(settings.matrix_method, MatrixMethod::Auto);
        assert_eq!(settings.crop_mode, CropMode::Hard);
        assert_eq!(settings.headroom, 6.0);
        assert_eq!(settings.custom_wb(), [1.0; 4]);
        assert_eq!(settings.wb_box(), [0; 4]);
        assert_eq!(settings.chromatic_aberration(), [1.0, 1.0]);
        assert_eq!(settings.black_level, -1);
        assert!(settings.database_directories.is_empty());
    }

    #[test]
    fn round_trip() {
        let mut settings = Settings::default();
        settings.set_wb_box(&[1, 2, 3, 4]).unwrap();
        settings.set_custom_wb(&[2.0, 1.0, 1.5, 1.0]).unwrap();
        settings.set_crop_box(&[10, 20, 300, 400]).unwrap();
        settings.set_chromatic_aberration(&[1.001, 0.999]).unwrap();
        settings
            .set_custom_matrix(&[[0.5, 0.3, 0.2], [0.1, 0.8, 0.1], [0.0, 0.1, 0.9]])
            .unwrap();

        assert_eq!(settings.wb_box(), [1, 2, 3, 4]);
        assert_eq!(settings.custom_wb(), [2.0, 1.0, 1.5, 1.0]);
        assert_eq!(settings.crop_box(), [10, 20, 300, 400]);
        assert!((settings.chromatic_aberration()[0] - 1.001).abs() < 1e-3);
        assert_eq!(settings.custom_matrix()[1], [0.1, 0.8, 0.1]);
    }

    #[test]
    fn wrong_arity_leaves_value() {
        let mut settings = Settings::default();
        settings.set_wb_box(&[1, 2, 3, 4]).unwrap();

        let err = settings.set_wb_box(&[1, 2, 3]).unwrap_err();
        assert_eq!(err.to_string(), "The array must contain 4 values.");
        assert_eq!(settings.wb_box(), [1, 2, 3, 4]);

        assert!(settings.set_custom_wb(&[1.0; 5]).is_err());
        assert_eq!(settings.custom_wb(), [1.0; 4]);

        assert!(settings.set_crop_box(&[]).is_err());
        assert_eq!(settings.crop_box(), [0; 4]);

        let err = settings.set_chromatic_aberration(&[1.0]).unwrap_err();
        assert_eq!(err.to_string(), "The array must contain 2 values.");
        assert_eq!(settings.chromatic_aberration(), [1.0, 1.0]);
    }

    #[test]
    fn wrong_matrix_shape_leaves_value() {
        let mut settings = Settings::default();
        let identity = settings.custom_matrix();

        let err = settings
            .set_custom_matrix(&[vec![1.0f32, 0.0, 0.0], vec![0.0, 1.0, 0.0]])
            .unwrap_err();
        assert_eq!(err.to_string(), "The matrix must contain 3 rows.");

        let err = settings
            .set_custom_matrix(&[vec![2.0f32, 0.0, 0.0], vec![0.0, 2.0], vec![0.0, 0.0, 2.0]])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Each row of the matrix must contain 3 elements."
        );
        assert_eq!(settings.custom_matrix(), identity);
    }

    #[test]
    fn method_names() {
        assert_eq!("Illuminant".parse::<WbMethod>().unwrap(), WbMethod::Illuminant);
        assert_eq!("adobe".parse::<MatrixMethod>().unwrap(), MatrixMethod::Adobe);
        assert_eq!(" soft ".parse::<CropMode>().unwrap(), CropMode::Soft);
        assert!("bogus".parse::<MatrixMethod>().is_err());
        assert_eq!(MatrixMethod::Spectral.to_string(), "spectral");
    }
}
