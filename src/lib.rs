//! Conversion of camera raw photographs to ACES2065-1.
//!
//! An `ImageConverter` works out, for each image, white balance multipliers
//! and a 3x3 matrix from white balanced camera RGB to ACES.  The matrix is
//! an IDT when something is known about the camera (its spectral
//! sensitivities, the DNG colour calibration, or the raw decoder's built-in
//! matrix) and otherwise a chromatic adaptation transform.

pub mod cache;
pub mod converter;
pub mod error;
pub mod files;
pub mod job_helpers;
pub mod metadata;
pub mod pipeline;
pub mod settings;
pub mod transform;
pub mod white_balance;

pub use converter::ImageConverter;
pub use error::{Error, Status};
pub use files::collect_image_files;
pub use idt::Matrix3;
pub use metadata::CameraMetadata;
pub use settings::{CropMode, MatrixMethod, Settings, WbMethod};
pub use transform::Transform;
