//! Spectral measurements used to build camera input transforms: camera
//! channel sensitivities, illuminant power distributions, the standard
//! observer, and the training patch reflectances, along with the on-disk
//! database they are looked up in.

mod data;
mod database;
mod error;
pub mod illuminant;

pub use data::{Channel, Header, SpectralData};
pub use database::{
    database_paths, database_paths_from, Database, DATA_PATH_ENV, LEGACY_DATA_PATH_ENV,
};
pub use error::Error;

/// The default wavelength grid (in nm) for synthesized spectra.
pub fn standard_wavelengths() -> Vec<f64> {
    (0..=80).map(|i| 380.0 + (i as f64 * 5.0)).collect()
}
