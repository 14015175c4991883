//! Numerical core for deriving camera input device transforms (IDTs) and
//! chromatic adaptation transforms targeting ACES2065-1.

pub mod aces;
pub mod dng;
mod linalg;
pub mod spectral_fit;
pub mod temperature;

/// Row-major 3x3 matrix, as used throughout `colorbox`.
pub type Matrix3 = [[f64; 3]; 3];

pub const IDENTITY: Matrix3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
