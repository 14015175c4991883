//! Output of linear floating point RGB images.

mod error;
mod tiff_fmt;

use std::{
    fs::File,
    io::{BufWriter, Seek, Write},
    path::Path,
};

pub use error::WriteError;

/// A linear RGB image, stored row-major from the top-left.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub dimensions: (usize, usize),
    pub data: Vec<[f32; 3]>,
}

impl Image {
    pub fn new(width: usize, height: usize) -> Image {
        Image {
            dimensions: (width, height),
            data: vec![[0.0; 3]; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.dimensions.0
    }

    pub fn height(&self) -> usize {
        self.dimensions.1
    }

    pub fn get(&self, x: usize, y: usize) -> [f32; 3] {
        self.data[y * self.dimensions.0 + x]
    }
}

/// Writes the image as a 32-bit float RGB TIFF.
pub fn save<P: AsRef<Path>>(path: P, image: &Image) -> Result<(), WriteError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write(&mut writer, image)?;
    writer.flush()?;
    Ok(())
}

pub fn write<W: Write + Seek>(writer: W, image: &Image) -> Result<(), WriteError> {
    tiff_fmt::write(writer, image)
}
