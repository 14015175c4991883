use std::io::{Seek, Write};

use tiff::encoder::{colortype::RGB32Float, TiffEncoder};

use crate::{error::WriteError, Image};

pub fn write<W: Write + Seek>(writer: W, image: &Image) -> Result<(), WriteError> {
    let (width, height) = image.dimensions;
    if width == 0 || height == 0 || image.data.len() != width * height {
        return Err(WriteError::InvalidDimensions);
    }
    let width = u32::try_from(width).map_err(|_| WriteError::InvalidDimensions)?;
    let height = u32::try_from(height).map_err(|_| WriteError::InvalidDimensions)?;

    let samples: Vec<f32> = image.data.iter().flat_map(|p| p.iter().copied()).collect();

    let mut encoder = TiffEncoder::new(writer)?;
    encoder.write_image::<RGB32Float>(width, height, &samples)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use tiff::decoder::{Decoder, DecodingResult};

    fn gradient(width: usize, height: usize) -> Image {
        let mut image = Image::new(width, height);
        for y in 0..height {
            for x in 0..width {
                image.data[y * width + x] = [x as f32 * 0.25, y as f32 * 2.0, -1.5];
            }
        }
        image
    }

    #[test]
    fn write_float_rgb() {
        let image = gradient(5, 3);
        let mut buffer = Cursor::new(Vec::new());
        write(&mut buffer, &image).unwrap();

        buffer.set_position(0);
        let mut decoder = Decoder::new(buffer).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (5, 3));
        match decoder.read_image().unwrap() {
            DecodingResult::F32(samples) => {
                assert_eq!(samples.len(), 5 * 3 * 3);
                assert_eq!(&samples[..3], &[0.0, 0.0, -1.5]);
                let last = (5 * 3 - 1) * 3;
                assert_eq!(&samples[last..], &[1.0, 4.0, -1.5]);
            }
            _ => panic!("expected float samples"),
        }
    }

    #[test]
    fn write_rejects_mismatched_data() {
        let mut image = gradient(4, 4);
        image.data.pop();
        let result = write(Cursor::new(Vec::new()), &image);
        assert!(matches!(result, Err(WriteError::InvalidDimensions)));

        let empty = Image::new(0, 10);
        let result = write(Cursor::new(Vec::new()), &empty);
        assert!(matches!(result, Err(WriteError::InvalidDimensions)));
    }

    #[test]
    fn save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        crate::save(&path, &gradient(2, 2)).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 2 * 2 * 12);
    }
}
