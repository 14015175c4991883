//! Pixel processing for `process_image()`.
//!
//! The stages run in this order: `RawFrame::normalize()`,
//! `RawFrame::apply_white_balance()`, `RawFrame::demosaic()`, then
//! `correct_aberration()`, `auto_brighten()`, `apply_matrix()`,
//! `apply_scale()`, `apply_crop()` and `apply_flip()` on the resulting
//! RGB image.

use image_fmt::Image;
use rayon::prelude::*;

use crate::{settings::CropMode, Error, Matrix3};

/// Colour filter layout, repeating over the sensor.
///
/// Colour indices are 0 red, 1 green, 2 blue and 3 a second green (or
/// emerald).
#[derive(Debug, Clone, PartialEq)]
pub struct CfaPattern {
    pub width: usize,
    pub height: usize,
    pub colors: Vec<usize>,
}

impl CfaPattern {
    pub fn new(width: usize, height: usize, colors: Vec<usize>) -> CfaPattern {
        debug_assert_eq!(width * height, colors.len());
        CfaPattern {
            width,
            height,
            colors,
        }
    }

    pub fn from_raw(cfa: &rawloader::CFA) -> CfaPattern {
        let mut colors = Vec::with_capacity(cfa.width * cfa.height);
        for row in 0..cfa.height {
            for col in 0..cfa.width {
                colors.push(cfa.color_at(row, col).min(3));
            }
        }
        CfaPattern::new(cfa.width, cfa.height, colors)
    }

    pub fn color_at(&self, row: usize, col: usize) -> usize {
        if self.colors.is_empty() {
            return 1;
        }
        self.colors[(row % self.height) * self.width + (col % self.width)]
    }
}

/// Output channel of a CFA colour.
fn channel_of(color: usize) -> usize {
    if color == 3 {
        1
    } else {
        color
    }
}

/// Undemosaiced sensor data.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: usize,
    pub height: usize,
    /// Components per pixel: 1 for CFA data, 3 for already-RGB data.
    pub cpp: usize,
    pub data: Vec<f32>,
    /// Per CFA colour.
    pub black: [f32; 4],
    /// Per CFA colour.
    pub white: [f32; 4],
    pub cfa: CfaPattern,
    /// Decoder crop margins: top, right, bottom, left.
    pub crops: [usize; 4],
}

impl RawFrame {
    pub fn from_raw_image(raw: &rawloader::RawImage) -> RawFrame {
        let data = match raw.data {
            rawloader::RawImageData::Integer(ref v) => v.iter().map(|&n| n as f32).collect(),
            rawloader::RawImageData::Float(ref v) => v.clone(),
        };

        RawFrame {
            width: raw.width,
            height: raw.height,
            cpp: raw.cpp,
            data,
            black: raw.blacklevels.map(|n| n as f32),
            white: raw.whitelevels.map(|n| n as f32),
            cfa: CfaPattern::from_raw(&raw.cfa),
            crops: raw.crops,
        }
    }

    /// Colour index of a sample.
    fn color_of(&self, index: usize) -> usize {
        if self.cpp == 3 {
            index % 3
        } else {
            let pixel = index / self.cpp.max(1);
            self.cfa.color_at(pixel / self.width, pixel % self.width)
        }
    }

    /// Maps the sensor range to [0, 1], so that saturation is 1.0.
    ///
    /// Negative `black_level` and `saturation_level` keep the decoder's
    /// values.  A non-zero `adjust_maximum_threshold` lowers the white
    /// level to the actual data maximum when that is above the threshold
    /// fraction of it.
    pub fn normalize(&mut self, black_level: i32, saturation_level: i32, adjust_maximum_threshold: f32) {
        if black_level >= 0 {
            self.black = [black_level as f32; 4];
        }
        if saturation_level >= 0 {
            self.white = [saturation_level as f32; 4];
        }

        if adjust_maximum_threshold > 0.0 {
            let real_max = self.data.par_iter().cloned().reduce(|| 0.0, f32::max);
            let nominal = self.white.iter().cloned().fold(0.0, f32::max);
            if real_max > 0.0 && real_max < nominal && real_max > nominal * adjust_maximum_threshold
            {
                self.white = [real_max; 4];
            }
        }

        let black = self.black;
        let mut range = [0.0f32; 4];
        for c in 0..4 {
            range[c] = self.white[c] - self.black[c];
        }

        let colors: Vec<usize> = (0..self.data.len()).map(|i| self.color_of(i)).collect();
        self.data
            .par_iter_mut()
            .zip(colors.par_iter())
            .for_each(|(v, &c)| {
                *v = if range[c] > 0.0 {
                    ((*v - black[c]) / range[c]).max(0.0)
                } else {
                    0.0
                };
            });

        self.black = [0.0; 4];
        self.white = [1.0; 4];
    }

    /// Mean value of each CFA colour inside the (x, y, width, height) box.
    /// An all-zero box means the whole frame.  Colours absent from the
    /// box are 0.
    pub fn box_average(&self, region: [i32; 4]) -> Option<[f64; 4]> {
        let (x, y, w, h) = if region == [0; 4] {
            (0, 0, self.width, self.height)
        } else {
            if region.iter().any(|&n| n < 0) || region[2] == 0 || region[3] == 0 {
                return None;
            }
            let x = region[0] as usize;
            let y = region[1] as usize;
            let w = (region[2] as usize).min(self.width.saturating_sub(x));
            let h = (region[3] as usize).min(self.height.saturating_sub(y));
            (x, y, w, h)
        };
        if w == 0 || h == 0 {
            return None;
        }

        let mut sum = [0.0f64; 4];
        let mut count = [0usize; 4];
        for row in y..(y + h) {
            for col in x..(x + w) {
                let base = (row * self.width + col) * self.cpp;
                for k in 0..self.cpp {
                    let c = self.color_of(base + k);
                    sum[c] += self.data[base + k] as f64;
                    count[c] += 1;
                }
            }
        }

        let mut out = [0.0f64; 4];
        for c in 0..4 {
            if count[c] > 0 {
                out[c] = sum[c] / count[c] as f64;
            }
        }
        Some(out)
    }

    /// Multiplies each sample by the multiplier of its colour.  A zero
    /// fourth multiplier uses the green one.
    pub fn apply_white_balance(&mut self, wb: [f64; 4], clip: bool) {
        let mut multipliers = [wb[0] as f32, wb[1] as f32, wb[2] as f32, wb[3] as f32];
        if !(multipliers[3] > 0.0) {
            multipliers[3] = multipliers[1];
        }

        let colors: Vec<usize> = (0..self.data.len()).map(|i| self.color_of(i)).collect();
        self.data
            .par_iter_mut()
            .zip(colors.par_iter())
            .for_each(|(v, &c)| {
                *v *= multipliers[c];
                if clip {
                    *v = v.min(1.0);
                }
            });
    }

    /// Interpolates the missing colours of each pixel.
    ///
    /// With `half_size`, every 2x2 block becomes one pixel holding the
    /// block's mean of each colour.  Otherwise each missing colour is the
    /// mean of that colour over the pixel's 3x3 neighbourhood.
    pub fn demosaic(&self, half_size: bool) -> Image {
        if self.cpp == 3 {
            let mut image = Image::new(self.width, self.height);
            for (pixel, rgb) in image.data.iter_mut().zip(self.data.chunks_exact(3)) {
                *pixel = [rgb[0], rgb[1], rgb[2]];
            }
            return image;
        }

        if half_size {
            return self.demosaic_half();
        }

        let mut image = Image::new(self.width, self.height);
        let width = self.width;
        image
            .data
            .par_chunks_mut(width.max(1))
            .enumerate()
            .for_each(|(row, out_row)| {
                for (col, out) in out_row.iter_mut().enumerate() {
                    let own = self.cfa.color_at(row, col);
                    let mut sum = [0.0f32; 3];
                    let mut count = [0u32; 3];
                    for r in row.saturating_sub(1)..(row + 2).min(self.height) {
                        for c in col.saturating_sub(1)..(col + 2).min(self.width) {
                            let ch = channel_of(self.cfa.color_at(r, c));
                            sum[ch] += self.data[r * width + c];
                            count[ch] += 1;
                        }
                    }
                    for ch in 0..3 {
                        out[ch] = if ch == channel_of(own) && own != 3 {
                            self.data[row * width + col]
                        } else if count[ch] > 0 {
                            sum[ch] / count[ch] as f32
                        } else {
                            0.0
                        };
                    }
                }
            });
        image
    }

    fn demosaic_half(&self) -> Image {
        let (w, h) = (self.width / 2, self.height / 2);
        let mut image = Image::new(w, h);
        image
            .data
            .par_chunks_mut(w.max(1))
            .enumerate()
            .for_each(|(row, out_row)| {
                for (col, out) in out_row.iter_mut().enumerate() {
                    let mut sum = [0.0f32; 3];
                    let mut count = [0u32; 3];
                    for r in (row * 2)..(row * 2 + 2) {
                        for c in (col * 2)..(col * 2 + 2) {
                            let ch = channel_of(self.cfa.color_at(r, c));
                            sum[ch] += self.data[r * self.width + c];
                            count[ch] += 1;
                        }
                    }
                    for ch in 0..3 {
                        if count[ch] > 0 {
                            out[ch] = sum[ch] / count[ch] as f32;
                        }
                    }
                }
            });
        image
    }
}

//-------------------------------------------------------------
// RGB stages.

fn sample_bilinear(image: &Image, ch: usize, x: f32, y: f32) -> f32 {
    let max_x = image.width() as f32 - 1.0;
    let max_y = image.height() as f32 - 1.0;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let (x0, y0) = (x.floor() as usize, y.floor() as usize);
    let (x1, y1) = (
        (x0 + 1).min(image.width() - 1),
        (y0 + 1).min(image.height() - 1),
    );
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let top = image.get(x0, y0)[ch] * (1.0 - fx) + image.get(x1, y0)[ch] * fx;
    let bottom = image.get(x0, y1)[ch] * (1.0 - fx) + image.get(x1, y1)[ch] * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Lateral chromatic aberration correction: the red and blue channels are
/// magnified by the given factors about the image centre.
pub fn correct_aberration(image: &mut Image, factors: [f32; 2]) {
    if image.data.is_empty() || factors == [1.0, 1.0] {
        return;
    }
    if factors.iter().any(|&f| !(f > 0.0)) {
        return;
    }

    let source = image.clone();
    let cx = (image.width() as f32 - 1.0) * 0.5;
    let cy = (image.height() as f32 - 1.0) * 0.5;
    let width = image.width();
    image
        .data
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, pixel) in row.iter_mut().enumerate() {
                for (ch, &factor) in [(0usize, &factors[0]), (2, &factors[1])] {
                    if factor == 1.0 {
                        continue;
                    }
                    let sx = cx + (x as f32 - cx) / factor;
                    let sy = cy + (y as f32 - cy) / factor;
                    pixel[ch] = sample_bilinear(&source, ch, sx, sy);
                }
            }
        });
}

/// Scales the image so that its 99th percentile brightest channel value
/// becomes 1.0.
pub fn auto_brighten(image: &mut Image) {
    if image.data.is_empty() {
        return;
    }
    let mut values: Vec<f32> = image
        .data
        .iter()
        .map(|p| p[0].max(p[1]).max(p[2]))
        .collect();
    let index = ((values.len() - 1) as f32 * 0.99) as usize;
    let (_, percentile, _) = values.select_nth_unstable_by(index, |a, b| a.total_cmp(b));
    let percentile = *percentile;
    if percentile > 0.0 && percentile.is_finite() {
        let factor = 1.0 / percentile;
        image.data.par_iter_mut().for_each(|p| {
            for v in p.iter_mut() {
                *v *= factor;
            }
        });
    }
}

pub fn apply_matrix(image: &mut Image, m: &Matrix3) -> Result<(), Error> {
    if image.data.is_empty() {
        return Err(Error::Processing("Cannot apply a matrix to an empty image.".into()));
    }
    if m.iter().flatten().any(|v| !v.is_finite()) {
        return Err(Error::Processing("The colour matrix is not finite.".into()));
    }

    let m: [[f32; 3]; 3] = m.map(|row| row.map(|v| v as f32));
    image.data.par_iter_mut().for_each(|p| {
        let [r, g, b] = *p;
        for (out, row) in p.iter_mut().zip(m.iter()) {
            *out = row[0] * r + row[1] * g + row[2] * b;
        }
    });
    Ok(())
}

pub fn apply_scale(image: &mut Image, factor: f32) -> Result<(), Error> {
    if !(factor > 0.0) || !factor.is_finite() {
        return Err(Error::Processing(format!(
            "Invalid scale factor: {}",
            factor
        )));
    }
    if factor != 1.0 {
        image.data.par_iter_mut().for_each(|p| {
            for v in p.iter_mut() {
                *v *= factor;
            }
        });
    }
    Ok(())
}

/// The crop window as (x, y, width, height), in sensor pixels.
///
/// A non-zero `crop_box` wins over the decoder's crop margins.  `None` if
/// neither defines a window.
pub fn crop_window(crop_box: [i32; 4], frame: &RawFrame) -> Result<Option<[usize; 4]>, Error> {
    if crop_box != [0; 4] {
        if crop_box.iter().any(|&n| n < 0) {
            return Err(Error::Processing(format!(
                "Invalid crop box: {:?}",
                crop_box
            )));
        }
        return Ok(Some(crop_box.map(|n| n as usize)));
    }

    let [top, right, bottom, left] = frame.crops;
    if frame.crops == [0; 4] {
        return Ok(None);
    }
    let width = frame.width.saturating_sub(left + right);
    let height = frame.height.saturating_sub(top + bottom);
    Ok(Some([left, top, width, height]))
}

/// Crops `image` to `window` according to `mode`.  Unless `mode` is off,
/// `window` must lie inside the image.
pub fn apply_crop(image: &mut Image, mode: CropMode, window: Option<[usize; 4]>) -> Result<(), Error> {
    let [x, y, w, h] = match window {
        Some(window) if mode != CropMode::Off => window,
        _ => return Ok(()),
    };

    if w == 0 || h == 0 || x + w > image.width() || y + h > image.height() {
        return Err(Error::Processing(format!(
            "Crop window ({}, {}, {}, {}) is outside of the {}x{} image.",
            x,
            y,
            w,
            h,
            image.width(),
            image.height()
        )));
    }

    match mode {
        CropMode::Off => {}
        CropMode::Soft => {
            tracing::info!("Crop window: x={} y={} width={} height={}", x, y, w, h);
        }
        CropMode::Hard => {
            let mut cropped = Image::new(w, h);
            for (row, out) in cropped.data.chunks_exact_mut(w).enumerate() {
                let start = (y + row) * image.width() + x;
                out.copy_from_slice(&image.data[start..(start + w)]);
            }
            *image = cropped;
        }
    }
    Ok(())
}

/// Applies the EXIF-style orientation code: 3 rotates 180 degrees, 5 90
/// degrees counter-clockwise and 6 90 degrees clockwise.  Anything else
/// leaves the image as is.
pub fn apply_flip(image: &mut Image, flip: i32) {
    let (w, h) = image.dimensions;
    match flip {
        3 => image.data.reverse(),
        5 | 6 => {
            let mut rotated = Image::new(h, w);
            for y in 0..h {
                for x in 0..w {
                    let (nx, ny) = if flip == 6 { (h - 1 - y, x) } else { (y, w - 1 - x) };
                    rotated.data[ny * h + nx] = image.data[y * w + x];
                }
            }
            *image = rotated;
        }
        _ => {}
    }
}
