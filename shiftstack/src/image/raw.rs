//! Single-plane f32 images with masked-pixel propagation.
//!
//! A [`RawImage`] is a width×height plane of f32 values in which the
//! sentinel [`NO_DATA`] marks pixels that carry no valid measurement
//! (cosmic-ray hits, bad columns, chip gaps). Every operation on a plane
//! is validity-aware: sampling refuses to blend invalid neighbors and
//! convolution renormalizes its kernel over the valid ones.
//!
//! Planes are stored as ndarray `Array2<f32>` in `[[y, x]]` order; the
//! public accessors take `(x, y)` in image coordinates.

use ndarray::{Array2, Axis};
use rayon::prelude::*;

use crate::psf::Psf;

/// Sentinel value marking a pixel with no valid data.
pub const NO_DATA: f32 = -9999.0;

/// Whether a pixel value carries valid data (is not the sentinel).
#[inline]
pub fn pixel_has_data(value: f32) -> bool {
    value != NO_DATA
}

/// A 2D f32 image plane with a masked-pixel sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pixels: Array2<f32>,
}

impl RawImage {
    /// Create a zero-initialized plane.
    pub fn zeros(width: usize, height: usize) -> Self {
        RawImage {
            pixels: Array2::zeros((height, width)),
        }
    }

    /// Wrap an existing array as an image plane.
    pub fn from_array(pixels: Array2<f32>) -> Self {
        RawImage { pixels }
    }

    /// Image width in pixels.
    pub fn width(&self) -> usize {
        self.pixels.ncols()
    }

    /// Image height in pixels.
    pub fn height(&self) -> usize {
        self.pixels.nrows()
    }

    /// Borrow the underlying array (indexed `[[y, x]]`).
    pub fn pixels(&self) -> &Array2<f32> {
        &self.pixels
    }

    /// Mutably borrow the underlying array.
    pub fn pixels_mut(&mut self) -> &mut Array2<f32> {
        &mut self.pixels
    }

    /// Value at integer pixel (x, y).
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.pixels[[y, x]]
    }

    /// Set the value at integer pixel (x, y).
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.pixels[[y, x]] = value;
    }

    /// Whether a fractional position falls inside `[0, W) × [0, H)`.
    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x < self.width() as f32 && y < self.height() as f32
    }

    /// Bilinear interpolation at fractional (x, y).
    ///
    /// Returns [`NO_DATA`] when the sample cannot be formed from four
    /// valid in-bounds neighbors: outside the image, inside the last
    /// fractional row/column (where one neighbor would be out of bounds),
    /// or adjacent to any NO_DATA pixel. Zero-weight neighbors still
    /// poison the sample - a masked pixel must never be read around.
    pub fn interpolate(&self, x: f32, y: f32) -> f32 {
        if x < 0.0 || y < 0.0 {
            return NO_DATA;
        }
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        if x0 + 1 >= self.width() || y0 + 1 >= self.height() {
            return NO_DATA;
        }

        let p00 = self.pixels[[y0, x0]];
        let p10 = self.pixels[[y0, x0 + 1]];
        let p01 = self.pixels[[y0 + 1, x0]];
        let p11 = self.pixels[[y0 + 1, x0 + 1]];
        if !pixel_has_data(p00)
            || !pixel_has_data(p10)
            || !pixel_has_data(p01)
            || !pixel_has_data(p11)
        {
            return NO_DATA;
        }

        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        (1.0 - fx) * (1.0 - fy) * p00
            + fx * (1.0 - fy) * p10
            + (1.0 - fx) * fy * p01
            + fx * fy * p11
    }

    /// Distribute `value` over the four integer neighbors of a fractional
    /// position with bilinear weights (the adjoint of [`interpolate`]).
    ///
    /// Out-of-bounds and NO_DATA neighbors are skipped, so injection never
    /// resurrects a masked pixel.
    ///
    /// [`interpolate`]: RawImage::interpolate
    pub fn add_interpolated(&mut self, x: f32, y: f32, value: f32) {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let corners = [
            (x0, y0, (1.0 - fx) * (1.0 - fy)),
            (x0 + 1.0, y0, fx * (1.0 - fy)),
            (x0, y0 + 1.0, (1.0 - fx) * fy),
            (x0 + 1.0, y0 + 1.0, fx * fy),
        ];
        for (cx, cy, weight) in corners {
            if cx < 0.0 || cy < 0.0 || cx >= self.width() as f32 || cy >= self.height() as f32 {
                continue;
            }
            let (cx, cy) = (cx as usize, cy as usize);
            let pixel = &mut self.pixels[[cy, cx]];
            if pixel_has_data(*pixel) {
                *pixel += value * weight;
            }
        }
    }

    /// Convolve in place with a PSF kernel. See [`convolved`].
    ///
    /// [`convolved`]: RawImage::convolved
    pub fn convolve(&mut self, psf: &Psf) {
        self.pixels = self.convolved(psf).pixels;
    }

    /// Centered correlation with the kernel, renormalized over valid
    /// contributions.
    ///
    /// NO_DATA input pixels stay NO_DATA in the output. For valid output
    /// pixels, kernel weights landing on NO_DATA or out-of-bounds
    /// neighbors are excluded and the accumulated sum is rescaled by
    /// `kernel_sum / valid_weight_sum`, so the filter keeps its full power
    /// next to masked regions and image edges. If every weight is
    /// excluded the output is NO_DATA.
    ///
    /// This is the hottest CPU path when no accelerator is used; output
    /// rows are computed in parallel.
    pub fn convolved(&self, psf: &Psf) -> RawImage {
        let width = self.width();
        let height = self.height();
        let radius = psf.radius() as isize;
        let kernel_sum = psf.sum();

        let mut output = Array2::zeros((height, width));
        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(y, mut row)| {
                for x in 0..width {
                    let center = self.pixels[[y, x]];
                    if !pixel_has_data(center) {
                        row[x] = NO_DATA;
                        continue;
                    }

                    let mut sum = 0.0f32;
                    let mut weight_sum = 0.0f32;
                    for krow in 0..psf.dim() {
                        let iy = y as isize + krow as isize - radius;
                        if iy < 0 || iy >= height as isize {
                            continue;
                        }
                        for kcol in 0..psf.dim() {
                            let ix = x as isize + kcol as isize - radius;
                            if ix < 0 || ix >= width as isize {
                                continue;
                            }
                            let pixel = self.pixels[[iy as usize, ix as usize]];
                            if !pixel_has_data(pixel) {
                                continue;
                            }
                            let weight = psf.get(krow, kcol);
                            sum += pixel * weight;
                            weight_sum += weight;
                        }
                    }

                    row[x] = if weight_sum > 0.0 {
                        sum * kernel_sum / weight_sum
                    } else {
                        NO_DATA
                    };
                }
            });

        RawImage { pixels: output }
    }
}
