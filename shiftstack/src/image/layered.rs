//! One exposure: science, variance, and mask planes plus metadata.
//!
//! A [`LayeredImage`] carries the three co-registered planes of a single
//! exposure, the exposure timestamp (an opaque float - seconds, MJD, or
//! anything else, as long as the whole stack agrees), and the PSF under
//! which the exposure was taken.
//!
//! The mask plane holds per-pixel bit flags from the instrument pipeline.
//! Masking operations translate those flags (or brightness thresholds)
//! into [`NO_DATA`] science pixels, which every downstream stage treats as
//! "this frame has no measurement here".

use ndarray::Array2;

use crate::error::SearchError;
use crate::image::raw::{pixel_has_data, RawImage, NO_DATA};
use crate::psf::Psf;

/// Science, variance, and mask planes for one exposure.
#[derive(Debug, Clone)]
pub struct LayeredImage {
    science: RawImage,
    variance: RawImage,
    mask: Array2<u32>,
    time: f64,
    psf: Psf,
}

impl LayeredImage {
    /// Assemble an exposure from its three planes.
    ///
    /// All planes must share the same dimensions; mismatches are rejected
    /// with [`SearchError::InvalidShape`]. The variance plane is expected
    /// to be positive everywhere the mask is clear - that invariant is
    /// enforced lazily by the ψ/φ builder, which drops pixels with
    /// non-positive variance.
    pub fn new(
        science: RawImage,
        variance: RawImage,
        mask: Array2<u32>,
        time: f64,
        psf: Psf,
    ) -> Result<Self, SearchError> {
        let dims = (science.width(), science.height());
        let var_dims = (variance.width(), variance.height());
        let mask_dims = (mask.ncols(), mask.nrows());
        if var_dims != dims || mask_dims != dims {
            return Err(SearchError::InvalidShape(format!(
                "layered image planes disagree: science {}x{}, variance {}x{}, mask {}x{}",
                dims.0, dims.1, var_dims.0, var_dims.1, mask_dims.0, mask_dims.1
            )));
        }
        Ok(LayeredImage {
            science,
            variance,
            mask,
            time,
            psf,
        })
    }

    /// Image width in pixels.
    pub fn width(&self) -> usize {
        self.science.width()
    }

    /// Image height in pixels.
    pub fn height(&self) -> usize {
        self.science.height()
    }

    /// Pixels per plane (`width * height`).
    pub fn pixels_per_image(&self) -> usize {
        self.width() * self.height()
    }

    /// Exposure timestamp (unit opaque to the engine).
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Override the exposure timestamp.
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// The PSF this exposure was taken under.
    pub fn psf(&self) -> &Psf {
        &self.psf
    }

    /// Science plane.
    pub fn science(&self) -> &RawImage {
        &self.science
    }

    /// Variance plane.
    pub fn variance(&self) -> &RawImage {
        &self.variance
    }

    /// Mask plane of per-pixel bit flags.
    pub fn mask(&self) -> &Array2<u32> {
        &self.mask
    }

    /// Replace the science plane, enforcing matching dimensions.
    pub fn set_science(&mut self, science: RawImage) -> Result<(), SearchError> {
        self.check_plane_dims(science.width(), science.height(), "science")?;
        self.science = science;
        Ok(())
    }

    /// Replace the variance plane, enforcing matching dimensions.
    pub fn set_variance(&mut self, variance: RawImage) -> Result<(), SearchError> {
        self.check_plane_dims(variance.width(), variance.height(), "variance")?;
        self.variance = variance;
        Ok(())
    }

    /// Replace the mask plane, enforcing matching dimensions.
    pub fn set_mask(&mut self, mask: Array2<u32>) -> Result<(), SearchError> {
        self.check_plane_dims(mask.ncols(), mask.nrows(), "mask")?;
        self.mask = mask;
        Ok(())
    }

    fn check_plane_dims(
        &self,
        width: usize,
        height: usize,
        plane: &str,
    ) -> Result<(), SearchError> {
        if (width, height) != (self.width(), self.height()) {
            return Err(SearchError::InvalidShape(format!(
                "{plane} plane is {width}x{height}, expected {}x{}",
                self.width(),
                self.height()
            )));
        }
        Ok(())
    }

    /// Inject a synthetic point source at (x, y) with the given total
    /// flux, spread by this exposure's PSF.
    ///
    /// Each kernel weight is deposited at its sub-pixel offset from
    /// (x, y) with bilinear scatter, so fractional positions inject
    /// correctly. Used for recovery experiments and test fixtures.
    pub fn add_object(&mut self, x: f32, y: f32, flux: f32) {
        let radius = self.psf.radius() as f32;
        for krow in 0..self.psf.dim() {
            for kcol in 0..self.psf.dim() {
                let weight = self.psf.get(krow, kcol);
                if weight == 0.0 {
                    continue;
                }
                let px = x + kcol as f32 - radius;
                let py = y + krow as f32 - radius;
                self.science.add_interpolated(px, py, flux * weight);
            }
        }
    }

    /// Translate mask flags into NO_DATA science pixels.
    ///
    /// A pixel is masked when `mask & flag_mask` is non-zero and that
    /// masked-bit pattern is not listed in `exceptions`.
    pub fn apply_mask_flags(&mut self, flag_mask: u32, exceptions: &[u32]) {
        let science = self.science.pixels_mut();
        for ((row, col), flags) in self.mask.indexed_iter() {
            let hit = flags & flag_mask;
            if hit != 0 && !exceptions.contains(&hit) {
                science[[row, col]] = NO_DATA;
            }
        }
    }

    /// Mask science pixels brighter than `threshold`.
    ///
    /// Saturated stars and bleed trails defeat the matched filter; the
    /// upstream pipeline flags most of them, this catches the rest.
    pub fn apply_mask_threshold(&mut self, threshold: f32) {
        for pixel in self.science.pixels_mut().iter_mut() {
            if pixel_has_data(*pixel) && *pixel > threshold {
                *pixel = NO_DATA;
            }
        }
    }

    /// Dilate the science NO_DATA region by `steps` 4-connected rings.
    ///
    /// Flagged pixels usually sit at the center of a wider artifact
    /// (cosmic-ray halos, saturation skirts); growing the mask keeps the
    /// skirt out of the ψ/φ sums.
    pub fn grow_mask(&mut self, steps: usize) {
        let width = self.width();
        let height = self.height();
        for _ in 0..steps {
            let mut frontier = Vec::new();
            for y in 0..height {
                for x in 0..width {
                    if pixel_has_data(self.science.get(x, y)) {
                        continue;
                    }
                    if x > 0 {
                        frontier.push((x - 1, y));
                    }
                    if x + 1 < width {
                        frontier.push((x + 1, y));
                    }
                    if y > 0 {
                        frontier.push((x, y - 1));
                    }
                    if y + 1 < height {
                        frontier.push((x, y + 1));
                    }
                }
            }
            for (x, y) in frontier {
                self.science.set(x, y, NO_DATA);
            }
        }
    }

    /// Force one science pixel to NO_DATA. Used by the stack-level global
    /// mask, which decides per pixel across frames.
    pub(crate) fn set_science_pixel_no_data(&mut self, x: usize, y: usize) {
        self.science.set(x, y, NO_DATA);
    }

    /// Convolve the science plane with this exposure's PSF, in place.
    pub fn convolve_psf(&mut self) {
        let psf = self.psf.clone();
        self.science.convolve(&psf);
    }
}
