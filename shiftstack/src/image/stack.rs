//! Time-ordered collections of layered images.
//!
//! An [`ImageStack`] owns the exposures the search runs over. All frames
//! share one (width, height); times are exposed zero-shifted so the first
//! frame sits at t = 0 and trajectory velocities are "pixels per time
//! unit since the first exposure".
//!
//! Frames are held by value. Callers that need to modify an exposure go
//! through [`ImageStack::frame_mut`] or the [`ImageStack::inject_object`]
//! primitive - there are no shared mutable handles to frames.

use std::path::{Path, PathBuf};

use log::info;

use crate::error::SearchError;
use crate::image::layered::LayeredImage;
use crate::image::raw::pixel_has_data;

/// Source of layered images, implemented by the out-of-scope file reader.
///
/// The engine never parses FITS itself; a loader turns a path into the
/// science/variance/mask planes, timestamp, and PSF of one exposure.
pub trait FrameLoader {
    /// Load one exposure from disk.
    fn load(&self, path: &Path) -> Result<LayeredImage, SearchError>;
}

/// An ordered, dimension-homogeneous stack of exposures.
#[derive(Debug, Clone)]
pub struct ImageStack {
    frames: Vec<LayeredImage>,
    /// Times relative to the first frame (t[0] == 0).
    zeroed_times: Vec<f64>,
}

impl ImageStack {
    /// Build a stack from frames already in memory.
    ///
    /// Fails with [`SearchError::EmptyStack`] on an empty list and
    /// [`SearchError::InvalidShape`] if any frame disagrees on
    /// dimensions.
    pub fn new(frames: Vec<LayeredImage>) -> Result<Self, SearchError> {
        let first = frames.first().ok_or(SearchError::EmptyStack)?;
        let (width, height) = (first.width(), first.height());
        for (index, frame) in frames.iter().enumerate() {
            if (frame.width(), frame.height()) != (width, height) {
                return Err(SearchError::InvalidShape(format!(
                    "frame {index} is {}x{}, expected {width}x{height}",
                    frame.width(),
                    frame.height()
                )));
            }
        }
        let zeroed_times = zero_shift(frames.iter().map(LayeredImage::time));
        Ok(ImageStack {
            frames,
            zeroed_times,
        })
    }

    /// Build a stack by loading each path through the external loader.
    pub fn from_loader<L: FrameLoader>(
        loader: &L,
        paths: &[PathBuf],
    ) -> Result<Self, SearchError> {
        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            frames.push(loader.load(path)?);
        }
        info!("loaded {} frames from disk", frames.len());
        Self::new(frames)
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// A stack is never empty once constructed.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame width in pixels.
    pub fn width(&self) -> usize {
        self.frames[0].width()
    }

    /// Frame height in pixels.
    pub fn height(&self) -> usize {
        self.frames[0].height()
    }

    /// All frames, in time order.
    pub fn frames(&self) -> &[LayeredImage] {
        &self.frames
    }

    /// One frame by index.
    pub fn frame(&self, index: usize) -> &LayeredImage {
        &self.frames[index]
    }

    /// Mutable access to one frame.
    ///
    /// Plane swaps go through the frame's dimension-checked setters, so a
    /// caller cannot break the stack's shape invariant from here.
    pub fn frame_mut(&mut self, index: usize) -> &mut LayeredImage {
        &mut self.frames[index]
    }

    /// Times relative to the first frame (first entry is 0).
    pub fn times(&self) -> &[f64] {
        &self.zeroed_times
    }

    /// Override every frame's timestamp.
    ///
    /// The length must match the frame count. Relative times are
    /// recomputed, so `times()[0]` is 0 afterwards regardless of the raw
    /// values supplied.
    pub fn set_times(&mut self, times: &[f64]) -> Result<(), SearchError> {
        if times.len() != self.frames.len() {
            return Err(SearchError::InvalidShape(format!(
                "got {} times for {} frames",
                times.len(),
                self.frames.len()
            )));
        }
        for (frame, &time) in self.frames.iter_mut().zip(times) {
            frame.set_time(time);
        }
        self.zeroed_times = zero_shift(times.iter().copied());
        Ok(())
    }

    /// Inject a synthetic source moving at (vx, vy) pixels per time unit
    /// from (x, y) at the first exposure.
    ///
    /// Each frame receives the source at its zero-shifted time, spread by
    /// that frame's own PSF. Positions that drift off the frame simply
    /// deposit nothing - exactly what a real object leaving the field
    /// does.
    pub fn inject_object(&mut self, x: f32, y: f32, vx: f32, vy: f32, flux: f32) {
        for index in 0..self.frames.len() {
            let t = self.zeroed_times[index] as f32;
            self.frames[index].add_object(x + vx * t, y + vy * t, flux);
        }
    }

    /// Apply [`LayeredImage::apply_mask_flags`] to every frame.
    pub fn apply_mask_flags(&mut self, flag_mask: u32, exceptions: &[u32]) {
        for frame in &mut self.frames {
            frame.apply_mask_flags(flag_mask, exceptions);
        }
    }

    /// Apply [`LayeredImage::apply_mask_threshold`] to every frame.
    pub fn apply_mask_threshold(&mut self, threshold: f32) {
        for frame in &mut self.frames {
            frame.apply_mask_threshold(threshold);
        }
    }

    /// Mask pixels that are flagged in strictly more than `threshold`
    /// frames, in every frame.
    ///
    /// A detector defect shows up at the same (x, y) exposure after
    /// exposure; a real transient does not. Pixels whose
    /// `mask & flag_mask` is non-zero in more than `threshold` frames are
    /// set to NO_DATA across the whole stack.
    pub fn apply_global_mask(&mut self, flag_mask: u32, threshold: usize) {
        let width = self.width();
        let height = self.height();

        let mut counts = vec![0usize; width * height];
        for frame in &self.frames {
            for ((row, col), &flags) in frame.mask().indexed_iter() {
                if flags & flag_mask != 0 {
                    counts[row * width + col] += 1;
                }
            }
        }

        let mut masked = 0usize;
        for row in 0..height {
            for col in 0..width {
                if counts[row * width + col] > threshold {
                    masked += 1;
                    for frame in &mut self.frames {
                        frame.set_science_pixel_no_data(col, row);
                    }
                }
            }
        }
        info!(
            "global mask: {masked} of {} pixels flagged in more than {threshold} frames",
            width * height
        );
    }

    /// Convolve every frame's science plane with its own PSF.
    pub fn convolve_psf(&mut self) {
        for frame in &mut self.frames {
            frame.convolve_psf();
        }
    }

    /// Dilate every frame's NO_DATA region by `steps` rings.
    pub fn grow_mask(&mut self, steps: usize) {
        for frame in &mut self.frames {
            frame.grow_mask(steps);
        }
    }

    /// Fraction of science pixels that still carry data, across all
    /// frames. Diagnostic for logging after the masking passes.
    pub fn valid_pixel_fraction(&self) -> f64 {
        let mut valid = 0usize;
        let mut total = 0usize;
        for frame in &self.frames {
            total += frame.pixels_per_image();
            valid += frame
                .science()
                .pixels()
                .iter()
                .filter(|&&v| pixel_has_data(v))
                .count();
        }
        valid as f64 / total as f64
    }
}

fn zero_shift(times: impl Iterator<Item = f64>) -> Vec<f64> {
    let raw: Vec<f64> = times.collect();
    let t0 = raw.first().copied().unwrap_or(0.0);
    raw.into_iter().map(|t| t - t0).collect()
}
