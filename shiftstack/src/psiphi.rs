//! Matched-filter ψ and φ plane construction.
//!
//! For each frame the builder converts (science, variance, mask, PSF)
//! into the pair of planes the trajectory evaluator consumes:
//!
//! - ψ = convolve(science / variance, psf) - the matched-filter
//!   numerator. Invalid pixels (masked science, non-positive or masked
//!   variance) are carried through as [`NO_DATA`] so the evaluator can
//!   skip them.
//! - φ = convolve(1 / variance, psf²) - the denominator. Invalid pixels
//!   are excluded from the convolution and set to 0 in the output, which
//!   the evaluator's `φ ≤ 0` guard treats as "no measurement".
//!
//! The pair is a sufficient statistic for every trajectory: co-added
//! flux is Σψ/Σφ and co-added likelihood is Σψ/√Σφ.

use std::fs;
use std::io::Write;
use std::path::Path;

use log::info;
use rayon::prelude::*;

use crate::error::SearchError;
use crate::image::layered::LayeredImage;
use crate::image::raw::{pixel_has_data, RawImage, NO_DATA};
use crate::image::stack::ImageStack;

/// Per-frame ψ/φ planes plus the evaluator's time vector.
#[derive(Debug, Clone)]
pub struct PsiPhi {
    /// Matched-filter numerator planes, one per frame.
    pub psi: Vec<RawImage>,
    /// Matched-filter denominator planes, one per frame.
    pub phi: Vec<RawImage>,
    /// Zero-shifted frame times, narrowed to f32 for the evaluator.
    pub times: Vec<f32>,
}

impl PsiPhi {
    /// Build the ψ/φ planes for every frame of a stack.
    ///
    /// Frames are processed in parallel; each frame uses its own PSF.
    pub fn build(stack: &ImageStack) -> Result<Self, SearchError> {
        if stack.is_empty() {
            return Err(SearchError::EmptyStack);
        }

        let planes: Vec<(RawImage, RawImage)> = stack
            .frames()
            .par_iter()
            .map(build_frame_planes)
            .collect();

        let (psi, phi) = planes.into_iter().unzip();
        let times = stack.times().iter().map(|&t| t as f32).collect();
        info!("built psi/phi planes for {} frames", stack.len());
        Ok(PsiPhi { psi, phi, times })
    }

    /// Number of frames.
    pub fn num_frames(&self) -> usize {
        self.psi.len()
    }

    /// Plane width in pixels.
    pub fn width(&self) -> usize {
        self.psi[0].width()
    }

    /// Plane height in pixels.
    pub fn height(&self) -> usize {
        self.psi[0].height()
    }

    /// Dump every ψ and φ plane as little-endian f32 blobs named by frame
    /// index (`0007.f32`), one directory per plane kind.
    ///
    /// Diagnostic surface only - nothing in the engine reads these back.
    pub fn write_debug_planes(&self, psi_dir: &Path, phi_dir: &Path) -> Result<(), SearchError> {
        write_plane_dir(&self.psi, psi_dir)?;
        write_plane_dir(&self.phi, phi_dir)?;
        info!(
            "wrote {} psi planes to {} and {} phi planes to {}",
            self.psi.len(),
            psi_dir.display(),
            self.phi.len(),
            phi_dir.display()
        );
        Ok(())
    }
}

/// ψ/φ planes for a single frame.
fn build_frame_planes(frame: &LayeredImage) -> (RawImage, RawImage) {
    let width = frame.width();
    let height = frame.height();
    let science = frame.science();
    let variance = frame.variance();

    let mut psi = RawImage::zeros(width, height);
    let mut phi = RawImage::zeros(width, height);
    for y in 0..height {
        for x in 0..width {
            let s = science.get(x, y);
            let v = variance.get(x, y);
            let valid = pixel_has_data(s) && pixel_has_data(v) && v > 0.0;
            psi.set(x, y, if valid { s / v } else { NO_DATA });
            phi.set(x, y, if valid { 1.0 / v } else { NO_DATA });
        }
    }

    psi.convolve(frame.psf());
    phi.convolve(&frame.psf().squared());

    // Masked φ pixels become 0 so the evaluator's φ ≤ 0 guard skips them
    // without a second sentinel check on the device.
    for value in phi.pixels_mut().iter_mut() {
        if !pixel_has_data(*value) {
            *value = 0.0;
        }
    }

    (psi, phi)
}

fn write_plane_dir(planes: &[RawImage], dir: &Path) -> Result<(), SearchError> {
    fs::create_dir_all(dir)?;
    for (index, plane) in planes.iter().enumerate() {
        let path = dir.join(format!("{index:04}.f32"));
        let mut file = fs::File::create(path)?;
        let mut bytes = Vec::with_capacity(plane.pixels().len() * 4);
        for &value in plane.pixels().iter() {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        file.write_all(&bytes)?;
    }
    Ok(())
}
