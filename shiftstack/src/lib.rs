//! SHIFTSTACK - moving-object detection by shift-and-stack matched filtering.
//!
//! Detects faint, linearly-moving point sources in a time-ordered stack of
//! astronomical exposures. No single frame shows the target; the engine
//! shifts every frame along a hypothesized velocity and co-adds the
//! matched-filter signal, exhaustively, for a dense grid of velocity
//! hypotheses at every starting pixel.
//!
//! # Pipeline
//!
//! 1. **Ingest** - the caller (or a [`FrameLoader`]) supplies science,
//!    variance, and mask planes plus a timestamp and PSF per exposure,
//!    assembled into an [`ImageStack`].
//! 2. **Mask** - instrument flags, brightness thresholds, and
//!    repeat-offender pixels become [`NO_DATA`] science pixels.
//! 3. **Matched filter** - each frame becomes a ψ (numerator) and φ
//!    (denominator) plane; see [`PsiPhi`].
//! 4. **Evaluate** - for every starting pixel and candidate velocity, the
//!    evaluator accumulates ψ/φ along the line and scores the hypothesis.
//!    Runs on the GPU via wgpu, or on the CPU when no adapter exists.
//! 5. **Select** - top-K per pixel, then a deterministic global ranking;
//!    results page out through [`StackSearch::get_results`] or to disk.
//!
//! # Quick start
//!
//! ```no_run
//! use shiftstack::{ImageStack, SearchConfig, StackSearch};
//!
//! # fn frames() -> Vec<shiftstack::LayeredImage> { unimplemented!() }
//! let stack = ImageStack::new(frames())?;
//! let mut search = StackSearch::new(stack);
//! let config = SearchConfig {
//!     num_velocities: 50,
//!     min_velocity: 50.0,
//!     max_velocity: 300.0,
//!     num_angles: 25,
//!     min_angle: -0.5,
//!     max_angle: 0.5,
//!     min_observations: 10,
//!     ..SearchConfig::default()
//! };
//! let results = search.search(&config)?;
//! println!("best candidate: {}", results[0]);
//! # Ok::<(), shiftstack::SearchError>(())
//! ```

pub mod error;
pub mod image;
pub mod psf;
pub mod psiphi;
pub mod search;
pub mod trajectory;

pub use error::SearchError;
pub use image::{pixel_has_data, FrameLoader, ImageStack, LayeredImage, RawImage, NO_DATA};
pub use psf::Psf;
pub use psiphi::PsiPhi;
pub use search::{Mode, SearchConfig, StackSearch};
pub use trajectory::Trajectory;
