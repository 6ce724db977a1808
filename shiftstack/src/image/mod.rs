//! Image containers for the stack search.
//!
//! - **raw**: single f32 planes with NO_DATA-aware sampling and
//!   convolution
//! - **layered**: the (science, variance, mask) triple of one exposure
//! - **stack**: the time-ordered frame collection the search runs over

pub mod layered;
pub mod raw;
pub mod stack;

pub use layered::LayeredImage;
pub use raw::{pixel_has_data, RawImage, NO_DATA};
pub use stack::{FrameLoader, ImageStack};
