//! Trajectory records and their deterministic ranking.

use std::cmp::Ordering;
use std::fmt;

use bytemuck::{Pod, Zeroable};

/// A linear motion hypothesis and its evaluated statistics.
///
/// The layout is `#[repr(C)]` and bit-for-bit identical to the WGSL
/// `Trajectory` struct in the GPU kernel's output buffer, so readback is
/// a single `bytemuck` cast.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Trajectory {
    /// Starting pixel column at t = 0.
    pub x: i32,
    /// Starting pixel row at t = 0.
    pub y: i32,
    /// Velocity in pixels per time unit along x.
    pub vx: f32,
    /// Velocity in pixels per time unit along y.
    pub vy: f32,
    /// Co-added likelihood Σψ / √Σφ over the contributing frames.
    pub lh: f32,
    /// Flux estimate Σψ / Σφ over the contributing frames.
    pub flux: f32,
    /// Number of frames that contributed a valid in-bounds sample.
    pub obs_count: u32,
}

impl Trajectory {
    /// An empty output slot: never compares better than a real result
    /// and is filtered out before ranking.
    pub(crate) fn empty(x: i32, y: i32) -> Self {
        Trajectory {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            lh: f32::NEG_INFINITY,
            flux: 0.0,
            obs_count: 0,
        }
    }

    /// Whether this record holds a real evaluation result.
    pub(crate) fn is_populated(&self) -> bool {
        self.obs_count > 0
    }

    /// The total ranking order: likelihood, then flux, then observation
    /// count (all descending), then (x, y, vx, vy) ascending.
    ///
    /// `Ordering::Less` means "ranks ahead of". Built on `f32::total_cmp`
    /// so equal inputs always produce the identical ranked list.
    pub fn cmp_ranked(&self, other: &Trajectory) -> Ordering {
        other
            .lh
            .total_cmp(&self.lh)
            .then(other.flux.total_cmp(&self.flux))
            .then(other.obs_count.cmp(&self.obs_count))
            .then(self.x.cmp(&other.x))
            .then(self.y.cmp(&other.y))
            .then(self.vx.total_cmp(&other.vx))
            .then(self.vy.total_cmp(&other.vy))
    }
}

/// The results-file line format: `lh flux x y vx vy obs_count`.
impl fmt::Display for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.lh, self.flux, self.x, self.y, self.vx, self.vy, self.obs_count
        )
    }
}
