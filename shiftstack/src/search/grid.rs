//! Search specification and candidate-velocity grid expansion.

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// How the trajectory evaluation is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Mode {
    /// Use the GPU when an adapter exists, otherwise warn and fall back
    /// to the CPU evaluator.
    #[default]
    Auto,
    /// Require the GPU; fail with `DeviceUnavailable` if none is found.
    Gpu,
    /// Force the CPU evaluator (used by the test suite, which must not
    /// depend on an accelerator being present).
    Cpu,
}

/// Full specification of one exhaustive search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of velocity magnitudes in the grid.
    pub num_velocities: usize,
    /// Smallest velocity magnitude (pixels per time unit).
    pub min_velocity: f32,
    /// Largest velocity magnitude (pixels per time unit).
    pub max_velocity: f32,
    /// Number of angles in the grid.
    pub num_angles: usize,
    /// Smallest angle (radians, counterclockwise from +x).
    pub min_angle: f32,
    /// Largest angle (radians, counterclockwise from +x).
    pub max_angle: f32,
    /// Minimum number of contributing frames for a trajectory to be kept.
    pub min_observations: u32,
    /// Survivors kept per starting pixel (K).
    pub results_per_pixel: usize,
    /// Optional global likelihood floor applied during final ranking.
    pub min_likelihood: Option<f32>,
    /// Execution mode for the evaluator.
    pub mode: Mode,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            num_velocities: 1,
            min_velocity: 0.0,
            max_velocity: 0.0,
            num_angles: 1,
            min_angle: 0.0,
            max_angle: 0.0,
            min_observations: 1,
            results_per_pixel: 8,
            min_likelihood: None,
            mode: Mode::Auto,
        }
    }
}

impl SearchConfig {
    /// Check the grid parameters, rejecting degenerate specifications.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.num_velocities < 1 {
            return Err(SearchError::BadSearchSpec(
                "num_velocities must be at least 1".into(),
            ));
        }
        if self.num_angles < 1 {
            return Err(SearchError::BadSearchSpec(
                "num_angles must be at least 1".into(),
            ));
        }
        if self.min_velocity > self.max_velocity {
            return Err(SearchError::BadSearchSpec(format!(
                "min_velocity {} exceeds max_velocity {}",
                self.min_velocity, self.max_velocity
            )));
        }
        if self.min_angle > self.max_angle {
            return Err(SearchError::BadSearchSpec(format!(
                "min_angle {} exceeds max_angle {}",
                self.min_angle, self.max_angle
            )));
        }
        if self.min_observations < 1 {
            return Err(SearchError::BadSearchSpec(
                "min_observations must be at least 1".into(),
            ));
        }
        if self.results_per_pixel < 1 {
            return Err(SearchError::BadSearchSpec(
                "results_per_pixel must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Expand the grid into concrete (vx, vy) candidates.
    ///
    /// Sample points use the half-open spacing
    /// `value_i = min + i * (max - min) / n`, so the lower bound is always
    /// on the grid and the upper bound is approached but not included
    /// (for n = 1 the single sample sits at the lower bound). Candidates
    /// are the Cartesian product, angles in the outer loop; the count is
    /// exactly `num_angles * num_velocities`.
    pub fn candidates(&self) -> Vec<(f32, f32)> {
        let velocity_step = (self.max_velocity - self.min_velocity) / self.num_velocities as f32;
        let angle_step = (self.max_angle - self.min_angle) / self.num_angles as f32;

        let mut grid = Vec::with_capacity(self.num_angles * self.num_velocities);
        for a in 0..self.num_angles {
            let angle = self.min_angle + a as f32 * angle_step;
            let (sin, cos) = angle.sin_cos();
            for v in 0..self.num_velocities {
                let velocity = self.min_velocity + v as f32 * velocity_step;
                grid.push((velocity * cos, velocity * sin));
            }
        }
        grid
    }
}
