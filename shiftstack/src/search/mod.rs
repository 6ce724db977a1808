//! The search engine facade.
//!
//! [`StackSearch`] owns a preprocessed [`ImageStack`], builds the ψ/φ
//! planes on demand, dispatches the exhaustive evaluation to the GPU or
//! CPU evaluator, and holds the ranked results for retrieval, lightcurve
//! extraction, stamp cutting, and persistence.

mod cpu;
mod gpu;
pub mod grid;
mod selector;

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use log::{info, warn};
use ndarray::Array2;

use crate::error::SearchError;
use crate::image::raw::{pixel_has_data, NO_DATA};
use crate::image::stack::ImageStack;
use crate::psiphi::PsiPhi;
use crate::trajectory::Trajectory;

pub use grid::{Mode, SearchConfig};

/// One search session over one image stack.
pub struct StackSearch {
    stack: ImageStack,
    psi_phi: Option<PsiPhi>,
    results: Vec<Trajectory>,
}

impl StackSearch {
    /// Take ownership of a preprocessed stack.
    pub fn new(stack: ImageStack) -> Self {
        StackSearch {
            stack,
            psi_phi: None,
            results: Vec::new(),
        }
    }

    /// The stack being searched.
    pub fn stack(&self) -> &ImageStack {
        &self.stack
    }

    /// Mutable access to the stack (for injection or further masking).
    ///
    /// Invalidates any cached ψ/φ planes and previous results: the next
    /// search re-derives everything from the mutated frames. This is the
    /// inject-and-research workflow.
    pub fn stack_mut(&mut self) -> &mut ImageStack {
        self.psi_phi = None;
        self.results.clear();
        &mut self.stack
    }

    /// Build (or reuse) the ψ/φ planes for the current stack.
    pub fn prepare_psi_phi(&mut self) -> Result<&PsiPhi, SearchError> {
        if self.psi_phi.is_none() {
            self.psi_phi = Some(PsiPhi::build(&self.stack)?);
        }
        Ok(self.psi_phi.as_ref().expect("just built"))
    }

    /// Run the exhaustive grid search and rank the survivors.
    ///
    /// Blocks until every candidate at every starting pixel has been
    /// evaluated; uploads, dispatches, and readback all happen inside
    /// this call. Returns the ranked results, best first.
    pub fn search(&mut self, config: &SearchConfig) -> Result<&[Trajectory], SearchError> {
        config.validate()?;
        if self.stack.is_empty() {
            return Err(SearchError::EmptyStack);
        }

        let candidates = config.candidates();
        info!(
            "searching {} starting pixels x {} candidates over {} frames",
            self.stack.width() * self.stack.height(),
            candidates.len(),
            self.stack.len()
        );

        self.prepare_psi_phi()?;
        let psi_phi = self.psi_phi.as_ref().expect("prepared above");

        let started = Instant::now();
        let raw = match config.mode {
            Mode::Cpu => cpu::evaluate(psi_phi, &candidates, config),
            Mode::Gpu => {
                let evaluator = gpu::GpuEvaluator::new()?;
                evaluator.evaluate(psi_phi, &candidates, config)?
            }
            Mode::Auto => match gpu::GpuEvaluator::new() {
                Ok(evaluator) => evaluator.evaluate(psi_phi, &candidates, config)?,
                Err(SearchError::DeviceUnavailable(reason)) => {
                    warn!("no compute device ({reason}); falling back to the CPU evaluator");
                    cpu::evaluate(psi_phi, &candidates, config)
                }
                Err(other) => return Err(other),
            },
        };

        self.results = selector::rank_results(raw, config.min_likelihood);
        info!(
            "search kept {} trajectories in {:.2}s",
            self.results.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(&self.results)
    }

    /// The full ranked result list from the last search.
    pub fn results(&self) -> &[Trajectory] {
        &self.results
    }

    /// A chunk of the ranked list, clamped to the available range.
    ///
    /// Consumers page through results with increasing offsets until they
    /// hit their own likelihood floor.
    pub fn get_results(&self, offset: usize, count: usize) -> &[Trajectory] {
        let start = offset.min(self.results.len());
        let end = offset.saturating_add(count).min(self.results.len());
        &self.results[start..end]
    }

    /// Per-frame ψ and φ samples along a trajectory.
    ///
    /// Frames where the sample is out of bounds or invalid contribute
    /// (0, 0); the downstream curve filters treat a zero φ as "no
    /// measurement".
    pub fn lightcurve(
        &mut self,
        trajectory: &Trajectory,
    ) -> Result<(Vec<f32>, Vec<f32>), SearchError> {
        self.prepare_psi_phi()?;
        let psi_phi = self.psi_phi.as_ref().expect("prepared above");

        let mut psi_curve = Vec::with_capacity(psi_phi.num_frames());
        let mut phi_curve = Vec::with_capacity(psi_phi.num_frames());
        for (frame, &t) in psi_phi.times.iter().enumerate() {
            let x = trajectory.x as f32 + trajectory.vx * t;
            let y = trajectory.y as f32 + trajectory.vy * t;
            let psi = psi_phi.psi[frame].interpolate(x, y);
            let phi = psi_phi.phi[frame].interpolate(x, y);
            if pixel_has_data(psi) && pixel_has_data(phi) && phi > 0.0 {
                psi_curve.push(psi);
                phi_curve.push(phi);
            } else {
                psi_curve.push(0.0);
                phi_curve.push(0.0);
            }
        }
        Ok((psi_curve, phi_curve))
    }

    /// Science-plane postage stamps along a trajectory, one per frame.
    ///
    /// Each stamp is (2·radius + 1)² centered on the predicted position
    /// rounded to the nearest pixel; positions off the frame fill with
    /// NO_DATA.
    pub fn science_stamps(&self, trajectory: &Trajectory, radius: usize) -> Vec<Array2<f32>> {
        let edge = 2 * radius + 1;
        let width = self.stack.width() as isize;
        let height = self.stack.height() as isize;

        self.stack
            .frames()
            .iter()
            .zip(self.stack.times())
            .map(|(frame, &t)| {
                let cx = (trajectory.x as f64 + trajectory.vx as f64 * t).round() as isize;
                let cy = (trajectory.y as f64 + trajectory.vy as f64 * t).round() as isize;
                Array2::from_shape_fn((edge, edge), |(row, col)| {
                    let px = cx + col as isize - radius as isize;
                    let py = cy + row as isize - radius as isize;
                    if px < 0 || py < 0 || px >= width || py >= height {
                        NO_DATA
                    } else {
                        frame.science().get(px as usize, py as usize)
                    }
                })
            })
            .collect()
    }

    /// Write the top `fraction` of the ranked results as text, one
    /// trajectory per line: `lh flux x y vx vy obs_count`.
    ///
    /// `fraction` is clamped to [0, 1]; 0 writes an empty file, 1 writes
    /// every result.
    pub fn save_results(&self, path: &Path, fraction: f64) -> Result<(), SearchError> {
        let fraction = fraction.clamp(0.0, 1.0);
        let count = ((self.results.len() as f64) * fraction).floor() as usize;

        let file = fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        for trajectory in &self.results[..count] {
            writeln!(writer, "{trajectory}")?;
        }
        writer.flush()?;
        info!(
            "wrote {count} of {} results to {}",
            self.results.len(),
            path.display()
        );
        Ok(())
    }

    /// Dump the ψ/φ planes for offline inspection. See
    /// [`PsiPhi::write_debug_planes`].
    pub fn save_psi_phi(&mut self, psi_dir: &Path, phi_dir: &Path) -> Result<(), SearchError> {
        self.prepare_psi_phi()?;
        self.psi_phi
            .as_ref()
            .expect("prepared above")
            .write_debug_planes(psi_dir, phi_dir)
    }
}
