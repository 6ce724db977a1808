//! CPU trajectory evaluator.
//!
//! Implements the identical contract to the GPU kernel - same inner loop,
//! same skip rules, same per-pixel top-K - at reduced throughput. Used
//! when no accelerator is present and by the test suite, which must run
//! without one.

use log::debug;
use rayon::prelude::*;

use crate::image::raw::pixel_has_data;
use crate::psiphi::PsiPhi;
use crate::search::grid::SearchConfig;
use crate::search::selector::TopK;
use crate::trajectory::Trajectory;

/// Evaluate every candidate at every starting pixel, keeping the K best
/// per pixel. Returns the unranked survivor pool.
pub(crate) fn evaluate(
    psi_phi: &PsiPhi,
    candidates: &[(f32, f32)],
    config: &SearchConfig,
) -> Vec<Trajectory> {
    let width = psi_phi.width();
    let height = psi_phi.height();

    debug!(
        "cpu evaluator: {}x{} pixels x {} candidates over {} frames",
        width,
        height,
        candidates.len(),
        psi_phi.num_frames()
    );

    // Rows are independent; each produces its own survivor list and the
    // global sort downstream erases any scheduling order.
    (0..height)
        .into_par_iter()
        .flat_map_iter(|y0| {
            let mut row_survivors = Vec::new();
            for x0 in 0..width {
                let mut topk = TopK::new(config.results_per_pixel);
                for &(vx, vy) in candidates {
                    if let Some(trajectory) =
                        evaluate_candidate(psi_phi, x0 as i32, y0 as i32, vx, vy, config)
                    {
                        topk.offer(trajectory);
                    }
                }
                row_survivors.extend(topk.into_vec());
            }
            row_survivors.into_iter()
        })
        .collect()
}

/// Score a single (x₀, y₀, vx, vy) hypothesis across the stack.
///
/// Frames whose sample leaves the image, lands on masked ψ, or has a
/// non-positive φ contribute nothing. Returns `None` when fewer than
/// `min_observations` frames contribute or the φ sum is not positive.
fn evaluate_candidate(
    psi_phi: &PsiPhi,
    x0: i32,
    y0: i32,
    vx: f32,
    vy: f32,
    config: &SearchConfig,
) -> Option<Trajectory> {
    let mut sum_psi = 0.0f32;
    let mut sum_phi = 0.0f32;
    let mut obs_count = 0u32;

    for (frame, &t) in psi_phi.times.iter().enumerate() {
        let x = x0 as f32 + vx * t;
        let y = y0 as f32 + vy * t;
        if !psi_phi.psi[frame].contains(x, y) {
            continue;
        }
        let psi = psi_phi.psi[frame].interpolate(x, y);
        if !pixel_has_data(psi) {
            continue;
        }
        let phi = psi_phi.phi[frame].interpolate(x, y);
        if !pixel_has_data(phi) || phi <= 0.0 {
            continue;
        }
        sum_psi += psi;
        sum_phi += phi;
        obs_count += 1;
    }

    if obs_count < config.min_observations || sum_phi <= 0.0 {
        return None;
    }
    Some(Trajectory {
        x: x0,
        y: y0,
        vx,
        vy,
        lh: sum_psi / sum_phi.sqrt(),
        flux: sum_psi / sum_phi,
        obs_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::layered::LayeredImage;
    use crate::image::raw::RawImage;
    use crate::image::stack::ImageStack;
    use crate::psf::Psf;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    /// Noiseless stack with a moving source: every pixel of the science
    /// planes is zero except the injected object.
    fn moving_source_stack(n: usize, x: f32, y: f32, vx: f32, vy: f32) -> ImageStack {
        let frames = (0..n)
            .map(|i| {
                LayeredImage::new(
                    RawImage::zeros(40, 40),
                    RawImage::from_array(Array2::from_elem((40, 40), 4.0)),
                    Array2::zeros((40, 40)),
                    i as f64,
                    Psf::gaussian(1.0),
                )
                .unwrap()
            })
            .collect();
        let mut stack = ImageStack::new(frames).unwrap();
        stack.inject_object(x, y, vx, vy, 1000.0);
        stack
    }

    fn config(min_obs: u32, k: usize) -> SearchConfig {
        SearchConfig {
            min_observations: min_obs,
            results_per_pixel: k,
            ..SearchConfig::default()
        }
    }

    #[test]
    fn test_candidate_statistics_follow_likelihood_law() {
        let stack = moving_source_stack(5, 10.0, 12.0, 2.0, 1.0);
        let psi_phi = PsiPhi::build(&stack).unwrap();

        let t = evaluate_candidate(&psi_phi, 10, 12, 2.0, 1.0, &config(1, 8))
            .expect("true trajectory must score");
        assert_eq!(t.obs_count, 5);
        assert!(t.lh > 0.0);

        // lh = Σψ/√Σφ and flux = Σψ/Σφ must be mutually consistent:
        // flux = lh / √Σφ  ⇒  lh² / flux = Σφ and lh·√Σφ = Σψ.
        let sum_phi = (t.lh / t.flux).powi(2);
        let sum_psi = t.flux * sum_phi;
        assert_relative_eq!(t.lh, sum_psi / sum_phi.sqrt(), max_relative = 1e-4);
        assert_relative_eq!(t.flux, sum_psi / sum_phi, max_relative = 1e-4);
    }

    #[test]
    fn test_true_velocity_outscores_wrong_velocity() {
        let stack = moving_source_stack(8, 6.0, 20.0, 3.0, 0.0);
        let psi_phi = PsiPhi::build(&stack).unwrap();
        let cfg = config(1, 8);

        let on = evaluate_candidate(&psi_phi, 6, 20, 3.0, 0.0, &cfg).unwrap();
        let off = evaluate_candidate(&psi_phi, 6, 20, -3.0, 0.0, &cfg).unwrap();
        assert!(
            on.lh > 3.0 * off.lh.abs(),
            "on-track lh {} should dwarf off-track lh {}",
            on.lh,
            off.lh
        );
    }

    #[test]
    fn test_out_of_bounds_frames_skipped() {
        // Source exits a 40-wide frame: x = 30 + 4t crosses the right edge
        // before the last frames.
        let stack = moving_source_stack(8, 30.0, 20.0, 4.0, 0.0);
        let psi_phi = PsiPhi::build(&stack).unwrap();

        let t = evaluate_candidate(&psi_phi, 30, 20, 4.0, 0.0, &config(1, 8)).unwrap();
        // Samples at t = 0, 1, 2 are in bounds (x = 30, 34, 38); later
        // ones are not (38 + 4 = 42 ≥ 40). The bilinear support shaves
        // nothing here because 38 < 39 = W-1.
        assert_eq!(t.obs_count, 3);
    }

    #[test]
    fn test_min_observations_enforced() {
        let stack = moving_source_stack(8, 30.0, 20.0, 4.0, 0.0);
        let psi_phi = PsiPhi::build(&stack).unwrap();
        assert!(evaluate_candidate(&psi_phi, 30, 20, 4.0, 0.0, &config(4, 8)).is_none());
        assert!(evaluate_candidate(&psi_phi, 30, 20, 4.0, 0.0, &config(3, 8)).is_some());
    }

    #[test]
    fn test_fully_out_of_bounds_candidate_discarded() {
        let stack = moving_source_stack(4, 10.0, 10.0, 0.0, 0.0);
        let psi_phi = PsiPhi::build(&stack).unwrap();
        // A start outside the frame never samples anything.
        assert!(evaluate_candidate(&psi_phi, -5, 10, 1.0, 0.0, &config(1, 8)).is_none());
    }

    #[test]
    fn test_evaluate_respects_k_per_pixel() {
        let stack = moving_source_stack(4, 10.0, 10.0, 1.0, 0.0);
        let psi_phi = PsiPhi::build(&stack).unwrap();
        let cfg = config(1, 2);
        let candidates: Vec<(f32, f32)> =
            (0..6).map(|i| (i as f32 * 0.5, 0.0)).collect();

        let results = evaluate(&psi_phi, &candidates, &cfg);
        // 40x40 pixels, every candidate stays in bounds at v <= 2.5 over
        // 3 time units for interior starts, so each pixel fills its K.
        let per_pixel = results
            .iter()
            .filter(|t| t.x == 10 && t.y == 10)
            .count();
        assert_eq!(per_pixel, 2);
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let stack = moving_source_stack(5, 12.0, 15.0, 2.0, -1.0);
        let psi_phi = PsiPhi::build(&stack).unwrap();
        let cfg = config(2, 4);
        let candidates = vec![(2.0, -1.0), (1.0, 0.0), (0.0, 0.0)];

        let mut a = evaluate(&psi_phi, &candidates, &cfg);
        let mut b = evaluate(&psi_phi, &candidates, &cfg);
        a.sort_unstable_by(Trajectory::cmp_ranked);
        b.sort_unstable_by(Trajectory::cmp_ranked);
        assert_eq!(a, b);
    }
}
