//! Per-pixel top-K selection and global result ranking.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::trajectory::Trajectory;

/// Heap entry ordered by the ranking relation.
///
/// `cmp_ranked` returns `Less` for "ranks ahead of", so in a max-heap the
/// worst-ranked survivor sits at the top, ready to be evicted.
struct Ranked(Trajectory);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.0.cmp_ranked(&other.0) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp_ranked(&other.0)
    }
}

/// Bounded keeper of the K best trajectories for one starting pixel.
pub(crate) struct TopK {
    heap: BinaryHeap<Ranked>,
    capacity: usize,
}

impl TopK {
    pub fn new(capacity: usize) -> Self {
        TopK {
            heap: BinaryHeap::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Offer a candidate; it is kept only while it ranks among the best K
    /// seen so far.
    pub fn offer(&mut self, candidate: Trajectory) {
        if self.heap.len() < self.capacity {
            self.heap.push(Ranked(candidate));
            return;
        }
        if let Some(worst) = self.heap.peek() {
            if candidate.cmp_ranked(&worst.0) == Ordering::Less {
                self.heap.pop();
                self.heap.push(Ranked(candidate));
            }
        }
    }

    /// Drain the survivors (in no particular order - the global sort
    /// establishes the final ranking).
    pub fn into_vec(self) -> Vec<Trajectory> {
        self.heap.into_iter().map(|ranked| ranked.0).collect()
    }
}

/// Globally rank evaluator output: drop empty slots, apply the optional
/// likelihood floor, and sort best-first by the total order.
pub(crate) fn rank_results(
    mut results: Vec<Trajectory>,
    min_likelihood: Option<f32>,
) -> Vec<Trajectory> {
    results.retain(|t| t.is_populated());
    if let Some(floor) = min_likelihood {
        results.retain(|t| t.lh >= floor);
    }
    results.sort_unstable_by(Trajectory::cmp_ranked);
    results
}
