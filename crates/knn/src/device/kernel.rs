//! The per-lane distance body shared by every device.

use crate::distance;
use crate::metric::DistanceMetric;

use super::LaunchGeometry;

/// One distance computation per lane over a flat row-major dataset.
///
/// Lane `i` reads row `i` of the dataset and the whole broadcast query, and
/// writes slot `i` of the output. Lanes past the last candidate are padding
/// and produce nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistanceKernel {
    n_candidates: usize,
    n_dims: usize,
    metric: DistanceMetric,
}

impl DistanceKernel {
    /// Kernel over `n_candidates` rows of width `n_dims`.
    pub fn new(n_candidates: usize, n_dims: usize, metric: DistanceMetric) -> Self {
        Self {
            n_candidates,
            n_dims,
            metric,
        }
    }

    /// Number of candidate rows.
    pub fn n_candidates(&self) -> usize {
        self.n_candidates
    }

    /// Width of each row and of the query.
    pub fn n_dims(&self) -> usize {
        self.n_dims
    }

    /// Metric evaluated by every lane.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Launch geometry covering every candidate.
    pub fn geometry(&self) -> LaunchGeometry {
        LaunchGeometry::for_candidates(self.n_candidates)
    }

    /// Runs lane `lane`.
    ///
    /// Returns `None` for padding lanes (`lane >= n_candidates`). Uses the
    /// reference formulas, so results are bit-identical to
    /// [`distance::euclidean`] and [`distance::manhattan`].
    #[inline]
    pub fn lane(&self, lane: usize, data: &[f64], query: &[f64]) -> Option<f64> {
        if lane >= self.n_candidates {
            return None;
        }
        let start = lane * self.n_dims;
        let point = &data[start..start + self.n_dims];
        Some(match self.metric {
            DistanceMetric::Euclidean => distance::euclidean(query, point),
            DistanceMetric::Manhattan => distance::manhattan(query, point),
        })
    }
}
