//! Engine that computes distances on a data-parallel device.

use tracing::debug;

use crate::config::KnnConfig;
use crate::device::{self, Device};
use crate::engine::{Backend, FitState, KNeighbors};
use crate::error::KnnError;
use crate::matrix::FeatureMatrix;
use crate::metric::DistanceMetric;
use crate::result::Neighbors;

/// Runs one distance lane per candidate on `D`, then selects the top k on
/// the host.
///
/// Each call uploads the matrix, stages the query, launches, waits and
/// copies back; every device allocation is released before the call
/// returns. Index sets match [`ScalarKNeighbors`](crate::ScalarKNeighbors)
/// for the same input.
#[derive(Debug)]
pub struct ParallelKNeighbors<D: Device> {
    device: D,
    k: usize,
    metric: DistanceMetric,
    state: FitState,
}

impl<D: Device> ParallelKNeighbors<D> {
    /// Creates an unfitted engine on `device`.
    ///
    /// # Errors
    ///
    /// [`KnnError::InvalidK`] if the configured k is zero.
    pub fn new(device: D, config: &KnnConfig) -> Result<Self, KnnError> {
        config.validate()?;
        Ok(Self {
            device,
            k: config.k(),
            metric: config.metric(),
            state: FitState::default(),
        })
    }

    /// The device distances run on.
    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: Device> KNeighbors for ParallelKNeighbors<D> {
    fn fit(&mut self, matrix: FeatureMatrix) -> Result<(), KnnError> {
        debug!(n = matrix.n_rows(), d = matrix.n_dims(), device = self.device.name(), "fit");
        self.state.fit(matrix, None)
    }

    fn fit_labeled(&mut self, matrix: FeatureMatrix, labels: Vec<String>) -> Result<(), KnnError> {
        debug!(
            n = matrix.n_rows(),
            d = matrix.n_dims(),
            device = self.device.name(),
            "fit with labels"
        );
        self.state.fit(matrix, Some(labels))
    }

    fn kneighbors(&self, query: &[f64], k: usize) -> Result<Neighbors, KnnError> {
        let (fitted, k_eff) = self.state.prepare(query, k)?;
        let matrix = fitted.matrix();

        let distances = device::compute_distances(&self.device, matrix, query, self.metric)?;
        debug!(
            n = matrix.n_rows(),
            k = k_eff,
            metric = %self.metric,
            device = self.device.name(),
            "predict"
        );
        Ok(fitted.neighbors(&distances, k_eff))
    }

    fn k(&self) -> usize {
        self.k
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn set_metric(&mut self, metric: DistanceMetric) {
        self.metric = metric;
    }

    fn backend(&self) -> Backend {
        Backend::Parallel(self.device.kind())
    }

    fn n_dims(&self) -> Option<usize> {
        self.state.fitted().map(|f| f.matrix().n_dims())
    }

    fn n_candidates(&self) -> Option<usize> {
        self.state.fitted().map(|f| f.matrix().n_rows())
    }
}
