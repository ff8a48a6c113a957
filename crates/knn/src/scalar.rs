//! Single-threaded engine.

use tracing::debug;

use crate::config::KnnConfig;
use crate::distance::{Evaluation, distances_into};
use crate::engine::{Backend, FitState, KNeighbors};
use crate::error::KnnError;
use crate::matrix::FeatureMatrix;
use crate::metric::DistanceMetric;
use crate::result::Neighbors;

/// Computes every distance on the calling thread, then selects the top k.
///
/// Cloning shares the fitted matrix.
#[derive(Debug, Clone)]
pub struct ScalarKNeighbors {
    k: usize,
    metric: DistanceMetric,
    evaluation: Evaluation,
    state: FitState,
}

impl ScalarKNeighbors {
    /// Creates an unfitted engine.
    ///
    /// # Errors
    ///
    /// [`KnnError::InvalidK`] if the configured k is zero.
    pub fn new(config: &KnnConfig) -> Result<Self, KnnError> {
        config.validate()?;
        Ok(Self {
            k: config.k(),
            metric: config.metric(),
            evaluation: config.evaluation(),
            state: FitState::default(),
        })
    }

    /// The scalar evaluation path in use.
    pub fn evaluation(&self) -> Evaluation {
        self.evaluation
    }
}

impl KNeighbors for ScalarKNeighbors {
    fn fit(&mut self, matrix: FeatureMatrix) -> Result<(), KnnError> {
        debug!(n = matrix.n_rows(), d = matrix.n_dims(), backend = "scalar", "fit");
        self.state.fit(matrix, None)
    }

    fn fit_labeled(&mut self, matrix: FeatureMatrix, labels: Vec<String>) -> Result<(), KnnError> {
        debug!(n = matrix.n_rows(), d = matrix.n_dims(), backend = "scalar", "fit with labels");
        self.state.fit(matrix, Some(labels))
    }

    fn kneighbors(&self, query: &[f64], k: usize) -> Result<Neighbors, KnnError> {
        let (fitted, k_eff) = self.state.prepare(query, k)?;
        let matrix = fitted.matrix();

        let mut distances = vec![0.0; matrix.n_rows()];
        distances_into(
            matrix.as_flat(),
            matrix.n_dims(),
            query,
            self.metric,
            self.evaluation,
            &mut distances,
        );
        debug!(n = matrix.n_rows(), k = k_eff, metric = %self.metric, backend = "scalar", "predict");
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
        Backend::Scalar
    }

    fn n_dims(&self) -> Option<usize> {
        self.state.fitted().map(|f| f.matrix().n_dims())
    }

    fn n_candidates(&self) -> Option<usize> {
        self.state.fitted().map(|f| f.matrix().n_rows())
    }
}
