//! The engine interface shared by every backend.

use std::fmt;
use std::sync::Arc;

use crate::device::DeviceKind;
use crate::error::KnnError;
use crate::matrix::FeatureMatrix;
use crate::metric::DistanceMetric;
use crate::result::Neighbors;
use crate::select::select_k_nearest;

/// Where an engine computes its distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Single-threaded scalar loop.
    Scalar,
    /// One lane per candidate on a data-parallel device.
    Parallel(DeviceKind),
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Scalar => f.write_str("scalar"),
            Backend::Parallel(kind) => write!(f, "parallel ({kind})"),
        }
    }
}

/// Exact k-nearest-neighbor search over a fitted feature matrix.
///
/// An engine starts unfitted. [`fit`](KNeighbors::fit) stores a matrix and
/// may be called again to replace it. Queries must have the fitted width.
/// Results hold at most `k` neighbors, sorted by ascending distance with
/// ties broken by lower row index; a `k` larger than the matrix is
/// truncated to the number of rows.
///
/// A failed call never changes the fitted state.
///
/// # Example
///
/// ```
/// use cadenza_knn::{KNeighbors, KnnConfig, ScalarKNeighbors};
///
/// let mut engine = ScalarKNeighbors::new(&KnnConfig::new(2)).unwrap();
/// engine
///     .fit_rows(vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![5.0, 5.0]])
///     .unwrap();
///
/// let result = engine.predict(&[0.9, 0.9]).unwrap();
/// assert_eq!(result.indices(), &[1, 0]);
/// ```
pub trait KNeighbors: Send + Sync + fmt::Debug {
    /// Stores `matrix` as the candidate set, replacing any previous one.
    fn fit(&mut self, matrix: FeatureMatrix) -> Result<(), KnnError>;

    /// Like [`fit`](KNeighbors::fit), with one label per row.
    ///
    /// # Errors
    ///
    /// [`KnnError::LabelCountMismatch`] if `labels.len() != matrix.n_rows()`.
    fn fit_labeled(&mut self, matrix: FeatureMatrix, labels: Vec<String>) -> Result<(), KnnError>;

    /// The `k` nearest candidates to `query`.
    ///
    /// # Errors
    ///
    /// In order of precedence: [`KnnError::NotFitted`],
    /// [`KnnError::InvalidK`] for `k == 0`, [`KnnError::DimensionMismatch`]
    /// for a query of the wrong width, [`KnnError::NonFiniteInput`], and
    /// [`KnnError::AcceleratorExecution`] if a device fails.
    fn kneighbors(&self, query: &[f64], k: usize) -> Result<Neighbors, KnnError>;

    /// Configured number of neighbors.
    fn k(&self) -> usize;

    /// Current distance metric.
    fn metric(&self) -> DistanceMetric;

    /// Replaces the distance metric for subsequent queries.
    fn set_metric(&mut self, metric: DistanceMetric);

    /// Where distances are computed.
    fn backend(&self) -> Backend;

    /// Width of the fitted matrix.
    fn n_dims(&self) -> Option<usize>;

    /// Rows in the fitted matrix.
    fn n_candidates(&self) -> Option<usize>;

    /// The configured `k` nearest candidates to `query`.
    fn predict(&self, query: &[f64]) -> Result<Neighbors, KnnError> {
        self.kneighbors(query, self.k())
    }

    /// Whether a matrix has been fitted.
    fn is_fitted(&self) -> bool {
        self.n_candidates().is_some()
    }

    /// Builds a matrix from rows and fits it.
    fn fit_rows(&mut self, rows: Vec<Vec<f64>>) -> Result<(), KnnError> {
        self.fit(FeatureMatrix::from_rows(rows)?)
    }
}

/// Fitted data shared by both engines.
#[derive(Debug, Clone, Default)]
pub(crate) struct FitState {
    fitted: Option<Fitted>,
}

#[derive(Debug, Clone)]
pub(crate) struct Fitted {
    matrix: Arc<FeatureMatrix>,
    labels: Option<Arc<[String]>>,
}

impl FitState {
    pub(crate) fn fit(
        &mut self,
        matrix: FeatureMatrix,
        labels: Option<Vec<String>>,
    ) -> Result<(), KnnError> {
        if let Some(labels) = &labels {
            if labels.len() != matrix.n_rows() {
                return Err(KnnError::LabelCountMismatch {
                    labels: labels.len(),
                    rows: matrix.n_rows(),
                });
            }
        }
        self.fitted = Some(Fitted {
            matrix: Arc::new(matrix),
            labels: labels.map(Arc::from),
        });
        Ok(())
    }

    pub(crate) fn fitted(&self) -> Option<&Fitted> {
        self.fitted.as_ref()
    }

    /// Checks a query against the fitted state and returns `k_eff`.
    pub(crate) fn prepare(&self, query: &[f64], k: usize) -> Result<(&Fitted, usize), KnnError> {
        let fitted = self.fitted.as_ref().ok_or(KnnError::NotFitted)?;
        if k == 0 {
            return Err(KnnError::InvalidK { k });
        }
        let n_dims = fitted.matrix.n_dims();
        if query.len() != n_dims {
            return Err(KnnError::DimensionMismatch {
                expected: n_dims,
                actual: query.len(),
                row: None,
            });
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(KnnError::NonFiniteInput { input: "query" });
        }
        Ok((fitted, k.min(fitted.matrix.n_rows())))
    }
}

impl Fitted {
    pub(crate) fn matrix(&self) -> &FeatureMatrix {
        &self.matrix
    }

    /// Selects the `k_eff` nearest rows from a full distance array.
    pub(crate) fn neighbors(&self, distances: &[f64], k_eff: usize) -> Neighbors {
        let mut pairs = Vec::with_capacity(distances.len());
        let mut nn_indices = Vec::with_capacity(k_eff);
        let mut nn_dists = Vec::with_capacity(k_eff);
        select_k_nearest(distances, k_eff, &mut pairs, &mut nn_indices, &mut nn_dists);

        let labels = self
            .labels
            .as_ref()
            .map(|labels| nn_indices.iter().map(|&i| labels[i].clone()).collect());
        Neighbors::new(nn_dists, nn_indices, labels)
    }
}
