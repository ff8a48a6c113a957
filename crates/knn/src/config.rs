//! Configuration for nearest-neighbor engines.

use crate::device::DeviceKind;
use crate::distance::Evaluation;
use crate::error::KnnError;
use crate::metric::DistanceMetric;

/// Configuration for a nearest-neighbor engine.
///
/// Use the builder methods to customise parameters.
///
/// # Example
///
/// ```
/// use cadenza_knn::{DeviceKind, DistanceMetric, KnnConfig};
///
/// let config = KnnConfig::new(10)
///     .with_metric(DistanceMetric::Manhattan)
///     .with_devices(vec![DeviceKind::Host])
///     .with_host_threads(Some(4));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct KnnConfig {
    /// Number of neighbors returned by `predict`.
    k: usize,
    /// Distance metric.
    metric: DistanceMetric,
    /// Scalar evaluation path.
    evaluation: Evaluation,
    /// Devices the selector probes, in order of preference.
    devices: Vec<DeviceKind>,
    /// Worker threads for host lanes. `None` uses rayon's default.
    host_threads: Option<usize>,
}

impl KnnConfig {
    /// Creates a new configuration with the given k.
    ///
    /// Defaults: Euclidean metric, unrolled evaluation, every compiled-in
    /// device kind (CUDA first), rayon's default host thread count.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            metric: DistanceMetric::Euclidean,
            evaluation: Evaluation::Unrolled,
            devices: DeviceKind::all().to_vec(),
            host_threads: None,
        }
    }

    /// Sets the distance metric.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Sets the scalar evaluation path.
    pub fn with_evaluation(mut self, evaluation: Evaluation) -> Self {
        self.evaluation = evaluation;
        self
    }

    /// Sets the devices to probe, in order of preference.
    ///
    /// An empty list forces the scalar backend.
    pub fn with_devices(mut self, devices: Vec<DeviceKind>) -> Self {
        self.devices = devices;
        self
    }

    /// Sets the host-lane worker thread count.
    ///
    /// `Some(0)` is rejected by [`KnnConfig::validate`]; use `None` for
    /// rayon's default.
    pub fn with_host_threads(mut self, threads: Option<usize>) -> Self {
        self.host_threads = threads;
        self
    }

    /// Returns the number of neighbors.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Returns the distance metric.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Returns the scalar evaluation path.
    pub fn evaluation(&self) -> Evaluation {
        self.evaluation
    }

    /// Returns the devices to probe.
    pub fn devices(&self) -> &[DeviceKind] {
        &self.devices
    }

    /// Returns the host-lane worker thread count.
    pub fn host_threads(&self) -> Option<usize> {
        self.host_threads
    }

    /// Validates this configuration.
    ///
    /// Returns an error if k < 1 or if the host thread count is `Some(0)`.
    pub fn validate(&self) -> Result<(), KnnError> {
        if self.k < 1 {
            return Err(KnnError::InvalidK { k: self.k });
        }
        if self.host_threads == Some(0) {
            return Err(KnnError::ZeroHostThreads);
        }
        Ok(())
    }
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = KnnConfig::default();
        assert_eq!(cfg.k(), 5);
        assert_eq!(cfg.metric(), DistanceMetric::Euclidean);
        assert_eq!(cfg.evaluation(), Evaluation::Unrolled);
        assert_eq!(cfg.devices(), DeviceKind::all());
        assert_eq!(cfg.host_threads(), None);
    }

    #[test]
    fn test_builder_chaining() {
        let cfg = KnnConfig::new(3)
            .with_metric(DistanceMetric::Manhattan)
            .with_evaluation(Evaluation::Reference)
            .with_devices(vec![DeviceKind::Host])
            .with_host_threads(Some(2));

        assert_eq!(cfg.k(), 3);
        assert_eq!(cfg.metric(), DistanceMetric::Manhattan);
        assert_eq!(cfg.evaluation(), Evaluation::Reference);
        assert_eq!(cfg.devices(), &[DeviceKind::Host]);
        assert_eq!(cfg.host_threads(), Some(2));
    }

    #[test]
    fn test_validate_ok() {
        assert!(KnnConfig::default().validate().is_ok());
        assert!(KnnConfig::new(1).with_devices(Vec::new()).validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_k() {
        let err = KnnConfig::new(0).validate().unwrap_err();
        assert!(
            matches!(err, KnnError::InvalidK { k: 0 }),
            "expected InvalidK, got {err:?}"
        );
    }

    #[test]
    fn test_validate_zero_host_threads() {
        let err = KnnConfig::new(3)
            .with_host_threads(Some(0))
            .validate()
            .unwrap_err();
        assert!(
            matches!(err, KnnError::ZeroHostThreads),
            "expected ZeroHostThreads, got {err:?}"
        );
        assert!(KnnConfig::new(3).with_host_threads(Some(1)).validate().is_ok());
    }
}
