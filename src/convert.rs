//! Pure conversion functions: TOML config structs -> crate API config types.

use anyhow::{Result, bail};

use cadenza_knn::KnnConfig;

use crate::config::{BackendToml, BenchToml, SearchToml};

/// Builds a [`KnnConfig`] from the `[search]` and `[backend]` sections.
pub fn build_knn_config(search: &SearchToml, backend: &BackendToml) -> Result<KnnConfig> {
    if search.k == 0 {
        bail!("search.k must be >= 1, got 0");
    }
    if backend.host_threads == Some(0) {
        bail!("backend.host_threads must be >= 1 when set");
    }
    Ok(KnnConfig::new(search.k)
        .with_metric(search.metric)
        .with_evaluation(search.evaluation)
        .with_devices(backend.devices.clone())
        .with_host_threads(backend.host_threads))
}

/// Checks that every benchmark size is positive and that the generated
/// matrix size fits in `usize`.
///
/// Returns the number of values in the candidate matrix.
pub fn validate_bench(bench: &BenchToml) -> Result<usize> {
    for (name, value) in [
        ("n_candidates", bench.n_candidates),
        ("n_dims", bench.n_dims),
        ("n_queries", bench.n_queries),
    ] {
        if value == 0 {
            bail!("bench.{name} must be >= 1, got 0");
        }
    }
    match bench.n_candidates.checked_mul(bench.n_dims) {
        Some(len) => Ok(len),
        None => bail!(
            "bench matrix of {} x {} values is too large",
            bench.n_candidates,
            bench.n_dims
        ),
    }
}
