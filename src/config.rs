use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use cadenza_knn::{DeviceKind, DistanceMetric, Evaluation};

/// Top-level cadenza configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CadenzaConfig {
    /// Search settings.
    #[serde(default)]
    pub search: SearchToml,

    /// Backend selection settings.
    #[serde(default)]
    pub backend: BackendToml,

    /// Benchmark settings.
    #[serde(default)]
    pub bench: BenchToml,
}

impl CadenzaConfig {
    /// Reads `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let toml_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&toml_str).context("failed to parse TOML config")
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchToml {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default)]
    pub evaluation: Evaluation,
}

impl Default for SearchToml {
    fn default() -> Self {
        Self {
            k: default_k(),
            metric: DistanceMetric::default(),
            evaluation: Evaluation::default(),
        }
    }
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendToml {
    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceKind>,
    #[serde(default)]
    pub host_threads: Option<usize>,
}

impl Default for BackendToml {
    fn default() -> Self {
        Self {
            devices: default_devices(),
            host_threads: None,
        }
    }
}

fn default_devices() -> Vec<DeviceKind> {
    DeviceKind::all().to_vec()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchToml {
    #[serde(default = "default_n_candidates")]
    pub n_candidates: usize,
    #[serde(default = "default_n_dims")]
    pub n_dims: usize,
    #[serde(default = "default_n_queries")]
    pub n_queries: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for BenchToml {
    fn default() -> Self {
        Self {
            n_candidates: default_n_candidates(),
            n_dims: default_n_dims(),
            n_queries: default_n_queries(),
            seed: default_seed(),
        }
    }
}

fn default_n_candidates() -> usize {
    10_000
}
fn default_n_dims() -> usize {
    12
}
fn default_n_queries() -> usize {
    100
}
fn default_seed() -> u64 {
    42
}
