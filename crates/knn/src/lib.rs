//! Exact k-nearest-neighbor search with scalar and data-parallel backends.
//!
//! Fit an engine with an `N × D` matrix of normalized features, then ask for
//! the `k` rows closest to a query under Euclidean or Manhattan distance.
//!
//! | Engine | Distances computed by |
//! |--------|-----------------------|
//! | [`ScalarKNeighbors`] | one loop on the calling thread |
//! | [`ParallelKNeighbors`] | one lane per row on a [`Device`], groups of 256 |
//!
//! [`select_backend`] probes the configured devices (CUDA, then host lanes)
//! and returns the first that works, falling back to the scalar engine.
//!
//! # Quick start
//!
//! ```
//! use cadenza_knn::{DistanceMetric, KNeighbors, KnnConfig, select_backend};
//!
//! let config = KnnConfig::new(2).with_metric(DistanceMetric::Manhattan);
//! let mut selection = select_backend(&config).unwrap();
//! let engine = selection.engine_mut();
//!
//! engine
//!     .fit_rows(vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![4.0, 4.0]])
//!     .unwrap();
//! let result = engine.predict(&[0.2, 0.0]).unwrap();
//!
//! assert_eq!(result.indices(), &[0, 1]);
//! ```
//!
//! # Architecture
//!
//! ```text
//! KNeighbors::kneighbors()
//!   ├─ FitState::prepare()        (engine.rs)   checks, k_eff = min(k, n)
//!   ├─ distances_into()           (distance.rs) scalar
//!   │  or compute_distances()     (device/)     parallel
//!   └─ select_k_nearest()         (select.rs)
//! ```

pub mod config;
pub mod device;
pub mod distance;
pub mod engine;
pub mod error;
pub mod matrix;
pub mod metric;
pub mod parallel;
pub mod result;
pub mod scalar;
pub mod selector;

pub(crate) mod select;

pub use config::KnnConfig;
pub use device::host::HostLanes;
pub use device::{Device, DeviceKind, MemoryUsage};
pub use distance::Evaluation;
pub use engine::{Backend, KNeighbors};
pub use error::{DeviceError, KnnError, ProbeError};
pub use matrix::FeatureMatrix;
pub use metric::DistanceMetric;
pub use parallel::ParallelKNeighbors;
pub use result::Neighbors;
pub use scalar::ScalarKNeighbors;
pub use selector::{Capability, ProbeFailure, Selection, probe, select_backend};

#[cfg(feature = "cuda")]
pub use device::cuda::CudaDevice;
