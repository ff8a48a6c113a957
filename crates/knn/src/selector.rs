//! Picks the engine for this machine.
//!
//! ```text
//! select_backend()
//!   ├─ probe(Cuda)  ── Ok ──> ParallelKNeighbors<CudaDevice>
//!   ├─ probe(Host)  ── Ok ──> ParallelKNeighbors<HostLanes>
//!   └─ all failed   ───────> ScalarKNeighbors
//! ```
//!
//! Probe failures are logged and kept on the [`Selection`]; they are never
//! returned as errors.

use std::fmt;

use tracing::{info, warn};

use crate::config::KnnConfig;
#[cfg(feature = "cuda")]
use crate::device::cuda::CudaDevice;
use crate::device::host::HostLanes;
use crate::device::{Device, DeviceKind};
use crate::engine::{Backend, KNeighbors};
use crate::error::{KnnError, ProbeError};
use crate::parallel::ParallelKNeighbors;
use crate::scalar::ScalarKNeighbors;

/// A device that probed successfully.
#[derive(Debug)]
pub enum Capability {
    /// Host worker pool.
    Host(HostLanes),
    /// CUDA GPU.
    #[cfg(feature = "cuda")]
    Cuda(CudaDevice),
}

impl Capability {
    /// Kind of the probed device.
    pub fn kind(&self) -> DeviceKind {
        match self {
            Capability::Host(d) => d.kind(),
            #[cfg(feature = "cuda")]
            Capability::Cuda(d) => d.kind(),
        }
    }

    /// Human-readable device name.
    pub fn name(&self) -> &str {
        match self {
            Capability::Host(d) => d.name(),
            #[cfg(feature = "cuda")]
            Capability::Cuda(d) => d.name(),
        }
    }

    /// Wraps the device in a parallel engine.
    pub fn into_engine(self, config: &KnnConfig) -> Result<Box<dyn KNeighbors>, KnnError> {
        let engine: Box<dyn KNeighbors> = match self {
            Capability::Host(d) => Box::new(ParallelKNeighbors::new(d, config)?),
            #[cfg(feature = "cuda")]
            Capability::Cuda(d) => Box::new(ParallelKNeighbors::new(d, config)?),
        };
        Ok(engine)
    }
}

/// Probes one device kind.
///
/// # Errors
///
/// The [`ProbeError`] explaining why the device cannot be used.
pub fn probe(kind: DeviceKind, config: &KnnConfig) -> Result<Capability, ProbeError> {
    match kind {
        DeviceKind::Host => HostLanes::probe(config.host_threads()).map(Capability::Host),
        #[cfg(feature = "cuda")]
        DeviceKind::Cuda => CudaDevice::probe().map(Capability::Cuda),
        #[cfg(not(feature = "cuda"))]
        DeviceKind::Cuda => Err(ProbeError::Disabled { kind: "cuda" }),
    }
}

/// A device kind that could not be used.
#[derive(Debug, Clone)]
pub struct ProbeFailure {
    /// The device kind probed.
    pub kind: DeviceKind,
    /// Why it was rejected.
    pub error: ProbeError,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)
    }
}

/// The engine chosen by [`select_backend`] and the probes that failed
/// before it.
#[derive(Debug)]
pub struct Selection {
    engine: Box<dyn KNeighbors>,
    failures: Vec<ProbeFailure>,
}

impl Selection {
    /// The selected engine.
    pub fn engine(&self) -> &dyn KNeighbors {
        self.engine.as_ref()
    }

    /// The selected engine, mutably (for `fit`).
    pub fn engine_mut(&mut self) -> &mut dyn KNeighbors {
        self.engine.as_mut()
    }

    /// Takes the engine.
    pub fn into_engine(self) -> Box<dyn KNeighbors> {
        self.engine
    }

    /// Probes that failed, in probe order.
    pub fn failures(&self) -> &[ProbeFailure] {
        &self.failures
    }

    /// Backend of the selected engine.
    pub fn backend(&self) -> Backend {
        self.engine.backend()
    }
}

/// Builds the best engine available for `config`.
///
/// Probes `config.devices()` in order and wraps the first device that
/// succeeds in a [`ParallelKNeighbors`]. Falls back to
/// [`ScalarKNeighbors`] when every probe fails or no devices are listed.
///
/// # Errors
///
/// Only configuration errors from [`KnnConfig::validate`]. Probe failures are
/// recorded in [`Selection::failures`].
pub fn select_backend(config: &KnnConfig) -> Result<Selection, KnnError> {
    config.validate()?;

    let mut failures = Vec::new();
    for &kind in config.devices() {
        match probe(kind, config) {
            Ok(capability) => {
                info!(device = capability.name(), backend = %Backend::Parallel(kind), "backend selected");
                return Ok(Selection {
                    engine: capability.into_engine(config)?,
                    failures,
                });
            }
            Err(error) => {
                warn!(device = %kind, %error, "device probe failed");
                failures.push(ProbeFailure { kind, error });
            }
        }
    }

    if failures.is_empty() {
        info!(backend = %Backend::Scalar, "no devices configured");
    } else {
        warn!(
            failed = failures.len(),
            backend = %Backend::Scalar,
            "no accelerator available, falling back"
        );
    }
    Ok(Selection {
        engine: Box::new(ScalarKNeighbors::new(config)?),
        failures,
    })
}
