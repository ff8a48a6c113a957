//! Data-parallel distance dispatch.
//!
//! A [`Device`] runs one [`DistanceKernel`] lane per candidate, in groups of
//! [`LANES_PER_GROUP`]. Every allocation a device hands out is an owned
//! handle whose `Drop` releases the memory, so a prediction cannot leak
//! device memory on any exit path.
//!
//! ```text
//! compute_distances()
//!   ├─ upload()            dataset  -> device buffer
//!   ├─ stage_broadcast()   query    -> read-only broadcast region
//!   ├─ alloc()             output   -> device buffer
//!   ├─ launch()            -> InFlight
//!   ├─ synchronize()       -> Completed
//!   └─ copy_to_host()      -> Vec<f64>   (buffers dropped here)
//! ```
//!
//! Output can only be copied back from a [`Completed`] launch, which only
//! [`InFlight::synchronize`] produces.

#[cfg(feature = "cuda")]
pub mod cuda;
pub mod host;
mod kernel;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;

use crate::error::DeviceError;
use crate::matrix::FeatureMatrix;
use crate::metric::DistanceMetric;

pub use kernel::DistanceKernel;

/// Number of lanes in one lane group.
pub const LANES_PER_GROUP: usize = 256;

/// Kinds of data-parallel device the selector knows how to probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// NVIDIA GPU through the CUDA driver.
    Cuda,
    /// Lane groups scheduled on a host worker pool.
    Host,
}

impl DeviceKind {
    /// Every device kind compiled into this build, in default probe order.
    pub fn all() -> &'static [DeviceKind] {
        #[cfg(feature = "cuda")]
        {
            &[DeviceKind::Cuda, DeviceKind::Host]
        }
        #[cfg(not(feature = "cuda"))]
        {
            &[DeviceKind::Host]
        }
    }

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            DeviceKind::Cuda => "cuda",
            DeviceKind::Host => "host",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Grid shape of one kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    groups: usize,
    lanes_per_group: usize,
}

impl LaunchGeometry {
    /// Geometry covering `n_candidates` lanes, rounded up to whole groups.
    pub fn for_candidates(n_candidates: usize) -> Self {
        Self {
            groups: n_candidates.div_ceil(LANES_PER_GROUP),
            lanes_per_group: LANES_PER_GROUP,
        }
    }

    /// Number of lane groups.
    pub fn groups(&self) -> usize {
        self.groups
    }

    /// Lanes per group.
    pub fn lanes_per_group(&self) -> usize {
        self.lanes_per_group
    }

    /// Total lanes launched, including idle padding lanes.
    pub fn total_lanes(&self) -> usize {
        self.groups * self.lanes_per_group
    }
}

/// Live device allocations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Number of buffers currently allocated.
    pub buffers: usize,
    /// Bytes currently allocated.
    pub bytes: usize,
}

/// Allocation counter shared between a device and the buffers it hands out.
#[derive(Debug, Default)]
pub(crate) struct MemoryLedger {
    buffers: AtomicUsize,
    bytes: AtomicUsize,
}

impl MemoryLedger {
    pub(crate) fn acquire(&self, bytes: usize) {
        self.buffers.fetch_add(1, Ordering::AcqRel);
        self.bytes.fetch_add(bytes, Ordering::AcqRel);
    }

    pub(crate) fn release(&self, bytes: usize) {
        self.buffers.fetch_sub(1, Ordering::AcqRel);
        self.bytes.fetch_sub(bytes, Ordering::AcqRel);
    }

    pub(crate) fn usage(&self) -> MemoryUsage {
        MemoryUsage {
            buffers: self.buffers.load(Ordering::Acquire),
            bytes: self.bytes.load(Ordering::Acquire),
        }
    }
}

/// A data-parallel device able to run the distance kernel.
///
/// Implementations release memory when a `Buffer` or `Broadcast` is dropped.
/// `copy_to_host` must only be called after `synchronize`; the
/// [`launch`]/[`InFlight`]/[`Completed`] wrappers enforce that ordering and
/// are what engines use.
pub trait Device: Send + Sync + fmt::Debug {
    /// Read-write global memory.
    type Buffer: Send;

    /// Query values staged in the broadcast region for one launch.
    type Broadcast<'a>
    where
        Self: 'a;

    /// Which kind of device this is.
    fn kind(&self) -> DeviceKind;

    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Maximum number of values the broadcast region holds.
    fn broadcast_capacity(&self) -> usize;

    /// Allocations currently live on this device.
    fn memory_usage(&self) -> MemoryUsage;

    /// Allocates a buffer and copies `host` into it.
    fn upload(&self, host: &[f64]) -> Result<Self::Buffer, DeviceError>;

    /// Allocates an uninitialised buffer of `len` values.
    fn alloc(&self, len: usize) -> Result<Self::Buffer, DeviceError>;

    /// Stages `values` in the broadcast region.
    fn stage_broadcast(&self, values: &[f64]) -> Result<Self::Broadcast<'_>, DeviceError>;

    /// Starts the kernel over `geometry`.
    fn launch<'s>(
        &'s self,
        kernel: &DistanceKernel,
        geometry: LaunchGeometry,
        data: &Self::Buffer,
        query: &Self::Broadcast<'s>,
        out: &mut Self::Buffer,
    ) -> Result<(), DeviceError>;

    /// Blocks until every launched lane has finished.
    fn synchronize(&self) -> Result<(), DeviceError>;

    /// Copies a buffer back to host memory.
    fn copy_to_host(&self, buffer: &Self::Buffer, host: &mut [f64]) -> Result<(), DeviceError>;
}

/// A launched kernel whose output is not yet safe to read.
#[must_use = "a launched kernel must be synchronized before its output can be read"]
pub struct InFlight<'a, D: Device> {
    device: &'a D,
    out: D::Buffer,
    len: usize,
}

impl<'a, D: Device> InFlight<'a, D> {
    /// Waits for the device, making the output readable.
    pub fn synchronize(self) -> Result<Completed<'a, D>, DeviceError> {
        self.device.synchronize()?;
        Ok(Completed {
            device: self.device,
            out: self.out,
            len: self.len,
        })
    }
}

/// A finished launch.
pub struct Completed<'a, D: Device> {
    device: &'a D,
    out: D::Buffer,
    len: usize,
}

impl<D: Device> Completed<'_, D> {
    /// Copies the output to the host and releases the output buffer.
    pub fn copy_to_host(self) -> Result<Vec<f64>, DeviceError> {
        let mut host = vec![0.0; self.len];
        self.device.copy_to_host(&self.out, &mut host)?;
        Ok(host)
    }
}

/// Launches `kernel`, taking ownership of the output buffer until completion.
///
/// `data` stays borrowed for as long as the returned [`InFlight`] (and the
/// [`Completed`] it turns into) lives. `query` is only read during the call.
pub fn launch<'a, D: Device>(
    device: &'a D,
    kernel: &DistanceKernel,
    data: &'a D::Buffer,
    query: &D::Broadcast<'a>,
    mut out: D::Buffer,
) -> Result<InFlight<'a, D>, DeviceError> {
    let geometry = kernel.geometry();
    device.launch(kernel, geometry, data, query, &mut out)?;
    Ok(InFlight {
        device,
        out,
        len: kernel.n_candidates(),
    })
}

/// Computes the distance from `query` to every row of `matrix` on `device`.
///
/// All device memory used by the call is released before it returns.
pub fn compute_distances<D: Device>(
    device: &D,
    matrix: &FeatureMatrix,
    query: &[f64],
    metric: DistanceMetric,
) -> Result<Vec<f64>, DeviceError> {
    let kernel = DistanceKernel::new(matrix.n_rows(), matrix.n_dims(), metric);
    let data = device.upload(matrix.as_flat())?;
    let broadcast = device.stage_broadcast(query)?;
    let out = device.alloc(kernel.n_candidates())?;
    launch(device, &kernel, &data, &broadcast, out)?
        .synchronize()?
        .copy_to_host()
}
