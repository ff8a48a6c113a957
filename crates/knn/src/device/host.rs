//! Lane groups scheduled on a dedicated rayon pool.
//!
//! Each group of [`LANES_PER_GROUP`] lanes is one rayon task; lanes inside a
//! group run in order on the same worker. Buffers are plain host vectors,
//! counted against the device's memory usage until dropped.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{Ordering, fence};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{DeviceError, ProbeError};

use super::{
    Device, DeviceKind, DistanceKernel, LANES_PER_GROUP, LaunchGeometry, MemoryLedger, MemoryUsage,
};

/// Host worker pool acting as a data-parallel device.
pub struct HostLanes {
    pool: ThreadPool,
    name: String,
    ledger: Arc<MemoryLedger>,
}

impl HostLanes {
    /// Builds the lane pool.
    ///
    /// `threads = None` uses rayon's default (one per logical CPU).
    ///
    /// # Errors
    ///
    /// [`ProbeError::ThreadPool`] if the pool cannot be built and
    /// [`ProbeError::InsufficientLanes`] if it has fewer than two workers
    /// (including an explicit `Some(0)`), in which case lanes would run no
    /// faster than the scalar engine.
    pub fn probe(threads: Option<usize>) -> Result<Self, ProbeError> {
        if threads == Some(0) {
            return Err(ProbeError::InsufficientLanes { available: 0 });
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.unwrap_or(0))
            .thread_name(|i| format!("cadenza-lane-{i}"))
            .build()
            .map_err(|e| ProbeError::ThreadPool {
                reason: e.to_string(),
            })?;

        let available = pool.current_num_threads();
        if available < 2 {
            return Err(ProbeError::InsufficientLanes { available });
        }

        Ok(Self {
            pool,
            name: format!("host lanes ({available} threads)"),
            ledger: Arc::new(MemoryLedger::default()),
        })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl fmt::Debug for HostLanes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLanes")
            .field("threads", &self.threads())
            .field("memory", &self.ledger.usage())
            .finish()
    }
}

/// Host-memory buffer owned by one call.
#[derive(Debug)]
pub struct HostBuffer {
    values: Vec<f64>,
    ledger: Arc<MemoryLedger>,
}

impl HostBuffer {
    fn new(values: Vec<f64>, ledger: &Arc<MemoryLedger>) -> Self {
        ledger.acquire(byte_len(values.len()));
        Self {
            values,
            ledger: Arc::clone(ledger),
        }
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the buffer holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        self.ledger.release(byte_len(self.values.len()));
    }
}

/// Query staged for one launch. Lanes only ever read it.
#[derive(Debug)]
pub struct HostBroadcast<'a> {
    values: Vec<f64>,
    ledger: &'a MemoryLedger,
}

impl HostBroadcast<'_> {
    /// The staged values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl Drop for HostBroadcast<'_> {
    fn drop(&mut self) {
        self.ledger.release(byte_len(self.values.len()));
    }
}

fn byte_len(len: usize) -> usize {
    len * size_of::<f64>()
}

fn try_vec(len: usize, fill: f64) -> Result<Vec<f64>, DeviceError> {
    let mut values = Vec::new();
    values
        .try_reserve_exact(len)
        .map_err(|_| DeviceError::Allocation {
            bytes: byte_len(len),
        })?;
    values.resize(len, fill);
    Ok(values)
}

impl Device for HostLanes {
    type Buffer = HostBuffer;
    type Broadcast<'a> = HostBroadcast<'a>;

    fn kind(&self) -> DeviceKind {
        DeviceKind::Host
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn broadcast_capacity(&self) -> usize {
        usize::MAX
    }

    fn memory_usage(&self) -> MemoryUsage {
        self.ledger.usage()
    }

    fn upload(&self, host: &[f64]) -> Result<HostBuffer, DeviceError> {
        let mut values = Vec::new();
        values
            .try_reserve_exact(host.len())
            .map_err(|_| DeviceError::Allocation {
                bytes: byte_len(host.len()),
            })?;
        values.extend_from_slice(host);
        Ok(HostBuffer::new(values, &self.ledger))
    }

    fn alloc(&self, len: usize) -> Result<HostBuffer, DeviceError> {
        // NaN marks slots no lane has written.
        Ok(HostBuffer::new(try_vec(len, f64::NAN)?, &self.ledger))
    }

    fn stage_broadcast(&self, values: &[f64]) -> Result<HostBroadcast<'_>, DeviceError> {
        let capacity = self.broadcast_capacity();
        if values.len() > capacity {
            return Err(DeviceError::BroadcastOverflow {
                len: values.len(),
                capacity,
            });
        }
        self.ledger.acquire(byte_len(values.len()));
        Ok(HostBroadcast {
            values: values.to_vec(),
            ledger: &self.ledger,
        })
    }

    fn launch<'s>(
        &'s self,
        kernel: &DistanceKernel,
        geometry: LaunchGeometry,
        data: &HostBuffer,
        query: &HostBroadcast<'s>,
        out: &mut HostBuffer,
    ) -> Result<(), DeviceError> {
        let n = kernel.n_candidates();
        if geometry.total_lanes() < n || geometry.lanes_per_group() != LANES_PER_GROUP {
            return Err(DeviceError::Launch {
                reason: format!(
                    "{} groups of {} lanes cannot cover {n} candidates",
                    geometry.groups(),
                    geometry.lanes_per_group()
                ),
            });
        }
        if data.len() != n * kernel.n_dims() {
            return Err(DeviceError::Launch {
                reason: format!(
                    "dataset buffer holds {} values, kernel expects {n} x {}",
                    data.len(),
                    kernel.n_dims()
                ),
            });
        }
        if query.values.len() != kernel.n_dims() {
            return Err(DeviceError::Launch {
                reason: format!(
                    "broadcast holds {} values, kernel expects {}",
                    query.values.len(),
                    kernel.n_dims()
                ),
            });
        }
        if out.len() < n {
            return Err(DeviceError::Launch {
                reason: format!("output buffer holds {} of {n} slots", out.len()),
            });
        }

        let data = &data.values;
        let query = &query.values;
        self.pool.install(|| {
            out.values[..n]
                .par_chunks_mut(LANES_PER_GROUP)
                .enumerate()
                .for_each(|(group, slots)| {
                    let base = group * LANES_PER_GROUP;
                    // Every lane of the group runs; padding lanes return None.
                    for offset in 0..LANES_PER_GROUP {
                        if let Some(d) = kernel.lane(base + offset, data, query) {
                            slots[offset] = d;
                        }
                    }
                });
        });
        Ok(())
    }

    fn synchronize(&self) -> Result<(), DeviceError> {
        // `install` has already joined every group.
        fence(Ordering::SeqCst);
        Ok(())
    }

    fn copy_to_host(&self, buffer: &HostBuffer, host: &mut [f64]) -> Result<(), DeviceError> {
        if host.len() > buffer.len() {
            return Err(DeviceError::Transfer {
                reason: format!(
                    "cannot copy {} values from a buffer of {}",
                    host.len(),
                    buffer.len()
                ),
            });
        }
        host.copy_from_slice(&buffer.values[..host.len()]);
        Ok(())
    }
}
