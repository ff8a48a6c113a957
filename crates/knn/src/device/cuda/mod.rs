//! NVIDIA GPUs through the CUDA driver API.
//!
//! The distance kernel is compiled from source with NVRTC when the device
//! is probed. The query is staged in `__constant__` memory, which is one
//! slot per loaded module; [`CudaBroadcast`] holds that slot's lock for as
//! long as a launch may read it.

mod driver;

use std::ffi::{CStr, c_char, c_int, c_void};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::{DeviceError, ProbeError};

use self::driver::{
    CuContext, CuDevice, CuDevicePtr, CuFunction, CuModule, Driver, DriverFailure, Nvrtc, check,
};
use super::{Device, DeviceKind, DistanceKernel, LaunchGeometry, MemoryLedger, MemoryUsage};

/// Values the constant-memory query slot holds.
pub const BROADCAST_CAPACITY: usize = 4096;

const KERNEL_NAME: &str = "distance_kernel";
const QUERY_SYMBOL: &str = "c_query";

const KERNEL_SOURCE: &str = r#"
__constant__ double c_query[4096];

extern "C" __global__ void distance_kernel(
    const double* __restrict__ data,
    double* __restrict__ distances,
    long long n,
    long long d,
    int metric)
{
    long long idx = (long long)blockIdx.x * blockDim.x + threadIdx.x;
    if (idx >= n) {
        return;
    }
    const double* row = data + idx * d;
    double acc = 0.0;
    switch (metric) {
    case 0:
        for (long long j = 0; j < d; ++j) {
            double diff = c_query[j] - row[j];
            acc += diff * diff;
        }
        distances[idx] = sqrt(acc);
        break;
    case 1:
        for (long long j = 0; j < d; ++j) {
            acc += fabs(c_query[j] - row[j]);
        }
        distances[idx] = acc;
        break;
    default:
        distances[idx] = nan("");
        break;
    }
}
"#;

/// Primary context plus the loaded kernel module.
struct Context {
    driver: Driver,
    device: CuDevice,
    ctx: CuContext,
    module: CuModule,
    function: CuFunction,
    query_slot: CuDevicePtr,
}

// SAFETY: a primary context may be made current on any thread, and every
// entry point below binds it first. The raw handles are never mutated after
// probe.
unsafe impl Send for Context {}
unsafe impl Sync for Context {}

impl Context {
    /// Makes the context current on the calling thread.
    fn bind(&self) -> Result<(), DriverFailure> {
        // SAFETY: `ctx` is a retained primary context.
        check("cuCtxSetCurrent", unsafe {
            (self.driver.ctx_set_current)(self.ctx)
        })
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // SAFETY: handles were produced by this driver and are released once.
        unsafe {
            (self.driver.ctx_set_current)(self.ctx);
            if !self.module.is_null() {
                (self.driver.module_unload)(self.module);
            }
            (self.driver.primary_ctx_release)(self.device);
        }
    }
}

/// A CUDA GPU able to run the distance kernel.
pub struct CudaDevice {
    context: Arc<Context>,
    name: String,
    ledger: Arc<MemoryLedger>,
    query_lock: Mutex<()>,
}

impl CudaDevice {
    /// Loads the driver, opens device 0 and compiles the kernel.
    ///
    /// # Errors
    ///
    /// Any [`ProbeError`]: missing libraries or symbols, no device, a
    /// failing driver call, or a kernel that does not compile.
    pub fn probe() -> Result<Self, ProbeError> {
        let driver = Driver::load()?;

        // SAFETY: cuInit takes flags = 0 and may be called repeatedly.
        check("cuInit", unsafe { (driver.init)(0) })?;

        let mut count: c_int = 0;
        // SAFETY: valid out-pointer.
        check("cuDeviceGetCount", unsafe {
            (driver.device_get_count)(&mut count)
        })?;
        if count < 1 {
            return Err(ProbeError::NoDevice);
        }

        let mut device: CuDevice = 0;
        // SAFETY: ordinal 0 exists since count >= 1.
        check("cuDeviceGet", unsafe { (driver.device_get)(&mut device, 0) })?;

        let mut raw_name = [0 as c_char; 256];
        // SAFETY: the buffer length is passed along.
        check("cuDeviceGetName", unsafe {
            (driver.device_get_name)(raw_name.as_mut_ptr(), raw_name.len() as c_int, device)
        })?;
        // SAFETY: the driver nul-terminates within the given length.
        let name = unsafe { CStr::from_ptr(raw_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let mut ctx: CuContext = std::ptr::null_mut();
        // SAFETY: valid out-pointer and device handle.
        check("cuDevicePrimaryCtxRetain", unsafe {
            (driver.primary_ctx_retain)(&mut ctx, device)
        })?;

        // From here on `Drop` releases whatever has been acquired.
        let mut context = Context {
            driver,
            device,
            ctx,
            module: std::ptr::null_mut(),
            function: std::ptr::null_mut(),
            query_slot: 0,
        };
        context.bind()?;

        let ptx = Nvrtc::load()?.compile(KERNEL_SOURCE, "distance.cu", &["--fmad=false"])?;

        // SAFETY: `ptx` is a nul-terminated PTX image.
        check("cuModuleLoadData", unsafe {
            (context.driver.module_load_data)(&mut context.module, ptx.as_ptr().cast::<c_void>())
        })?;

        let kernel_name = c"distance_kernel";
        debug_assert_eq!(kernel_name.to_str(), Ok(KERNEL_NAME));
        // SAFETY: module is loaded; name is nul-terminated.
        check("cuModuleGetFunction", unsafe {
            (context.driver.module_get_function)(
                &mut context.function,
                context.module,
                kernel_name.as_ptr(),
            )
        })?;

        let query_name = c"c_query";
        debug_assert_eq!(query_name.to_str(), Ok(QUERY_SYMBOL));
        let mut slot_bytes = 0usize;
        // SAFETY: module is loaded; name is nul-terminated.
        check("cuModuleGetGlobal_v2", unsafe {
            (context.driver.module_get_global)(
                &mut context.query_slot,
                &mut slot_bytes,
                context.module,
                query_name.as_ptr(),
            )
        })?;
        if slot_bytes != BROADCAST_CAPACITY * size_of::<f64>() {
            return Err(ProbeError::KernelCompilation {
                log: format!("{QUERY_SYMBOL} is {slot_bytes} bytes"),
            });
        }

        debug!(device = %name, "CUDA kernel loaded");
        Ok(Self {
            context: Arc::new(context),
            name,
            ledger: Arc::new(MemoryLedger::default()),
            query_lock: Mutex::new(()),
        })
    }
}

impl fmt::Debug for CudaDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaDevice")
            .field("name", &self.name)
            .field("memory", &self.ledger.usage())
            .finish()
    }
}

/// Global device memory owned by one call.
pub struct CudaBuffer {
    ptr: CuDevicePtr,
    len: usize,
    context: Arc<Context>,
    ledger: Arc<MemoryLedger>,
}

impl CudaBuffer {
    fn bytes(&self) -> usize {
        self.len * size_of::<f64>()
    }
}

impl fmt::Debug for CudaBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaBuffer").field("len", &self.len).finish()
    }
}

impl Drop for CudaBuffer {
    fn drop(&mut self) {
        let freed = self.context.bind().and_then(|()| {
            // SAFETY: `ptr` came from cuMemAlloc_v2 and is freed exactly once.
            check("cuMemFree_v2", unsafe {
                (self.context.driver.mem_free)(self.ptr)
            })
        });
        if let Err(e) = freed {
            warn!(call = e.call, code = e.code, "failed to release device buffer");
        }
        self.ledger.release(self.bytes());
    }
}

/// The query staged in constant memory, holding the slot lock.
pub struct CudaBroadcast<'a> {
    _slot: MutexGuard<'a, ()>,
    len: usize,
}

impl fmt::Debug for CudaBroadcast<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaBroadcast").field("len", &self.len).finish()
    }
}

impl CudaDevice {
    fn allocate(&self, len: usize) -> Result<CudaBuffer, DeviceError> {
        let bytes = len * size_of::<f64>();
        self.context.bind()?;
        let mut ptr: CuDevicePtr = 0;
        // SAFETY: valid out-pointer; context is current. cuMemAlloc rejects
        // zero-byte requests, so at least one value is reserved.
        let status = unsafe { (self.context.driver.mem_alloc)(&mut ptr, bytes.max(size_of::<f64>())) };
        if check("cuMemAlloc_v2", status).is_err() {
            return Err(DeviceError::Allocation { bytes });
        }
        self.ledger.acquire(bytes);
        Ok(CudaBuffer {
            ptr,
            len,
            context: Arc::clone(&self.context),
            ledger: Arc::clone(&self.ledger),
        })
    }
}

impl Device for CudaDevice {
    type Buffer = CudaBuffer;
    type Broadcast<'a> = CudaBroadcast<'a>;

    fn kind(&self) -> DeviceKind {
        DeviceKind::Cuda
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn broadcast_capacity(&self) -> usize {
        BROADCAST_CAPACITY
    }

    fn memory_usage(&self) -> MemoryUsage {
        self.ledger.usage()
    }

    fn upload(&self, host: &[f64]) -> Result<CudaBuffer, DeviceError> {
        let buffer = self.allocate(host.len())?;
        // SAFETY: `buffer` holds `host.len()` values; context is current.
        check("cuMemcpyHtoD_v2", unsafe {
            (self.context.driver.memcpy_htod)(buffer.ptr, host.as_ptr().cast(), buffer.bytes())
        })?;
        Ok(buffer)
    }

    fn alloc(&self, len: usize) -> Result<CudaBuffer, DeviceError> {
        self.allocate(len)
    }

    fn stage_broadcast(&self, values: &[f64]) -> Result<CudaBroadcast<'_>, DeviceError> {
        if values.len() > BROADCAST_CAPACITY {
            return Err(DeviceError::BroadcastOverflow {
                len: values.len(),
                capacity: BROADCAST_CAPACITY,
            });
        }
        // The guarded value is `()`, so a poisoned lock carries no bad state.
        let slot = self
            .query_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.context.bind()?;
        // SAFETY: the slot holds BROADCAST_CAPACITY values and `values` fits.
        check("cuMemcpyHtoD_v2", unsafe {
            (self.context.driver.memcpy_htod)(
                self.context.query_slot,
                values.as_ptr().cast(),
                std::mem::size_of_val(values),
            )
        })?;
        Ok(CudaBroadcast {
            _slot: slot,
            len: values.len(),
        })
    }

    fn launch<'s>(
        &'s self,
        kernel: &DistanceKernel,
        geometry: LaunchGeometry,
        data: &CudaBuffer,
        query: &CudaBroadcast<'s>,
        out: &mut CudaBuffer,
    ) -> Result<(), DeviceError> {
        let n = kernel.n_candidates();
        let d = kernel.n_dims();
        if data.len != n * d || query.len != d || out.len < n {
            return Err(DeviceError::Launch {
                reason: format!(
                    "buffers ({} data, {} query, {} out) do not fit a {n} x {d} kernel",
                    data.len, query.len, out.len
                ),
            });
        }
        let too_large = |what: &str| DeviceError::Launch {
            reason: format!("{what} exceeds the driver's parameter range"),
        };
        let grid = u32::try_from(geometry.groups()).map_err(|_| too_large("grid"))?;
        let block = u32::try_from(geometry.lanes_per_group()).map_err(|_| too_large("block"))?;
        let mut data_ptr = data.ptr;
        let mut out_ptr = out.ptr;
        let mut n_param = i64::try_from(n).map_err(|_| too_large("candidate count"))?;
        let mut d_param = i64::try_from(d).map_err(|_| too_large("dimension"))?;
        let mut metric = kernel.metric().code() as i32;
        let mut params: [*mut c_void; 5] = [
            (&mut data_ptr as *mut CuDevicePtr).cast(),
            (&mut out_ptr as *mut CuDevicePtr).cast(),
            (&mut n_param as *mut i64).cast(),
            (&mut d_param as *mut i64).cast(),
            (&mut metric as *mut i32).cast(),
        ];

        self.context.bind()?;
        // SAFETY: parameter order and types match `distance_kernel`; the
        // driver copies them before returning.
        check("cuLaunchKernel", unsafe {
            (self.context.driver.launch_kernel)(
                self.context.function,
                grid,
                1,
                1,
                block,
                1,
                1,
                0,
                std::ptr::null_mut(),
                params.as_mut_ptr(),
                std::ptr::null_mut(),
            )
        })?;
        Ok(())
    }

    fn synchronize(&self) -> Result<(), DeviceError> {
        self.context.bind()?;
        // SAFETY: context is current.
        check("cuCtxSynchronize", unsafe {
            (self.context.driver.ctx_synchronize)()
        })
        .map_err(|e| DeviceError::Synchronize {
            reason: format!("{} returned {}", e.call, e.code),
        })
    }

    fn copy_to_host(&self, buffer: &CudaBuffer, host: &mut [f64]) -> Result<(), DeviceError> {
        if host.len() > buffer.len {
            return Err(DeviceError::Transfer {
                reason: format!(
                    "cannot copy {} values from a buffer of {}",
                    host.len(),
                    buffer.len
                ),
            });
        }
        self.context.bind()?;
        // SAFETY: `host` is no longer than the device buffer.
        check("cuMemcpyDtoH_v2", unsafe {
            (self.context.driver.memcpy_dtoh)(
                host.as_mut_ptr().cast(),
                buffer.ptr,
                std::mem::size_of_val(host),
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_source_matches_constants() {
        assert!(KERNEL_SOURCE.contains(&format!("{QUERY_SYMBOL}[{BROADCAST_CAPACITY}]")));
        assert!(KERNEL_SOURCE.contains(&format!("void {KERNEL_NAME}(")));
    }

    #[test]
    fn test_metric_codes_match_kernel_branches() {
        use crate::metric::DistanceMetric;
        for metric in DistanceMetric::ALL {
            assert!(KERNEL_SOURCE.contains(&format!("case {}:", metric.code())));
        }
        assert!(KERNEL_SOURCE.contains("default:"));
    }

    #[test]
    fn test_probe_without_gpu_is_an_error_not_a_panic() {
        // On machines with a GPU this succeeds; either way it must return.
        match CudaDevice::probe() {
            Ok(device) => assert_eq!(device.kind(), DeviceKind::Cuda),
            Err(e) => assert!(!e.to_string().is_empty()),
        }
    }
}
