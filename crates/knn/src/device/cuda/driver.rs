//! Runtime-loaded CUDA driver and NVRTC entry points.
//!
//! Nothing here links against CUDA at build time: both libraries are opened
//! with `libloading` when a device is probed, so a machine without a GPU
//! only ever sees a [`ProbeError`].

use std::ffi::{CStr, CString, c_char, c_int, c_uint, c_void};

use libloading::Library;

use crate::error::{DeviceError, ProbeError};

pub(crate) type CuResult = c_int;
pub(crate) type CuDevice = c_int;
pub(crate) type CuContext = *mut c_void;
pub(crate) type CuModule = *mut c_void;
pub(crate) type CuFunction = *mut c_void;
pub(crate) type CuStream = *mut c_void;
pub(crate) type CuDevicePtr = u64;

type NvrtcResult = c_int;
type NvrtcProgram = *mut c_void;

pub(crate) const CUDA_SUCCESS: CuResult = 0;
pub(crate) const CUDA_ERROR_NO_DEVICE: CuResult = 100;
const NVRTC_SUCCESS: NvrtcResult = 0;

#[cfg(target_os = "windows")]
const CUDA_LIBRARIES: &[&str] = &["nvcuda.dll"];
#[cfg(not(target_os = "windows"))]
const CUDA_LIBRARIES: &[&str] = &["libcuda.so.1", "libcuda.so"];

#[cfg(target_os = "windows")]
const NVRTC_LIBRARIES: &[&str] = &["nvrtc64_120_0.dll"];
#[cfg(not(target_os = "windows"))]
const NVRTC_LIBRARIES: &[&str] = &["libnvrtc.so", "libnvrtc.so.12", "libnvrtc.so.11.2"];

/// A failed driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DriverFailure {
    pub(crate) call: &'static str,
    pub(crate) code: CuResult,
}

impl From<DriverFailure> for ProbeError {
    fn from(f: DriverFailure) -> Self {
        if f.code == CUDA_ERROR_NO_DEVICE {
            ProbeError::NoDevice
        } else {
            ProbeError::Driver {
                call: f.call,
                code: f.code,
            }
        }
    }
}

impl From<DriverFailure> for DeviceError {
    fn from(f: DriverFailure) -> Self {
        DeviceError::Driver {
            call: f.call,
            code: f.code,
        }
    }
}

/// Maps a driver status to `Result`.
pub(crate) fn check(call: &'static str, code: CuResult) -> Result<(), DriverFailure> {
    if code == CUDA_SUCCESS {
        Ok(())
    } else {
        Err(DriverFailure { call, code })
    }
}

fn open_first(names: &[&str]) -> Result<Library, ProbeError> {
    let mut reason = String::new();
    for name in names {
        // SAFETY: the CUDA driver and NVRTC are system libraries whose
        // initialisers have no preconditions.
        match unsafe { Library::new(name) } {
            Ok(lib) => return Ok(lib),
            Err(e) => reason = e.to_string(),
        }
    }
    Err(ProbeError::LibraryNotFound {
        library: names.join(", "),
        reason,
    })
}

/// Copies a function pointer out of `lib`.
///
/// # Safety
///
/// `T` must be the exact signature of `name`, and the pointer must not be
/// called after `lib` is dropped.
unsafe fn symbol<T: Copy>(lib: &Library, name: &'static str) -> Result<T, ProbeError> {
    // SAFETY: forwarded to the caller.
    let sym = unsafe { lib.get::<T>(name.as_bytes()) }.map_err(|e| ProbeError::MissingSymbol {
        symbol: name,
        reason: e.to_string(),
    })?;
    Ok(*sym)
}

/// CUDA driver API entry points.
pub(crate) struct Driver {
    pub(crate) init: unsafe extern "C" fn(c_uint) -> CuResult,
    pub(crate) device_get_count: unsafe extern "C" fn(*mut c_int) -> CuResult,
    pub(crate) device_get: unsafe extern "C" fn(*mut CuDevice, c_int) -> CuResult,
    pub(crate) device_get_name: unsafe extern "C" fn(*mut c_char, c_int, CuDevice) -> CuResult,
    pub(crate) primary_ctx_retain: unsafe extern "C" fn(*mut CuContext, CuDevice) -> CuResult,
    pub(crate) primary_ctx_release: unsafe extern "C" fn(CuDevice) -> CuResult,
    pub(crate) ctx_set_current: unsafe extern "C" fn(CuContext) -> CuResult,
    pub(crate) ctx_synchronize: unsafe extern "C" fn() -> CuResult,
    pub(crate) module_load_data: unsafe extern "C" fn(*mut CuModule, *const c_void) -> CuResult,
    pub(crate) module_unload: unsafe extern "C" fn(CuModule) -> CuResult,
    pub(crate) module_get_function:
        unsafe extern "C" fn(*mut CuFunction, CuModule, *const c_char) -> CuResult,
    pub(crate) module_get_global:
        unsafe extern "C" fn(*mut CuDevicePtr, *mut usize, CuModule, *const c_char) -> CuResult,
    pub(crate) mem_alloc: unsafe extern "C" fn(*mut CuDevicePtr, usize) -> CuResult,
    pub(crate) mem_free: unsafe extern "C" fn(CuDevicePtr) -> CuResult,
    pub(crate) memcpy_htod: unsafe extern "C" fn(CuDevicePtr, *const c_void, usize) -> CuResult,
    pub(crate) memcpy_dtoh: unsafe extern "C" fn(*mut c_void, CuDevicePtr, usize) -> CuResult,
    #[allow(clippy::type_complexity)]
    pub(crate) launch_kernel: unsafe extern "C" fn(
        CuFunction,
        c_uint,
        c_uint,
        c_uint,
        c_uint,
        c_uint,
        c_uint,
        c_uint,
        CuStream,
        *mut *mut c_void,
        *mut *mut c_void,
    ) -> CuResult,
    _lib: Library,
}

impl Driver {
    /// Opens the driver library and resolves every entry point.
    pub(crate) fn load() -> Result<Self, ProbeError> {
        let lib = open_first(CUDA_LIBRARIES)?;
        // SAFETY: signatures follow cuda.h; `_lib` keeps the pointers valid
        // for the lifetime of the struct.
        unsafe {
            Ok(Self {
                init: symbol(&lib, "cuInit")?,
                device_get_count: symbol(&lib, "cuDeviceGetCount")?,
                device_get: symbol(&lib, "cuDeviceGet")?,
                device_get_name: symbol(&lib, "cuDeviceGetName")?,
                primary_ctx_retain: symbol(&lib, "cuDevicePrimaryCtxRetain")?,
                primary_ctx_release: symbol(&lib, "cuDevicePrimaryCtxRelease_v2")?,
                ctx_set_current: symbol(&lib, "cuCtxSetCurrent")?,
                ctx_synchronize: symbol(&lib, "cuCtxSynchronize")?,
                module_load_data: symbol(&lib, "cuModuleLoadData")?,
                module_unload: symbol(&lib, "cuModuleUnload")?,
                module_get_function: symbol(&lib, "cuModuleGetFunction")?,
                module_get_global: symbol(&lib, "cuModuleGetGlobal_v2")?,
                mem_alloc: symbol(&lib, "cuMemAlloc_v2")?,
                mem_free: symbol(&lib, "cuMemFree_v2")?,
                memcpy_htod: symbol(&lib, "cuMemcpyHtoD_v2")?,
                memcpy_dtoh: symbol(&lib, "cuMemcpyDtoH_v2")?,
                launch_kernel: symbol(&lib, "cuLaunchKernel")?,
                _lib: lib,
            })
        }
    }
}

/// NVRTC entry points, used once per probe to build the kernel.
pub(crate) struct Nvrtc {
    create_program: unsafe extern "C" fn(
        *mut NvrtcProgram,
        *const c_char,
        *const c_char,
        c_int,
        *const *const c_char,
        *const *const c_char,
    ) -> NvrtcResult,
    compile_program: unsafe extern "C" fn(NvrtcProgram, c_int, *const *const c_char) -> NvrtcResult,
    get_ptx_size: unsafe extern "C" fn(NvrtcProgram, *mut usize) -> NvrtcResult,
    get_ptx: unsafe extern "C" fn(NvrtcProgram, *mut c_char) -> NvrtcResult,
    get_log_size: unsafe extern "C" fn(NvrtcProgram, *mut usize) -> NvrtcResult,
    get_log: unsafe extern "C" fn(NvrtcProgram, *mut c_char) -> NvrtcResult,
    destroy_program: unsafe extern "C" fn(*mut NvrtcProgram) -> NvrtcResult,
    _lib: Library,
}

/// Destroys an NVRTC program on every exit path.
struct Program<'a> {
    nvrtc: &'a Nvrtc,
    handle: NvrtcProgram,
}

impl Drop for Program<'_> {
    fn drop(&mut self) {
        // SAFETY: `handle` came from nvrtcCreateProgram and is destroyed once.
        unsafe {
            (self.nvrtc.destroy_program)(&mut self.handle);
        }
    }
}

impl Nvrtc {
    pub(crate) fn load() -> Result<Self, ProbeError> {
        let lib = open_first(NVRTC_LIBRARIES)?;
        // SAFETY: signatures follow nvrtc.h.
        unsafe {
            Ok(Self {
                create_program: symbol(&lib, "nvrtcCreateProgram")?,
                compile_program: symbol(&lib, "nvrtcCompileProgram")?,
                get_ptx_size: symbol(&lib, "nvrtcGetPTXSize")?,
                get_ptx: symbol(&lib, "nvrtcGetPTX")?,
                get_log_size: symbol(&lib, "nvrtcGetProgramLogSize")?,
                get_log: symbol(&lib, "nvrtcGetProgramLog")?,
                destroy_program: symbol(&lib, "nvrtcDestroyProgram")?,
                _lib: lib,
            })
        }
    }

    /// Compiles CUDA C++ `source` to nul-terminated PTX.
    pub(crate) fn compile(
        &self,
        source: &str,
        name: &str,
        options: &[&str],
    ) -> Result<CString, ProbeError> {
        let invalid = |what: &str| ProbeError::KernelCompilation {
            log: format!("{what} contains an interior nul byte"),
        };
        let source = CString::new(source).map_err(|_| invalid("source"))?;
        let name = CString::new(name).map_err(|_| invalid("program name"))?;
        let options = options
            .iter()
            .map(|o| CString::new(*o).map_err(|_| invalid("option")))
            .collect::<Result<Vec<_>, _>>()?;
        let option_ptrs: Vec<*const c_char> = options.iter().map(|o| o.as_ptr()).collect();

        let mut handle: NvrtcProgram = std::ptr::null_mut();
        // SAFETY: all strings are nul-terminated and outlive the call.
        let status = unsafe {
            (self.create_program)(
                &mut handle,
                source.as_ptr(),
                name.as_ptr(),
                0,
                std::ptr::null(),
                std::ptr::null(),
            )
        };
        if status != NVRTC_SUCCESS {
            return Err(ProbeError::KernelCompilation {
                log: format!("nvrtcCreateProgram failed with code {status}"),
            });
        }
        let program = Program {
            nvrtc: self,
            handle,
        };

        // SAFETY: `option_ptrs` points into `options`, alive for the call.
        let status = unsafe {
            (self.compile_program)(
                program.handle,
                option_ptrs.len() as c_int,
                option_ptrs.as_ptr(),
            )
        };
        if status != NVRTC_SUCCESS {
            return Err(ProbeError::KernelCompilation {
                log: self.log(&program),
            });
        }

        let mut size = 0usize;
        // SAFETY: the program compiled successfully.
        let status = unsafe { (self.get_ptx_size)(program.handle, &mut size) };
        if status != NVRTC_SUCCESS || size == 0 {
            return Err(ProbeError::KernelCompilation {
                log: format!("nvrtcGetPTXSize failed with code {status}"),
            });
        }
        let mut ptx = vec![0u8; size];
        // SAFETY: `ptx` holds exactly the size NVRTC reported.
        let status = unsafe { (self.get_ptx)(program.handle, ptx.as_mut_ptr().cast()) };
        if status != NVRTC_SUCCESS {
            return Err(ProbeError::KernelCompilation {
                log: format!("nvrtcGetPTX failed with code {status}"),
            });
        }

        CString::from_vec_with_nul(ptx).map_err(|_| ProbeError::KernelCompilation {
            log: "PTX is not nul-terminated".to_string(),
        })
    }

    fn log(&self, program: &Program<'_>) -> String {
        let mut size = 0usize;
        // SAFETY: valid program handle.
        if unsafe { (self.get_log_size)(program.handle, &mut size) } != NVRTC_SUCCESS || size == 0 {
            return String::from("(no compiler log)");
        }
        let mut log = vec![0u8; size];
        // SAFETY: `log` holds exactly the size NVRTC reported.
        if unsafe { (self.get_log)(program.handle, log.as_mut_ptr().cast()) } != NVRTC_SUCCESS {
            return String::from("(compiler log unavailable)");
        }
        CStr::from_bytes_until_nul(&log)
            .map(|s| s.to_string_lossy().trim().to_string())
            .unwrap_or_default()
    }
}
