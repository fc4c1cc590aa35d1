use std::ffi::{c_char, c_int, c_uint, CStr};

use libloading::{Library, Symbol};

use crate::report::{report_status, Diagnostic, DiagnosticSink, Status};
use crate::ProbeError;

#[cfg(windows)]
const DRIVER_CANDIDATES: &[&str] = &["nvcuda.dll"];
#[cfg(not(windows))]
const DRIVER_CANDIDATES: &[&str] = &["libcuda.so.1", "libcuda.so"];

type CuInitFn = unsafe extern "C" fn(flags: c_uint) -> c_int;
type CuGetErrorStringFn = unsafe extern "C" fn(error: c_int, text: *mut *const c_char) -> c_int;
type CuDeviceGetCountFn = unsafe extern "C" fn(count: *mut c_int) -> c_int;
type CuDeviceGetFn = unsafe extern "C" fn(device: *mut c_int, ordinal: c_int) -> c_int;
type CuDeviceComputeCapabilityFn =
    unsafe extern "C" fn(major: *mut c_int, minor: *mut c_int, device: c_int) -> c_int;

/// Driver calls the probe needs, modeled as a status plus whatever the native
/// out-parameter holds so callers can keep going on a non-success status.
///
/// [`Driver`] is the real implementation; tests substitute a scripted one.
pub trait DriverApi {
    fn error_string(&self, status: Status) -> Option<String>;
    fn device_count(&self) -> (Status, i32);
    fn device_get(&self, ordinal: i32) -> (Status, i32);
    fn compute_capability(&self, device: i32) -> (Status, (i32, i32));
}

/// An initialized connection to the native GPU driver interface.
///
/// Owns the loaded library for the duration of one probing session; not safe
/// to share across concurrent probes. There is no native teardown call, the
/// handle is simply dropped when the probe ends.
pub struct Driver {
    cu_init: CuInitFn,
    cu_get_error_string: CuGetErrorStringFn,
    cu_device_get_count: CuDeviceGetCountFn,
    cu_device_get: CuDeviceGetFn,
    cu_device_compute_capability: CuDeviceComputeCapabilityFn,
    _lib: Library,
}

impl Driver {
    /// Tries each platform-conventional driver name through the OS loader's
    /// standard search path, keeping the first library that resolves all
    /// required symbols.
    pub fn open() -> Result<Self, ProbeError> {
        let mut last_err: Option<ProbeError> = None;
        for name in DRIVER_CANDIDATES {
            tracing::debug!("Loading CUDA driver library {name}");
            match unsafe { Library::new(name) } {
                Ok(lib) => return unsafe { Self::from_library(lib) },
                Err(source) => {
                    tracing::debug!(error = %source, "Failed to load {name}");
                    last_err = Some(ProbeError::DriverLoad {
                        name: (*name).into(),
                        source,
                    });
                }
            }
        }
        // DRIVER_CANDIDATES is a non-empty constant
        Err(last_err.expect("at least one driver candidate was tried"))
    }

    unsafe fn from_library(lib: Library) -> Result<Self, ProbeError> {
        unsafe fn resolve<T: Copy>(lib: &Library, name: &'static str) -> Result<T, ProbeError> {
            let symbol: Symbol<T> = lib
                .get(name.as_bytes())
                .map_err(|source| ProbeError::MissingSymbol { name, source })?;
            Ok(*symbol)
        }

        Ok(Self {
            cu_init: resolve(&lib, "cuInit")?,
            cu_get_error_string: resolve(&lib, "cuGetErrorString")?,
            cu_device_get_count: resolve(&lib, "cuDeviceGetCount")?,
            cu_device_get: resolve(&lib, "cuDeviceGet")?,
            cu_device_compute_capability: resolve(&lib, "cuDeviceComputeCapability")?,
            _lib: lib,
        })
    }

    pub fn init(&self, flags: u32) -> Status {
        Status(unsafe { (self.cu_init)(flags) })
    }
}

impl DriverApi for Driver {
    fn error_string(&self, status: Status) -> Option<String> {
        let mut text: *const c_char = std::ptr::null();
        let rc = unsafe { (self.cu_get_error_string)(status.0, &mut text) };
        if rc != 0 || text.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned())
    }

    fn device_count(&self) -> (Status, i32) {
        let mut count: c_int = 0;
        let rc = unsafe { (self.cu_device_get_count)(&mut count) };
        (Status(rc), count)
    }

    fn device_get(&self, ordinal: i32) -> (Status, i32) {
        let mut device: c_int = 0;
        let rc = unsafe { (self.cu_device_get)(&mut device, ordinal) };
        (Status(rc), device)
    }

    fn compute_capability(&self, device: i32) -> (Status, (i32, i32)) {
        let mut major: c_int = 0;
        let mut minor: c_int = 0;
        let rc = unsafe { (self.cu_device_compute_capability)(&mut major, &mut minor, device) };
        (Status(rc), (major, minor))
    }
}

/// Loads the GPU driver and initializes it with the fixed flag value of
/// zero. A load failure downgrades to `None` with a diagnostic; an init
/// error is reported but does not discard the handle.
pub fn acquire(sink: &dyn DiagnosticSink) -> Option<Driver> {
    let driver = match Driver::open() {
        Ok(driver) => driver,
        Err(err) => {
            sink.emit(Diagnostic::DriverLoadFailed {
                detail: err.to_string(),
            });
            return None;
        }
    };

    let status = driver.init(0);
    report_status(&driver, sink, "cuInit", status);
    Some(driver)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Scripted stand-in for the native driver. Out-parameter values are
    /// returned alongside the configured status, like the real API populates
    /// them regardless of success.
    pub(crate) struct MockDriver {
        pub capabilities: Vec<(i32, i32)>,
        pub count_status: Status,
        pub device_status: Status,
        pub capability_status: Status,
        pub error_strings_available: bool,
    }

    impl MockDriver {
        pub(crate) fn with_capabilities(capabilities: &[(i32, i32)]) -> Self {
            Self {
                capabilities: capabilities.to_vec(),
                count_status: Status::SUCCESS,
                device_status: Status::SUCCESS,
                capability_status: Status::SUCCESS,
                error_strings_available: true,
            }
        }
    }

    impl DriverApi for MockDriver {
        fn error_string(&self, status: Status) -> Option<String> {
            if !self.error_strings_available || status.is_success() {
                return None;
            }
            Some(format!("CUDA_ERROR_{}", status.0))
        }

        fn device_count(&self) -> (Status, i32) {
            (self.count_status, self.capabilities.len() as i32)
        }

        fn device_get(&self, ordinal: i32) -> (Status, i32) {
            (self.device_status, ordinal)
        }

        fn compute_capability(&self, device: i32) -> (Status, (i32, i32)) {
            let populated = self
                .capabilities
                .get(device as usize)
                .copied()
                .unwrap_or((0, 0));
            (self.capability_status, populated)
        }
    }
}
