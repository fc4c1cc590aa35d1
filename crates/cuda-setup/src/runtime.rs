use std::ffi::c_int;
use std::fmt;
use std::path::Path;

use libloading::{Library, Symbol};
use serde::Serialize;

use crate::driver::DriverApi;
use crate::report::{report_status, Diagnostic, DiagnosticSink, Status};
use crate::ProbeError;

type CudaRuntimeGetVersionFn = unsafe extern "C" fn(version: *mut c_int) -> c_int;

/// CUDA runtime version, decoded from the single-integer encoding the
/// runtime reports (11080 encodes 11.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CudaVersion {
    pub major: i32,
    pub minor: i32,
}

impl CudaVersion {
    /// `major = v / 1000`, `minor = (v - major*1000) / 10`. Integer (floor)
    /// division throughout, never rounding.
    pub fn from_raw(raw: i32) -> Self {
        let major = raw / 1000;
        let minor = (raw - major * 1000) / 10;
        Self { major, minor }
    }

    /// Tag used in binary-variant names: major and minor concatenated with
    /// no delimiter (11.8 becomes `"118"`). Existing callers depend on this
    /// exact format.
    pub fn tag(self) -> String {
        format!("{}{}", self.major, self.minor)
    }

    /// LLM.int8() matmul kernels need CUDA 11 or newer.
    pub fn supports_int8_matmul(self) -> bool {
        self.major >= 11
    }
}

impl fmt::Display for CudaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Loads the runtime library at `path` (supplied by the external path
/// resolver) and reads its encoded version.
///
/// Load failure downgrades to `None` with a diagnostic. A version below 11
/// is warned about but still returned.
pub fn read_version(
    driver: &dyn DriverApi,
    path: &Path,
    sink: &dyn DiagnosticSink,
) -> Option<CudaVersion> {
    tracing::debug!("Loading CUDA runtime library from {}", path.display());
    let (_library, get_version) = match load_get_version(path) {
        Ok(loaded) => loaded,
        Err(err) => {
            sink.emit(Diagnostic::RuntimeLoadFailed {
                path: path.to_path_buf(),
                detail: err.to_string(),
            });
            return None;
        }
    };

    let mut raw: c_int = 0;
    let status = Status(unsafe { get_version(&mut raw) });
    report_status(driver, sink, "cudaRuntimeGetVersion", status);

    Some(decode_and_warn(raw, sink))
}

/// Decodes the raw version and warns about sub-11 runtimes. The warning
/// never changes the decoded value.
fn decode_and_warn(raw: i32, sink: &dyn DiagnosticSink) -> CudaVersion {
    let version = CudaVersion::from_raw(raw);
    if !version.supports_int8_matmul() {
        sink.emit(Diagnostic::UnsupportedRuntimeVersion {
            major: version.major,
            minor: version.minor,
        });
    }
    version
}

/// The function pointer stays valid for as long as the returned library does,
/// so both travel together.
fn load_get_version(path: &Path) -> Result<(Library, CudaRuntimeGetVersionFn), ProbeError> {
    let library = unsafe { Library::new(path) }.map_err(|source| ProbeError::RuntimeLoad {
        path: path.to_path_buf(),
        source,
    })?;
    let get_version = unsafe {
        let symbol: Symbol<CudaRuntimeGetVersionFn> = library
            .get(b"cudaRuntimeGetVersion\0")
            .map_err(|source| ProbeError::RuntimeLoad {
                path: path.to_path_buf(),
                source,
            })?;
        *symbol
    };
    Ok((library, get_version))
}
