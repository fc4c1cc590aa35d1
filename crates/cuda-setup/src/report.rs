use std::fmt;
use std::path::PathBuf;

use crate::capability::ComputeCapability;
use crate::driver::DriverApi;

/// Raw status code returned by a native CUDA entry point. Zero is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub i32);

impl Status {
    pub const SUCCESS: Status = Status(0);

    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

/// A probe-stage failure or warning, handled at the point of occurrence.
///
/// The `Display` text of the pre-existing variants is kept byte-for-byte
/// compatible with the messages callers already scrape out of logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The driver shared library could not be opened.
    DriverLoadFailed { detail: String },
    /// The runtime shared library could not be opened at the supplied path.
    RuntimeLoadFailed { path: PathBuf, detail: String },
    /// A driver or runtime entry point returned a non-zero status.
    NativeCallFailed {
        call: &'static str,
        code: i32,
        message: String,
    },
    /// Runtime major version below 11: quantization and 8-bit optimizers
    /// work, LLM.int8() matmul kernels do not. A warning, not a failure.
    UnsupportedRuntimeVersion { major: i32, minor: i32 },
    /// Device enumeration order turned out not to be ascending by
    /// capability; the true maximum was used instead of the last element.
    UnorderedCapabilities {
        last: ComputeCapability,
        max: ComputeCapability,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DriverLoadFailed { .. } => f.write_str(
                "CUDA SETUP: WARNING! libcuda.so not found! Do you have a CUDA driver \
                 installed? If you are on a cluster, make sure you are on a CUDA machine!",
            ),
            Diagnostic::RuntimeLoadFailed { path, .. } => write!(
                f,
                "ERROR: libcudart.so could not be read from path: {}!",
                path.display()
            ),
            Diagnostic::NativeCallFailed { message, .. } => {
                write!(f, "CUDA exception! Error code: {message}")
            }
            Diagnostic::UnsupportedRuntimeVersion { .. } => f.write_str(
                "CUDA SETUP: CUDA version lower than 11 are currently not supported for \
                 LLM.int8(). You will be only to use 8-bit optimizers and quantization \
                 routines!!",
            ),
            Diagnostic::UnorderedCapabilities { last, max } => write!(
                f,
                "CUDA SETUP: device enumeration order is not ascending by compute \
                 capability (last device reports {last}, maximum is {max}); using {max}"
            ),
        }
    }
}

/// Receives every diagnostic the probe emits. Injectable so tests assert on
/// structured diagnostics instead of captured process output.
pub trait DiagnosticSink {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Production sink: routes diagnostics through `tracing`.
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::NativeCallFailed { call, code, .. } => {
                tracing::error!(call = *call, code = *code, "{diagnostic}");
            }
            Diagnostic::DriverLoadFailed { detail } => {
                tracing::warn!(detail = %detail, "{diagnostic}");
            }
            Diagnostic::RuntimeLoadFailed { detail, .. } => {
                tracing::error!(detail = %detail, "{diagnostic}");
            }
            Diagnostic::UnsupportedRuntimeVersion { .. }
            | Diagnostic::UnorderedCapabilities { .. } => {
                tracing::warn!("{diagnostic}");
            }
        }
    }
}

/// Routes a native status code through the sink, fetching the driver's
/// textual error string for non-success codes. Never fails itself; a failure
/// while fetching the error string substitutes a placeholder and is not
/// re-reported.
pub fn report_status(
    driver: &dyn DriverApi,
    sink: &dyn DiagnosticSink,
    call: &'static str,
    status: Status,
) {
    if status.is_success() {
        return;
    }
    let message = driver
        .error_string(status)
        .unwrap_or_else(|| "unknown error".to_string());
    sink.emit(Diagnostic::NativeCallFailed {
        call,
        code: status.0,
        message,
    });
}
