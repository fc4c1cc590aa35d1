//! Probes the local GPU driver and CUDA runtime to pick which precompiled
//! bitsandbytes binary variant to load at startup.
//!
//! Three questions are answered, each best-effort: is a CUDA driver present
//! and initializable, which CUDA runtime version is installed, and what is
//! the highest compute capability among the attached devices (capabilities
//! are backward-compatible, so only the maximum matters). A failed stage
//! downgrades to `None` with an emitted [`report::Diagnostic`] instead of
//! aborting the probe.

pub mod capability;
pub mod driver;
pub mod evaluate;
pub mod report;
pub mod runtime;

use std::borrow::Cow;
use std::path::PathBuf;

use thiserror::Error;

/// Failures while opening the native libraries. These never cross the public
/// probe API; they are converted to diagnostics at the point of occurrence.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to load CUDA driver library `{name}`: {source}")]
    DriverLoad {
        name: Cow<'static, str>,
        source: libloading::Error,
    },

    #[error("driver library is missing symbol `{name}`: {source}")]
    MissingSymbol {
        name: &'static str,
        source: libloading::Error,
    },

    #[error("failed to load CUDA runtime library `{path}`: {source}")]
    RuntimeLoad {
        path: PathBuf,
        source: libloading::Error,
    },
}

pub use capability::{enumerate, highest, ComputeCapability};
pub use driver::{acquire, Driver, DriverApi};
pub use evaluate::{evaluate, SetupResult};
pub use report::{Diagnostic, DiagnosticSink, Status, TracingSink};
pub use runtime::{read_version, CudaVersion};
