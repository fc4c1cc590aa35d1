use std::path::Path;

use serde::Serialize;

use crate::capability::{enumerate, highest, ComputeCapability};
use crate::driver::{acquire, DriverApi};
use crate::report::DiagnosticSink;
use crate::runtime::{read_version, CudaVersion};

#[cfg(windows)]
const BINARY_EXT: &str = ".dll";
#[cfg(not(windows))]
const BINARY_EXT: &str = ".so";

/// Variant shipped before version-aware selection existed; still the answer
/// when a GPU is present but the runtime version could not be determined.
const LEGACY_DEFAULT_TAG: &str = "116";

/// Outcome of one probing session: the binary variant to load plus the
/// observations it was derived from. Probe failures surface as `None` fields
/// and emitted diagnostics, never as a structured error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupResult {
    pub binary_name: String,
    pub runtime_version: Option<CudaVersion>,
    pub highest_capability: Option<ComputeCapability>,
}

/// The fixed BUG REPORT banner printed at the top of every probe.
pub fn banner() -> String {
    let rule = "=".repeat(35);
    format!(
        "\n{rule}BUG REPORT{rule}\n\
         Welcome to bitsandbytes. For bug reports, please submit your error trace to: \
         https://github.com/TimDettmers/bitsandbytes/issues\n\
         For effortless bug reporting copy-paste your error into this form: \
         https://docs.google.com/forms/d/e/1FAIpQLScPB8emS3Thkp66nvqwmjTEgxp8Y9ufuWTzFyr9kJ5AoI47dQ/viewform?usp=sf_link\n\
         {}",
        "=".repeat(80)
    )
}

/// Runs the whole probe and selects the binary variant to load.
///
/// `cudart_path` is the runtime library location produced by the external
/// path resolver; `None` skips the runtime-version probe. Every stage is
/// best-effort, so this always returns a usable result.
pub fn evaluate(cudart_path: Option<&Path>, sink: &dyn DiagnosticSink) -> SetupResult {
    println!("{}", banner());

    let driver = acquire(sink);
    probe(
        driver.as_ref().map(|driver| driver as &dyn DriverApi),
        cudart_path,
        sink,
    )
}

fn probe(
    driver: Option<&dyn DriverApi>,
    cudart_path: Option<&Path>,
    sink: &dyn DiagnosticSink,
) -> SetupResult {
    // dependent probes are never invoked with an absent handle
    let (runtime_version, highest_capability) = match driver {
        Some(driver) => {
            let version = cudart_path.and_then(|path| read_version(driver, path, sink));
            let capabilities = enumerate(driver, sink);
            (version, highest(&capabilities, sink))
        }
        None => (None, None),
    };

    SetupResult {
        binary_name: select_binary_name(runtime_version, highest_capability),
        runtime_version,
        highest_capability,
    }
}

/// Decision table between the CPU-only, cuBLASLt and no-cuBLASLt builds.
///
/// cuBLASLt needs both CUDA >= 11 and capability >= 7.5; below either bound
/// the `nocublaslt` build still carries quantization and 8-bit optimizers.
fn select_binary_name(
    version: Option<CudaVersion>,
    capability: Option<ComputeCapability>,
) -> String {
    let Some(capability) = capability else {
        return format!("libbitsandbytes_cpu{BINARY_EXT}");
    };
    let Some(version) = version else {
        return format!("libbitsandbytes_cuda{LEGACY_DEFAULT_TAG}{BINARY_EXT}");
    };
    if capability.supports_cublaslt() && version.supports_int8_matmul() {
        format!("libbitsandbytes_cuda{}{}", version.tag(), BINARY_EXT)
    } else {
        format!("libbitsandbytes_cuda{}_nocublaslt{}", version.tag(), BINARY_EXT)
    }
}
