use std::fmt;

use serde::Serialize;

use crate::driver::DriverApi;
use crate::report::{report_status, Diagnostic, DiagnosticSink};

/// GPU architecture version. Higher values are a feature superset of lower
/// ones within the same vendor family, so only the maximum across devices
/// matters for kernel selection.
///
/// `Ord` is lexicographic on (major, minor), matching the
/// backward-compatibility ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ComputeCapability {
    pub major: i32,
    pub minor: i32,
}

impl ComputeCapability {
    pub fn new(major: i32, minor: i32) -> Self {
        Self { major, minor }
    }

    /// cuBLASLt (8-bit matmul) needs Turing (7.5) or newer.
    pub fn supports_cublaslt(self) -> bool {
        self >= ComputeCapability::new(7, 5)
    }
}

impl fmt::Display for ComputeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Reads every attached device's capability, in enumeration order.
///
/// A per-device error is reported through the sink and the populated value
/// kept anyway, so the result length always equals the device count. A zero
/// device count yields an empty list.
pub fn enumerate(driver: &dyn DriverApi, sink: &dyn DiagnosticSink) -> Vec<ComputeCapability> {
    let (status, count) = driver.device_count();
    report_status(driver, sink, "cuDeviceGetCount", status);

    let mut capabilities = Vec::with_capacity(count.max(0) as usize);
    for ordinal in 0..count {
        let (status, device) = driver.device_get(ordinal);
        report_status(driver, sink, "cuDeviceGet", status);

        let (status, (major, minor)) = driver.compute_capability(device);
        report_status(driver, sink, "cuDeviceComputeCapability", status);

        capabilities.push(ComputeCapability::new(major, minor));
    }
    capabilities
}

/// Reduces an enumeration to the single highest capability, `None` when no
/// device was found.
///
/// The driver does not guarantee enumeration order ascending by capability,
/// so this takes the true maximum; lists where the last element would have
/// been the wrong answer are flagged through the sink.
pub fn highest(
    capabilities: &[ComputeCapability],
    sink: &dyn DiagnosticSink,
) -> Option<ComputeCapability> {
    let last = *capabilities.last()?;
    let max = capabilities.iter().copied().max().unwrap_or(last);
    if last != max {
        sink.emit(Diagnostic::UnorderedCapabilities { last, max });
    }
    Some(max)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::driver::tests::MockDriver;
    use crate::report::tests::CollectingSink;
    use crate::report::Status;

    #[test]
    fn enumeration_matches_device_count() {
        let driver = MockDriver::with_capabilities(&[(7, 5), (8, 6)]);
        let sink = CollectingSink::default();

        let capabilities = enumerate(&driver, &sink);

        assert_eq!(
            capabilities,
            vec![ComputeCapability::new(7, 5), ComputeCapability::new(8, 6)]
        );
        assert_eq!(sink.emitted(), vec![]);
    }

    #[test]
    fn zero_devices_yields_empty_list() {
        let driver = MockDriver::with_capabilities(&[]);
        let sink = CollectingSink::default();

        assert_eq!(enumerate(&driver, &sink), vec![]);
        assert_eq!(sink.emitted(), vec![]);
    }

    #[test]
    fn per_device_error_is_reported_but_not_fatal() {
        let mut driver = MockDriver::with_capabilities(&[(8, 0), (9, 0)]);
        driver.capability_status = Status(101);
        let sink = CollectingSink::default();

        let capabilities = enumerate(&driver, &sink);

        // the populated values are carried through, one per device
        assert_eq!(capabilities.len(), 2);
        let errors: Vec<_> = sink
            .emitted()
            .into_iter()
            .filter(|diag| {
                matches!(
                    diag,
                    Diagnostic::NativeCallFailed {
                        call: "cuDeviceComputeCapability",
                        ..
                    }
                )
            })
            .collect();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn highest_of_empty_is_absent() {
        let sink = CollectingSink::default();
        assert_eq!(highest(&[], &sink), None);
        assert_eq!(sink.emitted(), vec![]);
    }

    #[test]
    fn highest_of_singleton_is_that_element() {
        let sink = CollectingSink::default();
        let only = ComputeCapability::new(6, 1);
        assert_eq!(highest(&[only], &sink), Some(only));
        assert_eq!(sink.emitted(), vec![]);
    }

    #[test]
    fn highest_of_ascending_pair_is_the_last() {
        let sink = CollectingSink::default();
        let list = [ComputeCapability::new(7, 5), ComputeCapability::new(8, 6)];

        assert_eq!(highest(&list, &sink), Some(ComputeCapability::new(8, 6)));
        assert_eq!(sink.emitted(), vec![]);
    }

    #[test]
    fn descending_enumeration_still_picks_the_maximum() {
        let sink = CollectingSink::default();
        let list = [ComputeCapability::new(8, 6), ComputeCapability::new(7, 5)];

        assert_eq!(highest(&list, &sink), Some(ComputeCapability::new(8, 6)));
        assert_eq!(
            sink.emitted(),
            vec![Diagnostic::UnorderedCapabilities {
                last: ComputeCapability::new(7, 5),
                max: ComputeCapability::new(8, 6),
            }]
        );
    }

    #[test]
    fn minor_version_breaks_major_ties() {
        assert!(ComputeCapability::new(7, 5) > ComputeCapability::new(7, 0));
        assert!(ComputeCapability::new(8, 0) > ComputeCapability::new(7, 5));
        assert!(!ComputeCapability::new(7, 0).supports_cublaslt());
        assert!(ComputeCapability::new(7, 5).supports_cublaslt());
        assert!(ComputeCapability::new(8, 6).supports_cublaslt());
    }

    #[test]
    fn display_is_dot_separated() {
        assert_eq!(ComputeCapability::new(8, 6).to_string(), "8.6");
    }
}
