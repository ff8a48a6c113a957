//! Error types for the cadenza-knn crate.

/// Error type for all caller-facing operations in the cadenza-knn crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KnnError {
    /// Returned when a feature matrix has no rows.
    #[error("feature matrix has no rows")]
    EmptyMatrix,

    /// Returned when a feature matrix has rows of width zero.
    #[error("feature vectors must have at least one dimension")]
    ZeroDimension,

    /// Returned when a query or a matrix row does not have the fitted width.
    #[error("{}", dimension_message(.expected, .actual, .row))]
    DimensionMismatch {
        /// Expected number of dimensions.
        expected: usize,
        /// Number of dimensions actually supplied.
        actual: usize,
        /// Offending matrix row, or `None` for a query vector.
        row: Option<usize>,
    },

    /// Returned when `predict` is called before a successful `fit`.
    #[error("engine has not been fitted")]
    NotFitted,

    /// Returned when k is zero.
    #[error("k must be >= 1, got {k}")]
    InvalidK {
        /// The invalid k value.
        k: usize,
    },

    /// Returned when an explicit host-lane thread count is zero.
    #[error("host_threads must be >= 1 when set")]
    ZeroHostThreads,

    /// Returned when a metric name does not name a known metric.
    #[error("unknown distance metric: {tag:?}")]
    InvalidMetric {
        /// The unrecognized tag.
        tag: String,
    },

    /// Returned when a required input contains NaN or infinity.
    #[error("non-finite value in {input}")]
    NonFiniteInput {
        /// Name of the input containing the non-finite value.
        input: &'static str,
    },

    /// Returned when the label count does not match the number of rows.
    #[error("got {labels} labels for {rows} rows")]
    LabelCountMismatch {
        /// Number of labels supplied.
        labels: usize,
        /// Number of matrix rows.
        rows: usize,
    },

    /// Returned when the accelerator fails during a prediction.
    #[error("accelerator execution failed: {0}")]
    AcceleratorExecution(#[from] DeviceError),
}

fn dimension_message(expected: &usize, actual: &usize, row: &Option<usize>) -> String {
    match row {
        Some(row) => format!("row {row} has {actual} dimensions, expected {expected}"),
        None => format!("query has {actual} dimensions, expected {expected}"),
    }
}

/// Reasons an accelerator probe can fail.
///
/// Only the backend selector sees these; it always recovers by falling back
/// to the scalar engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    /// The device kind was compiled out of this build.
    #[error("{kind} support is not compiled into this build")]
    Disabled {
        /// The disabled device kind.
        kind: &'static str,
    },

    /// A runtime library could not be loaded.
    #[error("could not load {library}: {reason}")]
    LibraryNotFound {
        /// Library (or list of candidate names) that was searched for.
        library: String,
        /// Loader message.
        reason: String,
    },

    /// A runtime library loaded but lacks an entry point.
    #[error("missing symbol {symbol}: {reason}")]
    MissingSymbol {
        /// Name of the entry point.
        symbol: &'static str,
        /// Loader message.
        reason: String,
    },

    /// A driver call returned a failure code.
    #[error("{call} failed with code {code}")]
    Driver {
        /// Name of the driver entry point.
        call: &'static str,
        /// Raw status code.
        code: i32,
    },

    /// The driver loaded but reported no usable device.
    #[error("no compatible device present")]
    NoDevice,

    /// The distance kernel failed to compile for the device.
    #[error("kernel compilation failed: {log}")]
    KernelCompilation {
        /// Compiler log.
        log: String,
    },

    /// The host cannot run more than one lane at a time.
    #[error("host offers {available} lane(s); at least 2 are needed")]
    InsufficientLanes {
        /// Number of worker threads available.
        available: usize,
    },

    /// The lane worker pool could not be built.
    #[error("lane pool could not be built: {reason}")]
    ThreadPool {
        /// Builder message.
        reason: String,
    },
}

/// Failures raised by a device while serving a prediction.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceError {
    /// Device memory could not be allocated.
    #[error("failed to allocate {bytes} bytes of device memory")]
    Allocation {
        /// Requested size in bytes.
        bytes: usize,
    },

    /// A host/device copy failed or had mismatched lengths.
    #[error("transfer failed: {reason}")]
    Transfer {
        /// Description of the failure.
        reason: String,
    },

    /// The kernel could not be launched.
    #[error("kernel launch failed: {reason}")]
    Launch {
        /// Description of the failure.
        reason: String,
    },

    /// Waiting for kernel completion failed.
    #[error("synchronization failed: {reason}")]
    Synchronize {
        /// Description of the failure.
        reason: String,
    },

    /// The query does not fit in the broadcast region.
    #[error("query of {len} values exceeds broadcast capacity {capacity}")]
    BroadcastOverflow {
        /// Query length.
        len: usize,
        /// Broadcast capacity in values.
        capacity: usize,
    },

    /// A driver call returned a failure code.
    #[error("{call} failed with code {code}")]
    Driver {
        /// Name of the driver entry point.
        call: &'static str,
        /// Raw status code.
        code: i32,
    },
}
