//! Error types for selection, dispatch and tensor operations.

use crate::backend::BackendType;
use crate::types::DType;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors raised by the registry, the tensor layer and the kernels.
///
/// Capability detection and backend selection never produce these; they
/// degrade to the CPU instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// An explicit backend has no handle in the current session.
    #[error("device not found: no {0} backend in the current session")]
    DeviceNotFound(BackendType),

    /// Allocation failure inside a kernel.
    #[error("out of memory: requested {requested} bytes, {available:?} available")]
    OutOfMemory {
        requested: u64,
        available: Option<u64>,
    },

    /// No kernel is registered for the resolved key.
    #[error("operation not supported: no kernel registered for '{op}' on {backend}")]
    OperationNotSupported { op: String, backend: BackendType },

    /// Binary operator invoked across differing backends.
    #[error("backend mismatch: {lhs} vs {rhs}")]
    BackendMismatch { lhs: BackendType, rhs: BackendType },

    /// An optional native acceleration entry point is absent.
    #[error("native extension unavailable: {0}")]
    ExtensionUnavailable(String),

    /// A backend name that is not `cpu`, `gpu` or `tpu`.
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("invalid operation properties: {0}")]
    InvalidProperties(String),

    /// Shape and data length disagree.
    #[error("shape {shape:?} is incompatible with {len} data elements")]
    InvalidShape { shape: Vec<usize>, len: usize },

    #[error("{op}: shape mismatch {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },

    #[error("{op}: dtype mismatch {lhs} vs {rhs}")]
    DTypeMismatch {
        op: &'static str,
        lhs: DType,
        rhs: DType,
    },

    #[error("{op}: unsupported dtype {dtype}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// Failure reported by a kernel body.
    #[error("kernel error: {0}")]
    Kernel(String),
}

impl RuntimeError {
    /// Create a kernel error.
    pub fn kernel(msg: impl Into<String>) -> Self {
        Self::Kernel(msg.into())
    }
}
