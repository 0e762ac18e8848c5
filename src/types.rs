//! Operation classification and per-call metadata.
//!
//! The selector never looks at data, only at an [`OperationType`] and the
//! [`OperationProperties`] describing the call.

use core::fmt;

use crate::error::{Result, RuntimeError};

/// Classification of an operation's offload semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// Control flow and branching logic. Always CPU.
    Control,
    /// Single-value arithmetic. Always CPU.
    Scalar,
    /// Copies, casts and cheap elementwise work. Always CPU.
    MemoryBound,
    /// Vectorized math; a GPU candidate once large enough.
    ComputeVector,
    /// Matrix and tensor contractions; the strongest GPU candidate.
    ComputeMatrix,
}

impl OperationType {
    /// Whether this class is pinned to the CPU regardless of size.
    #[must_use]
    pub const fn is_cpu_bound(self) -> bool {
        matches!(self, Self::Control | Self::Scalar | Self::MemoryBound)
    }
}

/// Element types a tensor can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DType {
    /// 32-bit IEEE float; the default.
    #[default]
    Float32,
    /// 64-bit IEEE float.
    Float64,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// One byte per element, `0` or `1`.
    Bool,
}

impl DType {
    /// Width of one element in bytes.
    #[must_use]
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::Float32 | Self::Int32 => 4,
            Self::Float64 | Self::Int64 => 8,
            Self::Bool => 1,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata about one operation call, used to drive backend selection.
///
/// `shape` may be left empty when the layout is not known; when it is given,
/// its product must equal `element_count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationProperties {
    /// Number of elements the operation touches.
    pub element_count: usize,
    /// Ordered dimensions, or empty when unknown.
    pub shape: Vec<usize>,
    /// Whether the call processes `batch_size` independent items.
    pub is_batched: bool,
    /// Items per batch; 1 when unbatched.
    pub batch_size: usize,
    /// Whether data arrives incrementally rather than all at once.
    pub is_streaming: bool,
    /// Width of one element in bytes.
    pub dtype_bytes: usize,
}

impl OperationProperties {
    /// Creates unbatched, non-streaming `float32` properties.
    pub fn new(element_count: usize, shape: impl Into<Vec<usize>>) -> Self {
        Self {
            element_count,
            shape: shape.into(),
            is_batched: false,
            batch_size: 1,
            is_streaming: false,
            dtype_bytes: DType::Float32.size_bytes(),
        }
    }

    /// Creates properties whose element count is the product of `shape`.
    ///
    /// A product that overflows saturates to `usize::MAX`, which
    /// [`validate`](Self::validate) then rejects.
    pub fn for_shape(shape: impl Into<Vec<usize>>) -> Self {
        let shape = shape.into();
        let element_count = shape_product(&shape).unwrap_or(usize::MAX);
        Self::new(element_count, shape)
    }

    /// Marks the call as batched with `batch_size` items.
    #[must_use]
    pub fn batched(mut self, batch_size: usize) -> Self {
        self.is_batched = true;
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn streaming(mut self, is_streaming: bool) -> Self {
        self.is_streaming = is_streaming;
        self
    }

    #[must_use]
    pub fn with_dtype_bytes(mut self, dtype_bytes: usize) -> Self {
        self.dtype_bytes = dtype_bytes;
        self
    }

    /// Total payload size in bytes, saturating at `usize::MAX`.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.element_count.saturating_mul(self.dtype_bytes)
    }

    /// The trailing two dimensions as `(rows, cols)`, or `(0, 0)` when the
    /// shape has fewer than two dimensions.
    #[must_use]
    pub fn matrix_dims(&self) -> (usize, usize) {
        match self.shape.as_slice() {
            [.., rows, cols] => (*rows, *cols),
            _ => (0, 0),
        }
    }

    /// Checks the shape/element-count and dtype-width invariants.
    pub fn validate(&self) -> Result<()> {
        if self.dtype_bytes == 0 {
            return Err(RuntimeError::InvalidProperties(
                "dtype_bytes must be greater than zero".to_string(),
            ));
        }
        if !self.shape.is_empty() {
            let Some(product) = shape_product(&self.shape) else {
                return Err(RuntimeError::InvalidProperties(format!(
                    "shape {:?} overflows usize",
                    self.shape
                )));
            };
            if product != self.element_count {
                return Err(RuntimeError::InvalidProperties(format!(
                    "shape {:?} holds {product} elements, element_count is {}",
                    self.shape, self.element_count
                )));
            }
        }
        Ok(())
    }
}

/// Product of `shape`, or `None` if it overflows `usize`.
#[must_use]
pub fn shape_product(shape: &[usize]) -> Option<usize> {
    if shape.contains(&0) {
        return Some(0);
    }
    shape.iter().try_fold(1_usize, |acc, &dim| acc.checked_mul(dim))
}
