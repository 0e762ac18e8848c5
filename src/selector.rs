//! Cost-model backend selection.
//!
//! [`select_backend`] maps an operation class, its properties and a capability
//! snapshot to a backend. Rules are evaluated in strict priority order and the
//! first match wins:
//!
//! 1. An explicit per-call request, returned verbatim and unchecked.
//! 2. The process-level forced backend. Forcing `gpu` without a GPU falls back
//!    to the CPU with a warning.
//! 3. Control, scalar and memory-bound operations always run on the CPU.
//! 4. Streaming without batching always runs on the CPU.
//! 5. With a GPU present:
//!    - vectors above [`VECTOR_ELEMENT_THRESHOLD`] elements go to the GPU;
//!    - matrices go to the GPU when both trailing dimensions reach
//!      [`MATRIX_ROW_THRESHOLD`] / [`MATRIX_COL_THRESHOLD`], and otherwise
//!      return the CPU immediately, skipping the batching rule;
//!    - batches of at least [`BATCH_SIZE_THRESHOLD`] items go to the GPU.
//! 6. Everything else runs on the CPU.
//!
//! The selector never fails. "No GPU" and "no rule matched" both mean CPU.

use tracing::{debug, warn};

use crate::backend::BackendType;
use crate::device::CapabilitySnapshot;
use crate::types::{OperationProperties, OperationType};

/// Vectors strictly larger than this are offloaded.
pub const VECTOR_ELEMENT_THRESHOLD: usize = 100_000;

/// Minimum row count for a matrix to be offloaded.
pub const MATRIX_ROW_THRESHOLD: usize = 512;

/// Minimum column count for a matrix to be offloaded.
pub const MATRIX_COL_THRESHOLD: usize = 512;

/// Minimum batch size that makes a batched call GPU-eligible.
pub const BATCH_SIZE_THRESHOLD: usize = 32;

/// Chooses the backend for one operation.
///
/// # Example
/// ```
/// use briny_dispatch::{select_backend, BackendType, CapabilitySnapshot};
/// use briny_dispatch::{OperationProperties, OperationType};
///
/// let snapshot = CapabilitySnapshot::with_gpus(8, [("TestGPU", 8u64 << 30)]);
/// let props = OperationProperties::for_shape([200_000]);
/// let backend = select_backend(OperationType::ComputeVector, &props, &snapshot, None);
/// assert_eq!(backend, BackendType::Gpu);
/// ```
#[must_use]
pub fn select_backend(
    op_type: OperationType,
    op_props: &OperationProperties,
    snapshot: &CapabilitySnapshot,
    requested: Option<BackendType>,
) -> BackendType {
    if let Some(requested) = requested {
        debug!(backend = %requested, "explicitly requested backend");
        return requested;
    }

    if let Some(forced) = snapshot.forced_backend() {
        if forced == BackendType::Gpu && !snapshot.has_gpu() {
            warn!("gpu backend forced but no GPU detected, falling back to cpu");
            return BackendType::Cpu;
        }
        debug!(backend = %forced, "process-level forced backend");
        return forced;
    }

    if op_type.is_cpu_bound() {
        debug!(?op_type, "operation class is pinned to cpu");
        return BackendType::Cpu;
    }

    if op_props.is_streaming && !op_props.is_batched {
        debug!("unbatched streaming operation stays on cpu");
        return BackendType::Cpu;
    }

    if snapshot.has_gpu() {
        let mut use_gpu = false;

        match op_type {
            OperationType::ComputeVector => {
                if op_props.element_count > VECTOR_ELEMENT_THRESHOLD {
                    debug!(
                        elements = op_props.element_count,
                        threshold = VECTOR_ELEMENT_THRESHOLD,
                        "vector above threshold, gpu candidate"
                    );
                    use_gpu = true;
                } else {
                    debug!(
                        elements = op_props.element_count,
                        threshold = VECTOR_ELEMENT_THRESHOLD,
                        "vector at or below threshold"
                    );
                }
            }
            OperationType::ComputeMatrix => {
                let (rows, cols) = op_props.matrix_dims();
                if rows >= MATRIX_ROW_THRESHOLD && cols >= MATRIX_COL_THRESHOLD {
                    debug!(rows, cols, "matrix above threshold, gpu candidate");
                    use_gpu = true;
                } else {
                    // Small matrices return here; batching cannot upgrade them.
                    debug!(rows, cols, "matrix below threshold, staying on cpu");
                    return BackendType::Cpu;
                }
            }
            _ => {}
        }

        if op_props.is_batched && op_props.batch_size >= BATCH_SIZE_THRESHOLD {
            debug!(
                batch_size = op_props.batch_size,
                threshold = BATCH_SIZE_THRESHOLD,
                "batch above threshold, gpu candidate"
            );
            use_gpu = true;
        }

        if use_gpu {
            return BackendType::Gpu;
        }
    }

    BackendType::Cpu
}
