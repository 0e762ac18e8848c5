//! Backend-bound tensor values.
//!
//! # Backend affinity
//!
//! A [`Tensor`] picks its backend once, at construction, by running the
//! selector against its runtime's session. The choice never changes: moving
//! data to another backend produces a new tensor via [`Tensor::to`].
//!
//! Binary operators require every operand to live on the receiver's backend
//! and fail with [`RuntimeError::BackendMismatch`] otherwise. No implicit copy
//! is ever made. Results inherit the receiver's backend without re-selection.
//!
//! # Example
//! ```rust
//! use briny_dispatch::{BackendType, CapabilitySnapshot, Runtime, Tensor, TensorOptions};
//!
//! let runtime = Runtime::from_snapshot(CapabilitySnapshot::cpu_only(4));
//! let a = Tensor::new_in(&runtime, vec![1.0_f32, 2.0], TensorOptions::default()).unwrap();
//! let b = Tensor::new_in(&runtime, vec![3.0_f32, 4.0], TensorOptions::default()).unwrap();
//! let c = a.mul(&b).unwrap();
//! assert_eq!(c.backend(), BackendType::Cpu);
//! assert_eq!(c.to_string(), "Tensor(shape=[2], dtype=float32, backend='cpu')");
//! ```

use core::fmt;

use tracing::{debug, warn};

use crate::backend::BackendType;
use crate::buffer::{Buffer, KernelArg};
use crate::error::{Result, RuntimeError};
use crate::kernels::{ADD, DIV, MATMUL, MUL, SUB};
use crate::runtime::Runtime;
use crate::selector::select_backend;
use crate::types::{DType, OperationProperties, OperationType};

/// A backend asked for by value or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendRequest {
    /// A backend given directly.
    Typed(BackendType),
    /// Parsed with [`BackendType::from_str`](std::str::FromStr::from_str).
    Named(String),
}

impl From<BackendType> for BackendRequest {
    fn from(backend: BackendType) -> Self {
        Self::Typed(backend)
    }
}

impl From<&str> for BackendRequest {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

/// Construction options for [`Tensor`].
///
/// When both `device` and `backend` are set, `device` wins. A blank
/// `device` counts as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TensorOptions {
    /// Element type to cast the data to.
    pub dtype: Option<DType>,
    /// Backend to bind to, bypassing the cost model.
    pub backend: Option<BackendRequest>,
    /// Free-form device string such as `"cuda:0"`, `"gpu"` or `"cpu"`.
    pub device: Option<String>,
}

impl TensorOptions {
    #[must_use]
    pub fn dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    #[must_use]
    pub fn backend(mut self, backend: impl Into<BackendRequest>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    #[must_use]
    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    fn requested_backend(&self) -> Result<Option<BackendType>> {
        if let Some(device) = self.device.as_deref().filter(|d| !d.trim().is_empty()) {
            return Ok(parse_device(device));
        }
        match &self.backend {
            None => Ok(None),
            Some(BackendRequest::Typed(backend)) => Ok(Some(*backend)),
            Some(BackendRequest::Named(name)) => name.parse().map(Some),
        }
    }
}

/// Maps a device string to a backend; unrecognised strings mean "no request".
fn parse_device(device: &str) -> Option<BackendType> {
    let device = device.to_lowercase();
    if device.contains("cuda") || device.contains("gpu") {
        Some(BackendType::Gpu)
    } else if device.contains("cpu") {
        Some(BackendType::Cpu)
    } else {
        warn!(%device, "unrecognised device string, selecting backend automatically");
        None
    }
}

/// Typed data bound to one backend for its whole lifetime.
#[derive(Debug, Clone)]
pub struct Tensor {
    buffer: Buffer,
    backend: BackendType,
    runtime: Runtime,
}

impl Tensor {
    /// Creates a tensor in the global runtime, letting the selector choose
    /// the backend.
    #[must_use]
    pub fn new(data: impl Into<Buffer>) -> Self {
        let runtime = Runtime::global();
        let buffer = data.into();
        let backend = Self::select(&runtime, &buffer, None);
        Self {
            buffer,
            backend,
            runtime,
        }
    }

    /// Creates a tensor in the global runtime with explicit options.
    ///
    /// # Errors
    /// [`RuntimeError::UnknownBackend`] for an unparseable backend name.
    pub fn with_options(data: impl Into<Buffer>, options: TensorOptions) -> Result<Self> {
        Self::new_in(&Runtime::global(), data, options)
    }

    /// Creates a tensor in `runtime`.
    ///
    /// # Errors
    /// [`RuntimeError::UnknownBackend`] for an unparseable backend name.
    pub fn new_in(
        runtime: &Runtime,
        data: impl Into<Buffer>,
        options: TensorOptions,
    ) -> Result<Self> {
        let mut buffer = data.into();
        if let Some(dtype) = options.dtype.filter(|&dtype| dtype != buffer.dtype()) {
            buffer = buffer.cast(dtype);
        }
        let requested = options.requested_backend()?;
        let backend = Self::select(runtime, &buffer, requested);
        Ok(Self {
            buffer,
            backend,
            runtime: runtime.clone(),
        })
    }

    fn select(runtime: &Runtime, buffer: &Buffer, requested: Option<BackendType>) -> BackendType {
        let props = OperationProperties::new(buffer.element_count(), buffer.shape())
            .with_dtype_bytes(buffer.dtype().size_bytes());
        // Construction has no operation to classify; treat it as vector work.
        let backend = select_backend(
            OperationType::ComputeVector,
            &props,
            runtime.session().snapshot(),
            requested,
        );
        debug!(shape = ?buffer.shape(), %backend, "bound tensor to backend");
        backend
    }

    /// The backend this tensor was bound to at construction.
    #[must_use]
    pub fn backend(&self) -> BackendType {
        self.backend
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.buffer.shape()
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.buffer.dtype()
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.buffer.element_count()
    }

    #[must_use]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    #[must_use]
    pub fn into_buffer(self) -> Buffer {
        self.buffer
    }

    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Elementwise sum, dispatched as `add`.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.call(ADD, &[other])
    }

    /// Elementwise difference, dispatched as `sub`.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.call(SUB, &[other])
    }

    /// Elementwise product, dispatched as `mul`.
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.call(MUL, &[other])
    }

    /// Elementwise quotient, dispatched as `div`.
    pub fn div(&self, other: &Self) -> Result<Self> {
        self.call(DIV, &[other])
    }

    /// Matrix product, dispatched as `matmul`.
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        self.call(MATMUL, &[other])
    }

    /// Adds `value` to every element.
    pub fn add_scalar(&self, value: f64) -> Result<Self> {
        let buffer = self.runtime.registry().dispatch(
            ADD,
            self.backend,
            &[KernelArg::from(&self.buffer), KernelArg::Scalar(value)],
        )?;
        Ok(self.wrap(buffer))
    }

    /// Dispatches `op_name` with `self` followed by `others` as arguments.
    ///
    /// # Errors
    /// - [`RuntimeError::BackendMismatch`] if any operand is bound elsewhere
    /// - [`RuntimeError::OperationNotSupported`] if no kernel is registered
    ///   for `op_name` on this tensor's backend
    /// - any error the kernel itself reports
    pub fn call(&self, op_name: &str, others: &[&Self]) -> Result<Self> {
        if let Some(other) = others.iter().find(|t| t.backend != self.backend) {
            return Err(RuntimeError::BackendMismatch {
                lhs: self.backend,
                rhs: other.backend,
            });
        }

        let args: Vec<KernelArg<'_>> = std::iter::once(&self.buffer)
            .chain(others.iter().map(|t| &t.buffer))
            .map(KernelArg::from)
            .collect();
        let buffer = self
            .runtime
            .registry()
            .dispatch(op_name, self.backend, &args)?;
        Ok(self.wrap(buffer))
    }

    /// Copies the data into a new tensor bound according to `device`.
    pub fn to(&self, device: &str) -> Result<Self> {
        Self::new_in(
            &self.runtime,
            self.buffer.clone(),
            TensorOptions::default().dtype(self.dtype()).device(device),
        )
    }

    fn wrap(&self, mut buffer: Buffer) -> Self {
        if buffer.dtype() != self.dtype() {
            buffer = buffer.cast(self.dtype());
        }
        Self {
            buffer,
            backend: self.backend,
            runtime: self.runtime.clone(),
        }
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor(shape={:?}, dtype={}, backend='{}')",
            self.shape(),
            self.dtype(),
            self.backend
        )
    }
}
