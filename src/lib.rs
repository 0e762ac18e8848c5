//! # `briny_dispatch`
//!
//! The execution-backend decision layer of a small tensor runtime. Given an
//! operation and the properties of its data, it decides whether the work runs
//! on the CPU or a GPU, then routes the call to a kernel registered for that
//! backend.
//!
//! ## Features
//!
//! - **Capability snapshot**: a one-shot, best-effort probe of CPU cores, SIMD
//!   hints, memory limits and CUDA devices (optionally `wgpu` adapters)
//! - **Cost model**: a prioritized rule set (explicit request, forced
//!   override, correctness rules, size/shape thresholds) in [`selector`]
//! - **Kernel registry**: a late-binding `(op, backend) -> kernel` table in
//!   [`dispatch`], with CPU reference kernels parallelised by Rayon
//! - **Tensors**: values bound to one backend for life, whose operators
//!   refuse to mix backends
//!
//! ## Example
//!
//! ```rust
//! use briny_dispatch::{BackendType, Tensor};
//!
//! let a = Tensor::new(vec![1.0_f32, 2.0, 3.0]);
//! let b = Tensor::new(vec![4.0_f32, 5.0, 6.0]);
//! let c = a.add(&b).unwrap();
//! assert_eq!(c.backend(), BackendType::Cpu);
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::similar_names,
    clippy::missing_errors_doc
)]
#![deny(unsafe_code)]
#![forbid(unused_must_use)]

pub mod backend;
pub mod backends;
pub mod buffer;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod extension;
pub mod kernels;
pub mod runtime;
pub mod selector;
pub mod session;
pub mod tensor;
pub mod types;

pub use backend::BackendType;
pub use backends::{Backend, CpuBackend, GpuBackend};
pub use buffer::{Buffer, KernelArg, Storage};
pub use device::{CapabilitySnapshot, SimdFeatures};
pub use dispatch::{Kernel, KernelRegistry, RegistryBuilder};
pub use error::{Result, RuntimeError};
pub use runtime::Runtime;
pub use selector::select_backend;
pub use session::{Session, get_session, init_session, reset_session};
pub use tensor::{BackendRequest, Tensor, TensorOptions};
pub use types::{DType, OperationProperties, OperationType};
