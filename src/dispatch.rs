//! Kernel registry and dispatcher.
//!
//! The registry maps `(operation name, backend)` to a kernel closure. Lookups
//! happen at call time, so kernels registered after a tensor was built are
//! still found by that tensor's next operator call.
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use briny_dispatch::{BackendType, Buffer, KernelArg, KernelRegistry, Result};
//!
//! let registry = KernelRegistry::new();
//! registry.register(
//!     "negate",
//!     BackendType::Cpu,
//!     Arc::new(|args: &[KernelArg<'_>]| -> Result<Buffer> {
//!         let x = args[0].as_buffer().unwrap().to_vec::<f32>().unwrap();
//!         Ok(Buffer::from_vec(x.into_iter().map(|v| -v).collect::<Vec<_>>()))
//!     }),
//! );
//!
//! let input = Buffer::from_vec(vec![1.0_f32, -2.0]);
//! let out = registry
//!     .dispatch("negate", BackendType::Cpu, &[KernelArg::from(&input)])
//!     .unwrap();
//! assert_eq!(out.to_vec::<f32>().unwrap(), vec![-1.0, 2.0]);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::backend::BackendType;
use crate::buffer::{Buffer, KernelArg};
use crate::error::{Result, RuntimeError};
use crate::kernels;

/// A backend-specific implementation of one named operation.
pub type Kernel = Arc<dyn Fn(&[KernelArg<'_>]) -> Result<Buffer> + Send + Sync>;

/// Table of kernels keyed by operation name and backend.
///
/// Reads take a shared lock; registration takes an exclusive one. Kernels are
/// invoked after the lock has been released, so a kernel may itself register
/// or dispatch.
#[derive(Default)]
pub struct KernelRegistry {
    // Grouped by backend so lookups can borrow the operation name.
    kernels: RwLock<HashMap<BackendType, HashMap<String, Kernel>>>,
}

impl KernelRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the CPU reference kernels.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::builder().with_cpu_reference_kernels().build()
    }

    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Installs `kernel` for `(op_name, backend)`.
    ///
    /// The last registration wins. Replacing an existing entry logs a warning.
    pub fn register(&self, op_name: impl Into<String>, backend: BackendType, kernel: Kernel) {
        let op_name = op_name.into();
        let mut kernels = self.kernels.write();
        let table = kernels.entry(backend).or_default();
        if table.contains_key(&op_name) {
            warn!(op = %op_name, %backend, "overwriting registered kernel");
        } else {
            debug!(op = %op_name, %backend, "registered kernel");
        }
        table.insert(op_name, kernel);
    }

    /// Resolves the kernel for `(op_name, backend)`.
    ///
    /// # Errors
    /// [`RuntimeError::OperationNotSupported`] when nothing is registered.
    pub fn get_kernel(&self, op_name: &str, backend: BackendType) -> Result<Kernel> {
        self.kernels
            .read()
            .get(&backend)
            .and_then(|table| table.get(op_name))
            .cloned()
            .ok_or_else(|| RuntimeError::OperationNotSupported {
                op: op_name.to_string(),
                backend,
            })
    }

    /// Resolves and invokes the kernel, returning its result unchanged.
    ///
    /// # Errors
    /// [`RuntimeError::OperationNotSupported`] when no kernel is registered,
    /// otherwise whatever the kernel reports.
    pub fn dispatch(
        &self,
        op_name: &str,
        backend: BackendType,
        args: &[KernelArg<'_>],
    ) -> Result<Buffer> {
        let kernel = self.get_kernel(op_name, backend)?;
        debug!(op = op_name, %backend, args = args.len(), "dispatching kernel");
        kernel(args)
    }

    #[must_use]
    pub fn contains(&self, op_name: &str, backend: BackendType) -> bool {
        self.kernels
            .read()
            .get(&backend)
            .is_some_and(|table| table.contains_key(op_name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.kernels.read().values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kernels.read().values().all(HashMap::is_empty)
    }

    /// Every registered key, sorted by operation name and then backend.
    #[must_use]
    pub fn keys(&self) -> Vec<(String, BackendType)> {
        let mut keys: Vec<_> = self
            .kernels
            .read()
            .iter()
            .flat_map(|(&backend, table)| table.keys().map(move |op| (op.clone(), backend)))
            .collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelRegistry")
            .field("kernels", &self.keys())
            .finish()
    }
}

/// Collects kernels at startup and installs them in declaration order.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<(String, BackendType, Kernel)>,
}

impl RegistryBuilder {
    /// Queues a kernel. Later entries for the same key replace earlier ones.
    #[must_use]
    pub fn kernel<F>(mut self, op_name: impl Into<String>, backend: BackendType, f: F) -> Self
    where
        F: Fn(&[KernelArg<'_>]) -> Result<Buffer> + Send + Sync + 'static,
    {
        let kernel: Kernel = Arc::new(f);
        self.entries.push((op_name.into(), backend, kernel));
        self
    }

    /// Queues `add`, `sub`, `mul`, `div` and `matmul` for the CPU.
    #[must_use]
    pub fn with_cpu_reference_kernels(self) -> Self {
        kernels::cpu::register_all(self)
    }

    #[must_use]
    pub fn build(self) -> KernelRegistry {
        let registry = KernelRegistry::new();
        for (op_name, backend, kernel) in self.entries {
            registry.register(op_name, backend, kernel);
        }
        registry
    }
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(op, backend, _)| (op, backend)))
            .finish()
    }
}
