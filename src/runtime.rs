//! Explicit execution context.
//!
//! A [`Runtime`] bundles the [`Session`] a tensor selects its backend against
//! with the [`KernelRegistry`] its operators dispatch through. Tensors keep
//! the runtime they were built in, so results always dispatch in the same
//! context as their operands.

use std::sync::Arc;

use lazy_static::lazy_static;

use crate::device::CapabilitySnapshot;
use crate::dispatch::KernelRegistry;
use crate::session::{Session, get_session};

lazy_static! {
    static ref DEFAULT_REGISTRY: Arc<KernelRegistry> = Arc::new(KernelRegistry::with_defaults());
}

#[derive(Debug, Clone)]
pub struct Runtime {
    session: Arc<Session>,
    registry: Arc<KernelRegistry>,
}

impl Runtime {
    #[must_use]
    pub fn new(session: Arc<Session>, registry: Arc<KernelRegistry>) -> Self {
        Self { session, registry }
    }

    /// A self-contained runtime for `snapshot` with the CPU reference kernels.
    #[must_use]
    pub fn from_snapshot(snapshot: CapabilitySnapshot) -> Self {
        Self::new(
            Arc::new(Session::new(snapshot)),
            Arc::new(KernelRegistry::with_defaults()),
        )
    }

    /// The process-wide session paired with the process-wide default registry.
    #[must_use]
    pub fn global() -> Self {
        Self::new(get_session(), Arc::clone(&DEFAULT_REGISTRY))
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<KernelRegistry> {
        &self.registry
    }
}
