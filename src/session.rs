//! Runtime session: one capability snapshot plus one handle per backend.
//!
//! # Session lifecycle
//!
//! A [`Session`] can be built explicitly with [`Session::new`], which is what
//! tests and embedders that want isolation should do. For convenience there is
//! also a process-wide instance:
//!
//! - [`get_session`] probes the hardware on first access and returns the same
//!   session afterwards
//! - [`init_session`] installs a session built from a caller-provided
//!   snapshot, unless one already exists
//! - [`reset_session`] drops the memoized instance so the next access probes
//!   again
//!
//! Concurrent first access constructs exactly one session.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::backend::BackendType;
use crate::backends::{Backend, CpuBackend, GpuBackend};
use crate::device::{self, CapabilitySnapshot, Device};
use crate::error::{Result, RuntimeError};

lazy_static! {
    static ref GLOBAL_SESSION: RwLock<Option<Arc<Session>>> = RwLock::new(None);
}

/// Holder of the capability snapshot and the per-backend handles derived from it.
#[derive(Debug)]
pub struct Session {
    snapshot: CapabilitySnapshot,
    backends: HashMap<BackendType, Arc<dyn Backend>>,
}

impl Session {
    /// Builds a session from an existing snapshot.
    ///
    /// The CPU handle is always created. The GPU handle exists only if the
    /// snapshot reports at least one GPU. No TPU handle is ever created.
    #[must_use]
    pub fn new(snapshot: CapabilitySnapshot) -> Self {
        let mut backends: HashMap<BackendType, Arc<dyn Backend>> = HashMap::new();
        backends.insert(BackendType::Cpu, Arc::new(CpuBackend::new(&snapshot)));
        if snapshot.has_gpu() {
            backends.insert(BackendType::Gpu, Arc::new(GpuBackend::new(&snapshot)));
        }

        debug!(
            backends = ?backends.keys().collect::<Vec<_>>(),
            gpu_count = snapshot.gpu_count(),
            "constructed session"
        );
        Self { snapshot, backends }
    }

    /// Probes the machine and builds a session from the result.
    #[must_use]
    pub fn detect() -> Self {
        Self::new(device::detect())
    }

    #[must_use]
    pub fn snapshot(&self) -> &CapabilitySnapshot {
        &self.snapshot
    }

    /// The handle for `backend_type`.
    ///
    /// # Errors
    /// [`RuntimeError::DeviceNotFound`] if this session has no such backend.
    pub fn get_backend(&self, backend_type: BackendType) -> Result<Arc<dyn Backend>> {
        self.backends
            .get(&backend_type)
            .cloned()
            .ok_or(RuntimeError::DeviceNotFound(backend_type))
    }

    /// Registered backend types in ascending order.
    #[must_use]
    pub fn backends(&self) -> Vec<BackendType> {
        let mut types: Vec<_> = self.backends.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Device descriptors for every device in the snapshot, CPU first.
    #[must_use]
    pub fn devices(&self) -> Vec<Box<dyn Device>> {
        self.snapshot.devices()
    }
}

/// Returns the process-wide session, probing the hardware on first access.
#[must_use]
pub fn get_session() -> Arc<Session> {
    if let Some(session) = GLOBAL_SESSION.read().as_ref() {
        return Arc::clone(session);
    }

    let mut slot = GLOBAL_SESSION.write();
    // Another thread may have won the race between the two locks.
    Arc::clone(slot.get_or_insert_with(|| Arc::new(Session::detect())))
}

/// Installs a session built from `snapshot` as the process-wide instance.
///
/// If a session already exists it is returned unchanged and `snapshot` is
/// dropped.
#[must_use]
pub fn init_session(snapshot: CapabilitySnapshot) -> Arc<Session> {
    let mut slot = GLOBAL_SESSION.write();
    if let Some(existing) = slot.as_ref() {
        info!("session already initialised, keeping existing instance");
        return Arc::clone(existing);
    }
    Arc::clone(slot.insert(Arc::new(Session::new(snapshot))))
}

/// Discards the process-wide session. Intended for tests and administrative
/// resets; live `Arc<Session>` handles stay valid.
pub fn reset_session() {
    if GLOBAL_SESSION.write().take().is_some() {
        debug!("discarded global session");
    }
}
