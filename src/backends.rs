//! Per-backend capability handles.
//!
//! A session holds exactly one handle per backend it discovered. Handles are
//! cheap, immutable and shared through `Arc`.

use crate::backend::BackendType;
use crate::device::CapabilitySnapshot;
use crate::types::OperationType;

/// Capability object for one execution backend.
pub trait Backend: std::fmt::Debug + Send + Sync {
    fn device_type(&self) -> BackendType;

    /// Whether the hardware behind this handle was present at session start.
    fn is_available(&self) -> bool;

    /// Whether operations of this class can be routed here at all.
    fn supports_operation(&self, op_type: OperationType) -> bool;
}

/// The host CPU. Always available; supports every operation class.
#[derive(Debug, Clone, Default)]
pub struct CpuBackend {
    cores: usize,
}

impl CpuBackend {
    #[must_use]
    pub fn new(snapshot: &CapabilitySnapshot) -> Self {
        Self {
            cores: snapshot.cpu_cores(),
        }
    }

    #[must_use]
    pub fn cores(&self) -> usize {
        self.cores
    }
}

impl Backend for CpuBackend {
    fn device_type(&self) -> BackendType {
        BackendType::Cpu
    }

    fn is_available(&self) -> bool {
        true
    }

    fn supports_operation(&self, _op_type: OperationType) -> bool {
        true
    }
}

/// GPU devices found by the capability probe.
///
/// Control flow and scalar logic are never offloaded.
#[derive(Debug, Clone, Default)]
pub struct GpuBackend {
    device_names: Vec<String>,
}

impl GpuBackend {
    #[must_use]
    pub fn new(snapshot: &CapabilitySnapshot) -> Self {
        Self {
            device_names: snapshot.gpu_names().to_vec(),
        }
    }

    #[must_use]
    pub fn device_count(&self) -> usize {
        self.device_names.len()
    }

    #[must_use]
    pub fn device_names(&self) -> &[String] {
        &self.device_names
    }
}

impl Backend for GpuBackend {
    fn device_type(&self) -> BackendType {
        BackendType::Gpu
    }

    fn is_available(&self) -> bool {
        !self.device_names.is_empty()
    }

    fn supports_operation(&self, op_type: OperationType) -> bool {
        !matches!(op_type, OperationType::Control | OperationType::Scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_rejects_control_and_scalar() {
        let gpu = GpuBackend::new(&CapabilitySnapshot::with_gpus(4, [("TestGPU", 1u64 << 33)]));
        assert!(gpu.is_available());
        assert!(!gpu.supports_operation(OperationType::Control));
        assert!(!gpu.supports_operation(OperationType::Scalar));
        assert!(gpu.supports_operation(OperationType::MemoryBound));
        assert!(gpu.supports_operation(OperationType::ComputeMatrix));
    }

    #[test]
    fn cpu_supports_everything() {
        let cpu = CpuBackend::new(&CapabilitySnapshot::cpu_only(2));
        assert_eq!(cpu.cores(), 2);
        assert!(cpu.is_available());
        assert!(cpu.supports_operation(OperationType::Control));
        assert!(cpu.supports_operation(OperationType::ComputeVector));
    }
}
