#![allow(dead_code)]

use std::sync::Arc;

use briny_dispatch::kernels::cpu;
use briny_dispatch::{BackendType, CapabilitySnapshot, KernelRegistry, Runtime, Session};

/// Routes `tracing` output through the test harness so it shows up on failure.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn cpu_snapshot() -> CapabilitySnapshot {
    CapabilitySnapshot::cpu_only(8)
}

pub fn gpu_snapshot() -> CapabilitySnapshot {
    CapabilitySnapshot::with_gpus(8, [("TestGPU", 8u64 << 30)])
}

pub fn runtime(snapshot: CapabilitySnapshot) -> Runtime {
    Runtime::new(
        Arc::new(Session::new(snapshot)),
        Arc::new(KernelRegistry::with_defaults()),
    )
}

/// A runtime whose registry also serves the CPU reference kernels under
/// [`BackendType::Gpu`], standing in for real device kernels.
pub fn runtime_with_gpu_kernels(snapshot: CapabilitySnapshot) -> Runtime {
    let registry = cpu::register_all(KernelRegistry::builder())
        .kernel("add", BackendType::Gpu, cpu::add)
        .kernel("sub", BackendType::Gpu, cpu::sub)
        .kernel("mul", BackendType::Gpu, cpu::mul)
        .kernel("div", BackendType::Gpu, cpu::div)
        .kernel("matmul", BackendType::Gpu, cpu::matmul)
        .build();
    Runtime::new(Arc::new(Session::new(snapshot)), Arc::new(registry))
}
