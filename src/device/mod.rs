//! Hardware capability detection.
//!
//! # Capability Snapshot
//!
//! [`detect`] takes a single best-effort look at the machine and records what
//! it found in an immutable [`CapabilitySnapshot`]:
//!
//! - logical CPU count (1 when the OS will not say)
//! - coarse SIMD hints for the target architecture family
//! - the cgroup memory limit, where one applies
//! - CUDA devices, discovered by dynamically loading the vendor runtime
//! - a `wgpu` adapter, when built with the `wgpu` feature and CUDA found nothing
//! - the process-level forced backend (`BRINY_BACKEND`)
//!
//! Detection never fails. Every probe that goes wrong is logged at `debug` and
//! degrades to the conservative answer: no GPU, minimal CPU.
//!
//! Snapshots for tests are built with [`CapabilitySnapshot::cpu_only`] and
//! [`CapabilitySnapshot::with_gpus`].

mod cuda;
#[cfg(feature = "wgpu")]
mod adapter;

use std::num::NonZeroUsize;
use std::thread;

use tracing::debug;

use crate::backend::BackendType;
use crate::config;

/// Advisory SIMD hints. Nothing in the selector depends on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimdFeatures {
    pub avx2: bool,
    pub avx512: bool,
    pub neon: bool,
}

impl SimdFeatures {
    /// Hints for the architecture this process runs on.
    #[must_use]
    pub fn detect() -> Self {
        detect_simd()
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn detect_simd() -> SimdFeatures {
    SimdFeatures {
        avx2: is_x86_feature_detected!("avx2"),
        avx512: is_x86_feature_detected!("avx512f"),
        neon: false,
    }
}

#[cfg(any(target_arch = "aarch64", target_arch = "arm"))]
fn detect_simd() -> SimdFeatures {
    SimdFeatures {
        neon: true,
        ..SimdFeatures::default()
    }
}

#[cfg(not(any(
    target_arch = "x86",
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "arm"
)))]
fn detect_simd() -> SimdFeatures {
    SimdFeatures::default()
}

/// One-shot record of the hardware available to this process.
///
/// Once handed to a [`Session`](crate::session::Session) it is only ever read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySnapshot {
    cpu_cores: usize,
    memory_limit_bytes: Option<u64>,
    simd: SimdFeatures,
    gpu_names: Vec<String>,
    gpu_memory_bytes: Vec<u64>,
    platform: String,
    forced_backend: Option<BackendType>,
}

impl CapabilitySnapshot {
    /// A snapshot with `cpu_cores` cores and no GPU.
    #[must_use]
    pub fn cpu_only(cpu_cores: usize) -> Self {
        Self {
            cpu_cores: cpu_cores.max(1),
            memory_limit_bytes: None,
            simd: SimdFeatures::default(),
            gpu_names: Vec::new(),
            gpu_memory_bytes: Vec::new(),
            platform: std::env::consts::OS.to_string(),
            forced_backend: None,
        }
    }

    /// A snapshot with the given `(name, memory bytes)` GPUs.
    #[must_use]
    pub fn with_gpus<I, S>(cpu_cores: usize, gpus: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let (gpu_names, gpu_memory_bytes) = gpus
            .into_iter()
            .map(|(name, memory)| (name.into(), memory))
            .unzip();
        Self {
            gpu_names,
            gpu_memory_bytes,
            ..Self::cpu_only(cpu_cores)
        }
    }

    /// Sets the forced-backend hint.
    #[must_use]
    pub fn with_forced_backend(mut self, forced: Option<BackendType>) -> Self {
        self.forced_backend = forced;
        self
    }

    #[must_use]
    pub fn with_memory_limit(mut self, bytes: Option<u64>) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_simd(mut self, simd: SimdFeatures) -> Self {
        self.simd = simd;
        self
    }

    #[must_use]
    pub fn cpu_cores(&self) -> usize {
        self.cpu_cores
    }

    #[must_use]
    pub fn memory_limit_bytes(&self) -> Option<u64> {
        self.memory_limit_bytes
    }

    #[must_use]
    pub fn simd(&self) -> SimdFeatures {
        self.simd
    }

    #[must_use]
    pub fn gpu_count(&self) -> usize {
        self.gpu_names.len()
    }

    #[must_use]
    pub fn gpu_names(&self) -> &[String] {
        &self.gpu_names
    }

    /// Per-device memory, parallel to [`gpu_names`](Self::gpu_names).
    #[must_use]
    pub fn gpu_memory_bytes(&self) -> &[u64] {
        &self.gpu_memory_bytes
    }

    /// Operating system tag, e.g. `linux`.
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    #[must_use]
    pub fn forced_backend(&self) -> Option<BackendType> {
        self.forced_backend
    }

    #[must_use]
    pub fn has_gpu(&self) -> bool {
        self.gpu_count() > 0
    }

    /// Descriptors for every device in this snapshot, CPU first.
    #[must_use]
    pub fn devices(&self) -> Vec<Box<dyn Device>> {
        let mut devices: Vec<Box<dyn Device>> = Vec::with_capacity(1 + self.gpu_count());
        devices.push(Box::new(CpuDevice {
            cores: self.cpu_cores,
            memory_limit_bytes: self.memory_limit_bytes,
        }));
        for (index, (name, memory)) in self
            .gpu_names
            .iter()
            .zip(&self.gpu_memory_bytes)
            .enumerate()
        {
            devices.push(Box::new(GpuDevice {
                index,
                name: name.clone(),
                memory_bytes: *memory,
            }));
        }
        devices
    }
}

/// A physical device described by a snapshot.
pub trait Device: std::fmt::Debug + Send + Sync {
    fn device_type(&self) -> BackendType;

    /// Human-readable label, e.g. `GPU:0 (NVIDIA A100)`.
    fn name(&self) -> String;

    /// Memory available to this process on the device, when known.
    fn memory_bytes(&self) -> Option<u64>;
}

#[derive(Debug, Clone)]
pub struct CpuDevice {
    cores: usize,
    memory_limit_bytes: Option<u64>,
}

impl Device for CpuDevice {
    fn device_type(&self) -> BackendType {
        BackendType::Cpu
    }

    fn name(&self) -> String {
        format!("CPU ({} cores)", self.cores)
    }

    fn memory_bytes(&self) -> Option<u64> {
        self.memory_limit_bytes
    }
}

#[derive(Debug, Clone)]
pub struct GpuDevice {
    index: usize,
    name: String,
    memory_bytes: u64,
}

impl Device for GpuDevice {
    fn device_type(&self) -> BackendType {
        BackendType::Gpu
    }

    fn name(&self) -> String {
        format!("GPU:{} ({})", self.index, self.name)
    }

    fn memory_bytes(&self) -> Option<u64> {
        Some(self.memory_bytes)
    }
}

/// GPUs found by one probe: parallel name and memory lists.
#[derive(Debug, Default)]
pub(crate) struct GpuInventory {
    pub names: Vec<String>,
    pub memory_bytes: Vec<u64>,
}

/// Probes the machine and returns a fresh snapshot.
///
/// This is the only place hardware is touched. It is called once per
/// [`Session`](crate::session::Session) construction.
#[must_use]
pub fn detect() -> CapabilitySnapshot {
    let cpu_cores = thread::available_parallelism().map_or(1, NonZeroUsize::get);
    let gpus = probe_gpus();

    let snapshot = CapabilitySnapshot {
        cpu_cores,
        memory_limit_bytes: memory_limit(),
        simd: SimdFeatures::detect(),
        gpu_names: gpus.names,
        gpu_memory_bytes: gpus.memory_bytes,
        platform: std::env::consts::OS.to_string(),
        forced_backend: config::forced_backend_from_env(),
    };

    debug!(
        cpu_cores = snapshot.cpu_cores,
        gpu_count = snapshot.gpu_count(),
        memory_limit = ?snapshot.memory_limit_bytes,
        simd = ?snapshot.simd,
        forced = ?snapshot.forced_backend,
        "captured capability snapshot"
    );
    snapshot
}

fn probe_gpus() -> GpuInventory {
    match cuda::probe() {
        Ok(inventory) if !inventory.names.is_empty() => return inventory,
        Ok(_) => debug!("CUDA runtime present but reports no devices"),
        Err(reason) => debug!(%reason, "CUDA probe found nothing"),
    }

    #[cfg(feature = "wgpu")]
    {
        if let Some(inventory) = adapter::probe() {
            return inventory;
        }
    }

    GpuInventory::default()
}

/// Values above this are cgroup v1's "unlimited" sentinel in disguise.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
const MEMORY_LIMIT_CEILING: u64 = 1 << 60;

#[cfg(target_os = "linux")]
fn memory_limit() -> Option<u64> {
    const CANDIDATES: [&str; 2] = [
        "/sys/fs/cgroup/memory.max",
        "/sys/fs/cgroup/memory/memory.limit_in_bytes",
    ];
    CANDIDATES.iter().find_map(|path| {
        let raw = std::fs::read_to_string(path).ok()?;
        parse_memory_limit(&raw)
    })
}

#[cfg(not(target_os = "linux"))]
fn memory_limit() -> Option<u64> {
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_memory_limit(raw: &str) -> Option<u64> {
    let bytes = raw.trim().parse::<u64>().ok()?;
    (bytes > 0 && bytes < MEMORY_LIMIT_CEILING).then_some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_limit_parsing() {
        assert_eq!(parse_memory_limit("1073741824\n"), Some(1 << 30));
        assert_eq!(parse_memory_limit("max\n"), None);
        assert_eq!(parse_memory_limit("9223372036854771712"), None);
        assert_eq!(parse_memory_limit("0"), None);
    }

    #[test]
    fn cpu_only_clamps_cores() {
        let snapshot = CapabilitySnapshot::cpu_only(0);
        assert_eq!(snapshot.cpu_cores(), 1);
        assert!(!snapshot.has_gpu());
    }

    #[test]
    fn devices_list_cpu_then_gpus() {
        let snapshot = CapabilitySnapshot::with_gpus(8, [("A100", 80u64 << 30), ("T4", 16 << 30)]);
        let devices = snapshot.devices();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].name(), "CPU (8 cores)");
        assert_eq!(devices[1].name(), "GPU:0 (A100)");
        assert_eq!(devices[2].device_type(), BackendType::Gpu);
        assert_eq!(devices[2].memory_bytes(), Some(16 << 30));
    }
}
