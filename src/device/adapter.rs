//! Adapter discovery through `wgpu`, used when CUDA reports nothing.
//!
//! The request is async in `wgpu`; detection is synchronous, so it is driven
//! to completion with `pollster::block_on`.

use tracing::debug;

use super::GpuInventory;

/// Requests the high-performance adapter and reports it as a single GPU.
///
/// Software rasterizers and CPU adapters do not count.
pub(super) fn probe() -> Option<GpuInventory> {
    let instance = wgpu::Instance::default();
    let adapter = match pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        force_fallback_adapter: false,
        compatible_surface: None,
    })) {
        Ok(adapter) => adapter,
        Err(err) => {
            debug!(error = %err, "no wgpu adapter available");
            return None;
        }
    };

    let info = adapter.get_info();
    if info.device_type == wgpu::DeviceType::Cpu {
        debug!(adapter = %info.name, "ignoring CPU wgpu adapter");
        return None;
    }

    debug!(adapter = %info.name, backend = ?info.backend, "found wgpu adapter");
    Some(GpuInventory {
        names: vec![info.name],
        memory_bytes: vec![adapter.limits().max_buffer_size],
    })
}
