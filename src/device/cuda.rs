//! CUDA device discovery through the dynamically loaded vendor runtime.
//!
//! Nothing here links against CUDA. The driver library is tried first since it
//! can report device names and memory; the runtime library only yields a count.

#![allow(unsafe_code)]

use std::ffi::{CStr, c_char, c_int};

use libloading::Library;
use tracing::debug;

use super::GpuInventory;

type CuResult = c_int;
type CuInitFn = unsafe extern "C" fn(flags: u32) -> CuResult;
type CuDeviceGetCountFn = unsafe extern "C" fn(count: *mut c_int) -> CuResult;
type CuDeviceGetFn = unsafe extern "C" fn(device: *mut c_int, ordinal: c_int) -> CuResult;
type CuDeviceGetNameFn =
    unsafe extern "C" fn(name: *mut c_char, len: c_int, device: c_int) -> CuResult;
type CuDeviceTotalMemFn = unsafe extern "C" fn(bytes: *mut usize, device: c_int) -> CuResult;
type CudaGetDeviceCountFn = unsafe extern "C" fn(count: *mut c_int) -> c_int;

const CUDA_SUCCESS: CuResult = 0;

/// Reported when the runtime API cannot tell us how much memory a device has.
const PLACEHOLDER_MEMORY_BYTES: u64 = 8 * 1024 * 1024 * 1024;

const DRIVER_LIBRARIES: [&str; 3] = ["libcuda.so.1", "libcuda.so", "nvcuda.dll"];

const RUNTIME_LIBRARIES: [&str; 6] = [
    "libcudart.so",
    "libcudart.so.12",
    "libcudart.so.11.0",
    "cudart64_12.dll",
    "/usr/local/cuda/lib64/libcudart.so",
    "/usr/lib/x86_64-linux-gnu/libcudart.so",
];

/// Counts CUDA devices, trying the driver API and then the runtime API.
pub(super) fn probe() -> Result<GpuInventory, String> {
    match probe_driver() {
        Ok(inventory) => Ok(inventory),
        Err(driver_reason) => {
            debug!(reason = %driver_reason, "CUDA driver probe failed, trying runtime");
            probe_runtime()
        }
    }
}

fn probe_driver() -> Result<GpuInventory, String> {
    enumerate_devices(&load_driver()?)
}

/// Driver entry points needed after `cuInit`. Holds no library handle, so
/// nothing downstream can unload the driver.
#[derive(Clone, Copy)]
struct DriverApi {
    device_get_count: CuDeviceGetCountFn,
    device_get: CuDeviceGetFn,
    device_get_name: CuDeviceGetNameFn,
    device_total_mem: CuDeviceTotalMemFn,
}

fn load_driver() -> Result<DriverApi, String> {
    let lib = open_first(&DRIVER_LIBRARIES)?;
    let cu_init: CuInitFn = load_symbol(&lib, b"cuInit\0")?;
    let api = DriverApi {
        device_get_count: load_symbol(&lib, b"cuDeviceGetCount\0")?,
        device_get: load_symbol(&lib, b"cuDeviceGet\0")?,
        device_get_name: load_symbol(&lib, b"cuDeviceGetName\0")?,
        device_total_mem: load_symbol(&lib, b"cuDeviceTotalMem_v2\0")?,
    };

    // SAFETY: signature matches the CUDA driver API.
    check(unsafe { cu_init(0) }, "cuInit")?;
    // The driver stays initialised for the life of the process; unloading it
    // after cuInit is not supported by every driver release.
    std::mem::forget(lib);
    Ok(api)
}

fn enumerate_devices(api: &DriverApi) -> Result<GpuInventory, String> {
    let mut count: c_int = 0;
    // SAFETY: pointers passed to the driver are to live locals.
    check(
        unsafe { (api.device_get_count)(&raw mut count) },
        "cuDeviceGetCount",
    )?;

    let mut inventory = GpuInventory::default();
    for ordinal in 0..count.max(0) {
        let mut device: c_int = 0;
        check(
            unsafe { (api.device_get)(&raw mut device, ordinal) },
            "cuDeviceGet",
        )?;

        let mut raw_name: [c_char; 256] = [0; 256];
        // SAFETY: the buffer length passed matches the buffer, which the driver NUL-terminates.
        let name = if unsafe {
            (api.device_get_name)(raw_name.as_mut_ptr(), raw_name.len() as c_int, device)
        } == CUDA_SUCCESS
        {
            unsafe { CStr::from_ptr(raw_name.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        } else {
            format!("CUDA Device {ordinal}")
        };

        let mut bytes: usize = 0;
        let memory = if unsafe { (api.device_total_mem)(&raw mut bytes, device) } == CUDA_SUCCESS {
            bytes as u64
        } else {
            PLACEHOLDER_MEMORY_BYTES
        };

        inventory.names.push(name);
        inventory.memory_bytes.push(memory);
    }
    Ok(inventory)
}

fn probe_runtime() -> Result<GpuInventory, String> {
    let lib = open_first(&RUNTIME_LIBRARIES)?;
    let cuda_get_device_count: CudaGetDeviceCountFn = load_symbol(&lib, b"cudaGetDeviceCount\0")?;

    let mut count: c_int = 0;
    // SAFETY: signature matches cudaGetDeviceCount; `count` outlives the call.
    check(
        unsafe { cuda_get_device_count(&raw mut count) },
        "cudaGetDeviceCount",
    )?;

    let count = usize::try_from(count).unwrap_or(0);
    let inventory = GpuInventory {
        names: (0..count).map(|i| format!("CUDA Device {i}")).collect(),
        memory_bytes: vec![PLACEHOLDER_MEMORY_BYTES; count],
    };
    std::mem::forget(lib);
    Ok(inventory)
}

fn open_first(candidates: &[&str]) -> Result<Library, String> {
    for candidate in candidates {
        // SAFETY: dynamic library probe only; no symbols are invoked at this stage.
        if let Ok(lib) = unsafe { Library::new(candidate) } {
            debug!(library = candidate, "loaded CUDA library");
            return Ok(lib);
        }
    }
    Err(format!("no CUDA library found (tried {})", candidates.join(", ")))
}

fn load_symbol<T: Copy>(lib: &Library, name: &'static [u8]) -> Result<T, String> {
    // SAFETY: caller provides the symbol type from the CUDA API headers.
    let sym = unsafe { lib.get::<T>(name) }.map_err(|err| {
        format!(
            "failed to resolve CUDA symbol {}: {err}",
            String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name))
        )
    })?;
    Ok(*sym)
}

fn check(code: c_int, call: &str) -> Result<(), String> {
    if code == CUDA_SUCCESS {
        Ok(())
    } else {
        Err(format!("{call} failed with code {code}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn two_devices(count: *mut c_int) -> CuResult {
        unsafe { *count = 2 };
        CUDA_SUCCESS
    }

    unsafe extern "C" fn device_by_ordinal(device: *mut c_int, ordinal: c_int) -> CuResult {
        unsafe { *device = ordinal };
        CUDA_SUCCESS
    }

    unsafe extern "C" fn second_device_missing(device: *mut c_int, ordinal: c_int) -> CuResult {
        if ordinal == 1 {
            return 101;
        }
        unsafe { *device = ordinal };
        CUDA_SUCCESS
    }

    unsafe extern "C" fn no_name(_: *mut c_char, _: c_int, _: c_int) -> CuResult {
        999
    }

    unsafe extern "C" fn one_gib(bytes: *mut usize, _: c_int) -> CuResult {
        unsafe { *bytes = 1 << 30 };
        CUDA_SUCCESS
    }

    fn api(device_get: CuDeviceGetFn) -> DriverApi {
        DriverApi {
            device_get_count: two_devices,
            device_get,
            device_get_name: no_name,
            device_total_mem: one_gib,
        }
    }

    #[test]
    fn enumerates_with_fallback_names() {
        let inventory = enumerate_devices(&api(device_by_ordinal)).unwrap();
        assert_eq!(inventory.names, vec!["CUDA Device 0", "CUDA Device 1"]);
        assert_eq!(inventory.memory_bytes, vec![1 << 30, 1 << 30]);
    }

    #[test]
    fn device_lookup_failure_is_reported() {
        let err = enumerate_devices(&api(second_device_missing)).unwrap_err();
        assert_eq!(err, "cuDeviceGet failed with code 101");
    }
}
