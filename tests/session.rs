mod common;

use std::sync::Arc;

use briny_dispatch::{
    BackendType, CapabilitySnapshot, OperationType, RuntimeError, Session, Tensor, get_session,
    init_session, reset_session,
};
use common::{cpu_snapshot, gpu_snapshot, init_tracing};

#[test]
fn test_cpu_only_session_has_no_gpu_handle() {
    let session = Session::new(cpu_snapshot());
    assert_eq!(session.backends(), vec![BackendType::Cpu]);
    assert!(session.get_backend(BackendType::Cpu).unwrap().is_available());
    assert_eq!(
        session.get_backend(BackendType::Gpu).unwrap_err(),
        RuntimeError::DeviceNotFound(BackendType::Gpu)
    );
}

#[test]
fn test_gpu_session_never_creates_tpu() {
    let session = Session::new(gpu_snapshot());
    assert_eq!(session.backends(), vec![BackendType::Cpu, BackendType::Gpu]);
    let gpu = session.get_backend(BackendType::Gpu).unwrap();
    assert_eq!(gpu.device_type(), BackendType::Gpu);
    assert!(!gpu.supports_operation(OperationType::Control));
    assert!(matches!(
        session.get_backend(BackendType::Tpu),
        Err(RuntimeError::DeviceNotFound(BackendType::Tpu))
    ));
}

#[test]
fn test_session_devices() {
    let session = Session::new(CapabilitySnapshot::with_gpus(
        2,
        [("A", 1u64 << 30), ("B", 2 << 30)],
    ));
    let names: Vec<String> = session.devices().iter().map(|d| d.name()).collect();
    assert_eq!(names, vec!["CPU (2 cores)", "GPU:0 (A)", "GPU:1 (B)"]);
    assert_eq!(session.snapshot().gpu_memory_bytes(), &[1 << 30, 2 << 30]);
}

#[test]
fn test_detected_session_always_has_cpu() {
    init_tracing();
    let session = Session::detect();
    assert!(session.snapshot().cpu_cores() >= 1);
    assert!(session.get_backend(BackendType::Cpu).is_ok());
    assert_eq!(
        session.get_backend(BackendType::Gpu).is_ok(),
        session.snapshot().has_gpu()
    );
}

// The global session is process state, so its whole lifecycle lives in one test.
#[test]
fn test_global_session_lifecycle() {
    init_tracing();
    reset_session();

    let installed = init_session(gpu_snapshot());
    assert!(Arc::ptr_eq(&installed, &get_session()));
    assert!(Arc::ptr_eq(&get_session(), &get_session()));

    let ignored = init_session(cpu_snapshot());
    assert!(Arc::ptr_eq(&installed, &ignored));
    assert!(ignored.snapshot().has_gpu());

    let t = Tensor::new(vec![0.0_f32; 200_000]);
    assert_eq!(t.backend(), BackendType::Gpu);

    let handles: Vec<_> = (0..8)
        .map(|_| std::thread::spawn(get_session))
        .collect();
    for handle in handles {
        assert!(Arc::ptr_eq(&installed, &handle.join().unwrap()));
    }

    reset_session();
    let fresh = init_session(cpu_snapshot());
    assert!(!Arc::ptr_eq(&installed, &fresh));
    assert_eq!(Tensor::new(vec![0.0_f32; 200_000]).backend(), BackendType::Cpu);
    reset_session();
}
