mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use briny_dispatch::{
    BackendType, Buffer, Kernel, KernelArg, KernelRegistry, Result, RuntimeError, buffer,
};
use common::init_tracing;

#[test]
fn test_unregistered_kernel_is_not_supported() {
    let registry = KernelRegistry::with_defaults();
    let err = registry.get_kernel("add", BackendType::Gpu).err().unwrap();
    assert_eq!(
        err,
        RuntimeError::OperationNotSupported {
            op: "add".to_string(),
            backend: BackendType::Gpu,
        }
    );
    assert!(registry.dispatch("conv2d", BackendType::Cpu, &[]).is_err());
}

#[test]
fn test_reregistration_overwrites() {
    init_tracing();
    let registry = KernelRegistry::with_defaults();
    let before = registry.len();
    registry.register(
        "add",
        BackendType::Cpu,
        Arc::new(|_: &[KernelArg<'_>]| -> Result<Buffer> { Ok(Buffer::scalar(42_i64)) }),
    );
    assert_eq!(registry.len(), before);

    let x = Buffer::from_vec(vec![1_i64]);
    let out = registry
        .dispatch("add", BackendType::Cpu, &[KernelArg::from(&x), KernelArg::from(&x)])
        .unwrap();
    assert_eq!(out.to_vec::<i64>().unwrap(), vec![42]);
}

#[test]
fn test_defaults_cover_reference_ops() {
    let registry = KernelRegistry::with_defaults();
    let ops: Vec<String> = registry.keys().into_iter().map(|(op, _)| op).collect();
    assert_eq!(ops, vec!["add", "div", "matmul", "mul", "sub"]);
    assert!(registry.keys().iter().all(|(_, backend)| *backend == BackendType::Cpu));
    assert!(!registry.is_empty());
}

#[test]
fn test_builder_installs_in_declaration_order() {
    let registry = KernelRegistry::builder()
        .kernel("op", BackendType::Gpu, |_| Ok(Buffer::scalar(1.0_f64)))
        .kernel("op", BackendType::Gpu, |_| Ok(Buffer::scalar(2.0_f64)))
        .build();
    let out = registry.dispatch("op", BackendType::Gpu, &[]).unwrap();
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![2.0]);
}

#[test]
fn test_kernel_errors_propagate_unchanged() {
    let registry = KernelRegistry::new();
    registry.register(
        "oom",
        BackendType::Gpu,
        Arc::new(|_: &[KernelArg<'_>]| -> Result<Buffer> {
            Err(RuntimeError::OutOfMemory {
                requested: 1 << 40,
                available: Some(1 << 33),
            })
        }),
    );
    assert!(matches!(
        registry.dispatch("oom", BackendType::Gpu, &[]),
        Err(RuntimeError::OutOfMemory { .. })
    ));
}

#[test]
fn test_kernels_receive_positional_args() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let registry = KernelRegistry::builder()
        .kernel("count", BackendType::Cpu, move |args| {
            counter.store(args.len(), Ordering::SeqCst);
            Ok(Buffer::scalar(args[1].as_scalar().unwrap_or_default()))
        })
        .build();

    let x = buffer!([1.0, 2.0]);
    let out = registry
        .dispatch(
            "count",
            BackendType::Cpu,
            &[KernelArg::from(&x), KernelArg::Scalar(7.5), KernelArg::from(&x)],
        )
        .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![7.5]);
}

#[test]
fn test_cpu_reference_kernels() {
    let registry = KernelRegistry::with_defaults();
    let a = buffer!([[1.0, 2.0], [3.0, 4.0]]);
    let b = buffer!([[10.0, 20.0], [30.0, 40.0]]);
    let args = [KernelArg::from(&a), KernelArg::from(&b)];

    let sum = registry.dispatch("add", BackendType::Cpu, &args).unwrap();
    assert_eq!(sum.to_vec::<f64>().unwrap(), vec![11.0, 22.0, 33.0, 44.0]);
    let diff = registry.dispatch("sub", BackendType::Cpu, &args).unwrap();
    assert_eq!(diff.to_vec::<f64>().unwrap(), vec![-9.0, -18.0, -27.0, -36.0]);
    let quotient = registry.dispatch("div", BackendType::Cpu, &args).unwrap();
    assert_eq!(quotient.to_vec::<f64>().unwrap(), vec![0.1, 0.1, 0.1, 0.1]);

    let product = registry.dispatch("matmul", BackendType::Cpu, &args).unwrap();
    assert_eq!(product.shape(), &[2, 2]);
    assert_eq!(product.to_vec::<f64>().unwrap(), vec![70.0, 100.0, 150.0, 220.0]);
}

#[test]
fn test_cpu_kernels_reject_mismatches() {
    let registry = KernelRegistry::with_defaults();
    let a = buffer!([1.0, 2.0, 3.0]);
    let b = buffer!([1.0, 2.0]);
    assert!(matches!(
        registry.dispatch("add", BackendType::Cpu, &[KernelArg::from(&a), KernelArg::from(&b)]),
        Err(RuntimeError::ShapeMismatch { op: "add", .. })
    ));

    let c = Buffer::from_vec(vec![1_i32, 2, 3]);
    assert!(matches!(
        registry.dispatch("mul", BackendType::Cpu, &[KernelArg::from(&a), KernelArg::from(&c)]),
        Err(RuntimeError::DTypeMismatch { op: "mul", .. })
    ));

    let m = buffer!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    assert!(matches!(
        registry.dispatch("matmul", BackendType::Cpu, &[KernelArg::from(&m), KernelArg::from(&m)]),
        Err(RuntimeError::ShapeMismatch { op: "matmul", .. })
    ));
}

#[test]
fn test_concurrent_register_and_dispatch_resolve_one_kernel() {
    const WRITERS: usize = 4;
    const READERS: usize = 4;
    const ROUNDS: usize = 200;

    let registry = KernelRegistry::with_defaults();
    let defaults = registry.len();
    let version = |value: f32| -> Kernel {
        Arc::new(move |_: &[KernelArg<'_>]| -> Result<Buffer> { Ok(Buffer::scalar(value)) })
    };
    registry.register("shared", BackendType::Cpu, version(0.0));

    std::thread::scope(|scope| {
        for writer in 0..WRITERS {
            let registry = &registry;
            scope.spawn(move || {
                for round in 0..ROUNDS {
                    registry.register("shared", BackendType::Cpu, version(writer as f32));
                    registry.register(format!("op_{writer}_{round}"), BackendType::Gpu, version(1.0));
                }
            });
        }
        for _ in 0..READERS {
            let registry = &registry;
            scope.spawn(move || {
                for _ in 0..ROUNDS {
                    let out = registry.dispatch("shared", BackendType::Cpu, &[]).unwrap();
                    let value = out.to_vec::<f32>().unwrap();
                    assert_eq!(value.len(), 1);
                    assert!((0..WRITERS).any(|w| value[0] == w as f32));
                    assert!(registry.get_kernel("add", BackendType::Cpu).is_ok());
                }
            });
        }
    });

    assert_eq!(registry.len(), defaults + 1 + WRITERS * ROUNDS);
    assert!(registry.contains("shared", BackendType::Cpu));
    assert!(!registry.contains("shared", BackendType::Gpu));
}
