//! Parallel CPU reference kernels.
//!
//! # CPU Kernels
//!
//! These are the kernels [`KernelRegistry::with_defaults`](crate::KernelRegistry::with_defaults)
//! installs for [`BackendType::Cpu`]:
//!
//! - `add`, `sub`, `mul`, `div`: elementwise over two buffers of identical
//!   shape and dtype, or a buffer and a scalar on either side
//! - `matmul`: `[m, k] x [k, n] -> [m, n]`
//!
//! Work is spread over the `rayon` pool. Elementwise kernels only go parallel
//! above [`PARALLEL_CUTOFF`] elements; `matmul` always splits by output row.
//!
//! Integer arithmetic wraps. Integer division by zero is an error rather than
//! a panic. Boolean buffers are rejected.

use rayon::prelude::*;

use super::{ADD, DIV, MATMUL, MUL, SUB};
use crate::backend::BackendType;
use crate::buffer::{Buffer, Element, KernelArg, Storage};
use crate::dispatch::RegistryBuilder;
use crate::error::{Result, RuntimeError};

/// Elementwise kernels below this many elements run on the calling thread.
pub const PARALLEL_CUTOFF: usize = 1 << 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    const fn name(self) -> &'static str {
        match self {
            Self::Add => ADD,
            Self::Sub => SUB,
            Self::Mul => MUL,
            Self::Div => DIV,
        }
    }
}

trait Numeric: Element {
    fn zero() -> Self;

    fn from_f64(value: f64) -> Self;

    /// `None` when the operation has no defined result.
    fn apply(op: BinaryOp, lhs: Self, rhs: Self) -> Option<Self>;

    fn mul_acc(acc: Self, lhs: Self, rhs: Self) -> Self;
}

macro_rules! impl_float {
    ($($ty:ty),*) => {
        $(
            impl Numeric for $ty {
                fn zero() -> Self {
                    0.0
                }

                fn from_f64(value: f64) -> Self {
                    value as $ty
                }

                fn apply(op: BinaryOp, lhs: Self, rhs: Self) -> Option<Self> {
                    Some(match op {
                        BinaryOp::Add => lhs + rhs,
                        BinaryOp::Sub => lhs - rhs,
                        BinaryOp::Mul => lhs * rhs,
                        BinaryOp::Div => lhs / rhs,
                    })
                }

                fn mul_acc(acc: Self, lhs: Self, rhs: Self) -> Self {
                    acc + lhs * rhs
                }
            }
        )*
    };
}

macro_rules! impl_int {
    ($($ty:ty),*) => {
        $(
            impl Numeric for $ty {
                fn zero() -> Self {
                    0
                }

                fn from_f64(value: f64) -> Self {
                    value as $ty
                }

                fn apply(op: BinaryOp, lhs: Self, rhs: Self) -> Option<Self> {
                    match op {
                        BinaryOp::Add => Some(lhs.wrapping_add(rhs)),
                        BinaryOp::Sub => Some(lhs.wrapping_sub(rhs)),
                        BinaryOp::Mul => Some(lhs.wrapping_mul(rhs)),
                        BinaryOp::Div => lhs.checked_div(rhs),
                    }
                }

                fn mul_acc(acc: Self, lhs: Self, rhs: Self) -> Self {
                    acc.wrapping_add(lhs.wrapping_mul(rhs))
                }
            }
        )*
    };
}

impl_float!(f32, f64);
impl_int!(i32, i64);

/// Elementwise addition.
///
/// # Errors
/// See the module docs.
pub fn add(args: &[KernelArg<'_>]) -> Result<Buffer> {
    binary(BinaryOp::Add, args)
}

/// Elementwise subtraction.
///
/// # Errors
/// See the module docs.
pub fn sub(args: &[KernelArg<'_>]) -> Result<Buffer> {
    binary(BinaryOp::Sub, args)
}

/// Elementwise multiplication.
///
/// # Errors
/// See the module docs.
pub fn mul(args: &[KernelArg<'_>]) -> Result<Buffer> {
    binary(BinaryOp::Mul, args)
}

/// Elementwise division.
///
/// # Errors
/// Besides the shape and dtype checks, fails with
/// [`RuntimeError::Kernel`] on integer division by zero.
pub fn div(args: &[KernelArg<'_>]) -> Result<Buffer> {
    binary(BinaryOp::Div, args)
}

/// Matrix multiplication `C = A x B` for `A: m x k` and `B: k x n`.
///
/// # Errors
/// - [`RuntimeError::ShapeMismatch`] if either operand is not 2-D or the
///   inner dimensions differ
/// - [`RuntimeError::DTypeMismatch`] if the operands' dtypes differ
/// - [`RuntimeError::UnsupportedDType`] for boolean operands
/// - [`RuntimeError::InvalidShape`] if `m x n` overflows `usize`
///
/// # Example
/// ```rust
/// use briny_dispatch::{buffer, KernelArg};
/// use briny_dispatch::kernels::cpu::matmul;
///
/// let a = buffer!([[1.0, 2.0], [3.0, 4.0]]);
/// let b = buffer!([[5.0, 6.0], [7.0, 8.0]]);
/// let c = matmul(&[KernelArg::from(&a), KernelArg::from(&b)]).unwrap();
/// assert_eq!(c.to_vec::<f64>().unwrap(), vec![19.0, 22.0, 43.0, 50.0]);
/// ```
pub fn matmul(args: &[KernelArg<'_>]) -> Result<Buffer> {
    let [KernelArg::Buffer(a), KernelArg::Buffer(b)] = args else {
        return Err(RuntimeError::kernel("matmul expects two buffer operands"));
    };

    let (&[m, k], &[k2, n]) = (a.shape(), b.shape()) else {
        return Err(shape_mismatch(MATMUL, a, b));
    };
    if k != k2 {
        return Err(shape_mismatch(MATMUL, a, b));
    }
    // Zero-sized operands can still carry dimensions whose product overflows.
    if m.checked_mul(n).is_none() {
        return Err(RuntimeError::InvalidShape {
            shape: vec![m, n],
            len: 0,
        });
    }
    if a.dtype() != b.dtype() {
        return Err(RuntimeError::DTypeMismatch {
            op: MATMUL,
            lhs: a.dtype(),
            rhs: b.dtype(),
        });
    }

    let out = match (a.storage(), b.storage()) {
        (Storage::F32(x), Storage::F32(y)) => Storage::F32(matmul_rows(x, y, m, k, n)),
        (Storage::F64(x), Storage::F64(y)) => Storage::F64(matmul_rows(x, y, m, k, n)),
        (Storage::I32(x), Storage::I32(y)) => Storage::I32(matmul_rows(x, y, m, k, n)),
        (Storage::I64(x), Storage::I64(y)) => Storage::I64(matmul_rows(x, y, m, k, n)),
        _ => {
            return Err(RuntimeError::UnsupportedDType {
                op: MATMUL,
                dtype: a.dtype(),
            });
        }
    };
    Buffer::from_storage([m, n], out)
}

/// Queues every kernel in this module under [`BackendType::Cpu`].
#[must_use]
pub fn register_all(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .kernel(ADD, BackendType::Cpu, add)
        .kernel(SUB, BackendType::Cpu, sub)
        .kernel(MUL, BackendType::Cpu, mul)
        .kernel(DIV, BackendType::Cpu, div)
        .kernel(MATMUL, BackendType::Cpu, matmul)
}

fn binary(op: BinaryOp, args: &[KernelArg<'_>]) -> Result<Buffer> {
    match args {
        [KernelArg::Buffer(a), KernelArg::Buffer(b)] => {
            if a.shape() != b.shape() {
                return Err(shape_mismatch(op.name(), a, b));
            }
            if a.dtype() != b.dtype() {
                return Err(RuntimeError::DTypeMismatch {
                    op: op.name(),
                    lhs: a.dtype(),
                    rhs: b.dtype(),
                });
            }
            let out = match (a.storage(), b.storage()) {
                (Storage::F32(x), Storage::F32(y)) => Storage::F32(zip_with(op, x, y)?),
                (Storage::F64(x), Storage::F64(y)) => Storage::F64(zip_with(op, x, y)?),
                (Storage::I32(x), Storage::I32(y)) => Storage::I32(zip_with(op, x, y)?),
                (Storage::I64(x), Storage::I64(y)) => Storage::I64(zip_with(op, x, y)?),
                _ => {
                    return Err(RuntimeError::UnsupportedDType {
                        op: op.name(),
                        dtype: a.dtype(),
                    });
                }
            };
            Buffer::from_storage(a.shape(), out)
        }
        [KernelArg::Buffer(a), KernelArg::Scalar(s)] => broadcast(op, a, *s, false),
        [KernelArg::Scalar(s), KernelArg::Buffer(b)] => broadcast(op, b, *s, true),
        _ => Err(RuntimeError::kernel(format!(
            "{} expects two operands, at least one a buffer",
            op.name()
        ))),
    }
}

fn broadcast(op: BinaryOp, buffer: &Buffer, scalar: f64, scalar_first: bool) -> Result<Buffer> {
    let out = match buffer.storage() {
        Storage::F32(x) => Storage::F32(with_scalar(op, x, scalar, scalar_first)?),
        Storage::F64(x) => Storage::F64(with_scalar(op, x, scalar, scalar_first)?),
        Storage::I32(x) => Storage::I32(with_scalar(op, x, scalar, scalar_first)?),
        Storage::I64(x) => Storage::I64(with_scalar(op, x, scalar, scalar_first)?),
        Storage::Bool(_) => {
            return Err(RuntimeError::UnsupportedDType {
                op: op.name(),
                dtype: buffer.dtype(),
            });
        }
    };
    Buffer::from_storage(buffer.shape(), out)
}

fn zip_with<T: Numeric>(op: BinaryOp, lhs: &[T], rhs: &[T]) -> Result<Vec<T>> {
    apply_all(op, lhs.len(), |i| lhs[i], |i| rhs[i])
}

fn with_scalar<T: Numeric>(
    op: BinaryOp,
    data: &[T],
    scalar: f64,
    scalar_first: bool,
) -> Result<Vec<T>> {
    let scalar = T::from_f64(scalar);
    if scalar_first {
        apply_all(op, data.len(), |_| scalar, |i| data[i])
    } else {
        apply_all(op, data.len(), |i| data[i], |_| scalar)
    }
}

fn apply_all<T, L, R>(op: BinaryOp, len: usize, lhs: L, rhs: R) -> Result<Vec<T>>
where
    T: Numeric,
    L: Fn(usize) -> T + Sync,
    R: Fn(usize) -> T + Sync,
{
    let compute = |i: usize| T::apply(op, lhs(i), rhs(i));
    let out: Option<Vec<T>> = if len >= PARALLEL_CUTOFF {
        (0..len).into_par_iter().map(compute).collect()
    } else {
        (0..len).map(compute).collect()
    };
    out.ok_or_else(|| RuntimeError::kernel(format!("{}: integer division by zero", op.name())))
}

fn matmul_rows<T: Numeric>(a: &[T], b: &[T], m: usize, k: usize, n: usize) -> Vec<T> {
    let mut out = vec![T::zero(); m * n];
    if n == 0 {
        return out;
    }

    out.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        for (j, cell) in row.iter_mut().enumerate() {
            let mut sum = T::zero();
            for l in 0..k {
                sum = T::mul_acc(sum, a[i * k + l], b[l * n + j]);
            }
            *cell = sum;
        }
    });
    out
}

fn shape_mismatch(op: &'static str, a: &Buffer, b: &Buffer) -> RuntimeError {
    RuntimeError::ShapeMismatch {
        op,
        lhs: a.shape().to_vec(),
        rhs: b.shape().to_vec(),
    }
}
