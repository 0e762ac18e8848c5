//! Numeric buffers exchanged with kernels.
//!
//! A [`Buffer`] is a flat, row-major block of typed elements with an explicit
//! shape. It is the only data representation kernels see: scalars, sequences
//! and externally shaped data are all converted to a `Buffer` at the boundary,
//! where shape and element count are checked once.
//!
//! ## Example
//!
//! ```rust
//! use briny_dispatch::{buffer, DType};
//!
//! let b = buffer!([[1.0, 2.0], [3.0, 4.0]]);
//! assert_eq!(b.shape(), &[2, 2]);
//! assert_eq!(b.dtype(), DType::Float64);
//! ```

use crate::error::{Result, RuntimeError};
use crate::types::{DType, shape_product};

/// Typed backing storage of a [`Buffer`].
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    Bool(Vec<bool>),
}

impl Storage {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::Float32,
            Self::F64(_) => DType::Float64,
            Self::I32(_) => DType::Int32,
            Self::I64(_) => DType::Int64,
            Self::Bool(_) => DType::Bool,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every element widened to `f64` (`true` is 1).
    #[must_use]
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            Self::F32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::F64(v) => v.clone(),
            Self::I32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::I64(v) => v.iter().map(|&x| x as f64).collect(),
            Self::Bool(v) => v.iter().map(|&x| f64::from(u8::from(x))).collect(),
        }
    }

    /// Converts to `dtype`, going through `f64` when the types differ.
    ///
    /// Float to integer conversion truncates and saturates; anything non-zero
    /// becomes `true`.
    #[must_use]
    pub fn cast(&self, dtype: DType) -> Self {
        if self.dtype() == dtype {
            return self.clone();
        }
        let wide = self.to_f64_vec();
        match dtype {
            DType::Float32 => Self::F32(wide.into_iter().map(|x| x as f32).collect()),
            DType::Float64 => Self::F64(wide),
            DType::Int32 => Self::I32(wide.into_iter().map(|x| x as i32).collect()),
            DType::Int64 => Self::I64(wide.into_iter().map(|x| x as i64).collect()),
            DType::Bool => Self::Bool(wide.into_iter().map(|x| x != 0.0).collect()),
        }
    }
}

/// Element types that can back a [`Buffer`].
pub trait Element: Copy + Send + Sync + PartialEq + std::fmt::Debug + 'static {
    const DTYPE: DType;

    fn into_storage(data: Vec<Self>) -> Storage;

    fn from_storage(storage: &Storage) -> Option<&[Self]>;
}

macro_rules! impl_element {
    ($($ty:ty => $variant:ident, $dtype:ident;)*) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;

                fn into_storage(data: Vec<Self>) -> Storage {
                    Storage::$variant(data)
                }

                fn from_storage(storage: &Storage) -> Option<&[Self]> {
                    match storage {
                        Storage::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Buffer {
                fn from(value: $ty) -> Self {
                    Buffer::scalar(value)
                }
            }
        )*
    };
}

impl_element! {
    f32 => F32, Float32;
    f64 => F64, Float64;
    i32 => I32, Int32;
    i64 => I64, Int64;
    bool => Bool, Bool;
}

/// Row-major typed data with an explicit shape.
///
/// The element count always equals the product of the shape. Scalars have
/// shape `[1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    shape: Vec<usize>,
    storage: Storage,
}

impl Buffer {
    /// Creates a buffer from a shape and flat data.
    ///
    /// # Errors
    /// [`RuntimeError::InvalidShape`] if the shape product overflows or
    /// differs from the number of elements.
    pub fn from_shape_vec<T: Element>(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Result<Self> {
        Self::from_storage(shape, T::into_storage(data))
    }

    pub fn from_storage(shape: impl Into<Vec<usize>>, storage: Storage) -> Result<Self> {
        let shape = shape.into();
        if shape_product(&shape) != Some(storage.len()) {
            return Err(RuntimeError::InvalidShape {
                shape,
                len: storage.len(),
            });
        }
        Ok(Self { shape, storage })
    }

    /// A one-dimensional buffer holding `data`.
    pub fn from_vec<T: Element>(data: Vec<T>) -> Self {
        Self {
            shape: vec![data.len()],
            storage: T::into_storage(data),
        }
    }

    /// A single value, stored with shape `[1]`.
    pub fn scalar<T: Element>(value: T) -> Self {
        Self::from_vec(vec![value])
    }

    /// A two-dimensional buffer from equally long rows.
    pub fn from_rows<T: Element>(rows: Vec<Vec<T>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let shape = vec![rows.len(), cols];
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(RuntimeError::InvalidShape {
                    shape,
                    len: row.len(),
                });
            }
            data.extend(row);
        }
        Self::from_shape_vec(shape, data)
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.storage.len()
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn into_storage(self) -> Storage {
        self.storage
    }

    /// Borrows the elements as `T`, if that is the stored type.
    #[must_use]
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::from_storage(&self.storage)
    }

    /// Copies the elements out as `T`, if that is the stored type.
    #[must_use]
    pub fn to_vec<T: Element>(&self) -> Option<Vec<T>> {
        self.as_slice::<T>().map(<[T]>::to_vec)
    }

    /// Same shape, elements converted to `dtype`.
    #[must_use]
    pub fn cast(&self, dtype: DType) -> Self {
        Self {
            shape: self.shape.clone(),
            storage: self.storage.cast(dtype),
        }
    }

    /// Same data viewed with a new shape of equal element count.
    pub fn reshape(self, shape: impl Into<Vec<usize>>) -> Result<Self> {
        Self::from_storage(shape, self.storage)
    }
}

impl<T: Element> From<Vec<T>> for Buffer {
    fn from(data: Vec<T>) -> Self {
        Self::from_vec(data)
    }
}

impl<T: Element> From<&[T]> for Buffer {
    fn from(data: &[T]) -> Self {
        Self::from_vec(data.to_vec())
    }
}

/// One positional argument passed to a kernel.
#[derive(Debug, Clone, Copy)]
pub enum KernelArg<'a> {
    Buffer(&'a Buffer),
    Scalar(f64),
}

impl<'a> KernelArg<'a> {
    #[must_use]
    pub fn as_buffer(&self) -> Option<&'a Buffer> {
        match self {
            Self::Buffer(buffer) => Some(buffer),
            Self::Scalar(_) => None,
        }
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(value) => Some(*value),
            Self::Buffer(_) => None,
        }
    }
}

impl<'a> From<&'a Buffer> for KernelArg<'a> {
    fn from(buffer: &'a Buffer) -> Self {
        Self::Buffer(buffer)
    }
}

impl From<f64> for KernelArg<'_> {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

/// Builds a [`Buffer`] from nested array literals.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
/// Negative values must be parenthesized, e.g. `[(-1.0), 2.0]`.
///
/// # Panics
/// Panics on ragged literals.
///
/// # Example
/// ```
/// use briny_dispatch::buffer;
/// let b = buffer!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
/// assert_eq!(b.shape(), &[2, 3]);
/// ```
#[macro_export]
macro_rules! buffer {
    ([ $( $inner:tt ),+ $(,)? ]) => {{
        let (shape, data) = $crate::buffer!(@nested [ $( $inner ),+ ]);
        $crate::buffer::Buffer::from_shape_vec(shape, data)
            .expect("nested literal always matches its derived shape")
    }};

    (@nested [ $( $inner:tt ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::buffer!(@nested $inner) ),+ ];
        let first_shape = children[0].0.clone();
        assert!(
            children.iter().all(|c| c.0 == first_shape),
            "ragged buffer literal (rows have mismatched shapes)"
        );
        let mut shape = vec![children.len()];
        shape.extend_from_slice(&first_shape);
        let mut data = ::std::vec::Vec::with_capacity(children.len() * children[0].1.len());
        for (_, child) in children {
            data.extend(child);
        }
        (shape, data)
    }};

    (@nested $lit:expr) => {{
        (::std::vec::Vec::<usize>::new(), vec![$lit])
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_mismatch_is_rejected() {
        let err = Buffer::from_shape_vec([2, 2], vec![1.0_f32, 2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::InvalidShape {
                shape: vec![2, 2],
                len: 3
            }
        );
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        let err = Buffer::from_shape_vec([usize::MAX, 2], Vec::<f32>::new()).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::InvalidShape {
                shape: vec![usize::MAX, 2],
                len: 0
            }
        );
        assert!(Buffer::from_shape_vec([1 << (usize::BITS - 1), 2], Vec::<i64>::new()).is_err());
        assert!(Buffer::from_shape_vec([usize::MAX, 0], Vec::<i64>::new()).is_ok());
    }

    #[test]
    fn scalars_have_unit_shape() {
        let b = Buffer::from(2.5_f32);
        assert_eq!(b.shape(), &[1]);
        assert_eq!(b.dtype(), DType::Float32);
        assert_eq!(b.as_slice::<f32>(), Some(&[2.5][..]));
        assert_eq!(b.as_slice::<f64>(), None);
    }

    #[test]
    fn macro_builds_nested_shapes() {
        let b = buffer!([[[1, 2], [3, 4]], [[5, 6], [7, 8]]]);
        assert_eq!(b.shape(), &[2, 2, 2]);
        assert_eq!(b.dtype(), DType::Int32);
        assert_eq!(b.to_vec::<i32>().unwrap(), (1..=8).collect::<Vec<_>>());
    }

    #[test]
    #[should_panic(expected = "ragged")]
    fn macro_rejects_ragged_rows() {
        let _ = buffer!([[1.0, 2.0], [3.0]]);
    }

    #[test]
    fn from_rows_checks_lengths() {
        let b = Buffer::from_rows(vec![vec![1_i64, 2], vec![3, 4]]).unwrap();
        assert_eq!(b.shape(), &[2, 2]);
        assert!(Buffer::from_rows(vec![vec![1_i64, 2], vec![3]]).is_err());
    }

    #[test]
    fn cast_converts_elementwise() {
        let b = Buffer::from_vec(vec![1.7_f64, -2.2, 0.0]);
        assert_eq!(b.cast(DType::Int32).to_vec::<i32>().unwrap(), vec![1, -2, 0]);
        assert_eq!(
            b.cast(DType::Bool).to_vec::<bool>().unwrap(),
            vec![true, true, false]
        );
        assert_eq!(b.cast(DType::Float64), b);
    }
}
