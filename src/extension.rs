//! Optional native acceleration library.
//!
//! The library is located through `BRINY_NATIVE_EXTENSION` and loaded at most
//! once per process. When it is missing, every entry point fails with
//! [`RuntimeError::ExtensionUnavailable`]; nothing else in the crate depends
//! on it.

#![allow(unsafe_code)]

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use libloading::Library;
use tracing::debug;

use crate::config::{self, NATIVE_EXTENSION_ENV};
use crate::error::{Result, RuntimeError};

type AddOneFn = unsafe extern "C" fn(x: i64) -> i64;

lazy_static! {
    static ref GLOBAL_EXTENSION: Result<NativeExtension> = NativeExtension::from_env();
}

/// A loaded native extension library.
#[derive(Debug)]
pub struct NativeExtension {
    path: PathBuf,
    library: Library,
}

impl NativeExtension {
    /// Loads the library at `path`.
    ///
    /// # Errors
    /// [`RuntimeError::ExtensionUnavailable`] if the library cannot be loaded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        // SAFETY: loading runs the library's initialisers; the path is chosen
        // by the operator through configuration.
        let library = unsafe { Library::new(path) }.map_err(|err| {
            RuntimeError::ExtensionUnavailable(format!("{}: {err}", path.display()))
        })?;
        debug!(path = %path.display(), "loaded native extension");
        Ok(Self {
            path: path.to_path_buf(),
            library,
        })
    }

    /// Loads the library named by `BRINY_NATIVE_EXTENSION`.
    ///
    /// # Errors
    /// [`RuntimeError::ExtensionUnavailable`] if the variable is unset or the
    /// library cannot be loaded.
    pub fn from_env() -> Result<Self> {
        let path = config::native_extension_path_from_env().ok_or_else(|| {
            RuntimeError::ExtensionUnavailable(format!("{NATIVE_EXTENSION_ENV} is not set"))
        })?;
        Self::open(path)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Calls the library's `add_one` entry point.
    ///
    /// # Errors
    /// [`RuntimeError::ExtensionUnavailable`] if the symbol is missing.
    pub fn add_one(&self, x: i64) -> Result<i64> {
        // SAFETY: `add_one` is declared as `int64_t add_one(int64_t)` by the extension ABI.
        let add_one = unsafe { self.library.get::<AddOneFn>(b"add_one\0") }.map_err(|err| {
            RuntimeError::ExtensionUnavailable(format!("add_one in {}: {err}", self.path.display()))
        })?;
        // SAFETY: pure function of its argument per the extension ABI.
        Ok(unsafe { add_one(x) })
    }
}

/// Calls `add_one` on the process-wide extension, loading it on first use.
///
/// # Errors
/// [`RuntimeError::ExtensionUnavailable`] on every call if the extension could
/// not be loaded.
pub fn add_one(x: i64) -> Result<i64> {
    match &*GLOBAL_EXTENSION {
        Ok(extension) => extension.add_one(x),
        Err(err) => Err(err.clone()),
    }
}
