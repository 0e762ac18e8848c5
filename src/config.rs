//! Process-level configuration read from the environment.
//!
//! | Variable                 | Effect                                           |
//! |--------------------------|--------------------------------------------------|
//! | `BRINY_BACKEND`          | `cpu` or `gpu` forces every automatic selection |
//! | `BRINY_NATIVE_EXTENSION` | path of the optional native extension library    |
//!
//! Both are read when needed and never cached here; the forced backend is
//! captured once into each [`CapabilitySnapshot`](crate::device::CapabilitySnapshot).

use std::env;
use std::path::PathBuf;

use tracing::warn;

use crate::backend::BackendType;

/// Environment variable forcing the backend of automatic selections.
pub const FORCED_BACKEND_ENV: &str = "BRINY_BACKEND";

/// Environment variable naming the native extension library.
pub const NATIVE_EXTENSION_ENV: &str = "BRINY_NATIVE_EXTENSION";

/// Parses a forced-backend setting.
///
/// Only `cpu` and `gpu` are recognized (ASCII case-insensitive); everything
/// else, including `tpu`, yields `None` so selection falls through to the
/// cost model.
#[must_use]
pub fn parse_forced_backend(value: &str) -> Option<BackendType> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "cpu" => Some(BackendType::Cpu),
        "gpu" => Some(BackendType::Gpu),
        _ => None,
    }
}

/// Reads [`FORCED_BACKEND_ENV`].
pub fn forced_backend_from_env() -> Option<BackendType> {
    match env::var(FORCED_BACKEND_ENV) {
        Ok(value) if !value.trim().is_empty() => {
            let parsed = parse_forced_backend(&value);
            if parsed.is_none() {
                warn!(
                    variable = FORCED_BACKEND_ENV,
                    value = %value,
                    "ignoring unrecognized forced backend"
                );
            }
            parsed
        }
        _ => None,
    }
}

/// Reads [`NATIVE_EXTENSION_ENV`].
pub fn native_extension_path_from_env() -> Option<PathBuf> {
    env::var_os(NATIVE_EXTENSION_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
