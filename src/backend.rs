//! Backend identifiers.
//!
//! This module defines the closed set of execution targets the runtime knows
//! about. A [`BackendType`] names a target; whether that target actually
//! exists on this machine is a question for the [`session`](crate::session).
//!
//! # Supported Backends
//!
//! - `Cpu`: Always present; every operation has a CPU path.
//! - `Gpu`: Present when the capability probe found at least one device.
//! - `Tpu`: Reserved for future support, never discovered today.

use core::convert::TryFrom;
use core::fmt;
use core::str::FromStr;

use crate::error::RuntimeError;

/// Enumeration of computation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum BackendType {
    /// Host CPU (default).
    #[default]
    Cpu = 0,
    /// Discrete or integrated GPU.
    Gpu = 1,
    /// Placeholder for future TPU support.
    Tpu = 2,
}

impl BackendType {
    /// Every backend, in declaration order.
    pub const ALL: [Self; 3] = [Self::Cpu, Self::Gpu, Self::Tpu];

    /// Lowercase symbolic name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
            Self::Tpu => "tpu",
        }
    }
}

impl TryFrom<u8> for BackendType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Gpu),
            2 => Ok(Self::Tpu),
            _ => Err(()),
        }
    }
}

impl FromStr for BackendType {
    type Err = RuntimeError;

    /// Parses `cpu`, `gpu` or `tpu`, ignoring ASCII case and surrounding
    /// whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            "tpu" => Ok(Self::Tpu),
            _ => Err(RuntimeError::UnknownBackend(s.to_string())),
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
