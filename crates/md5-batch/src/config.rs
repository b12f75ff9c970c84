//! crates/md5-batch/src/config.rs
//!
//! Backend configuration.
//!
//! Priority: explicit [`BatchConfig`] value > [`BACKEND_ENV`] environment
//! variable > runtime detection. An unrecognised environment value is ignored
//! with a warning and detection is used instead.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::dispatcher::Backend;
use crate::engine;
use crate::trace;

/// Environment variable consulted by [`BatchConfig::from_env`].
pub const BACKEND_ENV: &str = "MD5_BATCH_BACKEND";

/// Which execution strategy a dispatcher should use.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BackendPreference {
    /// AVX2 when the CPU supports it, otherwise scalar.
    #[default]
    Auto,
    /// AVX2; degrades to scalar when the CPU lacks it.
    Avx2,
    /// The lane-wise kernel without SIMD instructions. Never chosen by
    /// detection.
    Portable,
    /// Every buffer goes through the scalar hasher.
    Scalar,
}

impl BackendPreference {
    /// Canonical lowercase name, accepted by [`FromStr`].
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Avx2 => "avx2",
            Self::Portable => "portable",
            Self::Scalar => "scalar",
        }
    }

    /// The backend this preference yields on the running CPU.
    pub fn resolve(self) -> Backend {
        match self {
            Self::Auto | Self::Avx2 if engine::avx2_available() => Backend::Avx2,
            Self::Auto | Self::Avx2 | Self::Scalar => Backend::Scalar,
            Self::Portable => Backend::Portable,
        }
    }
}

impl fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unrecognised backend name.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("unknown md5 backend \"{value}\" (expected auto, avx2, portable or scalar)")]
pub struct ParseBackendError {
    value: String,
}

impl ParseBackendError {
    /// The rejected input.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl FromStr for BackendPreference {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "avx2" => Ok(Self::Avx2),
            "portable" => Ok(Self::Portable),
            "scalar" | "off" | "none" => Ok(Self::Scalar),
            _ => Err(ParseBackendError {
                value: s.to_owned(),
            }),
        }
    }
}

/// Dispatcher configuration.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BatchConfig {
    /// Requested backend.
    pub backend: BackendPreference,
}

impl BatchConfig {
    /// Configuration with automatic backend detection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            backend: BackendPreference::Auto,
        }
    }

    /// Sets the requested backend.
    #[must_use]
    pub const fn with_backend(mut self, backend: BackendPreference) -> Self {
        self.backend = backend;
        self
    }

    /// Reads [`BACKEND_ENV`], falling back to the default when it is unset or
    /// unrecognised.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(BACKEND_ENV).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };
        match value.parse() {
            Ok(backend) => Self { backend },
            Err(_) => {
                trace::invalid_backend_env(value);
                Self::default()
            }
        }
    }

    /// The backend this configuration yields on the running CPU.
    pub fn resolve(&self) -> Backend {
        self.backend.resolve()
    }
}
