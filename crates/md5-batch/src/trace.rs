//! Structured tracing for backend selection and batch dispatch.
//!
//! All events are conditionally compiled behind the `tracing` feature flag and
//! the helpers become no-op inline functions when it is disabled, so the
//! dispatcher can call them unconditionally.

#[cfg(feature = "tracing")]
use crate::config::BACKEND_ENV;
use crate::dispatcher::Backend;
use crate::error::BatchError;

/// Target name for tracing events.
#[cfg(feature = "tracing")]
const DISPATCH_TARGET: &str = "md5_batch::dispatch";

/// Why a batch skipped the vector engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum FallbackReason {
    /// The dispatcher has no vector kernel.
    NoKernel,
    /// Only one hasher; there is nothing to run in parallel.
    SingleHasher,
}

impl FallbackReason {
    #[cfg(feature = "tracing")]
    const fn as_str(self) -> &'static str {
        match self {
            Self::NoKernel => "no vector kernel",
            Self::SingleHasher => "single hasher",
        }
    }
}

// ============================================================================
// Tracing functions (feature-gated)
// ============================================================================

/// Traces the backend a dispatcher settled on.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn backend_selected(backend: Backend, requested: &dyn std::fmt::Display) {
    tracing::info!(
        target: DISPATCH_TARGET,
        backend = ?backend,
        lanes = backend.lanes(),
        requested = %requested,
        "md5: backend selected"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn backend_selected(_backend: Backend, _requested: &dyn std::fmt::Display) {}

/// Traces an explicit backend request that this CPU cannot honour.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn backend_unavailable(requested: Backend, used: Backend) {
    tracing::info!(
        target: DISPATCH_TARGET,
        requested = ?requested,
        used = ?used,
        "md5: requested backend unavailable"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn backend_unavailable(_requested: Backend, _used: Backend) {}

/// Traces an unparseable backend environment variable.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn invalid_backend_env(value: &str) {
    tracing::warn!(
        target: DISPATCH_TARGET,
        variable = BACKEND_ENV,
        value = %value,
        "md5: ignoring unrecognised backend"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn invalid_backend_env(_value: &str) {}

/// Traces the start of a batch write that passed validation.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn batch_start(backend: Backend, hashers: usize, len: usize) {
    tracing::debug!(
        target: DISPATCH_TARGET,
        backend = ?backend,
        hashers = hashers,
        len = len,
        "md5: batch start"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn batch_start(_backend: Backend, _hashers: usize, _len: usize) {}

/// Traces a batch routed entirely through the scalar hasher.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn scalar_fallback(reason: FallbackReason, hashers: usize, len: usize) {
    tracing::debug!(
        target: DISPATCH_TARGET,
        reason = reason.as_str(),
        hashers = hashers,
        len = len,
        "md5: scalar fallback"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn scalar_fallback(_reason: FallbackReason, _hashers: usize, _len: usize) {}

/// Traces one engine invocation.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn lane_group(first_index: usize, lanes: usize, bytes: usize) {
    tracing::trace!(
        target: DISPATCH_TARGET,
        first_index = first_index,
        lanes = lanes,
        blocks = bytes / crate::BLOCK_LEN,
        "md5: lane group"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn lane_group(_first_index: usize, _lanes: usize, _bytes: usize) {}

/// Traces the trailing partial block handed to the scalar hasher.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn remainder(hashers: usize, bytes: usize) {
    tracing::trace!(
        target: DISPATCH_TARGET,
        hashers = hashers,
        bytes = bytes,
        "md5: remainder"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn remainder(_hashers: usize, _bytes: usize) {}

/// Traces a batch that was rejected before any hasher changed.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn batch_rejected(error: &BatchError) {
    tracing::debug!(
        target: DISPATCH_TARGET,
        error = %error,
        "md5: batch rejected"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn batch_rejected(_error: &BatchError) {}
