//! crates/md5-batch/src/error.rs
//!
//! Errors reported by batch writes.

use thiserror::Error;

/// Reasons a batch write was rejected.
///
/// Every variant is detected before any hasher is touched, so a call that
/// returns an error has consumed zero bytes and can be retried once the input
/// is corrected.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum BatchError {
    /// The number of hashers and buffers differ.
    #[error("mismatched buffer count ({buffers}) and digest count ({hashers})")]
    MismatchedCount {
        /// Hashers supplied.
        hashers: usize,
        /// Buffers supplied.
        buffers: usize,
    },

    /// A buffer's length differs from the first buffer's.
    #[error("buffer {index} has length {len}, expected {expected}")]
    MismatchedLength {
        /// Position of the first offending buffer.
        index: usize,
        /// Its length.
        len: usize,
        /// Length of buffer 0.
        expected: usize,
    },

    /// A hasher holds buffered bytes from an earlier partial-block write.
    #[error("hasher {index} has {pending} pending bytes; batch writes need block-aligned state")]
    PartialStateUnsupported {
        /// Position of the first offending hasher.
        index: usize,
        /// Bytes waiting in its block buffer.
        pending: usize,
    },

    /// A buffer lies too far from the rest of its lane group to be addressed
    /// with a signed 32-bit displacement.
    #[error("buffer {index} is {distance} bytes from its lane group base, beyond the 32-bit displacement range")]
    DisplacementOverflow {
        /// Position of the offending buffer.
        index: usize,
        /// Distance from the group base in bytes.
        distance: u64,
    },
}
