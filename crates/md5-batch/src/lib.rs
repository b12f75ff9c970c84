#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod bridge;
pub mod config;
mod dispatcher;
mod engine;
mod error;
mod rounds;
mod scalar;
mod trace;

#[cfg(feature = "rayon")]
#[cfg_attr(docsrs, doc(cfg(feature = "rayon")))]
mod rayon_support;

pub use config::{BackendPreference, BatchConfig, ParseBackendError};
pub use dispatcher::{Backend, Dispatcher, global};
pub use engine::LANES;
pub use error::BatchError;
pub use rounds::{BLOCK_LEN, DIGEST_LEN};
pub use scalar::Md5;

#[cfg(feature = "rayon")]
#[cfg_attr(docsrs, doc(cfg(feature = "rayon")))]
pub use rayon_support::{ParallelMd5, par_digest_batch, par_digest_batch_with};

/// MD5 digest type (16 bytes / 128 bits).
pub type Digest = [u8; DIGEST_LEN];

/// Writes `buffers[i]` into `hashers[i]` for every `i` using the global
/// dispatcher.
///
/// See [`Dispatcher::write_batch`] for the rules and errors.
///
/// # Examples
///
/// ```
/// use md5_batch::{Md5, write_batch};
///
/// let a = [0x61_u8; 200];
/// let b = [0x62_u8; 200];
/// let mut hashers = [Md5::new(), Md5::new()];
///
/// assert_eq!(write_batch(&mut hashers, &[&a, &b]), Ok(200));
/// assert_eq!(hashers[0].sum(), Md5::digest(&a));
/// assert_eq!(hashers[1].sum(), Md5::digest(&b));
/// ```
pub fn write_batch<H, B>(hashers: &mut [H], buffers: &[B]) -> Result<usize, BatchError>
where
    H: std::borrow::BorrowMut<Md5>,
    B: AsRef<[u8]>,
{
    dispatcher::global().write_batch(hashers, buffers)
}

/// Compute MD5 digests for multiple inputs.
///
/// Inputs may have different lengths. Returns digests in the same order as
/// inputs.
pub fn digest_batch<T: AsRef<[u8]>>(inputs: &[T]) -> Vec<Digest> {
    dispatcher::global().digest_batch(inputs)
}

/// Compute MD5 digest for a single input.
pub fn digest(input: &[u8]) -> Digest {
    dispatcher::global().digest(input)
}

/// Get the backend used by the global dispatcher.
///
/// Useful for logging or diagnostics.
pub fn active_backend() -> Backend {
    dispatcher::global().backend()
}

/// Whether this CPU can run the AVX2 lane kernel. Detected once per process.
pub fn simd_acceleration_available() -> bool {
    engine::avx2_available()
}
