//! Rayon integration for parallel MD5 hashing.
//!
//! Inputs are split into chunks and each chunk is hashed by an independent
//! [`Dispatcher::digest_batch`] call on the rayon pool. Within a chunk the
//! engine still runs up to [`LANES`] hashers per invocation.

use rayon::prelude::*;

use crate::dispatcher::{self, Dispatcher};
use crate::{Digest, LANES};

/// Inputs handed to one rayon task.
const INPUTS_PER_TASK: usize = LANES * 16;

/// Extension trait for parallel MD5 hashing.
///
/// Provides a method to compute MD5 digests from a parallel iterator,
/// using lane batching when beneficial.
///
/// # Example
///
/// ```
/// use rayon::prelude::*;
/// use md5_batch::ParallelMd5;
///
/// let data: Vec<Vec<u8>> = vec![
///     b"hello".to_vec(),
///     b"world".to_vec(),
///     b"test".to_vec(),
/// ];
///
/// let digests = data.par_iter().md5_digest();
/// assert_eq!(digests.len(), 3);
/// assert_eq!(digests[1], md5_batch::digest(b"world"));
/// ```
pub trait ParallelMd5<T> {
    /// Compute MD5 digests in parallel, in iterator order.
    fn md5_digest(self) -> Vec<Digest>;
}

impl<I, T> ParallelMd5<T> for I
where
    I: ParallelIterator<Item = T>,
    T: AsRef<[u8]> + Send + Sync,
{
    fn md5_digest(self) -> Vec<Digest> {
        let items: Vec<T> = self.collect();
        par_digest_batch(&items)
    }
}

/// Compute MD5 digests for `inputs` on the rayon pool with the global
/// dispatcher. Digests are returned in input order.
pub fn par_digest_batch<T: AsRef<[u8]> + Sync>(inputs: &[T]) -> Vec<Digest> {
    par_digest_batch_with(dispatcher::global(), inputs)
}

/// [`par_digest_batch`] with an explicit dispatcher.
pub fn par_digest_batch_with<T: AsRef<[u8]> + Sync>(
    dispatcher: &Dispatcher,
    inputs: &[T],
) -> Vec<Digest> {
    if inputs.len() <= INPUTS_PER_TASK {
        return dispatcher.digest_batch(inputs);
    }
    inputs
        .par_chunks(INPUTS_PER_TASK)
        .map(|chunk| dispatcher.digest_batch(chunk))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}
