//! Backend selection and batch dispatch.
//!
//! A [`Dispatcher`] owns the backend decision and drives batch writes:
//! validation, lane grouping, addressing, engine invocation, state write-back
//! and the scalar remainder. Everything that can reject a batch is checked
//! before the first hasher is advanced, so a failed call leaves every hasher
//! exactly as it was.

use std::borrow::{Borrow, BorrowMut};
use std::sync::OnceLock;

use crate::bridge;
use crate::config::{BackendPreference, BatchConfig};
use crate::engine::{self, AddressingTable, Kernel, LANES, LaneStates, Workspace};
use crate::error::BatchError;
use crate::rounds::{BLOCK_LEN, DIGEST_LEN};
use crate::scalar::Md5;
use crate::trace::{self, FallbackReason};
use crate::Digest;

/// Execution strategies for batch writes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Backend {
    /// AVX2 with 8 parallel lanes.
    Avx2,
    /// Lane-wise kernel in plain Rust with 8 lanes. Only used on request.
    Portable,
    /// Scalar hasher (1 lane).
    Scalar,
}

impl Backend {
    /// Number of hashers advanced together by this backend.
    pub const fn lanes(self) -> usize {
        match self {
            Self::Avx2 | Self::Portable => LANES,
            Self::Scalar => 1,
        }
    }

    /// Whether batch writes run through the multi-lane engine.
    pub const fn is_vector(self) -> bool {
        !matches!(self, Self::Scalar)
    }
}

/// Drives batch writes on one selected backend.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    backend: Backend,
    kernel: Option<Kernel>,
}

impl Dispatcher {
    /// Detect CPU features and select the best available backend.
    ///
    /// Ignores [`BACKEND_ENV`](crate::config::BACKEND_ENV); see
    /// [`Dispatcher::from_config`] and [`BatchConfig::from_env`].
    pub fn detect() -> Self {
        Self::from_config(&BatchConfig::new())
    }

    /// Uses `backend` if this CPU can run it, otherwise [`Backend::Scalar`].
    pub fn with_backend(backend: Backend) -> Self {
        let kernel = match backend {
            Backend::Avx2 => Kernel::avx2(),
            Backend::Portable => Some(Kernel::Portable),
            Backend::Scalar => None,
        };
        if backend.is_vector() && kernel.is_none() {
            trace::backend_unavailable(backend, Backend::Scalar);
            return Self {
                backend: Backend::Scalar,
                kernel: None,
            };
        }
        Self { backend, kernel }
    }

    /// Builds a dispatcher for `config`.
    pub fn from_config(config: &BatchConfig) -> Self {
        let requested = match config.backend {
            BackendPreference::Auto => config.resolve(),
            BackendPreference::Avx2 => Backend::Avx2,
            BackendPreference::Portable => Backend::Portable,
            BackendPreference::Scalar => Backend::Scalar,
        };
        let dispatcher = Self::with_backend(requested);
        trace::backend_selected(dispatcher.backend, &config.backend);
        dispatcher
    }

    /// Get the selected backend.
    pub const fn backend(&self) -> Backend {
        self.backend
    }

    /// Writes `buffers[i]` into `hashers[i]` for every `i`.
    ///
    /// All buffers must have the same length. On success that length is
    /// returned and each hasher is in the state it would reach after
    /// `hashers[i].update(buffers[i])`.
    ///
    /// Batches of more than one hasher take the vector path when the
    /// dispatcher has a vector kernel: whole blocks go through the multi-lane
    /// engine and trailing bytes through [`Md5::update`]. The vector-path
    /// checks apply even when the buffers are shorter than one block. Batches
    /// without a kernel, or with a single hasher, go through [`Md5::update`]
    /// only.
    ///
    /// # Errors
    ///
    /// - [`BatchError::MismatchedCount`] when the slices differ in length.
    /// - [`BatchError::MismatchedLength`] for the first buffer whose length
    ///   differs from `buffers[0]`.
    /// - [`BatchError::PartialStateUnsupported`] when a vector-path hasher
    ///   holds buffered bytes from an earlier write that was not a whole
    ///   number of blocks, whatever the length of `buffers`.
    /// - [`BatchError::DisplacementOverflow`] when the buffers of one lane
    ///   group span more than 2 GiB of address space.
    ///
    /// On error no hasher has been modified.
    pub fn write_batch<H, B>(&self, hashers: &mut [H], buffers: &[B]) -> Result<usize, BatchError>
    where
        H: BorrowMut<Md5>,
        B: AsRef<[u8]>,
    {
        let len = validate(hashers.len(), buffers).inspect_err(trace::batch_rejected)?;
        if len == 0 {
            return Ok(0);
        }

        let count = hashers.len();
        trace::batch_start(self.backend, count, len);

        let Some(kernel) = self.kernel else {
            return Ok(write_scalar(hashers, buffers, FallbackReason::NoKernel));
        };
        if count == 1 {
            return Ok(write_scalar(hashers, buffers, FallbackReason::SingleHasher));
        }

        // Buffers shorter than one block still pass the vector-path checks.
        let groups = plan_groups(hashers, buffers).inspect_err(trace::batch_rejected)?;
        let aligned = len - len % BLOCK_LEN;

        if aligned > 0 {
            let mut states = LaneStates::default();
            let mut scratch = Workspace::new();
            for ((group, lane_hashers), table) in
                hashers.chunks_mut(LANES).enumerate().zip(&groups)
            {
                for (lane, hasher) in lane_hashers.iter().enumerate() {
                    let hasher: &Md5 = hasher.borrow();
                    states.set_lane(lane, bridge::read_state(hasher).state);
                }

                trace::lane_group(group * LANES, table.lanes(), aligned);
                engine::advance(kernel, &mut states, table, &mut scratch, aligned);

                for (lane, hasher) in lane_hashers.iter_mut().enumerate() {
                    let hasher: &mut Md5 = hasher.borrow_mut();
                    bridge::write_state(hasher, states.lane(lane), aligned as u64);
                }
            }
        }

        if aligned < len {
            trace::remainder(count, len - aligned);
            for (hasher, buffer) in hashers.iter_mut().zip(buffers) {
                let hasher: &mut Md5 = hasher.borrow_mut();
                hasher.update(&buffer.as_ref()[aligned..]);
            }
        }

        Ok(len)
    }

    /// Compute MD5 digests for multiple inputs.
    ///
    /// Inputs may differ in length. Inputs of equal length are hashed together
    /// through [`Dispatcher::write_batch`]; digests come back in input order.
    pub fn digest_batch<T: AsRef<[u8]>>(&self, inputs: &[T]) -> Vec<Digest> {
        let mut order: Vec<usize> = (0..inputs.len()).collect();
        order.sort_by_key(|&index| inputs[index].as_ref().len());

        let mut digests = vec![[0_u8; DIGEST_LEN]; inputs.len()];
        for run in order.chunk_by(|&a, &b| inputs[a].as_ref().len() == inputs[b].as_ref().len()) {
            let buffers: Vec<&[u8]> = run.iter().map(|&index| inputs[index].as_ref()).collect();
            let mut hashers = vec![Md5::new(); run.len()];

            // Fresh hashers of equal length can only be refused for
            // displacement range, and a refused batch is untouched.
            if self.write_batch(&mut hashers, &buffers).is_err() {
                for (hasher, buffer) in hashers.iter_mut().zip(&buffers) {
                    hasher.update(buffer);
                }
            }

            for (&index, hasher) in run.iter().zip(hashers) {
                digests[index] = hasher.finalize();
            }
        }
        digests
    }

    /// Compute MD5 digest for a single input.
    pub fn digest(&self, input: &[u8]) -> Digest {
        Md5::digest(input)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::detect()
    }
}

/// Global dispatcher instance, initialized on first use from
/// [`BatchConfig::from_env`].
pub fn global() -> &'static Dispatcher {
    static DISPATCHER: OnceLock<Dispatcher> = OnceLock::new();
    DISPATCHER.get_or_init(|| Dispatcher::from_config(&BatchConfig::from_env()))
}

/// Checks counts and lengths; returns the common buffer length.
fn validate<B: AsRef<[u8]>>(hashers: usize, buffers: &[B]) -> Result<usize, BatchError> {
    if hashers != buffers.len() {
        return Err(BatchError::MismatchedCount {
            hashers,
            buffers: buffers.len(),
        });
    }

    let Some(first) = buffers.first() else {
        return Ok(0);
    };
    let expected = first.as_ref().len();
    if let Some((index, len)) = buffers
        .iter()
        .map(|buffer| buffer.as_ref().len())
        .enumerate()
        .find(|&(_, len)| len != expected)
    {
        return Err(BatchError::MismatchedLength {
            index,
            len,
            expected,
        });
    }
    Ok(expected)
}

/// Runs every check the vector path needs and builds one addressing table per
/// lane group.
fn plan_groups<'a, H, B>(
    hashers: &[H],
    buffers: &'a [B],
) -> Result<Vec<AddressingTable<'a>>, BatchError>
where
    H: Borrow<Md5>,
    B: AsRef<[u8]>,
{
    for (index, hasher) in hashers.iter().enumerate() {
        let hasher: &Md5 = hasher.borrow();
        let pending = bridge::read_state(hasher).pending;
        if pending != 0 {
            return Err(BatchError::PartialStateUnsupported { index, pending });
        }
    }

    buffers
        .chunks(LANES)
        .enumerate()
        .map(|(group, chunk)| AddressingTable::new(chunk, group * LANES))
        .collect()
}

fn write_scalar<H, B>(hashers: &mut [H], buffers: &[B], reason: FallbackReason) -> usize
where
    H: BorrowMut<Md5>,
    B: AsRef<[u8]>,
{
    let len = buffers.first().map_or(0, |buffer| buffer.as_ref().len());
    trace::scalar_fallback(reason, hashers.len(), len);
    for (hasher, buffer) in hashers.iter_mut().zip(buffers) {
        let hasher: &mut Md5 = hasher.borrow_mut();
        hasher.update(buffer.as_ref());
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector_dispatchers() -> Vec<Dispatcher> {
        let mut dispatchers = vec![Dispatcher::with_backend(Backend::Portable)];
        if engine::avx2_available() {
            dispatchers.push(Dispatcher::with_backend(Backend::Avx2));
        }
        dispatchers
    }

    fn oracle(data: &[u8]) -> Digest {
        use md5::Digest as _;
        md5::Md5::digest(data).into()
    }

    /// `count` patterned buffers of `len` bytes laid out back to back in one
    /// allocation.
    fn filled(count: usize, len: usize) -> Vec<u8> {
        (0..count)
            .flat_map(|i| (0..len).map(move |j| (j * 13 + i * 101) as u8))
            .collect()
    }

    /// The lane buffers of a [`filled`] allocation.
    fn windows(backing: &[u8], count: usize, len: usize) -> Vec<&[u8]> {
        (0..count).map(|i| &backing[i * len..(i + 1) * len]).collect()
    }

    #[test]
    fn dispatcher_detects_backend() {
        let backend = Dispatcher::detect().backend();
        assert_eq!(backend.is_vector(), engine::avx2_available());
    }

    #[test]
    fn global_dispatcher_is_consistent() {
        let d1 = global();
        let d2 = global();
        assert_eq!(d1.backend(), d2.backend());
    }

    #[test]
    fn backend_lanes() {
        assert_eq!(Backend::Avx2.lanes(), 8);
        assert_eq!(Backend::Portable.lanes(), 8);
        assert_eq!(Backend::Scalar.lanes(), 1);
        assert!(!Backend::Scalar.is_vector());
    }

    #[test]
    fn unavailable_avx2_request_degrades_to_scalar() {
        let dispatcher = Dispatcher::with_backend(Backend::Avx2);
        let expected = if engine::avx2_available() {
            Backend::Avx2
        } else {
            Backend::Scalar
        };
        assert_eq!(dispatcher.backend(), expected);
    }

    #[test]
    fn config_selects_backend() {
        let config = BatchConfig::new().with_backend(BackendPreference::Scalar);
        assert_eq!(Dispatcher::from_config(&config).backend(), Backend::Scalar);

        let config = BatchConfig::new().with_backend(BackendPreference::Portable);
        assert_eq!(Dispatcher::from_config(&config).backend(), Backend::Portable);
    }

    #[test]
    fn empty_batch_writes_nothing() {
        for dispatcher in vector_dispatchers() {
            let mut hashers: [Md5; 0] = [];
            let buffers: [&[u8]; 0] = [];
            assert_eq!(dispatcher.write_batch(&mut hashers, &buffers), Ok(0));
        }
    }

    #[test]
    fn zero_length_buffers_leave_hashers_untouched() {
        for dispatcher in vector_dispatchers() {
            let mut hashers = [Md5::new(), Md5::new()];
            assert_eq!(dispatcher.write_batch(&mut hashers, &[b"", b""]), Ok(0));
            assert!(hashers.iter().all(|hasher| hasher.total_len() == 0));
        }
    }

    #[test]
    fn count_mismatch_is_rejected() {
        for dispatcher in vector_dispatchers() {
            let mut hashers = vec![Md5::new(); 3];
            let backing = filled(2, 64);
            let buffers = windows(&backing, 2, 64);
            assert_eq!(
                dispatcher.write_batch(&mut hashers, &buffers),
                Err(BatchError::MismatchedCount {
                    hashers: 3,
                    buffers: 2,
                })
            );
        }
    }

    #[test]
    fn length_mismatch_reports_first_offender() {
        for dispatcher in vector_dispatchers() {
            let mut hashers = vec![Md5::new(); 4];
            let buffers = [vec![0_u8; 128], vec![0_u8; 128], vec![0_u8; 64], vec![0_u8; 1]];
            assert_eq!(
                dispatcher.write_batch(&mut hashers, &buffers),
                Err(BatchError::MismatchedLength {
                    index: 2,
                    len: 64,
                    expected: 128,
                })
            );
            assert!(hashers.iter().all(|hasher| hasher.total_len() == 0));
        }
    }

    #[test]
    fn pending_bytes_reject_the_whole_batch() {
        for dispatcher in vector_dispatchers() {
            let mut hashers = vec![Md5::new(); 10];
            hashers[9].update(b"hi");
            let backing = filled(10, 128);
            let buffers = windows(&backing, 10, 128);

            assert_eq!(
                dispatcher.write_batch(&mut hashers, &buffers),
                Err(BatchError::PartialStateUnsupported {
                    index: 9,
                    pending: 2,
                })
            );
            assert!(hashers[..9].iter().all(|hasher| hasher.total_len() == 0));
            assert_eq!(hashers[9].total_len(), 2);
            assert_eq!(hashers[0].sum(), oracle(b""));
        }
    }

    #[test]
    fn pending_bytes_reject_batches_shorter_than_a_block() {
        for dispatcher in vector_dispatchers() {
            let mut hashers = vec![Md5::new(); 2];
            hashers[1].update(b"hi");
            let backing = filled(2, 10);
            let buffers = windows(&backing, 2, 10);

            assert_eq!(
                dispatcher.write_batch(&mut hashers, &buffers),
                Err(BatchError::PartialStateUnsupported {
                    index: 1,
                    pending: 2,
                })
            );
            assert_eq!(hashers[0].total_len(), 0);
            assert_eq!(hashers[1].total_len(), 2);
            assert_eq!(hashers[1].sum(), oracle(b"hi"));
        }
    }

    #[test]
    fn pending_bytes_are_fine_on_the_scalar_path() {
        let backing = filled(2, 10);
        let buffers = windows(&backing, 2, 10);

        // A lone hasher on a vector backend, then a pair on the scalar backend.
        let mut single = [Md5::new()];
        single[0].update(b"hi");
        let dispatcher = Dispatcher::with_backend(Backend::Portable);
        assert_eq!(dispatcher.write_batch(&mut single, &buffers[..1]), Ok(10));
        assert_eq!(single[0].sum(), oracle(&[&b"hi"[..], buffers[0]].concat()));

        let mut hashers = vec![Md5::new(); 2];
        hashers[1].update(b"hi");
        let dispatcher = Dispatcher::with_backend(Backend::Scalar);
        assert_eq!(dispatcher.write_batch(&mut hashers, &buffers), Ok(10));
        assert_eq!(hashers[0].sum(), oracle(buffers[0]));
        assert_eq!(hashers[1].sum(), oracle(&[&b"hi"[..], buffers[1]].concat()));
    }

    #[test]
    fn short_batches_match_oracle() {
        for dispatcher in vector_dispatchers() {
            for len in [1, 10, BLOCK_LEN - 1] {
                let backing = filled(LANES + 2, len);
                let buffers = windows(&backing, LANES + 2, len);
                let mut hashers = vec![Md5::new(); LANES + 2];
                assert_eq!(dispatcher.write_batch(&mut hashers, &buffers), Ok(len));
                for (hasher, buffer) in hashers.iter().zip(&buffers) {
                    assert_eq!(hasher.sum(), oracle(buffer));
                }
            }
        }
    }

    #[test]
    fn unaligned_length_finishes_with_remainder() {
        for dispatcher in vector_dispatchers() {
            let backing = filled(3, 99);
            let buffers = windows(&backing, 3, 99);
            let mut hashers = vec![Md5::new(); 3];
            assert_eq!(dispatcher.write_batch(&mut hashers, &buffers), Ok(99));
            for (hasher, buffer) in hashers.iter().zip(&buffers) {
                assert_eq!(hasher.total_len(), 99);
                assert_eq!(hasher.sum(), oracle(buffer));
            }
        }
    }

    #[test]
    fn every_batch_size_matches_oracle() {
        for dispatcher in vector_dispatchers() {
            for count in 1..=2 * LANES + 1 {
                let backing = filled(count, 1024);
                let buffers = windows(&backing, count, 1024);
                let mut hashers = vec![Md5::new(); count];
                assert_eq!(dispatcher.write_batch(&mut hashers, &buffers), Ok(1024));
                for (i, (hasher, buffer)) in hashers.iter().zip(&buffers).enumerate() {
                    assert_eq!(
                        hasher.sum(),
                        oracle(buffer),
                        "{:?}: hasher {i} of {count}",
                        dispatcher.backend()
                    );
                }
            }
        }
    }

    #[test]
    fn block_aligned_streaming_matches_one_shot() {
        for dispatcher in vector_dispatchers() {
            let backing = filled(5, 1000);
            let buffers = windows(&backing, 5, 1000);
            let mut hashers = vec![Md5::new(); 5];

            let mut offset = 0;
            while offset + BLOCK_LEN <= 1000 {
                let chunks: Vec<&[u8]> = buffers
                    .iter()
                    .map(|buffer| &buffer[offset..offset + BLOCK_LEN])
                    .collect();
                assert_eq!(dispatcher.write_batch(&mut hashers, &chunks), Ok(BLOCK_LEN));
                offset += BLOCK_LEN;
            }
            let tails: Vec<&[u8]> = buffers.iter().map(|buffer| &buffer[offset..]).collect();
            assert_eq!(dispatcher.write_batch(&mut hashers, &tails), Ok(1000 - offset));

            for (hasher, buffer) in hashers.iter().zip(&buffers) {
                assert_eq!(hasher.sum(), oracle(buffer));
            }
        }
    }

    #[test]
    fn borrowed_hashers_are_accepted() {
        let dispatcher = Dispatcher::with_backend(Backend::Portable);
        let mut a = Md5::new();
        let mut b = Md5::new();
        let backing = filled(2, 256);
        let buffers = windows(&backing, 2, 256);
        {
            let mut hashers = [&mut a, &mut b];
            assert_eq!(dispatcher.write_batch(&mut hashers, &buffers), Ok(256));
        }
        assert_eq!(a.sum(), oracle(buffers[0]));
        assert_eq!(b.sum(), oracle(buffers[1]));
    }

    #[test]
    fn scalar_backend_matches_oracle() {
        let dispatcher = Dispatcher::with_backend(Backend::Scalar);
        let backing = filled(9, 300);
        let buffers = windows(&backing, 9, 300);
        let mut hashers = vec![Md5::new(); 9];
        assert_eq!(dispatcher.write_batch(&mut hashers, &buffers), Ok(300));
        for (hasher, buffer) in hashers.iter().zip(&buffers) {
            assert_eq!(hasher.sum(), oracle(buffer));
        }
    }

    #[test]
    fn digest_batch_preserves_order_across_lengths() {
        for dispatcher in vector_dispatchers() {
            let inputs: Vec<Vec<u8>> = [0, 200, 64, 200, 5, 64, 200, 1000, 64]
                .iter()
                .enumerate()
                .map(|(i, &len)| vec![i as u8; len])
                .collect();
            let digests = dispatcher.digest_batch(&inputs);
            assert_eq!(digests.len(), inputs.len());
            for (digest, input) in digests.iter().zip(&inputs) {
                assert_eq!(*digest, oracle(input));
            }
        }
    }

    #[test]
    fn digest_batch_empty() {
        assert!(global().digest_batch::<&[u8]>(&[]).is_empty());
    }
}
