//! crates/md5-batch/src/scalar.rs
//!
//! Streaming scalar MD5 (RFC 1321).
//!
//! [`Md5`] is the hasher callers own and hand to the batch API. On its own it
//! is an ordinary incremental hash: bytes go in through [`Md5::update`] (or
//! [`std::io::Write`], or the `digest` crate traits), partial blocks are
//! buffered, and [`Md5::sum`] pads and emits the digest without disturbing the
//! running state.
//!
//! The accumulator fields stay private to this module. The batch dispatcher
//! reaches them only through [`crate::bridge`], which checks its view of the
//! struct against [`LAYOUT`] at compile time.

use std::fmt;
use std::io;

use digest::typenum::U16;
use digest::{FixedOutput, FixedOutputReset, HashMarker, Output, OutputSizeUser, Reset, Update};

use crate::bridge::{StructLayout, field_layout};
use crate::rounds::{BLOCK_LEN, DIGEST_LEN, INIT_STATE, K, MESSAGE_INDEX, SHIFTS, mix};
use crate::Digest;

/// Streaming MD5 hasher.
///
/// The struct is `repr(C)` so its accumulator can be mirrored by the state
/// bridge; see [`LAYOUT`].
///
/// # Examples
///
/// ```
/// use md5_batch::Md5;
///
/// let mut hasher = Md5::new();
/// hasher.update(b"message ");
/// hasher.update(b"digest");
/// assert_eq!(hasher.sum(), Md5::digest(b"message digest"));
/// ```
#[derive(Clone)]
#[repr(C)]
pub struct Md5 {
    state: [u32; 4],
    buffer: [u8; BLOCK_LEN],
    pending: usize,
    len: u64,
}

/// Field layout of [`Md5`], compared against the bridge's view of it.
pub(crate) const LAYOUT: StructLayout<4> = StructLayout::new(
    size_of::<Md5>(),
    align_of::<Md5>(),
    [
        field_layout!(Md5, state: [u32; 4]),
        field_layout!(Md5, buffer: [u8; BLOCK_LEN]),
        field_layout!(Md5, pending: usize),
        field_layout!(Md5, len: u64),
    ],
);

impl Md5 {
    /// Creates a hasher with the initial MD5 chaining value.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: INIT_STATE,
            buffer: [0; BLOCK_LEN],
            pending: 0,
            len: 0,
        }
    }

    /// Feeds additional bytes into the digest state.
    pub fn update(&mut self, mut data: &[u8]) {
        self.len = self.len.wrapping_add(data.len() as u64);

        if self.pending > 0 {
            let take = (BLOCK_LEN - self.pending).min(data.len());
            self.buffer[self.pending..self.pending + take].copy_from_slice(&data[..take]);
            self.pending += take;
            data = &data[take..];

            if self.pending < BLOCK_LEN {
                return;
            }
            compress(&mut self.state, &self.buffer);
            self.pending = 0;
        }

        let (blocks, tail) = data.as_chunks::<BLOCK_LEN>();
        for block in blocks {
            compress(&mut self.state, block);
        }

        self.buffer[..tail.len()].copy_from_slice(tail);
        self.pending = tail.len();
    }

    /// Returns the digest of everything written so far.
    ///
    /// The hasher keeps its state and can continue to accept input.
    #[must_use]
    pub fn sum(&self) -> Digest {
        self.clone().finish()
    }

    /// Consumes the hasher and returns the digest.
    #[must_use]
    pub fn finalize(mut self) -> Digest {
        self.finish()
    }

    /// Restores the initial state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Total number of bytes written since creation or the last reset.
    #[must_use]
    pub const fn total_len(&self) -> u64 {
        self.len
    }

    /// Convenience helper that computes the MD5 digest for `data` in one shot.
    #[must_use]
    pub fn digest(data: &[u8]) -> Digest {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finish()
    }

    fn finish(&mut self) -> Digest {
        let bit_len = self.len.wrapping_mul(8);

        let mut padding = [0_u8; BLOCK_LEN];
        padding[0] = 0x80;
        let pad_len = if self.pending < BLOCK_LEN - 8 {
            BLOCK_LEN - 8 - self.pending
        } else {
            2 * BLOCK_LEN - 8 - self.pending
        };
        self.update(&padding[..pad_len]);
        self.update(&bit_len.to_le_bytes());
        debug_assert_eq!(self.pending, 0);

        let mut out = [0_u8; DIGEST_LEN];
        for (chunk, word) in out.chunks_exact_mut(4).zip(self.state) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }
}

/// Advances `state` by one 64-byte block.
pub(crate) fn compress(state: &mut [u32; 4], block: &[u8; BLOCK_LEN]) {
    let mut words = [0_u32; 16];
    for (word, bytes) in words.iter_mut().zip(block.as_chunks::<4>().0) {
        *word = u32::from_le_bytes(*bytes);
    }

    let [mut a, mut b, mut c, mut d] = *state;
    for step in 0..64 {
        let f = mix(step, b, c, d)
            .wrapping_add(a)
            .wrapping_add(K[step])
            .wrapping_add(words[MESSAGE_INDEX[step]]);
        a = d;
        d = c;
        c = b;
        b = b.wrapping_add(f.rotate_left(SHIFTS[step]));
    }

    state[0] = state[0].wrapping_add(a);
    state[1] = state[1].wrapping_add(b);
    state[2] = state[2].wrapping_add(c);
    state[3] = state[3].wrapping_add(d);
}

impl Default for Md5 {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Md5 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Md5")
            .field("len", &self.len)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl io::Write for Md5 {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl HashMarker for Md5 {}

impl OutputSizeUser for Md5 {
    type OutputSize = U16;
}

impl Update for Md5 {
    fn update(&mut self, data: &[u8]) {
        Self::update(self, data);
    }
}

impl FixedOutput for Md5 {
    fn finalize_into(mut self, out: &mut Output<Self>) {
        out.copy_from_slice(&self.finish());
    }
}

impl Reset for Md5 {
    fn reset(&mut self) {
        Self::reset(self);
    }
}

impl FixedOutputReset for Md5 {
    fn finalize_into_reset(&mut self, out: &mut Output<Self>) {
        out.copy_from_slice(&self.finish());
        Self::reset(self);
    }
}
