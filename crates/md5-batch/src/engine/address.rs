//! crates/md5-batch/src/engine/address.rs
//!
//! Base-plus-displacement addressing for one lane group.
//!
//! The AVX2 gather takes a single base pointer and eight signed 32-bit
//! offsets. The base sits [`BASE_PAD`] bytes below the lowest buffer so every
//! offset is strictly positive. Any buffer farther than `i32::MAX` bytes from
//! the base cannot be expressed and the group is rejected; wrapping the
//! distance into 32 bits would silently read the wrong memory.

#![allow(unsafe_code)]

use std::marker::PhantomData;
use std::ptr;

use super::LANES;
use crate::error::BatchError;

/// Gap between the group base and the lowest buffer start.
const BASE_PAD: usize = 4;

/// Per-group base address and lane displacements.
///
/// The table borrows the group's buffers for `'a`, so the addresses it holds
/// stay valid for as long as the table exists.
#[derive(Clone, Debug)]
pub(crate) struct AddressingTable<'a> {
    base: usize,
    offsets: [i32; LANES],
    lanes: usize,
    len: usize,
    _buffers: PhantomData<&'a [u8]>,
}

impl<'a> AddressingTable<'a> {
    /// Computes the table for up to [`LANES`] buffers.
    ///
    /// `first_index` is the batch position of `buffers[0]` and is only used to
    /// report which buffer was out of range.
    pub(crate) fn new<B: AsRef<[u8]>>(
        buffers: &'a [B],
        first_index: usize,
    ) -> Result<Self, BatchError> {
        debug_assert!(!buffers.is_empty() && buffers.len() <= LANES);

        let mut addresses = [0_usize; LANES];
        let mut len = usize::MAX;
        for (address, buffer) in addresses.iter_mut().zip(buffers) {
            let buffer = buffer.as_ref();
            *address = buffer.as_ptr().expose_provenance();
            len = len.min(buffer.len());
        }
        let lanes = buffers.len().min(LANES);

        let (base, offsets) = displacements(&addresses[..lanes]).map_err(|(lane, distance)| {
            BatchError::DisplacementOverflow {
                index: first_index + lane,
                distance: distance as u64,
            }
        })?;

        Ok(Self {
            base,
            offsets,
            lanes,
            len: if lanes == 0 { 0 } else { len },
            _buffers: PhantomData,
        })
    }

    /// Number of live lanes.
    pub(crate) const fn lanes(&self) -> usize {
        self.lanes
    }

    /// Length every live buffer has at least.
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Signed displacement of each lane from the base; zero for dead lanes.
    pub(crate) const fn offsets(&self) -> &[i32; LANES] {
        &self.offsets
    }

    /// The group base as a pointer. It may point outside every buffer and
    /// must only be combined with a lane's offset.
    #[cfg_attr(not(target_arch = "x86_64"), allow(dead_code))]
    pub(crate) fn base_ptr(&self) -> *const u8 {
        ptr::with_exposed_provenance(self.base)
    }

    /// Start of the buffer assigned to `lane`.
    pub(crate) fn lane_ptr(&self, lane: usize) -> *const u8 {
        debug_assert!(lane < self.lanes);
        ptr::with_exposed_provenance(self.base.wrapping_add(self.offsets[lane] as usize))
    }

    /// The first [`len`](Self::len) bytes of `lane`'s buffer, recovered from
    /// the base and its displacement.
    pub(crate) fn lane(&self, lane: usize) -> &'a [u8] {
        assert!(lane < self.lanes, "lane {lane} of a {}-lane group", self.lanes);
        // SAFETY: `new` exposed the start address of a buffer borrowed for
        // `'a` holding at least `len` bytes, and base plus offset reproduces
        // that address exactly.
        unsafe { std::slice::from_raw_parts(self.lane_ptr(lane), self.len) }
    }
}

/// Picks the base for `addresses` and each address's displacement from it.
///
/// On failure returns the first lane whose distance does not fit in an `i32`,
/// together with that distance.
fn displacements(addresses: &[usize]) -> Result<(usize, [i32; LANES]), (usize, usize)> {
    let lowest = addresses.iter().copied().min().unwrap_or(BASE_PAD);
    let base = lowest.wrapping_sub(BASE_PAD);

    let mut offsets = [0_i32; LANES];
    for (lane, (offset, &address)) in offsets.iter_mut().zip(addresses).enumerate() {
        let distance = address.wrapping_sub(base);
        *offset = i32::try_from(distance).map_err(|_| (lane, distance))?;
    }
    Ok((base, offsets))
}
