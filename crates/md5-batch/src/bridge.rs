//! crates/md5-batch/src/bridge.rs
//!
//! Direct access to the accumulator inside [`Md5`].
//!
//! The batch path needs the four chaining words of every hasher in a lane
//! group, and needs to put the advanced words back, without routing the data
//! through [`Md5::update`]. This module is the only place that reads or writes
//! those private fields. It does so through [`AccumulatorView`], a `repr(C)`
//! mirror of the hasher whose layout is compared field by field against
//! [`scalar::LAYOUT`] in a `const` assertion, so drift between the two is a
//! build failure rather than memory corruption.

#![allow(unsafe_code)]

use crate::rounds::BLOCK_LEN;
use crate::scalar::{self, Md5};

/// Placement of one struct field: name, byte offset, size and alignment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct FieldLayout {
    name: &'static str,
    offset: usize,
    size: usize,
    align: usize,
}

impl FieldLayout {
    /// Describes field `name` at `offset`.
    ///
    /// The accessor is never called; it pins the field's type to `F` so a type
    /// change in the owning struct fails to compile here.
    pub(crate) const fn of<S, F>(name: &'static str, offset: usize, _accessor: fn(&S) -> &F) -> Self {
        Self {
            name,
            offset,
            size: size_of::<F>(),
            align: align_of::<F>(),
        }
    }

    const fn matches(&self, other: &Self) -> bool {
        self.offset == other.offset
            && self.size == other.size
            && self.align == other.align
            && str_eq(self.name, other.name)
    }
}

/// Layout of a struct with `N` fields in declaration order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct StructLayout<const N: usize> {
    size: usize,
    align: usize,
    fields: [FieldLayout; N],
}

impl<const N: usize> StructLayout<N> {
    pub(crate) const fn new(size: usize, align: usize, fields: [FieldLayout; N]) -> Self {
        Self {
            size,
            align,
            fields,
        }
    }

    /// Same size, alignment, and field names/offsets/sizes in the same order.
    pub(crate) const fn matches(&self, other: &Self) -> bool {
        if self.size != other.size || self.align != other.align {
            return false;
        }
        let mut i = 0;
        while i < N {
            if !self.fields[i].matches(&other.fields[i]) {
                return false;
            }
            i += 1;
        }
        true
    }
}

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Builds a [`FieldLayout`] for `$owner.$field`, pinning its type to `$ty`.
macro_rules! field_layout {
    ($owner:ty, $field:ident: $ty:ty) => {
        $crate::bridge::FieldLayout::of::<$owner, $ty>(
            stringify!($field),
            ::core::mem::offset_of!($owner, $field),
            |value| &value.$field,
        )
    };
}

pub(crate) use field_layout;

/// Mirror of the [`Md5`] accumulator.
#[repr(C)]
struct AccumulatorView {
    state: [u32; 4],
    // Never touched here; present so the following fields line up.
    #[allow(dead_code)]
    buffer: [u8; BLOCK_LEN],
    pending: usize,
    len: u64,
}

const VIEW_LAYOUT: StructLayout<4> = StructLayout::new(
    size_of::<AccumulatorView>(),
    align_of::<AccumulatorView>(),
    [
        field_layout!(AccumulatorView, state: [u32; 4]),
        field_layout!(AccumulatorView, buffer: [u8; BLOCK_LEN]),
        field_layout!(AccumulatorView, pending: usize),
        field_layout!(AccumulatorView, len: u64),
    ],
);

const _: () = assert!(
    VIEW_LAYOUT.matches(&scalar::LAYOUT),
    "AccumulatorView no longer mirrors the Md5 accumulator"
);

/// Chaining words and buffered byte count of one hasher.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct AccumulatorState {
    pub(crate) state: [u32; 4],
    pub(crate) pending: usize,
}

fn view(hasher: &Md5) -> &AccumulatorView {
    // SAFETY: both types are `repr(C)` with identical field names, offsets,
    // sizes and alignments (asserted above), and every field is plain data
    // valid for any bit pattern.
    unsafe { &*std::ptr::from_ref(hasher).cast::<AccumulatorView>() }
}

fn view_mut(hasher: &mut Md5) -> &mut AccumulatorView {
    // SAFETY: see `view`; the exclusive borrow is carried over unchanged.
    unsafe { &mut *std::ptr::from_mut(hasher).cast::<AccumulatorView>() }
}

/// Reads the chaining words and pending byte count of `hasher`.
pub(crate) fn read_state(hasher: &Md5) -> AccumulatorState {
    let view = view(hasher);
    AccumulatorState {
        state: view.state,
        pending: view.pending,
    }
}

/// Replaces the chaining words of `hasher` and accounts for `len_delta`
/// bytes that were compressed outside of [`Md5::update`].
///
/// Callers guarantee the hasher had no pending bytes and that `len_delta` is a
/// whole number of blocks.
pub(crate) fn write_state(hasher: &mut Md5, state: [u32; 4], len_delta: u64) {
    let view = view_mut(hasher);
    debug_assert_eq!(view.pending, 0);
    debug_assert_eq!(len_delta % BLOCK_LEN as u64, 0);
    view.state = state;
    view.len = view.len.wrapping_add(len_delta);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rounds::INIT_STATE;

    #[test]
    fn view_layout_matches_hasher() {
        assert_eq!(VIEW_LAYOUT, scalar::LAYOUT);
    }

    #[test]
    fn layout_check_rejects_renamed_field() {
        #[allow(dead_code)]
        #[repr(C)]
        struct Renamed {
            s: [u32; 4],
            buffer: [u8; BLOCK_LEN],
            pending: usize,
            len: u64,
        }
        let renamed = StructLayout::new(
            size_of::<Renamed>(),
            align_of::<Renamed>(),
            [
                field_layout!(Renamed, s: [u32; 4]),
                field_layout!(Renamed, buffer: [u8; BLOCK_LEN]),
                field_layout!(Renamed, pending: usize),
                field_layout!(Renamed, len: u64),
            ],
        );
        assert!(!renamed.matches(&scalar::LAYOUT));
    }

    #[test]
    fn layout_check_rejects_reordered_fields() {
        #[allow(dead_code)]
        #[repr(C)]
        struct Reordered {
            state: [u32; 4],
            buffer: [u8; BLOCK_LEN],
            len: u64,
            pending: usize,
        }
        let reordered = StructLayout::new(
            size_of::<Reordered>(),
            align_of::<Reordered>(),
            [
                field_layout!(Reordered, state: [u32; 4]),
                field_layout!(Reordered, buffer: [u8; BLOCK_LEN]),
                field_layout!(Reordered, pending: usize),
                field_layout!(Reordered, len: u64),
            ],
        );
        assert!(!reordered.matches(&scalar::LAYOUT));
    }

    #[test]
    fn fresh_hasher_reads_initial_state() {
        let hasher = Md5::new();
        assert_eq!(
            read_state(&hasher),
            AccumulatorState {
                state: INIT_STATE,
                pending: 0,
            }
        );
    }

    #[test]
    fn pending_bytes_are_visible() {
        let mut hasher = Md5::new();
        hasher.update(b"hi");
        assert_eq!(read_state(&hasher).pending, 2);

        hasher.update(&[0_u8; 62]);
        assert_eq!(read_state(&hasher).pending, 0);
    }

    #[test]
    fn written_state_is_picked_up_by_finalisation() {
        let block: [u8; BLOCK_LEN] = std::array::from_fn(|i| (i * 3) as u8);
        let tail = b"trailing bytes";

        let mut state = INIT_STATE;
        scalar::compress(&mut state, &block);

        let mut bridged = Md5::new();
        write_state(&mut bridged, state, BLOCK_LEN as u64);
        bridged.update(tail);

        let mut direct = Md5::new();
        direct.update(&block);
        direct.update(tail);

        assert_eq!(bridged.total_len(), direct.total_len());
        assert_eq!(bridged.sum(), direct.sum());
    }
}
