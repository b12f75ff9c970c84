//! crates/md5-batch/src/engine/mod.rs
//!
//! Multi-lane MD5 compression.
//!
//! The engine advances up to [`LANES`] independent chaining values by the same
//! whole number of 64-byte blocks. State is kept transposed, with one array
//! per chaining word holding that word for every lane, so a single vector
//! instruction performs the same MD5 step for all lanes at once.
//!
//! Source blocks are located through an `AddressingTable`: one base address
//! plus a signed 32-bit displacement per lane, which is exactly what the AVX2
//! gather instructions consume.
//!
//! # Kernels
//!
//! - `avx2`: 8 lanes in 256-bit registers, masked gathers for block loads.
//! - `portable`: the same contract in plain Rust. It is never picked by
//!   detection and only runs when a caller asks for it explicitly.
//!
//! Neither kernel reports errors. Block alignment, pending-byte checks and
//! displacement range are enforced by the dispatcher before a kernel runs.

mod address;
#[cfg(target_arch = "x86_64")]
mod avx2;
mod portable;

pub(crate) use address::AddressingTable;

use crate::rounds::BLOCK_LEN;

/// Maximum number of hashers advanced by one engine invocation.
pub const LANES: usize = 8;

/// Transposed chaining values for one lane group.
#[derive(Clone, Debug, Default)]
#[repr(C, align(32))]
pub(crate) struct LaneStates {
    words: [[u32; LANES]; 4],
}

impl LaneStates {
    /// Stores the chaining value of `lane`.
    pub(crate) fn set_lane(&mut self, lane: usize, state: [u32; 4]) {
        for (word, value) in self.words.iter_mut().zip(state) {
            word[lane] = value;
        }
    }

    /// Returns the chaining value of `lane`.
    pub(crate) fn lane(&self, lane: usize) -> [u32; 4] {
        [
            self.words[0][lane],
            self.words[1][lane],
            self.words[2][lane],
            self.words[3][lane],
        ]
    }
}

/// Scratch space for one block's message words, transposed like [`LaneStates`].
#[derive(Clone, Debug)]
#[repr(C, align(32))]
pub(crate) struct Workspace {
    words: [[u32; LANES]; 16],
}

impl Workspace {
    pub(crate) const fn new() -> Self {
        Self {
            words: [[0; LANES]; 16],
        }
    }
}

/// A compression kernel that is known to run on this CPU.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Kernel {
    /// Only produced by [`Kernel::avx2`], after the runtime feature check.
    #[cfg(target_arch = "x86_64")]
    Avx2,
    Portable,
}

impl Kernel {
    /// The AVX2 kernel, if the running CPU supports it.
    pub(crate) fn avx2() -> Option<Self> {
        #[cfg(target_arch = "x86_64")]
        if avx2_available() {
            return Some(Self::Avx2);
        }
        None
    }
}

/// Whether the CPU supports the AVX2 kernel. Detected once per process.
pub(crate) fn avx2_available() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        static DETECTED: std::sync::OnceLock<bool> = std::sync::OnceLock::new();
        *DETECTED.get_or_init(|| std::arch::is_x86_feature_detected!("avx2"))
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

/// Advances every live lane of `states` by `byte_count / 64` blocks read
/// through `table`.
///
/// Lanes at or beyond `table.lanes()` are not read from memory and their
/// output is unspecified.
#[allow(unsafe_code)]
pub(crate) fn advance(
    kernel: Kernel,
    states: &mut LaneStates,
    table: &AddressingTable<'_>,
    scratch: &mut Workspace,
    byte_count: usize,
) {
    debug_assert_eq!(byte_count % BLOCK_LEN, 0);
    assert!(
        byte_count <= table.len(),
        "engine asked for {byte_count} bytes from {}-byte buffers",
        table.len()
    );

    match kernel {
        #[cfg(target_arch = "x86_64")]
        // SAFETY: `Kernel::Avx2` exists only once AVX2 was detected, and the
        // assertion above keeps every gather inside the table's buffers.
        Kernel::Avx2 => unsafe { avx2::advance(states, table, scratch, byte_count) },
        Kernel::Portable => portable::advance(states, table, scratch, byte_count),
    }
}
