//! AVX2 8-lane MD5 compression.
//!
//! Each 256-bit register holds one chaining or message word for all eight
//! lanes. Message words are fetched with masked 32-bit gathers: one base
//! pointer, the eight lane displacements from the [`AddressingTable`], and a
//! lane mask that keeps dead lanes from touching memory.
//!
//! # CPU Feature Requirements
//!
//! - **AVX2**: Intel Haswell (2013+), AMD Excavator (2015+) or newer
//! - Callers reach this kernel only through `Kernel::Avx2`, which is created
//!   after `is_x86_feature_detected!("avx2")` succeeds.

#![allow(unsafe_code)]

use std::arch::x86_64::{
    __m256i, _mm256_add_epi32, _mm256_and_si256, _mm256_cmpgt_epi32, _mm256_loadu_si256,
    _mm256_mask_i32gather_epi32, _mm256_or_si256, _mm256_set1_epi32, _mm256_setr_epi32,
    _mm256_setzero_si256, _mm256_slli_epi32, _mm256_srli_epi32, _mm256_storeu_si256,
    _mm256_xor_si256,
};

use super::{AddressingTable, LANES, LaneStates, Workspace};
use crate::rounds::{BLOCK_LEN, K, MESSAGE_INDEX, SHIFTS};

const _: () = assert!(LANES == 8, "an AVX2 register holds eight 32-bit lanes");

#[inline]
#[target_feature(enable = "avx2")]
fn load(row: &[u32; LANES]) -> __m256i {
    // SAFETY: `row` is exactly 32 readable bytes; the load is unaligned.
    unsafe { _mm256_loadu_si256(row.as_ptr().cast()) }
}

#[inline]
#[target_feature(enable = "avx2")]
fn store(row: &mut [u32; LANES], value: __m256i) {
    // SAFETY: `row` is exactly 32 writable bytes; the store is unaligned.
    unsafe { _mm256_storeu_si256(row.as_mut_ptr().cast(), value) }
}

/// Advances the live lanes of `states` by `byte_count / 64` blocks.
///
/// # Safety
///
/// - The CPU must support AVX2.
/// - `byte_count` must be a multiple of 64 and no larger than `table.len()`.
#[target_feature(enable = "avx2")]
#[allow(clippy::cast_ptr_alignment)]
pub(super) unsafe fn advance(
    states: &mut LaneStates,
    table: &AddressingTable<'_>,
    scratch: &mut Workspace,
    byte_count: usize,
) {
    let o = table.offsets();
    let offsets = _mm256_setr_epi32(o[0], o[1], o[2], o[3], o[4], o[5], o[6], o[7]);
    let live = _mm256_cmpgt_epi32(
        _mm256_set1_epi32(table.lanes() as i32),
        _mm256_setr_epi32(0, 1, 2, 3, 4, 5, 6, 7),
    );
    let ones = _mm256_set1_epi32(-1);
    let base = table.base_ptr();

    let mut a = load(&states.words[0]);
    let mut b = load(&states.words[1]);
    let mut c = load(&states.words[2]);
    let mut d = load(&states.words[3]);

    macro_rules! rotl {
        ($x:expr, $i:literal) => {
            _mm256_or_si256(
                _mm256_slli_epi32::<{ SHIFTS[$i] as i32 }>($x),
                _mm256_srli_epi32::<{ 32 - SHIFTS[$i] as i32 }>($x),
            )
        };
    }
    macro_rules! f {
        ($b:expr, $c:expr, $d:expr) => {
            _mm256_xor_si256($d, _mm256_and_si256($b, _mm256_xor_si256($c, $d)))
        };
    }
    macro_rules! g {
        ($b:expr, $c:expr, $d:expr) => {
            _mm256_xor_si256($c, _mm256_and_si256($d, _mm256_xor_si256($b, $c)))
        };
    }
    macro_rules! h {
        ($b:expr, $c:expr, $d:expr) => {
            _mm256_xor_si256(_mm256_xor_si256($b, $c), $d)
        };
    }
    macro_rules! i {
        ($b:expr, $c:expr, $d:expr) => {
            _mm256_xor_si256($c, _mm256_or_si256($b, _mm256_xor_si256($d, ones)))
        };
    }
    macro_rules! step {
        ($mix:ident, $a:ident, $b:ident, $c:ident, $d:ident, $i:literal) => {{
            let k = _mm256_set1_epi32(K[$i] as i32);
            let m = load(&scratch.words[MESSAGE_INDEX[$i]]);
            let t = _mm256_add_epi32(_mm256_add_epi32($a, $mix!($b, $c, $d)), _mm256_add_epi32(k, m));
            $a = _mm256_add_epi32($b, rotl!(t, $i));
        }};
    }

    for block in 0..byte_count / BLOCK_LEN {
        let block_base = base.wrapping_add(block * BLOCK_LEN);
        for (word, row) in scratch.words.iter_mut().enumerate() {
            let src = block_base.wrapping_add(word * 4).cast::<i32>();
            // SAFETY: for every live lane, `src + offset` is the address of
            // word `word` of block `block` in that lane's buffer, and
            // `(block + 1) * 64 <= byte_count <= table.len()`. Dead lanes are
            // masked off and never dereferenced.
            let gathered = unsafe {
                _mm256_mask_i32gather_epi32::<1>(_mm256_setzero_si256(), src, offsets, live)
            };
            store(row, gathered);
        }

        let (aa, bb, cc, dd) = (a, b, c, d);

        step!(f, a, b, c, d, 0);  step!(f, d, a, b, c, 1);  step!(f, c, d, a, b, 2);  step!(f, b, c, d, a, 3);
        step!(f, a, b, c, d, 4);  step!(f, d, a, b, c, 5);  step!(f, c, d, a, b, 6);  step!(f, b, c, d, a, 7);
        step!(f, a, b, c, d, 8);  step!(f, d, a, b, c, 9);  step!(f, c, d, a, b, 10); step!(f, b, c, d, a, 11);
        step!(f, a, b, c, d, 12); step!(f, d, a, b, c, 13); step!(f, c, d, a, b, 14); step!(f, b, c, d, a, 15);

        step!(g, a, b, c, d, 16); step!(g, d, a, b, c, 17); step!(g, c, d, a, b, 18); step!(g, b, c, d, a, 19);
        step!(g, a, b, c, d, 20); step!(g, d, a, b, c, 21); step!(g, c, d, a, b, 22); step!(g, b, c, d, a, 23);
        step!(g, a, b, c, d, 24); step!(g, d, a, b, c, 25); step!(g, c, d, a, b, 26); step!(g, b, c, d, a, 27);
        step!(g, a, b, c, d, 28); step!(g, d, a, b, c, 29); step!(g, c, d, a, b, 30); step!(g, b, c, d, a, 31);

        step!(h, a, b, c, d, 32); step!(h, d, a, b, c, 33); step!(h, c, d, a, b, 34); step!(h, b, c, d, a, 35);
        step!(h, a, b, c, d, 36); step!(h, d, a, b, c, 37); step!(h, c, d, a, b, 38); step!(h, b, c, d, a, 39);
        step!(h, a, b, c, d, 40); step!(h, d, a, b, c, 41); step!(h, c, d, a, b, 42); step!(h, b, c, d, a, 43);
        step!(h, a, b, c, d, 44); step!(h, d, a, b, c, 45); step!(h, c, d, a, b, 46); step!(h, b, c, d, a, 47);

        step!(i, a, b, c, d, 48); step!(i, d, a, b, c, 49); step!(i, c, d, a, b, 50); step!(i, b, c, d, a, 51);
        step!(i, a, b, c, d, 52); step!(i, d, a, b, c, 53); step!(i, c, d, a, b, 54); step!(i, b, c, d, a, 55);
        step!(i, a, b, c, d, 56); step!(i, d, a, b, c, 57); step!(i, c, d, a, b, 58); step!(i, b, c, d, a, 59);
        step!(i, a, b, c, d, 60); step!(i, d, a, b, c, 61); step!(i, c, d, a, b, 62); step!(i, b, c, d, a, 63);

        a = _mm256_add_epi32(a, aa);
        b = _mm256_add_epi32(b, bb);
        c = _mm256_add_epi32(c, cc);
        d = _mm256_add_epi32(d, dd);
    }

    store(&mut states.words[0], a);
    store(&mut states.words[1], b);
    store(&mut states.words[2], c);
    store(&mut states.words[3], d);
}
