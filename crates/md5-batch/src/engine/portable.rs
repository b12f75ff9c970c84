//! Lane-wise MD5 compression in plain Rust.
//!
//! Same contract and data layout as the AVX2 kernel: blocks are located
//! through the group's base and displacements, message words are transposed
//! into the workspace, and every step is applied across the live lanes.

use super::{AddressingTable, LANES, LaneStates, Workspace};
use crate::rounds::{BLOCK_LEN, K, MESSAGE_INDEX, SHIFTS, mix};

pub(super) fn advance(
    states: &mut LaneStates,
    table: &AddressingTable<'_>,
    scratch: &mut Workspace,
    byte_count: usize,
) {
    let lanes = table.lanes().min(LANES);

    for block in 0..byte_count / BLOCK_LEN {
        let start = block * BLOCK_LEN;
        for lane in 0..lanes {
            let bytes = &table.lane(lane)[start..start + BLOCK_LEN];
            for (row, word) in scratch.words.iter_mut().zip(bytes.as_chunks::<4>().0) {
                row[lane] = u32::from_le_bytes(*word);
            }
        }

        let [mut a, mut b, mut c, mut d] = states.words;
        for step in 0..64 {
            let message = &scratch.words[MESSAGE_INDEX[step]];
            for lane in 0..lanes {
                let f = mix(step, b[lane], c[lane], d[lane])
                    .wrapping_add(a[lane])
                    .wrapping_add(K[step])
                    .wrapping_add(message[lane]);
                let rotated = b[lane].wrapping_add(f.rotate_left(SHIFTS[step]));
                a[lane] = d[lane];
                d[lane] = c[lane];
                c[lane] = b[lane];
                b[lane] = rotated;
            }
        }

        for (word, advanced) in states.words.iter_mut().zip([a, b, c, d]) {
            for lane in 0..lanes {
                word[lane] = word[lane].wrapping_add(advanced[lane]);
            }
        }
    }
}
