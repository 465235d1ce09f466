// SPDX-License-Identifier: Apache-2.0
//! Equal splitting of an iteration subrange into per-node chunks.

use crate::subrange::{Subrange1, Subrange2};

/// Splits a 1-D subrange into `num_chunks` contiguous slices.
///
/// Slices are equal-sized; the last chunk absorbs the remainder. The global
/// size is propagated unchanged. The union of the result is exactly `sr` and
/// interiors are disjoint.
pub fn split_equal_1(sr: &Subrange1, num_chunks: u64) -> Vec<Subrange1> {
    debug_assert!(num_chunks > 0);
    let step = sr.range[0] / num_chunks;
    let mut out = Vec::with_capacity(num_chunks as usize);
    let mut offset = sr.offset[0];
    for index in 0..num_chunks {
        let mut range = step;
        if index == num_chunks - 1 {
            range += sr.range[0] % num_chunks;
        }
        out.push(Subrange1 {
            offset: [offset],
            range: [range],
            global_size: sr.global_size,
        });
        offset += step;
    }
    out
}

/// Splits a 2-D subrange into `num_chunks` row slabs.
///
/// Only axis 0 is split; every slab inherits the full axis-1 extent.
pub fn split_equal_2(sr: &Subrange2, num_chunks: u64) -> Vec<Subrange2> {
    let rows = split_equal_1(
        &Subrange1 {
            offset: [sr.offset[0]],
            range: [sr.range[0]],
            global_size: [sr.global_size[0]],
        },
        num_chunks,
    );
    rows.into_iter()
        .map(|row| Subrange2 {
            offset: [row.offset[0], sr.offset[1]],
            range: [row.range[0], sr.range[1]],
            global_size: sr.global_size,
        })
        .collect()
}
