// SPDX-License-Identifier: Apache-2.0
//! Contiguous N-dimensional subranges of a task or buffer iteration space.

/// A contiguous box `[offset, offset + range)` inside a global extent of
/// `global_size`, in `D` dimensions.
///
/// All coordinates are unsigned 64-bit. A subrange does not itself enforce
/// `offset + range <= global_size`; conversion into a region clamps against
/// the global size (see [`crate::grid::subrange_to_region`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Subrange<const D: usize> {
    /// Start coordinate per axis.
    pub offset: [u64; D],
    /// Extent per axis.
    pub range: [u64; D],
    /// Global extent per axis of the space this subrange lives in.
    pub global_size: [u64; D],
}

/// One-dimensional subrange.
pub type Subrange1 = Subrange<1>;
/// Two-dimensional subrange.
pub type Subrange2 = Subrange<2>;
/// Three-dimensional subrange. The canonical internal representation; lower
/// dimensionalities embed with trailing unit axes.
pub type Subrange3 = Subrange<3>;

impl<const D: usize> Subrange<D> {
    /// Total number of elements covered (product of per-axis extents).
    pub fn area(&self) -> u64 {
        self.range.iter().product()
    }
}

fn pad<const D: usize>(src: [u64; D], fill: u64) -> [u64; 3] {
    let mut out = [fill; 3];
    out[..D].copy_from_slice(&src);
    out
}

impl From<Subrange<1>> for Subrange3 {
    fn from(sr: Subrange<1>) -> Self {
        Self {
            offset: pad(sr.offset, 0),
            range: pad(sr.range, 1),
            global_size: pad(sr.global_size, 1),
        }
    }
}

impl From<Subrange<2>> for Subrange3 {
    fn from(sr: Subrange<2>) -> Self {
        Self {
            offset: pad(sr.offset, 0),
            range: pad(sr.range, 1),
            global_size: pad(sr.global_size, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_dimensional_embeds_with_unit_axes() {
        let sr = Subrange {
            offset: [5],
            range: [10],
            global_size: [64],
        };
        let sr3 = Subrange3::from(sr);
        assert_eq!(sr3.offset, [5, 0, 0]);
        assert_eq!(sr3.range, [10, 1, 1]);
        assert_eq!(sr3.global_size, [64, 1, 1]);
        assert_eq!(sr3.area(), 10);
    }

    #[test]
    fn two_dimensional_embeds_with_unit_axis() {
        let sr = Subrange {
            offset: [2, 3],
            range: [4, 8],
            global_size: [16, 16],
        };
        let sr3 = Subrange3::from(sr);
        assert_eq!(sr3.offset, [2, 3, 0]);
        assert_eq!(sr3.range, [4, 8, 1]);
        assert_eq!(sr3.area(), 32);
    }
}
