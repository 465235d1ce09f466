// SPDX-License-Identifier: Apache-2.0
//! Region algebra over half-open 3-D integer boxes.
//!
//! A [`GridRegion`] is a normalized union of disjoint [`GridBox`]es. All set
//! operations (union, intersection, difference) keep the disjointness
//! invariant and coalesce mergeable neighbours, so enumeration yields a
//! small, deterministic box list.
//!
//! Coordinates are unsigned 64-bit; `area` is the plain product of extents
//! and callers are expected to keep global sizes small enough to not
//! overflow it.

use crate::subrange::Subrange3;

/// Half-open axis-aligned box `[min, max)` in 3-D integer space.
///
/// The box is empty when any axis satisfies `min == max`. The constructor
/// requires `min[i] <= max[i]` on every axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridBox {
    min: [u64; 3],
    max: [u64; 3],
}

impl GridBox {
    /// Creates a box from inclusive min and exclusive max corners.
    ///
    /// Axes where `min[i] > max[i]` are collapsed to empty (`max[i] = min[i]`).
    pub fn new(min: [u64; 3], max: [u64; 3]) -> Self {
        let mut max = max;
        for axis in 0..3 {
            if max[axis] < min[axis] {
                max[axis] = min[axis];
            }
        }
        Self { min, max }
    }

    /// Inclusive minimum corner.
    pub fn min(&self) -> [u64; 3] {
        self.min
    }

    /// Exclusive maximum corner.
    pub fn max(&self) -> [u64; 3] {
        self.max
    }

    /// Extent per axis.
    pub fn range(&self) -> [u64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    /// True when the box contains no points.
    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.min[axis] == self.max[axis])
    }

    /// Number of points covered.
    pub fn area(&self) -> u64 {
        self.range().iter().product()
    }

    /// Intersection with `other`, or `None` when the overlap is empty.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let mut min = [0u64; 3];
        let mut max = [0u64; 3];
        for axis in 0..3 {
            min[axis] = self.min[axis].max(other.min[axis]);
            max[axis] = self.max[axis].min(other.max[axis]);
            if min[axis] >= max[axis] {
                return None;
            }
        }
        Some(Self { min, max })
    }

    /// True when every point of `other` lies inside `self`.
    pub fn covers(&self, other: &Self) -> bool {
        other.is_empty()
            || (0..3).all(|axis| {
                self.min[axis] <= other.min[axis] && other.max[axis] <= self.max[axis]
            })
    }

    /// Subtracts `other`, returning the remainder as up to six disjoint boxes.
    ///
    /// The sweep peels slabs off one axis at a time, so the output order is
    /// deterministic for fixed inputs.
    pub fn subtract(&self, other: &Self) -> Vec<Self> {
        let Some(cut) = self.intersection(other) else {
            return if self.is_empty() { vec![] } else { vec![*self] };
        };
        let mut out = Vec::new();
        let mut rest = *self;
        for axis in 0..3 {
            if rest.min[axis] < cut.min[axis] {
                let mut slab = rest;
                slab.max[axis] = cut.min[axis];
                out.push(slab);
                rest.min[axis] = cut.min[axis];
            }
            if cut.max[axis] < rest.max[axis] {
                let mut slab = rest;
                slab.min[axis] = cut.max[axis];
                out.push(slab);
                rest.max[axis] = cut.max[axis];
            }
        }
        out
    }

    /// Attempts to fuse two disjoint boxes into one.
    ///
    /// Succeeds iff the boxes agree on every axis except one, where they are
    /// adjacent. Returns the fused box on success.
    fn fuse(&self, other: &Self) -> Option<Self> {
        let mut differing = None;
        for axis in 0..3 {
            if self.min[axis] == other.min[axis] && self.max[axis] == other.max[axis] {
                continue;
            }
            if differing.is_some() {
                return None;
            }
            differing = Some(axis);
        }
        let axis = differing?;
        if self.max[axis] == other.min[axis] {
            let mut fused = *self;
            fused.max[axis] = other.max[axis];
            Some(fused)
        } else if other.max[axis] == self.min[axis] {
            let mut fused = *other;
            fused.max[axis] = self.max[axis];
            Some(fused)
        } else {
            None
        }
    }
}

/// Normalized union of disjoint boxes.
///
/// Equality is canonical-form equality: two regions are equal iff they cover
/// the same point set, regardless of how that set is decomposed into boxes.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridRegion {
    boxes: Vec<GridBox>,
}

impl GridRegion {
    /// The empty region.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Region covering a single box. Empty boxes yield the empty region.
    pub fn from_box(bx: GridBox) -> Self {
        if bx.is_empty() {
            Self::empty()
        } else {
            Self { boxes: vec![bx] }
        }
    }

    /// True when no points are covered.
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Total number of points covered.
    pub fn area(&self) -> u64 {
        self.boxes.iter().map(GridBox::area).sum()
    }

    /// Iterates over the disjoint boxes in normalized order.
    pub fn iter_boxes(&self) -> impl Iterator<Item = &GridBox> {
        self.boxes.iter()
    }

    /// Exact union of two regions.
    pub fn merge(a: &Self, b: &Self) -> Self {
        let mut boxes = a.boxes.clone();
        for bx in &b.boxes {
            let mut fresh = vec![*bx];
            for existing in &a.boxes {
                fresh = fresh
                    .into_iter()
                    .flat_map(|piece| piece.subtract(existing))
                    .collect();
            }
            boxes.extend(fresh);
        }
        Self::normalized(boxes)
    }

    /// Intersection of two regions; output boxes are pairwise disjoint and
    /// maximal.
    pub fn intersection(a: &Self, b: &Self) -> Self {
        let mut boxes = Vec::new();
        for x in &a.boxes {
            for y in &b.boxes {
                if let Some(overlap) = x.intersection(y) {
                    boxes.push(overlap);
                }
            }
        }
        Self::normalized(boxes)
    }

    /// Points of `a` not covered by `b`.
    pub fn difference(a: &Self, b: &Self) -> Self {
        let mut boxes = Vec::new();
        for x in &a.boxes {
            let mut pieces = vec![*x];
            for y in &b.boxes {
                pieces = pieces
                    .into_iter()
                    .flat_map(|piece| piece.subtract(y))
                    .collect();
            }
            boxes.extend(pieces);
        }
        Self::normalized(boxes)
    }

    /// True when `other` covers no point outside `self`.
    pub fn covers(&self, other: &Self) -> bool {
        Self::difference(other, self).is_empty()
    }

    /// Builds the canonical form: drops empties, fuses mergeable neighbours
    /// to a fixpoint, sorts by min corner.
    fn normalized(mut boxes: Vec<GridBox>) -> Self {
        boxes.retain(|bx| !bx.is_empty());
        loop {
            let mut fused_any = false;
            'outer: for i in 0..boxes.len() {
                for j in (i + 1)..boxes.len() {
                    if let Some(fused) = boxes[i].fuse(&boxes[j]) {
                        boxes.swap_remove(j);
                        boxes[i] = fused;
                        fused_any = true;
                        break 'outer;
                    }
                }
            }
            if !fused_any {
                break;
            }
        }
        boxes.sort_unstable();
        Self { boxes }
    }
}

impl PartialEq for GridRegion {
    fn eq(&self, other: &Self) -> bool {
        Self::difference(self, other).is_empty() && Self::difference(other, self).is_empty()
    }
}

impl Eq for GridRegion {}

impl From<GridBox> for GridRegion {
    fn from(bx: GridBox) -> Self {
        Self::from_box(bx)
    }
}

/// Converts a subrange into a region, clamping to the subrange's global size.
///
/// Passing `u64::MAX` as the global size disables clamping; the upper corner
/// saturates instead of wrapping.
pub fn subrange_to_region(sr: &Subrange3) -> GridRegion {
    let mut min = [0u64; 3];
    let mut max = [0u64; 3];
    for axis in 0..3 {
        min[axis] = sr.offset[axis].min(sr.global_size[axis]);
        max[axis] = sr.offset[axis]
            .saturating_add(sr.range[axis])
            .min(sr.global_size[axis]);
    }
    GridRegion::from_box(GridBox::new(min, max))
}
