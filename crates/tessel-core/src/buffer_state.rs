// SPDX-License-Identifier: Apache-2.0
//! Per-buffer tracking of which nodes hold valid data for which region.
//!
//! The state is a list of `(region, nodes)` entries that are pairwise
//! disjoint by construction: every update first carves the written region
//! out of all existing entries, then appends the new one. A point therefore
//! maps to exactly one entry, and that entry's node set is the full set of
//! holders.

use std::collections::BTreeSet;

use crate::grid::{GridBox, GridRegion};
use crate::ident::NodeId;

/// A request touched points that no node has ever written.
///
/// The graph builder must not ask for source nodes of an unwritten region;
/// hitting this is a programmer error upstream.
#[derive(Debug, Clone, thiserror::Error)]
#[error("requested region exceeds written coverage by {missing_area} elements")]
pub struct CoverageGap {
    /// Number of requested elements outside the written portion.
    pub missing_area: u64,
}

/// Authoritative map from buffer regions to the nodes holding a valid copy.
#[derive(Debug, Clone, Default)]
pub struct BufferRegionState {
    entries: Vec<(GridRegion, BTreeSet<NodeId>)>,
}

impl BufferRegionState {
    /// State with no written region.
    pub fn new() -> Self {
        Self::default()
    }

    /// State pre-seeded with `region` held by `nodes`, e.g. a
    /// host-initialized buffer resident on the master.
    pub fn with_initial(region: GridRegion, nodes: BTreeSet<NodeId>) -> Self {
        let mut state = Self::new();
        state.update(&region, nodes);
        state
    }

    /// Union of everything ever written.
    pub fn covered(&self) -> GridRegion {
        let mut covered = GridRegion::empty();
        for (region, _) in &self.entries {
            covered = GridRegion::merge(&covered, region);
        }
        covered
    }

    /// Records that `nodes` now hold the authoritative copy of `region`.
    ///
    /// Residence for `region` is overwritten: previous holders of any part
    /// of it are forgotten. Empty regions and empty node sets are ignored.
    pub fn update(&mut self, region: &GridRegion, nodes: BTreeSet<NodeId>) {
        if region.is_empty() || nodes.is_empty() {
            return;
        }
        for (existing, _) in &mut self.entries {
            *existing = GridRegion::difference(existing, region);
        }
        self.entries.retain(|(existing, _)| !existing.is_empty());
        self.entries.push((region.clone(), nodes));
    }

    /// Attributes every box of `request` to the nodes holding it.
    ///
    /// Returns `(box, nodes)` pairs in entry insertion order whose union is
    /// exactly `request`. Node sets are ordered ascending. Fails with
    /// [`CoverageGap`] when part of the request was never written.
    pub fn get_source_nodes(
        &self,
        request: &GridRegion,
    ) -> Result<Vec<(GridBox, BTreeSet<NodeId>)>, CoverageGap> {
        let mut out = Vec::new();
        let mut missing = request.clone();
        for (region, nodes) in &self.entries {
            let overlap = GridRegion::intersection(region, request);
            for bx in overlap.iter_boxes() {
                out.push((*bx, nodes.clone()));
            }
            missing = GridRegion::difference(&missing, &overlap);
        }
        if !missing.is_empty() {
            return Err(CoverageGap {
                missing_area: missing.area(),
            });
        }
        debug_assert!({
            let mut union = GridRegion::empty();
            for (bx, _) in &out {
                union = GridRegion::merge(&union, &GridRegion::from_box(*bx));
            }
            union == *request
        });
        Ok(out)
    }
}
