// SPDX-License-Identifier: Apache-2.0
//! Greedy, locality-aware assignment of chunks to free nodes.
//!
//! The heuristic is deliberately cheap: a chunk's candidate set is the node
//! set of the first source entry of the first buffer considered. All
//! containers involved iterate in sorted order, so the assignment is
//! deterministic for identical inputs.

use std::collections::{BTreeMap, BTreeSet};

use crate::buffer_state::BufferRegionState;
use crate::error::BuildError;
use crate::grid::{GridBox, GridRegion};
use crate::ident::{BufferId, ChunkId, NodeId};
use crate::task::AccessMode;

/// Per-chunk, per-buffer, per-mode union of all range-mapper outputs.
pub type ChunkRequirements = BTreeMap<ChunkId, BTreeMap<BufferId, BTreeMap<AccessMode, GridRegion>>>;

/// Per-chunk, per-buffer source attribution produced during assignment and
/// consumed by the push planner.
pub type ChunkBufferSources = BTreeMap<ChunkId, BTreeMap<BufferId, Vec<(GridBox, BTreeSet<NodeId>)>>>;

/// Result of assigning a task's chunks to nodes.
#[derive(Debug, Default)]
pub struct ChunkAssignment {
    /// Node chosen per chunk.
    pub chunk_nodes: BTreeMap<ChunkId, NodeId>,
    /// Source nodes per chunk read region, for later push planning.
    pub chunk_buffer_sources: ChunkBufferSources,
}

/// Assigns `num_chunks` chunks to nodes drawn from `free_nodes`.
///
/// Chunks are visited in ascending id order. For every buffer with a read
/// requirement the source nodes are computed and recorded; the node choice
/// itself only consults the first buffer considered (flagged as an
/// incomplete heuristic upstream, preserved for determinism). A chunk with
/// no usable candidates takes the lowest free node.
pub fn assign_chunks_to_nodes(
    num_chunks: u64,
    chunk_reqs: &ChunkRequirements,
    buffer_states: &BTreeMap<BufferId, BufferRegionState>,
    free_nodes: &BTreeSet<NodeId>,
) -> Result<ChunkAssignment, BuildError> {
    if (free_nodes.len() as u64) < num_chunks {
        return Err(BuildError::InsufficientFreeNodes {
            chunks: num_chunks,
            free: free_nodes.len(),
        });
    }

    let mut free = free_nodes.clone();
    let mut assignment = ChunkAssignment::default();

    for index in 0..num_chunks {
        let chunk = ChunkId(index);
        let mut chosen: Option<NodeId> = None;

        for (bid, modes) in chunk_reqs.get(&chunk).into_iter().flatten() {
            let mut source_nodes: Option<&BTreeSet<NodeId>> = None;

            if let Some(read_req) = modes.get(&AccessMode::Read) {
                let state = buffer_states
                    .get(bid)
                    .ok_or(BuildError::UnknownBuffer(*bid))?;
                let sources =
                    state
                        .get_source_nodes(read_req)
                        .map_err(|gap| BuildError::UnwrittenRead {
                            bid: *bid,
                            missing_area: gap.missing_area,
                        })?;
                let entry = assignment
                    .chunk_buffer_sources
                    .entry(chunk)
                    .or_default()
                    .entry(*bid)
                    .or_insert(sources);
                source_nodes = entry.first().map(|(_, nodes)| nodes);
            }

            if chosen.is_none() {
                let nid = match source_nodes {
                    // First free node that already holds the first source
                    // box, else the lowest free node.
                    Some(candidates) => free
                        .iter()
                        .copied()
                        .find(|nid| candidates.contains(nid))
                        .or_else(|| free.first().copied()),
                    None => free.first().copied(),
                };
                let nid = nid.ok_or(BuildError::InsufficientFreeNodes {
                    chunks: num_chunks,
                    free: 0,
                })?;
                free.remove(&nid);
                assignment.chunk_nodes.insert(chunk, nid);
                chosen = Some(nid);
            }
        }

        if chosen.is_none() {
            // No buffer requirements at all: take the lowest free node.
            let nid = free
                .first()
                .copied()
                .ok_or(BuildError::InsufficientFreeNodes {
                    chunks: num_chunks,
                    free: 0,
                })?;
            free.remove(&nid);
            assignment.chunk_nodes.insert(chunk, nid);
        }
    }

    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(ids: &[u64]) -> BTreeSet<NodeId> {
        ids.iter().copied().map(NodeId).collect()
    }

    fn span(a: u64, b: u64) -> GridRegion {
        GridRegion::from_box(GridBox::new([a, 0, 0], [b, 1, 1]))
    }

    fn state_with(region: GridRegion, holders: &[u64]) -> BufferRegionState {
        BufferRegionState::with_initial(region, nodes(holders))
    }

    fn read_reqs(per_chunk: &[(u64, u64)]) -> ChunkRequirements {
        let mut reqs = ChunkRequirements::new();
        for (index, (a, b)) in per_chunk.iter().enumerate() {
            reqs.entry(ChunkId(index as u64))
                .or_default()
                .entry(BufferId(0))
                .or_default()
                .insert(AccessMode::Read, span(*a, *b));
        }
        reqs
    }

    #[test]
    fn no_requirements_assigns_lowest_free_nodes() {
        let assignment =
            assign_chunks_to_nodes(2, &ChunkRequirements::new(), &BTreeMap::new(), &nodes(&[1, 2]))
                .unwrap();
        assert_eq!(assignment.chunk_nodes[&ChunkId(0)], NodeId(1));
        assert_eq!(assignment.chunk_nodes[&ChunkId(1)], NodeId(2));
    }

    #[test]
    fn locality_wins_over_free_order() {
        // All data lives on node 2; chunk 0 should land there even though
        // node 1 sorts first in the free set.
        let mut states = BTreeMap::new();
        states.insert(BufferId(0), state_with(span(0, 1024), &[2]));
        let reqs = read_reqs(&[(0, 512), (512, 1024)]);

        let assignment =
            assign_chunks_to_nodes(2, &reqs, &states, &nodes(&[1, 2])).unwrap();
        assert_eq!(assignment.chunk_nodes[&ChunkId(0)], NodeId(2));
        assert_eq!(assignment.chunk_nodes[&ChunkId(1)], NodeId(1));
    }

    #[test]
    fn assignment_is_a_bijection_when_chunks_equal_nodes() {
        let mut states = BTreeMap::new();
        states.insert(BufferId(0), state_with(span(0, 30), &[0]));
        let reqs = read_reqs(&[(0, 10), (10, 20), (20, 30)]);

        let assignment =
            assign_chunks_to_nodes(3, &reqs, &states, &nodes(&[1, 2, 3])).unwrap();
        let assigned: BTreeSet<NodeId> = assignment.chunk_nodes.values().copied().collect();
        assert_eq!(assigned, nodes(&[1, 2, 3]));
    }

    #[test]
    fn sources_are_recorded_for_every_read_buffer() {
        let mut states = BTreeMap::new();
        states.insert(BufferId(0), state_with(span(0, 100), &[0]));
        states.insert(BufferId(1), state_with(span(0, 100), &[2]));

        let mut reqs = ChunkRequirements::new();
        let chunk = reqs.entry(ChunkId(0)).or_default();
        chunk
            .entry(BufferId(0))
            .or_default()
            .insert(AccessMode::Read, span(0, 100));
        chunk
            .entry(BufferId(1))
            .or_default()
            .insert(AccessMode::Read, span(0, 100));

        let assignment =
            assign_chunks_to_nodes(1, &reqs, &states, &nodes(&[1])).unwrap();
        let sources = &assignment.chunk_buffer_sources[&ChunkId(0)];
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[&BufferId(0)][0].1, nodes(&[0]));
        assert_eq!(sources[&BufferId(1)][0].1, nodes(&[2]));
    }

    #[test]
    fn unwritten_read_is_a_build_error() {
        let mut states = BTreeMap::new();
        states.insert(BufferId(0), BufferRegionState::new());
        let reqs = read_reqs(&[(0, 10)]);
        let err = assign_chunks_to_nodes(1, &reqs, &states, &nodes(&[1])).unwrap_err();
        assert!(matches!(err, BuildError::UnwrittenRead { .. }));
    }

    #[test]
    fn too_few_free_nodes_is_rejected() {
        let err = assign_chunks_to_nodes(
            3,
            &ChunkRequirements::new(),
            &BTreeMap::new(),
            &nodes(&[1]),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::InsufficientFreeNodes { .. }));
    }

    #[test]
    fn write_only_first_buffer_falls_back_to_free_order() {
        let mut states = BTreeMap::new();
        states.insert(BufferId(0), state_with(span(0, 10), &[2]));

        let mut reqs = ChunkRequirements::new();
        reqs.entry(ChunkId(0))
            .or_default()
            .entry(BufferId(0))
            .or_default()
            .insert(AccessMode::Write, span(0, 10));

        let assignment =
            assign_chunks_to_nodes(1, &reqs, &states, &nodes(&[1, 2])).unwrap();
        assert_eq!(assignment.chunk_nodes[&ChunkId(0)], NodeId(1));
    }
}
