// SPDX-License-Identifier: Apache-2.0
//! Error taxonomy of the coordinator core.

use crate::command_graph::GraphError;
use crate::ident::{BufferId, TaskId};

/// Fatal errors raised during command-graph construction.
///
/// Everything here is either a configuration error caught at init or a
/// programmer error in the submitting layer; there are no transient
/// failures. On error the builder's graph may be partially populated.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The cluster has no nodes.
    #[error("cluster must contain at least one node")]
    EmptyCluster,
    /// Equal splitting is only defined for 1-D and 2-D iteration spaces.
    #[error("equal split is not supported for {dims}-dimensional tasks")]
    UnsupportedSplit {
        /// Requested task dimensionality.
        dims: usize,
    },
    /// Task dimensionality outside 1..=3.
    #[error("task dimensionality {dims} out of range")]
    InvalidDimensions {
        /// Declared dimensionality.
        dims: usize,
    },
    /// A range mapper or access references a buffer never registered.
    #[error("unknown buffer: {0}")]
    UnknownBuffer(BufferId),
    /// The task queue returned an id it cannot resolve.
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),
    /// A chunk reads a region no node has ever written.
    #[error("task reads {missing_area} unwritten elements of {bid}")]
    UnwrittenRead {
        /// Buffer being read.
        bid: BufferId,
        /// Number of requested elements outside written coverage.
        missing_area: u64,
    },
    /// Buffer-region state produced a box with no holders.
    #[error("no source node holds the requested box of {bid}")]
    EmptySourceSet {
        /// Buffer being read.
        bid: BufferId,
    },
    /// More chunks than free nodes to place them on.
    #[error("{chunks} chunks but only {free} free nodes")]
    InsufficientFreeNodes {
        /// Chunks requiring placement.
        chunks: u64,
        /// Free nodes available.
        free: usize,
    },
    /// Invalid dependency edit while wiring the graph.
    #[error(transparent)]
    Graph(#[from] GraphError),
}
