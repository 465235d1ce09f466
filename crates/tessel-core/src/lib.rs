// SPDX-License-Identifier: Apache-2.0
//! tessel-core: coordinator core of a distributed data-parallel runtime.
//!
//! A single coordinator consumes a stream of satisfied tasks, splits each
//! into per-node chunks, and emits a distributed command graph whose
//! execution realizes the tasks with minimal data movement. The core tracks
//! per buffer which node holds valid data for which region and plans
//! push / await-push pairs to repair non-local reads.
//!
//! # Determinism
//!
//! Graph construction is bit-for-bit reproducible: identical task streams
//! produce identical command ids, assignments and dependency sets. Every
//! container whose iteration order reaches an output is ordered
//! (`BTreeMap` / `BTreeSet`), and tie-breaks are by ascending id.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]

mod assign;
mod buffer_state;
mod builder;
mod command;
mod command_graph;
mod error;
mod flush;
/// Region algebra over half-open 3-D integer boxes.
pub mod grid;
mod ident;
mod split;
mod subrange;
/// Task-layer interface consumed by the builder.
pub mod task;
mod telemetry;

pub use assign::{
    assign_chunks_to_nodes, ChunkAssignment, ChunkBufferSources, ChunkRequirements,
};
pub use buffer_state::{BufferRegionState, CoverageGap};
pub use builder::{ClusterConfig, GraphBuilder};
pub use command::{Command, CommandKind, CommandTag, Dependency};
pub use command_graph::{CommandGraph, GraphError};
pub use error::BuildError;
pub use flush::flush_order;
pub use grid::{subrange_to_region, GridBox, GridRegion};
pub use ident::{BufferId, ChunkId, CommandId, NodeId, TaskId};
pub use split::{split_equal_1, split_equal_2};
pub use subrange::{Subrange, Subrange1, Subrange2, Subrange3};
pub use telemetry::{NullTelemetrySink, TelemetrySink};
