// SPDX-License-Identifier: Apache-2.0

//! Telemetry sink trait for observing graph construction without coupling
//! the core to any I/O.
//!
//! The builder reports construction events through this trait; adapters
//! decide what to do with them (log, count, discard).

use crate::ident::{BufferId, CommandId, NodeId, TaskId};

/// Observer for graph-builder events.
///
/// All methods default to no-ops, so implementations only pick up the
/// events they care about.
pub trait TelemetrySink: Send + Sync {
    /// A command was created on `nid`.
    fn on_command_created(&self, _cid: CommandId, _nid: NodeId) {}

    /// A push / await-push pair was planned to move part of `bid` from
    /// `source` to `target`.
    fn on_push_planned(&self, _bid: BufferId, _source: NodeId, _target: NodeId) {}

    /// A task finished building with `num_chunks` chunks.
    fn on_task_built(&self, _tid: TaskId, _num_chunks: u64) {}
}

/// Telemetry sink that discards every event; the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {}
