// SPDX-License-Identifier: Apache-2.0
//! Command variants and dependency edges.
//!
//! Commands are the atomic units of per-node work the coordinator emits. The
//! closed sum type replaces a polymorphic hierarchy: filtered iteration over
//! a task's commands predicates on [`CommandKind::tag`].

use crate::grid::GridBox;
use crate::ident::{BufferId, CommandId, NodeId, TaskId};
use crate::subrange::Subrange3;

/// A dependency edge from a depender to `on`.
///
/// `anti` marks write-after-read ordering. Anti and true edges on the same
/// pair never collapse; both may coexist as distinct entries. Both produce
/// the same execution ordering; the flag exists for downstream tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dependency {
    /// The command depended upon. Always on the same node as the depender.
    pub on: CommandId,
    /// True for a write-after-read ordering edge.
    pub anti: bool,
}

/// Variant-specific payload of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CommandKind {
    /// Placeholder used as a per-task join point; never executed and never
    /// part of an execution front.
    Nop,
    /// Execute one chunk of a compute task on the owning node.
    Compute {
        /// Iteration subrange of the chunk.
        sr: Subrange3,
    },
    /// Execute the master-only functor on node 0.
    MasterAccess,
    /// Send `bx` of buffer `bid` to `target`.
    Push {
        /// Buffer being transferred.
        bid: BufferId,
        /// Region to linearize and send.
        bx: GridBox,
        /// Receiving node.
        target: NodeId,
    },
    /// Wait for the transfer identified by the matching push command's id.
    AwaitPush {
        /// Buffer being received.
        bid: BufferId,
        /// Region being received.
        bx: GridBox,
        /// Id of the push command on the sending node.
        source_cid: CommandId,
    },
    /// Terminate the per-node loop once all prior jobs complete.
    Shutdown,
}

/// Discriminant of a [`CommandKind`], used in filter predicates and on the
/// wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandTag {
    /// See [`CommandKind::Nop`].
    Nop,
    /// See [`CommandKind::Compute`].
    Compute,
    /// See [`CommandKind::MasterAccess`].
    MasterAccess,
    /// See [`CommandKind::Push`].
    Push,
    /// See [`CommandKind::AwaitPush`].
    AwaitPush,
    /// See [`CommandKind::Shutdown`].
    Shutdown,
}

impl CommandKind {
    /// Discriminant of this variant.
    pub fn tag(&self) -> CommandTag {
        match self {
            Self::Nop => CommandTag::Nop,
            Self::Compute { .. } => CommandTag::Compute,
            Self::MasterAccess => CommandTag::MasterAccess,
            Self::Push { .. } => CommandTag::Push,
            Self::AwaitPush { .. } => CommandTag::AwaitPush,
            Self::Shutdown => CommandTag::Shutdown,
        }
    }

    /// True for the variants that execute task work (compute and
    /// master-access); these are indexed in the per-task command list.
    pub fn is_task_command(&self) -> bool {
        matches!(self, Self::Compute { .. } | Self::MasterAccess)
    }
}

/// A command with its header and dependency edges.
///
/// Commands are created through
/// [`CommandGraph::create`](crate::command_graph::CommandGraph::create) and
/// owned by the graph; callers hold [`CommandId`]s.
#[derive(Debug, Clone)]
pub struct Command {
    pub(crate) cid: CommandId,
    pub(crate) nid: NodeId,
    pub(crate) tid: Option<TaskId>,
    pub(crate) deps: Vec<Dependency>,
    pub(crate) pseudo_cpl: u32,
    pub(crate) kind: CommandKind,
}

impl Command {
    /// Unique command id.
    pub fn cid(&self) -> CommandId {
        self.cid
    }

    /// Node this command executes on.
    pub fn nid(&self) -> NodeId {
        self.nid
    }

    /// Task this command belongs to, if any.
    pub fn tid(&self) -> Option<TaskId> {
        self.tid
    }

    /// Dependency edges, in insertion order.
    pub fn deps(&self) -> &[Dependency] {
        &self.deps
    }

    /// Monotone upper bound on the longest dependency chain ending here,
    /// valid at insertion time of each edge.
    pub fn pseudo_cpl(&self) -> u32 {
        self.pseudo_cpl
    }

    /// Variant payload.
    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    /// Discriminant shorthand.
    pub fn tag(&self) -> CommandTag {
        self.kind.tag()
    }
}
