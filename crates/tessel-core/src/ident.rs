// SPDX-License-Identifier: Apache-2.0
//! Identifier newtypes for the scheduling core.
//!
//! All ids are opaque, process-unique, nonnegative integers. Dedicated
//! wrappers prevent accidental mixing of buffer, task, node and command
//! identifiers at API boundaries.

use core::fmt;

/// Identifier for a registered multi-dimensional buffer.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferId(pub u64);

/// Identifier for a submitted task.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskId(pub u64);

/// Identifier for a cluster node. Node 0 is the master.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u64);

/// Identifier for a command in the command graph.
///
/// Command ids double as the rendezvous correlator between a push and its
/// await-push counterpart: the await carries the push command's id.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommandId(pub u64);

/// Identifier for a chunk of a task's iteration space.
///
/// Chunk ids are local to a single task build and assigned in split order.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChunkId(pub u64);

macro_rules! impl_display {
    ($($ty:ident => $prefix:literal),* $(,)?) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        })*
    };
}

impl_display! {
    BufferId => "B",
    TaskId => "T",
    NodeId => "N",
    CommandId => "C",
    ChunkId => "K",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_prefixed() {
        assert_eq!(BufferId(3).to_string(), "B3");
        assert_eq!(TaskId(0).to_string(), "T0");
        assert_eq!(NodeId(12).to_string(), "N12");
        assert_eq!(CommandId(7).to_string(), "C7");
        assert_eq!(ChunkId(1).to_string(), "K1");
    }

    #[test]
    fn ordering_follows_raw_value() {
        assert!(NodeId(1) < NodeId(2));
        assert!(CommandId(0) < CommandId(u64::MAX));
    }
}
