// SPDX-License-Identifier: Apache-2.0
//! Task-layer interface consumed by the graph builder.
//!
//! Task construction itself lives outside the scheduling core; the builder
//! only needs a queue of satisfied tasks and, per task, the range mappers
//! describing which buffer regions each chunk reads and writes. An
//! in-memory [`TaskGraph`] ships for embedders and tests.

use std::collections::{BTreeMap, BTreeSet};

use crate::ident::{BufferId, TaskId};
use crate::subrange::{Subrange1, Subrange2, Subrange3};

/// How a task accesses a buffer region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccessMode {
    /// The region is read; missing parts are transferred in.
    Read,
    /// The region is written; the writer becomes its sole holder.
    Write,
}

/// Maps a chunk of a task's iteration space to the buffer subrange it
/// accesses.
///
/// Implementations are supplied by the program; the builder calls the
/// `map_*` method matching the task's kernel dimensionality. Results are
/// already embedded in 3-D (lower-dimensional buffers use trailing unit
/// axes, see [`Subrange3::from`]).
pub trait RangeMapper {
    /// Buffer this mapper accesses.
    fn buffer(&self) -> BufferId;
    /// Access mode of this mapper.
    fn mode(&self) -> AccessMode;
    /// Maps a 1-D kernel chunk.
    fn map_1(&self, chunk: Subrange1) -> Subrange3;
    /// Maps a 2-D kernel chunk.
    fn map_2(&self, chunk: Subrange2) -> Subrange3;
    /// Maps a 3-D kernel chunk.
    fn map_3(&self, chunk: Subrange3) -> Subrange3;
}

/// Identity mapper: every chunk accesses the buffer region with its own
/// coordinates.
#[derive(Debug, Clone, Copy)]
pub struct OneToOneMapper {
    bid: BufferId,
    mode: AccessMode,
}

impl OneToOneMapper {
    /// Identity access of `bid` with `mode`.
    pub fn new(bid: BufferId, mode: AccessMode) -> Self {
        Self { bid, mode }
    }
}

impl RangeMapper for OneToOneMapper {
    fn buffer(&self) -> BufferId {
        self.bid
    }

    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn map_1(&self, chunk: Subrange1) -> Subrange3 {
        chunk.into()
    }

    fn map_2(&self, chunk: Subrange2) -> Subrange3 {
        chunk.into()
    }

    fn map_3(&self, chunk: Subrange3) -> Subrange3 {
        chunk
    }
}

/// Fixed mapper: every chunk accesses the same buffer subrange, e.g. a
/// whole-buffer read shared by all chunks.
#[derive(Debug, Clone, Copy)]
pub struct FixedMapper {
    bid: BufferId,
    mode: AccessMode,
    sr: Subrange3,
}

impl FixedMapper {
    /// Fixed access of `sr` in `bid` with `mode`.
    pub fn new(bid: BufferId, mode: AccessMode, sr: Subrange3) -> Self {
        Self { bid, mode, sr }
    }
}

impl RangeMapper for FixedMapper {
    fn buffer(&self) -> BufferId {
        self.bid
    }

    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn map_1(&self, _chunk: Subrange1) -> Subrange3 {
        self.sr
    }

    fn map_2(&self, _chunk: Subrange2) -> Subrange3 {
        self.sr
    }

    fn map_3(&self, _chunk: Subrange3) -> Subrange3 {
        self.sr
    }
}

/// A declared buffer access of a master-access task.
///
/// Offsets and ranges are taken verbatim; the builder does not clamp them to
/// the buffer's global size.
#[derive(Debug, Clone, Copy)]
pub struct BufferAccess {
    /// Accessed buffer.
    pub bid: BufferId,
    /// Access mode.
    pub mode: AccessMode,
    /// Start coordinate per axis.
    pub offset: [u64; 3],
    /// Extent per axis.
    pub range: [u64; 3],
}

/// A submitted task, as the builder sees it.
pub enum Task {
    /// A data-parallel compute kernel over an N-D iteration space.
    Compute {
        /// Kernel dimensionality, 1 to 3.
        dimensions: usize,
        /// Global iteration range; unused trailing axes are 1.
        global_range: [u64; 3],
        /// Buffer accesses of the kernel.
        range_mappers: Vec<Box<dyn RangeMapper>>,
    },
    /// A functor running on the master only, with direct buffer access.
    MasterAccess {
        /// Declared accesses of the functor.
        accesses: Vec<BufferAccess>,
    },
}

/// Source of satisfied tasks for the builder.
///
/// A task is satisfied once all of its predecessors have been processed.
/// The iteration order must be stable across runs for identical inputs;
/// builder determinism depends on it.
pub trait TaskQueue {
    /// Next satisfied, unprocessed task, if any.
    fn next_satisfied_task(&self) -> Option<TaskId>;
    /// Looks up a task by id.
    fn task(&self, tid: TaskId) -> Option<&Task>;
    /// Marks `tid` processed, unblocking its successors.
    fn mark_task_as_processed(&mut self, tid: TaskId);
}

struct TaskEntry {
    task: Task,
    depends_on: Vec<TaskId>,
}

/// In-memory task graph with dependency tracking.
#[derive(Default)]
pub struct TaskGraph {
    next_tid: u64,
    entries: BTreeMap<TaskId, TaskEntry>,
    processed: BTreeSet<TaskId>,
}

impl TaskGraph {
    /// Empty task graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task that becomes satisfied once every id in `depends_on` has
    /// been processed.
    pub fn add_task(&mut self, task: Task, depends_on: &[TaskId]) -> TaskId {
        let tid = TaskId(self.next_tid);
        self.next_tid += 1;
        self.entries.insert(
            tid,
            TaskEntry {
                task,
                depends_on: depends_on.to_vec(),
            },
        );
        tid
    }

    /// True once `tid` has been marked processed.
    pub fn is_processed(&self, tid: TaskId) -> bool {
        self.processed.contains(&tid)
    }
}

impl TaskQueue for TaskGraph {
    fn next_satisfied_task(&self) -> Option<TaskId> {
        self.entries
            .iter()
            .find(|(tid, entry)| {
                !self.processed.contains(tid)
                    && entry
                        .depends_on
                        .iter()
                        .all(|dep| self.processed.contains(dep))
            })
            .map(|(tid, _)| *tid)
    }

    fn task(&self, tid: TaskId) -> Option<&Task> {
        self.entries.get(&tid).map(|entry| &entry.task)
    }

    fn mark_task_as_processed(&mut self, tid: TaskId) {
        self.processed.insert(tid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_task() -> Task {
        Task::Compute {
            dimensions: 1,
            global_range: [8, 1, 1],
            range_mappers: vec![Box::new(OneToOneMapper::new(
                BufferId(0),
                AccessMode::Write,
            ))],
        }
    }

    #[test]
    fn satisfaction_follows_dependencies() {
        let mut graph = TaskGraph::new();
        let t0 = graph.add_task(write_task(), &[]);
        let t1 = graph.add_task(write_task(), &[t0]);

        assert_eq!(graph.next_satisfied_task(), Some(t0));
        graph.mark_task_as_processed(t0);
        assert_eq!(graph.next_satisfied_task(), Some(t1));
        graph.mark_task_as_processed(t1);
        assert_eq!(graph.next_satisfied_task(), None);
    }

    #[test]
    fn independent_tasks_surface_in_id_order() {
        let mut graph = TaskGraph::new();
        let t0 = graph.add_task(write_task(), &[]);
        let t1 = graph.add_task(write_task(), &[]);
        assert_eq!(graph.next_satisfied_task(), Some(t0));
        graph.mark_task_as_processed(t0);
        assert_eq!(graph.next_satisfied_task(), Some(t1));
    }

    #[test]
    fn one_to_one_mapper_is_identity() {
        let mapper = OneToOneMapper::new(BufferId(2), AccessMode::Read);
        let chunk = Subrange1 {
            offset: [4],
            range: [8],
            global_size: [32],
        };
        let mapped = mapper.map_1(chunk);
        assert_eq!(mapped.offset, [4, 0, 0]);
        assert_eq!(mapped.range, [8, 1, 1]);
    }

    #[test]
    fn fixed_mapper_ignores_the_chunk() {
        let sr = Subrange3 {
            offset: [0, 0, 0],
            range: [64, 1, 1],
            global_size: [64, 1, 1],
        };
        let mapper = FixedMapper::new(BufferId(1), AccessMode::Read, sr);
        let chunk = Subrange1 {
            offset: [10],
            range: [2],
            global_size: [64],
        };
        assert_eq!(mapper.map_1(chunk), sr);
    }
}
