// SPDX-License-Identifier: Apache-2.0
//! Per-task command-graph construction.
//!
//! The builder pulls satisfied tasks from the task layer one at a time,
//! splits them into chunks, assigns chunks to nodes, emits execution
//! commands and the push / await-push pairs repairing non-local reads, then
//! records the task's writes in the buffer-region state. Construction is
//! fully deterministic: identical input sequences produce identical command
//! ids and dependency sets.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::assign::{assign_chunks_to_nodes, ChunkAssignment, ChunkRequirements};
use crate::buffer_state::BufferRegionState;
use crate::command::CommandKind;
use crate::command_graph::CommandGraph;
use crate::error::BuildError;
use crate::grid::{subrange_to_region, GridRegion};
use crate::ident::{BufferId, ChunkId, CommandId, NodeId, TaskId};
use crate::split::{split_equal_1, split_equal_2};
use crate::subrange::{Subrange1, Subrange2, Subrange3};
use crate::task::{AccessMode, Task, TaskQueue};
use crate::telemetry::{NullTelemetrySink, TelemetrySink};

/// Static cluster shape the coordinator schedules for.
#[derive(Debug, Clone, Copy)]
pub struct ClusterConfig {
    num_nodes: u64,
}

impl ClusterConfig {
    /// Validates and stores the world size. Node 0 is the master.
    pub fn new(num_nodes: u64) -> Result<Self, BuildError> {
        if num_nodes == 0 {
            return Err(BuildError::EmptyCluster);
        }
        Ok(Self { num_nodes })
    }

    /// Total number of nodes, master included.
    pub fn num_nodes(&self) -> u64 {
        self.num_nodes
    }

    /// Nodes available for compute chunks. A single-node cluster runs its
    /// chunks on the master.
    pub fn num_worker_nodes(&self) -> u64 {
        (self.num_nodes - 1).max(1)
    }

    /// True when the master is the only node.
    pub fn master_only(&self) -> bool {
        self.num_nodes == 1
    }
}

/// Per-node pair of `Nop` join points fencing one task's commands.
#[derive(Debug, Clone, Copy)]
struct TaskFence {
    start: CommandId,
    end: CommandId,
}

/// Builds the distributed command graph from the task stream.
pub struct GraphBuilder {
    config: ClusterConfig,
    graph: CommandGraph,
    buffer_states: BTreeMap<BufferId, BufferRegionState>,
    next_buffer: u64,
    prev_fences: Option<BTreeMap<NodeId, TaskFence>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl GraphBuilder {
    /// Builder for the given cluster with no telemetry.
    pub fn new(config: ClusterConfig) -> Self {
        Self::with_telemetry(config, Arc::new(NullTelemetrySink))
    }

    /// Builder reporting construction events to `telemetry`.
    pub fn with_telemetry(config: ClusterConfig, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            config,
            graph: CommandGraph::new(),
            buffer_states: BTreeMap::new(),
            next_buffer: 0,
            prev_fences: None,
            telemetry,
        }
    }

    /// Registers a buffer of the given 3-D range.
    ///
    /// A host-initialized buffer starts fully resident on node 0; otherwise
    /// its content is undefined until first written.
    pub fn register_buffer(&mut self, range: [u64; 3], host_initialized: bool) -> BufferId {
        let bid = BufferId(self.next_buffer);
        self.next_buffer += 1;
        let state = if host_initialized {
            let region = subrange_to_region(&Subrange3 {
                offset: [0; 3],
                range,
                global_size: range,
            });
            BufferRegionState::with_initial(region, BTreeSet::from([NodeId(0)]))
        } else {
            BufferRegionState::new()
        };
        self.buffer_states.insert(bid, state);
        bid
    }

    /// The graph built so far.
    pub fn graph(&self) -> &CommandGraph {
        &self.graph
    }

    /// Consumes the builder, yielding the graph.
    pub fn into_graph(self) -> CommandGraph {
        self.graph
    }

    /// Residence state of `bid`.
    pub fn buffer_state(&self, bid: BufferId) -> Option<&BufferRegionState> {
        self.buffer_states.get(&bid)
    }

    /// Cluster configuration in use.
    pub fn config(&self) -> ClusterConfig {
        self.config
    }

    /// Builds commands for every satisfied task until the queue runs dry.
    pub fn build_all(&mut self, queue: &mut dyn TaskQueue) -> Result<(), BuildError> {
        while self.build_next_task(queue)?.is_some() {}
        Ok(())
    }

    /// Builds commands for the next satisfied task, if any.
    pub fn build_next_task(
        &mut self,
        queue: &mut dyn TaskQueue,
    ) -> Result<Option<TaskId>, BuildError> {
        let Some(tid) = queue.next_satisfied_task() else {
            return Ok(None);
        };

        let fences = self.open_task_fences(tid)?;

        let (num_chunks, chunk_reqs, assignment, exec_cmds) = {
            let task = queue.task(tid).ok_or(BuildError::UnknownTask(tid))?;
            match task {
                Task::Compute {
                    dimensions,
                    global_range,
                    range_mappers,
                } => self.plan_compute_task(tid, *dimensions, *global_range, range_mappers, &fences)?,
                Task::MasterAccess { accesses } => {
                    self.plan_master_access_task(tid, accesses, &fences)?
                }
            }
        };

        let pushes = self.process_data_requirements(
            tid,
            &chunk_reqs,
            &assignment,
            &exec_cmds,
            &fences,
        )?;

        self.close_task_fences(&fences, &exec_cmds, &pushes, &assignment)?;

        queue.mark_task_as_processed(tid);
        self.prev_fences = Some(fences);
        self.telemetry.on_task_built(tid, num_chunks);
        tracing::debug!(
            task = tid.0,
            chunks = num_chunks,
            commands = self.graph.command_count(),
            "task built"
        );
        Ok(Some(tid))
    }

    /// Appends one shutdown command per node. Call once, after the last
    /// task; the flush order places them behind everything else.
    pub fn finish(&mut self) {
        for nid in 0..self.config.num_nodes {
            self.create_command(NodeId(nid), None, CommandKind::Shutdown);
        }
    }

    fn create_command(&mut self, nid: NodeId, tid: Option<TaskId>, kind: CommandKind) -> CommandId {
        let cid = self.graph.create(nid, tid, kind);
        self.telemetry.on_command_created(cid, nid);
        cid
    }

    /// Creates the per-node `(start, end)` fence and chains each start to
    /// the previous task's end on the same node.
    fn open_task_fences(&mut self, tid: TaskId) -> Result<BTreeMap<NodeId, TaskFence>, BuildError> {
        let mut fences = BTreeMap::new();
        for nid in 0..self.config.num_nodes {
            let nid = NodeId(nid);
            let start = self.create_command(nid, Some(tid), CommandKind::Nop);
            let end = self.create_command(nid, Some(tid), CommandKind::Nop);
            if let Some(prev) = &self.prev_fences {
                if let Some(prev_fence) = prev.get(&nid) {
                    self.graph.add_dependency(start, prev_fence.end, false)?;
                }
            }
            fences.insert(nid, TaskFence { start, end });
        }
        Ok(fences)
    }

    /// Splits a compute task, computes chunk requirements, assigns chunks
    /// and emits one compute command per chunk.
    fn plan_compute_task(
        &mut self,
        tid: TaskId,
        dimensions: usize,
        global_range: [u64; 3],
        range_mappers: &[Box<dyn crate::task::RangeMapper>],
        fences: &BTreeMap<NodeId, TaskFence>,
    ) -> Result<TaskPlan, BuildError> {
        let num_chunks = self.config.num_worker_nodes();

        let chunks: Vec<KernelChunk> = match dimensions {
            1 => split_equal_1(
                &Subrange1 {
                    offset: [0],
                    range: [global_range[0]],
                    global_size: [global_range[0]],
                },
                num_chunks,
            )
            .into_iter()
            .map(KernelChunk::D1)
            .collect(),
            2 => split_equal_2(
                &Subrange2 {
                    offset: [0, 0],
                    range: [global_range[0], global_range[1]],
                    global_size: [global_range[0], global_range[1]],
                },
                num_chunks,
            )
            .into_iter()
            .map(KernelChunk::D2)
            .collect(),
            3 => return Err(BuildError::UnsupportedSplit { dims: 3 }),
            dims => return Err(BuildError::InvalidDimensions { dims }),
        };

        let mut chunk_reqs = ChunkRequirements::new();
        for mapper in range_mappers {
            for (index, chunk) in chunks.iter().enumerate() {
                let req = match *chunk {
                    KernelChunk::D1(sr) => mapper.map_1(sr),
                    KernelChunk::D2(sr) => mapper.map_2(sr),
                };
                let region = subrange_to_region(&req);
                let slot = chunk_reqs
                    .entry(ChunkId(index as u64))
                    .or_default()
                    .entry(mapper.buffer())
                    .or_default()
                    .entry(mapper.mode())
                    .or_insert_with(GridRegion::empty);
                *slot = GridRegion::merge(slot, &region);
            }
        }

        let mut free_nodes = BTreeSet::new();
        for nid in 0..self.config.num_nodes {
            if !self.config.master_only() && nid == 0 {
                continue;
            }
            free_nodes.insert(NodeId(nid));
        }

        let assignment =
            assign_chunks_to_nodes(num_chunks, &chunk_reqs, &self.buffer_states, &free_nodes)?;

        let mut exec_cmds = BTreeMap::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let chunk_id = ChunkId(index as u64);
            let nid = assignment.chunk_nodes[&chunk_id];
            let sr = match *chunk {
                KernelChunk::D1(sr) => Subrange3::from(sr),
                KernelChunk::D2(sr) => Subrange3::from(sr),
            };
            let cid = self.create_command(nid, Some(tid), CommandKind::Compute { sr });
            self.graph.add_dependency(cid, fences[&nid].start, false)?;
            exec_cmds.insert(chunk_id, cid);
        }

        Ok((num_chunks, chunk_reqs, assignment, exec_cmds))
    }

    /// Plans the single master chunk of a master-access task.
    ///
    /// Declared access regions are taken verbatim; the global size is set to
    /// the maximum so conversion into regions does not clamp.
    fn plan_master_access_task(
        &mut self,
        tid: TaskId,
        accesses: &[crate::task::BufferAccess],
        fences: &BTreeMap<NodeId, TaskFence>,
    ) -> Result<TaskPlan, BuildError> {
        let master = NodeId(0);
        let chunk = ChunkId(0);

        let mut chunk_reqs = ChunkRequirements::new();
        for access in accesses {
            let region = subrange_to_region(&Subrange3 {
                offset: access.offset,
                range: access.range,
                global_size: [u64::MAX; 3],
            });
            let slot = chunk_reqs
                .entry(chunk)
                .or_default()
                .entry(access.bid)
                .or_default()
                .entry(access.mode)
                .or_insert_with(GridRegion::empty);
            *slot = GridRegion::merge(slot, &region);
        }

        let mut assignment = ChunkAssignment::default();
        assignment.chunk_nodes.insert(chunk, master);
        for (bid, modes) in chunk_reqs.get(&chunk).into_iter().flatten() {
            let Some(read_req) = modes.get(&AccessMode::Read) else {
                continue;
            };
            let state = self
                .buffer_states
                .get(bid)
                .ok_or(BuildError::UnknownBuffer(*bid))?;
            let sources =
                state
                    .get_source_nodes(read_req)
                    .map_err(|gap| BuildError::UnwrittenRead {
                        bid: *bid,
                        missing_area: gap.missing_area,
                    })?;
            assignment
                .chunk_buffer_sources
                .entry(chunk)
                .or_default()
                .insert(*bid, sources);
        }

        let cid = self.create_command(master, Some(tid), CommandKind::MasterAccess);
        self.graph.add_dependency(cid, fences[&master].start, false)?;
        let mut exec_cmds = BTreeMap::new();
        exec_cmds.insert(chunk, cid);

        Ok((1, chunk_reqs, assignment, exec_cmds))
    }

    /// Walks every chunk's reads and writes: records writers, and emits a
    /// push / await-push pair for every source box the executing node does
    /// not hold. Returns the created push commands with their source nodes.
    fn process_data_requirements(
        &mut self,
        tid: TaskId,
        chunk_reqs: &ChunkRequirements,
        assignment: &ChunkAssignment,
        exec_cmds: &BTreeMap<ChunkId, CommandId>,
        fences: &BTreeMap<NodeId, TaskFence>,
    ) -> Result<Vec<(NodeId, CommandId)>, BuildError> {
        let mut buffer_writers: BTreeMap<BufferId, BTreeMap<NodeId, Vec<GridRegion>>> =
            BTreeMap::new();
        let mut pushes = Vec::new();

        for (chunk, nid) in &assignment.chunk_nodes {
            let Some(reqs) = chunk_reqs.get(chunk) else {
                continue;
            };
            let exec = exec_cmds[chunk];

            for (bid, modes) in reqs {
                if let Some(write_req) = modes.get(&AccessMode::Write) {
                    buffer_writers
                        .entry(*bid)
                        .or_default()
                        .entry(*nid)
                        .or_default()
                        .push(write_req.clone());
                }

                if modes.get(&AccessMode::Read).is_none() {
                    continue;
                }
                let sources = assignment
                    .chunk_buffer_sources
                    .get(chunk)
                    .and_then(|per_buffer| per_buffer.get(bid))
                    .ok_or(BuildError::UnwrittenRead {
                        bid: *bid,
                        missing_area: 0,
                    })?;

                for (bx, source_nodes) in sources {
                    if source_nodes.contains(nid) {
                        // Already resident where the chunk runs.
                        continue;
                    }
                    let source = source_nodes
                        .first()
                        .copied()
                        .ok_or(BuildError::EmptySourceSet { bid: *bid })?;

                    let push = self.create_command(
                        source,
                        Some(tid),
                        CommandKind::Push {
                            bid: *bid,
                            bx: *bx,
                            target: *nid,
                        },
                    );
                    self.graph
                        .add_dependency(push, fences[&source].start, false)?;

                    let await_push = self.create_command(
                        *nid,
                        Some(tid),
                        CommandKind::AwaitPush {
                            bid: *bid,
                            bx: *bx,
                            source_cid: push,
                        },
                    );
                    self.graph
                        .add_dependency(await_push, fences[nid].start, false)?;
                    self.graph.add_dependency(exec, await_push, false)?;

                    self.telemetry.on_push_planned(*bid, source, *nid);
                    tracing::trace!(
                        buffer = bid.0,
                        from = source.0,
                        to = nid.0,
                        area = bx.area(),
                        "push planned"
                    );
                    pushes.push((source, push));
                }
            }
        }

        for (bid, per_node) in &buffer_writers {
            let state = self
                .buffer_states
                .get_mut(bid)
                .ok_or(BuildError::UnknownBuffer(*bid))?;
            for (nid, regions) in per_node {
                let mut written = GridRegion::empty();
                for region in regions {
                    written = GridRegion::merge(&written, region);
                }
                state.update(&written, BTreeSet::from([*nid]));
            }
        }

        Ok(pushes)
    }

    /// Hooks every execution and push command under its node's end fence.
    ///
    /// Done last so `pseudo_cpl` stays strictly increasing along every
    /// dependency edge, which the flush order relies on.
    fn close_task_fences(
        &mut self,
        fences: &BTreeMap<NodeId, TaskFence>,
        exec_cmds: &BTreeMap<ChunkId, CommandId>,
        pushes: &[(NodeId, CommandId)],
        assignment: &ChunkAssignment,
    ) -> Result<(), BuildError> {
        for (chunk, exec) in exec_cmds {
            let nid = assignment.chunk_nodes[chunk];
            self.graph.add_dependency(fences[&nid].end, *exec, false)?;
        }
        for (source, push) in pushes {
            self.graph.add_dependency(fences[source].end, *push, false)?;
        }
        Ok(())
    }
}

/// Kernel-dimensional chunk, kept alongside its 3-D embedding.
#[derive(Debug, Clone, Copy)]
enum KernelChunk {
    D1(Subrange1),
    D2(Subrange2),
}

type TaskPlan = (
    u64,
    ChunkRequirements,
    ChunkAssignment,
    BTreeMap<ChunkId, CommandId>,
);
