// SPDX-License-Identifier: Apache-2.0
//! Per-node cooperative command loop.
//!
//! Every node runs the same loop: advance the transfer manager, sweep the
//! job list, take in one command. Commands arrive in an order consistent
//! with the coordinator's dependency DAG, so an execution job only has to
//! wait for the await-push jobs queued before it. Kernel execution itself
//! is delegated to a [`KernelExecutor`] supplied by the embedder.

use std::collections::VecDeque;

use tessel_core::{NodeId, TaskId};
use tessel_proto::{CommandPacket, PacketPayload, Tag, WireError};

use crate::storage::BufferStorage;
use crate::transfer::{TransferError, TransferHandle, TransferManager};
use crate::transport::{TransferToken, Transport};

/// Failures that terminate the node loop.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    /// A transfer operation failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),
    /// A command packet failed to decode.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The tick budget ran out before the loop finished.
    #[error("loop did not finish within {ticks} ticks")]
    Stalled {
        /// Budget that was exhausted.
        ticks: u64,
    },
}

/// Executes kernels on behalf of the loop.
///
/// Device and queue management are outside the scheduling core; embedders
/// implement this trait against their execution stack. Calls are
/// synchronous and run after all transfers the command depends on.
pub trait KernelExecutor<S: BufferStorage> {
    /// Runs one chunk of a compute task over `[offset, offset + range)`.
    fn run_compute(&mut self, storage: &mut S, tid: Option<TaskId>, offset: [u64; 3], range: [u64; 3]);
    /// Runs the master-only functor.
    fn run_master_access(&mut self, storage: &mut S, tid: Option<TaskId>);
}

enum Job {
    Push {
        handle: TransferHandle,
    },
    AwaitPush {
        handle: TransferHandle,
    },
    Compute {
        tid: Option<TaskId>,
        offset: [u64; 3],
        range: [u64; 3],
    },
    MasterAccess {
        tid: Option<TaskId>,
    },
}

/// Cooperative per-node loop over a transport, storage and executor.
pub struct CommandLoop<T, S, K> {
    node: NodeId,
    transport: T,
    storage: S,
    executor: K,
    manager: TransferManager,
    jobs: VecDeque<Job>,
    local_queue: VecDeque<CommandPacket>,
    pending_cmd: Option<TransferToken>,
    shutdown_seen: bool,
}

impl<T, S, K> CommandLoop<T, S, K>
where
    T: Transport,
    S: BufferStorage,
    K: KernelExecutor<S>,
{
    /// Loop for `node` over the given transport, storage and executor.
    pub fn new(node: NodeId, transport: T, storage: S, executor: K) -> Self {
        Self {
            node,
            transport,
            storage,
            executor,
            manager: TransferManager::new(),
            jobs: VecDeque::new(),
            local_queue: VecDeque::new(),
            pending_cmd: None,
            shutdown_seen: false,
        }
    }

    /// The node this loop runs on.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Node-local buffer storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Mutable access to node-local buffer storage.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Feeds a command without going through the transport. The coordinator
    /// queues its own node's commands here instead of sending to itself.
    pub fn enqueue_local(&mut self, packet: CommandPacket) {
        self.local_queue.push_back(packet);
    }

    /// True once a shutdown was received and all jobs have drained.
    pub fn is_done(&self) -> bool {
        self.shutdown_seen
            && self.jobs.is_empty()
            && self.local_queue.is_empty()
            && self.pending_cmd.is_none()
    }

    /// One loop iteration: poll transfers, sweep jobs, take in a command.
    pub fn tick(&mut self) -> Result<(), LoopError> {
        self.manager.poll(&mut self.transport, &mut self.storage)?;
        self.sweep_jobs();
        if let Some(packet) = self.next_command()? {
            self.dispatch(packet)?;
        }
        Ok(())
    }

    /// Ticks until done, failing after `max_ticks` iterations.
    pub fn run_to_completion(&mut self, max_ticks: u64) -> Result<(), LoopError> {
        for _ in 0..max_ticks {
            if self.is_done() {
                return Ok(());
            }
            self.tick()?;
        }
        if self.is_done() {
            Ok(())
        } else {
            Err(LoopError::Stalled { ticks: max_ticks })
        }
    }

    /// Runs every job that may make progress, in queue order.
    ///
    /// Execution jobs wait for every await-push queued before them; the
    /// coordinator emits awaits ahead of their dependent execution command,
    /// so this realizes the per-node dependency order. Transfer jobs finish
    /// when their handle completes.
    fn sweep_jobs(&mut self) {
        let jobs = std::mem::take(&mut self.jobs);
        let mut awaits_blocked = false;
        for job in jobs {
            match job {
                Job::Push { handle } => {
                    if !handle.is_complete() {
                        self.jobs.push_back(Job::Push { handle });
                    }
                }
                Job::AwaitPush { handle } => {
                    if !handle.is_complete() {
                        awaits_blocked = true;
                        self.jobs.push_back(Job::AwaitPush { handle });
                    }
                }
                Job::Compute { tid, offset, range } => {
                    if awaits_blocked {
                        self.jobs.push_back(Job::Compute { tid, offset, range });
                    } else {
                        tracing::debug!(node = self.node.0, ?tid, "running compute chunk");
                        self.executor.run_compute(&mut self.storage, tid, offset, range);
                    }
                }
                Job::MasterAccess { tid } => {
                    if awaits_blocked {
                        self.jobs.push_back(Job::MasterAccess { tid });
                    } else {
                        tracing::debug!(node = self.node.0, ?tid, "running master access");
                        self.executor.run_master_access(&mut self.storage, tid);
                    }
                }
            }
        }
    }

    /// Takes the next command: the local queue first, then the wire.
    fn next_command(&mut self) -> Result<Option<CommandPacket>, LoopError> {
        if let Some(packet) = self.local_queue.pop_front() {
            return Ok(Some(packet));
        }
        if self.pending_cmd.is_none() {
            self.pending_cmd = self.transport.probe(Tag::Command);
        }
        let Some(token) = self.pending_cmd else {
            return Ok(None);
        };
        let Some(frame) = self.transport.poll_recv(token) else {
            return Ok(None);
        };
        self.pending_cmd = None;
        Ok(Some(CommandPacket::decode(&frame)?))
    }

    fn dispatch(&mut self, packet: CommandPacket) -> Result<(), LoopError> {
        match packet.payload {
            PacketPayload::Nop => {}
            PacketPayload::Compute { offset, range } => {
                self.jobs.push_back(Job::Compute {
                    tid: packet.tid,
                    offset,
                    range,
                });
            }
            PacketPayload::MasterAccess => {
                self.jobs.push_back(Job::MasterAccess { tid: packet.tid });
            }
            PacketPayload::Push { bid, target, bx } => {
                let handle = self.manager.push(
                    &mut self.transport,
                    &self.storage,
                    bid,
                    bx,
                    target,
                    packet.cid,
                )?;
                self.jobs.push_back(Job::Push { handle });
            }
            PacketPayload::AwaitPush {
                bid, source_cid, ..
            } => {
                let handle = self
                    .manager
                    .await_push(&mut self.storage, bid, source_cid)?;
                self.jobs.push_back(Job::AwaitPush { handle });
            }
            PacketPayload::Shutdown => {
                tracing::debug!(node = self.node.0, "shutdown received");
                self.shutdown_seen = true;
            }
        }
        Ok(())
    }
}
