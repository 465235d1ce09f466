// SPDX-License-Identifier: Apache-2.0
//! Push / await-push transfer protocol over the message substrate.
//!
//! The manager never blocks: `push` starts a non-blocking send,
//! `await_push` registers (or resolves) a rendezvous, and `poll` advances
//! everything in three phases: probe for arrivals, drain completed inbound
//! transfers, drain completed outbound transfers.
//!
//! Inbound data and its await command may arrive in either order; the
//! blackboard keyed by the push command's id pairs them up. Payload writes
//! happen synchronously inside `poll` (data first) or inside `await_push`
//! (await last).

use std::cell::Cell;
use std::rc::Rc;

use bytes::Bytes;
use rustc_hash::FxHashMap;
use tessel_core::{BufferId, CommandId, GridBox, NodeId, Subrange3};
use tessel_proto::{DataHeader, Tag, WireError, DATA_HEADER_BYTES};

use crate::storage::{BufferStorage, DataChunk, StorageError};
use crate::transport::{TransferToken, Transport};

/// Transfer-protocol failures; fatal, since the substrate is assumed
/// reliable.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Buffer access failed on this node.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A data frame failed to decode.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// A second await-push registered for the same push id.
    #[error("duplicate await-push for {source_cid}")]
    DuplicateAwait {
        /// The contested push correlator.
        source_cid: CommandId,
    },
}

/// Completion flag shared between the manager and the job that issued the
/// transfer.
///
/// Handles live until their underlying message completes; the owning side
/// flips them inside `poll`.
#[derive(Debug, Clone, Default)]
pub struct TransferHandle {
    complete: Rc<Cell<bool>>,
}

impl TransferHandle {
    /// True once the transfer has fully completed on this node.
    pub fn is_complete(&self) -> bool {
        self.complete.get()
    }

    fn mark_complete(&self) {
        self.complete.set(true);
    }
}

struct OutboundTransfer {
    token: TransferToken,
    handle: TransferHandle,
}

struct InboundTransfer {
    token: TransferToken,
}

enum BlackboardEntry {
    /// The await command arrived first; data will complete it.
    Awaiting { handle: TransferHandle },
    /// The data arrived (and completed) first; the await will consume it.
    Received {
        handle: TransferHandle,
        header: DataHeader,
        payload: Bytes,
    },
}

/// Realizes push and await-push commands on one node.
#[derive(Default)]
pub struct TransferManager {
    incoming: Vec<InboundTransfer>,
    outgoing: Vec<OutboundTransfer>,
    blackboard: FxHashMap<u64, BlackboardEntry>,
}

impl TransferManager {
    /// Manager with no transfers in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts sending `bx` of `bid` to `target`, correlated by `push_cid`.
    ///
    /// The region is read from local storage and linearized behind an
    /// 88-byte header. The returned handle completes once the send does.
    pub fn push(
        &mut self,
        transport: &mut dyn Transport,
        storage: &dyn BufferStorage,
        bid: BufferId,
        bx: GridBox,
        target: NodeId,
        push_cid: CommandId,
    ) -> Result<TransferHandle, TransferError> {
        let offset = GridBox::min(&bx);
        let range = bx.range();
        let payload = storage.get_data(bid, offset, range)?;
        let header = DataHeader {
            bid,
            sr: Subrange3 {
                offset,
                range,
                global_size: storage.buffer_range(bid)?,
            },
            push_cid,
        };
        let mut frame = Vec::with_capacity(DATA_HEADER_BYTES + payload.len());
        frame.extend_from_slice(&header.encode());
        frame.extend_from_slice(&payload);
        tracing::debug!(
            buffer = bid.0,
            to = target.0,
            bytes = payload.len(),
            correlator = push_cid.0,
            "outbound transfer started"
        );
        let token = transport.start_send(target, Tag::Data, Bytes::from(frame));
        let handle = TransferHandle::default();
        self.outgoing.push(OutboundTransfer {
            token,
            handle: handle.clone(),
        });
        Ok(handle)
    }

    /// Registers interest in the transfer correlated by `source_cid`.
    ///
    /// If the data already arrived and was drained into the blackboard, the
    /// payload is written to storage now and the returned handle is already
    /// complete. Otherwise the handle completes on a later `poll`.
    pub fn await_push(
        &mut self,
        storage: &mut dyn BufferStorage,
        bid: BufferId,
        source_cid: CommandId,
    ) -> Result<TransferHandle, TransferError> {
        match self.blackboard.remove(&source_cid.0) {
            Some(BlackboardEntry::Received {
                handle,
                header,
                payload,
            }) => {
                debug_assert_eq!(header.bid, bid);
                tracing::debug!(correlator = source_cid.0, "await resolved from blackboard");
                write_payload(storage, &header, payload)?;
                Ok(handle)
            }
            Some(entry @ BlackboardEntry::Awaiting { .. }) => {
                self.blackboard.insert(source_cid.0, entry);
                Err(TransferError::DuplicateAwait { source_cid })
            }
            None => {
                let handle = TransferHandle::default();
                self.blackboard.insert(
                    source_cid.0,
                    BlackboardEntry::Awaiting {
                        handle: handle.clone(),
                    },
                );
                Ok(handle)
            }
        }
    }

    /// Advances all transfers; never blocks.
    pub fn poll(
        &mut self,
        transport: &mut dyn Transport,
        storage: &mut dyn BufferStorage,
    ) -> Result<(), TransferError> {
        // Phase 1: probe for a new arrival and start receiving it.
        if let Some(token) = transport.probe(Tag::Data) {
            self.incoming.push(InboundTransfer { token });
        }

        // Phase 2: drain completed inbound transfers into storage or the
        // blackboard.
        let mut pending = Vec::new();
        for transfer in self.incoming.drain(..) {
            let Some(frame) = transport.poll_recv(transfer.token) else {
                pending.push(transfer);
                continue;
            };
            let header = DataHeader::decode(&frame)?;
            let payload = frame.slice(DATA_HEADER_BYTES..);
            match self.blackboard.remove(&header.push_cid.0) {
                Some(BlackboardEntry::Awaiting { handle }) => {
                    write_payload(storage, &header, payload)?;
                    handle.mark_complete();
                    tracing::debug!(
                        correlator = header.push_cid.0,
                        "inbound transfer completed a pending await"
                    );
                }
                Some(entry @ BlackboardEntry::Received { .. }) => {
                    // A second frame for the same correlator violates the
                    // substrate's reliability assumption; keep the first.
                    self.blackboard.insert(header.push_cid.0, entry);
                }
                None => {
                    let handle = TransferHandle::default();
                    handle.mark_complete();
                    self.blackboard.insert(
                        header.push_cid.0,
                        BlackboardEntry::Received {
                            handle,
                            header,
                            payload,
                        },
                    );
                    tracing::debug!(
                        correlator = header.push_cid.0,
                        "inbound transfer buffered ahead of its await"
                    );
                }
            }
        }
        self.incoming = pending;

        // Phase 3: drain completed outbound transfers.
        self.outgoing.retain(|transfer| {
            if transport.poll_send(transfer.token) {
                transfer.handle.mark_complete();
                false
            } else {
                true
            }
        });
        Ok(())
    }

    /// True while any transfer or unresolved rendezvous entry remains.
    pub fn is_idle(&self) -> bool {
        self.incoming.is_empty() && self.outgoing.is_empty() && self.blackboard.is_empty()
    }
}

fn write_payload(
    storage: &mut dyn BufferStorage,
    header: &DataHeader,
    payload: Bytes,
) -> Result<(), TransferError> {
    storage.set_data(
        header.bid,
        &DataChunk {
            bytes: payload,
            offset: header.sr.offset,
            range: header.sr.range,
        },
    )?;
    Ok(())
}
