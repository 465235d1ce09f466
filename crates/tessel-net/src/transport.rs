// SPDX-License-Identifier: Apache-2.0
//! Message-passing substrate abstraction and an in-memory implementation.
//!
//! The protocol layer only ever issues non-blocking operations: start a
//! send, test a send, probe for an arrival, test a receive. Concrete
//! transports (MPI-style runtimes, sockets behind a dispatcher thread) map
//! onto these four calls; the in-memory [`LoopbackHub`] serves tests and
//! single-process runs.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use bytes::Bytes;
use tessel_core::NodeId;
use tessel_proto::Tag;

/// Opaque handle for an in-flight send or receive.
pub type TransferToken = u64;

/// Non-blocking message-passing endpoint of one node.
///
/// Messages between a fixed `(source, tag)` pair are delivered in order;
/// the transport is assumed reliable. No call on this trait may block.
pub trait Transport {
    /// Begins sending `frame` to `target` under `tag`.
    fn start_send(&mut self, target: NodeId, tag: Tag, frame: Bytes) -> TransferToken;
    /// True once the send for `token` has completed locally.
    fn poll_send(&mut self, token: TransferToken) -> bool;
    /// Checks for an arrived message under `tag` and begins receiving it.
    fn probe(&mut self, tag: Tag) -> Option<TransferToken>;
    /// The received frame, once the receive for `token` has completed.
    fn poll_recv(&mut self, token: TransferToken) -> Option<Bytes>;
}

#[derive(Debug, Default)]
struct HubState {
    next_token: u64,
    /// In-flight frames per destination and tag, FIFO.
    queues: BTreeMap<(NodeId, Tag), VecDeque<Bytes>>,
    /// Frames claimed by a probe, pending their `poll_recv`.
    claimed: BTreeMap<TransferToken, Bytes>,
    /// While true, no endpoint sees arrivals. Lets tests stage out-of-order
    /// rendezvous between transfers and their await commands.
    held: bool,
}

/// Shared in-memory switchboard connecting [`LoopbackTransport`] endpoints.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    state: Rc<RefCell<HubState>>,
}

impl LoopbackHub {
    /// A hub with no endpoints yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoint for `node`. Multiple endpoints per node are allowed; they
    /// share the node's inbound queues.
    pub fn endpoint(&self, node: NodeId) -> LoopbackTransport {
        LoopbackTransport {
            node,
            state: Rc::clone(&self.state),
        }
    }

    /// Stops delivering arrivals until [`release`](Self::release) is called.
    pub fn hold(&self) {
        self.state.borrow_mut().held = true;
    }

    /// Resumes delivery of held arrivals.
    pub fn release(&self) {
        self.state.borrow_mut().held = false;
    }
}

/// In-memory [`Transport`] endpoint; sends complete immediately, receives
/// complete on the first poll after delivery.
#[derive(Debug)]
pub struct LoopbackTransport {
    node: NodeId,
    state: Rc<RefCell<HubState>>,
}

impl LoopbackTransport {
    /// The node this endpoint belongs to.
    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl Transport for LoopbackTransport {
    fn start_send(&mut self, target: NodeId, tag: Tag, frame: Bytes) -> TransferToken {
        let mut state = self.state.borrow_mut();
        state
            .queues
            .entry((target, tag))
            .or_default()
            .push_back(frame);
        let token = state.next_token;
        state.next_token += 1;
        token
    }

    fn poll_send(&mut self, _token: TransferToken) -> bool {
        true
    }

    fn probe(&mut self, tag: Tag) -> Option<TransferToken> {
        let mut state = self.state.borrow_mut();
        if state.held {
            return None;
        }
        let frame = state.queues.get_mut(&(self.node, tag))?.pop_front()?;
        let token = state.next_token;
        state.next_token += 1;
        state.claimed.insert(token, frame);
        Some(token)
    }

    fn poll_recv(&mut self, token: TransferToken) -> Option<Bytes> {
        self.state.borrow_mut().claimed.remove(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_route_by_target_and_tag() {
        let hub = LoopbackHub::new();
        let mut sender = hub.endpoint(NodeId(0));
        let mut receiver = hub.endpoint(NodeId(1));

        let token = sender.start_send(NodeId(1), Tag::Data, Bytes::from_static(b"abc"));
        assert!(sender.poll_send(token));

        assert!(receiver.probe(Tag::Command).is_none(), "wrong tag");
        let recv = receiver.probe(Tag::Data).unwrap();
        assert_eq!(receiver.poll_recv(recv).unwrap(), Bytes::from_static(b"abc"));
        assert!(receiver.probe(Tag::Data).is_none(), "queue drained");
    }

    #[test]
    fn delivery_order_is_fifo_per_destination() {
        let hub = LoopbackHub::new();
        let mut sender = hub.endpoint(NodeId(0));
        let mut receiver = hub.endpoint(NodeId(2));

        sender.start_send(NodeId(2), Tag::Command, Bytes::from_static(b"first"));
        sender.start_send(NodeId(2), Tag::Command, Bytes::from_static(b"second"));

        let a = receiver.probe(Tag::Command).unwrap();
        let b = receiver.probe(Tag::Command).unwrap();
        assert_eq!(receiver.poll_recv(a).unwrap(), Bytes::from_static(b"first"));
        assert_eq!(receiver.poll_recv(b).unwrap(), Bytes::from_static(b"second"));
    }

    #[test]
    fn held_hub_hides_arrivals() {
        let hub = LoopbackHub::new();
        let mut sender = hub.endpoint(NodeId(0));
        let mut receiver = hub.endpoint(NodeId(1));

        hub.hold();
        sender.start_send(NodeId(1), Tag::Data, Bytes::from_static(b"x"));
        assert!(receiver.probe(Tag::Data).is_none());

        hub.release();
        assert!(receiver.probe(Tag::Data).is_some());
    }
}
