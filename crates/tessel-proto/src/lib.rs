// SPDX-License-Identifier: Apache-2.0
//! Wire schema for the coordinator/worker message plane.
//!
//! Two message classes exist, discriminated by [`Tag`]: fixed-size command
//! packets and variable-size buffer data messages. Both layouts are
//! bit-exact little-endian; see [`wire`].
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

pub use tessel_core::{BufferId, CommandId, GridBox, NodeId, Subrange3, TaskId};

/// Message class carried by a transport frame.
///
/// Transports route by tag only; the payload layout is fixed per tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tag {
    /// An 88-byte [`wire::CommandPacket`].
    Command,
    /// A [`wire::DataHeader`] followed by the linearized buffer payload.
    Data,
}

pub mod wire;

pub use wire::{
    flush_packets, CommandPacket, DataHeader, PacketPayload, WireError, COMMAND_PACKET_BYTES,
    DATA_HEADER_BYTES,
};
