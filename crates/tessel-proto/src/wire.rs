// SPDX-License-Identifier: Apache-2.0
//! Bit-exact little-endian framing for command packets and data headers.
//!
//! Command packet layout (88 bytes total):
//!
//! ``tid: u64 || cid: u64 || kind: u8 || pad: u8[7] || data: u8[64]``
//!
//! A `tid` of `u64::MAX` encodes "no task". The 64-byte `data` block is a
//! per-kind union, zero-padded:
//!
//! | kind | data |
//! |---|---|
//! | `Nop` (0), `MasterAccess` (2), `Shutdown` (5) | all zero |
//! | `Compute` (1) | offset `u64[3]` \|\| range `u64[3]` |
//! | `Push` (3) | bid `u64` \|\| target `u64` \|\| box min `u64[3]` \|\| box max `u64[3]` |
//! | `AwaitPush` (4) | bid `u64` \|\| source_cid `u64` \|\| box min `u64[3]` \|\| box max `u64[3]` |
//!
//! Data message layout: an 88-byte header
//!
//! ``bid: u64 || offset: u64[3] || range: u64[3] || global_size: u64[3] || push_cid: u64``
//!
//! followed by `prod(range) × element_size` payload bytes, row-major with
//! axis order 0 → 1 → 2.

use tessel_core::{
    flush_order, BufferId, Command, CommandGraph, CommandId, CommandKind, GridBox, NodeId,
    Subrange3, TaskId,
};

/// Size of an encoded command packet.
pub const COMMAND_PACKET_BYTES: usize = 88;
/// Size of an encoded data-message header.
pub const DATA_HEADER_BYTES: usize = 88;

const TID_NONE: u64 = u64::MAX;

/// Decode failures; all of them mean a corrupted or foreign frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// The frame is shorter than the fixed layout requires.
    #[error("frame too short: need {expected} bytes, got {actual}")]
    ShortFrame {
        /// Required length.
        expected: usize,
        /// Provided length.
        actual: usize,
    },
    /// The kind byte does not name a command variant.
    #[error("unknown command kind byte: {0}")]
    UnknownKind(u8),
}

/// Variant payload of a command packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketPayload {
    /// Join point; carried for completeness, coordinators do not emit it.
    Nop,
    /// Execute a chunk with the given iteration offset and range.
    Compute {
        /// Chunk start per axis.
        offset: [u64; 3],
        /// Chunk extent per axis.
        range: [u64; 3],
    },
    /// Run the master-only functor.
    MasterAccess,
    /// Send a box of a buffer to `target`.
    Push {
        /// Buffer to read from.
        bid: BufferId,
        /// Receiving node.
        target: NodeId,
        /// Transferred box.
        bx: GridBox,
    },
    /// Wait for the transfer correlated by `source_cid`.
    AwaitPush {
        /// Buffer to write into.
        bid: BufferId,
        /// Id of the matching push command.
        source_cid: CommandId,
        /// Received box.
        bx: GridBox,
    },
    /// Terminate the node loop once prior jobs finish.
    Shutdown,
}

impl PacketPayload {
    fn kind_byte(&self) -> u8 {
        match self {
            Self::Nop => 0,
            Self::Compute { .. } => 1,
            Self::MasterAccess => 2,
            Self::Push { .. } => 3,
            Self::AwaitPush { .. } => 4,
            Self::Shutdown => 5,
        }
    }
}

/// A complete command packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPacket {
    /// Owning task, if any.
    pub tid: Option<TaskId>,
    /// Command id; doubles as the push correlator.
    pub cid: CommandId,
    /// Variant payload.
    pub payload: PacketPayload,
}

fn put_u64(buf: &mut [u8], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

fn put_triple(buf: &mut [u8], at: usize, values: [u64; 3]) {
    for (index, value) in values.into_iter().enumerate() {
        put_u64(buf, at + index * 8, value);
    }
}

fn get_u64(buf: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(raw)
}

fn get_triple(buf: &[u8], at: usize) -> [u64; 3] {
    [
        get_u64(buf, at),
        get_u64(buf, at + 8),
        get_u64(buf, at + 16),
    ]
}

impl CommandPacket {
    /// Encodes into the fixed 88-byte layout.
    pub fn encode(&self) -> [u8; COMMAND_PACKET_BYTES] {
        let mut buf = [0u8; COMMAND_PACKET_BYTES];
        put_u64(&mut buf, 0, self.tid.map_or(TID_NONE, |tid| tid.0));
        put_u64(&mut buf, 8, self.cid.0);
        buf[16] = self.payload.kind_byte();
        let data = &mut buf[24..];
        match self.payload {
            PacketPayload::Nop | PacketPayload::MasterAccess | PacketPayload::Shutdown => {}
            PacketPayload::Compute { offset, range } => {
                put_triple(data, 0, offset);
                put_triple(data, 24, range);
            }
            PacketPayload::Push { bid, target, bx } => {
                put_u64(data, 0, bid.0);
                put_u64(data, 8, target.0);
                put_triple(data, 16, GridBox::min(&bx));
                put_triple(data, 40, GridBox::max(&bx));
            }
            PacketPayload::AwaitPush {
                bid,
                source_cid,
                bx,
            } => {
                put_u64(data, 0, bid.0);
                put_u64(data, 8, source_cid.0);
                put_triple(data, 16, GridBox::min(&bx));
                put_triple(data, 40, GridBox::max(&bx));
            }
        }
        buf
    }

    /// Decodes a frame, validating length and kind byte.
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        if frame.len() < COMMAND_PACKET_BYTES {
            return Err(WireError::ShortFrame {
                expected: COMMAND_PACKET_BYTES,
                actual: frame.len(),
            });
        }
        let tid_raw = get_u64(frame, 0);
        let tid = (tid_raw != TID_NONE).then_some(TaskId(tid_raw));
        let cid = CommandId(get_u64(frame, 8));
        let data = &frame[24..];
        let payload = match frame[16] {
            0 => PacketPayload::Nop,
            1 => PacketPayload::Compute {
                offset: get_triple(data, 0),
                range: get_triple(data, 24),
            },
            2 => PacketPayload::MasterAccess,
            3 => PacketPayload::Push {
                bid: BufferId(get_u64(data, 0)),
                target: NodeId(get_u64(data, 8)),
                bx: GridBox::new(get_triple(data, 16), get_triple(data, 40)),
            },
            4 => PacketPayload::AwaitPush {
                bid: BufferId(get_u64(data, 0)),
                source_cid: CommandId(get_u64(data, 8)),
                bx: GridBox::new(get_triple(data, 16), get_triple(data, 40)),
            },
            5 => PacketPayload::Shutdown,
            other => return Err(WireError::UnknownKind(other)),
        };
        Ok(Self { tid, cid, payload })
    }

    /// Builds the packet form of a graph command.
    pub fn from_command(cmd: &Command) -> Self {
        let payload = match cmd.kind() {
            CommandKind::Nop => PacketPayload::Nop,
            CommandKind::Compute { sr } => PacketPayload::Compute {
                offset: sr.offset,
                range: sr.range,
            },
            CommandKind::MasterAccess => PacketPayload::MasterAccess,
            CommandKind::Push { bid, bx, target } => PacketPayload::Push {
                bid: *bid,
                target: *target,
                bx: *bx,
            },
            CommandKind::AwaitPush {
                bid,
                bx,
                source_cid,
            } => PacketPayload::AwaitPush {
                bid: *bid,
                source_cid: *source_cid,
                bx: *bx,
            },
            CommandKind::Shutdown => PacketPayload::Shutdown,
        };
        Self {
            tid: cmd.tid(),
            cid: cmd.cid(),
            payload,
        }
    }
}

/// Header of a buffer data message; the linearized payload follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    /// Buffer the payload belongs to.
    pub bid: BufferId,
    /// Placement of the payload inside the buffer.
    pub sr: Subrange3,
    /// Id of the push command that produced this message.
    pub push_cid: CommandId,
}

impl DataHeader {
    /// Encodes into the fixed 88-byte layout.
    pub fn encode(&self) -> [u8; DATA_HEADER_BYTES] {
        let mut buf = [0u8; DATA_HEADER_BYTES];
        put_u64(&mut buf, 0, self.bid.0);
        put_triple(&mut buf, 8, self.sr.offset);
        put_triple(&mut buf, 32, self.sr.range);
        put_triple(&mut buf, 56, self.sr.global_size);
        put_u64(&mut buf, 80, self.push_cid.0);
        buf
    }

    /// Decodes the header prefix of a data message.
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        if frame.len() < DATA_HEADER_BYTES {
            return Err(WireError::ShortFrame {
                expected: DATA_HEADER_BYTES,
                actual: frame.len(),
            });
        }
        Ok(Self {
            bid: BufferId(get_u64(frame, 0)),
            sr: Subrange3 {
                offset: get_triple(frame, 8),
                range: get_triple(frame, 32),
                global_size: get_triple(frame, 56),
            },
            push_cid: CommandId(get_u64(frame, 80)),
        })
    }
}

/// Packetizes a built graph in emission order.
///
/// Nop join points never leave the coordinator; shutdown packets come last
/// (see [`flush_order`]). Each packet is paired with the node it must be
/// delivered to.
pub fn flush_packets(graph: &CommandGraph) -> Vec<(NodeId, CommandPacket)> {
    flush_order(graph)
        .into_iter()
        .map(|cmd| (cmd.nid(), CommandPacket::from_command(cmd)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_packet_matches_byte_vector() {
        let packet = CommandPacket {
            tid: Some(TaskId(2)),
            cid: CommandId(42),
            payload: PacketPayload::Push {
                bid: BufferId(7),
                target: NodeId(1),
                bx: GridBox::new([512, 0, 0], [1024, 1, 1]),
            },
        };
        let bytes = packet.encode();
        assert_eq!(bytes.len(), 88);
        assert_eq!(&bytes[0..8], &2u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &42u64.to_le_bytes());
        assert_eq!(bytes[16], 3);
        assert_eq!(&bytes[17..24], &[0u8; 7]);
        assert_eq!(&bytes[24..32], &7u64.to_le_bytes());
        assert_eq!(&bytes[32..40], &1u64.to_le_bytes());
        assert_eq!(&bytes[40..48], &512u64.to_le_bytes());
        assert_eq!(&bytes[48..56], &0u64.to_le_bytes());
        assert_eq!(&bytes[64..72], &1024u64.to_le_bytes());
        assert_eq!(CommandPacket::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn compute_packet_round_trips() {
        let packet = CommandPacket {
            tid: Some(TaskId(0)),
            cid: CommandId(3),
            payload: PacketPayload::Compute {
                offset: [512, 0, 0],
                range: [512, 1, 1],
            },
        };
        let bytes = packet.encode();
        assert_eq!(bytes[16], 1);
        // Trailing 16 bytes of the union stay zero.
        assert_eq!(&bytes[72..88], &[0u8; 16]);
        assert_eq!(CommandPacket::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn shutdown_packet_has_no_task_and_empty_data() {
        let packet = CommandPacket {
            tid: None,
            cid: CommandId(99),
            payload: PacketPayload::Shutdown,
        };
        let bytes = packet.encode();
        assert_eq!(&bytes[0..8], &u64::MAX.to_le_bytes());
        assert_eq!(bytes[16], 5);
        assert_eq!(&bytes[24..88], &[0u8; 64]);
        let decoded = CommandPacket::decode(&bytes).unwrap();
        assert_eq!(decoded.tid, None);
        assert_eq!(decoded.payload, PacketPayload::Shutdown);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut bytes = [0u8; COMMAND_PACKET_BYTES];
        bytes[16] = 9;
        assert_eq!(CommandPacket::decode(&bytes), Err(WireError::UnknownKind(9)));
    }

    #[test]
    fn short_frame_is_rejected() {
        let err = CommandPacket::decode(&[0u8; 20]).unwrap_err();
        assert_eq!(
            err,
            WireError::ShortFrame {
                expected: COMMAND_PACKET_BYTES,
                actual: 20
            }
        );
    }

    #[test]
    fn data_header_matches_byte_vector() {
        let header = DataHeader {
            bid: BufferId(1),
            sr: Subrange3 {
                offset: [512, 0, 0],
                range: [512, 1, 1],
                global_size: [1024, 1, 1],
            },
            push_cid: CommandId(42),
        };
        let bytes = header.encode();
        assert_eq!(bytes.len(), 88);
        assert_eq!(&bytes[0..8], &1u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &512u64.to_le_bytes());
        assert_eq!(&bytes[32..40], &512u64.to_le_bytes());
        assert_eq!(&bytes[56..64], &1024u64.to_le_bytes());
        assert_eq!(&bytes[80..88], &42u64.to_le_bytes());
        assert_eq!(DataHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn data_header_ignores_trailing_payload() {
        let header = DataHeader {
            bid: BufferId(0),
            sr: Subrange3 {
                offset: [0; 3],
                range: [4, 1, 1],
                global_size: [4, 1, 1],
            },
            push_cid: CommandId(0),
        };
        let mut frame = header.encode().to_vec();
        frame.extend_from_slice(&[0xAB; 16]);
        assert_eq!(DataHeader::decode(&frame).unwrap(), header);
    }
}
