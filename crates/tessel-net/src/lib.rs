// SPDX-License-Identifier: Apache-2.0
//! tessel-net: data-transfer protocol and per-node execution loop.
//!
//! Workers realize the coordinator's push / await-push commands here. The
//! transfer manager matches inbound data against pending awaits by the push
//! command's id, tolerating out-of-order arrival in both directions. All
//! progress is driven by periodic, non-blocking polls from a
//! single-threaded loop; multi-threaded transports must funnel through one
//! dispatcher before entering this crate.
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

mod node;
mod storage;
mod transfer;
mod transport;

pub use node::{CommandLoop, KernelExecutor, LoopError};
pub use storage::{BufferStorage, DataChunk, HostStorage, StorageError};
pub use transfer::{TransferError, TransferHandle, TransferManager};
pub use transport::{LoopbackHub, LoopbackTransport, TransferToken, Transport};
