// SPDX-License-Identifier: Apache-2.0
//! Buffer storage port and a host-memory implementation.
//!
//! The transfer manager reads and writes buffers through this port only;
//! device-resident storage plugs in behind the same trait. Payloads are
//! linearized row-major with axis order 0 → 1 → 2.

use std::collections::BTreeMap;

use bytes::Bytes;
use tessel_core::BufferId;

/// Storage-level failures. These are programmer errors (unknown buffers,
/// out-of-range accesses), not runtime conditions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The buffer was never allocated on this node.
    #[error("unknown buffer: {0}")]
    UnknownBuffer(BufferId),
    /// The access exceeds the buffer's allocated range.
    #[error("access out of bounds for {bid}")]
    OutOfBounds {
        /// Accessed buffer.
        bid: BufferId,
    },
    /// Payload length disagrees with the declared subrange.
    #[error("payload size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Bytes implied by the subrange and element size.
        expected: usize,
        /// Bytes provided.
        actual: usize,
    },
}

/// A linearized slab of buffer data with its placement.
#[derive(Debug, Clone)]
pub struct DataChunk {
    /// Row-major payload bytes.
    pub bytes: Bytes,
    /// Placement offset per axis.
    pub offset: [u64; 3],
    /// Extent per axis.
    pub range: [u64; 3],
}

/// Node-local buffer storage as the transfer layer sees it.
pub trait BufferStorage {
    /// Element size in bytes of `bid`.
    fn element_size(&self, bid: BufferId) -> Result<usize, StorageError>;
    /// Allocated 3-D range of `bid`.
    fn buffer_range(&self, bid: BufferId) -> Result<[u64; 3], StorageError>;
    /// Linearizes `range` elements starting at `offset`.
    fn get_data(&self, bid: BufferId, offset: [u64; 3], range: [u64; 3])
        -> Result<Bytes, StorageError>;
    /// Writes a linearized slab at its declared placement.
    fn set_data(&mut self, bid: BufferId, chunk: &DataChunk) -> Result<(), StorageError>;
}

#[derive(Debug)]
struct HostBuffer {
    range: [u64; 3],
    element_size: usize,
    data: Vec<u8>,
}

/// Flat host-memory buffer storage.
#[derive(Debug, Default)]
pub struct HostStorage {
    buffers: BTreeMap<BufferId, HostBuffer>,
}

impl HostStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates `bid` with the given range and element size, zero-filled.
    pub fn allocate(&mut self, bid: BufferId, range: [u64; 3], element_size: usize) {
        let len = (range[0] * range[1] * range[2]) as usize * element_size;
        self.buffers.insert(
            bid,
            HostBuffer {
                range,
                element_size,
                data: vec![0; len],
            },
        );
    }

    /// Overwrites the whole buffer from a typed slice.
    pub fn write_slice<T: bytemuck::Pod>(
        &mut self,
        bid: BufferId,
        src: &[T],
    ) -> Result<(), StorageError> {
        let buffer = self
            .buffers
            .get_mut(&bid)
            .ok_or(StorageError::UnknownBuffer(bid))?;
        let bytes: &[u8] = bytemuck::cast_slice(src);
        if bytes.len() != buffer.data.len() {
            return Err(StorageError::SizeMismatch {
                expected: buffer.data.len(),
                actual: bytes.len(),
            });
        }
        buffer.data.copy_from_slice(bytes);
        Ok(())
    }

    /// Reads the whole buffer into a typed vector.
    pub fn read_vec<T: bytemuck::Pod>(&self, bid: BufferId) -> Result<Vec<T>, StorageError> {
        let buffer = self
            .buffers
            .get(&bid)
            .ok_or(StorageError::UnknownBuffer(bid))?;
        Ok(bytemuck::cast_slice(&buffer.data).to_vec())
    }
}

fn check_bounds(bid: BufferId, buffer: &HostBuffer, offset: [u64; 3], range: [u64; 3])
    -> Result<(), StorageError> {
    for axis in 0..3 {
        let end = offset[axis]
            .checked_add(range[axis])
            .ok_or(StorageError::OutOfBounds { bid })?;
        if end > buffer.range[axis] {
            return Err(StorageError::OutOfBounds { bid });
        }
    }
    Ok(())
}

impl BufferStorage for HostStorage {
    fn element_size(&self, bid: BufferId) -> Result<usize, StorageError> {
        self.buffers
            .get(&bid)
            .map(|buffer| buffer.element_size)
            .ok_or(StorageError::UnknownBuffer(bid))
    }

    fn buffer_range(&self, bid: BufferId) -> Result<[u64; 3], StorageError> {
        self.buffers
            .get(&bid)
            .map(|buffer| buffer.range)
            .ok_or(StorageError::UnknownBuffer(bid))
    }

    fn get_data(
        &self,
        bid: BufferId,
        offset: [u64; 3],
        range: [u64; 3],
    ) -> Result<Bytes, StorageError> {
        let buffer = self
            .buffers
            .get(&bid)
            .ok_or(StorageError::UnknownBuffer(bid))?;
        check_bounds(bid, buffer, offset, range)?;
        let elem = buffer.element_size;
        let row = range[2] as usize * elem;
        let mut out = Vec::with_capacity((range[0] * range[1]) as usize * row);
        for i0 in 0..range[0] {
            for i1 in 0..range[1] {
                let start = (((offset[0] + i0) * buffer.range[1] + (offset[1] + i1))
                    * buffer.range[2]
                    + offset[2]) as usize
                    * elem;
                out.extend_from_slice(&buffer.data[start..start + row]);
            }
        }
        Ok(Bytes::from(out))
    }

    fn set_data(&mut self, bid: BufferId, chunk: &DataChunk) -> Result<(), StorageError> {
        let buffer = self
            .buffers
            .get_mut(&bid)
            .ok_or(StorageError::UnknownBuffer(bid))?;
        check_bounds(bid, buffer, chunk.offset, chunk.range)?;
        let elem = buffer.element_size;
        let row = chunk.range[2] as usize * elem;
        let expected = (chunk.range[0] * chunk.range[1]) as usize * row;
        if chunk.bytes.len() != expected {
            return Err(StorageError::SizeMismatch {
                expected,
                actual: chunk.bytes.len(),
            });
        }
        let mut cursor = 0;
        for i0 in 0..chunk.range[0] {
            for i1 in 0..chunk.range[1] {
                let start = (((chunk.offset[0] + i0) * buffer.range[1] + (chunk.offset[1] + i1))
                    * buffer.range[2]
                    + chunk.offset[2]) as usize
                    * elem;
                buffer.data[start..start + row]
                    .copy_from_slice(&chunk.bytes[cursor..cursor + row]);
                cursor += row;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_dimensional_round_trip() {
        let bid = BufferId(0);
        let mut storage = HostStorage::new();
        storage.allocate(bid, [8, 1, 1], 4);
        let values: Vec<f32> = (0..8).map(|i| i as f32).collect();
        storage.write_slice(bid, &values).unwrap();

        let slab = storage.get_data(bid, [2, 0, 0], [4, 1, 1]).unwrap();
        let floats: &[f32] = bytemuck::cast_slice(&slab);
        assert_eq!(floats, &[2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn strided_write_lands_at_the_declared_offset() {
        let bid = BufferId(1);
        let mut storage = HostStorage::new();
        storage.allocate(bid, [4, 4, 1], 1);

        // Write a 2x2 block into the middle.
        let chunk = DataChunk {
            bytes: Bytes::from_static(&[9, 9, 9, 9]),
            offset: [1, 1, 0],
            range: [2, 2, 1],
        };
        storage.set_data(bid, &chunk).unwrap();

        let all = storage.read_vec::<u8>(bid).unwrap();
        #[rustfmt::skip]
        let expected = vec![
            0, 0, 0, 0,
            0, 9, 9, 0,
            0, 9, 9, 0,
            0, 0, 0, 0,
        ];
        assert_eq!(all, expected);
    }

    #[test]
    fn strided_read_matches_row_major_order() {
        let bid = BufferId(2);
        let mut storage = HostStorage::new();
        storage.allocate(bid, [3, 3, 1], 1);
        let values: Vec<u8> = (0..9).collect();
        storage.write_slice(bid, &values).unwrap();

        let slab = storage.get_data(bid, [0, 1, 0], [2, 2, 1]).unwrap();
        assert_eq!(slab.as_ref(), &[1, 2, 4, 5]);
    }

    #[test]
    fn out_of_bounds_access_is_rejected() {
        let bid = BufferId(3);
        let mut storage = HostStorage::new();
        storage.allocate(bid, [4, 1, 1], 1);
        let err = storage.get_data(bid, [2, 0, 0], [4, 1, 1]).unwrap_err();
        assert_eq!(err, StorageError::OutOfBounds { bid });
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let bid = BufferId(4);
        let mut storage = HostStorage::new();
        storage.allocate(bid, [4, 1, 1], 1);
        let chunk = DataChunk {
            bytes: Bytes::from_static(&[1, 2]),
            offset: [0, 0, 0],
            range: [4, 1, 1],
        };
        assert!(matches!(
            storage.set_data(bid, &chunk),
            Err(StorageError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn unknown_buffer_is_rejected() {
        let storage = HostStorage::new();
        assert_eq!(
            storage.get_data(BufferId(9), [0; 3], [1; 3]).unwrap_err(),
            StorageError::UnknownBuffer(BufferId(9))
        );
    }
}
