// Copyright 2019 Fullstop000 <fullstop1005@gmail.com>.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

//! Block decoding: a `BlockHandle`-addressed span of a sorted-table
//! file, its optional Snappy decompression, and its key-prefix-compressed
//! entries.
//!
//! Grounded on the teacher's `sstable/mod.rs` module doc comments (block
//! layout, trailer, restart array) and `dissect/database/leveldb/leveldb.py:
//! LdbBlock`.

use std::io::{Read, Seek, SeekFrom};

use crate::leveldb::snappy;
use crate::util::coding::decode_fixed_32;
use crate::util::status::{Error, Result, Status};
use crate::util::varint::VarintU64;

/// Block trailer size: 1-byte compression type + 4-byte CRC32C.
pub const BLOCK_TRAILER_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Snappy,
}

impl CompressionType {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Snappy),
            other => Err(Error::new(Status::InvalidBlock, Some(&format!("unknown compression type byte {other}")))),
        }
    }
}

/// A pointer to the extent of a file that stores a data or meta block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Decodes a `BlockHandle` from varint-encoded `offset`/`size`.
    pub fn decode_from(src: &[u8]) -> Result<(Self, usize)> {
        let (offset, n) = VarintU64::read(src).ok_or_else(|| Error::new(Status::InvalidBlock, Some("bad block handle offset")))?;
        let (size, m) = VarintU64::read(&src[n..]).ok_or_else(|| Error::new(Status::InvalidBlock, Some("bad block handle size")))?;
        Ok((Self::new(offset, size), m + n))
    }
}

/// One decoded key/value entry within a block, with its key already
/// reconstructed from the shared-prefix encoding.
#[derive(Debug, Clone)]
pub struct BlockEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// A decoded block: entries plus whatever's needed to iterate them. The
/// restart array itself is not retained past iteration since nothing
/// downstream of this crate needs individual restart offsets.
pub struct Block {
    data: Vec<u8>,
    restart_offset: usize,
    restart_count: u32,
}

impl Block {
    /// Reads the block addressed by `handle` (data + trailer), verifying
    /// the trailer length, and decompresses it if Snappy-compressed.
    pub fn read<R: Read + Seek>(fh: &mut R, handle: BlockHandle) -> Result<Self> {
        fh.seek(SeekFrom::Start(handle.offset))?;
        let mut raw = vec![0u8; handle.size as usize];
        fh.read_exact(&mut raw)
            .map_err(|_| Error::new(Status::Truncation, Some("short read for block data")))?;

        let mut trailer = [0u8; BLOCK_TRAILER_SIZE];
        fh.read_exact(&mut trailer)
            .map_err(|_| Error::new(Status::Truncation, Some("short read for block trailer")))?;

        let compression = CompressionType::from_byte(trailer[0])?;
        let data = match compression {
            CompressionType::None => raw,
            CompressionType::Snappy => snappy::decompress(&raw)?,
        };

        Self::from_decompressed(data)
    }

    fn from_decompressed(data: Vec<u8>) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::new(Status::InvalidBlock, Some("block too small to hold a restart array")));
        }
        let restart_count = decode_fixed_32(&data[data.len() - 4..]);
        let restart_offset = data
            .len()
            .checked_sub(4 * (restart_count as usize + 1))
            .ok_or_else(|| Error::new(Status::InvalidBlock, Some("restart array malformed")))?;

        Ok(Block {
            data,
            restart_offset,
            restart_count,
        })
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    /// Iterates entries from the first restart point (offset 0, which by
    /// spec always has `shared_len == 0`) through the end of the entry
    /// region, rebuilding each full key from the rolling prefix.
    pub fn entries(&self) -> Result<Vec<BlockEntry>> {
        let mut out = Vec::new();
        let mut pos = 0usize;
        let mut key: Vec<u8> = Vec::new();

        while pos < self.restart_offset {
            let (shared_len, n) = VarintU64::read(&self.data[pos..])
                .ok_or_else(|| Error::new(Status::InvalidBlock, Some("truncated block entry header")))?;
            pos += n;
            let (non_shared_len, n) = VarintU64::read(&self.data[pos..])
                .ok_or_else(|| Error::new(Status::InvalidBlock, Some("truncated block entry header")))?;
            pos += n;
            let (value_len, n) = VarintU64::read(&self.data[pos..])
                .ok_or_else(|| Error::new(Status::InvalidBlock, Some("truncated block entry header")))?;
            pos += n;

            if shared_len as usize > key.len() {
                return Err(Error::new(
                    Status::InvalidBlock,
                    Some("shared key length is longer than the previous key"),
                ));
            }

            let suffix_end = pos + non_shared_len as usize;
            if suffix_end > self.restart_offset {
                return Err(Error::new(Status::InvalidBlock, Some("block entry key runs past restart offset")));
            }
            let mut new_key = key[..shared_len as usize].to_vec();
            new_key.extend_from_slice(&self.data[pos..suffix_end]);
            pos = suffix_end;

            let value_end = pos + value_len as usize;
            if value_end > self.restart_offset {
                return Err(Error::new(Status::InvalidBlock, Some("block entry value runs past restart offset")));
            }
            let value = self.data[pos..value_end].to_vec();
            pos = value_end;

            key = new_key.clone();
            out.push(BlockEntry { key: new_key, value });
        }

        Ok(out)
    }
}
