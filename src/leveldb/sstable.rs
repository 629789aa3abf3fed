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

//! Sorted-table (`.ldb`/`.sst`) reader (spec §4.4 "Sorted-table reader"):
//! footer location, meta-index and index block reading, and data-block
//! entry iteration with internal-key trailer decoding.
//!
//! Grounded on the teacher's `sstable/mod.rs` doc comments (footer/magic
//! layout) and `dissect/database/leveldb/leveldb.py: LdbFile`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crc::{Crc, CRC_32_ISCSI};

use crate::leveldb::block::{Block, BlockEntry, BlockHandle};
use crate::leveldb::{Record, RecordState};
use crate::util::coding::decode_fixed_64;
use crate::util::status::{Error, Result, Status};

/// Fixed footer size: two `BlockHandle`s, zero padding, and an 8-byte
/// magic, always exactly this many bytes regardless of how short the
/// encoded handles are.
pub const FOOTER_SIZE: usize = 48;
/// Trailing magic identifying a LevelDB sorted-table file.
pub const LDB_MAGIC: u64 = 0xdb4775248b80fb57;

static CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Computes the CRC32C of a block's compression byte and (compressed)
/// data, for callers that want to corroborate a block's stored trailer
/// checksum. Decoding never calls this itself (spec §7).
pub fn verify_block_crc(expected: u32, compression_byte: u8, compressed_data: &[u8]) -> bool {
    let mut digest = CRC32C.digest();
    digest.update(&[compression_byte]);
    digest.update(compressed_data);
    digest.finalize() == expected
}

struct Footer {
    meta_index_handle: BlockHandle,
    index_handle: BlockHandle,
}

impl Footer {
    fn decode_from(buf: &[u8; FOOTER_SIZE]) -> Result<Self> {
        let magic = decode_fixed_64(&buf[FOOTER_SIZE - 8..]);
        if magic != LDB_MAGIC {
            return Err(Error::new(Status::InvalidDatabase, Some("sorted-table footer magic mismatch")));
        }
        let (meta_index_handle, n) = BlockHandle::decode_from(&buf[..])?;
        let (index_handle, _) = BlockHandle::decode_from(&buf[n..])?;
        Ok(Footer {
            meta_index_handle,
            index_handle,
        })
    }
}

/// An opened `.ldb`/`.sst` file: footer located, meta-index and index
/// blocks read. Data blocks are read lazily per index entry.
pub struct SortedTableFile<R> {
    fh: R,
    index_block: Block,
    #[allow(dead_code)]
    meta_index_block: Block,
}

impl SortedTableFile<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }
}

impl<R: Read + Seek> SortedTableFile<R> {
    pub fn from_reader(mut fh: R) -> Result<Self> {
        let file_len = fh.seek(SeekFrom::End(0))?;
        if file_len < FOOTER_SIZE as u64 {
            return Err(Error::new(Status::InvalidDatabase, Some("file too short to hold a sorted-table footer")));
        }
        fh.seek(SeekFrom::Start(file_len - FOOTER_SIZE as u64))?;
        let mut footer_buf = [0u8; FOOTER_SIZE];
        fh.read_exact(&mut footer_buf)
            .map_err(|_| Error::new(Status::Truncation, Some("short read for sorted-table footer")))?;
        let footer = Footer::decode_from(&footer_buf)?;

        let meta_index_block = Block::read(&mut fh, footer.meta_index_handle)?;
        let index_block = Block::read(&mut fh, footer.index_handle)?;

        Ok(SortedTableFile {
            fh,
            index_block,
            meta_index_block,
        })
    }

    /// Iterates every data-block entry addressed by the index block, in
    /// index order (key-sorted), deriving a `Record` from each.
    pub fn records(&mut self) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        for index_entry in self.index_block.entries()? {
            let (handle, _) = BlockHandle::decode_from(&index_entry.value)?;
            let data_block = Block::read(&mut self.fh, handle)?;
            for entry in data_block.entries()? {
                out.push(record_from_entry(entry));
            }
        }
        Ok(out)
    }
}

/// Derives a `Record` from a data-block entry: the trailing 8 bytes of
/// the key are the internal-key trailer (last byte = state, the full
/// 8-byte little-endian integer shifted right 8 bits = sequence); keys
/// of 8 bytes or fewer cannot carry a trailer and yield `Unknown` state.
fn record_from_entry(entry: BlockEntry) -> Record {
    if entry.key.len() <= 8 {
        return Record {
            key: entry.key,
            value: Some(entry.value),
            state: RecordState::Unknown,
            sequence: None,
        };
    }

    let split = entry.key.len() - 8;
    let trailer = decode_fixed_64(&entry.key[split..]);
    let state = if entry.key[split] == 0 { RecordState::Deleted } else { RecordState::Live };
    let sequence = trailer >> 8;

    Record {
        key: entry.key[..split].to_vec(),
        value: Some(entry.value),
        state,
        sequence: Some(sequence),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::varint::VarintU64;
    use std::io::Cursor;

    fn internal_key(user_key: &[u8], sequence: u64, deleted: bool) -> Vec<u8> {
        let mut key = user_key.to_vec();
        let trailer = (sequence << 8) | if deleted { 0 } else { 1 };
        key.extend_from_slice(&trailer.to_le_bytes());
        key
    }

    fn make_block_bytes(entries: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut prev: Vec<u8> = Vec::new();
        for (key, value) in entries {
            let shared = key.iter().zip(prev.iter()).take_while(|(a, b)| a == b).count();
            let suffix = &key[shared..];
            VarintU64::put_varint(&mut data, shared as u64);
            VarintU64::put_varint(&mut data, suffix.len() as u64);
            VarintU64::put_varint(&mut data, value.len() as u64);
            data.extend_from_slice(suffix);
            data.extend_from_slice(value);
            prev = key.clone();
        }
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data
    }

    fn build_table(entries: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
        let data_block = make_block_bytes(entries);
        let mut file = Vec::new();
        file.extend_from_slice(&data_block);
        file.push(0); // compression = none
        file.extend_from_slice(&0u32.to_le_bytes()); // unchecked crc32c

        let data_handle_offset = 0u64;
        let data_handle_size = data_block.len() as u64;

        let index_key = b"index-entry".to_vec();
        let mut index_value = Vec::new();
        VarintU64::put_varint(&mut index_value, data_handle_offset);
        VarintU64::put_varint(&mut index_value, data_handle_size);
        let index_block = make_block_bytes(&[(index_key, index_value)]);
        let index_block_offset = file.len() as u64;
        file.extend_from_slice(&index_block);
        file.push(0);
        file.extend_from_slice(&0u32.to_le_bytes());

        let meta_index_block = make_block_bytes(&[]);
        let meta_index_offset = file.len() as u64;
        file.extend_from_slice(&meta_index_block);
        file.push(0);
        file.extend_from_slice(&0u32.to_le_bytes());

        let mut footer = Vec::new();
        VarintU64::put_varint(&mut footer, meta_index_offset);
        VarintU64::put_varint(&mut footer, meta_index_block.len() as u64);
        VarintU64::put_varint(&mut footer, index_block_offset);
        VarintU64::put_varint(&mut footer, index_block.len() as u64);
        footer.resize(FOOTER_SIZE - 8, 0);
        footer.extend_from_slice(&LDB_MAGIC.to_le_bytes());

        file.extend_from_slice(&footer);
        file
    }

    #[test]
    fn reads_footer_and_derives_records_from_the_index() {
        let key = internal_key(b"alpha", 5, false);
        let bytes = build_table(&[(key, b"value-a".to_vec())]);

        let mut table = SortedTableFile::from_reader(Cursor::new(bytes)).unwrap();
        let records = table.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, b"alpha");
        assert_eq!(records[0].value, Some(b"value-a".to_vec()));
        assert_eq!(records[0].state, RecordState::Live);
        assert_eq!(records[0].sequence, Some(5));
    }

    #[test]
    fn deleted_state_decoded_from_trailer_low_byte() {
        let key = internal_key(b"gone", 9, true);
        let bytes = build_table(&[(key, Vec::new())]);

        let mut table = SortedTableFile::from_reader(Cursor::new(bytes)).unwrap();
        let records = table.records().unwrap();
        assert_eq!(records[0].state, RecordState::Deleted);
    }

    #[test]
    fn short_key_yields_unknown_state() {
        let bytes = build_table(&[(b"tiny".to_vec(), b"v".to_vec())]);
        let mut table = SortedTableFile::from_reader(Cursor::new(bytes)).unwrap();
        let records = table.records().unwrap();
        assert_eq!(records[0].state, RecordState::Unknown);
        assert_eq!(records[0].sequence, None);
    }

    #[test]
    fn bad_magic_is_invalid_database() {
        let mut bytes = build_table(&[(internal_key(b"k", 1, false), b"v".to_vec())]);
        let len = bytes.len();
        bytes[len - 1] ^= 0xff;
        let err = SortedTableFile::from_reader(Cursor::new(bytes)).unwrap_err();
        assert_eq!(err.status(), Status::InvalidDatabase);
    }
}
