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

//! Log file reader (spec §4.4 "Log reader"): stitches 32 KiB blocks of
//! `FULL`/`FIRST`/`MIDDLE`/`LAST` fragments into batch payloads, then
//! decodes each payload's `{seq_num, rec_count}` header and its records.
//!
//! Grounded on `dissect/database/leveldb/leveldb.py: LogFile`, `LogBlock`
//! and `c_leveldb.py`'s `LogBlockHeader` / `BatchHeader` / `Record` structs.

use std::collections::VecDeque;
use std::io::Read;

use crc::{Crc, CRC_32_ISCSI};

use crate::leveldb::{Record, RecordState};
use crate::util::coding::{decode_fixed_32, decode_fixed_64};
use crate::util::status::{Error, Result, Status};
use crate::util::varint::VarintU64;

/// LevelDB log blocks are fixed 32 KiB, independent of the underlying
/// filesystem's block size.
pub const LOG_BLOCK_SIZE: usize = 0x8000;
const FRAGMENT_HEADER_SIZE: usize = 7;

static CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Computes the CRC32C of a fragment's type byte and body, for callers
/// that want to corroborate a fragment's stored checksum. Decoding never
/// calls this itself (spec §7: "Checksum verification is optional").
pub fn verify_fragment_crc(expected: u32, fragment_type_byte: u8, body: &[u8]) -> bool {
    let mut digest = CRC32C.digest();
    digest.update(&[fragment_type_byte]);
    digest.update(body);
    digest.finalize() == expected
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FragmentType {
    Full = 1,
    First = 2,
    Middle = 3,
    Last = 4,
}

impl FragmentType {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            1 => Ok(FragmentType::Full),
            2 => Ok(FragmentType::First),
            3 => Ok(FragmentType::Middle),
            4 => Ok(FragmentType::Last),
            other => Err(Error::new(Status::Corruption, Some(&format!("unknown log fragment type {other}")))),
        }
    }
}

/// A `*.log` file, read one 32 KiB block at a time and stitched into a
/// flat stream of batch payloads.
pub struct LogFile<R> {
    fh: R,
    chunk: Vec<u8>,
    chunk_pos: usize,
    chunk_len: usize,
    pending: Option<Vec<u8>>,
    eof: bool,
}

impl<R: Read> LogFile<R> {
    pub fn new(fh: R) -> Self {
        LogFile {
            fh,
            chunk: vec![0u8; LOG_BLOCK_SIZE],
            chunk_pos: 0,
            chunk_len: 0,
            pending: None,
            eof: false,
        }
    }

    fn refill_chunk(&mut self) -> Result<bool> {
        let mut total = 0;
        while total < LOG_BLOCK_SIZE {
            match self.fh.read(&mut self.chunk[total..])? {
                0 => break,
                n => total += n,
            }
        }
        self.chunk_len = total;
        self.chunk_pos = 0;
        Ok(total > 0)
    }

    /// Returns the next stitched batch payload, or `None` at end of
    /// stream. Fragments never cross chunk boundaries; trailing padding
    /// too short to hold a header (or a zero type byte) ends the chunk
    /// rather than erroring.
    fn next_payload(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if self.chunk_pos + FRAGMENT_HEADER_SIZE > self.chunk_len {
                if self.eof {
                    return Ok(None);
                }
                if !self.refill_chunk()? {
                    self.eof = true;
                    return Ok(None);
                }
                continue;
            }

            let header = &self.chunk[self.chunk_pos..self.chunk_pos + FRAGMENT_HEADER_SIZE];
            let _crc32c = decode_fixed_32(&header[0..4]);
            let size = u16::from_le_bytes([header[4], header[5]]) as usize;
            let type_byte = header[6];

            if type_byte == 0 {
                // trailing zero padding: nothing more fits in this chunk
                self.chunk_pos = self.chunk_len;
                continue;
            }
            let frag_type = FragmentType::from_byte(type_byte)?;

            let body_start = self.chunk_pos + FRAGMENT_HEADER_SIZE;
            let body_end = body_start + size;
            if body_end > self.chunk_len {
                self.eof = true;
                return Ok(None);
            }
            let body = &self.chunk[body_start..body_end];
            self.chunk_pos = body_end;

            match frag_type {
                FragmentType::Full => {
                    self.pending = None;
                    return Ok(Some(body.to_vec()));
                }
                FragmentType::First => {
                    // a FIRST arriving over a pending buffer discards it
                    // (spec: "treated as truncation")
                    self.pending = Some(body.to_vec());
                }
                FragmentType::Middle => {
                    if let Some(buf) = self.pending.as_mut() {
                        buf.extend_from_slice(body);
                    }
                }
                FragmentType::Last => {
                    if let Some(mut buf) = self.pending.take() {
                        buf.extend_from_slice(body);
                        return Ok(Some(buf));
                    }
                }
            }
        }
    }

    /// Consumes this log file, returning a flat iterator of decoded
    /// records across all its batches.
    pub fn records(self) -> LogRecords<R> {
        LogRecords {
            log: self,
            queue: VecDeque::new(),
        }
    }
}

impl<R: Read> Iterator for LogFile<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_payload().transpose()
    }
}

/// Decodes one batch payload's `{seq_num:u64, rec_count:u32}` header and
/// its `rec_count` records. Every record in the batch gets the batch's
/// `seq_num` as its `sequence` by default (Open Question (a)); callers
/// wanting the stricter `seq_num + index` convention can recompute it via
/// [`Record::sequence_within_batch`].
fn parse_batch(payload: &[u8]) -> Result<Vec<Record>> {
    if payload.len() < 12 {
        return Err(Error::new(Status::Truncation, Some("log batch payload shorter than its header")));
    }
    let seq_num = decode_fixed_64(&payload[0..8]);
    let rec_count = decode_fixed_32(&payload[8..12]);
    let mut pos = 12usize;
    let mut records = Vec::with_capacity(rec_count as usize);

    for _ in 0..rec_count {
        let state_byte = *payload
            .get(pos)
            .ok_or_else(|| Error::new(Status::Truncation, Some("truncated log record state byte")))?;
        pos += 1;
        let state = match state_byte {
            0 => RecordState::Deleted,
            1 => RecordState::Live,
            other => return Err(Error::new(Status::Corruption, Some(&format!("unknown log record state {other}")))),
        };

        let (key_len, n) =
            VarintU64::read(&payload[pos..]).ok_or_else(|| Error::new(Status::Truncation, Some("truncated log record key length")))?;
        pos += n;
        let key_end = pos + key_len as usize;
        if key_end > payload.len() {
            return Err(Error::new(Status::Truncation, Some("log record key runs past batch payload")));
        }
        let key = payload[pos..key_end].to_vec();
        pos = key_end;

        let value = if state == RecordState::Deleted {
            None
        } else {
            let (value_len, n) = VarintU64::read(&payload[pos..])
                .ok_or_else(|| Error::new(Status::Truncation, Some("truncated log record value length")))?;
            pos += n;
            let value_end = pos + value_len as usize;
            if value_end > payload.len() {
                return Err(Error::new(Status::Truncation, Some("log record value runs past batch payload")));
            }
            let value = payload[pos..value_end].to_vec();
            pos = value_end;
            Some(value)
        };

        records.push(Record {
            key,
            value,
            state,
            sequence: Some(seq_num),
        });
    }

    Ok(records)
}

/// Flat iterator over every record in a log file's batches. A corrupt
/// batch surfaces one `Err` item and decoding resumes with the next
/// batch, consistent with the per-item resilience used by the SQLite3
/// B-tree walk.
pub struct LogRecords<R> {
    log: LogFile<R>,
    queue: VecDeque<Result<Record>>,
}

impl<R: Read> Iterator for LogRecords<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(r) = self.queue.pop_front() {
                return Some(r);
            }
            match self.log.next()? {
                Ok(payload) => match parse_batch(&payload) {
                    Ok(records) => self.queue.extend(records.into_iter().map(Ok)),
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fragment(fragment_type: u8, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0u32.to_le_bytes()); // crc32c, unchecked by decoding
        out.extend_from_slice(&(body.len() as u16).to_le_bytes());
        out.push(fragment_type);
        out.extend_from_slice(body);
        out
    }

    fn batch_payload(seq_num: u64, records: &[(RecordState, &[u8], Option<&[u8]>)]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&seq_num.to_le_bytes());
        payload.extend_from_slice(&(records.len() as u32).to_le_bytes());
        for (state, key, value) in records {
            payload.push(match state {
                RecordState::Deleted => 0,
                RecordState::Live => 1,
                RecordState::Unknown => unreachable!("log records never carry Unknown"),
            });
            VarintU64::put_varint(&mut payload, key.len() as u64);
            payload.extend_from_slice(key);
            if let Some(value) = value {
                VarintU64::put_varint(&mut payload, value.len() as u64);
                payload.extend_from_slice(value);
            }
        }
        payload
    }

    #[test]
    fn full_fragment_round_trips_a_single_record_batch() {
        let payload = batch_payload(7, &[(RecordState::Live, b"k1", Some(b"v1"))]);
        let mut block = fragment(1, &payload);
        block.resize(LOG_BLOCK_SIZE, 0);

        let log = LogFile::new(Cursor::new(block));
        let records: Vec<_> = log.records().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, b"k1");
        assert_eq!(records[0].value, Some(b"v1".to_vec()));
        assert_eq!(records[0].sequence, Some(7));
        assert_eq!(records[0].state, RecordState::Live);
    }

    #[test]
    fn deleted_record_carries_no_value() {
        let payload = batch_payload(1, &[(RecordState::Deleted, b"gone", None)]);
        let mut block = fragment(1, &payload);
        block.resize(LOG_BLOCK_SIZE, 0);

        let log = LogFile::new(Cursor::new(block));
        let records: Vec<_> = log.records().collect::<Result<_>>().unwrap();
        assert_eq!(records[0].state, RecordState::Deleted);
        assert_eq!(records[0].value, None);
    }

    #[test]
    fn s7_first_last_stitch_across_two_blocks() {
        let payload = batch_payload(42, &[(RecordState::Live, b"split-key", Some(b"split-value"))]);
        let (first_half, last_half) = payload.split_at(payload.len() / 2);

        let mut block_a = fragment(2, first_half); // FIRST
        block_a.resize(LOG_BLOCK_SIZE, 0);
        let mut block_b = fragment(4, last_half); // LAST
        block_b.resize(LOG_BLOCK_SIZE, 0);

        let mut stream = block_a;
        stream.extend_from_slice(&block_b);

        let log = LogFile::new(Cursor::new(stream));
        let records: Vec<_> = log.records().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, b"split-key");
        assert_eq!(records[0].value, Some(b"split-value".to_vec()));
    }

    #[test]
    fn middle_fragment_stitches_three_way_split() {
        let payload = batch_payload(9, &[(RecordState::Live, b"abcdefghij", Some(b"0123456789"))]);
        let third = payload.len() / 3;
        let (a, rest) = payload.split_at(third);
        let (b, c) = rest.split_at(third);

        let mut block = fragment(2, a); // FIRST
        block.extend_from_slice(&fragment(3, b)); // MIDDLE
        block.extend_from_slice(&fragment(4, c)); // LAST
        block.resize(LOG_BLOCK_SIZE, 0);

        let log = LogFile::new(Cursor::new(block));
        let records: Vec<_> = log.records().collect::<Result<_>>().unwrap();
        assert_eq!(records[0].key, b"abcdefghij");
        assert_eq!(records[0].value, Some(b"0123456789".to_vec()));
    }

    #[test]
    fn verify_fragment_crc_matches_computed_checksum() {
        let body = b"payload bytes";
        let mut digest = CRC32C.digest();
        digest.update(&[1u8]);
        digest.update(body);
        let expected = digest.finalize();
        assert!(verify_fragment_crc(expected, 1, body));
        assert!(!verify_fragment_crc(expected.wrapping_add(1), 1, body));
    }
}
