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

//! Write-ahead log reader (spec §4.3 "WAL"): header, sequential frame
//! access with a bounded cache, and checkpoint grouping. Frames are
//! surfaced but never applied onto the main database (non-goal).
//!
//! Grounded on `dissect/sql/sqlite3.py:WAL`/`WALFrame`/`WALCheckpoint`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use crate::util::cache::LruCache;
use crate::util::coding::be_u32;
use crate::util::status::{Error, Result, Status};

pub const WAL_HEADER_SIZE: usize = 32;
pub const WAL_FRAME_HEADER_SIZE: usize = 24;
pub const WAL_MAGIC_LE_CHECKSUM: u32 = 0x377F_0682;
pub const WAL_MAGIC_BE_CHECKSUM: u32 = 0x377F_0683;

/// Default bounded frame-cache capacity (§5).
pub const WAL_FRAME_CACHE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumEndian {
    Little,
    Big,
}

#[derive(Debug, Clone)]
pub struct WalHeader {
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    pub checkpoint_sequence_number: u32,
    pub salt1: u32,
    pub salt2: u32,
    pub checksum1: u32,
    pub checksum2: u32,
}

impl WalHeader {
    fn parse(buf: &[u8; WAL_HEADER_SIZE]) -> Self {
        WalHeader {
            magic: be_u32(&buf[0..4]),
            version: be_u32(&buf[4..8]),
            page_size: be_u32(&buf[8..12]),
            checkpoint_sequence_number: be_u32(&buf[12..16]),
            salt1: be_u32(&buf[16..20]),
            salt2: be_u32(&buf[20..24]),
            checksum1: be_u32(&buf[24..28]),
            checksum2: be_u32(&buf[28..32]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalFrameHeader {
    pub page_number: u32,
    pub page_count: u32,
    pub salt1: u32,
    pub salt2: u32,
    pub checksum1: u32,
    pub checksum2: u32,
}

impl WalFrameHeader {
    fn parse(buf: &[u8; WAL_FRAME_HEADER_SIZE]) -> Self {
        WalFrameHeader {
            page_number: be_u32(&buf[0..4]),
            page_count: be_u32(&buf[4..8]),
            salt1: be_u32(&buf[8..12]),
            salt2: be_u32(&buf[12..16]),
            checksum1: be_u32(&buf[16..20]),
            checksum2: be_u32(&buf[20..24]),
        }
    }
}

/// One WAL frame: its header plus the page image that follows it.
#[derive(Debug, Clone)]
pub struct WalFrame {
    pub header: WalFrameHeader,
    pub data: Vec<u8>,
}

impl WalFrame {
    pub fn page_number(&self) -> u32 {
        self.header.page_number
    }

    pub fn page_count(&self) -> u32 {
        self.header.page_count
    }

    /// A frame is valid iff its salts match the WAL header's salts.
    pub fn is_valid(&self, wal_header: &WalHeader) -> bool {
        self.header.salt1 == wal_header.salt1 && self.header.salt2 == wal_header.salt2
    }
}

/// A maximal contiguous run of frames ending in a commit frame
/// (`page_count != 0`); exposes a `page_number -> frame` mapping where
/// the last write within the run wins.
#[derive(Debug, Clone)]
pub struct WalCheckpoint {
    pub frames: Vec<WalFrame>,
    page_map: HashMap<u32, usize>,
}

impl WalCheckpoint {
    fn new(frames: Vec<WalFrame>) -> Self {
        let mut page_map = HashMap::new();
        for (i, frame) in frames.iter().enumerate() {
            page_map.insert(frame.page_number(), i);
        }
        WalCheckpoint { frames, page_map }
    }

    pub fn get(&self, page: u32) -> Option<&WalFrame> {
        self.page_map.get(&page).map(|&i| &self.frames[i])
    }

    pub fn contains(&self, page: u32) -> bool {
        self.page_map.contains_key(&page)
    }
}

pub struct Wal<R> {
    fh: RefCell<R>,
    pub header: WalHeader,
    pub checksum_endian: ChecksumEndian,
    frame_cache: RefCell<LruCache<u64, std::rc::Rc<WalFrame>>>,
}

impl<R: Read + Seek> Wal<R> {
    pub fn open(fh: R) -> Result<Self> {
        Self::with_frame_cache_capacity(fh, WAL_FRAME_CACHE_CAPACITY)
    }

    pub fn with_frame_cache_capacity(mut fh: R, frame_cache_capacity: usize) -> Result<Self> {
        fh.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; WAL_HEADER_SIZE];
        fh.read_exact(&mut buf)
            .map_err(|_| Error::new(Status::InvalidDatabase, Some("WAL file shorter than the 32-byte header")))?;
        let header = WalHeader::parse(&buf);

        let checksum_endian = match header.magic {
            WAL_MAGIC_LE_CHECKSUM => ChecksumEndian::Little,
            WAL_MAGIC_BE_CHECKSUM => ChecksumEndian::Big,
            other => {
                return Err(Error::new(
                    Status::InvalidDatabase,
                    Some(&format!("invalid WAL header magic 0x{other:08x}")),
                ))
            }
        };

        Ok(Wal {
            fh: RefCell::new(fh),
            header,
            checksum_endian,
            frame_cache: RefCell::new(LruCache::new(frame_cache_capacity)),
        })
    }

    /// Reads (or returns the cached reading of) the 0-indexed frame.
    /// Returns `Ok(None)` once iteration reaches EOF, matching the
    /// source's "iterate until short-read" termination (redesigned away
    /// from exception-driven control flow per spec REDESIGN FLAGS).
    pub fn frame(&self, frame_idx: u64) -> Result<Option<std::rc::Rc<WalFrame>>> {
        if let Some(f) = self.frame_cache.borrow_mut().get(&frame_idx) {
            return Ok(Some(f.clone()));
        }

        let frame_size = WAL_FRAME_HEADER_SIZE as u64 + self.header.page_size as u64;
        let offset = WAL_HEADER_SIZE as u64 + frame_idx * frame_size;

        let mut fh = self.fh.borrow_mut();
        fh.seek(SeekFrom::Start(offset))?;

        let mut header_buf = [0u8; WAL_FRAME_HEADER_SIZE];
        if fh.read_exact(&mut header_buf).is_err() {
            return Ok(None);
        }
        let header = WalFrameHeader::parse(&header_buf);

        let mut data = vec![0u8; self.header.page_size as usize];
        if fh.read_exact(&mut data).is_err() {
            return Ok(None);
        }

        let frame = std::rc::Rc::new(WalFrame { header, data });
        self.frame_cache.borrow_mut().put(frame_idx, frame.clone());
        Ok(Some(frame))
    }

    /// Iterates all frames sequentially until a short read (EOF).
    pub fn frames(&self) -> impl Iterator<Item = Result<std::rc::Rc<WalFrame>>> + '_ {
        let mut idx = 0u64;
        std::iter::from_fn(move || match self.frame(idx) {
            Ok(Some(f)) => {
                idx += 1;
                Some(Ok(f))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        })
    }

    /// Groups frames into checkpoints: a maximal contiguous run ending in
    /// a commit frame (`page_count != 0`).
    pub fn checkpoints(&self) -> Result<Vec<WalCheckpoint>> {
        let mut checkpoints = Vec::new();
        let mut pending = Vec::new();

        for frame in self.frames() {
            let frame = frame?;
            let commit = frame.page_count() != 0;
            pending.push((*frame).clone());
            if commit {
                checkpoints.push(WalCheckpoint::new(std::mem::take(&mut pending)));
            }
        }

        Ok(checkpoints)
    }
}

/// Ports the source's Fletcher-like WAL checksum (`wal_checksum` in the
/// original, explicitly "for future use"). `buf` must be a multiple of 4
/// bytes; `endian` selects how its 32-bit words are interpreted.
///
/// Supplemented feature (SPEC_FULL §B.4); not called by default decoding
/// since checksum verification is optional (spec §7).
pub fn wal_checksum(buf: &[u8], endian: ChecksumEndian) -> (u32, u32) {
    let mut s0: u32 = 0;
    let mut s1: u32 = 0;

    let words: Vec<u32> = buf
        .chunks_exact(4)
        .map(|c| {
            let arr: [u8; 4] = c.try_into().unwrap();
            match endian {
                ChecksumEndian::Little => u32::from_le_bytes(arr),
                ChecksumEndian::Big => be_u32(&arr),
            }
        })
        .collect();

    let mut i = 0;
    while i + 1 < words.len() {
        s0 = s0.wrapping_add(words[i].wrapping_add(s1));
        s1 = s1.wrapping_add(words[i + 1].wrapping_add(s0));
        i += 2;
    }

    (s0, s1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_wal(magic: u32, page_size: u32, salt1: u32, salt2: u32, frames: &[(u32, u32, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&magic.to_be_bytes());
        buf.extend_from_slice(&3007000u32.to_be_bytes());
        buf.extend_from_slice(&page_size.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&salt1.to_be_bytes());
        buf.extend_from_slice(&salt2.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());

        for &(page_number, page_count, page_data) in frames {
            buf.extend_from_slice(&page_number.to_be_bytes());
            buf.extend_from_slice(&page_count.to_be_bytes());
            buf.extend_from_slice(&salt1.to_be_bytes());
            buf.extend_from_slice(&salt2.to_be_bytes());
            buf.extend_from_slice(&0u32.to_be_bytes());
            buf.extend_from_slice(&0u32.to_be_bytes());
            let mut page = page_data.to_vec();
            page.resize(page_size as usize, 0);
            buf.extend_from_slice(&page);
        }

        buf
    }

    #[test]
    fn parses_header_and_selects_checksum_endian() {
        let buf = sample_wal(WAL_MAGIC_BE_CHECKSUM, 4096, 1, 2, &[]);
        let wal = Wal::open(Cursor::new(buf)).unwrap();
        assert_eq!(wal.checksum_endian, ChecksumEndian::Big);
        assert_eq!(wal.header.page_size, 4096);
    }

    #[test]
    fn invalid_magic_is_rejected() {
        let mut buf = sample_wal(WAL_MAGIC_BE_CHECKSUM, 4096, 1, 2, &[]);
        buf[0..4].copy_from_slice(&0u32.to_be_bytes());
        let err = Wal::open(Cursor::new(buf)).unwrap_err();
        assert_eq!(err.status(), Status::InvalidDatabase);
    }

    #[test]
    fn frames_iterate_until_short_read() {
        let buf = sample_wal(WAL_MAGIC_LE_CHECKSUM, 16, 1, 2, &[(1, 0, b"aaaa"), (2, 1, b"bbbb")]);
        let wal = Wal::open(Cursor::new(buf)).unwrap();
        let frames: Vec<_> = wal.frames().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].page_number(), 1);
        assert_eq!(frames[1].page_count(), 1);
    }

    #[test]
    fn s8_checkpoint_grouping() {
        let buf = sample_wal(
            WAL_MAGIC_LE_CHECKSUM,
            16,
            1,
            2,
            &[(1, 0, b"aaaa"), (2, 0, b"bbbb"), (3, 5, b"cccc")],
        );
        let wal = Wal::open(Cursor::new(buf)).unwrap();
        let checkpoints = wal.checkpoints().unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].frames.len(), 3);
        assert!(checkpoints[0].contains(1));
        assert!(checkpoints[0].contains(3));
    }

    #[test]
    fn frame_validity_checked_against_header_salts() {
        let buf = sample_wal(WAL_MAGIC_LE_CHECKSUM, 16, 1, 2, &[(1, 0, b"aaaa")]);
        let wal = Wal::open(Cursor::new(buf)).unwrap();
        let frame = wal.frame(0).unwrap().unwrap();
        assert!(frame.is_valid(&wal.header));
    }

    #[test]
    fn wal_checksum_is_deterministic() {
        let buf = [1u8, 0, 0, 0, 2, 0, 0, 0];
        let (s0, s1) = wal_checksum(&buf, ChecksumEndian::Little);
        let (s0_again, s1_again) = wal_checksum(&buf, ChecksumEndian::Little);
        assert_eq!((s0, s1), (s0_again, s1_again));
    }
}
