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

//! The 100-byte SQLite database header (`c_sqlite3.header` in the
//! original). Only the fields this crate actually consumes are kept as
//! named struct fields; the rest are retained as raw bytes for fidelity
//! but not individually decoded, since nothing downstream reads them.

use crate::util::coding::{be_u16, be_u32};
use crate::util::status::{Error, Result, Status};

pub const HEADER_SIZE: usize = 100;
pub const SQLITE3_HEADER_MAGIC: &[u8; 16] = b"SQLite format 3\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl TextEncoding {
    fn from_header_value(v: u32) -> Result<Self> {
        match v {
            1 => Ok(TextEncoding::Utf8),
            2 => Ok(TextEncoding::Utf16Le),
            3 => Ok(TextEncoding::Utf16Be),
            other => Err(Error::new(
                Status::InvalidDatabase,
                Some(&format!("unknown text encoding {other}")),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Header {
    pub magic: [u8; 16],
    pub page_size: u32,
    pub write_version: u8,
    pub read_version: u8,
    pub reserved_size: u8,
    pub max_embedded_payload_fraction: u8,
    pub min_embedded_payload_fraction: u8,
    pub leaf_payload_fraction: u8,
    pub change_counter: u32,
    pub page_count: u32,
    pub first_freelist_page: u32,
    pub freelist_page_count: u32,
    pub schema_cookie: u32,
    pub schema_format_number: u32,
    pub page_cache_size: u32,
    pub largest_root_btree_page: u32,
    pub text_encoding_raw: u32,
    pub user_version: u32,
    pub incremental_vacuum_mode: u32,
    pub application_id: u32,
    pub version_valid_for_number: u32,
    pub sqlite_version_number: u32,
}

impl Header {
    /// Parses the 100-byte database header from the first page of the
    /// file. Does not itself validate the magic; callers (the `Database`
    /// constructor) decide whether a mismatch is fatal.
    pub fn parse(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let mut magic = [0u8; 16];
        magic.copy_from_slice(&buf[0..16]);

        let header = Header {
            magic,
            page_size: be_u16(&buf[16..18]) as u32,
            write_version: buf[18],
            read_version: buf[19],
            reserved_size: buf[20],
            max_embedded_payload_fraction: buf[21],
            min_embedded_payload_fraction: buf[22],
            leaf_payload_fraction: buf[23],
            change_counter: be_u32(&buf[24..28]),
            page_count: be_u32(&buf[28..32]),
            first_freelist_page: be_u32(&buf[32..36]),
            freelist_page_count: be_u32(&buf[36..40]),
            schema_cookie: be_u32(&buf[40..44]),
            schema_format_number: be_u32(&buf[44..48]),
            page_cache_size: be_u32(&buf[48..52]),
            largest_root_btree_page: be_u32(&buf[52..56]),
            text_encoding_raw: be_u32(&buf[56..60]),
            user_version: be_u32(&buf[60..64]),
            incremental_vacuum_mode: be_u32(&buf[64..68]),
            application_id: be_u32(&buf[68..72]),
            version_valid_for_number: be_u32(&buf[92..96]),
            sqlite_version_number: be_u32(&buf[96..100]),
        };

        Ok(header)
    }

    pub fn text_encoding(&self) -> Result<TextEncoding> {
        TextEncoding::from_header_value(self.text_encoding_raw)
    }

    /// The declared page size, with the header's `1` sentinel expanded to
    /// 65536 as SQLite specifies.
    pub fn page_size(&self) -> u32 {
        if self.page_size == 1 {
            65536
        } else {
            self.page_size
        }
    }
}
