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

//! The SQLite3 database engine: header, page cache, B-tree walk, record
//! decoding, row materialization, and an optional write-ahead log reader.

mod btree;
mod cell;
mod database;
mod header;
mod page;
mod record;
mod row;
mod table;
mod wal;

pub use cell::Cell;
pub use database::{Database, PAGE_CACHE_CAPACITY};
pub use header::{Header, TextEncoding, HEADER_SIZE, SQLITE3_HEADER_MAGIC};
pub use page::{Page, PageHeader, PageType};
pub use record::{read_record, Record};
pub use row::Row;
pub use table::{Index, Table};
pub use wal::{
    wal_checksum, ChecksumEndian, Wal, WalCheckpoint, WalFrame, WalFrameHeader, WalHeader,
    WAL_FRAME_CACHE_CAPACITY, WAL_FRAME_HEADER_SIZE, WAL_HEADER_SIZE,
};
