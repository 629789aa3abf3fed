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

//! The top-level SQLite3 database handle: header validation, page
//! access with a bounded LRU cache, and table/index discovery via
//! `sqlite_master`.

use std::cell::RefCell;
use std::io::{Read, Seek, SeekFrom};
use std::rc::Rc;

use crate::sqlite3::cell::Cell;
use crate::sqlite3::header::{Header, TextEncoding, HEADER_SIZE, SQLITE3_HEADER_MAGIC};
use crate::sqlite3::page::Page;
use crate::sqlite3::table::{Index, Table};
use crate::sqlite3::wal::Wal;
use crate::util::cache::LruCache;
use crate::util::status::{Error, Result, Status};

/// Default page-cache capacity (§5).
pub const PAGE_CACHE_CAPACITY: usize = 256;

pub struct Database<R> {
    fh: RefCell<R>,
    pub header: Header,
    pub encoding: TextEncoding,
    pub page_size: u32,
    pub usable_page_size: u32,
    page_cache: RefCell<LruCache<u32, Rc<Page>>>,
    pub wal: RefCell<Option<Wal<R>>>,
}

impl<R: Read + Seek> Database<R> {
    /// Opens a database from a seekable byte source, validating the
    /// 16-byte magic and the minimum usable page size (spec invariant 1).
    pub fn open(fh: R) -> Result<Rc<Self>> {
        Self::open_with_page_cache_capacity(fh, PAGE_CACHE_CAPACITY)
    }

    pub fn open_with_page_cache_capacity(mut fh: R, page_cache_capacity: usize) -> Result<Rc<Self>> {
        fh.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; HEADER_SIZE];
        fh.read_exact(&mut buf).map_err(|_| {
            Error::new(Status::InvalidDatabase, Some("file shorter than the 100-byte header"))
        })?;
        let header = Header::parse(&buf)?;

        if &header.magic != SQLITE3_HEADER_MAGIC {
            return Err(Error::new(Status::InvalidDatabase, Some("invalid header magic")));
        }

        let encoding = header.text_encoding()?;
        let page_size = header.page_size();
        let usable_page_size = page_size - header.reserved_size as u32;
        if usable_page_size < 480 {
            return Err(Error::new(
                Status::InvalidDatabase,
                Some("usable page size is too small"),
            ));
        }

        log::debug!(
            "opened SQLite3 database: page_size={page_size} usable_page_size={usable_page_size} pages={}",
            header.page_count
        );

        Ok(Rc::new(Database {
            fh: RefCell::new(fh),
            header,
            encoding,
            page_size,
            usable_page_size,
            page_cache: RefCell::new(LruCache::new(page_cache_capacity)),
            wal: RefCell::new(None),
        }))
    }

    /// Attaches a write-ahead log file to an already-open database.
    ///
    /// Grounded on `dissect/sql/sqlite3.py:SQLite3.open_wal`.
    pub fn attach_wal(&self, fh: R) -> Result<()> {
        *self.wal.borrow_mut() = Some(Wal::open(fh)?);
        Ok(())
    }

    pub fn has_wal(&self) -> bool {
        self.wal.borrow().is_some()
    }

    /// Reads exactly `page_size` bytes for the given 1-based page number.
    /// For page 1, the read starts at byte 100, i.e. past the database
    /// header (spec §4.3; note this is the source's literal behavior,
    /// yielding a buffer whose cell-pointer-array offsets are taken
    /// relative to the *full* first page, not this buffer -- see
    /// `Cell::parse`'s page-1 offset correction).
    pub fn raw_page(&self, num: u32) -> Result<Vec<u8>> {
        if num < 1 || num > self.header.page_count {
            return Err(Error::new(
                Status::InvalidPageNumber,
                Some(&format!("page {num} exceeds boundaries (1..={})", self.header.page_count)),
            ));
        }

        let mut fh = self.fh.borrow_mut();
        if num == 1 {
            fh.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        } else {
            fh.seek(SeekFrom::Start((num as u64 - 1) * self.page_size as u64))?;
        }

        let mut buf = vec![0u8; self.page_size as usize];
        fh.read_exact(&mut buf)
            .map_err(|_| Error::new(Status::Truncation, Some(&format!("short read for page {num}"))))?;
        Ok(buf)
    }

    /// Decodes (or returns the cached decoding of) page `num`.
    pub fn page(&self, num: u32) -> Result<Rc<Page>> {
        if let Some(p) = self.page_cache.borrow_mut().get(&num) {
            log::trace!("page cache hit for page {num}");
            return Ok(p.clone());
        }

        log::trace!("page cache miss for page {num}");
        let raw = self.raw_page(num)?;
        let page = Rc::new(Page::parse(num, raw, self.page_size)?);
        self.page_cache.borrow_mut().put(num, page.clone());
        Ok(page)
    }

    /// Iterates every page in the file, in physical page-number order.
    pub fn pages(&self) -> impl Iterator<Item = Result<Rc<Page>>> + '_ {
        (1..=self.header.page_count).map(move |n| self.page(n))
    }

    /// Iterates every cell on every page, in physical page order (not a
    /// B-tree walk -- see `Database::walk` for that).
    pub fn cells(&self) -> impl Iterator<Item = Result<Cell>> + '_ {
        self.pages().flat_map(move |page_result| {
            let page = match page_result {
                Ok(p) => p,
                Err(e) => return vec![Err(e)],
            };
            page.cell_pointers
                .iter()
                .map(|&cp| Cell::parse(&page, cp, self.usable_page_size))
                .collect::<Vec<_>>()
        })
    }

    /// Looks up a table by name (case-insensitive).
    ///
    /// Grounded on `dissect/sql/sqlite3.py:SQLite3.table`.
    pub fn table(self: &Rc<Self>, name: &str) -> Result<Option<Table<R>>> {
        let needle = name.to_lowercase();
        for table in self.tables() {
            let table = table?;
            if table.name.to_lowercase() == needle {
                return Ok(Some(table));
            }
        }
        Ok(None)
    }

    /// Iterates all `sqlite_master` rows of type `"table"`.
    ///
    /// Grounded on `dissect/sql/sqlite3.py:SQLite3.tables`. A failure to
    /// even start walking page 1 surfaces as a single `Err` item.
    pub fn tables(self: &Rc<Self>) -> impl Iterator<Item = Result<Table<R>>> + '_ {
        let db = self.clone();
        MasterRowIter::new(self.clone(), "table").map(move |r| r.and_then(|values| Table::from_master_row(db.clone(), values)))
    }

    /// Looks up a table's index by name (case-insensitive).
    pub fn index(self: &Rc<Self>, name: &str) -> Result<Option<Index>> {
        let needle = name.to_lowercase();
        for index in self.indices() {
            let index = index?;
            if index.name.to_lowercase() == needle {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Iterates all `sqlite_master` rows of type `"index"`.
    pub fn indices(self: &Rc<Self>) -> impl Iterator<Item = Result<Index>> + '_ {
        MasterRowIter::new(self.clone(), "index").map(|r| r.and_then(Index::from_master_row))
    }
}

/// Iterates `sqlite_master` rows (page 1's B-tree), filtering by the
/// first column value (`"table"` or `"index"`).
struct MasterRowIter<R> {
    db: Rc<Database<R>>,
    walk: Option<crate::sqlite3::btree::BTreeWalk<R>>,
    pending_error: Option<Error>,
    type_filter: &'static str,
}

impl<R: Read + Seek> MasterRowIter<R> {
    fn new(db: Rc<Database<R>>, type_filter: &'static str) -> Self {
        match db.walk(1) {
            Ok(walk) => Self {
                db,
                walk: Some(walk),
                pending_error: None,
                type_filter,
            },
            Err(e) => Self {
                db,
                walk: None,
                pending_error: Some(e),
                type_filter,
            },
        }
    }
}

impl<R: Read + Seek> Iterator for MasterRowIter<R> {
    type Item = Result<Vec<crate::value::Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending_error.take() {
            return Some(Err(e));
        }
        let walk = self.walk.as_mut()?;

        loop {
            let cell = walk.next()?;
            let cell = match cell {
                Ok(c) => c,
                Err(e) => return Some(Err(e)),
            };
            let page = match self.db.page(cell.page_num) {
                Ok(p) => p,
                Err(e) => return Some(Err(e)),
            };
            let payload = match cell.payload(&page.data, self.db.usable_page_size, self.db.page_size, |n| self.db.raw_page(n)) {
                Ok(p) => p,
                Err(e) => return Some(Err(e)),
            };
            let record = match crate::sqlite3::record::read_record(&payload, self.db.encoding) {
                Ok(r) => r,
                Err(e) => return Some(Err(e)),
            };
            if record.values.first().and_then(|v| v.as_str()) != Some(self.type_filter) {
                continue;
            }
            return Some(Ok(record.values));
        }
    }
}
