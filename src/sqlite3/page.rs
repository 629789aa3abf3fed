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

//! Page header decoding and page-type dispatch.

use crate::util::coding::{be_u16, be_u32};
use crate::util::status::{Error, Result, Status};

pub const PAGE_FLAG_INTKEY: u8 = 0x01;
pub const PAGE_FLAG_ZERODATA: u8 = 0x02;
pub const PAGE_FLAG_LEAFDATA: u8 = 0x04;
pub const PAGE_FLAG_LEAF: u8 = 0x08;

pub const PAGE_TYPE_INTERIOR_INDEX: u8 = PAGE_FLAG_ZERODATA;
pub const PAGE_TYPE_INTERIOR_TABLE: u8 = PAGE_FLAG_INTKEY | PAGE_FLAG_LEAFDATA;
pub const PAGE_TYPE_LEAF_INDEX: u8 = PAGE_FLAG_ZERODATA | PAGE_FLAG_LEAF;
pub const PAGE_TYPE_LEAF_TABLE: u8 = PAGE_FLAG_INTKEY | PAGE_FLAG_LEAFDATA | PAGE_FLAG_LEAF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    InteriorIndex,
    InteriorTable,
    LeafIndex,
    LeafTable,
}

impl PageType {
    pub fn from_flag(flag: u8) -> Result<Self> {
        match flag {
            PAGE_TYPE_INTERIOR_INDEX => Ok(PageType::InteriorIndex),
            PAGE_TYPE_INTERIOR_TABLE => Ok(PageType::InteriorTable),
            PAGE_TYPE_LEAF_INDEX => Ok(PageType::LeafIndex),
            PAGE_TYPE_LEAF_TABLE => Ok(PageType::LeafTable),
            other => Err(Error::new(
                Status::InvalidPageType,
                Some(&format!("unknown page type flag 0x{other:02x}")),
            )),
        }
    }

    pub fn is_interior(&self) -> bool {
        matches!(self, PageType::InteriorIndex | PageType::InteriorTable)
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_interior()
    }
}

/// The 8-byte (leaf) or 12-byte (interior, counting the right-child
/// pointer) page header.
#[derive(Debug, Clone)]
pub struct PageHeader {
    pub flags: u8,
    pub page_type: PageType,
    pub first_freeblock: u16,
    pub cell_count: u16,
    pub cell_start: u16,
    pub fragmented_free_bytes: u8,
}

impl PageHeader {
    pub const SIZE: usize = 8;

    pub fn parse(buf: &[u8]) -> Result<Self> {
        let flags = buf[0];
        let page_type = PageType::from_flag(flags)?;
        Ok(PageHeader {
            flags,
            page_type,
            first_freeblock: be_u16(&buf[1..3]),
            cell_count: be_u16(&buf[3..5]),
            cell_start: be_u16(&buf[5..7]),
            fragmented_free_bytes: buf[7],
        })
    }
}

/// A decoded page: header, optional right-child pointer (interior pages
/// only), and the cell-pointer array.
#[derive(Debug, Clone)]
pub struct Page {
    pub num: u32,
    pub data: Vec<u8>,
    pub offset: u64,
    pub header: PageHeader,
    pub right_page: Option<u32>,
    pub cell_pointers: Vec<u16>,
}

impl Page {
    /// `raw` is exactly `page_size` bytes as returned by
    /// `Database::raw_page`. For page 1, `raw_page` already seeks past the
    /// 100-byte database header, so the page header always starts at
    /// offset 0 of `raw` regardless of page number.
    pub fn parse(num: u32, raw: Vec<u8>, page_size: u32) -> Result<Self> {
        let header = PageHeader::parse(&raw)?;

        let mut fp = PageHeader::SIZE;
        let right_page = if header.page_type.is_interior() {
            let v = be_u32(&raw[fp..fp + 4]);
            fp += 4;
            Some(v)
        } else {
            None
        };

        let mut cell_pointers = Vec::with_capacity(header.cell_count as usize);
        for i in 0..header.cell_count as usize {
            let off = fp + i * 2;
            cell_pointers.push(be_u16(&raw[off..off + 2]));
        }

        Ok(Page {
            num,
            offset: (num as u64 - 1) * page_size as u64,
            data: raw,
            header,
            right_page,
            cell_pointers,
        })
    }
}
