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

//! In-order B-tree traversal (spec §4.3 "B-tree walk"): for a leaf page,
//! yield its cells in cell-pointer order; for an interior page, for each
//! cell in order recurse into its left child, then after the last cell
//! recurse into the right child.
//!
//! Grounded on `dissect/sql/sqlite3.py:walk_tree`. The Python original
//! recurses with a generator; doing the same in Rust over a `Database<R>`
//! borrowed by reference would fight the borrow checker across `next()`
//! calls, so this keeps an explicit stack of `WalkFrame`s instead, each
//! re-borrowing `self.db` fresh every iteration.

use std::io::{Read, Seek};
use std::rc::Rc;

use crate::sqlite3::cell::Cell;
use crate::sqlite3::database::Database;
use crate::sqlite3::page::Page;
use crate::util::status::Result;

struct WalkFrame {
    page: Rc<Page>,
    /// Index of the next cell-pointer-array entry to visit.
    cell_idx: usize,
    /// Whether the right-child pointer (interior pages only) has already
    /// been pushed.
    right_visited: bool,
}

/// A lazy, depth-first, in-order walk over a B-tree rooted at a given
/// page. Yields leaf cells only; interior cells are traversed but never
/// yielded themselves (they carry no payload of their own, see spec §4.3).
pub struct BTreeWalk<R> {
    db: Rc<Database<R>>,
    stack: Vec<WalkFrame>,
}

impl<R: Read + Seek> BTreeWalk<R> {
    pub fn new(db: Rc<Database<R>>, root_page: u32) -> Result<Self> {
        let page = db.page(root_page)?;
        Ok(BTreeWalk {
            db,
            stack: vec![WalkFrame {
                page,
                cell_idx: 0,
                right_visited: false,
            }],
        })
    }
}

impl<R: Read + Seek> Iterator for BTreeWalk<R> {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;

            if frame.page.header.page_type.is_leaf() {
                if frame.cell_idx >= frame.page.cell_pointers.len() {
                    self.stack.pop();
                    continue;
                }
                let cp = frame.page.cell_pointers[frame.cell_idx];
                frame.cell_idx += 1;
                let cell = Cell::parse(&frame.page, cp, self.db.usable_page_size);
                return Some(cell);
            }

            if frame.cell_idx < frame.page.cell_pointers.len() {
                let cp = frame.page.cell_pointers[frame.cell_idx];
                frame.cell_idx += 1;
                let cell = match Cell::parse(&frame.page, cp, self.db.usable_page_size) {
                    Ok(c) => c,
                    Err(e) => return Some(Err(e)),
                };
                let Some(left_page) = cell.left_page else {
                    continue;
                };
                match self.db.page(left_page) {
                    Ok(child) => self.stack.push(WalkFrame {
                        page: child,
                        cell_idx: 0,
                        right_visited: false,
                    }),
                    Err(e) => return Some(Err(e)),
                }
                continue;
            }

            if !frame.right_visited {
                frame.right_visited = true;
                if let Some(right_page) = frame.page.right_page {
                    match self.db.page(right_page) {
                        Ok(child) => {
                            self.stack.push(WalkFrame {
                                page: child,
                                cell_idx: 0,
                                right_visited: false,
                            });
                            continue;
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
            }

            self.stack.pop();
        }
    }
}

impl<R: Read + Seek> Database<R> {
    /// Starts an in-order walk of the B-tree rooted at `root_page`.
    pub fn walk(self: &Rc<Self>, root_page: u32) -> Result<BTreeWalk<R>> {
        BTreeWalk::new(self.clone(), root_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite3::header::{HEADER_SIZE, SQLITE3_HEADER_MAGIC};
    use crate::sqlite3::page::PAGE_TYPE_LEAF_TABLE;
    use std::io::Cursor;

    fn single_leaf_page_db(page_size: u32, cells: &[(u64, u64, &[u8])]) -> Rc<Database<Cursor<Vec<u8>>>> {
        let mut header = vec![0u8; HEADER_SIZE];
        header[0..16].copy_from_slice(SQLITE3_HEADER_MAGIC);
        header[16..18].copy_from_slice(&(page_size as u16).to_be_bytes());
        header[28..32].copy_from_slice(&1u32.to_be_bytes());
        header[56..60].copy_from_slice(&1u32.to_be_bytes());

        // `Database::raw_page` seeks past the 100-byte header and then reads
        // a full `page_size` bytes, so the on-disk file must carry that many
        // bytes after the header (see `Page::parse`'s doc comment).
        let mut page1 = vec![0u8; page_size as usize];
        let header_len = 8usize;
        let mut cell_bytes: Vec<Vec<u8>> = Vec::new();
        for &(payload_size, rowid, payload) in cells {
            let mut bytes = Vec::new();
            push_varint(&mut bytes, payload_size);
            push_varint(&mut bytes, rowid);
            bytes.extend_from_slice(payload);
            cell_bytes.push(bytes);
        }

        let mut cell_start = page1.len();
        let mut pointers = Vec::new();
        for bytes in &cell_bytes {
            cell_start -= bytes.len();
            page1[cell_start..cell_start + bytes.len()].copy_from_slice(bytes);
            // cell-pointer values are relative to the full (header-included) page.
            pointers.push((cell_start + HEADER_SIZE) as u16);
        }

        page1[0] = PAGE_TYPE_LEAF_TABLE;
        page1[3..5].copy_from_slice(&(cells.len() as u16).to_be_bytes());
        page1[5..7].copy_from_slice(&(cell_start as u16).to_be_bytes());
        for (i, &p) in pointers.iter().enumerate() {
            let off = header_len + i * 2;
            page1[off..off + 2].copy_from_slice(&p.to_be_bytes());
        }

        let mut file = header;
        file.extend_from_slice(&page1);

        Database::open(Cursor::new(file)).unwrap()
    }

    fn push_varint(buf: &mut Vec<u8>, value: u64) {
        let mut len = 1;
        let mut v = value >> 7;
        while v > 0 {
            len += 1;
            v >>= 7;
        }
        for i in (0..len).rev() {
            let mut byte = ((value >> (7 * i)) & 0x7F) as u8;
            if i != 0 {
                byte |= 0x80;
            }
            buf.push(byte);
        }
    }

    #[test]
    fn walks_leaf_cells_in_pointer_order() {
        let db = single_leaf_page_db(4096, &[(5, 1, b"hello"), (3, 2, b"abc")]);
        let cells: Vec<_> = db.walk(1).unwrap().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].key, Some(1));
        assert_eq!(cells[1].key, Some(2));
    }

    #[test]
    fn empty_leaf_yields_no_cells() {
        let db = single_leaf_page_db(4096, &[]);
        let cells: Vec<_> = db.walk(1).unwrap().collect::<Result<Vec<_>>>().unwrap();
        assert!(cells.is_empty());
    }
}
