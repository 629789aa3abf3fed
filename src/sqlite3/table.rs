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

//! `Table` and `Index`: the two row shapes `sqlite_master` can describe,
//! plus `Table::rows()` which walks the table's own B-tree.
//!
//! Grounded on `dissect/sql/sqlite3.py:Table`/`Index`.

use std::io::{Read, Seek};
use std::rc::Rc;

use crate::schema::{parse_table_columns_constraints, Column};
use crate::sqlite3::database::Database;
use crate::sqlite3::row::Row;
use crate::util::status::{Error, Result, Status};
use crate::value::Value;

/// A `sqlite_master` row of type `"table"`, with its `CREATE TABLE`
/// statement already parsed into column definitions and primary key.
pub struct Table<R> {
    db: Rc<Database<R>>,
    pub name: String,
    pub table_name: String,
    pub root_page: u32,
    pub sql: String,
    pub primary_key: Option<String>,
    pub columns: Vec<Column>,
}

impl<R: Read + Seek> Table<R> {
    /// Builds a `Table` from one decoded `sqlite_master` row
    /// `(type, name, table_name, page, sql)`.
    pub fn from_master_row(db: Rc<Database<R>>, values: Vec<Value>) -> Result<Self> {
        let (name, table_name, root_page, sql) = master_row_fields(&values)?;
        let def = parse_table_columns_constraints(&sql)?;
        Ok(Table {
            db,
            name,
            table_name,
            root_page,
            sql,
            primary_key: def.primary_key,
            columns: def.columns,
        })
    }

    /// Walks this table's B-tree, materializing each leaf cell into a
    /// `Row`. A single corrupt cell surfaces as one `Err` item; the walk
    /// continues past it (§7).
    pub fn rows(&self) -> Result<impl Iterator<Item = Result<Row>> + '_> {
        let walk = self.db.walk(self.root_page)?;
        let db = self.db.clone();
        Ok(walk.map(move |cell| {
            let cell = cell?;
            let page = db.page(cell.page_num)?;
            let payload = cell.payload(&page.data, db.usable_page_size, db.page_size, |n| db.raw_page(n))?;
            let record = crate::sqlite3::record::read_record(&payload, db.encoding)?;
            Ok(Row::new(&self.columns, self.primary_key.as_deref(), record.values, cell.key))
        }))
    }
}

/// A `sqlite_master` row of type `"index"`. Carries no parsed schema of
/// its own (spec §4.4/Open Question (c): no indexed lookup acceleration).
#[derive(Debug, Clone)]
pub struct Index {
    pub name: String,
    pub table_name: String,
    pub root_page: u32,
    pub sql: String,
}

impl Index {
    pub fn from_master_row(values: Vec<Value>) -> Result<Self> {
        let (name, table_name, root_page, sql) = master_row_fields(&values)?;
        Ok(Index {
            name,
            table_name,
            root_page,
            sql,
        })
    }
}

/// Pulls `(name, table_name, root_page, sql)` out of a decoded
/// `sqlite_master` row, whose columns are `(type, name, tbl_name,
/// rootpage, sql)`.
fn master_row_fields(values: &[Value]) -> Result<(String, String, u32, String)> {
    let get_str = |idx: usize| -> Result<String> {
        values
            .get(idx)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::new(Status::Corruption, Some("sqlite_master row missing expected text column")))
    };
    let name = get_str(1)?;
    let table_name = get_str(2)?;
    let root_page = values
        .get(3)
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::new(Status::Corruption, Some("sqlite_master row missing root page")))? as u32;
    let sql = get_str(4)?;
    Ok((name, table_name, root_page, sql))
}
