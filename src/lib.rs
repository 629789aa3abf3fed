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

#![allow(clippy::unreadable_literal)]
#![allow(clippy::type_complexity)]

//! A read-only forensic parser for three on-disk database formats: the
//! SQLite3 database file (with its write-ahead log companion), the
//! LevelDB store (log files and sorted tables), and Chromium's
//! LocalStorage layout layered on top of LevelDB.
//!
//! This crate never writes to the files it reads, executes no SQL, and
//! applies no WAL checkpoint onto a main database — it only exposes
//! what's on disk as typed values for forensic and reverse-engineering
//! tooling.

#[macro_use]
extern crate lazy_static;

pub mod leveldb;
pub mod localstorage;
pub mod schema;
pub mod sqlite3;
mod util;
mod value;

pub use schema::{parse_table_columns_constraints, Column, TableDef};
pub use util::status::{Error, Result, Status};
pub use value::Value;
