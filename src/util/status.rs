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

use std::fmt;
use std::io;

/// The kind of error produced by a decoder in this crate.
///
/// These map one-to-one onto the error kinds named by the format
/// specification rather than onto Rust type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Bad magic, truncated header, or other reason an entire file cannot
    /// be trusted as the format it claims to be.
    InvalidDatabase,
    /// A page number fell outside `[1, page_count]`.
    InvalidPageNumber,
    /// A page's flag byte did not match one of the four defined page types.
    InvalidPageType,
    /// A cell of a type that carries no payload was asked for its payload.
    NoCellData,
    /// A `CREATE TABLE` statement could not be parsed.
    InvalidSQL,
    /// A WAL-only operation was attempted on a database opened without one.
    NoWriteAheadLog,
    /// A LevelDB structural invariant was violated (bad shared_len, restart
    /// array, or block trailer).
    InvalidBlock,
    /// An external collaborator (Snappy) was required but unavailable.
    MissingDependency,
    /// A read came up short of the bytes the format promised were there.
    Truncation,
    /// Generic structural corruption not covered by a more specific kind.
    Corruption,
    /// An underlying I/O operation failed.
    IoError,
    /// A varint had more continuation bytes than its format allows.
    Overflow,
    /// EOF was hit in the middle of a varint.
    Unterminated,
    /// A LocalStorage encoding tag was not 0x00 or 0x01.
    UnknownEncoding,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::InvalidDatabase => "invalid database",
            Status::InvalidPageNumber => "invalid page number",
            Status::InvalidPageType => "invalid page type",
            Status::NoCellData => "cell has no data",
            Status::InvalidSQL => "invalid SQL",
            Status::NoWriteAheadLog => "no write-ahead log attached",
            Status::InvalidBlock => "invalid block",
            Status::MissingDependency => "missing dependency",
            Status::Truncation => "truncated read",
            Status::Corruption => "corruption",
            Status::IoError => "I/O error",
            Status::Overflow => "varint overflow",
            Status::Unterminated => "unterminated varint",
            Status::UnknownEncoding => "unknown encoding tag",
        };
        write!(f, "{s}")
    }
}

/// The crate's error type: a [`Status`] plus an optional human-readable
/// description of what went wrong.
#[derive(Debug)]
pub struct Error {
    status: Status,
    description: Option<String>,
}

impl Error {
    pub fn new(status: Status, description: Option<&str>) -> Self {
        Self {
            status,
            description: description.map(|s| s.to_string()),
        }
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    #[inline]
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(d) => write!(f, "{}: {}", self.status, d),
            None => write!(f, "{}", self.status),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::new(Status::IoError, Some(&e.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
