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

//! The LevelDB engine: log-file block stitching, sorted-table (`.ldb`/
//! `.sst`) block reading, and the directory-level aggregate that flattens
//! log and table records into a single stream.

pub mod block;
pub mod log;
pub mod manifest;
mod snappy;
pub mod sstable;

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::LogFile;
use manifest::ManifestFile;
use sstable::SortedTableFile;

use crate::util::status::Result;

/// A LevelDB record's liveness, as carried by both log-file records (from
/// their explicit state byte) and sorted-table records (decoded from the
/// internal-key trailer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Deleted,
    Live,
    /// The internal-key trailer was shorter than 8 bytes, so state and
    /// sequence could not be decoded (spec §3 "SST-derived Record").
    Unknown,
}

/// A single decoded LevelDB record, whether it originated in a log file's
/// batch or a sorted table's data block.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
    pub state: RecordState,
    pub sequence: Option<u64>,
}

impl Record {
    /// Per-record sequence refinement within a log batch (Open Question
    /// (a)): `seq_num + index`, for callers wanting strict LevelDB
    /// ordering instead of the batch-wide sequence every record is given
    /// by default.
    pub fn sequence_within_batch(seq_num: u64, index: u32) -> u64 {
        seq_num + index as u64
    }
}

/// A LevelDB store directory: log files, sorted tables, and manifests
/// discovered by filename convention, exposing a flattened record stream
/// (spec §3 "LevelDB store").
///
/// File-system discovery is treated as an external collaborator by the
/// specification; this aggregate performs the simplest possible version
/// of it (one directory read, suffix/prefix matching) rather than
/// anything configurable.
pub struct LevelDb {
    pub log_files: Vec<PathBuf>,
    pub table_files: Vec<PathBuf>,
    pub manifest_files: Vec<PathBuf>,
}

impl LevelDb {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut log_files = Vec::new();
        let mut table_files = Vec::new();
        let mut manifest_files = Vec::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };

            if name.starts_with("MANIFEST-") {
                manifest_files.push(path);
            } else {
                match path.extension().and_then(|e| e.to_str()) {
                    Some("log") => log_files.push(path),
                    Some("ldb") | Some("sst") => table_files.push(path),
                    _ => {}
                }
            }
        }

        Ok(LevelDb {
            log_files,
            table_files,
            manifest_files,
        })
    }

    /// Opens every manifest file found, as the structural placeholder
    /// described by spec §4.4 (Open Question (c)).
    pub fn manifests(&self) -> Result<Vec<ManifestFile<File>>> {
        self.manifest_files.iter().map(ManifestFile::open).collect()
    }

    /// A flattened record stream across every sorted table then every
    /// log file, matching the source's read order
    /// (`dissect/database/leveldb/leveldb.py: LevelDB._records`).
    pub fn records(&self) -> Result<Vec<Result<Record>>> {
        let mut out = Vec::new();

        for path in &self.table_files {
            let table = SortedTableFile::open(path)?;
            out.extend(table.records()?.into_iter().map(Ok));
        }
        for path in &self.log_files {
            let fh = BufReader::new(File::open(path)?);
            out.extend(LogFile::new(fh).records());
        }

        Ok(out)
    }
}
