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

//! Snappy decompression for LevelDB's in-block compression, which is
//! unframed raw Snappy, never the framed stream format (SPEC_FULL Open
//! Question (d)).
//!
//! `Status::MissingDependency` models the source's optional-collaborator
//! case (its Snappy backend is an optional Python extra); this crate
//! links `snap` unconditionally, so the only failure mode actually
//! reachable here is malformed compressed data, surfaced as `Corruption`.

use crate::util::status::{Error, Result, Status};

pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    snap::raw::Decoder::new()
        .decompress_vec(input)
        .map_err(|e| Error::new(Status::Corruption, Some(&format!("snappy decompression failed: {e}"))))
}
