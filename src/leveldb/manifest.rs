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

//! `MANIFEST-*` files: a structural placeholder, per spec §4.4's silence
//! on manifest contents and Open Question (c). The source
//! (`dissect/database/leveldb/leveldb.py: ManifestFile`) opens the file
//! and parses nothing further; this is ported identically.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::util::status::Result;

/// A manifest file handle with no parsed structure. Kept as a distinct
/// type (rather than a raw path) so a future manifest parser has a
/// natural home without disturbing `LevelDb::manifests`' signature.
pub struct ManifestFile<R> {
    fh: R,
}

impl ManifestFile<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(ManifestFile { fh: File::open(path)? })
    }
}

impl<R: Read> ManifestFile<R> {
    /// Reads the whole file as opaque bytes. Nothing is decoded from it.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.fh.read_to_end(&mut buf)?;
        Ok(buf)
    }
}
