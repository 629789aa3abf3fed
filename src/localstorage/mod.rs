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

//! Chromium LocalStorage, layered on top of a LevelDB store (spec §4.4
//! "LocalStorage layer"): `META:`/`METAACCESS:` metadata records group
//! LevelDB records by host into `Store`s; each store's own entries are
//! found by rescanning for keys prefixed `_<host>\x00`.
//!
//! Grounded on `dissect/database/localstorage/localstorage.py` and
//! `c_localstorage.py`'s protobuf-varint metadata structs.

use std::io::{Cursor, Read};
use std::path::Path;

use crate::leveldb::{LevelDb, RecordState};
use crate::util::status::{Error, Result, Status};
use crate::util::varint::VarintU64;

const META_PREFIX: &[u8] = b"META:";
const META_ACCESS_PREFIX: &[u8] = b"METAACCESS:";
const RECORD_PREFIX: u8 = b'_';

/// `LocalStorageAreaWriteMetaData`: written whenever a store is modified.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteMetaData {
    pub lm_type: u8,
    pub last_modified: u64,
    pub sb_type: u8,
    pub size_bytes: u64,
}

/// `LocalStorageAreaAccessMetaData`.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessMetaData {
    pub la_type: u8,
    pub last_accessed: u64,
}

fn parse_write_metadata(bytes: &[u8]) -> Result<WriteMetaData> {
    let mut cursor = Cursor::new(bytes);
    let lm_type = read_u8(&mut cursor)?;
    let last_modified = VarintU64::read_from(&mut cursor)?;
    let sb_type = read_u8(&mut cursor)?;
    let size_bytes = VarintU64::read_from(&mut cursor)?;
    Ok(WriteMetaData {
        lm_type,
        last_modified,
        sb_type,
        size_bytes,
    })
}

fn parse_access_metadata(bytes: &[u8]) -> Result<AccessMetaData> {
    let mut cursor = Cursor::new(bytes);
    let la_type = read_u8(&mut cursor)?;
    let last_accessed = VarintU64::read_from(&mut cursor)?;
    Ok(AccessMetaData { la_type, last_accessed })
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)
        .map_err(|_| Error::new(Status::Truncation, Some("truncated localstorage metadata")))?;
    Ok(b[0])
}

/// Decodes a byte string using the tag byte LocalStorage prefixes both
/// key names and values with: `0x00` → UTF-16LE, `0x01` → ISO-8859-1.
/// Any other tag is `Status::UnknownEncoding` (Open Question (b)).
fn decode_tagged(bytes: &[u8]) -> Result<String> {
    match bytes.first() {
        Some(0x00) => decode_utf16_le(&bytes[1..]),
        Some(0x01) => Ok(decode_latin1(&bytes[1..])),
        Some(other) => Err(Error::new(Status::UnknownEncoding, Some(&format!("unknown localstorage encoding tag {other:#x}")))),
        None => Err(Error::new(Status::Truncation, Some("empty tagged localstorage value"))),
    }
}

fn decode_utf16_le(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::new(Status::Corruption, Some("odd-length UTF-16LE bytes")));
    }
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    String::from_utf16(&units).map_err(|_| Error::new(Status::Corruption, Some("invalid UTF-16LE sequence")))
}

/// ISO-8859-1 maps every byte directly onto the Unicode code point of the
/// same value, so decoding is a straight byte-to-char widening.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn encode_latin1(s: &str) -> Vec<u8> {
    s.chars().map(|c| c as u8).collect()
}

/// One store entry: a record keyed `_<host>\x00<enc><name>` with a
/// same-encoded value.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordKey {
    pub name: String,
    pub value: Option<String>,
}

fn decode_record_key(host: &str, raw_key: &[u8], raw_value: Option<&[u8]>) -> Result<RecordKey> {
    let prefix_len = 1 + host.len() + 1; // '_' + host + '\x00'
    let name_bytes = raw_key
        .get(prefix_len..)
        .ok_or_else(|| Error::new(Status::Truncation, Some("record key shorter than its host prefix")))?;
    let name = decode_tagged(name_bytes)?;

    let value = match raw_value {
        Some(bytes) if !bytes.is_empty() => Some(decode_tagged(bytes)?),
        _ => None,
    };

    Ok(RecordKey { name, value })
}

/// All records and metadata sharing one host.
pub struct Store {
    pub host: String,
    pub meta: Vec<WriteMetaData>,
    pub meta_access: Vec<AccessMetaData>,
}

/// A Chromium LocalStorage database directory, backed by a LevelDB store.
pub struct LocalStorage {
    leveldb: LevelDb,
    pub stores: Vec<Store>,
}

impl LocalStorage {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let leveldb = LevelDb::open(dir)?;
        let records = leveldb.records()?;

        let mut stores: Vec<Store> = Vec::new();
        for record in records.into_iter().flatten() {
            if record.state != RecordState::Live {
                continue;
            }

            if let Some(host_bytes) = record.key.strip_prefix(META_PREFIX) {
                let host = decode_latin1(host_bytes);
                match parse_write_metadata(record.value.as_deref().unwrap_or(&[])) {
                    Ok(meta) => store_for_host(&mut stores, &host).meta.push(meta),
                    Err(e) => log::warn!("skipping malformed META record for host {host:?}: {e}"),
                }
            } else if let Some(host_bytes) = record.key.strip_prefix(META_ACCESS_PREFIX) {
                let host = decode_latin1(host_bytes);
                match parse_access_metadata(record.value.as_deref().unwrap_or(&[])) {
                    Ok(meta) => store_for_host(&mut stores, &host).meta_access.push(meta),
                    Err(e) => log::warn!("skipping malformed METAACCESS record for host {host:?}: {e}"),
                }
            }
        }

        log::debug!("opened LocalStorage database with {} stores", stores.len());
        Ok(LocalStorage { leveldb, stores })
    }

    /// Looks up a store by host name (`dissect...LocalStorage.store`).
    pub fn store(&self, host: &str) -> Option<&Store> {
        self.stores.iter().find(|s| s.host == host)
    }

    /// Scans every LevelDB record again for keys prefixed `_<host>\x00`,
    /// decoding each into a `RecordKey`.
    pub fn records(&self, host: &str) -> Result<Vec<RecordKey>> {
        let mut prefix = vec![RECORD_PREFIX];
        prefix.extend_from_slice(&encode_latin1(host));
        prefix.push(0);

        let mut out = Vec::new();
        for record in self.leveldb.records()?.into_iter().flatten() {
            if record.state == RecordState::Live && record.key.starts_with(&prefix) {
                out.push(decode_record_key(host, &record.key, record.value.as_deref())?);
            }
        }
        Ok(out)
    }
}

fn store_for_host<'a>(stores: &'a mut Vec<Store>, host: &str) -> &'a mut Store {
    if let Some(idx) = stores.iter().position(|s| s.host == host) {
        return &mut stores[idx];
    }
    stores.push(Store {
        host: host.to_string(),
        meta: Vec::new(),
        meta_access: Vec::new(),
    });
    stores.last_mut().unwrap()
}
