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

//! Record (cell payload) decoding: a varint header length, a run of
//! serial-type varints, then the concatenated typed values.

use crate::sqlite3::header::TextEncoding;
use crate::util::coding::{be_f64, be_i64, be_u16, be_u24, be_u32, be_u48, sign_extend};
use crate::util::status::{Error, Result, Status};
use crate::util::varint::SqliteVarint;
use crate::value::Value;

/// The decoded form of a cell's payload: the serial types in header order
/// and their corresponding values.
#[derive(Debug, Clone)]
pub struct Record {
    pub types: Vec<i64>,
    pub values: Vec<Value>,
}

/// Decodes a record per spec §3/§4.3. `encoding` controls how odd
/// (text) serial types are decoded.
pub fn read_record(buf: &[u8], encoding: TextEncoding) -> Result<Record> {
    let (header_size, header_len) = SqliteVarint::read_from_slice(buf)?;
    let end = header_size as usize;

    let mut pos = header_len;
    let mut types = Vec::new();
    while pos < end {
        let (t, n) = SqliteVarint::read_from_slice(&buf[pos..])?;
        types.push(t as i64);
        pos += n;
    }

    let mut values = Vec::with_capacity(types.len());
    for &serial_type in &types {
        let value = decode_serial_value(serial_type, &buf[pos..], encoding, &mut pos)?;
        values.push(value);
    }

    Ok(Record { types, values })
}

fn decode_serial_value(
    serial_type: i64,
    buf: &[u8],
    encoding: TextEncoding,
    pos: &mut usize,
) -> Result<Value> {
    let value = match serial_type {
        0 => Value::Null,
        1 => {
            let v = sign_extend(buf[0] as u64, 1);
            *pos += 1;
            Value::Integer(v)
        }
        2 => {
            let v = sign_extend(be_u16(buf) as u64, 2);
            *pos += 2;
            Value::Integer(v)
        }
        3 => {
            let v = sign_extend(be_u24(buf) as u64, 3);
            *pos += 3;
            Value::Integer(v)
        }
        4 => {
            let v = sign_extend(be_u32(buf) as u64, 4);
            *pos += 4;
            Value::Integer(v)
        }
        5 => {
            let v = sign_extend(be_u48(buf), 6);
            *pos += 6;
            Value::Integer(v)
        }
        6 => {
            let v = be_i64(buf);
            *pos += 8;
            Value::Integer(v)
        }
        7 => {
            let v = be_f64(buf);
            *pos += 8;
            Value::Float(v)
        }
        8 => Value::Integer(0),
        9 => Value::Integer(1),
        10 | 11 => {
            return Err(Error::new(
                Status::Corruption,
                Some(&format!("reserved serial type {serial_type}")),
            ))
        }
        n if n < 0 => {
            return Err(Error::new(
                Status::Corruption,
                Some(&format!("negative serial type {n}")),
            ))
        }
        n if n % 2 == 0 => {
            let len = ((n - 12) / 2) as usize;
            let bytes = buf[..len].to_vec();
            *pos += len;
            Value::Blob(bytes)
        }
        n => {
            let len = ((n - 13) / 2) as usize;
            let bytes = &buf[..len];
            *pos += len;
            Value::Text(decode_text(bytes, encoding))
        }
    };
    Ok(value)
}

fn decode_text(bytes: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        TextEncoding::Utf16Le => {
            let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
            String::from_utf16_lossy(&units)
        }
        TextEncoding::Utf16Be => {
            let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
            String::from_utf16_lossy(&units)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_null_text_integer() {
        // header_size=4, types=[0, 27(text len7), 2], then "testing" and 1337 (u16 big-endian)
        let mut buf = vec![0x04, 0x00, 0x1b, 0x02];
        buf.extend_from_slice(b"testing");
        buf.extend_from_slice(&1337u16.to_be_bytes());
        let record = read_record(&buf, TextEncoding::Utf8).unwrap();
        assert_eq!(record.types, vec![0, 27, 2]);
        assert_eq!(record.values[0], Value::Null);
        assert_eq!(record.values[1], Value::Text("testing".to_string()));
        assert_eq!(record.values[2], Value::Integer(1337));
    }

    #[test]
    fn s3_blob_even_serial_type() {
        // header_size=2, type=20 (even, >=12) -> blob of (20-12)/2=4 bytes
        let mut buf = vec![0x02, 0x14];
        buf.extend_from_slice(&[0x80, 0x81, 0x82, 0x83]);
        let record = read_record(&buf, TextEncoding::Utf8).unwrap();
        assert_eq!(record.types, vec![20]);
        assert_eq!(record.values[0], Value::Blob(vec![0x80, 0x81, 0x82, 0x83]));
    }

    #[test]
    fn odd_serial_type_is_text_not_blob() {
        // type=21 (odd, >=13) -> text of (21-13)/2=4 bytes
        let mut buf = vec![0x02, 0x15];
        buf.extend_from_slice(b"abcd");
        let record = read_record(&buf, TextEncoding::Utf8).unwrap();
        assert_eq!(record.values[0], Value::Text("abcd".to_string()));
    }

    #[test]
    fn serial_type_9_literal_one() {
        let buf = vec![0x02, 0x09];
        let record = read_record(&buf, TextEncoding::Utf8).unwrap();
        assert_eq!(record.values[0], Value::Integer(1));
    }

    #[test]
    fn reserved_serial_type_is_error() {
        let buf = vec![0x02, 0x0a];
        let err = read_record(&buf, TextEncoding::Utf8).unwrap_err();
        assert_eq!(err.status(), Status::Corruption);
    }

    #[test]
    fn invariant_3_header_plus_values_equals_payload() {
        let mut buf = vec![0x04, 0x00, 0x1b, 0x02];
        buf.extend_from_slice(b"testing");
        buf.extend_from_slice(&1337u16.to_be_bytes());
        let record = read_record(&buf, TextEncoding::Utf8).unwrap();
        let header_size = buf[0] as usize;
        let value_bytes: usize = record
            .types
            .iter()
            .map(|&t| match t {
                0 | 8 | 9 => 0,
                1 => 1,
                2 => 2,
                3 => 3,
                4 => 4,
                5 => 6,
                6 | 7 => 8,
                n if n % 2 == 0 => ((n - 12) / 2) as usize,
                n => ((n - 13) / 2) as usize,
            })
            .sum();
        assert_eq!(header_size + value_bytes, buf.len());
    }

    #[test]
    fn negative_integer_serial_type_6() {
        let mut buf = vec![0x02, 0x06];
        buf.extend_from_slice(&(-11644473429i64).to_be_bytes());
        let record = read_record(&buf, TextEncoding::Utf8).unwrap();
        assert_eq!(record.values[0], Value::Integer(-11644473429));
    }
}
