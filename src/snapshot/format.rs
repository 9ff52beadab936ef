//! On-disk layout of a snapshot blob: a 12-byte header, an event stream, and
//! a trailing index of `(path, offset)` chunk entries.
//!
//! ```text
//! [event stream length: 8 bytes BE][trailing index length: 4 bytes BE]
//! [event stream: concatenated self-delimited events]
//! [trailing index: cbor-encoded Vec<IndexEntry>]
//! ```

use std::convert::TryInto;

use cbordata::Cborize;

use crate::{path::KPath, util, Result};

/// Byte length of the fixed header preceding the event stream.
pub const HEADER_LEN: usize = 12;

/// One entry in a snapshot's trailing index: the kinded path reconstructed
/// at a given chunk boundary, and the event-stream byte offset that chunk
/// starts at. The root entry `(path=root, offset=0)` is always present.
#[derive(Debug, Clone, PartialEq, Cborize)]
pub struct IndexEntry {
    pub path: KPath,
    pub offset: u64,
}

impl IndexEntry {
    const ID: u32 = 0x0;

    pub fn new(path: KPath, offset: u64) -> IndexEntry {
        IndexEntry { path, offset }
    }
}

pub fn encode_header(event_stream_len: u64, index_len: u32) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[0..8].copy_from_slice(&event_stream_len.to_be_bytes());
    buf[8..12].copy_from_slice(&index_len.to_be_bytes());
    buf
}

pub fn decode_header(bytes: &[u8]) -> Result<(u64, u32)> {
    if bytes.len() != HEADER_LEN {
        return err_at!(
            InvalidFile,
            msg: "snapshot header is {} bytes, expected {}", bytes.len(), HEADER_LEN
        );
    }
    let event_len = u64::from_be_bytes(bytes[0..8].try_into().expect("8 bytes"));
    let index_len = u32::from_be_bytes(bytes[8..12].try_into().expect("4 bytes"));
    Ok((event_len, index_len))
}

pub fn encode_index(entries: &[IndexEntry]) -> Result<Vec<u8>> {
    util::into_cbor_bytes(entries.to_vec())
}

pub fn decode_index(bytes: &[u8]) -> Result<Vec<IndexEntry>> {
    let (entries, _): (Vec<IndexEntry>, usize) = util::from_cbor_bytes(bytes)?;
    Ok(entries)
}

#[cfg(test)]
#[path = "format_test.rs"]
mod format_test;
