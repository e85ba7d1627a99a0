//! BIFF8 (Binary Interchange File Format) handling.
//!
//! This module provides the record-level abstraction for reading and
//! writing BIFF8 streams. A BIFF8 stream is a sequence of records, each with
//! a 4-byte header (2 bytes record type + 2 bytes body length) followed by
//! the body.
//!
//! CONTINUE records (type 0x003C) extend the body of the preceding record
//! beyond the 8224-byte per-record limit.

pub mod links;
pub mod payload;
pub mod ptg;
pub mod records;
pub mod strings;

use crate::error::{XlsError, XlsResult};

/// A single BIFF8 record (with CONTINUE bodies already merged).
#[derive(Debug, Clone)]
pub struct BiffRecord {
    /// Record type ID (e.g. `records::SST`, `records::NUMBER`).
    pub record_type: u16,
    /// Record body bytes (CONTINUE records have been concatenated).
    pub data: Vec<u8>,
    /// Offsets into `data` where a merged CONTINUE body starts.
    pub continues: Vec<usize>,
    /// Byte offset of this record's header in the stream.
    pub stream_offset: usize,
}

/// Lazily walks the records of a workbook stream from a given offset,
/// merging CONTINUE records into their parent.
pub struct RecordIter<'a> {
    stream: &'a [u8],
    pos: usize,
}

impl<'a> RecordIter<'a> {
    pub fn new(stream: &'a [u8]) -> Self {
        Self::at(stream, 0)
    }

    /// Start at the record header found at `pos`
    pub fn at(stream: &'a [u8], pos: usize) -> Self {
        Self { stream, pos }
    }

    /// Stream offset of the next record header
    pub fn position(&self) -> usize {
        self.pos
    }

    fn header_at(&self, pos: usize) -> Option<(u16, usize)> {
        let header = self.stream.get(pos..pos + 4)?;
        Some((
            u16::from_le_bytes([header[0], header[1]]),
            u16::from_le_bytes([header[2], header[3]]) as usize,
        ))
    }

    fn body_at(&self, pos: usize, len: usize) -> XlsResult<&'a [u8]> {
        self.stream.get(pos + 4..pos + 4 + len).ok_or_else(|| {
            XlsError::InvalidFormat(format!("record at offset {pos} runs past the end of the stream"))
        })
    }

    fn read_record(&mut self) -> XlsResult<Option<BiffRecord>> {
        let Some((record_type, len)) = self.header_at(self.pos) else {
            return Ok(None);
        };
        let stream_offset = self.pos;
        let mut data = self.body_at(self.pos, len)?.to_vec();
        self.pos += 4 + len;

        let mut continues = Vec::new();
        while let Some((records::CONTINUE, len)) = self.header_at(self.pos) {
            continues.push(data.len());
            data.extend_from_slice(self.body_at(self.pos, len)?);
            self.pos += 4 + len;
        }

        Ok(Some(BiffRecord {
            record_type,
            data,
            continues,
            stream_offset,
        }))
    }
}

impl Iterator for RecordIter<'_> {
    type Item = XlsResult<BiffRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_record() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                // A broken header ends the walk
                self.pos = self.stream.len();
                Some(Err(e))
            }
        }
    }
}

/// Extract the BOF record fields from a record body.
///
/// Returns `(version, substream_type)`.
/// - `version` should be `0x0600` for BIFF8
/// - `substream_type`: 0x0005 = workbook globals, 0x0010 = worksheet, etc.
pub fn parse_bof(data: &[u8]) -> XlsResult<(u16, u16)> {
    if data.len() < 4 {
        return Err(XlsError::InvalidFormat("BOF record too short".into()));
    }
    let version = u16::from_le_bytes([data[0], data[1]]);
    let dt = u16::from_le_bytes([data[2], data[3]]);
    Ok((version, dt))
}

/// Append one record. Bodies over the record limit continue in CONTINUE
/// records.
pub fn push_record(out: &mut Vec<u8>, record_type: u16, data: &[u8]) {
    let mut chunks = data.chunks(records::MAX_RECORD_LEN);
    let first = chunks.next().unwrap_or(&[]);
    push_chunk(out, record_type, first);
    for chunk in chunks {
        push_chunk(out, records::CONTINUE, chunk);
    }
}

/// Append a record whose body was already split at meaningful boundaries
pub fn push_record_parts(out: &mut Vec<u8>, record_type: u16, parts: &[Vec<u8>]) {
    for (i, part) in parts.iter().enumerate() {
        let id = if i == 0 { record_type } else { records::CONTINUE };
        push_chunk(out, id, part);
    }
}

fn push_chunk(out: &mut Vec<u8>, record_type: u16, data: &[u8]) {
    out.extend_from_slice(&record_type.to_le_bytes());
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
}

/// BOF record body for a BIFF8 substream of type `dt`
pub fn bof(dt: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&records::BIFF8_VERSION.to_le_bytes());
    out.extend_from_slice(&dt.to_le_bytes());
    out.extend_from_slice(&0x0DBBu16.to_le_bytes()); // build
    out.extend_from_slice(&0x07CCu16.to_le_bytes()); // year
    out.extend_from_slice(&0u32.to_le_bytes()); // file history
    out.extend_from_slice(&0x0006u32.to_le_bytes()); // lowest BIFF version
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continue_records_are_merged() {
        let mut stream = Vec::new();
        push_record(&mut stream, records::BOF, &bof(records::BOF_WORKSHEET));
        let long: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        push_record(&mut stream, records::SST, &long);
        push_record(&mut stream, records::EOF, &[]);

        let parsed: Vec<BiffRecord> = RecordIter::new(&stream).map(|r| r.unwrap()).collect();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[1].data, long);
        assert_eq!(parsed[1].continues, vec![records::MAX_RECORD_LEN]);
        assert_eq!(parsed[2].record_type, records::EOF);
        assert_eq!(parse_bof(&parsed[0].data).unwrap(), (0x0600, 0x0010));
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let mut stream = Vec::new();
        push_record(&mut stream, records::NUMBER, &[0u8; 14]);
        stream.truncate(10);
        let mut iter = RecordIter::new(&stream);
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }
}
