//! BIFF8 Unicode string encoding and decoding.
//!
//! BIFF8 strings have a complex encoding:
//! - Header: char_count (2 bytes) + flags (1 byte)
//! - Flags bit 0 (`fHighByte`): 0 = compressed Latin-1, 1 = uncompressed UTF-16LE
//! - Flags bit 2 (`fExtSt`): extended string data follows (Asian phonetic)
//! - Flags bit 3 (`fRichSt`): rich text run array follows
//! - If fRichSt: 2-byte run count follows the flags
//! - If fExtSt: 4-byte extended data size follows
//! - Then the character data
//! - Then the rich text runs (4 bytes each) if fRichSt
//! - Then the extended data if fExtSt
//!
//! In SST records, strings can span CONTINUE records. The CONTINUE record
//! can change the encoding (compressed ↔ uncompressed) mid-string via a
//! new flags byte at the start of the continuation.

use ahash::AHashMap;

use super::payload::Payload;
use super::records::MAX_RECORD_LEN;
use crate::error::{XlsError, XlsResult};

fn from_units(units: &[u16]) -> XlsResult<String> {
    String::from_utf16(units).map_err(|e| XlsError::Parse(format!("invalid UTF-16 string: {e}")))
}

impl Payload<'_> {
    /// ShortXLUnicodeString: 1-byte length and flags (BOUNDSHEET, PtgStr)
    pub fn short_string(&mut self) -> XlsResult<String> {
        let char_count = self.u8()?;
        let flags = self.u8()?;
        self.characters(u16::from(char_count), flags)
    }

    /// XLUnicodeRichExtendedString outside the SST (LABEL, FORMAT,
    /// SUPBOOK, NOTE). Rich runs and phonetic data are skipped. Use
    /// [`Payload::continued_characters`] where text may cross a CONTINUE.
    pub fn unicode_string(&mut self) -> XlsResult<String> {
        let char_count = self.u16()?;
        let flags = self.u8()?;
        let run_count = if flags & 0x08 != 0 { self.u16()? } else { 0 };
        let ext_size = if flags & 0x04 != 0 { self.u32()? } else { 0 };

        let text = self.characters(char_count, flags)?;
        self.skip(usize::from(run_count) * 4 + ext_size as usize)?;
        Ok(text)
    }

    /// `char_count` characters in the width selected by bit 0 of `flags`
    pub fn characters(&mut self, char_count: u16, flags: u8) -> XlsResult<String> {
        let mut units = Vec::with_capacity(usize::from(char_count));
        self.units(usize::from(char_count), flags & 0x01 != 0, &mut units)?;
        from_units(&units)
    }

    fn units(&mut self, count: usize, wide: bool, units: &mut Vec<u16>) -> XlsResult<()> {
        if wide {
            let bytes = self.bytes(count * 2)?;
            units.extend(bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])));
        } else {
            units.extend(self.bytes(count)?.iter().map(|&b| u16::from(b)));
        }
        Ok(())
    }

    /// `char_count` characters that may cross the record's CONTINUE
    /// boundaries. Each boundary inside the text starts with a flags byte
    /// that switches between compressed and UTF-16 characters (SST,
    /// STRING, TXO).
    pub fn continued_characters(&mut self, char_count: usize, wide: bool) -> XlsResult<String> {
        let continues = self.continues();
        let mut units = Vec::with_capacity(char_count.min(self.remaining()));
        let mut wide = wide;
        let mut remaining = char_count;
        while remaining > 0 {
            let pos = self.position();
            if continues.binary_search(&pos).is_ok() {
                wide = self.u8()? & 0x01 != 0;
            }
            let pos = self.position();
            let boundary = continues
                .iter()
                .copied()
                .find(|&c| c > pos)
                .unwrap_or(self.len());
            let width = if wide { 2 } else { 1 };
            let take = remaining.min(boundary.saturating_sub(pos) / width);
            if take == 0 {
                return Err(self.truncated(width));
            }
            self.units(take, wide, &mut units)?;
            remaining -= take;
        }
        from_units(&units)
    }

    /// One SST entry; its characters may cross CONTINUE boundaries
    fn sst_string(&mut self) -> XlsResult<String> {
        let char_count = usize::from(self.u16()?);
        let flags = self.u8()?;
        let run_count = if flags & 0x08 != 0 { self.u16()? } else { 0 };
        let ext_size = if flags & 0x04 != 0 { self.u32()? } else { 0 };

        let text = self.continued_characters(char_count, flags & 0x01 != 0)?;
        self.skip(usize::from(run_count) * 4 + ext_size as usize)?;
        Ok(text)
    }
}

/// Parse the shared string table: total references (u32), unique count
/// (u32), then the entries. A damaged entry ends the table with a warning.
pub fn parse_sst(mut body: Payload<'_>) -> XlsResult<Vec<String>> {
    let _references = body.u32()?;
    let unique_count = body.u32()? as usize;

    let mut strings = Vec::with_capacity(unique_count.min(body.remaining()));
    for i in 0..unique_count {
        match body.sst_string() {
            Ok(s) => strings.push(s),
            Err(e) => {
                log::warn!("shared string {i} of {unique_count} unreadable: {e}");
                break;
            }
        }
    }
    Ok(strings)
}

/// Characters of `s` and whether they need the UTF-16 form
fn encode_units(s: &str) -> (Vec<u16>, bool) {
    let mut units: Vec<u16> = s.encode_utf16().collect();
    units.truncate(u16::MAX as usize);
    let wide = units.iter().any(|&u| u > 0xFF);
    (units, wide)
}

fn push_units(out: &mut Vec<u8>, units: &[u16], wide: bool) {
    for &u in units {
        if wide {
            out.extend_from_slice(&u.to_le_bytes());
        } else {
            out.push(u as u8);
        }
    }
}

/// Append an XLUnicodeString (2-byte length prefix)
pub fn write_unicode_string(out: &mut Vec<u8>, s: &str) {
    let (units, wide) = encode_units(s);
    out.extend_from_slice(&(units.len() as u16).to_le_bytes());
    out.push(u8::from(wide));
    push_units(out, &units, wide);
}

/// A STRING record body split into CONTINUE parts. Every part after the
/// first starts with the flags byte again.
pub fn string_record_parts(s: &str) -> Vec<Vec<u8>> {
    let (units, wide) = encode_units(s);
    let width = if wide { 2 } else { 1 };
    let mut parts = Vec::new();
    let mut part = Vec::with_capacity(MAX_RECORD_LEN.min(3 + units.len() * width));
    part.extend_from_slice(&(units.len() as u16).to_le_bytes());
    part.push(u8::from(wide));
    let mut rest = units.as_slice();
    loop {
        let take = ((MAX_RECORD_LEN - part.len()) / width).min(rest.len());
        push_units(&mut part, &rest[..take], wide);
        rest = &rest[take..];
        parts.push(std::mem::take(&mut part));
        if rest.is_empty() {
            return parts;
        }
        part.push(u8::from(wide));
    }
}

/// Append a ShortXLUnicodeString (1-byte length prefix)
pub fn write_short_string(out: &mut Vec<u8>, s: &str) {
    let (mut units, wide) = encode_units(s);
    units.truncate(u8::MAX as usize);
    out.push(units.len() as u8);
    out.push(u8::from(wide));
    push_units(out, &units, wide);
}

/// Collects the cell strings of a workbook and lays them out as SST and
/// EXTSST records
#[derive(Debug, Default)]
pub struct SstBuilder {
    index: AHashMap<String, u32>,
    strings: Vec<String>,
    references: u32,
}

impl SstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `s` in the table, adding it on first use
    pub fn intern(&mut self, s: &str) -> u32 {
        self.references += 1;
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.index.insert(s.to_string(), idx);
        self.strings.push(s.to_string());
        idx
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// SST body split into record-sized parts. A string header never
    /// crosses a part; character data may, behind a new flags byte.
    /// Also returns the (part, offset) of every `bucket`-th string.
    fn parts(&self, bucket: usize) -> (Vec<Vec<u8>>, Vec<(usize, usize)>) {
        let mut parts: Vec<Vec<u8>> = Vec::new();
        let mut current = Vec::with_capacity(MAX_RECORD_LEN);
        current.extend_from_slice(&self.references.to_le_bytes());
        current.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());
        let mut marks = Vec::new();

        for (i, s) in self.strings.iter().enumerate() {
            let (units, wide) = encode_units(s);
            let width = if wide { 2 } else { 1 };
            let first_char = if units.is_empty() { 0 } else { width };
            if current.len() + 3 + first_char > MAX_RECORD_LEN {
                parts.push(std::mem::replace(&mut current, Vec::with_capacity(MAX_RECORD_LEN)));
            }
            if i % bucket == 0 {
                marks.push((parts.len(), current.len()));
            }
            current.extend_from_slice(&(units.len() as u16).to_le_bytes());
            current.push(u8::from(wide));

            let mut rest = units.as_slice();
            loop {
                let fit = (MAX_RECORD_LEN - current.len()) / width;
                let take = fit.min(rest.len());
                push_units(&mut current, &rest[..take], wide);
                rest = &rest[take..];
                if rest.is_empty() {
                    break;
                }
                parts.push(std::mem::replace(&mut current, Vec::with_capacity(MAX_RECORD_LEN)));
                current.push(u8::from(wide));
            }
        }
        parts.push(current);
        (parts, marks)
    }

    /// SST (with CONTINUEs) and EXTSST records, for an SST record header
    /// placed at `stream_offset` of the workbook stream
    pub fn to_records(&self, stream_offset: usize) -> Vec<u8> {
        let bucket = (self.strings.len() + 127) / 128;
        let bucket = bucket.max(8);
        let (parts, marks) = self.parts(bucket);

        let mut part_offsets = Vec::with_capacity(parts.len());
        let mut pos = stream_offset;
        for part in &parts {
            part_offsets.push(pos);
            pos += 4 + part.len();
        }

        let mut out = Vec::new();
        super::push_record_parts(&mut out, super::records::SST, &parts);

        let mut extsst = Vec::with_capacity(2 + marks.len() * 8);
        extsst.extend_from_slice(&(bucket as u16).to_le_bytes());
        for (part, offset) in marks {
            let within = offset + 4;
            extsst.extend_from_slice(&((part_offsets[part] + within) as u32).to_le_bytes());
            extsst.extend_from_slice(&(within as u16).to_le_bytes());
            extsst.extend_from_slice(&0u16.to_le_bytes());
        }
        super::push_record(&mut out, super::records::EXTSST, &extsst);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biff::{records, BiffRecord, RecordIter};

    fn sst_record(data: Vec<u8>, continues: Vec<usize>) -> BiffRecord {
        BiffRecord {
            record_type: records::SST,
            data,
            continues,
            stream_offset: 0,
        }
    }

    #[test]
    fn test_read_compressed_string() {
        // char_count = 3 (u16 LE), flags = 0x00, data = "ABC"
        let data = [0x03, 0x00, 0x00, b'A', b'B', b'C'];
        let mut p = Payload::new("LABEL", &data);
        assert_eq!(p.unicode_string().unwrap(), "ABC");
        assert!(p.is_at_end());
    }

    #[test]
    fn test_read_wide_string() {
        // char_count = 2 (u16 LE), flags = 0x01, data = H\0i\0
        let data = [0x02, 0x00, 0x01, b'H', 0x00, b'i', 0x00];
        let mut p = Payload::new("LABEL", &data);
        assert_eq!(p.unicode_string().unwrap(), "Hi");
        assert_eq!(p.position(), 7);
    }

    #[test]
    fn test_read_short_string() {
        let data = [0x02, 0x00, b'O', b'K'];
        assert_eq!(Payload::new("BOUNDSHEET", &data).short_string().unwrap(), "OK");
    }

    #[test]
    fn test_write_picks_compressed_form() {
        let mut out = Vec::new();
        write_unicode_string(&mut out, "Grüße");
        assert_eq!(&out[..3], &[5, 0, 0]);

        out.clear();
        write_short_string(&mut out, "Σ1");
        assert_eq!(out, vec![2, 1, 0xA3, 0x03, b'1', 0]);
        assert_eq!(Payload::new("BOUNDSHEET", &out).short_string().unwrap(), "Σ1");
    }

    #[test]
    fn test_parse_sst_with_flag_switch_at_continue() {
        // "ABCD" starts compressed and resumes as UTF-16 after the boundary
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&[0x04, 0x00, 0x00, b'A', b'B']);
        let boundary = buf.len();
        buf.extend_from_slice(&[0x01, b'C', 0x00, b'D', 0x00]);

        let record = sst_record(buf, vec![boundary]);
        let strings = parse_sst(Payload::of(&record)).unwrap();
        assert_eq!(strings, vec!["ABCD"]);
    }

    #[test]
    fn test_truncated_sst_header() {
        let record = sst_record(vec![1, 0, 0, 0, 1], Vec::new());
        let err = parse_sst(Payload::of(&record)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "SST record truncated: need 4 bytes at offset 4"
        );
    }

    #[test]
    fn test_truncated_sst_entry_ends_the_table() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&[0x02, 0x00, 0x00, b'o', b'k']);
        buf.extend_from_slice(&[0x05, 0x00, 0x00, b'x']);
        let record = sst_record(buf, Vec::new());
        assert_eq!(parse_sst(Payload::of(&record)).unwrap(), vec!["ok"]);
    }

    #[test]
    fn test_sst_builder_splits_long_tables() {
        let mut sst = SstBuilder::new();
        let long = "x".repeat(5000);
        let wide = "€".repeat(3000);
        for i in 0..40 {
            sst.intern(&format!("{i}{long}"));
        }
        assert_eq!(sst.intern("short"), 40);
        assert_eq!(sst.intern(&wide), 41);
        assert_eq!(sst.intern("short"), 40);
        assert_eq!(sst.len(), 42);

        let bytes = sst.to_records(100);
        let mut iter = RecordIter::new(&bytes);
        let record = iter.next().unwrap().unwrap();
        assert_eq!(record.record_type, records::SST);
        assert!(!record.continues.is_empty());
        let strings = parse_sst(Payload::of(&record)).unwrap();
        assert_eq!(strings.len(), 42);
        assert_eq!(strings[7], format!("7{long}"));
        assert_eq!(strings[41], wide);
        assert_eq!(iter.next().unwrap().unwrap().record_type, records::EXTSST);
    }
}
