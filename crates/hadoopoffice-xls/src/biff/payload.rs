//! Cursor over the body of one BIFF8 record.
//!
//! A [`Payload`] knows which record it is decoding, so running off the end
//! of a damaged SST, NAME or CRN body is reported as
//! [`XlsError::Truncated`] with the record name and the field offset.
//! Integers are little-endian. The CONTINUE offsets of the record travel
//! with the cursor for strings that cross them (see `strings.rs`).

use super::{records, BiffRecord};
use crate::error::{XlsError, XlsResult};

#[derive(Debug, Clone)]
pub struct Payload<'a> {
    record: &'static str,
    data: &'a [u8],
    continues: &'a [usize],
    pos: usize,
}

impl<'a> Payload<'a> {
    /// Body of `record`, with its CONTINUE offsets
    pub fn of(record: &'a BiffRecord) -> Self {
        Self {
            record: records::name(record.record_type),
            data: &record.data,
            continues: &record.continues,
            pos: 0,
        }
    }

    /// Bytes that are not a whole record body, such as a formula token
    /// list or a property set stream. `record` names them in errors.
    pub fn new(record: &'static str, data: &'a [u8]) -> Self {
        Self {
            record,
            data,
            continues: &[],
            pos: 0,
        }
    }

    pub fn record(&self) -> &'static str {
        self.record
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Offsets in the body where a merged CONTINUE starts
    pub fn continues(&self) -> &'a [usize] {
        self.continues
    }

    /// Move to `pos`. A position past the end fails on the next read.
    pub fn seek(&mut self, pos: usize) -> &mut Self {
        self.pos = pos;
        self
    }

    pub fn truncated(&self, needed: usize) -> XlsError {
        XlsError::Truncated {
            record: self.record,
            offset: self.pos,
            needed,
        }
    }

    pub fn skip(&mut self, len: usize) -> XlsResult<()> {
        self.bytes(len).map(|_| ())
    }

    pub fn bytes(&mut self, len: usize) -> XlsResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| self.truncated(len))?;
        let bytes = self.data.get(self.pos..end).ok_or_else(|| self.truncated(len))?;
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> XlsResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> XlsResult<u8> {
        self.array::<1>().map(|[b]| b)
    }

    pub fn u16(&mut self) -> XlsResult<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> XlsResult<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn i16(&mut self) -> XlsResult<i16> {
        self.array().map(i16::from_le_bytes)
    }

    pub fn i32(&mut self) -> XlsResult<i32> {
        self.array().map(i32::from_le_bytes)
    }

    pub fn f64(&mut self) -> XlsResult<f64> {
        self.array().map(f64::from_le_bytes)
    }

    /// An RK number (RK, MULRK)
    pub fn rk(&mut self) -> XlsResult<f64> {
        self.u32().map(decode_rk)
    }

    /// row(2) + col(2) + xf(2) that opens every cell record
    pub fn cell_header(&mut self) -> XlsResult<(u32, u16, u16)> {
        Ok((u32::from(self.u16()?), self.u16()?, self.u16()?))
    }
}

/// Decode a 4-byte RK number. Bit 0 divides the result by 100. Bit 1
/// selects a signed 30-bit integer in bits 2-31; otherwise bits 2-31 are
/// the high bits of a double whose low 34 bits are zero.
pub fn decode_rk(rk: u32) -> f64 {
    let value = if rk & 0x02 != 0 {
        f64::from((rk as i32) >> 2)
    } else {
        f64::from_bits(u64::from(rk & 0xFFFF_FFFC) << 32)
    };
    if rk & 0x01 != 0 {
        value / 100.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(record_type: u16, data: &[u8]) -> BiffRecord {
        BiffRecord {
            record_type,
            data: data.to_vec(),
            continues: Vec::new(),
            stream_offset: 0,
        }
    }

    #[test]
    fn test_decode_rk() {
        assert_eq!(decode_rk((42 << 2) | 0x02), 42.0);
        assert_eq!(decode_rk(((-100i32 << 2) as u32) | 0x02), -100.0);
        assert!((decode_rk((314 << 2) | 0x03) - 3.14).abs() < 1e-12);
        let upper = (2.5f64.to_bits() >> 32) as u32;
        assert_eq!(decode_rk(upper & 0xFFFF_FFFC), 2.5);
    }

    #[test]
    fn test_cell_header_then_number() {
        let mut body = vec![3, 0, 1, 0, 15, 0];
        body.extend_from_slice(&1.5f64.to_le_bytes());
        let rec = record(records::NUMBER, &body);
        let mut p = Payload::of(&rec);
        assert_eq!(p.cell_header().unwrap(), (3, 1, 15));
        assert_eq!(p.f64().unwrap(), 1.5);
        assert!(p.is_at_end());
    }

    #[test]
    fn test_truncation_names_the_record() {
        let rec = record(records::CRN, &[1, 0, 7]);
        let mut p = Payload::of(&rec);
        assert_eq!(p.u16().unwrap(), 1);
        let err = p.u16().unwrap_err();
        assert!(matches!(
            err,
            XlsError::Truncated {
                record: "CRN",
                offset: 2,
                needed: 2
            }
        ));
        assert!(err.to_string().contains("CRN"));
        // a failed read leaves the cursor where it was
        assert_eq!(p.u8().unwrap(), 7);
    }

    #[test]
    fn test_seek_past_end_fails_on_read() {
        let mut p = Payload::new("SummaryInformation", &[0; 4]);
        p.seek(6);
        assert_eq!(p.remaining(), 0);
        assert!(matches!(
            p.u32(),
            Err(XlsError::Truncated {
                record: "SummaryInformation",
                offset: 6,
                ..
            })
        ));
        assert!(p.skip(usize::MAX).is_err());
    }
}
