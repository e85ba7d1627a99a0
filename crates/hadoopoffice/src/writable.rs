//! Hadoop `Writable` serialization of keys and rows
//!
//! Byte layouts follow Hadoop's `Text`, `ArrayWritable` and
//! `WritableUtils` variable-length integers, so records can be exchanged
//! with JVM jobs.

use std::fmt;
use std::io::{self, Read, Write};

use crate::dao::SpreadSheetCellDAO;

/// A type with a Hadoop wire form
pub trait Writable {
    fn write<W: Write>(&self, out: &mut W) -> io::Result<()>;

    /// Replace `self` with a value read from `input`
    fn read_fields<R: Read>(&mut self, input: &mut R) -> io::Result<()>;
}

/// Write a zero-compressed variable-length integer
pub fn write_vint<W: Write>(out: &mut W, value: i64) -> io::Result<()> {
    if (-112..=127).contains(&value) {
        return out.write_all(&[value as u8]);
    }
    let (mut len, magnitude) = if value < 0 {
        (-120i32, !value)
    } else {
        (-112i32, value)
    };
    let mut tmp = magnitude;
    while tmp != 0 {
        tmp >>= 8;
        len -= 1;
    }
    out.write_all(&[len as u8])?;
    let bytes = if len < -120 { -(len + 120) } else { -(len + 112) };
    for idx in (0..bytes).rev() {
        out.write_all(&[(magnitude >> (idx * 8)) as u8])?;
    }
    Ok(())
}

/// Read a zero-compressed variable-length integer
pub fn read_vint<R: Read>(input: &mut R) -> io::Result<i64> {
    let first = read_byte(input)? as i8;
    if first >= -112 {
        return Ok(first as i64);
    }
    let (negative, bytes) = if first < -120 {
        (true, -120 - first as i32)
    } else {
        (false, -112 - first as i32)
    };
    let mut value = 0i64;
    for _ in 0..bytes {
        value = (value << 8) | read_byte(input)? as i64;
    }
    Ok(if negative { !value } else { value })
}

fn read_byte<R: Read>(input: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn write_string<W: Write>(out: &mut W, s: &str) -> io::Result<()> {
    write_vint(out, s.len() as i64)?;
    out.write_all(s.as_bytes())
}

fn read_string<R: Read>(input: &mut R) -> io::Result<String> {
    let len = read_vint(input)?;
    let len = usize::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative string length"))?;
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// UTF-8 text, as Hadoop's `Text`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Text(String);

impl Text {
    pub fn new(s: impl Into<String>) -> Self {
        Text(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn set(&mut self, s: impl Into<String>) {
        self.0 = s.into();
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Text(s.to_string())
    }
}

impl From<String> for Text {
    fn from(s: String) -> Self {
        Text(s)
    }
}

impl Writable for Text {
    fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_string(out, &self.0)
    }

    fn read_fields<R: Read>(&mut self, input: &mut R) -> io::Result<()> {
        self.0 = read_string(input)?;
        Ok(())
    }
}

impl Writable for SpreadSheetCellDAO {
    fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for field in self.fields() {
            write_string(out, field)?;
        }
        Ok(())
    }

    fn read_fields<R: Read>(&mut self, input: &mut R) -> io::Result<()> {
        for field in self.fields_mut() {
            *field = read_string(input)?;
        }
        Ok(())
    }
}

/// An array of optional elements: a big-endian i32 length, then per element
/// a presence byte followed by the element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayWritable<T> {
    values: Vec<Option<T>>,
}

impl<T> Default for ArrayWritable<T> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<T> ArrayWritable<T> {
    pub fn new(values: Vec<Option<T>>) -> Self {
        Self { values }
    }

    pub fn get(&self) -> &[Option<T>] {
        &self.values
    }

    pub fn set(&mut self, values: Vec<Option<T>>) {
        self.values = values;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_inner(self) -> Vec<Option<T>> {
        self.values
    }
}

impl<T: Writable + Default> Writable for ArrayWritable<T> {
    fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let len = i32::try_from(self.values.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "array too long"))?;
        out.write_all(&len.to_be_bytes())?;
        for value in &self.values {
            match value {
                Some(v) => {
                    out.write_all(&[1])?;
                    v.write(out)?;
                }
                None => out.write_all(&[0])?,
            }
        }
        Ok(())
    }

    fn read_fields<R: Read>(&mut self, input: &mut R) -> io::Result<()> {
        let mut len = [0u8; 4];
        input.read_exact(&mut len)?;
        let len = i32::from_be_bytes(len);
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative array length"))?;
        let mut values = Vec::with_capacity(len.min(16_384));
        for _ in 0..len {
            if read_byte(input)? == 0 {
                values.push(None);
                continue;
            }
            let mut value = T::default();
            value.read_fields(input)?;
            values.push(Some(value));
        }
        self.values = values;
        Ok(())
    }
}

/// A row reduced to its formatted values
pub type TextArrayWritable = ArrayWritable<Text>;

impl From<&[Option<SpreadSheetCellDAO>]> for TextArrayWritable {
    fn from(row: &[Option<SpreadSheetCellDAO>]) -> Self {
        ArrayWritable::new(
            row.iter()
                .map(|cell| cell.as_ref().map(|c| Text::new(c.formatted_value())))
                .collect(),
        )
    }
}

impl From<Vec<Option<SpreadSheetCellDAO>>> for ArrayWritable<SpreadSheetCellDAO> {
    fn from(row: Vec<Option<SpreadSheetCellDAO>>) -> Self {
        ArrayWritable::new(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn vint_bytes(value: i64) -> Vec<u8> {
        let mut out = Vec::new();
        write_vint(&mut out, value).unwrap();
        out
    }

    #[test]
    fn test_vint_layout() {
        assert_eq!(vint_bytes(0), vec![0x00]);
        assert_eq!(vint_bytes(127), vec![0x7F]);
        assert_eq!(vint_bytes(-112), vec![0x90]);
        assert_eq!(vint_bytes(128), vec![0x8F, 0x80]);
        assert_eq!(vint_bytes(300), vec![0x8E, 0x01, 0x2C]);
        assert_eq!(vint_bytes(-113), vec![0x87, 0x70]);
    }

    #[test]
    fn test_vint_read_back() {
        for value in [0i64, 5, 127, 128, -112, -113, 65_535, -1_000_000, i64::MAX, i64::MIN] {
            let bytes = vint_bytes(value);
            assert_eq!(read_vint(&mut Cursor::new(bytes)).unwrap(), value);
        }
    }

    #[test]
    fn test_text_layout() {
        let mut out = Vec::new();
        Text::from("Öl").write(&mut out).unwrap();
        assert_eq!(out, vec![3, 0xC3, 0x96, b'l']);
    }

    #[test]
    fn test_dao_array() {
        let row: Vec<Option<SpreadSheetCellDAO>> = vec![
            Some(SpreadSheetCellDAO::new("1", "", "", "A1", "Sheet1")),
            None,
            Some(SpreadSheetCellDAO::new("3", "c", "A1+2", "C1", "Sheet1")),
        ];
        let array = ArrayWritable::from(row.clone());
        let mut out = Vec::new();
        array.write(&mut out).unwrap();
        assert_eq!(&out[..5], &[0, 0, 0, 3, 1]);

        let mut read = ArrayWritable::<SpreadSheetCellDAO>::default();
        read.read_fields(&mut Cursor::new(out)).unwrap();
        assert_eq!(read.get(), row.as_slice());

        let texts = TextArrayWritable::from(row.as_slice());
        assert_eq!(
            texts.get(),
            &[Some(Text::from("1")), None, Some(Text::from("3"))]
        );
    }
}
