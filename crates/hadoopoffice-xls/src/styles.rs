//! Number formats carried by FORMAT and XF records.
//!
//! Only the number format of a cell matters here: it decides whether a
//! number is rendered as a date and how its formatted value looks. Fonts,
//! fills and borders are written with fixed defaults and ignored on read.

use ahash::AHashMap;

use hadoopoffice_core::NumberFormat;

use crate::biff::payload::Payload;
use crate::biff::strings::{write_short_string, write_unicode_string};
use crate::biff::{push_record, records};
use crate::error::XlsResult;

/// First format id available to workbook-defined formats
const FIRST_CUSTOM_FORMAT: u16 = 164;

/// Number of style XFs that precede the cell XFs
const STYLE_XF_COUNT: u16 = 15;

/// Fill colors of an XF with no pattern: system foreground and background
const DEFAULT_FILL_COLORS: u16 = 0x20C0;

/// Formats and XFs read from the workbook globals.
#[derive(Debug, Default)]
pub struct StyleTable {
    formats: AHashMap<u16, String>,
    xf_formats: Vec<u16>,
}

impl StyleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// FORMAT: ifmt u16, then the format code
    pub fn on_format(&mut self, mut body: Payload<'_>) -> XlsResult<()> {
        let id = body.u16()?;
        let code = body.unicode_string()?;
        self.formats.insert(id, code);
        Ok(())
    }

    /// XF: ifnt u16, ifmt u16, then alignment and borders we skip
    pub fn on_xf(&mut self, mut body: Payload<'_>) -> XlsResult<()> {
        let format = body.seek(2).u16()?;
        self.xf_formats.push(format);
        Ok(())
    }

    /// Number format of the cell XF at `xf`
    pub fn number_format(&self, xf: u16) -> NumberFormat {
        match self.xf_formats.get(xf as usize) {
            Some(&id) => NumberFormat::from_id_and_code(
                id as u32,
                self.formats.get(&id).map(String::as_str),
            ),
            None => NumberFormat::General,
        }
    }
}

/// Builds FONT, FORMAT, XF and STYLE records for the formats a workbook
/// uses. Index 15 is the default cell XF; every other distinct format
/// gets one XF after it.
#[derive(Debug)]
pub struct StyleSheetBuilder {
    custom: Vec<String>,
    custom_ids: AHashMap<String, u16>,
    cell_xfs: Vec<u16>,
    xf_by_format: AHashMap<u16, u16>,
}

impl StyleSheetBuilder {
    pub fn new() -> Self {
        let mut xf_by_format = AHashMap::new();
        xf_by_format.insert(0, STYLE_XF_COUNT);
        Self {
            custom: Vec::new(),
            custom_ids: AHashMap::new(),
            cell_xfs: vec![0],
            xf_by_format,
        }
    }

    fn format_id(&mut self, format: &NumberFormat) -> u16 {
        match format {
            NumberFormat::General => 0,
            NumberFormat::BuiltIn(id) if *id < FIRST_CUSTOM_FORMAT as u32 => *id as u16,
            other => {
                let code = other.format_code();
                if let Some(id) = NumberFormat::builtin_id(code) {
                    return id as u16;
                }
                if let Some(&id) = self.custom_ids.get(code) {
                    return id;
                }
                let id = FIRST_CUSTOM_FORMAT + self.custom.len() as u16;
                self.custom.push(code.to_string());
                self.custom_ids.insert(code.to_string(), id);
                id
            }
        }
    }

    /// XF index for a cell with `format`
    pub fn xf_for(&mut self, format: &NumberFormat) -> u16 {
        let id = self.format_id(format);
        if let Some(&xf) = self.xf_by_format.get(&id) {
            return xf;
        }
        let xf = STYLE_XF_COUNT + self.cell_xfs.len() as u16;
        self.cell_xfs.push(id);
        self.xf_by_format.insert(id, xf);
        xf
    }

    pub fn to_records(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Font index 4 does not exist in BIFF, so four fonts cover 0..=3
        for _ in 0..4 {
            push_record(&mut out, records::FONT, &font_record("Arial"));
        }
        for (i, code) in self.custom.iter().enumerate() {
            let mut data = Vec::with_capacity(code.len() + 5);
            data.extend_from_slice(&(FIRST_CUSTOM_FORMAT + i as u16).to_le_bytes());
            write_unicode_string(&mut data, code);
            push_record(&mut out, records::FORMAT, &data);
        }
        for i in 0..STYLE_XF_COUNT {
            push_record(&mut out, records::XF, &xf_record(0, true, i != 0));
        }
        for &format in &self.cell_xfs {
            push_record(&mut out, records::XF, &xf_record(format, false, format != 0));
        }
        // Normal: built-in style 0 on XF 0
        push_record(&mut out, records::STYLE, &[0x00, 0x80, 0x00, 0xFF]);
        out
    }
}

impl Default for StyleSheetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn font_record(name: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(16 + name.len());
    data.extend_from_slice(&200u16.to_le_bytes()); // 10pt in twips
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&0x7FFFu16.to_le_bytes()); // automatic color
    data.extend_from_slice(&400u16.to_le_bytes()); // normal weight
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&[0, 0, 0, 0]);
    write_short_string(&mut data, name);
    data
}

fn xf_record(format: u16, style: bool, format_applied: bool) -> Vec<u8> {
    let mut data = Vec::with_capacity(20);
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&format.to_le_bytes());
    // locked; style XFs have no parent (0xFFF)
    let type_prot: u16 = if style { 0xFFF5 } else { 0x0001 };
    data.extend_from_slice(&type_prot.to_le_bytes());
    data.push(0x20); // bottom aligned
    data.push(0);
    data.push(0);
    let used = match (style, format_applied) {
        (true, false) => 0x00,
        (true, true) => 0xF4,
        (false, true) => 0x04,
        (false, false) => 0x00,
    };
    data.push(used);
    data.extend_from_slice(&[0u8; 8]);
    data.extend_from_slice(&DEFAULT_FILL_COLORS.to_le_bytes());
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biff::RecordIter;

    #[test]
    fn test_number_format_resolution() {
        let mut table = StyleTable::new();
        let mut format = Vec::new();
        format.extend_from_slice(&164u16.to_le_bytes());
        write_unicode_string(&mut format, "yyyy-mm-dd");
        table.on_format(Payload::new("FORMAT", &format)).unwrap();
        for id in [0u16, 14, 164] {
            let mut xf = vec![0, 0];
            xf.extend_from_slice(&id.to_le_bytes());
            xf.resize(20, 0);
            table.on_xf(Payload::new("XF", &xf)).unwrap();
        }
        assert!(matches!(
            table.on_xf(Payload::new("XF", &[0, 0, 1])),
            Err(crate::error::XlsError::Truncated { record: "XF", .. })
        ));

        assert_eq!(table.number_format(0), NumberFormat::General);
        assert_eq!(table.number_format(1), NumberFormat::BuiltIn(14));
        assert_eq!(table.number_format(2), NumberFormat::Custom("yyyy-mm-dd".into()));
        assert_eq!(table.number_format(9), NumberFormat::General);
    }

    #[test]
    fn test_builder_assigns_xfs_once() {
        let mut builder = StyleSheetBuilder::new();
        assert_eq!(builder.xf_for(&NumberFormat::General), 15);
        let date = builder.xf_for(&NumberFormat::BuiltIn(14));
        assert_eq!(date, 16);
        let custom = builder.xf_for(&NumberFormat::Custom("0.000".into()));
        assert_eq!(custom, 17);
        assert_eq!(builder.xf_for(&NumberFormat::Custom("0.000".into())), custom);
        // a custom code that is really built-in shares the built-in XF
        assert_eq!(builder.xf_for(&NumberFormat::Custom("m/d/yy".into())), date);
    }

    #[test]
    fn test_builder_records_read_back() {
        let mut builder = StyleSheetBuilder::new();
        let custom = builder.xf_for(&NumberFormat::Custom("0.000".into()));
        let date = builder.xf_for(&NumberFormat::BuiltIn(14));
        let stream = builder.to_records();

        let mut table = StyleTable::new();
        let mut fonts = 0;
        for record in RecordIter::new(&stream) {
            let record = record.unwrap();
            match record.record_type {
                records::FONT => fonts += 1,
                records::FORMAT => table.on_format(Payload::of(&record)).unwrap(),
                records::XF => table.on_xf(Payload::of(&record)).unwrap(),
                _ => {}
            }
        }
        assert_eq!(fonts, 4);
        assert_eq!(table.number_format(custom), NumberFormat::Custom("0.000".into()));
        assert_eq!(table.number_format(date), NumberFormat::BuiltIn(14));
        assert_eq!(table.number_format(15), NumberFormat::General);
    }
}
