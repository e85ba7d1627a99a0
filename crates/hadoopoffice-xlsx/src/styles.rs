//! XLSX styles (styles.xml) read/write helpers
//!
//! Only number formats matter here: each cell format (`xf`) is reduced to
//! the [`NumberFormat`] it applies.

use std::collections::HashMap;
use std::io::BufRead;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{XlsxError, XlsxResult};
use crate::xml::{attr, escape_xml};
use hadoopoffice_core::{NumberFormat, Workbook};

/// First id available for custom number formats
const FIRST_CUSTOM_ID: u32 = 164;

// === Reading ===

/// Number format of each `cellXfs` entry, indexed by the cell's `s` attribute
pub(crate) fn read_styles_xml<B: BufRead>(mut xml_reader: Reader<B>) -> XlsxResult<Vec<NumberFormat>> {
    xml_reader.trim_text(true);
    let mut buf = Vec::new();

    let mut codes: HashMap<u32, String> = HashMap::new();
    let mut formats = Vec::new();
    let mut in_cell_xfs = false;

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"numFmt" => {
                    let id = attr(&e, b"numFmtId").and_then(|v| v.parse().ok());
                    if let (Some(id), Some(code)) = (id, attr(&e, b"formatCode")) {
                        codes.insert(id, code);
                    }
                }
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => {
                    let id: u32 = attr(&e, b"numFmtId")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    formats.push(NumberFormat::from_id_and_code(
                        id,
                        codes.get(&id).map(String::as_str),
                    ));
                }
                _ => {}
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    log::debug!(
        "styles.xml: {} custom number formats, {} cell formats",
        codes.len(),
        formats.len()
    );
    Ok(formats)
}

// === Writing ===

/// Workbook-wide table of cell formats, one `xf` per distinct number format
#[derive(Debug)]
pub(crate) struct XlsxStyleTable {
    /// `(numFmtId, format)` per xf; index 0 is General
    xfs: Vec<(u32, NumberFormat)>,
    xf_ids: HashMap<NumberFormat, u32>,
    custom: Vec<(u32, String)>,
}

impl XlsxStyleTable {
    pub(crate) fn build(workbook: &Workbook) -> Self {
        let mut table = Self {
            xfs: vec![(0, NumberFormat::General)],
            xf_ids: HashMap::from([(NumberFormat::General, 0)]),
            custom: Vec::new(),
        };
        for sheet in workbook.worksheets() {
            for (_, _, cell) in sheet.iter_cells() {
                table.intern(&cell.number_format);
            }
        }
        table
    }

    fn intern(&mut self, format: &NumberFormat) {
        if self.xf_ids.contains_key(format) {
            return;
        }
        let num_fmt_id = match format {
            NumberFormat::General => 0,
            NumberFormat::BuiltIn(id) => *id,
            NumberFormat::Custom(code) => match NumberFormat::builtin_id(code) {
                Some(id) => id,
                None => {
                    let id = FIRST_CUSTOM_ID + self.custom.len() as u32;
                    self.custom.push((id, code.clone()));
                    id
                }
            },
        };
        self.xf_ids.insert(format.clone(), self.xfs.len() as u32);
        self.xfs.push((num_fmt_id, format.clone()));
    }

    /// Index of the `xf` applying `format`
    pub(crate) fn xf_id_for(&self, format: &NumberFormat) -> u32 {
        self.xf_ids.get(format).copied().unwrap_or(0)
    }

    pub(crate) fn to_styles_xml(&self) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        );

        if !self.custom.is_empty() {
            xml.push_str(&format!("\n  <numFmts count=\"{}\">", self.custom.len()));
            for (id, code) in &self.custom {
                xml.push_str(&format!(
                    "\n    <numFmt numFmtId=\"{}\" formatCode=\"{}\"/>",
                    id,
                    escape_xml(code)
                ));
            }
            xml.push_str("\n  </numFmts>");
        }

        xml.push_str(
            r#"
  <fonts count="1"><font><sz val="11"/><name val="Calibri"/><family val="2"/></font></fonts>
  <fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
  <borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
        );

        xml.push_str(&format!("\n  <cellXfs count=\"{}\">", self.xfs.len()));
        for (num_fmt_id, _) in &self.xfs {
            let apply = if *num_fmt_id != 0 {
                " applyNumberFormat=\"1\""
            } else {
                ""
            };
            xml.push_str(&format!(
                "\n    <xf numFmtId=\"{num_fmt_id}\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"{apply}/>"
            ));
        }
        xml.push_str("\n  </cellXfs>");

        xml.push_str(
            r#"
  <cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>
</styleSheet>"#,
        );
        xml
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_table_roundtrip() {
        let mut wb = Workbook::new();
        let ws = wb.worksheet_mut(0).unwrap();
        ws.set_value_at(0, 0, 1.0).unwrap();
        ws.set_number_format_at(0, 0, NumberFormat::BuiltIn(14)).unwrap();
        ws.set_value_at(0, 1, 2.0).unwrap();
        ws.set_number_format_at(0, 1, NumberFormat::Custom("0.000 \"kg\"".into()))
            .unwrap();

        let table = XlsxStyleTable::build(&wb);
        assert_eq!(table.xf_id_for(&NumberFormat::General), 0);
        assert_eq!(table.xf_id_for(&NumberFormat::BuiltIn(14)), 1);
        assert_eq!(table.xf_id_for(&NumberFormat::Custom("0.000 \"kg\"".into())), 2);

        let xml = table.to_styles_xml();
        let formats = read_styles_xml(Reader::from_reader(xml.as_bytes())).unwrap();
        assert_eq!(
            formats,
            vec![
                NumberFormat::General,
                NumberFormat::BuiltIn(14),
                NumberFormat::Custom("0.000 \"kg\"".into()),
            ]
        );
    }
}
