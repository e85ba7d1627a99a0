//! External link parts (xl/externalLinks/externalLinkN.xml)
//!
//! Each part names the linked file through an external relationship and
//! caches the values of the cells formulas read from it. Formulas refer to
//! the links by 1-based position, e.g. `[1]Sheet1!B1`.

use std::io::{Read, Seek};

use quick_xml::events::Event;
use zip::ZipArchive;

use crate::error::{XlsxError, XlsxResult};
use crate::package::{read_relationships, REL_EXTERNAL_LINK_PATH};
use crate::xml::{attr, escape_xml, open_part, qualified_attr};
use hadoopoffice_core::external::file_name_of;
use hadoopoffice_core::{CellAddress, CellError, CellValue, ExternalLink};

/// Read one external link part
pub(crate) fn read_external_link<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> XlsxResult<ExternalLink> {
    let rels = read_relationships(archive, path)?;
    let mut xml_reader =
        open_part(archive, path)?.ok_or_else(|| XlsxError::MissingPart(path.to_string()))?;
    xml_reader.trim_text(true);

    let mut link = ExternalLink::default();
    let mut buf = Vec::new();
    let mut sheet: Option<usize> = None;
    // (address, t attribute) of the cell being read
    let mut cell: Option<(CellAddress, Option<String>)> = None;
    let mut in_value = false;

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"externalBook" => {
                    let target = qualified_attr(&e, b"r:id")
                        .and_then(|id| rels.iter().find(|r| r.id == id))
                        .filter(|r| r.rel_type == REL_EXTERNAL_LINK_PATH || r.external);
                    if let Some(rel) = target {
                        link.file_name = file_name_of(&rel.target).to_string();
                    }
                }
                b"sheetName" => {
                    if let Some(name) = attr(&e, b"val") {
                        link.sheet_names.push(name);
                    }
                }
                b"sheetData" => sheet = attr(&e, b"sheetId").and_then(|v| v.parse().ok()),
                b"cell" => {
                    cell = attr(&e, b"r")
                        .and_then(|r| CellAddress::parse(&r).ok())
                        .map(|addr| (addr, attr(&e, b"t")));
                }
                b"v" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(e)) if in_value => {
                if let (Some(sheet), Some((addr, kind))) = (sheet, &cell) {
                    let text = e.unescape()?;
                    let value = cached_value(kind.as_deref(), &text);
                    link.cached.insert((sheet, addr.row, addr.col), value);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"cell" => cell = None,
                b"sheetData" => sheet = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    if link.file_name.is_empty() {
        log::warn!("external link {} names no workbook", path);
    }
    Ok(link)
}

fn cached_value(kind: Option<&str>, text: &str) -> CellValue {
    match kind {
        Some("str") | Some("s") => CellValue::text(text),
        Some("b") => CellValue::Boolean(text == "1"),
        Some("e") => CellError::parse(text)
            .map(CellValue::Error)
            .unwrap_or_else(|| CellValue::text(text)),
        _ => text
            .parse()
            .map(CellValue::Number)
            .unwrap_or_else(|_| CellValue::text(text)),
    }
}

/// externalLinkN.xml for one link. Its relationship `rId1` points at the file.
pub(crate) fn external_link_xml(link: &ExternalLink) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<externalLink xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <externalBook r:id="rId1">"#,
    );

    if !link.sheet_names.is_empty() {
        xml.push_str("\n    <sheetNames>");
        for name in &link.sheet_names {
            xml.push_str(&format!("<sheetName val=\"{}\"/>", escape_xml(name)));
        }
        xml.push_str("</sheetNames>");

        xml.push_str("\n    <sheetDataSet>");
        for sheet in 0..link.sheet_names.len() {
            let cells: Vec<_> = link
                .cached
                .range((sheet, 0, 0)..=(sheet, u32::MAX, u16::MAX))
                .collect();
            if cells.is_empty() {
                xml.push_str(&format!("<sheetData sheetId=\"{sheet}\"/>"));
                continue;
            }
            xml.push_str(&format!("<sheetData sheetId=\"{sheet}\">"));
            let mut current_row = None;
            for ((_, row, col), value) in cells {
                if current_row != Some(*row) {
                    if current_row.is_some() {
                        xml.push_str("</row>");
                    }
                    xml.push_str(&format!("<row r=\"{}\">", row + 1));
                    current_row = Some(*row);
                }
                let addr = CellAddress::new(*row, *col);
                let (kind, text) = match value {
                    CellValue::Text(s) => (" t=\"str\"", escape_xml(s)),
                    CellValue::Boolean(b) => (" t=\"b\"", if *b { "1" } else { "0" }.to_string()),
                    CellValue::Error(e) => (" t=\"e\"", e.as_str().to_string()),
                    CellValue::Number(n) => ("", n.to_string()),
                    _ => continue,
                };
                xml.push_str(&format!("<cell r=\"{addr}\"{kind}><v>{text}</v></cell>"));
            }
            xml.push_str("</row></sheetData>");
        }
        xml.push_str("</sheetDataSet>");
    }

    xml.push_str("\n  </externalBook>\n</externalLink>");
    xml
}

/// Relationships of an external link part
pub(crate) fn external_link_rels_xml(link: &ExternalLink) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="{REL_EXTERNAL_LINK_PATH}" Target="{}" TargetMode="External"/>
</Relationships>"#,
        escape_xml(&link.file_name)
    )
}
