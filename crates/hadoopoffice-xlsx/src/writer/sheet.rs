//! Worksheet, comment and VML drawing parts

use hadoopoffice_core::{CellAddress, CellValue, Workbook, Worksheet};
use hadoopoffice_formula::parse_formula;

use super::SharedStrings;
use crate::styles::XlsxStyleTable;
use crate::xml::{escape_text, escape_xml};

pub(crate) fn worksheet_xml(
    workbook: &Workbook,
    sheet: &Worksheet,
    styles: &XlsxStyleTable,
    mut shared: Option<&mut SharedStrings>,
    with_comments: bool,
) -> String {
    let mut content = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
    );
    if let Some(range) = sheet.used_range() {
        content.push_str(&format!("\n    <dimension ref=\"{range}\"/>"));
    }
    content.push_str("\n    <sheetData>");

    let mut current_row: Option<u32> = None;
    for (row, col, cell) in sheet.iter_cells() {
        if current_row != Some(row) {
            if current_row.is_some() {
                content.push_str("</row>");
            }
            content.push_str(&format!("\n        <row r=\"{}\">", row + 1));
            current_row = Some(row);
        }

        let addr = CellAddress::new(row, col);
        let style = styles.xf_id_for(&cell.number_format);
        let s_attr = if style > 0 {
            format!(" s=\"{style}\"")
        } else {
            String::new()
        };

        match &cell.value {
            CellValue::Empty => content.push_str(&format!("<c r=\"{addr}\"{s_attr}/>")),
            CellValue::Number(n) => {
                content.push_str(&format!("<c r=\"{addr}\"{s_attr}><v>{n}</v></c>"));
            }
            CellValue::Boolean(b) => {
                content.push_str(&format!(
                    "<c r=\"{addr}\"{s_attr} t=\"b\"><v>{}</v></c>",
                    u8::from(*b)
                ));
            }
            CellValue::Error(e) => {
                content.push_str(&format!(
                    "<c r=\"{addr}\"{s_attr} t=\"e\"><v>{}</v></c>",
                    e.as_str()
                ));
            }
            CellValue::Text(s) => match shared.as_deref_mut() {
                Some(table) => content.push_str(&format!(
                    "<c r=\"{addr}\"{s_attr} t=\"s\"><v>{}</v></c>",
                    table.intern(s)
                )),
                None => content.push_str(&format!(
                    "<c r=\"{addr}\"{s_attr} t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                    escape_text(s)
                )),
            },
            CellValue::Formula { text, cached } => {
                let formula = escape_xml(&export_formula(workbook, text));
                let (kind, value) = match cached.as_deref() {
                    Some(CellValue::Number(n)) => ("", Some(n.to_string())),
                    Some(CellValue::Text(s)) => (" t=\"str\"", Some(escape_text(s))),
                    Some(CellValue::Boolean(b)) => (" t=\"b\"", Some(u8::from(*b).to_string())),
                    Some(CellValue::Error(e)) => (" t=\"e\"", Some(e.as_str().to_string())),
                    _ => ("", None),
                };
                content.push_str(&format!("<c r=\"{addr}\"{s_attr}{kind}><f>{formula}</f>"));
                if let Some(value) = value {
                    content.push_str(&format!("<v>{value}</v>"));
                }
                content.push_str("</c>");
            }
        }
    }
    if current_row.is_some() {
        content.push_str("</row>");
    }
    content.push_str("\n    </sheetData>");

    if with_comments {
        content.push_str("\n    <legacyDrawing r:id=\"rId2\"/>");
    }
    content.push_str("\n</worksheet>");
    content
}

/// Replace `[file.xlsx]` qualifiers with the 1-based link position the
/// package format stores
fn export_formula(workbook: &Workbook, text: &str) -> String {
    if !text.contains('[') {
        return text.to_string();
    }
    let expr = match parse_formula(text) {
        Ok(expr) => expr,
        Err(e) => {
            log::warn!("formula {text} written unchanged: {e}");
            return text.to_string();
        }
    };
    expr.map_workbooks(&mut |book| {
        if book.parse::<usize>().is_ok() {
            return book.to_string();
        }
        match workbook.external_link_index(book) {
            Some(idx) => (idx + 1).to_string(),
            None => {
                log::warn!("no external link registered for workbook {book}");
                book.to_string()
            }
        }
    })
    .to_string()
}

pub(crate) fn comments_xml(sheet: &Worksheet) -> String {
    let authors = sheet.comment_authors();
    let mut content = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<comments xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
    <authors>"#,
    );
    for author in &authors {
        content.push_str(&format!("\n        <author>{}</author>", escape_xml(author)));
    }
    content.push_str("\n    </authors>\n    <commentList>");

    for ((row, col), comment) in sheet.comments() {
        let author_id = authors
            .iter()
            .position(|a| *a == comment.author)
            .unwrap_or(0);
        content.push_str(&format!(
            "\n        <comment ref=\"{}\" authorId=\"{author_id}\"><text><r><t xml:space=\"preserve\">{}</t></r></text></comment>",
            CellAddress::new(row, col),
            escape_text(&comment.text)
        ));
    }
    content.push_str("\n    </commentList>\n</comments>");
    content
}

/// Note shapes Excel needs to display the comments of a sheet
pub(crate) fn vml_drawing_xml(sheet: &Worksheet) -> String {
    let mut content = String::from(
        r##"<xml xmlns:v="urn:schemas-microsoft-com:vml" xmlns:o="urn:schemas-microsoft-com:office:office" xmlns:x="urn:schemas-microsoft-com:office:excel">
 <o:shapelayout v:ext="edit"><o:idmap v:ext="edit" data="1"/></o:shapelayout>
 <v:shapetype id="_x0000_t202" coordsize="21600,21600" o:spt="202" path="m,l,21600r21600,l21600,xe">
  <v:stroke joinstyle="miter"/><v:path gradientshapeok="t" o:connecttype="rect"/>
 </v:shapetype>"##,
    );
    for (i, ((row, col), _)) in sheet.comments().enumerate() {
        content.push_str(&format!(
            r##"
 <v:shape id="_x0000_s{}" type="#_x0000_t202" style="position:absolute;visibility:hidden" fillcolor="#ffffe1" o:insetmode="auto">
  <v:textbox/>
  <x:ClientData ObjectType="Note"><x:MoveWithCells/><x:SizeWithCells/><x:Anchor>{}, 15, {}, 10, {}, 15, {}, 4</x:Anchor><x:AutoFill>False</x:AutoFill><x:Row>{row}</x:Row><x:Column>{col}</x:Column></x:ClientData>
 </v:shape>"##,
            1025 + i,
            u32::from(col) + 1,
            row,
            u32::from(col) + 3,
            row + 3,
        ));
    }
    content.push_str("\n</xml>");
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadoopoffice_core::{CellComment, ExternalLink};

    #[test]
    fn test_export_formula_uses_link_positions() {
        let mut wb = Workbook::new();
        wb.add_external_link(ExternalLink::new("first.xlsx"));
        wb.add_external_link(ExternalLink::new("second.xlsx"));
        assert_eq!(
            export_formula(&wb, "[second.xlsx]Sheet1!A1+[first.xlsx]Sheet1!B2"),
            "[2]Sheet1!A1+[1]Sheet1!B2"
        );
        assert_eq!(export_formula(&wb, "[unknown.xlsx]S!A1"), "[unknown.xlsx]S!A1");
        assert_eq!(export_formula(&wb, "A1+A2"), "A1+A2");
    }

    #[test]
    fn test_worksheet_inline_strings() {
        let mut wb = Workbook::new();
        let sheet = wb.worksheet_mut(0).unwrap();
        sheet.set_value("A1", "a < b").unwrap();
        sheet.set_value("B1", 2.5).unwrap();
        sheet.set_value("A2", CellValue::formula_with_cached("B1*2", CellValue::Number(5.0))).unwrap();
        let styles = XlsxStyleTable::build(&wb);
        let xml = worksheet_xml(&wb, wb.worksheet(0).unwrap(), &styles, None, false);

        assert!(xml.contains("<dimension ref=\"A1:B2\"/>"));
        assert!(xml.contains("t=\"inlineStr\"><is><t xml:space=\"preserve\">a &lt; b</t></is>"));
        assert!(xml.contains("<c r=\"B1\"><v>2.5</v></c>"));
        assert!(xml.contains("<c r=\"A2\"><f>B1*2</f><v>5</v></c>"));
        assert!(!xml.contains("legacyDrawing"));
    }

    #[test]
    fn test_comments_part_lists_authors() {
        let mut sheet = Worksheet::new("Sheet1");
        sheet.set_comment("A1", CellComment::new("hadoopoffice", "first")).unwrap();
        sheet.set_comment("B3", CellComment::new("other", "second")).unwrap();
        let xml = comments_xml(&sheet);
        assert!(xml.contains("<author>hadoopoffice</author>"));
        assert!(xml.contains("<comment ref=\"B3\" authorId=\"1\">"));
        assert_eq!(vml_drawing_xml(&sheet).matches("ObjectType=\"Note\"").count(), 2);
    }
}
