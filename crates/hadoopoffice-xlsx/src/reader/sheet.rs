//! Row-by-row worksheet parsing
//!
//! [`SheetRows`] pulls `<row>` elements off a worksheet part one at a time,
//! so the same code serves the in-memory reader and the streaming reader.

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{XlsxError, XlsxResult};
use crate::xml::{attr, decode_excel_escapes};
use hadoopoffice_core::format::datetime_to_serial;
use hadoopoffice_core::{Cell, CellAddress, CellError, CellValue, NumberFormat};
use hadoopoffice_formula::{parse_formula, FormulaExpr};

/// Workbook-level tables needed to decode cells
#[derive(Debug, Default, Clone)]
pub(crate) struct CellTables {
    pub shared_strings: Vec<String>,
    pub formats: Vec<NumberFormat>,
    /// File names of the external links, `[1]` first
    pub link_names: Vec<String>,
    pub date_1904: bool,
}

/// A parsed row: 0-based index and its cells in column order
pub(crate) type ParsedRow = (u32, Vec<(u16, Cell)>);

/// Raw attributes and children of a `<c>` element
#[derive(Debug, Default)]
struct RawCell {
    reference: Option<String>,
    kind: Option<String>,
    style: usize,
    value: Option<String>,
    inline: Option<String>,
    formula: Option<String>,
    shared_index: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Text {
    None,
    Value,
    Formula,
    Inline,
}

pub(crate) struct SheetRows<B: BufRead> {
    xml_reader: Reader<B>,
    tables: Arc<CellTables>,
    next_row: u32,
    /// Anchor cell and expression of each shared formula
    shared_formulas: HashMap<u32, (CellAddress, FormulaExpr)>,
    done: bool,
}

impl<B: BufRead> SheetRows<B> {
    pub(crate) fn new(xml_reader: Reader<B>, tables: Arc<CellTables>) -> Self {
        Self {
            xml_reader,
            tables,
            next_row: 0,
            shared_formulas: HashMap::new(),
            done: false,
        }
    }

    /// The next `<row>` of the sheet, `None` at the end of `<sheetData>`
    pub(crate) fn next_row(&mut self) -> XlsxResult<Option<ParsedRow>> {
        if self.done {
            return Ok(None);
        }
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match self.xml_reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) if e.local_name().as_ref() == b"row" => {
                    let row = self.row_index(&e);
                    return self.read_row(row).map(Some);
                }
                Ok(Event::Empty(e)) if e.local_name().as_ref() == b"row" => {
                    let row = self.row_index(&e);
                    return Ok(Some((row, Vec::new())));
                }
                Ok(Event::End(e)) if e.local_name().as_ref() == b"sheetData" => break,
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
        }
        self.done = true;
        Ok(None)
    }

    fn row_index(&mut self, e: &BytesStart<'_>) -> u32 {
        let row = attr(e, b"r")
            .and_then(|r| r.parse::<u32>().ok())
            .and_then(|r| r.checked_sub(1))
            .unwrap_or(self.next_row);
        self.next_row = row + 1;
        row
    }

    fn read_row(&mut self, row: u32) -> XlsxResult<ParsedRow> {
        let mut cells = Vec::new();
        let mut next_col: u16 = 0;
        let mut raw: Option<RawCell> = None;
        let mut text = Text::None;

        let mut buf = Vec::new();
        loop {
            buf.clear();
            match self.xml_reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"c" => raw = Some(raw_cell(&e)),
                    b"v" => text = Text::Value,
                    b"f" => {
                        if let Some(raw) = raw.as_mut() {
                            raw.shared_index = shared_index(&e);
                        }
                        text = Text::Formula;
                    }
                    b"t" => text = Text::Inline,
                    b"rPh" => text = Text::None,
                    _ => {}
                },
                Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"c" => {
                        let raw = raw_cell(&e);
                        let (col, cell) = self.decode(row, next_col, raw)?;
                        next_col = col.saturating_add(1);
                        if let Some(cell) = cell {
                            cells.push((col, cell));
                        }
                    }
                    // <f t="shared" si="0"/> reuses the anchor's formula
                    b"f" => {
                        if let Some(raw) = raw.as_mut() {
                            raw.shared_index = shared_index(&e);
                            raw.formula.get_or_insert_with(String::new);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Text(e)) => {
                    if let Some(raw) = raw.as_mut() {
                        let value = e.unescape()?;
                        let target = match text {
                            Text::Value => &mut raw.value,
                            Text::Formula => &mut raw.formula,
                            Text::Inline => &mut raw.inline,
                            Text::None => continue,
                        };
                        target.get_or_insert_with(String::new).push_str(&value);
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"c" => {
                        if let Some(raw) = raw.take() {
                            let (col, cell) = self.decode(row, next_col, raw)?;
                            next_col = col.saturating_add(1);
                            if let Some(cell) = cell {
                                cells.push((col, cell));
                            }
                        }
                    }
                    b"v" | b"f" | b"t" => text = Text::None,
                    b"row" => break,
                    _ => {}
                },
                Ok(Event::Eof) => {
                    return Err(XlsxError::Parse(format!("row {} is not closed", row + 1)))
                }
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
        }
        Ok((row, cells))
    }

    /// Turn a raw `<c>` into a cell. Cells without value or formula only
    /// advance the column.
    fn decode(&mut self, row: u32, next_col: u16, raw: RawCell) -> XlsxResult<(u16, Option<Cell>)> {
        let address = match &raw.reference {
            Some(r) => CellAddress::parse(r)
                .map_err(|e| XlsxError::Parse(format!("invalid cell reference '{r}': {e}")))?,
            None => CellAddress::new(row, next_col),
        };
        let col = address.col;
        let number_format = self
            .tables
            .formats
            .get(raw.style)
            .cloned()
            .unwrap_or_default();

        let value = self.value_of(&raw)?;
        let formula = self.formula_of(&raw, address);
        let value = match (formula, value) {
            (Some(text), cached) => CellValue::Formula {
                text,
                cached: cached.map(Box::new),
            },
            (None, Some(value)) => value,
            (None, None) => return Ok((col, None)),
        };
        Ok((col, Some(Cell::with_format(value, number_format))))
    }

    fn value_of(&self, raw: &RawCell) -> XlsxResult<Option<CellValue>> {
        if raw.kind.as_deref() == Some("inlineStr") {
            return Ok(raw
                .inline
                .as_deref()
                .or(raw.value.as_deref())
                .map(|s| CellValue::Text(decode_excel_escapes(s))));
        }
        let Some(v) = raw.value.as_deref() else {
            return Ok(None);
        };
        let value = match raw.kind.as_deref() {
            Some("s") => {
                let idx: usize = v
                    .trim()
                    .parse()
                    .map_err(|_| XlsxError::Parse(format!("invalid shared string index: {v}")))?;
                let s = self.tables.shared_strings.get(idx).ok_or_else(|| {
                    XlsxError::Parse(format!("shared string index {idx} out of bounds"))
                })?;
                CellValue::Text(s.clone())
            }
            Some("b") => CellValue::Boolean(v == "1" || v.eq_ignore_ascii_case("true")),
            Some("e") => CellError::parse(v)
                .map(CellValue::Error)
                .unwrap_or_else(|| CellValue::Text(v.to_string())),
            Some("str") => CellValue::Text(decode_excel_escapes(v)),
            Some("d") => match chrono::NaiveDateTime::parse_from_str(v, "%Y-%m-%dT%H:%M:%S%.f") {
                Ok(dt) => CellValue::Number(datetime_to_serial(&dt, self.tables.date_1904)),
                Err(_) => CellValue::Text(v.to_string()),
            },
            _ => match v.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Text(v.to_string()),
            },
        };
        Ok(Some(value))
    }

    /// Formula text with `[n]` link indexes replaced by file names
    fn formula_of(&mut self, raw: &RawCell, address: CellAddress) -> Option<String> {
        let text = raw.formula.as_deref()?;
        if let Some(si) = raw.shared_index {
            if !text.trim().is_empty() {
                match parse_formula(text) {
                    Ok(expr) => {
                        self.shared_formulas.insert(si, (address, expr));
                    }
                    Err(e) => log::debug!("shared formula {text:?} not parsed: {e}"),
                }
            } else {
                let Some((anchor, expr)) = self.shared_formulas.get(&si) else {
                    log::warn!("cell {address} refers to unknown shared formula {si}");
                    return None;
                };
                let shifted = expr.shifted(
                    i64::from(address.row) - i64::from(anchor.row),
                    i64::from(address.col) - i64::from(anchor.col),
                );
                return Some(self.with_link_names(shifted).to_string());
            }
        }
        if text.trim().is_empty() {
            return None;
        }
        if !text.contains('[') || self.tables.link_names.is_empty() {
            return Some(text.to_string());
        }
        match parse_formula(text) {
            Ok(expr) => Some(self.with_link_names(expr).to_string()),
            Err(e) => {
                log::debug!("formula {text:?} kept verbatim: {e}");
                Some(text.to_string())
            }
        }
    }

    fn with_link_names(&self, expr: FormulaExpr) -> FormulaExpr {
        if self.tables.link_names.is_empty() {
            return expr;
        }
        expr.map_workbooks(&mut |book| {
            book.parse::<usize>()
                .ok()
                .and_then(|pos| pos.checked_sub(1))
                .and_then(|idx| self.tables.link_names.get(idx))
                .filter(|name| !name.is_empty())
                .cloned()
                .unwrap_or_else(|| book.to_string())
        })
    }
}

fn raw_cell(e: &BytesStart<'_>) -> RawCell {
    RawCell {
        reference: attr(e, b"r"),
        kind: attr(e, b"t"),
        style: attr(e, b"s").and_then(|s| s.parse().ok()).unwrap_or(0),
        ..Default::default()
    }
}

fn shared_index(e: &BytesStart<'_>) -> Option<u32> {
    if attr(e, b"t").as_deref() != Some("shared") {
        return None;
    }
    attr(e, b"si").and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(xml: &str, tables: CellTables) -> Vec<ParsedRow> {
        let mut parser = SheetRows::new(Reader::from_reader(xml.as_bytes()), Arc::new(tables));
        let mut rows = Vec::new();
        while let Some(row) = parser.next_row().unwrap() {
            rows.push(row);
        }
        rows
    }

    fn values(row: &ParsedRow) -> Vec<(u16, CellValue)> {
        row.1.iter().map(|(c, cell)| (*c, cell.value.clone())).collect()
    }

    #[test]
    fn test_cell_types() {
        let tables = CellTables {
            shared_strings: vec!["test1".into()],
            formats: vec![NumberFormat::General, NumberFormat::BuiltIn(14)],
            ..Default::default()
        };
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" s="1"><v>42370</v></c></row>
            <row r="3"><c r="A3" t="b"><v>1</v></c><c r="B3" t="e"><v>#DIV/0!</v></c>
              <c r="C3" t="inlineStr"><is><t>in_x000D_line</t></is></c><c r="D3" s="1"/></row>
        </sheetData></worksheet>"#;
        let rows = rows(xml, tables);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            values(&rows[0]),
            vec![(0, CellValue::text("test1")), (2, CellValue::Number(42370.0))]
        );
        assert_eq!(rows[0].1[1].1.number_format, NumberFormat::BuiltIn(14));
        assert_eq!(rows[1].0, 2);
        assert_eq!(
            values(&rows[1]),
            vec![
                (0, CellValue::Boolean(true)),
                (1, CellValue::Error(CellError::Div0)),
                (2, CellValue::text("in\rline")),
            ]
        );
    }

    #[test]
    fn test_formulas_with_cached_values() {
        let tables = CellTables::default();
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1"><f>A2+A3</f><v>6</v></c><c r="B1" t="str"><f>"a"&amp;"b"</f><v>ab</v></c></row>
        </sheetData></worksheet>"#;
        let rows = rows(xml, tables);
        assert_eq!(
            values(&rows[0]),
            vec![
                (0, CellValue::formula_with_cached("A2+A3", CellValue::Number(6.0))),
                (1, CellValue::formula_with_cached("\"a\"&\"b\"", CellValue::text("ab"))),
            ]
        );
    }

    #[test]
    fn test_shared_formulas_are_shifted() {
        let tables = CellTables::default();
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="B1"><f t="shared" ref="B1:B2" si="0">A1*2</f><v>2</v></c></row>
            <row r="2"><c r="B2"><f t="shared" si="0"/><v>4</v></c></row>
        </sheetData></worksheet>"#;
        let rows = rows(xml, tables);
        assert_eq!(
            values(&rows[1]),
            vec![(1, CellValue::formula_with_cached("A2*2", CellValue::Number(4.0)))]
        );
    }

    #[test]
    fn test_link_indexes_become_file_names() {
        let tables = CellTables {
            link_names: vec!["excel2013linkedwb1.xlsx".into()],
            ..Default::default()
        };
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="str"><f>[1]Sheet1!B1</f><v>test2</v></c></row>
        </sheetData></worksheet>"#;
        let rows = rows(xml, tables);
        assert_eq!(
            rows[0].1[0].1.value.formula_text(),
            Some("[excel2013linkedwb1.xlsx]Sheet1!B1")
        );
    }

    #[test]
    fn test_cells_without_reference_follow_previous() {
        let tables = CellTables::default();
        let xml = r#"<worksheet><sheetData><row><c><v>1</v></c><c><v>2</v></c></row><row><c><v>3</v></c></row></sheetData></worksheet>"#;
        let rows = rows(xml, tables);
        assert_eq!(rows[0].0, 0);
        assert_eq!(values(&rows[0]), vec![(0, CellValue::Number(1.0)), (1, CellValue::Number(2.0))]);
        assert_eq!(rows[1].0, 1);
    }
}
