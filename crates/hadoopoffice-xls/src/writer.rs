//! XLS (BIFF8) writer.
//!
//! Worksheet substreams are built first so the shared string table, the
//! number formats and the link table are complete when the globals are
//! laid out. BOUNDSHEET offsets are patched once every length is known.

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use hadoopoffice_core::{CellAddress, CellValue, DocumentProperties, Workbook, Worksheet};
use hadoopoffice_crypto::BiffCipher;
use hadoopoffice_formula::parse_formula;

use crate::biff::links::LinkBuilder;
use crate::biff::ptg::encode_formula;
use crate::biff::strings::{string_record_parts, write_short_string, SstBuilder};
use crate::biff::{bof, push_record, push_record_parts, records};
use crate::crypt::encrypt_stream;
use crate::error::{XlsError, XlsResult};
use crate::styles::StyleSheetBuilder;
use crate::summary::{summary_information_stream, STREAM_NAME};

/// Longest text a BIFF8 cell holds
const MAX_CELL_TEXT: usize = 32_767;

/// XF index of a cell without a number format
const DEFAULT_XF: u16 = 15;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XlsWriteOptions {
    /// Encrypt the workbook stream with RC4 under this password
    pub password: Option<String>,
}

/// XLS file writer
pub struct XlsWriter;

/// Tables shared by all worksheets of one workbook
struct WriteTables {
    sst: SstBuilder,
    styles: StyleSheetBuilder,
    links: LinkBuilder,
}

impl XlsWriter {
    /// Write a workbook to a file path
    pub fn write_file<P: AsRef<Path>>(workbook: &Workbook, path: P) -> XlsResult<()> {
        let bytes = Self::to_bytes(workbook, &XlsWriteOptions::default())?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Write a workbook with the default options
    pub fn write<W: Write>(workbook: &Workbook, writer: W) -> XlsResult<()> {
        Self::write_with_options(workbook, writer, &XlsWriteOptions::default())
    }

    pub fn write_with_options<W: Write>(
        workbook: &Workbook,
        mut writer: W,
        options: &XlsWriteOptions,
    ) -> XlsResult<()> {
        let bytes = Self::to_bytes(workbook, options)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Serialize to an in-memory compound file
    pub fn to_bytes(workbook: &Workbook, options: &XlsWriteOptions) -> XlsResult<Vec<u8>> {
        let stream = workbook_stream(workbook, options)?;
        compound_file(&stream, workbook.properties())
    }
}

fn compound_file(stream: &[u8], properties: &DocumentProperties) -> XlsResult<Vec<u8>> {
    let mut cfb = cfb::CompoundFile::create(Cursor::new(Vec::new()))?;
    cfb.create_stream("/Workbook")?.write_all(stream)?;
    if let Some(summary) = summary_information_stream(properties) {
        cfb.create_stream(format!("/{STREAM_NAME}"))?.write_all(&summary)?;
    }
    cfb.flush()?;
    Ok(cfb.into_inner().into_inner())
}

/// The complete `Workbook` stream, encrypted when a password is set
pub(crate) fn workbook_stream(workbook: &Workbook, options: &XlsWriteOptions) -> XlsResult<Vec<u8>> {
    if workbook.is_empty() {
        return Err(XlsError::InvalidFormat("workbook has no sheets".into()));
    }

    let mut tables = WriteTables {
        sst: SstBuilder::new(),
        styles: StyleSheetBuilder::new(),
        links: LinkBuilder::new(workbook),
    };
    let substreams = workbook
        .worksheets()
        .enumerate()
        .map(|(idx, sheet)| sheet_substream(sheet, idx == 0, &mut tables))
        .collect::<XlsResult<Vec<_>>>()?;

    let cipher = options.password.as_deref().map(BiffCipher::rc4_for_password);

    let mut stream = Vec::new();
    push_record(&mut stream, records::BOF, &bof(records::BOF_WORKBOOK_GLOBALS));
    let filepass_pos = cipher.as_ref().map(|(_, filepass)| {
        let pos = stream.len();
        push_record(&mut stream, records::FILEPASS, filepass);
        pos
    });
    push_record(&mut stream, records::CODEPAGE, &1200u16.to_le_bytes());
    push_record(&mut stream, records::WINDOW1, &window1());
    push_record(
        &mut stream,
        records::DATEMODE,
        &u16::from(workbook.date_1904()).to_le_bytes(),
    );
    stream.extend_from_slice(&tables.styles.to_records());

    let mut boundsheets = Vec::with_capacity(substreams.len());
    for sheet in workbook.worksheets() {
        boundsheets.push(stream.len());
        // offset(4) patched below, visible worksheet, name
        let mut data = vec![0, 0, 0, 0, 0, 0];
        write_short_string(&mut data, sheet.name());
        push_record(&mut stream, records::BOUNDSHEET, &data);
    }
    stream.extend_from_slice(&tables.links.to_records());
    let sst_offset = stream.len();
    stream.extend_from_slice(&tables.sst.to_records(sst_offset));
    push_record(&mut stream, records::EOF, &[]);

    for (pos, substream) in boundsheets.into_iter().zip(&substreams) {
        let offset = stream.len() as u32;
        stream[pos + 4..pos + 8].copy_from_slice(&offset.to_le_bytes());
        stream.extend_from_slice(substream);
    }

    if let (Some((cipher, _)), Some(pos)) = (&cipher, filepass_pos) {
        encrypt_stream(&mut stream, pos, cipher)?;
    }
    log::debug!(
        "workbook stream of {} bytes, {} unique strings",
        stream.len(),
        tables.sst.len()
    );
    Ok(stream)
}

fn sheet_substream(sheet: &Worksheet, first: bool, tables: &mut WriteTables) -> XlsResult<Vec<u8>> {
    let mut out = Vec::new();
    push_record(&mut out, records::BOF, &bof(records::BOF_WORKSHEET));
    push_record(&mut out, records::DIMENSION, &dimensions(sheet));

    for (row, col, cell) in sheet.iter_cells() {
        if row >= records::MAX_ROWS || col >= records::MAX_COLS {
            return Err(XlsError::InvalidFormat(format!(
                "cell {}!{} is outside the 65536x256 grid of an .xls sheet",
                sheet.name(),
                CellAddress::new(row, col)
            )));
        }
        let xf = tables.styles.xf_for(&cell.number_format);
        write_cell(&mut out, sheet.name(), row, col, xf, &cell.value, tables)?;
    }

    if sheet.comments().next().is_some() {
        log::warn!(
            "comments of sheet {} are not stored in .xls files and were dropped",
            sheet.name()
        );
    }

    push_record(&mut out, records::WINDOW2, &window2(first));
    push_record(&mut out, records::EOF, &[]);
    Ok(out)
}

fn write_cell(
    out: &mut Vec<u8>,
    sheet: &str,
    row: u32,
    col: u16,
    xf: u16,
    value: &CellValue,
    tables: &mut WriteTables,
) -> XlsResult<()> {
    let mut data = cell_header(row, col, xf);
    match value {
        CellValue::Empty => {
            if xf != DEFAULT_XF {
                push_record(out, records::BLANK, &data);
            }
        }
        CellValue::Number(n) => {
            data.extend_from_slice(&n.to_le_bytes());
            push_record(out, records::NUMBER, &data);
        }
        CellValue::Boolean(b) => {
            data.extend_from_slice(&[u8::from(*b), 0]);
            push_record(out, records::BOOLERR, &data);
        }
        CellValue::Error(e) => {
            data.extend_from_slice(&[e.code(), 1]);
            push_record(out, records::BOOLERR, &data);
        }
        CellValue::Text(s) => {
            if s.encode_utf16().count() > MAX_CELL_TEXT {
                return Err(XlsError::InvalidFormat(format!(
                    "text in {sheet}!{} is longer than {MAX_CELL_TEXT} characters",
                    CellAddress::new(row, col)
                )));
            }
            let index = tables.sst.intern(s);
            data.extend_from_slice(&index.to_le_bytes());
            push_record(out, records::LABELSST, &data);
        }
        CellValue::Formula { text, cached } => {
            let rgce = parse_formula(text)
                .map_err(|e| XlsError::Formula(e.to_string()))
                .and_then(|expr| encode_formula(&expr, &mut tables.links));
            match rgce {
                Ok(rgce) => write_formula(out, data, cached.as_deref(), &rgce),
                Err(e) => {
                    log::warn!(
                        "formula {text:?} in {sheet}!{} written as its cached value: {e}",
                        CellAddress::new(row, col)
                    );
                    let cached = cached.as_deref().cloned().unwrap_or(CellValue::Empty);
                    return write_cell(out, sheet, row, col, xf, &cached, tables);
                }
            }
        }
    }
    Ok(())
}

/// FORMULA: header + result(8) + grbit(2) + chn(4) + cce(2) + rgce, then
/// a STRING record when the cached result is text
fn write_formula(out: &mut Vec<u8>, mut data: Vec<u8>, cached: Option<&CellValue>, rgce: &[u8]) {
    let result: [u8; 8] = match cached {
        Some(CellValue::Number(n)) => n.to_le_bytes(),
        Some(CellValue::Text(s)) if !s.is_empty() => [0, 0, 0, 0, 0, 0, 0xFF, 0xFF],
        Some(CellValue::Boolean(b)) => [1, 0, u8::from(*b), 0, 0, 0, 0xFF, 0xFF],
        Some(CellValue::Error(e)) => [2, 0, e.code(), 0, 0, 0, 0xFF, 0xFF],
        _ => [3, 0, 0, 0, 0, 0, 0xFF, 0xFF],
    };
    data.extend_from_slice(&result);
    // recalculated when the file is opened
    data.extend_from_slice(&0x0002u16.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&(rgce.len() as u16).to_le_bytes());
    data.extend_from_slice(rgce);
    push_record(out, records::FORMULA, &data);

    if let Some(CellValue::Text(s)) = cached {
        if !s.is_empty() {
            push_record_parts(out, records::STRING, &string_record_parts(s));
        }
    }
}

fn cell_header(row: u32, col: u16, xf: u16) -> Vec<u8> {
    let mut data = Vec::with_capacity(24);
    data.extend_from_slice(&(row as u16).to_le_bytes());
    data.extend_from_slice(&col.to_le_bytes());
    data.extend_from_slice(&xf.to_le_bytes());
    data
}

/// DIMENSION: first row(4), last row + 1(4), first col(2), last col + 1(2),
/// reserved(2)
fn dimensions(sheet: &Worksheet) -> Vec<u8> {
    let (first_row, last_row, first_col, last_col) = match sheet.used_range() {
        Some(range) => (
            range.start.row,
            (range.end.row + 1).min(records::MAX_ROWS),
            range.start.col,
            (range.end.col + 1).min(records::MAX_COLS),
        ),
        None => (0, 0, 0, 0),
    };
    let mut data = Vec::with_capacity(14);
    data.extend_from_slice(&first_row.to_le_bytes());
    data.extend_from_slice(&last_row.to_le_bytes());
    data.extend_from_slice(&first_col.to_le_bytes());
    data.extend_from_slice(&last_col.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data
}

fn window1() -> Vec<u8> {
    let mut data = Vec::with_capacity(18);
    for v in [360u16, 270, 14940, 9150, 0x0038, 0, 0, 1, 600] {
        data.extend_from_slice(&v.to_le_bytes());
    }
    data
}

/// Grid lines, headers and zeros shown; the first sheet is selected
fn window2(first: bool) -> Vec<u8> {
    let grbit: u16 = if first { 0x06B6 } else { 0x00B6 };
    let mut data = Vec::with_capacity(18);
    for v in [grbit, 0, 0, 64, 0, 0, 0] {
        data.extend_from_slice(&v.to_le_bytes());
    }
    data.extend_from_slice(&0u32.to_le_bytes());
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biff::RecordIter;

    fn record_types(stream: &[u8]) -> Vec<u16> {
        RecordIter::new(stream).map(|r| r.unwrap().record_type).collect()
    }

    #[test]
    fn test_empty_workbook_is_rejected() {
        let err = XlsWriter::to_bytes(&Workbook::empty(), &XlsWriteOptions::default()).unwrap_err();
        assert!(matches!(err, XlsError::InvalidFormat(_)));
    }

    #[test]
    fn test_cells_outside_grid_are_rejected() {
        let mut workbook = Workbook::new();
        workbook
            .worksheet_mut(0)
            .unwrap()
            .set_value_at(70_000, 0, 1.0)
            .unwrap();
        let err = workbook_stream(&workbook, &XlsWriteOptions::default()).unwrap_err();
        assert!(matches!(err, XlsError::InvalidFormat(_)));
    }

    #[test]
    fn test_stream_layout() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_value_at(0, 0, "text").unwrap();
        sheet
            .set_value_at(0, 1, CellValue::formula_with_cached("A1&\"!\"", CellValue::text("text!")))
            .unwrap();

        let stream = workbook_stream(&workbook, &XlsWriteOptions::default()).unwrap();
        let types = record_types(&stream);
        assert_eq!(types[0], records::BOF);
        assert!(types.contains(&records::SST));
        let formula = types.iter().position(|&t| t == records::FORMULA).unwrap();
        assert_eq!(types[formula + 1], records::STRING);
        assert!(!types.contains(&records::FILEPASS));
    }

    #[test]
    fn test_unencodable_formula_falls_back_to_cached_value() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet
            .set_value_at(0, 0, CellValue::formula_with_cached("IFERROR(1/0,2)", CellValue::Number(2.0)))
            .unwrap();

        let stream = workbook_stream(&workbook, &XlsWriteOptions::default()).unwrap();
        let types = record_types(&stream);
        assert!(!types.contains(&records::FORMULA));
        assert!(types.contains(&records::NUMBER));
    }

    #[test]
    fn test_password_adds_filepass() {
        let workbook = Workbook::new();
        let options = XlsWriteOptions {
            password: Some("secret".into()),
        };
        let stream = workbook_stream(&workbook, &options).unwrap();
        assert_eq!(record_types(&stream)[1], records::FILEPASS);
    }
}
