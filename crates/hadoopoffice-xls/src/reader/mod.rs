//! XLS (BIFF8) reader.
//!
//! Opens a Compound File Binary (CFB/OLE2) container, decrypts the
//! `Workbook` stream when it carries a FILEPASS record, parses the
//! workbook globals and then each worksheet substream.

mod sheet;
mod stream;

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use hadoopoffice_core::{DocumentProperties, Workbook};

use crate::biff::links::LinkTable;
use crate::biff::payload::Payload;
use crate::biff::ptg::DecodeContext;
use crate::biff::strings::parse_sst;
use crate::biff::{self, records, BiffRecord, RecordIter};
use crate::crypt::decrypt_stream;
use crate::error::{XlsError, XlsResult};
use crate::styles::StyleTable;
use crate::summary::{read_summary_information, STREAM_NAME};

pub(crate) use sheet::SheetCells;
pub use stream::{StreamRow, XlsStreamReader};

/// XLS file reader.
pub struct XlsReader;

/// A BOUNDSHEET entry that is a worksheet
#[derive(Debug, Clone)]
pub(crate) struct SheetEntry {
    pub name: String,
    /// Stream offset of the sheet's BOF
    pub offset: usize,
}

/// Workbook-wide tables needed to decode the sheets
#[derive(Debug)]
pub(crate) struct Globals {
    /// Worksheets in workbook order; charts and macro sheets are skipped
    pub sheets: Vec<SheetEntry>,
    /// Every BOUNDSHEET name, which 3D references index into
    pub sheet_names: Vec<String>,
    pub sst: Vec<String>,
    pub styles: StyleTable,
    pub links: LinkTable,
    /// Defined names in NAME record order
    pub names: Vec<String>,
    pub date_1904: bool,
}

impl XlsReader {
    /// Read an XLS file from a filesystem path.
    pub fn read_file<P: AsRef<Path>>(path: P, password: Option<&str>) -> XlsResult<Workbook> {
        let file = File::open(path.as_ref())?;
        Self::read(BufReader::new(file), password)
    }

    /// Read a whole workbook into memory, cells, comments, document
    /// properties and external links included. `password` opens an
    /// encrypted workbook.
    pub fn read<R: Read + Seek>(reader: R, password: Option<&str>) -> XlsResult<Workbook> {
        let (stream, properties) = open_workbook(reader, password)?;
        let globals = Globals::parse(&stream)?;

        let mut workbook = Workbook::empty();
        workbook.set_date_1904(globals.date_1904);
        *workbook.properties_mut() = properties;
        for link in globals.links.external_links() {
            workbook.add_external_link(link.clone());
        }

        for entry in &globals.sheets {
            let sheet_idx = workbook.add_worksheet_with_name(&entry.name)?;
            let worksheet = workbook
                .worksheet_mut(sheet_idx)
                .ok_or_else(|| XlsError::Parse(format!("sheet {} vanished", entry.name)))?;

            let mut cells = SheetCells::new(&stream, entry.offset)?;
            while let Some((row, col, cell)) = cells.next_cell(&stream, &globals)? {
                worksheet.set_cell_at(row, col, cell)?;
            }
            for ((row, col), comment) in cells.take_comments() {
                worksheet.set_comment_at(row, col, comment)?;
            }
            log::debug!("read sheet {} ({} cells)", entry.name, worksheet.cell_count());
        }

        Ok(workbook)
    }
}

/// Read the decrypted workbook stream and the summary properties
pub(crate) fn open_workbook<R: Read + Seek>(
    reader: R,
    password: Option<&str>,
) -> XlsResult<(Vec<u8>, DocumentProperties)> {
    let mut cfb = cfb::CompoundFile::open(reader)
        .map_err(|e| XlsError::InvalidFormat(format!("not a compound file: {e}")))?;

    if !cfb.exists("/Workbook") {
        if cfb.exists("/Book") {
            return Err(XlsError::UnsupportedVersion(
                "BIFF5 workbooks (Book stream) are not supported".into(),
            ));
        }
        return Err(XlsError::InvalidFormat("no Workbook stream found in CFB".into()));
    }

    let mut stream = Vec::new();
    cfb.open_stream("/Workbook")?.read_to_end(&mut stream)?;

    let mut properties = DocumentProperties::new();
    let summary_path = format!("/{STREAM_NAME}");
    if cfb.exists(&summary_path) {
        let mut data = Vec::new();
        cfb.open_stream(&summary_path)?.read_to_end(&mut data)?;
        if let Err(e) = read_summary_information(&data, &mut properties) {
            log::warn!("summary information ignored: {e}");
        }
    }

    if decrypt_stream(&mut stream, password)? {
        log::debug!("workbook stream is encrypted");
    }
    Ok((stream, properties))
}

impl Globals {
    /// Parse the workbook globals substream at the start of `stream`
    pub(crate) fn parse(stream: &[u8]) -> XlsResult<Self> {
        let mut globals = Globals {
            sheets: Vec::new(),
            sheet_names: Vec::new(),
            sst: Vec::new(),
            styles: StyleTable::new(),
            links: LinkTable::new(),
            names: Vec::new(),
            date_1904: false,
        };
        let mut boundsheets = Vec::new();
        let mut seen_bof = false;

        for record in RecordIter::new(stream) {
            let record = record?;
            match record.record_type {
                records::BOF => {
                    let (version, dt) = biff::parse_bof(&record.data)?;
                    if dt != records::BOF_WORKBOOK_GLOBALS {
                        return Err(XlsError::InvalidFormat(format!(
                            "stream starts with substream type 0x{dt:04X}"
                        )));
                    }
                    if version != records::BIFF8_VERSION {
                        return Err(XlsError::UnsupportedVersion(format!(
                            "expected BIFF8 (0x0600), got 0x{version:04X}"
                        )));
                    }
                    seen_bof = true;
                }
                records::EOF => break,
                _ if !seen_bof => {
                    return Err(XlsError::InvalidFormat("no workbook globals BOF found".into()))
                }
                records::SST => globals.sst = parse_sst(Payload::of(&record))?,
                records::BOUNDSHEET => boundsheets.push(parse_boundsheet(&record)?),
                records::DATEMODE => globals.date_1904 = Payload::of(&record).u16()? == 1,
                records::FORMAT => globals.styles.on_format(Payload::of(&record))?,
                records::XF => globals.styles.on_xf(Payload::of(&record))?,
                records::NAME => globals.names.push(parse_name(&record)?),
                records::SUPBOOK
                | records::EXTERNNAME
                | records::XCT
                | records::CRN
                | records::EXTERNSHEET => globals.links.on_record(&record)?,
                _ => {}
            }
        }
        if !seen_bof {
            return Err(XlsError::InvalidFormat("empty workbook stream".into()));
        }

        for (name, offset, kind) in boundsheets {
            globals.sheet_names.push(name.clone());
            if kind != 0 || !is_worksheet_bof(stream, offset) {
                log::debug!("skipping sheet {name} of type {kind}");
                continue;
            }
            globals.sheets.push(SheetEntry { name, offset });
        }
        Ok(globals)
    }

    pub(crate) fn decode_context(&self, row: u32, col: u16) -> DecodeContext<'_> {
        DecodeContext {
            links: &self.links,
            sheet_names: &self.sheet_names,
            names: &self.names,
            row,
            col,
        }
    }

    pub(crate) fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

/// BOUNDSHEET: lbPlyPos(4) + hsState(1) + dt(1) + name
fn parse_boundsheet(record: &BiffRecord) -> XlsResult<(String, usize, u8)> {
    let mut body = Payload::of(record);
    let offset = body.u32()? as usize;
    let _visibility = body.u8()?;
    let kind = body.u8()?;
    let name = body.short_string()?;
    Ok((name, offset, kind))
}

/// Dialog sheets share the worksheet BOUNDSHEET type; the substream's BOF
/// tells them apart
fn is_worksheet_bof(stream: &[u8], offset: usize) -> bool {
    match RecordIter::at(stream, offset).next() {
        Some(Ok(record)) if record.record_type == records::BOF => {
            matches!(biff::parse_bof(&record.data), Ok((_, records::BOF_WORKSHEET)))
        }
        _ => false,
    }
}

/// NAME: grbit(2) chKey(1) cch(1) cce(2) reserved(2) itab(2) 4 more bytes,
/// then the name characters behind a flags byte
fn parse_name(record: &BiffRecord) -> XlsResult<String> {
    let mut body = Payload::of(record);
    let grbit = body.u16()?;
    body.skip(1)?;
    let cch = u16::from(body.u8()?);
    let flags = body.seek(14).u8()?;
    if grbit & 0x0020 != 0 {
        return Ok(builtin_name(body.u8()?));
    }
    body.characters(cch, flags)
}

fn builtin_name(code: u8) -> String {
    let name = match code {
        0x00 => "Consolidate_Area",
        0x01 => "Auto_Open",
        0x02 => "Auto_Close",
        0x03 => "Extract",
        0x04 => "Database",
        0x05 => "Criteria",
        0x06 => "Print_Area",
        0x07 => "Print_Titles",
        0x08 => "Recorder",
        0x09 => "Data_Form",
        0x0A => "Auto_Activate",
        0x0B => "Auto_Deactivate",
        0x0C => "Sheet_Title",
        0x0D => "_FilterDatabase",
        other => return format!("_xlnm_{other:02X}"),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_record(data: Vec<u8>) -> BiffRecord {
        BiffRecord {
            record_type: records::NAME,
            data,
            continues: Vec::new(),
            stream_offset: 0,
        }
    }

    #[test]
    fn test_parse_name_record() {
        let mut data = vec![0u8; 14];
        data[3] = 5;
        data.push(0);
        data.extend_from_slice(b"Total");
        assert_eq!(parse_name(&name_record(data)).unwrap(), "Total");

        let mut data = vec![0u8; 14];
        data[0] = 0x20;
        data[3] = 1;
        data.extend_from_slice(&[0, 0x06]);
        assert_eq!(parse_name(&name_record(data)).unwrap(), "Print_Area");
    }

    #[test]
    fn test_truncated_name_record() {
        let mut data = vec![0u8; 14];
        data[3] = 5;
        data.extend_from_slice(&[0, b'T']);
        let err = parse_name(&name_record(data)).unwrap_err();
        assert!(matches!(err, XlsError::Truncated { record: "NAME", offset: 15, needed: 5 }));
    }

    #[test]
    fn test_not_a_compound_file() {
        let err = XlsReader::read(std::io::Cursor::new(b"PK\x03\x04 not ole".to_vec()), None)
            .unwrap_err();
        assert!(matches!(err, XlsError::InvalidFormat(_)));
    }
}
