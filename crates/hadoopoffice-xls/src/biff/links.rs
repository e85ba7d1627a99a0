//! Link table: SUPBOOK, EXTERNNAME, XCT, CRN and EXTERNSHEET records.
//!
//! 3D references in formulas point at an entry of the EXTERNSHEET list
//! (an XTI), which names a supporting workbook and a sheet within it.
//! Supporting workbook 0 is usually the workbook itself; the others are
//! linked files whose referenced cells are cached in XCT/CRN records.

use hadoopoffice_core::external::file_name_of;
use hadoopoffice_core::{CellError, CellValue, ExternalLink, Workbook};

use super::payload::Payload;
use super::strings::write_unicode_string;
use super::{push_record, records, BiffRecord};
use crate::error::{XlsError, XlsResult};

/// Marker of the SUPBOOK describing the workbook itself
const INTERNAL_MARKER: u16 = 0x0401;
/// Marker of the SUPBOOK holding add-in function names
const ADDIN_MARKER: u16 = 0x3A01;

#[derive(Debug, Clone, PartialEq)]
enum SupBookKind {
    Internal,
    AddIn,
    /// Index into [`LinkTable::links`]
    External(usize),
}

#[derive(Debug, Clone)]
struct SupBook {
    kind: SupBookKind,
    /// EXTERNNAME records following the SUPBOOK
    names: Vec<String>,
}

/// One EXTERNSHEET entry
#[derive(Debug, Clone, Copy)]
struct Xti {
    supbook: u16,
    first: i16,
}

/// Where an XTI points
#[derive(Debug, Clone, PartialEq)]
pub enum SheetTarget {
    /// A sheet of this workbook, by BOUNDSHEET position
    Internal(usize),
    /// A sheet of a linked workbook
    External { file_name: String, sheet: String },
    /// A deleted sheet
    Invalid,
}

/// Link records of the globals substream
#[derive(Debug, Default)]
pub struct LinkTable {
    books: Vec<SupBook>,
    xti: Vec<Xti>,
    links: Vec<ExternalLink>,
    /// (link, sheet) the CRN records being read belong to
    cached_sheet: Option<(usize, usize)>,
}

/// Turn a SUPBOOK virtual path into a plain file name. Control characters
/// 0x01..=0x08 encode volumes and directory steps.
fn file_name_from_virt_path(virt_path: &str) -> String {
    let path: String = virt_path
        .chars()
        .map(|c| if ('\u{1}'..='\u{8}').contains(&c) { '/' } else { c })
        .filter(|&c| c != '\0')
        .collect();
    let name = file_name_of(path.trim()).trim();
    let name = match name.strip_prefix('[').and_then(|n| n.strip_suffix(']')) {
        Some(inner) => inner,
        None => name,
    };
    name.to_string()
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a globals record; records unrelated to links are ignored
    pub fn on_record(&mut self, record: &BiffRecord) -> XlsResult<()> {
        let body = Payload::of(record);
        match record.record_type {
            records::SUPBOOK => self.parse_supbook(body),
            records::EXTERNNAME => self.parse_externname(body),
            records::XCT => self.parse_xct(body),
            records::CRN => self.parse_crn(body),
            records::EXTERNSHEET => self.parse_externsheet(body),
            _ => Ok(()),
        }
    }

    fn parse_supbook(&mut self, mut body: Payload<'_>) -> XlsResult<()> {
        self.cached_sheet = None;
        let ctab = body.u16()?;
        if body.len() == 4 {
            let marker = body.u16()?;
            let kind = match marker {
                INTERNAL_MARKER => SupBookKind::Internal,
                ADDIN_MARKER => SupBookKind::AddIn,
                other => {
                    return Err(XlsError::Parse(format!("unknown SUPBOOK marker 0x{other:04X}")))
                }
            };
            self.books.push(SupBook {
                kind,
                names: Vec::new(),
            });
            return Ok(());
        }

        let virt_path = body.unicode_string()?;
        let mut link = ExternalLink::new(file_name_from_virt_path(&virt_path));
        for _ in 0..ctab {
            let sheet = body.unicode_string()?;
            link.sheet_names.push(sheet);
        }
        log::debug!(
            "linked workbook {} with {} sheets",
            link.file_name,
            link.sheet_names.len()
        );
        self.links.push(link);
        self.books.push(SupBook {
            kind: SupBookKind::External(self.links.len() - 1),
            names: Vec::new(),
        });
        Ok(())
    }

    /// `grbit u16, reserved u32, cch u8, name` then a formula we skip
    fn parse_externname(&mut self, mut body: Payload<'_>) -> XlsResult<()> {
        let cch = body.seek(6).u8()?;
        let flags = body.u8()?;
        let name = body.characters(u16::from(cch), flags)?;
        match self.books.last_mut() {
            Some(book) => book.names.push(name),
            None => log::warn!("EXTERNNAME {name} without SUPBOOK ignored"),
        }
        Ok(())
    }

    fn parse_xct(&mut self, mut body: Payload<'_>) -> XlsResult<()> {
        let sheet = usize::from(body.seek(2).u16()?);
        self.cached_sheet = match self.books.last().map(|b| &b.kind) {
            Some(SupBookKind::External(link)) => Some((*link, sheet)),
            _ => None,
        };
        Ok(())
    }

    /// `colLast u8, colFirst u8, row u16`, then one SerAr per column
    fn parse_crn(&mut self, mut body: Payload<'_>) -> XlsResult<()> {
        let Some((link, sheet)) = self.cached_sheet else {
            return Ok(());
        };
        let last = u16::from(body.u8()?);
        let first = u16::from(body.u8()?);
        let row = u32::from(body.u16()?);
        let Some(link) = self.links.get_mut(link) else {
            return Ok(());
        };
        let Some(sheet_name) = link.sheet_names.get(sheet).cloned() else {
            log::warn!("cached values for unknown sheet {sheet} of {}", link.file_name);
            return Ok(());
        };
        for col in first..=last {
            let value = read_ser_ar(&mut body)?;
            if !value.is_empty() {
                link.set_cached_value(&sheet_name, row, col, value);
            }
        }
        Ok(())
    }

    fn parse_externsheet(&mut self, mut body: Payload<'_>) -> XlsResult<()> {
        let count = body.u16()?;
        self.xti.clear();
        for _ in 0..count {
            let supbook = body.u16()?;
            let first = body.i16()?;
            let _last = body.i16()?;
            self.xti.push(Xti { supbook, first });
        }
        Ok(())
    }

    /// Resolve the sheet an XTI index points at
    pub fn sheet_target(&self, ixti: u16) -> XlsResult<SheetTarget> {
        let xti = self
            .xti
            .get(ixti as usize)
            .ok_or_else(|| XlsError::Formula(format!("unknown EXTERNSHEET index {ixti}")))?;
        if xti.first < 0 {
            return Ok(SheetTarget::Invalid);
        }
        let book = self
            .books
            .get(xti.supbook as usize)
            .ok_or_else(|| XlsError::Formula(format!("unknown SUPBOOK {}", xti.supbook)))?;
        match &book.kind {
            SupBookKind::Internal => Ok(SheetTarget::Internal(xti.first as usize)),
            SupBookKind::External(link) => {
                let link = &self.links[*link];
                let sheet = link
                    .sheet_names
                    .get(xti.first as usize)
                    .cloned()
                    .ok_or_else(|| {
                        XlsError::Formula(format!("unknown sheet {} of {}", xti.first, link.file_name))
                    })?;
                Ok(SheetTarget::External {
                    file_name: link.file_name.clone(),
                    sheet,
                })
            }
            SupBookKind::AddIn => Err(XlsError::Formula("sheet reference into add-in".into())),
        }
    }

    /// Name `index` (1-based) of the supporting workbook of an XTI
    pub fn extern_name(&self, ixti: u16, index: u16) -> Option<&str> {
        let xti = self.xti.get(ixti as usize)?;
        let book = self.books.get(xti.supbook as usize)?;
        book.names
            .get((index as usize).checked_sub(1)?)
            .map(String::as_str)
    }

    /// Linked workbooks with their cached cell values
    pub fn external_links(&self) -> &[ExternalLink] {
        &self.links
    }
}

fn read_ser_ar(body: &mut Payload<'_>) -> XlsResult<CellValue> {
    let kind = body.u8()?;
    let value = match kind {
        0x00 => {
            body.skip(8)?;
            CellValue::Empty
        }
        0x01 => CellValue::Number(body.f64()?),
        0x02 => CellValue::Text(body.unicode_string()?),
        0x04 => CellValue::Boolean(body.bytes(8)?[0] != 0),
        0x10 => CellValue::Error(CellError::from_code(body.bytes(8)?[0])),
        other => return Err(XlsError::Parse(format!("unknown cached value type 0x{other:02X}"))),
    };
    Ok(value)
}

fn write_ser_ar(out: &mut Vec<u8>, value: &CellValue) {
    match value.effective_value() {
        CellValue::Number(n) => {
            out.push(0x01);
            out.extend_from_slice(&n.to_le_bytes());
        }
        CellValue::Text(s) => {
            out.push(0x02);
            write_unicode_string(out, s);
        }
        CellValue::Boolean(b) => {
            out.push(0x04);
            out.extend_from_slice(&[u8::from(*b), 0, 0, 0, 0, 0, 0, 0]);
        }
        CellValue::Error(e) => {
            out.push(0x10);
            out.extend_from_slice(&[e.code(), 0, 0, 0, 0, 0, 0, 0]);
        }
        _ => {
            out.push(0x00);
            out.extend_from_slice(&[0; 8]);
        }
    }
}

/// Collects the XTI entries formulas need while a workbook is written
#[derive(Debug)]
pub struct LinkBuilder {
    sheet_names: Vec<String>,
    links: Vec<ExternalLink>,
    xti: Vec<(u16, u16)>,
}

impl LinkBuilder {
    pub fn new(workbook: &Workbook) -> Self {
        Self {
            sheet_names: workbook.sheet_names().iter().map(|s| s.to_string()).collect(),
            links: workbook.external_links().to_vec(),
            xti: Vec::new(),
        }
    }

    /// XTI index for a sheet of this workbook or of a linked one. The
    /// workbook is a file name or a 1-based link position.
    pub fn ixti(&mut self, workbook: Option<&str>, sheet: &str) -> XlsResult<u16> {
        let entry = match workbook {
            None => {
                let idx = self
                    .sheet_names
                    .iter()
                    .position(|s| s.eq_ignore_ascii_case(sheet))
                    .ok_or_else(|| XlsError::Formula(format!("unknown sheet {sheet}")))?;
                (0, idx as u16)
            }
            Some(book) => {
                let link = match book.parse::<usize>() {
                    Ok(n) if n >= 1 && n <= self.links.len() => n - 1,
                    _ => self
                        .links
                        .iter()
                        .position(|l| l.matches_file(book))
                        .ok_or_else(|| {
                            XlsError::Formula(format!("no external link registered for workbook {book}"))
                        })?,
                };
                let sheet_idx = self.links[link].sheet_index_or_insert(sheet);
                (link as u16 + 1, sheet_idx as u16)
            }
        };
        let idx = match self.xti.iter().position(|&x| x == entry) {
            Some(idx) => idx,
            None => {
                self.xti.push(entry);
                self.xti.len() - 1
            }
        };
        Ok(idx as u16)
    }

    /// SUPBOOK, XCT/CRN and EXTERNSHEET records; nothing when no formula
    /// uses a 3D reference
    pub fn to_records(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if self.xti.is_empty() {
            return out;
        }

        let mut internal = Vec::with_capacity(4);
        internal.extend_from_slice(&(self.sheet_names.len() as u16).to_le_bytes());
        internal.extend_from_slice(&INTERNAL_MARKER.to_le_bytes());
        push_record(&mut out, records::SUPBOOK, &internal);

        for link in &self.links {
            let mut supbook = Vec::new();
            supbook.extend_from_slice(&(link.sheet_names.len() as u16).to_le_bytes());
            write_unicode_string(&mut supbook, &link.file_name);
            for sheet in &link.sheet_names {
                write_unicode_string(&mut supbook, sheet);
            }
            push_record(&mut out, records::SUPBOOK, &supbook);
            write_cached_sheets(&mut out, link);
        }

        let mut externsheet = Vec::with_capacity(2 + self.xti.len() * 6);
        externsheet.extend_from_slice(&(self.xti.len() as u16).to_le_bytes());
        for &(supbook, sheet) in &self.xti {
            externsheet.extend_from_slice(&supbook.to_le_bytes());
            externsheet.extend_from_slice(&sheet.to_le_bytes());
            externsheet.extend_from_slice(&sheet.to_le_bytes());
        }
        push_record(&mut out, records::EXTERNSHEET, &externsheet);
        out
    }
}

/// One XCT per sheet with cached values, then a CRN per run of adjacent
/// cells in a row
fn write_cached_sheets(out: &mut Vec<u8>, link: &ExternalLink) {
    for sheet in 0..link.sheet_names.len() {
        let cells: Vec<(u32, u16, &CellValue)> = link
            .cached
            .range((sheet, 0u32, 0u16)..(sheet + 1, 0u32, 0u16))
            .filter(|((_, row, col), _)| *row < records::MAX_ROWS && *col < records::MAX_COLS)
            .map(|((_, row, col), v)| (*row, *col, v))
            .collect();
        if cells.is_empty() {
            continue;
        }

        let mut runs: Vec<Vec<(u32, u16, &CellValue)>> = Vec::new();
        for cell in cells {
            match runs.last_mut() {
                Some(run)
                    if run.last().map(|&(r, c, _)| (r, c + 1)) == Some((cell.0, cell.1)) =>
                {
                    run.push(cell)
                }
                _ => runs.push(vec![cell]),
            }
        }

        let mut xct = Vec::with_capacity(4);
        xct.extend_from_slice(&(runs.len() as i16).to_le_bytes());
        xct.extend_from_slice(&(sheet as u16).to_le_bytes());
        push_record(out, records::XCT, &xct);

        for run in runs {
            let (row, first, _) = run[0];
            let last = first + run.len() as u16 - 1;
            let mut crn = vec![last as u8, first as u8];
            crn.extend_from_slice(&(row as u16).to_le_bytes());
            for (_, _, value) in run {
                write_ser_ar(&mut crn, value);
            }
            push_record(out, records::CRN, &crn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biff::RecordIter;

    #[test]
    fn test_file_name_from_virt_path() {
        assert_eq!(file_name_from_virt_path("linked.xls"), "linked.xls");
        assert_eq!(
            file_name_from_virt_path("\u{1}C\u{3}data\u{3}linked.xls"),
            "linked.xls"
        );
        assert_eq!(file_name_from_virt_path("[book.xls]"), "book.xls");
    }

    #[test]
    fn test_link_records_roundtrip() {
        let mut wb = Workbook::new();
        let mut link = ExternalLink::new("excel2003linkedwb1.xls");
        link.set_cached_value("Sheet1", 0, 0, CellValue::Number(6.0));
        link.set_cached_value("Sheet1", 0, 1, CellValue::text("x"));
        link.set_cached_value("Sheet1", 4, 2, CellValue::Boolean(true));
        wb.add_external_link(link);

        let mut builder = LinkBuilder::new(&wb);
        assert_eq!(builder.ixti(Some("excel2003linkedwb1.xls"), "Sheet1").unwrap(), 0);
        assert_eq!(builder.ixti(None, "Sheet1").unwrap(), 1);
        assert_eq!(builder.ixti(Some("1"), "sheet1").unwrap(), 0);
        assert!(builder.ixti(Some("missing.xls"), "Sheet1").is_err());
        assert!(builder.ixti(None, "Nope").is_err());

        let bytes = builder.to_records();
        let mut table = LinkTable::new();
        for record in RecordIter::new(&bytes) {
            table.on_record(&record.unwrap()).unwrap();
        }
        assert_eq!(
            table.sheet_target(0).unwrap(),
            SheetTarget::External {
                file_name: "excel2003linkedwb1.xls".into(),
                sheet: "Sheet1".into()
            }
        );
        assert_eq!(table.sheet_target(1).unwrap(), SheetTarget::Internal(0));

        let links = table.external_links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].cached_value("Sheet1", 0, 0), Some(&CellValue::Number(6.0)));
        assert_eq!(links[0].cached_value("Sheet1", 0, 1), Some(&CellValue::text("x")));
        assert_eq!(links[0].cached_value("Sheet1", 4, 2), Some(&CellValue::Boolean(true)));
    }

    #[test]
    fn test_truncated_crn_names_the_record() {
        let mut wb = Workbook::new();
        let mut link = ExternalLink::new("linked.xls");
        link.set_cached_value("Sheet1", 0, 0, CellValue::Number(10.0));
        wb.add_external_link(link);
        let mut builder = LinkBuilder::new(&wb);
        builder.ixti(Some("linked.xls"), "Sheet1").unwrap();
        let bytes = builder.to_records();

        let mut table = LinkTable::new();
        for record in RecordIter::new(&bytes) {
            let record = record.unwrap();
            table.on_record(&record).unwrap();
            if record.record_type == records::XCT {
                break;
            }
        }

        // one column whose number is cut after 3 of its 8 bytes
        let crn = BiffRecord {
            record_type: records::CRN,
            data: vec![0, 0, 0, 0, 0x01, 1, 2, 3],
            continues: Vec::new(),
            stream_offset: 0,
        };
        let err = table.on_record(&crn).unwrap_err();
        assert!(matches!(
            err,
            XlsError::Truncated {
                record: "CRN",
                offset: 5,
                needed: 8
            }
        ));
    }
}
