//! Low-footprint XLSX reading
//!
//! Only the shared string table, the cell formats and the XML of the sheet
//! being read are held in memory. Rows come out in sheet order without a
//! cell map being built; formulas carry the values cached in the file.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::sync::Arc;

use quick_xml::reader::Reader;
use zip::ZipArchive;

use super::sheet::{CellTables, ParsedRow, SheetRows};
use super::{open_archive, read_links, read_properties, read_tables};
use crate::error::{XlsxError, XlsxResult};
use crate::package::{read_comments, read_package, PackageInfo};
use crate::xml::{open_part, read_part};
use hadoopoffice_core::{Cell, CellComment, DocumentProperties, ExternalLink};

/// One row produced by [`XlsxStreamReader`]
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRow {
    /// Index of the sheet in the workbook
    pub sheet: usize,
    /// 0-based row index
    pub row: u32,
    /// Cells in column order
    pub cells: Vec<(u16, Cell)>,
}

struct CurrentSheet {
    sheet: usize,
    rows: SheetRows<Cursor<Vec<u8>>>,
    comments: HashMap<(u32, u16), CellComment>,
    /// Row index the next emitted row must have
    expected: u32,
    /// Row read ahead while gap rows are emitted
    pending: Option<ParsedRow>,
}

/// Streaming reader emitting every row `0..=last_row` of each sheet.
/// Rows missing from the file come out empty, and a sheet without rows
/// yields one empty row.
pub struct XlsxStreamReader<R: Read + Seek> {
    archive: ZipArchive<R>,
    info: PackageInfo,
    tables: Arc<CellTables>,
    properties: DocumentProperties,
    links: Vec<ExternalLink>,
    /// Sheets still to read, in order
    queue: Vec<usize>,
    current: Option<CurrentSheet>,
}

impl<R: Read + Seek> XlsxStreamReader<R> {
    pub fn new(reader: R) -> XlsxResult<Self> {
        let mut archive = open_archive(reader)?;
        let info = read_package(&mut archive)?;
        let links = read_links(&mut archive, &info)?;
        let tables = Arc::new(read_tables(&mut archive, &info, &links)?);
        let mut properties = DocumentProperties::new();
        read_properties(&mut archive, &info, &mut properties)?;
        let queue = (0..info.sheets.len()).rev().collect();
        Ok(Self {
            archive,
            info,
            tables,
            properties,
            links,
            queue,
            current: None,
        })
    }

    /// Restrict reading to these sheets, in workbook order
    pub fn select_sheets(&mut self, sheets: &[usize]) {
        let mut selected: Vec<usize> = sheets
            .iter()
            .copied()
            .filter(|&s| s < self.info.sheets.len())
            .collect();
        selected.sort_unstable();
        selected.dedup();
        selected.reverse();
        self.queue = selected;
        self.current = None;
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.info.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn date_1904(&self) -> bool {
        self.info.date_1904
    }

    pub fn properties(&self) -> &DocumentProperties {
        &self.properties
    }

    pub fn external_links(&self) -> &[ExternalLink] {
        &self.links
    }

    fn open_sheet(&mut self, sheet: usize) -> XlsxResult<CurrentSheet> {
        let entry = &self.info.sheets[sheet];
        let xml = read_part(&mut self.archive, &entry.path)?
            .ok_or_else(|| XlsxError::MissingPart(entry.path.clone()))?;
        let mut comments = HashMap::new();
        if let Some(path) = &entry.comments {
            if let Some(xml_reader) = open_part(&mut self.archive, path)? {
                for (addr, comment) in read_comments(xml_reader)? {
                    comments.insert((addr.row, addr.col), comment);
                }
            }
        }
        log::debug!("streaming sheet {} ({} bytes of XML)", entry.name, xml.len());
        Ok(CurrentSheet {
            sheet,
            rows: SheetRows::new(Reader::from_reader(Cursor::new(xml)), Arc::clone(&self.tables)),
            comments,
            expected: 0,
            pending: None,
        })
    }

    /// The next row, `None` once every selected sheet is read
    pub fn next_row(&mut self) -> XlsxResult<Option<StreamRow>> {
        loop {
            if self.current.is_none() {
                let Some(sheet) = self.queue.pop() else {
                    return Ok(None);
                };
                self.current = Some(self.open_sheet(sheet)?);
            }
            let Some(current) = self.current.as_mut() else {
                continue;
            };

            let next = match current.pending.take() {
                Some(row) => Some(row),
                None => current.rows.next_row()?,
            };
            match next {
                Some((row, _)) if row < current.expected => {
                    log::warn!("row {} out of order in sheet {}, skipped", row + 1, current.sheet);
                }
                Some((row, cells)) if row > current.expected => {
                    let gap = current.expected;
                    current.expected += 1;
                    current.pending = Some((row, cells));
                    let mut cells = Vec::new();
                    attach_comments(&mut current.comments, gap, &mut cells);
                    return Ok(Some(StreamRow {
                        sheet: current.sheet,
                        row: gap,
                        cells,
                    }));
                }
                Some((row, mut cells)) => {
                    current.expected = row + 1;
                    attach_comments(&mut current.comments, row, &mut cells);
                    return Ok(Some(StreamRow {
                        sheet: current.sheet,
                        row,
                        cells,
                    }));
                }
                None => {
                    let sheet = current.sheet;
                    let empty_sheet = current.expected == 0;
                    self.current = None;
                    if empty_sheet {
                        return Ok(Some(StreamRow {
                            sheet,
                            row: 0,
                            cells: Vec::new(),
                        }));
                    }
                }
            }
        }
    }
}

/// Move the comments of `row` onto its cells. Comments on cells without a
/// value get an empty cell.
fn attach_comments(
    comments: &mut HashMap<(u32, u16), CellComment>,
    row: u32,
    cells: &mut Vec<(u16, Cell)>,
) {
    if comments.is_empty() {
        return;
    }
    for (col, cell) in cells.iter_mut() {
        if let Some(comment) = comments.remove(&(row, *col)) {
            cell.comment = Some(comment);
        }
    }
    let orphans: Vec<(u32, u16)> = comments.keys().copied().filter(|(r, _)| *r == row).collect();
    if orphans.is_empty() {
        return;
    }
    for key in orphans {
        if let Some(comment) = comments.remove(&key) {
            cells.push((
                key.1,
                Cell {
                    comment: Some(comment),
                    ..Cell::default()
                },
            ));
        }
    }
    cells.sort_by_key(|(col, _)| *col);
}

impl<R: Read + Seek> Iterator for XlsxStreamReader<R> {
    type Item = XlsxResult<StreamRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}
