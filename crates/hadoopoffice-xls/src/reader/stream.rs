//! Row-by-row XLS reading
//!
//! The decrypted workbook stream stays in memory as bytes; cells are
//! decoded one sheet at a time and handed out a row at a time, so no
//! cell map of the workbook is built.

use std::collections::HashMap;
use std::io::{Read, Seek};

use hadoopoffice_core::{Cell, CellComment, DocumentProperties, ExternalLink};

use super::sheet::ParsedCell;
use super::{open_workbook, Globals, SheetCells};
use crate::error::XlsResult;

/// One row produced by [`XlsStreamReader`]
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
    cells: SheetCells,
    comments: HashMap<(u32, u16), CellComment>,
    /// Row index the next emitted row must have
    expected: u32,
    /// First cell of the row after the one being collected
    lookahead: Option<ParsedCell>,
    /// Row collected while gap rows are emitted
    pending: Option<(u32, Vec<(u16, Cell)>)>,
}

/// Streaming reader emitting every row `0..=last_row` of each sheet.
/// Rows without cells come out empty, and a sheet without cells yields
/// one empty row.
pub struct XlsStreamReader {
    stream: Vec<u8>,
    globals: Globals,
    properties: DocumentProperties,
    /// Sheets still to read, in reverse order
    queue: Vec<usize>,
    current: Option<CurrentSheet>,
}

impl XlsStreamReader {
    pub fn new<R: Read + Seek>(reader: R, password: Option<&str>) -> XlsResult<Self> {
        let (stream, properties) = open_workbook(reader, password)?;
        let globals = Globals::parse(&stream)?;
        let queue = (0..globals.sheets.len()).rev().collect();
        Ok(Self {
            stream,
            globals,
            properties,
            queue,
            current: None,
        })
    }

    /// Restrict reading to these sheets, in workbook order
    pub fn select_sheets(&mut self, sheets: &[usize]) {
        let mut selected: Vec<usize> = sheets
            .iter()
            .copied()
            .filter(|&s| s < self.globals.sheets.len())
            .collect();
        selected.sort_unstable();
        selected.dedup();
        selected.reverse();
        self.queue = selected;
        self.current = None;
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.globals.sheet_names()
    }

    pub fn date_1904(&self) -> bool {
        self.globals.date_1904
    }

    pub fn properties(&self) -> &DocumentProperties {
        &self.properties
    }

    pub fn external_links(&self) -> &[ExternalLink] {
        self.globals.links.external_links()
    }

    fn open_sheet(&self, sheet: usize) -> XlsResult<CurrentSheet> {
        let entry = &self.globals.sheets[sheet];
        let mut cells = SheetCells::new(&self.stream, entry.offset)?;
        let comments = cells.take_comments();
        log::debug!("streaming sheet {} at offset {}", entry.name, entry.offset);
        Ok(CurrentSheet {
            sheet,
            cells,
            comments,
            expected: 0,
            lookahead: None,
            pending: None,
        })
    }

    /// Cells of the next row present in the file
    fn read_row(
        current: &mut CurrentSheet,
        stream: &[u8],
        globals: &Globals,
    ) -> XlsResult<Option<(u32, Vec<(u16, Cell)>)>> {
        let first = match current.lookahead.take() {
            Some(cell) => cell,
            None => match current.cells.next_cell(stream, globals)? {
                Some(cell) => cell,
                None => return Ok(None),
            },
        };
        let (row, col, cell) = first;
        let mut cells = vec![(col, cell)];
        while let Some((r, c, cell)) = current.cells.next_cell(stream, globals)? {
            if r != row {
                current.lookahead = Some((r, c, cell));
                break;
            }
            cells.push((c, cell));
        }
        cells.sort_by_key(|(col, _)| *col);
        Ok(Some((row, cells)))
    }

    /// The next row, `None` once every selected sheet is read
    pub fn next_row(&mut self) -> XlsResult<Option<StreamRow>> {
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
                None => Self::read_row(current, &self.stream, &self.globals)?,
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
                    let expected = current.expected;
                    // Comments below the last cell still get their rows
                    let last_comment_row = current.comments.keys().map(|(r, _)| *r).max();
                    if let Some(last) = last_comment_row.filter(|&r| r >= expected) {
                        current.pending = Some((last, Vec::new()));
                        continue;
                    }
                    self.current = None;
                    if expected == 0 {
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

impl Iterator for XlsStreamReader {
    type Item = XlsResult<StreamRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}
