//! Record reader: a workbook as a sequence of rows
//!
//! Rows come either from a fully parsed and recalculated [`Workbook`] or,
//! in low-footprint mode, straight from the format's streaming reader.
//! Both are [`RowSource`]s; [`ExcelRecordReader`] turns their rows into
//! keyed [`SpreadSheetCellDAO`] arrays.

use std::path::Path;

use hadoopoffice_core::properties::PropertySet;
use hadoopoffice_core::{Cell, CellAddress, CellFormatter, Workbook};

use crate::calculation::{load_links_beside, CalculationOptions, WorkbookCalculationExt};
use crate::codec::read_input;
use crate::config::HadoopOfficeReadConfiguration;
use crate::dao::{SpreadSheetCellDAO, SpreadSheetRow};
use crate::document::{Document, RowStream, SpreadsheetFormat};
use crate::error::Result;
use crate::filter::MetadataFilter;
use crate::split::FileSplit;
use crate::writable::{ArrayWritable, Text};

/// One row of a sheet with its cells in column order
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub sheet_name: String,
    /// 0-based row index
    pub row: u32,
    pub cells: Vec<(u16, Cell)>,
}

/// Producer of the rows of the selected sheets: every row
/// `0..=last_row` of a sheet in order, and one empty row for an empty sheet
pub trait RowSource: Send {
    fn next_row(&mut self) -> Result<Option<SourceRow>>;

    /// Whether date serials count from 1904
    fn date_1904(&self) -> bool;
}

/// Rows of a workbook held in memory
pub struct WorkbookRows {
    workbook: Workbook,
    sheets: Vec<usize>,
    position: usize,
    next_row: u32,
}

impl WorkbookRows {
    pub fn new(workbook: Workbook, sheets: Vec<usize>) -> Self {
        Self {
            workbook,
            sheets,
            position: 0,
            next_row: 0,
        }
    }
}

impl RowSource for WorkbookRows {
    fn next_row(&mut self) -> Result<Option<SourceRow>> {
        loop {
            let Some(&sheet_idx) = self.sheets.get(self.position) else {
                return Ok(None);
            };
            let Some(sheet) = self.workbook.worksheet(sheet_idx) else {
                self.position += 1;
                continue;
            };
            if self.next_row > sheet.last_row().unwrap_or(0) {
                self.position += 1;
                self.next_row = 0;
                continue;
            }
            let row = self.next_row;
            self.next_row += 1;
            return Ok(Some(SourceRow {
                sheet_name: sheet.name().to_string(),
                row,
                cells: sheet
                    .row_cells(row)
                    .map(|(col, cell)| (col, cell.clone()))
                    .collect(),
            }));
        }
    }

    fn date_1904(&self) -> bool {
        self.workbook.date_1904()
    }
}

/// Rows read by a streaming reader, formulas carrying their cached values
pub struct StreamRows {
    stream: RowStream,
    sheet_names: Vec<String>,
    date_1904: bool,
}

impl StreamRows {
    pub fn new(mut stream: RowStream, sheets: &[usize]) -> Self {
        let (sheet_names, date_1904) = match &mut stream {
            RowStream::Xlsx(reader) => {
                reader.select_sheets(sheets);
                (owned(reader.sheet_names()), reader.date_1904())
            }
            RowStream::Xls(reader) => {
                reader.select_sheets(sheets);
                (owned(reader.sheet_names()), reader.date_1904())
            }
        };
        Self {
            stream,
            sheet_names,
            date_1904,
        }
    }

    fn sheet_name(&self, sheet: usize) -> String {
        self.sheet_names.get(sheet).cloned().unwrap_or_default()
    }
}

fn owned(names: Vec<&str>) -> Vec<String> {
    names.into_iter().map(str::to_string).collect()
}

impl RowSource for StreamRows {
    fn next_row(&mut self) -> Result<Option<SourceRow>> {
        let next = match &mut self.stream {
            RowStream::Xlsx(reader) => reader.next_row()?.map(|r| (r.sheet, r.row, r.cells)),
            RowStream::Xls(reader) => reader.next_row()?.map(|r| (r.sheet, r.row, r.cells)),
        };
        Ok(next.map(|(sheet, row, cells)| SourceRow {
            sheet_name: self.sheet_name(sheet),
            row,
            cells,
        }))
    }

    fn date_1904(&self) -> bool {
        self.date_1904
    }
}

/// Indices of the sheets to read, in workbook order. Unknown names are
/// logged and skipped.
pub fn select_sheets(sheet_names: &[&str], wanted: Option<&[String]>) -> Vec<usize> {
    let Some(wanted) = wanted else {
        return (0..sheet_names.len()).collect();
    };
    let mut selected = Vec::new();
    for name in wanted {
        let found = sheet_names
            .iter()
            .position(|s| s == name)
            .or_else(|| sheet_names.iter().position(|s| s.eq_ignore_ascii_case(name)));
        match found {
            Some(idx) => selected.push(idx),
            None => log::warn!("sheet {name} not found, skipped"),
        }
    }
    selected.sort_unstable();
    selected.dedup();
    selected
}

/// Reads the rows of one workbook file as `([file]Sheet!A<row>, cells)`
pub struct ExcelRecordReader {
    file_name: String,
    source: Option<Box<dyn RowSource>>,
    formatter: CellFormatter,
    date_1904: bool,
    rows_read: u64,
}

impl ExcelRecordReader {
    /// Open the file of `split`. A file whose metadata does not pass the
    /// configured filter gives a reader without rows.
    pub fn new(split: &FileSplit, config: &HadoopOfficeReadConfiguration) -> Result<Self> {
        let file_name = split.file_name();
        log::info!("opening {}", split.path.display());
        let filter = MetadataFilter::from_config(config)?;
        let password = config.password.as_deref();
        let document = Document::open(read_input(&split.path)?, password)?;
        let property_set = match document.format() {
            SpreadsheetFormat::Xlsx => PropertySet::Ooxml,
            SpreadsheetFormat::Xls => PropertySet::Biff8,
        };

        let source: Option<Box<dyn RowSource>> = if config.low_footprint {
            let stream = document.into_stream(password)?;
            let (properties, names) = match &stream {
                RowStream::Xlsx(r) => (r.properties(), r.sheet_names()),
                RowStream::Xls(r) => (r.properties(), r.sheet_names()),
            };
            if filter.matches(properties, property_set) {
                let sheets = select_sheets(&names, config.sheets.as_deref());
                Some(Box::new(StreamRows::new(stream, &sheets)))
            } else {
                None
            }
        } else {
            let workbook = document.into_workbook(password)?;
            if filter.matches(workbook.properties(), property_set) {
                let workbook = recalculate(workbook, &split.path, config)?;
                let sheets = select_sheets(&workbook.sheet_names(), config.sheets.as_deref());
                Some(Box::new(WorkbookRows::new(workbook, sheets)))
            } else {
                None
            }
        };
        if source.is_none() {
            log::info!("{} does not match the metadata filter", split.path.display());
        }

        Ok(Self {
            file_name,
            date_1904: source.as_ref().map_or(false, |s| s.date_1904()),
            source,
            formatter: CellFormatter::new(config.locale.clone()),
            rows_read: 0,
        })
    }

    /// Whether the file passed the metadata filter
    pub fn matched_filter(&self) -> bool {
        self.source.is_some()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// The next row with its key, `None` at the end of the file
    pub fn next_record(&mut self) -> Result<Option<(String, SpreadSheetRow)>> {
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };
        let Some(row) = source.next_row()? else {
            return Ok(None);
        };
        self.rows_read += 1;
        let key = format!("[{}]{}!A{}", self.file_name, row.sheet_name, row.row + 1);
        Ok(Some((key, self.to_daos(row))))
    }

    /// Hadoop-style `next(key, value)`: fills both and returns `false` at
    /// the end of the file
    pub fn next_key_value(
        &mut self,
        key: &mut Text,
        value: &mut ArrayWritable<SpreadSheetCellDAO>,
    ) -> Result<bool> {
        match self.next_record()? {
            Some((k, row)) => {
                key.set(k);
                value.set(row);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn to_daos(&self, row: SourceRow) -> SpreadSheetRow {
        let len = row
            .cells
            .iter()
            .map(|(col, _)| *col as usize + 1)
            .max()
            .unwrap_or(0);
        let mut daos = vec![None; len];
        for (col, cell) in &row.cells {
            let address = CellAddress::new(row.row, *col);
            daos[*col as usize] = Some(SpreadSheetCellDAO::new(
                self.formatter
                    .format(&cell.value, &cell.number_format, self.date_1904),
                cell.comment.as_ref().map(|c| c.text.as_str()).unwrap_or(""),
                cell.value.formula_text().unwrap_or(""),
                address.to_string(),
                row.sheet_name.as_str(),
            ));
        }
        daos
    }
}

impl Iterator for ExcelRecordReader {
    type Item = Result<(String, SpreadSheetRow)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Re-evaluate the formulas, with the linked workbooks found next to the
/// input file when configured
fn recalculate(
    mut workbook: Workbook,
    path: &Path,
    config: &HadoopOfficeReadConfiguration,
) -> Result<Workbook> {
    let links = if config.read_linked_workbooks && !workbook.external_links().is_empty() {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        Some(load_links_beside(
            &workbook,
            dir,
            config.ignore_missing_linked_workbooks,
        )?)
    } else {
        None
    };
    let options = CalculationOptions {
        keep_cached_on_missing: !config.read_linked_workbooks
            || config.ignore_missing_linked_workbooks,
    };
    workbook.recalculate(links.as_ref(), &options)?;
    Ok(workbook)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadoopoffice_core::{CellComment, CellValue, Worksheet};

    fn workbook() -> Workbook {
        let mut wb = Workbook::empty();
        let mut first = Worksheet::new("Sheet1");
        first.set_value("A1", "a").unwrap();
        first.set_value("C1", 2.0).unwrap();
        first.set_value("B3", CellValue::formula("C1*2")).unwrap();
        first
            .set_comment("B3", CellComment::new("hadoopoffice", "doubled"))
            .unwrap();
        wb.add_existing_worksheet(first).unwrap();
        wb.add_existing_worksheet(Worksheet::new("Empty")).unwrap();
        wb
    }

    #[test]
    fn test_workbook_rows() {
        let mut rows = WorkbookRows::new(workbook(), vec![0, 1]);
        let mut seen = Vec::new();
        while let Some(row) = rows.next_row().unwrap() {
            seen.push((row.sheet_name, row.row, row.cells.len()));
        }
        assert_eq!(
            seen,
            vec![
                ("Sheet1".to_string(), 0, 2),
                ("Sheet1".to_string(), 1, 0),
                ("Sheet1".to_string(), 2, 1),
                ("Empty".to_string(), 0, 0),
            ]
        );
    }

    #[test]
    fn test_select_sheets() {
        let names = ["Sheet1", "Sheet2", "Sheet3"];
        assert_eq!(select_sheets(&names, None), vec![0, 1, 2]);
        let wanted = vec!["Sheet3".to_string(), "missing".to_string(), "sheet1".to_string()];
        assert_eq!(select_sheets(&names, Some(&wanted)), vec![0, 2]);
    }

    #[test]
    fn test_rows_become_daos() {
        let mut wb = workbook();
        wb.recalculate(None, &CalculationOptions::default()).unwrap();
        let reader = ExcelRecordReader {
            file_name: "test.xlsx".into(),
            source: None,
            formatter: CellFormatter::default(),
            date_1904: false,
            rows_read: 0,
        };
        let mut rows = WorkbookRows::new(wb, vec![0]);

        let first = reader.to_daos(rows.next_row().unwrap().unwrap());
        assert_eq!(first.len(), 3);
        assert_eq!(
            first[0],
            Some(SpreadSheetCellDAO::new("a", "", "", "A1", "Sheet1"))
        );
        assert_eq!(first[1], None);
        assert_eq!(first[2].as_ref().map(|d| d.formatted_value()), Some("2"));

        assert!(reader.to_daos(rows.next_row().unwrap().unwrap()).is_empty());

        let third = reader.to_daos(rows.next_row().unwrap().unwrap());
        assert_eq!(
            third,
            vec![
                None,
                Some(SpreadSheetCellDAO::new("4", "doubled", "C1*2", "B3", "Sheet1"))
            ]
        );
    }
}
