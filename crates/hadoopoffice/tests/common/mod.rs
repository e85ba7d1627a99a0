//! Shared helpers: workbooks are written with the record writer and read
//! back with the record reader

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use hadoopoffice::prelude::*;
use hadoopoffice::{CompressionCodec, Locale, SpreadSheetRow};

pub fn dao(value: &str, formula: &str, address: &str, sheet: &str) -> SpreadSheetCellDAO {
    SpreadSheetCellDAO::new(value, "", formula, address, sheet)
}

/// Row 1 text, row 2 empty, row 3 constant formulas, row 4 a sum
pub fn single_sheet() -> Vec<SpreadSheetCellDAO> {
    vec![
        dao("test1", "", "A1", "Sheet1"),
        dao("test2", "", "B1", "Sheet1"),
        dao("test3", "", "C1", "Sheet1"),
        dao("", "1", "A3", "Sheet1"),
        dao("", "2", "B3", "Sheet1"),
        dao("", "3", "C3", "Sheet1"),
        dao("", "A3+B3", "A4", "Sheet1"),
    ]
}

pub fn write_config(format: SpreadsheetFormat) -> HadoopOfficeWriteConfiguration {
    let mut config = HadoopOfficeWriteConfiguration::default();
    config.format = format;
    config.locale = Locale::parse("de");
    config
}

pub fn read_config() -> HadoopOfficeReadConfiguration {
    let mut config = HadoopOfficeReadConfiguration::default();
    config.locale = Locale::parse("de");
    config
}

/// Write `cells` to `path` and close the writer
pub fn write_cells(
    path: &Path,
    config: HadoopOfficeWriteConfiguration,
    codec: Option<CompressionCodec>,
    cells: &[SpreadSheetCellDAO],
) -> PathBuf {
    let mut writer = ExcelRecordWriter::new(path, config, codec).unwrap();
    for cell in cells {
        writer.write(cell).unwrap();
    }
    writer.close().unwrap()
}

pub fn try_read(
    path: &Path,
    config: &HadoopOfficeReadConfiguration,
) -> Result<Vec<(String, SpreadSheetRow)>> {
    let split = FileSplit::for_file(path)?;
    ExcelRecordReader::new(&split, config)?.collect()
}

pub fn read_records(
    path: &Path,
    config: &HadoopOfficeReadConfiguration,
) -> Vec<(String, SpreadSheetRow)> {
    try_read(path, config).unwrap()
}

/// Formatted values of a row, `None` for missing cells
pub fn values(row: &[Option<SpreadSheetCellDAO>]) -> Vec<Option<&str>> {
    row.iter()
        .map(|cell| cell.as_ref().map(|c| c.formatted_value()))
        .collect()
}

pub fn formulas(row: &[Option<SpreadSheetCellDAO>]) -> Vec<Option<&str>> {
    row.iter()
        .map(|cell| cell.as_ref().map(|c| c.formula()))
        .collect()
}

pub fn keys(records: &[(String, SpreadSheetRow)]) -> Vec<&str> {
    records.iter().map(|(key, _)| key.as_str()).collect()
}
