//! Record writer: cells in, one workbook file out
//!
//! Cells are collected in a [`Workbook`] (optionally a loaded template)
//! and nothing touches the output file before [`ExcelRecordWriter::close`].

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use hadoopoffice_core::properties::PropertySet;
use hadoopoffice_core::{CellAddress, CellComment, CellValue, Workbook};
use hadoopoffice_crypto::encrypt_ooxml;
use hadoopoffice_xls::{XlsWriteOptions, XlsWriter};
use hadoopoffice_xlsx::{XlsxWriteOptions, XlsxWriter};

use crate::calculation::{load_linked_workbooks, CalculationOptions, WorkbookCalculationExt};
use crate::codec::CompressionCodec;
use crate::config::{EncryptAlgorithm, HadoopOfficeWriteConfiguration};
use crate::dao::SpreadSheetCellDAO;
use crate::document::{load_workbook, SpreadsheetFormat};
use crate::error::{Error, Result};

const DEFAULT_SHEET: &str = "Sheet1";

/// Accumulates cells and writes them as one workbook on close
pub struct ExcelRecordWriter {
    path: PathBuf,
    config: HadoopOfficeWriteConfiguration,
    codec: Option<CompressionCodec>,
    workbook: Workbook,
    cells_written: u64,
}

impl ExcelRecordWriter {
    /// Writer of the file at `path`. The configured template, if any, is
    /// loaded right away.
    pub fn new(
        path: impl Into<PathBuf>,
        config: HadoopOfficeWriteConfiguration,
        codec: Option<CompressionCodec>,
    ) -> Result<Self> {
        let workbook = match &config.template_file {
            Some(template) => {
                let workbook = load_workbook(template, config.template_password.as_deref())
                    .map_err(|e| {
                        Error::Template(format!("cannot load {}: {e}", template.display()))
                    })?;
                log::info!("using template {}", template.display());
                workbook
            }
            None => Workbook::empty(),
        };
        Ok(Self {
            path: path.into(),
            config,
            codec,
            workbook,
            cells_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cells_written(&self) -> u64 {
        self.cells_written
    }

    /// Store one cell. A non-empty formula wins over the formatted value.
    pub fn write(&mut self, cell: &SpreadSheetCellDAO) -> Result<()> {
        let sheet_idx = self
            .workbook
            .sheet_index_or_insert(cell.sheet_name())
            .map_err(|e| Error::Writer(format!("sheet {:?}: {e}", cell.sheet_name())))?;
        let address = CellAddress::parse(cell.address())
            .map_err(|e| Error::Writer(format!("address {:?}: {e}", cell.address())))?;

        let value = if !cell.formula().is_empty() {
            CellValue::formula(cell.formula())
        } else if cell.formatted_value().is_empty() {
            CellValue::Empty
        } else {
            CellValue::text(cell.formatted_value())
        };

        let author = self.config.comment_author.as_str();
        let sheet = self
            .workbook
            .worksheet_mut(sheet_idx)
            .ok_or_else(|| Error::Writer(format!("sheet {} vanished", cell.sheet_name())))?;
        sheet
            .set_value_at(address.row, address.col, value)
            .map_err(|e| Error::Writer(e.to_string()))?;
        if !cell.comment().is_empty() {
            sheet
                .set_comment_at(
                    address.row,
                    address.col,
                    CellComment::new(author, cell.comment()),
                )
                .map_err(|e| Error::Writer(e.to_string()))?;
        }
        self.cells_written += 1;
        Ok(())
    }

    /// Calculate, serialize, encrypt and compress the workbook, then write
    /// it out. Returns the path written.
    pub fn close(mut self) -> Result<PathBuf> {
        if self.workbook.is_empty() {
            self.workbook.add_worksheet_with_name(DEFAULT_SHEET)?;
        }
        self.calculate()?;
        self.apply_metadata()?;

        let bytes = self.serialize()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&self.path)?);
        match self.codec {
            Some(codec) => {
                codec.compress(&bytes, &mut out)?;
            }
            None => out.write_all(&bytes)?,
        }
        out.flush()?;
        log::info!(
            "wrote {} ({} cells, {} bytes before compression)",
            self.path.display(),
            self.cells_written,
            bytes.len()
        );
        Ok(self.path)
    }

    fn calculate(&mut self) -> Result<()> {
        let links = load_linked_workbooks(&self.config.linked_workbooks)?;
        let links = (!links.is_empty()).then_some(links);
        let options = CalculationOptions {
            keep_cached_on_missing: true,
        };
        let formula_error = |e: Error| match e {
            Error::Formula(f) => Error::Writer(format!("cannot calculate formulas: {f}")),
            other => other,
        };
        self.workbook
            .register_links(links.as_ref())
            .map_err(formula_error)?;
        self.workbook
            .recalculate(links.as_ref(), &options)
            .map_err(formula_error)?;
        Ok(())
    }

    fn property_set(&self) -> PropertySet {
        match self.config.format {
            SpreadsheetFormat::Xlsx => PropertySet::Ooxml,
            SpreadsheetFormat::Xls => PropertySet::Biff8,
        }
    }

    fn apply_metadata(&mut self) -> Result<()> {
        let set = self.property_set();
        let properties = self.workbook.properties_mut();
        for (name, value) in &self.config.metadata {
            let known = properties
                .set(set, name, value)
                .map_err(|e| Error::Configuration(e.to_string()))?;
            if !known {
                log::warn!("metadata {name} is not supported for {set:?} files, ignored");
            }
        }
        Ok(())
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        match self.config.format {
            SpreadsheetFormat::Xlsx => {
                let options = XlsxWriteOptions {
                    shared_strings: !self.config.low_footprint,
                };
                let package =
                    XlsxWriter::to_bytes(&self.workbook, &options).map_err(writer_error)?;
                match &self.config.password {
                    Some(password) => {
                        let options = self.config.encrypt_options()?;
                        encrypt_ooxml(&package, password, &options).map_err(writer_error)
                    }
                    None => Ok(package),
                }
            }
            SpreadsheetFormat::Xls => {
                if self.config.password.is_some()
                    && self.config.encrypt_algorithm != EncryptAlgorithm::Rc4
                {
                    log::warn!(
                        "xls output is encrypted with rc4, ignoring {:?}",
                        self.config.encrypt_algorithm
                    );
                }
                let options = XlsWriteOptions {
                    password: self.config.password.clone(),
                };
                XlsWriter::to_bytes(&self.workbook, &options).map_err(writer_error)
            }
        }
    }
}

fn writer_error(e: impl std::fmt::Display) -> Error {
    Error::Writer(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer(dir: &Path) -> ExcelRecordWriter {
        ExcelRecordWriter::new(
            dir.join("out.xlsx"),
            HadoopOfficeWriteConfiguration::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_write_accumulates_cells() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path());
        w.write(&SpreadSheetCellDAO::new("x", "note", "", "B2", "Data"))
            .unwrap();
        w.write(&SpreadSheetCellDAO::new("ignored", "", "=B2&\"y\"", "C2", "Data"))
            .unwrap();
        w.write(&SpreadSheetCellDAO::new("1", "", "", "A1", "First"))
            .unwrap();

        assert_eq!(w.workbook.sheet_names(), vec!["Data", "First"]);
        let sheet = w.workbook.worksheet(0).unwrap();
        assert_eq!(sheet.value_at(1, 1), &CellValue::text("x"));
        assert_eq!(
            sheet.comment_at(1, 1),
            Some(&CellComment::new("hadoopoffice", "note"))
        );
        assert_eq!(sheet.value_at(1, 2), &CellValue::formula("B2&\"y\""));

        // an empty value clears the cell; a comment on it is still kept
        w.write(&SpreadSheetCellDAO::new("", "", "", "B2", "Data"))
            .unwrap();
        w.write(&SpreadSheetCellDAO::new("", "only a note", "", "D2", "Data"))
            .unwrap();
        let sheet = w.workbook.worksheet(0).unwrap();
        assert_eq!(sheet.value_at(1, 1), &CellValue::Empty);
        assert_eq!(sheet.value_at(1, 3), &CellValue::Empty);
        assert_eq!(
            sheet.comment_at(1, 3),
            Some(&CellComment::new("hadoopoffice", "only a note"))
        );
        assert_eq!(w.cells_written(), 5);
        assert!(!dir.path().join("out.xlsx").exists());
    }

    #[test]
    fn test_invalid_cells() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path());
        assert!(matches!(
            w.write(&SpreadSheetCellDAO::new("x", "", "", "1A", "Sheet1")),
            Err(Error::Writer(_))
        ));
        assert!(matches!(
            w.write(&SpreadSheetCellDAO::new("x", "", "", "A1", "bad/name")),
            Err(Error::Writer(_))
        ));
    }

    #[test]
    fn test_missing_template() {
        let config = HadoopOfficeWriteConfiguration {
            template_file: Some(PathBuf::from("/nonexistent/template.xlsx")),
            ..HadoopOfficeWriteConfiguration::default()
        };
        assert!(matches!(
            ExcelRecordWriter::new("out.xlsx", config, None),
            Err(Error::Template(_))
        ));
    }

    #[test]
    fn test_close_writes_default_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = writer(dir.path()).close().unwrap();
        let workbook = load_workbook(&path, None).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Sheet1"]);
    }
}
