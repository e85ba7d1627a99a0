//! Workbook recalculation
//!
//! Formulas are evaluated before rows are handed out and before a workbook
//! is written, so that displayed values never come from stale caches.
//! References into other workbooks are resolved through the linked
//! workbooks loaded here.
//!
//! # Example
//!
//! ```rust,ignore
//! use hadoopoffice::calculation::{CalculationOptions, WorkbookCalculationExt};
//!
//! let links = load_linked_workbooks(&["/data/prices.xlsx"])?;
//! let stats = workbook.recalculate(Some(&links), &CalculationOptions::default())?;
//! println!("Calculated {} formulas", stats.formulas);
//! ```

use std::path::Path;

use hadoopoffice_core::external::file_name_of;
use hadoopoffice_core::Workbook;
use hadoopoffice_formula::{
    calculate_workbook, register_external_links, FormulaError, LinkedWorkbooks, WorkbookSource,
};

use crate::document::load_workbook;
use crate::error::{Error, Result};

/// Options for workbook calculation
#[derive(Debug, Clone, Default)]
pub struct CalculationOptions {
    /// Use the values cached in the workbook's link records when a linked
    /// workbook is not loaded, instead of failing
    pub keep_cached_on_missing: bool,
}

/// Statistics from a calculation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalculationStats {
    /// Number of formulas calculated
    pub formulas: usize,
    /// Number of linked workbooks the formulas could use
    pub linked_workbooks: usize,
}

/// Extension trait for Workbook to add calculation methods
pub trait WorkbookCalculationExt {
    /// Evaluate every formula and store the results as cached values
    fn recalculate(
        &mut self,
        links: Option<&LinkedWorkbooks>,
        options: &CalculationOptions,
    ) -> Result<CalculationStats>;

    /// Record every workbook referenced by a formula as an external link,
    /// with the referenced values cached from `links`
    fn register_links(&mut self, links: Option<&LinkedWorkbooks>) -> Result<usize>;
}

impl WorkbookCalculationExt for Workbook {
    fn recalculate(
        &mut self,
        links: Option<&LinkedWorkbooks>,
        options: &CalculationOptions,
    ) -> Result<CalculationStats> {
        let source = links.map(|l| l as &dyn WorkbookSource);
        let formulas =
            calculate_workbook(self, source, options.keep_cached_on_missing).map_err(linked_error)?;
        let stats = CalculationStats {
            formulas,
            linked_workbooks: links.map_or(0, LinkedWorkbooks::len),
        };
        log::debug!(
            "calculated {} formulas with {} linked workbooks",
            stats.formulas,
            stats.linked_workbooks
        );
        Ok(stats)
    }

    fn register_links(&mut self, links: Option<&LinkedWorkbooks>) -> Result<usize> {
        let source = links.map(|l| l as &dyn WorkbookSource);
        register_external_links(self, source).map_err(linked_error)
    }
}

fn linked_error(e: FormulaError) -> Error {
    match e {
        FormulaError::MissingWorkbook(name) => {
            Error::LinkedWorkbook(format!("linked workbook {name} is not available"))
        }
        other => Error::Formula(other),
    }
}

/// Load workbooks from explicit paths, registered under their file names
pub fn load_linked_workbooks<P: AsRef<Path>>(paths: &[P]) -> Result<LinkedWorkbooks> {
    let mut links = LinkedWorkbooks::new();
    for path in paths {
        let path = path.as_ref();
        let workbook = load_workbook(path, None).map_err(|e| {
            Error::LinkedWorkbook(format!("cannot load {}: {e}", path.display()))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        log::info!("loaded linked workbook {}", path.display());
        links.insert(&name, workbook);
    }
    Ok(links)
}

/// Load the workbooks `workbook` links to from `dir`, looking them up by
/// file name. Missing files fail unless `ignore_missing` is set.
pub fn load_links_beside(
    workbook: &Workbook,
    dir: &Path,
    ignore_missing: bool,
) -> Result<LinkedWorkbooks> {
    let mut links = LinkedWorkbooks::new();
    for link in workbook.external_links() {
        let name = file_name_of(&link.file_name);
        let path = dir.join(name);
        if !path.is_file() {
            if ignore_missing {
                log::warn!(
                    "linked workbook {} not found, using cached values",
                    path.display()
                );
                continue;
            }
            return Err(Error::LinkedWorkbook(format!(
                "linked workbook {} not found",
                path.display()
            )));
        }
        let linked = load_workbook(&path, None).map_err(|e| {
            Error::LinkedWorkbook(format!("cannot load {}: {e}", path.display()))
        })?;
        log::info!("loaded linked workbook {}", path.display());
        links.insert(name, linked);
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadoopoffice_core::{CellValue, ExternalLink};

    fn linked() -> LinkedWorkbooks {
        let mut book = Workbook::new();
        book.worksheet_mut(0).unwrap().set_value("B1", "test2").unwrap();
        let mut links = LinkedWorkbooks::new();
        links.insert("linked.xlsx", book);
        links
    }

    #[test]
    fn test_recalculate_with_links() {
        let mut wb = Workbook::new();
        let sheet = wb.worksheet_mut(0).unwrap();
        sheet.set_value("A1", 2.0).unwrap();
        sheet.set_value("B1", CellValue::formula("A1*3")).unwrap();
        sheet
            .set_value("C1", CellValue::formula("[linked.xlsx]Sheet1!B1"))
            .unwrap();

        let links = linked();
        let stats = wb
            .recalculate(Some(&links), &CalculationOptions::default())
            .unwrap();
        assert_eq!(stats, CalculationStats { formulas: 2, linked_workbooks: 1 });
        let sheet = wb.worksheet(0).unwrap();
        assert_eq!(sheet.value_at(0, 1).as_number(), Some(6.0));
        assert_eq!(sheet.value_at(0, 2).as_text(), Some("test2"));
    }

    #[test]
    fn test_missing_link_fails_or_keeps_cache() {
        let mut wb = Workbook::new();
        let mut link = ExternalLink::new("gone.xlsx");
        link.set_cached_value("Sheet1", 0, 0, CellValue::Number(7.0));
        wb.add_external_link(link);
        wb.worksheet_mut(0)
            .unwrap()
            .set_value("A1", CellValue::formula("[gone.xlsx]Sheet1!A1+1"))
            .unwrap();

        let err = wb
            .clone()
            .recalculate(None, &CalculationOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::LinkedWorkbook(_)));

        let options = CalculationOptions {
            keep_cached_on_missing: true,
        };
        wb.recalculate(None, &options).unwrap();
        assert_eq!(wb.worksheet(0).unwrap().value_at(0, 0).as_number(), Some(8.0));
    }

    #[test]
    fn test_register_links_caches_values() {
        let mut wb = Workbook::new();
        wb.worksheet_mut(0)
            .unwrap()
            .set_value("A1", CellValue::formula("[linked.xlsx]Sheet1!B1"))
            .unwrap();
        let links = linked();
        assert_eq!(wb.register_links(Some(&links)).unwrap(), 1);
        assert_eq!(
            wb.external_links()[0].cached_value("Sheet1", 0, 1),
            Some(&CellValue::text("test2"))
        );
    }

    #[test]
    fn test_load_links_beside_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut wb = Workbook::new();
        wb.add_external_link(ExternalLink::new("absent.xls"));
        assert!(matches!(
            load_links_beside(&wb, dir.path(), false),
            Err(Error::LinkedWorkbook(_))
        ));
        assert!(load_links_beside(&wb, dir.path(), true).unwrap().is_empty());
    }
}
