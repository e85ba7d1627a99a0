//! External workbook links

use std::collections::BTreeMap;

use crate::cell::CellValue;

/// A workbook referenced by formulas, e.g. `[prices.xlsx]Sheet1!B1`.
///
/// Formulas refer to a link either by file name or by its 1-based position
/// in [`Workbook::external_links`](crate::Workbook::external_links).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExternalLink {
    /// File name as written in formulas (no directory)
    pub file_name: String,
    /// Sheets of the linked workbook that formulas refer to
    pub sheet_names: Vec<String>,
    /// Values of referenced cells as last seen, keyed by (sheet index, row, col)
    pub cached: BTreeMap<(usize, u32, u16), CellValue>,
}

impl ExternalLink {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    /// Index of a sheet, adding it if necessary
    pub fn sheet_index_or_insert(&mut self, sheet: &str) -> usize {
        match self.sheet_index(sheet) {
            Some(idx) => idx,
            None => {
                self.sheet_names.push(sheet.to_string());
                self.sheet_names.len() - 1
            }
        }
    }

    /// Case-insensitive sheet lookup
    pub fn sheet_index(&self, sheet: &str) -> Option<usize> {
        self.sheet_names
            .iter()
            .position(|s| s.eq_ignore_ascii_case(sheet))
    }

    /// Cached value of a cell in the linked workbook
    pub fn cached_value(&self, sheet: &str, row: u32, col: u16) -> Option<&CellValue> {
        let idx = self.sheet_index(sheet)?;
        self.cached.get(&(idx, row, col))
    }

    /// Remember the value of a referenced cell
    pub fn set_cached_value(&mut self, sheet: &str, row: u32, col: u16, value: CellValue) {
        let idx = self.sheet_index_or_insert(sheet);
        self.cached.insert((idx, row, col), value);
    }

    /// Whether `name` refers to this link. Directory parts are ignored.
    pub fn matches_file(&self, name: &str) -> bool {
        file_name_of(name).eq_ignore_ascii_case(file_name_of(&self.file_name))
    }
}

/// Last path segment of a file name, accepting both separators
pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_lookup() {
        let mut link = ExternalLink::new("linked.xlsx");
        assert_eq!(link.sheet_index_or_insert("Sheet1"), 0);
        assert_eq!(link.sheet_index_or_insert("sheet1"), 0);
        assert_eq!(link.sheet_index_or_insert("Data"), 1);
        link.set_cached_value("Data", 0, 1, CellValue::Number(5.0));
        assert_eq!(link.cached_value("DATA", 0, 1), Some(&CellValue::Number(5.0)));
    }

    #[test]
    fn test_matches_file() {
        let link = ExternalLink::new("linked.xls");
        assert!(link.matches_file("/tmp/x/linked.xls"));
        assert!(link.matches_file("C:\\data\\LINKED.xls"));
        assert!(!link.matches_file("other.xls"));
    }
}
