//! Workbook type - the main document structure

use crate::error::{Error, Result};
use crate::external::ExternalLink;
use crate::properties::DocumentProperties;
use crate::worksheet::Worksheet;
use crate::MAX_SHEET_NAME_LEN;

/// A workbook (spreadsheet document)
///
/// A workbook contains worksheets in order, the date system, document
/// properties and the external workbooks its formulas link to.
#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    worksheets: Vec<Worksheet>,
    /// Date system: false = 1900 (Windows), true = 1904 (Mac)
    date_1904: bool,
    properties: DocumentProperties,
    external_links: Vec<ExternalLink>,
}

impl Workbook {
    /// Create a new workbook with one worksheet named `Sheet1`
    pub fn new() -> Self {
        let mut wb = Self::empty();
        wb.worksheets.push(Worksheet::new("Sheet1"));
        wb
    }

    /// Create an empty workbook with no worksheets
    pub fn empty() -> Self {
        Self {
            worksheets: Vec::new(),
            date_1904: false,
            properties: DocumentProperties::default(),
            external_links: Vec::new(),
        }
    }

    /// Get the number of worksheets
    pub fn sheet_count(&self) -> usize {
        self.worksheets.len()
    }

    /// Check if the workbook has no worksheets
    pub fn is_empty(&self) -> bool {
        self.worksheets.is_empty()
    }

    /// Get a worksheet by index
    pub fn worksheet(&self, index: usize) -> Option<&Worksheet> {
        self.worksheets.get(index)
    }

    /// Get a mutable worksheet by index
    pub fn worksheet_mut(&mut self, index: usize) -> Option<&mut Worksheet> {
        self.worksheets.get_mut(index)
    }

    /// Get a worksheet by name (case-insensitive, as in Excel)
    pub fn worksheet_by_name(&self, name: &str) -> Option<&Worksheet> {
        self.sheet_index(name).map(|idx| &self.worksheets[idx])
    }

    /// Get a mutable worksheet by name
    pub fn worksheet_by_name_mut(&mut self, name: &str) -> Option<&mut Worksheet> {
        let idx = self.sheet_index(name)?;
        self.worksheets.get_mut(idx)
    }

    /// Get the index of a worksheet by name
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.worksheets
            .iter()
            .position(|ws| ws.name().eq_ignore_ascii_case(name))
    }

    /// Sheet names in workbook order
    pub fn sheet_names(&self) -> Vec<&str> {
        self.worksheets.iter().map(|ws| ws.name()).collect()
    }

    /// Iterate over all worksheets
    pub fn worksheets(&self) -> impl Iterator<Item = &Worksheet> {
        self.worksheets.iter()
    }

    /// Iterate over all worksheets mutably
    pub fn worksheets_mut(&mut self) -> impl Iterator<Item = &mut Worksheet> {
        self.worksheets.iter_mut()
    }

    /// Add a new worksheet with specified name
    pub fn add_worksheet_with_name(&mut self, name: &str) -> Result<usize> {
        self.validate_sheet_name(name, None)?;
        self.worksheets.push(Worksheet::new(name));
        Ok(self.worksheets.len() - 1)
    }

    /// Add an existing worksheet to the workbook
    pub fn add_existing_worksheet(&mut self, worksheet: Worksheet) -> Result<usize> {
        self.validate_sheet_name(worksheet.name(), None)?;
        self.worksheets.push(worksheet);
        Ok(self.worksheets.len() - 1)
    }

    /// Index of a worksheet, creating it at the end if it does not exist
    pub fn sheet_index_or_insert(&mut self, name: &str) -> Result<usize> {
        match self.sheet_index(name) {
            Some(idx) => Ok(idx),
            None => self.add_worksheet_with_name(name),
        }
    }

    /// Remove a worksheet by index
    pub fn remove_worksheet(&mut self, index: usize) -> Result<Worksheet> {
        if index >= self.worksheets.len() {
            return Err(Error::SheetOutOfBounds(index, self.worksheets.len()));
        }
        Ok(self.worksheets.remove(index))
    }

    /// Rename a worksheet
    pub fn rename_worksheet(&mut self, index: usize, new_name: &str) -> Result<()> {
        if index >= self.worksheets.len() {
            return Err(Error::SheetOutOfBounds(index, self.worksheets.len()));
        }
        self.validate_sheet_name(new_name, Some(index))?;
        self.worksheets[index].set_name(new_name);
        Ok(())
    }

    pub fn date_1904(&self) -> bool {
        self.date_1904
    }

    pub fn set_date_1904(&mut self, date_1904: bool) {
        self.date_1904 = date_1904;
    }

    pub fn properties(&self) -> &DocumentProperties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut DocumentProperties {
        &mut self.properties
    }

    // ==================== External links ====================

    /// Linked workbooks in link order. Formulas use 1-based positions.
    pub fn external_links(&self) -> &[ExternalLink] {
        &self.external_links
    }

    pub fn external_links_mut(&mut self) -> &mut Vec<ExternalLink> {
        &mut self.external_links
    }

    /// Find a link by file name (directories ignored)
    pub fn external_link_index(&self, file_name: &str) -> Option<usize> {
        self.external_links
            .iter()
            .position(|l| l.matches_file(file_name))
    }

    /// Register a linked workbook, returning its 0-based index
    pub fn add_external_link(&mut self, link: ExternalLink) -> usize {
        match self.external_link_index(&link.file_name) {
            Some(idx) => idx,
            None => {
                self.external_links.push(link);
                self.external_links.len() - 1
            }
        }
    }

    /// Resolve a formula's workbook qualifier (`1` or `file.xlsx`) to a link
    pub fn resolve_external_link(&self, qualifier: &str) -> Option<&ExternalLink> {
        match qualifier.parse::<usize>() {
            Ok(pos) if pos >= 1 => self.external_links.get(pos - 1),
            _ => self
                .external_link_index(qualifier)
                .map(|idx| &self.external_links[idx]),
        }
    }

    /// Validate a sheet name, optionally excluding a sheet from the duplicate check
    fn validate_sheet_name(&self, name: &str, exclude_index: Option<usize>) -> Result<()> {
        validate_sheet_name(name)?;
        for (i, ws) in self.worksheets.iter().enumerate() {
            if Some(i) != exclude_index && ws.name().eq_ignore_ascii_case(name) {
                return Err(Error::DuplicateSheetName(name.into()));
            }
        }
        Ok(())
    }
}

/// Check length and characters of a sheet name
pub fn validate_sheet_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidSheetName("Sheet name cannot be empty".into()));
    }
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(Error::InvalidSheetName(format!(
            "Sheet name too long (max {} characters): {}",
            MAX_SHEET_NAME_LEN, name
        )));
    }
    const INVALID_CHARS: &[char] = &[':', '\\', '/', '?', '*', '[', ']'];
    if let Some(c) = name.chars().find(|c| INVALID_CHARS.contains(c)) {
        return Err(Error::InvalidSheetName(format!(
            "Sheet name cannot contain '{}': {}",
            c, name
        )));
    }
    Ok(())
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_workbook() {
        let wb = Workbook::new();
        assert_eq!(wb.sheet_count(), 1);
        assert_eq!(wb.worksheet(0).unwrap().name(), "Sheet1");
        assert!(Workbook::empty().is_empty());
    }

    #[test]
    fn test_duplicate_name() {
        let mut wb = Workbook::new();
        assert!(wb.add_worksheet_with_name("SHEET1").is_err());
        assert_eq!(wb.sheet_index_or_insert("sheet1").unwrap(), 0);
        assert_eq!(wb.sheet_index_or_insert("Data").unwrap(), 1);
        assert_eq!(wb.sheet_names(), vec!["Sheet1", "Data"]);
    }

    #[test]
    fn test_invalid_sheet_name() {
        let mut wb = Workbook::new();
        assert!(wb.add_worksheet_with_name("").is_err());
        assert!(wb.add_worksheet_with_name("Sheet/1").is_err());
        assert!(wb.add_worksheet_with_name("Sheet[1]").is_err());
        let long_name = "A".repeat(MAX_SHEET_NAME_LEN + 1);
        assert!(wb.add_worksheet_with_name(&long_name).is_err());
    }

    #[test]
    fn test_external_links() {
        let mut wb = Workbook::new();
        assert_eq!(wb.add_external_link(ExternalLink::new("a.xlsx")), 0);
        assert_eq!(wb.add_external_link(ExternalLink::new("b.xlsx")), 1);
        assert_eq!(wb.add_external_link(ExternalLink::new("A.xlsx")), 0);
        assert_eq!(wb.resolve_external_link("2").unwrap().file_name, "b.xlsx");
        assert_eq!(wb.resolve_external_link("/x/a.xlsx").unwrap().file_name, "a.xlsx");
        assert!(wb.resolve_external_link("3").is_none());
    }
}
