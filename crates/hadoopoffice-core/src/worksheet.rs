//! Worksheet type

use std::collections::BTreeMap;

use crate::cell::{CellAddress, CellRange, CellValue};
use crate::comment::CellComment;
use crate::error::{Error, Result};
use crate::number_format::NumberFormat;
use crate::{MAX_COLS, MAX_ROWS};

/// Content of a single cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub number_format: NumberFormat,
    pub comment: Option<CellComment>,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }

    pub fn with_format(value: CellValue, number_format: NumberFormat) -> Self {
        Self {
            value,
            number_format,
            comment: None,
        }
    }
}

/// A worksheet (single sheet in a workbook)
///
/// Cells are stored sparsely in row-major order, so iterating a row or the
/// whole sheet visits cells left to right, top to bottom.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Worksheet {
    name: String,
    cells: BTreeMap<(u32, u16), Cell>,
}

impl Worksheet {
    /// Create a new worksheet with the given name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
        }
    }

    /// Get the sheet name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the sheet name
    pub fn set_name<S: Into<String>>(&mut self, name: S) {
        self.name = name.into();
    }

    // ==================== Cell access ====================

    /// Get a cell by A1-style address
    pub fn cell(&self, address: &str) -> Result<Option<&Cell>> {
        let addr = CellAddress::parse(address)?;
        Ok(self.cell_at(addr.row, addr.col))
    }

    /// Get a cell by 0-based row and column
    pub fn cell_at(&self, row: u32, col: u16) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Get a mutable cell by 0-based row and column
    pub fn cell_at_mut(&mut self, row: u32, col: u16) -> Option<&mut Cell> {
        self.cells.get_mut(&(row, col))
    }

    /// Value of a cell; missing cells are [`CellValue::Empty`]
    pub fn value_at(&self, row: u32, col: u16) -> &CellValue {
        const EMPTY: &CellValue = &CellValue::Empty;
        self.cells.get(&(row, col)).map_or(EMPTY, |c| &c.value)
    }

    /// Set a cell value by A1-style address, keeping format and comment
    pub fn set_value<V: Into<CellValue>>(&mut self, address: &str, value: V) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.set_value_at(addr.row, addr.col, value)
    }

    /// Set a cell value by 0-based row and column
    pub fn set_value_at<V: Into<CellValue>>(&mut self, row: u32, col: u16, value: V) -> Result<()> {
        Self::check_bounds(row, col)?;
        self.cells.entry((row, col)).or_default().value = value.into();
        Ok(())
    }

    /// Replace a whole cell
    pub fn set_cell_at(&mut self, row: u32, col: u16, cell: Cell) -> Result<()> {
        Self::check_bounds(row, col)?;
        self.cells.insert((row, col), cell);
        Ok(())
    }

    /// Set the number format of a cell, creating an empty cell if needed
    pub fn set_number_format_at(&mut self, row: u32, col: u16, format: NumberFormat) -> Result<()> {
        Self::check_bounds(row, col)?;
        self.cells.entry((row, col)).or_default().number_format = format;
        Ok(())
    }

    /// Remove a cell
    pub fn clear_cell_at(&mut self, row: u32, col: u16) -> Option<Cell> {
        self.cells.remove(&(row, col))
    }

    fn check_bounds(row: u32, col: u16) -> Result<()> {
        if row >= MAX_ROWS {
            return Err(Error::RowOutOfBounds(row, MAX_ROWS - 1));
        }
        if col >= MAX_COLS {
            return Err(Error::ColumnOutOfBounds(col, MAX_COLS - 1));
        }
        Ok(())
    }

    // ==================== Comments ====================

    /// Attach a comment to a cell by A1-style address
    pub fn set_comment(&mut self, address: &str, comment: CellComment) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.set_comment_at(addr.row, addr.col, comment)
    }

    /// Attach a comment to a cell by 0-based row and column
    pub fn set_comment_at(&mut self, row: u32, col: u16, comment: CellComment) -> Result<()> {
        Self::check_bounds(row, col)?;
        self.cells.entry((row, col)).or_default().comment = Some(comment);
        Ok(())
    }

    /// Comment of a cell, if any
    pub fn comment_at(&self, row: u32, col: u16) -> Option<&CellComment> {
        self.cells.get(&(row, col)).and_then(|c| c.comment.as_ref())
    }

    /// All comments in row-major order
    pub fn comments(&self) -> impl Iterator<Item = ((u32, u16), &CellComment)> {
        self.cells
            .iter()
            .filter_map(|(pos, cell)| cell.comment.as_ref().map(|c| (*pos, c)))
    }

    /// Distinct comment authors in order of first appearance
    pub fn comment_authors(&self) -> Vec<&str> {
        let mut authors: Vec<&str> = Vec::new();
        for (_, comment) in self.comments() {
            if !authors.contains(&comment.author.as_str()) {
                authors.push(&comment.author);
            }
        }
        authors
    }

    // ==================== Iteration ====================

    /// Number of stored cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Check if the sheet has no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Index of the last row holding a cell
    pub fn last_row(&self) -> Option<u32> {
        self.cells.keys().next_back().map(|(row, _)| *row)
    }

    /// Cells of one row, left to right
    pub fn row_cells(&self, row: u32) -> impl Iterator<Item = (u16, &Cell)> {
        self.cells
            .range((row, 0)..=(row, u16::MAX))
            .map(|((_, col), cell)| (*col, cell))
    }

    /// Index of the last column holding a cell in a row
    pub fn last_col_in_row(&self, row: u32) -> Option<u16> {
        self.cells
            .range((row, 0)..=(row, u16::MAX))
            .next_back()
            .map(|((_, col), _)| *col)
    }

    /// All cells in row-major order
    pub fn iter_cells(&self) -> impl Iterator<Item = (u32, u16, &Cell)> {
        self.cells.iter().map(|((row, col), cell)| (*row, *col, cell))
    }

    /// All cells mutably, in row-major order
    pub fn iter_cells_mut(&mut self) -> impl Iterator<Item = (u32, u16, &mut Cell)> {
        self.cells
            .iter_mut()
            .map(|((row, col), cell)| (*row, *col, cell))
    }

    /// Smallest range covering all cells
    pub fn used_range(&self) -> Option<CellRange> {
        let last_row = self.last_row()?;
        let first_row = self.cells.keys().next().map(|(row, _)| *row)?;
        let (min_col, max_col) = self
            .cells
            .keys()
            .fold((u16::MAX, 0u16), |(lo, hi), (_, col)| (lo.min(*col), hi.max(*col)));
        Some(CellRange::new(
            CellAddress::new(first_row, min_col),
            CellAddress::new(last_row, max_col),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_value("A1", "test1").unwrap();
        ws.set_value("C3", 3.0).unwrap();
        assert_eq!(ws.cell("A1").unwrap().unwrap().value, CellValue::text("test1"));
        assert_eq!(ws.value_at(2, 2), &CellValue::Number(3.0));
        assert_eq!(ws.value_at(1, 0), &CellValue::Empty);
        assert!(ws.set_value("A0", 1.0).is_err());
    }

    #[test]
    fn test_row_extent() {
        let mut ws = Worksheet::new("Sheet1");
        assert_eq!(ws.last_row(), None);
        ws.set_value_at(0, 2, "c").unwrap();
        ws.set_value_at(0, 0, "a").unwrap();
        ws.set_value_at(3, 1, "x").unwrap();
        assert_eq!(ws.last_row(), Some(3));
        assert_eq!(ws.last_col_in_row(0), Some(2));
        assert_eq!(ws.last_col_in_row(1), None);
        let cols: Vec<u16> = ws.row_cells(0).map(|(c, _)| c).collect();
        assert_eq!(cols, vec![0, 2]);
        assert_eq!(ws.used_range().unwrap().to_string(), "A1:C4");
    }

    #[test]
    fn test_comments() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_value("B2", "x").unwrap();
        ws.set_comment("B2", CellComment::new("hadoopoffice", "note")).unwrap();
        ws.set_comment("A5", CellComment::new("other", "only a comment")).unwrap();
        assert_eq!(ws.comment_at(1, 1).unwrap().text, "note");
        assert_eq!(ws.value_at(4, 0), &CellValue::Empty);
        assert_eq!(ws.comment_authors(), vec!["hadoopoffice", "other"]);
    }
}
