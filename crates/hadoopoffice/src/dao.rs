//! Per-cell records exchanged with jobs

use std::fmt;

/// One cell as produced by the record reader and consumed by the record
/// writer
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SpreadSheetCellDAO {
    formatted_value: String,
    comment: String,
    formula: String,
    address: String,
    sheet_name: String,
}

impl SpreadSheetCellDAO {
    pub fn new(
        formatted_value: impl Into<String>,
        comment: impl Into<String>,
        formula: impl Into<String>,
        address: impl Into<String>,
        sheet_name: impl Into<String>,
    ) -> Self {
        Self {
            formatted_value: formatted_value.into(),
            comment: comment.into(),
            formula: formula.into(),
            address: address.into(),
            sheet_name: sheet_name.into(),
        }
    }

    /// Value as displayed in a spreadsheet application
    pub fn formatted_value(&self) -> &str {
        &self.formatted_value
    }

    /// Comment text, empty without a comment
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Formula without the leading `=`, empty for plain values
    pub fn formula(&self) -> &str {
        &self.formula
    }

    /// A1-style address
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// Field values in serialization order
    pub(crate) fn fields(&self) -> [&String; 5] {
        [
            &self.formatted_value,
            &self.comment,
            &self.formula,
            &self.address,
            &self.sheet_name,
        ]
    }

    pub(crate) fn fields_mut(&mut self) -> [&mut String; 5] {
        [
            &mut self.formatted_value,
            &mut self.comment,
            &mut self.formula,
            &mut self.address,
            &mut self.sheet_name,
        ]
    }
}

impl fmt::Display for SpreadSheetCellDAO {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}: {}", self.sheet_name, self.address, self.formatted_value)?;
        if !self.formula.is_empty() {
            write!(f, " (={})", self.formula)?;
        }
        Ok(())
    }
}

/// One row: a slot per column up to the row's last cell
pub type SpreadSheetRow = Vec<Option<SpreadSheetCellDAO>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_order() {
        let dao = SpreadSheetCellDAO::new("3", "note", "A1+B1", "C3", "Sheet1");
        assert_eq!(dao.formatted_value(), "3");
        assert_eq!(dao.comment(), "note");
        assert_eq!(dao.formula(), "A1+B1");
        assert_eq!(dao.address(), "C3");
        assert_eq!(dao.sheet_name(), "Sheet1");
        assert_eq!(dao.to_string(), "Sheet1!C3: 3 (=A1+B1)");
    }
}
