//! Cell address, range and qualified reference types

use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};
use std::fmt;
use std::str::FromStr;

/// A cell address (e.g., "A1", "$B$2")
///
/// Rows are 0-based internally and 1-based when rendered. The optional `$`
/// markers are kept so that formulas can be written back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    /// Row index (0-based)
    pub row: u32,
    /// Column index (0-based, A=0)
    pub col: u16,
    /// Whether the row reference is absolute ($)
    pub row_absolute: bool,
    /// Whether the column reference is absolute ($)
    pub col_absolute: bool,
}

impl CellAddress {
    /// Create a new cell address with relative references
    pub fn new(row: u32, col: u16) -> Self {
        Self {
            row,
            col,
            row_absolute: false,
            col_absolute: false,
        }
    }

    /// Create a cell address with explicit absolute flags
    pub fn with_absolute(row: u32, col: u16, row_absolute: bool, col_absolute: bool) -> Self {
        Self {
            row,
            col,
            row_absolute,
            col_absolute,
        }
    }

    /// Parse a cell address from A1-style notation
    ///
    /// # Examples
    /// ```
    /// use hadoopoffice_core::CellAddress;
    ///
    /// let addr = CellAddress::parse("$C$3").unwrap();
    /// assert_eq!((addr.row, addr.col), (2, 2));
    /// assert!(addr.row_absolute && addr.col_absolute);
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let bytes = s.as_bytes();
        let mut pos = 0;

        let col_absolute = bytes.first() == Some(&b'$');
        if col_absolute {
            pos += 1;
        }

        let col_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }
        if pos == col_start {
            return Err(Error::InvalidAddress(format!("no column letters in '{s}'")));
        }
        let col = Self::letters_to_column(&s[col_start..pos])?;

        let row_absolute = bytes.get(pos) == Some(&b'$');
        if row_absolute {
            pos += 1;
        }

        let row_str = &s[pos..];
        if row_str.is_empty() || !row_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidAddress(format!("invalid row number in '{s}'")));
        }
        let row: u32 = row_str
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("invalid row number in '{s}'")))?;
        if row == 0 {
            return Err(Error::InvalidAddress(format!("row number must be >= 1 in '{s}'")));
        }
        if row > MAX_ROWS {
            return Err(Error::RowOutOfBounds(row - 1, MAX_ROWS - 1));
        }

        Ok(Self {
            row: row - 1,
            col,
            row_absolute,
            col_absolute,
        })
    }

    /// Convert a column index to letters (0 = A, 26 = AA)
    pub fn column_to_letters(col: u16) -> String {
        let mut letters = Vec::new();
        let mut n = col as u32 + 1;
        while n > 0 {
            n -= 1;
            letters.push(b'A' + (n % 26) as u8);
            n /= 26;
        }
        letters.reverse();
        String::from_utf8(letters).unwrap_or_default()
    }

    /// Convert column letters to an index (A = 0, AA = 26)
    pub fn letters_to_column(letters: &str) -> Result<u16> {
        if letters.is_empty() || letters.len() > 3 {
            return Err(Error::InvalidAddress(format!("invalid column '{letters}'")));
        }
        let mut col: u32 = 0;
        for c in letters.chars() {
            if !c.is_ascii_alphabetic() {
                return Err(Error::InvalidAddress(format!("invalid column letter '{c}'")));
            }
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        }
        let col = col - 1;
        if col >= MAX_COLS as u32 {
            return Err(Error::ColumnOutOfBounds(col as u16, MAX_COLS - 1));
        }
        Ok(col as u16)
    }

    /// Format as an A1-style string, keeping `$` markers
    pub fn to_a1_string(&self) -> String {
        format!(
            "{}{}{}{}",
            if self.col_absolute { "$" } else { "" },
            Self::column_to_letters(self.col),
            if self.row_absolute { "$" } else { "" },
            self.row + 1
        )
    }

    /// The same cell without `$` markers
    pub fn relative(&self) -> Self {
        Self::new(self.row, self.col)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1_string())
    }
}

impl FromStr for CellAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A rectangular range of cells (e.g., "A1:B10"), normalized so that
/// `start` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    /// Top-left corner
    pub start: CellAddress,
    /// Bottom-right corner
    pub end: CellAddress,
}

impl CellRange {
    /// Create a range from two corners in any order
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        let (top, bottom) = if a.row <= b.row { (a, b) } else { (b, a) };
        let (left_col, left_abs, right_col, right_abs) = if a.col <= b.col {
            (a.col, a.col_absolute, b.col, b.col_absolute)
        } else {
            (b.col, b.col_absolute, a.col, a.col_absolute)
        };
        Self {
            start: CellAddress::with_absolute(top.row, left_col, top.row_absolute, left_abs),
            end: CellAddress::with_absolute(bottom.row, right_col, bottom.row_absolute, right_abs),
        }
    }

    /// Parse `A1:B10` or a single address
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once(':') {
            Some((a, b)) => Ok(Self::new(CellAddress::parse(a)?, CellAddress::parse(b)?)),
            None => {
                let addr = CellAddress::parse(s)
                    .map_err(|_| Error::InvalidRange(s.to_string()))?;
                Ok(Self::new(addr, addr))
            }
        }
    }

    /// Check if a cell lies within the range
    pub fn contains(&self, row: u32, col: u16) -> bool {
        row >= self.start.row && row <= self.end.row && col >= self.start.col && col <= self.end.col
    }

    /// Number of rows spanned
    pub fn row_count(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    /// Number of columns spanned
    pub fn col_count(&self) -> u16 {
        self.end.col - self.start.col + 1
    }

    /// Iterate over all (row, col) pairs, row by row
    pub fn cells(&self) -> impl Iterator<Item = (u32, u16)> + '_ {
        (self.start.row..=self.end.row)
            .flat_map(move |r| (self.start.col..=self.end.col).map(move |c| (r, c)))
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// A cell address qualified by an optional workbook and sheet,
/// e.g. `[other.xlsx]Sheet1!B1` or `'My Sheet'!A1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellRef {
    /// External workbook name or 1-based link index, without brackets
    pub workbook: Option<String>,
    /// Sheet name, unquoted
    pub sheet: Option<String>,
    pub address: CellAddress,
}

impl CellRef {
    /// Parse a possibly qualified reference
    ///
    /// ```
    /// use hadoopoffice_core::CellRef;
    ///
    /// let r = CellRef::parse("[linked.xls]Sheet1!B1").unwrap();
    /// assert_eq!(r.workbook.as_deref(), Some("linked.xls"));
    /// assert_eq!(r.sheet.as_deref(), Some("Sheet1"));
    /// assert_eq!(r.address.to_string(), "B1");
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let Some(bang) = s.rfind('!') else {
            return Ok(Self {
                workbook: None,
                sheet: None,
                address: CellAddress::parse(s)?,
            });
        };
        let (qualifier, addr) = (&s[..bang], &s[bang + 1..]);
        let qualifier = qualifier
            .strip_prefix('\'')
            .and_then(|q| q.strip_suffix('\''))
            .map(|q| q.replace("''", "'"))
            .unwrap_or_else(|| qualifier.to_string());

        let (workbook, sheet) = match qualifier.strip_prefix('[') {
            Some(rest) => {
                let close = rest
                    .find(']')
                    .ok_or_else(|| Error::InvalidAddress(format!("unclosed '[' in '{s}'")))?;
                (Some(rest[..close].to_string()), rest[close + 1..].to_string())
            }
            None => (None, qualifier),
        };
        if sheet.is_empty() {
            return Err(Error::InvalidAddress(format!("missing sheet name in '{s}'")));
        }

        Ok(Self {
            workbook,
            sheet: Some(sheet),
            address: CellAddress::parse(addr)?,
        })
    }

    /// Quote a sheet name for use in a formula if it needs quoting
    pub fn quote_sheet_name(name: &str) -> String {
        let plain = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
            && !name.starts_with(|c: char| c.is_ascii_digit());
        if plain {
            name.to_string()
        } else {
            format!("'{}'", name.replace('\'', "''"))
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.workbook, &self.sheet) {
            (Some(book), Some(sheet)) => {
                let qualifier = format!("[{book}]{sheet}");
                write!(f, "{}!{}", Self::quote_sheet_name(&qualifier), self.address)
            }
            (None, Some(sheet)) => {
                write!(f, "{}!{}", Self::quote_sheet_name(sheet), self.address)
            }
            _ => write!(f, "{}", self.address),
        }
    }
}
