//! Cell value types

use std::fmt;

/// The value stored in a cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    /// Empty cell
    #[default]
    Empty,

    /// Boolean value (TRUE/FALSE)
    Boolean(bool),

    /// Numeric value (dates are serial numbers)
    Number(f64),

    /// Text value
    Text(String),

    /// Error value (#VALUE!, #REF!, etc.)
    Error(CellError),

    /// Formula with its last calculated result
    Formula {
        /// Formula text without the leading `=`
        text: String,
        /// Last calculated value, if known
        cached: Option<Box<CellValue>>,
    },
}

impl CellValue {
    /// Create a text value
    pub fn text<S: Into<String>>(s: S) -> Self {
        CellValue::Text(s.into())
    }

    /// Create a formula without a cached result. A leading `=` is stripped.
    pub fn formula<S: AsRef<str>>(text: S) -> Self {
        let text = text.as_ref();
        CellValue::Formula {
            text: text.strip_prefix('=').unwrap_or(text).to_string(),
            cached: None,
        }
    }

    /// Create a formula with a known result
    pub fn formula_with_cached<S: AsRef<str>>(text: S, cached: CellValue) -> Self {
        match Self::formula(text) {
            CellValue::Formula { text, .. } => CellValue::Formula {
                text,
                cached: Some(Box::new(cached)),
            },
            other => other,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Formula { .. })
    }

    /// Formula text, if this is a formula
    pub fn formula_text(&self) -> Option<&str> {
        match self {
            CellValue::Formula { text, .. } => Some(text),
            _ => None,
        }
    }

    /// The displayed value: the cached result for formulas, otherwise `self`
    pub fn effective_value(&self) -> &CellValue {
        match self {
            CellValue::Formula {
                cached: Some(v), ..
            } => v.effective_value(),
            CellValue::Formula { cached: None, .. } => &CellValue::Empty,
            _ => self,
        }
    }

    /// Try to get the value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self.effective_value() {
            CellValue::Number(n) => Some(*n),
            CellValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Try to get the value as text
    pub fn as_text(&self) -> Option<&str> {
        match self.effective_value() {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Empty => "empty",
            CellValue::Boolean(_) => "boolean",
            CellValue::Number(_) => "number",
            CellValue::Text(_) => "text",
            CellValue::Error(_) => "error",
            CellValue::Formula { .. } => "formula",
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Error(e) => write!(f, "{e}"),
            CellValue::Formula {
                cached: Some(v), ..
            } => write!(f, "{v}"),
            CellValue::Formula { text, .. } => write!(f, "={text}"),
        }
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<CellError> for CellValue {
    fn from(e: CellError) -> Self {
        CellValue::Error(e)
    }
}

/// Spreadsheet error values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellError {
    /// #NULL! - Intersection of two ranges that don't intersect
    Null,
    /// #DIV/0! - Division by zero
    Div0,
    /// #VALUE! - Wrong type of argument
    Value,
    /// #REF! - Invalid cell reference
    Ref,
    /// #NAME? - Unrecognized name
    Name,
    /// #NUM! - Invalid numeric value
    Num,
    /// #N/A - Value not available
    Na,
}

impl CellError {
    /// Get the error display string
    pub fn as_str(&self) -> &'static str {
        match self {
            CellError::Null => "#NULL!",
            CellError::Div0 => "#DIV/0!",
            CellError::Value => "#VALUE!",
            CellError::Ref => "#REF!",
            CellError::Name => "#NAME?",
            CellError::Num => "#NUM!",
            CellError::Na => "#N/A",
        }
    }

    /// Parse an error display string
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim() {
            "#NULL!" => CellError::Null,
            "#DIV/0!" => CellError::Div0,
            "#VALUE!" => CellError::Value,
            "#REF!" => CellError::Ref,
            "#NAME?" => CellError::Name,
            "#NUM!" => CellError::Num,
            "#N/A" => CellError::Na,
            _ => return None,
        })
    }

    /// BIFF8 error code
    pub fn code(&self) -> u8 {
        match self {
            CellError::Null => 0x00,
            CellError::Div0 => 0x07,
            CellError::Value => 0x0F,
            CellError::Ref => 0x17,
            CellError::Name => 0x1D,
            CellError::Num => 0x24,
            CellError::Na => 0x2A,
        }
    }

    /// Decode a BIFF8 error code; unknown codes map to #VALUE!
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => CellError::Null,
            0x07 => CellError::Div0,
            0x17 => CellError::Ref,
            0x1D => CellError::Name,
            0x24 => CellError::Num,
            0x2A => CellError::Na,
            _ => CellError::Value,
        }
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_strips_equals() {
        assert_eq!(CellValue::formula("=A3+B3").formula_text(), Some("A3+B3"));
        assert_eq!(CellValue::formula("1").formula_text(), Some("1"));
    }

    #[test]
    fn test_effective_value() {
        let f = CellValue::formula_with_cached("A1*2", CellValue::Number(6.0));
        assert_eq!(f.as_number(), Some(6.0));
        assert_eq!(CellValue::formula("A1").effective_value(), &CellValue::Empty);
        assert_eq!(CellValue::text("x").as_text(), Some("x"));
    }

    #[test]
    fn test_error_codes() {
        for e in [CellError::Null, CellError::Div0, CellError::Ref, CellError::Na] {
            assert_eq!(CellError::from_code(e.code()), e);
            assert_eq!(CellError::parse(e.as_str()), Some(e));
        }
        assert_eq!(CellError::from_code(0x99), CellError::Value);
    }
}
