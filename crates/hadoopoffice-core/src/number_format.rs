//! Number format codes

/// Number format attached to a cell
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum NumberFormat {
    /// General format (default)
    #[default]
    General,

    /// Built-in format by ID
    BuiltIn(u32),

    /// Custom format string
    Custom(String),
}

impl NumberFormat {
    /// 14 - short date, rendered in the locale's date order
    pub const ID_DATE_SHORT: u32 = 14;
    /// 22 - short date with time
    pub const ID_DATETIME: u32 = 22;
    /// 49 - text
    pub const ID_TEXT: u32 = 49;

    /// Build a format from a file's format id and optional explicit code.
    ///
    /// Ids below 164 are built-in unless the file defines a code for them.
    pub fn from_id_and_code(id: u32, code: Option<&str>) -> Self {
        match (id, code) {
            (0, _) => NumberFormat::General,
            (_, Some(code)) if code.eq_ignore_ascii_case("general") => NumberFormat::General,
            (id, None) if id < 164 => NumberFormat::BuiltIn(id),
            (id, Some(code)) if Self::builtin_code(id) == Some(code) => NumberFormat::BuiltIn(id),
            (_, Some(code)) => NumberFormat::Custom(code.to_string()),
            (_, None) => NumberFormat::General,
        }
    }

    /// Get the format code
    pub fn format_code(&self) -> &str {
        match self {
            NumberFormat::General => "General",
            NumberFormat::BuiltIn(id) => Self::builtin_code(*id).unwrap_or("General"),
            NumberFormat::Custom(s) => s,
        }
    }

    /// Built-in format code by id (ECMA-376 §18.8.30)
    pub fn builtin_code(id: u32) -> Option<&'static str> {
        Some(match id {
            0 => "General",
            1 => "0",
            2 => "0.00",
            3 => "#,##0",
            4 => "#,##0.00",
            5 => "\"$\"#,##0_);(\"$\"#,##0)",
            6 => "\"$\"#,##0_);[Red](\"$\"#,##0)",
            7 => "\"$\"#,##0.00_);(\"$\"#,##0.00)",
            8 => "\"$\"#,##0.00_);[Red](\"$\"#,##0.00)",
            9 => "0%",
            10 => "0.00%",
            11 => "0.00E+00",
            12 => "# ?/?",
            13 => "# ??/??",
            14 => "m/d/yy",
            15 => "d-mmm-yy",
            16 => "d-mmm",
            17 => "mmm-yy",
            18 => "h:mm AM/PM",
            19 => "h:mm:ss AM/PM",
            20 => "h:mm",
            21 => "h:mm:ss",
            22 => "m/d/yy h:mm",
            37 => "#,##0_);(#,##0)",
            38 => "#,##0_);[Red](#,##0)",
            39 => "#,##0.00_);(#,##0.00)",
            40 => "#,##0.00_);[Red](#,##0.00)",
            45 => "mm:ss",
            46 => "[h]:mm:ss",
            47 => "mm:ss.0",
            48 => "##0.0E+0",
            49 => "@",
            _ => return None,
        })
    }

    /// Reverse lookup of a built-in id for a format code
    pub fn builtin_id(code: &str) -> Option<u32> {
        (0..50).find(|id| Self::builtin_code(*id) == Some(code))
    }

    /// Check if this is a date/time format
    pub fn is_date_format(&self) -> bool {
        match self {
            NumberFormat::General => false,
            NumberFormat::BuiltIn(id) => matches!(id, 14..=22 | 45..=47),
            NumberFormat::Custom(code) => is_date_code(code),
        }
    }
}

/// Checks for date/time tokens outside of quoted literals, escapes and
/// bracketed sections. Elapsed-time brackets (`[h]`, `[mm]`, `[ss]`) count
/// as date tokens.
pub fn is_date_code(code: &str) -> bool {
    let section = code.split(';').next().unwrap_or("");
    let mut chars = section.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                for q in chars.by_ref() {
                    if q == '"' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let mut inner = String::new();
                for b in chars.by_ref() {
                    if b == ']' {
                        break;
                    }
                    inner.push(b);
                }
                let lower = inner.to_ascii_lowercase();
                if !lower.is_empty() && lower.chars().all(|c| matches!(c, 'h' | 'm' | 's')) {
                    return true;
                }
            }
            'y' | 'Y' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' | 'm' | 'M' => return true,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_detection() {
        assert!(NumberFormat::BuiltIn(14).is_date_format());
        assert!(!NumberFormat::BuiltIn(4).is_date_format());
        assert!(NumberFormat::Custom("dd.mm.yyyy".into()).is_date_format());
        assert!(NumberFormat::Custom("[h]:mm".into()).is_date_format());
        assert!(!NumberFormat::Custom("[Red]0.00".into()).is_date_format());
        assert!(!NumberFormat::Custom("\"days\" 0".into()).is_date_format());
        assert!(!NumberFormat::General.is_date_format());
    }

    #[test]
    fn test_from_id_and_code() {
        assert_eq!(NumberFormat::from_id_and_code(0, None), NumberFormat::General);
        assert_eq!(NumberFormat::from_id_and_code(14, None), NumberFormat::BuiltIn(14));
        assert_eq!(
            NumberFormat::from_id_and_code(164, Some("0.000")),
            NumberFormat::Custom("0.000".into())
        );
        assert_eq!(NumberFormat::from_id_and_code(2, Some("0.00")), NumberFormat::BuiltIn(2));
        assert_eq!(NumberFormat::builtin_id("0%"), Some(9));
    }
}
