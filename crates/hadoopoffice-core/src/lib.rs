//! # hadoopoffice-core
//!
//! Core data structures shared by the hadoopoffice readers and writers.
//!
//! This crate provides:
//! - [`CellValue`] - Values stored in cells (numbers, text, booleans, errors, formulas)
//! - [`CellAddress`] and [`CellRange`] - A1-style addressing
//! - [`Workbook`], [`Worksheet`] - A sparse in-memory workbook model
//! - [`DocumentProperties`] - OOXML and BIFF8 document metadata
//! - [`CellFormatter`] - Locale-aware rendering of cell values to display strings
//!
//! ## Example
//!
//! ```rust
//! use hadoopoffice_core::{CellFormatter, CellValue, Locale, NumberFormat, Workbook};
//!
//! let mut workbook = Workbook::new();
//! let sheet = workbook.worksheet_mut(0).unwrap();
//! sheet.set_value("A1", 1.5).unwrap();
//!
//! let formatter = CellFormatter::new(Locale::parse("de"));
//! let text = formatter.format(&CellValue::Number(1.5), &NumberFormat::General, false);
//! assert_eq!(text, "1,5");
//! ```

pub mod cell;
pub mod comment;
pub mod error;
pub mod external;
pub mod format;
pub mod locale;
pub mod number_format;
pub mod properties;
pub mod workbook;
pub mod worksheet;

pub use cell::{CellAddress, CellError, CellRange, CellRef, CellValue};
pub use comment::CellComment;
pub use error::{Error, Result};
pub use external::ExternalLink;
pub use format::CellFormatter;
pub use locale::Locale;
pub use number_format::NumberFormat;
pub use properties::{CustomProperty, DocumentProperties};
pub use workbook::Workbook;
pub use worksheet::{Cell, Worksheet};

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;
