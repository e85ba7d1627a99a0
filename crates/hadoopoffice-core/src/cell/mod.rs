//! Cell-related types
//!
//! - [`CellValue`] - The value stored in a cell
//! - [`CellAddress`] - A cell's location (e.g., "A1")
//! - [`CellRange`] - A rectangular block of cells (e.g., "A1:B10")
//! - [`CellRef`] - An address qualified by sheet and, optionally, workbook

mod address;
mod value;

pub use address::{CellAddress, CellRange, CellRef};
pub use value::{CellError, CellValue};
