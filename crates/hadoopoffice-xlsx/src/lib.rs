//! # hadoopoffice-xlsx
//!
//! XLSX (Office Open XML) reader and writer for hadoopoffice.
//!
//! [`XlsxReader`] loads a package into a [`hadoopoffice_core::Workbook`],
//! [`XlsxStreamReader`] walks the rows of one sheet at a time, and
//! [`XlsxWriter`] produces a package from a workbook. Encrypted packages
//! are handled one level up with `hadoopoffice-crypto`.

pub mod error;
pub mod reader;
pub mod writer;

mod external;
mod package;
mod props;
mod styles;
mod xml;

pub use error::{XlsxError, XlsxResult};
pub use reader::{StreamRow, XlsxReader, XlsxStreamReader};
pub use writer::{XlsxWriteOptions, XlsxWriter};
