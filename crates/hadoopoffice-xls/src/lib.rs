//! # hadoopoffice-xls
//!
//! XLS (BIFF8) reader and writer for hadoopoffice.
//!
//! [`XlsReader`] loads a compound file into a
//! [`hadoopoffice_core::Workbook`], [`XlsStreamReader`] hands out the rows
//! of one sheet at a time and [`XlsWriter`] produces a compound file from
//! a workbook. RC4 encrypted workbook streams are read and written here.

pub mod biff;
pub mod error;
pub mod reader;
pub mod writer;

mod crypt;
mod styles;
mod summary;

pub use crypt::is_encrypted;
pub use error::{XlsError, XlsResult};
pub use reader::{StreamRow, XlsReader, XlsStreamReader};
pub use writer::{XlsWriteOptions, XlsWriter};
