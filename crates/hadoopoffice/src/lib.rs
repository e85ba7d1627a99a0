//! # hadoopoffice
//!
//! MapReduce-style input and output formats for Excel workbooks.
//!
//! A workbook (`.xls` or `.xlsx`, optionally gzip, bzip2 or deflate
//! compressed) is read as a sequence of rows keyed
//! `[file]Sheet!A<row>`, each row an array of [`SpreadSheetCellDAO`]s.
//! Writing goes the other way: cells are collected per sheet and address
//! and serialized as one workbook when the writer is closed.
//!
//! ## Features
//!
//! - Locale-aware display values, with formulas re-evaluated on read
//! - Low-footprint streaming reads for large workbooks
//! - Password decryption and encryption (OOXML agile/standard, BIFF8 RC4)
//! - Document selection by metadata regular expressions
//! - Templates and linked workbooks on write
//!
//! ## Example
//!
//! ```rust,no_run
//! use hadoopoffice::prelude::*;
//!
//! let mut conf = JobConf::new();
//! conf.set("mapreduce.input.fileinputformat.inputdir", "/data/excel");
//! conf.set("hadoopoffice.read.locale.bcp47", "de");
//!
//! let format = ExcelFileInputFormat::new();
//! for split in format.get_splits(&conf, 1)? {
//!     let reader = format.get_record_reader(&split, &conf)?;
//!     for record in reader {
//!         let (key, row) = record?;
//!         println!("{key}: {} cells", row.len());
//!     }
//! }
//! # Ok::<(), hadoopoffice::Error>(())
//! ```

pub mod calculation;
pub mod codec;
pub mod config;
pub mod dao;
pub mod document;
pub mod error;
pub mod filter;
pub mod format;
pub mod prelude;
pub mod reader;
pub mod split;
pub mod writable;
pub mod writer;

pub use calculation::{CalculationOptions, CalculationStats, WorkbookCalculationExt};
pub use codec::CompressionCodec;
pub use config::{HadoopOfficeReadConfiguration, HadoopOfficeWriteConfiguration, JobConf};
pub use dao::{SpreadSheetCellDAO, SpreadSheetRow};
pub use document::{load_workbook, SpreadsheetFormat};
pub use error::{Error, Result};
pub use filter::MetadataFilter;
pub use format::{ExcelFileInputFormat, ExcelFileOutputFormat};
pub use reader::{ExcelRecordReader, RowSource};
pub use split::FileSplit;
pub use writable::{ArrayWritable, Text, TextArrayWritable, Writable};
pub use writer::ExcelRecordWriter;

// Re-export the workbook model
pub use hadoopoffice_core::{
    CellAddress, CellComment, CellFormatter, CellValue, DocumentProperties, Locale, NumberFormat,
    Workbook, Worksheet,
};
pub use hadoopoffice_core::properties::PropertySet;
