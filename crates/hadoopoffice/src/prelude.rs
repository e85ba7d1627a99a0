//! Prelude module - common imports for hadoopoffice users
//!
//! ```rust
//! use hadoopoffice::prelude::*;
//! ```

pub use crate::{
    // Records
    ArrayWritable,
    CellValue,
    // Errors
    Error,
    // Formats
    ExcelFileInputFormat,
    ExcelFileOutputFormat,
    ExcelRecordReader,
    ExcelRecordWriter,
    FileSplit,
    HadoopOfficeReadConfiguration,
    HadoopOfficeWriteConfiguration,
    // Configuration
    JobConf,
    Result,
    SpreadSheetCellDAO,
    SpreadsheetFormat,
    Text,
    TextArrayWritable,
    Workbook,
    Writable,
};
