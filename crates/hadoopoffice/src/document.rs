//! Opening workbook files of either format
//!
//! The format of an input is taken from its content, not its name: an OLE
//! compound file is a BIFF8 workbook unless it wraps an encrypted OOXML
//! package, and a zip file is an OOXML package.

use std::io::Cursor;
use std::path::Path;

use hadoopoffice_core::Workbook;
use hadoopoffice_crypto::{decrypt_ooxml, is_compound_file, is_encrypted_ooxml};
use hadoopoffice_xls::{XlsReader, XlsStreamReader};
use hadoopoffice_xlsx::{XlsxReader, XlsxStreamReader};

use crate::codec::read_input;
use crate::error::{Error, Result};

const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Workbook file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    /// OOXML (`.xlsx`)
    Xlsx,
    /// BIFF8 (`.xls`)
    Xls,
}

impl SpreadsheetFormat {
    pub const MIME_XLSX: &'static str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
    pub const MIME_XLS: &'static str = "application/vnd.ms-excel";

    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim() {
            Self::MIME_XLSX => Some(SpreadsheetFormat::Xlsx),
            Self::MIME_XLS => Some(SpreadsheetFormat::Xls),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            SpreadsheetFormat::Xlsx => Self::MIME_XLSX,
            SpreadsheetFormat::Xls => Self::MIME_XLS,
        }
    }

    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            SpreadsheetFormat::Xlsx => "xlsx",
            SpreadsheetFormat::Xls => "xls",
        }
    }

    /// Format named by a file's extension, ignoring a compression suffix
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        let name = [".gz", ".bz2", ".deflate"]
            .iter()
            .find_map(|ext| name.strip_suffix(ext))
            .unwrap_or(&name);
        if name.ends_with(".xlsx") || name.ends_with(".xlsm") {
            Some(SpreadsheetFormat::Xlsx)
        } else if name.ends_with(".xls") {
            Some(SpreadsheetFormat::Xls)
        } else {
            None
        }
    }
}

/// Decompressed, and for OOXML decrypted, content of a workbook file
pub enum Document {
    /// Zip package bytes
    Xlsx(Vec<u8>),
    /// Compound file bytes; the workbook stream may still be encrypted
    Xls(Vec<u8>),
}

impl Document {
    /// Identify the format of `bytes` and decrypt an OOXML package
    pub fn open(bytes: Vec<u8>, password: Option<&str>) -> Result<Self> {
        if is_compound_file(&bytes) {
            if !is_encrypted_ooxml(&bytes) {
                return Ok(Document::Xls(bytes));
            }
            let password = password.ok_or(Error::PasswordRequired)?;
            log::debug!("decrypting OOXML package");
            return Ok(Document::Xlsx(decrypt_ooxml(&bytes, password)?));
        }
        if bytes.starts_with(&ZIP_SIGNATURE) {
            return Ok(Document::Xlsx(bytes));
        }
        Err(Error::FormatNotUnderstood(
            "neither an OLE compound file nor a zip package".into(),
        ))
    }

    pub fn format(&self) -> SpreadsheetFormat {
        match self {
            Document::Xlsx(_) => SpreadsheetFormat::Xlsx,
            Document::Xls(_) => SpreadsheetFormat::Xls,
        }
    }

    /// Parse the whole workbook
    pub fn into_workbook(self, password: Option<&str>) -> Result<Workbook> {
        match self {
            Document::Xlsx(bytes) => Ok(XlsxReader::read(Cursor::new(bytes))?),
            Document::Xls(bytes) => Ok(XlsReader::read(Cursor::new(bytes), password)?),
        }
    }

    /// Open a low-footprint row stream
    pub fn into_stream(self, password: Option<&str>) -> Result<RowStream> {
        match self {
            Document::Xlsx(bytes) => Ok(RowStream::Xlsx(Box::new(XlsxStreamReader::new(
                Cursor::new(bytes),
            )?))),
            Document::Xls(bytes) => Ok(RowStream::Xls(Box::new(XlsStreamReader::new(
                Cursor::new(bytes),
                password,
            )?))),
        }
    }
}

/// Streaming reader of either format
pub enum RowStream {
    Xlsx(Box<XlsxStreamReader<Cursor<Vec<u8>>>>),
    Xls(Box<XlsStreamReader>),
}

/// Load a workbook file of either format, decompressing it by extension
pub fn load_workbook(path: &Path, password: Option<&str>) -> Result<Workbook> {
    let bytes = read_input(path)?;
    let workbook = Document::open(bytes, password)?.into_workbook(password)?;
    log::debug!(
        "loaded {} ({} sheets)",
        path.display(),
        workbook.sheet_count()
    );
    Ok(workbook)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            SpreadsheetFormat::from_path(&PathBuf::from("/data/in.xlsx.gz")),
            Some(SpreadsheetFormat::Xlsx)
        );
        assert_eq!(
            SpreadsheetFormat::from_path(&PathBuf::from("in.XLS")),
            Some(SpreadsheetFormat::Xls)
        );
        assert_eq!(SpreadsheetFormat::from_path(&PathBuf::from("in.csv")), None);
    }

    #[test]
    fn test_mime_types() {
        for format in [SpreadsheetFormat::Xlsx, SpreadsheetFormat::Xls] {
            assert_eq!(SpreadsheetFormat::from_mime_type(format.mime_type()), Some(format));
        }
        assert_eq!(SpreadsheetFormat::from_mime_type("text/csv"), None);
    }

    #[test]
    fn test_unknown_content() {
        assert!(matches!(
            Document::open(b"a,b,c\n".to_vec(), None),
            Err(Error::FormatNotUnderstood(_))
        ));
    }
}
