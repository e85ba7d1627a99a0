//! Error types for the input and output formats

use hadoopoffice_crypto::CryptoError;
use hadoopoffice_formula::FormulaError;
use hadoopoffice_xls::XlsError;
use hadoopoffice_xlsx::XlsxError;
use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by record readers, record writers and formats
#[derive(Debug, Error)]
pub enum Error {
    /// The password does not open the workbook
    #[error("wrong password")]
    WrongPassword,

    /// The workbook is encrypted and no password was configured
    #[error("workbook is encrypted and no password was given")]
    PasswordRequired,

    /// The input is neither an xls nor an xlsx workbook, or is damaged
    #[error("format not understood: {0}")]
    FormatNotUnderstood(String),

    /// A cell could not be written or the workbook could not be serialized
    #[error("writer error: {0}")]
    Writer(String),

    /// The template workbook could not be loaded
    #[error("template error: {0}")]
    Template(String),

    /// A linked workbook is missing or unreadable
    #[error("linked workbook error: {0}")]
    LinkedWorkbook(String),

    /// A configuration value is missing or invalid
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Formula parsing or evaluation failed
    #[error("formula error: {0}")]
    Formula(#[from] FormulaError),

    /// Workbook model error
    #[error("core error: {0}")]
    Core(#[from] hadoopoffice_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidPassword => Error::WrongPassword,
            CryptoError::PasswordRequired => Error::PasswordRequired,
            CryptoError::Io(e) => Error::Io(e),
            other => Error::FormatNotUnderstood(other.to_string()),
        }
    }
}

impl From<XlsError> for Error {
    fn from(e: XlsError) -> Self {
        match e {
            XlsError::WrongPassword => Error::WrongPassword,
            XlsError::PasswordRequired => Error::PasswordRequired,
            XlsError::Io(e) => Error::Io(e),
            XlsError::Core(e) => Error::Core(e),
            XlsError::Crypto(e) => e.into(),
            other => Error::FormatNotUnderstood(other.to_string()),
        }
    }
}

impl From<XlsxError> for Error {
    fn from(e: XlsxError) -> Self {
        match e {
            XlsxError::Encrypted => Error::PasswordRequired,
            XlsxError::Io(e) => Error::Io(e),
            XlsxError::Core(e) => Error::Core(e),
            other => Error::FormatNotUnderstood(other.to_string()),
        }
    }
}
