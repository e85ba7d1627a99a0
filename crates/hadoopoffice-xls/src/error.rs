//! XLS error types

use hadoopoffice_crypto::CryptoError;
use thiserror::Error;

/// Result type for XLS operations
pub type XlsResult<T> = std::result::Result<T, XlsError>;

/// Errors that can occur during XLS reading/writing
#[derive(Debug, Error)]
pub enum XlsError {
    /// IO error (also covers CFB errors which use std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format
    #[error("Invalid XLS format: {0}")]
    InvalidFormat(String),

    /// Unsupported version
    #[error("Unsupported XLS version: {0}")]
    UnsupportedVersion(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// A record body ends before a field it must hold
    #[error("{record} record truncated: need {needed} bytes at offset {offset}")]
    Truncated {
        record: &'static str,
        offset: usize,
        needed: usize,
    },

    /// The workbook stream is encrypted and no password was given
    #[error("workbook is encrypted and needs a password")]
    PasswordRequired,

    /// The password does not open the workbook stream
    #[error("wrong password")]
    WrongPassword,

    /// Encryption error other than a wrong password
    #[error("Encryption error: {0}")]
    Crypto(CryptoError),

    /// A formula that cannot be expressed as BIFF8 tokens, or tokens
    /// that cannot be turned back into a formula
    #[error("Unsupported formula: {0}")]
    Formula(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] hadoopoffice_core::Error),
}

impl From<CryptoError> for XlsError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidPassword => XlsError::WrongPassword,
            CryptoError::PasswordRequired => XlsError::PasswordRequired,
            other => XlsError::Crypto(other),
        }
    }
}
