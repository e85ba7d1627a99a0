//! Crypto error types

use thiserror::Error;

/// Result type for encryption and decryption
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;

/// Errors from encrypting or decrypting Office documents
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The document is encrypted and no password was given
    #[error("password required")]
    PasswordRequired,

    /// The password does not match the document's verifier
    #[error("invalid password")]
    InvalidPassword,

    /// Encryption scheme or algorithm not supported
    #[error("unsupported encryption: {0}")]
    Unsupported(String),

    /// Malformed encryption structures
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// The decrypted package failed its HMAC check
    #[error("integrity check failed")]
    IntegrityCheckFailed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
