//! # hadoopoffice-crypto
//!
//! Password encryption for Office files.
//!
//! - OOXML packages (`.xlsx`) are wrapped in an OLE compound file holding
//!   an `EncryptionInfo` and an `EncryptedPackage` stream. Both agile
//!   (Office 2010+) and standard (Office 2007) encryption are supported.
//! - BIFF8 workbooks (`.xls`) encrypt record data in place, announced by a
//!   `FILEPASS` record. See [`BiffCipher`].
//!
//! ```rust,ignore
//! use hadoopoffice_crypto::{decrypt_ooxml, encrypt_ooxml, EncryptOptions};
//!
//! let encrypted = encrypt_ooxml(&zip_bytes, "secret", &EncryptOptions::default())?;
//! let zip = decrypt_ooxml(&encrypted, "secret")?;
//! ```

mod agile;
pub mod biff;
pub mod error;
pub mod hash;
mod standard;
mod symmetric;

use std::io::{Cursor, Read, Write};

pub use biff::BiffCipher;
pub use error::{CryptoError, CryptoResult};
pub use hash::HashAlgorithm;
pub use symmetric::CipherAlgorithm;

const ENCRYPTION_INFO: &str = "EncryptionInfo";
const ENCRYPTED_PACKAGE: &str = "EncryptedPackage";

/// OLE compound file signature
const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// How an OOXML package is encrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    /// XML descriptor, per-segment IVs, HMAC integrity
    Agile,
    /// Binary descriptor, AES-ECB, SHA-1 key derivation
    Standard,
}

/// Parameters for [`encrypt_ooxml`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptOptions {
    pub mode: EncryptionMode,
    pub cipher: CipherAlgorithm,
    /// Ignored in standard mode, which always uses SHA-1
    pub hash: HashAlgorithm,
    /// Ignored in standard mode, which always spins 50 000 times
    pub spin_count: u32,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            mode: EncryptionMode::Agile,
            cipher: CipherAlgorithm::Aes256,
            hash: HashAlgorithm::Sha512,
            spin_count: 100_000,
        }
    }
}

/// Whether `bytes` start like an OLE compound file
pub fn is_compound_file(bytes: &[u8]) -> bool {
    bytes.starts_with(&CFB_SIGNATURE)
}

/// Whether `bytes` are an OLE compound file wrapping an encrypted package
pub fn is_encrypted_ooxml(bytes: &[u8]) -> bool {
    if !is_compound_file(bytes) {
        return false;
    }
    match cfb::CompoundFile::open(Cursor::new(bytes)) {
        Ok(ole) => ole.is_stream(ENCRYPTION_INFO) && ole.is_stream(ENCRYPTED_PACKAGE),
        Err(_) => false,
    }
}

fn read_stream<R: Read + std::io::Seek>(
    ole: &mut cfb::CompoundFile<R>,
    name: &str,
) -> CryptoResult<Vec<u8>> {
    let mut stream = ole
        .open_stream(name)
        .map_err(|_| CryptoError::InvalidFormat(format!("missing {name} stream")))?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    Ok(buf)
}

fn mode_of(info: &[u8]) -> CryptoResult<EncryptionMode> {
    let version = info
        .get(..4)
        .map(|v| (u16::from_le_bytes([v[0], v[1]]), u16::from_le_bytes([v[2], v[3]])))
        .ok_or_else(|| CryptoError::InvalidFormat("EncryptionInfo too short".into()))?;
    match version {
        (4, 4) => Ok(EncryptionMode::Agile),
        (2..=4, 2) => Ok(EncryptionMode::Standard),
        (major, minor) => Err(CryptoError::Unsupported(format!(
            "EncryptionInfo version {major}.{minor}"
        ))),
    }
}

/// Detect the encryption mode of an encrypted OOXML container
pub fn encryption_mode(bytes: &[u8]) -> CryptoResult<EncryptionMode> {
    let mut ole = cfb::CompoundFile::open(Cursor::new(bytes))?;
    mode_of(&read_stream(&mut ole, ENCRYPTION_INFO)?)
}

/// Decrypt an encrypted OOXML container back to the zip package
pub fn decrypt_ooxml(bytes: &[u8], password: &str) -> CryptoResult<Vec<u8>> {
    let mut ole = cfb::CompoundFile::open(Cursor::new(bytes))?;
    let info = read_stream(&mut ole, ENCRYPTION_INFO)?;
    let package = read_stream(&mut ole, ENCRYPTED_PACKAGE)?;

    let mode = mode_of(&info)?;
    log::debug!("decrypting {mode:?} encrypted package ({} bytes)", package.len());
    let body = info
        .get(8..)
        .ok_or_else(|| CryptoError::InvalidFormat("EncryptionInfo too short".into()))?;
    match mode {
        EncryptionMode::Agile => {
            let info = agile::parse_info(body)?;
            agile::decrypt_package(&info, &package, password)
        }
        EncryptionMode::Standard => {
            let info = standard::parse_info(body)?;
            standard::decrypt_package(&info, &package, password)
        }
    }
}

/// Encrypt a zip package into an OLE compound file
pub fn encrypt_ooxml(
    package: &[u8],
    password: &str,
    options: &EncryptOptions,
) -> CryptoResult<Vec<u8>> {
    let (info, stream) = match options.mode {
        EncryptionMode::Agile => agile::encrypt_package(
            package,
            password,
            options.cipher,
            options.hash,
            options.spin_count,
        )?,
        EncryptionMode::Standard => {
            if options.hash != HashAlgorithm::Sha1 {
                log::warn!(
                    "standard encryption always uses SHA-1, ignoring {:?}",
                    options.hash
                );
            }
            standard::encrypt_package(package, password, options.cipher)?
        }
    };

    let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new()))?;
    ole.create_stream(ENCRYPTION_INFO)?.write_all(&info)?;
    ole.create_stream(ENCRYPTED_PACKAGE)?.write_all(&stream)?;
    ole.flush()?;
    Ok(ole.into_inner().into_inner())
}
