//! RC4 encryption of the workbook stream.
//!
//! When the globals substream carries a FILEPASS record, every record
//! body after it is encrypted, except for a few records that must stay
//! readable and the stream offset at the start of BOUNDSHEET. Record
//! headers are never encrypted.

use hadoopoffice_crypto::biff::DEFAULT_PASSWORD;
use hadoopoffice_crypto::{BiffCipher, CryptoError};

use crate::biff::records;
use crate::error::{XlsError, XlsResult};

fn header_at(stream: &[u8], pos: usize) -> Option<(u16, usize)> {
    let header = stream.get(pos..pos + 4)?;
    Some((
        u16::from_le_bytes([header[0], header[1]]),
        u16::from_le_bytes([header[2], header[3]]) as usize,
    ))
}

/// Body range of the record at `pos` that is encrypted, if any
fn encrypted_span(record_type: u16, pos: usize, len: usize) -> Option<(usize, usize)> {
    match record_type {
        records::BOF
        | records::FILEPASS
        | records::INTERFACEHDR
        | records::USREXCL
        | records::FILELOCK
        | records::RRDINFO
        | records::RRDHEAD => None,
        records::BOUNDSHEET if len > 4 => Some((pos + 8, len - 4)),
        records::BOUNDSHEET => None,
        _ if len == 0 => None,
        _ => Some((pos + 4, len)),
    }
}

/// Apply the keystream to every encrypted body after the record at
/// `start`
fn apply_from(stream: &mut [u8], start: usize, cipher: &BiffCipher) -> XlsResult<()> {
    let mut pos = start;
    while let Some((record_type, len)) = header_at(stream, pos) {
        if pos + 4 + len > stream.len() {
            return Err(XlsError::InvalidFormat(format!(
                "record at offset {pos} runs past the end of the stream"
            )));
        }
        if let Some((from, n)) = encrypted_span(record_type, pos, len) {
            cipher.apply(from, &mut stream[from..from + n]);
        }
        pos += 4 + len;
    }
    Ok(())
}

/// Position and body of the FILEPASS record of the globals substream
fn find_filepass(stream: &[u8]) -> Option<(usize, Vec<u8>)> {
    let mut pos = 0;
    while let Some((record_type, len)) = header_at(stream, pos) {
        match record_type {
            records::FILEPASS => {
                let body = stream.get(pos + 4..pos + 4 + len)?.to_vec();
                return Some((pos, body));
            }
            // FILEPASS precedes every record that could hold cell data
            records::BOUNDSHEET | records::EOF => return None,
            _ => pos += 4 + len,
        }
    }
    None
}

/// Whether the workbook stream is encrypted
pub fn is_encrypted(stream: &[u8]) -> bool {
    find_filepass(stream).is_some()
}

/// Decrypt the stream in place. Without a password the default
/// write-protection password is tried. Returns whether the stream was
/// encrypted.
pub fn decrypt_stream(stream: &mut [u8], password: Option<&str>) -> XlsResult<bool> {
    let Some((pos, filepass)) = find_filepass(stream) else {
        return Ok(false);
    };
    let cipher = match password {
        Some(password) => BiffCipher::from_filepass(&filepass, password)?,
        None => match BiffCipher::from_filepass(&filepass, DEFAULT_PASSWORD) {
            Ok(cipher) => {
                log::debug!("workbook stream opened with the default password");
                cipher
            }
            Err(CryptoError::InvalidPassword) => return Err(XlsError::PasswordRequired),
            Err(e) => return Err(e.into()),
        },
    };
    apply_from(stream, pos, &cipher)?;
    log::debug!("decrypted workbook stream ({} bytes)", stream.len());
    Ok(true)
}

/// Encrypt a stream written with a FILEPASS record at `filepass_pos`
pub fn encrypt_stream(stream: &mut [u8], filepass_pos: usize, cipher: &BiffCipher) -> XlsResult<()> {
    apply_from(stream, filepass_pos, cipher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biff::{bof, push_record};

    fn sample_stream(password: &str) -> (Vec<u8>, Vec<u8>) {
        let (cipher, filepass) = BiffCipher::rc4_for_password(password);
        let mut stream = Vec::new();
        push_record(&mut stream, records::BOF, &bof(records::BOF_WORKBOOK_GLOBALS));
        let filepass_pos = stream.len();
        push_record(&mut stream, records::FILEPASS, &filepass);
        push_record(&mut stream, records::CODEPAGE, &1200u16.to_le_bytes());
        push_record(&mut stream, records::BOUNDSHEET, &[0x10, 0, 0, 0, 0, 0, 1, 0, b'S']);
        push_record(&mut stream, records::EOF, &[]);
        let plain = stream.clone();
        encrypt_stream(&mut stream, filepass_pos, &cipher).unwrap();
        (plain, stream)
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let (plain, mut stream) = sample_stream("secret");
        assert_ne!(plain, stream);
        assert!(is_encrypted(&stream));
        // BOUNDSHEET offset stays readable
        let bs = plain.len() - 4 - 13;
        assert_eq!(&stream[bs + 4..bs + 8], &plain[bs + 4..bs + 8]);

        assert!(decrypt_stream(&mut stream, Some("secret")).unwrap());
        assert_eq!(stream, plain);
    }

    #[test]
    fn test_wrong_and_missing_password() {
        let (_, stream) = sample_stream("secret");
        let mut copy = stream.clone();
        assert!(matches!(
            decrypt_stream(&mut copy, Some("wrong")),
            Err(XlsError::WrongPassword)
        ));
        let mut copy = stream.clone();
        assert!(matches!(
            decrypt_stream(&mut copy, None),
            Err(XlsError::PasswordRequired)
        ));

        let (plain, mut stream) = sample_stream(DEFAULT_PASSWORD);
        assert!(decrypt_stream(&mut stream, None).unwrap());
        assert_eq!(stream, plain);
    }
}
