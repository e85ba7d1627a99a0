//! BIFF8 stream encryption (`FILEPASS` record)
//!
//! Two RC4 variants exist: the original binary RC4 with MD5 key derivation
//! (FILEPASS version 1.1) and CryptoAPI RC4 (versions 2.2 to 4.2). In both
//! the key is re-derived for every 1024-byte block of the `Workbook` stream,
//! and the keystream position follows the absolute stream offset.

use rand::RngCore;
use rc4::consts::U16;
use rc4::{KeyInit, Rc4, StreamCipher};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::hash::{password_utf16le, HashAlgorithm};
use crate::standard::read_u32;

/// Bytes of stream encrypted with one block key
pub const BLOCK_LEN: usize = 1024;

/// Password Excel applies to workbooks that are only write-protected
pub const DEFAULT_PASSWORD: &str = "VelvetSweatshop";

const SALT_LEN: usize = 16;

#[derive(Clone)]
enum KeyMaterial {
    /// First five bytes of the MD5 intermediate hash
    Rc4 { truncated: Zeroizing<Vec<u8>> },
    /// `H0` and the key size of CryptoAPI RC4
    CryptoApi {
        hash: HashAlgorithm,
        h0: Zeroizing<Vec<u8>>,
        key_bits: u32,
    },
}

/// Decrypts or encrypts record data of a BIFF8 workbook stream
#[derive(Clone)]
pub struct BiffCipher {
    key: KeyMaterial,
}

impl std::fmt::Debug for BiffCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.key {
            KeyMaterial::Rc4 { .. } => "rc4",
            KeyMaterial::CryptoApi { .. } => "cryptoapi",
        };
        f.debug_struct("BiffCipher").field("kind", &kind).finish()
    }
}

fn u16_at(bytes: &[u8], offset: usize) -> CryptoResult<u16> {
    bytes
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| CryptoError::InvalidFormat("FILEPASS record truncated".into()))
}

fn field(bytes: &[u8], offset: usize, len: usize) -> CryptoResult<&[u8]> {
    bytes
        .get(offset..offset + len)
        .ok_or_else(|| CryptoError::InvalidFormat("FILEPASS record truncated".into()))
}

fn rc4_intermediate(password: &str, salt: &[u8]) -> Zeroizing<Vec<u8>> {
    let h0 = HashAlgorithm::Md5.digest(&password_utf16le(password));
    let mut buffer = Vec::with_capacity(16 * (5 + salt.len()));
    for _ in 0..16 {
        buffer.extend_from_slice(&h0[..5]);
        buffer.extend_from_slice(salt);
    }
    let mut h1 = HashAlgorithm::Md5.digest(&buffer);
    h1.truncate(5);
    Zeroizing::new(h1)
}

impl BiffCipher {
    /// Build the cipher from a FILEPASS record payload, checking the password
    pub fn from_filepass(payload: &[u8], password: &str) -> CryptoResult<Self> {
        match u16_at(payload, 0)? {
            0 => {
                return Err(CryptoError::Unsupported(
                    "XOR obfuscation is not supported".into(),
                ))
            }
            1 => {}
            other => {
                return Err(CryptoError::Unsupported(format!(
                    "FILEPASS encryption type {other}"
                )))
            }
        }
        let major = u16_at(payload, 2)?;
        let minor = u16_at(payload, 4)?;
        match (major, minor) {
            (1, 1) => Self::binary_rc4(&payload[6..], password),
            (2..=4, 2) => Self::cryptoapi_rc4(&payload[6..], password),
            _ => Err(CryptoError::Unsupported(format!(
                "FILEPASS RC4 version {major}.{minor}"
            ))),
        }
    }

    fn binary_rc4(data: &[u8], password: &str) -> CryptoResult<Self> {
        let salt = field(data, 0, SALT_LEN)?;
        let mut verifier = field(data, 16, 16)?.to_vec();
        let mut verifier_hash = field(data, 32, 16)?.to_vec();

        let cipher = Self {
            key: KeyMaterial::Rc4 {
                truncated: rc4_intermediate(password, salt),
            },
        };
        let mut rc4 = cipher.block_cipher(0);
        rc4.apply_keystream(&mut verifier);
        rc4.apply_keystream(&mut verifier_hash);
        let expected = HashAlgorithm::Md5.digest(&verifier);
        if bool::from(expected.ct_eq(&verifier_hash)) {
            Ok(cipher)
        } else {
            Err(CryptoError::InvalidPassword)
        }
    }

    fn cryptoapi_rc4(data: &[u8], password: &str) -> CryptoResult<Self> {
        // EncryptionHeader.Flags then the header size
        let header_size = read_u32(data, 4)? as usize;
        let header = field(data, 8, header_size)?;
        let hash = HashAlgorithm::from_alg_id(read_u32(header, 12)?)?;
        let key_bits = match read_u32(header, 16)? {
            0 => 40,
            bits @ (40 | 128) => bits,
            other => {
                return Err(CryptoError::Unsupported(format!(
                    "CryptoAPI RC4 key size {other}"
                )))
            }
        };

        let verifier = data
            .get(8 + header_size..)
            .ok_or_else(|| CryptoError::InvalidFormat("FILEPASS verifier missing".into()))?;
        let salt_size = read_u32(verifier, 0)? as usize;
        let salt = field(verifier, 4, salt_size)?;
        let mut encrypted_verifier = field(verifier, 4 + salt_size, 16)?.to_vec();
        let hash_size = read_u32(verifier, 20 + salt_size)? as usize;
        let mut encrypted_hash = field(verifier, 24 + salt_size, hash_size)?.to_vec();

        let h0 = hash.digest_parts(&[salt, &password_utf16le(password)]);
        let cipher = Self {
            key: KeyMaterial::CryptoApi {
                hash,
                h0: Zeroizing::new(h0),
                key_bits,
            },
        };
        let mut rc4 = cipher.block_cipher(0);
        rc4.apply_keystream(&mut encrypted_verifier);
        rc4.apply_keystream(&mut encrypted_hash);
        let expected = hash.digest(&encrypted_verifier);
        if bool::from(expected.ct_eq(&encrypted_hash)) {
            Ok(cipher)
        } else {
            Err(CryptoError::InvalidPassword)
        }
    }

    /// New binary RC4 cipher for `password`. Returns the cipher and the
    /// FILEPASS record payload to write in front of the encrypted records.
    pub fn rc4_for_password(password: &str) -> (Self, Vec<u8>) {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);
        let mut verifier = [0u8; 16];
        rng.fill_bytes(&mut verifier);

        let cipher = Self {
            key: KeyMaterial::Rc4 {
                truncated: rc4_intermediate(password, &salt),
            },
        };
        let mut encrypted_verifier = verifier.to_vec();
        let mut encrypted_hash = HashAlgorithm::Md5.digest(&verifier);
        let mut rc4 = cipher.block_cipher(0);
        rc4.apply_keystream(&mut encrypted_verifier);
        rc4.apply_keystream(&mut encrypted_hash);

        let mut payload = Vec::with_capacity(54);
        payload.extend_from_slice(&1u16.to_le_bytes());
        payload.extend_from_slice(&1u16.to_le_bytes());
        payload.extend_from_slice(&1u16.to_le_bytes());
        payload.extend_from_slice(&salt);
        payload.extend_from_slice(&encrypted_verifier);
        payload.extend_from_slice(&encrypted_hash);
        (cipher, payload)
    }

    fn block_key(&self, block: u32) -> Zeroizing<[u8; 16]> {
        let digest = match &self.key {
            KeyMaterial::Rc4 { truncated } => {
                HashAlgorithm::Md5.digest_parts(&[truncated.as_slice(), &block.to_le_bytes()])
            }
            KeyMaterial::CryptoApi { hash, h0, key_bits } => {
                let mut key = hash.digest_parts(&[h0.as_slice(), &block.to_le_bytes()]);
                // 40-bit keys are zero-padded to 128 bits
                key.truncate(*key_bits as usize / 8);
                key
            }
        };
        let mut key = Zeroizing::new([0u8; 16]);
        let len = digest.len().min(16);
        key[..len].copy_from_slice(&digest[..len]);
        key
    }

    fn block_cipher(&self, block: u32) -> Rc4<U16> {
        let key = self.block_key(block);
        Rc4::new(&(*key).into())
    }

    /// XOR `data`, located at `stream_offset` in the workbook stream, with
    /// the keystream. The same call encrypts and decrypts.
    pub fn apply(&self, stream_offset: usize, data: &mut [u8]) {
        let mut offset = stream_offset;
        let mut done = 0;
        let mut skip = [0u8; BLOCK_LEN];
        while done < data.len() {
            let block = offset / BLOCK_LEN;
            let within = offset % BLOCK_LEN;
            let len = (BLOCK_LEN - within).min(data.len() - done);

            let mut rc4 = self.block_cipher(block as u32);
            rc4.apply_keystream(&mut skip[..within]);
            rc4.apply_keystream(&mut data[done..done + len]);

            offset += len;
            done += len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filepass_roundtrip() {
        let (writer, payload) = BiffCipher::rc4_for_password("pw");
        assert_eq!(payload.len(), 54);
        let reader = BiffCipher::from_filepass(&payload, "pw").unwrap();

        let plain: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        let mut data = plain.clone();
        writer.apply(100, &mut data);
        assert_ne!(data, plain);
        reader.apply(100, &mut data);
        assert_eq!(data, plain);
    }

    #[test]
    fn test_wrong_password() {
        let (_, payload) = BiffCipher::rc4_for_password("pw");
        assert!(matches!(
            BiffCipher::from_filepass(&payload, "PW"),
            Err(CryptoError::InvalidPassword)
        ));
    }

    #[test]
    fn test_apply_is_position_based() {
        let (cipher, _) = BiffCipher::rc4_for_password("x");
        let mut whole = vec![0u8; 2100];
        cipher.apply(10, &mut whole);

        let mut pieces = vec![0u8; 2100];
        let (a, b) = pieces.split_at_mut(1500);
        cipher.apply(10, a);
        cipher.apply(1510, b);
        assert_eq!(whole, pieces);
    }

    #[test]
    fn test_xor_obfuscation_unsupported() {
        assert!(matches!(
            BiffCipher::from_filepass(&[0, 0, 1, 2, 3, 4], "x"),
            Err(CryptoError::Unsupported(_))
        ));
    }
}
