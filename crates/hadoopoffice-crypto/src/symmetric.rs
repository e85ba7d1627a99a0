//! AES block operations without padding

use aes::{Aes128, Aes192, Aes256};
use cipher::block_padding::NoPadding;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};

use crate::error::{CryptoError, CryptoResult};

/// AES key size of an encryption descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    Aes128,
    Aes192,
    Aes256,
}

impl CipherAlgorithm {
    /// Parse a configuration name such as `aes256`
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "aes128" => Some(CipherAlgorithm::Aes128),
            "aes192" => Some(CipherAlgorithm::Aes192),
            "aes256" => Some(CipherAlgorithm::Aes256),
            _ => None,
        }
    }

    pub fn key_bits(&self) -> u32 {
        match self {
            CipherAlgorithm::Aes128 => 128,
            CipherAlgorithm::Aes192 => 192,
            CipherAlgorithm::Aes256 => 256,
        }
    }

    pub fn key_len(&self) -> usize {
        self.key_bits() as usize / 8
    }

    /// CryptoAPI `ALG_ID`
    pub fn alg_id(&self) -> u32 {
        match self {
            CipherAlgorithm::Aes128 => 0x660E,
            CipherAlgorithm::Aes192 => 0x660F,
            CipherAlgorithm::Aes256 => 0x6610,
        }
    }

    pub fn from_alg_id(alg_id: u32) -> CryptoResult<Self> {
        match alg_id {
            0x660E => Ok(CipherAlgorithm::Aes128),
            0x660F => Ok(CipherAlgorithm::Aes192),
            0x6610 => Ok(CipherAlgorithm::Aes256),
            other => Err(CryptoError::Unsupported(format!("cipher id {other:#x}"))),
        }
    }

    pub fn from_key_bits(bits: u32) -> CryptoResult<Self> {
        match bits {
            128 => Ok(CipherAlgorithm::Aes128),
            192 => Ok(CipherAlgorithm::Aes192),
            256 => Ok(CipherAlgorithm::Aes256),
            other => Err(CryptoError::Unsupported(format!("AES key size {other}"))),
        }
    }
}

pub(crate) const BLOCK_LEN: usize = 16;

/// Zero-pad to a whole number of AES blocks
pub(crate) fn pad_to_block(mut data: Vec<u8>) -> Vec<u8> {
    let rem = data.len() % BLOCK_LEN;
    if rem != 0 {
        data.resize(data.len() + BLOCK_LEN - rem, 0);
    }
    data
}

fn check_len(buf: &[u8]) -> CryptoResult<()> {
    if buf.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::InvalidFormat(format!(
            "ciphertext length {} is not a multiple of {}",
            buf.len(),
            BLOCK_LEN
        )));
    }
    Ok(())
}

fn key_error(key: &[u8]) -> CryptoError {
    CryptoError::InvalidFormat(format!("invalid AES key length {}", key.len()))
}

pub(crate) fn cbc_encrypt(key: &[u8], iv: &[u8], buf: &mut [u8]) -> CryptoResult<()> {
    check_len(buf)?;
    let len = buf.len();
    macro_rules! run {
        ($aes:ty) => {
            cbc::Encryptor::<$aes>::new_from_slices(key, iv)
                .map_err(|_| key_error(key))?
                .encrypt_padded_mut::<NoPadding>(buf, len)
                .map(|_| ())
                .map_err(|_| CryptoError::InvalidFormat("AES-CBC encryption failed".into()))
        };
    }
    match key.len() {
        16 => run!(Aes128),
        24 => run!(Aes192),
        32 => run!(Aes256),
        _ => Err(key_error(key)),
    }
}

pub(crate) fn cbc_decrypt(key: &[u8], iv: &[u8], buf: &mut [u8]) -> CryptoResult<()> {
    check_len(buf)?;
    macro_rules! run {
        ($aes:ty) => {
            cbc::Decryptor::<$aes>::new_from_slices(key, iv)
                .map_err(|_| key_error(key))?
                .decrypt_padded_mut::<NoPadding>(buf)
                .map(|_| ())
                .map_err(|_| CryptoError::InvalidFormat("AES-CBC decryption failed".into()))
        };
    }
    match key.len() {
        16 => run!(Aes128),
        24 => run!(Aes192),
        32 => run!(Aes256),
        _ => Err(key_error(key)),
    }
}

pub(crate) fn ecb_encrypt(key: &[u8], buf: &mut [u8]) -> CryptoResult<()> {
    check_len(buf)?;
    fn run<C: BlockEncrypt + KeyInit>(key: &[u8], buf: &mut [u8]) -> CryptoResult<()> {
        let cipher = C::new_from_slice(key).map_err(|_| key_error(key))?;
        for block in buf.chunks_mut(BLOCK_LEN) {
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }
    match key.len() {
        16 => run::<Aes128>(key, buf),
        24 => run::<Aes192>(key, buf),
        32 => run::<Aes256>(key, buf),
        _ => Err(key_error(key)),
    }
}

pub(crate) fn ecb_decrypt(key: &[u8], buf: &mut [u8]) -> CryptoResult<()> {
    check_len(buf)?;
    fn run<C: BlockDecrypt + KeyInit>(key: &[u8], buf: &mut [u8]) -> CryptoResult<()> {
        let cipher = C::new_from_slice(key).map_err(|_| key_error(key))?;
        for block in buf.chunks_mut(BLOCK_LEN) {
            cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }
    match key.len() {
        16 => run::<Aes128>(key, buf),
        24 => run::<Aes192>(key, buf),
        32 => run::<Aes256>(key, buf),
        _ => Err(key_error(key)),
    }
}
