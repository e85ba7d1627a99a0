//! Standard encryption (ECMA-376, MS-OFFCRYPTO 2.3.4.5)
//!
//! A binary `EncryptionInfo` descriptor, SHA-1 key derivation with 50 000
//! spins and AES-ECB over the whole package.

use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::hash::{iterated_hash, HashAlgorithm};
use crate::symmetric::{ecb_decrypt, ecb_encrypt, pad_to_block, CipherAlgorithm, BLOCK_LEN};

const SPIN_COUNT: u32 = 50_000;
const SALT_LEN: usize = 16;
const FLAG_CRYPTOAPI: u32 = 0x04;
const FLAG_AES: u32 = 0x20;
const PROV_RSA_AES: u32 = 0x18;
const CSP_NAME: &str = "Microsoft Enhanced RSA and AES Cryptographic Provider";

/// Parsed standard descriptor
#[derive(Debug, Clone)]
pub(crate) struct StandardInfo {
    cipher: CipherAlgorithm,
    hash: HashAlgorithm,
    salt: Vec<u8>,
    encrypted_verifier: Vec<u8>,
    verifier_hash_size: usize,
    encrypted_verifier_hash: Vec<u8>,
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> CryptoResult<u32> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| CryptoError::InvalidFormat(format!("truncated at offset {offset}")))
}

fn slice(bytes: &[u8], offset: usize, len: usize) -> CryptoResult<&[u8]> {
    bytes
        .get(offset..offset + len)
        .ok_or_else(|| CryptoError::InvalidFormat(format!("truncated at offset {offset}")))
}

/// Parse a standard `EncryptionInfo` stream after its 8-byte version header
pub(crate) fn parse_info(bytes: &[u8]) -> CryptoResult<StandardInfo> {
    let header_size = read_u32(bytes, 0)? as usize;
    let header = slice(bytes, 4, header_size)?;
    let alg_id = read_u32(header, 8)?;
    let alg_id_hash = read_u32(header, 12)?;
    let key_bits = read_u32(header, 16)?;

    let cipher = match alg_id {
        // 0 lets the provider pick, which for AES providers follows the key size
        0 => CipherAlgorithm::from_key_bits(key_bits)?,
        id => CipherAlgorithm::from_alg_id(id)?,
    };
    let hash = HashAlgorithm::from_alg_id(alg_id_hash)?;

    let verifier = bytes
        .get(4 + header_size..)
        .ok_or_else(|| CryptoError::InvalidFormat("missing EncryptionVerifier".into()))?;
    let salt_size = read_u32(verifier, 0)? as usize;
    let salt = slice(verifier, 4, salt_size)?.to_vec();
    let mut offset = 4 + salt_size;
    let encrypted_verifier = slice(verifier, offset, BLOCK_LEN)?.to_vec();
    offset += BLOCK_LEN;
    let verifier_hash_size = read_u32(verifier, offset)? as usize;
    offset += 4;
    let hash_len = (verifier_hash_size + BLOCK_LEN - 1) / BLOCK_LEN * BLOCK_LEN;
    let encrypted_verifier_hash = slice(verifier, offset, hash_len)?.to_vec();

    Ok(StandardInfo {
        cipher,
        hash,
        salt,
        encrypted_verifier,
        verifier_hash_size,
        encrypted_verifier_hash,
    })
}

/// Password to AES key, the CryptoAPI `CryptDeriveKey` way
fn derive_key(
    hash: HashAlgorithm,
    salt: &[u8],
    password: &str,
    cipher: CipherAlgorithm,
) -> Zeroizing<Vec<u8>> {
    let h = iterated_hash(hash, salt, password, SPIN_COUNT);
    let h_final = hash.digest_parts(&[&h, &0u32.to_le_bytes()]);

    let mut inner = [0x36u8; 64];
    let mut outer = [0x5Cu8; 64];
    for (i, b) in h_final.iter().enumerate() {
        inner[i] ^= b;
        outer[i] ^= b;
    }
    let mut key = hash.digest(&inner);
    key.extend_from_slice(&hash.digest(&outer));
    key.truncate(cipher.key_len());
    Zeroizing::new(key)
}

fn verify(info: &StandardInfo, key: &[u8]) -> CryptoResult<()> {
    let mut verifier = info.encrypted_verifier.clone();
    ecb_decrypt(key, &mut verifier)?;
    let mut verifier_hash = info.encrypted_verifier_hash.clone();
    ecb_decrypt(key, &mut verifier_hash)?;

    let expected = info.hash.digest(&verifier);
    let actual = verifier_hash
        .get(..info.verifier_hash_size.min(expected.len()))
        .ok_or(CryptoError::InvalidPassword)?;
    if actual.len() == expected.len() && bool::from(expected.ct_eq(actual)) {
        Ok(())
    } else {
        Err(CryptoError::InvalidPassword)
    }
}

pub(crate) fn decrypt_package(
    info: &StandardInfo,
    package: &[u8],
    password: &str,
) -> CryptoResult<Vec<u8>> {
    let key = derive_key(info.hash, &info.salt, password, info.cipher);
    verify(info, &key)?;

    let (size, body) = crate::agile::split_size_prefix(package)?;
    let mut out = pad_to_block(body.to_vec());
    ecb_decrypt(&key, &mut out)?;
    if out.len() < size {
        return Err(CryptoError::InvalidFormat(
            "EncryptedPackage shorter than its declared size".into(),
        ));
    }
    out.truncate(size);
    Ok(out)
}

/// Encrypt a package. Returns the `EncryptionInfo` and `EncryptedPackage`
/// stream contents. Standard encryption always hashes with SHA-1.
pub(crate) fn encrypt_package(
    package: &[u8],
    password: &str,
    cipher: CipherAlgorithm,
) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
    let hash = HashAlgorithm::Sha1;
    let mut rng = rand::thread_rng();
    let mut salt = vec![0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    let mut verifier = vec![0u8; BLOCK_LEN];
    rng.fill_bytes(&mut verifier);

    let key = derive_key(hash, &salt, password, cipher);
    let verifier_hash = hash.digest(&verifier);
    let mut encrypted_verifier = verifier;
    ecb_encrypt(&key, &mut encrypted_verifier)?;
    let mut encrypted_verifier_hash = pad_to_block(verifier_hash.clone());
    ecb_encrypt(&key, &mut encrypted_verifier_hash)?;

    let flags = FLAG_CRYPTOAPI | FLAG_AES;
    let mut header = Vec::new();
    for value in [
        flags,
        0,
        cipher.alg_id(),
        hash.alg_id(),
        cipher.key_bits(),
        PROV_RSA_AES,
        0,
        0,
    ] {
        header.extend_from_slice(&value.to_le_bytes());
    }
    for unit in CSP_NAME.encode_utf16().chain(std::iter::once(0)) {
        header.extend_from_slice(&unit.to_le_bytes());
    }

    let mut info = Vec::new();
    info.extend_from_slice(&4u16.to_le_bytes());
    info.extend_from_slice(&2u16.to_le_bytes());
    info.extend_from_slice(&flags.to_le_bytes());
    info.extend_from_slice(&(header.len() as u32).to_le_bytes());
    info.extend_from_slice(&header);
    info.extend_from_slice(&(SALT_LEN as u32).to_le_bytes());
    info.extend_from_slice(&salt);
    info.extend_from_slice(&encrypted_verifier);
    info.extend_from_slice(&(verifier_hash.len() as u32).to_le_bytes());
    info.extend_from_slice(&encrypted_verifier_hash);

    let mut body = pad_to_block(package.to_vec());
    ecb_encrypt(&key, &mut body)?;
    let mut stream = Vec::with_capacity(8 + body.len());
    stream.extend_from_slice(&(package.len() as u64).to_le_bytes());
    stream.extend_from_slice(&body);
    Ok((info, stream))
}
