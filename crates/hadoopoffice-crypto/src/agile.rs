//! Agile encryption (MS-OFFCRYPTO 2.3.4.10, Office 2010 and later)
//!
//! The `EncryptionInfo` stream carries an XML descriptor. The package is
//! encrypted with a random intermediate key in 4096-byte segments, each
//! segment with its own IV. The intermediate key is stored encrypted with a
//! key derived from the password.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use quick_xml::events::Event;
use quick_xml::Reader;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::hash::{iterated_hash, HashAlgorithm};
use crate::symmetric::{cbc_decrypt, cbc_encrypt, pad_to_block, CipherAlgorithm, BLOCK_LEN};

const VERIFIER_HASH_INPUT_BLOCK: [u8; 8] = [0xFE, 0xA7, 0xD2, 0x76, 0x3B, 0x4B, 0x9E, 0x79];
const VERIFIER_HASH_VALUE_BLOCK: [u8; 8] = [0xD7, 0xAA, 0x0F, 0x6D, 0x30, 0x61, 0x34, 0x4E];
const KEY_VALUE_BLOCK: [u8; 8] = [0x14, 0x6E, 0x0B, 0xE7, 0xAB, 0xAC, 0xD0, 0xD6];
const HMAC_KEY_BLOCK: [u8; 8] = [0x5F, 0xB2, 0xAD, 0x01, 0x0C, 0xB9, 0xE1, 0xF6];
const HMAC_VALUE_BLOCK: [u8; 8] = [0xA0, 0x67, 0x7F, 0x02, 0xB2, 0x2C, 0x84, 0x33];

const SEGMENT_LEN: usize = 4096;
const SALT_LEN: usize = 16;

const ENCRYPTION_NS: &str = "http://schemas.microsoft.com/office/2006/encryption";
const PASSWORD_NS: &str = "http://schemas.microsoft.com/office/2006/keyEncryptor/password";

#[derive(Debug, Clone, Default)]
struct KeyData {
    salt: Vec<u8>,
    block_size: usize,
    key_bits: u32,
    hash: Option<HashAlgorithm>,
    cipher: String,
    chaining: String,
}

#[derive(Debug, Clone, Default)]
struct PasswordKey {
    spin_count: u32,
    salt: Vec<u8>,
    block_size: usize,
    key_bits: u32,
    hash: Option<HashAlgorithm>,
    encrypted_verifier_hash_input: Vec<u8>,
    encrypted_verifier_hash_value: Vec<u8>,
    encrypted_key_value: Vec<u8>,
}

/// Parsed agile descriptor, restricted to the password key encryptor
#[derive(Debug, Clone, Default)]
pub(crate) struct AgileInfo {
    key_data: KeyData,
    encrypted_hmac_key: Vec<u8>,
    encrypted_hmac_value: Vec<u8>,
    password: PasswordKey,
}

fn b64(value: &str) -> CryptoResult<Vec<u8>> {
    BASE64
        .decode(value.trim())
        .map_err(|e| CryptoError::InvalidFormat(format!("invalid base64: {e}")))
}

fn number<T: std::str::FromStr>(name: &str, value: &str) -> CryptoResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CryptoError::InvalidFormat(format!("invalid {name}: {value}")))
}

fn hash_attr(value: &str) -> CryptoResult<HashAlgorithm> {
    HashAlgorithm::parse(value)
        .ok_or_else(|| CryptoError::Unsupported(format!("hash algorithm {value}")))
}

/// Parse the XML part of an agile `EncryptionInfo` stream
pub(crate) fn parse_info(xml: &[u8]) -> CryptoResult<AgileInfo> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);
    let mut info = AgileInfo::default();
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| CryptoError::InvalidFormat(format!("EncryptionInfo XML: {e}")))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let local = e.local_name();
                let element = local.as_ref();
                for attr in e.attributes().flatten() {
                    let value = attr
                        .unescape_value()
                        .map_err(|e| CryptoError::InvalidFormat(e.to_string()))?;
                    let key = attr.key.local_name();
                    match element {
                        b"keyData" => {
                            let kd = &mut info.key_data;
                            match key.as_ref() {
                                b"saltValue" => kd.salt = b64(&value)?,
                                b"blockSize" => kd.block_size = number("blockSize", &value)?,
                                b"keyBits" => kd.key_bits = number("keyBits", &value)?,
                                b"hashAlgorithm" => kd.hash = Some(hash_attr(&value)?),
                                b"cipherAlgorithm" => kd.cipher = value.to_string(),
                                b"cipherChaining" => kd.chaining = value.to_string(),
                                _ => {}
                            }
                        }
                        b"dataIntegrity" => match key.as_ref() {
                            b"encryptedHmacKey" => info.encrypted_hmac_key = b64(&value)?,
                            b"encryptedHmacValue" => info.encrypted_hmac_value = b64(&value)?,
                            _ => {}
                        },
                        b"encryptedKey" => {
                            let pk = &mut info.password;
                            match key.as_ref() {
                                b"spinCount" => pk.spin_count = number("spinCount", &value)?,
                                b"saltValue" => pk.salt = b64(&value)?,
                                b"blockSize" => pk.block_size = number("blockSize", &value)?,
                                b"keyBits" => pk.key_bits = number("keyBits", &value)?,
                                b"hashAlgorithm" => pk.hash = Some(hash_attr(&value)?),
                                b"encryptedVerifierHashInput" => {
                                    pk.encrypted_verifier_hash_input = b64(&value)?
                                }
                                b"encryptedVerifierHashValue" => {
                                    pk.encrypted_verifier_hash_value = b64(&value)?
                                }
                                b"encryptedKeyValue" => pk.encrypted_key_value = b64(&value)?,
                                _ => {}
                            }
                        }
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if info.password.encrypted_key_value.is_empty() {
        return Err(CryptoError::Unsupported(
            "agile descriptor without a password key encryptor".into(),
        ));
    }
    if !info.key_data.cipher.eq_ignore_ascii_case("AES") {
        return Err(CryptoError::Unsupported(format!(
            "cipher algorithm {}",
            info.key_data.cipher
        )));
    }
    if !info.key_data.chaining.is_empty() && info.key_data.chaining != "ChainingModeCBC" {
        return Err(CryptoError::Unsupported(format!(
            "cipher chaining {}",
            info.key_data.chaining
        )));
    }
    Ok(info)
}

/// Key for one of the fixed blocks: `Hash(H || block)`, truncated or padded
/// with 0x36 to the key size
fn derive_key(hash: HashAlgorithm, h: &[u8], block: &[u8], key_bits: u32) -> Zeroizing<Vec<u8>> {
    let mut key = hash.digest_parts(&[h, block]);
    key.resize(key_bits as usize / 8, 0x36);
    Zeroizing::new(key)
}

/// IV from the key data salt and a block key, sized to the cipher block
fn derive_iv(hash: HashAlgorithm, salt: &[u8], block: &[u8], block_size: usize) -> Vec<u8> {
    let mut iv = hash.digest_parts(&[salt, block]);
    iv.resize(block_size, 0x36);
    iv
}

fn salt_iv(salt: &[u8], block_size: usize) -> Vec<u8> {
    let mut iv = salt.to_vec();
    iv.resize(block_size, 0x36);
    iv
}

fn decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut buf = data.to_vec();
    cbc_decrypt(key, iv, &mut buf)?;
    Ok(buf)
}

fn encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut buf = pad_to_block(data.to_vec());
    cbc_encrypt(key, iv, &mut buf)?;
    Ok(buf)
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut out);
    out
}

/// Recover the intermediate key, checking the password verifier
fn intermediate_key(info: &AgileInfo, password: &str) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let pk = &info.password;
    let hash = pk
        .hash
        .ok_or_else(|| CryptoError::InvalidFormat("encryptedKey without hashAlgorithm".into()))?;
    let block_size = if pk.block_size == 0 { BLOCK_LEN } else { pk.block_size };
    let iv = salt_iv(&pk.salt, block_size);
    let h = Zeroizing::new(iterated_hash(hash, &pk.salt, password, pk.spin_count));

    let key1 = derive_key(hash, &h, &VERIFIER_HASH_INPUT_BLOCK, pk.key_bits);
    let verifier_input = decrypt(&key1, &iv, &pk.encrypted_verifier_hash_input)?;
    let key2 = derive_key(hash, &h, &VERIFIER_HASH_VALUE_BLOCK, pk.key_bits);
    let verifier_value = decrypt(&key2, &iv, &pk.encrypted_verifier_hash_value)?;

    let input = verifier_input.get(..SALT_LEN).unwrap_or(&verifier_input[..]);
    let expected = hash.digest(input);
    let actual = verifier_value
        .get(..expected.len())
        .ok_or(CryptoError::InvalidPassword)?;
    if !bool::from(expected.ct_eq(actual)) {
        return Err(CryptoError::InvalidPassword);
    }

    let key3 = derive_key(hash, &h, &KEY_VALUE_BLOCK, pk.key_bits);
    let mut key = decrypt(&key3, &iv, &pk.encrypted_key_value)?;
    key.truncate(info.key_data.key_bits as usize / 8);
    Ok(Zeroizing::new(key))
}

/// Decrypt an `EncryptedPackage` stream
pub(crate) fn decrypt_package(
    info: &AgileInfo,
    package: &[u8],
    password: &str,
) -> CryptoResult<Vec<u8>> {
    let key = intermediate_key(info, password)?;
    let kd = &info.key_data;
    let hash = kd
        .hash
        .ok_or_else(|| CryptoError::InvalidFormat("keyData without hashAlgorithm".into()))?;
    let block_size = if kd.block_size == 0 { BLOCK_LEN } else { kd.block_size };

    verify_integrity(info, &key, hash, block_size, package)?;

    let (size, body) = split_size_prefix(package)?;
    let mut out = Vec::with_capacity(body.len());
    for (index, segment) in body.chunks(SEGMENT_LEN).enumerate() {
        let iv = derive_iv(hash, &kd.salt, &(index as u32).to_le_bytes(), block_size);
        let mut buf = pad_to_block(segment.to_vec());
        cbc_decrypt(&key, &iv, &mut buf)?;
        out.extend_from_slice(&buf);
    }
    if out.len() < size {
        return Err(CryptoError::InvalidFormat(
            "EncryptedPackage shorter than its declared size".into(),
        ));
    }
    out.truncate(size);
    Ok(out)
}

fn verify_integrity(
    info: &AgileInfo,
    key: &[u8],
    hash: HashAlgorithm,
    block_size: usize,
    package: &[u8],
) -> CryptoResult<()> {
    if info.encrypted_hmac_key.is_empty() || info.encrypted_hmac_value.is_empty() {
        log::debug!("agile descriptor without data integrity, skipping HMAC check");
        return Ok(());
    }
    let salt = &info.key_data.salt;
    let hmac_key = decrypt(
        key,
        &derive_iv(hash, salt, &HMAC_KEY_BLOCK, block_size),
        &info.encrypted_hmac_key,
    )?;
    let hmac_value = decrypt(
        key,
        &derive_iv(hash, salt, &HMAC_VALUE_BLOCK, block_size),
        &info.encrypted_hmac_value,
    )?;
    let len = hash.output_len();
    let (Some(hmac_key), Some(expected)) = (hmac_key.get(..len), hmac_value.get(..len)) else {
        return Err(CryptoError::IntegrityCheckFailed);
    };
    let actual = hash.hmac(hmac_key, package)?;
    if bool::from(actual.as_slice().ct_eq(expected)) {
        Ok(())
    } else {
        Err(CryptoError::IntegrityCheckFailed)
    }
}

pub(crate) fn split_size_prefix(package: &[u8]) -> CryptoResult<(usize, &[u8])> {
    let prefix: [u8; 8] = package
        .get(..8)
        .and_then(|p| p.try_into().ok())
        .ok_or_else(|| CryptoError::InvalidFormat("EncryptedPackage stream too short".into()))?;
    let body = &package[8..];
    let size = u64::from_le_bytes(prefix);
    let size = usize::try_from(size)
        .map_err(|_| CryptoError::InvalidFormat(format!("EncryptedPackage size {size}")))?;
    Ok((size, body))
}

/// Encrypt a package. Returns the `EncryptionInfo` and `EncryptedPackage`
/// stream contents.
pub(crate) fn encrypt_package(
    package: &[u8],
    password: &str,
    cipher: CipherAlgorithm,
    hash: HashAlgorithm,
    spin_count: u32,
) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
    let key_bits = cipher.key_bits();
    let key = Zeroizing::new(random_bytes(cipher.key_len()));
    let key_data_salt = random_bytes(SALT_LEN);
    let password_salt = random_bytes(SALT_LEN);

    // Package segments
    let mut stream = Vec::with_capacity(package.len() + 8 + BLOCK_LEN);
    stream.extend_from_slice(&(package.len() as u64).to_le_bytes());
    for (index, segment) in package.chunks(SEGMENT_LEN).enumerate() {
        let iv = derive_iv(hash, &key_data_salt, &(index as u32).to_le_bytes(), BLOCK_LEN);
        stream.extend_from_slice(&encrypt(&key, &iv, segment)?);
    }

    // Password key encryptor
    let h = Zeroizing::new(iterated_hash(hash, &password_salt, password, spin_count));
    let iv = salt_iv(&password_salt, BLOCK_LEN);
    let verifier_input = random_bytes(SALT_LEN);
    let verifier_hash = hash.digest(&verifier_input);
    let enc_verifier_input = encrypt(
        &derive_key(hash, &h, &VERIFIER_HASH_INPUT_BLOCK, key_bits),
        &iv,
        &verifier_input,
    )?;
    let enc_verifier_value = encrypt(
        &derive_key(hash, &h, &VERIFIER_HASH_VALUE_BLOCK, key_bits),
        &iv,
        &verifier_hash,
    )?;
    let enc_key_value = encrypt(&derive_key(hash, &h, &KEY_VALUE_BLOCK, key_bits), &iv, &key)?;

    // Data integrity
    let hmac_key = random_bytes(hash.output_len());
    let hmac_value = hash.hmac(&hmac_key, &stream)?;
    let enc_hmac_key = encrypt(
        &key,
        &derive_iv(hash, &key_data_salt, &HMAC_KEY_BLOCK, BLOCK_LEN),
        &hmac_key,
    )?;
    let enc_hmac_value = encrypt(
        &key,
        &derive_iv(hash, &key_data_salt, &HMAC_VALUE_BLOCK, BLOCK_LEN),
        &hmac_value,
    )?;

    let hash_name = hash.agile_name();
    let hash_size = hash.output_len();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<encryption xmlns="{ENCRYPTION_NS}" xmlns:p="{PASSWORD_NS}"><keyData saltSize="{SALT_LEN}" blockSize="{BLOCK_LEN}" keyBits="{key_bits}" hashSize="{hash_size}" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="{hash_name}" saltValue="{}"/><dataIntegrity encryptedHmacKey="{}" encryptedHmacValue="{}"/><keyEncryptors><keyEncryptor uri="{PASSWORD_NS}"><p:encryptedKey spinCount="{spin_count}" saltSize="{SALT_LEN}" blockSize="{BLOCK_LEN}" keyBits="{key_bits}" hashSize="{hash_size}" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="{hash_name}" saltValue="{}" encryptedVerifierHashInput="{}" encryptedVerifierHashValue="{}" encryptedKeyValue="{}"/></keyEncryptor></keyEncryptors></encryption>"#,
        BASE64.encode(&key_data_salt),
        BASE64.encode(&enc_hmac_key),
        BASE64.encode(&enc_hmac_value),
        BASE64.encode(&password_salt),
        BASE64.encode(&enc_verifier_input),
        BASE64.encode(&enc_verifier_value),
        BASE64.encode(&enc_key_value),
    );

    let mut info = Vec::with_capacity(8 + xml.len());
    info.extend_from_slice(&4u16.to_le_bytes());
    info.extend_from_slice(&4u16.to_le_bytes());
    info.extend_from_slice(&0x40u32.to_le_bytes());
    info.extend_from_slice(xml.as_bytes());
    Ok((info, stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(cipher: CipherAlgorithm, hash: HashAlgorithm) {
        let package = b"PK\x03\x04 some zip bytes that span less than a segment".repeat(200);
        let (info_bytes, stream) = encrypt_package(&package, "secret", cipher, hash, 10).unwrap();
        let info = parse_info(&info_bytes[8..]).unwrap();
        assert_eq!(info.password.spin_count, 10);
        assert_eq!(info.key_data.key_bits, cipher.key_bits());

        let plain = decrypt_package(&info, &stream, "secret").unwrap();
        assert_eq!(plain, package);
    }

    #[test]
    fn test_roundtrip_aes256_sha512() {
        roundtrip(CipherAlgorithm::Aes256, HashAlgorithm::Sha512);
    }

    #[test]
    fn test_roundtrip_aes128_sha1() {
        roundtrip(CipherAlgorithm::Aes128, HashAlgorithm::Sha1);
    }

    #[test]
    fn test_roundtrip_aes192_sha384() {
        roundtrip(CipherAlgorithm::Aes192, HashAlgorithm::Sha384);
    }

    #[test]
    fn test_wrong_password() {
        let (info_bytes, stream) = encrypt_package(
            b"PK data",
            "right",
            CipherAlgorithm::Aes256,
            HashAlgorithm::Sha512,
            10,
        )
        .unwrap();
        let info = parse_info(&info_bytes[8..]).unwrap();
        assert!(matches!(
            decrypt_package(&info, &stream, "wrong"),
            Err(CryptoError::InvalidPassword)
        ));
    }

    #[test]
    fn test_tampered_package_fails_integrity() {
        let (info_bytes, mut stream) = encrypt_package(
            &[7u8; 5000],
            "pw",
            CipherAlgorithm::Aes128,
            HashAlgorithm::Sha256,
            10,
        )
        .unwrap();
        let last = stream.len() - 1;
        stream[last] ^= 0xFF;
        let info = parse_info(&info_bytes[8..]).unwrap();
        assert!(matches!(
            decrypt_package(&info, &stream, "pw"),
            Err(CryptoError::IntegrityCheckFailed)
        ));
    }
}
