//! Hash algorithms used by the Office encryption schemes

use hmac::{Hmac, Mac};
use sha1::Digest;

use crate::error::{CryptoError, CryptoResult};

/// Hash algorithm of an encryption descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Parse a configuration name such as `sha512` or an agile descriptor
    /// name such as `SHA512`
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().replace('-', "").as_str() {
            "MD5" => Some(HashAlgorithm::Md5),
            "SHA1" => Some(HashAlgorithm::Sha1),
            "SHA256" => Some(HashAlgorithm::Sha256),
            "SHA384" => Some(HashAlgorithm::Sha384),
            "SHA512" => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Name as written in agile `EncryptionInfo` XML
    pub fn agile_name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha384 => "SHA384",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }

    /// CryptoAPI `ALG_ID`
    pub fn alg_id(&self) -> u32 {
        match self {
            HashAlgorithm::Md5 => 0x8003,
            HashAlgorithm::Sha1 => 0x8004,
            HashAlgorithm::Sha256 => 0x800C,
            HashAlgorithm::Sha384 => 0x800D,
            HashAlgorithm::Sha512 => 0x800E,
        }
    }

    pub fn from_alg_id(alg_id: u32) -> CryptoResult<Self> {
        match alg_id {
            0x8003 => Ok(HashAlgorithm::Md5),
            // 0 means the provider default, SHA-1
            0 | 0x8004 => Ok(HashAlgorithm::Sha1),
            0x800C => Ok(HashAlgorithm::Sha256),
            0x800D => Ok(HashAlgorithm::Sha384),
            0x800E => Ok(HashAlgorithm::Sha512),
            other => Err(CryptoError::Unsupported(format!(
                "hash algorithm id {other:#x}"
            ))),
        }
    }

    /// Digest size in bytes
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        self.digest_parts(&[data])
    }

    /// Digest of the concatenation of `parts`
    pub fn digest_parts(&self, parts: &[&[u8]]) -> Vec<u8> {
        fn run<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for part in parts {
                hasher.update(part);
            }
            hasher.finalize().to_vec()
        }
        match self {
            HashAlgorithm::Md5 => run::<md5::Md5>(parts),
            HashAlgorithm::Sha1 => run::<sha1::Sha1>(parts),
            HashAlgorithm::Sha256 => run::<sha2::Sha256>(parts),
            HashAlgorithm::Sha384 => run::<sha2::Sha384>(parts),
            HashAlgorithm::Sha512 => run::<sha2::Sha512>(parts),
        }
    }

    /// HMAC of `data` keyed with `key`
    pub fn hmac(&self, key: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
        macro_rules! mac {
            ($hash:ty) => {{
                let mut mac = <Hmac<$hash> as Mac>::new_from_slice(key)
                    .map_err(|_| CryptoError::InvalidFormat("invalid HMAC key".into()))?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }};
        }
        Ok(match self {
            HashAlgorithm::Md5 => mac!(md5::Md5),
            HashAlgorithm::Sha1 => mac!(sha1::Sha1),
            HashAlgorithm::Sha256 => mac!(sha2::Sha256),
            HashAlgorithm::Sha384 => mac!(sha2::Sha384),
            HashAlgorithm::Sha512 => mac!(sha2::Sha512),
        })
    }
}

/// Password as UTF-16LE bytes
pub(crate) fn password_utf16le(password: &str) -> Vec<u8> {
    password
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

/// `H0 = Hash(salt || password)`, then `spin_count` rounds of
/// `Hn = Hash(LE32(n) || Hn-1)`
pub(crate) fn iterated_hash(
    hash: HashAlgorithm,
    salt: &[u8],
    password: &str,
    spin_count: u32,
) -> Vec<u8> {
    let pw = password_utf16le(password);
    let mut h = hash.digest_parts(&[salt, &pw]);
    for i in 0..spin_count {
        h = hash.digest_parts(&[&i.to_le_bytes(), &h]);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!(HashAlgorithm::parse("sha512"), Some(HashAlgorithm::Sha512));
        assert_eq!(HashAlgorithm::parse("SHA-1"), Some(HashAlgorithm::Sha1));
        assert_eq!(HashAlgorithm::parse("whirlpool"), None);
    }

    #[test]
    fn test_output_len_matches_digest() {
        for alg in [
            HashAlgorithm::Md5,
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            assert_eq!(alg.digest(b"abc").len(), alg.output_len());
            assert_eq!(alg.hmac(b"key", b"abc").unwrap().len(), alg.output_len());
        }
    }

    #[test]
    fn test_digest_parts_concatenates() {
        let alg = HashAlgorithm::Sha256;
        assert_eq!(alg.digest_parts(&[b"ab", b"c"]), alg.digest(b"abc"));
    }
}
