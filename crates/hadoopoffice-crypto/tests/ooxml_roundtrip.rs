use hadoopoffice_crypto::{
    decrypt_ooxml, encrypt_ooxml, encryption_mode, is_encrypted_ooxml, CipherAlgorithm,
    CryptoError, EncryptOptions, EncryptionMode, HashAlgorithm,
};
use pretty_assertions::assert_eq;

fn fake_package() -> Vec<u8> {
    let mut bytes = b"PK\x03\x04".to_vec();
    bytes.extend((0..10_000u32).map(|i| (i * 7 % 256) as u8));
    bytes
}

#[test]
fn test_agile_roundtrip() {
    let package = fake_package();
    let options = EncryptOptions {
        spin_count: 1000,
        ..EncryptOptions::default()
    };
    let encrypted = encrypt_ooxml(&package, "test", &options).unwrap();

    assert!(is_encrypted_ooxml(&encrypted));
    assert!(!is_encrypted_ooxml(&package));
    assert_eq!(encryption_mode(&encrypted).unwrap(), EncryptionMode::Agile);
    assert_eq!(decrypt_ooxml(&encrypted, "test").unwrap(), package);
}

#[test]
fn test_standard_roundtrip() {
    let package = fake_package();
    let options = EncryptOptions {
        mode: EncryptionMode::Standard,
        cipher: CipherAlgorithm::Aes128,
        hash: HashAlgorithm::Sha1,
        spin_count: 50_000,
    };
    let encrypted = encrypt_ooxml(&package, "test", &options).unwrap();
    assert_eq!(encryption_mode(&encrypted).unwrap(), EncryptionMode::Standard);
    assert_eq!(decrypt_ooxml(&encrypted, "test").unwrap(), package);
}

#[test]
fn test_wrong_password_is_reported() {
    let options = EncryptOptions {
        cipher: CipherAlgorithm::Aes128,
        hash: HashAlgorithm::Sha1,
        spin_count: 10,
        ..EncryptOptions::default()
    };
    let encrypted = encrypt_ooxml(&fake_package(), "right", &options).unwrap();
    assert!(matches!(
        decrypt_ooxml(&encrypted, "wrong"),
        Err(CryptoError::InvalidPassword)
    ));
}

#[test]
fn test_plain_bytes_are_not_a_container() {
    assert!(decrypt_ooxml(b"not a compound file", "x").is_err());
}
