use hadoopoffice_crypto::{decrypt_ooxml, BiffCipher, CryptoError};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0),
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn test_decrypt_arbitrary_bytes_never_panics(
        bytes in proptest::collection::vec(any::<u8>(), 0..=2048)
    ) {
        let _ = decrypt_ooxml(&bytes, "password");
    }

    #[test]
    fn test_rc4_chunks_match_whole(
        data in proptest::collection::vec(any::<u8>(), 1..=3000),
        offset in 0usize..4096,
        split in any::<prop::sample::Index>(),
    ) {
        let (cipher, _) = BiffCipher::rc4_for_password("secret");
        let mut whole = data.clone();
        cipher.apply(offset, &mut whole);

        let at = split.index(data.len());
        let mut chunked = data.clone();
        let (head, tail) = chunked.split_at_mut(at);
        cipher.apply(offset, head);
        cipher.apply(offset + at, tail);
        prop_assert_eq!(&whole, &chunked);

        cipher.apply(offset, &mut whole);
        prop_assert_eq!(whole, data);
    }

    #[test]
    fn test_rc4_filepass_roundtrip(password in "[a-zA-Z0-9]{1,14}") {
        let (cipher, filepass) = BiffCipher::rc4_for_password(&password);
        let mut data = b"workbook stream bytes".to_vec();
        cipher.apply(100, &mut data);

        let reader = BiffCipher::from_filepass(&filepass, &password).unwrap();
        reader.apply(100, &mut data);
        prop_assert_eq!(&data[..], &b"workbook stream bytes"[..]);

        let wrong = format!("{password}x");
        prop_assert!(matches!(
            BiffCipher::from_filepass(&filepass, &wrong),
            Err(CryptoError::InvalidPassword)
        ));
    }
}
