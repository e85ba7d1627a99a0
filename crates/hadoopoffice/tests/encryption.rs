//! Password protected output: OOXML agile and standard encryption, BIFF8 RC4

mod common;

use common::*;
use hadoopoffice::config::{
    CONF_WRITE_CHAIN_MODE, CONF_WRITE_ENCRYPT_ALGORITHM, CONF_WRITE_ENCRYPT_MODE,
    CONF_WRITE_HASH_ALGORITHM, CONF_WRITE_MIME_TYPE, CONF_WRITE_PASSWORD,
};
use hadoopoffice::prelude::*;
use pretty_assertions::assert_eq;

fn encrypted(entries: &[(&str, &str)]) -> HadoopOfficeWriteConfiguration {
    let mut conf: JobConf = entries.iter().copied().collect();
    conf.set(CONF_WRITE_PASSWORD, "test");
    let mut config = HadoopOfficeWriteConfiguration::from_conf(&conf).unwrap();
    config.locale = write_config(config.format).locale;
    config
}

fn check_passwords(file_name: &str, config: HadoopOfficeWriteConfiguration) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_cells(&dir.path().join(file_name), config, None, &single_sheet());

    for low_footprint in [false, true] {
        let mut read = read_config();
        read.low_footprint = low_footprint;
        read.password = Some("test".into());
        let records = read_records(&path, &read);
        assert_eq!(records.len(), 4);
        assert_eq!(
            values(&records[0].1),
            vec![Some("test1"), Some("test2"), Some("test3")]
        );
        assert_eq!(values(&records[3].1), vec![Some("3")]);

        read.password = Some("wrong".into());
        assert!(
            matches!(try_read(&path, &read), Err(Error::WrongPassword)),
            "{file_name} opened with a wrong password"
        );

        read.password = None;
        assert!(
            matches!(try_read(&path, &read), Err(Error::PasswordRequired)),
            "{file_name} opened without a password"
        );
    }
}

#[test]
fn test_ooxml_agile() {
    let config = encrypted(&[
        (CONF_WRITE_ENCRYPT_ALGORITHM, "aes256"),
        (CONF_WRITE_HASH_ALGORITHM, "sha512"),
        (CONF_WRITE_ENCRYPT_MODE, "agile"),
        (CONF_WRITE_CHAIN_MODE, "cbc"),
    ]);
    check_passwords("agile.xlsx", config);
}

#[test]
fn test_ooxml_agile_aes128_sha256() {
    let config = encrypted(&[
        (CONF_WRITE_ENCRYPT_ALGORITHM, "aes128"),
        (CONF_WRITE_HASH_ALGORITHM, "sha256"),
    ]);
    check_passwords("agile128.xlsx", config);
}

#[test]
fn test_ooxml_standard() {
    let config = encrypted(&[
        (CONF_WRITE_ENCRYPT_ALGORITHM, "aes128"),
        (CONF_WRITE_HASH_ALGORITHM, "sha1"),
        (CONF_WRITE_ENCRYPT_MODE, "standard"),
    ]);
    check_passwords("standard.xlsx", config);
}

#[test]
fn test_biff8_rc4() {
    let config = encrypted(&[(CONF_WRITE_MIME_TYPE, "application/vnd.ms-excel")]);
    check_passwords("rc4.xls", config);
}

#[test]
fn test_rc4_rejected_for_xlsx() {
    let config = encrypted(&[(CONF_WRITE_ENCRYPT_ALGORITHM, "rc4")]);
    let dir = tempfile::tempdir().unwrap();
    let mut writer = ExcelRecordWriter::new(dir.path().join("rc4.xlsx"), config, None).unwrap();
    writer.write(&dao("x", "", "A1", "Sheet1")).unwrap();
    assert!(matches!(writer.close(), Err(Error::Configuration(_))));
}
