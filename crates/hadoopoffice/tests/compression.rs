//! Compressed output and input

mod common;

use common::*;
use hadoopoffice::config::{
    CONF_OUTPUT_COMPRESS, CONF_OUTPUT_COMPRESS_CODEC, CONF_OUTPUT_DIR, CONF_TASK_ATTEMPT_ID,
};
use hadoopoffice::prelude::*;
use hadoopoffice::CompressionCodec;
use pretty_assertions::assert_eq;

fn check_codec(codec: CompressionCodec, format: SpreadsheetFormat) {
    let dir = tempfile::tempdir().unwrap();
    let name = format!("compressed.{}{}", format.extension(), codec.extension());
    let path = write_cells(
        &dir.path().join(&name),
        write_config(format),
        Some(codec),
        &single_sheet(),
    );
    assert_eq!(CompressionCodec::from_path(&path), Some(codec));

    for low_footprint in [false, true] {
        let mut config = read_config();
        config.low_footprint = low_footprint;
        let records = read_records(&path, &config);
        assert_eq!(records[0].0, format!("[{name}]Sheet1!A1"));
        assert_eq!(records.len(), 4);
        assert_eq!(values(&records[3].1), vec![Some("3")]);
    }
}

#[test]
fn test_gzip() {
    check_codec(CompressionCodec::Gzip, SpreadsheetFormat::Xlsx);
    check_codec(CompressionCodec::Gzip, SpreadsheetFormat::Xls);
}

#[test]
fn test_bzip2() {
    check_codec(CompressionCodec::BZip2, SpreadsheetFormat::Xlsx);
    check_codec(CompressionCodec::BZip2, SpreadsheetFormat::Xls);
}

#[test]
fn test_deflate() {
    check_codec(CompressionCodec::Deflate, SpreadsheetFormat::Xlsx);
}

#[test]
fn test_compressed_output_format() {
    let dir = tempfile::tempdir().unwrap();
    let mut conf = JobConf::new();
    conf.set(CONF_OUTPUT_DIR, dir.path().to_string_lossy())
        .set(CONF_TASK_ATTEMPT_ID, "attempt_local_0001_r_000000_0")
        .set_bool(CONF_OUTPUT_COMPRESS, true)
        .set(
            CONF_OUTPUT_COMPRESS_CODEC,
            "org.apache.hadoop.io.compress.GzipCodec",
        );

    let mut writer = ExcelFileOutputFormat::new()
        .get_record_writer(&conf, "part-r-00000")
        .unwrap();
    for cell in single_sheet() {
        writer.write(&cell).unwrap();
    }
    let path = writer.close().unwrap();
    assert!(path.ends_with("part-r-00000.xlsx.gz"));

    let records = read_records(&path, &read_config());
    assert_eq!(
        values(&records[0].1),
        vec![Some("test1"), Some("test2"), Some("test3")]
    );
}
