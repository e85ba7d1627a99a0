//! End-to-end tests: cells written with the record writer and read back
//! with the record reader

mod common;

use common::*;
use hadoopoffice::config::{
    CONF_INPUT_DIR, CONF_OUTPUT_DIR, CONF_READ_LOCALE, CONF_READ_SHEETS, CONF_TASK_ATTEMPT_ID,
    CONF_WRITE_MIME_TYPE,
};
use hadoopoffice::prelude::*;
use pretty_assertions::assert_eq;

fn check_single_sheet(format: SpreadsheetFormat) {
    let dir = tempfile::tempdir().unwrap();
    let name = format!("single.{}", format.extension());
    let path = write_cells(
        &dir.path().join(&name),
        write_config(format),
        None,
        &single_sheet(),
    );

    let records = read_records(&path, &read_config());
    assert_eq!(
        keys(&records),
        vec![
            format!("[{name}]Sheet1!A1"),
            format!("[{name}]Sheet1!A2"),
            format!("[{name}]Sheet1!A3"),
            format!("[{name}]Sheet1!A4"),
        ]
    );

    let rows: Vec<_> = records.iter().map(|(_, row)| row).collect();
    assert_eq!(
        values(rows[0]),
        vec![Some("test1"), Some("test2"), Some("test3")]
    );
    assert_eq!(formulas(rows[0]), vec![Some(""), Some(""), Some("")]);
    assert!(rows[1].is_empty());
    assert_eq!(values(rows[2]), vec![Some("1"), Some("2"), Some("3")]);
    assert_eq!(formulas(rows[2]), vec![Some("1"), Some("2"), Some("3")]);
    assert_eq!(values(rows[3]), vec![Some("3")]);
    assert_eq!(formulas(rows[3]), vec![Some("A3+B3")]);

    let a1 = rows[0][0].as_ref().unwrap();
    assert_eq!(a1.address(), "A1");
    assert_eq!(a1.sheet_name(), "Sheet1");
    assert_eq!(a1.comment(), "");
}

#[test]
fn test_single_sheet_xlsx() {
    check_single_sheet(SpreadsheetFormat::Xlsx);
}

#[test]
fn test_single_sheet_xls() {
    check_single_sheet(SpreadsheetFormat::Xls);
}

fn multi_sheet() -> Vec<SpreadSheetCellDAO> {
    vec![
        dao("first", "", "A1", "Sheet1"),
        dao("second", "", "A1", "Sheet2"),
        dao("", "2*3", "B2", "Sheet2"),
        dao("third", "", "A1", "Sheet3"),
    ]
}

#[test]
fn test_multi_sheet_order() {
    for format in [SpreadsheetFormat::Xlsx, SpreadsheetFormat::Xls] {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cells(
            &dir.path().join(format!("multi.{}", format.extension())),
            write_config(format),
            None,
            &multi_sheet(),
        );

        let records = read_records(&path, &read_config());
        let sheets: Vec<_> = records
            .iter()
            .map(|(key, _)| key.split(']').nth(1).unwrap())
            .collect();
        assert_eq!(
            sheets,
            vec!["Sheet1!A1", "Sheet2!A1", "Sheet2!A2", "Sheet3!A1"]
        );
        assert_eq!(values(&records[2].1), vec![None, Some("6")]);
    }
}

#[test]
fn test_sheet_filter() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_cells(
        &dir.path().join("multi.xlsx"),
        write_config(SpreadsheetFormat::Xlsx),
        None,
        &multi_sheet(),
    );

    let mut config = read_config();
    config.sheets = Some(vec!["Sheet3".into(), "Missing".into(), "Sheet1".into()]);
    let records = read_records(&path, &config);
    assert_eq!(
        keys(&records),
        vec!["[multi.xlsx]Sheet1!A1", "[multi.xlsx]Sheet3!A1"]
    );
    assert_eq!(values(&records[1].1), vec![Some("third")]);
}

#[test]
fn test_comment_roundtrip() {
    for format in [SpreadsheetFormat::Xlsx, SpreadsheetFormat::Xls] {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cells(
            &dir.path().join(format!("comment.{}", format.extension())),
            write_config(format),
            None,
            &[
                SpreadSheetCellDAO::new("1", "This is a test", "", "A1", "Sheet1"),
                SpreadSheetCellDAO::new("2", "", "", "B1", "Sheet1"),
            ],
        );

        let records = read_records(&path, &read_config());
        assert_eq!(records.len(), 1);
        let row = &records[0].1;
        // .xls output does not carry comments
        let expected = match format {
            SpreadsheetFormat::Xlsx => "This is a test",
            SpreadsheetFormat::Xls => "",
        };
        assert_eq!(
            row[0],
            Some(SpreadSheetCellDAO::new("1", expected, "", "A1", "Sheet1"))
        );
        assert_eq!(row[1].as_ref().map(|c| c.comment()), Some(""));
    }
}

#[test]
fn test_low_footprint_equivalence() {
    let mut cells = single_sheet();
    cells.extend(multi_sheet().into_iter().skip(1));
    cells.push(SpreadSheetCellDAO::new("x", "noted", "", "D1", "Sheet1"));

    for format in [SpreadsheetFormat::Xlsx, SpreadsheetFormat::Xls] {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cells(
            &dir.path().join(format!("lowfootprint.{}", format.extension())),
            write_config(format),
            None,
            &cells,
        );

        let full = read_records(&path, &read_config());
        let mut config = read_config();
        config.low_footprint = true;
        let streamed = read_records(&path, &config);

        assert_eq!(keys(&streamed), keys(&full));
        for ((_, s), (_, f)) in streamed.iter().zip(&full) {
            assert_eq!(values(s), values(f));
            assert_eq!(formulas(s), formulas(f));
        }

        config.sheets = Some(vec!["Sheet2".into()]);
        let filtered = read_records(&path, &config);
        assert_eq!(filtered.len(), 2);
        assert_eq!(values(&filtered[1].1), vec![None, Some("6")]);
    }
}

#[test]
fn test_low_footprint_xlsx_inline_strings() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_config(SpreadsheetFormat::Xlsx);
    config.low_footprint = true;
    let path = write_cells(&dir.path().join("inline.xlsx"), config, None, &single_sheet());

    let records = read_records(&path, &read_config());
    assert_eq!(records.len(), 4);
    assert_eq!(
        values(&records[0].1),
        vec![Some("test1"), Some("test2"), Some("test3")]
    );
    assert_eq!(values(&records[3].1), vec![Some("3")]);
}

#[test]
fn test_next_key_value() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_cells(
        &dir.path().join("kv.xlsx"),
        write_config(SpreadsheetFormat::Xlsx),
        None,
        &single_sheet(),
    );

    let split = FileSplit::for_file(&path).unwrap();
    let mut reader = ExcelRecordReader::new(&split, &read_config()).unwrap();
    let mut key = Text::default();
    let mut value: ArrayWritable<SpreadSheetCellDAO> = ArrayWritable::default();
    let mut rows = 0;
    while reader.next_key_value(&mut key, &mut value).unwrap() {
        rows += 1;
    }
    assert_eq!(rows, 4);
    assert_eq!(reader.rows_read(), 4);
    assert_eq!(key.as_str(), "[kv.xlsx]Sheet1!A4");
    assert_eq!(values(value.get()), vec![Some("3")]);
}

#[test]
fn test_input_and_output_formats() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    let mut conf = JobConf::new();
    conf.set(CONF_OUTPUT_DIR, out_dir.to_string_lossy())
        .set(CONF_TASK_ATTEMPT_ID, "attempt_201612032318_0001_r_000000_0")
        .set(CONF_WRITE_MIME_TYPE, SpreadsheetFormat::Xls.mime_type());

    let mut writer = ExcelFileOutputFormat::new()
        .get_record_writer(&conf, "part-r-00000")
        .unwrap();
    for cell in multi_sheet() {
        writer.write(&cell).unwrap();
    }
    let written = writer.close().unwrap();
    assert_eq!(
        written,
        out_dir
            .join("_temporary/0/_temporary/attempt_201612032318_0001_r_000000_0")
            .join("part-r-00000.xls")
    );

    let mut conf = JobConf::new();
    conf.set(CONF_INPUT_DIR, written.parent().unwrap().to_string_lossy())
        .set(CONF_READ_LOCALE, "de")
        .set(CONF_READ_SHEETS, "Sheet2");
    let format = ExcelFileInputFormat::new();
    let splits = format.get_splits(&conf, 4).unwrap();
    assert_eq!(splits.len(), 1);
    assert!(!format.is_splitable(&splits[0].path));

    let reader = format.get_record_reader(&splits[0], &conf).unwrap();
    let records: Vec<_> = reader.collect::<Result<_>>().unwrap();
    assert_eq!(
        keys(&records),
        vec!["[part-r-00000.xls]Sheet2!A1", "[part-r-00000.xls]Sheet2!A2"]
    );
}
