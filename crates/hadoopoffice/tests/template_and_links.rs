//! Output based on a template workbook, and formulas into linked workbooks

mod common;

use std::fs;
use std::path::{Path, PathBuf};

use common::*;
use hadoopoffice::prelude::*;
use pretty_assertions::assert_eq;

fn template(dir: &Path, format: SpreadsheetFormat, password: Option<&str>) -> PathBuf {
    let mut config = write_config(format);
    config.password = password.map(str::to_string);
    write_cells(
        &dir.join(format!("template.{}", format.extension())),
        config,
        None,
        &[
            dao("", "2", "A1", "Sheet1"),
            dao("", "3", "B1", "Sheet1"),
            dao("", "A1*B1", "C1", "Sheet1"),
            dao("keep", "", "A2", "Sheet1"),
        ],
    )
}

fn check_template(format: SpreadsheetFormat, password: Option<&str>) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_config(format);
    config.template_file = Some(template(dir.path(), format, password));
    config.template_password = password.map(str::to_string);

    let path = write_cells(
        &dir.path().join(format!("filled.{}", format.extension())),
        config,
        None,
        &[
            dao("", "5", "A1", "Sheet1"),
            dao("new", "", "B3", "Sheet1"),
            dao("other", "", "A1", "Sheet2"),
        ],
    );

    let records = read_records(&path, &read_config());
    assert_eq!(
        keys(&records)
            .iter()
            .map(|k| k.split(']').nth(1).unwrap())
            .collect::<Vec<_>>(),
        vec!["Sheet1!A1", "Sheet1!A2", "Sheet1!A3", "Sheet2!A1"]
    );
    assert_eq!(values(&records[0].1), vec![Some("5"), Some("3"), Some("15")]);
    assert_eq!(values(&records[1].1), vec![Some("keep")]);
    assert_eq!(values(&records[2].1), vec![None, Some("new")]);
    assert_eq!(values(&records[3].1), vec![Some("other")]);
}

#[test]
fn test_template_xlsx() {
    check_template(SpreadsheetFormat::Xlsx, None);
}

#[test]
fn test_template_xls() {
    check_template(SpreadsheetFormat::Xls, None);
}

#[test]
fn test_encrypted_template() {
    check_template(SpreadsheetFormat::Xlsx, Some("template"));
    check_template(SpreadsheetFormat::Xls, Some("template"));
}

#[test]
fn test_template_wrong_password() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_config(SpreadsheetFormat::Xlsx);
    config.template_file = Some(template(
        dir.path(),
        SpreadsheetFormat::Xlsx,
        Some("template"),
    ));
    config.template_password = Some("wrong".into());
    assert!(matches!(
        ExcelRecordWriter::new(dir.path().join("out.xlsx"), config, None),
        Err(Error::Template(_))
    ));
}

fn linked(
    dir: &Path,
    name: &str,
    format: SpreadsheetFormat,
    cells: &[SpreadSheetCellDAO],
) -> PathBuf {
    write_cells(
        &dir.join(format!("{name}.{}", format.extension())),
        write_config(format),
        None,
        cells,
    )
}

fn check_one_link(format: SpreadsheetFormat) {
    let dir = tempfile::tempdir().unwrap();
    let ext = format.extension();
    let link = linked(
        dir.path(),
        "linked",
        format,
        &[dao("", "10", "A1", "Sheet1"), dao("test2", "", "B1", "Sheet1")],
    );

    let mut config = write_config(format);
    config.linked_workbooks = vec![link.clone()];
    let path = write_cells(
        &dir.path().join(format!("main.{ext}")),
        config,
        None,
        &[
            dao("", &format!("[linked.{ext}]Sheet1!A1*2"), "A1", "Sheet1"),
            dao("", &format!("[linked.{ext}]Sheet1!B1"), "B1", "Sheet1"),
        ],
    );

    // the linked file changes after main was written
    linked(
        dir.path(),
        "linked",
        format,
        &[dao("", "100", "A1", "Sheet1"), dao("test2", "", "B1", "Sheet1")],
    );

    let cached_values = vec![Some("20"), Some("test2")];
    let cached = read_records(&path, &read_config());
    assert_eq!(values(&cached[0].1), cached_values);

    let mut config = read_config();
    config.read_linked_workbooks = true;
    let recalculated = read_records(&path, &config);
    assert_eq!(values(&recalculated[0].1), vec![Some("200"), Some("test2")]);

    // streaming reads do not recalculate
    config.low_footprint = true;
    assert_eq!(values(&read_records(&path, &config)[0].1), cached_values);
    config.low_footprint = false;

    fs::remove_file(&link).unwrap();
    assert!(matches!(
        try_read(&path, &config),
        Err(Error::LinkedWorkbook(_))
    ));
    config.ignore_missing_linked_workbooks = true;
    assert_eq!(values(&read_records(&path, &config)[0].1), cached_values);
}

fn check_two_links(format: SpreadsheetFormat) {
    let dir = tempfile::tempdir().unwrap();
    let ext = format.extension();
    let first = linked(dir.path(), "linked1", format, &[dao("", "10", "A1", "Sheet1")]);
    let second = linked(dir.path(), "linked2", format, &[dao("", "5", "B2", "Data")]);

    let mut config = write_config(format);
    config.linked_workbooks = vec![first, second];
    let path = write_cells(
        &dir.path().join(format!("main.{ext}")),
        config,
        None,
        &[dao(
            "",
            &format!("[linked1.{ext}]Sheet1!A1+[linked2.{ext}]Data!B2"),
            "A1",
            "Sheet1",
        )],
    );

    linked(dir.path(), "linked1", format, &[dao("", "100", "A1", "Sheet1")]);
    linked(dir.path(), "linked2", format, &[dao("", "50", "B2", "Data")]);

    for (read_linked, expected) in [(false, "15"), (true, "150")] {
        let mut config = read_config();
        config.read_linked_workbooks = read_linked;
        let records = read_records(&path, &config);
        assert_eq!(values(&records[0].1), vec![Some(expected)]);
    }
}

#[test]
fn test_one_linked_workbook_xlsx() {
    check_one_link(SpreadsheetFormat::Xlsx);
}

#[test]
fn test_one_linked_workbook_xls() {
    check_one_link(SpreadsheetFormat::Xls);
}

#[test]
fn test_two_linked_workbooks_xlsx() {
    check_two_links(SpreadsheetFormat::Xlsx);
}

#[test]
fn test_two_linked_workbooks_xls() {
    check_two_links(SpreadsheetFormat::Xls);
}

#[test]
fn test_missing_linked_workbook_on_write() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_config(SpreadsheetFormat::Xlsx);
    config.linked_workbooks = vec![dir.path().join("absent.xlsx")];
    let mut writer = ExcelRecordWriter::new(dir.path().join("main.xlsx"), config, None).unwrap();
    writer
        .write(&dao("", "[absent.xlsx]Sheet1!A1", "A1", "Sheet1"))
        .unwrap();
    assert!(writer.close().is_err());
    assert!(!dir.path().join("main.xlsx").exists());
}
