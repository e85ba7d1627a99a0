//! Write workbooks with `XlsWriter` and read them back.

use std::io::Cursor;

use hadoopoffice_core::{
    Cell, CellComment, CellError, CellValue, ExternalLink, NumberFormat, Workbook, Worksheet,
};
use hadoopoffice_xls::{XlsError, XlsReader, XlsStreamReader, XlsWriteOptions, XlsWriter};
use pretty_assertions::assert_eq;

fn sample_workbook() -> Workbook {
    let mut wb = Workbook::empty();
    let mut sheet = Worksheet::new("Sheet1");
    sheet.set_value("A1", "test1").unwrap();
    sheet.set_value("B1", "test2").unwrap();
    sheet.set_value("C1", "Österreich ☃").unwrap();
    sheet.set_value("A2", 1.5).unwrap();
    sheet.set_value("B2", true).unwrap();
    sheet
        .set_cell_at(
            1,
            2,
            Cell::with_format(CellValue::Number(43831.0), NumberFormat::BuiltIn(14)),
        )
        .unwrap();
    sheet
        .set_cell_at(
            1,
            3,
            Cell::with_format(CellValue::Number(0.25), NumberFormat::Custom("0.000%".into())),
        )
        .unwrap();
    sheet.set_value("E2", CellError::Na).unwrap();
    sheet
        .set_value("A3", CellValue::formula_with_cached("A2*2", CellValue::Number(3.0)))
        .unwrap();
    sheet
        .set_value("B3", CellValue::formula_with_cached("SUM(A2:B2)", CellValue::Number(2.5)))
        .unwrap();
    sheet
        .set_value(
            "C3",
            CellValue::formula_with_cached("Sheet2!A1&\"x\"", CellValue::text("yx")),
        )
        .unwrap();
    sheet.set_value("A5", "after a gap").unwrap();
    wb.add_existing_worksheet(sheet).unwrap();

    let mut second = Worksheet::new("Sheet2");
    second.set_value("A1", "y").unwrap();
    wb.add_existing_worksheet(second).unwrap();
    wb.add_existing_worksheet(Worksheet::new("Empty")).unwrap();

    let props = wb.properties_mut();
    props.title = Some("Roundtrip".into());
    props.creator = Some("hadoopoffice".into());
    wb
}

#[test]
fn test_full_model_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roundtrip.xls");
    XlsWriter::write_file(&sample_workbook(), &path).unwrap();

    let read = XlsReader::read_file(&path, None).unwrap();
    assert_eq!(read.sheet_names(), vec!["Sheet1", "Sheet2", "Empty"]);

    let sheet = read.worksheet(0).unwrap();
    assert_eq!(sheet.value_at(0, 0), &CellValue::text("test1"));
    assert_eq!(sheet.value_at(0, 2), &CellValue::text("Österreich ☃"));
    assert_eq!(sheet.value_at(1, 0), &CellValue::Number(1.5));
    assert_eq!(sheet.value_at(1, 1), &CellValue::Boolean(true));
    assert_eq!(sheet.cell_at(1, 2).unwrap().number_format, NumberFormat::BuiltIn(14));
    assert_eq!(
        sheet.cell_at(1, 3).unwrap().number_format,
        NumberFormat::Custom("0.000%".into())
    );
    assert_eq!(sheet.value_at(1, 4), &CellValue::Error(CellError::Na));
    assert_eq!(
        sheet.value_at(2, 0),
        &CellValue::formula_with_cached("A2*2", CellValue::Number(3.0))
    );
    assert_eq!(
        sheet.value_at(2, 1),
        &CellValue::formula_with_cached("SUM(A2:B2)", CellValue::Number(2.5))
    );
    assert_eq!(
        sheet.value_at(2, 2),
        &CellValue::formula_with_cached("Sheet2!A1&\"x\"", CellValue::text("yx"))
    );
    assert_eq!(sheet.value_at(4, 0), &CellValue::text("after a gap"));
    assert!(read.worksheet(2).unwrap().is_empty());

    assert_eq!(read.properties().title.as_deref(), Some("Roundtrip"));
    assert_eq!(read.properties().creator.as_deref(), Some("hadoopoffice"));
}

#[test]
fn test_comments_are_dropped() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();
    sheet.set_value("A1", 1.0).unwrap();
    sheet
        .set_comment("A1", CellComment::new("hadoopoffice", "This is a test"))
        .unwrap();

    let bytes = XlsWriter::to_bytes(&wb, &XlsWriteOptions::default()).unwrap();
    let read = XlsReader::read(Cursor::new(bytes), None).unwrap();
    let sheet = read.worksheet(0).unwrap();
    assert_eq!(sheet.value_at(0, 0), &CellValue::Number(1.0));
    assert_eq!(sheet.comment_at(0, 0), None);
}

#[test]
fn test_date_1904_roundtrip() {
    let mut wb = Workbook::new();
    wb.set_date_1904(true);
    wb.worksheet_mut(0).unwrap().set_value("A1", 1.0).unwrap();
    let bytes = XlsWriter::to_bytes(&wb, &XlsWriteOptions::default()).unwrap();
    assert!(XlsReader::read(Cursor::new(bytes), None).unwrap().date_1904());
}

#[test]
fn test_large_shared_string_table() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();
    for row in 0..3000u32 {
        sheet
            .set_value_at(row, 0, format!("string number {row} with some padding"))
            .unwrap();
    }
    let bytes = XlsWriter::to_bytes(&wb, &XlsWriteOptions::default()).unwrap();
    let read = XlsReader::read(Cursor::new(bytes), None).unwrap();
    let sheet = read.worksheet(0).unwrap();
    assert_eq!(sheet.cell_count(), 3000);
    assert_eq!(
        sheet.value_at(2999, 0),
        &CellValue::text("string number 2999 with some padding")
    );
}

#[test]
fn test_encrypted_roundtrip() {
    let options = XlsWriteOptions {
        password: Some("test".into()),
    };
    let bytes = XlsWriter::to_bytes(&sample_workbook(), &options).unwrap();

    let read = XlsReader::read(Cursor::new(bytes.clone()), Some("test")).unwrap();
    assert_eq!(read.worksheet(0).unwrap().value_at(0, 1), &CellValue::text("test2"));

    let err = XlsReader::read(Cursor::new(bytes.clone()), None).unwrap_err();
    assert!(matches!(err, XlsError::PasswordRequired));
    let err = XlsReader::read(Cursor::new(bytes), Some("wrong")).unwrap_err();
    assert!(matches!(err, XlsError::WrongPassword));
}

#[test]
fn test_linked_workbook_formulas() {
    let mut wb = Workbook::new();
    let mut link = ExternalLink::new("excel2003linkedwb1.xls");
    link.set_cached_value("Sheet1", 0, 0, CellValue::Number(6.0));
    wb.add_external_link(link);
    wb.worksheet_mut(0)
        .unwrap()
        .set_value(
            "A1",
            CellValue::formula_with_cached(
                "[excel2003linkedwb1.xls]Sheet1!A1*2",
                CellValue::Number(12.0),
            ),
        )
        .unwrap();

    let bytes = XlsWriter::to_bytes(&wb, &XlsWriteOptions::default()).unwrap();
    let read = XlsReader::read(Cursor::new(bytes), None).unwrap();
    assert_eq!(
        read.worksheet(0).unwrap().value_at(0, 0),
        &CellValue::formula_with_cached(
            "[excel2003linkedwb1.xls]Sheet1!A1*2",
            CellValue::Number(12.0)
        )
    );
    assert_eq!(read.external_links().len(), 1);
    assert_eq!(read.external_links()[0].file_name, "excel2003linkedwb1.xls");
    assert_eq!(
        read.external_links()[0].cached_value("Sheet1", 0, 0),
        Some(&CellValue::Number(6.0))
    );
}

#[test]
fn test_stream_reader_fills_gaps() {
    let bytes = XlsWriter::to_bytes(&sample_workbook(), &XlsWriteOptions::default()).unwrap();
    let mut reader = XlsStreamReader::new(Cursor::new(bytes), None).unwrap();
    assert_eq!(reader.sheet_names(), vec!["Sheet1", "Sheet2", "Empty"]);
    assert_eq!(reader.properties().title.as_deref(), Some("Roundtrip"));

    let rows: Vec<_> = reader.by_ref().map(|r| r.unwrap()).collect();
    let keys: Vec<(usize, u32, usize)> = rows
        .iter()
        .map(|r| (r.sheet, r.row, r.cells.len()))
        .collect();
    assert_eq!(
        keys,
        vec![
            (0, 0, 3),
            (0, 1, 5),
            (0, 2, 3),
            (0, 3, 0),
            (0, 4, 1),
            (1, 0, 1),
            (2, 0, 0),
        ]
    );
    assert_eq!(rows[4].cells[0].1.value, CellValue::text("after a gap"));
}

#[test]
fn test_stream_reader_selected_sheets() {
    let bytes = XlsWriter::to_bytes(&sample_workbook(), &XlsWriteOptions::default()).unwrap();
    let mut reader = XlsStreamReader::new(Cursor::new(bytes), None).unwrap();
    reader.select_sheets(&[1]);
    let rows: Vec<_> = reader.map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sheet, 1);
    assert_eq!(rows[0].cells[0].1.value, CellValue::text("y"));
}

#[test]
fn test_not_an_xls_file() {
    let err = XlsReader::read(Cursor::new(b"plain text".to_vec()), None).unwrap_err();
    assert!(matches!(err, XlsError::InvalidFormat(_)));
}
