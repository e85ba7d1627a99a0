//! Write workbooks with `XlsxWriter` and read them back.

use std::io::Cursor;

use hadoopoffice_core::{
    Cell, CellComment, CellValue, ExternalLink, NumberFormat, Workbook, Worksheet,
};
use hadoopoffice_xlsx::{XlsxReader, XlsxStreamReader, XlsxWriteOptions, XlsxWriter};
use pretty_assertions::assert_eq;

fn sample_workbook() -> Workbook {
    let mut wb = Workbook::empty();
    let mut sheet = Worksheet::new("Sheet1");
    sheet.set_value("A1", "test1").unwrap();
    sheet.set_value("B1", "test2").unwrap();
    sheet.set_value("C1", "test3").unwrap();
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
        .set_value("A3", CellValue::formula_with_cached("A2*2", CellValue::Number(3.0)))
        .unwrap();
    sheet
        .set_comment("A1", CellComment::new("hadoopoffice", "This is a test"))
        .unwrap();
    wb.add_existing_worksheet(sheet).unwrap();
    wb.add_existing_worksheet(Worksheet::new("Empty")).unwrap();

    let props = wb.properties_mut();
    props.title = Some("Roundtrip".into());
    props.creator = Some("hadoopoffice".into());
    props.set_custom_property("mycustomproperty", "mycustomvalue");
    wb
}

#[test]
fn test_full_model_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roundtrip.xlsx");
    let wb = sample_workbook();
    XlsxWriter::write_file(&wb, &path).unwrap();

    let read = XlsxReader::read_file(&path).unwrap();
    assert_eq!(read.sheet_names(), vec!["Sheet1", "Empty"]);

    let sheet = read.worksheet(0).unwrap();
    assert_eq!(sheet.value_at(0, 1), &CellValue::text("test2"));
    assert_eq!(sheet.value_at(1, 0), &CellValue::Number(1.5));
    assert_eq!(sheet.value_at(1, 1), &CellValue::Boolean(true));
    assert_eq!(
        sheet.cell_at(1, 2).unwrap().number_format,
        NumberFormat::BuiltIn(14)
    );
    assert_eq!(
        sheet.value_at(2, 0),
        &CellValue::formula_with_cached("A2*2", CellValue::Number(3.0))
    );
    assert_eq!(
        sheet.comment_at(0, 0),
        Some(&CellComment::new("hadoopoffice", "This is a test"))
    );
    assert!(read.worksheet(1).unwrap().is_empty());

    assert_eq!(read.properties().title.as_deref(), Some("Roundtrip"));
    assert_eq!(read.properties().creator.as_deref(), Some("hadoopoffice"));
    assert_eq!(read.properties().custom.len(), 1);
    assert_eq!(read.properties().custom[0].value, "mycustomvalue");
}

#[test]
fn test_inline_strings_match_shared_strings() {
    let wb = sample_workbook();
    let shared = XlsxWriter::to_bytes(&wb, &XlsxWriteOptions::default()).unwrap();
    let inline = XlsxWriter::to_bytes(
        &wb,
        &XlsxWriteOptions {
            shared_strings: false,
        },
    )
    .unwrap();

    let a = XlsxReader::read(Cursor::new(shared)).unwrap();
    let b = XlsxReader::read(Cursor::new(inline)).unwrap();
    assert_eq!(a.worksheet(0), b.worksheet(0));
}

#[test]
fn test_stream_rows_fill_gaps() {
    let mut wb = Workbook::empty();
    let mut sheet = Worksheet::new("Sparse");
    sheet.set_value("A1", "first").unwrap();
    sheet.set_value("C4", "last").unwrap();
    sheet
        .set_comment("B6", CellComment::new("hadoopoffice", "note only"))
        .unwrap();
    wb.add_existing_worksheet(sheet).unwrap();
    wb.add_existing_worksheet(Worksheet::new("Empty")).unwrap();
    let bytes = XlsxWriter::to_bytes(&wb, &XlsxWriteOptions::default()).unwrap();

    let reader = XlsxStreamReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.sheet_names(), vec!["Sparse", "Empty"]);
    let rows: Vec<_> = reader.map(|r| r.unwrap()).collect();

    let shape: Vec<(usize, u32, usize)> = rows
        .iter()
        .map(|r| (r.sheet, r.row, r.cells.len()))
        .collect();
    assert_eq!(
        shape,
        vec![
            (0, 0, 1),
            (0, 1, 0),
            (0, 2, 0),
            (0, 3, 1),
            (0, 4, 0),
            (0, 5, 1),
            (1, 0, 0),
        ]
    );
    let (col, cell) = &rows[5].cells[0];
    assert_eq!(*col, 1);
    assert_eq!(cell.value, CellValue::Empty);
    assert_eq!(cell.comment.as_ref().map(|c| c.text.as_str()), Some("note only"));
}

#[test]
fn test_stream_select_sheets() {
    let bytes = XlsxWriter::to_bytes(&sample_workbook(), &XlsxWriteOptions::default()).unwrap();
    let mut reader = XlsxStreamReader::new(Cursor::new(bytes)).unwrap();
    reader.select_sheets(&[1]);
    let rows: Vec<_> = reader.map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sheet, 1);
    assert!(rows[0].cells.is_empty());
}

#[test]
fn test_linked_workbook_formulas() {
    let mut wb = Workbook::new();
    let mut link = ExternalLink::new("excel2013linkedwb1.xlsx");
    link.set_cached_value("Sheet1", 0, 0, CellValue::Number(6.0));
    wb.add_external_link(link);
    wb.worksheet_mut(0)
        .unwrap()
        .set_value(
            "A1",
            CellValue::formula_with_cached(
                "[excel2013linkedwb1.xlsx]Sheet1!A1*2",
                CellValue::Number(12.0),
            ),
        )
        .unwrap();
    let bytes = XlsxWriter::to_bytes(&wb, &XlsxWriteOptions::default()).unwrap();

    let read = XlsxReader::read(Cursor::new(bytes)).unwrap();
    assert_eq!(read.external_links().len(), 1);
    assert_eq!(read.external_links()[0].file_name, "excel2013linkedwb1.xlsx");
    assert_eq!(
        read.external_links()[0].cached_value("Sheet1", 0, 0),
        Some(&CellValue::Number(6.0))
    );
    assert_eq!(
        read.worksheet(0).unwrap().value_at(0, 0).formula_text(),
        Some("[excel2013linkedwb1.xlsx]Sheet1!A1*2")
    );
}

#[test]
fn test_date_1904_flag() {
    let mut wb = Workbook::new();
    wb.set_date_1904(true);
    wb.worksheet_mut(0).unwrap().set_value("A1", 1.0).unwrap();
    let bytes = XlsxWriter::to_bytes(&wb, &XlsxWriteOptions::default()).unwrap();
    assert!(XlsxReader::read(Cursor::new(bytes.clone())).unwrap().date_1904());
    assert!(XlsxStreamReader::new(Cursor::new(bytes)).unwrap().date_1904());
}
