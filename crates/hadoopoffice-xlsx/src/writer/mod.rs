//! XLSX writer

mod sheet;

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

use ahash::AHashMap;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{XlsxError, XlsxResult};
use crate::external::{external_link_rels_xml, external_link_xml};
use crate::package::{
    REL_COMMENTS, REL_CORE_PROPERTIES, REL_CUSTOM_PROPERTIES, REL_EXTENDED_PROPERTIES,
    REL_EXTERNAL_LINK, REL_OFFICE_DOCUMENT, REL_SHARED_STRINGS, REL_STYLES, REL_VML_DRAWING,
    REL_WORKSHEET,
};
use crate::props::{app_properties_xml, core_properties_xml, custom_properties_xml};
use crate::styles::XlsxStyleTable;
use crate::xml::{escape_text, escape_xml};
use hadoopoffice_core::Workbook;

use sheet::{comments_xml, vml_drawing_xml, worksheet_xml};

/// How cell text is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XlsxWriteOptions {
    /// Store text in the shared string table. When off, every text cell
    /// carries its string inline, which keeps the writer's memory flat.
    pub shared_strings: bool,
}

impl Default for XlsxWriteOptions {
    fn default() -> Self {
        Self {
            shared_strings: true,
        }
    }
}

/// Shared string table built while worksheets are written
#[derive(Debug, Default)]
pub(crate) struct SharedStrings {
    index: AHashMap<String, usize>,
    strings: Vec<String>,
    references: usize,
}

impl SharedStrings {
    pub(crate) fn intern(&mut self, s: &str) -> usize {
        self.references += 1;
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.strings.len();
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), idx);
        idx
    }

    fn to_xml(&self) -> String {
        let mut xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{}" uniqueCount="{}">"#,
            self.references,
            self.strings.len()
        );
        for s in &self.strings {
            xml.push_str(&format!(
                "\n  <si><t xml:space=\"preserve\">{}</t></si>",
                escape_text(s)
            ));
        }
        xml.push_str("\n</sst>");
        xml
    }
}

/// XLSX file writer
pub struct XlsxWriter;

impl XlsxWriter {
    /// Write a workbook to a file path
    pub fn write_file<P: AsRef<Path>>(workbook: &Workbook, path: P) -> XlsxResult<()> {
        let file = File::create(path)?;
        Self::write(workbook, BufWriter::new(file))
    }

    /// Write a workbook with the default options
    pub fn write<W: Write + Seek>(workbook: &Workbook, writer: W) -> XlsxResult<()> {
        Self::write_with_options(workbook, writer, &XlsxWriteOptions::default())
    }

    /// Serialize to an in-memory zip package
    pub fn to_bytes(workbook: &Workbook, options: &XlsxWriteOptions) -> XlsxResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        Self::write_with_options(workbook, &mut cursor, options)?;
        Ok(cursor.into_inner())
    }

    pub fn write_with_options<W: Write + Seek>(
        workbook: &Workbook,
        writer: W,
        options: &XlsxWriteOptions,
    ) -> XlsxResult<()> {
        if workbook.is_empty() {
            return Err(XlsxError::InvalidFormat("workbook has no sheets".into()));
        }
        let mut zip = ZipWriter::new(writer);
        let style_table = XlsxStyleTable::build(workbook);
        let mut shared = options.shared_strings.then(SharedStrings::default);

        let with_comments: Vec<bool> = workbook
            .worksheets()
            .map(|sheet| sheet.comments().next().is_some())
            .collect();
        let custom_props = custom_properties_xml(workbook.properties());

        put(&mut zip, "[Content_Types].xml", &content_types_xml(
            workbook,
            &with_comments,
            shared.is_some(),
            custom_props.is_some(),
        ))?;
        put(&mut zip, "_rels/.rels", &root_rels_xml(custom_props.is_some()))?;
        put(&mut zip, "docProps/core.xml", &core_properties_xml(workbook.properties()))?;
        put(&mut zip, "docProps/app.xml", &app_properties_xml(workbook.properties()))?;
        if let Some(xml) = &custom_props {
            put(&mut zip, "docProps/custom.xml", xml)?;
        }
        put(&mut zip, "xl/workbook.xml", &workbook_xml(workbook))?;
        put(
            &mut zip,
            "xl/_rels/workbook.xml.rels",
            &workbook_rels_xml(workbook, shared.is_some()),
        )?;
        put(&mut zip, "xl/styles.xml", &style_table.to_styles_xml())?;

        for (i, sheet) in workbook.worksheets().enumerate() {
            let n = i + 1;
            let xml = worksheet_xml(workbook, sheet, &style_table, shared.as_mut(), with_comments[i]);
            put(&mut zip, &format!("xl/worksheets/sheet{n}.xml"), &xml)?;
            if with_comments[i] {
                put(
                    &mut zip,
                    &format!("xl/worksheets/_rels/sheet{n}.xml.rels"),
                    &worksheet_rels_xml(n),
                )?;
                put(&mut zip, &format!("xl/comments{n}.xml"), &comments_xml(sheet))?;
                put(
                    &mut zip,
                    &format!("xl/drawings/vmlDrawing{n}.vml"),
                    &vml_drawing_xml(sheet),
                )?;
            }
            log::debug!("wrote sheet {} ({} cells)", sheet.name(), sheet.cell_count());
        }

        if let Some(shared) = &shared {
            put(&mut zip, "xl/sharedStrings.xml", &shared.to_xml())?;
        }

        for (i, link) in workbook.external_links().iter().enumerate() {
            let n = i + 1;
            put(
                &mut zip,
                &format!("xl/externalLinks/externalLink{n}.xml"),
                &external_link_xml(link),
            )?;
            put(
                &mut zip,
                &format!("xl/externalLinks/_rels/externalLink{n}.xml.rels"),
                &external_link_rels_xml(link),
            )?;
        }

        zip.finish()?;
        Ok(())
    }
}

fn put<W: Write + Seek>(zip: &mut ZipWriter<W>, path: &str, content: &str) -> XlsxResult<()> {
    zip.start_file(path, SimpleFileOptions::default())?;
    zip.write_all(content.as_bytes())?;
    Ok(())
}

fn content_types_xml(
    workbook: &Workbook,
    with_comments: &[bool],
    shared_strings: bool,
    custom_props: bool,
) -> String {
    let mut content = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
    <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
    <Default Extension="xml" ContentType="application/xml"/>
    <Default Extension="vml" ContentType="application/vnd.openxmlformats-officedocument.vmlDrawing"/>
    <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
    <Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
    <Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
    <Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>"#,
    );
    if custom_props {
        content.push_str(
            r#"
    <Override PartName="/docProps/custom.xml" ContentType="application/vnd.openxmlformats-officedocument.custom-properties+xml"/>"#,
        );
    }
    if shared_strings {
        content.push_str(
            r#"
    <Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#,
        );
    }
    for (i, has_comments) in with_comments.iter().enumerate() {
        content.push_str(&format!(
            r#"
    <Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            i + 1
        ));
        if *has_comments {
            content.push_str(&format!(
                r#"
    <Override PartName="/xl/comments{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.comments+xml"/>"#,
                i + 1
            ));
        }
    }
    for i in 0..workbook.external_links().len() {
        content.push_str(&format!(
            r#"
    <Override PartName="/xl/externalLinks/externalLink{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.externalLink+xml"/>"#,
            i + 1
        ));
    }
    content.push_str("\n</Types>");
    content
}

fn root_rels_xml(custom_props: bool) -> String {
    let mut content = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
    <Relationship Id="rId1" Type="{REL_OFFICE_DOCUMENT}" Target="xl/workbook.xml"/>
    <Relationship Id="rId2" Type="{REL_CORE_PROPERTIES}" Target="docProps/core.xml"/>
    <Relationship Id="rId3" Type="{REL_EXTENDED_PROPERTIES}" Target="docProps/app.xml"/>"#
    );
    if custom_props {
        content.push_str(&format!(
            r#"
    <Relationship Id="rId4" Type="{REL_CUSTOM_PROPERTIES}" Target="docProps/custom.xml"/>"#
        ));
    }
    content.push_str("\n</Relationships>");
    content
}

fn workbook_xml(workbook: &Workbook) -> String {
    let mut content = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
    );
    if workbook.date_1904() {
        content.push_str("\n    <workbookPr date1904=\"1\"/>");
    }
    content.push_str("\n    <sheets>");
    for (i, sheet) in workbook.worksheets().enumerate() {
        content.push_str(&format!(
            r#"
        <sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape_xml(sheet.name()),
            i + 1,
            i + 1
        ));
    }
    content.push_str("\n    </sheets>");

    let links = workbook.external_links().len();
    if links > 0 {
        // Link relationships follow the sheets, styles and shared strings
        let first = workbook.sheet_count() + 3;
        content.push_str("\n    <externalReferences>");
        for i in 0..links {
            content.push_str(&format!(
                "\n        <externalReference r:id=\"rId{}\"/>",
                first + i
            ));
        }
        content.push_str("\n    </externalReferences>");
    }
    content.push_str("\n</workbook>");
    content
}

fn workbook_rels_xml(workbook: &Workbook, shared_strings: bool) -> String {
    let mut content = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    let sheets = workbook.sheet_count();
    for i in 1..=sheets {
        content.push_str(&format!(
            r#"
    <Relationship Id="rId{i}" Type="{REL_WORKSHEET}" Target="worksheets/sheet{i}.xml"/>"#
        ));
    }
    content.push_str(&format!(
        r#"
    <Relationship Id="rId{}" Type="{REL_STYLES}" Target="styles.xml"/>"#,
        sheets + 1
    ));
    if shared_strings {
        content.push_str(&format!(
            r#"
    <Relationship Id="rId{}" Type="{REL_SHARED_STRINGS}" Target="sharedStrings.xml"/>"#,
            sheets + 2
        ));
    }
    for i in 0..workbook.external_links().len() {
        content.push_str(&format!(
            r#"
    <Relationship Id="rId{}" Type="{REL_EXTERNAL_LINK}" Target="externalLinks/externalLink{}.xml"/>"#,
            sheets + 3 + i,
            i + 1
        ));
    }
    content.push_str("\n</Relationships>");
    content
}

fn worksheet_rels_xml(n: usize) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
    <Relationship Id="rId1" Type="{REL_COMMENTS}" Target="../comments{n}.xml"/>
    <Relationship Id="rId2" Type="{REL_VML_DRAWING}" Target="../drawings/vmlDrawing{n}.vml"/>
</Relationships>"#
    )
}
