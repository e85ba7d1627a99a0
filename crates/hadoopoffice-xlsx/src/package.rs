//! Package structure: relationships, workbook.xml, shared strings, comments

use std::io::{BufRead, Read, Seek};

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use zip::ZipArchive;

use crate::error::{XlsxError, XlsxResult};
use crate::xml::{
    attr, decode_excel_escapes, is_true, open_part, part_dir, qualified_attr, rels_path,
    resolve_target,
};
use hadoopoffice_core::{CellAddress, CellComment};

pub(crate) const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub(crate) const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
pub(crate) const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub(crate) const REL_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
pub(crate) const REL_COMMENTS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
pub(crate) const REL_VML_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/vmlDrawing";
pub(crate) const REL_EXTERNAL_LINK: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/externalLink";
pub(crate) const REL_EXTERNAL_LINK_PATH: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/externalLinkPath";
pub(crate) const REL_CORE_PROPERTIES: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
pub(crate) const REL_EXTENDED_PROPERTIES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties";
pub(crate) const REL_CUSTOM_PROPERTIES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/custom-properties";

/// One `<Relationship>` of a `.rels` part
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    /// Package path for internal targets, the raw target for external ones
    pub target: String,
    pub external: bool,
}

/// A worksheet as listed in workbook.xml
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SheetEntry {
    pub name: String,
    pub path: String,
    pub comments: Option<String>,
}

/// Where the parts of a workbook live
#[derive(Debug, Clone, Default)]
pub(crate) struct PackageInfo {
    pub workbook_path: String,
    pub sheets: Vec<SheetEntry>,
    pub date_1904: bool,
    pub shared_strings: Option<String>,
    pub styles: Option<String>,
    /// External link parts in formula index order (`[1]` is the first)
    pub external_links: Vec<String>,
    pub core_properties: Option<String>,
    pub app_properties: Option<String>,
    pub custom_properties: Option<String>,
}

/// Relationships of `part`; a missing `.rels` part means none
pub(crate) fn read_relationships<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    part: &str,
) -> XlsxResult<Vec<Relationship>> {
    let Some(mut xml_reader) = open_part(archive, &rels_path(part))? else {
        return Ok(Vec::new());
    };
    xml_reader.trim_text(true);

    let base_dir = part_dir(part).to_string();
    let mut buf = Vec::new();
    let mut rels = Vec::new();
    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(rel_type), Some(target)) =
                    (attr(&e, b"Id"), attr(&e, b"Type"), attr(&e, b"Target"))
                {
                    let external = attr(&e, b"TargetMode").as_deref() == Some("External");
                    let target = if external {
                        target
                    } else {
                        resolve_target(&base_dir, &target)
                    };
                    rels.push(Relationship {
                        id,
                        rel_type,
                        target,
                        external,
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

fn target_of<'r>(rels: &'r [Relationship], rel_type: &str) -> Option<&'r Relationship> {
    rels.iter().find(|r| r.rel_type == rel_type)
}

/// Locate workbook, worksheets and the auxiliary parts of the package
pub(crate) fn read_package<R: Read + Seek>(archive: &mut ZipArchive<R>) -> XlsxResult<PackageInfo> {
    let root = read_relationships(archive, "")?;
    let workbook_path = target_of(&root, REL_OFFICE_DOCUMENT)
        .map(|r| r.target.clone())
        .unwrap_or_else(|| "xl/workbook.xml".to_string());

    let mut info = PackageInfo {
        core_properties: target_of(&root, REL_CORE_PROPERTIES).map(|r| r.target.clone()),
        app_properties: target_of(&root, REL_EXTENDED_PROPERTIES).map(|r| r.target.clone()),
        custom_properties: target_of(&root, REL_CUSTOM_PROPERTIES).map(|r| r.target.clone()),
        ..Default::default()
    };

    let workbook_rels = read_relationships(archive, &workbook_path)?;
    info.shared_strings = target_of(&workbook_rels, REL_SHARED_STRINGS).map(|r| r.target.clone());
    info.styles = target_of(&workbook_rels, REL_STYLES).map(|r| r.target.clone());

    let mut xml_reader = open_part(archive, &workbook_path)?
        .ok_or_else(|| XlsxError::MissingPart(workbook_path.clone()))?;
    xml_reader.trim_text(true);

    let mut sheet_ids: Vec<(String, String)> = Vec::new();
    let mut link_ids: Vec<String> = Vec::new();
    let mut buf = Vec::new();
    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"workbookPr" => info.date_1904 = is_true(attr(&e, b"date1904").as_deref()),
                b"sheet" => {
                    if let (Some(name), Some(id)) = (attr(&e, b"name"), qualified_attr(&e, b"r:id")) {
                        sheet_ids.push((name, id));
                    }
                }
                b"externalReference" => {
                    if let Some(id) = qualified_attr(&e, b"r:id") {
                        link_ids.push(id);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }
    drop(xml_reader);

    for (name, id) in sheet_ids {
        let Some(rel) = workbook_rels.iter().find(|r| r.id == id && r.rel_type == REL_WORKSHEET) else {
            log::warn!("sheet {} has no worksheet part, skipping", name);
            continue;
        };
        let path = rel.target.clone();
        let comments = target_of(&read_relationships(archive, &path)?, REL_COMMENTS)
            .map(|r| r.target.clone());
        info.sheets.push(SheetEntry {
            name,
            path,
            comments,
        });
    }
    for id in link_ids {
        match workbook_rels.iter().find(|r| r.id == id) {
            Some(rel) => info.external_links.push(rel.target.clone()),
            None => log::warn!("external reference {} has no part", id),
        }
    }

    info.workbook_path = workbook_path;
    log::debug!(
        "package: {} sheets, {} external links, date1904={}",
        info.sheets.len(),
        info.external_links.len(),
        info.date_1904
    );
    Ok(info)
}

/// The shared string table. Rich text runs are concatenated.
pub(crate) fn read_shared_strings<B: BufRead>(mut xml_reader: Reader<B>) -> XlsxResult<Vec<String>> {
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_t = false;
    // Phonetic runs repeat the text and are skipped
    let mut in_phonetic = false;

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"rPh" => in_phonetic = true,
                b"t" if in_si && !in_phonetic => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => {
                    strings.push(decode_excel_escapes(&current));
                    in_si = false;
                }
                b"rPh" => in_phonetic = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_t => current.push_str(&e.unescape()?),
            Ok(Event::CData(e)) if in_t => current.push_str(&String::from_utf8_lossy(&e)),
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }
    log::debug!("shared strings: {}", strings.len());
    Ok(strings)
}

/// Comments of one worksheet with their authors
pub(crate) fn read_comments<B: BufRead>(
    mut xml_reader: Reader<B>,
) -> XlsxResult<Vec<(CellAddress, CellComment)>> {
    let mut buf = Vec::new();
    let mut authors: Vec<String> = Vec::new();
    let mut comments = Vec::new();

    let mut in_author = false;
    let mut in_t = false;
    let mut current: Option<(CellAddress, usize)> = None;
    let mut text = String::new();

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"author" => {
                    in_author = true;
                    authors.push(String::new());
                }
                b"comment" => {
                    text.clear();
                    let author_id = attr(&e, b"authorId").and_then(|v| v.parse().ok()).unwrap_or(0);
                    current = attr(&e, b"ref")
                        .and_then(|r| CellAddress::parse(&r).ok())
                        .map(|addr| (addr, author_id));
                }
                b"t" if current.is_some() => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"author" => authors.push(String::new()),
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"author" => in_author = false,
                b"t" => in_t = false,
                b"comment" => {
                    if let Some((addr, author_id)) = current.take() {
                        let author = authors.get(author_id).cloned().unwrap_or_default();
                        comments.push((addr, CellComment::new(author, decode_excel_escapes(&text))));
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_author {
                    if let Some(last) = authors.last_mut() {
                        last.push_str(&e.unescape()?);
                    }
                } else if in_t {
                    text.push_str(&e.unescape()?);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(comments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_shared_strings_with_rich_text() {
        let xml = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3">
            <si><t>plain</t></si>
            <si><r><t>rich </t></r><r><rPr><b/></rPr><t>text</t></r><rPh><t>ignored</t></rPh></si>
            <si><t xml:space="preserve"> a_x000D_b </t></si>
        </sst>"#;
        let strings = read_shared_strings(Reader::from_reader(xml.as_bytes())).unwrap();
        assert_eq!(strings, vec!["plain", "rich text", " a\rb "]);
    }

    #[test]
    fn test_read_comments() {
        let xml = r#"<comments xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
            <authors><author>hadoopoffice</author><author>other</author></authors>
            <commentList>
              <comment ref="B2" authorId="1"><text><r><t>first</t></r><r><t> part</t></r></text></comment>
              <comment ref="A1" authorId="0"><text><t>This is a test</t></text></comment>
            </commentList>
        </comments>"#;
        let comments = read_comments(Reader::from_reader(xml.as_bytes())).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].0, CellAddress::new(1, 1));
        assert_eq!(comments[0].1, CellComment::new("other", "first part"));
        assert_eq!(comments[1].1.to_string(), "[hadoopoffice]: This is a test");
    }
}
