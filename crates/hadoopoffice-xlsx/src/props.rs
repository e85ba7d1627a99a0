//! Document properties: docProps/core.xml, app.xml and custom.xml

use std::io::BufRead;

use chrono::{DateTime, NaiveDateTime};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{XlsxError, XlsxResult};
use crate::xml::{attr, escape_xml};
use hadoopoffice_core::DocumentProperties;

const W3CDTF: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format id of custom string properties
const CUSTOM_FMTID: &str = "{D5CDD505-2E9C-101B-9397-08002B2CF9AE}";

fn parse_w3cdtf(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S").ok())
}

fn date_property(text: &str) -> Option<NaiveDateTime> {
    let parsed = parse_w3cdtf(text);
    if parsed.is_none() {
        log::warn!("ignoring unparsable date property {:?}", text);
    }
    parsed
}

/// Collect the text of each leaf element, keyed by local name
fn read_leaf_texts<B: BufRead>(
    mut xml_reader: Reader<B>,
    mut on_text: impl FnMut(&[u8], String),
) -> XlsxResult<()> {
    xml_reader.trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<Vec<u8>> = None;
    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => current = Some(e.local_name().as_ref().to_vec()),
            Ok(Event::Text(e)) => {
                if let Some(name) = &current {
                    on_text(name, e.unescape()?.into_owned());
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

pub(crate) fn read_core_properties<B: BufRead>(
    xml_reader: Reader<B>,
    props: &mut DocumentProperties,
) -> XlsxResult<()> {
    read_leaf_texts(xml_reader, |name, text| {
        match name {
            b"title" => props.title = Some(text),
            b"subject" => props.subject = Some(text),
            b"creator" => props.creator = Some(text),
            b"keywords" => props.keywords = Some(text),
            b"description" => props.description = Some(text),
            b"lastModifiedBy" => props.last_modified_by = Some(text),
            b"revision" => props.revision = Some(text),
            b"category" => props.category = Some(text),
            b"contentStatus" => props.content_status = Some(text),
            b"contentType" => props.content_type = Some(text),
            b"identifier" => props.identifier = Some(text),
            b"created" => props.created = date_property(&text),
            b"modified" => props.modified = date_property(&text),
            b"lastPrinted" => props.last_printed = date_property(&text),
            _ => {}
        }
    })
}

pub(crate) fn read_app_properties<B: BufRead>(
    xml_reader: Reader<B>,
    props: &mut DocumentProperties,
) -> XlsxResult<()> {
    read_leaf_texts(xml_reader, |name, text| match name {
        b"Application" => props.application_name = Some(text),
        b"Template" => props.template = Some(text),
        _ => {}
    })
}

pub(crate) fn read_custom_properties<B: BufRead>(
    mut xml_reader: Reader<B>,
    props: &mut DocumentProperties,
) -> XlsxResult<()> {
    xml_reader.trim_text(true);
    let mut buf = Vec::new();
    let mut name: Option<String> = None;
    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"property" => name = attr(&e, b"name"),
            Ok(Event::Text(e)) => {
                if let Some(name) = &name {
                    props.set_custom_property(name, &e.unescape()?);
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"property" => name = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

pub(crate) fn core_properties_xml(props: &DocumentProperties) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
    );
    let texts = [
        ("dc:title", &props.title),
        ("dc:subject", &props.subject),
        ("dc:creator", &props.creator),
        ("cp:keywords", &props.keywords),
        ("dc:description", &props.description),
        ("cp:lastModifiedBy", &props.last_modified_by),
        ("cp:revision", &props.revision),
        ("cp:category", &props.category),
        ("cp:contentStatus", &props.content_status),
        ("cp:contentType", &props.content_type),
        ("dc:identifier", &props.identifier),
    ];
    for (tag, value) in texts {
        if let Some(value) = value {
            xml.push_str(&format!("\n  <{tag}>{}</{tag}>", escape_xml(value)));
        }
    }
    if let Some(printed) = &props.last_printed {
        xml.push_str(&format!("\n  <cp:lastPrinted>{}</cp:lastPrinted>", printed.format(W3CDTF)));
    }
    for (tag, value) in [("created", &props.created), ("modified", &props.modified)] {
        if let Some(value) = value {
            xml.push_str(&format!(
                "\n  <dcterms:{tag} xsi:type=\"dcterms:W3CDTF\">{}</dcterms:{tag}>",
                value.format(W3CDTF)
            ));
        }
    }
    xml.push_str("\n</cp:coreProperties>");
    xml
}

pub(crate) fn app_properties_xml(props: &DocumentProperties) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">"#,
    );
    let application = props.application_name.as_deref().unwrap_or("hadoopoffice");
    xml.push_str(&format!("\n  <Application>{}</Application>", escape_xml(application)));
    if let Some(template) = &props.template {
        xml.push_str(&format!("\n  <Template>{}</Template>", escape_xml(template)));
    }
    xml.push_str("\n</Properties>");
    xml
}

/// custom.xml, or `None` when there are no custom properties
pub(crate) fn custom_properties_xml(props: &DocumentProperties) -> Option<String> {
    if props.custom.is_empty() {
        return None;
    }
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/custom-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">"#,
    );
    // pids start at 2
    for (i, property) in props.custom.iter().enumerate() {
        xml.push_str(&format!(
            "\n  <property fmtid=\"{CUSTOM_FMTID}\" pid=\"{}\" name=\"{}\"><vt:lpwstr>{}</vt:lpwstr></property>",
            i + 2,
            escape_xml(&property.name),
            escape_xml(&property.value)
        ));
    }
    xml.push_str("\n</Properties>");
    Some(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadoopoffice_core::properties::PropertySet;

    #[test]
    fn test_core_properties_roundtrip() {
        let mut props = DocumentProperties::new();
        props.set(PropertySet::Ooxml, "creator", "dummycreator").unwrap();
        props.set(PropertySet::Ooxml, "title", "a <title>").unwrap();
        props.set(PropertySet::Ooxml, "created", "12:00:00 01.01.2016").unwrap();
        props.set(PropertySet::Ooxml, "contentstatus", "dummycontentstatus").unwrap();

        let xml = core_properties_xml(&props);
        let mut read = DocumentProperties::new();
        read_core_properties(Reader::from_reader(xml.as_bytes()), &mut read).unwrap();
        assert_eq!(read.creator.as_deref(), Some("dummycreator"));
        assert_eq!(read.title.as_deref(), Some("a <title>"));
        assert_eq!(read.content_status.as_deref(), Some("dummycontentstatus"));
        assert_eq!(
            read.get(PropertySet::Ooxml, "created").as_deref(),
            Some("12:00:00 01.01.2016")
        );
    }

    #[test]
    fn test_custom_properties_roundtrip() {
        let mut props = DocumentProperties::new();
        assert!(custom_properties_xml(&props).is_none());
        props.set_custom_property("mycustomproperty1", "dummymycustomproperty1");
        props.set_custom_property("mycustomproperty2", "dummymycustomproperty2");

        let xml = custom_properties_xml(&props).unwrap();
        let mut read = DocumentProperties::new();
        read_custom_properties(Reader::from_reader(xml.as_bytes()), &mut read).unwrap();
        assert_eq!(read.custom, props.custom);
    }

    #[test]
    fn test_parse_w3cdtf() {
        let expected = NaiveDateTime::parse_from_str("2016-01-01 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(parse_w3cdtf("2016-01-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_w3cdtf("2016-01-01T13:00:00+01:00"), Some(expected));
        assert_eq!(parse_w3cdtf("yesterday"), None);
    }
}
