//! Document properties (metadata)
//!
//! OOXML packages store metadata in `docProps/core.xml`, `docProps/app.xml`
//! and `docProps/custom.xml`; BIFF8 files store it in the
//! `\u{5}SummaryInformation` property set. Both map onto one
//! [`DocumentProperties`] value. Properties that exist in both worlds share
//! a field (OOXML `creator` is BIFF8 `author`, `modified` is
//! `lastsavedatetime`, and so on).
//!
//! Each format addresses the properties by its own lowercase field names,
//! see [`PropertySet::field_names`].

use chrono::NaiveDateTime;

use crate::error::{Error, Result};

/// Textual form of date properties in configuration values
pub const DATE_FORMAT: &str = "%H:%M:%S %d.%m.%Y";

/// The property vocabulary of a file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertySet {
    /// OOXML core, app and custom properties
    Ooxml,
    /// BIFF8 SummaryInformation
    Biff8,
}

impl PropertySet {
    /// Field names understood for this format, excluding `custom.*`
    pub fn field_names(&self) -> &'static [&'static str] {
        match self {
            PropertySet::Ooxml => &[
                "applicationname",
                "category",
                "contentstatus",
                "contenttype",
                "created",
                "creator",
                "description",
                "identifier",
                "keywords",
                "lastmodifiedbyuser",
                "lastprinted",
                "modified",
                "revision",
                "subject",
                "title",
            ],
            PropertySet::Biff8 => &[
                "applicationname",
                "author",
                "charcount",
                "comments",
                "createdatetime",
                "edittime",
                "keywords",
                "lastauthor",
                "lastprinted",
                "lastsavedatetime",
                "pagecount",
                "revnumber",
                "security",
                "subject",
                "template",
                "title",
                "wordcount",
            ],
        }
    }

    /// Whether this format supports `custom.<name>` properties
    pub fn supports_custom(&self) -> bool {
        matches!(self, PropertySet::Ooxml)
    }

    fn field(&self, name: &str) -> Option<Field> {
        let name = name.to_ascii_lowercase();
        if !self.field_names().contains(&name.as_str()) {
            return None;
        }
        Some(match name.as_str() {
            "applicationname" => Field::ApplicationName,
            "category" => Field::Category,
            "contentstatus" => Field::ContentStatus,
            "contenttype" => Field::ContentType,
            "created" | "createdatetime" => Field::Created,
            "creator" | "author" => Field::Creator,
            "description" | "comments" => Field::Description,
            "identifier" => Field::Identifier,
            "keywords" => Field::Keywords,
            "lastmodifiedbyuser" | "lastauthor" => Field::LastModifiedBy,
            "lastprinted" => Field::LastPrinted,
            "modified" | "lastsavedatetime" => Field::Modified,
            "revision" | "revnumber" => Field::Revision,
            "subject" => Field::Subject,
            "title" => Field::Title,
            "charcount" => Field::CharCount,
            "edittime" => Field::EditTime,
            "pagecount" => Field::PageCount,
            "security" => Field::Security,
            "template" => Field::Template,
            "wordcount" => Field::WordCount,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    ApplicationName,
    Category,
    ContentStatus,
    ContentType,
    Created,
    Creator,
    Description,
    Identifier,
    Keywords,
    LastModifiedBy,
    LastPrinted,
    Modified,
    Revision,
    Subject,
    Title,
    CharCount,
    EditTime,
    PageCount,
    Security,
    Template,
    WordCount,
}

/// A user-defined string property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomProperty {
    pub name: String,
    pub value: String,
}

/// Workbook metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentProperties {
    pub title: Option<String>,
    pub subject: Option<String>,
    /// OOXML `dc:creator`, BIFF8 author
    pub creator: Option<String>,
    pub keywords: Option<String>,
    /// OOXML `dc:description`, BIFF8 comments
    pub description: Option<String>,
    /// OOXML `cp:lastModifiedBy`, BIFF8 last author
    pub last_modified_by: Option<String>,
    /// OOXML `cp:revision`, BIFF8 revision number
    pub revision: Option<String>,
    pub category: Option<String>,
    pub content_status: Option<String>,
    pub content_type: Option<String>,
    pub identifier: Option<String>,
    pub application_name: Option<String>,
    pub template: Option<String>,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub last_printed: Option<NaiveDateTime>,
    /// Total editing time in 100ns units (BIFF8 only)
    pub edit_time: Option<i64>,
    pub char_count: Option<i32>,
    pub page_count: Option<i32>,
    pub word_count: Option<i32>,
    pub security: Option<i32>,
    pub custom: Vec<CustomProperty>,
}

impl DocumentProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a property by its field name in the given vocabulary.
    ///
    /// `custom.<name>` addresses custom properties. Dates are rendered as
    /// `HH:mm:ss dd.MM.yyyy`. Returns `None` if the field is unknown for the
    /// format or has no value.
    pub fn get(&self, set: PropertySet, name: &str) -> Option<String> {
        if let Some(custom) = custom_name(name) {
            if !set.supports_custom() {
                return None;
            }
            return self.custom_property(custom).map(str::to_string);
        }
        let text = |v: &Option<String>| v.clone();
        let date = |v: &Option<NaiveDateTime>| v.map(|d| d.format(DATE_FORMAT).to_string());
        let int = |v: &Option<i32>| v.map(|n| n.to_string());
        match set.field(name)? {
            Field::ApplicationName => text(&self.application_name),
            Field::Category => text(&self.category),
            Field::ContentStatus => text(&self.content_status),
            Field::ContentType => text(&self.content_type),
            Field::Created => date(&self.created),
            Field::Creator => text(&self.creator),
            Field::Description => text(&self.description),
            Field::Identifier => text(&self.identifier),
            Field::Keywords => text(&self.keywords),
            Field::LastModifiedBy => text(&self.last_modified_by),
            Field::LastPrinted => date(&self.last_printed),
            Field::Modified => date(&self.modified),
            Field::Revision => text(&self.revision),
            Field::Subject => text(&self.subject),
            Field::Title => text(&self.title),
            Field::Template => text(&self.template),
            Field::CharCount => int(&self.char_count),
            Field::PageCount => int(&self.page_count),
            Field::WordCount => int(&self.word_count),
            Field::Security => int(&self.security),
            Field::EditTime => self.edit_time.map(|n| n.to_string()),
        }
    }

    /// Whether `name` is a property this format knows about
    pub fn is_known(set: PropertySet, name: &str) -> bool {
        match custom_name(name) {
            Some(_) => set.supports_custom(),
            None => set.field(name).is_some(),
        }
    }

    /// Set a property from its textual configuration value.
    ///
    /// Returns `Ok(false)` if the field is unknown for the format.
    pub fn set(&mut self, set: PropertySet, name: &str, value: &str) -> Result<bool> {
        if let Some(custom) = custom_name(name) {
            if !set.supports_custom() {
                return Ok(false);
            }
            self.set_custom_property(custom, value);
            return Ok(true);
        }
        let Some(field) = set.field(name) else {
            return Ok(false);
        };
        let text = Some(value.to_string());
        match field {
            Field::ApplicationName => self.application_name = text,
            Field::Category => self.category = text,
            Field::ContentStatus => self.content_status = text,
            Field::ContentType => self.content_type = text,
            Field::Created => self.created = Some(parse_date(name, value)?),
            Field::Creator => self.creator = text,
            Field::Description => self.description = text,
            Field::Identifier => self.identifier = text,
            Field::Keywords => self.keywords = text,
            Field::LastModifiedBy => self.last_modified_by = text,
            Field::LastPrinted => self.last_printed = Some(parse_date(name, value)?),
            Field::Modified => self.modified = Some(parse_date(name, value)?),
            Field::Revision => self.revision = text,
            Field::Subject => self.subject = text,
            Field::Title => self.title = text,
            Field::Template => self.template = text,
            Field::CharCount => self.char_count = Some(parse_int(name, value)?),
            Field::PageCount => self.page_count = Some(parse_int(name, value)?),
            Field::WordCount => self.word_count = Some(parse_int(name, value)?),
            Field::Security => self.security = Some(parse_int(name, value)?),
            Field::EditTime => {
                self.edit_time = Some(value.trim().parse().map_err(|_| Error::InvalidProperty {
                    name: name.to_string(),
                    value: value.to_string(),
                })?)
            }
        }
        Ok(true)
    }

    /// Value of a custom property
    pub fn custom_property(&self, name: &str) -> Option<&str> {
        self.custom
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Add or replace a custom property
    pub fn set_custom_property(&mut self, name: &str, value: &str) {
        match self.custom.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value.to_string(),
            None => self.custom.push(CustomProperty {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

fn custom_name(name: &str) -> Option<&str> {
    name.strip_prefix("custom.")
}

/// Parse a date in `HH:mm:ss dd.MM.yyyy` form
pub fn parse_date(name: &str, value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| Error::InvalidProperty {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_int(name: &str, value: &str) -> Result<i32> {
    value.trim().parse().map_err(|_| Error::InvalidProperty {
        name: name.to_string(),
        value: value.to_string(),
    })
}
