//! Document selection by metadata
//!
//! Each configured `hadoopoffice.read.filter.metadata.<field>` is a regular
//! expression that must match the whole property value. Fields the file's
//! format does not know are ignored.

use hadoopoffice_core::properties::PropertySet;
use hadoopoffice_core::DocumentProperties;
use regex::Regex;

use crate::config::HadoopOfficeReadConfiguration;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct MetadataFilter {
    match_all: bool,
    rules: Vec<(String, Regex)>,
}

impl MetadataFilter {
    /// `rules` are field names with their patterns. With `match_all` every
    /// rule must match, otherwise one matching rule is enough.
    pub fn new(rules: &[(String, String)], match_all: bool) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|(field, pattern)| {
                Regex::new(&format!("^(?:{pattern})$"))
                    .map(|re| (field.to_ascii_lowercase(), re))
                    .map_err(|e| {
                        Error::Configuration(format!("invalid metadata filter for {field}: {e}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { match_all, rules })
    }

    pub fn from_config(config: &HadoopOfficeReadConfiguration) -> Result<Self> {
        Self::new(&config.filter_metadata, config.filter_match_all)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether a document with these properties is selected
    pub fn matches(&self, properties: &DocumentProperties, set: PropertySet) -> bool {
        let mut applicable = 0;
        let mut matched = 0;
        for (field, regex) in &self.rules {
            if !DocumentProperties::is_known(set, field) {
                log::debug!("metadata filter {field} does not apply to {set:?} files");
                continue;
            }
            applicable += 1;
            let is_match = properties
                .get(set, field)
                .map_or(false, |value| regex.is_match(&value));
            log::debug!("metadata filter {field}: {is_match}");
            if is_match {
                matched += 1;
            }
        }
        if applicable == 0 {
            return true;
        }
        if self.match_all {
            matched == applicable
        } else {
            matched > 0
        }
    }
}
