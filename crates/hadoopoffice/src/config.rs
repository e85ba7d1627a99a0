//! Job configuration
//!
//! [`JobConf`] is the string map a job is configured with. The read and
//! write settings of the formats are extracted from it once, by
//! [`HadoopOfficeReadConfiguration::from_conf`] and
//! [`HadoopOfficeWriteConfiguration::from_conf`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use hadoopoffice_core::Locale;
use hadoopoffice_crypto::{CipherAlgorithm, EncryptOptions, EncryptionMode, HashAlgorithm};
use regex::Regex;

use crate::document::SpreadsheetFormat;
use crate::error::{Error, Result};

pub const CONF_LOCALE: &str = "hadoopoffice.locale.bcp47";
pub const CONF_READ_LOCALE: &str = "hadoopoffice.read.locale.bcp47";
pub const CONF_READ_SHEETS: &str = "hadoopoffice.read.sheets";
pub const CONF_READ_LOW_FOOTPRINT: &str = "hadoopoffice.read.lowFootprint";
pub const CONF_READ_PASSWORD: &str = "hadoopoffice.read.security.crypt.password";
pub const CONF_READ_LINKED_WORKBOOKS: &str = "hadoopoffice.read.linkedworkbooks";
pub const CONF_READ_IGNORE_MISSING_LINKED: &str = "hadoopoffice.read.ignoremissinglinkedworkbooks";
pub const CONF_FILTER_MATCH_ALL: &str = "hadoopoffice.read.filter.metadata.matchAll";
pub const CONF_FILTER_METADATA: &str = "hadoopoffice.read.filter.metadata.";

pub const CONF_WRITE_MIME_TYPE: &str = "hadoopoffice.write.mimeType";
pub const CONF_WRITE_LOCALE: &str = "hadoopoffice.write.locale.bcp47";
pub const CONF_WRITE_LOW_FOOTPRINT: &str = "hadoopoffice.write.lowFootprint";
pub const CONF_WRITE_PASSWORD: &str = "hadoopoffice.write.security.crypt.password";
pub const CONF_WRITE_ENCRYPT_ALGORITHM: &str = "hadoopoffice.write.security.crypt.encrypt.algorithm";
pub const CONF_WRITE_HASH_ALGORITHM: &str = "hadoopoffice.write.security.crypt.hash.algorithm";
pub const CONF_WRITE_ENCRYPT_MODE: &str = "hadoopoffice.write.security.crypt.encrypt.mode";
pub const CONF_WRITE_CHAIN_MODE: &str = "hadoopoffice.write.security.crypt.chain.mode";
pub const CONF_WRITE_TEMPLATE_FILE: &str = "hadoopoffice.write.template.file";
pub const CONF_WRITE_TEMPLATE_PASSWORD: &str = "hadoopoffice.write.template.password";
pub const CONF_WRITE_LINKED_WORKBOOKS: &str = "hadoopoffice.write.linkedworkbooks";
pub const CONF_WRITE_COMMENT_AUTHOR: &str = "hadoopoffice.write.comment.author";
pub const CONF_WRITE_METADATA: &str = "hadoopoffice.write.metadata.";

pub const CONF_INPUT_DIR: &str = "mapreduce.input.fileinputformat.inputdir";
pub const CONF_OUTPUT_DIR: &str = "mapreduce.output.fileoutputformat.outputdir";
pub const CONF_TASK_ATTEMPT_ID: &str = "mapreduce.task.attempt.id";
pub const CONF_OUTPUT_COMPRESS: &str = "mapreduce.output.fileoutputformat.compress";
pub const CONF_OUTPUT_COMPRESS_CODEC: &str = "mapreduce.output.fileoutputformat.compress.codec";

pub const DEFAULT_LOCALE: &str = "en";
pub const DEFAULT_COMMENT_AUTHOR: &str = "hadoopoffice";

/// The string map a job is configured with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobConf {
    values: BTreeMap<String, String>,
}

impl JobConf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
        self.set(key, value.to_string())
    }

    pub fn unset(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Non-empty value of `key`
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    /// Boolean value of `key`; anything but `true` reads as `false`
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(value) => value.trim().eq_ignore_ascii_case("true"),
            None => default,
        }
    }

    /// Entries whose key starts with `prefix`, with the prefix removed
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.values
            .range(prefix.to_string()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(move |(k, v)| (&k[prefix.len()..], v.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for JobConf {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut conf = JobConf::new();
        for (k, v) in iter {
            conf.set(k, v);
        }
        conf
    }
}

/// Settings of the record reader
#[derive(Debug, Clone)]
pub struct HadoopOfficeReadConfiguration {
    pub locale: Locale,
    /// Sheets to read, all when `None`
    pub sheets: Option<Vec<String>>,
    pub low_footprint: bool,
    pub password: Option<String>,
    /// Load linked workbooks from the input file's directory
    pub read_linked_workbooks: bool,
    /// Use the values cached in the file for missing linked workbooks
    pub ignore_missing_linked_workbooks: bool,
    pub filter_match_all: bool,
    /// Metadata field name and the regex its value must match
    pub filter_metadata: Vec<(String, String)>,
}

impl Default for HadoopOfficeReadConfiguration {
    fn default() -> Self {
        Self {
            locale: Locale::parse(DEFAULT_LOCALE),
            sheets: None,
            low_footprint: false,
            password: None,
            read_linked_workbooks: false,
            ignore_missing_linked_workbooks: false,
            filter_match_all: true,
            filter_metadata: Vec::new(),
        }
    }
}

impl HadoopOfficeReadConfiguration {
    pub fn from_conf(conf: &JobConf) -> Self {
        let locale = conf
            .get_non_empty(CONF_READ_LOCALE)
            .or_else(|| conf.get_non_empty(CONF_LOCALE))
            .unwrap_or(DEFAULT_LOCALE);
        let sheets = conf.get_non_empty(CONF_READ_SHEETS).map(|s| {
            s.split(':')
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        });
        let filter_metadata = conf
            .with_prefix(CONF_FILTER_METADATA)
            .filter(|(field, _)| *field != "matchAll")
            .map(|(field, pattern)| (field.to_string(), pattern.to_string()))
            .collect();

        Self {
            locale: Locale::parse(locale),
            sheets,
            low_footprint: conf.get_bool(CONF_READ_LOW_FOOTPRINT, false),
            password: conf.get(CONF_READ_PASSWORD).map(str::to_string),
            read_linked_workbooks: conf.get_bool(CONF_READ_LINKED_WORKBOOKS, false),
            ignore_missing_linked_workbooks: conf.get_bool(CONF_READ_IGNORE_MISSING_LINKED, false),
            filter_match_all: conf.get_bool(CONF_FILTER_MATCH_ALL, true),
            filter_metadata,
        }
    }
}

/// Cipher used when the output is encrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptAlgorithm {
    /// AES, for OOXML
    Aes(CipherAlgorithm),
    /// RC4, for BIFF8
    Rc4,
}

impl EncryptAlgorithm {
    pub fn parse(name: &str) -> Option<Self> {
        if name.trim().eq_ignore_ascii_case("rc4") {
            return Some(EncryptAlgorithm::Rc4);
        }
        CipherAlgorithm::parse(name).map(EncryptAlgorithm::Aes)
    }
}

/// Block chaining of the OOXML cipher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainMode {
    Cbc,
    Ecb,
}

/// Settings of the record writer
#[derive(Debug, Clone)]
pub struct HadoopOfficeWriteConfiguration {
    pub format: SpreadsheetFormat,
    pub locale: Locale,
    /// OOXML: write strings inline instead of through a shared string table
    pub low_footprint: bool,
    pub password: Option<String>,
    pub encrypt_algorithm: EncryptAlgorithm,
    pub hash_algorithm: HashAlgorithm,
    pub encrypt_mode: EncryptionMode,
    pub chain_mode: ChainMode,
    pub template_file: Option<PathBuf>,
    pub template_password: Option<String>,
    pub linked_workbooks: Vec<PathBuf>,
    pub comment_author: String,
    /// Document property name and its textual value
    pub metadata: Vec<(String, String)>,
}

impl Default for HadoopOfficeWriteConfiguration {
    fn default() -> Self {
        Self {
            format: SpreadsheetFormat::Xlsx,
            locale: Locale::parse(DEFAULT_LOCALE),
            low_footprint: false,
            password: None,
            encrypt_algorithm: EncryptAlgorithm::Aes(CipherAlgorithm::Aes256),
            hash_algorithm: HashAlgorithm::Sha512,
            encrypt_mode: EncryptionMode::Agile,
            chain_mode: ChainMode::Cbc,
            template_file: None,
            template_password: None,
            linked_workbooks: Vec::new(),
            comment_author: DEFAULT_COMMENT_AUTHOR.to_string(),
            metadata: Vec::new(),
        }
    }
}

impl HadoopOfficeWriteConfiguration {
    pub fn from_conf(conf: &JobConf) -> Result<Self> {
        let defaults = Self::default();
        let format = match conf.get_non_empty(CONF_WRITE_MIME_TYPE) {
            Some(mime) => SpreadsheetFormat::from_mime_type(mime)
                .ok_or_else(|| Error::Configuration(format!("unknown mime type {mime}")))?,
            None => defaults.format,
        };
        let locale = conf
            .get_non_empty(CONF_WRITE_LOCALE)
            .or_else(|| conf.get_non_empty(CONF_READ_LOCALE))
            .or_else(|| conf.get_non_empty(CONF_LOCALE))
            .unwrap_or(DEFAULT_LOCALE);

        let encrypt_algorithm = match conf.get_non_empty(CONF_WRITE_ENCRYPT_ALGORITHM) {
            Some(name) => EncryptAlgorithm::parse(name).ok_or_else(|| {
                Error::Configuration(format!("unknown encryption algorithm {name}"))
            })?,
            None if format == SpreadsheetFormat::Xls => EncryptAlgorithm::Rc4,
            None => defaults.encrypt_algorithm,
        };
        let hash_algorithm = match conf.get_non_empty(CONF_WRITE_HASH_ALGORITHM) {
            Some(name) => HashAlgorithm::parse(name)
                .ok_or_else(|| Error::Configuration(format!("unknown hash algorithm {name}")))?,
            None => defaults.hash_algorithm,
        };
        let encrypt_mode = match conf.get_non_empty(CONF_WRITE_ENCRYPT_MODE) {
            None => defaults.encrypt_mode,
            Some(mode) if mode.eq_ignore_ascii_case("agile") => EncryptionMode::Agile,
            Some(mode) if mode.eq_ignore_ascii_case("standard") => EncryptionMode::Standard,
            Some(mode) => {
                return Err(Error::Configuration(format!("unknown encryption mode {mode}")))
            }
        };
        let chain_mode = match conf.get_non_empty(CONF_WRITE_CHAIN_MODE) {
            None if encrypt_mode == EncryptionMode::Standard => ChainMode::Ecb,
            None => ChainMode::Cbc,
            Some(mode) if mode.eq_ignore_ascii_case("cbc") => ChainMode::Cbc,
            Some(mode) if mode.eq_ignore_ascii_case("ecb") => ChainMode::Ecb,
            Some(mode) => return Err(Error::Configuration(format!("unknown chain mode {mode}"))),
        };

        let linked_workbooks = conf
            .get_non_empty(CONF_WRITE_LINKED_WORKBOOKS)
            .map(parse_linked_workbooks)
            .unwrap_or_default();
        let metadata = conf
            .with_prefix(CONF_WRITE_METADATA)
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        Ok(Self {
            format,
            locale: Locale::parse(locale),
            low_footprint: conf.get_bool(CONF_WRITE_LOW_FOOTPRINT, false),
            password: conf.get(CONF_WRITE_PASSWORD).map(str::to_string),
            encrypt_algorithm,
            hash_algorithm,
            encrypt_mode,
            chain_mode,
            template_file: conf.get_non_empty(CONF_WRITE_TEMPLATE_FILE).map(PathBuf::from),
            template_password: conf.get(CONF_WRITE_TEMPLATE_PASSWORD).map(str::to_string),
            linked_workbooks,
            comment_author: conf
                .get_or(CONF_WRITE_COMMENT_AUTHOR, DEFAULT_COMMENT_AUTHOR)
                .to_string(),
            metadata,
        })
    }

    /// OOXML encryption parameters
    pub fn encrypt_options(&self) -> Result<EncryptOptions> {
        let cipher = match self.encrypt_algorithm {
            EncryptAlgorithm::Aes(cipher) => cipher,
            EncryptAlgorithm::Rc4 => {
                return Err(Error::Configuration(
                    "rc4 encryption is only available for xls output".into(),
                ))
            }
        };
        let expected_chain = match self.encrypt_mode {
            EncryptionMode::Agile => ChainMode::Cbc,
            EncryptionMode::Standard => ChainMode::Ecb,
        };
        if self.chain_mode != expected_chain {
            log::warn!(
                "{:?} encryption uses {:?} chaining, ignoring {:?}",
                self.encrypt_mode,
                expected_chain,
                self.chain_mode
            );
        }
        Ok(EncryptOptions {
            mode: self.encrypt_mode,
            cipher,
            hash: self.hash_algorithm,
            ..EncryptOptions::default()
        })
    }
}

/// Paths of `[path1]:[path2]`. A value without brackets is one path.
fn parse_linked_workbooks(value: &str) -> Vec<PathBuf> {
    let Ok(bracketed) = Regex::new(r"\[([^\]]+)\]") else {
        return Vec::new();
    };
    let paths: Vec<PathBuf> = bracketed
        .captures_iter(value)
        .map(|c| PathBuf::from(&c[1]))
        .collect();
    if paths.is_empty() {
        return vec![PathBuf::from(value.trim())];
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_bool_malformed_is_false() {
        let mut conf = JobConf::new();
        conf.set("a", "TRUE").set("b", "yes").set("c", "false");
        assert!(conf.get_bool("a", false));
        assert!(!conf.get_bool("b", true));
        assert!(!conf.get_bool("c", true));
        assert!(conf.get_bool("missing", true));
    }

    #[test]
    fn test_with_prefix() {
        let conf: JobConf = [
            ("hadoopoffice.write.metadata.title", "t"),
            ("hadoopoffice.write.metadata.custom.x", "y"),
            ("hadoopoffice.write.mimeType", "m"),
        ]
        .into_iter()
        .collect();
        let entries: Vec<_> = conf.with_prefix(CONF_WRITE_METADATA).collect();
        assert_eq!(entries, vec![("custom.x", "y"), ("title", "t")]);
    }

    #[test]
    fn test_read_defaults() {
        let read = HadoopOfficeReadConfiguration::from_conf(&JobConf::new());
        assert_eq!(read.locale, Locale::parse("en"));
        assert!(read.sheets.is_none());
        assert!(!read.low_footprint);
        assert!(read.filter_match_all);
        assert!(read.filter_metadata.is_empty());
    }

    #[test]
    fn test_read_settings() {
        let conf: JobConf = [
            (CONF_LOCALE, "de"),
            (CONF_READ_SHEETS, "Sheet1:Sheet3"),
            (CONF_FILTER_MATCH_ALL, "false"),
            ("hadoopoffice.read.filter.metadata.title", "dummy.*"),
        ]
        .into_iter()
        .collect();
        let read = HadoopOfficeReadConfiguration::from_conf(&conf);
        assert_eq!(read.locale, Locale::parse("de"));
        assert_eq!(read.sheets, Some(vec!["Sheet1".to_string(), "Sheet3".to_string()]));
        assert!(!read.filter_match_all);
        assert_eq!(
            read.filter_metadata,
            vec![("title".to_string(), "dummy.*".to_string())]
        );
    }

    #[test]
    fn test_write_settings() {
        let conf: JobConf = [
            (CONF_WRITE_MIME_TYPE, "application/vnd.ms-excel"),
            (CONF_WRITE_LINKED_WORKBOOKS, "[/tmp/a.xls]:[/tmp/b.xls]"),
            (CONF_READ_LOCALE, "de"),
        ]
        .into_iter()
        .collect();
        let write = HadoopOfficeWriteConfiguration::from_conf(&conf).unwrap();
        assert_eq!(write.format, SpreadsheetFormat::Xls);
        assert_eq!(write.encrypt_algorithm, EncryptAlgorithm::Rc4);
        assert_eq!(write.locale, Locale::parse("de"));
        assert_eq!(write.comment_author, "hadoopoffice");
        assert_eq!(
            write.linked_workbooks,
            vec![PathBuf::from("/tmp/a.xls"), PathBuf::from("/tmp/b.xls")]
        );
    }

    #[test]
    fn test_unknown_mime_type() {
        let mut conf = JobConf::new();
        conf.set(CONF_WRITE_MIME_TYPE, "text/csv");
        assert!(matches!(
            HadoopOfficeWriteConfiguration::from_conf(&conf),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_encrypt_options() {
        let mut conf = JobConf::new();
        conf.set(CONF_WRITE_ENCRYPT_MODE, "standard")
            .set(CONF_WRITE_ENCRYPT_ALGORITHM, "aes128")
            .set(CONF_WRITE_HASH_ALGORITHM, "sha1");
        let write = HadoopOfficeWriteConfiguration::from_conf(&conf).unwrap();
        assert_eq!(write.chain_mode, ChainMode::Ecb);
        let options = write.encrypt_options().unwrap();
        assert_eq!(options.mode, EncryptionMode::Standard);
        assert_eq!(options.cipher, CipherAlgorithm::Aes128);
        assert_eq!(options.hash, HashAlgorithm::Sha1);
    }
}
