//! Formatting locales parsed from BCP-47 tags

use std::fmt;

/// Order of day, month and year in the short date format (built-in format 14)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    /// `M/d/yy` (en-US)
    MonthDayYear,
    /// `dd/MM/yy` (most European locales)
    DayMonthYear,
    /// `yy/MM/dd` (East Asian locales, Swedish, Hungarian)
    YearMonthDay,
}

/// Separators and date conventions for a locale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    language: String,
    region: Option<String>,
    pub decimal_sep: char,
    pub thousands_sep: char,
    pub date_order: DateOrder,
}

impl Locale {
    /// US English, the default when no locale is configured
    pub fn en_us() -> Self {
        Self::build("en".into(), Some("US".into()))
    }

    /// Parse a BCP-47 tag such as `de`, `de-DE`, `en_US` or `fr-CH-u-nu-latn`.
    ///
    /// Unknown languages fall back to US English separators; parsing never fails.
    pub fn parse(tag: &str) -> Self {
        let mut key = tag.trim().replace('_', "-");
        for marker in ['.', '@'] {
            if let Some(idx) = key.find(marker) {
                key.truncate(idx);
            }
        }
        let mut parts = key.split('-').filter(|p| !p.is_empty());
        let language = parts
            .next()
            .map(|l| l.to_ascii_lowercase())
            .unwrap_or_else(|| "en".to_string());
        // Skip a script subtag (4 letters) and pick the first region subtag.
        let region = parts
            .take_while(|p| p.len() != 1)
            .find(|p| p.len() == 2 || (p.len() == 3 && p.bytes().all(|b| b.is_ascii_digit())))
            .map(|r| r.to_ascii_uppercase());
        Self::build(language, region)
    }

    fn build(language: String, region: Option<String>) -> Self {
        let (decimal_sep, thousands_sep) = match (language.as_str(), region.as_deref()) {
            ("de" | "fr" | "it", Some("CH" | "LI")) => ('.', '\''),
            ("es", Some("MX" | "US")) => ('.', ','),
            ("fr" | "ru" | "pl" | "cs" | "sk" | "fi" | "sv" | "nb" | "no" | "uk" | "hu", _) => {
                (',', '\u{00A0}')
            }
            ("de" | "it" | "es" | "nl" | "pt" | "da" | "tr" | "id" | "el" | "ro" | "hr" | "sl", _) => {
                (',', '.')
            }
            _ => ('.', ','),
        };
        let date_order = match (language.as_str(), region.as_deref()) {
            ("en", None | Some("US" | "PH")) => DateOrder::MonthDayYear,
            ("ja" | "zh" | "ko" | "hu" | "lt" | "sv", _) => DateOrder::YearMonthDay,
            _ => DateOrder::DayMonthYear,
        };
        Self {
            language,
            region,
            decimal_sep,
            thousands_sep,
            date_order,
        }
    }

    /// Primary language subtag, lowercase
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Region subtag, uppercase
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Format code used for built-in format 14 in this locale
    pub fn short_date_code(&self) -> &'static str {
        match self.date_order {
            DateOrder::MonthDayYear => "m/d/yy",
            DateOrder::DayMonthYear => "dd/mm/yy",
            DateOrder::YearMonthDay => "yy/mm/dd",
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::en_us()
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}-{}", self.language, region),
            None => f.write_str(&self.language),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        let de = Locale::parse("de");
        assert_eq!(de.decimal_sep, ',');
        assert_eq!(de.thousands_sep, '.');
        assert_eq!(de.date_order, DateOrder::DayMonthYear);
        assert_eq!(de.to_string(), "de");

        let us = Locale::parse("en_US.UTF-8");
        assert_eq!(us.region(), Some("US"));
        assert_eq!(us.date_order, DateOrder::MonthDayYear);

        let ch = Locale::parse("de-Latn-CH");
        assert_eq!(ch.region(), Some("CH"));
        assert_eq!(ch.thousands_sep, '\'');

        let gb = Locale::parse("en-GB");
        assert_eq!(gb.decimal_sep, '.');
        assert_eq!(gb.date_order, DateOrder::DayMonthYear);
    }

    #[test]
    fn test_short_date_code() {
        assert_eq!(Locale::parse("de").short_date_code(), "dd/mm/yy");
        assert_eq!(Locale::parse("en").short_date_code(), "m/d/yy");
        assert_eq!(Locale::parse("ja-JP").short_date_code(), "yy/mm/dd");
    }
}
