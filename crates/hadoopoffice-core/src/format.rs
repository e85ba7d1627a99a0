//! Locale-aware rendering of cell values to display strings.
//!
//! [`CellFormatter`] turns a [`CellValue`] plus its [`NumberFormat`] into
//! the text a spreadsheet application would show. It understands:
//!
//! - `General`, with integers printed without decimals
//! - digit placeholders `0 # ?`, grouping `,`, decimals `.`, percent and
//!   scientific notation, with the locale's separators
//! - multi-section codes (`positive;negative;zero;text`) and `[Red]`-style
//!   bracket prefixes
//! - date and time codes, including the locale-dependent short date (14)
//!
//! Fractions are rendered as `General`.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::cell::CellValue;
use crate::locale::Locale;
use crate::number_format::{is_date_code, NumberFormat};

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// Renders cell values for one locale
#[derive(Debug, Clone, Default)]
pub struct CellFormatter {
    locale: Locale,
}

impl CellFormatter {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    /// Format a cell value. Formulas render their cached result.
    pub fn format(&self, value: &CellValue, format: &NumberFormat, date_1904: bool) -> String {
        match value.effective_value() {
            CellValue::Empty => String::new(),
            CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Error(e) => e.as_str().to_string(),
            CellValue::Text(s) => self.format_text(s, format),
            CellValue::Number(n) => self.format_number(*n, format, date_1904),
            CellValue::Formula { .. } => String::new(),
        }
    }

    /// Format a number with the given format
    pub fn format_number(&self, value: f64, format: &NumberFormat, date_1904: bool) -> String {
        let code = match format {
            NumberFormat::General => return self.format_general(value),
            NumberFormat::BuiltIn(NumberFormat::ID_DATE_SHORT) => self.locale.short_date_code(),
            NumberFormat::BuiltIn(NumberFormat::ID_DATETIME) => {
                return format!(
                    "{} {}",
                    self.format_number(value, &NumberFormat::BuiltIn(14), date_1904),
                    self.format_date(value, "h:mm", date_1904)
                );
            }
            NumberFormat::BuiltIn(id) if NumberFormat::builtin_code(*id).is_none() => {
                log::debug!("unknown built-in number format {id}, using General");
                return self.format_general(value);
            }
            other => other.format_code(),
        };
        self.format_with_code(value, code, date_1904)
    }

    /// Format a number with an explicit format code
    pub fn format_with_code(&self, value: f64, code: &str, date_1904: bool) -> String {
        if code.trim().eq_ignore_ascii_case("general") {
            return self.format_general(value);
        }
        let sections = split_sections(code);
        let (section, auto_minus) = match (sections.len(), value) {
            (_, v) if v > 0.0 || sections.len() == 1 => (sections[0], true),
            (_, v) if v < 0.0 => (sections[1], false),
            (n, _) if n >= 3 => (sections[2], false),
            _ => (sections[0], false),
        };
        let section = strip_brackets(section);
        if section.trim().eq_ignore_ascii_case("general") {
            return self.format_general(if auto_minus { value } else { value.abs() });
        }
        if is_date_code(&section) {
            return self.format_date(value, &section, date_1904);
        }
        let magnitude = if auto_minus { value } else { value.abs() };
        self.format_pattern(magnitude, &section)
    }

    /// `General` rendering: integers without decimals, up to ten significant
    /// decimals otherwise, scientific notation for very large or small values.
    pub fn format_general(&self, value: f64) -> String {
        if !value.is_finite() {
            return value.to_string();
        }
        if value == 0.0 {
            return "0".to_string();
        }
        let abs = value.abs();
        let text = if abs >= 1e11 || abs < 1e-9 {
            let formatted = format!("{:.5E}", value);
            let (mantissa, exponent) = formatted.split_once('E').unwrap_or((&formatted, "0"));
            let mantissa = trim_fraction(mantissa);
            let exp: i32 = exponent.parse().unwrap_or(0);
            format!("{}E{}{:02}", mantissa, if exp < 0 { '-' } else { '+' }, exp.abs())
        } else if value.fract() == 0.0 {
            format!("{}", value as i64)
        } else {
            let digits_before = if abs < 1.0 { 0 } else { abs.log10().floor() as usize + 1 };
            let decimals = 10usize.saturating_sub(digits_before).max(1);
            trim_fraction(&format!("{:.*}", decimals, value)).to_string()
        };
        self.localize_decimal(&text)
    }

    fn format_text(&self, text: &str, format: &NumberFormat) -> String {
        let NumberFormat::Custom(code) = format else {
            return text.to_string();
        };
        let sections = split_sections(code);
        let Some(section) = sections.get(3).or_else(|| {
            sections.first().filter(|s| s.contains('@'))
        }) else {
            return text.to_string();
        };
        let mut out = String::new();
        for token in literal_tokens(&strip_brackets(section)) {
            match token {
                Literal::Char('@') => out.push_str(text),
                Literal::Char(c) => out.push(c),
                Literal::Text(s) => out.push_str(&s),
            }
        }
        out
    }

    fn localize_decimal(&self, text: &str) -> String {
        if self.locale.decimal_sep == '.' {
            text.to_string()
        } else {
            text.replace('.', &self.locale.decimal_sep.to_string())
        }
    }

    /// Numeric pattern: literal prefix, placeholder block, literal suffix
    fn format_pattern(&self, value: f64, pattern: &str) -> String {
        let tokens = literal_tokens(pattern);
        let is_placeholder = |t: &Literal| {
            matches!(t, Literal::Char('0' | '#' | '?' | '.' | ','))
        };
        let first = tokens.iter().position(|t| matches!(t, Literal::Char('0' | '#' | '?')));
        let Some(first) = first else {
            return render_literals(&tokens);
        };
        let mut last = first;
        for (i, t) in tokens.iter().enumerate().skip(first) {
            if is_placeholder(t) || matches!(t, Literal::Char('E' | 'e')) {
                last = i;
            } else if matches!(t, Literal::Char('+' | '-')) && i > 0
                && matches!(tokens[i - 1], Literal::Char('E' | 'e'))
            {
                last = i;
            } else {
                break;
            }
        }
        let percent = tokens
            .iter()
            .filter(|t| matches!(t, Literal::Char('%')))
            .count();
        let mut v = value;
        for _ in 0..percent {
            v *= 100.0;
        }
        let number: String = tokens[first..=last]
            .iter()
            .filter_map(|t| match t {
                Literal::Char(c) => Some(*c),
                Literal::Text(_) => None,
            })
            .collect();
        let body = if let Some(epos) = number.find(|c| c == 'E' || c == 'e') {
            self.format_scientific(v, &number[..epos], &number[epos + 1..])
        } else {
            self.format_fixed(v, &number)
        };
        format!(
            "{}{}{}",
            render_literals(&tokens[..first]),
            body,
            render_literals(&tokens[last + 1..])
        )
    }

    fn format_fixed(&self, value: f64, number: &str) -> String {
        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        // Trailing commas scale by 1000 each.
        let scale_commas = int_part.len() - int_part.trim_end_matches(',').len();
        let int_part = int_part.trim_end_matches(',');
        let grouping = int_part.contains(',');
        let min_int = int_part.chars().filter(|c| *c == '0').count();
        let min_frac = frac_part.chars().filter(|c| *c == '0').count();
        let max_frac = frac_part.chars().filter(|c| matches!(c, '0' | '#' | '?')).count();

        let mut v = value;
        for _ in 0..scale_commas {
            v /= 1000.0;
        }
        let negative = v < 0.0;
        let rounded = format!("{:.*}", max_frac, v.abs());
        let (int_digits, frac_digits) = rounded.split_once('.').unwrap_or((&rounded, ""));

        let mut int_digits = int_digits.trim_start_matches('0').to_string();
        while int_digits.len() < min_int {
            int_digits.insert(0, '0');
        }
        if grouping {
            int_digits = group_thousands(&int_digits, self.locale.thousands_sep);
        }
        let mut frac = frac_digits.to_string();
        while frac.len() > min_frac && frac.ends_with('0') {
            frac.pop();
        }

        let mut out = String::new();
        if negative && (int_digits.chars().any(|c| c.is_ascii_digit() && c != '0')
            || frac.chars().any(|c| c != '0'))
        {
            out.push('-');
        }
        out.push_str(&int_digits);
        if !frac.is_empty() {
            out.push(self.locale.decimal_sep);
            out.push_str(&frac);
        }
        if out.is_empty() || out == "-" {
            out.push('0');
        }
        out
    }

    fn format_scientific(&self, value: f64, mantissa: &str, exponent: &str) -> String {
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        let frac_digits = frac_part.chars().filter(|c| matches!(c, '0' | '#' | '?')).count();
        let exp_digits = exponent.chars().filter(|c| *c == '0').count().max(1);
        let int_width = int_part.chars().filter(|c| matches!(c, '0' | '#' | '?')).count().max(1);

        if value == 0.0 {
            let zeros = "0".repeat(frac_digits);
            let sep = if frac_digits > 0 { self.locale.decimal_sep.to_string() } else { String::new() };
            return format!("0{sep}{zeros}E+{}", "0".repeat(exp_digits));
        }
        // Engineering-style codes (##0.0E+0) keep exponents in multiples of the int width.
        let mut exp = value.abs().log10().floor() as i32;
        if int_width > 1 {
            exp -= exp.rem_euclid(int_width as i32);
        }
        let mut mant = value / 10f64.powi(exp);
        let rounded: f64 = format!("{:.*}", frac_digits, mant).parse().unwrap_or(mant);
        if rounded.abs() >= 10f64.powi(int_width as i32) {
            exp += int_width as i32;
            mant = value / 10f64.powi(exp);
        }
        let mant_text = self.localize_decimal(&format!("{:.*}", frac_digits, mant));
        let sign = if exp < 0 {
            "-"
        } else if exponent.starts_with('+') {
            "+"
        } else {
            ""
        };
        format!("{}E{}{:0width$}", mant_text, sign, exp.abs(), width = exp_digits)
    }

    /// Render a date serial with a date/time code
    fn format_date(&self, value: f64, code: &str, date_1904: bool) -> String {
        let Some(dt) = serial_to_datetime(value, date_1904) else {
            return self.format_general(value);
        };
        let tokens = date_tokens(code);
        let has_ampm = tokens.iter().any(|t| matches!(t, DateToken::AmPm(_)));
        let mut out = String::new();
        for (i, token) in tokens.iter().enumerate() {
            match token {
                DateToken::Year(n) if *n <= 2 => out.push_str(&format!("{:02}", dt.year() % 100)),
                DateToken::Year(_) => out.push_str(&format!("{:04}", dt.year())),
                DateToken::Month(n) | DateToken::Minute(n) => {
                    // `m` after an hour or before a second is a minute.
                    let is_minute = matches!(token, DateToken::Minute(_))
                        || tokens[..i].iter().rev().find(|t| !matches!(t, DateToken::Lit(_)))
                            .map_or(false, |t| matches!(t, DateToken::Hour(_) | DateToken::ElapsedHours))
                        || tokens[i + 1..].iter().find(|t| !matches!(t, DateToken::Lit(_)))
                            .map_or(false, |t| matches!(t, DateToken::Second(_)));
                    if is_minute {
                        push_padded(&mut out, dt.minute(), *n);
                    } else {
                        let m = dt.month() as usize;
                        match n {
                            1 => out.push_str(&m.to_string()),
                            2 => out.push_str(&format!("{m:02}")),
                            3 => out.push_str(&MONTHS[m - 1][..3]),
                            5 => out.push_str(&MONTHS[m - 1][..1]),
                            _ => out.push_str(MONTHS[m - 1]),
                        }
                    }
                }
                DateToken::Day(n) => match n {
                    1 => out.push_str(&dt.day().to_string()),
                    2 => out.push_str(&format!("{:02}", dt.day())),
                    3 => out.push_str(&dt.format("%a").to_string()),
                    _ => out.push_str(&dt.format("%A").to_string()),
                },
                DateToken::Hour(n) => {
                    let hour = if has_ampm {
                        match dt.hour() % 12 {
                            0 => 12,
                            h => h,
                        }
                    } else {
                        dt.hour()
                    };
                    push_padded(&mut out, hour, *n);
                }
                DateToken::ElapsedHours => {
                    let hours = (value * 24.0).floor() as i64;
                    out.push_str(&hours.to_string());
                }
                DateToken::Second(n) => push_padded(&mut out, dt.second(), *n),
                DateToken::Fraction(n) => {
                    let frac = (dt.nanosecond() as f64 / 1e9 * 10f64.powi(*n as i32)).round();
                    out.push(self.locale.decimal_sep);
                    out.push_str(&format!("{:0width$}", frac as u64, width = *n));
                }
                DateToken::AmPm(short) => {
                    let pm = dt.hour() >= 12;
                    out.push_str(match (short, pm) {
                        (false, false) => "AM",
                        (false, true) => "PM",
                        (true, false) => "A",
                        (true, true) => "P",
                    });
                }
                DateToken::Lit(s) => out.push_str(s),
            }
        }
        out
    }
}

fn push_padded(out: &mut String, value: u32, width: usize) {
    if width >= 2 {
        out.push_str(&format!("{value:02}"));
    } else {
        out.push_str(&value.to_string());
    }
}

/// Convert an Excel date serial to a date/time
pub fn serial_to_datetime(serial: f64, date_1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_466.0 {
        return None;
    }
    let mut days = serial.floor() as i64;
    let base = if date_1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else {
        // Serial 60 is the fictitious 1900-02-29.
        if days < 60 {
            days += 1;
        }
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    let millis = ((serial - serial.floor()) * 86_400_000.0).round() as i64;
    base.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight + Duration::days(days) + Duration::milliseconds(millis))
}

/// Convert a date/time to an Excel date serial
pub fn datetime_to_serial(dt: &NaiveDateTime, date_1904: bool) -> f64 {
    let (base, leap_fix) = if date_1904 {
        (NaiveDate::from_ymd_opt(1904, 1, 1), false)
    } else {
        (NaiveDate::from_ymd_opt(1899, 12, 30), true)
    };
    let Some(base) = base.and_then(|d| d.and_hms_opt(0, 0, 0)) else {
        return 0.0;
    };
    let elapsed = *dt - base;
    let mut serial = elapsed.num_milliseconds() as f64 / 86_400_000.0;
    if leap_fix && serial < 61.0 {
        serial -= 1.0;
    }
    serial
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Char(char),
    Text(String),
}

/// Split a format section into placeholder characters and literal text.
fn literal_tokens(section: &str) -> Vec<Literal> {
    let mut out = Vec::new();
    let mut chars = section.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                let text: String = chars.by_ref().take_while(|q| *q != '"').collect();
                out.push(Literal::Text(text));
            }
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(Literal::Text(next.to_string()));
                }
            }
            '_' => {
                chars.next();
                out.push(Literal::Text(" ".into()));
            }
            '*' => {
                chars.next();
            }
            c => out.push(Literal::Char(c)),
        }
    }
    out
}

fn render_literals(tokens: &[Literal]) -> String {
    tokens
        .iter()
        .map(|t| match t {
            Literal::Char(c) => c.to_string(),
            Literal::Text(s) => s.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
enum DateToken {
    Year(usize),
    Month(usize),
    Minute(usize),
    Day(usize),
    Hour(usize),
    ElapsedHours,
    Second(usize),
    Fraction(usize),
    AmPm(bool),
    Lit(String),
}

fn date_tokens(code: &str) -> Vec<DateToken> {
    let chars: Vec<char> = code.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    let run = |i: usize, target: char| {
        chars[i..]
            .iter()
            .take_while(|c| c.eq_ignore_ascii_case(&target))
            .count()
    };
    while i < chars.len() {
        let c = chars[i];
        let lower = c.to_ascii_lowercase();
        match lower {
            'y' | 'm' | 'd' | 'h' | 's' => {
                let n = run(i, lower);
                out.push(match lower {
                    'y' => DateToken::Year(n),
                    'm' => DateToken::Month(n),
                    'd' => DateToken::Day(n),
                    'h' => DateToken::Hour(n),
                    _ => DateToken::Second(n),
                });
                i += n;
            }
            '[' => {
                let close = chars[i..].iter().position(|c| *c == ']').map(|p| i + p);
                let inner: String = match close {
                    Some(end) => chars[i + 1..end].iter().collect(),
                    None => String::new(),
                };
                match inner.to_ascii_lowercase().as_str() {
                    s if s.starts_with('h') => out.push(DateToken::ElapsedHours),
                    s if s.starts_with('m') => out.push(DateToken::Minute(s.len())),
                    s if s.starts_with('s') => out.push(DateToken::Second(s.len())),
                    _ => {}
                }
                i = close.map_or(chars.len(), |e| e + 1);
            }
            'a' if code[char_offset(&chars, i)..].to_ascii_uppercase().starts_with("AM/PM") => {
                out.push(DateToken::AmPm(false));
                i += 5;
            }
            'a' if code[char_offset(&chars, i)..].to_ascii_uppercase().starts_with("A/P") => {
                out.push(DateToken::AmPm(true));
                i += 3;
            }
            '.' if i + 1 < chars.len() && chars[i + 1] == '0' => {
                let n = chars[i + 1..].iter().take_while(|c| **c == '0').count();
                out.push(DateToken::Fraction(n));
                i += n + 1;
            }
            '"' => {
                let text: String = chars[i + 1..].iter().take_while(|q| **q != '"').collect();
                i += text.chars().count() + 2;
                out.push(DateToken::Lit(text));
            }
            '\\' => {
                if let Some(next) = chars.get(i + 1) {
                    out.push(DateToken::Lit(next.to_string()));
                }
                i += 2;
            }
            '_' => {
                out.push(DateToken::Lit(" ".into()));
                i += 2;
            }
            '*' => i += 2,
            _ => {
                out.push(DateToken::Lit(c.to_string()));
                i += 1;
            }
        }
    }
    out
}

fn char_offset(chars: &[char], idx: usize) -> usize {
    chars[..idx].iter().map(|c| c.len_utf8()).sum()
}

/// Split a format code on `;` outside of quotes and escapes
fn split_sections(code: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escape = false;
    for (idx, ch) in code.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '"' => in_quotes = !in_quotes,
            '\\' if !in_quotes => escape = true,
            ';' if !in_quotes => {
                sections.push(&code[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    sections.push(&code[start..]);
    sections
}

/// Remove colour and condition brackets, keeping elapsed-time brackets
fn strip_brackets(section: &str) -> String {
    let mut out = String::with_capacity(section.len());
    let mut rest = section;
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find(']') else {
            break;
        };
        let inner = &rest[open + 1..open + close];
        out.push_str(&rest[..open]);
        let lower = inner.to_ascii_lowercase();
        if !lower.is_empty() && lower.chars().all(|c| matches!(c, 'h' | 'm' | 's')) {
            out.push_str(&rest[open..=open + close]);
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

fn group_thousands(digits: &str, sep: char) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
