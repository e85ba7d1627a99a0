//! `\u{5}SummaryInformation` property set stream.
//!
//! A property set stream holds one section identified by the
//! SummaryInformation format id. The section is a table of
//! `(property id, offset)` pairs followed by typed values.

use chrono::{DateTime, NaiveDateTime};

use hadoopoffice_core::DocumentProperties;

use crate::biff::payload::Payload;
use crate::error::{XlsError, XlsResult};

/// Stream name inside the compound file
pub const STREAM_NAME: &str = "\u{5}SummaryInformation";

/// F29F85E0-4FF9-1068-AB91-08002B27B3D9
const FMTID_SUMMARY: [u8; 16] = [
    0xE0, 0x85, 0x9F, 0xF2, 0xF9, 0x4F, 0x68, 0x10, 0xAB, 0x91, 0x08, 0x00, 0x2B, 0x27, 0xB3, 0xD9,
];

const VT_I2: u16 = 0x0002;
const VT_I4: u16 = 0x0003;
const VT_LPSTR: u16 = 0x001E;
const VT_FILETIME: u16 = 0x0040;

const PID_CODEPAGE: u32 = 1;
const PID_TITLE: u32 = 2;
const PID_SUBJECT: u32 = 3;
const PID_AUTHOR: u32 = 4;
const PID_KEYWORDS: u32 = 5;
const PID_COMMENTS: u32 = 6;
const PID_TEMPLATE: u32 = 7;
const PID_LASTAUTHOR: u32 = 8;
const PID_REVNUMBER: u32 = 9;
const PID_EDITTIME: u32 = 10;
const PID_LASTPRINTED: u32 = 11;
const PID_CREATE_DTM: u32 = 12;
const PID_LASTSAVE_DTM: u32 = 13;
const PID_PAGECOUNT: u32 = 14;
const PID_WORDCOUNT: u32 = 15;
const PID_CHARCOUNT: u32 = 16;
const PID_APPNAME: u32 = 18;
const PID_SECURITY: u32 = 19;

const CP_UTF16: u16 = 1200;
const CP_WINDOWS_1252: u16 = 1252;
const CP_UTF8: u16 = 65001;

/// Seconds between 1601-01-01 and 1970-01-01
const FILETIME_EPOCH_OFFSET: i64 = 11_644_473_600;

fn filetime_to_datetime(ft: u64) -> Option<NaiveDateTime> {
    let ticks = ft as i64;
    let secs = ticks.div_euclid(10_000_000) - FILETIME_EPOCH_OFFSET;
    let nanos = (ticks.rem_euclid(10_000_000) * 100) as u32;
    DateTime::from_timestamp(secs, nanos).map(|d| d.naive_utc())
}

fn datetime_to_filetime(dt: &NaiveDateTime) -> u64 {
    let utc = dt.and_utc();
    let ticks = (utc.timestamp() + FILETIME_EPOCH_OFFSET) * 10_000_000
        + utc.timestamp_subsec_nanos() as i64 / 100;
    ticks.max(0) as u64
}

fn decode_lpstr(bytes: &[u8], codepage: u16) -> String {
    match codepage {
        CP_UTF16 => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .take_while(|&u| u != 0)
                .collect();
            String::from_utf16_lossy(&units)
        }
        CP_UTF8 => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
        _ => bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect(),
    }
}

enum Value {
    Int(i32),
    Text(String),
    Time(u64),
}

/// Read the properties of a SummaryInformation stream into `props`
pub fn read_summary_information(data: &[u8], props: &mut DocumentProperties) -> XlsResult<()> {
    let mut stream = Payload::new("SummaryInformation", data);
    if stream.u16()? != 0xFFFE {
        return Err(XlsError::InvalidFormat("property set byte order mark".into()));
    }
    if stream.seek(24).u32()? == 0 {
        return Ok(());
    }
    if stream.bytes(16)? != FMTID_SUMMARY {
        return Err(XlsError::InvalidFormat("not a SummaryInformation property set".into()));
    }
    let section = stream.u32()? as usize;

    let count = stream.seek(section + 4).u32()?;
    let mut entries = Vec::with_capacity(count.min(64) as usize);
    for _ in 0..count {
        let pid = stream.u32()?;
        let offset = stream.u32()? as usize;
        entries.push((pid, section + offset));
    }

    // The code page decides how strings are read
    let mut codepage = CP_WINDOWS_1252;
    if let Some(&(_, pos)) = entries.iter().find(|(pid, _)| *pid == PID_CODEPAGE) {
        if stream.seek(pos).u16()? == VT_I2 {
            codepage = stream.seek(pos + 4).i16()? as u16;
        }
    }

    for (pid, pos) in entries {
        if pid == PID_CODEPAGE {
            continue;
        }
        let kind = stream.seek(pos).u16()?;
        stream.skip(2)?;
        let value = match kind {
            VT_I2 => Value::Int(i32::from(stream.i16()?)),
            VT_I4 => Value::Int(stream.i32()?),
            VT_LPSTR => {
                let len = stream.u32()? as usize;
                let byte_len = if codepage == CP_UTF16 { len * 2 } else { len };
                Value::Text(decode_lpstr(stream.bytes(byte_len)?, codepage))
            }
            VT_FILETIME => {
                let low = u64::from(stream.u32()?);
                let high = u64::from(stream.u32()?);
                Value::Time((high << 32) | low)
            }
            other => {
                log::debug!("skipping summary property {pid} of type 0x{other:04X}");
                continue;
            }
        };
        apply(props, pid, value);
    }
    Ok(())
}

fn apply(props: &mut DocumentProperties, pid: u32, value: Value) {
    match value {
        Value::Text(s) => {
            let field = match pid {
                PID_TITLE => &mut props.title,
                PID_SUBJECT => &mut props.subject,
                PID_AUTHOR => &mut props.creator,
                PID_KEYWORDS => &mut props.keywords,
                PID_COMMENTS => &mut props.description,
                PID_TEMPLATE => &mut props.template,
                PID_LASTAUTHOR => &mut props.last_modified_by,
                PID_REVNUMBER => &mut props.revision,
                PID_APPNAME => &mut props.application_name,
                _ => return,
            };
            *field = Some(s);
        }
        Value::Int(n) => {
            let field = match pid {
                PID_PAGECOUNT => &mut props.page_count,
                PID_WORDCOUNT => &mut props.word_count,
                PID_CHARCOUNT => &mut props.char_count,
                PID_SECURITY => &mut props.security,
                _ => return,
            };
            *field = Some(n);
        }
        Value::Time(ft) => match pid {
            PID_EDITTIME => props.edit_time = Some(ft as i64),
            PID_LASTPRINTED => props.last_printed = filetime_to_datetime(ft),
            PID_CREATE_DTM => props.created = filetime_to_datetime(ft),
            PID_LASTSAVE_DTM => props.modified = filetime_to_datetime(ft),
            _ => {}
        },
    }
}

fn collect(props: &DocumentProperties) -> Vec<(u32, Value)> {
    let mut values = Vec::new();
    let texts = [
        (PID_TITLE, &props.title),
        (PID_SUBJECT, &props.subject),
        (PID_AUTHOR, &props.creator),
        (PID_KEYWORDS, &props.keywords),
        (PID_COMMENTS, &props.description),
        (PID_TEMPLATE, &props.template),
        (PID_LASTAUTHOR, &props.last_modified_by),
        (PID_REVNUMBER, &props.revision),
    ];
    for (pid, value) in texts {
        if let Some(s) = value {
            values.push((pid, Value::Text(s.clone())));
        }
    }
    if let Some(t) = props.edit_time {
        values.push((PID_EDITTIME, Value::Time(t.max(0) as u64)));
    }
    let times = [
        (PID_LASTPRINTED, &props.last_printed),
        (PID_CREATE_DTM, &props.created),
        (PID_LASTSAVE_DTM, &props.modified),
    ];
    for (pid, value) in times {
        if let Some(dt) = value {
            values.push((pid, Value::Time(datetime_to_filetime(dt))));
        }
    }
    let ints = [
        (PID_PAGECOUNT, props.page_count),
        (PID_WORDCOUNT, props.word_count),
        (PID_CHARCOUNT, props.char_count),
    ];
    for (pid, value) in ints {
        if let Some(n) = value {
            values.push((pid, Value::Int(n)));
        }
    }
    if let Some(s) = &props.application_name {
        values.push((PID_APPNAME, Value::Text(s.clone())));
    }
    if let Some(n) = props.security {
        values.push((PID_SECURITY, Value::Int(n)));
    }
    values
}

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

/// Serialize the BIFF8 properties of `props`; `None` when none is set
pub fn summary_information_stream(props: &DocumentProperties) -> Option<Vec<u8>> {
    let values = collect(props);
    if values.is_empty() {
        return None;
    }
    let ascii = values.iter().all(|(_, v)| match v {
        Value::Text(s) => s.is_ascii(),
        _ => true,
    });
    let codepage = if ascii { CP_WINDOWS_1252 } else { CP_UTF8 };

    let mut bodies: Vec<(u32, Vec<u8>)> = Vec::with_capacity(values.len() + 1);
    let mut cp = Vec::with_capacity(8);
    cp.extend_from_slice(&VT_I2.to_le_bytes());
    cp.extend_from_slice(&[0, 0]);
    cp.extend_from_slice(&codepage.to_le_bytes());
    cp.extend_from_slice(&[0, 0]);
    bodies.push((PID_CODEPAGE, cp));

    for (pid, value) in values {
        let mut body = Vec::new();
        match value {
            Value::Int(n) => {
                body.extend_from_slice(&VT_I4.to_le_bytes());
                body.extend_from_slice(&[0, 0]);
                body.extend_from_slice(&n.to_le_bytes());
            }
            Value::Text(s) => {
                body.extend_from_slice(&VT_LPSTR.to_le_bytes());
                body.extend_from_slice(&[0, 0]);
                let bytes = s.as_bytes();
                body.extend_from_slice(&(bytes.len() as u32 + 1).to_le_bytes());
                body.extend_from_slice(bytes);
                body.push(0);
                pad4(&mut body);
            }
            Value::Time(ft) => {
                body.extend_from_slice(&VT_FILETIME.to_le_bytes());
                body.extend_from_slice(&[0, 0]);
                body.extend_from_slice(&(ft as u32).to_le_bytes());
                body.extend_from_slice(&((ft >> 32) as u32).to_le_bytes());
            }
        }
        bodies.push((pid, body));
    }

    let table_len = 8 + bodies.len() * 8;
    let section_len = table_len + bodies.iter().map(|(_, b)| b.len()).sum::<usize>();

    let mut out = Vec::with_capacity(48 + section_len);
    out.extend_from_slice(&0xFFFEu16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0x0002_0006u32.to_le_bytes()); // Windows, OS version 6
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&FMTID_SUMMARY);
    out.extend_from_slice(&48u32.to_le_bytes());

    out.extend_from_slice(&(section_len as u32).to_le_bytes());
    out.extend_from_slice(&(bodies.len() as u32).to_le_bytes());
    let mut offset = table_len;
    for (pid, body) in &bodies {
        out.extend_from_slice(&pid.to_le_bytes());
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        offset += body.len();
    }
    for (_, body) in bodies {
        out.extend_from_slice(&body);
    }
    Some(out)
}
