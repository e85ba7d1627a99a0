//! Cell records of one worksheet substream
//!
//! [`SheetCells`] walks a worksheet substream record by record and hands
//! out decoded cells in file order, so the in-memory reader and the
//! streaming reader share one decoder. It keeps only its position in the
//! stream; the stream and the globals are passed to every call.

use std::collections::{HashMap, VecDeque};

use hadoopoffice_core::{Cell, CellAddress, CellComment, CellError, CellValue};

use super::Globals;
use crate::biff::payload::Payload;
use crate::biff::ptg::{decode_rgce, shared_anchor, split_formula_record, split_shared_record};
use crate::biff::{records, BiffRecord, RecordIter};
use crate::error::{XlsError, XlsResult};

/// Row, column and cell
pub(crate) type ParsedCell = (u32, u16, Cell);

/// A FORMULA record waiting for the SHRFMLA, ARRAY or STRING record that
/// may follow it
#[derive(Debug)]
struct PendingFormula {
    row: u32,
    col: u16,
    xf: u16,
    cached: Option<CellValue>,
    rgce: Vec<u8>,
    awaiting_string: bool,
}

pub(crate) struct SheetCells {
    pos: usize,
    depth: u32,
    done: bool,
    queue: VecDeque<ParsedCell>,
    pending: Option<PendingFormula>,
    /// Token lists of SHRFMLA and ARRAY records by anchor cell
    shared: HashMap<(u32, u16), Vec<u8>>,
    comments: HashMap<(u32, u16), CellComment>,
}

impl SheetCells {
    /// Start at the BOF of the worksheet substream at `offset`
    pub(crate) fn new(stream: &[u8], offset: usize) -> XlsResult<Self> {
        let comments = read_comments(stream, offset)?;
        Ok(Self {
            pos: offset,
            depth: 0,
            done: false,
            queue: VecDeque::new(),
            pending: None,
            shared: HashMap::new(),
            comments,
        })
    }

    /// Comments of the sheet by cell. NOTE records come after the cell
    /// table, so they are collected up front.
    pub(crate) fn take_comments(&mut self) -> HashMap<(u32, u16), CellComment> {
        std::mem::take(&mut self.comments)
    }

    /// The next cell with a value or formula, `None` at the sheet's EOF
    pub(crate) fn next_cell(
        &mut self,
        stream: &[u8],
        globals: &Globals,
    ) -> XlsResult<Option<ParsedCell>> {
        loop {
            if let Some(cell) = self.queue.pop_front() {
                return Ok(Some(cell));
            }
            if self.done {
                return Ok(self.pending.take().map(|p| self.finish_formula(p, globals)));
            }

            let mut iter = RecordIter::at(stream, self.pos);
            let Some(record) = iter.next().transpose()? else {
                log::warn!("worksheet substream ends without EOF");
                self.done = true;
                continue;
            };

            if let Some(mut pending) = self.pending.take() {
                match record.record_type {
                    records::SHRFMLA | records::ARRAY => {
                        self.pos = iter.position();
                        let is_array = record.record_type == records::ARRAY;
                        let (first_row, _, first_col, _, rgce) =
                            split_shared_record(&mut Payload::of(&record), is_array)?;
                        self.shared.insert((first_row, first_col), rgce.to_vec());
                        self.pending = Some(pending);
                        continue;
                    }
                    records::STRING if pending.awaiting_string => {
                        self.pos = iter.position();
                        pending.cached = Some(CellValue::Text(read_string_record(&record)?));
                        return Ok(Some(self.finish_formula(pending, globals)));
                    }
                    // The record is read again on the next call
                    _ => return Ok(Some(self.finish_formula(pending, globals))),
                }
            }

            self.pos = iter.position();
            self.on_record(&record, globals)?;
        }
    }

    fn on_record(&mut self, record: &BiffRecord, globals: &Globals) -> XlsResult<()> {
        let mut body = Payload::of(record);
        match record.record_type {
            records::BOF => self.depth += 1,
            records::EOF => {
                self.depth = self.depth.saturating_sub(1);
                if self.depth == 0 {
                    self.done = true;
                }
            }
            // Charts embedded in the sheet have their own substream
            _ if self.depth > 1 => {}
            records::LABELSST => {
                let (row, col, xf) = body.cell_header()?;
                let index = body.u32()? as usize;
                let text = globals.sst.get(index).ok_or_else(|| {
                    XlsError::Parse(format!("shared string index {index} out of bounds"))
                })?;
                self.push(globals, row, col, xf, CellValue::Text(text.clone()));
            }
            records::LABEL | records::RSTRING => {
                let (row, col, xf) = body.cell_header()?;
                let text = body.unicode_string()?;
                self.push(globals, row, col, xf, CellValue::Text(text));
            }
            records::NUMBER => {
                let (row, col, xf) = body.cell_header()?;
                let value = body.f64()?;
                self.push(globals, row, col, xf, CellValue::Number(value));
            }
            records::RK => {
                let (row, col, xf) = body.cell_header()?;
                let value = body.rk()?;
                self.push(globals, row, col, xf, CellValue::Number(value));
            }
            // row(2) + first_col(2) + [xf(2) + rk(4)]* + last_col(2)
            records::MULRK => {
                let row = u32::from(body.u16()?);
                let mut col = body.u16()?;
                if body.remaining() < 2 {
                    return Err(body.truncated(2));
                }
                while body.remaining() >= 8 {
                    let xf = body.u16()?;
                    let value = body.rk()?;
                    self.push(globals, row, col, xf, CellValue::Number(value));
                    col = col.saturating_add(1);
                }
            }
            records::BOOLERR => {
                let (row, col, xf) = body.cell_header()?;
                let value = body.u8()?;
                let is_error = body.u8()? != 0;
                let value = if is_error {
                    CellValue::Error(CellError::from_code(value))
                } else {
                    CellValue::Boolean(value != 0)
                };
                self.push(globals, row, col, xf, value);
            }
            records::FORMULA => {
                let (row, col, xf, result, rgce) = split_formula_record(&mut body)?;
                let (cached, awaiting_string) = cached_result(result);
                self.pending = Some(PendingFormula {
                    row,
                    col,
                    xf,
                    cached,
                    rgce: rgce.to_vec(),
                    awaiting_string,
                });
            }
            // BLANK and MULBLANK only carry formatting
            _ => {}
        }
        Ok(())
    }

    fn push(&mut self, globals: &Globals, row: u32, col: u16, xf: u16, value: CellValue) {
        let format = globals.styles.number_format(xf);
        self.queue.push_back((row, col, Cell::with_format(value, format)));
    }

    /// Formula cells whose tokens cannot be decoded keep their cached value
    fn finish_formula(&self, pending: PendingFormula, globals: &Globals) -> ParsedCell {
        let format = globals.styles.number_format(pending.xf);
        let value = match self.formula_text(&pending, globals) {
            Ok(text) => CellValue::Formula {
                text,
                cached: pending.cached.map(Box::new),
            },
            Err(e) => {
                log::warn!(
                    "formula in {} not decoded, using its cached value: {e}",
                    CellAddress::new(pending.row, pending.col)
                );
                pending.cached.unwrap_or(CellValue::Empty)
            }
        };
        (pending.row, pending.col, Cell::with_format(value, format))
    }

    fn formula_text(&self, pending: &PendingFormula, globals: &Globals) -> XlsResult<String> {
        let ctx = globals.decode_context(pending.row, pending.col);
        let expr = match shared_anchor(&pending.rgce) {
            Some(anchor) => {
                let rgce = self.shared.get(&anchor).ok_or_else(|| {
                    XlsError::Formula(format!(
                        "no shared formula anchored at {}",
                        CellAddress::new(anchor.0, anchor.1)
                    ))
                })?;
                decode_rgce(rgce, &ctx)?
            }
            None => decode_rgce(&pending.rgce, &ctx)?,
        };
        Ok(expr.to_string())
    }
}

/// The 8-byte result of a FORMULA record. Bytes 6-7 set to 0xFFFF mark a
/// non-numeric result whose type is in byte 0. A string result follows in
/// a STRING record; type 3 is an empty result.
fn cached_result(bytes: [u8; 8]) -> (Option<CellValue>, bool) {
    if bytes[6] != 0xFF || bytes[7] != 0xFF {
        return (Some(CellValue::Number(f64::from_le_bytes(bytes))), false);
    }
    match bytes[0] {
        0x00 => (None, true),
        0x01 => (Some(CellValue::Boolean(bytes[2] != 0)), false),
        0x02 => (Some(CellValue::Error(CellError::from_code(bytes[2]))), false),
        _ => (None, false),
    }
}

/// STRING: cch(2) + flags(1) + characters, possibly continued
fn read_string_record(record: &BiffRecord) -> XlsResult<String> {
    let mut body = Payload::of(record);
    let count = usize::from(body.u16()?);
    let flags = body.u8()?;
    body.continued_characters(count, flags & 0x01 != 0)
}

/// ftCmo sub-record of an OBJ: ft(2) cb(2) ot(2) id(2). Object type 0x19
/// is a comment.
fn comment_object_id(record: &BiffRecord) -> Option<u16> {
    let mut body = Payload::of(record);
    let ft = body.u16().ok()?;
    body.skip(2).ok()?;
    let ot = body.u16().ok()?;
    let id = body.u16().ok()?;
    (ft == 0x0015 && ot == 0x0019).then_some(id)
}

/// TXO: an 18-byte header with the character count at offset 10. The
/// text starts in the first CONTINUE record.
fn txo_text(record: &BiffRecord) -> XlsResult<String> {
    let mut body = Payload::of(record);
    let count = usize::from(body.seek(10).u16()?);
    if count == 0 {
        return Ok(String::new());
    }
    let Some(&start) = body.continues().first() else {
        return Err(XlsError::Parse("TXO record without text".into()));
    };
    body.seek(start).continued_characters(count, false)
}

fn read_comments(stream: &[u8], offset: usize) -> XlsResult<HashMap<(u32, u16), CellComment>> {
    let mut texts: HashMap<u16, String> = HashMap::new();
    let mut notes: Vec<(u32, u16, u16, String)> = Vec::new();
    let mut last_object = None;
    let mut depth = 0u32;
    for record in RecordIter::at(stream, offset) {
        let record = record?;
        match record.record_type {
            records::BOF => depth += 1,
            records::EOF => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
            _ if depth > 1 => {}
            records::OBJ => last_object = comment_object_id(&record),
            records::TXO => {
                if let Some(id) = last_object.take() {
                    texts.insert(id, txo_text(&record)?);
                }
            }
            // row(2) + col(2) + grbit(2) + idObj(2) + author
            records::NOTE => {
                let mut body = Payload::of(&record);
                let row = u32::from(body.u16()?);
                let col = body.u16()?;
                body.skip(2)?;
                let id = body.u16()?;
                let author = body.unicode_string()?;
                notes.push((row, col, id, author));
            }
            _ => {}
        }
    }

    let mut comments = HashMap::with_capacity(notes.len());
    for (row, col, id, author) in notes {
        let text = texts.remove(&id).unwrap_or_else(|| {
            log::debug!("comment object {id} has no text");
            String::new()
        });
        comments.insert((row, col), CellComment::new(author, text));
    }
    Ok(comments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biff::links::LinkTable;
    use crate::biff::{bof, push_record, push_record_parts};
    use crate::styles::StyleTable;

    fn globals(sst: Vec<String>) -> Globals {
        Globals {
            sheets: Vec::new(),
            sheet_names: vec!["Sheet1".into()],
            sst,
            styles: StyleTable::new(),
            links: LinkTable::new(),
            names: Vec::new(),
            date_1904: false,
        }
    }

    fn header(row: u16, col: u16) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&row.to_le_bytes());
        data.extend_from_slice(&col.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data
    }

    fn formula(row: u16, col: u16, result: [u8; 8], rgce: &[u8]) -> Vec<u8> {
        let mut data = header(row, col);
        data.extend_from_slice(&result);
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&(rgce.len() as u16).to_le_bytes());
        data.extend_from_slice(rgce);
        data
    }

    fn cells(stream: &[u8], globals: &Globals) -> Vec<(u32, u16, CellValue)> {
        let mut reader = SheetCells::new(stream, 0).unwrap();
        let mut out = Vec::new();
        while let Some((row, col, cell)) = reader.next_cell(stream, globals).unwrap() {
            out.push((row, col, cell.value));
        }
        out
    }

    #[test]
    fn test_value_records() {
        let mut stream = Vec::new();
        push_record(&mut stream, records::BOF, &bof(records::BOF_WORKSHEET));
        let mut data = header(0, 0);
        data.extend_from_slice(&0u32.to_le_bytes());
        push_record(&mut stream, records::LABELSST, &data);
        let mut data = header(0, 1);
        data.extend_from_slice(&1.5f64.to_le_bytes());
        push_record(&mut stream, records::NUMBER, &data);
        let mut data = header(1, 0);
        data.extend_from_slice(&[1, 0]);
        push_record(&mut stream, records::BOOLERR, &data);
        let mut data = header(1, 1);
        data.extend_from_slice(&[0x07, 1]);
        push_record(&mut stream, records::BOOLERR, &data);
        push_record(&mut stream, records::BLANK, &header(1, 2));
        push_record(&mut stream, records::EOF, &[]);

        let globals = globals(vec!["test1".into()]);
        assert_eq!(
            cells(&stream, &globals),
            vec![
                (0, 0, CellValue::text("test1")),
                (0, 1, CellValue::Number(1.5)),
                (1, 0, CellValue::Boolean(true)),
                (1, 1, CellValue::Error(CellError::Div0)),
            ]
        );
    }

    #[test]
    fn test_formula_with_string_result() {
        // ="a"&"b"
        let rgce = [0x17, 1, 0, b'a', 0x17, 1, 0, b'b', 0x08];
        let mut stream = Vec::new();
        push_record(&mut stream, records::BOF, &bof(records::BOF_WORKSHEET));
        push_record(
            &mut stream,
            records::FORMULA,
            &formula(0, 0, [0, 0, 0, 0, 0, 0, 0xFF, 0xFF], &rgce),
        );
        push_record(&mut stream, records::STRING, &[2, 0, 0, b'a', b'b']);
        let mut data = header(0, 1);
        data.extend_from_slice(&2.0f64.to_le_bytes());
        push_record(&mut stream, records::NUMBER, &data);
        push_record(&mut stream, records::EOF, &[]);

        assert_eq!(
            cells(&stream, &globals(Vec::new())),
            vec![
                (0, 0, CellValue::formula_with_cached("\"a\"&\"b\"", CellValue::text("ab"))),
                (0, 1, CellValue::Number(2.0)),
            ]
        );
    }

    #[test]
    fn test_undecodable_formula_keeps_cached_value() {
        // PtgMissArg is not supported on its own
        let mut stream = Vec::new();
        push_record(&mut stream, records::BOF, &bof(records::BOF_WORKSHEET));
        push_record(
            &mut stream,
            records::FORMULA,
            &formula(0, 0, 7.0f64.to_le_bytes(), &[0x16]),
        );
        push_record(&mut stream, records::EOF, &[]);

        assert_eq!(cells(&stream, &globals(Vec::new())), vec![(0, 0, CellValue::Number(7.0))]);
    }

    #[test]
    fn test_comments_are_collected() {
        let mut stream = Vec::new();
        push_record(&mut stream, records::BOF, &bof(records::BOF_WORKSHEET));
        let mut obj = Vec::new();
        for v in [0x0015u16, 0x0012, 0x0019, 1] {
            obj.extend_from_slice(&v.to_le_bytes());
        }
        obj.resize(22, 0);
        push_record(&mut stream, records::OBJ, &obj);
        let mut txo = vec![0u8; 18];
        txo[10] = 4;
        push_record_parts(
            &mut stream,
            records::TXO,
            &[txo, vec![0, b'n', b'o', b't', b'e'], vec![0; 16]],
        );
        let mut note = header(2, 3);
        note.extend_from_slice(&1u16.to_le_bytes());
        note.extend_from_slice(&[3, 0, 0, b'b', b'o', b'b', 0]);
        push_record(&mut stream, records::NOTE, &note);
        push_record(&mut stream, records::EOF, &[]);

        let mut reader = SheetCells::new(&stream, 0).unwrap();
        let comments = reader.take_comments();
        assert_eq!(comments.get(&(2, 3)), Some(&CellComment::new("bob", "note")));
    }
}
