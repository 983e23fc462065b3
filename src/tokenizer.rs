//! Byte-level CSV tokenizer.
//!
//! Records are produced one at a time from a fixed read-ahead buffer. Field
//! bytes are gathered into a per-record scratch buffer, so a field may span
//! any number of refills (quoted newlines included). Comment and blank lines
//! are dropped here, before the assembler ever sees them.

use crate::errors::{CsvFlowError, CsvFlowResult, Position};
use crate::options::{Encoding, IngestOptions};
use std::io::{self, Read};

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub comment: Option<u8>,
    pub strip_bom: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            comment: Some(b'#'),
            strip_bom: true,
        }
    }
}

impl From<&IngestOptions> for Dialect {
    fn from(opts: &IngestOptions) -> Self {
        Self {
            delimiter: opts.delimiter,
            quote: opts.quote,
            comment: opts.comment,
            strip_bom: opts.encoding == Encoding::Utf8,
        }
    }
}

/// A view of one field's bytes, with quotes and escapes already removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    bytes: &'a [u8],
    quoted: bool,
}

impl<'a> Field<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn is_quoted(&self) -> bool {
        self.quoted
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldBound {
    end: usize,
    quoted: bool,
}

/// The fields of the current record. Borrowed from the tokenizer and
/// invalidated by the next call to [`Tokenizer::next_record`].
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    data: &'a [u8],
    bounds: &'a [FieldBound],
    position: Position,
}

impl<'a> RawRecord<'a> {
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn get(&self, idx: usize) -> Option<Field<'a>> {
        let bound = self.bounds.get(idx)?;
        let start = if idx == 0 { 0 } else { self.bounds[idx - 1].end };
        Some(Field {
            bytes: &self.data[start..bound.end],
            quoted: bound.quoted,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Field<'a>> + 'a {
        let record = *self;
        (0..record.len()).filter_map(move |i| record.get(i))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    RecordStart,
    /// Only spaces/tabs seen so far on this line; a comment byte here still
    /// makes it a comment line.
    LeadingSpace,
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
    Comment,
}

pub struct Tokenizer<R> {
    reader: R,
    dialect: Dialect,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
    eof: bool,
    bom_checked: bool,
    // offset of buf[pos] in the decompressed stream
    offset: u64,
    line: u64,
    records: u64,
    comment_lines: u64,
    data: Vec<u8>,
    bounds: Vec<FieldBound>,
    field_quoted: bool,
    start: Position,
}

impl<R: Read> Tokenizer<R> {
    pub fn new(reader: R, dialect: Dialect, buffer_size: usize) -> Self {
        Self {
            reader,
            dialect,
            // room for a whole byte-order mark
            buf: vec![0u8; buffer_size.max(UTF8_BOM.len())].into_boxed_slice(),
            pos: 0,
            len: 0,
            eof: false,
            bom_checked: false,
            offset: 0,
            line: 1,
            records: 0,
            comment_lines: 0,
            data: Vec::new(),
            bounds: Vec::new(),
            field_quoted: false,
            start: Position::default(),
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Records produced so far, header included.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn comment_lines(&self) -> u64 {
        self.comment_lines
    }

    /// Bytes consumed from the stream by the tokenizer.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Advance to the next record. The returned view is valid until the
    /// next call.
    pub fn next_record(&mut self) -> CsvFlowResult<Option<RawRecord<'_>>> {
        if self.read_record()? {
            Ok(Some(self.record()))
        } else {
            Ok(None)
        }
    }

    /// The record most recently read by [`Tokenizer::read_record`].
    pub fn record(&self) -> RawRecord<'_> {
        RawRecord {
            data: &self.data,
            bounds: &self.bounds,
            position: self.start,
        }
    }

    /// Read the next record into the scratch buffer. `false` at end of
    /// input.
    pub fn read_record(&mut self) -> CsvFlowResult<bool> {
        if !self.bom_checked {
            self.skip_bom()?;
        }
        self.data.clear();
        self.bounds.clear();
        self.field_quoted = false;

        let Dialect {
            delimiter,
            quote,
            comment,
            ..
        } = self.dialect;
        let mut state = State::RecordStart;

        loop {
            if self.pos == self.len && !self.fill()? {
                return self.finish(state);
            }

            match state {
                State::Unquoted => {
                    let run = self.buf[self.pos..self.len]
                        .iter()
                        .position(|&b| b == delimiter || b == b'\n' || b == b'\r')
                        .unwrap_or(self.len - self.pos);
                    self.data
                        .extend_from_slice(&self.buf[self.pos..self.pos + run]);
                    self.advance(run);
                    if self.pos == self.len {
                        continue;
                    }
                    let byte = self.bump();
                    if byte == delimiter {
                        self.end_field();
                        state = State::FieldStart;
                    } else {
                        self.newline(byte);
                        self.end_record();
                        return Ok(true);
                    }
                }
                State::Quoted => {
                    let run = self.buf[self.pos..self.len]
                        .iter()
                        .position(|&b| b == quote || b == b'\n')
                        .unwrap_or(self.len - self.pos);
                    self.data
                        .extend_from_slice(&self.buf[self.pos..self.pos + run]);
                    self.advance(run);
                    if self.pos == self.len {
                        continue;
                    }
                    let byte = self.bump();
                    if byte == quote {
                        state = State::QuoteInQuoted;
                    } else {
                        self.line += 1;
                        self.data.push(byte);
                    }
                }
                State::Comment => {
                    let run = self.buf[self.pos..self.len]
                        .iter()
                        .position(|&b| b == b'\n' || b == b'\r')
                        .unwrap_or(self.len - self.pos);
                    self.advance(run);
                    if self.pos == self.len {
                        continue;
                    }
                    let byte = self.bump();
                    self.newline(byte);
                    self.comment_lines += 1;
                    state = State::RecordStart;
                }
                State::RecordStart => {
                    self.start = Position {
                        byte_offset: self.offset,
                        line: self.line,
                        record: self.records + 1,
                    };
                    let byte = self.bump();
                    if is_terminator(byte) {
                        self.newline(byte);
                    } else if byte == delimiter {
                        self.end_field();
                        state = State::FieldStart;
                    } else if Some(byte) == comment {
                        state = State::Comment;
                    } else if byte == quote {
                        self.field_quoted = true;
                        state = State::Quoted;
                    } else if is_blank(byte) {
                        self.data.push(byte);
                        state = State::LeadingSpace;
                    } else {
                        self.data.push(byte);
                        state = State::Unquoted;
                    }
                }
                State::LeadingSpace => {
                    let byte = self.bump();
                    if is_terminator(byte) {
                        // whitespace-only line
                        self.newline(byte);
                        self.data.clear();
                        state = State::RecordStart;
                    } else if byte == delimiter {
                        self.end_field();
                        state = State::FieldStart;
                    } else if Some(byte) == comment {
                        self.data.clear();
                        state = State::Comment;
                    } else {
                        self.data.push(byte);
                        if !is_blank(byte) {
                            state = State::Unquoted;
                        }
                    }
                }
                State::FieldStart => {
                    let byte = self.bump();
                    if byte == delimiter {
                        self.end_field();
                    } else if is_terminator(byte) {
                        self.newline(byte);
                        self.end_record();
                        return Ok(true);
                    } else if byte == quote {
                        self.field_quoted = true;
                        state = State::Quoted;
                    } else {
                        self.data.push(byte);
                        state = State::Unquoted;
                    }
                }
                State::QuoteInQuoted => {
                    let byte = self.bump();
                    if byte == quote {
                        self.data.push(byte);
                        state = State::Quoted;
                    } else if byte == delimiter {
                        self.end_field();
                        state = State::FieldStart;
                    } else if is_terminator(byte) {
                        self.newline(byte);
                        self.end_record();
                        return Ok(true);
                    } else {
                        self.data.push(byte);
                        state = State::Unquoted;
                    }
                }
            }
        }
    }

    fn finish(&mut self, state: State) -> CsvFlowResult<bool> {
        match state {
            State::RecordStart | State::LeadingSpace => {
                self.data.clear();
                Ok(false)
            }
            State::Comment => {
                self.comment_lines += 1;
                Ok(false)
            }
            State::FieldStart | State::Unquoted | State::QuoteInQuoted => {
                self.end_record();
                Ok(true)
            }
            State::Quoted => {
                self.records += 1;
                Err(CsvFlowError::MalformedRow {
                    position: self.start,
                    reason: "unterminated quoted field at end of input".to_string(),
                })
            }
        }
    }

    fn fill(&mut self) -> CsvFlowResult<bool> {
        if self.pos < self.len {
            return Ok(true);
        }
        self.pos = 0;
        self.len = 0;
        Ok(self.read_more()? > 0)
    }

    /// Append the next read to `buf[len..]`. Returns 0 at end of input.
    fn read_more(&mut self) -> CsvFlowResult<usize> {
        if self.eof {
            return Ok(0);
        }
        loop {
            match self.reader.read(&mut self.buf[self.len..]) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(0);
                }
                Ok(n) => {
                    self.len += n;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(CsvFlowError::Io {
                        position: Position {
                            byte_offset: self.offset,
                            line: self.line,
                            record: self.records + 1,
                        },
                        source,
                    })
                }
            }
        }
    }

    // Runs before anything is consumed, so buf[..len] is the stream prefix.
    // Short reads can split the mark; top up until it can be compared.
    fn skip_bom(&mut self) -> CsvFlowResult<()> {
        self.bom_checked = true;
        if !self.dialect.strip_bom {
            return Ok(());
        }
        while self.len < UTF8_BOM.len() && self.read_more()? > 0 {}
        if self.buf[..self.len].starts_with(&UTF8_BOM) {
            self.advance(UTF8_BOM.len());
        }
        Ok(())
    }

    fn bump(&mut self) -> u8 {
        let byte = self.buf[self.pos];
        self.advance(1);
        byte
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
        self.offset += n as u64;
    }

    fn newline(&mut self, byte: u8) {
        if byte == b'\n' {
            self.line += 1;
        }
    }

    fn end_field(&mut self) {
        self.bounds.push(FieldBound {
            end: self.data.len(),
            quoted: self.field_quoted,
        });
        self.field_quoted = false;
    }

    fn end_record(&mut self) {
        self.end_field();
        self.records += 1;
    }
}

fn is_terminator(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

fn is_blank(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}
