// Delimited (CSV-like) record decoder
use crate::error::{DecodeError, PgfeedError, Result};
use crate::record_decoder::source::{ByteCounter, CountedInput, CountingReader};
use crate::record_decoder::{strip_newline, Decoded, RecordDecoder, DEFAULT_TERMINATOR};
use crate::types::{LineTerminator, Record};
use csv::{ByteRecord, ReaderBuilder, Terminator};
use std::io::{BufRead, BufReader, Read};
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Options controlling how delimited input is tokenized
#[derive(Debug, Clone)]
pub struct DelimitedOptions {
    /// Single-byte field separator
    pub delimiter: u8,
    /// Record terminator
    pub line_terminator: LineTerminator,
    /// Field value imported as SQL NULL
    pub null_value: Option<String>,
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            line_terminator: LineTerminator::Newline,
            null_value: None,
        }
    }
}

/// Raw header access used by the schema deriver before iteration starts
pub trait HeaderSource {
    /// Read the next record as unvalidated header fields; `None` on empty input
    fn read_header_fields(&mut self) -> Result<Option<Vec<String>>>;

    /// Consume and discard exactly one physical line; false at end of input
    fn skip_line(&mut self) -> Result<bool>;

    /// Active field delimiter
    fn delimiter(&self) -> u8;
}

/// Decodes delimited records, one logical record per call
pub struct DelimitedDecoder {
    reader: BufReader<CountingReader<Box<dyn Read + Send>>>,
    counter: ByteCounter,
    options: DelimitedOptions,
    expected_fields: Option<usize>,
    lines: u64,
    started: bool,
}

impl DelimitedDecoder {
    pub fn new(input: CountedInput, options: DelimitedOptions) -> Self {
        let (reader, counter) = input.into_parts();
        Self {
            reader,
            counter,
            options,
            expected_fields: None,
            lines: 0,
            started: false,
        }
    }

    /// Fix the field count every record must have
    pub fn set_expected_fields(&mut self, expected: usize) {
        self.expected_fields = Some(expected);
    }

    /// Read one physical line including its terminator
    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<bool> {
        let n = self
            .reader
            .read_until(self.options.line_terminator.byte(), buf)?;
        if n == 0 {
            return Ok(false);
        }
        self.lines += 1;
        if !self.started {
            self.started = true;
            if buf.starts_with(UTF8_BOM) {
                buf.drain(..UTF8_BOM.len());
            }
        }
        Ok(true)
    }

    /// Read the next non-blank logical record: physical lines are joined while
    /// a quoted field is still open. Returns the start line, the raw bytes and
    /// the terminator that ended the record.
    fn read_raw_record(&mut self) -> Result<Option<(u64, Vec<u8>, &'static [u8])>> {
        let terminator = self.options.line_terminator.byte();
        loop {
            let start = self.lines + 1;
            let mut raw = Vec::new();
            while self.read_line(&mut raw)? {
                if !has_open_quote(&raw, self.options.delimiter, terminator) {
                    break;
                }
            }
            if raw.is_empty() {
                return Ok(None);
            }
            let ending = self.strip_terminator(&mut raw);
            if raw.is_empty() {
                debug!(line = start, "Skipping blank line");
                continue;
            }
            return Ok(Some((start, raw, ending)));
        }
    }

    fn strip_terminator(&self, raw: &mut Vec<u8>) -> &'static [u8] {
        match self.options.line_terminator {
            LineTerminator::Newline => strip_newline(raw).unwrap_or(DEFAULT_TERMINATOR),
            LineTerminator::CarriageReturn => {
                if raw.last() == Some(&b'\r') {
                    raw.pop();
                    b"\r"
                } else {
                    DEFAULT_TERMINATOR
                }
            }
        }
    }

    /// Split one raw record into fields with lenient quoting. The whole buffer
    /// must parse as exactly one record.
    fn tokenize(&self, raw: &[u8]) -> std::result::Result<ByteRecord, DecodeError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.options.delimiter)
            .terminator(Terminator::Any(self.options.line_terminator.byte()))
            .from_reader(raw);
        let mut record = ByteRecord::new();
        if !reader.read_byte_record(&mut record)? {
            record.push_field(b"");
        }
        let mut rest = ByteRecord::new();
        if reader.read_byte_record(&mut rest)? {
            return Err(DecodeError::SplitRecord);
        }
        Ok(record)
    }

    fn decode_fields(&self, raw: &[u8]) -> std::result::Result<Record, DecodeError> {
        let record = self.tokenize(raw)?;

        if let Some(expected) = self.expected_fields {
            if record.len() != expected {
                return Err(DecodeError::FieldCount {
                    expected,
                    found: record.len(),
                });
            }
        }

        let mut fields = Vec::with_capacity(record.len());
        for field in record.iter() {
            let cleaned: Vec<u8> = field.iter().copied().filter(|b| *b != 0).collect();
            let text = String::from_utf8(cleaned).map_err(|_| DecodeError::InvalidUtf8)?;
            if self.options.null_value.as_deref() == Some(text.as_str()) {
                fields.push(None);
            } else {
                fields.push(Some(text));
            }
        }
        Ok(Record::Fields(fields))
    }
}

impl HeaderSource for DelimitedDecoder {
    fn read_header_fields(&mut self) -> Result<Option<Vec<String>>> {
        let Some((line, raw, _)) = self.read_raw_record()? else {
            return Ok(None);
        };
        let record = self.tokenize(&raw).map_err(|e| {
            PgfeedError::configuration(format!("Could not read header row on line {}: {}", line, e))
        })?;
        let mut fields = Vec::with_capacity(record.len());
        for field in record.iter() {
            let text = std::str::from_utf8(field).map_err(|_| {
                PgfeedError::configuration(format!("Header row on line {} is not valid UTF-8", line))
            })?;
            fields.push(text.to_string());
        }
        Ok(Some(fields))
    }

    fn skip_line(&mut self) -> Result<bool> {
        let mut discarded = Vec::new();
        self.read_line(&mut discarded)
    }

    fn delimiter(&self) -> u8 {
        self.options.delimiter
    }
}

impl RecordDecoder for DelimitedDecoder {
    fn next_record(&mut self) -> Result<Option<Decoded>> {
        let Some((line, raw, terminator)) = self.read_raw_record()? else {
            return Ok(None);
        };
        let outcome = self.decode_fields(&raw);
        Ok(Some(Decoded {
            line,
            raw,
            terminator,
            outcome,
        }))
    }

    fn bytes_read(&self) -> u64 {
        self.counter.get()
    }

    fn lines_read(&self) -> u64 {
        self.lines
    }
}

/// Whether a quoted field is still open at the end of `raw`.
///
/// A quote only opens a field when it is the first byte of that field, so
/// stray quotes inside unquoted fields are taken literally. Only the record
/// terminator starts a new field, matching the csv reader's `Terminator`.
fn has_open_quote(raw: &[u8], delimiter: u8, terminator: u8) -> bool {
    let mut in_quotes = false;
    let mut field_start = true;
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        if in_quotes {
            if b == b'"' {
                if raw.get(i + 1) == Some(&b'"') {
                    i += 1;
                } else {
                    in_quotes = false;
                }
            }
        } else if b == b'"' && field_start {
            in_quotes = true;
        }
        field_start = !in_quotes && (b == delimiter || b == terminator);
        i += 1;
    }
    in_quotes
}
