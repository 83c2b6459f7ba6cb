// JSON record decoders: one document per line, or one document per input
use crate::error::{DecodeError, Result};
use crate::record_decoder::source::{ByteCounter, CountedInput, CountingReader};
use crate::record_decoder::{strip_newline, Decoded, RecordDecoder, DEFAULT_TERMINATOR};
use crate::types::Record;
use serde::de::IgnoredAny;
use std::io::{BufRead, BufReader, Read};
use tracing::debug;

/// Syntactic JSON check without building a value tree
fn validate_document(raw: &[u8]) -> std::result::Result<Record, DecodeError> {
    let text = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)?;
    serde_json::from_str::<IgnoredAny>(text).map_err(DecodeError::InvalidJson)?;
    Ok(Record::Document(text.to_string()))
}

/// Newline-delimited JSON. Lines are read whole regardless of length.
pub struct JsonLinesDecoder {
    reader: BufReader<CountingReader<Box<dyn Read + Send>>>,
    counter: ByteCounter,
    lines: u64,
}

impl JsonLinesDecoder {
    pub fn new(input: CountedInput) -> Self {
        let (reader, counter) = input.into_parts();
        Self {
            reader,
            counter,
            lines: 0,
        }
    }
}

impl RecordDecoder for JsonLinesDecoder {
    fn next_record(&mut self) -> Result<Option<Decoded>> {
        loop {
            let mut raw = Vec::new();
            if self.reader.read_until(b'\n', &mut raw)? == 0 {
                return Ok(None);
            }
            self.lines += 1;
            let terminator = strip_newline(&mut raw).unwrap_or(DEFAULT_TERMINATOR);

            if raw.iter().all(u8::is_ascii_whitespace) {
                debug!(line = self.lines, "Skipping blank line");
                continue;
            }

            let outcome = validate_document(&raw);
            return Ok(Some(Decoded {
                line: self.lines,
                raw,
                terminator,
                outcome,
            }));
        }
    }

    fn bytes_read(&self) -> u64 {
        self.counter.get()
    }

    fn lines_read(&self) -> u64 {
        self.lines
    }
}

/// The whole input is a single JSON document and therefore a single row.
/// This is the one decoder that buffers its entire input.
pub struct JsonDocumentDecoder {
    reader: BufReader<CountingReader<Box<dyn Read + Send>>>,
    counter: ByteCounter,
    lines: u64,
    done: bool,
}

impl JsonDocumentDecoder {
    pub fn new(input: CountedInput) -> Self {
        let (reader, counter) = input.into_parts();
        Self {
            reader,
            counter,
            lines: 0,
            done: false,
        }
    }
}

impl RecordDecoder for JsonDocumentDecoder {
    fn next_record(&mut self) -> Result<Option<Decoded>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut raw = Vec::new();
        self.reader.read_to_end(&mut raw)?;
        self.lines = raw.iter().filter(|b| **b == b'\n').count() as u64;
        if raw.last().is_some_and(|b| *b != b'\n') {
            self.lines += 1;
        }
        let terminator = strip_newline(&mut raw).unwrap_or(DEFAULT_TERMINATOR);

        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let outcome = validate_document(&raw);
        Ok(Some(Decoded {
            line: 1,
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
