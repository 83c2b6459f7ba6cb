// Record decoder module: lazy, forward-only record streams over byte input
pub mod delimited;
pub mod json;
pub mod source;

#[cfg(test)]
mod tests;

pub use delimited::{DelimitedDecoder, DelimitedOptions, HeaderSource};
pub use json::{JsonDocumentDecoder, JsonLinesDecoder};
pub use source::{ByteCounter, CountedInput, CountingReader, InputSource};

use crate::error::{DecodeError, Result};
use crate::types::Record;

/// One attempted record together with its position in the input
#[derive(Debug)]
pub struct Decoded {
    /// 1-based physical line on which the record starts
    pub line: u64,
    /// Raw bytes of the record, without the final line terminator
    pub raw: Vec<u8>,
    /// The terminator that ended the record in the input, `\n` at end of input
    pub terminator: &'static [u8],
    /// The decoded record, or why it could not be decoded
    pub outcome: std::result::Result<Record, DecodeError>,
}

/// A lazy, finite, non-restartable sequence of records.
///
/// `Ok(None)` marks the end of input. `Err` is reserved for failures of the
/// underlying stream itself; malformed records come back as a [`Decoded`]
/// with an `Err` outcome.
pub trait RecordDecoder {
    fn next_record(&mut self) -> Result<Option<Decoded>>;

    /// Bytes pulled from the input so far
    fn bytes_read(&self) -> u64;

    /// Physical lines consumed so far, including any header
    fn lines_read(&self) -> u64;
}

/// Terminator echoed for a final record that had none
pub(crate) const DEFAULT_TERMINATOR: &[u8] = b"\n";

/// Strip a trailing `\n` or `\r\n` and return what was removed
pub(crate) fn strip_newline(buf: &mut Vec<u8>) -> Option<&'static [u8]> {
    if buf.last() != Some(&b'\n') {
        return None;
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
        Some(b"\r\n")
    } else {
        Some(b"\n")
    }
}
