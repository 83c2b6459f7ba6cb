// PostgreSQL COPY text format encoding
use bytes::{BufMut, Bytes, BytesMut};

/// Encode one row as a COPY text-format line: tab separated, `\N` for NULL,
/// backslash escapes for characters that would break the framing.
pub fn encode_text_row(values: &[Option<&str>]) -> Bytes {
    let capacity = values.iter().map(|v| v.map_or(2, str::len) + 1).sum();
    let mut buf = BytesMut::with_capacity(capacity);

    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            buf.put_u8(b'\t');
        }
        match value {
            None => buf.put_slice(b"\\N"),
            Some(text) => escape_into(text, &mut buf),
        }
    }
    buf.put_u8(b'\n');
    buf.freeze()
}

fn escape_into(text: &str, buf: &mut BytesMut) {
    for &b in text.as_bytes() {
        match b {
            b'\\' => buf.put_slice(b"\\\\"),
            b'\t' => buf.put_slice(b"\\t"),
            b'\n' => buf.put_slice(b"\\n"),
            b'\r' => buf.put_slice(b"\\r"),
            _ => buf.put_u8(b),
        }
    }
}
