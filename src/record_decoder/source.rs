// Input sources and the passive byte-counting tee used for progress
use crate::error::Result;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Where the raw bytes of an import come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A named file opened read-only
    File(PathBuf),
    /// The standard input stream
    Stdin,
}

impl InputSource {
    /// `-` selects standard input, anything else is a path
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            InputSource::Stdin
        } else {
            InputSource::File(PathBuf::from(arg))
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            InputSource::File(path) => Some(path),
            InputSource::Stdin => None,
        }
    }

    /// Size in bytes when known up front
    pub fn total_bytes(&self) -> Option<u64> {
        match self {
            InputSource::File(path) => std::fs::metadata(path).ok().map(|m| m.len()),
            InputSource::Stdin => None,
        }
    }

    /// Open the source for forward-only reading
    pub fn open(&self) -> Result<CountedInput> {
        let reader: Box<dyn Read + Send> = match self {
            InputSource::File(path) => Box::new(File::open(path)?),
            InputSource::Stdin => Box::new(io::stdin()),
        };
        Ok(CountedInput::new(reader))
    }
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSource::File(path) => write!(f, "{}", path.display()),
            InputSource::Stdin => write!(f, "<stdin>"),
        }
    }
}

/// Shared handle onto the number of bytes read so far
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }
}

/// Reader wrapper that counts bytes without touching them
pub struct CountingReader<R> {
    inner: R,
    counter: ByteCounter,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R, counter: ByteCounter) -> Self {
        Self { inner, counter }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.add(n as u64);
        Ok(n)
    }
}

/// Buffered, byte-counted input stream handed to a decoder
pub struct CountedInput {
    reader: BufReader<CountingReader<Box<dyn Read + Send>>>,
    counter: ByteCounter,
}

impl CountedInput {
    pub fn new(inner: Box<dyn Read + Send>) -> Self {
        let counter = ByteCounter::new();
        let reader = BufReader::new(CountingReader::new(inner, counter.clone()));
        Self { reader, counter }
    }

    /// Wrap any in-memory or test reader
    pub fn from_reader<R: Read + Send + 'static>(inner: R) -> Self {
        Self::new(Box::new(inner))
    }

    pub fn into_parts(self) -> (BufReader<CountingReader<Box<dyn Read + Send>>>, ByteCounter) {
        (self.reader, self.counter)
    }
}
