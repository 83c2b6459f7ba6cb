use thiserror::Error;

/// Main error type for the Pgfeed system
#[derive(Error, Debug)]
pub enum PgfeedError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("{0}")]
    Decode(#[from] DecodeError),

    #[error("Could not import row: {message}")]
    Append { message: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("line {line}: {cause}: {raw}")]
    Aborted {
        line: u64,
        cause: Box<PgfeedError>,
        raw: String,
    },

    #[error("line {line}: import cancelled")]
    Cancelled { line: u64 },

    /// A store or stream failure that ended the run after streaming began
    #[error("line {line}: {cause}")]
    Terminated { line: u64, cause: Box<PgfeedError> },

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PgfeedError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn append(message: impl Into<String>) -> Self {
        Self::Append { message: message.into() }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store { message: message.into() }
    }

    /// Errors scoped to a single record; the ignore-errors policy may skip these.
    pub fn is_record_level(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Append { .. })
    }

    /// Line number carried by a terminal error, if any.
    pub fn line(&self) -> Option<u64> {
        match self {
            Self::Aborted { line, .. } | Self::Cancelled { line } | Self::Terminated { line, .. } => {
                Some(*line)
            }
            _ => None,
        }
    }
}

/// Reasons a single input record could not be decoded
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("wrong number of fields: expected {expected}, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("Invalid JSON {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("invalid UTF-8 in record")]
    InvalidUtf8,

    #[error("record contains an unquoted line break")]
    SplitRecord,

    #[error("Could not parse record: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PgfeedError>;
