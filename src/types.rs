use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage type declared for every column of an import run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Unlimited text
    Text,
    /// JSON stored verbatim
    Json,
    /// JSON Binary
    Jsonb,
}

impl ColumnType {
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Json => "JSON",
            ColumnType::Jsonb => "JSONB",
        }
    }
}

/// A named slot in the target relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// 0-based position in the relation
    pub position: usize,
    /// Normalized, store-safe identifier
    pub name: String,
    /// Declared storage type
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(position: usize, name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            position,
            name: name.into(),
            column_type,
        }
    }
}

/// Fully qualified destination relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Quoted form for use in SQL statements
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Double-quote an identifier, escaping embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// One decoded unit of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Delimited fields aligned with the column list; `None` is SQL NULL
    Fields(Vec<Option<String>>),
    /// A single JSON document stored as one field
    Document(String),
}

impl Record {
    pub(crate) fn len(&self) -> usize {
        match self {
            Record::Fields(fields) => fields.len(),
            Record::Document(_) => 1,
        }
    }

    /// Field values in column order
    pub fn values(&self) -> Vec<Option<&str>> {
        match self {
            Record::Fields(fields) => fields.iter().map(|f| f.as_deref()).collect(),
            Record::Document(doc) => vec![Some(doc.as_str())],
        }
    }
}

/// Supported input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Delimited records, one per line
    Delimited,
    /// One JSON document per line
    JsonLines,
    /// The whole input is a single JSON document
    JsonDocument,
}

/// Record terminator for delimited input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineTerminator {
    /// `\n`, with a preceding `\r` tolerated
    #[default]
    Newline,
    /// Bare `\r`, as written by legacy spreadsheet exports
    CarriageReturn,
}

impl LineTerminator {
    pub fn byte(&self) -> u8 {
        match self {
            LineTerminator::Newline => b'\n',
            LineTerminator::CarriageReturn => b'\r',
        }
    }
}

/// Configuration consumed by the import engine
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Destination relation
    pub destination: TableRef,
    /// Input format, chosen once per run
    pub format: InputFormat,
    /// Field delimiter for delimited input
    pub delimiter: u8,
    /// Comma-separated explicit column names
    pub fields: Option<String>,
    /// Discard the first line when explicit fields are given
    pub skip_header: bool,
    /// Skip malformed records instead of aborting
    pub ignore_errors: bool,
    /// Record terminator for delimited input
    pub line_terminator: LineTerminator,
    /// Column type used in JSON modes
    pub json_type: ColumnType,
    /// Column name used in JSON modes
    pub json_column: String,
    /// Field value imported as SQL NULL (delimited input only)
    pub null_value: Option<String>,
}

impl ImportConfig {
    pub fn new(destination: TableRef, format: InputFormat) -> Self {
        Self {
            destination,
            format,
            delimiter: b',',
            fields: None,
            skip_header: false,
            ignore_errors: false,
            line_terminator: LineTerminator::Newline,
            json_type: ColumnType::Json,
            json_column: "data".to_string(),
            null_value: None,
        }
    }
}

/// Final tally of an import run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Records appended and committed
    pub accepted: u64,
    /// Records skipped under the ignore-errors policy
    pub rejected: u64,
    /// Fully qualified destination name
    pub destination: String,
}

impl ImportReport {
    /// Human-readable summary lines
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "{} rows imported into {}",
            self.accepted, self.destination
        )];
        if self.rejected > 0 {
            lines.push(format!(
                "{} rows could not be imported into {} and have been written to stderr",
                self.rejected, self.destination
            ));
        }
        lines
    }

    pub fn summary(&self) -> String {
        self.summary_lines().join("\n")
    }
}
