// Schema derivation: turns a header row or explicit field list into columns
use crate::error::{PgfeedError, Result};
use crate::record_decoder::HeaderSource;
use crate::schema_deriver::normalizer::normalize;
use crate::types::{Column, ColumnType, ImportConfig};
use std::collections::HashSet;
use tracing::{debug, info};

/// Characters that signal a header was split with the wrong delimiter
const CONFUSABLE_DELIMITERS: &[char] = &[',', ';', '|', '\t', '^', '~'];

/// Derives the ordered column list for an import run
pub struct SchemaDeriver<'a> {
    config: &'a ImportConfig,
}

impl<'a> SchemaDeriver<'a> {
    pub fn new(config: &'a ImportConfig) -> Self {
        Self { config }
    }

    /// Columns for delimited input. Consumes the header line from `source`
    /// when one is present, so this must run once before iteration starts.
    pub fn derive_delimited<H: HeaderSource>(&self, source: &mut H) -> Result<Vec<Column>> {
        let names = match &self.config.fields {
            Some(fields) => {
                if self.config.skip_header {
                    debug!("Discarding header line in favour of explicit fields");
                    source.skip_line()?;
                }
                fields.split(',').map(str::to_string).collect::<Vec<_>>()
            }
            None => {
                let header = source.read_header_fields()?.ok_or_else(|| {
                    PgfeedError::configuration("Could not read header row: input is empty")
                })?;
                validate_header(&header, source.delimiter())?;
                header
            }
        };

        let columns = build_columns(&names, ColumnType::Text);
        info!(
            columns = columns.len(),
            "Derived columns: {}",
            columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(columns)
    }

    /// Single document column for JSON input
    pub fn derive_json(&self) -> Result<Vec<Column>> {
        if self.config.json_type == ColumnType::Text {
            return Err(PgfeedError::configuration(
                "JSON imports require a json or jsonb column",
            ));
        }
        Ok(build_columns(
            std::slice::from_ref(&self.config.json_column),
            self.config.json_type,
        ))
    }
}

/// Reject header fields that still contain a delimiter-like character
pub fn validate_header(fields: &[String], delimiter: u8) -> Result<()> {
    let delimiter = char::from(delimiter);
    for field in fields {
        if let Some(c) = field
            .chars()
            .find(|c| *c == delimiter || CONFUSABLE_DELIMITERS.contains(c))
        {
            return Err(PgfeedError::configuration(format!(
                "Header field {:?} contains {:?}; the configured delimiter {:?} is probably wrong",
                field, c, delimiter
            )));
        }
    }
    Ok(())
}

/// Normalize raw names into unique, non-empty columns
pub fn build_columns(raw_names: &[String], column_type: ColumnType) -> Vec<Column> {
    let mut taken = HashSet::new();
    let mut columns = Vec::with_capacity(raw_names.len());

    for (position, raw) in raw_names.iter().enumerate() {
        let mut name = normalize(raw);
        if taken.contains(&name) {
            name = synthetic_name(position, &taken);
            debug!(raw = %raw, name = %name, "Renamed duplicate column");
        }
        taken.insert(name.clone());
        columns.push(Column::new(position, name, column_type));
    }
    columns
}

fn synthetic_name(position: usize, taken: &HashSet<String>) -> String {
    let base = format!("_col{}", position);
    if !taken.contains(&base) {
        return base;
    }
    let mut k = 1;
    loop {
        let candidate = format!("{}_{}", base, k);
        if !taken.contains(&candidate) {
            return candidate;
        }
        k += 1;
    }
}
