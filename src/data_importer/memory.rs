// In-memory store used for dry runs and tests
use crate::data_importer::store::BulkStore;
use crate::error::{PgfeedError, Result};
use crate::types::{Column, TableRef};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

type Row = Vec<Option<String>>;

/// Contents of one relation
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

/// Everything the store has seen, shared with any clones of the store
#[derive(Debug, Default)]
pub struct MemoryState {
    pub schemas: BTreeSet<String>,
    pub tables: BTreeMap<String, MemoryTable>,
    /// Verbs in call order, for asserting the transaction protocol
    pub calls: Vec<&'static str>,
    pub in_transaction: bool,
    pub commits: usize,
    pub rollbacks: usize,
    staged: Vec<(String, Row)>,
}

#[derive(Debug, Default)]
struct Faults {
    reject_values_containing: Option<String>,
    fail_prepare: bool,
    fail_channel: bool,
    fail_finalize: bool,
}

/// Bulk-append channel of the memory store
#[derive(Debug)]
pub struct MemoryChannel {
    table: String,
    width: usize,
    rows: Vec<Row>,
}

/// A [`BulkStore`] that keeps rows in memory and honours transactions
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any appended row that has a value containing `needle`
    pub fn rejecting_values_containing(needle: impl Into<String>) -> Self {
        Self {
            state: Arc::default(),
            faults: Arc::new(Faults {
                reject_values_containing: Some(needle.into()),
                ..Faults::default()
            }),
        }
    }

    /// Fail when the bulk append is prepared
    pub fn failing_prepare() -> Self {
        Self {
            state: Arc::default(),
            faults: Arc::new(Faults {
                fail_prepare: true,
                ..Faults::default()
            }),
        }
    }

    /// Fail every append as if the connection had dropped
    pub fn failing_channel() -> Self {
        Self {
            state: Arc::default(),
            faults: Arc::new(Faults {
                fail_channel: true,
                ..Faults::default()
            }),
        }
    }

    /// Fail when the bulk append is finalized
    pub fn failing_finalize() -> Self {
        Self {
            state: Arc::default(),
            faults: Arc::new(Faults {
                fail_finalize: true,
                ..Faults::default()
            }),
        }
    }

    /// Lock and inspect the shared state
    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Committed rows of `table`, empty if the table does not exist
    pub fn rows(&self, table: &TableRef) -> Vec<Row> {
        self.state()
            .tables
            .get(&table.to_string())
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn record(&self, verb: &'static str) -> MutexGuard<'_, MemoryState> {
        let mut state = self.state();
        state.calls.push(verb);
        state
    }
}

impl BulkStore for MemoryStore {
    type Channel = MemoryChannel;

    async fn ensure_schema(&mut self, schema: &str) -> Result<()> {
        self.record("ensure_schema").schemas.insert(schema.to_string());
        Ok(())
    }

    async fn create_relation(&mut self, table: &TableRef, columns: &[Column]) -> Result<()> {
        let mut state = self.record("create_relation");
        if !state.schemas.contains(&table.schema) {
            return Err(PgfeedError::store(format!("schema \"{}\" does not exist", table.schema)));
        }
        state
            .tables
            .entry(table.to_string())
            .or_insert_with(|| MemoryTable {
                columns: columns.to_vec(),
                rows: Vec::new(),
            });
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        let mut state = self.record("begin");
        if state.in_transaction {
            return Err(PgfeedError::store("transaction already in progress"));
        }
        state.in_transaction = true;
        Ok(())
    }

    async fn prepare_bulk_append(
        &mut self,
        table: &TableRef,
        columns: &[Column],
    ) -> Result<Self::Channel> {
        let state = self.record("prepare_bulk_append");
        if self.faults.fail_prepare {
            return Err(PgfeedError::store("could not prepare bulk append"));
        }
        let existing = state
            .tables
            .get(&table.to_string())
            .ok_or_else(|| PgfeedError::store(format!("relation {} does not exist", table)))?;
        for column in columns {
            if !existing.columns.iter().any(|c| c.name == column.name) {
                return Err(PgfeedError::store(format!(
                    "column \"{}\" of relation {} does not exist",
                    column.name, table
                )));
            }
        }
        Ok(MemoryChannel {
            table: table.to_string(),
            width: columns.len(),
            rows: Vec::new(),
        })
    }

    async fn append(&mut self, channel: &mut Self::Channel, values: &[Option<&str>]) -> Result<()> {
        if self.faults.fail_channel {
            return Err(PgfeedError::store("bulk append channel is closed"));
        }
        if values.len() != channel.width {
            return Err(PgfeedError::append(format!(
                "expected {} values, got {}",
                channel.width,
                values.len()
            )));
        }
        if let Some(needle) = &self.faults.reject_values_containing {
            if values.iter().flatten().any(|v| v.contains(needle.as_str())) {
                return Err(PgfeedError::append(format!("value rejected: contains {:?}", needle)));
            }
        }
        channel
            .rows
            .push(values.iter().map(|v| v.map(str::to_string)).collect());
        Ok(())
    }

    async fn finalize_bulk_append(&mut self, channel: Self::Channel) -> Result<u64> {
        let mut state = self.record("finalize_bulk_append");
        if self.faults.fail_finalize {
            return Err(PgfeedError::store("bulk append could not be finalized"));
        }
        let count = channel.rows.len() as u64;
        let table = channel.table;
        state
            .staged
            .extend(channel.rows.into_iter().map(|row| (table.clone(), row)));
        Ok(count)
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.record("commit");
        if !state.in_transaction {
            return Err(PgfeedError::store("no transaction in progress"));
        }
        let staged = std::mem::take(&mut state.staged);
        for (table, row) in staged {
            if let Some(t) = state.tables.get_mut(&table) {
                t.rows.push(row);
            }
        }
        state.in_transaction = false;
        state.commits += 1;
        debug!(commits = state.commits, "Memory store committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut state = self.record("rollback");
        state.staged.clear();
        state.in_transaction = false;
        state.rollbacks += 1;
        Ok(())
    }
}
