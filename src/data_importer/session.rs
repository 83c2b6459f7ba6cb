// Bulk load session: one transaction and one bulk-append channel per import run
use crate::data_importer::store::BulkStore;
use crate::error::{PgfeedError, Result};
use crate::types::{Column, Record, TableRef};
use tracing::{debug, info, warn};

/// The transactional unit of work for an import run.
///
/// `commit` and `rollback` consume the session, so it is finalized at most
/// once. Every failure inside `open` and `commit` rolls the transaction back
/// before the error is returned.
pub struct BulkLoadSession<S: BulkStore> {
    store: S,
    channel: S::Channel,
    destination: TableRef,
    columns: Vec<Column>,
    appended: u64,
}

impl<S: BulkStore> BulkLoadSession<S> {
    /// Begin a transaction, ensure the relation exists and prepare the append channel
    pub async fn open(mut store: S, destination: TableRef, columns: Vec<Column>) -> Result<Self> {
        store.begin().await?;

        match Self::prepare(&mut store, &destination, &columns).await {
            Ok(channel) => {
                info!(destination = %destination, columns = columns.len(), "Opened bulk load session");
                Ok(Self {
                    store,
                    channel,
                    destination,
                    columns,
                    appended: 0,
                })
            }
            Err(e) => {
                warn!(destination = %destination, "Could not open bulk load session: {}", e);
                rollback_quietly(&mut store).await;
                Err(e)
            }
        }
    }

    async fn prepare(store: &mut S, destination: &TableRef, columns: &[Column]) -> Result<S::Channel> {
        store.ensure_schema(&destination.schema).await?;
        store.create_relation(destination, columns).await?;
        store.prepare_bulk_append(destination, columns).await
    }

    /// Rows appended so far
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Append one record to the bulk-load channel
    pub async fn add_row(&mut self, record: &Record) -> Result<()> {
        if record.len() != self.columns.len() {
            return Err(PgfeedError::append(format!(
                "record has {} values but {} has {} columns",
                record.len(),
                self.destination,
                self.columns.len()
            )));
        }
        self.store.append(&mut self.channel, &record.values()).await?;
        self.appended += 1;
        Ok(())
    }

    /// Finalize the channel and commit. Returns the row count reported by the store.
    pub async fn commit(self) -> Result<u64> {
        let Self {
            mut store,
            channel,
            destination,
            appended,
            ..
        } = self;

        let rows = match store.finalize_bulk_append(channel).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(destination = %destination, "Bulk append failed to finalize: {}", e);
                rollback_quietly(&mut store).await;
                return Err(e);
            }
        };
        store.commit().await?;

        debug!(destination = %destination, appended, rows, "Committed bulk load session");
        Ok(rows)
    }

    /// Abort the transaction, discarding every appended row
    pub async fn rollback(self) -> Result<()> {
        let Self {
            mut store,
            channel,
            destination,
            appended,
            ..
        } = self;
        drop(channel);
        store.rollback().await?;
        info!(destination = %destination, discarded = appended, "Rolled back bulk load session");
        Ok(())
    }
}

async fn rollback_quietly<S: BulkStore>(store: &mut S) {
    if let Err(e) = store.rollback().await {
        warn!("Rollback failed: {}", e);
    }
}
