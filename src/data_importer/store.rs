// Store boundary: the only verbs the import engine issues against a data store
use crate::error::Result;
use crate::types::{Column, TableRef};

/// A relational store that supports transactional bulk appends.
///
/// Implementations receive calls in the order `begin`, `ensure_schema`,
/// `create_relation`, `prepare_bulk_append`, any number of `append`, then
/// either `finalize_bulk_append` + `commit` or `rollback`.
#[allow(async_fn_in_trait)]
pub trait BulkStore {
    /// Open bulk-append channel returned by `prepare_bulk_append`
    type Channel;

    async fn ensure_schema(&mut self, schema: &str) -> Result<()>;

    /// Create the relation if it does not exist, using each column's type
    async fn create_relation(&mut self, table: &TableRef, columns: &[Column]) -> Result<()>;

    async fn begin(&mut self) -> Result<()>;

    async fn prepare_bulk_append(
        &mut self,
        table: &TableRef,
        columns: &[Column],
    ) -> Result<Self::Channel>;

    /// Append one row; `None` values are stored as NULL
    async fn append(&mut self, channel: &mut Self::Channel, values: &[Option<&str>]) -> Result<()>;

    /// Flush and close the channel, returning the number of rows the store accepted
    async fn finalize_bulk_append(&mut self, channel: Self::Channel) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}
