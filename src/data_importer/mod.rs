// Data importer module: store boundary and the bulk load session
pub mod copy_format;
pub mod memory;
pub mod postgres;
pub mod session;
pub mod store;


pub use memory::{MemoryState, MemoryStore, MemoryTable};
pub use postgres::{ConnectionConfig, PgStore};
pub use session::BulkLoadSession;
pub use store::BulkStore;
