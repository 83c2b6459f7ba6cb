pub mod error;
pub mod types;
pub mod schema_deriver;
pub mod record_decoder;
pub mod data_importer;
pub mod pipeline;
pub mod monitoring;
