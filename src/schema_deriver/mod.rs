// Schema deriver module
pub mod deriver;
pub mod normalizer;


pub use deriver::{build_columns, validate_header, SchemaDeriver};
pub use normalizer::{normalize, normalize_table_name};
