// Import pipeline module
pub mod orchestrator;


pub use orchestrator::{ImportState, Orchestrator};
