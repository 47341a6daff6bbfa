pub mod config;
pub mod error;
pub mod format;
pub mod identifier;
pub mod query;
pub mod runtime;
pub mod stats;
pub mod types;
