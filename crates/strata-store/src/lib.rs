//! The persistent store, backed by an embedded DuckDB database.
//!
//! A [`DuckStore`] owns one connection, either to a database file or to an
//! in-memory scratch database. Tabular results are streamed batch by batch
//! into the wire format.

pub mod error;
mod import;
mod store;
mod transform;

pub use store::DuckStore;
