//! The transient compute engine, backed by DataFusion.
//!
//! Datasets are lazy [`DataFrame`](datafusion::dataframe::DataFrame) plans over files
//! scanned in place. Transforms compose new plan nodes and read nothing.
//! Only counting, chunk collection, statistics and export execute a plan.

mod engine;
pub mod error;

pub use engine::ComputeEngine;
