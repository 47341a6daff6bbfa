//! The session layer of the dataset engine.
//!
//! A [`Session`] names datasets, routes every operation to the engine that backs
//! the dataset, and reports failures as [`ErrorInfo`] values that carry a stable
//! code and category.

pub mod error;
pub mod registry;
mod session;

pub use error::{ErrorCategory, ErrorInfo, SessionError, SessionResult};
pub use registry::DatasetKind;
pub use session::{DatasetInfo, Session};
pub use strata_filter::{FilterCondition, FilterLogic, FilterOperator};
pub use strata_wire::{decode, WirePayload};
