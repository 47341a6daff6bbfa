//! The columnar wire format used to move tabular results across the engine boundary.
//!
//! Results are written in the Arrow IPC streaming format: a schema message followed by
//! zero or more record batch messages and an end-of-stream marker. Consumers in any
//! language with an Arrow implementation can read the bytes without re-parsing rows.
//! The encoder accepts batches one at a time so that producers can emit results
//! without collecting them first.

mod codec;
pub mod error;

pub use codec::{decode, encode_batches, DecodedBatches, WireEncoder, WirePayload, WireStats};
