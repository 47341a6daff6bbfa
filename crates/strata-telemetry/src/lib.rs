pub mod error;
mod logger;
pub mod recorder;
pub mod telemetry;

pub use telemetry::{init_telemetry, shutdown_telemetry};
