use std::io::Write;
use std::sync::Mutex;

use fastrace::collector::{Config, ConsoleReporter, Reporter, SpanRecord};
use log::debug;
use strata_common::config::TelemetryConfig;

use crate::error::{TelemetryError, TelemetryResult};
use crate::logger::TelemetryLogger;

enum TelemetryStatus {
    Uninitialized,
    Initialized,
    Failed,
    ShutDown,
}

static TELEMETRY_STATUS: Mutex<TelemetryStatus> = Mutex::new(TelemetryStatus::Uninitialized);

/// Installs the process-wide logger and span reporter.
/// This can only succeed once per process.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    let mut status = TELEMETRY_STATUS
        .lock()
        .map_err(|e| TelemetryError::internal(e.to_string()))?;

    match *status {
        TelemetryStatus::Uninitialized => {
            set_reporter(config);
            match set_logger(config) {
                Ok(()) => {
                    debug!("telemetry initialized");
                    *status = TelemetryStatus::Initialized;
                    Ok(())
                }
                Err(e) => {
                    *status = TelemetryStatus::Failed;
                    Err(e)
                }
            }
        }
        TelemetryStatus::Initialized => Err(TelemetryError::AlreadyInitialized),
        TelemetryStatus::Failed => Err(TelemetryError::internal(
            "telemetry failed to initialize previously",
        )),
        TelemetryStatus::ShutDown => Err(TelemetryError::ShutDown),
    }
}

fn set_reporter(config: &TelemetryConfig) {
    if config.trace_to_console {
        fastrace::set_reporter(ConsoleReporter, Config::default());
    } else {
        // Session spans are still collected, but nothing is reported.
        fastrace::set_reporter(NoOpReporter, Config::default());
    }
}

fn set_logger(config: &TelemetryConfig) -> TelemetryResult<()> {
    let inner = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let level = record.level();
            let style = buf.default_level_style(level);
            let timestamp = buf.timestamp();
            writeln!(
                buf,
                "[{timestamp} {style}{level}{style:#} {}] {}",
                record.target(),
                record.args()
            )
        })
        .build();
    let logger = TelemetryLogger::new(inner, config.trace_to_console);
    let max_level = logger.filter();
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max_level);
    Ok(())
}

/// Flushes pending spans. Telemetry cannot be initialized again afterwards.
pub fn shutdown_telemetry() {
    debug!("shutting down telemetry");
    fastrace::flush();
    if let Ok(mut status) = TELEMETRY_STATUS.lock() {
        if let TelemetryStatus::Initialized = *status {
            *status = TelemetryStatus::ShutDown;
        }
    }
}

struct NoOpReporter;

impl Reporter for NoOpReporter {
    fn report(&mut self, _spans: Vec<SpanRecord>) {}
}
