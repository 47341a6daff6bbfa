use fastrace::local::LocalSpan;
use fastrace::Event;
use log::{Log, Metadata, Record};

/// The span event property holding the log target.
const TARGET: &str = "target";
/// The span event property holding the formatted log message.
const MESSAGE: &str = "message";

/// Writes records through `env_logger`, and optionally copies each written
/// record onto the current fastrace span as an event.
pub struct TelemetryLogger {
    inner: env_logger::Logger,
    span_events: bool,
}

impl TelemetryLogger {
    pub fn new(inner: env_logger::Logger, span_events: bool) -> Self {
        Self { inner, span_events }
    }

    pub fn filter(&self) -> log::LevelFilter {
        self.inner.filter()
    }
}

impl Log for TelemetryLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.inner.matches(record) {
            return;
        }
        self.inner.log(record);
        if self.span_events {
            // A no-op outside of a span.
            let event = Event::new(record.level().as_str()).with_properties(|| {
                [
                    (TARGET, record.target().to_string()),
                    (MESSAGE, record.args().to_string()),
                ]
            });
            LocalSpan::add_event(event);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}
