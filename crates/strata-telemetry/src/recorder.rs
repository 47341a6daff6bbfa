use core::fmt;

use fastrace::Span;

/// The span property holding the error message of a failed operation.
pub const ERROR_MESSAGE: &str = "error.message";

/// Records the error message from a [`Result`] in the given span.
pub fn record_error<T, E>(span: &Span, result: &Result<T, E>)
where
    E: fmt::Display,
{
    if let Err(e) = result {
        span.add_property(|| (ERROR_MESSAGE, e.to_string()));
    }
}
