//! Unified error type.

use std::fmt;

/// The error type returned by kiroku's fallible operations.
///
/// Only infrastructure failures surface here: binding a port, accepting a
/// connection. Request-scoped failures (unreadable bodies, serialization,
/// rejected writes) are handled where they happen, logged, and folded into
/// the response itself; they never propagate as errors.
#[derive(Debug)]
pub struct Error(std::io::Error);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "io: {}", self.0)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self(e)
    }
}
