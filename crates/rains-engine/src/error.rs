//! Error types for rains-engine.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the resolution engine.
///
/// Most failure modes are not errors at this level: malformed or
/// inconsistent sections are dropped with a log, and client-visible
/// problems travel back as notifications.
#[derive(Debug, Error)]
pub enum Error {
    /// The outbound channel has no receiver; the server is shutting down.
    #[error("outbound channel closed")]
    OutboundClosed,
}
