//! Structured error types for cli-rts
//!
//! Uses thiserror for ergonomic error definitions with automatic Display
//! and Error trait implementations. The event state machine itself never
//! fails; these errors belong to the edges (filesystem, HTTP, hook install).

use thiserror::Error;

/// All possible errors in cli-rts
#[derive(Error, Debug)]
pub enum CliRtsError {
    /// Filesystem or socket I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The daemon could not bind its listen address (usually already running)
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an error
    #[error("Server error: {0}")]
    Serve(String),

    /// Hook installation failed
    #[error("Hook installation failed for '{project}': {reason}")]
    InitError { project: String, reason: String },

    /// Inbound request body could not be interpreted as an event envelope
    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    /// Hook emitter could not reach the daemon
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenience Result type using CliRtsError
pub type Result<T> = std::result::Result<T, CliRtsError>;
