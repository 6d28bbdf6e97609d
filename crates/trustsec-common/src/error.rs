//! Error types for ERS synchronization.
//!
//! This module defines the error taxonomy shared by the fetcher, resolver,
//! transcoder and bulk synchronizer. All errors implement
//! `std::error::Error` via `thiserror`.
//!
//! Batch-level failures ([`ErsError::is_fatal`]) abort the enclosing step.
//! Per-item failures are collected into reports and never abort a batch.

use std::io;
use thiserror::Error;

/// Result type alias for ERS operations.
pub type ErsResult<T> = Result<T, ErsError>;

/// Errors that can occur while talking to the ERS API or transcoding data.
#[derive(Debug, Error)]
pub enum ErsError {
    /// Connection, TLS or timeout failure.
    #[error("Transport failure on {method} {path}: {message}")]
    Transport {
        /// HTTP method of the failed request.
        method: String,
        /// Request path.
        path: String,
        /// Underlying error message.
        message: String,
    },

    /// List request returned a non-success status.
    #[error("Bad status {status} listing {path}")]
    BadStatus {
        /// Request path.
        path: String,
        /// HTTP status code.
        status: u16,
    },

    /// Create or delete rejected by the remote system.
    #[error("Rejected by remote ({status}): {message}")]
    RemoteRejection {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the ERS error envelope.
        message: String,
    },

    /// A referenced name has no known identifier.
    #[error("No {kind} named '{name}'")]
    Lookup {
        /// The kind of entity (e.g. "tag", "acl").
        kind: String,
        /// The unresolved name.
        name: String,
    },

    /// Input table does not have the expected shape.
    #[error("Malformed table: {message}")]
    Shape {
        /// Error message.
        message: String,
    },

    /// Response body does not match the expected envelope.
    #[error("Unexpected response from {path}: {message}")]
    Decode {
        /// Request path.
        path: String,
        /// Error message.
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Local file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ErsError {
    /// Creates a transport error.
    pub fn transport(
        method: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            method: method.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a bad status error.
    pub fn bad_status(path: impl Into<String>, status: u16) -> Self {
        Self::BadStatus {
            path: path.into(),
            status,
        }
    }

    /// Creates a remote rejection error.
    pub fn rejection(status: u16, message: impl Into<String>) -> Self {
        Self::RemoteRejection {
            status,
            message: message.into(),
        }
    }

    /// Creates a lookup error.
    pub fn lookup(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Lookup {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Creates a shape error.
    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error aborts the enclosing batch-level step.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ErsError::RemoteRejection { .. } | ErsError::Lookup { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ErsError::bad_status("/ers/config/sgt", 401);
        assert_eq!(err.to_string(), "Bad status 401 listing /ers/config/sgt");
    }

    #[test]
    fn test_lookup_error() {
        let err = ErsError::lookup("acl", "BlockMalware");
        assert_eq!(err.to_string(), "No acl named 'BlockMalware'");
    }

    #[test]
    fn test_transport_error() {
        let err = ErsError::transport("GET", "/ers/config/sgacl", "connection refused");
        assert!(err.to_string().contains("GET /ers/config/sgacl"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_is_fatal() {
        assert!(ErsError::bad_status("/x", 500).is_fatal());
        assert!(ErsError::shape("missing SGT column").is_fatal());
        assert!(!ErsError::rejection(400, "duplicate").is_fatal());
        assert!(!ErsError::lookup("tag", "Guests").is_fatal());
    }
}
