//! Core error types for the utbot client

use std::path::PathBuf;
use thiserror::Error;

use utb_protocol::{ErrorCode, ProtocolError};

/// Error surfaced on a response stream
///
/// Every failure of a call ends its stream with one of these as the final
/// element; nothing is retried implicitly.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport could not be bound or was dropped
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// `send` was invoked on a disposed session
    #[error("Session closed")]
    SessionClosed,

    /// The caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// The service ended the stream with an error
    #[error("Server error ({code}): {message}")]
    Server { code: ErrorCode, message: String },

    /// Wire-level failure
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Failed to encode request: {0}")]
    Encode(#[source] bincode::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[source] bincode::Error),
}

impl ClientError {
    /// Deliberate cancellation rather than a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            ClientError::Cancelled
                | ClientError::Server {
                    code: ErrorCode::Cancelled,
                    ..
                }
        )
    }

    /// Whether the error came from the transport (as opposed to the service)
    pub fn is_connection(&self) -> bool {
        matches!(self, ClientError::Connection(_) | ClientError::Protocol(_))
    }
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Endpoint refused the connection
    #[error("Connection refused by {address}: {reason}")]
    Refused { address: String, reason: String },

    /// Connection attempt or handshake exceeded the configured timeout
    #[error("Timed out connecting to {0}")]
    Timeout(String),

    /// Handshake did not complete
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Connection dropped while streams were open
    #[error("Connection lost: {0}")]
    Lost(String),

    /// The owning session was disposed while the stream was open
    #[error("Session disposed")]
    Disposed,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_distinguishable() {
        assert!(ClientError::Cancelled.is_cancellation());
        assert!(!ClientError::SessionClosed.is_cancellation());
        assert!(!ClientError::Connection(ConnectionError::Disposed).is_cancellation());
        let stopped = ClientError::Server {
            code: ErrorCode::Cancelled,
            message: "stopped by service".to_string(),
        };
        assert!(stopped.is_cancellation());
    }

    #[test]
    fn test_connection_classification() {
        let err: ClientError = ConnectionError::Lost("reset by peer".to_string()).into();
        assert!(err.is_connection());
        assert!(err.to_string().contains("reset by peer"));

        let err = ClientError::Server {
            code: ErrorCode::NotFound,
            message: "missing /a/b.cpp".to_string(),
        };
        assert!(!err.is_connection());
        assert_eq!(err.to_string(), "Server error (not found): missing /a/b.cpp");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ClientError::SessionClosed.to_string(), "Session closed");
        assert_eq!(ClientError::Cancelled.to_string(), "Request cancelled");
        let err = ConnectionError::Refused {
            address: "localhost:5000".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("localhost:5000"));
    }
}
