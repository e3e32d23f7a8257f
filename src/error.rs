//! Error types for the voicewire session core.
//!
//! The taxonomy follows the propagation policy of the session design:
//! errors local to a single audio frame or a single function invocation are
//! reported where they occur and never escalate to session-level failure.
//! Only authentication failure, an explicit stop, a server-side session end,
//! and transport disconnection change overall session state.

use thiserror::Error;

/// Errors raised by the transport boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Establishing the connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The channel is closed
    #[error("Transport closed")]
    Closed,

    /// A message could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised by the session state machine and its pipelines.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A request that is not valid in the current phase (e.g. a second
    /// `start` while a session is already running)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The operation requires an active session
    #[error("Session is not active")]
    NotActive,

    /// Transport-level failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed audio payload
    #[error("Audio codec error: {0}")]
    Codec(String),

    /// An inbound message violated the protocol; non-fatal to the session
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Unrecoverable internal error; the session must be recreated
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::InvalidRequest("start while active".to_string());
        assert!(err.to_string().contains("Invalid request"));

        let err = SessionError::NotActive;
        assert_eq!(err.to_string(), "Session is not active");

        let err = SessionError::Protocol("session_ready while idle".to_string());
        assert!(err.to_string().contains("Protocol violation"));
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: SessionError = TransportError::Closed.into();
        match err {
            SessionError::Transport(TransportError::Closed) => {}
            _ => panic!("Expected Transport(Closed)"),
        }
    }

    #[test]
    fn test_serialization_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: TransportError = parse_err.into();
        match err {
            TransportError::Serialization(_) => {
                assert!(err.to_string().contains("Serialization"));
            }
            _ => panic!("Expected Serialization"),
        }
    }
}
