//! Host-side error types for the hogwire capabilities.
//!
//! `HostError` is returned by every capability trait in this crate. The
//! bridge wraps it in `BridgeError::UpstreamRequestFailed` when a network
//! capability fails inside a guest callback, so callers can still inspect
//! the precise cause (status, timeout, transport).

use std::fmt;
use std::time::Duration;

/// Error raised by a host capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The upstream answered with a non-success HTTP status.
    Status(u16),
    /// The upstream did not answer within the configured deadline.
    Timeout(Duration),
    /// The request never produced a response (connection refused, TLS, ...).
    Transport(String),
    /// The request URL could not be resolved against the target host.
    InvalidUrl(String),
    /// Properties could not be encoded into the wire format.
    Serialization(String),
    /// The diagnostic sink rejected a message.
    Sink(String),
}

impl HostError {
    /// Create a transport error from any displayable cause.
    pub fn transport(cause: impl fmt::Display) -> Self {
        Self::Transport(cause.to_string())
    }

    /// Create an invalid-URL error from any displayable cause.
    pub fn invalid_url(cause: impl fmt::Display) -> Self {
        Self::InvalidUrl(cause.to_string())
    }

    /// Create a serialization error from any displayable cause.
    pub fn serialization(cause: impl fmt::Display) -> Self {
        Self::Serialization(cause.to_string())
    }

    /// The HTTP status, when the failure was a non-success response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(status) => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure was a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "upstream returned status {}", status),
            Self::Timeout(after) => write!(f, "upstream timed out after {:?}", after),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::InvalidUrl(msg) => write!(f, "invalid url: {}", msg),
            Self::Serialization(msg) => write!(f, "serialization error: {}", msg),
            Self::Sink(msg) => write!(f, "log sink error: {}", msg),
        }
    }
}

impl std::error::Error for HostError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_accessor() {
        assert_eq!(HostError::Status(500).status(), Some(500));
        assert_eq!(HostError::transport("refused").status(), None);
    }

    #[test]
    fn test_is_timeout() {
        assert!(HostError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(!HostError::Status(504).is_timeout());
    }

    #[test]
    fn test_display() {
        let s = format!("{}", HostError::Status(503));
        assert!(s.contains("503"));

        let s = format!("{}", HostError::invalid_url("relative url without base"));
        assert!(s.contains("relative url without base"));
    }
}
