//! Transport Error Types
//!
//! Errors surfaced by the socket layer and node setup. Per-message failures
//! stay as [`ProtocolError`] on the connection they belong to; this type is for
//! what the owning event loop has to react to.

use crate::pool::ConnectionId;
use rrlite_codec::ProtocolError;
use rrlite_config::ConfigError;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Socket-level failure
    #[error("I/O error: {message}")]
    Io {
        message: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Failure to reach or accept a peer
    #[error("Connection error: {message} (remote: {remote_addr:?})")]
    Connection {
        message: &'static str,
        remote_addr: Option<SocketAddr>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Settings that cannot be applied
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Every connection slot is in use
    #[error("Connection pool exhausted: all {capacity} slots in use")]
    PoolExhausted { capacity: usize },

    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create an I/O error with context
    pub fn io(message: &'static str, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Create a connection error
    pub fn connection(message: &'static str, remote_addr: Option<SocketAddr>) -> Self {
        Self::Connection {
            message,
            remote_addr,
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: &'static str,
        remote_addr: Option<SocketAddr>,
        source: std::io::Error,
    ) -> Self {
        Self::Connection {
            message,
            remote_addr,
            source: Some(source),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the operation may succeed if tried again later
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
            ),
            Self::Protocol(e) => e.is_retry(),
            Self::PoolExhausted { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::connection("peer refused", None);
        assert!(err.to_string().contains("peer refused"));

        let err = TransportError::PoolExhausted { capacity: 4 };
        assert!(err.to_string().contains("4 slots"));
    }

    #[test]
    fn test_retryable_classification() {
        let would_block = std::io::Error::from(std::io::ErrorKind::WouldBlock);
        assert!(TransportError::io("recv", would_block).is_retryable());

        let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        assert!(!TransportError::io("recv", reset).is_retryable());

        assert!(TransportError::from(ProtocolError::Retry).is_retryable());
        assert!(!TransportError::from(ProtocolError::protocol("bad")).is_retryable());
    }
}
