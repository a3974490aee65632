//! Protocol-level errors for message reading and writing
//!
//! Every variant is `Copy` and carries only `&'static str` context, so errors
//! can be raised and stored on the connection hot path without allocating.
//! The kinds follow the status taxonomy shared by the codec and the connection
//! state machine: `Retry` is backpressure, `NoMore` is iterator exhaustion, the
//! rest are failures.

use rrlite_types::MessageErrorType;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Operation cannot make progress now; try again on a later cycle
    #[error("operation would block, retry later")]
    Retry,

    /// A position, length or count does not fit its buffer or field domain
    #[error("out of range: {context}")]
    OutOfRange { context: &'static str },

    /// Caller supplied an unusable argument
    #[error("invalid argument: {context}")]
    InvalidArgument { context: &'static str },

    /// Wire data is malformed or internally inconsistent
    #[error("protocol violation: {context}")]
    Protocol { context: &'static str },

    /// Connection-fatal framing or transport failure
    #[error("connection error: {context}")]
    ConnectionError { context: &'static str },

    /// Iterator has no further entries or elements
    #[error("no more items")]
    NoMore,

    #[error("message element not found")]
    MessageElementNotFound,

    #[error("message element type mismatch: {context}")]
    MessageElementTypeMismatch { context: &'static str },

    /// Operation is not valid in the current state
    #[error("invalid operation: {context}")]
    InvalidOperation { context: &'static str },

    #[error("internal error: {context}")]
    InternalError { context: &'static str },

    #[error("not implemented: {feature}")]
    NotImplemented { feature: &'static str },
}

impl ProtocolError {
    pub const fn out_of_range(context: &'static str) -> Self {
        Self::OutOfRange { context }
    }

    pub const fn invalid_argument(context: &'static str) -> Self {
        Self::InvalidArgument { context }
    }

    pub const fn protocol(context: &'static str) -> Self {
        Self::Protocol { context }
    }

    pub const fn connection(context: &'static str) -> Self {
        Self::ConnectionError { context }
    }

    pub const fn type_mismatch(context: &'static str) -> Self {
        Self::MessageElementTypeMismatch { context }
    }

    pub const fn invalid_operation(context: &'static str) -> Self {
        Self::InvalidOperation { context }
    }

    pub const fn internal(context: &'static str) -> Self {
        Self::InternalError { context }
    }

    /// Backpressure rather than failure
    pub const fn is_retry(&self) -> bool {
        matches!(self, Self::Retry)
    }

    /// Errors that should fault the connection they occurred on
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. } | Self::ConnectionError { .. } | Self::InternalError { .. }
        )
    }

    /// Error code reported to a peer in an error response
    pub const fn wire_code(&self) -> MessageErrorType {
        match self {
            Self::Retry | Self::InvalidOperation { .. } => MessageErrorType::InvalidOperation,
            Self::OutOfRange { .. } => MessageErrorType::OutOfRange,
            Self::InvalidArgument { .. } => MessageErrorType::InvalidArgument,
            Self::MessageElementTypeMismatch { .. } => MessageErrorType::DataTypeMismatch,
            Self::Protocol { .. } => MessageErrorType::ProtocolError,
            Self::ConnectionError { .. } => MessageErrorType::ConnectionError,
            Self::NoMore | Self::MessageElementNotFound => MessageErrorType::MessageElementNotFound,
            Self::InternalError { .. } => MessageErrorType::InternalError,
            Self::NotImplemented { .. } => MessageErrorType::NotImplementedError,
        }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = ProtocolError::protocol("header size mismatch");
        assert_eq!(err.to_string(), "protocol violation: header size mismatch");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ProtocolError::protocol("x").is_connection_fatal());
        assert!(ProtocolError::connection("x").is_connection_fatal());
        assert!(!ProtocolError::Retry.is_connection_fatal());
        assert!(!ProtocolError::NoMore.is_connection_fatal());
        assert!(ProtocolError::Retry.is_retry());
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(
            ProtocolError::invalid_operation("x").wire_code(),
            MessageErrorType::InvalidOperation
        );
        assert_eq!(
            ProtocolError::MessageElementNotFound.wire_code(),
            MessageErrorType::MessageElementNotFound
        );
    }
}
