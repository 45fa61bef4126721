//! Error types for hostmetrics-mi

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a management provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MiError {
    /// Provider runtime cannot be reached or initialized
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Session creation or test-connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Session handshake did not complete in time
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed query text
    #[error("query syntax error at offset {offset}: {message}")]
    Compile {
        /// Byte offset into the query text
        offset: usize,
        /// What the parser expected
        message: String,
    },

    /// Provider rejected the query at run time
    #[error("query execution failed: {0}")]
    Execution(String),

    /// Cursor or handle driven outside its contract
    #[error("protocol misuse: {0}")]
    ProtocolMisuse(String),

    /// Handle was already closed
    #[error("{0} is not open")]
    NotOpen(&'static str),

    /// Named element absent from an instance
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// Dynamic value kind does not fit the destination field
    #[error("type mismatch for field {field}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Destination field
        field: String,
        /// Static type of the field
        expected: &'static str,
        /// Kind of the provider value
        found: &'static str,
    },

    /// Value does not fit the width of the destination field
    #[error("value {value} overflows field {field} of type {target}")]
    Overflow {
        /// Destination field
        field: String,
        /// Static type of the field
        target: &'static str,
        /// Rendered provider value
        value: String,
    },

    /// Single-instance contract violated
    #[error("expected exactly one instance of {class}, found {found}")]
    UnexpectedInstanceCount {
        /// Class or perf object queried
        class: String,
        /// Number of instances actually returned
        found: usize,
    },
}

/// Coarse error category surfaced to collectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unavailable,
    ConnectionFailed,
    CompileError,
    ExecutionError,
    ProtocolMisuse,
    ElementNotFound,
    TypeMismatch,
    Overflow,
    UnexpectedInstanceCount,
}

impl MiError {
    /// Category of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            MiError::Unavailable(_) => ErrorKind::Unavailable,
            MiError::ConnectionFailed(_) | MiError::Timeout(_) => ErrorKind::ConnectionFailed,
            MiError::Compile { .. } => ErrorKind::CompileError,
            MiError::Execution(_) => ErrorKind::ExecutionError,
            MiError::ProtocolMisuse(_) | MiError::NotOpen(_) => ErrorKind::ProtocolMisuse,
            MiError::ElementNotFound(_) => ErrorKind::ElementNotFound,
            MiError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            MiError::Overflow { .. } => ErrorKind::Overflow,
            MiError::UnexpectedInstanceCount { .. } => ErrorKind::UnexpectedInstanceCount,
        }
    }

    /// Check if a caller may retry (with its own backoff)
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, MiError::ConnectionFailed(_) | MiError::Timeout(_))
    }

    /// Check if the provider runtime is missing altogether
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, MiError::Unavailable(_))
    }

    pub(crate) fn compile(offset: usize, message: impl Into<String>) -> Self {
        MiError::Compile {
            offset,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(MiError::NotOpen("session").kind(), ErrorKind::ProtocolMisuse);
        assert_eq!(
            MiError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::ConnectionFailed
        );
        assert_eq!(MiError::compile(3, "x").kind(), ErrorKind::CompileError);
    }

    #[test]
    fn test_retryable() {
        assert!(MiError::ConnectionFailed("refused".into()).is_retryable());
        assert!(!MiError::Execution("invalid class".into()).is_retryable());
        assert!(MiError::Unavailable("not installed".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = MiError::UnexpectedInstanceCount {
            class: "Cache".into(),
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "expected exactly one instance of Cache, found 2"
        );
    }
}
