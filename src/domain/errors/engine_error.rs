//! Engine request error types.

use thiserror::Error;

/// Ways a request to the messaging engine can fail.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum EngineError {
    #[error("engine rejected request with code {code}: {message}")]
    Rejected { code: i32, message: String },

    #[error("engine is not available: {message}")]
    Unavailable { message: String },

    #[error("{what} not found")]
    NotFound { what: String },
}

impl EngineError {
    /// Creates rejected error.
    #[must_use]
    pub fn rejected(code: i32, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Creates unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates not found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Returns whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
            || matches!(self, Self::Rejected { code, .. } if *code == 429 || *code >= 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::unavailable("worker restarting").is_transient());
        assert!(EngineError::rejected(429, "FLOOD_WAIT").is_transient());
        assert!(!EngineError::rejected(400, "MESSAGE_ID_INVALID").is_transient());
        assert!(!EngineError::not_found("file 3").is_transient());
    }

    #[test]
    fn test_display() {
        let err = EngineError::rejected(400, "CHAT_INVALID");
        assert_eq!(
            err.to_string(),
            "engine rejected request with code 400: CHAT_INVALID"
        );
    }
}
