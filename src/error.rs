//! Error types for the cognitive loop
//!
//! Only the embedding layer (checkpoint store, binary) ever sees these as
//! errors. Inside the learning, goal and planning systems an oracle or parse
//! failure is logged and absorbed so a cycle degrades to "nothing changed".

use std::time::Duration;
use thiserror::Error;

/// Cognition errors
#[derive(Error, Debug)]
pub enum CognitionError {
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Oracle timed out after {0:?}")]
    OracleTimeout(Duration),

    #[error("Unparsable oracle response: {0}")]
    UnparsableResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CognitionError {
    /// True for failures that originate at the oracle boundary
    pub fn is_oracle_failure(&self) -> bool {
        matches!(
            self,
            Self::OracleUnavailable(_) | Self::OracleTimeout(_) | Self::UnparsableResponse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CognitionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_failure_classification() {
        assert!(CognitionError::OracleTimeout(Duration::from_secs(1)).is_oracle_failure());
        assert!(CognitionError::UnparsableResponse("x".into()).is_oracle_failure());
        assert!(!CognitionError::Config("bad".into()).is_oracle_failure());
    }

    #[test]
    fn test_error_display() {
        let err = CognitionError::OracleUnavailable("connection refused".into());
        assert_eq!(err.to_string(), "Oracle unavailable: connection refused");
    }
}
