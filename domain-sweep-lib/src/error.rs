//! Error handling for scanning operations.
//!
//! This module defines a single error type covering the three failure classes
//! the engine distinguishes: bad input (fatal to one operation), transient
//! network trouble (retried, then folded into an `Uncertain` verdict) and
//! persistence failures (fatal to the whole run).

use std::fmt;

/// Main error type for scanning operations.
#[derive(Debug, Clone)]
pub enum ScanError {
    /// Invalid domain name format
    InvalidDomain {
        domain: String,
        reason: String,
    },

    /// Configuration errors (invalid settings, unreadable config files, etc.)
    ConfigError {
        message: String,
    },

    /// Network-related errors (connection refused, reset, etc.)
    NetworkError {
        message: String,
        source: Option<String>,
    },

    /// Checkpoint or result store write/read failures
    PersistenceError {
        path: String,
        message: String,
    },

    /// Generic internal errors that don't fit other categories
    Internal {
        message: String,
    },
}

impl ScanError {
    /// Create a new invalid domain error.
    pub fn invalid_domain<D: Into<String>, R: Into<String>>(domain: D, reason: R) -> Self {
        Self::InvalidDomain {
            domain: domain.into(),
            reason: reason.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new network error.
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new network error with source information.
    pub fn network_with_source<M: Into<String>, S: Into<String>>(message: M, source: S) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new persistence error.
    pub fn persistence<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::PersistenceError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error suggests the operation should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError { .. })
    }

    /// Check if this error means progress could not be recorded durably.
    ///
    /// The worker pool halts on these instead of scanning on with
    /// unrecorded results.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::PersistenceError { .. })
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDomain { domain, reason } => {
                write!(f, "Invalid domain '{}': {}", domain, reason)
            }
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::NetworkError { message, source } => {
                if let Some(source) = source {
                    write!(f, "Network error: {} (source: {})", message, source)
                } else {
                    write!(f, "Network error: {}", message)
                }
            }
            Self::PersistenceError { path, message } => {
                write!(f, "Persistence error at '{}': {}", path, message)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for ScanError {}

impl From<tempfile::PersistError> for ScanError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::PersistenceError {
            path: err.file.path().to_string_lossy().into_owned(),
            message: format!("atomic rename failed: {}", err.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(ScanError::network("refused").is_retryable());
        assert!(!ScanError::invalid_domain("-x.im", "leading hyphen").is_retryable());
        assert!(!ScanError::config("workers must be >= 1").is_retryable());
        assert!(!ScanError::internal("closed").is_persistence());

        let err = ScanError::persistence("/tmp/cp.json", "disk full");
        assert!(err.is_persistence());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = ScanError::network_with_source("Connection failed", "refused");
        assert_eq!(
            err.to_string(),
            "Network error: Connection failed (source: refused)"
        );

        let err = ScanError::persistence("results/checkpoint.json", "disk full");
        assert!(err.to_string().contains("results/checkpoint.json"));
    }

    #[test]
    fn test_failed_rename_is_persistence_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let tmp = tempfile::NamedTempFile::new_in(dir.path()).unwrap();
        let persist_err = tmp
            .persist(dir.path().join("missing").join("checkpoint.json"))
            .unwrap_err();

        let err = ScanError::from(persist_err);
        assert!(err.is_persistence());
        assert!(err.to_string().contains("atomic rename failed"));
    }
}
