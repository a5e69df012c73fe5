//! Error types for SQL Guard.
//!
//! Policy rejections are ordinary outcomes of [`crate::guard::SqlGuard::validate`];
//! they only become a [`GuardError`] once the pipeline refuses to continue.

use crate::guard::PolicyViolation;
use thiserror::Error;

/// Errors raised by the guard pipeline.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The statement violated the guard policy
    #[error("Policy violation: {0}")]
    Policy(#[from] PolicyViolation),

    /// A precondition of the run was not met (credentials, branch, host)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Approval for a protected environment was refused
    #[error("Approval denied: {0}")]
    ApprovalDenied(String),

    /// Nobody answered the approval request in time
    #[error("Approval timed out after {timeout_seconds} seconds")]
    ApprovalTimedOut { timeout_seconds: u64 },

    /// The database client exited unsuccessfully
    #[error("Database client failed with exit code {exit_code}")]
    Execution { exit_code: i32 },

    /// The database client did not finish in time
    #[error("Database client timed out after {timeout_seconds} seconds")]
    ExecutionTimeout { timeout_seconds: u64 },

    /// The run was interrupted before the client finished
    #[error("Execution interrupted: {0}")]
    Interrupted(String),

    /// Filesystem or process I/O error
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl GuardError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create an approval denied error.
    pub fn approval_denied(msg: impl Into<String>) -> Self {
        Self::ApprovalDenied(msg.into())
    }

    /// Create an I/O error with context.
    pub fn io(msg: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: msg.into(),
            source,
        }
    }

    /// Whether the failure may be retried automatically.
    ///
    /// Always false. SQL side effects may be partial, so blind retries are unsafe.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Process exit code reported by the CLI for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Policy(_) => 2,
            Self::Precondition(_) => 3,
            Self::ApprovalDenied(_) | Self::ApprovalTimedOut { .. } => 4,
            Self::Execution { .. } | Self::ExecutionTimeout { .. } | Self::Interrupted(_) => 5,
            Self::Io { .. } => 74,
            Self::Config(_) => 78,
        }
    }

    /// Get a user-friendly suggestion for how to fix this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => Some("Check the SQLGUARD_* environment variables"),
            Self::Policy(PolicyViolation::ForbiddenKeywords(_)) => {
                Some("Remove the forbidden keywords; schema and session changes are not allowed")
            }
            Self::Policy(PolicyViolation::MissingFromClause) => {
                Some("Write DELETE statements as DELETE FROM <table> WHERE ...")
            }
            Self::Policy(_) => Some("Review the statement against the guard policy"),
            Self::Precondition(_) => {
                Some("Check the branch mapping, host templates and injected credentials")
            }
            Self::ApprovalDenied(_) | Self::ApprovalTimedOut { .. } => {
                Some("Production runs need an approver; re-run once approved")
            }
            Self::Execution { .. } => Some(
                "Inspect the client output; the transaction may have been partially applied, do not retry blindly",
            ),
            Self::ExecutionTimeout { .. } => Some("Narrow the statement or raise SQLGUARD_EXECUTION_TIMEOUT"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(GuardError::from(PolicyViolation::Empty).exit_code(), 2);
        assert_eq!(GuardError::precondition("no branch").exit_code(), 3);
        assert_eq!(GuardError::approval_denied("nope").exit_code(), 4);
        assert_eq!(GuardError::Execution { exit_code: 1 }.exit_code(), 5);
        assert_eq!(GuardError::config("bad").exit_code(), 78);
    }

    #[test]
    fn test_never_retryable() {
        assert!(!GuardError::Execution { exit_code: 3 }.is_retryable());
        assert!(!GuardError::ExecutionTimeout { timeout_seconds: 1 }.is_retryable());
        assert!(!GuardError::from(PolicyViolation::MissingFromClause).is_retryable());
    }

    #[test]
    fn test_policy_message_names_keyword() {
        let err = GuardError::from(PolicyViolation::ForbiddenKeywords(vec!["DROP".into()]));
        assert!(err.to_string().contains("DROP"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_error_suggestions() {
        assert!(GuardError::precondition("x").suggestion().is_some());
        assert!(GuardError::Interrupted("ctrl-c".into()).suggestion().is_none());
    }
}
