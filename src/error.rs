//! Error types for backchain.
//!
//! Resolution itself never fails on cycles or missing values; those degrade
//! to "unset". Errors are reserved for hit policy violations, goals that stay
//! unresolved, and failures of the collaborators (handlers, rule factories,
//! table documents, storage).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for backchain operations.
#[derive(Error, Debug)]
pub enum ChainError {
    /// Fired rules are inconsistent with the declared hit policy.
    #[error("hit policy violation for '{output}' ({policy}): {reason}")]
    HitPolicyViolation {
        output: String,
        policy: String,
        reason: String,
    },

    /// The goal is still unset after the learn/retry loop settled.
    #[error("unable to decide '{goal}'")]
    Unresolved { goal: String },

    /// A rule factory failed.
    #[error("rule factory error: {message}")]
    Factory { message: String },

    /// A model handler rejected an update.
    #[error("handler error: {message}")]
    Handler { message: String },

    /// A decision-table document is malformed or cannot represent a rule.
    #[error("table error: {message}")]
    Table { message: String },

    /// I/O errors from document or config files.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// Caller-supplied input that cannot be used (bad `name=json` pairs).
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

/// A specialized Result type for backchain operations.
pub type Result<T> = std::result::Result<T, ChainError>;

impl ChainError {
    /// Create a hit policy violation.
    pub fn hit_policy(
        output: impl Into<String>,
        policy: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::HitPolicyViolation {
            output: output.into(),
            policy: policy.into(),
            reason: reason.into(),
        }
    }

    /// Create an unresolved goal error.
    pub fn unresolved(goal: impl Into<String>) -> Self {
        Self::Unresolved { goal: goal.into() }
    }

    /// Create a rule factory error.
    pub fn factory(message: impl Into<String>) -> Self {
        Self::Factory {
            message: message.into(),
        }
    }

    /// Create a handler error.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Create a table error.
    pub fn table(message: impl Into<String>) -> Self {
        Self::Table {
            message: message.into(),
        }
    }

    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Check if this error means "no decision" rather than a failure.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved { .. })
    }
}

impl From<io::Error> for ChainError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Trait for fail-open error handling.
///
/// Used where a failure should degrade to a safe default instead of
/// aborting, such as reading optional configuration files.
pub trait FailOpen<T> {
    /// Handle an error by logging a warning and returning the default value.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using default)", context, err);
                T::default()
            }
        }
    }
}

/// Exit codes for the backchain CLI.
pub mod exit_codes {
    /// The goal was decided.
    pub const SUCCESS: i32 = 0;

    /// A hit policy, table, storage or input error occurred.
    pub const ERROR: i32 = 1;

    /// The goal could not be decided.
    pub const UNRESOLVED: i32 = 2;

    /// The process panicked.
    pub const CRASH: i32 = 3;
}
