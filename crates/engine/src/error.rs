use std::fmt;

use crate::session::SessionStatus;

/// A required field that was missing or could not be coerced. Row-scoped:
/// the row is dropped and the batch continues.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NormalizationError {
    /// Zero-based position of the row in the input batch.
    pub row: usize,
    /// Canonical column name (`messageId`, `securityId`, ...).
    pub column: String,
    pub reason: String,
}

impl fmt::Display for NormalizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: column '{}': {}", self.row, self.column, self.reason)
    }
}

impl std::error::Error for NormalizationError {}

#[derive(Debug)]
pub enum PulseError {
    /// A single row failed normalization.
    Normalization(NormalizationError),
    /// A rule or preset tree is structurally invalid (unknown column, operator
    /// not valid for the column's type, reversed `between` bounds).
    RuleEvaluation { rule: String, message: String },
    /// Unknown or already-expired session id.
    SessionNotFound(String),
    /// Mutation attempted on a session that is no longer open.
    SessionClosed { session_id: String, status: SessionStatus },
    /// Commit attempted on a session with no records left.
    EmptyCommit(String),
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (missing alias, duplicate alias, etc.).
    ConfigValidation(String),
    /// The output sink rejected an append or read.
    Sink(String),
    /// The rule repository could not be read.
    Repository(String),
}

impl fmt::Display for PulseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normalization(err) => write!(f, "normalization error: {err}"),
            Self::RuleEvaluation { rule, message } => {
                write!(f, "rule '{rule}': {message}")
            }
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::SessionClosed { session_id, status } => {
                write!(f, "session '{session_id}' is {status} and can no longer be changed")
            }
            Self::EmptyCommit(id) => write!(f, "session '{id}' has no records to save"),
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Sink(msg) => write!(f, "output sink error: {msg}"),
            Self::Repository(msg) => write!(f, "rule repository error: {msg}"),
        }
    }
}

impl std::error::Error for PulseError {}

impl From<NormalizationError> for PulseError {
    fn from(err: NormalizationError) -> Self {
        Self::Normalization(err)
    }
}
