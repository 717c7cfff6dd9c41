//! Error taxonomy shared across the engine and its collaborators.
//!
//! `ErrorCategory` is the set of stable identifiers that retry policies and
//! catch bindings match against. `ErrorRecord` is what a failed service call
//! or function invocation produces, and what ends up in the run context when
//! a catch binding fires.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Stable error identifiers produced by collaborators and matched by retry
/// policies and catch bindings.
///
/// Serialized in PascalCase so the identifier in a run context, a log line,
/// and a workflow definition is always the same string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorCategory {
    /// An optimistic-concurrency condition on a single write did not hold.
    ConditionalCheckFailed,
    /// A multi-item transactional write was cancelled by its guard condition.
    TransactionCanceled,
    /// The identity directory already holds a user with this username.
    DuplicateIdentity,
    /// The addressed item or user does not exist.
    NotFound,
    /// Malformed call parameters.
    InvalidRequest,
    /// A business function failed for a reason of its own.
    FunctionError,
    /// A collaborator was unreachable or its storage failed.
    ServiceUnavailable,
    /// The run exceeded its wall-clock budget. Never retried.
    Timeout,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::ConditionalCheckFailed => "ConditionalCheckFailed",
            ErrorCategory::TransactionCanceled => "TransactionCanceled",
            ErrorCategory::DuplicateIdentity => "DuplicateIdentity",
            ErrorCategory::NotFound => "NotFound",
            ErrorCategory::InvalidRequest => "InvalidRequest",
            ErrorCategory::FunctionError => "FunctionError",
            ErrorCategory::ServiceUnavailable => "ServiceUnavailable",
            ErrorCategory::Timeout => "Timeout",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// ErrorRecord
// ---------------------------------------------------------------------------

/// A categorized failure produced by a service call or function invocation.
///
/// Consumed by retry-policy matching and catch-binding matching; written into
/// the run context at the binding's `result_path` when a catch fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// The taxonomy bucket this failure belongs to.
    pub category: ErrorCategory,
    /// Human-readable detail.
    pub message: String,
}

impl ErrorRecord {
    /// Create a new error record.
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    /// Serialize to the JSON shape stored in the run context.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

// ---------------------------------------------------------------------------
// RepositoryError
// ---------------------------------------------------------------------------

/// Errors from run-repository operations (trait definitions live in
/// profisync-core, implementations in profisync-infra).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
