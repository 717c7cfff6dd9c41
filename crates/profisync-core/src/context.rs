//! The mutable document threaded through a workflow run.
//!
//! `RunContext` holds the caller's original input plus every merged step
//! result, addressed by dotted/bracket paths. A `result_path` merge replaces
//! only the addressed sub-tree; it never clobbers sibling data. Size limits
//! prevent unbounded growth.

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::path::{JsonPath, PathError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum serialized size of a single merged result (1 MB).
pub const MAX_RESULT_SIZE: usize = 1_048_576;

/// Maximum serialized size of the whole context document (10 MB).
pub const MAX_CONTEXT_SIZE: usize = 10_485_760;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from context reads and merges.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("step result ({size} bytes) exceeds the {max} byte limit")]
    ResultTooLarge { size: usize, max: usize },

    #[error("context document ({size} bytes) exceeds the {max} byte limit")]
    ContextTooLarge { size: usize, max: usize },

    #[error("path error: {0}")]
    Path(#[from] PathError),
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Mutable execution state for one workflow run.
///
/// Owned exclusively by one in-flight run; created per invocation and
/// discarded at the terminal state.
#[derive(Debug, Clone)]
pub struct RunContext {
    doc: Value,
    /// Workflow name (for logging).
    pub workflow_name: String,
    /// Run ID.
    pub run_id: Uuid,
}

impl RunContext {
    /// Seed a context from caller input.
    pub fn new(workflow_name: String, run_id: Uuid, input: Value) -> Self {
        Self {
            doc: input,
            workflow_name,
            run_id,
        }
    }

    /// The current context document.
    pub fn document(&self) -> &Value {
        &self.doc
    }

    /// Consume the context, yielding the final document.
    pub fn into_document(self) -> Value {
        self.doc
    }

    /// Read the value at `path`, if present.
    pub fn read(&self, path: &JsonPath) -> Option<&Value> {
        path.read(&self.doc)
    }

    /// Merge a step result into the context.
    ///
    /// With a `result_path`, only the addressed sub-tree is replaced; without
    /// one, the result replaces the whole document. Enforces the per-result
    /// and whole-context size limits.
    pub fn apply_result(
        &mut self,
        result_path: Option<&JsonPath>,
        result: Value,
    ) -> Result<(), ContextError> {
        let size = serialized_size(&result);
        if size > MAX_RESULT_SIZE {
            return Err(ContextError::ResultTooLarge {
                size,
                max: MAX_RESULT_SIZE,
            });
        }

        match result_path {
            Some(path) => path.write(&mut self.doc, result)?,
            None => self.doc = result,
        }

        let total = serialized_size(&self.doc);
        if total > MAX_CONTEXT_SIZE {
            return Err(ContextError::ContextTooLarge {
                size: total,
                max: MAX_CONTEXT_SIZE,
            });
        }
        Ok(())
    }
}

fn serialized_size(value: &Value) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
