//! Run recorder: the engine's audit trail.
//!
//! Wraps a `RunRepository` with a higher-level API for recording run and
//! step-attempt transitions. Runs here are short-lived, so these records
//! exist for observability and post-hoc inspection -- asynchronous callers
//! observe terminal state through them -- not for crash recovery.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use profisync_types::workflow::{RunStatus, StepLog, StepStatus, WorkflowRun};

use crate::repository::RunRepository;

// ---------------------------------------------------------------------------
// RunRecorder
// ---------------------------------------------------------------------------

/// Records run/step transitions through a `RunRepository`.
///
/// Generic over the repository so it works with any storage backend
/// (SQLite, in-memory, ...).
pub struct RunRecorder<R: RunRepository> {
    repo: Arc<R>,
}

impl<R: RunRepository> RunRecorder<R> {
    /// Create a new recorder backed by the given repository.
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &Arc<R> {
        &self.repo
    }

    /// Record a run as started.
    pub async fn record_run_started(&self, run: &WorkflowRun) -> Result<(), RecorderError> {
        self.repo
            .create_run(run)
            .await
            .map_err(|e| RecorderError::Repository(e.to_string()))?;
        tracing::debug!(run_id = %run.id, workflow = run.workflow_name.as_str(), "recorded run start");
        Ok(())
    }

    /// Record a run as finished (succeeded or failed).
    pub async fn record_run_finished(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<&str>,
        output: Option<&Value>,
    ) -> Result<(), RecorderError> {
        self.repo
            .update_run(&run_id, status, error, output)
            .await
            .map_err(|e| RecorderError::Repository(e.to_string()))?;
        tracing::debug!(run_id = %run_id, ?status, "recorded run finish");
        Ok(())
    }

    /// Record a step attempt as started. Returns the log entry id.
    pub async fn record_step_started(
        &self,
        run_id: Uuid,
        step_id: &str,
        attempt: u32,
    ) -> Result<Uuid, RecorderError> {
        let log_id = Uuid::now_v7();
        let log = StepLog {
            id: log_id,
            run_id,
            step_id: step_id.to_string(),
            status: StepStatus::Running,
            attempt,
            output: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.repo
            .create_step_log(&log)
            .await
            .map_err(|e| RecorderError::Repository(e.to_string()))?;
        tracing::debug!(run_id = %run_id, step_id, attempt, "recorded step start");
        Ok(log_id)
    }

    /// Record a step attempt as succeeded.
    pub async fn record_step_succeeded(
        &self,
        log_id: Uuid,
        output: Option<&Value>,
    ) -> Result<(), RecorderError> {
        self.repo
            .update_step_log(&log_id, StepStatus::Succeeded, output, None)
            .await
            .map_err(|e| RecorderError::Repository(e.to_string()))?;
        Ok(())
    }

    /// Record a step attempt as failed.
    pub async fn record_step_failed(&self, log_id: Uuid, error: &str) -> Result<(), RecorderError> {
        self.repo
            .update_step_log(&log_id, StepStatus::Failed, None, Some(error))
            .await
            .map_err(|e| RecorderError::Repository(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecorderError
// ---------------------------------------------------------------------------

/// Errors from recording run/step transitions.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("repository error: {0}")]
    Repository(String),
}
