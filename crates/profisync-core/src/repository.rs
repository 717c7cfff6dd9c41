//! Run repository trait definition.
//!
//! Defines the storage interface for workflow run records and step logs.
//! The infrastructure layer implements this trait with SQLite persistence
//! (and an in-memory variant for tests and embedded use).
//!
//! Uses native async fn in traits (return-position `impl Trait`), consistent
//! with the crate's Rust 2024 edition approach.

use serde_json::Value;
use uuid::Uuid;

use profisync_types::error::RepositoryError;
use profisync_types::workflow::{RunStatus, StepLog, StepStatus, WorkflowRun};

/// Repository trait for run and step audit persistence.
pub trait RunRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Create a new workflow run record.
    fn create_run(
        &self,
        run: &WorkflowRun,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update a run's status (and optionally its error text / final output).
    fn update_run(
        &self,
        run_id: &Uuid,
        status: RunStatus,
        error: Option<&str>,
        output: Option<&Value>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow run by its UUID.
    fn get_run(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowRun>, RepositoryError>> + Send;

    /// List recent runs, optionally filtered by workflow name, ordered by
    /// started_at DESC.
    fn list_runs(
        &self,
        workflow: Option<&str>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowRun>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    /// Create a new step log entry.
    fn create_step_log(
        &self,
        log: &StepLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update a step attempt's status and optionally its output/error.
    fn update_step_log(
        &self,
        log_id: &Uuid,
        status: StepStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List all step logs for a run, ordered by started_at ASC.
    fn list_step_logs(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<StepLog>, RepositoryError>> + Send;
}
