//! In-memory run repository.

use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use profisync_core::repository::RunRepository;
use profisync_types::error::RepositoryError;
use profisync_types::workflow::{RunStatus, StepLog, StepStatus, WorkflowRun};

/// Dashmap-backed `RunRepository` for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryRunRepository {
    runs: DashMap<Uuid, WorkflowRun>,
    steps: DashMap<Uuid, StepLog>,
}

impl MemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunRepository for MemoryRunRepository {
    async fn create_run(&self, run: &WorkflowRun) -> Result<(), RepositoryError> {
        self.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn update_run(
        &self,
        run_id: &Uuid,
        status: RunStatus,
        error: Option<&str>,
        output: Option<&Value>,
    ) -> Result<(), RepositoryError> {
        let mut run = self.runs.get_mut(run_id).ok_or(RepositoryError::NotFound)?;
        run.status = status;
        run.error = error.map(String::from);
        run.output = output.cloned();
        run.completed_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<WorkflowRun>, RepositoryError> {
        Ok(self.runs.get(run_id).map(|r| r.clone()))
    }

    async fn list_runs(
        &self,
        workflow: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let mut runs: Vec<WorkflowRun> = self
            .runs
            .iter()
            .filter(|r| workflow.is_none_or(|w| r.workflow_name == w))
            .map(|r| r.clone())
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn create_step_log(&self, log: &StepLog) -> Result<(), RepositoryError> {
        self.steps.insert(log.id, log.clone());
        Ok(())
    }

    async fn update_step_log(
        &self,
        log_id: &Uuid,
        status: StepStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut log = self.steps.get_mut(log_id).ok_or(RepositoryError::NotFound)?;
        log.status = status;
        log.output = output.cloned();
        log.error = error.map(String::from);
        log.completed_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn list_step_logs(&self, run_id: &Uuid) -> Result<Vec<StepLog>, RepositoryError> {
        let mut logs: Vec<StepLog> = self
            .steps
            .iter()
            .filter(|s| s.run_id == *run_id)
            .map(|s| s.clone())
            .collect();
        logs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(logs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
