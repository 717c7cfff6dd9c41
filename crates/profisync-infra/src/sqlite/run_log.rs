//! SQLite run repository implementation.
//!
//! Implements `RunRepository` from `profisync-core` using sqlx with split
//! read/write pools. Inputs, outputs, and step payloads are stored as JSON
//! blobs; timestamps as RFC 3339 text.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use profisync_core::repository::RunRepository;
use profisync_types::error::RepositoryError;
use profisync_types::workflow::{RunStatus, StepLog, StepStatus, WorkflowRun};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `RunRepository`.
pub struct SqliteRunRepository {
    pool: DatabasePool,
}

impl SqliteRunRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn parse_uuid(raw: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(raw).map_err(|_| RepositoryError::Query(format!("invalid uuid: {raw}")))
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RepositoryError::Query(format!("invalid timestamp: {raw}")))
}

fn parse_json(raw: &str) -> Result<Value, RepositoryError> {
    serde_json::from_str(raw).map_err(|e| RepositoryError::Query(format!("invalid JSON: {e}")))
}

fn status_str<S: serde::Serialize>(status: &S) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default()
}

fn parse_status<S: serde::de::DeserializeOwned>(raw: &str) -> Result<S, RepositoryError> {
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|_| RepositoryError::Query(format!("invalid status: {raw}")))
}

fn run_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowRun, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let status: String = row.try_get("status").map_err(query_err)?;
    let input: String = row.try_get("input").map_err(query_err)?;
    let output: Option<String> = row.try_get("output").map_err(query_err)?;
    let started_at: String = row.try_get("started_at").map_err(query_err)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(query_err)?;

    Ok(WorkflowRun {
        id: parse_uuid(&id)?,
        workflow_name: row.try_get("workflow_name").map_err(query_err)?,
        status: parse_status::<RunStatus>(&status)?,
        trigger: row.try_get("trigger_type").map_err(query_err)?,
        input: parse_json(&input)?,
        output: output.as_deref().map(parse_json).transpose()?,
        started_at: parse_datetime(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_datetime).transpose()?,
        error: row.try_get("error").map_err(query_err)?,
    })
}

fn step_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StepLog, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let run_id: String = row.try_get("run_id").map_err(query_err)?;
    let status: String = row.try_get("status").map_err(query_err)?;
    let attempt: i64 = row.try_get("attempt").map_err(query_err)?;
    let output: Option<String> = row.try_get("output").map_err(query_err)?;
    let started_at: String = row.try_get("started_at").map_err(query_err)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(query_err)?;

    Ok(StepLog {
        id: parse_uuid(&id)?,
        run_id: parse_uuid(&run_id)?,
        step_id: row.try_get("step_id").map_err(query_err)?,
        status: parse_status::<StepStatus>(&status)?,
        attempt: attempt as u32,
        output: output.as_deref().map(parse_json).transpose()?,
        error: row.try_get("error").map_err(query_err)?,
        started_at: parse_datetime(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_datetime).transpose()?,
    })
}

// ---------------------------------------------------------------------------
// RunRepository implementation
// ---------------------------------------------------------------------------

impl RunRepository for SqliteRunRepository {
    async fn create_run(&self, run: &WorkflowRun) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO workflow_runs
                (id, workflow_name, status, trigger_type, input, output, started_at, completed_at, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(run.id.to_string())
        .bind(&run.workflow_name)
        .bind(status_str(&run.status))
        .bind(&run.trigger)
        .bind(run.input.to_string())
        .bind(run.output.as_ref().map(|v| v.to_string()))
        .bind(run.started_at.to_rfc3339())
        .bind(run.completed_at.map(|t| t.to_rfc3339()))
        .bind(run.error.as_deref())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn update_run(
        &self,
        run_id: &Uuid,
        status: RunStatus,
        error: Option<&str>,
        output: Option<&Value>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE workflow_runs
             SET status = ?1, error = ?2, output = ?3, completed_at = ?4
             WHERE id = ?5",
        )
        .bind(status_str(&status))
        .bind(error)
        .bind(output.map(|v| v.to_string()))
        .bind(Utc::now().to_rfc3339())
        .bind(run_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<WorkflowRun>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_runs WHERE id = ?1")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn list_runs(
        &self,
        workflow: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let rows = match workflow {
            Some(name) => {
                sqlx::query(
                    "SELECT * FROM workflow_runs WHERE workflow_name = ?1
                     ORDER BY started_at DESC LIMIT ?2",
                )
                .bind(name)
                .bind(limit)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM workflow_runs ORDER BY started_at DESC LIMIT ?1")
                    .bind(limit)
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(query_err)?;
        rows.iter().map(run_from_row).collect()
    }

    async fn create_step_log(&self, log: &StepLog) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO workflow_step_logs
                (id, run_id, step_id, status, attempt, output, error, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(log.id.to_string())
        .bind(log.run_id.to_string())
        .bind(&log.step_id)
        .bind(status_str(&log.status))
        .bind(log.attempt as i64)
        .bind(log.output.as_ref().map(|v| v.to_string()))
        .bind(log.error.as_deref())
        .bind(log.started_at.to_rfc3339())
        .bind(log.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn update_step_log(
        &self,
        log_id: &Uuid,
        status: StepStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE workflow_step_logs
             SET status = ?1, output = ?2, error = ?3, completed_at = ?4
             WHERE id = ?5",
        )
        .bind(status_str(&status))
        .bind(output.map(|v| v.to_string()))
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(log_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_step_logs(&self, run_id: &Uuid) -> Result<Vec<StepLog>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_step_logs WHERE run_id = ?1 ORDER BY started_at ASC, id ASC",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;
        rows.iter().map(step_from_row).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_repo() -> (tempfile::TempDir, SqliteRunRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteRunRepository::new(pool))
    }

    fn sample_run() -> WorkflowRun {
        WorkflowRun {
            id: Uuid::now_v7(),
            workflow_name: "user-creation".to_string(),
            status: RunStatus::Running,
            trigger: "api".to_string(),
            input: json!({ "firstName": "A" }),
            output: None,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_run_roundtrip_and_update() {
        let (_dir, repo) = test_repo().await;
        let run = sample_run();
        repo.create_run(&run).await.unwrap();

        let loaded = repo.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded.workflow_name, "user-creation");
        assert_eq!(loaded.status, RunStatus::Running);
        assert_eq!(loaded.input, json!({ "firstName": "A" }));

        repo.update_run(
            &run.id,
            RunStatus::Succeeded,
            None,
            Some(&json!({ "response": { "statusCode": 200 } })),
        )
        .await
        .unwrap();

        let loaded = repo.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Succeeded);
        assert!(loaded.completed_at.is_some());
        assert_eq!(
            loaded.output.unwrap()["response"]["statusCode"],
            json!(200)
        );
    }

    #[tokio::test]
    async fn test_update_missing_run_is_not_found() {
        let (_dir, repo) = test_repo().await;
        let err = repo
            .update_run(&Uuid::now_v7(), RunStatus::Failed, Some("boom"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_list_runs_filters_and_orders() {
        let (_dir, repo) = test_repo().await;
        for _ in 0..3 {
            repo.create_run(&sample_run()).await.unwrap();
        }
        let mut other = sample_run();
        other.workflow_name = "company-updated".to_string();
        repo.create_run(&other).await.unwrap();

        let filtered = repo.list_runs(Some("user-creation"), 10).await.unwrap();
        assert_eq!(filtered.len(), 3);

        let limited = repo.list_runs(None, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_step_log_roundtrip() {
        let (_dir, repo) = test_repo().await;
        let run = sample_run();
        repo.create_run(&run).await.unwrap();

        let log = StepLog {
            id: Uuid::now_v7(),
            run_id: run.id,
            step_id: "find-last-id".to_string(),
            status: StepStatus::Running,
            attempt: 1,
            output: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        repo.create_step_log(&log).await.unwrap();
        repo.update_step_log(
            &log.id,
            StepStatus::Succeeded,
            Some(&json!({ "item": { "lastId": 41 } })),
            None,
        )
        .await
        .unwrap();

        let logs = repo.list_step_logs(&run.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, StepStatus::Succeeded);
        assert_eq!(logs[0].output.as_ref().unwrap()["item"]["lastId"], 41);
    }
}
