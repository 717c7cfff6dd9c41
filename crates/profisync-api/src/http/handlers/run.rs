//! Run inspection endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use profisync_core::repository::RunRepository;

use crate::http::error::AppError;
use crate::state::AppState;

/// GET /api/v1/workflows - Registered workflow names.
pub async fn list_workflows(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "workflows": state.registry.names() }))
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub workflow: Option<String>,
    pub limit: Option<u32>,
}

/// GET /api/v1/runs - Recent runs, optionally filtered by workflow.
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Value>, AppError> {
    let runs = state
        .repo
        .list_runs(query.workflow.as_deref(), query.limit.unwrap_or(20))
        .await?;
    Ok(Json(json!({ "runs": runs })))
}

/// GET /api/v1/runs/{id} - One run with its step logs.
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let run_id = Uuid::parse_str(&id)
        .map_err(|_| AppError::Validation(format!("invalid run id '{id}'")))?;

    let run = state
        .repo
        .get_run(&run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no run with id '{id}'")))?;
    let steps = state.repo.list_step_logs(&run_id).await?;

    Ok(Json(json!({ "run": run, "steps": steps })))
}
