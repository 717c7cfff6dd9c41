//! Asynchronous event ingestion.
//!
//! `POST /api/v1/events` accepts an event envelope and fires the matching
//! workflow without waiting for it: account changes route to
//! account-updated, everything else to company-updated (whose choice step
//! handles unknown discriminators). The caller only gets an acknowledgement;
//! terminal state is observable through logs, events, and run records.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;

use profisync_core::workflows::{account_updated, company_updated};
use profisync_types::event::EventEnvelope;

use crate::http::error::AppError;
use crate::state::AppState;

/// POST /api/v1/events - Fire-and-forget workflow trigger.
pub async fn ingest_event(
    State(state): State<AppState>,
    Json(envelope): Json<EventEnvelope>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let workflow = route_event(&envelope.detail_type);
    let definition = state
        .registry
        .get(workflow)
        .ok_or_else(|| AppError::Internal(format!("workflow '{workflow}' not registered")))?;

    let input = serde_json::to_value(&envelope)
        .map_err(|e| AppError::Internal(format!("bad envelope: {e}")))?;

    let engine = state.engine.clone();
    let workflow_name = workflow.to_string();
    tokio::spawn(async move {
        if let Err(e) = engine.execute(&definition, "event", input).await {
            tracing::error!(
                workflow = workflow_name.as_str(),
                error = %e,
                "event-triggered run aborted"
            );
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "workflow": workflow })),
    ))
}

/// Which workflow handles an envelope with this discriminator.
pub fn route_event(detail_type: &str) -> &'static str {
    match detail_type {
        "AccountUpdated" => account_updated::WORKFLOW_NAME,
        _ => company_updated::WORKFLOW_NAME,
    }
}
