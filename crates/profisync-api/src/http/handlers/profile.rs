//! Synchronous profile-creation endpoint.
//!
//! `POST /api/v1/profiles` runs the user-creation workflow and renders the
//! final context's `response` sub-tree into the transport response: a
//! `statusCode` of 400 becomes an HTTP 400 with the error message, anything
//! else becomes an HTTP 200 carrying the body fields. Workflow-internal
//! error categories never leak to the caller.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use profisync_core::workflows::user_creation;
use profisync_types::workflow::RunStatus;

use crate::http::error::AppError;
use crate::state::AppState;

/// POST /api/v1/profiles - Create a profile and its directory identity.
pub async fn create_profile(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    for field in ["firstName", "lastName", "emailAddress"] {
        if body.get(field).and_then(Value::as_str).is_none() {
            return Err(AppError::Validation(format!(
                "request body is missing '{field}'"
            )));
        }
    }

    let definition = state
        .registry
        .get(user_creation::WORKFLOW_NAME)
        .ok_or_else(|| AppError::Internal("user-creation workflow not registered".to_string()))?;

    let result = state.engine.execute(&definition, "api", body).await?;

    if result.status != RunStatus::Succeeded {
        // Fatal outcomes (e.g. a timeout) have no shaped response; the
        // detail stays in the logs and run records.
        tracing::error!(run_id = %result.run_id, "user creation run failed");
        return Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "error creating user" })),
        )
            .into_response());
    }

    Ok(render_response(&result.output))
}

/// Map the final context's `response` sub-tree onto the HTTP response.
pub fn render_response(output: &Value) -> Response {
    let Some(response) = output.get("response") else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "workflow produced no response" })),
        )
            .into_response();
    };

    if response.get("statusCode").and_then(Value::as_i64) == Some(400) {
        let message = response
            .get("message")
            .cloned()
            .unwrap_or_else(|| json!("error creating user"));
        return (StatusCode::BAD_REQUEST, Json(json!({ "message": message }))).into_response();
    }

    let body = response.get("body").cloned().unwrap_or_else(|| json!({}));
    (StatusCode::OK, Json(body)).into_response()
}
