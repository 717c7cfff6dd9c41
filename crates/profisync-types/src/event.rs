//! Engine lifecycle events and the asynchronous trigger envelope.
//!
//! `EngineEvent` is what the engine publishes on its broadcast bus at each
//! run/step transition; asynchronous callers observe terminal state through
//! these events and the run records, never through a return value.
//! `EventEnvelope` is the input document handed to the engine by event-bus
//! style triggers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ErrorCategory;

// ---------------------------------------------------------------------------
// EngineEvent
// ---------------------------------------------------------------------------

/// Lifecycle event emitted by the workflow engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    RunStarted {
        run_id: Uuid,
        workflow: String,
        trigger: String,
    },
    StepStarted {
        run_id: Uuid,
        step_id: String,
        attempt: u32,
    },
    StepSucceeded {
        run_id: Uuid,
        step_id: String,
        duration_ms: u64,
    },
    /// A failed attempt will be replayed after the backoff delay.
    StepRetrying {
        run_id: Uuid,
        step_id: String,
        attempt: u32,
        delay_ms: u64,
        category: ErrorCategory,
    },
    StepFailed {
        run_id: Uuid,
        step_id: String,
        category: ErrorCategory,
        message: String,
    },
    /// A catch binding redirected the run into a compensation step.
    CompensationTriggered {
        run_id: Uuid,
        step_id: String,
        fallback: String,
        category: ErrorCategory,
    },
    RunSucceeded {
        run_id: Uuid,
        workflow: String,
        duration_ms: u64,
    },
    RunFailed {
        run_id: Uuid,
        workflow: String,
        category: ErrorCategory,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// EventEnvelope
// ---------------------------------------------------------------------------

/// Input document for asynchronous triggers.
///
/// `detail_type` is the discriminator the company-updated workflow branches
/// on; `detail` carries the event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub detail_type: String,
    pub detail: Value,
}

impl EventEnvelope {
    pub fn new(detail_type: impl Into<String>, detail: Value) -> Self {
        Self {
            detail_type: detail_type.into(),
            detail,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
