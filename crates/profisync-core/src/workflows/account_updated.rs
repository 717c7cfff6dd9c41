//! The account-updated workflow.
//!
//! Asynchronous flow behind account-change events:
//!
//! ```text
//! find-profile -> update-identity -> update-profile
//!                                         |catch
//!                                         v
//!                                  rollback-identity -> update-failed (Fail)
//! ```
//!
//! The directory is updated before the profile store. When the profile
//! write then loses its concurrency check, the compensating update reverts
//! the directory attribute to the value held by the record read at the
//! start of the run, and the run halts at a Fail terminal -- the profile
//! write is not re-attempted.

use serde_json::json;

use profisync_types::error::ErrorCategory;
use profisync_types::workflow::{
    CatchBinding, RetryPolicy, StepConfig, StepDefinition, WorkflowDefinition,
};

/// Registered name of this workflow.
pub const WORKFLOW_NAME: &str = "account-updated";

fn function_retry() -> RetryPolicy {
    RetryPolicy {
        on: None,
        max_attempts: 2,
        interval_secs: 1,
        backoff_rate: 1.0,
    }
}

/// Build the account-updated workflow definition.
pub fn definition() -> WorkflowDefinition {
    WorkflowDefinition {
        name: WORKFLOW_NAME.to_string(),
        comment: Some(
            "Propagates an account change to the directory and the profile store".to_string(),
        ),
        start_at: "find-profile".to_string(),
        timeout_secs: Some(30),
        steps: vec![
            find_profile(),
            update_identity(),
            update_profile(),
            rollback_identity(),
            update_failed(),
        ],
    }
}

/// Reads the current profile record; the rollback path sources the
/// pre-change attribute values from here.
fn find_profile() -> StepDefinition {
    StepDefinition {
        id: "find-profile".to_string(),
        comment: Some("Reads the profile record as it was before this change".to_string()),
        config: StepConfig::ServiceCall {
            service: "profile-store".to_string(),
            action: "get".to_string(),
            parameters: json!({
                "key": "profile#{{ $.detail.messageBody.userName }}",
            }),
            result_selector: None,
            result_path: Some("$.record".to_string()),
        },
        next: Some("update-identity".to_string()),
        end: false,
        retry: vec![],
        catch: vec![],
    }
}

fn update_identity() -> StepDefinition {
    StepDefinition {
        id: "update-identity".to_string(),
        comment: Some("Applies the new email address to the directory user".to_string()),
        config: StepConfig::ServiceCall {
            service: "identity-directory".to_string(),
            action: "update_user_attributes".to_string(),
            parameters: json!({
                "username": "{{ $.detail.messageBody.userName }}",
                "attributes": [
                    { "name": "email", "value": "$.detail.messageBody.emailAddress" },
                ],
            }),
            result_selector: None,
            result_path: Some("$.directoryOutput".to_string()),
        },
        next: Some("update-profile".to_string()),
        end: false,
        retry: vec![],
        catch: vec![],
    }
}

fn update_profile() -> StepDefinition {
    StepDefinition {
        id: "update-profile".to_string(),
        comment: Some("Updates the user in the profile store".to_string()),
        config: StepConfig::FunctionInvoke {
            function: "user-updater".to_string(),
            payload: None,
            result_path: None,
        },
        next: None,
        end: true,
        retry: vec![function_retry()],
        catch: vec![CatchBinding {
            on: Some(vec![
                ErrorCategory::ConditionalCheckFailed,
                ErrorCategory::TransactionCanceled,
            ]),
            next: "rollback-identity".to_string(),
            result_path: Some("$.error".to_string()),
        }],
    }
}

/// Reverts the directory attribute to its pre-change value, sourced from
/// the record read at the start of the run.
fn rollback_identity() -> StepDefinition {
    StepDefinition {
        id: "rollback-identity".to_string(),
        comment: Some("Restores the directory user's previous email address".to_string()),
        config: StepConfig::ServiceCall {
            service: "identity-directory".to_string(),
            action: "update_user_attributes".to_string(),
            parameters: json!({
                "username": "{{ $.detail.messageBody.userName }}",
                "attributes": [
                    { "name": "email", "value": "$.record.item.emailAddress" },
                ],
            }),
            result_selector: None,
            result_path: Some("$.directoryOutput".to_string()),
        },
        next: Some("update-failed".to_string()),
        end: false,
        retry: vec![],
        catch: vec![],
    }
}

fn update_failed() -> StepDefinition {
    StepDefinition {
        id: "update-failed".to_string(),
        comment: None,
        config: StepConfig::Fail {
            category: Some(ErrorCategory::ConditionalCheckFailed),
            cause: Some("profile store failed to apply the update".to_string()),
        },
        next: None,
        end: false,
        retry: vec![],
        catch: vec![],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
