//! The user-creation workflow.
//!
//! Synchronous flow behind the profile-creation front door:
//!
//! ```text
//! find-last-id -> create-profile -> create-identity -> api-pass
//!                      |catch             |catch
//!                      v                  v
//!                correct-last-id    rollback-profile -> api-failure
//!                      |
//!                      v
//!                 find-last-id (re-enter allocation)
//! ```
//!
//! Sequence allocation is read-increment-write-verify: read the counter
//! under a consistent read, compute `userId = lastId + 1` in the selector,
//! and let the profile write condition on the counter still holding the
//! read value. A conflicting run triggers the counter correction and a
//! fresh allocation. A duplicate username in the directory triggers a
//! compensating delete of the just-written profile; the counter is NOT
//! restored on that path, so a rejected creation leaves a gap in the
//! sequence (downstream consumers depend on the gap behavior).

use serde_json::json;

use profisync_types::error::ErrorCategory;
use profisync_types::workflow::{
    CatchBinding, RetryPolicy, StepConfig, StepDefinition, WorkflowDefinition,
};

/// Registered name of this workflow.
pub const WORKFLOW_NAME: &str = "user-creation";

/// Retry used on the profile-creation function: two attempts, fixed 1s apart.
fn function_retry() -> RetryPolicy {
    RetryPolicy {
        on: None,
        max_attempts: 2,
        interval_secs: 1,
        backoff_rate: 1.0,
    }
}

/// Build the user-creation workflow definition.
pub fn definition() -> WorkflowDefinition {
    WorkflowDefinition {
        name: WORKFLOW_NAME.to_string(),
        comment: Some(
            "Creates a profile record and a directory identity for a new user".to_string(),
        ),
        start_at: "find-last-id".to_string(),
        timeout_secs: Some(30),
        steps: vec![
            find_last_id(),
            create_profile(),
            correct_last_id(),
            create_identity(),
            rollback_profile(),
            api_pass(),
            api_failure(),
        ],
    }
}

/// Consistent read of the counter item; the selector computes the id this
/// run will claim via an exact-integer add.
fn find_last_id() -> StepDefinition {
    StepDefinition {
        id: "find-last-id".to_string(),
        comment: Some("Reads the current lastId and computes the next candidate id".to_string()),
        config: StepConfig::ServiceCall {
            service: "profile-store".to_string(),
            action: "get".to_string(),
            parameters: json!({
                "key": "profile-meta",
                "consistent": true,
            }),
            result_selector: Some(json!({
                "previousUserId": "$.item.lastId",
                "userId": "{{ $.item.lastId + 1 }}",
            })),
            result_path: Some("$.context".to_string()),
        },
        next: Some("create-profile".to_string()),
        end: false,
        retry: vec![],
        catch: vec![],
    }
}

/// Writes the profile record, claiming the candidate id. The function's
/// output replaces the whole context (it passes the input through with the
/// allocated id hoisted to the top level).
fn create_profile() -> StepDefinition {
    StepDefinition {
        id: "create-profile".to_string(),
        comment: Some("Creates the user in the profile store".to_string()),
        config: StepConfig::FunctionInvoke {
            function: "user-creator".to_string(),
            payload: None,
            result_path: None,
        },
        next: Some("create-identity".to_string()),
        end: false,
        retry: vec![function_retry()],
        catch: vec![CatchBinding {
            on: Some(vec![
                ErrorCategory::ConditionalCheckFailed,
                ErrorCategory::TransactionCanceled,
            ]),
            next: "correct-last-id".to_string(),
            result_path: Some("$.error".to_string()),
        }],
    }
}

/// Compare-and-swap the counter back before re-entering allocation:
/// set `lastId` to the id this run attempted, conditioned on the counter
/// still holding the value this run originally read.
fn correct_last_id() -> StepDefinition {
    StepDefinition {
        id: "correct-last-id".to_string(),
        comment: Some("Self-heals the shared counter after a lost allocation race".to_string()),
        config: StepConfig::ServiceCall {
            service: "profile-store".to_string(),
            action: "conditional_update".to_string(),
            parameters: json!({
                "key": "profile-meta",
                "field": "lastId",
                "expected": "$.context.previousUserId",
                "new": "$.context.userId",
            }),
            result_selector: None,
            result_path: Some("$.results".to_string()),
        },
        next: Some("find-last-id".to_string()),
        end: false,
        retry: vec![],
        catch: vec![],
    }
}

fn create_identity() -> StepDefinition {
    StepDefinition {
        id: "create-identity".to_string(),
        comment: Some("Creates the directory user named after the allocated id".to_string()),
        config: StepConfig::ServiceCall {
            service: "identity-directory".to_string(),
            action: "create_user".to_string(),
            parameters: json!({
                "username": "{{ $.userId }}",
                "attributes": [
                    { "name": "email", "value": "$.emailAddress" },
                    { "name": "email_verified", "value": "true" },
                ],
            }),
            result_selector: None,
            result_path: Some("$.directoryOutput".to_string()),
        },
        next: Some("api-pass".to_string()),
        end: false,
        retry: vec![],
        catch: vec![CatchBinding {
            on: Some(vec![ErrorCategory::DuplicateIdentity]),
            next: "rollback-profile".to_string(),
            result_path: Some("$.error".to_string()),
        }],
    }
}

/// Compensating delete of the just-written profile record. The counter is
/// deliberately left where the failed allocation moved it.
fn rollback_profile() -> StepDefinition {
    StepDefinition {
        id: "rollback-profile".to_string(),
        comment: Some("Deletes the orphaned profile record".to_string()),
        config: StepConfig::ServiceCall {
            service: "profile-store".to_string(),
            action: "delete".to_string(),
            parameters: json!({
                "key": "profile#{{ $.context.userId }}",
            }),
            result_selector: None,
            result_path: Some("$.results".to_string()),
        },
        next: Some("api-failure".to_string()),
        end: false,
        retry: vec![],
        catch: vec![],
    }
}

/// Final state of a successful run, mapping the outputs into a response
/// payload.
fn api_pass() -> StepDefinition {
    StepDefinition {
        id: "api-pass".to_string(),
        comment: Some(
            "Final state of a successful run that maps the outputs into a response payload"
                .to_string(),
        ),
        config: StepConfig::Pass {
            payload: json!({
                "response": {
                    "statusCode": 200,
                    "body": {
                        "firstName": "$.firstName",
                        "lastName": "$.lastName",
                        "emailAddress": "$.emailAddress",
                        "userId": "$.userId",
                    },
                },
            }),
            result_path: None,
        },
        next: None,
        end: true,
        retry: vec![],
        catch: vec![],
    }
}

/// Final state of a failed run, mapping the outputs into a response payload.
fn api_failure() -> StepDefinition {
    StepDefinition {
        id: "api-failure".to_string(),
        comment: Some(
            "Final state of a failed run that maps the outputs into a response payload"
                .to_string(),
        ),
        config: StepConfig::Pass {
            payload: json!({
                "response": {
                    "message": "error creating user",
                    "statusCode": 400,
                },
            }),
            result_path: None,
        },
        next: None,
        end: true,
        retry: vec![],
        catch: vec![],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
