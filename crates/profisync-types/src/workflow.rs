//! Workflow domain types for Profisync.
//!
//! Defines the canonical intermediate representation for workflows: a named
//! transition graph of typed steps with per-step retry policies and catch
//! bindings. The three built-in workflows (user-creation, account-updated,
//! company-updated) are constructed in profisync-core as values of these
//! types; YAML files convert to and from the same struct. This module also
//! contains execution tracking types (`WorkflowRun`, `StepLog`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ErrorCategory;

// ---------------------------------------------------------------------------
// Workflow Definition (canonical IR)
// ---------------------------------------------------------------------------

/// The canonical workflow definition: a named graph of steps with one entry
/// step and one or more terminal steps.
///
/// Immutable once registered; never mutated at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name (alphanumeric and hyphens). Unique within a registry.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// ID of the entry step.
    pub start_at: String,
    /// Run-level wall-clock budget in seconds (default 30).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// The steps forming the transition graph.
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Look up a step by its ID.
    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A single node in the transition graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step ID (e.g. "find-last-id"). Unique within a workflow.
    pub id: String,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// The kind of step and its configuration payload.
    pub config: StepConfig,
    /// ID of the next step. Required unless `end` is set or the step is a
    /// Choice/Succeed/Fail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Marks a step as terminal-on-success (the run succeeds after it).
    #[serde(default)]
    pub end: bool,
    /// Retry policies evaluated in order on failure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<RetryPolicy>,
    /// Catch bindings evaluated once retries are exhausted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<CatchBinding>,
}

/// Step-specific configuration payload, internally tagged by `type`:
///
/// ```yaml
/// config:
///   type: service_call
///   service: profile-store
///   action: get
///   parameters:
///     key: profile-meta
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    /// Invoke a backend operation with a parameter template rendered against
    /// the run context.
    ServiceCall {
        /// Backend name ("profile-store", "identity-directory").
        service: String,
        /// Backend operation name.
        action: String,
        /// Parameter template (path strings and `{{ ... }}` interpolations).
        parameters: Value,
        /// Optional projection applied to the raw result before merging.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result_selector: Option<Value>,
        /// Where the (projected) result is merged into the context.
        /// Absent means the result replaces the whole context.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result_path: Option<String>,
    },
    /// Invoke an external business function.
    FunctionInvoke {
        /// Registered function name.
        function: String,
        /// Input template; absent sends the whole context.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        /// Where the output is merged; absent means the output replaces the
        /// whole context.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result_path: Option<String>,
    },
    /// Branch on the first matching rule, in declaration order.
    Choice {
        rules: Vec<ChoiceRule>,
        /// Target when no rule matches. A Choice with no `otherwise` and no
        /// matching rule is a definition error at run time.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<String>,
    },
    /// Transform the context without an external call.
    Pass {
        /// Payload template rendered against the context.
        payload: Value,
        /// Where the rendered payload is merged; absent replaces the context.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result_path: Option<String>,
    },
    /// Terminal success.
    Succeed {},
    /// Terminal failure with an optional cause.
    Fail {
        /// Taxonomy bucket reported for the failed run (default FunctionError).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<ErrorCategory>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
}

impl StepConfig {
    /// Whether this step halts the run by itself.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepConfig::Succeed {} | StepConfig::Fail { .. })
    }
}

/// A single condition in a Choice step: exact string equality on the value
/// at `variable`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceRule {
    /// Context path of the discriminator field (e.g. "$.detailType").
    pub variable: String,
    /// The string the discriminator must equal.
    pub equals: String,
    /// Target step when the rule matches.
    pub next: String,
}

// ---------------------------------------------------------------------------
// Retry Configuration
// ---------------------------------------------------------------------------

/// Retry policy attached to a single step.
///
/// Wait before attempt n+1 is `interval_secs * backoff_rate^(n-1)`; a
/// backoff rate of 1 means a constant interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Error categories this policy covers; `None` matches every category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<Vec<ErrorCategory>>,
    /// Maximum number of attempts, including the first (default 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base wait between attempts in seconds (default 1).
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Multiplier applied to the interval per attempt (default 2.0).
    #[serde(default = "default_backoff_rate")]
    pub backoff_rate: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_interval_secs() -> u64 {
    1
}

fn default_backoff_rate() -> f64 {
    2.0
}

// ---------------------------------------------------------------------------
// Catch Configuration
// ---------------------------------------------------------------------------

/// Failure handler attached to a single step: redirects execution to a
/// fallback step instead of aborting the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchBinding {
    /// Error categories this binding covers; `None` matches every category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<Vec<ErrorCategory>>,
    /// Fallback step to transition to.
    pub next: String,
    /// Where the error record is written into the context before the
    /// transition; absent replaces the whole context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Workflow Execution Status
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

/// Status of a single step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Succeeded,
    Failed,
}

// ---------------------------------------------------------------------------
// Workflow Run (audit record)
// ---------------------------------------------------------------------------

/// A single execution instance of a workflow. Used for query results and
/// audit; runs are short-lived, so these records exist for observability,
/// not for resumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// UUIDv7 run ID.
    pub id: Uuid,
    /// Name of the workflow being executed.
    pub workflow_name: String,
    /// Current run status.
    pub status: RunStatus,
    /// How this run was triggered (e.g. "api", "event", "cli").
    pub trigger: String,
    /// The caller's original input document.
    pub input: Value,
    /// Final context document (None while running).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal error text if the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Execution log for a single step attempt within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLog {
    /// UUIDv7 log entry ID.
    pub id: Uuid,
    /// Parent workflow run ID.
    pub run_id: Uuid,
    /// Step ID matching `StepDefinition.id`.
    pub step_id: String,
    /// Current attempt status.
    pub status: StepStatus,
    /// Attempt number (1-based, increments on retry).
    pub attempt: u32,
    /// Step output, when it succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error text, when it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
