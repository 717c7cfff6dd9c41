//! The workflow engine: a pure interpreter over `WorkflowDefinition` data.
//!
//! Drives a `RunContext` through the transition graph one step at a time:
//! parameters render once per step, each attempt is wrapped by the step's
//! retry policies, exhausted or unmatched failures consult the catch
//! bindings, and a step entered through a catch is single-shot -- if the
//! compensation itself fails, the run halts fatally. The whole run is
//! bounded by a wall-clock budget; expiry surfaces as a failed run with the
//! `Timeout` category, distinct from every business failure.
//!
//! There is no intra-run parallelism and no cross-run shared state inside
//! the engine: concurrent runs contend only through the collaborators'
//! conditional writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use profisync_types::error::{ErrorCategory, ErrorRecord};
use profisync_types::event::EngineEvent;
use profisync_types::workflow::{
    RunStatus, StepConfig, StepDefinition, WorkflowDefinition, WorkflowRun,
};

use crate::collaborator::{FunctionInvoker, ServiceBackend};
use crate::context::{ContextError, RunContext};
use crate::event::bus::EventBus;
use crate::path::JsonPath;
use crate::recorder::{RecorderError, RunRecorder};
use crate::repository::RunRepository;
use crate::retry::RetryHandler;
use crate::template::{self, TemplateError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default run-level wall-clock budget (30 seconds).
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Result of a completed workflow run.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// The workflow run ID.
    pub run_id: Uuid,
    /// Terminal status of the run.
    pub status: RunStatus,
    /// The final context document (the `$.response` sub-tree is what
    /// synchronous callers render).
    pub output: Value,
    /// The terminal failure, when the run failed.
    pub error: Option<ErrorRecord>,
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Definition-level and infrastructure errors that abort a run outright.
///
/// Business failures travel as `ErrorRecord`s through retry/catch handling
/// and end up in `ExecutionResult::error`; these do not.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A transition targeted a step that does not exist.
    #[error("unknown workflow step '{0}'")]
    UnknownStep(String),

    /// A ServiceCall named a backend that is not registered.
    #[error("unknown service backend '{0}'")]
    UnknownService(String),

    /// A Choice had no matching rule and no otherwise target.
    #[error("no choice rule matched and step '{0}' has no otherwise target")]
    ChoiceUnmatched(String),

    /// A non-terminal step had no transition out.
    #[error("step '{0}' has no next step and is not marked end")]
    MissingTransition(String),

    /// A template failed to render against the run context.
    #[error("step '{step_id}': {source}")]
    Template {
        step_id: String,
        source: TemplateError,
    },

    /// A context merge failed.
    #[error("step '{step_id}': {source}")]
    Context {
        step_id: String,
        source: ContextError,
    },

    /// The audit recorder failed.
    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// How a run ended, before status mapping.
enum Terminal {
    Succeeded,
    Failed(ErrorRecord),
}

/// The workflow engine.
///
/// Generic over `R: RunRepository` for audit storage flexibility. Backends
/// are registered by service name; `ServiceCall` steps dispatch through
/// them, `FunctionInvoke` steps through the function invoker.
pub struct Engine<R: RunRepository> {
    recorder: RunRecorder<R>,
    backends: HashMap<String, Arc<dyn ServiceBackend>>,
    functions: Arc<dyn FunctionInvoker>,
    event_bus: EventBus,
}

impl<R: RunRepository + 'static> Engine<R> {
    /// Create an engine with no backends registered.
    pub fn new(repo: Arc<R>, functions: Arc<dyn FunctionInvoker>, event_bus: EventBus) -> Self {
        Self {
            recorder: RunRecorder::new(repo),
            backends: HashMap::new(),
            functions,
            event_bus,
        }
    }

    /// Register a service backend under the name `ServiceCall` steps use.
    pub fn with_backend(
        mut self,
        service: impl Into<String>,
        backend: Arc<dyn ServiceBackend>,
    ) -> Self {
        self.backends.insert(service.into(), backend);
        self
    }

    /// The engine's event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Execute a workflow definition against a caller input document.
    ///
    /// Returns `Ok` for both succeeded and failed runs -- a failed run is a
    /// normal outcome carrying its terminal `ErrorRecord`. `Err` is reserved
    /// for definition-level and infrastructure faults.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        trigger: &str,
        input: Value,
    ) -> Result<ExecutionResult, EngineError> {
        let run_id = Uuid::now_v7();
        let mut ctx = RunContext::new(definition.name.clone(), run_id, input.clone());

        let run = WorkflowRun {
            id: run_id,
            workflow_name: definition.name.clone(),
            status: RunStatus::Running,
            trigger: trigger.to_string(),
            input,
            output: None,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        };
        self.recorder.record_run_started(&run).await?;
        self.event_bus.publish(EngineEvent::RunStarted {
            run_id,
            workflow: definition.name.clone(),
            trigger: trigger.to_string(),
        });
        tracing::info!(
            run_id = %run_id,
            workflow = definition.name.as_str(),
            trigger,
            "starting workflow run"
        );

        let budget = Duration::from_secs(
            definition.timeout_secs.unwrap_or(DEFAULT_RUN_TIMEOUT_SECS),
        );
        let run_start = std::time::Instant::now();

        let outcome = tokio::time::timeout(budget, self.drive(definition, run_id, &mut ctx)).await;

        let terminal = match outcome {
            Ok(Ok(terminal)) => terminal,
            Ok(Err(engine_err)) => {
                let message = engine_err.to_string();
                let _ = self
                    .recorder
                    .record_run_finished(
                        run_id,
                        RunStatus::Failed,
                        Some(&message),
                        Some(ctx.document()),
                    )
                    .await;
                self.event_bus.publish(EngineEvent::RunFailed {
                    run_id,
                    workflow: definition.name.clone(),
                    category: ErrorCategory::InvalidRequest,
                    message,
                });
                return Err(engine_err);
            }
            Err(_elapsed) => Terminal::Failed(ErrorRecord::new(
                ErrorCategory::Timeout,
                format!("run exceeded its {}s wall-clock budget", budget.as_secs()),
            )),
        };

        let duration_ms = run_start.elapsed().as_millis() as u64;
        match terminal {
            Terminal::Succeeded => {
                self.recorder
                    .record_run_finished(run_id, RunStatus::Succeeded, None, Some(ctx.document()))
                    .await?;
                self.event_bus.publish(EngineEvent::RunSucceeded {
                    run_id,
                    workflow: definition.name.clone(),
                    duration_ms,
                });
                tracing::info!(run_id = %run_id, duration_ms, "workflow run succeeded");
                Ok(ExecutionResult {
                    run_id,
                    status: RunStatus::Succeeded,
                    output: ctx.into_document(),
                    error: None,
                })
            }
            Terminal::Failed(record) => {
                let message = record.to_string();
                let _ = self
                    .recorder
                    .record_run_finished(
                        run_id,
                        RunStatus::Failed,
                        Some(&message),
                        Some(ctx.document()),
                    )
                    .await;
                self.event_bus.publish(EngineEvent::RunFailed {
                    run_id,
                    workflow: definition.name.clone(),
                    category: record.category,
                    message,
                });
                tracing::warn!(
                    run_id = %run_id,
                    category = %record.category,
                    error = record.message.as_str(),
                    "workflow run failed"
                );
                Ok(ExecutionResult {
                    run_id,
                    status: RunStatus::Failed,
                    output: ctx.into_document(),
                    error: Some(record),
                })
            }
        }
    }

    /// Walk the transition graph until a terminal state.
    async fn drive(
        &self,
        definition: &WorkflowDefinition,
        run_id: Uuid,
        ctx: &mut RunContext,
    ) -> Result<Terminal, EngineError> {
        let mut current = definition.start_at.clone();
        // Set when the current step was entered through a catch binding:
        // compensation steps get no retries and no catches of their own.
        let mut via_catch = false;

        loop {
            let step = definition
                .step(&current)
                .ok_or_else(|| EngineError::UnknownStep(current.clone()))?;

            match &step.config {
                StepConfig::Succeed {} => {
                    let log_id = self
                        .recorder
                        .record_step_started(run_id, &step.id, 1)
                        .await?;
                    self.recorder.record_step_succeeded(log_id, None).await?;
                    return Ok(Terminal::Succeeded);
                }

                StepConfig::Fail { category, cause } => {
                    let record = ErrorRecord::new(
                        category.unwrap_or(ErrorCategory::FunctionError),
                        cause.clone().unwrap_or_else(|| "workflow failed".to_string()),
                    );
                    let log_id = self
                        .recorder
                        .record_step_started(run_id, &step.id, 1)
                        .await?;
                    self.recorder
                        .record_step_failed(log_id, &record.to_string())
                        .await?;
                    return Ok(Terminal::Failed(record));
                }

                StepConfig::Choice { rules, otherwise } => {
                    let log_id = self
                        .recorder
                        .record_step_started(run_id, &step.id, 1)
                        .await?;
                    let target = rules
                        .iter()
                        .find(|rule| {
                            JsonPath::parse(&rule.variable)
                                .ok()
                                .and_then(|p| ctx.read(&p))
                                .and_then(Value::as_str)
                                .is_some_and(|v| v == rule.equals)
                        })
                        .map(|rule| rule.next.clone())
                        .or_else(|| otherwise.clone());

                    let Some(target) = target else {
                        self.recorder
                            .record_step_failed(log_id, "no choice rule matched")
                            .await?;
                        return Err(EngineError::ChoiceUnmatched(step.id.clone()));
                    };

                    self.recorder
                        .record_step_succeeded(log_id, Some(&json!({ "selected": target })))
                        .await?;
                    tracing::debug!(run_id = %run_id, step_id = step.id.as_str(), target = target.as_str(), "choice selected");
                    via_catch = false;
                    current = target;
                }

                StepConfig::Pass {
                    payload,
                    result_path,
                } => {
                    let log_id = self
                        .recorder
                        .record_step_started(run_id, &step.id, 1)
                        .await?;
                    let rendered = self.render(&step.id, payload, ctx.document())?;
                    self.merge(&step.id, ctx, result_path.as_deref(), rendered.clone())?;
                    self.recorder
                        .record_step_succeeded(log_id, Some(&rendered))
                        .await?;
                    via_catch = false;
                    match self.advance(step)? {
                        Some(next) => current = next,
                        None => return Ok(Terminal::Succeeded),
                    }
                }

                StepConfig::ServiceCall { .. } | StepConfig::FunctionInvoke { .. } => {
                    match self.run_call_step(run_id, step, ctx, via_catch).await? {
                        Ok(()) => {
                            via_catch = false;
                            match self.advance(step)? {
                                Some(next) => current = next,
                                None => return Ok(Terminal::Succeeded),
                            }
                        }
                        Err(record) => {
                            if !via_catch {
                                if let Some(binding) =
                                    RetryHandler::matching_catch(&step.catch, record.category)
                                {
                                    self.merge(
                                        &step.id,
                                        ctx,
                                        binding.result_path.as_deref(),
                                        record.to_value(),
                                    )?;
                                    self.event_bus.publish(EngineEvent::CompensationTriggered {
                                        run_id,
                                        step_id: step.id.clone(),
                                        fallback: binding.next.clone(),
                                        category: record.category,
                                    });
                                    tracing::warn!(
                                        run_id = %run_id,
                                        step_id = step.id.as_str(),
                                        fallback = binding.next.as_str(),
                                        category = %record.category,
                                        "failure caught, transitioning to compensation"
                                    );
                                    current = binding.next.clone();
                                    via_catch = true;
                                    continue;
                                }
                            }
                            return Ok(Terminal::Failed(record));
                        }
                    }
                }
            }
        }
    }

    /// Execute a ServiceCall/FunctionInvoke step: render once, then attempt
    /// with retries. `Ok(Ok(()))` means the result was merged and the run
    /// can advance; `Ok(Err(record))` hands the exhausted failure back for
    /// catch evaluation.
    async fn run_call_step(
        &self,
        run_id: Uuid,
        step: &StepDefinition,
        ctx: &mut RunContext,
        via_catch: bool,
    ) -> Result<Result<(), ErrorRecord>, EngineError> {
        // Parameters render once; retries replay the same rendered call.
        let rendered_input = match &step.config {
            StepConfig::ServiceCall { parameters, .. } => {
                self.render(&step.id, parameters, ctx.document())?
            }
            StepConfig::FunctionInvoke { payload, .. } => match payload {
                Some(template) => self.render(&step.id, template, ctx.document())?,
                None => ctx.document().clone(),
            },
            _ => unreachable!("run_call_step only handles call steps"),
        };

        let mut attempt = 1u32;
        let raw = loop {
            let log_id = self
                .recorder
                .record_step_started(run_id, &step.id, attempt)
                .await?;
            self.event_bus.publish(EngineEvent::StepStarted {
                run_id,
                step_id: step.id.clone(),
                attempt,
            });
            let attempt_start = std::time::Instant::now();

            let result = match &step.config {
                StepConfig::ServiceCall {
                    service, action, ..
                } => {
                    let backend = self
                        .backends
                        .get(service)
                        .ok_or_else(|| EngineError::UnknownService(service.clone()))?;
                    backend.call(action, rendered_input.clone()).await
                }
                StepConfig::FunctionInvoke { function, .. } => {
                    self.functions
                        .invoke(function, rendered_input.clone())
                        .await
                }
                _ => unreachable!(),
            };

            match result {
                Ok(value) => {
                    self.recorder
                        .record_step_succeeded(log_id, Some(&value))
                        .await?;
                    self.event_bus.publish(EngineEvent::StepSucceeded {
                        run_id,
                        step_id: step.id.clone(),
                        duration_ms: attempt_start.elapsed().as_millis() as u64,
                    });
                    break value;
                }
                Err(record) => {
                    self.recorder
                        .record_step_failed(log_id, &record.to_string())
                        .await?;

                    if !via_catch {
                        if let Some(delay) =
                            RetryHandler::next_delay(&step.retry, record.category, attempt)
                        {
                            self.event_bus.publish(EngineEvent::StepRetrying {
                                run_id,
                                step_id: step.id.clone(),
                                attempt,
                                delay_ms: delay.as_millis() as u64,
                                category: record.category,
                            });
                            tracing::debug!(
                                run_id = %run_id,
                                step_id = step.id.as_str(),
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "retrying step after backoff"
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                            continue;
                        }
                    }

                    self.event_bus.publish(EngineEvent::StepFailed {
                        run_id,
                        step_id: step.id.clone(),
                        category: record.category,
                        message: record.message.clone(),
                    });
                    return Ok(Err(record));
                }
            }
        };

        // Project and merge the result.
        let (selector, result_path) = match &step.config {
            StepConfig::ServiceCall {
                result_selector,
                result_path,
                ..
            } => (result_selector.as_ref(), result_path.as_deref()),
            StepConfig::FunctionInvoke { result_path, .. } => (None, result_path.as_deref()),
            _ => unreachable!(),
        };
        let projected = match selector {
            Some(template) => self.render(&step.id, template, &raw)?,
            None => raw,
        };
        self.merge(&step.id, ctx, result_path, projected)?;
        Ok(Ok(()))
    }

    /// The statically configured transition out of a step, or `None` when
    /// the step ends the run.
    fn advance(&self, step: &StepDefinition) -> Result<Option<String>, EngineError> {
        if step.end {
            Ok(None)
        } else {
            step.next
                .clone()
                .map(Some)
                .ok_or_else(|| EngineError::MissingTransition(step.id.clone()))
        }
    }

    fn render(
        &self,
        step_id: &str,
        template: &Value,
        scope: &Value,
    ) -> Result<Value, EngineError> {
        template::render(template, scope).map_err(|source| EngineError::Template {
            step_id: step_id.to_string(),
            source,
        })
    }

    fn merge(
        &self,
        step_id: &str,
        ctx: &mut RunContext,
        result_path: Option<&str>,
        value: Value,
    ) -> Result<(), EngineError> {
        let parsed = result_path
            .map(JsonPath::parse)
            .transpose()
            .map_err(|source| EngineError::Context {
                step_id: step_id.to_string(),
                source: source.into(),
            })?;
        ctx.apply_result(parsed.as_ref(), value)
            .map_err(|source| EngineError::Context {
                step_id: step_id.to_string(),
                source,
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use profisync_types::error::RepositoryError;
    use profisync_types::workflow::{CatchBinding, ChoiceRule, RetryPolicy, StepLog, StepStatus};

    use crate::collaborator::BoxFuture;

    // -------------------------------------------------------------------
    // Test doubles
    // -------------------------------------------------------------------

    /// In-memory run repository for engine tests.
    #[derive(Default)]
    struct InMemoryRunLog {
        runs: Mutex<Vec<WorkflowRun>>,
        steps: Mutex<Vec<StepLog>>,
    }

    impl RunRepository for InMemoryRunLog {
        async fn create_run(&self, run: &WorkflowRun) -> Result<(), RepositoryError> {
            self.runs.lock().unwrap().push(run.clone());
            Ok(())
        }

        async fn update_run(
            &self,
            run_id: &Uuid,
            status: RunStatus,
            error: Option<&str>,
            output: Option<&Value>,
        ) -> Result<(), RepositoryError> {
            let mut runs = self.runs.lock().unwrap();
            let run = runs
                .iter_mut()
                .find(|r| r.id == *run_id)
                .ok_or(RepositoryError::NotFound)?;
            run.status = status;
            run.error = error.map(String::from);
            run.output = output.cloned();
            run.completed_at = Some(Utc::now());
            Ok(())
        }

        async fn get_run(&self, run_id: &Uuid) -> Result<Option<WorkflowRun>, RepositoryError> {
            Ok(self
                .runs
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == *run_id)
                .cloned())
        }

        async fn list_runs(
            &self,
            workflow: Option<&str>,
            limit: u32,
        ) -> Result<Vec<WorkflowRun>, RepositoryError> {
            Ok(self
                .runs
                .lock()
                .unwrap()
                .iter()
                .filter(|r| workflow.is_none_or(|w| r.workflow_name == w))
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn create_step_log(&self, log: &StepLog) -> Result<(), RepositoryError> {
            self.steps.lock().unwrap().push(log.clone());
            Ok(())
        }

        async fn update_step_log(
            &self,
            log_id: &Uuid,
            status: StepStatus,
            output: Option<&Value>,
            error: Option<&str>,
        ) -> Result<(), RepositoryError> {
            let mut steps = self.steps.lock().unwrap();
            let log = steps
                .iter_mut()
                .find(|s| s.id == *log_id)
                .ok_or(RepositoryError::NotFound)?;
            log.status = status;
            log.output = output.cloned();
            log.error = error.map(String::from);
            log.completed_at = Some(Utc::now());
            Ok(())
        }

        async fn list_step_logs(&self, run_id: &Uuid) -> Result<Vec<StepLog>, RepositoryError> {
            Ok(self
                .steps
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.run_id == *run_id)
                .cloned()
                .collect())
        }
    }

    /// Backend that replays a scripted queue of results per action and
    /// records each call with a (paused-clock) timestamp.
    #[derive(Default)]
    struct ScriptedBackend {
        script: Mutex<Vec<Result<Value, ErrorRecord>>>,
        calls: Mutex<Vec<(String, Value, tokio::time::Instant)>>,
    }

    impl ScriptedBackend {
        fn scripted(results: Vec<Result<Value, ErrorRecord>>) -> Self {
            Self {
                script: Mutex::new(results),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn call_instants(&self) -> Vec<tokio::time::Instant> {
            self.calls.lock().unwrap().iter().map(|c| c.2).collect()
        }
    }

    impl ServiceBackend for ScriptedBackend {
        fn call<'a>(
            &'a self,
            action: &'a str,
            parameters: Value,
        ) -> BoxFuture<'a, Result<Value, ErrorRecord>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push((
                    action.to_string(),
                    parameters,
                    tokio::time::Instant::now(),
                ));
                let mut script = self.script.lock().unwrap();
                if script.is_empty() {
                    Ok(json!({}))
                } else {
                    script.remove(0)
                }
            })
        }
    }

    /// Backend that never responds (for timeout tests).
    struct StalledBackend;

    impl ServiceBackend for StalledBackend {
        fn call<'a>(
            &'a self,
            _action: &'a str,
            _parameters: Value,
        ) -> BoxFuture<'a, Result<Value, ErrorRecord>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(json!({}))
            })
        }
    }

    /// Function invoker that rejects everything (steps under test use
    /// service calls unless stated otherwise).
    struct NoFunctions;

    impl FunctionInvoker for NoFunctions {
        fn invoke<'a>(
            &'a self,
            function: &'a str,
            _input: Value,
        ) -> BoxFuture<'a, Result<Value, ErrorRecord>> {
            Box::pin(async move {
                Err(ErrorRecord::new(
                    ErrorCategory::FunctionError,
                    format!("unknown function '{function}'"),
                ))
            })
        }
    }

    fn engine_with(
        backend: Arc<dyn ServiceBackend>,
    ) -> (Engine<InMemoryRunLog>, Arc<InMemoryRunLog>) {
        let repo = Arc::new(InMemoryRunLog::default());
        let engine = Engine::new(Arc::clone(&repo), Arc::new(NoFunctions), EventBus::new(64))
            .with_backend("profile-store", backend);
        (engine, repo)
    }

    fn call_step(
        id: &str,
        action: &str,
        parameters: Value,
        next: Option<&str>,
    ) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            comment: None,
            config: StepConfig::ServiceCall {
                service: "profile-store".to_string(),
                action: action.to_string(),
                parameters,
                result_selector: None,
                result_path: Some("$.results".to_string()),
            },
            next: next.map(String::from),
            end: next.is_none(),
            retry: vec![],
            catch: vec![],
        }
    }

    fn workflow(start_at: &str, steps: Vec<StepDefinition>) -> WorkflowDefinition {
        WorkflowDefinition {
            name: "test-workflow".to_string(),
            comment: None,
            start_at: start_at.to_string(),
            timeout_secs: Some(30),
            steps,
        }
    }

    // -------------------------------------------------------------------
    // Pass steps and result merging
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn pass_merge_replaces_only_the_addressed_subtree() {
        let (engine, _) = engine_with(Arc::new(ScriptedBackend::default()));
        let def = workflow(
            "shape",
            vec![StepDefinition {
                id: "shape".to_string(),
                comment: None,
                config: StepConfig::Pass {
                    payload: json!({ "x": 9 }),
                    result_path: Some("$.a.b".to_string()),
                },
                next: None,
                end: true,
                retry: vec![],
                catch: vec![],
            }],
        );

        let result = engine
            .execute(&def, "test", json!({ "a": { "b": 1, "c": 2 }, "d": 3 }))
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Succeeded);
        assert_eq!(
            result.output,
            json!({ "a": { "b": { "x": 9 }, "c": 2 }, "d": 3 })
        );
    }

    #[tokio::test]
    async fn pass_without_result_path_replaces_whole_context() {
        let (engine, _) = engine_with(Arc::new(ScriptedBackend::default()));
        let def = workflow(
            "shape",
            vec![StepDefinition {
                id: "shape".to_string(),
                comment: None,
                config: StepConfig::Pass {
                    payload: json!({
                        "response": { "statusCode": 200, "body": { "userId": "$.userId" } }
                    }),
                    result_path: None,
                },
                next: None,
                end: true,
                retry: vec![],
                catch: vec![],
            }],
        );

        let result = engine
            .execute(&def, "test", json!({ "userId": 42, "noise": true }))
            .await
            .unwrap();

        assert_eq!(
            result.output,
            json!({ "response": { "statusCode": 200, "body": { "userId": 42 } } })
        );
    }

    // -------------------------------------------------------------------
    // Service calls with selectors
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn service_call_applies_selector_against_raw_result() {
        let backend = Arc::new(ScriptedBackend::scripted(vec![Ok(
            json!({ "item": { "lastId": 41 } }),
        )]));
        let (engine, _) = engine_with(backend);
        let def = workflow(
            "find",
            vec![StepDefinition {
                id: "find".to_string(),
                comment: None,
                config: StepConfig::ServiceCall {
                    service: "profile-store".to_string(),
                    action: "get".to_string(),
                    parameters: json!({ "key": "profile-meta" }),
                    result_selector: Some(json!({
                        "previousUserId": "$.item.lastId",
                        "userId": "{{ $.item.lastId + 1 }}",
                    })),
                    result_path: Some("$.context".to_string()),
                },
                next: None,
                end: true,
                retry: vec![],
                catch: vec![],
            }],
        );

        let result = engine
            .execute(&def, "test", json!({ "firstName": "A" }))
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Succeeded);
        assert_eq!(
            result.output,
            json!({ "firstName": "A", "context": { "previousUserId": 41, "userId": 42 } })
        );
    }

    // -------------------------------------------------------------------
    // Retry bound
    // -------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn retry_bound_is_exactly_max_attempts_with_fixed_spacing() {
        let backend = Arc::new(ScriptedBackend::scripted(vec![
            Err(ErrorRecord::new(ErrorCategory::FunctionError, "boom 1")),
            Err(ErrorRecord::new(ErrorCategory::FunctionError, "boom 2")),
            Err(ErrorRecord::new(ErrorCategory::FunctionError, "boom 3")),
        ]));
        let mut step = call_step("flaky", "put", json!({}), None);
        step.retry = vec![RetryPolicy {
            on: None,
            max_attempts: 2,
            interval_secs: 1,
            backoff_rate: 1.0,
        }];
        let def = workflow("flaky", vec![step]);

        let (engine, _) = engine_with(Arc::clone(&backend) as Arc<dyn ServiceBackend>);
        let result = engine.execute(&def, "test", json!({})).await.unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(backend.call_count(), 2, "exactly max_attempts attempts");

        let instants = backend.call_instants();
        assert_eq!(
            instants[1] - instants[0],
            Duration::from_secs(1),
            "fixed 1s spacing between attempts"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_category_is_not_retried() {
        let backend = Arc::new(ScriptedBackend::scripted(vec![Err(ErrorRecord::new(
            ErrorCategory::DuplicateIdentity,
            "already exists",
        ))]));
        let mut step = call_step("create", "create_user", json!({}), None);
        step.retry = vec![RetryPolicy {
            on: Some(vec![ErrorCategory::ConditionalCheckFailed]),
            max_attempts: 2,
            interval_secs: 1,
            backoff_rate: 1.0,
        }];
        let def = workflow("create", vec![step]);

        let (engine, _) = engine_with(Arc::clone(&backend) as Arc<dyn ServiceBackend>);
        let result = engine.execute(&def, "test", json!({})).await.unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(backend.call_count(), 1);
        assert_eq!(
            result.error.unwrap().category,
            ErrorCategory::DuplicateIdentity
        );
    }

    // -------------------------------------------------------------------
    // Catch dispatch and compensation
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn catch_writes_error_record_and_runs_fallback() {
        let backend = Arc::new(ScriptedBackend::scripted(vec![Err(ErrorRecord::new(
            ErrorCategory::ConditionalCheckFailed,
            "lastId moved",
        ))]));
        let mut failing = call_step("write", "put", json!({}), Some("unreached"));
        failing.catch = vec![CatchBinding {
            on: Some(vec![ErrorCategory::ConditionalCheckFailed]),
            next: "shape-error".to_string(),
            result_path: Some("$.error".to_string()),
        }];
        let def = workflow(
            "write",
            vec![
                failing,
                call_step("unreached", "get", json!({}), None),
                StepDefinition {
                    id: "shape-error".to_string(),
                    comment: None,
                    config: StepConfig::Pass {
                        payload: json!({ "handled": "$.error.category" }),
                        result_path: Some("$.summary".to_string()),
                    },
                    next: None,
                    end: true,
                    retry: vec![],
                    catch: vec![],
                },
            ],
        );

        let (engine, _) = engine_with(Arc::clone(&backend) as Arc<dyn ServiceBackend>);
        let result = engine.execute(&def, "test", json!({})).await.unwrap();

        assert_eq!(result.status, RunStatus::Succeeded);
        assert_eq!(result.output["error"]["category"], "ConditionalCheckFailed");
        assert_eq!(result.output["summary"]["handled"], "ConditionalCheckFailed");
        // The normal continuation was not taken.
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn compensation_failure_is_fatal_without_retry_or_nested_catch() {
        let backend = Arc::new(ScriptedBackend::scripted(vec![
            Err(ErrorRecord::new(
                ErrorCategory::ConditionalCheckFailed,
                "first failure",
            )),
            Err(ErrorRecord::new(
                ErrorCategory::FunctionError,
                "compensation broke",
            )),
        ]));
        let mut failing = call_step("write", "put", json!({}), Some("done"));
        failing.catch = vec![CatchBinding {
            on: None,
            next: "compensate".to_string(),
            result_path: Some("$.error".to_string()),
        }];
        // The compensation step carries retry and catch wiring of its own,
        // all of which must be ignored: compensation is single-shot.
        let mut compensation = call_step("compensate", "delete", json!({}), Some("done"));
        compensation.retry = vec![RetryPolicy {
            on: None,
            max_attempts: 3,
            interval_secs: 1,
            backoff_rate: 1.0,
        }];
        compensation.catch = vec![CatchBinding {
            on: None,
            next: "done".to_string(),
            result_path: Some("$.error2".to_string()),
        }];
        let def = workflow(
            "write",
            vec![
                failing,
                compensation,
                StepDefinition {
                    id: "done".to_string(),
                    comment: None,
                    config: StepConfig::Succeed {},
                    next: None,
                    end: false,
                    retry: vec![],
                    catch: vec![],
                },
            ],
        );

        let (engine, _) = engine_with(Arc::clone(&backend) as Arc<dyn ServiceBackend>);
        let result = engine.execute(&def, "test", json!({})).await.unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.error.unwrap().message, "compensation broke");
        // write once + compensate once; no retry of the compensation.
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn step_after_successful_compensation_gets_normal_semantics() {
        let backend = Arc::new(ScriptedBackend::scripted(vec![
            Err(ErrorRecord::new(ErrorCategory::ConditionalCheckFailed, "conflict")),
            Ok(json!({})),  // compensation succeeds
            Ok(json!({ "item": { "lastId": 7 } })), // re-entered step succeeds
        ]));
        let mut failing = call_step("write", "put", json!({}), Some("done"));
        failing.catch = vec![CatchBinding {
            on: None,
            next: "compensate".to_string(),
            result_path: Some("$.error".to_string()),
        }];
        let compensation = call_step("compensate", "update", json!({}), Some("re-read"));
        let def = workflow(
            "write",
            vec![
                failing,
                compensation,
                call_step("re-read", "get", json!({}), None),
                StepDefinition {
                    id: "done".to_string(),
                    comment: None,
                    config: StepConfig::Succeed {},
                    next: None,
                    end: false,
                    retry: vec![],
                    catch: vec![],
                },
            ],
        );

        let (engine, _) = engine_with(Arc::clone(&backend) as Arc<dyn ServiceBackend>);
        let result = engine.execute(&def, "test", json!({})).await.unwrap();

        assert_eq!(result.status, RunStatus::Succeeded);
        assert_eq!(backend.call_count(), 3);
    }

    // -------------------------------------------------------------------
    // Choice
    // -------------------------------------------------------------------

    fn choice_workflow(otherwise: Option<&str>) -> WorkflowDefinition {
        workflow(
            "route",
            vec![
                StepDefinition {
                    id: "route".to_string(),
                    comment: None,
                    config: StepConfig::Choice {
                        rules: vec![
                            ChoiceRule {
                                variable: "$.detailType".to_string(),
                                equals: "CompanyChange".to_string(),
                                next: "company".to_string(),
                            },
                            ChoiceRule {
                                variable: "$.detailType".to_string(),
                                equals: "CompanyLocationChange".to_string(),
                                next: "location".to_string(),
                            },
                        ],
                        otherwise: otherwise.map(String::from),
                    },
                    next: None,
                    end: false,
                    retry: vec![],
                    catch: vec![],
                },
                call_step("company", "put", json!({ "which": "company" }), None),
                call_step("location", "put", json!({ "which": "location" }), None),
                StepDefinition {
                    id: "nothing".to_string(),
                    comment: Some("nothing to process".to_string()),
                    config: StepConfig::Succeed {},
                    next: None,
                    end: false,
                    retry: vec![],
                    catch: vec![],
                },
            ],
        )
    }

    #[tokio::test]
    async fn choice_takes_first_matching_rule() {
        let backend = Arc::new(ScriptedBackend::default());
        let (engine, _) = engine_with(Arc::clone(&backend) as Arc<dyn ServiceBackend>);
        let def = choice_workflow(Some("nothing"));

        let result = engine
            .execute(&def, "test", json!({ "detailType": "CompanyLocationChange" }))
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Succeeded);
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["which"], "location");
    }

    #[tokio::test]
    async fn choice_unknown_discriminator_takes_otherwise_without_calls() {
        let backend = Arc::new(ScriptedBackend::default());
        let (engine, _) = engine_with(Arc::clone(&backend) as Arc<dyn ServiceBackend>);
        let def = choice_workflow(Some("nothing"));

        let result = engine
            .execute(&def, "test", json!({ "detailType": "SomethingElse" }))
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Succeeded);
        assert_eq!(backend.call_count(), 0, "neither branch was invoked");
    }

    #[tokio::test]
    async fn choice_without_otherwise_and_no_match_is_a_definition_error() {
        let (engine, _) = engine_with(Arc::new(ScriptedBackend::default()));
        let def = choice_workflow(None);

        let err = engine
            .execute(&def, "test", json!({ "detailType": "SomethingElse" }))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::ChoiceUnmatched(_)));
    }

    // -------------------------------------------------------------------
    // Timeout
    // -------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn run_timeout_surfaces_as_distinct_category() {
        let repo = Arc::new(InMemoryRunLog::default());
        let engine = Engine::new(Arc::clone(&repo), Arc::new(NoFunctions), EventBus::new(16))
            .with_backend("profile-store", Arc::new(StalledBackend));
        let mut def = workflow("stall", vec![call_step("stall", "get", json!({}), None)]);
        def.timeout_secs = Some(5);

        let result = engine.execute(&def, "test", json!({})).await.unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        let record = result.error.unwrap();
        assert_eq!(record.category, ErrorCategory::Timeout);

        let run = repo.get_run(&result.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.unwrap().contains("Timeout"));
    }

    // -------------------------------------------------------------------
    // Terminals and faults
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn fail_step_reports_category_and_cause() {
        let (engine, _) = engine_with(Arc::new(ScriptedBackend::default()));
        let def = workflow(
            "bail",
            vec![StepDefinition {
                id: "bail".to_string(),
                comment: None,
                config: StepConfig::Fail {
                    category: Some(ErrorCategory::ConditionalCheckFailed),
                    cause: Some("profile store failed to apply the update".to_string()),
                },
                next: None,
                end: false,
                retry: vec![],
                catch: vec![],
            }],
        );

        let result = engine.execute(&def, "test", json!({})).await.unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        let record = result.error.unwrap();
        assert_eq!(record.category, ErrorCategory::ConditionalCheckFailed);
        assert_eq!(record.message, "profile store failed to apply the update");
    }

    #[tokio::test]
    async fn unknown_service_is_an_engine_error() {
        let (engine, _) = engine_with(Arc::new(ScriptedBackend::default()));
        let mut step = call_step("call", "get", json!({}), None);
        if let StepConfig::ServiceCall { service, .. } = &mut step.config {
            *service = "unregistered".to_string();
        }
        let def = workflow("call", vec![step]);

        let err = engine.execute(&def, "test", json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownService(_)));
    }

    #[tokio::test]
    async fn run_and_step_records_are_written() {
        let backend = Arc::new(ScriptedBackend::scripted(vec![Ok(json!({ "ok": true }))]));
        let repo = Arc::new(InMemoryRunLog::default());
        let engine = Engine::new(Arc::clone(&repo), Arc::new(NoFunctions), EventBus::new(16))
            .with_backend("profile-store", backend);
        let def = workflow("only", vec![call_step("only", "get", json!({}), None)]);

        let result = engine.execute(&def, "test", json!({})).await.unwrap();

        let run = repo.get_run(&result.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert!(run.completed_at.is_some());

        let logs = repo.list_step_logs(&result.run_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].step_id, "only");
        assert_eq!(logs[0].status, StepStatus::Succeeded);
    }
}
