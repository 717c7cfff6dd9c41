//! Workflow definition parsing, validation, and filesystem operations.
//!
//! Converts between YAML files and the canonical `WorkflowDefinition` IR and
//! validates structural constraints: unique step IDs, resolvable transition
//! targets, well-formed paths and templates. Template errors are load-time
//! failures here, never run-time ones.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use profisync_types::workflow::{StepConfig, StepDefinition, WorkflowDefinition};

use crate::path::{JsonPath, PathError};
use crate::template::{self, TemplateError};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from definition parsing and validation.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    Validation(String),

    /// A transition references a step that does not exist.
    #[error("step '{step}' targets unknown step '{target}'")]
    UnknownTarget { step: String, target: String },

    /// A template in a step is malformed.
    #[error("step '{step}': {source}")]
    Template {
        step: String,
        source: TemplateError,
    },

    /// A result path or choice variable is malformed.
    #[error("step '{step}': {source}")]
    Path { step: String, source: PathError },

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `WorkflowDefinition`.
///
/// Runs `validate_definition` after deserialization, so the returned value
/// is guaranteed to be structurally valid.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDefinition, DefinitionError> {
    let def: WorkflowDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a `WorkflowDefinition` to a YAML string.
pub fn serialize_workflow_yaml(def: &WorkflowDefinition) -> Result<String, DefinitionError> {
    serde_yaml_ng::to_string(def).map_err(|e| DefinitionError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowDefinition`.
///
/// Checks:
/// - Name is non-empty and contains only alphanumeric characters and hyphens
/// - At least one step exists and `start_at` resolves
/// - All step IDs are unique
/// - Every `next`, catch target, and choice target resolves
/// - Terminal steps carry no transitions, retries, or catches
/// - Non-terminal, non-choice steps have exactly one of `next` / `end`
/// - Paths parse and templates are well formed
/// - Retry `max_attempts >= 1`; timeout > 0 if set
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), DefinitionError> {
    if def.name.is_empty() {
        return Err(DefinitionError::Validation(
            "workflow name must not be empty".to_string(),
        ));
    }
    if !def.name.chars().all(|c| c.is_alphanumeric() || c == '-') {
        return Err(DefinitionError::Validation(format!(
            "workflow name '{}' contains invalid characters (only alphanumeric and hyphens allowed)",
            def.name
        )));
    }

    if def.steps.is_empty() {
        return Err(DefinitionError::Validation(
            "workflow must have at least one step".to_string(),
        ));
    }

    let mut seen_ids = HashSet::new();
    for step in &def.steps {
        if !seen_ids.insert(step.id.as_str()) {
            return Err(DefinitionError::Validation(format!(
                "duplicate step ID: '{}'",
                step.id
            )));
        }
    }

    if !seen_ids.contains(def.start_at.as_str()) {
        return Err(DefinitionError::Validation(format!(
            "start_at references unknown step '{}'",
            def.start_at
        )));
    }

    if let Some(t) = def.timeout_secs {
        if t == 0 {
            return Err(DefinitionError::Validation(
                "timeout must be > 0".to_string(),
            ));
        }
    }

    for step in &def.steps {
        validate_step(step, &seen_ids)?;
    }

    Ok(())
}

fn validate_step(
    step: &StepDefinition,
    known_ids: &HashSet<&str>,
) -> Result<(), DefinitionError> {
    let resolve = |target: &str| -> Result<(), DefinitionError> {
        if known_ids.contains(target) {
            Ok(())
        } else {
            Err(DefinitionError::UnknownTarget {
                step: step.id.clone(),
                target: target.to_string(),
            })
        }
    };
    let check_template = |t: &serde_json::Value| -> Result<(), DefinitionError> {
        template::validate(t).map_err(|source| DefinitionError::Template {
            step: step.id.clone(),
            source,
        })
    };
    let check_path = |p: &str| -> Result<(), DefinitionError> {
        JsonPath::parse(p)
            .map(|_| ())
            .map_err(|source| DefinitionError::Path {
                step: step.id.clone(),
                source,
            })
    };

    for policy in &step.retry {
        if policy.max_attempts < 1 {
            return Err(DefinitionError::Validation(format!(
                "step '{}': retry max_attempts must be >= 1",
                step.id
            )));
        }
    }
    for binding in &step.catch {
        resolve(&binding.next)?;
        if let Some(p) = &binding.result_path {
            check_path(p)?;
        }
    }

    match &step.config {
        StepConfig::Succeed {} | StepConfig::Fail { .. } => {
            if step.next.is_some() || step.end || !step.retry.is_empty() || !step.catch.is_empty()
            {
                return Err(DefinitionError::Validation(format!(
                    "terminal step '{}' must not carry next/end/retry/catch",
                    step.id
                )));
            }
        }
        StepConfig::Choice { rules, otherwise } => {
            if step.next.is_some() || step.end {
                return Err(DefinitionError::Validation(format!(
                    "choice step '{}' transitions through its rules, not next/end",
                    step.id
                )));
            }
            if !step.retry.is_empty() || !step.catch.is_empty() {
                return Err(DefinitionError::Validation(format!(
                    "choice step '{}' cannot carry retry/catch",
                    step.id
                )));
            }
            if rules.is_empty() {
                return Err(DefinitionError::Validation(format!(
                    "choice step '{}' must have at least one rule",
                    step.id
                )));
            }
            for rule in rules {
                check_path(&rule.variable)?;
                resolve(&rule.next)?;
            }
            if let Some(target) = otherwise {
                resolve(target)?;
            }
        }
        StepConfig::ServiceCall {
            parameters,
            result_selector,
            result_path,
            ..
        } => {
            validate_transition(step)?;
            if let Some(next) = &step.next {
                resolve(next)?;
            }
            check_template(parameters)?;
            if let Some(selector) = result_selector {
                check_template(selector)?;
            }
            if let Some(p) = result_path {
                check_path(p)?;
            }
        }
        StepConfig::FunctionInvoke {
            payload,
            result_path,
            ..
        } => {
            validate_transition(step)?;
            if let Some(next) = &step.next {
                resolve(next)?;
            }
            if let Some(payload) = payload {
                check_template(payload)?;
            }
            if let Some(p) = result_path {
                check_path(p)?;
            }
        }
        StepConfig::Pass {
            payload,
            result_path,
        } => {
            validate_transition(step)?;
            if let Some(next) = &step.next {
                resolve(next)?;
            }
            check_template(payload)?;
            if let Some(p) = result_path {
                check_path(p)?;
            }
        }
    }

    Ok(())
}

fn validate_transition(step: &StepDefinition) -> Result<(), DefinitionError> {
    if step.next.is_some() == step.end {
        return Err(DefinitionError::Validation(format!(
            "step '{}' must have exactly one of next/end",
            step.id
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a workflow definition from a YAML file.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, DefinitionError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_yaml(&content)
}

/// Save a workflow definition to a YAML file.
///
/// Creates parent directories if they don't exist.
pub fn save_workflow_file(
    path: &Path,
    def: &WorkflowDefinition,
) -> Result<(), DefinitionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serialize_workflow_yaml(def)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Discover all workflow YAML files under `base_dir`.
///
/// Scans for `.yaml` and `.yml` files recursively. Files that fail to parse
/// are skipped with a warning (they may not be workflows).
pub fn discover_workflows(
    base_dir: &Path,
) -> Result<Vec<(PathBuf, WorkflowDefinition)>, DefinitionError> {
    let mut results = Vec::new();
    if !base_dir.exists() {
        return Ok(results);
    }
    discover_recursive(base_dir, &mut results)?;
    Ok(results)
}

fn discover_recursive(
    dir: &Path,
    results: &mut Vec<(PathBuf, WorkflowDefinition)>,
) -> Result<(), DefinitionError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            discover_recursive(&path, results)?;
        } else if let Some(ext) = path.extension() {
            if ext == "yaml" || ext == "yml" {
                match load_workflow_file(&path) {
                    Ok(def) => results.push((path, def)),
                    Err(_) => {
                        tracing::warn!(?path, "skipping unparseable workflow file");
                    }
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
