//! `psync run` -- execute a workflow once from the command line.

use anyhow::{Context, anyhow, bail};
use serde_json::{Value, json};

use profisync_types::workflow::RunStatus;

use crate::state::AppState;

/// Execute `workflow` against the given input and print the outcome.
pub async fn run_workflow(
    state: &AppState,
    workflow: &str,
    input: Option<&str>,
    json_output: bool,
) -> anyhow::Result<()> {
    let input_value = parse_input(input)?;
    let definition = state
        .registry
        .get(workflow)
        .ok_or_else(|| anyhow!("unknown workflow '{workflow}'"))?;

    let result = state
        .engine
        .execute(&definition, "cli", input_value)
        .await
        .context("workflow run aborted")?;

    if json_output {
        let report = json!({
            "runId": result.run_id,
            "status": result.status,
            "output": result.output,
            "error": result.error,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    match result.status {
        RunStatus::Succeeded => {
            println!(
                "  {} run {} succeeded",
                console::style("✓").green(),
                console::style(result.run_id).dim()
            );
        }
        _ => {
            let cause = result
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown cause".to_string());
            println!(
                "  {} run {} failed: {}",
                console::style("✗").red(),
                console::style(result.run_id).dim(),
                cause
            );
        }
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&result.output)?);
    Ok(())
}

/// Resolve the `--input` argument: absent means `{}`, `@path` reads a file,
/// anything else parses as inline JSON.
pub fn parse_input(input: Option<&str>) -> anyhow::Result<Value> {
    let Some(raw) = input else {
        return Ok(json!({}));
    };
    let content = match raw.strip_prefix('@') {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("cannot read '{path}'"))?
        }
        None => raw.to_string(),
    };
    let value: Value = serde_json::from_str(&content).context("input is not valid JSON")?;
    if !value.is_object() {
        bail!("input must be a JSON object");
    }
    Ok(value)
}
