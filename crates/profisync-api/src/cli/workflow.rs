//! `psync workflows` and `psync validate` -- definition inspection.

use std::path::Path;

use anyhow::Context;
use comfy_table::{Table, presets};
use serde_json::json;

use profisync_core::definition;

use crate::state::AppState;

/// List the registered workflows.
pub fn list_workflows(state: &AppState, json_output: bool) -> anyhow::Result<()> {
    let names = state.registry.names();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&json!({ "workflows": names }))?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_BORDERS_ONLY);
    table.set_header(vec!["Name", "Entry", "Steps", "Timeout"]);
    for name in names {
        if let Some(def) = state.registry.get(&name) {
            let timeout = def
                .timeout_secs
                .map(|t| format!("{t}s"))
                .unwrap_or_else(|| "default".to_string());
            table.add_row(vec![
                def.name.clone(),
                def.start_at.clone(),
                def.steps.len().to_string(),
                timeout,
            ]);
        }
    }
    println!("{table}");
    Ok(())
}

/// Validate a workflow YAML file, printing the outcome.
pub fn validate_file(path: &Path, json_output: bool) -> anyhow::Result<()> {
    let result = definition::load_workflow_file(path);

    if json_output {
        let report = match &result {
            Ok(def) => json!({ "valid": true, "name": def.name, "steps": def.steps.len() }),
            Err(e) => json!({ "valid": false, "error": e.to_string() }),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        match &result {
            Ok(def) => println!(
                "  {} '{}' is valid ({} steps)",
                console::style("✓").green(),
                def.name,
                def.steps.len()
            ),
            Err(e) => println!("  {} {}", console::style("✗").red(), e),
        }
    }

    result
        .map(|_| ())
        .with_context(|| format!("'{}' failed validation", path.display()))
}
