//! Named workflow definition lookup.
//!
//! The registry owns validated, immutable definitions. Triggers hand the
//! engine a workflow name; the registry resolves it to the definition.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use profisync_types::workflow::WorkflowDefinition;

use crate::definition::{self, DefinitionError};
use crate::workflows;

/// Registry mapping workflow names to their definitions.
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    definitions: HashMap<String, Arc<WorkflowDefinition>>,
}

impl WorkflowRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the three built-in workflows.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for def in [
            workflows::user_creation::definition(),
            workflows::account_updated::definition(),
            workflows::company_updated::definition(),
        ] {
            registry
                .register(def)
                .expect("built-in definitions are valid");
        }
        registry
    }

    /// Validate and register a definition. Re-registering a name replaces
    /// the previous definition.
    pub fn register(&mut self, def: WorkflowDefinition) -> Result<(), DefinitionError> {
        definition::validate_definition(&def)?;
        self.definitions.insert(def.name.clone(), Arc::new(def));
        Ok(())
    }

    /// Load and register every workflow YAML under `dir`. Returns how many
    /// were registered.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, DefinitionError> {
        let found = definition::discover_workflows(dir)?;
        let count = found.len();
        for (_, def) in found {
            self.register(def)?;
        }
        Ok(count)
    }

    /// Look up a definition by name.
    pub fn get(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.get(name).cloned()
    }

    /// Sorted registered names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.keys().cloned().collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
