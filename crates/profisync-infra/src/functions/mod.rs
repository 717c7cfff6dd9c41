//! Business functions and their registry.
//!
//! The engine treats these as opaque external logic behind the
//! `FunctionInvoke` seam. Each function receives the whole run context and
//! returns the (possibly augmented) context; the workflow definitions rely
//! on that passthrough shape.

pub mod company_location_updater;
pub mod company_updater;
pub mod user_creator;
pub mod user_updater;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use profisync_core::collaborator::{BoxFuture, FunctionInvoker, ProfileStore};
use profisync_types::error::{ErrorCategory, ErrorRecord};

pub use company_location_updater::CompanyLocationUpdater;
pub use company_updater::CompanyUpdater;
pub use user_creator::UserCreator;
pub use user_updater::UserUpdater;

// ---------------------------------------------------------------------------
// ProfileFunction
// ---------------------------------------------------------------------------

/// A single registered business function.
pub trait ProfileFunction: Send + Sync {
    fn call<'a>(&'a self, input: Value) -> BoxFuture<'a, Result<Value, ErrorRecord>>;
}

// ---------------------------------------------------------------------------
// FunctionRegistry
// ---------------------------------------------------------------------------

/// Name-keyed function dispatch implementing the engine's `FunctionInvoker`
/// seam.
#[derive(Default)]
pub struct FunctionRegistry {
    handlers: HashMap<String, Arc<dyn ProfileFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the four built-in functions, all backed by the
    /// given profile store.
    pub fn builtin(store: Arc<dyn ProfileStore>) -> Self {
        let mut registry = Self::new();
        registry.register("user-creator", Arc::new(UserCreator::new(Arc::clone(&store))));
        registry.register("user-updater", Arc::new(UserUpdater::new(Arc::clone(&store))));
        registry.register(
            "company-updater",
            Arc::new(CompanyUpdater::new(Arc::clone(&store))),
        );
        registry.register(
            "company-location-updater",
            Arc::new(CompanyLocationUpdater::new(store)),
        );
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ProfileFunction>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Sorted registered function names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl FunctionInvoker for FunctionRegistry {
    fn invoke<'a>(
        &'a self,
        function: &'a str,
        input: Value,
    ) -> BoxFuture<'a, Result<Value, ErrorRecord>> {
        Box::pin(async move {
            let handler = self.handlers.get(function).ok_or_else(|| {
                ErrorRecord::new(
                    ErrorCategory::InvalidRequest,
                    format!("unknown function '{function}'"),
                )
            })?;
            handler.call(input).await
        })
    }
}

// ---------------------------------------------------------------------------
// Tests -- the three workflows end to end against memory collaborators
// ---------------------------------------------------------------------------
