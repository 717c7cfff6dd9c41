//! JSON `ServiceBackend` adapters over the typed collaborator ports.
//!
//! `ServiceCall` steps carry rendered parameter documents; these adapters
//! translate them onto the typed `ProfileStore` / `IdentityDirectory`
//! contracts. Scalar parameters are coerced leniently (a numeric user id
//! renders as a number but names a string username), mirroring how the
//! workflows format identifiers from context values.

use std::sync::Arc;

use serde_json::{Value, json};

use profisync_core::collaborator::{BoxFuture, IdentityDirectory, ProfileStore, ServiceBackend};
use profisync_core::template::value_to_string;
use profisync_types::error::{ErrorCategory, ErrorRecord};
use profisync_types::profile::UserAttribute;

// ---------------------------------------------------------------------------
// Parameter helpers
// ---------------------------------------------------------------------------

fn string_param(parameters: &Value, name: &str) -> Result<String, ErrorRecord> {
    match parameters.get(name) {
        Some(Value::Null) | None => Err(ErrorRecord::new(
            ErrorCategory::InvalidRequest,
            format!("missing parameter '{name}'"),
        )),
        Some(value) => Ok(value_to_string(value)),
    }
}

fn int_param(parameters: &Value, name: &str) -> Result<i64, ErrorRecord> {
    let value = parameters.get(name).ok_or_else(|| {
        ErrorRecord::new(
            ErrorCategory::InvalidRequest,
            format!("missing parameter '{name}'"),
        )
    })?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| {
            ErrorRecord::new(
                ErrorCategory::InvalidRequest,
                format!("parameter '{name}' must be an integer"),
            )
        })
}

fn attributes_param(parameters: &Value) -> Result<Vec<UserAttribute>, ErrorRecord> {
    let items = parameters
        .get("attributes")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ErrorRecord::new(
                ErrorCategory::InvalidRequest,
                "missing parameter 'attributes'",
            )
        })?;
    items
        .iter()
        .map(|item| {
            let name = string_param(item, "name")?;
            let value = string_param(item, "value")?;
            Ok(UserAttribute::new(name, value))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Profile store adapter
// ---------------------------------------------------------------------------

/// Exposes a `ProfileStore` under the `profile-store` service name.
///
/// Actions: `get`, `put`, `conditional_update`, `delete`.
pub struct ProfileStoreBackend {
    store: Arc<dyn ProfileStore>,
}

impl ProfileStoreBackend {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }
}

impl ServiceBackend for ProfileStoreBackend {
    fn call<'a>(
        &'a self,
        action: &'a str,
        parameters: Value,
    ) -> BoxFuture<'a, Result<Value, ErrorRecord>> {
        Box::pin(async move {
            match action {
                "get" => {
                    let key = string_param(&parameters, "key")?;
                    let item = self.store.get(&key).await?;
                    Ok(json!({ "item": item }))
                }
                "put" => {
                    let key = string_param(&parameters, "key")?;
                    let item = parameters.get("item").cloned().ok_or_else(|| {
                        ErrorRecord::new(ErrorCategory::InvalidRequest, "missing parameter 'item'")
                    })?;
                    self.store.put(&key, item).await?;
                    Ok(json!({}))
                }
                "conditional_update" => {
                    let key = string_param(&parameters, "key")?;
                    let field = string_param(&parameters, "field")?;
                    let expected = int_param(&parameters, "expected")?;
                    let new = int_param(&parameters, "new")?;
                    self.store
                        .conditional_update(&key, &field, expected, new)
                        .await?;
                    Ok(json!({}))
                }
                "delete" => {
                    let key = string_param(&parameters, "key")?;
                    let deleted = self.store.delete(&key).await?;
                    Ok(json!({ "deleted": deleted }))
                }
                other => Err(ErrorRecord::new(
                    ErrorCategory::InvalidRequest,
                    format!("unsupported profile-store action '{other}'"),
                )),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Identity directory adapter
// ---------------------------------------------------------------------------

/// Exposes an `IdentityDirectory` under the `identity-directory` service
/// name.
///
/// Actions: `create_user`, `update_user_attributes`, `get_user`.
pub struct DirectoryBackend {
    directory: Arc<dyn IdentityDirectory>,
}

impl DirectoryBackend {
    pub fn new(directory: Arc<dyn IdentityDirectory>) -> Self {
        Self { directory }
    }
}

impl ServiceBackend for DirectoryBackend {
    fn call<'a>(
        &'a self,
        action: &'a str,
        parameters: Value,
    ) -> BoxFuture<'a, Result<Value, ErrorRecord>> {
        Box::pin(async move {
            match action {
                "create_user" => {
                    let username = string_param(&parameters, "username")?;
                    let attributes = attributes_param(&parameters)?;
                    let user = self.directory.create_user(&username, attributes).await?;
                    Ok(json!({ "user": user }))
                }
                "update_user_attributes" => {
                    let username = string_param(&parameters, "username")?;
                    let attributes = attributes_param(&parameters)?;
                    self.directory
                        .update_user_attributes(&username, attributes)
                        .await?;
                    Ok(json!({}))
                }
                "get_user" => {
                    let username = string_param(&parameters, "username")?;
                    let user = self.directory.get_user(&username).await?;
                    Ok(json!({ "user": user }))
                }
                other => Err(ErrorRecord::new(
                    ErrorCategory::InvalidRequest,
                    format!("unsupported identity-directory action '{other}'"),
                )),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
