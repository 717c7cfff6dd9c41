//! The user-updater business function.
//!
//! Applies an account change to the profile record that the workflow read
//! at the start of the run, guarded by that record's version. If the record
//! moved in the meantime the write fails with `ConditionalCheckFailed` and
//! the workflow's catch wiring reverts the directory.

use std::sync::Arc;

use serde_json::Value;

use profisync_core::collaborator::{BoxFuture, ProfileStore};
use profisync_types::error::{ErrorCategory, ErrorRecord};
use profisync_types::profile::profile_key;

use super::ProfileFunction;

pub struct UserUpdater {
    store: Arc<dyn ProfileStore>,
}

impl UserUpdater {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }
}

impl ProfileFunction for UserUpdater {
    fn call<'a>(&'a self, input: Value) -> BoxFuture<'a, Result<Value, ErrorRecord>> {
        Box::pin(async move {
            let message = input
                .pointer("/detail/messageBody")
                .cloned()
                .ok_or_else(|| {
                    ErrorRecord::new(
                        ErrorCategory::InvalidRequest,
                        "input is missing 'detail.messageBody'",
                    )
                })?;
            let user_name = message
                .get("userName")
                .map(profisync_core::template::value_to_string)
                .ok_or_else(|| {
                    ErrorRecord::new(
                        ErrorCategory::InvalidRequest,
                        "input is missing 'detail.messageBody.userName'",
                    )
                })?;

            let record = input.pointer("/record/item").cloned().ok_or_else(|| {
                ErrorRecord::new(
                    ErrorCategory::InvalidRequest,
                    "input is missing the prefetched record at 'record.item'",
                )
            })?;
            let version = record.get("version").and_then(Value::as_i64).ok_or_else(|| {
                ErrorRecord::new(
                    ErrorCategory::InvalidRequest,
                    "prefetched record has no integer 'version'",
                )
            })?;

            let mut updated = record;
            for field in ["emailAddress", "firstName", "lastName"] {
                if let Some(value) = message.get(field).and_then(Value::as_str) {
                    updated[field] = Value::from(value);
                }
            }
            updated["version"] = Value::from(version + 1);

            let key = user_name
                .parse::<i64>()
                .map(profile_key)
                .unwrap_or_else(|_| format!("profile#{user_name}"));
            self.store.put_if(&key, updated, "version", version).await?;

            tracing::debug!(user_name = user_name.as_str(), "profile record updated");
            Ok(input)
        })
    }
}
