//! The user-creator business function.
//!
//! Claims the candidate sequence id computed by the allocation step: writes
//! the profile record and advances the shared counter in one atomic unit,
//! guarded by the counter still holding the value the run read. A lost race
//! surfaces as `TransactionCanceled` and is handled by the workflow's catch
//! wiring, not here.

use std::sync::Arc;

use serde_json::Value;

use profisync_core::collaborator::{BoxFuture, ProfileStore};
use profisync_types::error::{ErrorCategory, ErrorRecord};
use profisync_types::profile::{CounterGuard, LAST_ID_FIELD, META_KEY, ProfileRecord, profile_key};

use super::ProfileFunction;

pub struct UserCreator {
    store: Arc<dyn ProfileStore>,
}

impl UserCreator {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }
}

fn required_str(input: &Value, field: &str) -> Result<String, ErrorRecord> {
    input
        .get(field)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| {
            ErrorRecord::new(
                ErrorCategory::InvalidRequest,
                format!("input is missing '{field}'"),
            )
        })
}

fn required_int(input: &Value, path: [&str; 2]) -> Result<i64, ErrorRecord> {
    input
        .get(path[0])
        .and_then(|v| v.get(path[1]))
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            ErrorRecord::new(
                ErrorCategory::InvalidRequest,
                format!("input is missing '{}.{}'", path[0], path[1]),
            )
        })
}

impl ProfileFunction for UserCreator {
    fn call<'a>(&'a self, input: Value) -> BoxFuture<'a, Result<Value, ErrorRecord>> {
        Box::pin(async move {
            let previous_user_id = required_int(&input, ["context", "previousUserId"])?;
            let user_id = required_int(&input, ["context", "userId"])?;

            let record = ProfileRecord {
                user_id,
                first_name: required_str(&input, "firstName")?,
                last_name: required_str(&input, "lastName")?,
                email_address: required_str(&input, "emailAddress")?,
                company_id: input
                    .get("companyId")
                    .and_then(Value::as_str)
                    .map(String::from),
                company_name: None,
                company_location: None,
                version: 1,
            };
            let item = serde_json::to_value(&record).map_err(|e| {
                ErrorRecord::new(ErrorCategory::FunctionError, format!("bad record: {e}"))
            })?;

            self.store
                .transact_put(
                    &profile_key(user_id),
                    item,
                    CounterGuard {
                        key: META_KEY.to_string(),
                        field: LAST_ID_FIELD.to_string(),
                        expected: previous_user_id,
                        new: user_id,
                    },
                )
                .await?;

            tracing::debug!(user_id, "profile record created");

            // Pass the context through with the allocated id hoisted to the
            // top level for the later steps and the response mapping.
            let mut output = input;
            output["userId"] = Value::from(user_id);
            Ok(output)
        })
    }
}
