//! The company-updater business function.
//!
//! Propagates a company rename to every profile belonging to the company.
//! These writes are not part of the allocation protocol, so they are plain
//! puts with a version bump.

use std::sync::Arc;

use serde_json::Value;

use profisync_core::collaborator::{BoxFuture, ProfileStore};
use profisync_types::error::{ErrorCategory, ErrorRecord};
use profisync_types::profile::PROFILE_KEY_PREFIX;

use super::ProfileFunction;

pub struct CompanyUpdater {
    store: Arc<dyn ProfileStore>,
}

impl CompanyUpdater {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }
}

fn detail_str(input: &Value, field: &str) -> Result<String, ErrorRecord> {
    input
        .pointer(&format!("/detail/{field}"))
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| {
            ErrorRecord::new(
                ErrorCategory::InvalidRequest,
                format!("input is missing 'detail.{field}'"),
            )
        })
}

impl ProfileFunction for CompanyUpdater {
    fn call<'a>(&'a self, input: Value) -> BoxFuture<'a, Result<Value, ErrorRecord>> {
        Box::pin(async move {
            let company_id = detail_str(&input, "companyId")?;
            let name = detail_str(&input, "name")?;

            let mut updated = 0u32;
            for (key, mut item) in self.store.scan().await? {
                if !key.starts_with(PROFILE_KEY_PREFIX) {
                    continue;
                }
                if item.get("companyId").and_then(Value::as_str) != Some(company_id.as_str()) {
                    continue;
                }
                item["companyName"] = Value::from(name.as_str());
                let version = item.get("version").and_then(Value::as_i64).unwrap_or(1);
                item["version"] = Value::from(version + 1);
                self.store.put(&key, item).await?;
                updated += 1;
            }

            tracing::debug!(
                company_id = company_id.as_str(),
                updated,
                "company name propagated to profiles"
            );
            let mut output = input;
            output["results"] = serde_json::json!({ "updated": updated });
            Ok(output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::memory::MemoryProfileStore;

    #[tokio::test]
    async fn test_updates_only_matching_profiles() {
        let store = Arc::new(MemoryProfileStore::new());
        store
            .put(
                "profile#1",
                json!({ "userId": 1, "companyId": "c-1", "companyName": "Old Co", "version": 1 }),
            )
            .await
            .unwrap();
        store
            .put(
                "profile#2",
                json!({ "userId": 2, "companyId": "c-2", "companyName": "Other Co", "version": 1 }),
            )
            .await
            .unwrap();
        store.put("profile-meta", json!({ "lastId": 2 })).await.unwrap();

        let updater = CompanyUpdater::new(Arc::clone(&store) as Arc<dyn ProfileStore>);
        let output = updater
            .call(json!({
                "detailType": "CompanyChange",
                "detail": { "companyId": "c-1", "name": "New Co" },
            }))
            .await
            .unwrap();

        assert_eq!(output["results"]["updated"], 1);
        let one = store.get("profile#1").await.unwrap().unwrap();
        assert_eq!(one["companyName"], "New Co");
        assert_eq!(one["version"], 2);
        let two = store.get("profile#2").await.unwrap().unwrap();
        assert_eq!(two["companyName"], "Other Co");
    }

    #[tokio::test]
    async fn test_missing_detail_is_invalid_request() {
        let store = Arc::new(MemoryProfileStore::new());
        let updater = CompanyUpdater::new(store as Arc<dyn ProfileStore>);
        let err = updater
            .call(json!({ "detailType": "CompanyChange", "detail": {} }))
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::InvalidRequest);
    }
}
