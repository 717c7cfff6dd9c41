//! The company-location-updater business function.
//!
//! Propagates a company location change to every profile belonging to the
//! company, mirroring `company_updater` for the location field.

use std::sync::Arc;

use serde_json::Value;

use profisync_core::collaborator::{BoxFuture, ProfileStore};
use profisync_types::error::{ErrorCategory, ErrorRecord};
use profisync_types::profile::PROFILE_KEY_PREFIX;

use super::ProfileFunction;

pub struct CompanyLocationUpdater {
    store: Arc<dyn ProfileStore>,
}

impl CompanyLocationUpdater {
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

impl ProfileFunction for CompanyLocationUpdater {
    fn call<'a>(&'a self, input: Value) -> BoxFuture<'a, Result<Value, ErrorRecord>> {
        Box::pin(async move {
            let company_id = detail_str(&input, "companyId")?;
            let location = detail_str(&input, "location")?;

            let mut updated = 0u32;
            for (key, mut item) in self.store.scan().await? {
                if !key.starts_with(PROFILE_KEY_PREFIX) {
                    continue;
                }
                if item.get("companyId").and_then(Value::as_str) != Some(company_id.as_str()) {
                    continue;
                }
                item["companyLocation"] = Value::from(location.as_str());
                let version = item.get("version").and_then(Value::as_i64).unwrap_or(1);
                item["version"] = Value::from(version + 1);
                self.store.put(&key, item).await?;
                updated += 1;
            }

            tracing::debug!(
                company_id = company_id.as_str(),
                updated,
                "company location propagated to profiles"
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
    async fn test_updates_location_of_matching_profiles() {
        let store = Arc::new(MemoryProfileStore::new());
        store
            .put(
                "profile#1",
                json!({ "userId": 1, "companyId": "c-1", "version": 1 }),
            )
            .await
            .unwrap();

        let updater = CompanyLocationUpdater::new(Arc::clone(&store) as Arc<dyn ProfileStore>);
        let output = updater
            .call(json!({
                "detailType": "CompanyLocationChange",
                "detail": { "companyId": "c-1", "location": "Austin, TX" },
            }))
            .await
            .unwrap();

        assert_eq!(output["results"]["updated"], 1);
        let item = store.get("profile#1").await.unwrap().unwrap();
        assert_eq!(item["companyLocation"], "Austin, TX");
    }
}
