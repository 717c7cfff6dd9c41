//! In-memory profile store.
//!
//! Items live in a `DashMap`. The conditional and transactional mutations
//! serialize through a single async mutex so the compare-and-swap invariant
//! holds under concurrent runs: at most one run successfully claims a given
//! sequence id.

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;

use profisync_core::collaborator::{BoxFuture, ProfileStore};
use profisync_types::error::{ErrorCategory, ErrorRecord};
use profisync_types::profile::CounterGuard;

/// Dashmap-backed `ProfileStore` for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    items: DashMap<String, Value>,
    // Serializes put_if / transact_put / conditional_update.
    write_lock: Mutex<()>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn field_value(item: &Value, field: &str) -> Option<i64> {
        item.get(field).and_then(Value::as_i64)
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, ErrorRecord>> {
        Box::pin(async move { Ok(self.items.get(key).map(|item| item.clone())) })
    }

    fn put<'a>(&'a self, key: &'a str, item: Value) -> BoxFuture<'a, Result<(), ErrorRecord>> {
        Box::pin(async move {
            self.items.insert(key.to_string(), item);
            Ok(())
        })
    }

    fn put_if<'a>(
        &'a self,
        key: &'a str,
        item: Value,
        field: &'a str,
        expected: i64,
    ) -> BoxFuture<'a, Result<(), ErrorRecord>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let current = self.items.get(key).map(|i| i.clone());
            match current.as_ref().and_then(|i| Self::field_value(i, field)) {
                Some(actual) if actual == expected => {
                    self.items.insert(key.to_string(), item);
                    Ok(())
                }
                Some(actual) => Err(ErrorRecord::new(
                    ErrorCategory::ConditionalCheckFailed,
                    format!("{field} is {actual}, expected {expected} on '{key}'"),
                )),
                None => Err(ErrorRecord::new(
                    ErrorCategory::ConditionalCheckFailed,
                    format!("item '{key}' is absent or has no integer field '{field}'"),
                )),
            }
        })
    }

    fn transact_put<'a>(
        &'a self,
        key: &'a str,
        item: Value,
        guard: CounterGuard,
    ) -> BoxFuture<'a, Result<(), ErrorRecord>> {
        Box::pin(async move {
            let _lock = self.write_lock.lock().await;
            let counter = self.items.get(&guard.key).map(|i| i.clone());
            match counter
                .as_ref()
                .and_then(|i| Self::field_value(i, &guard.field))
            {
                Some(actual) if actual == guard.expected => {
                    let mut updated = counter.expect("checked above");
                    updated[guard.field.as_str()] = Value::from(guard.new);
                    self.items.insert(guard.key.clone(), updated);
                    self.items.insert(key.to_string(), item);
                    Ok(())
                }
                Some(actual) => Err(ErrorRecord::new(
                    ErrorCategory::TransactionCanceled,
                    format!(
                        "{} is {actual}, expected {} on '{}'",
                        guard.field, guard.expected, guard.key
                    ),
                )),
                None => Err(ErrorRecord::new(
                    ErrorCategory::TransactionCanceled,
                    format!(
                        "guard item '{}' is absent or has no integer field '{}'",
                        guard.key, guard.field
                    ),
                )),
            }
        })
    }

    fn conditional_update<'a>(
        &'a self,
        key: &'a str,
        field: &'a str,
        expected: i64,
        new: i64,
    ) -> BoxFuture<'a, Result<(), ErrorRecord>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let mut entry = self.items.get_mut(key).ok_or_else(|| {
                ErrorRecord::new(
                    ErrorCategory::ConditionalCheckFailed,
                    format!("item '{key}' is absent"),
                )
            })?;
            match Self::field_value(entry.value(), field) {
                Some(actual) if actual == expected => {
                    entry.value_mut()[field] = Value::from(new);
                    Ok(())
                }
                Some(actual) => Err(ErrorRecord::new(
                    ErrorCategory::ConditionalCheckFailed,
                    format!("{field} is {actual}, expected {expected} on '{key}'"),
                )),
                None => Err(ErrorRecord::new(
                    ErrorCategory::ConditionalCheckFailed,
                    format!("item '{key}' has no integer field '{field}'"),
                )),
            }
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, ErrorRecord>> {
        Box::pin(async move { Ok(self.items.remove(key).is_some()) })
    }

    fn scan<'a>(&'a self) -> BoxFuture<'a, Result<Vec<(String, Value)>, ErrorRecord>> {
        Box::pin(async move {
            Ok(self
                .items
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect())
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    use profisync_types::profile::{LAST_ID_FIELD, META_KEY};

    async fn seeded(last_id: i64) -> MemoryProfileStore {
        let store = MemoryProfileStore::new();
        store
            .put(META_KEY, json!({ LAST_ID_FIELD: last_id }))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_get_put_delete_roundtrip() {
        let store = MemoryProfileStore::new();
        assert_eq!(store.get("profile#1").await.unwrap(), None);

        store.put("profile#1", json!({ "userId": 1 })).await.unwrap();
        assert_eq!(
            store.get("profile#1").await.unwrap(),
            Some(json!({ "userId": 1 }))
        );

        assert!(store.delete("profile#1").await.unwrap());
        assert!(!store.delete("profile#1").await.unwrap());
    }

    #[tokio::test]
    async fn test_conditional_update_applies_on_match() {
        let store = seeded(41).await;
        store
            .conditional_update(META_KEY, LAST_ID_FIELD, 41, 42)
            .await
            .unwrap();
        assert_eq!(
            store.get(META_KEY).await.unwrap().unwrap()[LAST_ID_FIELD],
            42
        );
    }

    #[tokio::test]
    async fn test_conditional_update_conflicts_on_mismatch() {
        let store = seeded(42).await;
        let err = store
            .conditional_update(META_KEY, LAST_ID_FIELD, 41, 42)
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::ConditionalCheckFailed);
        // The counter is untouched.
        assert_eq!(
            store.get(META_KEY).await.unwrap().unwrap()[LAST_ID_FIELD],
            42
        );
    }

    #[tokio::test]
    async fn test_transact_put_claims_and_bumps_atomically() {
        let store = seeded(41).await;
        let guard = CounterGuard {
            key: META_KEY.to_string(),
            field: LAST_ID_FIELD.to_string(),
            expected: 41,
            new: 42,
        };
        store
            .transact_put("profile#42", json!({ "userId": 42 }), guard)
            .await
            .unwrap();

        assert_eq!(
            store.get(META_KEY).await.unwrap().unwrap()[LAST_ID_FIELD],
            42
        );
        assert!(store.get("profile#42").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_transact_put_cancels_and_writes_nothing_on_conflict() {
        let store = seeded(42).await;
        let guard = CounterGuard {
            key: META_KEY.to_string(),
            field: LAST_ID_FIELD.to_string(),
            expected: 41,
            new: 42,
        };
        let err = store
            .transact_put("profile#42", json!({ "userId": 42 }), guard)
            .await
            .unwrap_err();

        assert_eq!(err.category, ErrorCategory::TransactionCanceled);
        assert!(store.get("profile#42").await.unwrap().is_none());
        assert_eq!(
            store.get(META_KEY).await.unwrap().unwrap()[LAST_ID_FIELD],
            42
        );
    }

    #[tokio::test]
    async fn test_only_one_of_many_identical_claims_wins() {
        let store = seeded(0).await;
        let mut wins = 0;
        for i in 0..8 {
            let guard = CounterGuard {
                key: META_KEY.to_string(),
                field: LAST_ID_FIELD.to_string(),
                expected: 0,
                new: 1,
            };
            if store
                .transact_put(&format!("profile#claim-{i}"), json!({ "i": i }), guard)
                .await
                .is_ok()
            {
                wins += 1;
            }
        }
        assert_eq!(wins, 1, "exactly one claim of id 1 may succeed");
    }

    #[tokio::test]
    async fn test_put_if_guards_on_version() {
        let store = MemoryProfileStore::new();
        store
            .put("profile#7", json!({ "userId": 7, "version": 1 }))
            .await
            .unwrap();

        store
            .put_if("profile#7", json!({ "userId": 7, "version": 2 }), "version", 1)
            .await
            .unwrap();

        let err = store
            .put_if("profile#7", json!({ "userId": 7, "version": 2 }), "version", 1)
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::ConditionalCheckFailed);
    }

    // -----------------------------------------------------------------------
    // Property: CAS sequences behave like the sequential model
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn prop_cas_matches_sequential_model(
            initial in 0i64..16,
            ops in proptest::collection::vec((0i64..16, 0i64..16), 1..32),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            rt.block_on(async {
                let store = seeded(initial).await;
                let mut model = initial;
                for (expected, new) in ops {
                    let result = store
                        .conditional_update(META_KEY, LAST_ID_FIELD, expected, new)
                        .await;
                    if expected == model {
                        prop_assert!(result.is_ok());
                        model = new;
                    } else {
                        prop_assert_eq!(
                            result.unwrap_err().category,
                            ErrorCategory::ConditionalCheckFailed
                        );
                    }
                }
                let stored = store.get(META_KEY).await.unwrap().unwrap();
                prop_assert_eq!(stored[LAST_ID_FIELD].as_i64(), Some(model));
                Ok(())
            })?;
        }
    }
}
