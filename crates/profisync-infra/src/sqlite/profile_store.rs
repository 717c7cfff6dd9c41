//! SQLite-backed profile store.
//!
//! Items are JSON blobs in the `profile_items` table. The conditional
//! writes express their guards as `WHERE json_extract(...) = ?` clauses and
//! check `rows_affected`, so the compare-and-swap discipline is enforced by
//! the database, not by engine-level locking. The transactional put runs
//! inside an sqlx transaction on the single-connection writer pool.

use serde_json::Value;
use sqlx::Row;

use profisync_core::collaborator::{BoxFuture, ProfileStore};
use profisync_types::error::{ErrorCategory, ErrorRecord};
use profisync_types::profile::CounterGuard;

use super::pool::DatabasePool;

/// sqlx-backed implementation of `ProfileStore`.
pub struct SqliteProfileStore {
    pool: DatabasePool,
}

impl SqliteProfileStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn storage_err(e: sqlx::Error) -> ErrorRecord {
    ErrorRecord::new(
        ErrorCategory::ServiceUnavailable,
        format!("profile store unavailable: {e}"),
    )
}

fn parse_item(raw: &str) -> Result<Value, ErrorRecord> {
    serde_json::from_str(raw).map_err(|e| {
        ErrorRecord::new(
            ErrorCategory::ServiceUnavailable,
            format!("corrupt profile item: {e}"),
        )
    })
}

fn encode_item(item: &Value) -> String {
    item.to_string()
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

impl ProfileStore for SqliteProfileStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, ErrorRecord>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT item FROM profile_items WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool.reader)
                .await
                .map_err(storage_err)?;
            match row {
                Some(row) => {
                    let raw: String = row.try_get("item").map_err(storage_err)?;
                    Ok(Some(parse_item(&raw)?))
                }
                None => Ok(None),
            }
        })
    }

    fn put<'a>(&'a self, key: &'a str, item: Value) -> BoxFuture<'a, Result<(), ErrorRecord>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO profile_items (key, item) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET item = excluded.item",
            )
            .bind(key)
            .bind(encode_item(&item))
            .execute(&self.pool.writer)
            .await
            .map_err(storage_err)?;
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
            let result = sqlx::query(
                "UPDATE profile_items SET item = ?1
                 WHERE key = ?2 AND json_extract(item, ?3) = ?4",
            )
            .bind(encode_item(&item))
            .bind(key)
            .bind(json_path(field))
            .bind(expected)
            .execute(&self.pool.writer)
            .await
            .map_err(storage_err)?;

            if result.rows_affected() == 1 {
                Ok(())
            } else {
                Err(ErrorRecord::new(
                    ErrorCategory::ConditionalCheckFailed,
                    format!("{field} no longer equals {expected} on '{key}'"),
                ))
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
            let mut tx = self.pool.writer.begin().await.map_err(storage_err)?;

            let advanced = sqlx::query(
                "UPDATE profile_items SET item = json_set(item, ?1, ?2)
                 WHERE key = ?3 AND json_extract(item, ?1) = ?4",
            )
            .bind(json_path(&guard.field))
            .bind(guard.new)
            .bind(&guard.key)
            .bind(guard.expected)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

            if advanced.rows_affected() != 1 {
                tx.rollback().await.map_err(storage_err)?;
                return Err(ErrorRecord::new(
                    ErrorCategory::TransactionCanceled,
                    format!(
                        "{} no longer equals {} on '{}'",
                        guard.field, guard.expected, guard.key
                    ),
                ));
            }

            sqlx::query(
                "INSERT INTO profile_items (key, item) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET item = excluded.item",
            )
            .bind(key)
            .bind(encode_item(&item))
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

            tx.commit().await.map_err(storage_err)?;
            Ok(())
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
            let result = sqlx::query(
                "UPDATE profile_items SET item = json_set(item, ?1, ?2)
                 WHERE key = ?3 AND json_extract(item, ?1) = ?4",
            )
            .bind(json_path(field))
            .bind(new)
            .bind(key)
            .bind(expected)
            .execute(&self.pool.writer)
            .await
            .map_err(storage_err)?;

            if result.rows_affected() == 1 {
                Ok(())
            } else {
                Err(ErrorRecord::new(
                    ErrorCategory::ConditionalCheckFailed,
                    format!("{field} no longer equals {expected} on '{key}'"),
                ))
            }
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, ErrorRecord>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM profile_items WHERE key = ?1")
                .bind(key)
                .execute(&self.pool.writer)
                .await
                .map_err(storage_err)?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn scan<'a>(&'a self) -> BoxFuture<'a, Result<Vec<(String, Value)>, ErrorRecord>> {
        Box::pin(async move {
            let rows = sqlx::query("SELECT key, item FROM profile_items ORDER BY key")
                .fetch_all(&self.pool.reader)
                .await
                .map_err(storage_err)?;
            rows.into_iter()
                .map(|row| {
                    let key: String = row.try_get("key").map_err(storage_err)?;
                    let raw: String = row.try_get("item").map_err(storage_err)?;
                    Ok((key, parse_item(&raw)?))
                })
                .collect()
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
