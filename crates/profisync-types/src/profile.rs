//! Profile-store item shapes and directory attribute types.
//!
//! Profile items live under keys `profile#<userId>`. A singleton counter
//! item under `profile-meta` holds the numeric `lastId` field used by the
//! id-allocation protocol. Profile items carry a numeric `version` field for
//! optimistic concurrency on updates.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Item keys
// ---------------------------------------------------------------------------

/// Key prefix for profile items.
pub const PROFILE_KEY_PREFIX: &str = "profile#";

/// Key of the singleton counter item.
pub const META_KEY: &str = "profile-meta";

/// Name of the counter field on the metadata item.
pub const LAST_ID_FIELD: &str = "lastId";

/// Build the item key for a user's profile record.
pub fn profile_key(user_id: i64) -> String {
    format!("{PROFILE_KEY_PREFIX}{user_id}")
}

// ---------------------------------------------------------------------------
// ProfileRecord
// ---------------------------------------------------------------------------

/// A user's profile record as stored in the profile store.
///
/// Field names are camelCase on the wire to match the workflow context
/// documents that reference them by path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    /// The allocated sequence id.
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_location: Option<String>,
    /// Optimistic-concurrency counter, bumped on every update.
    #[serde(default = "initial_version")]
    pub version: i64,
}

fn initial_version() -> i64 {
    1
}

// ---------------------------------------------------------------------------
// Directory types
// ---------------------------------------------------------------------------

/// A single attribute on a directory user (e.g. email, email_verified).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttribute {
    pub name: String,
    pub value: String,
}

impl UserAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A user as held by the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub username: String,
    pub attributes: Vec<UserAttribute>,
}

impl DirectoryUser {
    /// Value of a named attribute, if present.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

// ---------------------------------------------------------------------------
// CounterGuard
// ---------------------------------------------------------------------------

/// Condition attached to a transactional profile write: the integer `field`
/// on the item at `key` must equal `expected`, and is set to `new` in the
/// same atomic unit as the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterGuard {
    pub key: String,
    pub field: String,
    pub expected: i64,
    pub new: i64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
