//! In-memory identity directory.
//!
//! One user per username. Creation of an existing username fails with
//! `DuplicateIdentity`; attribute updates on a missing user fail with
//! `NotFound` -- the same contract the workflows' catch bindings match on.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use profisync_core::collaborator::{BoxFuture, IdentityDirectory};
use profisync_types::error::{ErrorCategory, ErrorRecord};
use profisync_types::profile::{DirectoryUser, UserAttribute};

/// Dashmap-backed `IdentityDirectory` for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryIdentityDirectory {
    users: DashMap<String, DirectoryUser>,
}

impl MemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityDirectory for MemoryIdentityDirectory {
    fn create_user<'a>(
        &'a self,
        username: &'a str,
        attributes: Vec<UserAttribute>,
    ) -> BoxFuture<'a, Result<DirectoryUser, ErrorRecord>> {
        Box::pin(async move {
            match self.users.entry(username.to_string()) {
                Entry::Occupied(_) => Err(ErrorRecord::new(
                    ErrorCategory::DuplicateIdentity,
                    format!("username '{username}' already exists"),
                )),
                Entry::Vacant(entry) => {
                    let user = DirectoryUser {
                        username: username.to_string(),
                        attributes,
                    };
                    entry.insert(user.clone());
                    Ok(user)
                }
            }
        })
    }

    fn update_user_attributes<'a>(
        &'a self,
        username: &'a str,
        attributes: Vec<UserAttribute>,
    ) -> BoxFuture<'a, Result<(), ErrorRecord>> {
        Box::pin(async move {
            let mut user = self.users.get_mut(username).ok_or_else(|| {
                ErrorRecord::new(
                    ErrorCategory::NotFound,
                    format!("no user with username '{username}'"),
                )
            })?;
            for attribute in attributes {
                match user
                    .attributes
                    .iter_mut()
                    .find(|existing| existing.name == attribute.name)
                {
                    Some(existing) => existing.value = attribute.value,
                    None => user.attributes.push(attribute),
                }
            }
            Ok(())
        })
    }

    fn get_user<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, Result<Option<DirectoryUser>, ErrorRecord>> {
        Box::pin(async move { Ok(self.users.get(username).map(|u| u.clone())) })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
