//! Collaborator ports: the engine's boundary to the outside world.
//!
//! The traits here are defined in core and implemented in the infrastructure
//! layer (dependency inversion, same pattern as the run repository). Two
//! levels:
//!
//! - `ServiceBackend` / `FunctionInvoker` -- the JSON-level seams the engine
//!   dispatches `ServiceCall` / `FunctionInvoke` steps through.
//! - `ProfileStore` / `IdentityDirectory` -- typed contracts the reference
//!   adapters and business functions build on, including the
//!   compare-and-swap primitive the id-allocation protocol depends on.
//!
//! Methods return boxed futures so the traits stay dyn-compatible.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use profisync_types::error::ErrorRecord;
use profisync_types::profile::{CounterGuard, DirectoryUser, UserAttribute};

/// Boxed future alias used by the dyn-compatible collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ---------------------------------------------------------------------------
// JSON-level seams
// ---------------------------------------------------------------------------

/// A backend reachable through `ServiceCall` steps.
///
/// `parameters` is the step's parameter template rendered against the run
/// context. Failures are categorized `ErrorRecord`s so retry policies and
/// catch bindings can match on them.
pub trait ServiceBackend: Send + Sync {
    fn call<'a>(
        &'a self,
        action: &'a str,
        parameters: Value,
    ) -> BoxFuture<'a, Result<Value, ErrorRecord>>;
}

/// Externally-owned business logic reachable through `FunctionInvoke` steps.
///
/// Opaque to the engine; the engine only manages input/output wiring and
/// retry/catch around the call.
pub trait FunctionInvoker: Send + Sync {
    fn invoke<'a>(
        &'a self,
        function: &'a str,
        input: Value,
    ) -> BoxFuture<'a, Result<Value, ErrorRecord>>;
}

// ---------------------------------------------------------------------------
// Typed profile-store contract
// ---------------------------------------------------------------------------

/// The profile store: items keyed by string, with the conditional-write
/// primitives the allocation and rollback protocols require.
///
/// Every mutation that participates in the allocate-or-rollback protocol is
/// a conditional write -- never an unconditional overwrite -- so that at
/// most one run successfully claims a given sequence id.
pub trait ProfileStore: Send + Sync {
    /// Read an item. `None` when the key is absent.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, ErrorRecord>>;

    /// Unconditionally write an item.
    fn put<'a>(&'a self, key: &'a str, item: Value) -> BoxFuture<'a, Result<(), ErrorRecord>>;

    /// Replace an item, guarded by an integer field on its current value.
    ///
    /// Fails with `ConditionalCheckFailed` when the item is absent or
    /// `field` does not equal `expected`.
    fn put_if<'a>(
        &'a self,
        key: &'a str,
        item: Value,
        field: &'a str,
        expected: i64,
    ) -> BoxFuture<'a, Result<(), ErrorRecord>>;

    /// Write an item and advance the guarded counter in one atomic unit.
    ///
    /// Fails with `TransactionCanceled` (and writes nothing) when the
    /// guard's `field` on the item at `guard.key` does not equal
    /// `guard.expected`.
    fn transact_put<'a>(
        &'a self,
        key: &'a str,
        item: Value,
        guard: CounterGuard,
    ) -> BoxFuture<'a, Result<(), ErrorRecord>>;

    /// Compare-and-swap a scalar integer field:
    /// set `field` to `new` only if it currently equals `expected`.
    ///
    /// Fails with `ConditionalCheckFailed` on mismatch.
    fn conditional_update<'a>(
        &'a self,
        key: &'a str,
        field: &'a str,
        expected: i64,
        new: i64,
    ) -> BoxFuture<'a, Result<(), ErrorRecord>>;

    /// Delete an item. Returns whether it existed.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, ErrorRecord>>;

    /// All items in the store (key, item) -- used by the company updaters.
    fn scan<'a>(&'a self) -> BoxFuture<'a, Result<Vec<(String, Value)>, ErrorRecord>>;
}

// ---------------------------------------------------------------------------
// Typed identity-directory contract
// ---------------------------------------------------------------------------

/// The identity directory holding one user per username.
pub trait IdentityDirectory: Send + Sync {
    /// Create a user. Fails with `DuplicateIdentity` when the username is
    /// already taken.
    fn create_user<'a>(
        &'a self,
        username: &'a str,
        attributes: Vec<UserAttribute>,
    ) -> BoxFuture<'a, Result<DirectoryUser, ErrorRecord>>;

    /// Update attributes on an existing user. Fails with `NotFound` when the
    /// user does not exist.
    fn update_user_attributes<'a>(
        &'a self,
        username: &'a str,
        attributes: Vec<UserAttribute>,
    ) -> BoxFuture<'a, Result<(), ErrorRecord>>;

    /// Read a user, if present.
    fn get_user<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, Result<Option<DirectoryUser>, ErrorRecord>>;
}
