//! Workflow engine core and collaborator ports for Profisync.
//!
//! This crate defines the "ports" (collaborator traits) that the
//! infrastructure layer implements, and everything the engine needs to drive
//! a run through a transition graph:
//! - `path` -- dotted/bracket JSON path addressing with subtree-replace writes
//! - `template` -- parameter and result-selector rendering
//! - `context` -- the mutable document threaded through a run
//! - `definition` -- structural validation and YAML load/save
//! - `collaborator` -- ServiceBackend / FunctionInvoker / ProfileStore /
//!   IdentityDirectory ports
//! - `retry` -- retry-policy and catch-binding matching
//! - `repository` / `recorder` -- run and step audit recording
//! - `engine` -- the interpreter (retries, catch dispatch, run timeout)
//! - `workflows` -- the three built-in workflow definitions
//! - `registry` -- named definition lookup
//!
//! Depends only on `profisync-types` -- never on `profisync-infra` or any
//! database/IO crate.

pub mod collaborator;
pub mod context;
pub mod definition;
pub mod engine;
pub mod event;
pub mod path;
pub mod recorder;
pub mod registry;
pub mod repository;
pub mod retry;
pub mod template;
pub mod workflows;
