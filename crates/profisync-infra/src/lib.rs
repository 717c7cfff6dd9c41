//! Infrastructure adapters for Profisync.
//!
//! Implements the collaborator ports defined in `profisync-core`:
//! - `memory` -- dashmap-backed profile store, identity directory, and run
//!   repository (tests and embedded use)
//! - `sqlite` -- sqlx-backed profile store and run repository (WAL mode,
//!   split reader/writer pools, embedded migrations)
//! - `backend` -- JSON `ServiceBackend` adapters bridging ServiceCall
//!   parameter documents onto the typed ports
//! - `functions` -- the four business functions and their registry

pub mod backend;
pub mod functions;
pub mod memory;
pub mod sqlite;
