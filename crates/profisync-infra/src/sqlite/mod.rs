//! SQLite-backed collaborator implementations.

pub mod pool;
pub mod profile_store;
pub mod run_log;

pub use pool::{DatabasePool, default_database_url};
pub use profile_store::SqliteProfileStore;
pub use run_log::SqliteRunRepository;
