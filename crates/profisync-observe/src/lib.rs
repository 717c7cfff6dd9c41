//! Observability setup for Profisync.

pub mod tracing_setup;
