//! Shared domain types for Profisync.
//!
//! This crate contains the core domain types used across the Profisync
//! platform: the workflow definition IR, the error taxonomy, profile records,
//! engine events, and global configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod profile;
pub mod workflow;
