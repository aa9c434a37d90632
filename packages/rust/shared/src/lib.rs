//! Shared types, error model, and configuration for crmrelay.
//!
//! This crate is the foundation depended on by all other crmrelay crates.
//! It provides:
//! - [`CrmRelayError`] — the unified error type
//! - The canonical domain model ([`EntityRef`], [`Outcome`], [`BatchResult`],
//!   [`TargetContext`], search types)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, SearchConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_api_key,
};
pub use error::{CrmRelayError, Result};
pub use types::{
    BatchResult, BulkAction, Cursor, EntityId, EntityRef, FailureReason, Outcome, Page,
    RelationKind, Resource, SearchQuery, SelectionMode, SubmissionId, TargetContext,
};
