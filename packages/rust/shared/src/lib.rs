//! Shared types, error model, and configuration for rnws.
//!
//! This crate is the foundation depended on by all other rnws crates.
//! It provides:
//! - [`RnwsError`]: the unified error type
//! - Domain types ([`Platform`], [`BundleTask`], [`ExternalsMap`], [`BundleEndpoint`])
//! - Configuration ([`ServerConfig`], [`ProjectConfig`], project config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    BundlerConfig, PROJECT_CONFIG_FILE, ProjectConfig, RuntimeConfig, ServerConfig, ToolConfig,
    load_project_config, load_project_config_from,
};
pub use error::{Result, RnwsError};
pub use types::{BundleEndpoint, BundleTask, ExternalsMap, Platform};
