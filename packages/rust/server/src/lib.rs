//! The rnws build server.
//!
//! This crate provides:
//! - [`BuildServer`]: serves `/<entry>.bundle` for each configured entry
//! - [`BundleSource`]: where bundle bytes come from ([`UpstreamBundleSource`] by default)
//! - [`HotChannel`]: Server-Sent Events feed of bundle updates when hot reload is on
//!
//! The server also owns the packager and bundler processes it launches and
//! tears them down in [`BuildServer::stop`].

pub mod hot;
mod routes;
pub mod server;
pub mod source;
mod tooling;

pub use hot::{HotChannel, HotEvent};
pub use server::BuildServer;
pub use source::{BundleRequest, BundleSource, UpstreamBundleSource};
