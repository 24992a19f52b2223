//! Interface to a packager's dependency graph.

use std::path::PathBuf;

use async_trait::async_trait;
use rnws_shared::Result;

use crate::blacklist::Blacklist;

/// Parameters for a dependency graph walk.
#[derive(Debug, Clone)]
pub struct GraphQuery {
    pub project_roots: Vec<PathBuf>,
    pub asset_roots: Vec<PathBuf>,
    pub blacklist: Blacklist,
    pub transform_module_path: PathBuf,
}

/// One module in the graph. Owned by the provider.
#[async_trait]
pub trait DependencyRecord: Send + Sync {
    /// Polyfills are injected by the runtime and never imported by name.
    fn is_polyfill(&self) -> bool;

    /// The module identifier. May require reading the module.
    async fn name(&self) -> Result<String>;
}

/// Something that can walk the transitive dependencies of an entry module.
#[async_trait]
pub trait DependencyGraphProvider: Send + Sync {
    async fn get_dependencies(
        &self,
        query: &GraphQuery,
        entry_point: &str,
    ) -> Result<Vec<Box<dyn DependencyRecord>>>;
}
