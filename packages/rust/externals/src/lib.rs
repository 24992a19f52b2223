//! Externals derivation: which modules the host runtime already provides.
//!
//! The runtime package's dependency graph is walked by a
//! [`DependencyGraphProvider`]; every non-polyfill module becomes an entry in
//! an [`ExternalsMap`] so the application bundle does not ship it twice.

pub mod blacklist;
pub mod graph;

use std::path::{Path, PathBuf};

use futures::future::try_join_all;
use rnws_shared::{ExternalsMap, Result, RnwsError};
use serde::Deserialize;
use tracing::{debug, info, instrument};

pub use blacklist::{Blacklist, BlacklistPattern};
pub use graph::{DependencyGraphProvider, DependencyRecord, GraphQuery};

/// Name of the runtime package inside `node_modules`.
pub const RUNTIME_PACKAGE: &str = "react-native";

/// The installed runtime package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePackage {
    /// Package directory.
    pub root: PathBuf,
    /// Entry module, relative to `root`.
    pub main: String,
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    main: Option<String>,
}

impl RuntimePackage {
    /// Read `node_modules/react-native/package.json` under `project_root`.
    pub fn locate(project_root: &Path) -> Result<Self> {
        let root = project_root.join("node_modules").join(RUNTIME_PACKAGE);
        let manifest_path = root.join("package.json");

        let content = std::fs::read_to_string(&manifest_path).map_err(|e| {
            RnwsError::config(format!(
                "cannot read {}: {e}. Is {RUNTIME_PACKAGE} installed?",
                manifest_path.display()
            ))
        })?;
        let manifest: PackageManifest = serde_json::from_str(&content).map_err(|e| {
            RnwsError::config(format!("invalid {}: {e}", manifest_path.display()))
        })?;

        Ok(Self {
            root,
            main: manifest.main.unwrap_or_else(|| "index.js".to_string()),
        })
    }

    /// Graph query covering the whole package with no platform excluded.
    pub fn graph_query(&self) -> GraphQuery {
        GraphQuery {
            project_roots: vec![self.root.clone()],
            asset_roots: vec![self.root.clone()],
            blacklist: Blacklist::all_platforms(),
            transform_module_path: self.root.join("packager").join("transformer.js"),
        }
    }
}

/// Build the externals map for everything the runtime package depends on.
///
/// Polyfills are dropped, the remaining names are resolved concurrently, and
/// any failure aborts the whole call.
#[instrument(skip_all, fields(root = %runtime.root.display(), main = %runtime.main))]
pub async fn resolve_externals(
    runtime: &RuntimePackage,
    provider: &dyn DependencyGraphProvider,
) -> Result<ExternalsMap> {
    let query = runtime.graph_query();
    let records = provider.get_dependencies(&query, &runtime.main).await?;
    let total = records.len();

    let modules: Vec<&dyn DependencyRecord> = records
        .iter()
        .map(|record| record.as_ref())
        .filter(|record| !record.is_polyfill())
        .collect();
    debug!(total, polyfills = total - modules.len(), "dependency graph walked");

    let names = try_join_all(modules.into_iter().map(|record| record.name())).await?;
    let externals: ExternalsMap = names.into_iter().collect();

    info!(modules = externals.len(), "externals resolved");
    Ok(externals)
}
