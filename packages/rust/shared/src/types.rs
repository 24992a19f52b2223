//! Core domain types for rnws bundling runs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// A native target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    /// Query-string / log form of the platform.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
        }
    }

    /// Infer a platform from an entry name suffix (`index.ios` → iOS).
    pub fn from_entry_name(entry: &str) -> Option<Self> {
        match entry.rsplit_once('.') {
            Some((_, suffix)) => suffix.parse().ok(),
            None => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// BundleTask
// ---------------------------------------------------------------------------

/// One bundle to pull from the build server and persist for a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleTask {
    /// Platform this bundle is packaged into.
    pub platform: Platform,
    /// Logical entry name (e.g., `index.ios`).
    pub entry_name: String,
    /// Server-relative bundle path (e.g., `/index.ios.bundle`).
    pub bundle_path: String,
    /// Absolute destination on disk.
    pub target_path: PathBuf,
}

impl std::fmt::Display for BundleTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.platform, self.entry_name)
    }
}

// ---------------------------------------------------------------------------
// BundleEndpoint
// ---------------------------------------------------------------------------

/// Anything that serves bundles at `http://{hostname}:{port}`.
///
/// Implemented by the build server; lets materialization be pointed at any
/// HTTP endpoint.
pub trait BundleEndpoint {
    fn hostname(&self) -> &str;
    fn port(&self) -> u16;

    /// Base URL with no trailing slash.
    fn base_url(&self) -> String {
        format!("http://{}:{}", self.hostname(), self.port())
    }
}

// ---------------------------------------------------------------------------
// ExternalsMap
// ---------------------------------------------------------------------------

/// Module identifiers a bundler must treat as already provided by the runtime.
///
/// Serializes to the object shape bundler `externals` options expect:
/// `{ "React": "commonjs React", ... }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalsMap(BTreeMap<String, String>);

impl ExternalsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a module as external. Last write wins on duplicate ids.
    pub fn insert(&mut self, module_id: impl Into<String>) {
        let module_id = module_id.into();
        let directive = format!("commonjs {module_id}");
        self.0.insert(module_id, directive);
    }

    pub fn get(&self, module_id: &str) -> Option<&str> {
        self.0.get(module_id).map(String::as_str)
    }

    pub fn contains(&self, module_id: &str) -> bool {
        self.0.contains_key(module_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<String> for ExternalsMap {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut map = Self::new();
        for id in iter {
            map.insert(id);
        }
        map
    }
}
