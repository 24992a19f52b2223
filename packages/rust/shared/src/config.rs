//! Configuration for rnws.
//!
//! CLI flags produce a single immutable [`ServerConfig`]. How the packager and
//! bundler processes are launched lives in an optional `rnws.toml` at the
//! project root ([`ProjectConfig`]); every field has a default.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RnwsError};

/// Project config file name, looked up in the project root.
pub const PROJECT_CONFIG_FILE: &str = "rnws.toml";

// ---------------------------------------------------------------------------
// Project config (matching rnws.toml schema)
// ---------------------------------------------------------------------------

/// Top-level project config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// React Native packager process.
    #[serde(default)]
    pub packager: ToolConfig,

    /// Bundler dev server process.
    #[serde(default)]
    pub bundler: ToolConfig,

    /// Runtime bundle prepended to every served bundle.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// `[packager]` / `[bundler]` sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Whether the server launches this tool at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Program and arguments. Supports `{hostname}`, `{port}`, `{config}`
    /// and `{project_root}` placeholders. Falls back to the built-in command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    /// Extra arguments appended when hot reload is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot_args: Option<Vec<String>>,

    /// How long to wait for the tool to accept connections on its port.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
            hot_args: None,
            ready_timeout_secs: default_ready_timeout(),
        }
    }
}

impl ToolConfig {
    /// A tool entry the server never launches.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_ready_timeout() -> u64 {
    60
}

/// `[runtime]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Packager path of the runtime bundle. Empty disables the runtime prefix.
    #[serde(default = "default_runtime_bundle_path")]
    pub bundle_path: String,

    /// `dev` flag forwarded to the packager.
    #[serde(default = "default_true")]
    pub dev: bool,

    /// `minify` flag forwarded to the packager.
    #[serde(default)]
    pub minify: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bundle_path: default_runtime_bundle_path(),
            dev: true,
            minify: false,
        }
    }
}

fn default_runtime_bundle_path() -> String {
    "/node_modules/react-native/Libraries/react-native/react-native.bundle".into()
}

const DEFAULT_PACKAGER_COMMAND: &[&str] = &[
    "node",
    "node_modules/react-native/packager/packager.js",
    "--port",
    "{port}",
];

const DEFAULT_BUNDLER_COMMAND: &[&str] = &[
    "node",
    "node_modules/webpack-dev-server/bin/webpack-dev-server.js",
    "--config",
    "{config}",
    "--host",
    "{hostname}",
    "--port",
    "{port}",
];

const DEFAULT_BUNDLER_HOT_ARGS: &[&str] = &["--hot", "--inline"];

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| (*s).to_string()).collect()
}

impl ProjectConfig {
    /// Packager command line, configured or built-in.
    pub fn packager_command(&self) -> Vec<String> {
        self.packager
            .command
            .clone()
            .unwrap_or_else(|| owned(DEFAULT_PACKAGER_COMMAND))
    }

    /// Packager hot-reload arguments (none by default).
    pub fn packager_hot_args(&self) -> Vec<String> {
        self.packager.hot_args.clone().unwrap_or_default()
    }

    /// Bundler dev server command line, configured or built-in.
    pub fn bundler_command(&self) -> Vec<String> {
        self.bundler
            .command
            .clone()
            .unwrap_or_else(|| owned(DEFAULT_BUNDLER_COMMAND))
    }

    /// Bundler hot-reload arguments, configured or built-in.
    pub fn bundler_hot_args(&self) -> Vec<String> {
        self.bundler
            .hot_args
            .clone()
            .unwrap_or_else(|| owned(DEFAULT_BUNDLER_HOT_ARGS))
    }

    /// Config that launches no tools. Used when the caller serves bundles itself.
    pub fn without_tools() -> Self {
        Self {
            packager: ToolConfig::disabled(),
            bundler: ToolConfig::disabled(),
            runtime: RuntimeConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Server config (runtime, built from CLI flags + project config)
// ---------------------------------------------------------------------------

/// The opaque bundler configuration handed to the bundler process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlerConfig {
    /// Absolute path to the bundler config file (e.g., `webpack.config.js`).
    pub config_path: PathBuf,
}

impl BundlerConfig {
    /// Resolve `path` against `cwd`. The file must exist.
    pub fn resolve(cwd: &Path, path: &Path) -> Result<Self> {
        let config_path = cwd.join(path);
        if !config_path.is_file() {
            return Err(RnwsError::config(format!(
                "Must specify webpackConfigPath or create ./webpack.config.js (looked for {})",
                config_path.display()
            )));
        }
        Ok(Self { config_path })
    }
}

/// Everything a build server needs, fixed for its lifetime.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Hostname the server listens on and tools are reached at.
    pub hostname: String,
    /// Port of the bundle server. `0` binds an ephemeral port.
    pub port: u16,
    /// Port of the React Native packager.
    pub packager_port: u16,
    /// Port of the bundler dev server.
    pub bundler_port: u16,
    /// Entry modules served as `/<entry>.bundle`.
    pub entries: Vec<String>,
    /// Enable hot reload.
    pub hot: bool,
    /// Bundler configuration.
    pub bundler: BundlerConfig,
    /// Directory tools run in and bundle targets are relative to.
    pub project_root: PathBuf,
    /// Tool launching and runtime settings.
    pub project: ProjectConfig,
}

impl ServerConfig {
    /// Check the invariants every server relies on.
    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(RnwsError::config("hostname must not be empty"));
        }

        if self.entries.is_empty() {
            return Err(RnwsError::config("at least one entry is required"));
        }
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.trim().is_empty() {
                return Err(RnwsError::config(format!("entry #{} is empty", index + 1)));
            }
            if entry.starts_with('/')
                || entry.contains(is_reserved_path_char)
                || entry.split('/').any(|segment| segment.starts_with(':'))
            {
                return Err(RnwsError::config(format!(
                    "entry '{entry}' cannot be served as '/{entry}.bundle'"
                )));
            }
        }

        let mut seen = HashSet::new();
        for (name, port) in [
            ("port", self.port),
            ("packagerPort", self.packager_port),
            ("webpackPort", self.bundler_port),
        ] {
            // 0 asks the OS for an ephemeral port and cannot collide.
            if port != 0 && !seen.insert(port) {
                return Err(RnwsError::config(format!(
                    "{name} {port} collides with another configured port"
                )));
            }
        }

        Ok(())
    }

    /// `hostname:port` string for binding the bundle server.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// Characters that would turn an entry's route into a pattern or query.
fn is_reserved_path_char(c: char) -> bool {
    c.is_whitespace() || matches!(c, '{' | '}' | '*' | '?' | '#' | '%')
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load `rnws.toml` from the project root. Returns defaults if it does not exist.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(PROJECT_CONFIG_FILE);

    if !path.exists() {
        tracing::debug!(?path, "project config not found, using defaults");
        return Ok(ProjectConfig::default());
    }

    load_project_config_from(&path)
}

/// Load the project config from a specific file path.
pub fn load_project_config_from(path: &Path) -> Result<ProjectConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RnwsError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RnwsError::config(format!("failed to parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_config() -> ServerConfig {
        ServerConfig {
            hostname: "localhost".into(),
            port: 8081,
            packager_port: 8082,
            bundler_port: 8083,
            entries: vec!["index.ios".into(), "index.android".into()],
            hot: false,
            bundler: BundlerConfig {
                config_path: PathBuf::from("/project/webpack.config.js"),
            },
            project_root: PathBuf::from("/project"),
            project: ProjectConfig::default(),
        }
    }

    #[test]
    fn default_project_config_commands() {
        let config = ProjectConfig::default();
        assert!(config.packager.enabled);
        assert_eq!(config.packager_command()[0], "node");
        assert!(config.bundler_command().contains(&"{config}".to_string()));
        assert_eq!(config.bundler_hot_args(), vec!["--hot", "--inline"]);
        assert!(config.packager_hot_args().is_empty());
        assert_eq!(config.packager.ready_timeout_secs, 60);
    }

    #[test]
    fn partial_project_config_keeps_defaults() {
        let toml_str = r#"
[bundler]
command = ["npx", "webpack-dev-server", "--port", "{port}"]

[packager]
enabled = false

[runtime]
minify = true
"#;
        let config: ProjectConfig = toml::from_str(toml_str).expect("parse");
        assert!(!config.packager.enabled);
        assert_eq!(config.bundler_command()[0], "npx");
        assert_eq!(config.bundler_hot_args(), vec!["--hot", "--inline"]);
        assert!(config.runtime.minify);
        assert!(config.runtime.dev);
        assert!(config.runtime.bundle_path.ends_with("react-native.bundle"));
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_project_config(dir.path()).expect("load");
        assert!(config.bundler.enabled);
    }

    #[test]
    fn malformed_project_config_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(PROJECT_CONFIG_FILE), "[packager\nenabled = ").unwrap();
        let err = load_project_config(dir.path()).unwrap_err();
        assert!(matches!(err, RnwsError::Config { .. }));
    }

    #[test]
    fn bundler_config_must_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = BundlerConfig::resolve(dir.path(), Path::new("webpack.config.js")).unwrap_err();
        assert!(err.to_string().contains("Must specify webpackConfigPath"));

        std::fs::write(dir.path().join("webpack.config.js"), "module.exports = {};").unwrap();
        let resolved =
            BundlerConfig::resolve(dir.path(), Path::new("webpack.config.js")).expect("resolve");
        assert!(resolved.config_path.is_absolute());
    }

    #[test]
    fn validate_accepts_defaults() {
        server_config().validate().expect("valid");
    }

    #[test]
    fn validate_rejects_bad_configs() {
        let mut config = server_config();
        config.entries.clear();
        assert!(config.validate().is_err());

        let mut config = server_config();
        config.hostname = " ".into();
        assert!(config.validate().is_err());

        let mut config = server_config();
        config.bundler_port = config.port;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("webpackPort 8081"));

        let mut config = server_config();
        config.entries.push(String::new());
        assert!(config.validate().is_err());

        let mut config = server_config();
        config.entries = vec!["index.{platform}".into()];
        assert!(config.validate().is_err());

        for entry in [":app", "app/:main"] {
            let mut config = server_config();
            config.entries = vec![entry.into()];
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(entry), "{entry} accepted");
        }

        // A colon inside a segment is still a literal route
        let mut config = server_config();
        config.entries = vec!["app:main".into()];
        config.validate().expect("valid");
    }

    #[test]
    fn validate_allows_repeated_ephemeral_ports() {
        let mut config = server_config();
        config.port = 0;
        config.packager_port = 0;
        config.validate().expect("valid");
    }
}
