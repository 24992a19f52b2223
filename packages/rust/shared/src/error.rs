//! Error types for rnws.
//!
//! Library crates use [`RnwsError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all rnws operations.
#[derive(Debug, thiserror::Error)]
pub enum RnwsError {
    /// Missing or invalid configuration. Fatal, reported before any server starts.
    #[error("config error: {message}")]
    Config { message: String },

    /// The build server could not bind or bring up its tools.
    #[error("server start error: {message}")]
    ServerStart { message: String },

    /// Transport failure or non-2xx response while fetching an artifact.
    #[error("fetch error: {url}: {message}")]
    Fetch {
        url: String,
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    /// Directory creation or write failure.
    #[error("filesystem error at {path:?}: {source}")]
    Filesystem {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The bundle source could not produce a bundle for an entry.
    #[error("bundle error for '{entry}': {message}")]
    Bundle { entry: String, message: String },

    /// Dependency graph provider failure.
    #[error("dependency graph error: {0}")]
    Graph(String),

    /// The running HTTP server failed.
    #[error("server error: {0}")]
    Server(String),

    /// Supervised tool process failure.
    #[error("tooling error: {0}")]
    Tooling(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RnwsError>;

impl RnwsError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a server start error from any displayable message.
    pub fn server_start(msg: impl Into<String>) -> Self {
        Self::ServerStart {
            message: msg.into(),
        }
    }

    /// Create a transport-level fetch error (no response received).
    pub fn transport(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: msg.into(),
            status: None,
            body: None,
        }
    }

    /// Create a fetch error for a non-success HTTP response.
    pub fn http_status(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: format!("HTTP {status}"),
            status: Some(status),
            body: Some(body.into()),
        }
    }

    /// Create a bundle source error for an entry.
    pub fn bundle(entry: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Bundle {
            entry: entry.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// HTTP status carried by a fetch error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Fetch { status, .. } => *status,
            _ => None,
        }
    }
}
