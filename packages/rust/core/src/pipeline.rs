//! Serve and bundle modes.
//!
//! Bundle mode: start the server → plan tasks → materialize concurrently →
//! stop the server → report a [`BundleOutcome`].

use std::time::Instant;

use futures::future::join_all;
use rnws_fetch::ArtifactFetcher;
use rnws_materialize::{BundleMaterializer, MaterializedBundle};
use rnws_server::BuildServer;
use rnws_shared::{BundleTask, Result, RnwsError, ServerConfig};
use tracing::{error, info, instrument, warn};

use crate::plan::{BundleOptions, plan_tasks};

/// A task that did not produce its bundle.
#[derive(Debug)]
pub struct TaskFailure {
    pub task: BundleTask,
    pub error: RnwsError,
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} bundle for entry '{}' failed: {}",
            self.task.platform, self.task.entry_name, self.error
        )
    }
}

/// Result of a bundle run once every task has settled.
#[derive(Debug, Default)]
pub struct BundleOutcome {
    pub succeeded: Vec<MaterializedBundle>,
    pub failed: Vec<TaskFailure>,
}

impl BundleOutcome {
    /// True when no task failed. A run with no planned tasks succeeds.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Progress callback for bundle mode.
pub trait BundleProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each materialization begins.
    fn task_started(&self, task: &BundleTask);
    /// Called as each materialization settles.
    fn task_finished(&self, task: &BundleTask, result: &Result<MaterializedBundle>);
    /// Called once with the final outcome.
    fn done(&self, outcome: &BundleOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl BundleProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn task_started(&self, _task: &BundleTask) {}
    fn task_finished(&self, _task: &BundleTask, _result: &Result<MaterializedBundle>) {}
    fn done(&self, _outcome: &BundleOutcome) {}
}

/// Serve mode: construct and start a server, and hand it back running.
///
/// The caller owns the server and is responsible for calling
/// [`BuildServer::stop`].
#[instrument(skip_all, fields(addr = %config.bind_addr()))]
pub async fn serve(config: ServerConfig) -> Result<BuildServer> {
    let mut server = BuildServer::new(config)?;
    server.start().await?;
    Ok(server)
}

/// Bundle mode with the default upstream bundle source.
pub async fn bundle(
    config: ServerConfig,
    options: &BundleOptions,
    progress: &dyn BundleProgress,
) -> Result<BundleOutcome> {
    let server = BuildServer::new(config)?;
    run_bundle(server, options, progress).await
}

/// Bundle mode on an already constructed server.
///
/// Returns `Err` only when the server cannot start; nothing is bundled then.
/// Task failures are collected in the outcome, and one failure never cancels
/// another. The server is always stopped before returning.
#[instrument(skip_all, fields(entries = server.config().entries.len()))]
pub async fn run_bundle(
    mut server: BuildServer,
    options: &BundleOptions,
    progress: &dyn BundleProgress,
) -> Result<BundleOutcome> {
    let start = Instant::now();
    let materializer = BundleMaterializer::new(ArtifactFetcher::new()?);

    progress.phase("Starting build server");
    server.start().await?;

    let tasks = plan_tasks(&server.config().entries, options);
    if tasks.is_empty() {
        warn!(
            ios_entry = %options.ios_entry,
            android_entry = %options.android_entry,
            "no configured entry matches a platform entry; nothing to bundle"
        );
    }

    progress.phase("Bundling");
    info!(tasks = tasks.len(), "materializing bundles");

    let server_ref = &server;
    let results = join_all(tasks.into_iter().map(|task| {
        let materializer = &materializer;
        async move {
            progress.task_started(&task);
            let result = materializer
                .materialize(server_ref, &task.bundle_path, &task.target_path)
                .await;
            progress.task_finished(&task, &result);
            (task, result)
        }
    }))
    .await;

    let mut outcome = BundleOutcome::default();
    for (task, result) in results {
        match result {
            Ok(bundle) => outcome.succeeded.push(bundle),
            Err(e) => {
                error!(
                    platform = %task.platform,
                    entry = %task.entry_name,
                    error = %e,
                    "bundle failed"
                );
                outcome.failed.push(TaskFailure { task, error: e });
            }
        }
    }

    progress.phase("Stopping build server");
    if let Err(e) = server.stop().await {
        warn!(error = %e, "build server did not stop cleanly");
    }

    info!(
        succeeded = outcome.succeeded.len(),
        failed = outcome.failed.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "bundle run complete"
    );
    progress.done(&outcome);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bytes::Bytes;
    use rnws_server::{BundleRequest, BundleSource};
    use rnws_shared::{BundlerConfig, Platform, ProjectConfig};

    use super::*;

    /// Serves `bundle:<entry>` and fails for entries listed in `broken`.
    struct FakeSource {
        broken: Vec<&'static str>,
    }

    #[async_trait]
    impl BundleSource for FakeSource {
        async fn bundle(&self, request: &BundleRequest) -> Result<Bytes> {
            if self.broken.contains(&request.entry.as_str()) {
                return Err(RnwsError::bundle(&request.entry, "webpack compilation failed"));
            }
            Ok(Bytes::from(format!("bundle:{}", request.entry)))
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl BundleProgress for RecordingProgress {
        fn phase(&self, name: &str) {
            self.events.lock().unwrap().push(format!("phase:{name}"));
        }
        fn task_started(&self, task: &BundleTask) {
            self.events.lock().unwrap().push(format!("start:{}", task.platform));
        }
        fn task_finished(&self, task: &BundleTask, result: &Result<MaterializedBundle>) {
            let status = if result.is_ok() { "ok" } else { "err" };
            self.events
                .lock()
                .unwrap()
                .push(format!("finish:{}:{status}", task.platform));
        }
        fn done(&self, outcome: &BundleOutcome) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done:{}", outcome.is_success()));
        }
    }

    fn config(root: &std::path::Path) -> ServerConfig {
        ServerConfig {
            hostname: "127.0.0.1".into(),
            port: 0,
            packager_port: 0,
            bundler_port: 0,
            entries: vec!["index.ios".into(), "index.android".into()],
            hot: false,
            bundler: BundlerConfig {
                config_path: root.join("webpack.config.js"),
            },
            project_root: root.to_path_buf(),
            project: ProjectConfig::without_tools(),
        }
    }

    fn server(root: &std::path::Path, broken: Vec<&'static str>) -> BuildServer {
        BuildServer::with_source(config(root), Arc::new(FakeSource { broken })).unwrap()
    }

    fn options(root: &std::path::Path) -> BundleOptions {
        BundleOptions {
            project_root: root.to_path_buf(),
            ..BundleOptions::default()
        }
    }

    fn ios_target(root: &std::path::Path) -> PathBuf {
        root.join("ios/main.jsbundle")
    }

    fn android_target(root: &std::path::Path) -> PathBuf {
        root.join("android/app/src/main/assets/index.android.bundle")
    }

    #[tokio::test]
    async fn bundles_both_platforms() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let outcome = run_bundle(server(root, vec![]), &options(root), &SilentProgress)
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.succeeded.len(), 2);
        assert_eq!(std::fs::read(ios_target(root)).unwrap(), b"bundle:index.ios");
        assert_eq!(
            std::fs::read(android_target(root)).unwrap(),
            b"bundle:index.android"
        );
    }

    #[tokio::test]
    async fn one_failure_does_not_cancel_the_other() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let outcome = run_bundle(
            server(root, vec!["index.android"]),
            &options(root),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert!(!outcome.is_success());
        assert_eq!(outcome.succeeded.len(), 1);
        assert_eq!(outcome.failed.len(), 1);

        let failure = &outcome.failed[0];
        assert_eq!(failure.task.platform, Platform::Android);
        assert_eq!(failure.error.status(), Some(502));
        let message = failure.to_string();
        assert!(message.contains("android"));
        assert!(message.contains("index.android"));

        assert!(ios_target(root).exists());
        assert!(!android_target(root).exists());
    }

    #[tokio::test]
    async fn disabled_platform_is_not_bundled() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let options = BundleOptions {
            ios: false,
            ..options(root)
        };

        let outcome = run_bundle(server(root, vec![]), &options, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(outcome.succeeded.len(), 1);
        assert!(!ios_target(root).exists());
        assert!(android_target(root).exists());
    }

    #[tokio::test]
    async fn start_failure_bundles_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = config(root);
        config.port = occupied.local_addr().unwrap().port();

        let server = BuildServer::with_source(config, Arc::new(FakeSource { broken: vec![] }))
            .unwrap();
        let err = run_bundle(server, &options(root), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, RnwsError::ServerStart { .. }));
        assert!(!ios_target(root).exists());
        assert!(!android_target(root).exists());
    }

    #[tokio::test]
    async fn progress_sees_every_phase_and_task() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let progress = RecordingProgress::default();

        run_bundle(server(root, vec!["index.ios"]), &options(root), &progress)
            .await
            .unwrap();

        let events = progress.events.lock().unwrap().clone();
        assert_eq!(events.first().map(String::as_str), Some("phase:Starting build server"));
        assert!(events.contains(&"start:ios".to_string()));
        assert!(events.contains(&"finish:ios:err".to_string()));
        assert!(events.contains(&"finish:android:ok".to_string()));
        assert!(events.contains(&"phase:Stopping build server".to_string()));
        assert_eq!(events.last().map(String::as_str), Some("done:false"));
    }

    #[tokio::test]
    async fn no_matching_entries_is_an_empty_success() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let options = BundleOptions {
            ios_entry: "main".into(),
            android_entry: "droid".into(),
            ..options(root)
        };

        let outcome = run_bundle(server(root, vec![]), &options, &SilentProgress)
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert!(outcome.succeeded.is_empty());
    }

    #[tokio::test]
    async fn serve_returns_running_server() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = serve(config(dir.path())).await.unwrap();
        assert!(server.is_running());
        server.stop().await.unwrap();
    }
}
