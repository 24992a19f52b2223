//! Build server lifecycle: `Idle → Running → Stopped`.

use std::net::SocketAddr;
use std::sync::Arc;

use rnws_fetch::ArtifactFetcher;
use rnws_shared::{BundleEndpoint, Result, RnwsError, ServerConfig};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::hot::HotChannel;
use crate::routes::{self, AppState};
use crate::source::{BundleSource, UpstreamBundleSource};
use crate::tooling::{ToolSpec, ToolSupervisor};

enum Lifecycle {
    Idle,
    Running(Running),
    Stopped,
}

struct Running {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    serve: JoinHandle<std::io::Result<()>>,
    hot: Option<Arc<HotChannel>>,
    tools: ToolSupervisor,
}

/// Serves `/<entry>.bundle` for every configured entry.
///
/// Owns the listening socket and every tool process it launched; both are
/// released by [`stop`](Self::stop). A stopped server cannot be restarted.
pub struct BuildServer {
    config: Arc<ServerConfig>,
    source: Arc<dyn BundleSource>,
    state: Lifecycle,
}

impl BuildServer {
    /// Create a server that stitches bundles from the packager and bundler.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let source = UpstreamBundleSource::new(&config, ArtifactFetcher::new()?);
        Self::with_source(config, Arc::new(source))
    }

    /// Create a server backed by a custom bundle source.
    pub fn with_source(config: ServerConfig, source: Arc<dyn BundleSource>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            source,
            state: Lifecycle::Idle,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, Lifecycle::Running(_))
    }

    /// Bound socket address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.state {
            Lifecycle::Running(running) => Some(running.addr),
            _ => None,
        }
    }

    /// Hot reload channel, when running with hot reload enabled.
    pub fn hot_channel(&self) -> Option<Arc<HotChannel>> {
        match &self.state {
            Lifecycle::Running(running) => running.hot.clone(),
            _ => None,
        }
    }

    /// Bind the listener, bring up the tools, and start serving.
    ///
    /// Fails fast if the server is already running or was stopped. Anything
    /// started before a failure is torn down before the error is returned.
    #[instrument(skip_all, fields(addr = %self.config.bind_addr(), hot = self.config.hot))]
    pub async fn start(&mut self) -> Result<()> {
        match self.state {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => {
                return Err(RnwsError::server_start("server already started"));
            }
            Lifecycle::Stopped => {
                return Err(RnwsError::server_start(
                    "server was stopped; construct a new one",
                ));
            }
        }

        let bind_addr = self.config.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| RnwsError::server_start(format!("failed to bind {bind_addr}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| RnwsError::server_start(format!("failed to read bound address: {e}")))?;

        let specs = ToolSpec::from_config(&self.config)?;
        let mut tools = ToolSupervisor::new();
        if let Err(e) = tools
            .launch_all(&specs, &self.config.hostname, &self.config.project_root)
            .await
        {
            if let Err(cleanup) = tools.shutdown().await {
                warn!(error = %cleanup, "cleanup after failed start also failed");
            }
            return Err(e);
        }

        let hot = self.config.hot.then(|| Arc::new(HotChannel::new()));
        let app = routes::router(
            AppState {
                source: Arc::clone(&self.source),
                hot: hot.clone(),
                dev: self.config.project.runtime.dev,
                minify: self.config.project.runtime.minify,
            },
            &self.config.entries,
        );

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let serve = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(
            %addr,
            entries = ?self.config.entries,
            tools = tools.len(),
            "build server listening"
        );

        self.state = Lifecycle::Running(Running {
            addr,
            shutdown,
            serve,
            hot,
            tools,
        });
        Ok(())
    }

    /// Stop serving and release the socket and every tool process.
    ///
    /// Safe to call in any state. Every cleanup step is attempted; the first
    /// error is returned.
    #[instrument(skip_all)]
    pub async fn stop(&mut self) -> Result<()> {
        let running = match std::mem::replace(&mut self.state, Lifecycle::Stopped) {
            Lifecycle::Running(running) => running,
            Lifecycle::Idle | Lifecycle::Stopped => {
                debug!("stop called on a server that is not running");
                return Ok(());
            }
        };

        let mut first_error = None;

        // Open event streams would otherwise hold graceful shutdown forever
        if let Some(hot) = &running.hot {
            hot.close();
        }
        let _ = running.shutdown.send(());

        match running.serve.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                first_error = Some(RnwsError::Server(format!("server exited with error: {e}")));
            }
            Err(e) => {
                first_error = Some(RnwsError::Server(format!("server task failed: {e}")));
            }
        }

        let mut tools = running.tools;
        if let Err(e) = tools.shutdown().await {
            match &first_error {
                Some(_) => warn!(error = %e, "additional error while stopping tools"),
                None => first_error = Some(e),
            }
        }

        info!(addr = %running.addr, "build server stopped");
        first_error.map_or(Ok(()), Err)
    }
}

impl BundleEndpoint for BuildServer {
    fn hostname(&self) -> &str {
        &self.config.hostname
    }

    /// The bound port while running, otherwise the configured one.
    fn port(&self) -> u16 {
        self.local_addr()
            .map_or(self.config.port, |addr| addr.port())
    }
}
