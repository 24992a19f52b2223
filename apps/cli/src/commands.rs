//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use rnws_core::{BundleOptions, BundleOutcome, BundleProgress, MaterializedBundle, TaskFailure};
use rnws_shared::{
    BundleEndpoint, BundleTask, BundlerConfig, RnwsError, ServerConfig, load_project_config,
};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// rnws: React Native bundles served from a webpack build.
#[derive(Parser)]
#[command(
    name = "rnws",
    version,
    about = "Serve React Native bundles built by webpack, or write them out for the native apps.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start the webpack server.
    Start {
        #[command(flatten)]
        server: ServerArgs,

        /// Enable hot module replacement.
        #[arg(short = 'r', long)]
        hot: bool,
    },

    /// Bundle the app for distribution.
    Bundle {
        #[command(flatten)]
        server: ServerArgs,

        /// Create an iOS bundle.
        #[arg(
            short = 'i',
            long,
            action = ArgAction::Set,
            num_args = 0..=1,
            default_value_t = true,
            default_missing_value = "true"
        )]
        ios: bool,

        /// Create an Android bundle.
        #[arg(
            short = 'a',
            long,
            action = ArgAction::Set,
            num_args = 0..=1,
            default_value_t = true,
            default_missing_value = "true"
        )]
        android: bool,

        /// iOS entry module name.
        #[arg(short = 'I', long = "iosEntry", default_value = "index.ios")]
        ios_entry: String,

        /// Android entry module name.
        #[arg(short = 'A', long = "androidEntry", default_value = "index.android")]
        android_entry: String,
    },
}

/// Options shared by `start` and `bundle`.
#[derive(Args, Debug, Clone)]
pub(crate) struct ServerArgs {
    /// Hostname on which the server will listen.
    #[arg(short = 'H', long, default_value = "localhost")]
    pub hostname: String,

    /// Port on which the server will listen.
    #[arg(short = 'P', long, default_value_t = 8081)]
    pub port: u16,

    /// Port on which the react-native packager will listen.
    #[arg(short = 'p', long = "packagerPort", default_value_t = 8082)]
    pub packager_port: u16,

    /// Port on which the webpack dev server will listen.
    #[arg(short = 'w', long = "webpackPort", default_value_t = 8083)]
    pub webpack_port: u16,

    /// Path to the webpack configuration file.
    #[arg(short = 'c', long = "webpackConfigPath", default_value = "webpack.config.js")]
    pub webpack_config_path: PathBuf,

    /// Webpack entry module(s) to be served as '<name>.bundle'.
    #[arg(
        short = 'e',
        long,
        value_delimiter = ',',
        default_values_t = ["index.ios".to_string(), "index.android".to_string()]
    )]
    pub entries: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "rnws=info",
        1 => "rnws=debug",
        _ => "rnws=trace,tower_http=debug",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command. Only this layer turns outcomes into an exit code.
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    let cwd =
        std::env::current_dir().map_err(|e| eyre!("cannot determine working directory: {e}"))?;

    match cli.command {
        Command::Start { server, hot } => {
            let config = build_server_config(&server, hot, &cwd)?;
            cmd_start(config).await
        }
        Command::Bundle {
            server,
            ios,
            android,
            ios_entry,
            android_entry,
        } => {
            let config = build_server_config(&server, false, &cwd)?;
            let options = BundleOptions {
                ios,
                android,
                ios_entry,
                android_entry,
                project_root: cwd,
            };
            cmd_bundle(config, options).await
        }
    }
}

/// Resolve CLI options into the one immutable server config.
pub(crate) fn build_server_config(
    args: &ServerArgs,
    hot: bool,
    cwd: &Path,
) -> Result<ServerConfig> {
    let bundler = BundlerConfig::resolve(cwd, &args.webpack_config_path)?;
    let project = load_project_config(cwd)?;

    let config = ServerConfig {
        hostname: args.hostname.clone(),
        port: args.port,
        packager_port: args.packager_port,
        bundler_port: args.webpack_port,
        entries: args.entries.clone(),
        hot,
        bundler,
        project_root: cwd.to_path_buf(),
        project,
    };
    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_start(config: ServerConfig) -> Result<ExitCode> {
    let entries = config.entries.clone();
    let mut server = rnws_core::serve(config).await?;

    let base = server.base_url();
    println!();
    println!("  rnws is running at {base}");
    for entry in &entries {
        println!("    {base}/{entry}.bundle");
    }
    println!("  Press Ctrl-C to stop.");
    println!();

    let signal = tokio::signal::ctrl_c().await;
    info!("shutting down");
    let stopped = server.stop().await;

    signal.map_err(|e| eyre!("failed to listen for Ctrl-C: {e}"))?;
    stopped?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_bundle(config: ServerConfig, options: BundleOptions) -> Result<ExitCode> {
    info!(
        entries = ?config.entries,
        ios = options.ios,
        android = options.android,
        "bundling"
    );

    let reporter = CliProgress::new();
    let outcome = rnws_core::bundle(config, &options, &reporter).await?;

    print_outcome(&outcome);
    if outcome.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_outcome(outcome: &BundleOutcome) {
    println!();
    if outcome.succeeded.is_empty() && outcome.failed.is_empty() {
        println!("  No entry matched --iosEntry or --androidEntry; nothing was bundled.");
    }
    for bundle in &outcome.succeeded {
        println!(
            "  ✓ {} ({} bytes, sha256 {})",
            bundle.target_path.display(),
            bundle.size_bytes,
            short_hash(&bundle.sha256)
        );
    }
    for failure in &outcome.failed {
        eprintln!("  ✗ {}", describe_failure(failure));
    }
    println!();
}

/// One line naming the platform, entry and cause, plus the upstream body if any.
fn describe_failure(failure: &TaskFailure) -> String {
    let mut line = failure.to_string();
    if let RnwsError::Fetch {
        body: Some(body), ..
    } = &failure.error
    {
        let body = body.trim();
        if !body.is_empty() {
            line.push_str("\n    ");
            line.push_str(&body.replace('\n', "\n    "));
        }
    }
    line
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl BundleProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn task_started(&self, task: &BundleTask) {
        self.spinner.set_message(format!("Bundling {task}"));
    }

    fn task_finished(&self, task: &BundleTask, result: &rnws_shared::Result<MaterializedBundle>) {
        let status = if result.is_ok() { "done" } else { "failed" };
        self.spinner.println(format!("  {task}: {status}"));
    }

    fn done(&self, _outcome: &BundleOutcome) {
        self.spinner.finish_and_clear();
    }
}
