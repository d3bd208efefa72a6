use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use kubesweep_core::{parse_list, SweepConfig, SystemClock};
use kubesweep_runtime::api_client::{IN_CLUSTER_CA_FILE, IN_CLUSTER_TOKEN_FILE};
use kubesweep_runtime::{
    ActionExecutor, DryRunExecutor, KubeApiConfig, KubeApiExecutor, ReconcileScheduler,
    Reconciler, SchedulerConfig, Task,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "kubesweep",
    about = "Cleanup controller for multi-tenant Kubernetes clusters"
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all cleanup tasks on their timers until interrupted
    Run,
    /// Run a single pass of one task and exit
    Once {
        #[arg(value_enum)]
        task: TaskArg,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TaskArg {
    /// Scale deployments with long-pending pods to zero, delete stale pods
    Cleanup,
    /// Strip leftover finalizers from namespaces stuck in Terminating
    Recover,
    /// Delete namespaces older than the maximum age
    Expire,
}

impl From<TaskArg> for Task {
    fn from(arg: TaskArg) -> Self {
        match arg {
            TaskArg::Cleanup => Task::Cleanup,
            TaskArg::Recover => Task::Recovery,
            TaskArg::Expire => Task::Expiry,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Args, Debug)]
struct Settings {
    /// Comma-separated namespace regexes, anchored at the start of the name
    #[arg(long, env = "NAMESPACE_PATTERNS", default_value = ".*std-.*", global = true)]
    namespace_patterns: String,

    /// Comma-separated namespace names that are always in scope
    #[arg(long, env = "NAMESPACE_LIST", default_value = "", global = true)]
    namespace_list: String,

    /// Comma-separated namespaces to exclude on top of the system namespaces
    #[arg(long, env = "EXCLUDED_NAMESPACES", default_value = "", global = true)]
    excluded_namespaces: String,

    /// Minutes a pod may stay Pending before its deployment is scaled to zero
    #[arg(long, env = "PENDING_THRESHOLD_MINUTES", default_value_t = 60, global = true)]
    pending_threshold_minutes: u32,

    /// Hours since start after which a non-running pod is deleted
    #[arg(long, env = "STALE_THRESHOLD_HOURS", default_value_t = 24, global = true)]
    stale_threshold_hours: u32,

    /// Days after which a namespace is deleted
    #[arg(long, env = "NAMESPACE_MAX_AGE_DAYS", default_value_t = 200, global = true)]
    namespace_max_age_days: u32,

    /// Finalizer stripped from resources in stuck namespaces
    #[arg(
        long,
        env = "FINALIZER_MARKER",
        default_value = "foregroundDeletion",
        global = true
    )]
    finalizer_marker: String,

    /// Seconds between workload cleanup passes
    #[arg(long, env = "CLEANUP_INTERVAL_SECS", default_value_t = 3600, global = true)]
    cleanup_interval_secs: u64,

    /// Seconds between stuck-namespace recovery passes
    #[arg(long, env = "RECOVERY_INTERVAL_SECS", default_value_t = 1200, global = true)]
    recovery_interval_secs: u64,

    /// Seconds between namespace expiry passes
    #[arg(long, env = "EXPIRY_INTERVAL_SECS", default_value_t = 86400, global = true)]
    expiry_interval_secs: u64,

    /// Kubernetes API server URL
    #[arg(
        long,
        env = "KUBE_API_URL",
        default_value = "https://kubernetes.default.svc",
        global = true
    )]
    api_url: String,

    /// Per-request timeout for Kubernetes API calls, in seconds
    #[arg(long, env = "KUBE_REQUEST_TIMEOUT_SECS", default_value_t = 30, global = true)]
    request_timeout_secs: u64,

    /// Seconds to wait for in-flight passes on shutdown; at least the request timeout
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 60, global = true)]
    shutdown_timeout_secs: u64,

    /// Bearer token file (defaults to the in-cluster service account token if present)
    #[arg(long, env = "KUBE_TOKEN_FILE", global = true)]
    token_file: Option<PathBuf>,

    /// CA bundle for the API server (defaults to the in-cluster CA if present)
    #[arg(long, env = "KUBE_CA_FILE", global = true)]
    ca_file: Option<PathBuf>,

    /// Log intended mutations instead of applying them
    #[arg(
        long,
        env = "DRY_RUN",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    dry_run: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text", global = true)]
    log_format: LogFormat,
}

impl Settings {
    fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            extra_excluded_namespaces: parse_list(&self.excluded_namespaces),
            namespace_list: parse_list(&self.namespace_list),
            namespace_patterns: parse_list(&self.namespace_patterns),
            pending_threshold: chrono::Duration::minutes(self.pending_threshold_minutes.into()),
            stale_threshold: chrono::Duration::hours(self.stale_threshold_hours.into()),
            namespace_max_age_days: self.namespace_max_age_days,
            finalizer_marker: self.finalizer_marker.trim().to_string(),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
            recovery_interval: Duration::from_secs(self.recovery_interval_secs),
            expiry_interval: Duration::from_secs(self.expiry_interval_secs),
        }
    }

    fn api_config(&self) -> miette::Result<KubeApiConfig> {
        let mut config = KubeApiConfig::new(&self.api_url);
        config.timeout = self.request_timeout();

        if let Some(path) = resolve_file(self.token_file.as_deref(), IN_CLUSTER_TOKEN_FILE) {
            info!("Using bearer token from {}", path.display());
            config = config.with_token_file(&path)?;
        }
        if let Some(path) = resolve_file(self.ca_file.as_deref(), IN_CLUSTER_CA_FILE) {
            info!("Using CA bundle from {}", path.display());
            config = config.with_ca_file(&path)?;
        }

        Ok(config)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// How long `run` waits for passes after a shutdown signal. Never shorter
    /// than one API request, so a call already on the wire can complete.
    fn shutdown_timeout(&self) -> miette::Result<Duration> {
        if self.shutdown_timeout_secs < self.request_timeout_secs {
            return Err(miette::miette!(
                help = "Raise --shutdown-timeout-secs or lower --request-timeout-secs",
                "shutdown timeout ({}s) is shorter than the API request timeout ({}s)",
                self.shutdown_timeout_secs,
                self.request_timeout_secs
            ));
        }
        Ok(Duration::from_secs(self.shutdown_timeout_secs))
    }
}

/// An explicitly configured path, or the in-cluster default if it exists
fn resolve_file(explicit: Option<&Path>, in_cluster: &str) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let path = Path::new(in_cluster);
            path.exists().then(|| path.to_path_buf())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.settings.log_format);

    let config = cli.settings.sweep_config();
    let shutdown_timeout = cli.settings.shutdown_timeout()?;
    let policies = Arc::new(config.policies(Arc::new(SystemClock))?);

    let executor: Arc<dyn ActionExecutor> =
        Arc::new(KubeApiExecutor::new(cli.settings.api_config()?)?);
    let executor: Arc<dyn ActionExecutor> = if cli.settings.dry_run {
        info!("Dry run enabled, no changes will be made");
        Arc::new(DryRunExecutor::new(executor))
    } else {
        executor
    };

    let reconciler = Arc::new(Reconciler::new(executor, policies));

    match cli.command {
        Commands::Run => {
            run_loops(reconciler, SchedulerConfig::from(&config), shutdown_timeout).await
        }
        Commands::Once { task } => run_once(&reconciler, task.into()).await,
    }
}

/// Run the scheduler until SIGINT or SIGTERM
async fn run_loops(
    reconciler: Arc<Reconciler>,
    config: SchedulerConfig,
    shutdown_timeout: Duration,
) -> miette::Result<()> {
    info!("Starting kubesweep");

    let token = CancellationToken::new();
    let scheduler = ReconcileScheduler::new(reconciler, config);
    let scheduler_token = token.clone();
    let scheduler_handle = tokio::spawn(async move { scheduler.run(scheduler_token).await });

    shutdown_signal().await?;

    info!("Shutting down gracefully...");
    token.cancel();

    // In-flight passes finish on their own; anything still running after the
    // window is aborted when the runtime shuts down
    if tokio::time::timeout(shutdown_timeout, scheduler_handle)
        .await
        .is_err()
    {
        warn!(
            "Passes still running after {:?}, exiting anyway",
            shutdown_timeout
        );
    }

    info!("Shutdown complete");
    Ok(())
}

async fn run_once(reconciler: &Reconciler, task: Task) -> miette::Result<()> {
    info!(%task, "Running single pass");
    let report = reconciler.run_task(task).await?;
    if report.failures > 0 {
        warn!(%task, failures = report.failures, "Some items could not be processed");
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> miette::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())
        .map_err(|e| miette::miette!("Failed to listen for SIGTERM: {}", e))?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;
        }
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> miette::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))
}
