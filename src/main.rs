use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::error::TurnstileError;
use turnstile::ratelimit::{
    AdmissionController, CallContext, DeclarationOptionsResolver, DelegatingOptionsResolver,
    FlatProperties, Interval, OptionsResolver, PropertyOptionsResolver, RateChecker, RateLimited,
    RedisEventLog, SlidingWindowChecker, TimeUnit, TokioSleeper,
};

#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about = "Per-key admission control backed by Redis")]
struct Cli {
    /// Configuration file (YAML); `TURNSTILE__*` variables override it
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full admission pipeline for one call
    Admit(AdmitArgs),
    /// Run the sliding window check directly
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct AdmitArgs {
    /// Explicit key
    #[arg(long, default_value = "")]
    key: String,

    /// Type name of the call site, used to derive a key
    #[arg(long = "type")]
    type_name: Option<String>,

    /// Method name of the call site, used to derive a key
    #[arg(long, default_value = "call")]
    method: String,

    /// Key expression, e.g. `#type`
    #[arg(long, default_value = "")]
    expression: String,

    /// Declare the policy inline with this many requests per interval
    #[arg(long)]
    requests: Option<u64>,

    #[arg(long, default_value_t = 1)]
    interval: u64,

    #[arg(long, default_value = "minutes")]
    unit: TimeUnit,

    /// Retries after a denial
    #[arg(long, requires = "requests")]
    retry_count: Option<u32>,

    /// Wait between retries, in milliseconds
    #[arg(long, default_value_t = 100)]
    retry_interval_ms: u64,
}

#[derive(Args, Debug)]
struct CheckArgs {
    #[arg(long)]
    key: String,

    /// Maximum requests per interval
    #[arg(long)]
    requests: u64,

    #[arg(long, default_value_t = 1)]
    interval: u64,

    #[arg(long, default_value = "minutes")]
    unit: TimeUnit,
}

impl AdmitArgs {
    fn declaration(&self) -> RateLimited {
        let mut declaration = RateLimited::keyed(&self.key).key_expression(&self.expression);
        if let Some(requests) = self.requests {
            declaration = declaration
                .max_requests(requests)
                .interval(self.interval, self.unit);
            if let Some(count) = self.retry_count {
                declaration =
                    declaration.retry(count, self.retry_interval_ms, TimeUnit::Milliseconds);
            }
        }
        declaration
    }

    fn context(&self) -> Option<CallContext> {
        self.type_name
            .as_ref()
            .map(|type_name| CallContext::new(type_name, &self.method))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => TurnstileConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => TurnstileConfig::from_env().context("Failed to load configuration")?,
    };
    info!(redis = %config.redis.url, namespace = %config.options.namespace, "Configuration loaded");

    let log = RedisEventLog::connect(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?
        .with_key_prefix(config.redis.key_prefix.clone());
    let checker = Arc::new(SlidingWindowChecker::new(Arc::new(log)));

    let admitted = match cli.command {
        Command::Check(args) => {
            let interval = Interval::new(args.interval, args.unit)?;
            checker.check(&args.key, args.requests, &interval).await
        }
        Command::Admit(args) => admit(&config, checker, &args).await?,
    };

    if admitted {
        println!("admitted");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("denied");
        Ok(ExitCode::FAILURE)
    }
}

/// Run the admission pipeline. Denials are `Ok(false)`; anything else that
/// goes wrong is an error.
async fn admit(
    config: &TurnstileConfig,
    checker: Arc<SlidingWindowChecker>,
    args: &AdmitArgs,
) -> anyhow::Result<bool> {
    let properties = match &config.properties_path {
        Some(path) => FlatProperties::from_file(path)
            .with_context(|| format!("Failed to load properties from {}", path))?,
        None => FlatProperties::new(),
    };
    let properties = PropertyOptionsResolver::new(properties)
        .with_namespace(config.options.namespace.clone())
        .with_missing(config.options.missing);
    let resolvers: Vec<Arc<dyn OptionsResolver>> =
        vec![Arc::new(DeclarationOptionsResolver), Arc::new(properties)];
    let resolver = DelegatingOptionsResolver::new(resolvers)
        .with_fail_on_missing(config.options.fail_on_missing);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let controller = AdmissionController::new(Arc::new(resolver), checker)
        .with_sleeper(Arc::new(TokioSleeper::with_shutdown(shutdown_rx)));

    match controller
        .admit(&args.declaration(), args.context().as_ref())
        .await
    {
        Ok(()) => Ok(true),
        Err(e @ (TurnstileError::CallBlocked { .. } | TurnstileError::RateLimitExceeded { .. })) => {
            info!(error = %e, "Call rejected");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.with_thread_ids(true).init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, interrupting retries");
        }
        _ = terminate => {
            info!("Received SIGTERM, interrupting retries");
        }
    }
}
