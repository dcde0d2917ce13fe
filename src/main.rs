//! Command line entry point for record-sweep.

use clap::Parser;
use record_sweep::{Config, HttpExecutor, Orchestrator, ProxyPool, ProxyValidator, input};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Look up a batch of subjects through a rotating proxy pool
#[derive(Parser, Debug)]
#[command(name = "record-sweep", version)]
#[command(about = "Quota-aware bulk record lookups through rotating proxies")]
struct Args {
    /// Subject table (CSV with id,family_name,name,patronymic,birth_date,death_date)
    #[arg(long)]
    input: PathBuf,

    /// Proxy list, one address per line
    #[arg(long)]
    proxies: PathBuf,

    /// Output JSON file (overrides the config file)
    #[arg(long)]
    output: Option<PathBuf>,

    /// JSON configuration file; missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of concurrent workers (overrides the config file)
    #[arg(long)]
    workers: Option<usize>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Use the proxy list as-is without probing it first
    #[arg(long)]
    skip_validation: bool,
}

fn init_tracing(args: &Args) -> record_sweep::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("record_sweep={}", args.log_level)));

    match &args.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn load_config(args: &Args) -> record_sweep::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    if let Some(output) = &args.output {
        config.checkpoint.output_path = output.clone();
    }
    if let Some(workers) = args.workers {
        config.dispatch.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> record_sweep::Result<()> {
    let config = load_config(&args)?;

    let subjects = input::load_subjects(&args.input)?;
    let candidates = input::load_proxies(&args.proxies)?;

    let usable = if args.skip_validation {
        if candidates.is_empty() {
            return Err(record_sweep::Error::NoProxies);
        }
        candidates
    } else {
        ProxyValidator::new(&config.proxy)
            .validate_all(&candidates)
            .await?
    };

    let pool = Arc::new(ProxyPool::new(
        usable,
        config.proxy.quota_per_window,
        config.proxy.window,
    ));
    let executor = Arc::new(HttpExecutor::new(&config.api));
    let output = config.checkpoint.output_path.clone();

    let orchestrator = Orchestrator::new(config, pool, executor).await?;
    let summary = orchestrator.run(subjects).await?;

    println!(
        "{} subjects: {} succeeded, {} exhausted, {} rejected; {} records written to {}",
        summary.subjects,
        summary.succeeded,
        summary.exhausted,
        summary.rejected,
        summary.records,
        output.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(&args) {
        eprintln!("failed to initialize logging: {e}");
        return std::process::ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            if e.is_fatal_config() {
                tracing::error!(error = %e, "aborting before dispatch");
            } else {
                tracing::error!(error = %e, "sweep failed");
            }
            eprintln!("record-sweep: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
