use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, bail},
};
use slotgate::{
    Gate, GateError, GracefulShutdown, ShutdownReason,
    adapters::{FetchJob, FetchOutcome, fetch_job::build_client},
    config::{
        ConfigValidator,
        loader::{load_config, load_config_or_default},
        models::SlotgateConfig,
    },
    metrics, tracing_setup,
};
use tokio::sync::mpsc;
use tracing::Instrument;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Fetch URLs concurrently, at most `capacity` at a time
    Fetch {
        /// Configuration file (defaults apply when it does not exist)
        #[clap(short, long, default_value = "slotgate.toml")]
        config: String,
        /// Maximum number of requests in flight
        #[clap(short = 'j', long)]
        capacity: Option<usize>,
        /// HTTP method (GET, HEAD, POST, ...)
        #[clap(short = 'X', long)]
        method: Option<String>,
        /// Per-request timeout, e.g. "10s"
        #[clap(long)]
        timeout: Option<String>,
        /// Do not treat non-2xx responses as failures
        #[clap(long)]
        allow_errors: bool,
        /// URLs to fetch
        #[clap(required = true)]
        urls: Vec<String>,
    },
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "slotgate.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "slotgate.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    match Args::parse().command {
        Commands::Fetch {
            config,
            capacity,
            method,
            timeout,
            allow_errors,
            urls,
        } => {
            let mut cfg = load_config_or_default(&config)
                .with_context(|| format!("Failed to load config from {config}"))?;
            if let Some(capacity) = capacity {
                cfg.gate.capacity = capacity;
            }
            if let Some(method) = method {
                cfg.fetch.method = method;
            }
            if let Some(timeout) = timeout {
                cfg.fetch.timeout = timeout;
            }
            if allow_errors {
                cfg.fetch.fail_on_status = false;
            }
            fetch_command(cfg, urls).await
        }
        Commands::Validate { config } => validate_config_command(&config).await,
        Commands::Init { config } => init_config_command(&config).await,
    }
}

/// Run one fetch job per URL through a gate and report the results.
async fn fetch_command(config: SlotgateConfig, urls: Vec<String>) -> Result<()> {
    if let Err(e) = ConfigValidator::validate(&config) {
        bail!("Invalid configuration: {e}");
    }

    tracing_setup::init_from_config(&config.logging)?;
    metrics::init_metrics()?;

    let shutdown = GracefulShutdown::with_timeout(config.gate.shutdown_timeout()?);
    let signals = shutdown.clone();
    let signal_task = tokio::spawn(async move { signals.run_signal_handler().await });

    let client = build_client(&config.fetch)?;
    let gate = Gate::with_config(&config.gate);
    let errors = gate.errors();

    let failed = Arc::new(AtomicUsize::new(0));
    let error_task = {
        let failed = failed.clone();
        tokio::spawn(async move {
            while let Some(err) = errors.recv().await {
                failed.fetch_add(1, Ordering::Relaxed);
                eprintln!("error: {err}");
            }
        })
    };

    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<FetchOutcome>();
    let outcome_task = tokio::spawn(async move {
        while let Some(outcome) = outcome_rx.recv().await {
            println!(
                "{} {:>8}B {:>6}ms {}",
                outcome.status.as_u16(),
                outcome.bytes,
                outcome.elapsed.as_millis(),
                outcome.url
            );
        }
    });

    let total = urls.len();
    let root = shutdown.token();
    let span = tracing_setup::create_gate_span(gate.label(), gate.capacity());
    let invalid = async {
        let mut invalid = 0usize;
        for url in &urls {
            let job = match FetchJob::from_config(client.clone(), &config.fetch, url) {
                Ok(job) => job.with_reporter(outcome_tx.clone()),
                Err(e) => {
                    eprintln!("error: {e}");
                    invalid += 1;
                    continue;
                }
            };

            match gate.submit(&root.child_token(), job).await {
                Ok(()) => {}
                Err(GateError::Cancelled | GateError::Shutdown) => {
                    tracing::warn!("Shutdown requested, not submitting remaining URLs");
                    break;
                }
                Err(e) => return Err(e).wrap_err_with(|| format!("Failed to submit {url}")),
            }
        }
        Ok(invalid)
    }
    .instrument(span)
    .await?;
    drop(outcome_tx);

    let reason = shutdown.drain(&gate).await;
    signal_task.abort();

    if reason == ShutdownReason::Force {
        // Stragglers may never finish, so their consumers would never end.
        error_task.abort();
        outcome_task.abort();
        let failed = failed.load(Ordering::Relaxed) + invalid;
        bail!("shutdown timeout exceeded with requests still in flight ({failed} of {total} failed so far)");
    }

    error_task.await.wrap_err("error consumer panicked")?;
    outcome_task.await.wrap_err("outcome printer panicked")?;

    let failed = failed.load(Ordering::Relaxed) + invalid;
    tracing::info!(total, failed, ?reason, "Fetch run finished");
    if failed > 0 {
        bail!("{failed} of {total} requests failed");
    }
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Gate: {} (capacity {})", config.gate.label, config.gate.capacity);
            println!("   • Error buffer: {}", config.gate.error_buffer);
            println!("   • Shutdown timeout: {}", config.gate.shutdown_timeout);
            println!(
                "   • Fetch: {} with {} timeout",
                config.fetch.method, config.fetch.timeout
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Capacity and error_buffer must be at least 1 and within the supported maximum");
            println!("   • Durations use humantime units (ms, s, m, h)");
            println!("   • Log level must be a valid filter, e.g. 'info' or 'slotgate=debug'");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# slotgate configuration

[gate]
# Maximum number of jobs running at once
capacity = 8
# Job errors buffered before new ones are dropped
error_buffer = 10
label = "default"
# How long to wait for in-flight jobs after Ctrl+C / SIGTERM
shutdown_timeout = "30s"

[fetch]
method = "GET"
timeout = "30s"
fail_on_status = true

[logging]
level = "info"
json = false
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'slotgate fetch --config {config_path} <URL>...' to start");
    Ok(())
}
