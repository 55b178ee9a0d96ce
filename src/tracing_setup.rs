use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::models::LoggingConfig;

/// Initialize tracing with custom configuration
pub fn init_tracing_with_config(level: &str, json_format: bool, include_spans: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    let installed = if json_format {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(include_spans)
                    .with_span_list(include_spans),
            )
            .try_init()
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
    };
    installed.wrap_err("Failed to install tracing subscriber")?;

    tracing::info!(level, json = json_format, spans = include_spans, "slotgate logging initialized");
    Ok(())
}

/// Initialize tracing from the `[logging]` configuration section.
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    init_tracing_with_config(&config.level, config.json, config.include_spans)
}

/// Span wrapping the lifetime of a gate run.
pub fn create_gate_span(label: &str, capacity: usize) -> tracing::Span {
    tracing::info_span!("gate", gate.label = label, gate.capacity = capacity)
}

/// Span wrapping one admitted job; `duration_ms` is recorded on completion.
pub fn create_job_span(gate: &str, job: &str) -> tracing::Span {
    tracing::info_span!(
        "job",
        gate.label = gate,
        job.name = job,
        duration_ms = tracing::field::Empty,
    )
}
