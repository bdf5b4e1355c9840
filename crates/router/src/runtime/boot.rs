//! Boot: logging init, config load, sink setup, state creation.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::conf::{LogFormat, LogOutput, LoggingConfig, RouterConfig};
use crate::sink::ElasticSink;
use crate::state::{RouterState, SharedState};

/// Phase 1: console logging for the boot sequence, before config is known.
/// Dropping the guard uninstalls it.
pub fn init_tracing_basic() -> tracing::subscriber::DefaultGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,router=debug"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_default(subscriber)
}

/// Phase 2: install the global subscriber described by `logging`.
/// `RUST_LOG` wins over the configured level.
pub fn init_tracing_from_config(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let (writer, ansi) = log_writer(&logging.output)?;
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(ansi)
                .with_writer(writer);
            registry.with(layer).try_init()?;
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(ansi)
                .with_writer(writer);
            registry.with(layer).try_init()?;
        }
    }
    Ok(())
}

/// Writer for the configured output, and whether ANSI colours apply to it.
fn log_writer(output: &LogOutput) -> anyhow::Result<(BoxMakeWriter, bool)> {
    match output {
        LogOutput::Stdout => Ok((BoxMakeWriter::new(std::io::stdout), true)),
        LogOutput::File { path } => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file '{}'", path))?;
            Ok((BoxMakeWriter::new(Arc::new(file)), false))
        }
    }
}

/// Load and validate config, switch to configured logging, build the sink
/// and the shared state.
///
/// Returns `(SharedState, RouterConfig)` on success.
pub fn boot() -> anyhow::Result<(SharedState, RouterConfig)> {
    let basic = init_tracing_basic();
    info!("Starting Log Router v{}", env!("CARGO_PKG_VERSION"));

    let config = RouterConfig::load().map_err(|e| {
        error!("Failed to load configuration: {:#}", e);
        e
    })?;
    config.validate().map_err(|e| {
        error!("Invalid configuration: {:#}", e);
        e
    })?;

    drop(basic);
    init_tracing_from_config(&config.logging)?;

    info!("Loaded configuration: bind_address={}", config.bind_address);
    info!(
        "Routing: {}={} -> {}<yyyy.MM.dd> (timestamp field '{}', written to '{}')",
        config.routing.type_field,
        config.routing.sentinel_type,
        config.routing.index_prefix,
        config.routing.timestamp_field,
        config.routing.target_field
    );

    let sink = ElasticSink::new(&config.sink).context("Failed to create sink")?;
    info!(
        "Sink: {} (default index '{}', max_retries={})",
        config.sink.url, config.sink.default_index, config.sink.max_retries
    );
    if !config.sink.username.is_empty() && config.sink.password.is_empty() {
        warn!("Sink username is set but password is empty; set ELASTIC_PASSWORD");
    }

    let state = Arc::new(RouterState::new(config.clone(), Arc::new(sink)));
    info!("Initialized shared router state");

    Ok((state, config))
}
