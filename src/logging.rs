// Logging setup - daily rolling file, plus stderr in dev mode
// RUST_LOG overrides the configured filter

use anyhow::Result;
use std::fs;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

pub fn init_logging(config: &LoggingConfig, dev: bool) -> Result<()> {
    fs::create_dir_all(&config.directory)?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(&config.directory, "bangcatalog.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let base_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false);
    let stderr_layer = dev.then(|| fmt::layer().with_writer(std::io::stderr).with_target(true));

    tracing_subscriber::registry()
        .with(base_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    // Keep the writer alive for the rest of the process
    std::mem::forget(guard);
    Ok(())
}
