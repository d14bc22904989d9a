//! Logging setup over `tracing-subscriber`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli::LogFormatArg;

/// Logging configuration resolved from CLI flags.
pub struct LogConfig {
    /// Level derived from -v/-q flags.
    pub level: LevelFilter,

    /// Output format.
    pub format: LogFormatArg,

    /// Optional log file; stderr otherwise.
    pub log_file: Option<PathBuf>,

    /// Whether ANSI colors are allowed.
    pub ansi: bool,
}

/// Initialize the global subscriber. RUST_LOG overrides the CLI level.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env()
        .context("parse RUST_LOG")?;

    macro_rules! finish {
        ($builder:expr) => {{
            match &config.log_file {
                Some(path) => {
                    let file = std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .with_context(|| format!("open log file {}", path.display()))?;
                    $builder
                        .with_ansi(false)
                        .with_writer(std::sync::Arc::new(file))
                        .init();
                }
                None => $builder.with_ansi(config.ansi).init(),
            }
        }};
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match config.format {
        LogFormatArg::Pretty => finish!(builder),
        LogFormatArg::Compact => finish!(builder.compact()),
        LogFormatArg::Json => finish!(builder.json()),
    }

    Ok(())
}
