use std::str::FromStr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logger(level: &str) -> anyhow::Result<()> {
    let level_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::from_str(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(level_filter)
        .with(console_layer)
        .try_init()?;

    tracing::info!("Logging initialized successfully");
    Ok(())
}
