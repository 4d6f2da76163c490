//! Log subscriber setup.
//!
//! waypost only emits `tracing` events; installing a subscriber is the
//! application's call. [`init`] is the stock one: a global registry with an
//! `EnvFilter` and one fmt layer.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogConfig, LogFormat};
use crate::error::Error;

/// Installs the global subscriber described by `config`.
///
/// `RUST_LOG`, when set and valid, takes precedence over `config.level`. An
/// unparseable `config.level` falls back to `info`.
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_target(false).boxed(),
    };

    tracing_subscriber::registry().with(filter).with(fmt).try_init()?;
    Ok(())
}
