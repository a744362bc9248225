//! Tracing bootstrap shared by hosts and tests.

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logger configuration.
///
/// `filter` follows the `EnvFilter` syntax (e.g. "info", "fcs_runtime=debug,fcs_runtime_glow=trace").
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter: Option<String>,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: None,
            ansi: true,
        }
    }
}

static INIT: Once = Once::new();

/// Installs the global tracing subscriber once.
///
/// Subsequent calls are ignored, and so is a subscriber installed earlier by the host.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = match config.filter.as_deref() {
            Some(f) => EnvFilter::new(f),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };

        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(config.ansi)
                    .compact(),
            )
            .try_init();

        if installed.is_ok() {
            tracing::debug!("logging initialized");
        }
    });
}
